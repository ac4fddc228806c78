//! Type descriptors
//!
//! Normalized, comparable references to component and service types:
//! [`TypeKey`] identifies a single Rust type, [`TypeRef`] describes a service
//! request (plain type, parameterized shape, "all providers" wrapper or
//! wildcard). Also holds the priority helpers used to rank providers.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The universal base object: every component is one of these.
pub type Object = dyn Any + Send + Sync;

/// A type-erased component instance (an `Arc<C>` for the concrete component `C`).
pub type Instance = Arc<Object>;

/// Priority of components that do not declare one. Ranks last.
pub const UNRANKED: i32 = i32::MAX;

/// Identity of a Rust type.
///
/// Equality and hashing only consider the `TypeId`; the name is the
/// identifier used in component manifests and diagnostics.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key of type `T` (sized types, `dyn Trait` objects and markers alike).
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Key of the universal base service, `dyn Any + Send + Sync`.
    #[inline]
    pub fn any() -> Self {
        Self::of::<Object>()
    }

    /// The underlying `TypeId`.
    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully-qualified type name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether this is the universal base service.
    #[inline]
    pub fn is_any(&self) -> bool {
        self.id == TypeId::of::<Object>()
    }
}

impl PartialEq for TypeKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A service reference.
///
/// `Generic` shapes are distinct keys from their raw erasure: a request for
/// `Repository<Order>` only matches components that declare that exact
/// parameterization.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// A single concrete, trait-object or marker type
    Plain(TypeKey),
    /// A parameterized shape: `raw` applied to `args`
    Generic { raw: TypeKey, args: Vec<TypeRef> },
    /// "All providers of" the inner service
    Multiple(Box<TypeRef>),
    /// Wildcard with an optional upper bound
    Wildcard { upper: Option<Box<TypeRef>> },
    /// An unreified type parameter
    Variable(&'static str),
}

impl TypeRef {
    /// Plain reference to `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        TypeRef::Plain(TypeKey::of::<T>())
    }

    /// The universal base service.
    #[inline]
    pub fn any() -> Self {
        TypeRef::Plain(TypeKey::any())
    }

    /// Parameterized shape with raw type `R`.
    pub fn generic<R: ?Sized + 'static>(args: impl IntoIterator<Item = TypeRef>) -> Self {
        TypeRef::Generic {
            raw: TypeKey::of::<R>(),
            args: args.into_iter().collect(),
        }
    }

    /// "All providers of" `element`.
    pub fn multiple(element: TypeRef) -> Self {
        TypeRef::Multiple(Box::new(element))
    }

    /// "All providers of" `T`.
    pub fn all<T: ?Sized + 'static>() -> Self {
        Self::multiple(Self::of::<T>())
    }

    /// Wildcard bounded above by `upper`.
    pub fn wildcard(upper: Option<TypeRef>) -> Self {
        TypeRef::Wildcard {
            upper: upper.map(Box::new),
        }
    }

    /// Unreified type parameter.
    pub fn variable(name: &'static str) -> Self {
        TypeRef::Variable(name)
    }

    /// The erasure of this reference, or `None` when it cannot be reduced
    /// (an unbounded wildcard or a bare type parameter).
    pub fn raw_type(&self) -> Option<TypeKey> {
        match self {
            TypeRef::Plain(key) => Some(*key),
            TypeRef::Generic { raw, .. } => Some(*raw),
            TypeRef::Multiple(inner) => inner.raw_type(),
            TypeRef::Wildcard { upper } => upper.as_ref().and_then(|u| u.raw_type()),
            TypeRef::Variable(_) => None,
        }
    }

    /// Whether the caller is asking for all providers.
    #[inline]
    pub fn is_multiple(&self) -> bool {
        matches!(self, TypeRef::Multiple(_))
    }

    /// The element service of a `Multiple` wrapper.
    pub fn multiple_element(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::Multiple(inner) => Some(inner),
            _ => None,
        }
    }

    /// Whether the reference mentions an unreified type parameter anywhere.
    pub fn has_generic_declaration(&self) -> bool {
        match self {
            TypeRef::Plain(_) => false,
            TypeRef::Generic { args, .. } => args.iter().any(TypeRef::has_generic_declaration),
            TypeRef::Multiple(inner) => inner.has_generic_declaration(),
            TypeRef::Wildcard { upper } => upper
                .as_ref()
                .is_some_and(|u| u.has_generic_declaration()),
            TypeRef::Variable(_) => true,
        }
    }

    /// Strip wildcards down to their upper bound. `None` for an unbounded
    /// wildcard.
    pub fn resolved(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::Wildcard { upper } => upper.as_deref().and_then(TypeRef::resolved),
            other => Some(other),
        }
    }

    /// Whether this names the universal base service.
    pub fn is_any(&self) -> bool {
        matches!(self, TypeRef::Plain(key) if key.is_any())
    }
}

impl From<TypeKey> for TypeRef {
    fn from(key: TypeKey) -> Self {
        TypeRef::Plain(key)
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Plain(key) => write!(f, "{key}"),
            TypeRef::Generic { raw, args } => {
                write!(f, "{raw}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(">")
            }
            TypeRef::Multiple(inner) => write!(f, "[{inner}]"),
            TypeRef::Wildcard { upper: None } => f.write_str("?"),
            TypeRef::Wildcard { upper: Some(upper) } => write!(f, "? extends {upper}"),
            TypeRef::Variable(name) => f.write_str(name),
        }
    }
}

/// A typed view of a component as one of its services.
///
/// Holds an `Arc<T>` erased behind `dyn Any`, where `T` may be unsized
/// (`dyn Trait`). Views are produced by the hops declared on capabilities.
#[derive(Clone)]
pub struct ServiceRef {
    inner: Arc<Object>,
    service: TypeKey,
}

impl ServiceRef {
    /// Wrap a typed handle.
    pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            inner: Arc::new(value),
            service: TypeKey::of::<T>(),
        }
    }

    /// Recover the typed handle, if this view has type `T`.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner.downcast_ref::<Arc<T>>().cloned()
    }

    /// The type this view exposes.
    pub fn service(&self) -> TypeKey {
        self.service
    }
}

impl fmt::Debug for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRef")
            .field("service", &self.service)
            .finish()
    }
}

/// Rank tuple used to order components: priority, then declaration order,
/// then name.
pub type Rank = (i32, u32, &'static str);

/// Sort component keys ascending by rank. The sort is stable and fully
/// deterministic as long as `rank` is.
pub fn sort_by_rank<F>(components: &mut [TypeKey], rank: F)
where
    F: Fn(&TypeKey) -> Rank,
{
    components.sort_by_cached_key(|key| rank(key));
}

/// Whether a provider with `priority` ranks strictly below `threshold`
/// (or is unranked).
#[inline]
pub fn ranks_below(priority: i32, threshold: i32) -> bool {
    priority > threshold || priority == UNRANKED
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Repository: Send + Sync {}
    struct Order;

    #[test]
    fn test_type_key_identity() {
        let a = TypeKey::of::<String>();
        let b = TypeKey::of::<String>();
        let c = TypeKey::of::<u32>();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.name(), std::any::type_name::<String>());
        assert!(TypeKey::any().is_any());
        assert!(!a.is_any());
    }

    #[test]
    fn test_raw_type() {
        let shape = TypeRef::generic::<dyn Repository>([TypeRef::of::<Order>()]);
        assert_eq!(shape.raw_type(), Some(TypeKey::of::<dyn Repository>()));

        let plain = TypeRef::of::<Order>();
        assert_eq!(plain.raw_type(), Some(TypeKey::of::<Order>()));

        assert_eq!(TypeRef::wildcard(None).raw_type(), None);
        assert_eq!(
            TypeRef::wildcard(Some(plain.clone())).raw_type(),
            Some(TypeKey::of::<Order>())
        );
        assert_eq!(TypeRef::variable("T").raw_type(), None);
    }

    #[test]
    fn test_shape_is_distinct_from_raw() {
        let shape = TypeRef::generic::<dyn Repository>([TypeRef::of::<Order>()]);
        let raw = TypeRef::of::<dyn Repository>();
        let other = TypeRef::generic::<dyn Repository>([TypeRef::of::<String>()]);
        assert_ne!(shape, raw);
        assert_ne!(shape, other);
        assert_eq!(
            shape,
            TypeRef::generic::<dyn Repository>([TypeRef::of::<Order>()])
        );
    }

    #[test]
    fn test_multiple() {
        let all = TypeRef::all::<dyn Repository>();
        assert!(all.is_multiple());
        assert_eq!(all.multiple_element(), Some(&TypeRef::of::<dyn Repository>()));
        assert!(!TypeRef::of::<Order>().is_multiple());
        assert_eq!(TypeRef::of::<Order>().multiple_element(), None);
    }

    #[test]
    fn test_generic_declaration() {
        assert!(!TypeRef::of::<Order>().has_generic_declaration());
        let open = TypeRef::generic::<dyn Repository>([TypeRef::variable("T")]);
        assert!(open.has_generic_declaration());
        let nested = TypeRef::generic::<dyn Repository>([TypeRef::generic::<Vec<u8>>([
            TypeRef::variable("K"),
        ])]);
        assert!(nested.has_generic_declaration());
    }

    #[test]
    fn test_resolved_wildcard() {
        let bound = TypeRef::of::<Order>();
        let wildcard = TypeRef::wildcard(Some(bound.clone()));
        assert_eq!(wildcard.resolved(), Some(&bound));
        assert_eq!(TypeRef::wildcard(None).resolved(), None);
        assert_eq!(bound.resolved(), Some(&bound));
    }

    #[test]
    fn test_service_ref_roundtrip_trait_object() {
        struct Sql;
        impl Repository for Sql {}

        let view = ServiceRef::new(Arc::new(Sql) as Arc<dyn Repository>);
        assert!(view.get::<dyn Repository>().is_some());
        assert!(view.get::<Sql>().is_none());
        assert_eq!(view.service(), TypeKey::of::<dyn Repository>());
    }

    #[test]
    fn test_sort_by_rank() {
        struct A;
        struct B;
        struct C;
        let mut keys = vec![TypeKey::of::<A>(), TypeKey::of::<B>(), TypeKey::of::<C>()];
        let rank = |key: &TypeKey| -> Rank {
            if *key == TypeKey::of::<A>() {
                (UNRANKED, 0, key.name())
            } else if *key == TypeKey::of::<B>() {
                (5, 1, key.name())
            } else {
                (1, 2, key.name())
            }
        };
        sort_by_rank(&mut keys, rank);
        assert_eq!(
            keys,
            vec![TypeKey::of::<C>(), TypeKey::of::<B>(), TypeKey::of::<A>()]
        );
    }

    #[test]
    fn test_ranks_below() {
        assert!(ranks_below(5, 1));
        assert!(!ranks_below(1, 1));
        assert!(!ranks_below(0, 1));
        assert!(ranks_below(UNRANKED, UNRANKED));
    }

    #[test]
    fn test_display() {
        let shape = TypeRef::generic::<u8>([TypeRef::of::<u16>(), TypeRef::variable("T")]);
        assert_eq!(shape.to_string(), "u8<u16, T>");
        assert_eq!(TypeRef::all::<u8>().to_string(), "[u8]");
        assert_eq!(TypeRef::wildcard(None).to_string(), "?");
    }
}
