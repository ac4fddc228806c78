//! Component metadata
//!
//! The facts the runtime needs about every component type: declared scope,
//! priority, constructor, capability graph, injectable attributes and
//! post-construct hooks. Where the facts come from is up to the
//! [`MetadataExtractor`] implementation; [`TypeTable`](crate::TypeTable) is
//! the registration table shipped with the crate.

use crate::context::Found;
use crate::descriptor::{Instance, Object, ServiceRef, TypeKey, TypeRef, UNRANKED};
use crate::error::{BoxError, DiError};
use crate::manifest::Manifest;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

/// Zero-argument constructor of a component.
pub type Constructor = Arc<dyn Fn() -> Result<Instance, BoxError> + Send + Sync>;

/// Produces the typed view of an instance as its own concrete type.
pub type ViewFn = Arc<dyn Fn(&Instance) -> Option<ServiceRef> + Send + Sync>;

/// Converts a view of a type into a view of one of its capabilities.
pub type Hop = Arc<dyn Fn(&ServiceRef) -> Option<ServiceRef> + Send + Sync>;

/// Writes a resolved dependency into an attribute of the owning object.
pub type Setter = Arc<dyn Fn(&Object, Found) -> Result<(), DiError> + Send + Sync>;

/// Runs a post-construct hook on the declaring object.
pub type Hook = Arc<dyn Fn(&Object) -> Result<(), BoxError> + Send + Sync>;

// =============================================================================
// Capability graph
// =============================================================================

/// Borrow projection from a component object to its embedded ancestor.
pub trait Project: Send + Sync {
    /// Project `object` onto the ancestor, or `None` on a type mismatch.
    fn project<'a>(&self, object: &'a Object) -> Option<&'a Object>;
}

/// Projection through a field accessor.
pub(crate) struct FieldProjection<C, B> {
    field: fn(&C) -> &B,
}

impl<C, B> FieldProjection<C, B> {
    pub(crate) fn new(field: fn(&C) -> &B) -> Self {
        Self { field }
    }
}

impl<C, B> Project for FieldProjection<C, B>
where
    C: Send + Sync + 'static,
    B: Send + Sync + 'static,
{
    #[inline]
    fn project<'a>(&self, object: &'a Object) -> Option<&'a Object> {
        let owner = object.downcast_ref::<C>()?;
        Some((self.field)(owner) as &Object)
    }
}

/// The ancestor a component extends (embeds).
#[derive(Clone)]
pub struct Ancestor {
    pub(crate) key: TypeKey,
    pub(crate) project: Arc<dyn Project>,
}

impl Ancestor {
    /// The ancestor type.
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Borrow the ancestor part of `object`.
    pub fn project<'a>(&self, object: &'a Object) -> Option<&'a Object> {
        self.project.project(object)
    }
}

/// A declared capability edge: the owning type satisfies `target`.
///
/// Without a hop the capability is indexed (existence, untyped lookups) but
/// yields no typed view.
#[derive(Clone)]
pub struct Capability {
    pub(crate) target: TypeRef,
    pub(crate) hop: Option<Hop>,
}

impl Capability {
    pub fn new(target: TypeRef, hop: Option<Hop>) -> Self {
        Self { target, hop }
    }

    pub fn target(&self) -> &TypeRef {
        &self.target
    }

    pub fn hop(&self) -> Option<&Hop> {
        self.hop.as_ref()
    }
}

// =============================================================================
// Injection and hooks
// =============================================================================

/// How an injectable attribute picks its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriorityMode {
    /// The highest ranked provider
    #[default]
    Absolute,
    /// The next provider ranked below the declaring component
    BelowOwner,
}

/// An attribute the runtime fills in after construction.
#[derive(Clone)]
pub struct InjectableAttribute {
    pub(crate) name: &'static str,
    pub(crate) service: TypeRef,
    pub(crate) mode: PriorityMode,
    pub(crate) setter: Setter,
}

impl InjectableAttribute {
    pub fn new(name: &'static str, service: TypeRef, mode: PriorityMode, setter: Setter) -> Self {
        Self {
            name,
            service,
            mode,
            setter,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn service(&self) -> &TypeRef {
        &self.service
    }

    pub fn mode(&self) -> PriorityMode {
        self.mode
    }

    /// Write `found` into the attribute of `owner`.
    pub fn apply(&self, owner: &Object, found: Found) -> Result<(), DiError> {
        (self.setter)(owner, found)
    }
}

impl fmt::Debug for InjectableAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectableAttribute")
            .field("name", &self.name)
            .field("service", &self.service)
            .field("mode", &self.mode)
            .finish()
    }
}

/// A post-construct hook declared directly on a type.
#[derive(Clone)]
pub struct PostConstruct {
    pub(crate) name: &'static str,
    pub(crate) run: Hook,
}

impl PostConstruct {
    pub fn new(name: &'static str, run: Hook) -> Self {
        Self { name, run }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn run(&self, owner: &Object) -> Result<(), BoxError> {
        (self.run)(owner)
    }
}

impl fmt::Debug for PostConstruct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PostConstruct").field(&self.name).finish()
    }
}

// =============================================================================
// Type metadata
// =============================================================================

/// Everything the runtime knows about one type.
#[derive(Clone)]
pub struct TypeMetadata {
    pub(crate) key: TypeKey,
    pub(crate) scope: Option<TypeKey>,
    pub(crate) priority: i32,
    pub(crate) eager: bool,
    pub(crate) ordinal: u32,
    pub(crate) constructor: Option<Constructor>,
    pub(crate) view: Option<ViewFn>,
    pub(crate) extends: Option<Ancestor>,
    pub(crate) implements: Vec<Capability>,
    pub(crate) attributes: Vec<InjectableAttribute>,
    pub(crate) hooks: Vec<PostConstruct>,
}

impl TypeMetadata {
    /// Empty metadata: unranked, lazy, not constructible.
    pub fn new(key: TypeKey) -> Self {
        Self {
            key,
            scope: None,
            priority: UNRANKED,
            eager: false,
            ordinal: u32::MAX,
            constructor: None,
            view: None,
            extends: None,
            implements: Vec::new(),
            attributes: Vec::new(),
            hooks: Vec::new(),
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Declared scope type, if the type is a component.
    pub fn scope(&self) -> Option<TypeKey> {
        self.scope
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_eager(&self) -> bool {
        self.eager
    }

    /// Declaration order, the sort tie-break between equal priorities.
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    pub fn view(&self) -> Option<&ViewFn> {
        self.view.as_ref()
    }

    pub fn extends(&self) -> Option<&Ancestor> {
        self.extends.as_ref()
    }

    pub fn implements(&self) -> &[Capability] {
        &self.implements
    }

    pub fn attributes(&self) -> &[InjectableAttribute] {
        &self.attributes
    }

    pub fn hooks(&self) -> &[PostConstruct] {
        &self.hooks
    }
}

impl fmt::Debug for TypeMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMetadata")
            .field("key", &self.key)
            .field("scope", &self.scope)
            .field("priority", &self.priority)
            .field("eager", &self.eager)
            .field("constructible", &self.constructor.is_some())
            .field("extends", &self.extends.as_ref().map(|a| a.key))
            .field(
                "implements",
                &self.implements.iter().map(|c| &c.target).collect::<Vec<_>>(),
            )
            .field("attributes", &self.attributes)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Source of component metadata.
///
/// Implementations must be pure: the same key always yields the same facts.
/// Results are cached per scope for the lifetime of the runtime.
pub trait MetadataExtractor: Send + Sync {
    /// Metadata of `key`, or `None` for an unknown type.
    fn metadata(&self, key: &TypeKey) -> Option<Arc<TypeMetadata>>;

    /// Resolve a manifest identifier to a type.
    fn resolve(&self, name: &str) -> Option<TypeKey>;

    /// A component manifest discovered by the extractor itself, if any.
    fn manifest(&self) -> Option<Manifest> {
        None
    }
}

// =============================================================================
// Injection slots and component handles
// =============================================================================

/// An injectable attribute of a component.
///
/// Components are shared before their dependencies are injected, so
/// attributes are write-once cells rather than plain fields.
pub struct Slot<V>(OnceCell<V>);

impl<V> Slot<V> {
    /// An unset slot.
    pub const fn new() -> Self {
        Self(OnceCell::new())
    }

    /// The injected value, if any.
    #[inline]
    pub fn get(&self) -> Option<&V> {
        self.0.get()
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.get().is_some()
    }

    /// Fill the slot. Returns the value back if it was already set.
    pub fn set(&self, value: V) -> Result<(), V> {
        self.0.set(value)
    }
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: fmt::Debug> fmt::Debug for Slot<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get() {
            Some(value) => f.debug_tuple("Slot").field(value).finish(),
            None => f.write_str("Slot(<unset>)"),
        }
    }
}

/// A constructed component as stored in a context.
#[derive(Clone)]
pub struct ComponentRef {
    key: TypeKey,
    instance: Instance,
    view: Option<ViewFn>,
}

impl ComponentRef {
    pub fn new(key: TypeKey, instance: Instance, view: Option<ViewFn>) -> Self {
        Self {
            key,
            instance,
            view,
        }
    }

    /// The component type.
    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// The shared instance.
    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The instance as a borrowed object.
    #[inline]
    pub fn object(&self) -> &Object {
        self.instance.as_ref()
    }

    /// The instance as its concrete type.
    pub fn downcast<C: Send + Sync + 'static>(&self) -> Option<Arc<C>> {
        self.instance.clone().downcast::<C>().ok()
    }

    /// View of the component as its own type.
    pub fn self_view(&self) -> Option<ServiceRef> {
        self.view.as_ref().and_then(|view| view(&self.instance))
    }

    /// Whether both handles point at the same instance.
    #[inline]
    pub fn ptr_eq(&self, other: &ComponentRef) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }
}

impl fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRef")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Lifecycle listeners
// =============================================================================

/// Observer of component construction in a context.
///
/// A listener is a component providing the `dyn ContextListener` service.
/// It is notified about every component whose services include
/// [`interest`](ContextListener::interest), or about every component when the
/// interest is the universal base service. Listener components never trigger
/// notifications themselves.
pub trait ContextListener: Send + Sync {
    /// The service this listener observes.
    fn interest(&self) -> TypeRef {
        TypeRef::any()
    }

    /// Before the instance exists.
    fn pre_create(&self, _component: &TypeKey) {}

    /// After construction, before dependencies are injected.
    fn pre_init(&self, _component: &TypeKey, _instance: &ComponentRef) {}

    /// After dependencies are injected, before post-construct hooks.
    fn post_init(&self, _component: &TypeKey, _instance: &ComponentRef) {}
}
