//! Manual registration table
//!
//! [`TypeTable`] is a [`MetadataExtractor`] filled in by hand with a fluent
//! builder. It stands in for annotation scanning: every component declares
//! its scope, priority, capabilities, injectable attributes and hooks at
//! registration time.
//!
//! ```rust
//! use scoped_injector::{Application, Slot, TypeTable};
//! use std::sync::Arc;
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! #[derive(Default)]
//! struct English;
//! impl Greeter for English {
//!     fn greet(&self) -> String { "hello".into() }
//! }
//!
//! #[derive(Default)]
//! struct Front {
//!     greeter: Slot<Arc<dyn Greeter>>,
//! }
//!
//! let mut table = TypeTable::new();
//! table
//!     .component::<English>()
//!     .in_scope::<Application>()
//!     .implements::<dyn Greeter>(|c| c)
//!     .done();
//! table
//!     .component::<Front>()
//!     .in_scope::<Application>()
//!     .inject::<dyn Greeter>("greeter", |c| &c.greeter)
//!     .done();
//!
//! assert_eq!(table.manifest().len(), 2);
//! ```

use crate::context::{Found, ScopedContext, WeakContext};
use crate::descriptor::{Instance, Object, ServiceRef, TypeKey, TypeRef};
use crate::error::{BoxError, DiError};
use crate::manifest::Manifest;
use crate::metadata::{
    Ancestor, Capability, ContextListener, FieldProjection, Hop, InjectableAttribute,
    MetadataExtractor, PostConstruct, PriorityMode, Setter, Slot, TypeMetadata, ViewFn,
};
use crate::scope::{Application, Scope};
use ahash::RandomState;
use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

#[cfg(feature = "logging")]
use crate::logging::TARGET;
#[cfg(feature = "logging")]
use tracing::debug;

/// Registration table of component metadata.
pub struct TypeTable {
    entries: HashMap<TypeKey, Arc<TypeMetadata>, RandomState>,
    by_name: HashMap<&'static str, TypeKey, RandomState>,
    next_ordinal: u32,
}

impl TypeTable {
    /// A table holding the built-in types: the [`Application`] scope and
    /// [`ScopedContext`].
    pub fn new() -> Self {
        let mut table = Self {
            entries: HashMap::with_hasher(RandomState::new()),
            by_name: HashMap::with_hasher(RandomState::new()),
            next_ordinal: 0,
        };
        table.scope::<Application>().done();
        table
            .describe::<ScopedContext>()
            .implements::<WeakContext>(|context| Arc::new(context.downgrade()))
            .done();
        table
    }

    /// Register a component built with `Default::default()`.
    #[inline]
    pub fn component<C>(&mut self) -> ComponentBuilder<'_, C>
    where
        C: Default + Send + Sync + 'static,
    {
        self.component_with(C::default)
    }

    /// Register a component built by `constructor`.
    pub fn component_with<C>(
        &mut self,
        constructor: impl Fn() -> C + Send + Sync + 'static,
    ) -> ComponentBuilder<'_, C>
    where
        C: Send + Sync + 'static,
    {
        self.component_try(move || Ok(constructor()))
    }

    /// Register a component built by a fallible `constructor`.
    pub fn component_try<C>(
        &mut self,
        constructor: impl Fn() -> Result<C, BoxError> + Send + Sync + 'static,
    ) -> ComponentBuilder<'_, C>
    where
        C: Send + Sync + 'static,
    {
        let mut builder = self.scope::<C>();
        builder.meta.constructor = Some(Arc::new(move || {
            constructor().map(|component| Arc::new(component) as Instance)
        }));
        builder
    }

    /// Register a scope type. Scope values are supplied when a context is
    /// created, so the type has no constructor.
    pub fn scope<S>(&mut self) -> ComponentBuilder<'_, S>
    where
        S: Send + Sync + 'static,
    {
        let mut builder = self.describe::<S>();
        let view: ViewFn = Arc::new(|instance: &Instance| {
            instance.clone().downcast::<S>().ok().map(ServiceRef::new)
        });
        builder.meta.view = Some(view);
        builder
    }

    /// Describe a type that is not itself constructible: a trait object
    /// with capabilities of its own, or an embedded ancestor.
    pub fn describe<T>(&mut self) -> ComponentBuilder<'_, T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        ComponentBuilder {
            meta: TypeMetadata::new(TypeKey::of::<T>()),
            table: self,
            _marker: PhantomData,
        }
    }

    /// Metadata of a registered type.
    pub fn get(&self, key: &TypeKey) -> Option<&Arc<TypeMetadata>> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &TypeKey) -> bool {
        self.entries.contains_key(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The component manifest: every registered type with a declared scope.
    pub fn manifest(&self) -> Manifest {
        self.entries
            .values()
            .filter_map(|meta| meta.scope.map(|scope| (meta.key.name(), scope.name())))
            .collect()
    }

    fn insert(&mut self, mut meta: TypeMetadata) {
        meta.ordinal = self.next_ordinal;
        self.next_ordinal += 1;

        #[cfg(feature = "logging")]
        debug!(
            target: TARGET,
            component = meta.key.name(),
            scope = meta.scope.map(|s| s.name()),
            priority = meta.priority,
            ordinal = meta.ordinal,
            "Registered type"
        );

        self.by_name.insert(meta.key.name(), meta.key);
        self.entries.insert(meta.key, Arc::new(meta));
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeTable")
            .field("types", &self.entries.len())
            .finish()
    }
}

impl MetadataExtractor for TypeTable {
    #[inline]
    fn metadata(&self, key: &TypeKey) -> Option<Arc<TypeMetadata>> {
        self.entries.get(key).cloned()
    }

    #[inline]
    fn resolve(&self, name: &str) -> Option<TypeKey> {
        self.by_name.get(name).copied()
    }

    fn manifest(&self) -> Option<Manifest> {
        Some(TypeTable::manifest(self))
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Fluent registration of one type. Nothing is stored until
/// [`done`](ComponentBuilder::done).
#[must_use = "call .done() to register the type"]
pub struct ComponentBuilder<'a, C: ?Sized> {
    table: &'a mut TypeTable,
    meta: TypeMetadata,
    _marker: PhantomData<fn(&C)>,
}

impl<'a, C> ComponentBuilder<'a, C>
where
    C: ?Sized + Send + Sync + 'static,
{
    /// Declared priority; smaller ranks higher.
    #[inline]
    pub fn priority(mut self, priority: i32) -> Self {
        self.meta.priority = priority;
        self
    }

    /// Construct the component as soon as its context becomes active.
    #[inline]
    pub fn eager(mut self) -> Self {
        self.meta.eager = true;
        self
    }

    /// Declare the scope the component belongs to.
    #[inline]
    pub fn in_scope<S: Scope>(mut self) -> Self {
        self.meta.scope = Some(TypeKey::of::<S>());
        self
    }

    /// The type satisfies service `T`; `cast` converts a handle.
    pub fn implements<T>(self, cast: impl Fn(Arc<C>) -> Arc<T> + Send + Sync + 'static) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.implements_shape(TypeRef::of::<T>(), cast)
    }

    /// The type satisfies the parameterized service `shape`, viewed as `T`.
    ///
    /// A shape mentioning an unreified type parameter is indexed under its
    /// raw type only.
    pub fn implements_shape<T>(
        mut self,
        shape: TypeRef,
        cast: impl Fn(Arc<C>) -> Arc<T> + Send + Sync + 'static,
    ) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let hop: Hop = Arc::new(move |view: &ServiceRef| {
            view.get::<C>().map(|handle| ServiceRef::new(cast(handle)))
        });
        self.meta.implements.push(Capability::new(shape, Some(hop)));
        self
    }

    /// The type satisfies `service` without exposing a typed view of it.
    pub fn satisfies(mut self, service: TypeRef) -> Self {
        self.meta.implements.push(Capability::new(service, None));
        self
    }

    /// Store the metadata in the table.
    pub fn done(self) {
        let ComponentBuilder { table, meta, .. } = self;
        table.insert(meta);
    }
}

impl<'a, C> ComponentBuilder<'a, C>
where
    C: Send + Sync + 'static,
{
    /// The component embeds ancestor `B` in a field.
    ///
    /// Ancestor attributes are injected and ancestor hooks run through the
    /// projection. The ancestor is indexed as a service, and so are the
    /// capabilities described for it with [`TypeTable::describe`], but
    /// typed views of them are only available through a capability the
    /// component declares itself.
    pub fn extends<B>(mut self, field: fn(&C) -> &B) -> Self
    where
        B: Send + Sync + 'static,
    {
        self.meta.extends = Some(Ancestor {
            key: TypeKey::of::<B>(),
            project: Arc::new(FieldProjection::new(field)),
        });
        self
    }

    /// Mark the component as a lifecycle listener.
    pub fn listener(self) -> Self
    where
        C: ContextListener,
    {
        self.implements::<dyn ContextListener>(|c| c)
    }

    /// Inject the highest ranked provider of `T`.
    pub fn inject<T>(self, name: &'static str, field: fn(&C) -> &Slot<Arc<T>>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.single(name, TypeRef::of::<T>(), PriorityMode::Absolute, field)
    }

    /// Inject the next provider of `T` ranked below this component.
    pub fn inject_next<T>(self, name: &'static str, field: fn(&C) -> &Slot<Arc<T>>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.single(name, TypeRef::of::<T>(), PriorityMode::BelowOwner, field)
    }

    /// Inject the highest ranked provider of the parameterized `shape`,
    /// viewed as `T`.
    pub fn inject_shape<T>(
        self,
        name: &'static str,
        shape: TypeRef,
        field: fn(&C) -> &Slot<Arc<T>>,
    ) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.single(name, shape, PriorityMode::Absolute, field)
    }

    /// Inject every provider of `T`, in rank order.
    pub fn inject_all<T>(mut self, name: &'static str, field: fn(&C) -> &Slot<Vec<Arc<T>>>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let setter: Setter = Arc::new(move |owner: &Object, found: Found| -> Result<(), DiError> {
            let owner = downcast_owner::<C>(owner, name)?;
            let values: Vec<Arc<T>> = found
                .into_many()
                .iter()
                .filter_map(|resolved| resolved.get::<T>())
                .collect();
            field(owner)
                .set(values)
                .map_err(|_| DiError::injection(type_name::<C>(), name, "already injected"))
        });
        self.meta.attributes.push(InjectableAttribute::new(
            name,
            TypeRef::all::<T>(),
            PriorityMode::Absolute,
            setter,
        ));
        self
    }

    /// Run `hook` after the component is fully injected.
    pub fn post_construct<F>(self, name: &'static str, hook: F) -> Self
    where
        F: Fn(&C) + Send + Sync + 'static,
    {
        self.try_post_construct(name, move |component| {
            hook(component);
            Ok(())
        })
    }

    /// Run a fallible `hook` after the component is fully injected.
    pub fn try_post_construct<F>(mut self, name: &'static str, hook: F) -> Self
    where
        F: Fn(&C) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let run = Arc::new(move |owner: &Object| -> Result<(), BoxError> {
            let owner = downcast_owner::<C>(owner, name)?;
            hook(owner)
        });
        self.meta.hooks.push(PostConstruct::new(name, run));
        self
    }

    fn single<T>(
        mut self,
        name: &'static str,
        service: TypeRef,
        mode: PriorityMode,
        field: fn(&C) -> &Slot<Arc<T>>,
    ) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let setter: Setter = Arc::new(move |owner: &Object, found: Found| -> Result<(), DiError> {
            let owner = downcast_owner::<C>(owner, name)?;
            let value = found
                .into_one()
                .and_then(|resolved| resolved.get::<T>())
                .ok_or_else(|| {
                    DiError::injection(
                        type_name::<C>(),
                        name,
                        format!("provider exposes no {} view", type_name::<T>()),
                    )
                })?;
            field(owner)
                .set(value)
                .map_err(|_| DiError::injection(type_name::<C>(), name, "already injected"))
        });
        self.meta
            .attributes
            .push(InjectableAttribute::new(name, service, mode, setter));
        self
    }
}

fn downcast_owner<'o, C: Send + Sync + 'static>(
    owner: &'o Object,
    attribute: &'static str,
) -> Result<&'o C, DiError> {
    owner
        .downcast_ref::<C>()
        .ok_or_else(|| DiError::injection(type_name::<C>(), attribute, "owner type mismatch"))
}
