//! Scoped contexts
//!
//! A [`ScopedContext`] ties one scope value to its component set, service
//! registry, metadata cache and instance container, plus an optional parent
//! it falls back to for anything it cannot satisfy itself. A parent never
//! sees into its children.
//!
//! Contexts are cheap to clone (`Arc` inside) and are torn down by dropping
//! every handle.

use crate::cache::{ScopeCache, TypeCache};
use crate::component_set::ComponentSet;
use crate::descriptor::{Instance, ServiceRef, TypeKey, TypeRef, ranks_below};
use crate::error::{DiError, Result};
use crate::instantiator::Instanciator;
use crate::metadata::{ComponentRef, ContextListener, TypeMetadata, ViewFn};
use crate::registry::ServiceRegistry;
use crate::runtime::RuntimeState;
use crate::scope::{Application, Scope, ScopeValue};
use crate::storage::InstanceContainer;
use once_cell::sync::OnceCell;
use std::fmt;
use std::io;
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use crate::logging::TARGET;
#[cfg(feature = "logging")]
use tracing::{debug, trace};

// =============================================================================
// Lookup results
// =============================================================================

/// A component resolved for a service request.
#[derive(Clone, Debug)]
pub struct Resolved {
    component: ComponentRef,
    view: Option<ServiceRef>,
}

impl Resolved {
    /// The resolved component.
    #[inline]
    pub fn component(&self) -> &ComponentRef {
        &self.component
    }

    /// The component viewed as the requested service, when a typed view
    /// exists.
    #[inline]
    pub fn view(&self) -> Option<&ServiceRef> {
        self.view.as_ref()
    }

    /// The typed handle to the requested service.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.view.as_ref()?.get::<T>()
    }
}

/// Result of a service lookup: one provider, or all of them for an
/// "all providers" request.
#[derive(Clone, Debug)]
pub enum Found {
    One(Resolved),
    Many(Vec<Resolved>),
}

impl Found {
    /// The single result, or the highest ranked one of many.
    pub fn into_one(self) -> Option<Resolved> {
        match self {
            Found::One(resolved) => Some(resolved),
            Found::Many(all) => all.into_iter().next(),
        }
    }

    /// Every result in rank order.
    pub fn into_many(self) -> Vec<Resolved> {
        match self {
            Found::One(resolved) => vec![resolved],
            Found::Many(all) => all,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Found::One(_) => 1,
            Found::Many(all) => all.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Context
// =============================================================================

#[derive(Clone)]
struct ListenerEntry {
    interest: TypeRef,
    listener: Arc<dyn ContextListener>,
}

struct ContextInner {
    state: Arc<RuntimeState>,
    scope: ScopeValue,
    components: Arc<ComponentSet>,
    registry: Arc<ServiceRegistry>,
    cache: Arc<ScopeCache>,
    storage: InstanceContainer,
    listeners: OnceCell<Vec<ListenerEntry>>,
    parent: Option<ScopedContext>,
    depth: usize,
}

/// The lookup and creation façade of one scope.
///
/// # Examples
///
/// ```rust
/// use scoped_injector::{Application, Runtime, Scope, TypeTable};
///
/// #[derive(Default)]
/// struct Clock;
///
/// struct Request;
/// impl Scope for Request {}
///
/// let mut table = TypeTable::new();
/// table.component::<Clock>().in_scope::<Application>().done();
/// table.scope::<Request>().done();
///
/// let app = Runtime::new(table).application();
/// let request = app.create_child(Request).unwrap();
///
/// // the child falls back to its parent
/// let clock = request.find::<Clock>().unwrap();
/// assert!(std::sync::Arc::ptr_eq(&clock, &app.find::<Clock>().unwrap()));
/// ```
#[derive(Clone)]
pub struct ScopedContext {
    inner: Arc<ContextInner>,
}

/// A non-owning handle to a [`ScopedContext`].
///
/// Inject this instead of the context itself to avoid keeping the context
/// alive through its own components.
#[derive(Clone)]
pub struct WeakContext {
    inner: Weak<ContextInner>,
}

impl WeakContext {
    /// The context, if it is still alive.
    pub fn upgrade(&self) -> Option<ScopedContext> {
        self.inner.upgrade().map(|inner| ScopedContext { inner })
    }
}

impl fmt::Debug for WeakContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakContext")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl ScopedContext {
    /// Create and activate a context: seed the scope value and the context
    /// itself, inject the scope value, then build eager components.
    pub(crate) fn activate(
        state: Arc<RuntimeState>,
        scope: ScopeValue,
        parent: Option<ScopedContext>,
    ) -> Self {
        let key = scope.key();
        let depth = parent.as_ref().map_or(0, |p| p.depth() + 1);
        let components = state.component_set(key);
        let registry = state.registry(key);
        let cache = state.scope_cache(key);

        let context = Self {
            inner: Arc::new(ContextInner {
                state,
                scope,
                components,
                registry,
                cache,
                storage: InstanceContainer::new(),
                listeners: OnceCell::new(),
                parent,
                depth,
            }),
        };

        #[cfg(feature = "logging")]
        debug!(
            target: TARGET,
            scope = %context.inner.scope,
            depth,
            components = context.inner.components.len(),
            "Activating scoped context"
        );

        let scope_component = context.inner.scope.component();
        context.inner.storage.seed(scope_component.clone());
        context.inner.storage.seed(context.self_component());

        let instanciator = Instanciator::new(&context);
        instanciator.inject(&scope_component, &context.type_cache(key));

        for component in context.inner.components.iter() {
            let eager = context
                .type_cache(component)
                .metadata()
                .is_some_and(|meta| meta.is_eager());
            if eager {
                instanciator.create(component);
            }
        }

        context
    }

    fn self_component(&self) -> ComponentRef {
        let view: ViewFn = Arc::new(|instance: &Instance| {
            let weak = instance.downcast_ref::<WeakContext>()?;
            weak.upgrade().map(|context| ServiceRef::new(Arc::new(context)))
        });
        ComponentRef::new(
            TypeKey::of::<ScopedContext>(),
            Arc::new(self.downgrade()),
            Some(view),
        )
    }

    // -------------------------------------------------------------------------
    // Typed lookups
    // -------------------------------------------------------------------------

    /// The highest ranked provider of `T`.
    ///
    /// Falls back to the parent when no local provider exists.
    pub fn find<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.find_generic(&TypeRef::of::<T>())?.into_one()?.get::<T>()
    }

    /// The first provider of `T` ranked strictly below `priority`, or
    /// unranked. The parent is consulted with the same threshold.
    pub fn find_next<T: ?Sized + Send + Sync + 'static>(&self, priority: i32) -> Option<Arc<T>> {
        self.find_next_generic(&TypeRef::of::<T>(), priority)?
            .into_one()?
            .get::<T>()
    }

    /// Every provider of `T` in rank order; empty when neither this context
    /// nor any ancestor context has one.
    pub fn find_all<T: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<T>> {
        self.find_generic(&TypeRef::all::<T>())
            .map(Found::into_many)
            .unwrap_or_default()
            .iter()
            .filter_map(Resolved::get::<T>)
            .collect()
    }

    /// Whether a provider of `T` exists here or in an ancestor context.
    #[inline]
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.exists(&TypeRef::of::<T>())
    }

    // -------------------------------------------------------------------------
    // Generic lookups
    // -------------------------------------------------------------------------

    /// Resolve a service reference: a plain type, a parameterized shape, a
    /// wildcard, or an "all providers" request.
    ///
    /// An "all providers" request always answers `Some`, possibly empty.
    pub fn find_generic(&self, service: &TypeRef) -> Option<Found> {
        if let Some(element) = service.multiple_element() {
            return Some(self.find_many(service, element, None));
        }

        #[cfg(feature = "logging")]
        trace!(
            target: TARGET,
            service = %service,
            scope = self.inner.scope.key().name(),
            "Resolving service"
        );

        let local = self
            .inner
            .registry
            .find_one(service)
            .and_then(|key| self.resolve(key, service));
        match local {
            Some(resolved) => Some(Found::One(resolved)),
            None => self.parent_lookup(service, |parent| parent.find_generic(service)),
        }
    }

    /// Like [`find_generic`](Self::find_generic), restricted to providers
    /// ranked strictly below `priority` (or unranked).
    pub fn find_next_generic(&self, service: &TypeRef, priority: i32) -> Option<Found> {
        if let Some(element) = service.multiple_element() {
            return Some(self.find_many(service, element, Some(priority)));
        }

        let local = self
            .inner
            .registry
            .find_one_below(service, priority)
            .and_then(|key| self.resolve(key, service));
        match local {
            Some(resolved) => Some(Found::One(resolved)),
            None => self.parent_lookup(service, |parent| {
                parent.find_next_generic(service, priority)
            }),
        }
    }

    fn find_many(&self, service: &TypeRef, element: &TypeRef, below: Option<i32>) -> Found {
        let registry = &self.inner.registry;
        let local: Vec<Resolved> = registry
            .find_all(element)
            .unwrap_or_default()
            .iter()
            .filter(|key| below.is_none_or(|threshold| ranks_below(registry.priority_of(key), threshold)))
            .filter_map(|key| self.resolve(*key, element))
            .collect();

        if local.is_empty() {
            let inherited = self.parent_lookup(service, |parent| {
                Some(parent.find_many(service, element, below))
            });
            if let Some(found) = inherited {
                return found;
            }
        }
        Found::Many(local)
    }

    fn parent_lookup<R>(&self, service: &TypeRef, lookup: impl FnOnce(&ScopedContext) -> Option<R>) -> Option<R> {
        let parent = self.inner.parent.as_ref()?;

        #[cfg(feature = "logging")]
        trace!(
            target: TARGET,
            service = %service,
            scope = self.inner.scope.key().name(),
            parent = parent.inner.scope.key().name(),
            "Falling back to parent context"
        );
        #[cfg(not(feature = "logging"))]
        let _ = service;

        lookup(parent)
    }

    fn resolve(&self, key: TypeKey, service: &TypeRef) -> Option<Resolved> {
        let component = Instanciator::new(self).create(key)?;
        let view = self.inner.registry.view_for(&component, service);
        Some(Resolved { component, view })
    }

    /// Whether `service` has a provider here or in an ancestor context.
    /// An "all providers" request tests its element service.
    pub fn exists(&self, service: &TypeRef) -> bool {
        self.inner.registry.exists(service)
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(|parent| parent.exists(service))
    }

    /// Whether `component` belongs to this scope or an ancestor scope.
    pub fn exists_component(&self, component: &TypeKey) -> bool {
        self.inner.components.contains(component)
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(|parent| parent.exists_component(component))
    }

    // -------------------------------------------------------------------------
    // Hierarchy
    // -------------------------------------------------------------------------

    /// Create a child context for a scope value.
    pub fn create_child<S: Scope>(&self, scope: S) -> Result<ScopedContext> {
        self.create_child_value(Some(ScopeValue::new(scope)))
    }

    /// Create a child context for a type-erased scope value.
    ///
    /// Fails with [`DiError::MissingScope`] without a value,
    /// [`DiError::InvalidScope`] for a value identified only as the
    /// universal base type, and [`DiError::RootScope`] for the
    /// [`Application`] scope.
    pub fn create_child_value(&self, scope: Option<ScopeValue>) -> Result<ScopedContext> {
        let scope = scope.ok_or(DiError::MissingScope)?;
        let key = scope.key();
        if key.is_any() {
            return Err(DiError::InvalidScope {
                type_name: key.name(),
            });
        }
        if key == TypeKey::of::<Application>() {
            return Err(DiError::RootScope {
                type_name: key.name(),
            });
        }
        Ok(Self::activate(
            Arc::clone(&self.inner.state),
            scope,
            Some(self.clone()),
        ))
    }

    /// The parent context; `None` for the application context.
    #[inline]
    pub fn parent(&self) -> Option<&ScopedContext> {
        self.inner.parent.as_ref()
    }

    /// Distance from the application context.
    #[inline]
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// The scope value.
    #[inline]
    pub fn scope(&self) -> &ScopeValue {
        &self.inner.scope
    }

    /// The scope type.
    #[inline]
    pub fn scope_type(&self) -> TypeKey {
        self.inner.scope.key()
    }

    /// The scope value as its concrete type.
    pub fn scope_as<S: Send + Sync + 'static>(&self) -> Option<Arc<S>> {
        self.inner.scope.downcast::<S>()
    }

    /// The components of this scope.
    #[inline]
    pub fn class_repository(&self) -> &Arc<ComponentSet> {
        &self.inner.components
    }

    /// Walk the components of this scope that provide `service`, in rank
    /// order, with their metadata.
    ///
    /// Components the extractor does not describe (the scope type and the
    /// context itself, unless registered) are skipped.
    pub fn for_each_component<F>(&self, service: &TypeRef, mut visit: F)
    where
        F: FnMut(TypeKey, &TypeMetadata),
    {
        let extractor = self.inner.state.extractor();
        for key in self.inner.components.providing(&self.inner.registry, service) {
            if let Some(meta) = extractor.metadata(&key) {
                visit(key, &meta);
            }
        }
    }

    /// The service index of this scope.
    #[inline]
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.inner.registry
    }

    /// The metadata cache of this scope.
    #[inline]
    pub fn cache(&self) -> &Arc<ScopeCache> {
        &self.inner.cache
    }

    /// Number of components constructed (or seeded) so far.
    pub fn instantiated(&self) -> usize {
        self.inner.storage.len()
    }

    /// Whether `component` has already been constructed in this context.
    pub fn is_instantiated(&self, component: &TypeKey) -> bool {
        self.inner.storage.contains(component)
    }

    /// Write the local providers of `service` as `<priority> -> <name>`
    /// lines, in rank order.
    pub fn print_priorities(&self, service: &TypeRef, out: &mut dyn io::Write) -> io::Result<()> {
        let service = service.multiple_element().unwrap_or(service);
        let registry = &self.inner.registry;
        for key in registry.find_all(service).unwrap_or_default() {
            writeln!(out, "{} -> {}", registry.priority_of(key), key.name())?;
        }
        Ok(())
    }

    /// A non-owning handle.
    #[inline]
    pub fn downgrade(&self) -> WeakContext {
        WeakContext {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles refer to the same context.
    #[inline]
    pub fn ptr_eq(&self, other: &ScopedContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // -------------------------------------------------------------------------
    // Pipeline support
    // -------------------------------------------------------------------------

    #[inline]
    pub(crate) fn storage(&self) -> &InstanceContainer {
        &self.inner.storage
    }

    pub(crate) fn type_cache(&self, key: TypeKey) -> Arc<TypeCache> {
        self.inner.cache.get(key, self.inner.state.extractor())
    }

    /// Listeners to notify about the construction of `target`.
    ///
    /// Listener components themselves are never observed.
    pub(crate) fn listeners_for(&self, target: &TypeKey) -> Vec<Arc<dyn ContextListener>> {
        let registry = &self.inner.registry;
        if registry.satisfies(target, &TypeRef::of::<dyn ContextListener>()) {
            return Vec::new();
        }
        let relevant = |entries: &[ListenerEntry]| -> Vec<Arc<dyn ContextListener>> {
            entries
                .iter()
                .filter(|entry| entry.interest.is_any() || registry.satisfies(target, &entry.interest))
                .map(|entry| Arc::clone(&entry.listener))
                .collect()
        };

        if let Some(cached) = self.inner.listeners.get() {
            return relevant(cached);
        }
        // Not get_or_init: building a listener may look the list up again.
        let computed: Vec<ListenerEntry> = self
            .find_all::<dyn ContextListener>()
            .into_iter()
            .map(|listener| ListenerEntry {
                interest: listener.interest(),
                listener,
            })
            .collect();
        if !self.listeners_settled() {
            return relevant(&computed);
        }
        let _ = self.inner.listeners.set(computed);
        self.inner
            .listeners
            .get()
            .map(|cached| relevant(cached))
            .unwrap_or_default()
    }

    /// Whether every listener this context sees is fully constructed.
    fn listeners_settled(&self) -> bool {
        let local = self
            .inner
            .registry
            .find_all(&TypeRef::of::<dyn ContextListener>())
            .unwrap_or_default();
        if local.is_empty() {
            return self.parent().is_none_or(ScopedContext::listeners_settled);
        }
        local.iter().all(|key| self.inner.storage.contains(key))
    }
}

impl fmt::Debug for ScopedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedContext")
            .field("scope", &self.inner.scope)
            .field("depth", &self.inner.depth)
            .field("components", &self.inner.components.len())
            .field("instantiated", &self.inner.storage.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Slot;
    use crate::runtime::Runtime;
    use crate::table::TypeTable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Svc: Send + Sync {
        fn id(&self) -> &'static str;
    }

    #[derive(Default)]
    struct Plain;

    #[derive(Default)]
    struct B;
    impl Svc for B {
        fn id(&self) -> &'static str {
            "b"
        }
    }

    #[derive(Default)]
    struct C;
    impl Svc for C {
        fn id(&self) -> &'static str {
            "c"
        }
    }

    struct Session {
        user: &'static str,
    }
    impl Scope for Session {}

    #[derive(Default)]
    struct Cart {
        items: AtomicUsize,
    }

    #[derive(Default)]
    struct Holder {
        context: Slot<Arc<WeakContext>>,
    }

    fn runtime() -> Runtime {
        let mut table = TypeTable::new();
        table.scope::<Session>().done();
        table.component::<Plain>().in_scope::<Application>().done();
        table
            .component::<B>()
            .in_scope::<Application>()
            .priority(5)
            .implements::<dyn Svc>(|c| c)
            .done();
        table
            .component::<C>()
            .in_scope::<Application>()
            .priority(1)
            .implements::<dyn Svc>(|c| c)
            .done();
        table.component::<Cart>().in_scope::<Session>().done();
        table
            .component::<Holder>()
            .in_scope::<Session>()
            .inject::<WeakContext>("context", |h| &h.context)
            .done();
        Runtime::new(table)
    }

    #[test]
    fn test_find_returns_highest_rank() {
        let app = runtime().application();
        assert_eq!(app.find::<dyn Svc>().unwrap().id(), "c");
        let ids: Vec<_> = app.find_all::<dyn Svc>().iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn test_find_equals_first_of_find_all() {
        let app = runtime().application();
        let first = app.find::<dyn Svc>().unwrap();
        let all = app.find_all::<dyn Svc>();
        assert!(Arc::ptr_eq(&first, &all[0]));
    }

    #[test]
    fn test_find_next() {
        let app = runtime().application();
        assert_eq!(app.find_next::<dyn Svc>(1).unwrap().id(), "b");
        assert!(app.find_next::<dyn Svc>(5).is_none());
    }

    #[test]
    fn test_find_next_in_child_keeps_threshold() {
        let app = runtime().application();
        let session = app.create_child(Session { user: "bea" }).unwrap();
        assert!(session.registry().find_all(&TypeRef::of::<dyn Svc>()).is_none());

        let next = session.find_next::<dyn Svc>(1).unwrap();
        assert!(Arc::ptr_eq(&next, &app.find_next::<dyn Svc>(1).unwrap()));
        assert_eq!(next.id(), "b");
        assert!(session.find_next::<dyn Svc>(5).is_none());

        let below = session
            .find_next_generic(&TypeRef::all::<dyn Svc>(), 1)
            .unwrap();
        assert_eq!(below.len(), 1);
        assert!(
            session
                .find_next_generic(&TypeRef::all::<dyn Svc>(), 5)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_same_instance_twice() {
        let app = runtime().application();
        let a = app.find::<Plain>().unwrap();
        let b = app.find::<Plain>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(app.is_instantiated(&TypeKey::of::<Plain>()));
    }

    #[test]
    fn test_child_falls_back_to_parent() {
        let app = runtime().application();
        let session = app.create_child(Session { user: "ada" }).unwrap();

        assert_eq!(session.depth(), 1);
        assert!(session.parent().unwrap().ptr_eq(&app));
        assert_eq!(session.scope_as::<Session>().unwrap().user, "ada");

        let from_child = session.find::<Plain>().unwrap();
        let from_parent = app.find::<Plain>().unwrap();
        assert!(Arc::ptr_eq(&from_child, &from_parent));

        // parents never see into children
        assert!(session.find::<Cart>().is_some());
        assert!(app.find::<Cart>().is_none());
        assert!(session.exists(&TypeRef::of::<Cart>()));
        assert!(!app.exists(&TypeRef::of::<Cart>()));
        assert!(session.exists_component(&TypeKey::of::<Plain>()));
        assert!(!app.exists_component(&TypeKey::of::<Cart>()));
    }

    #[test]
    fn test_scope_value_is_a_component() {
        let app = runtime().application();
        let session = app.create_child(Session { user: "bob" }).unwrap();
        let value = session.find::<Session>().unwrap();
        assert_eq!(value.user, "bob");
        assert!(session.contains::<Session>());
    }

    #[test]
    fn test_each_child_has_its_own_instances() {
        let app = runtime().application();
        let first = app.create_child(Session { user: "a" }).unwrap();
        let second = app.create_child(Session { user: "b" }).unwrap();
        let cart1 = first.find::<Cart>().unwrap();
        let cart2 = second.find::<Cart>().unwrap();
        cart1.items.fetch_add(2, Ordering::SeqCst);
        assert!(!Arc::ptr_eq(&cart1, &cart2));
        assert_eq!(cart2.items.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_child_requests() {
        let app = runtime().application();
        assert!(matches!(
            app.create_child_value(None),
            Err(DiError::MissingScope)
        ));
        assert!(matches!(
            app.create_child(Application),
            Err(DiError::RootScope { .. })
        ));
        let erased = ScopeValue::from_parts(TypeKey::any(), Arc::new(0_u8));
        assert!(matches!(
            app.create_child_value(Some(erased)),
            Err(DiError::InvalidScope { .. })
        ));
    }

    #[test]
    fn test_context_is_injectable() {
        let app = runtime().application();
        let session = app.create_child(Session { user: "eve" }).unwrap();
        let holder = session.find::<Holder>().unwrap();
        let injected = holder.context.get().unwrap().upgrade().unwrap();
        assert!(injected.ptr_eq(&session));

        let found = session.find::<ScopedContext>().unwrap();
        assert!(found.ptr_eq(&session));
    }

    #[test]
    fn test_all_providers_of_unknown_service_is_empty() {
        let app = runtime().application();
        let found = app.find_generic(&TypeRef::all::<u64>()).unwrap();
        assert!(found.is_empty());
        assert!(app.find_all::<u64>().is_empty());
        assert!(app.find_generic(&TypeRef::of::<u64>()).is_none());
    }

    #[test]
    fn test_find_all_falls_back_when_empty_locally() {
        let app = runtime().application();
        let session = app.create_child(Session { user: "x" }).unwrap();
        assert_eq!(session.find_all::<dyn Svc>().len(), 2);
    }

    #[test]
    fn test_print_priorities() {
        let app = runtime().application();
        let mut out = Vec::new();
        app.print_priorities(&TypeRef::of::<dyn Svc>(), &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let expected = format!(
            "1 -> {}\n5 -> {}\n",
            std::any::type_name::<C>(),
            std::any::type_name::<B>()
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_class_repository() {
        let app = runtime().application();
        let set = app.class_repository();
        assert!(set.contains(&TypeKey::of::<Plain>()));
        assert!(set.contains(&TypeKey::of::<ScopedContext>()));
        assert!(set.contains(&TypeKey::of::<Application>()));
        assert!(!set.contains(&TypeKey::of::<Cart>()));
        assert_eq!(app.scope_type(), TypeKey::of::<Application>());
    }

    #[test]
    fn test_for_each_component_providing() {
        let app = runtime().application();
        let mut seen = Vec::new();
        app.for_each_component(&TypeRef::of::<dyn Svc>(), |key, meta| {
            seen.push((key, meta.priority()));
        });
        assert_eq!(
            seen,
            vec![(TypeKey::of::<C>(), 1), (TypeKey::of::<B>(), 5)]
        );

        let mut count = 0;
        app.for_each_component(&TypeRef::of::<dyn ContextListener>(), |_, _| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_weak_context_after_drop() {
        let app = runtime().application();
        let session = app.create_child(Session { user: "gone" }).unwrap();
        let weak = session.downgrade();
        assert!(weak.upgrade().is_some());
        drop(session);
        assert!(weak.upgrade().is_none());
    }
}
