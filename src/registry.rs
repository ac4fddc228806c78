//! Service registry
//!
//! The index over one scope's [`ComponentSet`]: service → ranked providers,
//! and component → satisfied services. Built once per scope by walking each
//! component's declared capability graph breadth-first.
//!
//! Every hop along the walk is remembered, so a typed view of a component as
//! any of its services can be produced later without runtime upcasting.

use crate::component_set::{ComponentSet, rank_of};
use crate::context::ScopedContext;
use crate::descriptor::{Rank, ServiceRef, TypeKey, TypeRef, UNRANKED, ranks_below, sort_by_rank};
use crate::metadata::{ComponentRef, Hop, MetadataExtractor};
use ahash::RandomState;
use std::collections::{HashMap, VecDeque};
use std::fmt;

#[cfg(feature = "logging")]
use crate::logging::TARGET;
#[cfg(feature = "logging")]
use tracing::debug;

type Path = Option<Vec<Hop>>;

/// Service index of one scope.
pub struct ServiceRegistry {
    scope: TypeKey,
    context: TypeRef,
    providers: HashMap<TypeRef, Vec<TypeKey>, RandomState>,
    services: HashMap<TypeKey, Vec<TypeRef>, RandomState>,
    paths: HashMap<TypeKey, HashMap<TypeRef, Vec<Hop>, RandomState>, RandomState>,
    ranks: HashMap<TypeKey, Rank, RandomState>,
}

impl ServiceRegistry {
    /// Index every component of `set`.
    pub fn build(set: &ComponentSet, extractor: &dyn MetadataExtractor) -> Self {
        let mut registry = Self {
            scope: set.scope(),
            context: TypeRef::of::<ScopedContext>(),
            providers: HashMap::with_hasher(RandomState::new()),
            services: HashMap::with_hasher(RandomState::new()),
            paths: HashMap::with_hasher(RandomState::new()),
            ranks: HashMap::with_hasher(RandomState::new()),
        };

        for component in set.iter() {
            registry
                .ranks
                .insert(component, rank_of(extractor, &component));

            let mut typed = HashMap::with_hasher(RandomState::new());
            let mut satisfied = Vec::new();
            for (service, path) in walk(component, extractor) {
                registry
                    .providers
                    .entry(service.clone())
                    .or_default()
                    .push(component);
                if let Some(hops) = path {
                    typed.insert(service.clone(), hops);
                }
                satisfied.push(service);
            }
            registry.services.insert(component, satisfied);
            registry.paths.insert(component, typed);
        }

        let ranks = &registry.ranks;
        for providers in registry.providers.values_mut() {
            sort_by_rank(providers, |key| {
                ranks
                    .get(key)
                    .copied()
                    .unwrap_or((UNRANKED, u32::MAX, key.name()))
            });
        }

        #[cfg(feature = "logging")]
        debug!(
            target: TARGET,
            scope = registry.scope.name(),
            components = registry.services.len(),
            services = registry.providers.len(),
            "Built service registry"
        );

        registry
    }

    /// The scope this registry indexes.
    #[inline]
    pub fn scope(&self) -> TypeKey {
        self.scope
    }

    /// The highest ranked provider of `service`.
    pub fn find_one(&self, service: &TypeRef) -> Option<TypeKey> {
        self.providers_of(service)?.first().copied()
    }

    /// The first provider ranked strictly below `threshold`, or unranked.
    ///
    /// The context type has a single provider and ignores the threshold.
    pub fn find_one_below(&self, service: &TypeRef, threshold: i32) -> Option<TypeKey> {
        let providers = self.providers_of(service)?;
        if *service == self.context {
            return providers.first().copied();
        }
        providers
            .iter()
            .copied()
            .find(|key| ranks_below(self.priority_of(key), threshold))
    }

    /// All providers of `service` in rank order, or `None` for an unknown
    /// service.
    pub fn find_all(&self, service: &TypeRef) -> Option<&[TypeKey]> {
        self.providers_of(service).map(Vec::as_slice)
    }

    /// Whether `service` has providers. An "all providers" request tests
    /// its element service.
    pub fn exists(&self, service: &TypeRef) -> bool {
        let service = service.multiple_element().unwrap_or(service);
        self.providers_of(service).is_some()
    }

    /// Services satisfied by `component`, empty for unknown components.
    pub fn services_of(&self, component: &TypeKey) -> &[TypeRef] {
        self.services
            .get(component)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether `component` satisfies `service`.
    pub fn satisfies(&self, component: &TypeKey, service: &TypeRef) -> bool {
        self.services_of(component).contains(service)
    }

    /// Declared priority of a component of this scope.
    pub fn priority_of(&self, component: &TypeKey) -> i32 {
        self.ranks.get(component).map_or(UNRANKED, |rank| rank.0)
    }

    /// Every indexed service.
    pub fn services(&self) -> impl Iterator<Item = &TypeRef> {
        self.providers.keys()
    }

    /// The typed view of `component` as `service`, when the capability walk
    /// reached the service through hops only.
    pub fn view_for(&self, component: &ComponentRef, service: &TypeRef) -> Option<ServiceRef> {
        if service.is_any() {
            return Some(ServiceRef::new(component.instance().clone()));
        }
        let service = service.resolved()?;
        let hops = self.paths.get(&component.key())?.get(service)?;
        let mut view = component.self_view()?;
        for hop in hops {
            view = hop(&view)?;
        }
        Some(view)
    }

    fn providers_of(&self, service: &TypeRef) -> Option<&Vec<TypeKey>> {
        self.providers.get(service.resolved()?)
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("scope", &self.scope)
            .field("providers", &self.providers)
            .finish()
    }
}

/// Breadth-first closure over the capability graph of `component`.
///
/// Returns each distinct service once, with the hop path from the component
/// to it when one exists. A service reached both with and without a path
/// keeps the path.
fn walk(component: TypeKey, extractor: &dyn MetadataExtractor) -> Vec<(TypeRef, Path)> {
    let mut found: Vec<(TypeRef, Path)> = Vec::new();
    let mut index: HashMap<TypeRef, usize, RandomState> = HashMap::with_hasher(RandomState::new());
    let mut expanded: HashMap<TypeKey, bool, RandomState> = HashMap::with_hasher(RandomState::new());
    let mut queue: VecDeque<(TypeKey, Path)> = VecDeque::new();

    let mut record = |service: TypeRef, path: &Path| match index.get(&service) {
        Some(&at) => {
            if found[at].1.is_none() && path.is_some() {
                found[at].1 = path.clone();
            }
        }
        None => {
            index.insert(service.clone(), found.len());
            found.push((service, path.clone()));
        }
    };

    record(TypeRef::any(), &Some(Vec::new()));
    record(TypeRef::Plain(component), &Some(Vec::new()));
    queue.push_back((component, Some(Vec::new())));

    while let Some((key, path)) = queue.pop_front() {
        // A type is expanded at most twice: once untyped, once typed.
        match expanded.get(&key) {
            Some(true) => continue,
            Some(false) if path.is_none() => continue,
            _ => {
                expanded.insert(key, path.is_some());
            }
        }
        let Some(meta) = extractor.metadata(&key) else {
            continue;
        };

        for capability in meta.implements() {
            let next: Path = match (&path, capability.hop()) {
                (Some(hops), Some(hop)) => {
                    let mut hops = hops.clone();
                    hops.push(hop.clone());
                    Some(hops)
                }
                _ => None,
            };
            let Some(target) = capability.target().resolved() else {
                continue;
            };
            match target {
                TypeRef::Plain(raw) => {
                    record(target.clone(), &next);
                    queue.push_back((*raw, next));
                }
                TypeRef::Generic { raw, .. } => {
                    if !target.has_generic_declaration() {
                        record(target.clone(), &next);
                    }
                    record(TypeRef::Plain(*raw), &next);
                    queue.push_back((*raw, next));
                }
                TypeRef::Multiple(_) | TypeRef::Wildcard { .. } | TypeRef::Variable(_) => {}
            }
        }

        if let Some(ancestor) = meta.extends() {
            record(TypeRef::Plain(ancestor.key()), &None);
            queue.push_back((ancestor.key(), None));
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Instance;
    use crate::scope::Scope;
    use crate::table::TypeTable;
    use std::sync::Arc;

    trait Svc: Send + Sync {
        fn id(&self) -> &'static str;
    }

    trait Cache: Send + Sync {}

    #[derive(Default)]
    struct Base;

    #[derive(Default)]
    struct A;
    #[derive(Default)]
    struct B;
    #[derive(Default)]
    struct C;

    impl Svc for B {
        fn id(&self) -> &'static str {
            "b"
        }
    }
    impl Svc for C {
        fn id(&self) -> &'static str {
            "c"
        }
    }

    #[derive(Default)]
    struct StringCache;
    impl Cache for StringCache {}

    #[derive(Default)]
    struct Child {
        base: Base,
    }

    struct App;
    impl Scope for App {}

    fn registry() -> (ServiceRegistry, TypeTable) {
        let mut table = TypeTable::new();
        table.scope::<App>().done();
        table.component::<A>().in_scope::<App>().done();
        table
            .component::<B>()
            .in_scope::<App>()
            .priority(5)
            .implements::<dyn Svc>(|c| c)
            .done();
        table
            .component::<C>()
            .in_scope::<App>()
            .priority(1)
            .implements::<dyn Svc>(|c| c)
            .done();
        table
            .component::<StringCache>()
            .in_scope::<App>()
            .implements_shape::<dyn Cache>(
                TypeRef::generic::<dyn Cache>([TypeRef::of::<String>()]),
                |c| c,
            )
            .done();
        table
            .describe::<Base>()
            .satisfies(TypeRef::of::<dyn Cache>())
            .done();
        table
            .component::<Child>()
            .in_scope::<App>()
            .extends(|c: &Child| &c.base)
            .done();

        let set = ComponentSet::build(TypeKey::of::<App>(), &table.manifest(), &table);
        (ServiceRegistry::build(&set, &table), table)
    }

    #[test]
    fn test_priority_order() {
        let (registry, _) = registry();
        let svc = TypeRef::of::<dyn Svc>();
        assert_eq!(
            registry.find_all(&svc).unwrap(),
            &[TypeKey::of::<C>(), TypeKey::of::<B>()]
        );
        assert_eq!(registry.find_one(&svc), Some(TypeKey::of::<C>()));
    }

    #[test]
    fn test_find_one_below() {
        let (registry, _) = registry();
        let svc = TypeRef::of::<dyn Svc>();
        assert_eq!(registry.find_one_below(&svc, 1), Some(TypeKey::of::<B>()));
        assert_eq!(registry.find_one_below(&svc, 5), None);
        assert_eq!(registry.find_one_below(&svc, 0), Some(TypeKey::of::<C>()));

        let context = TypeRef::of::<ScopedContext>();
        assert_eq!(
            registry.find_one_below(&context, 0),
            Some(TypeKey::of::<ScopedContext>())
        );
    }

    #[test]
    fn test_unknown_service() {
        let (registry, _) = registry();
        assert!(registry.find_all(&TypeRef::of::<u64>()).is_none());
        assert!(!registry.exists(&TypeRef::of::<u64>()));
        assert!(registry.exists(&TypeRef::all::<dyn Svc>()));
        assert!(!registry.exists(&TypeRef::all::<u64>()));
    }

    #[test]
    fn test_every_component_is_any() {
        let (registry, _) = registry();
        let all = registry.find_all(&TypeRef::any()).unwrap();
        assert_eq!(all.len(), 7);
        assert!(registry.satisfies(&TypeKey::of::<A>(), &TypeRef::any()));
    }

    #[test]
    fn test_generic_shape_is_exact() {
        let (registry, _) = registry();
        let strings = TypeRef::generic::<dyn Cache>([TypeRef::of::<String>()]);
        let integers = TypeRef::generic::<dyn Cache>([TypeRef::of::<i32>()]);
        assert_eq!(registry.find_one(&strings), Some(TypeKey::of::<StringCache>()));
        assert_eq!(registry.find_one(&integers), None);
        // raw erasure is indexed too, ancestor capabilities included
        let raw = registry.find_all(&TypeRef::of::<dyn Cache>()).unwrap();
        assert!(raw.contains(&TypeKey::of::<StringCache>()));
        assert!(raw.contains(&TypeKey::of::<Child>()));
    }

    #[test]
    fn test_open_shape_indexed_by_raw_only() {
        #[derive(Default)]
        struct Open;
        struct Solo;
        impl Scope for Solo {}

        let mut table = TypeTable::new();
        table
            .component::<Open>()
            .in_scope::<Solo>()
            .satisfies(TypeRef::generic::<dyn Cache>([TypeRef::variable("T")]))
            .done();
        let set = ComponentSet::build(TypeKey::of::<Solo>(), &table.manifest(), &table);
        let registry = ServiceRegistry::build(&set, &table);
        assert!(registry.exists(&TypeRef::of::<dyn Cache>()));
        assert!(!registry.exists(&TypeRef::generic::<dyn Cache>([TypeRef::variable("T")])));
    }

    #[test]
    fn test_services_of_ancestor() {
        let (registry, _) = registry();
        let services = registry.services_of(&TypeKey::of::<Child>());
        assert!(services.contains(&TypeRef::of::<Base>()));
        assert!(services.contains(&TypeRef::of::<Child>()));
        assert!(registry.services_of(&TypeKey::of::<u8>()).is_empty());
    }

    #[test]
    fn test_view_for() {
        let (registry, table) = registry();
        let meta = table.get(&TypeKey::of::<B>()).unwrap();
        let instance: Instance = Arc::new(B);
        let component = ComponentRef::new(TypeKey::of::<B>(), instance, meta.view().cloned());

        let svc = registry
            .view_for(&component, &TypeRef::of::<dyn Svc>())
            .and_then(|view| view.get::<dyn Svc>())
            .unwrap();
        assert_eq!(svc.id(), "b");

        let own = registry
            .view_for(&component, &TypeRef::of::<B>())
            .and_then(|view| view.get::<B>());
        assert!(own.is_some());

        let any = registry.view_for(&component, &TypeRef::any()).unwrap();
        assert!(any.get::<crate::descriptor::Object>().is_some());
    }

    #[test]
    fn test_ancestor_has_no_typed_view() {
        let (registry, table) = registry();
        let meta = table.get(&TypeKey::of::<Child>()).unwrap();
        let instance: Instance = Arc::new(Child::default());
        let component = ComponentRef::new(TypeKey::of::<Child>(), instance, meta.view().cloned());
        assert!(registry.view_for(&component, &TypeRef::of::<Base>()).is_none());
        assert!(registry.view_for(&component, &TypeRef::of::<Child>()).is_some());
    }
}
