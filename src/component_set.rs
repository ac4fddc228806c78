//! Per-scope component sets

use crate::context::ScopedContext;
use crate::descriptor::{Rank, TypeKey, TypeRef, UNRANKED, sort_by_rank};
use crate::manifest::Manifest;
use crate::metadata::MetadataExtractor;
use crate::registry::ServiceRegistry;
use ahash::RandomState;
use std::collections::HashSet;
use std::fmt;

#[cfg(feature = "logging")]
use crate::logging::TARGET;
#[cfg(feature = "logging")]
use tracing::{debug, error};

/// The deduplicated, rank-ordered components of one scope.
///
/// Always holds the scope type itself and [`ScopedContext`], whether or not
/// the manifest lists them.
pub struct ComponentSet {
    scope: TypeKey,
    components: Vec<TypeKey>,
    members: HashSet<TypeKey, RandomState>,
}

impl ComponentSet {
    /// Build the set for `scope` from the manifest entries naming it.
    ///
    /// Identifiers the extractor cannot resolve are logged and skipped.
    pub fn build(scope: TypeKey, manifest: &Manifest, extractor: &dyn MetadataExtractor) -> Self {
        let mut members = HashSet::with_hasher(RandomState::new());
        let mut components = Vec::new();

        let implicit = [TypeKey::of::<ScopedContext>(), scope];
        let declared = manifest
            .components_in(scope.name())
            .filter_map(|name| match extractor.resolve(name) {
                Some(key) => Some(key),
                None => {
                    #[cfg(feature = "logging")]
                    error!(
                        target: TARGET,
                        component = name,
                        scope = scope.name(),
                        "Cannot resolve component listed in manifest"
                    );
                    None
                }
            });

        for key in implicit.into_iter().chain(declared) {
            if members.insert(key) {
                components.push(key);
            }
        }

        sort_by_rank(&mut components, |key| rank_of(extractor, key));

        #[cfg(feature = "logging")]
        debug!(
            target: TARGET,
            scope = scope.name(),
            components = components.len(),
            "Built component set"
        );

        Self {
            scope,
            components,
            members,
        }
    }

    /// The scope type this set belongs to.
    #[inline]
    pub fn scope(&self) -> TypeKey {
        self.scope
    }

    /// Components in rank order.
    pub fn iter(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.components.iter().copied()
    }

    #[inline]
    pub fn contains(&self, key: &TypeKey) -> bool {
        self.members.contains(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Component identifiers in rank order.
    pub fn names(&self) -> Vec<&'static str> {
        self.components.iter().map(TypeKey::name).collect()
    }

    /// Components providing `service` according to `registry`, in rank order.
    pub fn providing<'a>(
        &'a self,
        registry: &'a ServiceRegistry,
        service: &'a TypeRef,
    ) -> impl Iterator<Item = TypeKey> + 'a {
        self.iter()
            .filter(move |key| registry.satisfies(key, service))
    }
}

impl fmt::Debug for ComponentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentSet")
            .field("scope", &self.scope)
            .field("components", &self.components)
            .finish()
    }
}

/// Rank of a component: declared priority, then declaration order, then
/// name. Unknown types rank last.
pub(crate) fn rank_of(extractor: &dyn MetadataExtractor, key: &TypeKey) -> Rank {
    match extractor.metadata(key) {
        Some(meta) => (meta.priority(), meta.ordinal(), key.name()),
        None => (UNRANKED, u32::MAX, key.name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{Application, Scope};
    use crate::table::TypeTable;

    #[derive(Default)]
    struct Low;
    #[derive(Default)]
    struct High;
    #[derive(Default)]
    struct Unranked;
    #[derive(Default)]
    struct Elsewhere;

    struct Request;
    impl Scope for Request {}

    fn table() -> TypeTable {
        let mut table = TypeTable::new();
        table.scope::<Request>().done();
        table.component::<Unranked>().in_scope::<Request>().done();
        table.component::<Low>().in_scope::<Request>().priority(5).done();
        table.component::<High>().in_scope::<Request>().priority(1).done();
        table.component::<Elsewhere>().in_scope::<Application>().done();
        table
    }

    #[test]
    fn test_implicit_members_and_order() {
        let table = table();
        let set = ComponentSet::build(TypeKey::of::<Request>(), &table.manifest(), &table);

        assert_eq!(set.len(), 5);
        assert!(set.contains(&TypeKey::of::<ScopedContext>()));
        assert!(set.contains(&TypeKey::of::<Request>()));
        assert!(!set.contains(&TypeKey::of::<Elsewhere>()));

        let order: Vec<_> = set.iter().collect();
        assert_eq!(order[0], TypeKey::of::<High>());
        assert_eq!(order[1], TypeKey::of::<Low>());
    }

    #[test]
    fn test_empty_scope_still_has_implicit_members() {
        struct Quiet;
        impl Scope for Quiet {}

        let table = table();
        let set = ComponentSet::build(TypeKey::of::<Quiet>(), &table.manifest(), &table);
        assert_eq!(set.len(), 2);
        assert_eq!(set.scope(), TypeKey::of::<Quiet>());
    }

    #[test]
    fn test_unresolvable_entries_are_skipped() {
        let table = table();
        let mut manifest = table.manifest();
        manifest.insert("no::such::Component", std::any::type_name::<Request>());
        let set = ComponentSet::build(TypeKey::of::<Request>(), &manifest, &table);
        assert_eq!(set.len(), 5);
        assert!(!set.names().contains(&"no::such::Component"));
    }

    #[test]
    fn test_deterministic_across_builds() {
        let table = table();
        let manifest = table.manifest();
        let first = ComponentSet::build(TypeKey::of::<Request>(), &manifest, &table);
        let second = ComponentSet::build(TypeKey::of::<Request>(), &manifest, &table);
        assert_eq!(first.names(), second.names());
    }

    #[test]
    fn test_providing_filters_by_service() {
        trait Marker: Send + Sync {}
        impl Marker for Low {}
        impl Marker for High {}

        let mut table = TypeTable::new();
        table.scope::<Request>().done();
        table.component::<Unranked>().in_scope::<Request>().done();
        table
            .component::<Low>()
            .in_scope::<Request>()
            .priority(5)
            .implements::<dyn Marker>(|c| c)
            .done();
        table
            .component::<High>()
            .in_scope::<Request>()
            .priority(1)
            .implements::<dyn Marker>(|c| c)
            .done();

        let set = ComponentSet::build(TypeKey::of::<Request>(), &table.manifest(), &table);
        let registry = ServiceRegistry::build(&set, &table);

        let marker = TypeRef::of::<dyn Marker>();
        let found: Vec<_> = set.providing(&registry, &marker).collect();
        assert_eq!(found, vec![TypeKey::of::<High>(), TypeKey::of::<Low>()]);

        let nothing = TypeRef::of::<u64>();
        assert_eq!(set.providing(&registry, &nothing).count(), 0);
    }
}
