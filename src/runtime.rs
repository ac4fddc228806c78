//! Process-wide runtime state
//!
//! A [`Runtime`] owns the metadata extractor, the merged component manifest
//! and the per-scope caches every context of a scope shares: the component
//! set, the service registry and the metadata cache. Each is computed once
//! per scope type on first use.

use crate::cache::ScopeCache;
use crate::component_set::ComponentSet;
use crate::context::ScopedContext;
use crate::descriptor::TypeKey;
use crate::error::Result;
use crate::manifest::Manifest;
use crate::metadata::MetadataExtractor;
use crate::registry::ServiceRegistry;
use crate::scope::{Application, ScopeValue};
use crate::table::TypeTable;
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

#[cfg(feature = "logging")]
use crate::logging::TARGET;
#[cfg(feature = "logging")]
use tracing::info;

/// Shared state behind a [`Runtime`] and every context it creates.
pub(crate) struct RuntimeState {
    extractor: Arc<dyn MetadataExtractor>,
    manifest: Manifest,
    sets: DashMap<TypeKey, Arc<ComponentSet>, RandomState>,
    registries: DashMap<TypeKey, Arc<ServiceRegistry>, RandomState>,
    caches: DashMap<TypeKey, Arc<ScopeCache>, RandomState>,
    sets_lock: Mutex<()>,
    registries_lock: Mutex<()>,
}

impl RuntimeState {
    fn new(extractor: Arc<dyn MetadataExtractor>, manifest: Manifest) -> Self {
        Self {
            extractor,
            manifest,
            sets: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
            registries: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
            caches: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
            sets_lock: Mutex::new(()),
            registries_lock: Mutex::new(()),
        }
    }

    #[inline]
    pub(crate) fn extractor(&self) -> &dyn MetadataExtractor {
        self.extractor.as_ref()
    }

    /// The component set of `scope`, built once.
    pub(crate) fn component_set(&self, scope: TypeKey) -> Arc<ComponentSet> {
        if let Some(hit) = self.sets.get(&scope) {
            return hit.value().clone();
        }
        let _guard = self.sets_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = self.sets.get(&scope) {
            return hit.value().clone();
        }

        let set = Arc::new(ComponentSet::build(scope, &self.manifest, self.extractor()));
        self.sets.insert(scope, set.clone());
        set
    }

    /// The service registry of `scope`, built once.
    pub(crate) fn registry(&self, scope: TypeKey) -> Arc<ServiceRegistry> {
        if let Some(hit) = self.registries.get(&scope) {
            return hit.value().clone();
        }
        let _guard = self
            .registries_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = self.registries.get(&scope) {
            return hit.value().clone();
        }

        // Lock order: registries, then sets.
        let set = self.component_set(scope);
        let registry = Arc::new(ServiceRegistry::build(&set, self.extractor()));
        self.registries.insert(scope, registry.clone());
        registry
    }

    /// The metadata cache of `scope`.
    pub(crate) fn scope_cache(&self, scope: TypeKey) -> Arc<ScopeCache> {
        self.caches
            .entry(scope)
            .or_insert_with(|| Arc::new(ScopeCache::new(scope)))
            .value()
            .clone()
    }
}

/// An IoC runtime: the root of a context hierarchy.
///
/// Cloning is cheap; clones share all state, including the application
/// context.
///
/// # Examples
///
/// ```rust
/// use scoped_injector::{Application, Runtime, TypeTable};
///
/// #[derive(Default)]
/// struct Config {
///     name: String,
/// }
///
/// let mut table = TypeTable::new();
/// table
///     .component_with(|| Config { name: "demo".into() })
///     .in_scope::<Application>()
///     .done();
///
/// let runtime = Runtime::new(table);
/// let config = runtime.application().find::<Config>().unwrap();
/// assert_eq!(config.name, "demo");
/// ```
#[derive(Clone)]
pub struct Runtime {
    state: Arc<RuntimeState>,
    application: Arc<OnceCell<ScopedContext>>,
}

impl Runtime {
    /// A runtime over `extractor`, using the manifest the extractor emits
    /// (empty if it emits none).
    pub fn new(extractor: impl MetadataExtractor + 'static) -> Self {
        let manifest = extractor.manifest().unwrap_or_default();
        Self::from_parts(Arc::new(extractor), manifest)
    }

    /// Configure a runtime.
    #[inline]
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    fn from_parts(extractor: Arc<dyn MetadataExtractor>, manifest: Manifest) -> Self {
        #[cfg(feature = "logging")]
        info!(
            target: TARGET,
            entries = manifest.len(),
            "Creating IoC runtime"
        );

        Self {
            state: Arc::new(RuntimeState::new(extractor, manifest)),
            application: Arc::new(OnceCell::new()),
        }
    }

    /// The root context for the [`Application`] scope, created on first
    /// call.
    pub fn application(&self) -> ScopedContext {
        self.application
            .get_or_init(|| {
                ScopedContext::activate(
                    Arc::clone(&self.state),
                    ScopeValue::new(Application),
                    None,
                )
            })
            .clone()
    }

    /// The merged component manifest.
    #[inline]
    pub fn manifest(&self) -> &Manifest {
        &self.state.manifest
    }

    /// The component set of a scope type.
    pub fn component_set(&self, scope: TypeKey) -> Arc<ComponentSet> {
        self.state.component_set(scope)
    }

    /// The service registry of a scope type.
    pub fn registry(&self, scope: TypeKey) -> Arc<ServiceRegistry> {
        self.state.registry(scope)
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("manifest_entries", &self.state.manifest.len())
            .field("scopes", &self.state.sets.len())
            .field("application", &self.application.get().is_some())
            .finish()
    }
}

/// Builder for [`Runtime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    extractor: Option<Arc<dyn MetadataExtractor>>,
    manifests: Vec<Manifest>,
    files: Vec<PathBuf>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The metadata extractor. Defaults to an empty [`TypeTable`].
    pub fn extractor(mut self, extractor: impl MetadataExtractor + 'static) -> Self {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    /// Add a manifest. Later manifests override earlier ones per entry.
    pub fn manifest(mut self, manifest: Manifest) -> Self {
        self.manifests.push(manifest);
        self
    }

    /// Add a manifest file, read at [`build`](Self::build) time after every
    /// in-memory manifest.
    pub fn manifest_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Build the runtime.
    ///
    /// Without any explicit manifest, the extractor's own manifest is used.
    pub fn build(self) -> Result<Runtime> {
        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(TypeTable::new()));

        let manifest = if self.manifests.is_empty() && self.files.is_empty() {
            extractor.manifest().unwrap_or_default()
        } else {
            let mut merged = Manifest::new();
            for manifest in self.manifests {
                merged.merge(manifest);
            }
            for path in &self.files {
                merged.merge(Manifest::load(path)?);
            }
            merged
        };

        Ok(Runtime::from_parts(extractor, manifest))
    }
}

impl fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("extractor", &self.extractor.is_some())
            .field("manifests", &self.manifests.len())
            .field("files", &self.files)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiError;

    #[derive(Default)]
    struct Alpha;

    #[derive(Default)]
    struct Beta;

    fn table() -> TypeTable {
        let mut table = TypeTable::new();
        table.component::<Alpha>().in_scope::<Application>().done();
        // registered, but scoped only through an explicit manifest
        table.component::<Beta>().done();
        table
    }

    #[test]
    fn test_application_is_created_once() {
        let runtime = Runtime::new(table());
        let first = runtime.application();
        let second = runtime.clone().application();
        assert!(first.ptr_eq(&second));
        assert!(first.parent().is_none());
        assert_eq!(first.depth(), 0);
    }

    #[test]
    fn test_table_manifest_is_default() {
        let runtime = Runtime::new(table());
        let app = runtime.application();
        assert!(app.find::<Alpha>().is_some());
        assert!(app.find::<Beta>().is_none());
    }

    #[test]
    fn test_explicit_manifest_replaces_table_manifest() {
        let mut manifest = Manifest::new();
        manifest.insert(
            std::any::type_name::<Beta>(),
            std::any::type_name::<Application>(),
        );
        let runtime = Runtime::builder()
            .extractor(table())
            .manifest(manifest)
            .build()
            .unwrap();
        let app = runtime.application();
        assert!(app.find::<Beta>().is_some());
        assert!(app.find::<Alpha>().is_none());
    }

    #[test]
    fn test_manifests_merge_last_write_wins() {
        let beta = std::any::type_name::<Beta>();
        let mut first = Manifest::new();
        first.insert(beta, "elsewhere");
        let mut second = Manifest::new();
        second.insert(beta, std::any::type_name::<Application>());

        let runtime = Runtime::builder()
            .extractor(table())
            .manifest(first)
            .manifest(second)
            .build()
            .unwrap();
        assert_eq!(
            runtime.manifest().scope_of(beta),
            Some(std::any::type_name::<Application>())
        );
    }

    #[test]
    fn test_missing_manifest_file() {
        let result = Runtime::builder()
            .manifest_file("/nonexistent/scoped-injector/components.manifest")
            .build();
        assert!(matches!(result, Err(DiError::Io { .. })));
    }

    #[test]
    fn test_per_scope_state_is_shared() {
        let runtime = Runtime::new(table());
        let key = TypeKey::of::<Application>();
        assert!(Arc::ptr_eq(
            &runtime.component_set(key),
            &runtime.component_set(key)
        ));
        assert!(Arc::ptr_eq(&runtime.registry(key), &runtime.registry(key)));
        assert!(runtime.component_set(key).contains(&TypeKey::of::<Alpha>()));
    }
}
