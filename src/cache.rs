//! Per-scope metadata cache
//!
//! Resolved construction facts per component type: the constructor, and the
//! lineage of types whose attributes and hooks apply to it (the type itself,
//! then each embedded ancestor, each reached through its projection).
//!
//! Entries are pure functions of the type, so concurrent first accesses may
//! compute the same entry twice; the first stored entry wins.

use crate::descriptor::{Object, TypeKey};
use crate::metadata::{Constructor, MetadataExtractor, Project, TypeMetadata};
use ahash::RandomState;
use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use crate::logging::TARGET;
#[cfg(feature = "logging")]
use tracing::{trace, warn};

/// One type in a lineage.
#[derive(Clone)]
pub(crate) struct Level {
    metadata: Arc<TypeMetadata>,
    via: Option<Arc<dyn Project>>,
}

impl Level {
    pub(crate) fn metadata(&self) -> &Arc<TypeMetadata> {
        &self.metadata
    }
}

/// Cached construction facts of one component type.
pub(crate) struct TypeCache {
    key: TypeKey,
    constructor: Option<Constructor>,
    lineage: Vec<Level>,
}

impl TypeCache {
    fn extract(key: TypeKey, extractor: &dyn MetadataExtractor) -> Self {
        let metadata = extractor.metadata(&key);
        let constructor = metadata.as_ref().and_then(|m| m.constructor().cloned());

        let mut lineage = Vec::new();
        let mut seen = HashSet::with_hasher(RandomState::new());
        let mut current = metadata.map(|m| (m, None));
        while let Some((meta, via)) = current.take() {
            if !seen.insert(meta.key()) {
                #[cfg(feature = "logging")]
                warn!(
                    target: TARGET,
                    component = key.name(),
                    ancestor = meta.key().name(),
                    "Ancestor chain loops back on itself; stopping the walk"
                );
                break;
            }
            current = meta.extends().and_then(|ancestor| {
                extractor
                    .metadata(&ancestor.key())
                    .map(|parent| (parent, Some(ancestor.project.clone())))
            });
            lineage.push(Level { metadata: meta, via });
        }

        Self {
            key,
            constructor,
            lineage,
        }
    }

    #[inline]
    pub(crate) fn key(&self) -> TypeKey {
        self.key
    }

    #[inline]
    pub(crate) fn constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    /// The type's own metadata, if it has any.
    pub(crate) fn metadata(&self) -> Option<&Arc<TypeMetadata>> {
        self.lineage.first().map(Level::metadata)
    }

    /// Pair each lineage level with the part of `object` it describes,
    /// most derived first. Stops at the first projection that fails.
    pub(crate) fn levels<'o>(&self, object: &'o Object) -> Vec<(&Level, &'o Object)> {
        let mut levels = Vec::with_capacity(self.lineage.len());
        let mut part = object;
        for level in &self.lineage {
            if let Some(via) = &level.via {
                match via.project(part) {
                    Some(projected) => part = projected,
                    None => break,
                }
            }
            levels.push((level, part));
        }
        levels
    }
}

/// Metadata cache of one scope.
pub struct ScopeCache {
    scope: TypeKey,
    types: DashMap<TypeKey, Arc<TypeCache>, RandomState>,
}

impl ScopeCache {
    pub(crate) fn new(scope: TypeKey) -> Self {
        Self {
            scope,
            types: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// The cached facts of `key`, computed on first access.
    pub(crate) fn get(&self, key: TypeKey, extractor: &dyn MetadataExtractor) -> Arc<TypeCache> {
        if let Some(hit) = self.types.get(&key) {
            return hit.clone();
        }

        #[cfg(feature = "logging")]
        trace!(
            target: TARGET,
            scope = self.scope.name(),
            component = key.name(),
            "Caching component metadata"
        );

        let computed = Arc::new(TypeCache::extract(key, extractor));
        self.types.entry(key).or_insert(computed).clone()
    }

    #[inline]
    pub fn scope(&self) -> TypeKey {
        self.scope
    }

    /// Number of cached types.
    #[inline]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl fmt::Debug for ScopeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeCache")
            .field("scope", &self.scope)
            .field("types", &self.types.len())
            .finish()
    }
}
