//! Construction pipeline
//!
//! Builds one component in a context, strictly in this order:
//!
//! 1. pre-create notification
//! 2. instantiate (constructor failures are logged and yield nothing)
//! 3. publish the instance, so a dependency cycle sees it partially built
//! 4. pre-init notification
//! 5. inject attributes, walking the type and then its ancestors
//! 6. post-init notification
//! 7. post-construct hooks, ancestors first

use crate::cache::TypeCache;
use crate::context::ScopedContext;
use crate::descriptor::{Object, TypeKey};
use crate::error::{DiError, panic_message};
use crate::metadata::{ComponentRef, InjectableAttribute, PriorityMode, TypeMetadata};
use std::panic::{self, AssertUnwindSafe};

#[cfg(feature = "logging")]
use crate::logging::TARGET;
#[cfg(feature = "logging")]
use tracing::{debug, error, warn};

/// Runs the construction pipeline against one context.
pub(crate) struct Instanciator<'c> {
    context: &'c ScopedContext,
}

impl<'c> Instanciator<'c> {
    #[inline]
    pub(crate) fn new(context: &'c ScopedContext) -> Self {
        Self { context }
    }

    /// The component for `key`, built on first request.
    pub(crate) fn create(&self, key: TypeKey) -> Option<ComponentRef> {
        if let Some(hit) = self.context.storage().get(&key) {
            return Some(hit);
        }
        let cache = self.context.type_cache(key);
        self.context
            .storage()
            .create_or_get(key, |publish| self.build(&cache, publish))
    }

    fn build(&self, cache: &TypeCache, publish: &dyn Fn(&ComponentRef)) -> Option<ComponentRef> {
        let key = cache.key();
        let listeners = self.context.listeners_for(&key);

        for listener in &listeners {
            listener.pre_create(&key);
        }

        let component = self.instantiate(cache)?;
        publish(&component);

        for listener in &listeners {
            listener.pre_init(&key, &component);
        }

        self.inject(&component, cache);

        for listener in &listeners {
            listener.post_init(&key, &component);
        }

        self.post_construct(&component, cache);

        #[cfg(feature = "logging")]
        debug!(
            target: TARGET,
            component = key.name(),
            scope = self.context.scope_type().name(),
            listeners = listeners.len(),
            "Created component"
        );

        Some(component)
    }

    fn instantiate(&self, cache: &TypeCache) -> Option<ComponentRef> {
        let key = cache.key();
        let Some(constructor) = cache.constructor() else {
            #[cfg(feature = "logging")]
            warn!(
                target: TARGET,
                component = key.name(),
                "Component has no constructor"
            );
            return None;
        };

        let failure = match panic::catch_unwind(AssertUnwindSafe(|| constructor())) {
            Ok(Ok(instance)) => {
                let view = cache.metadata().and_then(|meta| meta.view().cloned());
                return Some(ComponentRef::new(key, instance, view));
            }
            Ok(Err(err)) => DiError::creation_failed(key.name(), err.to_string()),
            Err(payload) => DiError::creation_failed(key.name(), panic_message(payload.as_ref())),
        };

        #[cfg(feature = "logging")]
        error!(
            target: TARGET,
            component = key.name(),
            error = %failure,
            "Component construction failed"
        );
        #[cfg(not(feature = "logging"))]
        let _ = failure;

        None
    }

    /// Inject the attributes of every type in the component's lineage.
    pub(crate) fn inject(&self, component: &ComponentRef, cache: &TypeCache) {
        for (level, part) in cache.levels(component.object()) {
            let declaring = level.metadata();
            for attribute in declaring.attributes() {
                if let Err(err) = self.inject_attribute(declaring, attribute, part) {
                    #[cfg(feature = "logging")]
                    warn!(
                        target: TARGET,
                        component = component.key().name(),
                        attribute = attribute.name(),
                        error = %err,
                        "Attribute left unset"
                    );
                    #[cfg(not(feature = "logging"))]
                    let _ = err;
                }
            }
        }
    }

    fn inject_attribute(
        &self,
        declaring: &TypeMetadata,
        attribute: &InjectableAttribute,
        owner: &Object,
    ) -> Result<(), DiError> {
        let found = match attribute.mode() {
            PriorityMode::Absolute => self.context.find_generic(attribute.service()),
            PriorityMode::BelowOwner => self
                .context
                .find_next_generic(attribute.service(), declaring.priority()),
        };
        let found = found.ok_or_else(|| {
            DiError::injection(
                declaring.key().name(),
                attribute.name(),
                format!("no provider of {}", attribute.service()),
            )
        })?;

        panic::catch_unwind(AssertUnwindSafe(|| attribute.apply(owner, found))).unwrap_or_else(
            |payload| {
                Err(DiError::injection(
                    declaring.key().name(),
                    attribute.name(),
                    panic_message(payload.as_ref()),
                ))
            },
        )
    }

    /// Run hooks from the outermost ancestor down to the component's own.
    fn post_construct(&self, component: &ComponentRef, cache: &TypeCache) {
        for (level, part) in cache.levels(component.object()).into_iter().rev() {
            for hook in level.metadata().hooks() {
                let reason = match panic::catch_unwind(AssertUnwindSafe(|| hook.run(part))) {
                    Ok(Ok(())) => continue,
                    Ok(Err(err)) => err.to_string(),
                    Err(payload) => panic_message(payload.as_ref()),
                };

                #[cfg(feature = "logging")]
                error!(
                    target: TARGET,
                    component = component.key().name(),
                    declared_on = level.metadata().key().name(),
                    hook = hook.name(),
                    reason = %reason,
                    "Post-construct hook failed"
                );
                #[cfg(not(feature = "logging"))]
                let _ = reason;
            }
        }
    }
}
