//! Scopes
//!
//! A scope is a lifetime domain. Its *type* selects the components a context
//! carries; its *value* is itself a component of that context, injectable
//! like any other.

use crate::descriptor::{Instance, ServiceRef, TypeKey};
use crate::metadata::{ComponentRef, ViewFn};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Marker for types usable as scope values.
pub trait Scope: Send + Sync + 'static {}

/// The root scope. Exactly one application context exists per runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Application;

impl Scope for Application {}

/// A scope value, type-erased.
///
/// Each value gets a process-unique id for tracking and debugging.
#[derive(Clone)]
pub struct ScopeValue {
    id: u64,
    key: TypeKey,
    instance: Instance,
    view: Option<ViewFn>,
}

impl ScopeValue {
    /// Wrap a scope value.
    ///
    /// ```rust
    /// use scoped_injector::{Scope, ScopeValue, TypeKey};
    ///
    /// struct Request { path: String }
    /// impl Scope for Request {}
    ///
    /// let value = ScopeValue::new(Request { path: "/orders".into() });
    /// assert_eq!(value.key(), TypeKey::of::<Request>());
    /// assert_eq!(value.downcast::<Request>().unwrap().path, "/orders");
    /// ```
    pub fn new<S: Scope>(value: S) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap an already shared scope value.
    pub fn from_arc<S: Scope>(value: Arc<S>) -> Self {
        let view: ViewFn = Arc::new(|instance: &Instance| {
            instance.clone().downcast::<S>().ok().map(ServiceRef::new)
        });
        Self {
            id: next_id(),
            key: TypeKey::of::<S>(),
            instance: value,
            view: Some(view),
        }
    }

    /// A scope value identified by an explicit key. Typed lookups of the
    /// value yield nothing; it is still reachable as the universal base
    /// service.
    pub fn from_parts(key: TypeKey, instance: Instance) -> Self {
        Self {
            id: next_id(),
            key,
            instance,
            view: None,
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The scope type.
    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The value as its concrete type.
    pub fn downcast<S: Send + Sync + 'static>(&self) -> Option<Arc<S>> {
        self.instance.clone().downcast::<S>().ok()
    }

    /// The value as a component of its own context.
    pub(crate) fn component(&self) -> ComponentRef {
        ComponentRef::new(self.key, self.instance.clone(), self.view.clone())
    }
}

impl fmt::Debug for ScopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeValue")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish()
    }
}

impl fmt::Display for ScopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.key, self.id)
    }
}

#[inline]
fn next_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Session {
        user: &'static str,
    }

    impl Scope for Session {}

    #[test]
    fn test_scope_value_typed() {
        let value = ScopeValue::new(Session { user: "ada" });
        assert_eq!(value.key(), TypeKey::of::<Session>());
        assert_eq!(value.downcast::<Session>().unwrap().user, "ada");
        assert!(value.downcast::<Application>().is_none());

        let component = value.component();
        assert_eq!(component.key(), TypeKey::of::<Session>());
        let view = component.self_view().unwrap();
        assert_eq!(view.get::<Session>().unwrap().user, "ada");
    }

    #[test]
    fn test_scope_ids_are_unique() {
        let a = ScopeValue::new(Application);
        let b = ScopeValue::new(Application);
        assert_ne!(a.id(), b.id());
        assert!(a.to_string().ends_with(&format!("#{}", a.id())));
    }

    #[test]
    fn test_from_parts_has_no_view() {
        let value = ScopeValue::from_parts(TypeKey::any(), Arc::new(5_u8));
        assert!(value.key().is_any());
        assert!(value.component().self_view().is_none());
    }
}
