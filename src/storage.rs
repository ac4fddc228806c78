//! Instance container
//!
//! Per-context storage of constructed components with at-most-once
//! construction per type. Uses DashMap for lock-free reads; a type being
//! built is *claimed* in a second map so that concurrent first accesses wait
//! for the single builder instead of racing it.
//!
//! Waits are recorded in a process-wide waits-for graph. A request whose
//! wait would close a cycle (the builder is, transitively, waiting on the
//! requesting thread) receives the published partial instance instead.

use crate::descriptor::TypeKey;
use crate::metadata::ComponentRef;
use ahash::RandomState;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};

#[cfg(feature = "logging")]
use crate::logging::TARGET;
#[cfg(feature = "logging")]
use tracing::{trace, warn};

type WaitGraph = HashMap<ThreadId, Arc<Pending>, RandomState>;

/// Thread -> the construction it is blocked on, across all containers.
static WAITS_FOR: Lazy<Mutex<WaitGraph>> =
    Lazy::new(|| Mutex::new(HashMap::with_hasher(RandomState::new())));

/// Whether `me` waiting on `pending` would close a waits-for cycle.
fn closes_cycle(graph: &WaitGraph, pending: &Pending, me: ThreadId) -> bool {
    let mut owner = pending.owner;
    // every edge is checked on insertion, so the walk ends within len + 1 hops
    for _ in 0..=graph.len() {
        if owner == me {
            return true;
        }
        match graph.get(&owner) {
            Some(next) => owner = next.owner,
            None => return false,
        }
    }
    false
}

/// Removes this thread's edge from the waits-for graph.
struct Waiting {
    thread: ThreadId,
}

impl Drop for Waiting {
    fn drop(&mut self) {
        WAITS_FOR
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.thread);
    }
}

/// An in-flight construction.
struct Pending {
    owner: ThreadId,
    partial: Mutex<Option<ComponentRef>>,
    done: Mutex<bool>,
    finished: Condvar,
}

impl Pending {
    fn new() -> Self {
        Self {
            owner: thread::current().id(),
            partial: Mutex::new(None),
            done: Mutex::new(false),
            finished: Condvar::new(),
        }
    }

    fn partial(&self) -> Option<ComponentRef> {
        self.partial
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, component: &ComponentRef) {
        *self.partial.lock().unwrap_or_else(PoisonError::into_inner) = Some(component.clone());
    }

    fn wait(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        while !*done {
            done = self
                .finished
                .wait(done)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn finish(&self) {
        *self.done.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.finished.notify_all();
    }
}

/// Releases a claim when construction ends, including by panic.
struct Claim<'a> {
    container: &'a InstanceContainer,
    key: TypeKey,
    pending: Arc<Pending>,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.container.pending.remove(&self.key);
        self.pending.finish();
    }
}

/// Thread-safe storage for the components of one context.
pub(crate) struct InstanceContainer {
    ready: DashMap<TypeKey, ComponentRef, RandomState>,
    pending: DashMap<TypeKey, Arc<Pending>, RandomState>,
}

impl InstanceContainer {
    /// Create new empty storage with optimized shard count.
    ///
    /// Most contexts hold few components, so 8 shards balance creation
    /// cost against concurrent read contention.
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            ready: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
            pending: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
        }
    }

    /// Store a pre-built component.
    #[inline]
    pub(crate) fn seed(&self, component: ComponentRef) {
        self.ready.insert(component.key(), component);
    }

    /// Check if a fully constructed component exists.
    #[inline]
    pub(crate) fn contains(&self, key: &TypeKey) -> bool {
        self.ready.contains_key(key)
    }

    /// A fully constructed component.
    #[inline]
    pub(crate) fn get(&self, key: &TypeKey) -> Option<ComponentRef> {
        self.ready.get(key).map(|entry| entry.value().clone())
    }

    /// Number of fully constructed components.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.ready.len()
    }

    /// Return the component for `key`, running `build` if it does not exist.
    ///
    /// `build` receives a publish callback. Once called, a request that
    /// would otherwise wait on a cycle (a re-entrant request from the
    /// building thread, or one from a thread the builder is itself waiting
    /// on) receives the published, partially initialized component. Every
    /// other request blocks until the build finishes.
    ///
    /// A build returning `None` stores nothing; the next request retries.
    pub(crate) fn create_or_get<F>(&self, key: TypeKey, build: F) -> Option<ComponentRef>
    where
        F: FnOnce(&dyn Fn(&ComponentRef)) -> Option<ComponentRef>,
    {
        let mut build = Some(build);
        loop {
            if let Some(hit) = self.ready.get(&key) {
                return Some(hit.value().clone());
            }

            let claimed = match self.pending.entry(key) {
                Entry::Occupied(entry) => Err(entry.get().clone()),
                Entry::Vacant(entry) => {
                    // The builder publishes into `ready` before releasing its claim.
                    if let Some(hit) = self.ready.get(&key) {
                        return Some(hit.value().clone());
                    }
                    let pending = Arc::new(Pending::new());
                    entry.insert(pending.clone());
                    Ok(pending)
                }
            };

            match claimed {
                Ok(pending) => {
                    let build = build.take()?;
                    let claim = Claim {
                        container: self,
                        key,
                        pending,
                    };
                    let built = build(&|component: &ComponentRef| claim.pending.publish(component));
                    if let Some(component) = &built {
                        self.ready.insert(key, component.clone());
                    }
                    drop(claim);
                    return built;
                }
                Err(pending) => {
                    let me = thread::current().id();
                    let waiting = {
                        let mut graph = WAITS_FOR.lock().unwrap_or_else(PoisonError::into_inner);
                        if closes_cycle(&graph, &pending, me) {
                            None
                        } else {
                            graph.insert(me, Arc::clone(&pending));
                            Some(Waiting { thread: me })
                        }
                    };
                    let Some(_waiting) = waiting else {
                        #[cfg(feature = "logging")]
                        warn!(
                            target: TARGET,
                            component = key.name(),
                            cross_thread = pending.owner != me,
                            "Dependency cycle: handing out a partially initialized component"
                        );
                        return pending.partial();
                    };

                    #[cfg(feature = "logging")]
                    trace!(
                        target: TARGET,
                        component = key.name(),
                        "Waiting for concurrent construction"
                    );
                    pending.wait();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Instance;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Widget(u32);
    struct Gadget;

    fn gadget() -> ComponentRef {
        let instance: Instance = Arc::new(Gadget);
        ComponentRef::new(TypeKey::of::<Gadget>(), instance, None)
    }

    fn widget(n: u32) -> ComponentRef {
        let instance: Instance = Arc::new(Widget(n));
        ComponentRef::new(TypeKey::of::<Widget>(), instance, None)
    }

    #[test]
    fn test_build_once() {
        let container = InstanceContainer::new();
        let key = TypeKey::of::<Widget>();
        let first = container.create_or_get(key, |_| Some(widget(1))).unwrap();
        let second = container
            .create_or_get(key, |_| panic!("must not rebuild"))
            .unwrap();
        assert!(first.ptr_eq(&second));
        assert!(container.contains(&key));
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn test_failed_build_stores_nothing() {
        let container = InstanceContainer::new();
        let key = TypeKey::of::<Widget>();
        assert!(container.create_or_get(key, |_| None).is_none());
        assert!(!container.contains(&key));
        assert!(container.create_or_get(key, |_| Some(widget(2))).is_some());
    }

    #[test]
    fn test_reentrant_request_gets_partial() {
        let container = InstanceContainer::new();
        let key = TypeKey::of::<Widget>();
        let outer = container
            .create_or_get(key, |publish| {
                let component = widget(3);
                publish(&component);
                let inner = container.create_or_get(key, |_| panic!("cycle must not rebuild"));
                assert!(inner.unwrap().ptr_eq(&component));
                Some(component)
            })
            .unwrap();
        assert_eq!(outer.downcast::<Widget>().unwrap().0, 3);
    }

    #[test]
    fn test_reentrant_before_publish_gets_nothing() {
        let container = InstanceContainer::new();
        let key = TypeKey::of::<Widget>();
        container.create_or_get(key, |_| {
            assert!(container.create_or_get(key, |_| None).is_none());
            Some(widget(4))
        });
        assert!(container.contains(&key));
    }

    #[test]
    fn test_concurrent_first_access_builds_once() {
        let container = Arc::new(InstanceContainer::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));
        let key = TypeKey::of::<Widget>();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let container = Arc::clone(&container);
                let builds = Arc::clone(&builds);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    container
                        .create_or_get(key, |_| {
                            builds.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(10));
                            Some(widget(5))
                        })
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| w[0].ptr_eq(&w[1])));
    }

    #[test]
    fn test_claim_released_after_panic() {
        let container = InstanceContainer::new();
        let key = TypeKey::of::<Widget>();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            container.create_or_get(key, |_| panic!("listener exploded"))
        }));
        assert!(result.is_err());
        assert!(container.pending.is_empty());
        assert!(container.create_or_get(key, |_| Some(widget(6))).is_some());
    }

    #[test]
    fn test_builder_waits_for_other_thread() {
        let container = Arc::new(InstanceContainer::new());
        let claimed = Arc::new(Barrier::new(2));

        let slow = {
            let container = Arc::clone(&container);
            let claimed = Arc::clone(&claimed);
            thread::spawn(move || {
                container.create_or_get(TypeKey::of::<Widget>(), |_| {
                    claimed.wait();
                    thread::sleep(std::time::Duration::from_millis(100));
                    Some(widget(7))
                })
            })
        };

        claimed.wait();
        let mut dependency = None;
        container.create_or_get(TypeKey::of::<Gadget>(), |_| {
            dependency = container.create_or_get(TypeKey::of::<Widget>(), |_| {
                panic!("widget is already claimed")
            });
            Some(gadget())
        });

        let dependency = dependency.unwrap();
        assert_eq!(dependency.downcast::<Widget>().unwrap().0, 7);
        assert!(dependency.ptr_eq(&slow.join().unwrap().unwrap()));
    }

    #[test]
    fn test_cross_thread_cycle_hands_out_partial() {
        let container = Arc::new(InstanceContainer::new());
        let published = Arc::new(Barrier::new(2));

        let build_pair = |own: TypeKey, make: fn() -> ComponentRef, other: TypeKey| {
            let container = Arc::clone(&container);
            let published = Arc::clone(&published);
            thread::spawn(move || {
                let mut seen = None;
                let built = container.create_or_get(own, |publish| {
                    let component = make();
                    publish(&component);
                    published.wait();
                    seen = container.create_or_get(other, |_| panic!("already claimed"));
                    Some(component)
                });
                (built.is_some(), seen.is_some())
            })
        };

        let left = build_pair(TypeKey::of::<Widget>(), || widget(8), TypeKey::of::<Gadget>());
        let right = build_pair(TypeKey::of::<Gadget>(), gadget, TypeKey::of::<Widget>());

        assert_eq!(left.join().unwrap(), (true, true));
        assert_eq!(right.join().unwrap(), (true, true));
        assert_eq!(container.len(), 2);
    }
}
