#![no_main]

//! Fuzz target for concurrent resolution
//!
//! Threads race on first access to lazily built components; every thread
//! must observe the same instance and each component must be built once.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use scoped_injector::{Application, Runtime, Slot, TypeTable};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

trait Worker: Send + Sync {}

#[derive(Default)]
struct Alpha {
    beta: Slot<Arc<Beta>>,
}
impl Worker for Alpha {}

#[derive(Default)]
struct Beta {
    alpha: Slot<Arc<Alpha>>,
}
impl Worker for Beta {}

#[derive(Default)]
struct Gamma {
    workers: Slot<Vec<Arc<dyn Worker>>>,
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum ThreadOp {
    FindAlpha,
    FindBeta,
    FindGamma,
    FindWorker,
    FindNextWorker(i8),
    FindAllWorkers,
}

#[derive(Debug, Arbitrary)]
struct ConcurrentScenario {
    // Number of threads (clamped to 1-8)
    thread_count: u8,
    ops: Vec<ThreadOp>,
}

fuzz_target!(|scenario: ConcurrentScenario| {
    let builds = Arc::new(AtomicUsize::new(0));

    let mut table = TypeTable::new();
    let counter = Arc::clone(&builds);
    table
        .component_with(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Alpha::default()
        })
        .in_scope::<Application>()
        .priority(1)
        .implements::<dyn Worker>(|c| c)
        .inject::<Beta>("beta", |a| &a.beta)
        .done();
    let counter = Arc::clone(&builds);
    table
        .component_with(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Beta::default()
        })
        .in_scope::<Application>()
        .priority(2)
        .implements::<dyn Worker>(|c| c)
        .inject::<Alpha>("alpha", |b| &b.alpha)
        .done();
    table
        .component::<Gamma>()
        .in_scope::<Application>()
        .inject_all::<dyn Worker>("workers", |g| &g.workers)
        .done();

    let app = Runtime::new(table).application();
    let thread_count = (scenario.thread_count % 8).max(1) as usize;

    let handles: Vec<_> = (0..thread_count)
        .map(|_| {
            let app = app.clone();
            let ops = scenario.ops.clone();
            thread::spawn(move || {
                for op in ops.into_iter().take(50) {
                    match op {
                        ThreadOp::FindAlpha => {
                            assert!(app.find::<Alpha>().is_some());
                        }
                        ThreadOp::FindBeta => {
                            assert!(app.find::<Beta>().is_some());
                        }
                        ThreadOp::FindGamma => {
                            let _ = app.find::<Gamma>();
                        }
                        ThreadOp::FindWorker => {
                            assert!(app.find::<dyn Worker>().is_some());
                        }
                        ThreadOp::FindNextWorker(priority) => {
                            let _ = app.find_next::<dyn Worker>(i32::from(priority));
                        }
                        ThreadOp::FindAllWorkers => {
                            assert_eq!(app.find_all::<dyn Worker>().len(), 2);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("thread panicked");
    }

    assert!(builds.load(Ordering::SeqCst) <= 2);
    if let (Some(alpha), Some(beta)) = (app.find::<Alpha>(), app.find::<Beta>()) {
        assert!(Arc::ptr_eq(alpha.beta.get().unwrap(), &beta));
    }
});
