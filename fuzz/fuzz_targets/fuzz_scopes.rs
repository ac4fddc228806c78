#![no_main]

//! Fuzz target for context hierarchies
//!
//! Builds arbitrary trees of child contexts and checks parent fallback,
//! per-context identity and parent isolation.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use scoped_injector::{Application, Runtime, Scope, ScopedContext, Slot, TypeKey, TypeTable};
use std::sync::Arc;

#[derive(Default)]
struct Shared;

struct Session {
    id: u16,
}
impl Scope for Session {}

#[derive(Default)]
struct Cart {
    shared: Slot<Arc<Shared>>,
    session: Slot<Arc<Session>>,
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Op {
    Child(u16),
    Up,
    FindShared,
    FindCart,
    DropCurrent,
}

fuzz_target!(|ops: Vec<Op>| {
    let mut table = TypeTable::new();
    table.component::<Shared>().in_scope::<Application>().done();
    table.scope::<Session>().done();
    table
        .component::<Cart>()
        .in_scope::<Session>()
        .inject::<Shared>("shared", |c| &c.shared)
        .inject::<Session>("session", |c| &c.session)
        .done();

    let app = Runtime::new(table).application();
    let shared = app.find::<Shared>().expect("application component");
    let mut stack: Vec<ScopedContext> = vec![app.clone()];

    for op in ops.into_iter().take(64) {
        let Some(current) = stack.last().cloned() else {
            break;
        };
        match op {
            Op::Child(id) => {
                let child = current.create_child(Session { id }).expect("session scope");
                assert_eq!(child.depth(), current.depth() + 1);
                stack.push(child);
            }
            Op::Up => {
                if stack.len() > 1 {
                    stack.pop();
                }
            }
            Op::FindShared => {
                let found = current.find::<Shared>().expect("inherited component");
                assert!(Arc::ptr_eq(&found, &shared));
            }
            Op::FindCart => {
                let cart = current.find::<Cart>();
                if current.scope_type() == TypeKey::of::<Application>() {
                    assert!(cart.is_none());
                } else {
                    let cart = cart.expect("session component");
                    let session = cart.session.get().expect("scope value injected");
                    let own = current.scope_as::<Session>().expect("session value");
                    assert_eq!(session.id, own.id);
                    assert!(Arc::ptr_eq(&current.find::<Cart>().unwrap(), &cart));
                }
            }
            Op::DropCurrent => {
                if stack.len() > 1 {
                    let weak = current.downgrade();
                    drop(current);
                    stack.pop();
                    // components hold no strong handle to their context
                    assert!(weak.upgrade().is_none());
                }
            }
        }
    }

    assert!(app.find::<Cart>().is_none());
});
