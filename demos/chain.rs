//! Ranked providers and delegation chains
//!
//! ```bash
//! cargo run --example chain
//! ```

use scoped_injector::{Application, Runtime, Slot, TypeRef, TypeTable};
use std::io;
use std::sync::Arc;

trait Filter: Send + Sync {
    fn apply(&self, input: &str) -> String;
}

#[derive(Default)]
struct Trim {
    next: Slot<Arc<dyn Filter>>,
}

#[derive(Default)]
struct Lowercase {
    next: Slot<Arc<dyn Filter>>,
}

#[derive(Default)]
struct Collapse;

impl Filter for Trim {
    fn apply(&self, input: &str) -> String {
        forward(&self.next, input.trim())
    }
}

impl Filter for Lowercase {
    fn apply(&self, input: &str) -> String {
        forward(&self.next, &input.to_lowercase())
    }
}

impl Filter for Collapse {
    fn apply(&self, input: &str) -> String {
        input.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn forward(next: &Slot<Arc<dyn Filter>>, input: &str) -> String {
    match next.get() {
        Some(next) => next.apply(input),
        None => input.to_string(),
    }
}

fn main() -> io::Result<()> {
    let mut table = TypeTable::new();
    table
        .component::<Collapse>()
        .in_scope::<Application>()
        .priority(30)
        .implements::<dyn Filter>(|c| c)
        .done();
    table
        .component::<Lowercase>()
        .in_scope::<Application>()
        .priority(20)
        .implements::<dyn Filter>(|c| c)
        .inject_next::<dyn Filter>("next", |f| &f.next)
        .done();
    table
        .component::<Trim>()
        .in_scope::<Application>()
        .priority(10)
        .implements::<dyn Filter>(|c| c)
        .inject_next::<dyn Filter>("next", |f| &f.next)
        .done();

    let app = Runtime::new(table).application();

    println!("Providers of dyn Filter:");
    app.print_priorities(&TypeRef::of::<dyn Filter>(), &mut io::stdout())?;

    let head = app.find::<dyn Filter>().expect("a filter is registered");
    let output = head.apply("   Hello    SCOPED   World  ");
    println!("\nChain output: {output:?}");
    assert_eq!(output, "hello scoped world");

    // Skip the head of the chain
    let tail = app.find_next::<dyn Filter>(10).expect("a lower ranked filter");
    println!("From priority 20 on: {:?}", tail.apply("  Mixed Case  "));

    Ok(())
}
