//! Example demonstrating logging capabilities
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example logging --features logging-json
//! ```
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example logging --features logging-pretty
//! ```

use scoped_injector::{Application, Runtime, Scope, Slot, TypeTable};
use std::sync::Arc;

#[allow(dead_code)]
struct Database {
    url: String,
}

#[derive(Default)]
struct UserService {
    database: Slot<Arc<Database>>,
    audit: Slot<Arc<AuditLog>>,
}

#[derive(Default)]
struct AuditLog;

#[allow(dead_code)]
struct Request {
    id: String,
}
impl Scope for Request {}

#[derive(Default)]
struct RequestHandler {
    users: Slot<Arc<UserService>>,
    request: Slot<Arc<Request>>,
}

fn main() {
    // JSON with logging-json, pretty with logging-pretty
    scoped_injector::logging::builder().trace().injector_only().init();

    println!("=== Scoped Injector Logging Demo ===\n");

    let mut table = TypeTable::new();
    table
        .component_with(|| Database {
            url: "postgres://localhost/mydb".into(),
        })
        .in_scope::<Application>()
        .eager()
        .done();
    // AuditLog is registered but never scoped: "Attribute left unset"
    table.component::<AuditLog>().done();
    table
        .component::<UserService>()
        .in_scope::<Application>()
        .inject::<Database>("database", |u| &u.database)
        .inject::<AuditLog>("audit", |u| &u.audit)
        .done();
    table.scope::<Request>().done();
    table
        .component::<RequestHandler>()
        .in_scope::<Request>()
        .inject::<UserService>("users", |h| &h.users)
        .inject::<Request>("request", |h| &h.request)
        .done();

    // logs: "Registered type" per entry above, then "Creating IoC runtime"
    let runtime = Runtime::new(table);

    // logs: "Activating scoped context", "Created component" for the eager database
    let app = runtime.application();

    // logs: "Resolving service", "Created component"
    let users = app.find::<UserService>().unwrap();
    assert!(users.database.get().is_some());
    assert!(users.audit.get().is_none());

    // logs: "Activating scoped context" at depth 1
    let request = app
        .create_child(Request {
            id: "req-12345".into(),
        })
        .unwrap();

    // logs: "Falling back to parent context" while injecting UserService
    let handler = request.find::<RequestHandler>().unwrap();
    assert!(Arc::ptr_eq(handler.users.get().unwrap(), &users));
    assert!(handler.request.get().is_some());

    // unknown services resolve to nothing
    assert!(request.find::<u64>().is_none());

    println!("\n=== Demo Complete ===");
    println!("Check the log output above to see structured logging in action!");
    println!("\nTip: Use --features logging-json for production (JSON output)");
    println!("     Use --features logging-pretty for development (colorful output)");
}
