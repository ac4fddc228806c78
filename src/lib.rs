//! # Scoped Injector - Scoped IoC Runtime with Ranked Providers
//!
//! An inversion-of-control runtime driven by a component manifest. Every
//! component belongs to a scope; a [`ScopedContext`] per scope value builds
//! components lazily, injects their declared attributes and runs their
//! post-construct hooks. Services (traits, embedded ancestors, parameterized
//! shapes) may have many providers, ranked by priority.
//!
//! ## Features
//!
//! - **Manifest driven** - components are discovered from `type = scope`
//!   entries, merged from any number of sources
//! - **Ranked providers** - `find` takes the highest ranked provider,
//!   `find_next` the next one down, `find_all` every one in rank order
//! - **Hierarchical scopes** - child contexts fall back to their parent;
//!   parents never see their children
//! - **Cycle tolerant** - instances are published before injection, so a
//!   dependency cycle receives the partially built instance
//! - **Lock-free reads** - `DashMap` instance containers with at-most-once
//!   construction per type and context
//! - **Observable** - `tracing` events, plus lifecycle listeners
//!
//! ## Quick Start
//!
//! ```rust
//! use scoped_injector::{Application, Runtime, Scope, Slot, TypeTable};
//! use std::sync::Arc;
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self, name: &str) -> String;
//! }
//!
//! #[derive(Default)]
//! struct Polite;
//! impl Greeter for Polite {
//!     fn greet(&self, name: &str) -> String {
//!         format!("Good day, {name}")
//!     }
//! }
//!
//! struct Request {
//!     user: String,
//! }
//! impl Scope for Request {}
//!
//! #[derive(Default)]
//! struct Handler {
//!     greeter: Slot<Arc<dyn Greeter>>,
//!     request: Slot<Arc<Request>>,
//! }
//!
//! let mut table = TypeTable::new();
//! table
//!     .component::<Polite>()
//!     .in_scope::<Application>()
//!     .implements::<dyn Greeter>(|c| c)
//!     .done();
//! table.scope::<Request>().done();
//! table
//!     .component::<Handler>()
//!     .in_scope::<Request>()
//!     .inject::<dyn Greeter>("greeter", |h| &h.greeter)
//!     .inject::<Request>("request", |h| &h.request)
//!     .done();
//!
//! let runtime = Runtime::new(table);
//! let request = runtime
//!     .application()
//!     .create_child(Request { user: "Ada".into() })
//!     .unwrap();
//!
//! let handler = request.find::<Handler>().unwrap();
//! let greeter = handler.greeter.get().unwrap();
//! let user = &handler.request.get().unwrap().user;
//! assert_eq!(greeter.greet(user), "Good day, Ada");
//! ```
//!
//! ## Ranked Providers
//!
//! Smaller priorities rank higher; components without a priority rank
//! last. A provider can delegate to the next one down with
//! [`ComponentBuilder::inject_next`]:
//!
//! ```rust
//! use scoped_injector::{Application, Runtime, TypeTable};
//!
//! trait Codec: Send + Sync {
//!     fn name(&self) -> &'static str;
//! }
//!
//! #[derive(Default)]
//! struct Fast;
//! impl Codec for Fast {
//!     fn name(&self) -> &'static str { "fast" }
//! }
//!
//! #[derive(Default)]
//! struct Safe;
//! impl Codec for Safe {
//!     fn name(&self) -> &'static str { "safe" }
//! }
//!
//! let mut table = TypeTable::new();
//! table.component::<Safe>().in_scope::<Application>().priority(10)
//!     .implements::<dyn Codec>(|c| c).done();
//! table.component::<Fast>().in_scope::<Application>().priority(1)
//!     .implements::<dyn Codec>(|c| c).done();
//!
//! let app = Runtime::new(table).application();
//! assert_eq!(app.find::<dyn Codec>().unwrap().name(), "fast");
//! assert_eq!(app.find_next::<dyn Codec>(1).unwrap().name(), "safe");
//!
//! let names: Vec<_> = app.find_all::<dyn Codec>().iter().map(|c| c.name()).collect();
//! assert_eq!(names, ["fast", "safe"]);
//! ```
//!
//! ## Logging
//!
//! Events use the `scoped_injector` target behind the default `logging`
//! feature. See the [`logging`] module for subscriber setup.

mod cache;
mod component_set;
mod context;
mod descriptor;
mod error;
mod instantiator;
pub mod ioc;
#[cfg(feature = "logging")]
pub mod logging;
mod manifest;
mod metadata;
mod registry;
mod runtime;
mod scope;
mod storage;
mod table;

pub use cache::ScopeCache;
pub use component_set::ComponentSet;
pub use context::{Found, Resolved, ScopedContext, WeakContext};
pub use descriptor::{
    Instance, Object, Rank, ServiceRef, TypeKey, TypeRef, UNRANKED, ranks_below, sort_by_rank,
};
pub use error::{BoxError, DiError, Result};
pub use manifest::Manifest;
pub use metadata::{
    Ancestor, Capability, ComponentRef, Constructor, ContextListener, Hook, Hop,
    InjectableAttribute, MetadataExtractor, PostConstruct, PriorityMode, Project, Setter, Slot,
    TypeMetadata, ViewFn,
};
pub use registry::ServiceRegistry;
pub use runtime::{Runtime, RuntimeBuilder};
pub use scope::{Application, Scope, ScopeValue};
pub use table::{ComponentBuilder, TypeTable};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Application, ContextListener, DiError, Result, Runtime, Scope, ScopedContext, Slot,
        TypeKey, TypeRef, TypeTable, WeakContext,
    };
    pub use std::sync::Arc;
}
