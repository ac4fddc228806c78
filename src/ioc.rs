//! Process-wide façade
//!
//! Free functions over the application context of one installed
//! [`Runtime`]. Install it once at startup:
//!
//! ```rust
//! use scoped_injector::{ioc, Application, Runtime, TypeTable};
//!
//! #[derive(Default)]
//! struct Settings;
//!
//! let mut table = TypeTable::new();
//! table.component::<Settings>().in_scope::<Application>().done();
//! ioc::install(Runtime::new(table)).unwrap();
//!
//! assert!(ioc::find::<Settings>().is_some());
//! ```

use crate::component_set::ComponentSet;
use crate::context::{Found, ScopedContext};
use crate::descriptor::{TypeKey, TypeRef};
use crate::error::{DiError, Result};
use crate::runtime::Runtime;
use crate::scope::Scope;
use once_cell::sync::OnceCell;
use std::io;
use std::sync::Arc;

#[cfg(feature = "logging")]
use crate::logging::TARGET;
#[cfg(feature = "logging")]
use tracing::info;

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Install the process-wide runtime. Fails if one is already installed.
pub fn install(runtime: Runtime) -> Result<()> {
    RUNTIME.set(runtime).map_err(|_| DiError::AlreadyInstalled)?;

    #[cfg(feature = "logging")]
    info!(target: TARGET, "Installed process-wide runtime");

    Ok(())
}

/// The installed runtime.
pub fn runtime() -> Result<&'static Runtime> {
    RUNTIME.get().ok_or(DiError::NoProvider)
}

/// The application context of the installed runtime.
pub fn try_context() -> Result<ScopedContext> {
    runtime().map(Runtime::application)
}

/// The application context of the installed runtime.
///
/// # Panics
///
/// Panics if no runtime was installed.
#[track_caller]
pub fn context() -> ScopedContext {
    match try_context() {
        Ok(context) => context,
        Err(err) => panic!("{err}"),
    }
}

/// See [`ScopedContext::find`].
pub fn find<T: ?Sized + Send + Sync + 'static>() -> Option<Arc<T>> {
    context().find::<T>()
}

/// See [`ScopedContext::find_next`].
pub fn find_next<T: ?Sized + Send + Sync + 'static>(priority: i32) -> Option<Arc<T>> {
    context().find_next::<T>(priority)
}

/// See [`ScopedContext::find_all`].
pub fn find_all<T: ?Sized + Send + Sync + 'static>() -> Vec<Arc<T>> {
    context().find_all::<T>()
}

/// See [`ScopedContext::find_generic`].
pub fn find_generic(service: &TypeRef) -> Option<Found> {
    context().find_generic(service)
}

/// See [`ScopedContext::find_next_generic`].
pub fn find_next_generic(service: &TypeRef, priority: i32) -> Option<Found> {
    context().find_next_generic(service, priority)
}

/// See [`ScopedContext::exists`].
pub fn exists(service: &TypeRef) -> bool {
    context().exists(service)
}

/// See [`ScopedContext::exists_component`].
pub fn exists_component(component: &TypeKey) -> bool {
    context().exists_component(component)
}

/// The application context has no parent.
pub fn parent() -> Option<ScopedContext> {
    context().parent().cloned()
}

/// See [`ScopedContext::create_child`].
pub fn create_child<S: Scope>(scope: S) -> Result<ScopedContext> {
    try_context()?.create_child(scope)
}

/// See [`ScopedContext::class_repository`].
pub fn class_repository() -> Arc<ComponentSet> {
    Arc::clone(context().class_repository())
}

/// See [`ScopedContext::print_priorities`].
pub fn print_priorities(service: &TypeRef, out: &mut dyn io::Write) -> io::Result<()> {
    context().print_priorities(service, out)
}
