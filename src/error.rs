//! Error types for the IoC runtime
//!
//! Only structural misuse reaches the caller as an `Err`. Construction and
//! injection failures are built as `DiError` values too, but the runtime logs
//! and absorbs them: a lookup that cannot be satisfied is simply `None`.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by fallible constructors and hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in IoC runtime operations
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// A child context was requested without a scope value
    #[error("Scope value is missing")]
    MissingScope,

    /// The scope value cannot identify a scope (e.g. the universal base type)
    #[error("Invalid scope type: {type_name}")]
    InvalidScope { type_name: &'static str },

    /// The root scope was requested as a child scope
    #[error("The root scope {type_name} cannot be re-created as a child scope")]
    RootScope { type_name: &'static str },

    /// No runtime was installed before the global context was requested
    #[error(
        "IoC container provider was not found. Build a Runtime and register it with ioc::install() before requesting the context"
    )]
    NoProvider,

    /// A runtime was already installed globally
    #[error("An IoC container provider is already installed")]
    AlreadyInstalled,

    /// A component could not be constructed
    #[error("Failed to create component {type_name}: {reason}")]
    CreationFailed {
        type_name: &'static str,
        reason: String,
    },

    /// A dependency could not be injected into an attribute
    #[error("Cannot inject {attribute} of {type_name}: {reason}")]
    Injection {
        type_name: &'static str,
        attribute: &'static str,
        reason: String,
    },

    /// A manifest line could not be parsed
    #[error("Malformed manifest entry at line {line}: {reason}")]
    Manifest { line: usize, reason: String },

    /// A manifest file could not be read
    #[error("Cannot read manifest {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Internal error
    #[error("Internal DI error: {0}")]
    Internal(String),
}

impl DiError {
    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed(type_name: &'static str, reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            type_name,
            reason: reason.into(),
        }
    }

    /// Create an Injection error
    #[inline]
    pub fn injection(
        type_name: &'static str,
        attribute: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::Injection {
            type_name,
            attribute,
            reason: reason.into(),
        }
    }

    /// Create a Manifest error
    #[inline]
    pub fn manifest(line: usize, reason: impl Into<String>) -> Self {
        Self::Manifest {
            line,
            reason: reason.into(),
        }
    }

    /// Create an Io error for a manifest path
    #[inline]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Whether this error reports a misuse of the API rather than a missing
    /// optional component.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::MissingScope
                | Self::InvalidScope { .. }
                | Self::RootScope { .. }
                | Self::NoProvider
                | Self::AlreadyInstalled
        )
    }
}

/// Extract a printable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;
