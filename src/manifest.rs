//! Component manifest
//!
//! A flat `component = scope` listing, one entry per line, UTF-8:
//!
//! ```text
//! # comments start with '#' or '!'
//! my_app::OrderService = scoped_injector::scope::Application
//! my_app::SessionCart=my_app::Session
//! ```
//!
//! Several manifests merge last-write-wins. Scope identifiers compare ASCII
//! case-insensitively.

use crate::error::{DiError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;

#[cfg(feature = "logging")]
use crate::logging::TARGET;
#[cfg(feature = "logging")]
use tracing::debug;

/// Mapping from component identifier to scope identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, String>,
}

impl Manifest {
    /// An empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse manifest text.
    ///
    /// ```rust
    /// use scoped_injector::Manifest;
    ///
    /// let manifest = Manifest::parse("# generated\napp::Orders = app::Request\n").unwrap();
    /// assert_eq!(manifest.scope_of("app::Orders"), Some("app::Request"));
    /// assert!(Manifest::parse("no separator here").is_err());
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let mut manifest = Self::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let Some(split) = line.find('=') else {
                return Err(DiError::manifest(index + 1, "missing '=' separator"));
            };
            let key = line[..split].trim();
            let value = line[split + 1..].trim();
            if key.is_empty() {
                return Err(DiError::manifest(index + 1, "empty component identifier"));
            }
            manifest.insert(key, value);
        }
        Ok(manifest)
    }

    /// Read and parse a manifest file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| DiError::io(path, e))?;
        let manifest = Self::parse(&text)?;

        #[cfg(feature = "logging")]
        debug!(
            target: TARGET,
            path = %path.display(),
            entries = manifest.len(),
            "Loaded component manifest"
        );

        Ok(manifest)
    }

    /// Add or replace one entry.
    pub fn insert(&mut self, component: impl Into<String>, scope: impl Into<String>) {
        self.entries.insert(component.into(), scope.into());
    }

    /// Merge `other` into this manifest; its entries win on conflicts.
    pub fn merge(&mut self, other: Manifest) {
        self.entries.extend(other.entries);
    }

    /// Scope identifier declared for a component.
    pub fn scope_of(&self, component: &str) -> Option<&str> {
        self.entries.get(component).map(String::as_str)
    }

    /// Component identifiers declared for `scope`, in identifier order.
    pub fn components_in<'a>(&'a self, scope: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(_, s)| s.eq_ignore_ascii_case(scope))
            .map(|(component, _)| component.as_str())
    }

    /// All `(component, scope)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(c, s)| (c.as_str(), s.as_str()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize in the manifest format.
    pub fn write_to(&self, out: &mut dyn io::Write) -> io::Result<()> {
        for (component, scope) in &self.entries {
            writeln!(out, "{component}={scope}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (component, scope) in &self.entries {
            writeln!(f, "{component}={scope}")?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut manifest = Manifest::new();
        for (component, scope) in iter {
            manifest.insert(component, scope);
        }
        manifest
    }
}
