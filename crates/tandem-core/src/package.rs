use std::fmt;

use serde::{Deserialize, Serialize};

/// Textual prefix marking a dependency name as belonging to the opam index.
pub const OPAM_PREFIX: &str = "@opam/";

/// Namespace a package name lives in.
///
/// The same textual name may exist in both namespaces; the two are distinct
/// packages and are never merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Registry,
    Opam,
}

impl Default for Scope {
    fn default() -> Self {
        Self::Registry
    }
}

/// A package name tagged with its namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageId {
    name: String,
    scope: Scope,
}

impl PackageId {
    pub fn new(name: impl Into<String>, scope: Scope) -> Self {
        Self {
            name: name.into(),
            scope,
        }
    }

    pub fn registry(name: impl Into<String>) -> Self {
        Self::new(name, Scope::Registry)
    }

    pub fn opam(name: impl Into<String>) -> Self {
        Self::new(name, Scope::Opam)
    }

    /// Parse a declared dependency name.
    ///
    /// Names carrying the `@opam/` prefix always land in the opam scope;
    /// anything else lands in `default_scope`, which is the flavour of the
    /// manifest declaring the dependency.
    pub fn parse(raw: &str, default_scope: Scope) -> Self {
        match raw.strip_prefix(OPAM_PREFIX) {
            Some(name) => Self::opam(name),
            None => Self::new(raw, default_scope),
        }
    }

    /// Name without any namespace prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            Scope::Registry => f.write_str(&self.name),
            Scope::Opam => write!(f, "{OPAM_PREFIX}{}", self.name),
        }
    }
}
