use serde::{Deserialize, Serialize};
use std::path::Path;

use tandem_util::errors::TandemError;

use crate::package::{PackageId, Scope};
use crate::version::{Candidate, Source};

/// Exported solution: one locked entry per resolved package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lockfile {
    pub root: String,
    #[serde(default)]
    pub package: Vec<LockedPackage>,
}

/// A single locked package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPackage {
    /// Display name, `@opam/`-prefixed for opam packages.
    pub name: String,
    /// Rendered source: `1.0.0`, `opam:1.0.0`, `link:dir` or `path:dir`.
    pub source: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Lockfile {
    pub fn from_toml_str(content: &str) -> Result<Self, TandemError> {
        toml::from_str(content).map_err(|e| TandemError::Lockfile {
            message: format!("Failed to parse lockfile: {e}"),
        })
    }

    /// Load and parse a lockfile from the given path.
    pub fn from_path(path: &Path) -> Result<Self, TandemError> {
        let content = std::fs::read_to_string(path).map_err(|e| TandemError::Lockfile {
            message: format!("Failed to read lockfile: {e}"),
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize the lockfile to a pretty-printed TOML string.
    pub fn to_string_pretty(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// The locked candidates, in lockfile order.
    pub fn pinned(&self) -> Result<Vec<Candidate>, TandemError> {
        self.package
            .iter()
            .map(|locked| {
                let id = PackageId::parse(&locked.name, Scope::Registry);
                let source = Source::parse(&locked.source).map_err(|e| TandemError::Lockfile {
                    message: format!("Bad source '{}' for {}: {e}", locked.source, locked.name),
                })?;
                Ok(Candidate::new(id, source))
            })
            .collect()
    }
}
