use indexmap::IndexMap;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::package::{PackageId, Scope};
use crate::spec::{SpecError, VersionSpec};

/// A parsed package manifest as handed over by the manifest reader.
///
/// Dependencies keep their declaration order, which the resolver relies on for
/// deterministic diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Scope that unprefixed dependency names resolve into. Opam files declare
    /// opam packages by their bare name.
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub dependencies: IndexMap<String, String>,
}

/// A declared dependency with its target and spec interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub id: PackageId,
    pub spec: VersionSpec,
}

/// A dependency string in a manifest could not be interpreted.
#[derive(Debug, Clone, Error, Diagnostic)]
#[error("invalid dependency '{name}: {raw}' declared by {package}")]
#[diagnostic(
    code(tandem::manifest::invalid_dependency),
    help("Check the dependency declarations of the named package")
)]
pub struct InvalidDependency {
    pub package: String,
    pub name: String,
    pub raw: String,
    #[source]
    #[diagnostic_source]
    pub source: SpecError,
}

impl Manifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A manifest read from an opam file.
    pub fn opam(name: impl Into<String>) -> Self {
        Self {
            scope: Scope::Opam,
            ..Self::new(name)
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Declare a dependency. Redeclaring a name keeps its original position.
    pub fn depend(mut self, name: impl Into<String>, raw: impl Into<String>) -> Self {
        self.dependencies.insert(name.into(), raw.into());
        self
    }

    /// Interpret every declared dependency, in declaration order.
    pub fn parse_dependencies(&self) -> Result<Vec<Dependency>, InvalidDependency> {
        self.dependencies
            .iter()
            .map(|(name, raw)| {
                let id = PackageId::parse(name, self.scope);
                let spec = VersionSpec::parse(raw, id.scope()).map_err(|source| InvalidDependency {
                    package: self.name.clone(),
                    name: name.clone(),
                    raw: raw.clone(),
                    source,
                })?;
                Ok(Dependency { id, spec })
            })
            .collect()
    }

    /// `name@version`, or just the name for unversioned manifests.
    pub fn label(&self) -> String {
        match &self.version {
            Some(version) => format!("{}@{version}", self.name),
            None => self.name.clone(),
        }
    }
}
