//! Diagnostics for resolutions that have no solution.
//!
//! The rendered text of every report is relied on verbatim by the command line
//! front end and its tests.

use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use tandem_core::package::PackageId;
use tandem_core::spec::VersionSpec;
use tandem_core::version::Candidate;
use tandem_util::fs::to_slash;
use thiserror::Error;

use crate::solver::Constraint;

/// Why a resolution failed. Only the first failure found is reported.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum Report {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Conflict(#[from] ConflictReport),

    #[error(transparent)]
    #[diagnostic(transparent)]
    NoMatch(#[from] NoMatchReport),

    #[error(transparent)]
    #[diagnostic(transparent)]
    MissingSource(#[from] MissingSourceReport),

    #[error(transparent)]
    #[diagnostic(transparent)]
    MissingMetadata(#[from] MissingMetadataReport),
}

/// Two constraints on one package that no single candidate can satisfy.
///
/// `first` is the constraint registered earlier.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("No solution found:\n\nConflicting constraints:\n  {first}\n  {second}\n")]
#[diagnostic(
    code(tandem::resolve::conflict),
    help("Relax one of the two constraints so that a common version exists")
)]
pub struct ConflictReport {
    pub first: Constraint,
    pub second: Constraint,
}

/// A constraint that no known candidate satisfies.
#[derive(Debug, Clone, PartialEq, Eq, Diagnostic)]
#[diagnostic(code(tandem::resolve::no_match))]
pub struct NoMatchReport {
    pub request: Constraint,
    /// Every known candidate for the target, highest first, regardless of
    /// the request.
    pub available: Vec<Candidate>,
}

impl fmt::Display for NoMatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No solution found:\n\nNo package matching:\n\n  {}\n", self.request)?;
        if !self.available.is_empty() {
            f.write_str("\nVersions available:\n\n")?;
            for candidate in &self.available {
                writeln!(f, "  {candidate}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for NoMatchReport {}

/// A `link:` or `path:` dependency whose location does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error(
    "error: path '{}' does not exist\n  resolving {target}@{spec}\n",
    to_slash(.location)
)]
#[diagnostic(code(tandem::resolve::missing_source))]
pub struct MissingSourceReport {
    /// Location relative to the project root.
    pub location: PathBuf,
    pub target: PackageId,
    pub spec: VersionSpec,
}

/// A dependency that has no manifest to read its own dependencies from.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("package {package} is missing, run 'tandem install' to fix that\n  processing package: {processing}\n")]
#[diagnostic(code(tandem::resolve::missing_metadata))]
pub struct MissingMetadataReport {
    pub package: String,
    /// Label of the package that declared the dependency.
    pub processing: String,
}
