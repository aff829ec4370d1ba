//! Top-level resolution: discover the request graph, then solve it.

use std::sync::Arc;

use miette::Diagnostic;
use tandem_core::config::ResolverConfig;
use tandem_core::lockfile::Lockfile;
use tandem_core::manifest::{InvalidDependency, Manifest};
use tandem_util::errors::TandemError;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::graph::{GraphBuilder, Rejection};
use crate::registry::Registry;
use crate::report::Report;
use crate::solution::Solution;
use crate::solver::Solver;

/// Why `resolve` produced no solution.
#[derive(Debug, Error, Diagnostic)]
pub enum ResolveError {
    /// The requests have no solution.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Unsolvable(#[from] Report),

    /// A collaborator failed: registry lookup, lockfile, task join.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Tandem(#[from] TandemError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    InvalidRequest(#[from] InvalidDependency),

    #[error("{package} cannot depend on local source {dependency}")]
    #[diagnostic(
        code(tandem::resolve::local_from_registry),
        help("Only the root project and local packages may use link: and path: dependencies")
    )]
    LocalFromRegistry { package: String, dependency: String },

    #[error("resolution was cancelled")]
    #[diagnostic(code(tandem::resolve::cancelled))]
    Cancelled,
}

impl ResolveError {
    /// The failure report, when the requests were well formed but unsolvable.
    pub fn report(&self) -> Option<&Report> {
        match self {
            Self::Unsolvable(report) => Some(report),
            _ => None,
        }
    }
}

impl From<Rejection> for ResolveError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Invalid(err) => Self::InvalidRequest(err),
            Rejection::LocalSource {
                package,
                dependency,
            } => Self::LocalFromRegistry {
                package,
                dependency,
            },
        }
    }
}

/// Resolve all dependencies declared by `root`.
///
/// With a lockfile, its locked candidates are preferred wherever they still
/// satisfy every constraint. The search runs on the blocking pool; dropping
/// the returned future stops it.
pub async fn resolve(
    root: &Manifest,
    registry: Arc<dyn Registry>,
    config: &ResolverConfig,
    lockfile: Option<&Lockfile>,
) -> Result<Solution, ResolveError> {
    info!(root = %root.label(), "resolving dependencies");

    let graph = GraphBuilder::new(registry, config).build(root).await?;
    let pinned = lockfile.map(Lockfile::pinned).transpose()?;

    let cancel = CancellationToken::new();
    let _stop = cancel.clone().drop_guard();
    let (solution, lookups) = tokio::task::spawn_blocking(move || {
        let mut solver = Solver::new(&graph).with_cancellation(cancel);
        let solution = match pinned {
            Some(pinned) => solver.solve_with(pinned)?,
            None => solver.solve()?,
        };
        Ok::<_, ResolveError>((solution, solver.lookups()))
    })
    .await
    .map_err(|e| TandemError::Generic {
        message: format!("solver task failed: {e}"),
    })??;

    info!(packages = solution.len(), lookups, "resolution complete");
    Ok(solution)
}
