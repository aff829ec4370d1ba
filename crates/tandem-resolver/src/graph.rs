//! Request graph discovery: a breadth-first walk over manifests that fans
//! registry calls out per level and folds the answers back in discovery order.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexSet;
use tandem_core::config::ResolverConfig;
use tandem_core::manifest::{Dependency, InvalidDependency, Manifest};
use tandem_core::package::PackageId;
use tandem_core::version::{Candidate, Source, Version};
use tandem_util::errors::TandemError;
use tandem_util::fs::{local_base, resolve_relative};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use crate::registry::Registry;
use crate::report::{MissingMetadataReport, MissingSourceReport, Report};
use crate::resolver::ResolveError;

/// Everything discovered about the packages reachable from a root manifest.
///
/// Local `link:`/`path:` locations in requests are relative to the project
/// root and normalised.
#[derive(Debug, Clone)]
pub struct RequestGraph {
    root: String,
    root_label: String,
    root_requests: Arc<[Dependency]>,
    discovered: IndexSet<PackageId>,
    versions: HashMap<PackageId, Vec<Version>>,
    manifests: HashMap<Candidate, Declared>,
}

/// What the manifest of one candidate contributes to the graph.
#[derive(Debug, Clone)]
pub(crate) enum Declared {
    Requests(Arc<[Dependency]>),
    /// The registry listed the version but had no manifest for it.
    Missing,
    /// The manifest declares something this candidate can never be chosen
    /// with. Only versioned candidates end up here.
    Rejected(Rejection),
}

/// Why a manifest's dependencies cannot be taken as declared.
#[derive(Debug, Clone)]
pub enum Rejection {
    Invalid(InvalidDependency),
    /// A registry or opam package naming a `link:`/`path:` source.
    LocalSource { package: String, dependency: String },
}

impl From<InvalidDependency> for Rejection {
    fn from(err: InvalidDependency) -> Self {
        Self::Invalid(err)
    }
}

impl RequestGraph {
    /// Name of the root package.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// `name@version` of the root package, or just its name.
    pub fn root_label(&self) -> &str {
        &self.root_label
    }

    pub fn root_requests(&self) -> &Arc<[Dependency]> {
        &self.root_requests
    }

    /// Every package named by some request, in breadth-first discovery order.
    pub fn discovered(&self) -> impl Iterator<Item = &PackageId> {
        self.discovered.iter()
    }

    /// Position of `id` in discovery order.
    pub fn discovery_index(&self, id: &PackageId) -> Option<usize> {
        self.discovered.get_index_of(id)
    }

    /// Versions the registry listed for `id`, in registry order.
    pub fn versions(&self, id: &PackageId) -> &[Version] {
        self.versions.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Requests declared by a candidate's manifest. `None` when the candidate
    /// has no usable manifest.
    pub fn requests(&self, candidate: &Candidate) -> Option<&Arc<[Dependency]>> {
        match self.manifests.get(candidate) {
            Some(Declared::Requests(requests)) => Some(requests),
            _ => None,
        }
    }

    pub(crate) fn declared(&self, candidate: &Candidate) -> Option<&Declared> {
        self.manifests.get(candidate)
    }
}

/// Who declared a batch of requests.
#[derive(Debug, Clone)]
enum Declarer {
    Root,
    Local(Candidate),
    Versioned(Candidate),
}

impl Declarer {
    fn for_candidate(candidate: Candidate) -> Self {
        match candidate.source {
            Source::Version(_) => Self::Versioned(candidate),
            Source::Link(_) | Source::Path(_) => Self::Local(candidate),
        }
    }
}

/// One manifest whose requests have not been walked yet.
struct Expansion {
    declarer: Declarer,
    label: String,
    requests: Arc<[Dependency]>,
}

/// A request for a local source seen for the first time.
struct LocalRequest {
    candidate: Candidate,
    dependency: Dependency,
    requested_by: String,
}

/// Something found while walking one level, in discovery order.
enum Discovery {
    Local(LocalRequest),
    Listed(PackageId),
}

/// A manifest to fetch, with what to report if it is absent.
enum Fetch {
    Local(LocalRequest),
    Versioned(Candidate),
}

impl Fetch {
    fn candidate(&self) -> &Candidate {
        match self {
            Self::Local(local) => &local.candidate,
            Self::Versioned(candidate) => candidate,
        }
    }
}

/// Walks manifests level by level, with at most `fetch-concurrency` registry
/// calls in flight.
pub struct GraphBuilder {
    registry: Arc<dyn Registry>,
    config: ResolverConfig,
    permits: Arc<Semaphore>,
}

impl GraphBuilder {
    pub fn new(registry: Arc<dyn Registry>, config: &ResolverConfig) -> Self {
        Self {
            registry,
            permits: Arc::new(Semaphore::new(config.fetch_permits())),
            config: config.clone(),
        }
    }

    /// Discover every package reachable from `root`.
    ///
    /// Stops at the first local source that does not exist. A versioned
    /// candidate whose manifest cannot be taken as declared is only recorded
    /// as rejected; the root and local packages fail the build instead.
    pub async fn build(&self, root: &Manifest) -> Result<RequestGraph, ResolveError> {
        let root_requests = declare(&Declarer::Root, root)?;
        let mut graph = RequestGraph {
            root: root.name.clone(),
            root_label: root.label(),
            root_requests: Arc::clone(&root_requests),
            discovered: IndexSet::new(),
            versions: HashMap::new(),
            manifests: HashMap::new(),
        };

        let mut listed: HashSet<PackageId> = HashSet::new();
        let mut level = vec![Expansion {
            declarer: Declarer::Root,
            label: root.label(),
            requests: root_requests,
        }];
        let mut depth = 0usize;

        while !level.is_empty() {
            debug!(depth, manifests = level.len(), "walking request level");

            let mut discoveries = Vec::new();
            let mut pending_locals: HashSet<Candidate> = HashSet::new();
            for expansion in &level {
                for dependency in expansion.requests.iter() {
                    graph.discovered.insert(dependency.id.clone());
                    match dependency.spec.local_source() {
                        Some(source) => {
                            let candidate = Candidate::new(dependency.id.clone(), source);
                            if graph.manifests.contains_key(&candidate)
                                || !pending_locals.insert(candidate.clone())
                            {
                                continue;
                            }
                            discoveries.push(Discovery::Local(LocalRequest {
                                candidate,
                                dependency: dependency.clone(),
                                requested_by: expansion.label.clone(),
                            }));
                        }
                        None => {
                            if listed.insert(dependency.id.clone()) {
                                discoveries.push(Discovery::Listed(dependency.id.clone()));
                            }
                        }
                    }
                }
            }

            self.check_locals(&discoveries).await?;
            let fetches = self.list_versions(discoveries, &mut graph).await?;
            level = self.fetch_manifests(fetches, &mut graph).await?;
            depth += 1;
        }

        debug!(
            packages = graph.discovered.len(),
            manifests = graph.manifests.len(),
            "request graph complete"
        );
        Ok(graph)
    }

    async fn check_locals(&self, discoveries: &[Discovery]) -> Result<(), ResolveError> {
        let locals: Vec<&LocalRequest> = discoveries
            .iter()
            .filter_map(|discovery| match discovery {
                Discovery::Local(local) => Some(local),
                Discovery::Listed(_) => None,
            })
            .collect();
        let paths: Vec<PathBuf> = locals
            .iter()
            .map(|local| {
                let location = local.candidate.source.location().unwrap_or(Path::new(""));
                self.config.on_disk(location)
            })
            .collect();

        let registry = Arc::clone(&self.registry);
        let present = fetch_all(&self.permits, paths, |path| {
            let registry = Arc::clone(&registry);
            async move { registry.exists(&path).await }
        })
        .await?;

        for (local, exists) in locals.into_iter().zip(present) {
            if exists? {
                continue;
            }
            let location = local
                .candidate
                .source
                .location()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            debug!(package = %local.candidate.id, location = %location.display(), "local source missing");
            return Err(Report::from(MissingSourceReport {
                location,
                target: local.dependency.id.clone(),
                spec: local.dependency.spec.clone(),
            })
            .into());
        }
        Ok(())
    }

    async fn list_versions(
        &self,
        discoveries: Vec<Discovery>,
        graph: &mut RequestGraph,
    ) -> Result<Vec<Fetch>, ResolveError> {
        let ids: Vec<PackageId> = discoveries
            .iter()
            .filter_map(|discovery| match discovery {
                Discovery::Listed(id) => Some(id.clone()),
                Discovery::Local(_) => None,
            })
            .collect();

        let registry = Arc::clone(&self.registry);
        let listings = fetch_all(&self.permits, ids, |id| {
            let registry = Arc::clone(&registry);
            async move { registry.versions(&id).await }
        })
        .await?;
        let mut listings = listings.into_iter();

        let mut fetches = Vec::new();
        for discovery in discoveries {
            let id = match discovery {
                Discovery::Local(local) => {
                    fetches.push(Fetch::Local(local));
                    continue;
                }
                Discovery::Listed(id) => id,
            };
            let raw_versions = listings.next().unwrap_or_else(|| Ok(Vec::new()))?;
            let mut versions = Vec::with_capacity(raw_versions.len());
            for raw in raw_versions {
                match Version::parse(&raw, id.scope()) {
                    Ok(version) => versions.push(version),
                    Err(e) => warn!(package = %id, version = %raw, "skipping unparseable version: {e}"),
                }
            }
            trace!(package = %id, versions = versions.len(), "listed versions");
            for version in &versions {
                let candidate = Candidate::new(id.clone(), Source::Version(version.clone()));
                if !graph.manifests.contains_key(&candidate) {
                    fetches.push(Fetch::Versioned(candidate));
                }
            }
            graph.versions.insert(id, versions);
        }
        Ok(fetches)
    }

    async fn fetch_manifests(
        &self,
        fetches: Vec<Fetch>,
        graph: &mut RequestGraph,
    ) -> Result<Vec<Expansion>, ResolveError> {
        let candidates: Vec<Candidate> = fetches.iter().map(|f| f.candidate().clone()).collect();
        let registry = Arc::clone(&self.registry);
        let manifests = fetch_all(&self.permits, candidates, |candidate| {
            let registry = Arc::clone(&registry);
            async move { registry.manifest(&candidate.id, &candidate.source).await }
        })
        .await?;

        let mut next = Vec::new();
        for (fetch, manifest) in fetches.into_iter().zip(manifests) {
            let manifest = manifest?;
            let candidate = fetch.candidate().clone();
            let Some(manifest) = manifest else {
                if let Fetch::Local(local) = fetch {
                    return Err(Report::from(MissingMetadataReport {
                        package: local.dependency.id.to_string(),
                        processing: local.requested_by,
                    })
                    .into());
                }
                trace!(candidate = %candidate, "no manifest published");
                graph.manifests.insert(candidate, Declared::Missing);
                continue;
            };

            let declarer = Declarer::for_candidate(candidate.clone());
            let requests = match declare(&declarer, &manifest) {
                Ok(requests) => requests,
                Err(rejection) if matches!(declarer, Declarer::Versioned(_)) => {
                    debug!(candidate = %candidate, ?rejection, "manifest rejected");
                    graph.manifests.insert(candidate, Declared::Rejected(rejection));
                    continue;
                }
                Err(rejection) => return Err(rejection.into()),
            };
            graph
                .manifests
                .insert(candidate.clone(), Declared::Requests(Arc::clone(&requests)));
            next.push(Expansion {
                declarer,
                label: candidate.to_string(),
                requests,
            });
        }
        Ok(next)
    }
}

fn declare(declarer: &Declarer, manifest: &Manifest) -> Result<Arc<[Dependency]>, Rejection> {
    relocate(declarer, manifest.parse_dependencies()?)
}

/// Resolve the local locations a declarer names against its base directory.
fn relocate(
    declarer: &Declarer,
    dependencies: Vec<Dependency>,
) -> Result<Arc<[Dependency]>, Rejection> {
    dependencies
        .into_iter()
        .map(|dependency| {
            let Some(location) = dependency.spec.location().map(Path::to_path_buf) else {
                return Ok(dependency);
            };
            let base = match declarer {
                Declarer::Root => PathBuf::new(),
                Declarer::Local(candidate) => candidate
                    .source
                    .location()
                    .map(local_base)
                    .unwrap_or_default(),
                Declarer::Versioned(candidate) => {
                    return Err(Rejection::LocalSource {
                        package: candidate.to_string(),
                        dependency: format!("{}@{}", dependency.id, dependency.spec),
                    })
                }
            };
            Ok(Dependency {
                id: dependency.id,
                spec: dependency.spec.relocate(resolve_relative(&base, &location)),
            })
        })
        .collect()
}

/// Run one registry call per item, bounded by `permits`, and return the
/// answers in item order regardless of completion order.
async fn fetch_all<I, T, F, Fut>(
    permits: &Arc<Semaphore>,
    items: Vec<I>,
    fetch: F,
) -> Result<Vec<T>, TandemError>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let count = items.len();
    let mut join_set = JoinSet::new();
    for (index, item) in items.into_iter().enumerate() {
        let sem = Arc::clone(permits);
        let task = fetch(item);
        join_set.spawn(async move {
            let _permit = sem.acquire().await;
            (index, task.await)
        });
    }

    let mut slots: Vec<Option<T>> = (0..count).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        let (index, value) = joined.map_err(|e| TandemError::Generic {
            message: format!("registry task failed: {e}"),
        })?;
        slots[index] = Some(value);
    }
    Ok(slots.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fetch_all_keeps_item_order() {
        let permits = Arc::new(Semaphore::new(4));
        let delays = vec![30u64, 0, 20, 10];
        let answers = fetch_all(&permits, delays, |delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            delay
        })
        .await
        .unwrap();
        assert_eq!(answers, [30, 0, 20, 10]);
    }

    #[tokio::test]
    async fn fetch_all_with_one_permit_still_completes() {
        let permits = Arc::new(Semaphore::new(1));
        let answers = fetch_all(&permits, (0..10).collect(), |n: u32| async move { n * 2 })
            .await
            .unwrap();
        assert_eq!(answers, (0..10).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn relocate_resolves_against_manifest_directory() {
        let declarer = Declarer::Local(Candidate::new(
            PackageId::registry("dep"),
            Source::Path(PathBuf::from("dep/dep.opam")),
        ));
        let manifest = Manifest::opam("dep").depend("other", "link:../other");
        let requests = relocate(&declarer, manifest.parse_dependencies().unwrap()).unwrap();
        assert_eq!(requests[0].spec.to_string(), "link:other");
    }

    #[test]
    fn relocate_rejects_local_sources_from_registry_packages() {
        let declarer = Declarer::Versioned(Candidate::new(
            PackageId::registry("lib"),
            Source::parse("1.0.0").unwrap(),
        ));
        let manifest = Manifest::new("lib").depend("other", "link:./other");
        let err = relocate(&declarer, manifest.parse_dependencies().unwrap()).unwrap_err();
        assert!(matches!(err, Rejection::LocalSource { .. }));
        let err = ResolveError::from(err);
        assert_eq!(
            err.to_string(),
            "lib@1.0.0 cannot depend on local source other@link:./other"
        );
    }
}
