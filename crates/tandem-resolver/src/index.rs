//! Lazily built, per-resolution candidate lists.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tandem_core::package::PackageId;
use tandem_core::spec::VersionSpec;
use tandem_core::version::{Candidate, Source};
use tracing::trace;

use crate::graph::RequestGraph;

/// Candidates per package, highest version first.
///
/// A package's list is built on its first lookup and cached for the rest of
/// the resolution.
pub struct CandidateIndex<'g> {
    graph: &'g RequestGraph,
    cache: HashMap<PackageId, Arc<[Candidate]>>,
    lookups: usize,
}

impl<'g> CandidateIndex<'g> {
    pub fn new(graph: &'g RequestGraph) -> Self {
        Self {
            graph,
            cache: HashMap::new(),
            lookups: 0,
        }
    }

    /// Candidates a request could be satisfied by, before filtering.
    ///
    /// A local spec stands for exactly one candidate, its bound location.
    pub fn candidates_for(&mut self, id: &PackageId, spec: &VersionSpec) -> Arc<[Candidate]> {
        match spec.local_source() {
            Some(source) => Arc::from([Candidate::new(id.clone(), source)]),
            None => self.candidates(id),
        }
    }

    /// Every published candidate of `id`, highest first. Empty for unknown
    /// packages.
    pub fn candidates(&mut self, id: &PackageId) -> Arc<[Candidate]> {
        if let Some(cached) = self.cache.get(id) {
            return Arc::clone(cached);
        }
        self.lookups += 1;

        let mut versions = self.graph.versions(id).to_vec();
        versions.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
        versions.dedup();
        let candidates: Arc<[Candidate]> = versions
            .into_iter()
            .map(|version| Candidate::new(id.clone(), Source::Version(version)))
            .collect();
        trace!(package = %id, candidates = candidates.len(), "indexed candidates");

        self.cache.insert(id.clone(), Arc::clone(&candidates));
        candidates
    }

    /// Number of packages whose candidate list had to be built.
    pub fn lookups(&self) -> usize {
        self.lookups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::registry::MemoryRegistry;
    use std::path::PathBuf;
    use tandem_core::config::ResolverConfig;
    use tandem_core::manifest::Manifest;
    use tandem_core::package::Scope;

    async fn graph() -> RequestGraph {
        let registry = MemoryRegistry::new()
            .publish(Manifest::new("lib").with_version("1.2.0"))
            .publish(Manifest::new("lib").with_version("1.10.0"))
            .publish(Manifest::new("lib").with_version("1.9.0"));
        let root = Manifest::new("root").depend("lib", "*");
        GraphBuilder::new(Arc::new(registry), &ResolverConfig::default())
            .build(&root)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn candidates_are_highest_first_and_cached() {
        let graph = graph().await;
        let mut index = CandidateIndex::new(&graph);
        let lib = PackageId::registry("lib");

        let first = index.candidates(&lib);
        let rendered: Vec<String> = first.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["lib@1.10.0", "lib@1.9.0", "lib@1.2.0"]);

        index.candidates(&lib);
        assert_eq!(index.lookups(), 1);
    }

    #[tokio::test]
    async fn local_specs_stand_for_one_candidate() {
        let graph = graph().await;
        let mut index = CandidateIndex::new(&graph);
        let id = PackageId::registry("app");
        let spec = VersionSpec::parse("link:packages/app", Scope::Registry).unwrap();

        let candidates = index.candidates_for(&id, &spec);
        assert_eq!(
            candidates.as_ref(),
            [Candidate::new(id, Source::Link(PathBuf::from("packages/app")))]
        );
        assert_eq!(index.lookups(), 0);
    }

    #[tokio::test]
    async fn unknown_packages_have_no_candidates() {
        let graph = graph().await;
        let mut index = CandidateIndex::new(&graph);
        assert!(index.candidates(&PackageId::opam("lib")).is_empty());
    }
}
