//! The outcome of a successful resolution.

use std::collections::HashSet;

use indexmap::IndexMap;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use tandem_core::lockfile::{LockedPackage, Lockfile};
use tandem_core::package::PackageId;
use tandem_core::version::Candidate;

use crate::report::{MissingMetadataReport, Report};
use crate::solver::Constraint;

/// A chosen candidate together with the constraints it satisfies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub candidate: Candidate,
    /// Every constraint on the package, in the order they were registered.
    pub constraints: Vec<Constraint>,
    /// Direct dependencies, in declaration order.
    pub dependencies: Vec<PackageId>,
}

/// One candidate per reachable package, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    root: String,
    root_label: String,
    root_dependencies: Vec<PackageId>,
    packages: IndexMap<PackageId, ResolvedPackage>,
}

impl Solution {
    pub(crate) fn new(
        root: String,
        root_label: String,
        root_dependencies: Vec<PackageId>,
        packages: IndexMap<PackageId, ResolvedPackage>,
    ) -> Self {
        Self {
            root,
            root_label,
            root_dependencies,
            packages,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn root_dependencies(&self) -> &[PackageId] {
        &self.root_dependencies
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn get(&self, id: &PackageId) -> Option<&ResolvedPackage> {
        self.packages.get(id)
    }

    pub fn candidate(&self, id: &PackageId) -> Option<&Candidate> {
        self.packages.get(id).map(|package| &package.candidate)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PackageId, &ResolvedPackage)> {
        self.packages.iter()
    }

    /// Chosen candidates in discovery order.
    pub fn candidates(&self) -> Vec<Candidate> {
        self.packages
            .values()
            .map(|package| package.candidate.clone())
            .collect()
    }

    /// Package ids, dependencies before their dependents. Packages that
    /// depend on each other share a group.
    pub fn build_order(&self) -> Vec<Vec<PackageId>> {
        let (graph, _) = self.graph();
        tarjan_scc(&graph)
            .into_iter()
            .map(|component| {
                let mut ids: Vec<&PackageId> =
                    component.into_iter().filter_map(|idx| graph[idx]).collect();
                ids.sort_by_key(|id| self.packages.get_index_of(*id));
                ids.into_iter().cloned().collect::<Vec<_>>()
            })
            .filter(|group| !group.is_empty())
            .collect()
    }

    /// Print the dependency tree under the root package.
    pub fn print_tree(&self, max_depth: Option<usize>) -> String {
        let (graph, root) = self.graph();
        let mut output = format!("{}\n", self.root_label);
        let mut visited = HashSet::new();
        visited.insert(root);

        let deps = children(&graph, root);
        let count = deps.len();
        for (i, child) in deps.into_iter().enumerate() {
            self.print_subtree(&graph, &mut output, child, "", i == count - 1, 1, max_depth, &mut visited);
        }
        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        graph: &DiGraph<Option<&PackageId>, ()>,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        if let Some(candidate) = graph[idx].and_then(|id| self.candidate(id)) {
            output.push_str(&format!("{prefix}{connector}{candidate}\n"));
        }

        if max_depth.is_some_and(|max| depth >= max) {
            return;
        }
        if !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let deps = children(graph, idx);
        let count = deps.len();
        for (i, child) in deps.into_iter().enumerate() {
            self.print_subtree(
                graph,
                output,
                child,
                &child_prefix,
                i == count - 1,
                depth + 1,
                max_depth,
                visited,
            );
        }

        visited.remove(&idx);
    }

    /// Check that every chosen dependency has its install-time metadata.
    ///
    /// Fails on the first missing one, walking the root and then each package
    /// in solution order.
    pub fn check_installed(&self, is_installed: impl Fn(&Candidate) -> bool) -> Result<(), Report> {
        let declarers = std::iter::once((self.root_label.clone(), &self.root_dependencies)).chain(
            self.packages
                .values()
                .map(|package| (package.candidate.to_string(), &package.dependencies)),
        );
        for (label, dependencies) in declarers {
            for id in dependencies {
                let Some(candidate) = self.candidate(id) else {
                    continue;
                };
                if !is_installed(candidate) {
                    return Err(MissingMetadataReport {
                        package: id.to_string(),
                        processing: label,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Export the solution as a lockfile, in solution order.
    pub fn to_lockfile(&self) -> Lockfile {
        Lockfile {
            root: self.root.clone(),
            package: self
                .packages
                .iter()
                .map(|(id, package)| LockedPackage {
                    name: id.to_string(),
                    source: package.candidate.source.to_string(),
                    dependencies: package.dependencies.iter().map(ToString::to_string).collect(),
                })
                .collect(),
        }
    }

    /// The root is the node with weight `None`.
    fn graph(&self) -> (DiGraph<Option<&PackageId>, ()>, NodeIndex) {
        let mut graph = DiGraph::new();
        let root = graph.add_node(None);
        let nodes: Vec<NodeIndex> = self
            .packages
            .keys()
            .map(|id| graph.add_node(Some(id)))
            .collect();

        let mut link = |from: NodeIndex, to: &PackageId| {
            if let Some(pos) = self.packages.get_index_of(to) {
                graph.add_edge(from, nodes[pos], ());
            }
        };
        for id in &self.root_dependencies {
            link(root, id);
        }
        for (pos, package) in self.packages.values().enumerate() {
            for id in &package.dependencies {
                link(nodes[pos], id);
            }
        }
        (graph, root)
    }
}

/// Direct dependencies of a node, in the order they were declared.
fn children(graph: &DiGraph<Option<&PackageId>, ()>, idx: NodeIndex) -> Vec<NodeIndex> {
    let mut deps: Vec<NodeIndex> = graph
        .edges_directed(idx, Direction::Outgoing)
        .map(|e| e.target())
        .collect();
    // petgraph yields outgoing edges newest first.
    deps.reverse();
    deps
}
