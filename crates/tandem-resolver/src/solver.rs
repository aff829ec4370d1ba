//! Backtracking search for one candidate per reachable package.
//!
//! Local `link:`/`path:` sources are singletons, so they are pinned first, in
//! breadth-first discovery order. The search then walks requests depth first:
//! a package's requests in declaration order, and the requests of a freshly
//! chosen candidate before the remaining requests of its ancestors. A request
//! becomes a [`Constraint`] when the walk reaches it, and is checked against
//! the constraints registered on its target before it.
//!
//! Each branch works on its own [`Frame`] of persistent collections, so
//! backtracking is dropping the frame. A failed branch carries the packages
//! whose choices it depends on: a constraint depends on every package in its
//! chain. A decision that is not among them cannot fix the failure, so the
//! search jumps straight past it.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use im::{OrdMap, OrdSet, Vector};
use indexmap::IndexMap;
use tandem_core::manifest::Dependency;
use tandem_core::package::PackageId;
use tandem_core::spec::VersionSpec;
use tandem_core::version::{Candidate, Source};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::graph::{Declared, RequestGraph};
use crate::index::CandidateIndex;
use crate::report::{ConflictReport, MissingMetadataReport, NoMatchReport, Report};
use crate::resolver::ResolveError;
use crate::solution::{ResolvedPackage, Solution};

/// The packages a request was reached through, starting at the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    root: String,
    path: Vector<PackageId>,
}

impl Chain {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            root: name.into(),
            path: Vector::new(),
        }
    }

    /// The chain for requests declared by `id`.
    pub fn then(&self, id: &PackageId) -> Self {
        let mut path = self.path.clone();
        path.push_back(id.clone());
        Self {
            root: self.root.clone(),
            path,
        }
    }

    /// Packages between the root and the request, root side first.
    pub fn packages(&self) -> impl Iterator<Item = &PackageId> {
        self.path.iter()
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        for id in &self.path {
            write!(f, " -> {id}")?;
        }
        Ok(())
    }
}

/// A request the search has reached, with the chain it was reached through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub chain: Chain,
    /// Label of the declaring package: `name@version`, or the root label.
    pub declarer: String,
    pub target: PackageId,
    pub spec: VersionSpec,
}

impl Constraint {
    pub fn new(
        chain: Chain,
        declarer: impl Into<String>,
        target: PackageId,
        spec: VersionSpec,
    ) -> Self {
        Self {
            chain,
            declarer: declarer.into(),
            target,
            spec,
        }
    }

    pub fn admits(&self, source: &Source) -> bool {
        self.spec.satisfied_by(source)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}@{}", self.chain, self.target, self.spec)
    }
}

/// Every package the given constraints were reached through.
fn blame<'a>(constraints: impl IntoIterator<Item = &'a Constraint>) -> OrdSet<PackageId> {
    constraints
        .into_iter()
        .flat_map(|constraint| constraint.chain.packages().cloned())
        .collect()
}

/// A failed branch.
#[derive(Debug)]
struct Failure {
    error: ResolveError,
    /// Packages whose choice this failure depends on.
    culprits: OrdSet<PackageId>,
}

impl Failure {
    fn new(report: impl Into<Report>, culprits: OrdSet<PackageId>) -> Self {
        Self {
            error: ResolveError::Unsolvable(report.into()),
            culprits,
        }
    }

    fn cancelled() -> Self {
        Self {
            error: ResolveError::Cancelled,
            culprits: OrdSet::new(),
        }
    }

    fn is_cancelled(&self) -> bool {
        matches!(self.error, ResolveError::Cancelled)
    }

    fn involves(&self, id: &PackageId) -> bool {
        self.culprits.contains(id)
    }
}

#[derive(Debug, Clone)]
struct Choice {
    candidate: Candidate,
    selected_by: Constraint,
}

#[derive(Debug, Clone)]
struct Pending {
    chain: Chain,
    declarer: String,
    dependency: Dependency,
}

impl Pending {
    fn constraint(self) -> Constraint {
        Constraint::new(
            self.chain,
            self.declarer,
            self.dependency.id,
            self.dependency.spec,
        )
    }
}

#[derive(Debug, Clone, Default)]
struct Frame {
    assignment: OrdMap<PackageId, Choice>,
    registered: OrdMap<PackageId, Vector<Constraint>>,
    expanded: OrdSet<PackageId>,
    agenda: Vector<Pending>,
}

impl Frame {
    /// Record a constraint, failing on the first earlier constraint on the
    /// same target that no candidate could satisfy together with it.
    fn register(&mut self, constraint: &Constraint) -> Result<(), Failure> {
        let mut earlier = self
            .registered
            .get(&constraint.target)
            .cloned()
            .unwrap_or_default();
        if let Some(conflicting) = earlier.iter().find(|c| !c.spec.compatible(&constraint.spec)) {
            debug!(first = %conflicting, second = %constraint, "constraints cannot both hold");
            return Err(Failure::new(
                ConflictReport {
                    first: conflicting.clone(),
                    second: constraint.clone(),
                },
                blame([conflicting, constraint]),
            ));
        }
        earlier.push_back(constraint.clone());
        self.registered.insert(constraint.target.clone(), earlier);
        Ok(())
    }

    fn admits_all(&self, candidate: &Candidate) -> bool {
        self.registered
            .get(&candidate.id)
            .map_or(true, |constraints| {
                constraints.iter().all(|c| c.admits(&candidate.source))
            })
    }

    /// Packages the constraints registered on `id` depend on.
    fn blame_on(&self, id: &PackageId) -> OrdSet<PackageId> {
        blame(self.registered.get(id).into_iter().flatten())
    }

    /// Queue the requests of `candidate` ahead of everything already pending.
    fn schedule(&mut self, reached_by: &Constraint, candidate: &Candidate, requests: &[Dependency]) {
        let chain = reached_by.chain.then(&candidate.id);
        let declarer = candidate.to_string();
        for dependency in requests.iter().rev() {
            self.agenda.push_front(Pending {
                chain: chain.clone(),
                declarer: declarer.clone(),
                dependency: dependency.clone(),
            });
        }
    }
}

/// Finds a [`Solution`] for a request graph, or the first [`Report`] explaining
/// why there is none.
pub struct Solver<'g> {
    graph: &'g RequestGraph,
    index: CandidateIndex<'g>,
    preferred: HashMap<PackageId, Candidate>,
    cancel: Option<CancellationToken>,
}

impl<'g> Solver<'g> {
    pub fn new(graph: &'g RequestGraph) -> Self {
        Self {
            graph,
            index: CandidateIndex::new(graph),
            preferred: HashMap::new(),
            cancel: None,
        }
    }

    /// Stop searching with [`ResolveError::Cancelled`] once `token` is
    /// cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Number of packages the candidate index was consulted for.
    pub fn lookups(&self) -> usize {
        self.index.lookups()
    }

    pub fn solve(&mut self) -> Result<Solution, ResolveError> {
        self.preferred.clear();
        self.run()
    }

    /// Solve, trying the candidates of a previous solution first.
    ///
    /// When the previous candidates still satisfy every constraint, the same
    /// solution comes back without consulting the candidate index.
    pub fn solve_with(
        &mut self,
        previous: impl IntoIterator<Item = Candidate>,
    ) -> Result<Solution, ResolveError> {
        self.preferred = previous
            .into_iter()
            .map(|candidate| (candidate.id.clone(), candidate))
            .collect();
        self.run()
    }

    fn run(&mut self) -> Result<Solution, ResolveError> {
        let mut frame = Frame::default();
        self.pin_locals(&mut frame).map_err(|failure| failure.error)?;

        let root = Chain::root(self.graph.root());
        for dependency in self.graph.root_requests().iter().rev() {
            frame.agenda.push_front(Pending {
                chain: root.clone(),
                declarer: self.graph.root_label().to_string(),
                dependency: dependency.clone(),
            });
        }

        let frame = self.search(frame).map_err(|failure| failure.error)?;
        Ok(self.assemble(frame))
    }

    fn pin_locals(&self, frame: &mut Frame) -> Result<(), Failure> {
        let mut queue = VecDeque::from([(
            Chain::root(self.graph.root()),
            self.graph.root_label().to_string(),
            Arc::clone(self.graph.root_requests()),
        )]);
        while let Some((chain, declarer, requests)) = queue.pop_front() {
            for dependency in requests.iter() {
                let Some(source) = dependency.spec.local_source() else {
                    continue;
                };
                let constraint = Constraint::new(
                    chain.clone(),
                    declarer.clone(),
                    dependency.id.clone(),
                    dependency.spec.clone(),
                );
                frame.register(&constraint)?;
                if frame.assignment.contains_key(&dependency.id) {
                    continue;
                }

                let candidate = Candidate::new(dependency.id.clone(), source);
                let next = self.requests_of(&candidate, &constraint)?;
                trace!(candidate = %candidate, "pinned local source");
                queue.push_back((chain.then(&dependency.id), candidate.to_string(), next));
                frame.assignment.insert(
                    dependency.id.clone(),
                    Choice {
                        candidate,
                        selected_by: constraint,
                    },
                );
            }
        }
        Ok(())
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    fn search(&mut self, mut frame: Frame) -> Result<Frame, Failure> {
        while let Some(pending) = frame.agenda.pop_front() {
            if self.cancelled() {
                return Err(Failure::cancelled());
            }
            let local = pending.dependency.spec.is_local();
            let constraint = pending.constraint();
            // Local requests were registered while pinning.
            if !local {
                frame.register(&constraint)?;
            }

            let Some(choice) = frame.assignment.get(&constraint.target).cloned() else {
                return self.decide(frame, constraint);
            };
            if !constraint.admits(&choice.candidate.source) {
                return Err(self.reject(&frame, constraint, &choice));
            }
            if local && frame.expanded.insert(constraint.target.clone()).is_none() {
                let requests = self.requests_of(&choice.candidate, &constraint)?;
                frame.schedule(&constraint, &choice.candidate, &requests);
            }
        }
        Ok(frame)
    }

    /// Choose a candidate for an unassigned target.
    ///
    /// The reported failure is always the one of the first candidate tried.
    /// A failure that does not involve the target ends the decision at once,
    /// since no other candidate can avoid it.
    fn decide(&mut self, frame: Frame, constraint: Constraint) -> Result<Frame, Failure> {
        let target = constraint.target.clone();
        let mut first: Option<Failure> = None;
        let mut culprits = OrdSet::new();

        let preferred = self
            .preferred
            .get(&target)
            .filter(|preferred| {
                self.graph.requests(preferred).is_some() && frame.admits_all(preferred)
            })
            .cloned();
        if let Some(preferred) = &preferred {
            trace!(candidate = %preferred, "replaying previous choice");
            match self.assign(frame.clone(), preferred.clone(), &constraint) {
                Ok(done) => return Ok(done),
                Err(failure) if failure.is_cancelled() || !failure.involves(&target) => {
                    return Err(failure)
                }
                Err(failure) => {
                    trace!(reason = %failure.error, "previous choice no longer holds");
                    culprits = culprits.union(failure.culprits.clone());
                    first = Some(failure);
                }
            }
        }

        let known = self.index.candidates_for(&target, &constraint.spec);
        let admitted: Vec<Candidate> = known
            .iter()
            .filter(|c| frame.admits_all(c))
            .cloned()
            .collect();
        if admitted.is_empty() {
            debug!(request = %constraint, known = known.len(), "no candidate matches");
            let culprits = frame.blame_on(&target);
            return Err(Failure::new(
                NoMatchReport {
                    request: constraint,
                    available: known.to_vec(),
                },
                culprits,
            ));
        }
        debug!(package = %target, candidates = admitted.len(), "deciding");

        for candidate in admitted {
            if preferred.as_ref() == Some(&candidate) {
                continue;
            }
            if first.is_some() {
                trace!(candidate = %candidate, "backtracking");
            }
            match self.assign(frame.clone(), candidate, &constraint) {
                Ok(done) => return Ok(done),
                Err(failure) if failure.is_cancelled() => return Err(failure),
                Err(failure) if !failure.involves(&target) => {
                    trace!(package = %target, "backjumping");
                    return Err(match first {
                        Some(earlier) => Failure {
                            error: earlier.error,
                            culprits: failure.culprits,
                        },
                        None => failure,
                    });
                }
                Err(failure) => {
                    culprits = culprits.union(failure.culprits.clone());
                    if first.is_none() {
                        first = Some(failure);
                    }
                }
            }
        }

        let error = match first {
            Some(failure) => failure.error,
            None => ResolveError::Unsolvable(
                NoMatchReport {
                    request: constraint,
                    available: known.to_vec(),
                }
                .into(),
            ),
        };
        Err(Failure {
            error,
            culprits: culprits.without(&target).union(frame.blame_on(&target)),
        })
    }

    fn assign(
        &mut self,
        mut frame: Frame,
        candidate: Candidate,
        constraint: &Constraint,
    ) -> Result<Frame, Failure> {
        let requests = self.requests_of(&candidate, constraint)?;
        trace!(candidate = %candidate, "trying");
        frame.expanded.insert(candidate.id.clone());
        frame.schedule(constraint, &candidate, &requests);
        frame.assignment.insert(
            candidate.id.clone(),
            Choice {
                candidate,
                selected_by: constraint.clone(),
            },
        );
        self.search(frame)
    }

    fn requests_of(
        &self,
        candidate: &Candidate,
        reached_by: &Constraint,
    ) -> Result<Arc<[Dependency]>, Failure> {
        let error = match self.graph.declared(candidate) {
            Some(Declared::Requests(requests)) => return Ok(Arc::clone(requests)),
            Some(Declared::Rejected(rejection)) => ResolveError::from(rejection.clone()),
            Some(Declared::Missing) | None => ResolveError::Unsolvable(
                MissingMetadataReport {
                    package: candidate.id.to_string(),
                    processing: reached_by.declarer.clone(),
                }
                .into(),
            ),
        };
        debug!(candidate = %candidate, reason = %error, "candidate unusable");
        let mut culprits = blame([reached_by]);
        culprits.insert(candidate.id.clone());
        Err(Failure { error, culprits })
    }

    /// Explain why an assigned package cannot take `constraint` as well.
    fn reject(&mut self, frame: &Frame, constraint: Constraint, choice: &Choice) -> Failure {
        let known = self.index.candidates_for(&constraint.target, &constraint.spec);
        if known.iter().any(|c| frame.admits_all(c)) {
            let mut culprits = blame([&choice.selected_by, &constraint]);
            culprits.insert(constraint.target.clone());
            Failure::new(
                ConflictReport {
                    first: choice.selected_by.clone(),
                    second: constraint,
                },
                culprits,
            )
        } else {
            let culprits = frame.blame_on(&constraint.target);
            Failure::new(
                NoMatchReport {
                    request: constraint,
                    available: known.to_vec(),
                },
                culprits,
            )
        }
    }

    fn assemble(&self, frame: Frame) -> Solution {
        let mut packages = IndexMap::new();
        for id in self.graph.discovered() {
            let Some(choice) = frame.assignment.get(id) else {
                continue;
            };
            let dependencies = self
                .graph
                .requests(&choice.candidate)
                .map(|requests| unique_targets(requests.as_ref()))
                .unwrap_or_default();
            let constraints = frame
                .registered
                .get(id)
                .map(|constraints| constraints.iter().cloned().collect())
                .unwrap_or_default();
            packages.insert(
                id.clone(),
                ResolvedPackage {
                    candidate: choice.candidate.clone(),
                    constraints,
                    dependencies,
                },
            );
        }
        Solution::new(
            self.graph.root().to_string(),
            self.graph.root_label().to_string(),
            unique_targets(self.graph.root_requests()),
            packages,
        )
    }
}

fn unique_targets(requests: &[Dependency]) -> Vec<PackageId> {
    let mut targets: Vec<PackageId> = Vec::with_capacity(requests.len());
    for request in requests {
        if !targets.contains(&request.id) {
            targets.push(request.id.clone());
        }
    }
    targets
}
