//! Relational version ranges over either version scheme.
//!
//! A range is a disjunction of clauses, each clause a conjunction of primitive
//! comparators. Range sugar (carets, tildes, x-ranges, hyphens) is desugared by
//! the parsers in [`crate::spec`], so this module only sees `=`, `!=`, `>`,
//! `>=`, `<` and `<=`.

use std::fmt;

use crate::version::OpamVersion;

/// Primitive comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

/// A single `op version` comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Comparator<V> {
    pub op: Op,
    pub version: V,
}

impl<V: Ord> Comparator<V> {
    pub fn new(op: Op, version: V) -> Self {
        Self { op, version }
    }

    pub fn matches(&self, version: &V) -> bool {
        match self.op {
            Op::Eq => version == &self.version,
            Op::Ne => version != &self.version,
            Op::Gt => version > &self.version,
            Op::Ge => version >= &self.version,
            Op::Lt => version < &self.version,
            Op::Le => version <= &self.version,
        }
    }
}

/// A version type ranges can be built over.
pub trait RangeVersion: Ord + Clone + fmt::Display {
    /// Extra admission rule applied per clause on top of the comparators.
    fn admitted_by(&self, _clause: &[Comparator<Self>]) -> bool {
        true
    }
}

/// A prerelease only matches a clause that mentions a prerelease of the same
/// `major.minor.patch`.
impl RangeVersion for semver::Version {
    fn admitted_by(&self, clause: &[Comparator<Self>]) -> bool {
        if self.pre.is_empty() {
            return true;
        }
        clause.iter().any(|c| {
            !c.version.pre.is_empty()
                && c.version.major == self.major
                && c.version.minor == self.minor
                && c.version.patch == self.patch
        })
    }
}

impl RangeVersion for OpamVersion {}

/// A disjunction of conjunctive clauses. An empty clause admits everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Range<V> {
    clauses: Vec<Vec<Comparator<V>>>,
}

impl<V: RangeVersion> Range<V> {
    /// The unconstrained range.
    pub fn any() -> Self {
        Self {
            clauses: vec![Vec::new()],
        }
    }

    pub fn exact(version: V) -> Self {
        Self::from_clauses(vec![vec![Comparator::new(Op::Eq, version)]])
    }

    pub fn from_clauses(clauses: Vec<Vec<Comparator<V>>>) -> Self {
        Self { clauses }
    }

    pub fn clauses(&self) -> &[Vec<Comparator<V>>] {
        &self.clauses
    }

    pub fn is_any(&self) -> bool {
        self.clauses.iter().any(Vec::is_empty)
    }

    /// The version pinned by a range consisting of a single `=` comparator.
    pub fn as_exact(&self) -> Option<&V> {
        match self.clauses.as_slice() {
            [clause] => match clause.as_slice() {
                [Comparator { op: Op::Eq, version }] => Some(version),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn contains(&self, version: &V) -> bool {
        self.clauses.iter().any(|clause| {
            clause.iter().all(|c| c.matches(version)) && version.admitted_by(clause)
        })
    }

    /// Whether some version could satisfy both ranges, decided from the
    /// bounds alone without enumerating versions.
    pub fn intersects(&self, other: &Self) -> bool {
        self.clauses.iter().any(|a| {
            other
                .clauses
                .iter()
                .any(|b| satisfiable(a.iter().chain(b.iter())))
        })
    }
}

/// Tightest bounds of a conjunction, plus the points it excludes.
struct Interval<'a, V> {
    lower: Option<(&'a V, bool)>,
    upper: Option<(&'a V, bool)>,
    excluded: Vec<&'a V>,
}

impl<'a, V: Ord> Interval<'a, V> {
    fn raise_lower(&mut self, version: &'a V, inclusive: bool) {
        let tighter = match self.lower {
            None => true,
            Some((current, current_inclusive)) => {
                version > current || (version == current && current_inclusive && !inclusive)
            }
        };
        if tighter {
            self.lower = Some((version, inclusive));
        }
    }

    fn lower_upper(&mut self, version: &'a V, inclusive: bool) {
        let tighter = match self.upper {
            None => true,
            Some((current, current_inclusive)) => {
                version < current || (version == current && current_inclusive && !inclusive)
            }
        };
        if tighter {
            self.upper = Some((version, inclusive));
        }
    }

    fn is_empty(&self) -> bool {
        match (self.lower, self.upper) {
            (Some((lo, lo_inc)), Some((hi, hi_inc))) => {
                if lo > hi {
                    true
                } else if lo == hi {
                    !(lo_inc && hi_inc) || self.excluded.contains(&lo)
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}

/// The version space is treated as dense: between two distinct versions there
/// is always another one.
fn satisfiable<'a, V: Ord + 'a>(comparators: impl Iterator<Item = &'a Comparator<V>>) -> bool {
    let mut interval = Interval {
        lower: None,
        upper: None,
        excluded: Vec::new(),
    };
    for c in comparators {
        match c.op {
            Op::Eq => {
                interval.raise_lower(&c.version, true);
                interval.lower_upper(&c.version, true);
            }
            Op::Ne => interval.excluded.push(&c.version),
            Op::Gt => interval.raise_lower(&c.version, false),
            Op::Ge => interval.raise_lower(&c.version, true),
            Op::Lt => interval.lower_upper(&c.version, false),
            Op::Le => interval.lower_upper(&c.version, true),
        }
    }
    !interval.is_empty()
}
