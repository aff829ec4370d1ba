//! Version schemes and concrete candidate identities.
//!
//! Registry versions are semver and order by semver precedence, prereleases
//! below their release. Opam versions use their own ordering:
//! - Versions are split on `.`, `-`, `_` and `+`, and every piece is further
//!   split into maximal digit and non-digit runs
//! - Numeric runs compare as numbers, text runs lexicographically
//! - A numeric run sorts above a text run
//! - A version that is a strict prefix of another sorts first (`1.0 < 1.0.0`)

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use tandem_util::fs::to_slash;

use crate::package::{PackageId, Scope};

/// A parsed opam version with comparable segments.
#[derive(Debug, Clone)]
pub struct OpamVersion {
    original: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
enum Segment {
    Numeric(u64),
    Text(String),
}

impl OpamVersion {
    pub fn parse(version: &str) -> Self {
        let version = version.trim();
        Self {
            original: version.to_string(),
            segments: parse_segments(version),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }
}

impl PartialEq for OpamVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpamVersion {}

impl Hash for OpamVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl Ord for OpamVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.segments.iter().zip(&other.segments) {
            let ord = compare_segments(a, b);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.segments.len().cmp(&other.segments.len())
    }
}

impl PartialOrd for OpamVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for OpamVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

fn compare_segments(a: &Segment, b: &Segment) -> Ordering {
    match (a, b) {
        (Segment::Numeric(a), Segment::Numeric(b)) => a.cmp(b),
        (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
        (Segment::Numeric(_), Segment::Text(_)) => Ordering::Greater,
        (Segment::Text(_), Segment::Numeric(_)) => Ordering::Less,
    }
}

fn parse_segments(version: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut numeric = false;

    for ch in version.chars() {
        if matches!(ch, '.' | '-' | '_' | '+') {
            flush(&mut segments, &mut current, numeric);
            continue;
        }
        let is_digit = ch.is_ascii_digit();
        if !current.is_empty() && is_digit != numeric {
            flush(&mut segments, &mut current, numeric);
        }
        numeric = is_digit;
        current.push(ch);
    }
    flush(&mut segments, &mut current, numeric);
    segments
}

fn flush(segments: &mut Vec<Segment>, current: &mut String, numeric: bool) {
    if current.is_empty() {
        return;
    }
    let segment = match current.parse::<u64>() {
        Ok(n) if numeric => Segment::Numeric(n),
        _ => Segment::Text(current.clone()),
    };
    segments.push(segment);
    current.clear();
}

/// A concrete version under one of the two version schemes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    Registry(semver::Version),
    Opam(OpamVersion),
}

impl Version {
    /// Parse a version listed for `scope`.
    pub fn parse(raw: &str, scope: Scope) -> Result<Self, semver::Error> {
        match scope {
            Scope::Registry => semver::Version::parse(raw.trim()).map(Self::Registry),
            Scope::Opam => Ok(Self::Opam(OpamVersion::parse(raw))),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Registry(_) => SourceKind::Registry,
            Self::Opam(_) => SourceKind::Opam,
        }
    }
}

/// Versions only order within one scheme; across schemes they are unordered.
impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Registry(a), Self::Registry(b)) => Some(a.cmp(b)),
            (Self::Opam(a), Self::Opam(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry(v) => write!(f, "{v}"),
            Self::Opam(v) => write!(f, "opam:{v}"),
        }
    }
}

/// Provenance category of a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Registry,
    Opam,
    Link,
    Path,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Registry => "registry",
            Self::Opam => "opam",
            Self::Link => "link",
            Self::Path => "path",
        })
    }
}

/// The concrete identity a candidate resolves to.
///
/// Local locations are relative to the project root and lexically normalised.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    Version(Version),
    Link(PathBuf),
    Path(PathBuf),
}

impl Source {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Version(v) => v.kind(),
            Self::Link(_) => SourceKind::Link,
            Self::Path(_) => SourceKind::Path,
        }
    }

    pub fn version(&self) -> Option<&Version> {
        match self {
            Self::Version(v) => Some(v),
            _ => None,
        }
    }

    pub fn location(&self) -> Option<&Path> {
        match self {
            Self::Link(p) | Self::Path(p) => Some(p),
            Self::Version(_) => None,
        }
    }

    /// Parse the rendered form produced by `Display` (`1.0.0`, `opam:1.0.0`,
    /// `link:dir`, `path:dir`).
    pub fn parse(raw: &str) -> Result<Self, semver::Error> {
        if let Some(location) = raw.strip_prefix("link:") {
            return Ok(Self::Link(PathBuf::from(location)));
        }
        if let Some(location) = raw.strip_prefix("path:") {
            return Ok(Self::Path(PathBuf::from(location)));
        }
        if let Some(version) = raw.strip_prefix("opam:") {
            return Ok(Self::Version(Version::Opam(OpamVersion::parse(version))));
        }
        Version::parse(raw, Scope::Registry).map(Self::Version)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version(v) => write!(f, "{v}"),
            Self::Link(p) => write!(f, "link:{}", to_slash(p)),
            Self::Path(p) => write!(f, "path:{}", to_slash(p)),
        }
    }
}

/// A concrete, resolvable version or location for a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub id: PackageId,
    pub source: Source,
}

impl Candidate {
    pub fn new(id: PackageId, source: Source) -> Self {
        Self { id, source }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.source)
    }
}
