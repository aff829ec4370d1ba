//! Dependency specs: what a declared dependency asks for.
//!
//! A raw dependency string is interpreted according to the scope of the
//! package it names:
//! - `link:<path>` and `path:<path>` (or a bare `./`, `../`, `/` path) name a
//!   local source in either scope
//! - registry names take npm range syntax: `1.2.3`, `>=1.0.0 <2.0.0`, `^1.2`,
//!   `~1.2.3`, `1.x`, `1.0.0 - 2.0.0`, `a || b`
//! - opam names take opam relational syntax: `"2.0.0"`, `< "2.0.0"`,
//!   `>= "1.0" & < "2.0"`, `a | b`

use std::fmt;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use tandem_util::fs::to_slash;
use thiserror::Error;

use crate::package::Scope;
use crate::range::{Comparator, Op, Range, RangeVersion};
use crate::version::{OpamVersion, Source, SourceKind, Version};

/// A dependency string that could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum SpecError {
    #[error("invalid version '{version}' in '{raw}': {reason}")]
    #[diagnostic(code(tandem::spec::invalid_version))]
    InvalidVersion {
        raw: String,
        version: String,
        reason: String,
    },

    #[error("invalid comparator '{token}' in '{raw}'")]
    #[diagnostic(
        code(tandem::spec::invalid_comparator),
        help("Use one of =, !=, >, >=, <, <=, ^, ~ or a hyphen range")
    )]
    InvalidComparator { raw: String, token: String },

    #[error("empty location in '{raw}'")]
    #[diagnostic(code(tandem::spec::empty_location))]
    EmptyLocation { raw: String },
}

/// A relational range under one of the two version schemes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionRange {
    Registry(Range<semver::Version>),
    Opam(Range<OpamVersion>),
}

impl VersionRange {
    pub fn contains(&self, version: &Version) -> bool {
        match (self, version) {
            (Self::Registry(r), Version::Registry(v)) => r.contains(v),
            (Self::Opam(r), Version::Opam(v)) => r.contains(v),
            _ => false,
        }
    }

    pub fn intersects(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Registry(a), Self::Registry(b)) => a.intersects(b),
            (Self::Opam(a), Self::Opam(b)) => a.intersects(b),
            _ => false,
        }
    }

    fn exact(version: &Version) -> Self {
        match version {
            Version::Registry(v) => Self::Registry(Range::exact(v.clone())),
            Version::Opam(v) => Self::Opam(Range::exact(v.clone())),
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry(r) => write_range(f, r, "", " ", " || "),
            Self::Opam(r) => write_range(f, r, "opam:", " & ", " | "),
        }
    }
}

fn write_range<V: RangeVersion>(
    f: &mut fmt::Formatter<'_>,
    range: &Range<V>,
    tag: &str,
    and: &str,
    or: &str,
) -> fmt::Result {
    if range.is_any() {
        return f.write_str("*");
    }
    for (i, clause) in range.clauses().iter().enumerate() {
        if i > 0 {
            f.write_str(or)?;
        }
        for (j, c) in clause.iter().enumerate() {
            if j > 0 {
                f.write_str(and)?;
            }
            write!(f, "{}{tag}{}", c.op.as_str(), c.version)?;
        }
    }
    Ok(())
}

/// What a dependency edge requires of its target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionSpec {
    Exact(Version),
    Range(VersionRange),
    Link(PathBuf),
    Path(PathBuf),
}

impl VersionSpec {
    /// Parse a raw dependency string for a package in `scope`.
    pub fn parse(raw: &str, scope: Scope) -> Result<Self, SpecError> {
        let text = raw.trim();
        if let Some(location) = text.strip_prefix("link:") {
            return local(raw, location).map(Self::Link);
        }
        if let Some(location) = text.strip_prefix("path:") {
            return local(raw, location).map(Self::Path);
        }
        if is_bare_path(text) {
            return local(raw, text).map(Self::Path);
        }
        let range = match scope {
            Scope::Registry => VersionRange::Registry(parse_npm_range(text, raw)?),
            Scope::Opam => VersionRange::Opam(parse_opam_range(text, raw)?),
        };
        Ok(Self::from_range(range))
    }

    /// Collapse a single-`=` range into `Exact`.
    pub fn from_range(range: VersionRange) -> Self {
        let exact = match &range {
            VersionRange::Registry(r) => r.as_exact().cloned().map(Version::Registry),
            VersionRange::Opam(r) => r.as_exact().cloned().map(Version::Opam),
        };
        match exact {
            Some(version) => Self::Exact(version),
            None => Self::Range(range),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Exact(v) => v.kind(),
            Self::Range(VersionRange::Registry(_)) => SourceKind::Registry,
            Self::Range(VersionRange::Opam(_)) => SourceKind::Opam,
            Self::Link(_) => SourceKind::Link,
            Self::Path(_) => SourceKind::Path,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Link(_) | Self::Path(_))
    }

    pub fn location(&self) -> Option<&Path> {
        match self {
            Self::Link(p) | Self::Path(p) => Some(p),
            _ => None,
        }
    }

    /// Replace the location of a local spec, leaving version specs untouched.
    pub fn relocate(self, location: PathBuf) -> Self {
        match self {
            Self::Link(_) => Self::Link(location),
            Self::Path(_) => Self::Path(location),
            other => other,
        }
    }

    /// The single source a local spec stands for.
    pub fn local_source(&self) -> Option<Source> {
        match self {
            Self::Link(p) => Some(Source::Link(p.clone())),
            Self::Path(p) => Some(Source::Path(p.clone())),
            _ => None,
        }
    }

    fn as_range(&self) -> Option<VersionRange> {
        match self {
            Self::Exact(v) => Some(VersionRange::exact(v)),
            Self::Range(r) => Some(r.clone()),
            Self::Link(_) | Self::Path(_) => None,
        }
    }

    /// Whether a concrete source satisfies this spec. Sources of another kind
    /// never do.
    pub fn satisfied_by(&self, source: &Source) -> bool {
        match (self, source) {
            (Self::Exact(want), Source::Version(have)) => want == have,
            (Self::Range(range), Source::Version(have)) => range.contains(have),
            (Self::Link(want), Source::Link(have)) => want == have,
            (Self::Path(want), Source::Path(have)) => want == have,
            _ => false,
        }
    }

    /// Whether any single source could satisfy both specs.
    pub fn compatible(&self, other: &Self) -> bool {
        match (self.as_range(), other.as_range()) {
            (Some(a), Some(b)) => a.intersects(&b),
            (None, None) => self == other,
            _ => false,
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "={v}"),
            Self::Range(r) => write!(f, "{r}"),
            Self::Link(p) => write!(f, "link:{}", to_slash(p)),
            Self::Path(p) => write!(f, "path:{}", to_slash(p)),
        }
    }
}

fn is_bare_path(text: &str) -> bool {
    text == "."
        || text == ".."
        || text.starts_with("./")
        || text.starts_with("../")
        || text.starts_with('/')
}

fn local(raw: &str, location: &str) -> Result<PathBuf, SpecError> {
    let location = location.trim();
    if location.is_empty() {
        return Err(SpecError::EmptyLocation {
            raw: raw.to_string(),
        });
    }
    Ok(PathBuf::from(location))
}

// npm ranges

/// A possibly partial `major.minor.patch` where missing parts are wildcards.
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: semver::Prerelease,
}

impl Partial {
    fn is_full(&self) -> bool {
        self.patch.is_some()
    }

    fn floor(&self) -> semver::Version {
        let mut v = semver::Version::new(
            self.major.unwrap_or(0),
            self.minor.unwrap_or(0),
            self.patch.unwrap_or(0),
        );
        if self.is_full() {
            v.pre = self.pre.clone();
        }
        v
    }

    /// First version above every version the partial matches.
    fn ceiling(&self) -> semver::Version {
        let major = self.major.unwrap_or(0);
        match (self.minor, self.patch) {
            (None, _) => semver::Version::new(major.saturating_add(1), 0, 0),
            (Some(minor), None) => semver::Version::new(major, minor.saturating_add(1), 0),
            (Some(minor), Some(patch)) => semver::Version::new(major, minor, patch.saturating_add(1)),
        }
    }
}

const NPM_OPERATORS: &[&str] = &[">=", "<=", "~>", ">", "<", "=", "^", "~"];

fn parse_npm_range(text: &str, raw: &str) -> Result<Range<semver::Version>, SpecError> {
    let mut clauses = Vec::new();
    for alternative in text.split("||") {
        clauses.push(parse_npm_clause(alternative.trim(), raw)?);
    }
    Ok(Range::from_clauses(clauses))
}

fn parse_npm_clause(text: &str, raw: &str) -> Result<Vec<Comparator<semver::Version>>, SpecError> {
    if let Some((low, high)) = text.split_once(" - ") {
        let low = parse_partial(low.trim(), raw)?;
        let high = parse_partial(high.trim(), raw)?;
        let mut clause = Vec::new();
        if low.major.is_some() {
            clause.push(Comparator::new(Op::Ge, low.floor()));
        }
        if high.major.is_some() {
            if high.is_full() {
                clause.push(Comparator::new(Op::Le, high.floor()));
            } else {
                clause.push(Comparator::new(Op::Lt, high.ceiling()));
            }
        }
        return Ok(clause);
    }

    let mut clause = Vec::new();
    let mut tokens = text.split_whitespace();
    while let Some(token) = tokens.next() {
        let token = if NPM_OPERATORS.contains(&token) {
            match tokens.next() {
                Some(version) => format!("{token}{version}"),
                None => {
                    return Err(SpecError::InvalidComparator {
                        raw: raw.to_string(),
                        token: token.to_string(),
                    })
                }
            }
        } else {
            token.to_string()
        };
        clause.extend(desugar_npm(&token, raw)?);
    }
    Ok(clause)
}

fn desugar_npm(token: &str, raw: &str) -> Result<Vec<Comparator<semver::Version>>, SpecError> {
    let op = NPM_OPERATORS
        .iter()
        .find(|op| token.starts_with(**op))
        .copied()
        .unwrap_or("");
    let partial = parse_partial(&token[op.len()..], raw)?;

    let Some(major) = partial.major else {
        // Wildcards: `*` and friends admit everything, `>*` and `<*` nothing.
        return Ok(match op {
            ">" | "<" => vec![Comparator::new(Op::Lt, semver::Version::new(0, 0, 0))],
            _ => Vec::new(),
        });
    };

    let floor = partial.floor();
    let comparators = match op {
        "" | "=" if partial.is_full() => vec![Comparator::new(Op::Eq, floor)],
        "" | "=" => vec![
            Comparator::new(Op::Ge, floor),
            Comparator::new(Op::Lt, partial.ceiling()),
        ],
        ">" if partial.is_full() => vec![Comparator::new(Op::Gt, floor)],
        ">" => vec![Comparator::new(Op::Ge, partial.ceiling())],
        ">=" => vec![Comparator::new(Op::Ge, floor)],
        "<" => vec![Comparator::new(Op::Lt, floor)],
        "<=" if partial.is_full() => vec![Comparator::new(Op::Le, floor)],
        "<=" => vec![Comparator::new(Op::Lt, partial.ceiling())],
        "~" | "~>" => {
            let upper = match partial.minor {
                Some(minor) => semver::Version::new(major, minor.saturating_add(1), 0),
                None => semver::Version::new(major.saturating_add(1), 0, 0),
            };
            vec![Comparator::new(Op::Ge, floor), Comparator::new(Op::Lt, upper)]
        }
        _ => {
            let upper = match (major, partial.minor, partial.patch) {
                (0, None, _) => semver::Version::new(1, 0, 0),
                (0, Some(0), None) => semver::Version::new(0, 1, 0),
                (0, Some(0), Some(patch)) => semver::Version::new(0, 0, patch.saturating_add(1)),
                (0, Some(minor), _) => semver::Version::new(0, minor.saturating_add(1), 0),
                (major, _, _) => semver::Version::new(major.saturating_add(1), 0, 0),
            };
            vec![Comparator::new(Op::Ge, floor), Comparator::new(Op::Lt, upper)]
        }
    };
    Ok(comparators)
}

fn parse_partial(text: &str, raw: &str) -> Result<Partial, SpecError> {
    let invalid = |reason: String| SpecError::InvalidVersion {
        raw: raw.to_string(),
        version: text.to_string(),
        reason,
    };

    let text = text.trim().trim_start_matches(['v', '=']);
    let text = text.split_once('+').map_or(text, |(core, _build)| core);
    let (core, pre) = match text.split_once('-') {
        Some((core, pre)) => (core, pre),
        None => (text, ""),
    };
    if core.is_empty() {
        return Err(invalid("missing version".to_string()));
    }

    let mut parts = [None; 3];
    let mut wildcard = false;
    for (i, part) in core.split('.').enumerate() {
        if i >= parts.len() {
            return Err(invalid("more than three components".to_string()));
        }
        if matches!(part, "x" | "X" | "*") {
            wildcard = true;
            continue;
        }
        if wildcard {
            return Err(invalid("number after wildcard".to_string()));
        }
        parts[i] = Some(
            part.parse::<u64>()
                .map_err(|e| invalid(format!("component '{part}': {e}")))?,
        );
    }

    let pre = if pre.is_empty() {
        semver::Prerelease::EMPTY
    } else {
        if parts[2].is_none() {
            return Err(invalid("prerelease on a partial version".to_string()));
        }
        semver::Prerelease::new(pre).map_err(|e| invalid(e.to_string()))?
    };

    Ok(Partial {
        major: parts[0],
        minor: parts[1],
        patch: parts[2],
        pre,
    })
}

// opam ranges

const OPAM_OPERATORS: &[(&str, Op)] = &[
    ("!=", Op::Ne),
    (">=", Op::Ge),
    ("<=", Op::Le),
    ("=", Op::Eq),
    (">", Op::Gt),
    ("<", Op::Lt),
];

fn parse_opam_range(text: &str, raw: &str) -> Result<Range<OpamVersion>, SpecError> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '"' | '{' | '}' | '(' | ')'))
        .collect();
    let mut clauses = Vec::new();
    for alternative in cleaned.split('|') {
        let mut clause = Vec::new();
        for atom in alternative.split('&') {
            let atom = atom.trim();
            if atom.is_empty() || atom == "*" {
                continue;
            }
            clause.push(parse_opam_atom(atom, raw)?);
        }
        clauses.push(clause);
    }
    Ok(Range::from_clauses(clauses))
}

fn parse_opam_atom(atom: &str, raw: &str) -> Result<Comparator<OpamVersion>, SpecError> {
    let (op, rest) = OPAM_OPERATORS
        .iter()
        .find_map(|(text, op)| atom.strip_prefix(text).map(|rest| (*op, rest)))
        .unwrap_or((Op::Eq, atom));
    let version = rest.trim();
    let version = version.strip_prefix("opam:").unwrap_or(version);
    if version.is_empty() || version.contains(char::is_whitespace) {
        return Err(SpecError::InvalidComparator {
            raw: raw.to_string(),
            token: atom.to_string(),
        });
    }
    Ok(Comparator::new(op, OpamVersion::parse(version)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn npm(raw: &str) -> VersionSpec {
        VersionSpec::parse(raw, Scope::Registry).unwrap()
    }

    fn opam(raw: &str) -> VersionSpec {
        VersionSpec::parse(raw, Scope::Opam).unwrap()
    }

    fn reg(v: &str) -> Source {
        Source::Version(Version::Registry(semver::Version::parse(v).unwrap()))
    }

    #[test]
    fn bare_version_is_exact() {
        assert!(matches!(npm("1.0.0"), VersionSpec::Exact(_)));
        assert_eq!(npm("1.0.0").to_string(), "=1.0.0");
        assert_eq!(npm("=1.0.0").to_string(), "=1.0.0");
    }

    #[test]
    fn caret_desugars() {
        assert_eq!(npm("^1.2.0").to_string(), ">=1.2.0 <2.0.0");
        assert_eq!(npm("^0.2.3").to_string(), ">=0.2.3 <0.3.0");
        assert_eq!(npm("^0.0.3").to_string(), ">=0.0.3 <0.0.4");
        assert_eq!(npm("^0.x").to_string(), ">=0.0.0 <1.0.0");
    }

    #[test]
    fn tilde_desugars() {
        assert_eq!(npm("~1.2.3").to_string(), ">=1.2.3 <1.3.0");
        assert_eq!(npm("~1").to_string(), ">=1.0.0 <2.0.0");
    }

    #[test]
    fn x_ranges_desugar() {
        assert_eq!(npm("1.x").to_string(), ">=1.0.0 <2.0.0");
        assert_eq!(npm("1.2.*").to_string(), ">=1.2.0 <1.3.0");
        assert_eq!(npm("*").to_string(), "*");
        assert_eq!(npm("").to_string(), "*");
    }

    #[test]
    fn partial_comparators() {
        assert_eq!(npm(">1.2").to_string(), ">=1.3.0");
        assert_eq!(npm("<=1").to_string(), "<2.0.0");
        assert_eq!(npm("< 1.2").to_string(), "<1.2.0");
    }

    #[test]
    fn hyphen_and_union() {
        assert_eq!(npm("1.0.0 - 2").to_string(), ">=1.0.0 <3.0.0");
        assert_eq!(npm("<1.0.0 || >=2.0.0").to_string(), "<1.0.0 || >=2.0.0");
    }

    #[test]
    fn registry_range_matching() {
        let spec = npm(">1.0.0");
        assert!(!spec.satisfied_by(&reg("1.0.0")));
        assert!(spec.satisfied_by(&reg("1.0.1")));
        assert!(!spec.satisfied_by(&reg("2.0.0-beta.1")));
    }

    #[test]
    fn opam_syntax() {
        assert_eq!(opam("2.0.0").to_string(), "=opam:2.0.0");
        assert_eq!(opam("< \"2.0.0\"").to_string(), "<opam:2.0.0");
        assert_eq!(opam(">= 1.0 & < 2.0").to_string(), ">=opam:1.0 & <opam:2.0");
        assert_eq!(opam("< 1.0 | > 3.0").to_string(), "<opam:1.0 | >opam:3.0");
        assert_eq!(opam("*").to_string(), "*");
    }

    #[test]
    fn local_specs() {
        assert_eq!(npm("link:./conflict").kind(), SourceKind::Link);
        assert_eq!(npm("path:./dep/dep.opam").kind(), SourceKind::Path);
        assert_eq!(npm("./dep").kind(), SourceKind::Path);
        assert_eq!(opam("link:../x").kind(), SourceKind::Link);
    }

    #[test]
    fn empty_location_is_rejected() {
        assert!(matches!(
            VersionSpec::parse("link:", Scope::Registry),
            Err(SpecError::EmptyLocation { .. })
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(VersionSpec::parse("latest", Scope::Registry).is_err());
        assert!(VersionSpec::parse("1.2.3.4", Scope::Registry).is_err());
        assert!(VersionSpec::parse(">=", Scope::Registry).is_err());
        assert!(VersionSpec::parse("< 1.0 2.0", Scope::Opam).is_err());
    }

    #[test]
    fn structural_compatibility() {
        assert!(!npm("1.0.0").compatible(&npm("2.0.0")));
        assert!(npm("^1.0.0").compatible(&npm("1.5.0")));
        assert!(!opam("< 2.0.0").compatible(&opam("2.0.0")));
        assert!(!npm("link:a").compatible(&npm("link:b")));
        assert!(npm("link:a").compatible(&npm("link:a")));
        assert!(!npm("link:a").compatible(&npm("path:a")));
        assert!(!npm("link:a").compatible(&npm("*")));
    }

    #[test]
    fn no_coercion_between_schemes() {
        let spec = opam("1.0.0");
        assert!(!spec.satisfied_by(&reg("1.0.0")));
        assert!(spec.satisfied_by(&Source::Version(Version::Opam(OpamVersion::parse("1.0.0")))));
    }
}
