//! The version predicate language used inside match specs.
//!
//! A spec is a `|`-separated list of alternatives, each a `,`-separated
//! list of terms. A term is a relational operator applied to a version
//! (`>=1.5`, `!=1.7.1`), a glob over the raw version string (`1.7*`,
//! `*.7.*`), or an exact string match.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::utils::regex;
use crate::version::Version;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseVersionSpecError {
    #[error("empty version spec")]
    Empty,
    #[error("invalid version spec '{0}'")]
    InvalidSpec(String),
    #[error("invalid version spec '{0}': unparseable bound version")]
    InvalidBound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelOp {
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
}

impl RelOp {
    fn eval(self, ordering: Ordering) -> bool {
        match self {
            RelOp::Eq => ordering == Ordering::Equal,
            RelOp::Ne => ordering != Ordering::Equal,
            RelOp::Le => ordering != Ordering::Greater,
            RelOp::Ge => ordering != Ordering::Less,
            RelOp::Lt => ordering == Ordering::Less,
            RelOp::Gt => ordering == Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone)]
enum SpecKind {
    Any(Vec<VersionSpec>),
    All(Vec<VersionSpec>),
    Relation(RelOp, Version),
    Glob(regex::Regex),
    Exact(String),
}

/// A compiled version predicate.
#[derive(Debug, Clone)]
pub struct VersionSpec {
    spec: String,
    kind: SpecKind,
}

impl VersionSpec {
    /// The source text of the spec.
    pub fn as_str(&self) -> &str {
        &self.spec
    }

    /// Tests the predicate against a raw version string.
    pub fn matches(&self, version: &str) -> bool {
        match &self.kind {
            SpecKind::Any(specs) => specs.iter().any(|s| s.matches(version)),
            SpecKind::All(specs) => specs.iter().all(|s| s.matches(version)),
            SpecKind::Relation(op, bound) => match version.parse::<Version>() {
                Ok(version) => op.eval(version.cmp(bound)),
                Err(err) => {
                    debug!("cannot order version '{version}' ({err}); treating as no match");
                    false
                }
            },
            SpecKind::Glob(pattern) => pattern.is_match(version),
            SpecKind::Exact(expected) => expected == version,
        }
    }
}

impl FromStr for VersionSpec {
    type Err = ParseVersionSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        if spec.is_empty() {
            return Err(ParseVersionSpecError::Empty);
        }
        let kind = if spec.contains('|') {
            SpecKind::Any(spec.split('|').map(str::parse).collect::<Result<_, _>>()?)
        } else if spec.contains(',') {
            SpecKind::All(spec.split(',').map(str::parse).collect::<Result<_, _>>()?)
        } else if spec.starts_with(&['=', '<', '>', '!'][..]) {
            let captures = regex!(r"^(==|!=|<=|>=|<|>)(\S+)$")
                .captures(spec)
                .ok_or_else(|| ParseVersionSpecError::InvalidSpec(spec.to_owned()))?;
            let op = match &captures[1] {
                "==" => RelOp::Eq,
                "!=" => RelOp::Ne,
                "<=" => RelOp::Le,
                ">=" => RelOp::Ge,
                "<" => RelOp::Lt,
                _ => RelOp::Gt,
            };
            let bound = captures[2]
                .parse()
                .map_err(|_| ParseVersionSpecError::InvalidBound(spec.to_owned()))?;
            SpecKind::Relation(op, bound)
        } else if spec.contains('*') {
            let pattern = format!("^(?:{})$", regex::escape(spec).replace(r"\*", ".*"));
            let pattern = regex::Regex::new(&pattern)
                .map_err(|_| ParseVersionSpecError::InvalidSpec(spec.to_owned()))?;
            SpecKind::Glob(pattern)
        } else {
            SpecKind::Exact(spec.to_owned())
        };
        Ok(VersionSpec {
            spec: spec.to_owned(),
            kind,
        })
    }
}

impl Display for VersionSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spec)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case("1.7*", "1.7.1", true)]
    #[case("1.7.1", "1.7.1", true)]
    #[case("1.7", "1.7.1", false)]
    #[case("1.5*", "1.7.1", false)]
    #[case(">=1.5", "1.7.1", true)]
    #[case(">=1.5,<2", "1.7.1", true)]
    #[case(">=1.8,<1.9", "1.7.1", false)]
    #[case(">1.5,<2,!=1.7.1", "1.7.1", false)]
    #[case(">1.8,<2|==1.7", "1.7.1", false)]
    #[case(">1.8,<2|>=1.7.1", "1.7.1", true)]
    #[case(">=1.8|1.7*", "1.7.1", true)]
    #[case("==1.7", "1.7.1", false)]
    #[case(">=1.5,>1.6", "1.7.1", true)]
    #[case("==1.7.1", "1.7.1", true)]
    #[case(">=1,*.7.*", "1.7.1", true)]
    #[case("*.7.*,>=1", "1.7.1", true)]
    #[case(">=1,*.8.*", "1.7.1", false)]
    #[case(">=2,*.7.*", "1.7.1", false)]
    #[case("1.6*|1.7*", "1.7.1", true)]
    #[case("1.6*|1.8*", "1.7.1", false)]
    #[case("1.6.2|1.7*", "1.7.1", true)]
    #[case("1.6.2|1.7.1", "1.7.1", true)]
    #[case("1.6.2|1.7.0", "1.7.1", false)]
    #[case(">1.7.1a", "1.7.1", true)]
    #[case("*", "2012d", true)]
    fn match_table(#[case] spec: &str, #[case] version: &str, #[case] expected: bool) {
        let spec: VersionSpec = spec.parse().unwrap();
        assert_eq!(spec.matches(version), expected, "{spec} vs {version}");
    }

    #[test]
    fn mixed_alpha_and_local_flavors() {
        let ge: VersionSpec = ">=1.0.1".parse().unwrap();
        assert!(!ge.matches("1.0.1a"));
        let lt: VersionSpec = "<1.0.1".parse().unwrap();
        assert!(lt.matches("1.0.1.vc11"));
        assert!(lt.matches("1.0.1a.vc11"));
        let ge_vc: VersionSpec = ">=1.0.1.vc11".parse().unwrap();
        assert!(!ge_vc.matches("1.0.1a.vc11"));
        assert!(!ge_vc.matches("1.0.1a"));
        let glob_vc: VersionSpec = ">=1.0.1*.vc11".parse().unwrap();
        assert!(glob_vc.matches("1.0.1a.vc11"));
        let ge_a: VersionSpec = ">=1.0.1a".parse().unwrap();
        assert!(ge_a.matches("1.0.1z"));
    }

    #[test]
    fn unorderable_versions_fail_relations() {
        let spec: VersionSpec = ">=1.5".parse().unwrap();
        assert!(!spec.matches("not a version"));
    }

    #[test]
    fn parse_errors() {
        assert_matches!("".parse::<VersionSpec>(), Err(ParseVersionSpecError::Empty));
        assert_matches!(
            "=1.7".parse::<VersionSpec>(),
            Err(ParseVersionSpecError::InvalidSpec(_))
        );
        assert_matches!(
            ">=".parse::<VersionSpec>(),
            Err(ParseVersionSpecError::InvalidSpec(_))
        );
    }
}
