//! Match specifications: the query language for package constraints.
//!
//! A spec has one to three whitespace-separated fields — a package name, an
//! optional version predicate, an optional exact build string — and an
//! optional trailing `(option,…)` list carrying `optional` and
//! `target=<fkey>` decorations. The number of fields is the spec's
//! strictness. A name of the form `@feat` selects the artifacts that track
//! the feature `feat` instead of a package group.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::version_spec::VersionSpec;

mod parse;

pub use parse::ParseMatchSpecError;

#[derive(Debug, Clone)]
pub(crate) enum Constraint {
    /// Strictness 1: any version and build.
    Name,
    /// Strictness 2: a version predicate.
    Version(VersionSpec),
    /// Strictness 3: an exact version and build pair.
    Exact { version: String, build: String },
}

/// A parsed match specification.
#[derive(Debug, Clone)]
pub struct MatchSpec {
    spec: String,
    name: String,
    constraint: Constraint,
    /// An optional spec need not be satisfied; it only biases the solution.
    pub optional: bool,
    /// The installed artifact this spec should prefer to preserve.
    pub target: Option<String>,
}

impl MatchSpec {
    /// A name-only spec (strictness 1).
    pub fn from_name(name: &str) -> Self {
        MatchSpec {
            spec: name.to_owned(),
            name: name.to_owned(),
            constraint: Constraint::Name,
            optional: false,
            target: None,
        }
    }

    /// The package name, or `@feat` for a feature tracker spec.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The main spec text, without the option list.
    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// How many fields the spec constrains: 1 = name, 2 = name and
    /// version, 3 = name, version and build.
    pub fn strictness(&self) -> u8 {
        match self.constraint {
            Constraint::Name => 1,
            Constraint::Version(_) => 2,
            Constraint::Exact { .. } => 3,
        }
    }

    /// Marks the spec optional, keeping its text unchanged.
    pub fn into_optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Replaces the target, keeping the spec text unchanged.
    pub fn with_target(mut self, target: Option<String>) -> Self {
        self.target = target;
        self
    }

    /// Tests a version/build pair, assuming the name already matched.
    pub fn match_fast(&self, version: &str, build: &str) -> bool {
        match &self.constraint {
            Constraint::Name => true,
            Constraint::Version(vspec) => vspec.matches(version),
            Constraint::Exact {
                version: v,
                build: b,
            } => v == version && b == build,
        }
    }

    /// Tests a full name/version/build triple.
    pub fn matches(&self, name: &str, version: &str, build: &str) -> bool {
        self.name == name && self.match_fast(version, build)
    }

    /// Tests an artifact filename of the form `name-version-build.tar.bz2`.
    pub fn matches_filename(&self, fkey: &str) -> bool {
        let stem = fkey.strip_suffix(".tar.bz2").unwrap_or(fkey);
        let mut fields = stem.rsplitn(3, '-');
        let build = fields.next().unwrap_or("");
        let version = fields.next().unwrap_or("");
        match fields.next() {
            Some(name) => self.matches(name, version, build),
            None => false,
        }
    }

    /// The exact filename selected by a mandatory strictness-3 spec.
    pub fn to_filename(&self) -> Option<String> {
        match &self.constraint {
            Constraint::Exact { version, build } if !self.optional => {
                Some(format!("{}-{}-{}.tar.bz2", self.name, version, build))
            }
            _ => None,
        }
    }

}

impl FromStr for MatchSpec {
    type Err = ParseMatchSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse::parse(s)
    }
}

impl PartialEq for MatchSpec {
    fn eq(&self, other: &Self) -> bool {
        (&self.spec, self.optional, &self.target) == (&other.spec, other.optional, &other.target)
    }
}

impl Eq for MatchSpec {}

/// The hash covers the spec text only, so optional/target twins coalesce in
/// hash maps while still comparing unequal.
impl Hash for MatchSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.spec.hash(state);
    }
}

impl PartialOrd for MatchSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MatchSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.spec, self.optional, &self.target).cmp(&(
            &other.spec,
            other.optional,
            &other.target,
        ))
    }
}

impl Display for MatchSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if !self.optional && self.target.is_none() {
            return write!(f, "{}", self.spec);
        }
        let mut args = Vec::with_capacity(2);
        if self.optional {
            args.push("optional".to_owned());
        }
        if let Some(target) = &self.target {
            args.push(format!("target={target}"));
        }
        write!(f, "{} ({})", self.spec, args.join(","))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn ms(s: &str) -> MatchSpec {
        s.parse().unwrap()
    }

    fn hash_of(spec: &MatchSpec) -> u64 {
        let mut hasher = DefaultHasher::new();
        spec.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn match_filename() {
        for (spec, expected) in [
            ("numpy 1.7*", true),
            ("numpy 1.7.1", true),
            ("numpy 1.7", false),
            ("numpy 1.5*", false),
            ("numpy >=1.5", true),
            ("numpy 1.7.1 py27_0", true),
            ("numpy 1.7.1 py26_0", false),
            ("python", false),
        ] {
            assert_eq!(
                ms(spec).matches_filename("numpy-1.7.1-py27_0.tar.bz2"),
                expected,
                "{spec}"
            );
        }
    }

    #[test]
    fn to_filename() {
        assert_eq!(
            ms("foo 1.7 52").to_filename().as_deref(),
            Some("foo-1.7-52.tar.bz2")
        );
        for spec in ["bitarray", "pycosat 0.6.0", "numpy 1.6*"] {
            assert_eq!(ms(spec).to_filename(), None);
        }
        assert_eq!(ms("foo 1.7 52 (optional)").to_filename(), None);
    }

    #[test]
    fn hash_ignores_options_equality_does_not() {
        let a = ms("numpy 1.7*");
        let b = ms("numpy 1.7*");
        let d = ms("numpy 1.7* (optional)");
        assert_eq!(a, b);
        assert_ne!(a, d);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(hash_of(&a), hash_of(&d));

        let c = ms("python");
        let e = ms("python 2.7.4");
        assert_ne!(a, c);
        assert_ne!(hash_of(&a), hash_of(&c));
        assert_ne!(c, e);
        assert_ne!(hash_of(&c), hash_of(&e));
    }

    #[test]
    fn options_parse_and_display() {
        let spec = ms("foo1 >=1.3 2 (optional,target=burg)");
        assert!(spec.optional);
        assert_eq!(spec.target.as_deref(), Some("burg"));
        assert_eq!(spec.spec(), "foo1 >=1.3 2");
        assert_eq!(spec.to_string(), "foo1 >=1.3 2 (optional,target=burg)");
        assert_eq!(ms("numpy 1.7*").to_string(), "numpy 1.7*");
    }

    #[test]
    fn strictness() {
        assert_eq!(ms("numpy").strictness(), 1);
        assert_eq!(ms("numpy 1.7*").strictness(), 2);
        assert_eq!(ms("numpy 1.7.1 py27_0").strictness(), 3);
    }

    #[test]
    fn feature_specs() {
        let spec = ms("@mkl");
        assert_eq!(spec.name(), "@mkl");
        assert_eq!(spec.strictness(), 1);
    }

    #[test]
    fn display_round_trips() {
        for text in ["numpy 1.7*", "numpy (optional)", "python 2.7.5 0 (optional,target=python-2.7.5-0.tar.bz2)"] {
            assert_eq!(ms(text).to_string(), text);
        }
    }
}
