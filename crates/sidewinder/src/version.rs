//! Conda version ordering.
//!
//! Versions are lowercased, split into an optional `epoch!` prefix, dotted
//! segments and an optional `+local` suffix. Each segment is broken into
//! runs of numerals and letters; numerals compare numerically and sort above
//! any letter run, the literal `post` sorts above everything, and the
//! literal `dev` sorts below every other letter run. Missing trailing
//! segments compare as zero, so `1.0` and `1.0.0` are equal.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use itertools::{EitherOrBoth, Itertools};
use smallvec::SmallVec;
use thiserror::Error;

use crate::utils::regex;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseVersionError {
    #[error("empty version string")]
    Empty,
    #[error("malformed version string '{0}': invalid character(s)")]
    InvalidCharacters(String),
    #[error("malformed version string '{0}': epoch must be an integer")]
    EpochNotAnInteger(String),
    #[error("malformed version string '{0}': duplicated epoch separator '!'")]
    DuplicatedEpochSeparator(String),
    #[error("malformed version string '{0}': duplicated local version separator '+'")]
    DuplicatedLocalSeparator(String),
    #[error("malformed version string '{0}': invalid version component")]
    InvalidComponent(String),
}

/// One run within a version segment. The derived ordering makes every
/// letter run sort below every numeral, and `post` above everything.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Component {
    Alpha(String),
    Numeral(u64),
    Post,
}

type Segment = SmallVec<[Component; 3]>;

/// A parsed version string with a total order.
#[derive(Debug, Clone)]
pub struct Version {
    norm: String,
    segments: Vec<Segment>,
    local: Vec<Segment>,
}

impl Version {
    /// The normalized (lowercased) form of the version string.
    pub fn as_str(&self) -> &str {
        &self.norm
    }

    /// The epoch, or 0 when the version does not carry one.
    pub fn epoch(&self) -> u64 {
        match self.segments.first().and_then(|seg| seg.first()) {
            Some(Component::Numeral(n)) => *n,
            _ => 0,
        }
    }

    /// True if the version carries a `+local` part.
    pub fn has_local(&self) -> bool {
        !self.local.is_empty()
    }
}

fn split_segment(part: &str) -> Option<Segment> {
    if part.is_empty() {
        return None;
    }
    let mut segment = Segment::new();
    let bytes = part.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        let is_digit = bytes[start].is_ascii_digit();
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() == is_digit {
            end += 1;
        }
        let run = &part[start..end];
        segment.push(if is_digit {
            Component::Numeral(run.parse().ok()?)
        } else if run == "post" {
            Component::Post
        } else if run == "dev" {
            // uppercased so it sorts below every other (lowercase) run
            Component::Alpha("DEV".to_owned())
        } else {
            Component::Alpha(run.to_owned())
        });
        start = end;
    }
    if !bytes[0].is_ascii_digit() {
        // keep numerals and letters in phase across versions
        segment.insert(0, Component::Numeral(0));
    }
    Some(segment)
}

fn split_segments(part: &str, norm: &str) -> Result<Vec<Segment>, ParseVersionError> {
    part.replace('_', ".")
        .split('.')
        .map(|p| split_segment(p).ok_or_else(|| ParseVersionError::InvalidComponent(norm.to_owned())))
        .collect()
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_lowercase();
        if norm.is_empty() {
            return Err(ParseVersionError::Empty);
        }
        let mut version = norm.clone();
        if !regex!(r"^[\*\.\+!_0-9a-z]+$").is_match(&version) {
            if version.contains('-') && !version.contains('_') {
                version = version.replace('-', "_");
            }
            if !regex!(r"^[\*\.\+!_0-9a-z]+$").is_match(&version) {
                return Err(ParseVersionError::InvalidCharacters(norm));
            }
        }

        let (epoch, rest) = match version.split_once('!') {
            None => ("0", version.as_str()),
            Some((epoch, rest)) => {
                if rest.contains('!') {
                    return Err(ParseVersionError::DuplicatedEpochSeparator(norm));
                }
                if epoch.is_empty() || !epoch.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(ParseVersionError::EpochNotAnInteger(norm));
                }
                (epoch, rest)
            }
        };

        let (main, local) = match rest.split_once('+') {
            None => (rest, ""),
            Some((main, local)) => {
                if local.contains('+') {
                    return Err(ParseVersionError::DuplicatedLocalSeparator(norm));
                }
                (main, local)
            }
        };

        let mut segments = split_segments(epoch, &norm)?;
        segments.extend(split_segments(main, &norm)?);
        let local = if local.is_empty() {
            Vec::new()
        } else {
            split_segments(local, &norm)?
        };

        Ok(Version {
            norm,
            segments,
            local,
        })
    }
}

fn compare_segments(a: &[Segment], b: &[Segment]) -> Ordering {
    const FILL: Component = Component::Numeral(0);
    for pair in a.iter().zip_longest(b.iter()) {
        let (left, right) = match &pair {
            EitherOrBoth::Both(l, r) => (l.as_slice(), r.as_slice()),
            EitherOrBoth::Left(l) => (l.as_slice(), &[][..]),
            EitherOrBoth::Right(r) => (&[][..], r.as_slice()),
        };
        for components in left.iter().zip_longest(right.iter()) {
            let ordering = match components {
                EitherOrBoth::Both(c1, c2) => c1.cmp(c2),
                EitherOrBoth::Left(c1) => c1.cmp(&FILL),
                EitherOrBoth::Right(c2) => FILL.cmp(c2),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
    }
    Ordering::Equal
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_segments(&self.segments, &other.segments)
            .then_with(|| compare_segments(&self.local, &other.local))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.norm)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn total_order() {
        let ordered = [
            "0.4",
            "0.4.1.rc",
            "0.4.1",
            "0.5a1",
            "0.5b3",
            "0.5c1",
            "0.5",
            "0.9.6",
            "0.960923",
            "1.0",
            "1.1dev1",
            "1.1a1",
            "1.1.0dev1",
            "1.1.a1",
            "1.1.0rc1",
            "1.1.0",
            "1.1.0post1",
            "1.1post1",
            "1996.07.12",
            "1!0.4.1",
            "1!3.1.1.6",
            "2!0.4.1",
        ];
        for pair in ordered.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn equivalences() {
        assert_eq!(v("0.4"), v("0.4.0"));
        assert_eq!(v("0.4.1.rc"), v("0.4.1.RC"));
        assert_eq!(v("1.1"), v("1.1.0"));
        assert_eq!(v("1.1.0post1"), v("1.1.post1"));
        assert_eq!(v("1.0"), v("0!1.0"));
        assert_eq!(v("1.0_1"), v("1.0.1"));
    }

    #[test]
    fn alpha_sorts_below_release() {
        assert!(v("1.0.1a") < v("1.0.1"));
        assert!(v("1.0.1a") < v("1.0.1z"));
        assert!(v("1.7.1") > v("1.7.1a"));
        assert!(v("1.0.1.vc11") < v("1.0.1"));
        assert!(v("1.0.1a.vc11") < v("1.0.1.vc11"));
        assert!(v("0.12.0b1") < v("0.12.0"));
    }

    #[test]
    fn local_breaks_ties() {
        assert!(v("1.0") < v("1.0+1"));
        assert!(v("1.0+1") < v("1.0+2"));
        assert_eq!(v("1.0+1"), v("1.0+1.0"));
    }

    #[test]
    fn irrational_versions_still_order() {
        assert!(v("2012d") > v("2012b"));
        assert!(v("2012d") < v("2013a"));
        assert!(v("1.0.1*") < v("1.0.1a"));
    }

    #[test]
    fn accessors() {
        assert_eq!(v("1!2.0").epoch(), 1);
        assert_eq!(v("2.0").epoch(), 0);
        assert!(v("2.0+local").has_local());
        assert!(!v("2.0").has_local());
        assert_eq!(v("1.0.1C").as_str(), "1.0.1c");
    }

    #[test]
    fn parse_errors() {
        assert_matches!("".parse::<Version>(), Err(ParseVersionError::Empty));
        assert_matches!(
            "1.0 beta".parse::<Version>(),
            Err(ParseVersionError::InvalidCharacters(_))
        );
        assert_matches!(
            "x!1.0".parse::<Version>(),
            Err(ParseVersionError::EpochNotAnInteger(_))
        );
        assert_matches!(
            "1!2!3".parse::<Version>(),
            Err(ParseVersionError::DuplicatedEpochSeparator(_))
        );
        assert_matches!(
            "1+2+3".parse::<Version>(),
            Err(ParseVersionError::DuplicatedLocalSeparator(_))
        );
        assert_matches!(
            "1..2".parse::<Version>(),
            Err(ParseVersionError::InvalidComponent(_))
        );
    }

    #[test]
    fn dashes_map_to_underscores() {
        assert_eq!(v("1.0-1"), v("1.0_1"));
    }
}
