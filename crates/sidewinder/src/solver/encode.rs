//! Encoding the pruned index into the boolean engine: one variable per
//! artifact, at-most-one per package group, implication clauses per
//! mandatory dependency, and the pseudo-boolean objectives of the
//! lexicographic cascade.

use std::collections::BTreeMap;

use fxhash::FxHashMap;
use itertools::Itertools;

use super::{Resolve, ResolveError, VersionKey};
use crate::logic::{Clauses, Lit};
use crate::match_spec::MatchSpec;

impl Resolve {
    /// The boolean proxy of a spec, memoized by name. A mandatory spec's
    /// proxy is the disjunction of its matching artifacts; an optional
    /// spec's proxy is the negation of the disjunction of the group
    /// members that violate it. A version spec covering its entire group
    /// is aliased to the name-level proxy to keep the formula small.
    pub(crate) fn push_match_spec(&self, clauses: &mut Clauses, ms: &MatchSpec) -> Lit {
        let proxy_name = format!(
            "@s@{}{}",
            ms.spec(),
            if ms.optional { "?" } else { "" }
        );
        if let Some(lit) = clauses.from_name(&proxy_name) {
            return lit;
        }
        let mut lit = if let Some(feat) = ms.name().strip_prefix('@') {
            debug_assert_eq!(ms.strictness(), 1);
            let libs: Vec<Lit> = if ms.optional {
                Vec::new()
            } else {
                self.trackers
                    .get(feat)
                    .into_iter()
                    .flatten()
                    .map(|fkey| clauses.from_name(fkey).expect("tracked artifact variable"))
                    .collect()
            };
            clauses.any(&libs)
        } else {
            let wanted = !ms.optional;
            let tgroup: &[String] = self.groups.get(ms.name()).map(Vec::as_slice).unwrap_or(&[]);
            let libs: Vec<&String> = tgroup
                .iter()
                .filter(|fkey| self.match_fast(ms, fkey) == wanted)
                .collect();
            if ms.spec() != ms.name() && libs.len() == tgroup.len() {
                self.push_match_spec(clauses, &MatchSpec::from_name(ms.name()))
            } else {
                let lits: Vec<Lit> = libs
                    .iter()
                    .map(|fkey| clauses.from_name(fkey).expect("group artifact variable"))
                    .collect();
                clauses.any(&lits)
            }
        };
        if ms.optional {
            lit = -lit;
        }
        clauses.name_var(lit, &proxy_name);
        lit
    }

    /// Builds the clause database for this (pruned) index: a variable per
    /// artifact, at-most-one per group, a name-level proxy per group, and
    /// an implication per mandatory dependency.
    pub(crate) fn gen_clauses(&self) -> Result<Clauses, ResolveError> {
        let mut clauses = Clauses::new();
        for name in self.groups.keys().sorted() {
            let lits: Vec<Lit> = self.groups[name]
                .iter()
                .map(|fkey| clauses.new_var(fkey))
                .collect();
            clauses.require_at_most_one(&lits);
            self.push_match_spec(&mut clauses, &MatchSpec::from_name(name));
        }
        for name in self.groups.keys().sorted() {
            for fkey in &self.groups[name] {
                let fvar = clauses.from_name(fkey).expect("artifact variable");
                for ms in self.ms_depends(fkey)?.iter() {
                    if !ms.optional {
                        let proxy = self.push_match_spec(&mut clauses, ms);
                        clauses.require_or(-fvar, proxy);
                    }
                }
            }
        }
        Ok(clauses)
    }

    /// Unit constraints asserting each spec's proxy.
    pub(crate) fn generate_spec_constraints(
        &self,
        clauses: &mut Clauses,
        specs: &[MatchSpec],
    ) -> Vec<Vec<Lit>> {
        specs
            .iter()
            .map(|ms| vec![self.push_match_spec(clauses, ms)])
            .collect()
    }

    /// Objective: one point per active feature tracker.
    pub(crate) fn generate_feature_count(&self, clauses: &mut Clauses) -> FxHashMap<Lit, u64> {
        self.trackers
            .keys()
            .sorted()
            .map(|feat| {
                (
                    self.push_match_spec(clauses, &MatchSpec::from_name(&format!("@{feat}"))),
                    1,
                )
            })
            .collect()
    }

    /// Objective: for every group, penalize members providing fewer
    /// features than the group's maximum. Returns the penalty map and the
    /// total so the driver can report featured selections.
    pub(crate) fn generate_feature_metric(
        &self,
        clauses: &Clauses,
    ) -> (FxHashMap<Lit, u64>, u64) {
        let mut metric = FxHashMap::default();
        let mut total = 0u64;
        for name in self.groups.keys().sorted() {
            let group = &self.groups[name];
            let counts: Vec<u64> = group
                .iter()
                .map(|fkey| self.features(fkey).len() as u64)
                .collect();
            let maxf = counts.iter().copied().max().unwrap_or(0);
            for (fkey, &count) in group.iter().zip(&counts) {
                if count < maxf {
                    let lit = clauses.from_name(fkey).expect("artifact variable");
                    metric.insert(lit, maxf - count);
                }
            }
            total += maxf;
        }
        (metric, total)
    }

    /// Objective: one point per optional spec whose package ends up absent.
    pub(crate) fn generate_removal_count(
        &self,
        clauses: &mut Clauses,
        specs: &[MatchSpec],
    ) -> FxHashMap<Lit, u64> {
        specs
            .iter()
            .map(|ms| {
                (
                    -self.push_match_spec(clauses, &MatchSpec::from_name(ms.name())),
                    1,
                )
            })
            .collect()
    }

    /// Objective: one point per present package among the given names.
    pub(crate) fn generate_package_count<'a>(
        &self,
        clauses: &mut Clauses,
        names: impl IntoIterator<Item = &'a String>,
    ) -> FxHashMap<Lit, u64> {
        names
            .into_iter()
            .map(|name| (self.push_match_spec(clauses, &MatchSpec::from_name(name)), 1))
            .collect()
    }

    /// Version and build rank objectives for the groups named by `specs`.
    /// Rank 0 is the best candidate; the rank increments whenever the
    /// version part of the key changes, and the build rank within a
    /// version. When targets are present the group is reordered as
    /// `[target] + newer + reversed(older)` so that no change is cheapest
    /// and any upgrade is cheaper than any downgrade.
    pub(crate) fn generate_version_metrics(
        &self,
        clauses: &Clauses,
        specs: &[MatchSpec],
    ) -> Result<(FxHashMap<Lit, u64>, FxHashMap<Lit, u64>), ResolveError> {
        let mut eqv = FxHashMap::default();
        let mut eqb = FxHashMap::default();
        let mut sdict: BTreeMap<&str, Vec<&MatchSpec>> = BTreeMap::new();
        for spec in specs {
            sdict.entry(spec.name()).or_default().push(spec);
        }
        for (name, mss) in sdict {
            let Some(group) = self.groups.get(name) else {
                continue;
            };
            let mut pkgs: Vec<(VersionKey, String)> = Vec::with_capacity(group.len());
            for fkey in group {
                pkgs.push((self.version_key(fkey)?, fkey.clone()));
            }
            let targets: Vec<&String> = mss
                .iter()
                .filter_map(|ms| ms.target.as_ref())
                .filter(|target| self.index.contains_key(*target))
                .collect();
            if !targets.is_empty() {
                let mut v1: Vec<(VersionKey, String)> = Vec::with_capacity(targets.len());
                for target in targets {
                    v1.push((self.version_key(target)?, target.clone()));
                }
                let tver = v1.iter().max().cloned().expect("at least one target");
                let v2: Vec<_> = pkgs.iter().filter(|p| **p > tver).cloned().collect();
                let v3: Vec<_> = pkgs
                    .iter()
                    .filter(|p| **p <= tver && !v1.contains(p))
                    .cloned()
                    .collect();
                pkgs = v1
                    .into_iter()
                    .chain(v2)
                    .chain(v3.into_iter().rev())
                    .collect();
            }
            let mut previous: Option<VersionKey> = None;
            let mut iv = 0u64;
            let mut ib = 0u64;
            for (key, fkey) in pkgs {
                if let Some(previous) = &previous {
                    if !previous.same_version(&key) {
                        iv += 1;
                        ib = 0;
                    } else if !previous.same_build(&key) {
                        ib += 1;
                    }
                }
                let lit = clauses.from_name(&fkey).expect("artifact variable");
                if iv > 0 {
                    eqv.insert(lit, iv);
                }
                if ib > 0 {
                    eqb.insert(lit, ib);
                }
                previous = Some(key);
            }
        }
        Ok((eqv, eqb))
    }
}
