//! Dependency resolution over a frozen package index.
//!
//! A [`Resolve`] instance is a read-only view over one index snapshot. It
//! groups artifacts by package name, indexes feature trackers, memoizes
//! spec matching and dependency parsing, and layers the pruner, the clause
//! generator and the solver driver on top.

mod driver;
mod encode;
mod prune;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::rc::Rc;

use fxhash::{FxHashMap, FxHashSet};
use itertools::Itertools;
use thiserror::Error;

use crate::channel::ChannelConfig;
use crate::match_spec::{MatchSpec, ParseMatchSpecError};
use crate::repo_data::{Package, PackageIndex, PackageRecord};
use crate::utils::dashlist;
use crate::version::ParseVersionError;

pub(crate) type Filter = FxHashMap<String, bool>;

/// A required package, or a link of a required dependency chain, has no
/// candidate in the index at all.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct NoPackagesFound {
    message: String,
    /// The unresolved leaf specs.
    pub pkgs: Vec<String>,
}

impl NoPackagesFound {
    pub(crate) fn new(bad_deps: &[Vec<String>], subdir: &str) -> Self {
        let pkgs: Vec<String> = bad_deps
            .iter()
            .filter_map(|chain| chain.last().cloned())
            .sorted()
            .dedup()
            .collect();
        let what = if bad_deps.iter().all(|chain| chain.len() > 1) {
            if bad_deps.len() > 1 {
                "Dependencies"
            } else {
                "Dependency"
            }
        } else if bad_deps.iter().all(|chain| chain.len() == 1) {
            if bad_deps.len() > 1 {
                "Packages"
            } else {
                "Package"
            }
        } else {
            "Packages/dependencies"
        };
        let listed = dashlist(bad_deps.iter().map(|chain| chain.iter().join(" -> ")));
        NoPackagesFound {
            message: format!("{what} missing in current {subdir} channels:{listed}"),
            pkgs,
        }
    }
}

/// Candidates exist but their mutual constraints cannot be satisfied
/// simultaneously.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct Unsatisfiable {
    message: String,
}

impl Unsatisfiable {
    pub(crate) fn new(bad_deps: &[Vec<String>]) -> Self {
        let listed = dashlist(bad_deps.iter().map(|chain| chain.iter().join(" -> ")));
        Unsatisfiable {
            message: format!(
                "The following specifications were found to be in conflict:{listed}\n\
                 Use the package query tools to see the dependencies for each package."
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Unsatisfiable(#[from] Unsatisfiable),
    #[error(transparent)]
    NoPackagesFound(#[from] NoPackagesFound),
    #[error(transparent)]
    InvalidVersion(#[from] ParseVersionError),
    #[error(transparent)]
    InvalidMatchSpec(#[from] ParseMatchSpecError),
    #[error("package {0} is not present in the index")]
    MissingRecord(String),
}

/// The sort and metric key of an artifact: under channel priority the
/// channel outranks the version, otherwise the version leads. The first
/// two fields are the "version part" of the key, the third the "build
/// part".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum VersionKey {
    ChannelFirst(i64, crate::version::Version, u64),
    VersionFirst(crate::version::Version, i64, u64),
}

impl VersionKey {
    fn of(record: &PackageRecord, config: &ChannelConfig) -> Result<Self, ParseVersionError> {
        let version = record.version.parse()?;
        let priority = -record.priority;
        Ok(if config.channel_priority {
            VersionKey::ChannelFirst(priority, version, record.build_number)
        } else {
            VersionKey::VersionFirst(version, priority, record.build_number)
        })
    }

    pub(crate) fn same_version(&self, other: &Self) -> bool {
        match (self, other) {
            (VersionKey::ChannelFirst(p1, v1, _), VersionKey::ChannelFirst(p2, v2, _)) => {
                p1 == p2 && v1 == v2
            }
            (VersionKey::VersionFirst(v1, p1, _), VersionKey::VersionFirst(v2, p2, _)) => {
                v1 == v2 && p1 == p2
            }
            _ => false,
        }
    }

    pub(crate) fn same_build(&self, other: &Self) -> bool {
        let build = |key: &Self| match key {
            VersionKey::ChannelFirst(_, _, b) | VersionKey::VersionFirst(_, _, b) => *b,
        };
        build(self) == build(other)
    }
}

/// A read-only resolver over one index snapshot.
pub struct Resolve {
    index: FxHashMap<String, Rc<PackageRecord>>,
    groups: FxHashMap<String, Vec<String>>,
    trackers: FxHashMap<String, Vec<String>>,
    installed: FxHashSet<String>,
    config: ChannelConfig,
    find_matches_cache: RefCell<FxHashMap<MatchSpec, Rc<Vec<String>>>>,
    ms_depends_cache: RefCell<FxHashMap<String, Rc<Vec<MatchSpec>>>>,
}

impl Resolve {
    /// Builds a resolver over an index. Every record carrying
    /// `with_features_depends` is shadowed by a virtual `fkey[fstr]` entry
    /// per feature set, sharing the same record.
    pub fn new(index: PackageIndex, config: ChannelConfig) -> Self {
        let mut full: FxHashMap<String, Rc<PackageRecord>> = FxHashMap::default();
        for (fkey, record) in index {
            let record = Rc::new(record);
            for fstr in record.with_features_depends.keys().sorted() {
                full.insert(format!("{fkey}[{fstr}]"), Rc::clone(&record));
            }
            full.insert(fkey, record);
        }
        Self::from_parts(full, config)
    }

    /// A resolver over an already-processed sub-index, its groups sorted
    /// newest-first so that version metrics can rank by position.
    pub(crate) fn sorted_sub(
        index: FxHashMap<String, Rc<PackageRecord>>,
        config: ChannelConfig,
    ) -> Result<Self, ResolveError> {
        let mut resolve = Self::from_parts(index, config);
        let names: Vec<String> = resolve.groups.keys().cloned().collect();
        for name in names {
            let mut keyed: Vec<(VersionKey, String)> = Vec::new();
            for fkey in &resolve.groups[&name] {
                keyed.push((resolve.version_key(fkey)?, fkey.clone()));
            }
            keyed.sort_by(|a, b| b.0.cmp(&a.0));
            resolve.groups.insert(name, keyed.into_iter().map(|(_, f)| f).collect());
        }
        Ok(resolve)
    }

    fn from_parts(index: FxHashMap<String, Rc<PackageRecord>>, config: ChannelConfig) -> Self {
        let mut groups: FxHashMap<String, Vec<String>> = FxHashMap::default();
        let mut trackers: FxHashMap<String, Vec<String>> = FxHashMap::default();
        let mut installed: FxHashSet<String> = FxHashSet::default();
        for fkey in index.keys().sorted() {
            let record = &index[fkey];
            groups
                .entry(record.name.clone())
                .or_default()
                .push(fkey.clone());
            for feat in record.track_features.split_whitespace() {
                trackers.entry(feat.to_owned()).or_default().push(fkey.clone());
            }
            if record.is_installed() {
                installed.insert(fkey.clone());
            }
        }
        Resolve {
            index,
            groups,
            trackers,
            installed,
            config,
            find_matches_cache: RefCell::default(),
            ms_depends_cache: RefCell::default(),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// The fkeys of currently-installed artifacts.
    pub fn installed(&self) -> impl Iterator<Item = &str> {
        self.installed.iter().map(String::as_str)
    }

    fn record(&self, fkey: &str) -> Result<&Rc<PackageRecord>, ResolveError> {
        self.index
            .get(fkey)
            .ok_or_else(|| ResolveError::MissingRecord(fkey.to_owned()))
    }

    pub(crate) fn version_key(&self, fkey: &str) -> Result<VersionKey, ResolveError> {
        Ok(VersionKey::of(self.record(fkey)?, &self.config)?)
    }

    /// The tags an artifact provides.
    pub fn features(&self, fkey: &str) -> Vec<String> {
        self.index
            .get(fkey)
            .map(|rec| rec.features.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// The tags whose presence the artifact activates.
    pub fn track_features(&self, fkey: &str) -> Vec<String> {
        self.index
            .get(fkey)
            .map(|rec| {
                rec.track_features
                    .split_whitespace()
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The (name, version, build) of an artifact, parsed from its filename
    /// when the fkey is not in the index.
    pub fn package_triple(&self, fkey: &str) -> (String, String, String) {
        if let Some(rec) = self.index.get(fkey) {
            return (rec.name.clone(), rec.version.clone(), rec.build.clone());
        }
        let base = fkey.rsplit_once('[').map_or(fkey, |(base, _)| base);
        let base = base.rsplit('/').next().unwrap_or(base);
        let base = base.strip_suffix(".tar.bz2").unwrap_or(base);
        let mut fields: Vec<&str> = base.rsplitn(3, '-').collect();
        fields.reverse();
        match fields.as_slice() {
            [name] => (name.to_string(), String::new(), String::new()),
            [name, version] => (name.to_string(), version.to_string(), String::new()),
            [name, version, build] => (name.to_string(), version.to_string(), build.to_string()),
            _ => (String::new(), String::new(), String::new()),
        }
    }

    pub fn package_name(&self, fkey: &str) -> String {
        self.package_triple(fkey).0
    }

    /// Whether an artifact passes a spec, including the name test.
    pub fn spec_matches(&self, ms: &MatchSpec, fkey: &str) -> bool {
        match self.index.get(fkey) {
            Some(rec) => ms.matches(&rec.name, &rec.version, &rec.build),
            None => {
                let (name, version, build) = self.package_triple(fkey);
                ms.matches(&name, &version, &build)
            }
        }
    }

    pub(crate) fn match_fast(&self, ms: &MatchSpec, fkey: &str) -> bool {
        match self.index.get(fkey) {
            Some(rec) => ms.match_fast(&rec.version, &rec.build),
            None => false,
        }
    }

    pub(crate) fn match_any(&self, mss: &[MatchSpec], fkey: &str) -> bool {
        match self.index.get(fkey) {
            Some(rec) => mss
                .iter()
                .any(|ms| ms.name() == rec.name && ms.match_fast(&rec.version, &rec.build)),
            None => false,
        }
    }

    /// All artifacts matching a spec: the tracker list for `@feat` specs,
    /// the matching group members otherwise. Memoized.
    pub fn find_matches(&self, ms: &MatchSpec) -> Rc<Vec<String>> {
        if let Some(hit) = self.find_matches_cache.borrow().get(ms) {
            return Rc::clone(hit);
        }
        let matches: Vec<String> = if let Some(feat) = ms.name().strip_prefix('@') {
            self.trackers.get(feat).cloned().unwrap_or_default()
        } else {
            self.groups
                .get(ms.name())
                .map(|group| {
                    group
                        .iter()
                        .filter(|fkey| self.match_fast(ms, fkey))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };
        let matches = Rc::new(matches);
        self.find_matches_cache
            .borrow_mut()
            .insert(ms.clone(), Rc::clone(&matches));
        matches
    }

    /// The dependency specs of an artifact. A virtual `fkey[fstr]` merges
    /// the activation's dependencies over the base set by name, and every
    /// provided feature adds a synthetic `@feat` spec so that choosing a
    /// featured variant implies a tracker. Memoized.
    pub fn ms_depends(&self, fkey: &str) -> Result<Rc<Vec<MatchSpec>>, ResolveError> {
        if let Some(hit) = self.ms_depends_cache.borrow().get(fkey) {
            return Ok(Rc::clone(hit));
        }
        let rec = Rc::clone(self.record(fkey)?);
        let mut deps: Vec<MatchSpec>;
        if let Some((base, fstr)) = fkey
            .strip_suffix(']')
            .and_then(|stripped| stripped.rsplit_once('['))
        {
            deps = self.ms_depends(base)?.as_ref().clone();
            let activated = rec
                .with_features_depends
                .get(fstr)
                .ok_or_else(|| ResolveError::MissingRecord(fkey.to_owned()))?;
            for dep in activated {
                let ms: MatchSpec = dep.parse()?;
                match deps.iter_mut().find(|existing| existing.name() == ms.name()) {
                    Some(existing) => *existing = ms,
                    None => deps.push(ms),
                }
            }
        } else {
            deps = rec
                .depends
                .iter()
                .map(|dep| dep.parse())
                .collect::<Result<_, _>>()?;
        }
        deps.extend(
            rec.features
                .split_whitespace()
                .map(|feat| MatchSpec::from_name(&format!("@{feat}"))),
        );
        let deps = Rc::new(deps);
        self.ms_depends_cache
            .borrow_mut()
            .insert(fkey.to_owned(), Rc::clone(&deps));
        Ok(deps)
    }

    /// The sortable packages matching a spec.
    pub fn get_pkgs(&self, ms: &MatchSpec) -> Result<Vec<Package>, ResolveError> {
        let matches = self.find_matches(ms);
        let mut pkgs = Vec::with_capacity(matches.len());
        for fkey in matches.iter() {
            pkgs.push(Package::new(fkey, Rc::clone(self.record(fkey)?), &self.config)?);
        }
        if pkgs.is_empty() {
            return Err(NoPackagesFound::new(&[vec![ms.to_string()]], &self.config.subdir).into());
        }
        Ok(pkgs)
    }

    /// Tests whether a spec is satisfiable, ignoring cyclic dependencies.
    /// `filter` memoizes per-artifact validity and lets callers pre-seed
    /// exclusions.
    pub(crate) fn valid_ms(&self, ms: &MatchSpec, filter: &mut Filter) -> Result<bool, ResolveError> {
        if ms.optional {
            return Ok(true);
        }
        for fkey in self.find_matches(ms).iter() {
            if self.valid_fkey(fkey, filter)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub(crate) fn valid_fkey(&self, fkey: &str, filter: &mut Filter) -> Result<bool, ResolveError> {
        if let Some(&value) = filter.get(fkey) {
            return Ok(value);
        }
        // provisional marking breaks dependency cycles optimistically
        filter.insert(fkey.to_owned(), true);
        let mut value = true;
        for ms in self.ms_depends(fkey)?.iter() {
            if !self.valid_ms(ms, filter)? {
                value = false;
                break;
            }
        }
        filter.insert(fkey.to_owned(), value);
        Ok(value)
    }

    /// Marks every artifact reachable through valid dependency edges from
    /// the given specs. Returns reachability with per-artifact validity.
    pub(crate) fn touch(
        &self,
        specs: &[MatchSpec],
        filter: &mut Filter,
    ) -> Result<FxHashMap<String, bool>, ResolveError> {
        let mut touched: FxHashMap<String, bool> = FxHashMap::default();
        let mut work: Vec<MatchSpec> = specs.to_vec();
        while let Some(spec) = work.pop() {
            for fkey in self.find_matches(&spec).iter() {
                if touched.contains_key(fkey) {
                    continue;
                }
                let value = self.valid_fkey(fkey, filter)?;
                touched.insert(fkey.clone(), value);
                if value {
                    work.extend(self.ms_depends(fkey)?.iter().cloned());
                }
            }
        }
        Ok(touched)
    }

    /// Builds human-readable dependency chains, from the requested spec
    /// down to each unsatisfiable leaf. Chains sharing a leaf are
    /// collapsed, and failing version predicates of a common leaf name are
    /// or-joined.
    pub(crate) fn invalid_chains(
        &self,
        spec: &MatchSpec,
        filter: &mut Filter,
    ) -> Result<Vec<Vec<String>>, ResolveError> {
        let mut snames: FxHashSet<String> = FxHashSet::default();
        let raw = self.chains_for(std::slice::from_ref(spec), &mut snames, filter)?;

        let mut by_leaf: BTreeMap<String, Vec<Vec<String>>> = BTreeMap::new();
        for chain in raw {
            let Some(leaf) = chain.last().cloned() else {
                continue;
            };
            by_leaf.entry(leaf).or_default().push(chain);
        }

        let mut merged: BTreeMap<Vec<String>, BTreeSet<String>> = BTreeMap::new();
        for (leaf, mut chains) in by_leaf {
            chains.sort_by_key(Vec::len);
            let shortest = chains[0].len();
            let mut chain = if shortest <= 2 {
                chains[0].clone()
            } else if shortest == 3 {
                let mids: BTreeSet<&String> =
                    chains.iter().filter(|c| c.len() == 3).map(|c| &c[1]).collect();
                vec![chains[0][0].clone(), mids.iter().join(","), leaf.clone()]
            } else {
                let mids: BTreeSet<&String> = chains.iter().map(|c| &c[1]).collect();
                vec![
                    chains[0][0].clone(),
                    mids.iter().join(","),
                    "...".to_owned(),
                    leaf.clone(),
                ]
            };
            let (leaf_name, leaf_version) = match leaf.split_once(' ') {
                Some((name, version)) => (name.to_owned(), version.to_owned()),
                None => (leaf.clone(), String::new()),
            };
            chain.pop();
            chain.push(leaf_name);
            merged.entry(chain).or_default().insert(leaf_version);
        }

        let mut result: Vec<Vec<String>> = Vec::with_capacity(merged.len());
        for (mut chain, versions) in merged {
            let suffix = if versions.contains("") {
                String::new()
            } else {
                format!(" {}", versions.iter().join("|"))
            };
            if let Some(last) = chain.pop() {
                chain.push(format!("{last}{suffix}"));
            }
            result.push(chain);
        }
        result.sort();
        Ok(result)
    }

    fn chains_for(
        &self,
        slist: &[MatchSpec],
        snames: &mut FxHashSet<String>,
        filter: &mut Filter,
    ) -> Result<Vec<Vec<String>>, ResolveError> {
        let Some(first) = slist.first() else {
            return Ok(Vec::new());
        };
        let sname = first.name().to_owned();
        if snames.contains(&sname) {
            return Ok(Vec::new());
        }
        for spec in slist {
            if self.valid_ms(spec, filter)? {
                return Ok(Vec::new());
            }
        }
        snames.insert(sname.clone());

        // feature specs fan out over several package names
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for spec in slist {
            for fkey in self.find_matches(spec).iter() {
                groups
                    .entry(self.package_name(fkey))
                    .or_default()
                    .push(fkey.clone());
            }
        }

        let is_feat = sname.starts_with('@');
        let mut subchains: BTreeSet<Vec<String>> = BTreeSet::new();
        for (name, fgroup) in &groups {
            for fkey in fgroup {
                filter.insert(fkey.clone(), true);
            }
            let mut deps: BTreeMap<String, Vec<MatchSpec>> = BTreeMap::new();
            for fkey in fgroup {
                for ms in self.ms_depends(fkey)?.iter() {
                    let entry = deps.entry(ms.name().to_owned()).or_default();
                    if !entry.contains(ms) {
                        entry.push(ms.clone());
                    }
                }
            }
            for dspecs in deps.values() {
                let mut chains = self.chains_for(dspecs, snames, filter)?;
                if is_feat {
                    for chain in &mut chains {
                        chain.insert(0, name.clone());
                    }
                }
                subchains.extend(chains);
            }
            for fkey in fgroup {
                filter.insert(fkey.clone(), false);
            }
        }

        let display_name = if is_feat {
            format!("[feature:{}]", &sname[1..])
        } else {
            sname
        };
        Ok(if !subchains.is_empty() {
            subchains
                .into_iter()
                .map(|mut chain| {
                    chain.insert(0, display_name.clone());
                    chain
                })
                .collect()
        } else if display_name.starts_with('[') {
            vec![vec![display_name]]
        } else {
            slist.iter().map(|s| vec![s.spec().to_owned()]).collect()
        })
    }

    /// Quick verification that specs and their dependency closures have
    /// candidates at all. With `unsat` the failure is reported as a
    /// conflict, optionally biased toward the given leaf names.
    pub(crate) fn verify_specs(
        &self,
        specs: &[MatchSpec],
        unsat: bool,
        target: Option<&FxHashSet<String>>,
    ) -> Result<(), ResolveError> {
        let mut filter = Filter::default();
        let mut bad_deps: Vec<Vec<String>> = Vec::new();
        for ms in specs {
            if !ms.optional {
                bad_deps.extend(self.invalid_chains(ms, &mut filter)?);
            }
        }
        if bad_deps.is_empty() {
            return Ok(());
        }
        if !unsat {
            return Err(NoPackagesFound::new(&bad_deps, &self.config.subdir).into());
        }
        if let Some(target) = target {
            let focused: Vec<Vec<String>> = bad_deps
                .iter()
                .filter(|chain| {
                    chain.last().is_some_and(|leaf| {
                        let name = leaf.split(' ').next().unwrap_or(leaf);
                        target.contains(name)
                    })
                })
                .cloned()
                .collect();
            if !focused.is_empty() {
                bad_deps = focused;
            }
        }
        Err(Unsatisfiable::new(&bad_deps).into())
    }

    pub(crate) fn invalidate_caches(&self) {
        self.find_matches_cache.borrow_mut().clear();
        self.ms_depends_cache.borrow_mut().clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::repo_data::index_from_json;

    fn resolve(json: &str) -> Resolve {
        Resolve::new(index_from_json(json).unwrap(), ChannelConfig::default())
    }

    const SMALL: &str = r#"{
        "a-1.0-0.tar.bz2": { "name": "a", "version": "1.0", "build": "0",
                             "depends": ["b 1.*"] },
        "a-2.0-0.tar.bz2": { "name": "a", "version": "2.0", "build": "0",
                             "depends": ["b 2.*"] },
        "b-1.5-0.tar.bz2": { "name": "b", "version": "1.5", "build": "0" },
        "f-1.0-x0.tar.bz2": { "name": "f", "version": "1.0", "build": "x0",
                              "features": "fast", "depends": [] },
        "ftrack-1.0-0.tar.bz2": { "name": "ftrack", "version": "1.0", "build": "0",
                                  "track_features": "fast" }
    }"#;

    #[test]
    fn groups_and_trackers() {
        let r = resolve(SMALL);
        assert_eq!(r.groups["a"].len(), 2);
        assert_eq!(r.trackers["fast"], vec!["ftrack-1.0-0.tar.bz2"]);
    }

    #[test]
    fn find_matches_respects_version_specs() {
        let r = resolve(SMALL);
        let hits = r.find_matches(&"a 1.*".parse().unwrap());
        assert_eq!(hits.as_slice(), ["a-1.0-0.tar.bz2"]);
        let feats = r.find_matches(&"@fast".parse().unwrap());
        assert_eq!(feats.as_slice(), ["ftrack-1.0-0.tar.bz2"]);
        assert!(r.find_matches(&"nosuch".parse().unwrap()).is_empty());
    }

    #[test]
    fn featured_artifacts_imply_their_tracker() {
        let r = resolve(SMALL);
        let deps = r.ms_depends("f-1.0-x0.tar.bz2").unwrap();
        assert!(deps.iter().any(|ms| ms.name() == "@fast"));
    }

    #[test]
    fn validity_follows_dependencies() {
        let r = resolve(SMALL);
        let mut filter = Filter::default();
        assert!(r.valid_ms(&"a 1.*".parse().unwrap(), &mut filter).unwrap());
        // a 2.0 needs b 2.* which has no candidate
        assert!(!r.valid_ms(&"a 2.*".parse().unwrap(), &mut filter).unwrap());
        assert!(!filter["a-2.0-0.tar.bz2"]);
    }

    #[test]
    fn cycles_are_optimistically_valid() {
        let r = resolve(
            r#"{
            "package1-1.0-0.tar.bz2": { "name": "package1", "version": "1.0", "build": "0",
                                        "depends": ["package2"] },
            "package2-1.0-0.tar.bz2": { "name": "package2", "version": "1.0", "build": "0",
                                        "depends": ["package1"] }
        }"#,
        );
        let mut filter = Filter::default();
        assert!(r.valid_ms(&"package1".parse().unwrap(), &mut filter).unwrap());
        let touched = r
            .touch(&["package1".parse().unwrap()], &mut Filter::default())
            .unwrap();
        assert_eq!(touched.len(), 2);
        assert!(touched.values().all(|&v| v));
    }

    #[test]
    fn with_features_depends_creates_virtual_artifacts() {
        let r = resolve(
            r#"{
            "app-1.0-0.tar.bz2": { "name": "app", "version": "1.0", "build": "0",
                                   "depends": ["b 1.*"],
                                   "with_features_depends": { "fast": ["b 2.*", "c"] } },
            "b-1.5-0.tar.bz2": { "name": "b", "version": "1.5", "build": "0" },
            "b-2.5-0.tar.bz2": { "name": "b", "version": "2.5", "build": "0" },
            "c-1.0-0.tar.bz2": { "name": "c", "version": "1.0", "build": "0" }
        }"#,
        );
        assert_eq!(r.groups["app"].len(), 2);
        let deps = r.ms_depends("app-1.0-0.tar.bz2[fast]").unwrap();
        let names: Vec<&str> = deps.iter().map(|ms| ms.name()).collect();
        assert_eq!(names, ["b", "c"]);
        assert_eq!(deps[0].spec(), "b 2.*");
        // the base artifact is untouched
        let base = r.ms_depends("app-1.0-0.tar.bz2").unwrap();
        assert_eq!(base[0].spec(), "b 1.*");
    }

    #[test]
    fn package_triple_parses_unknown_fkeys() {
        let r = resolve(SMALL);
        assert_eq!(
            r.package_triple("jupyter-lsp-0.8.0-py_0.tar.bz2"),
            ("jupyter-lsp".into(), "0.8.0".into(), "py_0".into())
        );
        assert_eq!(
            r.package_triple("channel/sub/zstd-1.5.2-h8a70e8d_1.tar.bz2"),
            ("zstd".into(), "1.5.2".into(), "h8a70e8d_1".into())
        );
        assert_eq!(r.package_name("x-1.0-0.tar.bz2[fast]"), "x");
        // indexed keys come straight from the record
        assert_eq!(
            r.package_triple("a-1.0-0.tar.bz2"),
            ("a".into(), "1.0".into(), "0".into())
        );
    }

    #[test]
    fn invalid_chains_report_the_leaf() {
        let r = resolve(SMALL);
        let mut filter = Filter::default();
        let chains = r
            .invalid_chains(&"a 2.*".parse().unwrap(), &mut filter)
            .unwrap();
        // intermediate elements are package names; the leaf keeps its spec
        assert_eq!(chains, vec![vec!["a".to_owned(), "b 2.*".to_owned()]]);
    }

    #[test]
    fn invalid_chains_or_join_leaf_versions() {
        let r = resolve(
            r#"{
            "top-1.0-0.tar.bz2": { "name": "top", "version": "1.0", "build": "0",
                                   "depends": ["mid 1.6*"] },
            "top-2.0-0.tar.bz2": { "name": "top", "version": "2.0", "build": "0",
                                   "depends": ["mid 1.7*"] }
        }"#,
        );
        let mut filter = Filter::default();
        let chains = r
            .invalid_chains(&"top".parse().unwrap(), &mut filter)
            .unwrap();
        assert_eq!(
            chains,
            vec![vec!["top".to_owned(), "mid 1.6*|1.7*".to_owned()]]
        );
    }

    #[test]
    fn verify_specs_raises_no_packages_found() {
        let r = resolve(SMALL);
        let err = r
            .verify_specs(&["nosuch 2.0*".parse().unwrap()], false, None)
            .unwrap_err();
        match err {
            ResolveError::NoPackagesFound(err) => {
                assert_eq!(err.pkgs, vec!["nosuch 2.0*"]);
                assert!(err.to_string().contains("linux-64"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn get_pkgs_sorts_and_errors() {
        let r = resolve(SMALL);
        let mut pkgs = r.get_pkgs(&"a".parse().unwrap()).unwrap();
        pkgs.sort_by(|x, y| x.partial_cmp(y).unwrap());
        let fkeys: Vec<&str> = pkgs.iter().map(|p| p.fkey()).collect();
        assert_eq!(fkeys, ["a-1.0-0.tar.bz2", "a-2.0-0.tar.bz2"]);
        assert!(matches!(
            r.get_pkgs(&"nosuch".parse().unwrap()),
            Err(ResolveError::NoPackagesFound(_))
        ));
    }
}
