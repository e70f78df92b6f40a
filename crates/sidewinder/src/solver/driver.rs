//! The solver driver and the install/remove planner.
//!
//! `solve` prunes the index, encodes the survivors, runs the lexicographic
//! objective cascade and enumerates alternate optima. `install` and
//! `remove` translate environment operations into spec lists, scoping the
//! solve down when the existing environment is inconsistent and preserving
//! the packages the solver was not allowed to reason about.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use fxhash::{FxHashMap, FxHashSet};
use itertools::Itertools;
use tracing::{debug, info, warn};

use super::prune::PrunedIndex;
use super::{Resolve, ResolveError, Unsatisfiable};
use crate::logic::{minimal_unsatisfiable_subset, Clauses, Model};
use crate::match_spec::MatchSpec;
use crate::repo_data::PackageRecord;
use crate::utils::{dashlist, toposort};

fn parse_specs<S: AsRef<str>>(specs: &[S]) -> Result<Vec<MatchSpec>, ResolveError> {
    specs
        .iter()
        .map(|spec| spec.as_ref().parse().map_err(ResolveError::from))
        .collect()
}

impl Resolve {
    /// Solves for the given specs and returns the best artifact list.
    pub fn solve<S: AsRef<str>>(&self, specs: &[S]) -> Result<Vec<String>, ResolveError> {
        let specs = parse_specs(specs)?;
        Ok(self.solve_specs(&specs, None)?.swap_remove(0))
    }

    /// Like [`Resolve::solve`], but returns every solution tied on the
    /// final objective (up to 10).
    pub fn solve_all<S: AsRef<str>>(&self, specs: &[S]) -> Result<Vec<Vec<String>>, ResolveError> {
        let specs = parse_specs(specs)?;
        self.solve_specs(&specs, None)
    }

    /// Installs `specs` into an environment currently holding `installed`.
    /// With `update_deps`, installed dependencies may move to newer
    /// versions; otherwise they are pinned at their exact version/build.
    pub fn install<S: AsRef<str>>(
        &self,
        specs: &[S],
        installed: &[String],
        update_deps: bool,
    ) -> Result<Vec<String>, ResolveError> {
        let specs = parse_specs(specs)?;
        let len0 = specs.len();
        let (full_specs, preserve) = self.install_specs(&specs, installed, update_deps)?;
        let mut pkgs = self.solve_specs(&full_specs, Some(len0))?.swap_remove(0);
        self.restore_bad(&mut pkgs, &preserve);
        Ok(pkgs)
    }

    /// Like [`Resolve::install`], but returns every tied solution.
    pub fn install_all<S: AsRef<str>>(
        &self,
        specs: &[S],
        installed: &[String],
        update_deps: bool,
    ) -> Result<Vec<Vec<String>>, ResolveError> {
        let specs = parse_specs(specs)?;
        let len0 = specs.len();
        let (full_specs, preserve) = self.install_specs(&specs, installed, update_deps)?;
        let mut solutions = self.solve_specs(&full_specs, Some(len0))?;
        for pkgs in &mut solutions {
            self.restore_bad(pkgs, &preserve);
        }
        Ok(solutions)
    }

    /// Removes `specs` from the environment, preferring to keep everything
    /// else at its installed version while allowing upgrades.
    pub fn remove<S: AsRef<str>>(
        &self,
        specs: &[S],
        installed: &[String],
    ) -> Result<Vec<String>, ResolveError> {
        let (full_specs, preserve) = self.remove_specs(specs, installed)?;
        let mut pkgs = self.solve_specs(&full_specs, None)?.swap_remove(0);
        self.restore_bad(&mut pkgs, &preserve);
        Ok(pkgs)
    }

    fn solve_specs(
        &self,
        specs: &[MatchSpec],
        len0: Option<usize>,
    ) -> Result<Vec<Vec<String>>, ResolveError> {
        info!("solving package specifications");
        debug!("solving for: {}", specs.iter().join(", "));
        let len0 = len0.unwrap_or(specs.len());

        let PrunedIndex {
            dists,
            new_specs,
            unsat,
        } = self.get_dists(specs)?;
        if dists.is_empty() && unsat.is_none() {
            return Ok(vec![Vec::new()]);
        }

        let mut r2 = Resolve::sorted_sub(dists, self.config.clone())?;
        let mut clauses = r2.gen_clauses()?;
        let constraints = r2.generate_spec_constraints(&mut clauses, specs);
        let Some(mut solution) = clauses.sat(&constraints, true) else {
            info!("unsatisfiable specifications detected; generating hint");
            let hint = minimal_unsatisfiable_subset(specs, |subset| {
                let probe = r2.generate_spec_constraints(&mut clauses, subset);
                clauses.sat(&probe, false).is_some()
            });
            let mut hnames: FxHashSet<String> =
                hint.iter().map(|ms| ms.name().to_owned()).collect();
            if let Some(blamed) = &unsat {
                // narrow the report by dropping the blamed group entirely
                if let Some(feat) = blamed.strip_prefix('@') {
                    r2.trackers.remove(feat);
                } else {
                    r2.groups.remove(blamed);
                }
                r2.invalidate_caches();
                hnames.insert(blamed.clone());
            }
            r2.verify_specs(&hint, true, Some(&hnames))?;
            let chains: Vec<Vec<String>> =
                hint.iter().map(|ms| vec![ms.to_string()]).collect();
            return Err(Unsatisfiable::new(&chains).into());
        };

        // Classify the specs driving the objectives: requested mandatory
        // specs, optional specs reduced to their names, every other
        // mandatory spec, and the names no spec covers.
        let mut specm: BTreeSet<String> = r2.groups.keys().cloned().collect();
        let mut specr: Vec<MatchSpec> = Vec::new();
        let mut speco: Vec<MatchSpec> = Vec::new();
        let mut speca: Vec<MatchSpec> = Vec::new();
        for (k, spec) in specs.iter().chain(new_specs.iter()).enumerate() {
            specm.remove(spec.name());
            if !spec.optional {
                if k < len0 {
                    specr.push(spec.clone());
                } else {
                    speca.push(spec.clone());
                }
            } else if !r2.find_matches(spec).is_empty() {
                let reduced = MatchSpec::from_name(spec.name())
                    .into_optional()
                    .with_target(spec.target.clone());
                speco.push(reduced.clone());
                speca.push(reduced);
            }
        }
        speca.extend(specm.iter().map(|name| MatchSpec::from_name(name)));

        // The cascade. Each stage pins its optimum inside the engine, so
        // later stages and the alternate enumeration preserve it.
        let eq_optional_count = r2.generate_removal_count(&mut clauses, &speco);
        let (model, removal) = clauses.minimize(&eq_optional_count, &solution, false);
        solution = model;
        debug!("package removal metric: {removal}");

        let (eq_req_v, eq_req_b) = r2.generate_version_metrics(&clauses, &specr)?;
        let (model, vmetric) = clauses.minimize(&eq_req_v, &solution, false);
        let (model, bmetric) = clauses.minimize(&eq_req_b, &model, false);
        solution = model;
        debug!("initial package version/build metrics: {vmetric}/{bmetric}");

        let eq_feature_count = r2.generate_feature_count(&mut clauses);
        let (model, fcount) = clauses.minimize(&eq_feature_count, &solution, false);
        solution = model;
        debug!("track feature count: {fcount}");

        let (eq_feature_metric, ftotal) = r2.generate_feature_metric(&clauses);
        let (model, fmetric) = clauses.minimize(&eq_feature_metric, &solution, false);
        solution = model;
        debug!("package feature count: {}", ftotal - fmetric);

        let (eq_v, eq_b) = r2.generate_version_metrics(&clauses, &speca)?;
        let (model, vmetric) = clauses.minimize(&eq_v, &solution, false);
        let (model, bmetric) = clauses.minimize(&eq_b, &model, false);
        solution = model;
        debug!("additional package version/build metrics: {vmetric}/{bmetric}");

        let eq_weak = r2.generate_package_count(&mut clauses, &specm);
        let (model, weak) = clauses.minimize(&eq_weak, &solution, true);
        solution = model;
        debug!("weak dependency count: {weak}");

        // Enumerate solutions tied on the full cascade by blocking each
        // one found, up to 10.
        fn clean(clauses: &Clauses, model: &Model) -> Vec<String> {
            model
                .true_lits()
                .filter_map(|lit| clauses.name_of(lit))
                .filter(|name| !name.starts_with('!') && !name.contains('@'))
                .map(str::to_owned)
                .collect()
        }
        debug!("looking for alternate solutions");
        let mut psolutions: Vec<Vec<String>> = vec![clean(&clauses, &solution)];
        let mut nsol = 1usize;
        loop {
            let blocked = psolutions.last().map(|psol| {
                psol.iter()
                    .map(|fkey| -clauses.from_name(fkey).expect("solution variable"))
                    .collect::<Vec<_>>()
            });
            let Some(blocked) = blocked else {
                break;
            };
            match clauses.sat(&[blocked], true) {
                None => break,
                Some(model) => {
                    nsol += 1;
                    if nsol > 10 {
                        debug!("too many solutions; terminating the search");
                        break;
                    }
                    psolutions.push(clean(&clauses, &model));
                }
            }
        }
        if psolutions.len() > 1 {
            let sets: Vec<FxHashSet<&String>> =
                psolutions.iter().map(|sol| sol.iter().collect()).collect();
            let common: FxHashSet<&String> = sets[0]
                .iter()
                .filter(|fkey| sets[1..].iter().all(|set| set.contains(*fkey)))
                .copied()
                .collect();
            let diffs = psolutions.iter().map(|sol| {
                sol.iter()
                    .filter(|fkey| !common.contains(fkey))
                    .sorted()
                    .join(", ")
            });
            warn!(
                "{} possible package resolutions (only showing differing packages):{}{}",
                if nsol > 10 { ">10".to_owned() } else { nsol.to_string() },
                dashlist(diffs),
                if nsol > 10 { "\n  ... and others" } else { "" },
            );
        }

        Ok(psolutions
            .iter()
            .map(|psol| {
                psol.iter()
                    .map(|fkey| fkey.split('[').next().unwrap_or(fkey).to_owned())
                    .sorted()
                    .collect()
            })
            .collect())
    }

    /// Checks whether the installed set is self-consistent and whether the
    /// solver must be scoped to the names reachable from the new specs.
    /// Returns the limiting name set (None when unconstrained) and the
    /// fkeys to preserve untouched.
    pub(crate) fn bad_installed(
        &self,
        installed: &[String],
        new_specs: &[MatchSpec],
    ) -> Result<(Option<FxHashSet<String>>, Vec<String>), ResolveError> {
        if installed.is_empty() {
            return Ok((None, Vec::new()));
        }
        debug!("checking if the current environment is consistent");
        let mut xtra: Vec<String> = Vec::new();
        let mut dists: FxHashMap<String, Rc<PackageRecord>> = FxHashMap::default();
        let mut ispecs: Vec<MatchSpec> = Vec::new();
        for fkey in installed {
            match self.index.get(fkey) {
                None => xtra.push(fkey.clone()),
                Some(record) => {
                    dists.insert(fkey.clone(), Rc::clone(record));
                    let (name, version, build) = self.package_triple(fkey);
                    ispecs.push(format!("{name} {version} {build}").parse()?);
                }
            }
        }
        if !xtra.is_empty() {
            debug!("packages missing from index: {}", xtra.iter().join(", "));
        }

        // Internal faults in the consistency probe degrade to "assume a
        // conflict"; they never propagate out of the check.
        let consistent = match Resolve::sorted_sub(dists, self.config.clone())
            .and_then(|r2| r2.gen_clauses().map(|clauses| (r2, clauses)))
        {
            Ok((r2, mut clauses)) => {
                let constraints = r2.generate_spec_constraints(&mut clauses, &ispecs);
                clauses.sat(&constraints, false).is_some()
            }
            Err(err) => {
                debug!("the package set caused an unexpected error, assuming a conflict: {err}");
                false
            }
        };

        let mut limit = None;
        if !consistent || !xtra.is_empty() {
            let mut snames: FxHashSet<String> = FxHashSet::default();
            for spec in new_specs {
                self.collect_dependency_names(spec.name(), &mut snames)?;
            }
            xtra.retain(|fkey| !snames.contains(fkey));
            let all_covered = ispecs.iter().all(|spec| snames.contains(spec.name()));
            if !xtra.is_empty() || !(consistent || all_covered) {
                limit = Some(
                    ispecs
                        .iter()
                        .filter(|spec| snames.contains(spec.name()))
                        .map(|spec| spec.name().to_owned())
                        .collect::<FxHashSet<_>>(),
                );
                xtra = installed
                    .iter()
                    .filter(|fkey| !snames.contains(&self.package_name(fkey)))
                    .cloned()
                    .collect();
                debug!(
                    "limiting the solver to the following packages: {}",
                    limit.iter().flatten().sorted().join(", ")
                );
            }
        }
        if !xtra.is_empty() {
            debug!("packages to be preserved: {}", xtra.iter().join(", "));
        }
        Ok((limit, xtra))
    }

    fn collect_dependency_names(
        &self,
        name: &str,
        snames: &mut FxHashSet<String>,
    ) -> Result<(), ResolveError> {
        if !snames.insert(name.to_owned()) {
            return Ok(());
        }
        if let Some(group) = self.groups.get(name) {
            for fkey in group {
                for ms in self.ms_depends(fkey)?.iter() {
                    self.collect_dependency_names(ms.name(), snames)?;
                }
            }
        }
        Ok(())
    }

    /// Re-inserts preserved fkeys whose names do not clash with the
    /// solution.
    pub(crate) fn restore_bad(&self, pkgs: &mut Vec<String>, preserve: &[String]) {
        if preserve.is_empty() {
            return;
        }
        let names: FxHashSet<String> = pkgs.iter().map(|fkey| self.package_name(fkey)).collect();
        pkgs.extend(
            preserve
                .iter()
                .filter(|fkey| !names.contains(&self.package_name(fkey)))
                .cloned(),
        );
    }

    /// Expands user install specs with the currently installed packages:
    /// targets when dependencies may update, exact pins when they may not.
    pub(crate) fn install_specs(
        &self,
        specs: &[MatchSpec],
        installed: &[String],
        update_deps: bool,
    ) -> Result<(Vec<MatchSpec>, Vec<String>), ResolveError> {
        let mut specs = specs.to_vec();
        let snames: FxHashSet<String> = specs.iter().map(|s| s.name().to_owned()).collect();
        debug!("checking satisfiability of the current install");
        let (limit, preserve) = self.bad_installed(installed, &specs)?;
        for fkey in installed {
            if !self.index.contains_key(fkey) {
                continue;
            }
            let (name, version, build) = self.package_triple(fkey);
            if snames.contains(&name) {
                continue;
            }
            if let Some(limit) = &limit {
                if !limit.contains(&name) {
                    continue;
                }
            }
            let spec = if update_deps {
                // a target lets the solver minimize change instead of
                // forbidding it
                format!("{name} (target={fkey})").parse()?
            } else {
                format!("{name} {version} {build}").parse()?
            };
            specs.push(spec);
        }
        Ok((specs, preserve))
    }

    /// Turns removal targets into never-matching optional specs, forcing
    /// the packages out, and protects the remaining installed packages
    /// with lower-bounded optional specs.
    pub(crate) fn remove_specs<S: AsRef<str>>(
        &self,
        specs: &[S],
        installed: &[String],
    ) -> Result<(Vec<MatchSpec>, Vec<String>), ResolveError> {
        let mut rspecs: Vec<MatchSpec> = specs
            .iter()
            .map(|spec| {
                format!("{} @ @", spec.as_ref())
                    .parse::<MatchSpec>()
                    .map(MatchSpec::into_optional)
            })
            .collect::<Result<_, _>>()?;
        let snames: FxHashSet<String> = rspecs.iter().map(|s| s.name().to_owned()).collect();
        let (limit, _) = self.bad_installed(installed, &rspecs)?;
        let mut preserve: Vec<String> = Vec::new();
        for fkey in installed {
            let (name, version, _build) = self.package_triple(fkey);
            if snames.contains(&name) {
                continue;
            }
            if limit.is_some() {
                preserve.push(fkey.clone());
            } else if !version.is_empty() {
                rspecs.push(
                    format!("{name} >={version}")
                        .parse::<MatchSpec>()?
                        .into_optional()
                        .with_target(Some(fkey.clone())),
                );
            } else {
                rspecs.push(
                    MatchSpec::from_name(&name)
                        .into_optional()
                        .with_target(Some(fkey.clone())),
                );
            }
        }
        Ok((rspecs, preserve))
    }

    /// When every requested spec pins an exact artifact (and, for a single
    /// spec, all of its dependencies do too), the solver is unnecessary:
    /// returns the sorted filenames directly, or None to fall back to a
    /// full solve.
    pub fn explicit<S: AsRef<str>>(&self, specs: &[S]) -> Result<Option<Vec<String>>, ResolveError> {
        let specs = parse_specs(specs)?;
        let mut filenames: Vec<Option<String>> = Vec::new();
        if let [ms] = specs.as_slice() {
            let Some(fkey) = ms.to_filename() else {
                return Ok(None);
            };
            if !self.index.contains_key(&fkey) {
                return Ok(None);
            }
            filenames.extend(self.ms_depends(&fkey)?.iter().map(MatchSpec::to_filename));
            filenames.push(Some(fkey));
        } else {
            filenames.extend(specs.iter().map(MatchSpec::to_filename));
        }
        let mut result = Vec::with_capacity(filenames.len());
        for filename in filenames {
            match filename {
                Some(filename) => result.push(filename),
                None => return Ok(None),
            }
        }
        result.sort();
        debug!("explicit solve finished");
        Ok(Some(result))
    }

    /// How many dependencies of `fkey1` the artifact `fkey2` satisfies.
    pub(crate) fn sum_matches(&self, fkey1: &str, fkey2: &str) -> Result<usize, ResolveError> {
        Ok(self
            .ms_depends(fkey1)?
            .iter()
            .filter(|ms| self.spec_matches(ms, fkey2))
            .count())
    }

    /// Among same-name same-version artifacts lacking the given features,
    /// the one whose dependencies overlap the installed set the most.
    pub fn find_substitute(
        &self,
        installed: &[String],
        features: &FxHashSet<String>,
        fkey: &str,
    ) -> Result<Option<String>, ResolveError> {
        let (name, version, _build) = self.package_triple(fkey);
        let ms: MatchSpec = format!("{name} {version}").parse()?;
        let mut candidates: BTreeMap<usize, String> = BTreeMap::new();
        for pkg in self.get_pkgs(&ms)? {
            if self
                .features(pkg.fkey())
                .iter()
                .any(|feat| features.contains(feat))
            {
                continue;
            }
            let mut score = 0usize;
            for other in installed {
                score += self.sum_matches(pkg.fkey(), other)?;
            }
            candidates.insert(score, pkg.fkey().to_owned());
        }
        Ok(candidates.into_iter().next_back().map(|(_, fkey)| fkey))
    }

    /// Orders dists so that every package appears after its dependencies.
    /// `must_have` maps package names to dists (fkeys without the archive
    /// extension).
    pub fn dependency_sort(
        &self,
        must_have: &FxHashMap<String, String>,
    ) -> Result<Vec<String>, ResolveError> {
        let mut digraph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (name, dist) in must_have {
            let deps = self.ms_depends(&format!("{dist}.tar.bz2"))?;
            digraph.insert(
                name.clone(),
                deps.iter().map(|ms| ms.name().to_owned()).collect(),
            );
        }
        let sorted_names = toposort(digraph);
        let mut remaining: BTreeMap<&String, &String> = must_have.iter().collect();
        let mut result: Vec<String> = Vec::with_capacity(must_have.len());
        for name in &sorted_names {
            if let Some(dist) = remaining.remove(name) {
                result.push(dist.clone());
            }
        }
        result.extend(remaining.into_values().cloned());
        Ok(result)
    }
}
