//! The index pruner: reduces the candidate universe to the artifacts
//! reachable from the requested specs through satisfiable dependencies,
//! iterating group filtering and feature activation to a fixed point.

use std::collections::BTreeMap;
use std::rc::Rc;

use fxhash::{FxHashMap, FxHashSet};
use itertools::Itertools;
use tracing::debug;

use super::{Filter, Resolve, ResolveError};
use crate::match_spec::MatchSpec;
use crate::repo_data::PackageRecord;

/// The result of pruning: the touched sub-index, the name specs that were
/// auto-added while propagating shared dependencies, and the name of the
/// group whose collapse proved the request unsatisfiable, if any.
pub(crate) struct PrunedIndex {
    pub dists: FxHashMap<String, Rc<PackageRecord>>,
    pub new_specs: Vec<MatchSpec>,
    pub unsat: Option<String>,
}

enum PruneError {
    /// A mandatory group was emptied; carries the offending name.
    Collapsed(String),
    Resolve(ResolveError),
}

impl From<ResolveError> for PruneError {
    fn from(err: ResolveError) -> Self {
        PruneError::Resolve(err)
    }
}

impl Resolve {
    /// Prunes the index down to the candidates for `specs`. Verification
    /// failures (a spec with no candidates at all) raise; constraint
    /// conflicts are reported through [`PrunedIndex::unsat`] so the caller
    /// can produce a minimal conflict hint.
    pub(crate) fn get_dists(&self, specs: &[MatchSpec]) -> Result<PrunedIndex, ResolveError> {
        debug!("retrieving packages for: {}", specs.iter().join(", "));
        self.verify_specs(specs, false, None)?;

        let mut filter = Filter::default();
        let mut snames: FxHashSet<String> = FxHashSet::default();
        let mut feats: FxHashSet<String> = self.trackers.keys().cloned().collect();
        let onames: FxHashSet<String> = specs.iter().map(|s| s.name().to_owned()).collect();
        let mut slist: Vec<MatchSpec> = specs.to_vec();
        let mut new_specs: Vec<MatchSpec> = Vec::new();
        let mut unsat: Option<String> = None;
        let mut touched: FxHashMap<String, bool> = FxHashMap::default();

        for iteration in 0..10 {
            let mut first = true;
            unsat = None;
            'fixpoint: loop {
                let mut progress = 0usize;
                for spec in slist.clone() {
                    match self.filter_group(std::slice::from_ref(&spec), &mut filter, &mut snames)
                    {
                        Ok(reduced) => progress += reduced as usize,
                        Err(PruneError::Collapsed(name)) => {
                            unsat = Some(name);
                            break 'fixpoint;
                        }
                        Err(PruneError::Resolve(err)) => return Err(err),
                    }
                }
                if progress == 0 {
                    break;
                }
                new_specs = snames
                    .difference(&onames)
                    .sorted()
                    .map(|name| MatchSpec::from_name(name))
                    .collect();
                slist = specs.iter().cloned().chain(new_specs.iter().cloned()).collect();
                first = false;
            }
            if unsat.is_none() && first && iteration > 0 {
                break;
            }
            if unsat.is_some() {
                // ignore the filter so the error reporter can still walk chains
                touched = self.touch(specs, &mut Filter::default())?;
                break;
            }
            touched = self.touch(specs, &mut filter)?;

            let mut nfeats: FxHashSet<String> = FxHashSet::default();
            for (fkey, &valid) in &touched {
                if valid {
                    nfeats.extend(self.track_features(fkey));
                }
            }
            if nfeats.len() >= feats.len() {
                break;
            }
            let mut pruned = false;
            for feat in feats.difference(&nfeats).cloned().collect::<Vec<_>>() {
                feats.remove(&feat);
                for fkey in &self.trackers[&feat] {
                    if filter.get(fkey).copied().unwrap_or(true) {
                        filter.insert(fkey.clone(), false);
                        pruned = true;
                    }
                }
            }
            if !pruned {
                break;
            }
        }

        let dists = touched
            .iter()
            .filter(|(_, &valid)| valid)
            .map(|(fkey, _)| (fkey.clone(), Rc::clone(&self.index[fkey])))
            .collect();
        Ok(PrunedIndex {
            dists,
            new_specs,
            unsat,
        })
    }

    /// One filtering pass over the group selected by `matches` (all specs
    /// share a name): keep an artifact iff it passes some spec and every
    /// one of its dependencies still has a surviving matcher. On the first
    /// visit of a mandatory group, dependencies shared by all surviving
    /// members are pruned recursively. Returns whether anything changed.
    fn filter_group(
        &self,
        matches: &[MatchSpec],
        filter: &mut Filter,
        snames: &mut FxHashSet<String>,
    ) -> Result<bool, PruneError> {
        let Some(ms0) = matches.first() else {
            return Ok(false);
        };
        let name = ms0.name().to_owned();
        let isopt = matches.iter().all(|ms| ms.optional);
        let isfeat = name.starts_with('@');
        let first = !snames.contains(&name);

        let group: &[String] = if isfeat {
            self.trackers
                .get(&name[1..])
                .map(Vec::as_slice)
                .unwrap_or(&[])
        } else {
            self.groups.get(&name).map(Vec::as_slice).unwrap_or(&[])
        };

        let mut nold = 0usize;
        let mut nnew = 0usize;
        for fkey in group {
            if *filter.entry(fkey.clone()).or_insert(true) {
                nold += 1;
                let mut sat = isfeat || self.match_any(matches, fkey);
                if sat {
                    for ms in self.ms_depends(fkey)?.iter() {
                        let viable = self
                            .find_matches(ms)
                            .iter()
                            .any(|f2| filter.get(f2).copied().unwrap_or(true));
                        if !viable {
                            sat = false;
                            break;
                        }
                    }
                }
                filter.insert(fkey.clone(), sat);
                nnew += sat as usize;
            }
        }

        let reduced = nnew < nold;
        if reduced {
            debug!("{name}: pruned from {nold} -> {nnew}");
        }
        if nnew == 0 {
            snames.remove(&name);
            if !isopt {
                return Err(PruneError::Collapsed(name));
            }
            return Ok(false);
        }
        if (!reduced && !first) || isopt || isfeat {
            return Ok(reduced);
        }

        if first {
            snames.insert(name);
        }
        let mut cdeps: BTreeMap<String, (usize, Vec<MatchSpec>)> = BTreeMap::new();
        for fkey in group {
            if filter.get(fkey).copied().unwrap_or(false) {
                for ms in self.ms_depends(fkey)?.iter() {
                    if !ms.name().starts_with('@') && !ms.optional {
                        let entry = cdeps.entry(ms.name().to_owned()).or_default();
                        entry.0 += 1;
                        if !entry.1.contains(ms) {
                            entry.1.push(ms.clone());
                        }
                    }
                }
            }
        }
        let mut propagated = false;
        for (_, (count, deps)) in cdeps {
            // only dependencies every surviving member agrees on
            if count >= nnew && self.filter_group(&deps, filter, snames)? {
                propagated = true;
            }
        }
        Ok(reduced || propagated)
    }
}
