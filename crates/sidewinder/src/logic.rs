//! A small propositional engine.
//!
//! `Clauses` holds named boolean variables, a CNF clause database and a set
//! of persistent pseudo-boolean bounds, and answers satisfiability queries
//! with a deterministic DPLL search. `minimize` performs one stage of a
//! lexicographic cascade: it drives a linear objective down (or, with
//! `trymax`, up) and then pins the optimum as a persistent bound so later
//! stages cannot degrade it.

use fxhash::FxHashMap;
use itertools::Itertools;
use tracing::debug;

/// A literal: a non-zero variable index, negated by sign.
pub type Lit = i32;

/// The constant-true literal. Its negation is constant false.
pub const TRUE: Lit = 1;
pub const FALSE: Lit = -TRUE;

/// A complete assignment, indexed by variable.
#[derive(Debug, Clone)]
pub struct Model {
    values: Vec<bool>,
}

impl Model {
    /// Whether the literal holds. Variables created after the model was
    /// produced evaluate to false.
    pub fn holds(&self, lit: Lit) -> bool {
        let value = self
            .values
            .get(lit.unsigned_abs() as usize - 1)
            .copied()
            .unwrap_or(false);
        if lit > 0 {
            value
        } else {
            !value
        }
    }

    /// The positive literals of the model, in variable order.
    pub fn true_lits(&self) -> impl Iterator<Item = Lit> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, &value)| value)
            .map(|(index, _)| (index + 1) as Lit)
    }
}

#[derive(Debug, Clone)]
struct PbBound {
    terms: Vec<(Lit, u64)>,
    lower: u64,
    upper: u64,
}

/// A boolean constraint store with named variables.
pub struct Clauses {
    nvars: usize,
    clauses: Vec<Vec<Lit>>,
    bounds: Vec<PbBound>,
    names: FxHashMap<String, Lit>,
    lit_names: FxHashMap<Lit, String>,
}

impl Default for Clauses {
    fn default() -> Self {
        Self::new()
    }
}

impl Clauses {
    pub fn new() -> Self {
        Clauses {
            nvars: 1,
            clauses: vec![vec![TRUE]],
            bounds: Vec::new(),
            names: FxHashMap::default(),
            lit_names: FxHashMap::default(),
        }
    }

    fn fresh_var(&mut self) -> Lit {
        self.nvars += 1;
        self.nvars as Lit
    }

    /// Allocates a named variable and returns its positive literal.
    pub fn new_var(&mut self, name: &str) -> Lit {
        let lit = self.fresh_var();
        self.name_var(lit, name);
        lit
    }

    /// Binds a name to a literal. The reverse mapping keeps the first
    /// registration, so aliased names do not repaint a variable.
    pub fn name_var(&mut self, lit: Lit, name: &str) {
        self.names.insert(name.to_owned(), lit);
        self.lit_names
            .entry(lit)
            .or_insert_with(|| name.to_owned());
    }

    pub fn from_name(&self, name: &str) -> Option<Lit> {
        self.names.get(name).copied()
    }

    pub fn name_of(&self, lit: Lit) -> Option<&str> {
        self.lit_names.get(&lit).map(String::as_str)
    }

    /// A literal equivalent to the disjunction of `lits`.
    pub fn any(&mut self, lits: &[Lit]) -> Lit {
        let mut distinct = Vec::with_capacity(lits.len());
        for &lit in lits {
            if lit == TRUE {
                return TRUE;
            }
            if lit != FALSE && !distinct.contains(&lit) {
                distinct.push(lit);
            }
        }
        match distinct.as_slice() {
            [] => FALSE,
            [single] => *single,
            _ => {
                let aux = self.fresh_var();
                let mut clause = vec![-aux];
                clause.extend(&distinct);
                self.clauses.push(clause);
                for &lit in &distinct {
                    self.clauses.push(vec![-lit, aux]);
                }
                aux
            }
        }
    }

    /// Requires at least one of `a`, `b`.
    pub fn require_or(&mut self, a: Lit, b: Lit) {
        if a == TRUE || b == TRUE {
            return;
        }
        let clause: Vec<Lit> = [a, b].into_iter().filter(|&lit| lit != FALSE).collect();
        self.clauses.push(clause);
    }

    /// Requires that no two of `lits` hold together.
    pub fn require_at_most_one(&mut self, lits: &[Lit]) {
        for (i, &a) in lits.iter().enumerate() {
            for &b in &lits[i + 1..] {
                self.clauses.push(vec![-a, -b]);
            }
        }
    }

    /// Solves the clause set plus `additional` clauses. When
    /// `include_if_sat` is set and a model is found, the additional
    /// clauses become a permanent part of the formula; an unsatisfiable
    /// query never alters it.
    pub fn sat(&mut self, additional: &[Vec<Lit>], include_if_sat: bool) -> Option<Model> {
        let model = self.search(additional, None);
        if model.is_some() && include_if_sat {
            self.clauses.extend(additional.iter().cloned());
        }
        model
    }

    fn search(
        &self,
        extra_clauses: &[Vec<Lit>],
        extra_bound: Option<(&[(Lit, u64)], u64, u64)>,
    ) -> Option<Model> {
        let clauses: Vec<&[Lit]> = self
            .clauses
            .iter()
            .chain(extra_clauses.iter())
            .map(Vec::as_slice)
            .collect();
        let mut bounds: Vec<(&[(Lit, u64)], u64, u64)> = self
            .bounds
            .iter()
            .map(|b| (b.terms.as_slice(), b.lower, b.upper))
            .collect();
        if let Some(bound) = extra_bound {
            bounds.push(bound);
        }
        Dpll::new(self.nvars, clauses, &bounds).solve()
    }

    /// Evaluates the objective under a model.
    fn objective_value(terms: &[(Lit, u64)], model: &Model) -> u64 {
        terms
            .iter()
            .filter(|(lit, _)| model.holds(*lit))
            .map(|(_, coefficient)| *coefficient)
            .sum()
    }

    /// One stage of the lexicographic cascade: minimize (or, with
    /// `trymax`, first try to maximize) a linear objective, then pin the
    /// optimum as a persistent bound. Returns the optimal model and the
    /// objective value. The incumbent model is returned untouched when the
    /// objective is empty.
    pub fn minimize(
        &mut self,
        objective: &FxHashMap<Lit, u64>,
        incumbent: &Model,
        trymax: bool,
    ) -> (Model, u64) {
        if objective.is_empty() {
            return (incumbent.clone(), 0);
        }
        let terms: Vec<(Lit, u64)> = objective
            .iter()
            .map(|(&lit, &coefficient)| (lit, coefficient))
            .sorted()
            .collect();
        let total: u64 = terms.iter().map(|(_, c)| *c).sum();

        // Re-solve once so variables introduced since the last query get
        // consistent values before the objective is evaluated.
        let Some(mut best) = self.search(&[], None) else {
            return (incumbent.clone(), Self::objective_value(&terms, incumbent));
        };
        let mut value = Self::objective_value(&terms, &best);

        if trymax {
            let mut climbed = false;
            while value < total {
                match self.search(&[], Some((&terms, value + 1, u64::MAX))) {
                    Some(model) => {
                        value = Self::objective_value(&terms, &model);
                        best = model;
                        climbed = true;
                    }
                    None => break,
                }
            }
            if climbed || value == total {
                self.bounds.push(PbBound {
                    terms,
                    lower: value,
                    upper: u64::MAX,
                });
                return (best, value);
            }
            debug!("objective cannot be raised; minimizing instead");
        }

        while value > 0 {
            match self.search(&[], Some((&terms, 0, value - 1))) {
                Some(model) => {
                    value = Self::objective_value(&terms, &model);
                    best = model;
                }
                None => break,
            }
        }
        self.bounds.push(PbBound {
            terms,
            lower: 0,
            upper: value,
        });
        (best, value)
    }
}

struct BoundState<'a> {
    terms: &'a [(Lit, u64)],
    lower: u64,
    upper: u64,
    sum_true: u64,
    potential: u64,
}

struct Dpll<'a> {
    clauses: Vec<&'a [Lit]>,
    bounds: Vec<BoundState<'a>>,
    assign: Vec<i8>,
    trail: Vec<Lit>,
    decisions: Vec<(usize, bool)>,
}

impl<'a> Dpll<'a> {
    fn new(nvars: usize, clauses: Vec<&'a [Lit]>, bounds: &[(&'a [(Lit, u64)], u64, u64)]) -> Self {
        Dpll {
            clauses,
            bounds: bounds
                .iter()
                .map(|&(terms, lower, upper)| BoundState {
                    terms,
                    lower,
                    upper,
                    sum_true: 0,
                    potential: terms.iter().map(|(_, c)| *c).sum(),
                })
                .collect(),
            assign: vec![0; nvars],
            trail: Vec::with_capacity(nvars),
            decisions: Vec::new(),
        }
    }

    fn value(&self, lit: Lit) -> Option<bool> {
        match self.assign[lit.unsigned_abs() as usize - 1] {
            0 => None,
            v => Some((v > 0) == (lit > 0)),
        }
    }

    fn bounds_ok(&self) -> bool {
        self.bounds
            .iter()
            .all(|b| b.sum_true <= b.upper && b.potential >= b.lower)
    }

    fn assign_lit(&mut self, lit: Lit) -> bool {
        let var = lit.unsigned_abs() as usize - 1;
        match self.assign[var] {
            0 => {}
            v => return (v > 0) == (lit > 0),
        }
        self.assign[var] = if lit > 0 { 1 } else { -1 };
        self.trail.push(lit);
        for bound in &mut self.bounds {
            for &(term, coefficient) in bound.terms {
                if term.unsigned_abs() == lit.unsigned_abs() {
                    if (term > 0) == (lit > 0) {
                        bound.sum_true += coefficient;
                    } else {
                        bound.potential -= coefficient;
                    }
                }
            }
        }
        self.bounds_ok()
    }

    fn undo_last(&mut self) {
        let Some(lit) = self.trail.pop() else {
            return;
        };
        self.assign[lit.unsigned_abs() as usize - 1] = 0;
        for bound in &mut self.bounds {
            for &(term, coefficient) in bound.terms {
                if term.unsigned_abs() == lit.unsigned_abs() {
                    if (term > 0) == (lit > 0) {
                        bound.sum_true -= coefficient;
                    } else {
                        bound.potential += coefficient;
                    }
                }
            }
        }
    }

    /// Unit propagation to a fixpoint. False means conflict.
    fn propagate(&mut self) -> bool {
        loop {
            let mut forced = None;
            for clause in &self.clauses {
                let mut unassigned = None;
                let mut n_unassigned = 0;
                let mut satisfied = false;
                for &lit in *clause {
                    match self.value(lit) {
                        Some(true) => {
                            satisfied = true;
                            break;
                        }
                        Some(false) => {}
                        None => {
                            n_unassigned += 1;
                            unassigned = Some(lit);
                            if n_unassigned > 1 {
                                break;
                            }
                        }
                    }
                }
                if satisfied {
                    continue;
                }
                match (n_unassigned, unassigned) {
                    (0, _) => return false,
                    (1, Some(lit)) => {
                        forced = Some(lit);
                        break;
                    }
                    _ => {}
                }
            }
            match forced {
                Some(lit) => {
                    if !self.assign_lit(lit) {
                        return false;
                    }
                }
                None => return true,
            }
        }
    }

    fn pick_var(&self) -> Option<usize> {
        self.assign.iter().position(|&v| v == 0)
    }

    /// Undoes to the most recent decision with an untried polarity and
    /// flips it. False means the search space is exhausted.
    fn backtrack(&mut self) -> bool {
        while let Some((position, flipped)) = self.decisions.pop() {
            let lit = self.trail[position];
            while self.trail.len() > position {
                self.undo_last();
            }
            if !flipped {
                self.decisions.push((position, true));
                if self.assign_lit(-lit) {
                    return true;
                }
                self.decisions.pop();
                while self.trail.len() > position {
                    self.undo_last();
                }
            }
        }
        false
    }

    fn solve(mut self) -> Option<Model> {
        if !self.bounds_ok() {
            return None;
        }
        let mut conflict = !self.propagate();
        loop {
            if conflict {
                if !self.backtrack() {
                    return None;
                }
                conflict = !self.propagate();
                continue;
            }
            let Some(var) = self.pick_var() else {
                return Some(Model {
                    values: self.assign.iter().map(|&v| v > 0).collect(),
                });
            };
            // lowest free variable, false first: deterministic and biased
            // toward small package sets
            self.decisions.push((self.trail.len(), false));
            conflict = !self.assign_lit(-(var as Lit + 1)) || !self.propagate();
        }
    }
}

/// Shrinks a set of items known to be unsatisfiable down to a minimal
/// subset that is still unsatisfiable under the given probe.
pub fn minimal_unsatisfiable_subset<T, F>(items: &[T], mut satisfiable: F) -> Vec<T>
where
    T: Clone,
    F: FnMut(&[T]) -> bool,
{
    let mut subset = items.to_vec();
    let mut index = 0;
    while index < subset.len() {
        let mut candidate = subset.clone();
        candidate.remove(index);
        if !satisfiable(&candidate) {
            subset = candidate;
        } else {
            index += 1;
        }
    }
    subset
}
