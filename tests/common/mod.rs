//! Shared test fixtures: a scripted LP relaxation and model builders.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use sprs::TriMat;

use canopy::{
    Domain, DualProof, LpAlgorithm, LpBasis, LpStatus, MipModel, PseudocostStore, Relaxation,
    VarType,
};

/// Scripted outcome of one LP solve, keyed by the integral-column
/// bounds at solve time.
#[derive(Clone)]
pub struct Outcome {
    pub status: LpStatus,
    pub objective: f64,
    pub solution: Vec<f64>,
    pub iterations: i64,
    pub reduced_costs: Option<Vec<f64>>,
    pub dual_proof: Option<DualProof>,
    pub inf_proof: Option<DualProof>,
}

impl Outcome {
    pub fn optimal(objective: f64, solution: Vec<f64>) -> Self {
        Self {
            status: LpStatus::Optimal,
            objective,
            solution,
            iterations: 1,
            reduced_costs: None,
            dual_proof: None,
            inf_proof: None,
        }
    }

    pub fn infeasible() -> Self {
        Self {
            status: LpStatus::Infeasible,
            objective: f64::INFINITY,
            solution: Vec::new(),
            iterations: 1,
            reduced_costs: None,
            dual_proof: None,
            inf_proof: None,
        }
    }

    pub fn with_status(mut self, status: LpStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_iterations(mut self, iterations: i64) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_reduced_costs(mut self, reduced_costs: Vec<f64>) -> Self {
        self.reduced_costs = Some(reduced_costs);
        self
    }
}

type BoundsKey = Vec<(usize, i64, i64)>;

fn snap(bound: f64) -> i64 {
    if bound <= -1e17 {
        i64::MIN
    } else if bound >= 1e17 {
        i64::MAX
    } else {
        bound.round() as i64
    }
}

fn key_of(model: &MipModel, lower: &[f64], upper: &[f64]) -> BoundsKey {
    model
        .integral_cols
        .iter()
        .map(|&c| (c, snap(lower[c]), snap(upper[c])))
        .collect()
}

/// A scripted stand-in for the LP relaxation engine.
///
/// Solves are table lookups keyed by the current integral-column
/// bounds; unknown keys produce `LpStatus::Error`. Every interaction of
/// interest is appended to the shared event log.
pub struct FakeLp {
    model: Rc<MipModel>,
    col_lower: Vec<f64>,
    col_upper: Vec<f64>,
    outcomes: HashMap<BoundsKey, Outcome>,

    status: LpStatus,
    objective: f64,
    solution: Vec<f64>,
    reduced: Vec<f64>,
    fracints: Vec<(usize, f64)>,
    dual_proof: Option<DualProof>,
    inf_proof: Option<DualProof>,

    stored_basis: Option<Rc<LpBasis>>,
    objective_limit: f64,
    iteration_limit: Option<i64>,
    iterations: i64,

    pub events: Rc<RefCell<Vec<String>>>,
}

impl FakeLp {
    pub fn new(model: Rc<MipModel>) -> Self {
        let n = model.num_cols();
        Self {
            col_lower: model.col_lower.clone(),
            col_upper: model.col_upper.clone(),
            model,
            outcomes: HashMap::new(),
            status: LpStatus::NotSet,
            objective: f64::NAN,
            solution: vec![0.0; n],
            reduced: vec![0.0; n],
            fracints: Vec::new(),
            dual_proof: None,
            inf_proof: None,
            stored_basis: None,
            objective_limit: f64::INFINITY,
            iteration_limit: None,
            iterations: 0,
            events: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Register the outcome for a bounds pattern, one `(lower, upper)`
    /// pair per integral column in `integral_cols` order.
    pub fn script(&mut self, bounds: &[(f64, f64)], outcome: Outcome) {
        assert_eq!(bounds.len(), self.model.integral_cols.len());
        let key: BoundsKey = self
            .model
            .integral_cols
            .iter()
            .zip(bounds)
            .map(|(&c, &(lo, hi))| (c, snap(lo), snap(hi)))
            .collect();
        self.outcomes.insert(key, outcome);
    }

    pub fn num_solves(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.as_str() == "solve")
            .count()
    }

    pub fn saw_event(&self, name: &str) -> bool {
        self.events.borrow().iter().any(|e| e.as_str() == name)
    }
}

impl Relaxation for FakeLp {
    fn run(&mut self) -> LpStatus {
        self.events.borrow_mut().push("solve".to_string());
        let key = key_of(&self.model, &self.col_lower, &self.col_upper);
        match self.outcomes.get(&key).cloned() {
            Some(outcome) => {
                self.status = outcome.status;
                self.objective = outcome.objective;
                self.solution = outcome.solution;
                self.reduced = outcome
                    .reduced_costs
                    .unwrap_or_else(|| vec![0.0; self.model.num_cols()]);
                self.fracints = if self.status.scaled_optimal() {
                    self.model.fractional_integers(&self.solution)
                } else {
                    Vec::new()
                };
                self.dual_proof = outcome.dual_proof;
                self.inf_proof = outcome.inf_proof;
                self.iterations += outcome.iterations;
            }
            None => {
                self.status = LpStatus::Error;
                self.fracints.clear();
                self.iterations += 1;
            }
        }
        self.status
    }

    fn resolve(&mut self, dom: &mut Domain) -> LpStatus {
        self.flush_domain(dom);
        self.run()
    }

    fn status(&self) -> LpStatus {
        self.status
    }

    fn objective(&self) -> f64 {
        self.objective
    }

    fn solution(&self) -> &[f64] {
        &self.solution
    }

    fn reduced_costs(&self) -> &[f64] {
        &self.reduced
    }

    fn fractional_integers(&self) -> &[(usize, f64)] {
        &self.fracints
    }

    fn set_objective_limit(&mut self, limit: f64) {
        self.objective_limit = limit;
    }

    fn store_basis(&mut self) {
        self.stored_basis = Some(Rc::new(LpBasis {
            col_status: vec![0; self.model.num_cols()],
            row_status: vec![0; self.model.num_rows()],
        }));
    }

    fn stored_basis(&self) -> Option<Rc<LpBasis>> {
        self.stored_basis.clone()
    }

    fn set_stored_basis(&mut self, basis: Option<Rc<LpBasis>>) {
        self.stored_basis = basis;
    }

    fn recover_basis(&mut self) {
        self.events.borrow_mut().push("recover_basis".to_string());
    }

    fn num_rows(&self) -> usize {
        self.model.num_rows()
    }

    fn flush_domain(&mut self, dom: &mut Domain) {
        for &col in dom.changed_cols() {
            self.col_lower[col] = dom.col_lower[col];
            self.col_upper[col] = dom.col_upper[col];
        }
        dom.clear_changed_cols();
    }

    fn sync_bounds(&mut self, dom: &Domain) {
        self.col_lower.copy_from_slice(&dom.col_lower);
        self.col_upper.copy_from_slice(&dom.col_upper);
    }

    fn best_estimate(&self, _pseudocost: &PseudocostStore) -> f64 {
        self.objective
    }

    fn compute_dual_proof(&self, _glob: &Domain, _upper_limit: f64) -> Option<DualProof> {
        self.dual_proof.clone()
    }

    fn compute_dual_inf_proof(&self, _glob: &Domain) -> Option<DualProof> {
        self.inf_proof.clone()
    }

    fn compute_degeneracy(&self, _dom: &Domain) -> f64 {
        1.0
    }

    fn reset_ages(&mut self) {}

    fn iterations(&self) -> i64 {
        self.iterations
    }

    fn set_iteration_limit(&mut self, limit: Option<i64>) {
        self.iteration_limit = limit;
    }

    fn fresh(&self, dom: &Domain) -> Self {
        let mut fresh = FakeLp::new(Rc::clone(&self.model));
        fresh.outcomes = self.outcomes.clone();
        fresh.events = Rc::clone(&self.events);
        fresh.sync_bounds(dom);
        fresh
    }

    fn set_presolve(&mut self, on: bool) {
        self.events
            .borrow_mut()
            .push(format!("presolve:{}", if on { "on" } else { "off" }));
    }

    fn set_algorithm(&mut self, alg: LpAlgorithm) {
        let name = match alg {
            LpAlgorithm::DualSimplex => "dual",
            LpAlgorithm::PrimalSimplex => "primal",
            LpAlgorithm::InteriorPoint => "ipm",
        };
        self.events.borrow_mut().push(format!("algorithm:{name}"));
    }

    fn clear_solver(&mut self) {
        self.events.borrow_mut().push("clear_solver".to_string());
    }
}

/// Build a model from dense row descriptions `(coefficients, lower,
/// upper)`.
pub fn make_model(
    col_cost: Vec<f64>,
    rows: Vec<(Vec<f64>, f64, f64)>,
    col_lower: Vec<f64>,
    col_upper: Vec<f64>,
    var_types: Vec<VarType>,
) -> Rc<MipModel> {
    let n = col_cost.len();
    let m = rows.len();
    let mut tri = TriMat::new((m, n));
    let mut row_lower = Vec::with_capacity(m);
    let mut row_upper = Vec::with_capacity(m);
    for (r, (coefs, lo, hi)) in rows.into_iter().enumerate() {
        for (c, &v) in coefs.iter().enumerate() {
            if v != 0.0 {
                tri.add_triplet(r, c, v);
            }
        }
        row_lower.push(lo);
        row_upper.push(hi);
    }
    Rc::new(
        MipModel::new(
            col_cost,
            tri.to_csr(),
            row_lower,
            row_upper,
            col_lower,
            col_upper,
            var_types,
        )
        .unwrap(),
    )
}

/// All-binary model without constraints.
pub fn unconstrained_binaries(col_cost: Vec<f64>) -> Rc<MipModel> {
    let n = col_cost.len();
    make_model(
        col_cost,
        Vec::new(),
        vec![0.0; n],
        vec![1.0; n],
        vec![VarType::Integer; n],
    )
}
