//! Contract of the LP relaxation engine.
//!
//! The search borrows an implementation of [`Relaxation`] from the
//! enclosing solver; it never solves an LP itself. The operation set is
//! exactly what the node evaluation and strong-branching pipelines need.

use std::rc::Rc;

use crate::domain::Domain;
use crate::pseudocost::PseudocostStore;

/// Outcome classification of an LP solve.
///
/// "Scaled optimal" statuses solved the scaled LP to optimality; the
/// unscaled variants record which side of feasibility survived the
/// unscaling check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LpStatus {
    /// No solve has happened yet.
    #[default]
    NotSet,

    /// Optimal, primal and dual feasible on the unscaled model.
    Optimal,

    /// Scaled optimal, only primal feasibility survived unscaling.
    UnscaledPrimalFeasible,

    /// Scaled optimal, only dual feasibility survived unscaling.
    UnscaledDualFeasible,

    /// Scaled optimal, neither side certified on the unscaled model.
    UnscaledInfeasible,

    /// The LP is infeasible.
    Infeasible,

    /// The LP hit the objective cutoff.
    ObjectiveBound,

    /// The solve failed for numerical reasons.
    Error,
}

impl LpStatus {
    /// The scaled LP was solved to optimality.
    pub fn scaled_optimal(self) -> bool {
        matches!(
            self,
            LpStatus::Optimal
                | LpStatus::UnscaledPrimalFeasible
                | LpStatus::UnscaledDualFeasible
                | LpStatus::UnscaledInfeasible
        )
    }

    /// Primal feasibility holds on the unscaled model.
    pub fn unscaled_primal_feasible(self) -> bool {
        matches!(self, LpStatus::Optimal | LpStatus::UnscaledPrimalFeasible)
    }

    /// Dual feasibility holds on the unscaled model.
    pub fn unscaled_dual_feasible(self) -> bool {
        matches!(self, LpStatus::Optimal | LpStatus::UnscaledDualFeasible)
    }

    /// The LP was proven infeasible (including by the objective cutoff).
    pub fn infeasible(self) -> bool {
        matches!(self, LpStatus::Infeasible | LpStatus::ObjectiveBound)
    }
}

/// Algorithm toggles for the numerical-failure fallback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LpAlgorithm {
    /// Dual simplex, the default.
    #[default]
    DualSimplex,

    /// Primal simplex.
    PrimalSimplex,

    /// Interior point.
    InteriorPoint,
}

/// A stored simplex basis, shared between node frames so children can
/// warm-start from their parent's factorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LpBasis {
    /// Column statuses, one per variable.
    pub col_status: Vec<i8>,

    /// Row statuses, one per row.
    pub row_status: Vec<i8>,
}

/// A conflict row `a^T x <= rhs` proved by LP duals.
#[derive(Debug, Clone)]
pub struct DualProof {
    /// Columns with nonzero proof coefficients.
    pub cols: Vec<usize>,

    /// Proof coefficients.
    pub vals: Vec<f64>,

    /// Right-hand side.
    pub rhs: f64,
}

/// Operations the search consumes from the LP relaxation engine.
pub trait Relaxation {
    /// Re-solve the LP in its current state.
    fn run(&mut self) -> LpStatus;

    /// Solve after synchronizing with the local domain.
    fn resolve(&mut self, dom: &mut Domain) -> LpStatus;

    /// Status of the last solve.
    fn status(&self) -> LpStatus;

    /// Objective of the last solve.
    fn objective(&self) -> f64;

    /// Primal solution of the last solve.
    fn solution(&self) -> &[f64];

    /// Reduced costs of the last solve.
    fn reduced_costs(&self) -> &[f64];

    /// Integral columns fractional in the last solution.
    fn fractional_integers(&self) -> &[(usize, f64)];

    /// Objective cutoff for subsequent solves.
    fn set_objective_limit(&mut self, limit: f64);

    /// Capture the current basis into the stored slot.
    fn store_basis(&mut self);

    /// The stored basis, if any.
    fn stored_basis(&self) -> Option<Rc<LpBasis>>;

    /// Replace the stored basis.
    fn set_stored_basis(&mut self, basis: Option<Rc<LpBasis>>);

    /// Reinstall the stored basis into the solver.
    fn recover_basis(&mut self);

    /// Number of rows currently in the LP.
    fn num_rows(&self) -> usize;

    /// Copy changed column bounds from the domain into the LP and clear
    /// the domain's changed-column marks.
    fn flush_domain(&mut self, dom: &mut Domain);

    /// Copy all column bounds from the domain into the LP.
    fn sync_bounds(&mut self, dom: &Domain);

    /// Predicted objective at integer feasibility from the current
    /// solution and pseudocosts.
    fn best_estimate(&self, pseudocost: &PseudocostStore) -> f64;

    /// Dual proof that the objective exceeds `upper_limit`, valid for
    /// the global domain.
    fn compute_dual_proof(&self, glob: &Domain, upper_limit: f64) -> Option<DualProof>;

    /// Dual ray proof of infeasibility, valid for the global domain.
    fn compute_dual_inf_proof(&self, glob: &Domain) -> Option<DualProof>;

    /// Degeneracy measure of the last solve (1.0 means none).
    fn compute_degeneracy(&self, dom: &Domain) -> f64;

    /// Reset cut age counters after a successful solve.
    fn reset_ages(&mut self);

    /// Cumulative simplex/IPM iteration count.
    fn iterations(&self) -> i64;

    /// Cap iterations per solve; `None` restores the default.
    fn set_iteration_limit(&mut self, limit: Option<i64>);

    /// Build a fresh relaxation containing only the model rows, with
    /// bounds taken from the domain. Used by the numerical-failure
    /// fallback.
    fn fresh(&self, dom: &Domain) -> Self
    where
        Self: Sized;

    /// Toggle LP presolve for subsequent solves.
    fn set_presolve(&mut self, on: bool);

    /// Switch the solve algorithm.
    fn set_algorithm(&mut self, alg: LpAlgorithm);

    /// Drop cached solver state so the next solve starts cold.
    fn clear_solver(&mut self);
}
