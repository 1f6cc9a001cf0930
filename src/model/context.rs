//! Shared solver state consumed by the search.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::conflict::{ConflictPool, CutGenerator, NullCutGenerator};
use crate::domain::Domain;
use crate::model::MipModel;
use crate::sym::{StabilizerOrbits, Symmetries};

/// Where an incumbent solution was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncumbentSource {
    /// Integer-feasible LP inside the tree.
    Tree,

    /// Integer-feasible probe during strong branching.
    StrongBranching,

    /// Found while the search ran in heuristic mode.
    Heuristic,
}

impl IncumbentSource {
    /// Single-character tag used in solver logs.
    pub fn as_char(&self) -> char {
        match self {
            IncumbentSource::Tree => 'T',
            IncumbentSource::StrongBranching => 'B',
            IncumbentSource::Heuristic => 'H',
        }
    }
}

/// Tracks the best known feasible solution.
#[derive(Debug, Clone)]
pub struct IncumbentTracker {
    /// Current best solution (if any).
    pub solution: Option<Vec<f64>>,

    /// Objective value of the incumbent.
    pub obj_val: f64,

    /// Number of times the incumbent was improved.
    pub update_count: u64,
}

impl Default for IncumbentTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl IncumbentTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            solution: None,
            obj_val: f64::INFINITY,
            update_count: 0,
        }
    }

    /// Whether any feasible solution is known.
    pub fn has_incumbent(&self) -> bool {
        self.solution.is_some()
    }

    /// Accept a solution if it strictly improves the incumbent.
    pub fn update(&mut self, x: &[f64], obj: f64) -> bool {
        if obj < self.obj_val - 1e-9 {
            self.solution = Some(x.to_vec());
            self.obj_val = obj;
            self.update_count += 1;
            true
        } else {
            false
        }
    }
}

/// Counters the search flushes into the shared state.
#[derive(Debug, Default, Clone)]
pub struct SearchStats {
    /// Nodes visited.
    pub num_nodes: i64,

    /// Fraction of the tree proven, as `2^(1-depth)` per closed subtree.
    pub pruned_treeweight: f64,

    /// LP iterations across all solves.
    pub total_lp_iterations: i64,

    /// LP iterations spent inside heuristic-mode searches.
    pub heuristic_lp_iterations: i64,

    /// LP iterations spent on strong-branching probes.
    pub sb_lp_iterations: i64,
}

/// Cooperative termination limits.
#[derive(Debug, Default)]
pub struct SolveLimits {
    /// Maximum nodes to visit.
    pub node_limit: Option<i64>,

    /// Wall-clock limit.
    pub time_limit: Option<Duration>,

    /// Cooperative interrupt flag.
    pub interrupted: Cell<bool>,
}

/// A known solution used to validate pruning and conflicts in debug
/// builds. Inactive until a solution is installed.
#[derive(Debug, Default, Clone)]
pub struct DebugSolution {
    solution: Option<Vec<f64>>,
    obj: f64,
}

impl DebugSolution {
    /// Install a reference solution.
    pub fn set_solution(&mut self, sol: Vec<f64>, model: &MipModel) {
        let (obj, _) = model.check_solution(&sol);
        self.obj = obj;
        self.solution = Some(sol);
    }

    /// Assert that pruning the current local domain does not cut off the
    /// reference solution while it is still the best known.
    pub fn node_pruned(&self, dom: &Domain, upper_limit: f64) {
        if let Some(sol) = &self.solution {
            let contained = sol
                .iter()
                .enumerate()
                .all(|(i, &v)| v >= dom.col_lower[i] - 1e-6 && v <= dom.col_upper[i] + 1e-6);
            debug_assert!(
                !contained || self.obj >= upper_limit - 1e-6,
                "pruned a subtree containing the debug solution"
            );
        }
    }

    /// Assert that a conflict constraint does not cut off the reference
    /// solution while it is still the best known.
    pub fn check_cut(&self, cols: &[usize], vals: &[f64], rhs: f64, upper_limit: f64) {
        if let Some(sol) = &self.solution {
            if self.obj >= upper_limit - 1e-6 {
                return;
            }
            let lhs: f64 = cols.iter().zip(vals).map(|(&c, &v)| v * sol[c]).sum();
            debug_assert!(lhs <= rhs + 1e-6, "conflict cuts off the debug solution");
        }
    }
}

/// Global solver state shared between the search and the enclosing
/// solver. Writes are serialized by the single-threaded search.
pub struct SolverContext {
    /// Problem data.
    pub model: Rc<MipModel>,

    /// Domain snapshot at the global root.
    pub global_domain: Domain,

    /// Objective cutoff derived from the incumbent.
    pub upper_limit: f64,

    /// Best known feasible solution.
    pub incumbent: IncumbentTracker,

    /// Learned conflict constraints.
    pub conflict_pool: ConflictPool,

    /// Conflict-to-cut conversion hook.
    pub cut_gen: Box<dyn CutGenerator>,

    /// Root LP solution, used by the `RootSol` child selection rule.
    pub root_lp_sol: Vec<f64>,

    /// Registered symmetry information.
    pub symmetries: Option<Symmetries>,

    /// Stabilizer orbits valid at the global root.
    pub global_orbits: Option<Rc<StabilizerOrbits>>,

    /// Debug-build pruning validation.
    pub debug_solution: DebugSolution,

    /// Accumulated search statistics.
    pub stats: SearchStats,

    /// Termination limits.
    pub limits: SolveLimits,

    start_time: Instant,
}

impl SolverContext {
    /// Create the shared state for a model.
    pub fn new(model: Rc<MipModel>) -> Self {
        Self {
            global_domain: Domain::new(Rc::clone(&model)),
            model,
            upper_limit: f64::INFINITY,
            incumbent: IncumbentTracker::new(),
            conflict_pool: ConflictPool::new(),
            cut_gen: Box::new(NullCutGenerator),
            root_lp_sol: Vec::new(),
            symmetries: None,
            global_orbits: None,
            debug_solution: DebugSolution::default(),
            stats: SearchStats::default(),
            limits: SolveLimits::default(),
            start_time: Instant::now(),
        }
    }

    /// Report a feasible solution. Improvements pull the cutoff just
    /// below the new objective so equal-cost subtrees are pruned.
    pub fn add_incumbent(&mut self, sol: &[f64], obj: f64, source: IncumbentSource) -> bool {
        let improved = self.incumbent.update(sol, obj);
        if improved {
            self.upper_limit = obj - self.model.feastol;
            log::info!(
                "New incumbent: obj={:.6e} ({})",
                obj,
                source.as_char()
            );
        }
        improved
    }

    /// Whether a termination limit has been hit. `node_offset` counts
    /// nodes visited by the calling search but not yet flushed.
    pub fn check_limits(&self, node_offset: i64) -> bool {
        if self.limits.interrupted.get() {
            return true;
        }
        if let Some(limit) = self.limits.node_limit {
            if self.stats.num_nodes + node_offset >= limit {
                return true;
            }
        }
        if let Some(limit) = self.limits.time_limit {
            if self.start_time.elapsed() >= limit {
                return true;
            }
        }
        false
    }

    /// Request cooperative termination.
    pub fn interrupt(&self) {
        self.limits.interrupted.set(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VarType;
    use sprs::TriMat;

    fn tiny_model() -> Rc<MipModel> {
        let tri: TriMat<f64> = TriMat::new((0, 2));
        Rc::new(
            MipModel::new(
                vec![1.0, 1.0],
                tri.to_csr(),
                vec![],
                vec![],
                vec![0.0, 0.0],
                vec![1.0, 1.0],
                vec![VarType::Integer, VarType::Integer],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_incumbent_pulls_cutoff() {
        let mut ctx = SolverContext::new(tiny_model());
        assert!(ctx.add_incumbent(&[1.0, 1.0], 2.0, IncumbentSource::Tree));
        assert!(ctx.upper_limit < 2.0);
        assert_eq!(ctx.incumbent.update_count, 1);

        // worse solution rejected, cutoff untouched
        let cutoff = ctx.upper_limit;
        assert!(!ctx.add_incumbent(&[1.0, 1.0], 3.0, IncumbentSource::Tree));
        assert_eq!(ctx.upper_limit, cutoff);
    }

    #[test]
    fn test_limits() {
        let mut ctx = SolverContext::new(tiny_model());
        assert!(!ctx.check_limits(0));

        ctx.limits.node_limit = Some(10);
        assert!(!ctx.check_limits(9));
        assert!(ctx.check_limits(10));

        ctx.limits.node_limit = None;
        ctx.interrupt();
        assert!(ctx.check_limits(0));
    }

    #[test]
    fn test_incumbent_source_tags() {
        assert_eq!(IncumbentSource::Tree.as_char(), 'T');
        assert_eq!(IncumbentSource::StrongBranching.as_char(), 'B');
        assert_eq!(IncumbentSource::Heuristic.as_char(), 'H');
    }
}
