//! Local variable domains with a backtrackable change stack.
//!
//! The search owns one `Domain`, seeded from the global domain snapshot.
//! Branching decisions and propagated implications are recorded on a
//! single change stack; `backtrack` undoes everything up to and including
//! the most recent branching decision.

use std::rc::Rc;

use crate::conflict::{Conflict, ConflictPool, ConflictSource};
use crate::model::MipModel;

/// Which side of a variable's domain a change tightens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundType {
    /// Lower bound (an up branch raises it).
    Lower,

    /// Upper bound (a down branch lowers it).
    Upper,
}

/// A single bound change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainChange {
    /// Column the change applies to.
    pub column: usize,

    /// Side being tightened.
    pub bound_type: BoundType,

    /// New bound value.
    pub bound_val: f64,
}

impl DomainChange {
    /// Down branch: `x <= floor(value)`.
    pub fn down_branch(column: usize, value: f64) -> Self {
        Self {
            column,
            bound_type: BoundType::Upper,
            bound_val: value.floor(),
        }
    }

    /// Up branch: `x >= ceil(value)`.
    pub fn up_branch(column: usize, value: f64) -> Self {
        Self {
            column,
            bound_type: BoundType::Lower,
            bound_val: value.ceil(),
        }
    }
}

const MAX_PROPAGATE_ROUNDS: usize = 64;

/// Backtrackable variable domains plus activity-based propagation over
/// the model rows.
#[derive(Clone)]
pub struct Domain {
    model: Rc<MipModel>,

    /// Current local lower bounds.
    pub col_lower: Vec<f64>,

    /// Current local upper bounds.
    pub col_upper: Vec<f64>,

    global_lower: Vec<f64>,
    global_upper: Vec<f64>,

    domchg_stack: Vec<DomainChange>,
    prev_bounds: Vec<f64>,
    branching_positions: Vec<usize>,

    changed_cols: Vec<usize>,
    changed_mask: Vec<bool>,

    infeasible_pos: Option<usize>,
    feastol: f64,
}

impl Domain {
    /// Create a domain at the model's global bounds.
    pub fn new(model: Rc<MipModel>) -> Self {
        let n = model.num_cols();
        let feastol = model.feastol;
        Self {
            col_lower: model.col_lower.clone(),
            col_upper: model.col_upper.clone(),
            global_lower: model.col_lower.clone(),
            global_upper: model.col_upper.clone(),
            model,
            domchg_stack: Vec::new(),
            prev_bounds: Vec::new(),
            branching_positions: Vec::new(),
            changed_cols: Vec::new(),
            changed_mask: vec![false; n],
            infeasible_pos: None,
            feastol,
        }
    }

    /// Whether the domain is currently empty.
    pub fn infeasible(&self) -> bool {
        self.infeasible_pos.is_some()
    }

    /// The applied change stack, oldest first.
    pub fn domain_change_stack(&self) -> &[DomainChange] {
        &self.domchg_stack
    }

    /// Total number of applied changes.
    pub fn num_domain_changes(&self) -> usize {
        self.domchg_stack.len()
    }

    /// Stack positions holding branching decisions.
    pub fn branching_positions(&self) -> &[usize] {
        &self.branching_positions
    }

    /// Columns whose bounds changed since the last clear.
    pub fn changed_cols(&self) -> &[usize] {
        &self.changed_cols
    }

    /// Forget all changed-column marks.
    pub fn clear_changed_cols(&mut self) {
        for &col in &self.changed_cols {
            self.changed_mask[col] = false;
        }
        self.changed_cols.clear();
    }

    /// Forget changed-column marks recorded after position `keep`.
    pub fn clear_changed_cols_from(&mut self, keep: usize) {
        let keep = keep.min(self.changed_cols.len());
        for &col in &self.changed_cols[keep..] {
            self.changed_mask[col] = false;
        }
        self.changed_cols.truncate(keep);
    }

    /// Whether the column is binary in the global domain.
    pub fn is_global_binary(&self, col: usize) -> bool {
        self.model.var_types[col].is_integral()
            && self.global_lower[col] == 0.0
            && self.global_upper[col] == 1.0
    }

    /// Whether the column is binary in the current local domain.
    pub fn is_binary(&self, col: usize) -> bool {
        self.model.var_types[col].is_integral()
            && self.col_lower[col] >= 0.0
            && self.col_upper[col] <= 1.0
    }

    fn mark_changed(&mut self, col: usize) {
        if !self.changed_mask[col] {
            self.changed_mask[col] = true;
            self.changed_cols.push(col);
        }
    }

    fn apply(&mut self, chg: DomainChange) {
        let prev = match chg.bound_type {
            BoundType::Lower => {
                let prev = self.col_lower[chg.column];
                self.col_lower[chg.column] = chg.bound_val;
                prev
            }
            BoundType::Upper => {
                let prev = self.col_upper[chg.column];
                self.col_upper[chg.column] = chg.bound_val;
                prev
            }
        };
        self.domchg_stack.push(chg);
        self.prev_bounds.push(prev);
        self.mark_changed(chg.column);

        if self.infeasible_pos.is_none()
            && self.col_lower[chg.column] > self.col_upper[chg.column] + self.feastol
        {
            self.infeasible_pos = Some(self.domchg_stack.len());
        }
    }

    /// Apply a branching decision.
    pub fn change_bound(&mut self, chg: DomainChange) {
        self.branching_positions.push(self.domchg_stack.len());
        self.apply(chg);
    }

    /// Apply a non-branching tightening (implication, neighbourhood
    /// restriction, orbital fixing).
    pub fn tighten_bound(&mut self, chg: DomainChange) {
        self.apply(chg);
    }

    fn pop_change(&mut self) -> DomainChange {
        let chg = self.domchg_stack.pop().expect("change stack underflow");
        let prev = self.prev_bounds.pop().expect("change stack underflow");
        match chg.bound_type {
            BoundType::Lower => self.col_lower[chg.column] = prev,
            BoundType::Upper => self.col_upper[chg.column] = prev,
        }
        self.mark_changed(chg.column);
        if let Some(pos) = self.infeasible_pos {
            if self.domchg_stack.len() < pos {
                self.infeasible_pos = None;
            }
        }
        chg
    }

    /// Undo all changes up to and including the most recent branching
    /// decision, returning it. With no branching on the stack, undoes
    /// everything and returns `None`.
    pub fn backtrack(&mut self) -> Option<DomainChange> {
        let target = self.branching_positions.pop();
        match target {
            Some(pos) => {
                let mut last = None;
                while self.domchg_stack.len() > pos {
                    last = Some(self.pop_change());
                }
                last
            }
            None => {
                self.backtrack_to_global();
                None
            }
        }
    }

    /// Undo every change, returning to the global snapshot.
    pub fn backtrack_to_global(&mut self) {
        while !self.domchg_stack.is_empty() {
            self.pop_change();
        }
        self.branching_positions.clear();
        self.infeasible_pos = None;
    }

    /// Replace the change stack, replaying `stack` from the global
    /// snapshot. Entries at positions in `branchings` are branching
    /// decisions.
    pub fn set_domain_change_stack(&mut self, stack: &[DomainChange], branchings: &[usize]) {
        self.backtrack_to_global();
        let mut next_branching = branchings.iter().peekable();
        for (i, chg) in stack.iter().enumerate() {
            if next_branching.peek() == Some(&&i) {
                next_branching.next();
                self.change_bound(*chg);
            } else {
                self.tighten_bound(*chg);
            }
        }
    }

    /// Compress the change stack for queue storage: per inter-branching
    /// segment only the last change per column and bound side survives.
    /// Returns the reduced stack and the branching positions within it.
    pub fn reduced_domain_change_stack(&self) -> (Vec<DomainChange>, Vec<usize>) {
        let mut reduced = Vec::new();
        let mut branchings = Vec::new();

        let mut segment_start = 0;
        let mut boundaries: Vec<usize> = self.branching_positions.clone();
        boundaries.push(self.domchg_stack.len());

        for &boundary in &boundaries {
            // keep the last change per (column, side) within the segment
            let segment = &self.domchg_stack[segment_start..boundary];
            let mut keep = vec![true; segment.len()];
            for (i, chg) in segment.iter().enumerate() {
                for later in segment.iter().skip(i + 1) {
                    if later.column == chg.column && later.bound_type == chg.bound_type {
                        keep[i] = false;
                        break;
                    }
                }
            }
            for (i, chg) in segment.iter().enumerate() {
                if keep[i] {
                    reduced.push(*chg);
                }
            }
            if boundary < self.domchg_stack.len() {
                branchings.push(reduced.len());
                reduced.push(self.domchg_stack[boundary]);
            }
            segment_start = boundary + 1;
        }

        (reduced, branchings)
    }

    /// Record a conflict clause excluding the current branching path.
    ///
    /// Only extracted when every branching on the stack fixes a globally
    /// binary column; general-integer paths are left to the LP proofs.
    pub fn conflict_analysis(&self, pool: &mut ConflictPool) {
        if self.branching_positions.is_empty() {
            return;
        }

        let mut cols = Vec::with_capacity(self.branching_positions.len());
        let mut vals = Vec::with_capacity(self.branching_positions.len());
        let mut num_up = 0usize;
        for &pos in &self.branching_positions {
            let chg = self.domchg_stack[pos];
            if !self.is_global_binary(chg.column) {
                return;
            }
            match chg.bound_type {
                BoundType::Upper if chg.bound_val == 0.0 => {
                    cols.push(chg.column);
                    vals.push(-1.0);
                }
                BoundType::Lower if chg.bound_val == 1.0 => {
                    cols.push(chg.column);
                    vals.push(1.0);
                    num_up += 1;
                }
                _ => return,
            }
        }

        pool.add(Conflict::new(
            cols,
            vals,
            num_up as f64 - 1.0,
            ConflictSource::DomainPropagation,
        ));
    }

    /// Record an LP proof row as a conflict constraint.
    pub fn conflict_analysis_row(
        &self,
        cols: &[usize],
        vals: &[f64],
        rhs: f64,
        source: ConflictSource,
        pool: &mut ConflictPool,
    ) {
        pool.add(Conflict::new(cols.to_vec(), vals.to_vec(), rhs, source));
    }

    /// Propagate row activities to a fixpoint, tightening variable bounds.
    pub fn propagate(&mut self) {
        if self.infeasible() {
            return;
        }

        for _ in 0..MAX_PROPAGATE_ROUNDS {
            let mut any_change = false;

            for row in 0..self.model.num_rows() {
                if self.propagate_row(row, &mut any_change) {
                    return; // infeasible
                }
            }

            if !any_change {
                break;
            }
        }
    }

    /// Propagate one row. Returns true when infeasibility was detected.
    fn propagate_row(&mut self, row: usize, any_change: &mut bool) -> bool {
        let a = Rc::clone(&self.model);
        let view = match a.a.outer_view(row) {
            Some(v) => v,
            None => return false,
        };

        // minimum and maximum activity with infinite contributions counted
        let mut min_sum = 0.0;
        let mut min_inf = 0usize;
        let mut max_sum = 0.0;
        let mut max_inf = 0usize;
        for (col, &val) in view.iter() {
            let (lo_contrib, hi_contrib) = if val > 0.0 {
                (val * self.col_lower[col], val * self.col_upper[col])
            } else {
                (val * self.col_upper[col], val * self.col_lower[col])
            };
            if lo_contrib.is_finite() {
                min_sum += lo_contrib;
            } else {
                min_inf += 1;
            }
            if hi_contrib.is_finite() {
                max_sum += hi_contrib;
            } else {
                max_inf += 1;
            }
        }

        let row_lower = a.row_lower[row];
        let row_upper = a.row_upper[row];

        if min_inf == 0 && min_sum > row_upper + self.feastol {
            self.infeasible_pos = Some(self.domchg_stack.len());
            return true;
        }
        if max_inf == 0 && max_sum < row_lower - self.feastol {
            self.infeasible_pos = Some(self.domchg_stack.len());
            return true;
        }

        for (col, &val) in view.iter() {
            let (lo_contrib, hi_contrib) = if val > 0.0 {
                (val * self.col_lower[col], val * self.col_upper[col])
            } else {
                (val * self.col_upper[col], val * self.col_lower[col])
            };

            // residual minimum activity of the other columns
            let residual_min = if lo_contrib.is_finite() {
                if min_inf == 0 {
                    Some(min_sum - lo_contrib)
                } else {
                    None
                }
            } else if min_inf == 1 {
                Some(min_sum)
            } else {
                None
            };
            let residual_max = if hi_contrib.is_finite() {
                if max_inf == 0 {
                    Some(max_sum - hi_contrib)
                } else {
                    None
                }
            } else if max_inf == 1 {
                Some(max_sum)
            } else {
                None
            };

            if row_upper.is_finite() {
                if let Some(res) = residual_min {
                    let limit = (row_upper - res) / val;
                    if val > 0.0 {
                        self.try_tighten_upper(col, limit, any_change);
                    } else {
                        self.try_tighten_lower(col, limit, any_change);
                    }
                }
            }
            if row_lower.is_finite() {
                if let Some(res) = residual_max {
                    let limit = (row_lower - res) / val;
                    if val > 0.0 {
                        self.try_tighten_lower(col, limit, any_change);
                    } else {
                        self.try_tighten_upper(col, limit, any_change);
                    }
                }
            }

            if self.infeasible() {
                return true;
            }
        }

        false
    }

    fn try_tighten_upper(&mut self, col: usize, mut bound: f64, any_change: &mut bool) {
        if self.model.var_types[col].is_integral() {
            bound = (bound + self.feastol).floor();
        }
        if bound < self.col_upper[col] - self.feastol {
            self.tighten_bound(DomainChange {
                column: col,
                bound_type: BoundType::Upper,
                bound_val: bound,
            });
            *any_change = true;
        }
    }

    fn try_tighten_lower(&mut self, col: usize, mut bound: f64, any_change: &mut bool) {
        if self.model.var_types[col].is_integral() {
            bound = (bound - self.feastol).ceil();
        }
        if bound > self.col_lower[col] + self.feastol {
            self.tighten_bound(DomainChange {
                column: col,
                bound_type: BoundType::Lower,
                bound_val: bound,
            });
            *any_change = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VarType;
    use sprs::TriMat;

    fn model() -> Rc<MipModel> {
        // x0 + x1 <= 1, x0 + x2 >= 1, all binary
        let mut tri = TriMat::new((2, 3));
        tri.add_triplet(0, 0, 1.0);
        tri.add_triplet(0, 1, 1.0);
        tri.add_triplet(1, 0, 1.0);
        tri.add_triplet(1, 2, 1.0);
        Rc::new(
            MipModel::new(
                vec![1.0, 1.0, 1.0],
                tri.to_csr(),
                vec![f64::NEG_INFINITY, 1.0],
                vec![1.0, f64::INFINITY],
                vec![0.0; 3],
                vec![1.0; 3],
                vec![VarType::Integer; 3],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_change_and_backtrack() {
        let mut dom = Domain::new(model());
        dom.change_bound(DomainChange::up_branch(0, 0.5));
        assert_eq!(dom.col_lower[0], 1.0);
        assert_eq!(dom.branching_positions(), &[0]);

        dom.propagate();
        // x0 = 1 forces x1 = 0 through row 0
        assert!(!dom.infeasible());
        assert_eq!(dom.col_upper[1], 0.0);

        let branching = dom.backtrack().unwrap();
        assert_eq!(branching.column, 0);
        assert_eq!(dom.col_lower[0], 0.0);
        assert_eq!(dom.col_upper[1], 1.0);
        assert!(dom.domain_change_stack().is_empty());
    }

    #[test]
    fn test_propagation_infeasibility() {
        let mut dom = Domain::new(model());
        dom.change_bound(DomainChange::down_branch(0, 0.5)); // x0 = 0
        dom.change_bound(DomainChange::down_branch(2, 0.5)); // x2 = 0
        dom.propagate();
        // row 1 requires x0 + x2 >= 1
        assert!(dom.infeasible());

        dom.backtrack();
        assert!(!dom.infeasible());
    }

    #[test]
    fn test_backtrack_to_global() {
        let mut dom = Domain::new(model());
        let lower0 = dom.col_lower.clone();
        let upper0 = dom.col_upper.clone();

        dom.change_bound(DomainChange::up_branch(0, 0.5));
        dom.propagate();
        dom.change_bound(DomainChange::up_branch(2, 0.5));
        dom.backtrack_to_global();

        assert_eq!(dom.col_lower, lower0);
        assert_eq!(dom.col_upper, upper0);
        assert!(dom.branching_positions().is_empty());
    }

    #[test]
    fn test_replay_stack() {
        let mut dom = Domain::new(model());
        dom.change_bound(DomainChange::up_branch(0, 0.5));
        dom.propagate();
        let (stack, branchings) = dom.reduced_domain_change_stack();
        assert_eq!(branchings, vec![0]);

        let mut replay = Domain::new(model());
        replay.set_domain_change_stack(&stack, &branchings);
        assert_eq!(replay.col_lower, dom.col_lower);
        assert_eq!(replay.col_upper, dom.col_upper);
        assert_eq!(replay.branching_positions().len(), 1);
    }

    #[test]
    fn test_reduced_stack_compression() {
        let mut dom = Domain::new(model());
        // two tightenings of the same side before a branching
        dom.tighten_bound(DomainChange {
            column: 2,
            bound_type: BoundType::Upper,
            bound_val: 0.9,
        });
        dom.tighten_bound(DomainChange {
            column: 2,
            bound_type: BoundType::Upper,
            bound_val: 0.8,
        });
        dom.change_bound(DomainChange::down_branch(0, 0.5));

        let (stack, branchings) = dom.reduced_domain_change_stack();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack[0].bound_val, 0.8);
        assert_eq!(branchings, vec![1]);
    }

    #[test]
    fn test_conflict_clause() {
        let mut dom = Domain::new(model());
        dom.change_bound(DomainChange::down_branch(0, 0.5)); // x0 = 0
        dom.change_bound(DomainChange::up_branch(1, 0.5)); // x1 = 1

        let mut pool = ConflictPool::new();
        dom.conflict_analysis(&mut pool);
        assert_eq!(pool.len(), 1);

        let conflict = &pool.conflicts()[0];
        assert_eq!(conflict.cols, vec![0, 1]);
        assert_eq!(conflict.vals, vec![-1.0, 1.0]);
        assert_eq!(conflict.rhs, 0.0);
    }

    #[test]
    fn test_changed_cols_tracking() {
        let mut dom = Domain::new(model());
        dom.change_bound(DomainChange::up_branch(0, 0.5));
        dom.propagate();
        assert!(dom.changed_cols().contains(&0));
        assert!(dom.changed_cols().contains(&1));

        let keep = 1;
        dom.clear_changed_cols_from(keep);
        assert_eq!(dom.changed_cols().len(), 1);

        dom.clear_changed_cols();
        assert!(dom.changed_cols().is_empty());
    }
}
