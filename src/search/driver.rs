//! Search driver: the dive / branch / backtrack state machine.

use std::collections::HashMap;
use std::rc::Rc;

use rand::rngs::SmallRng;
use rand::SeedableRng;

use super::node::{NodeFrame, NodeResult};
use super::queue::{NodeQueue, OpenNode};
use crate::domain::{BoundType, Domain, DomainChange};
use crate::model::{MipModel, SolverContext};
use crate::pseudocost::PseudocostStore;
use crate::relax::{LpBasis, Relaxation};
use crate::settings::{ChildSelectionRule, SearchSettings};

/// Depth-first tree explorer over a borrowed LP relaxation.
///
/// The stack of [`NodeFrame`]s mirrors the root-to-leaf path applied to
/// the local domain; every mutation of the domain is matched by a
/// backtrack when the corresponding frame closes.
pub struct Search<R: Relaxation> {
    pub(crate) lp: R,
    pub(crate) model: Rc<MipModel>,
    pub(crate) localdom: Domain,
    pub(crate) pseudocost: PseudocostStore,
    pub(crate) nodestack: Vec<NodeFrame>,

    pub(crate) depthoffset: i64,
    pub(crate) nnodes: i64,
    pub(crate) treeweight: f64,
    pub(crate) lp_iterations: i64,
    pub(crate) heur_lp_iterations: i64,
    pub(crate) sb_lp_iterations: i64,

    pub(crate) upper_limit: f64,
    pub(crate) in_heuristic: bool,
    pub(crate) in_branching: bool,
    pub(crate) child_selection: ChildSelectionRule,
    pub(crate) subroot_sol: Vec<f64>,
    pub(crate) reliable_at_node: HashMap<usize, u8>,
    pub(crate) random: SmallRng,
}

impl<R: Relaxation> Search<R> {
    /// Create a search over `lp`, seeded with a copy of the global
    /// pseudocost statistics.
    pub fn new(
        lp: R,
        ctx: &SolverContext,
        mut pseudocost: PseudocostStore,
        settings: &SearchSettings,
    ) -> Self {
        pseudocost.set_min_reliable(settings.min_reliable as i32);
        Self {
            lp,
            model: Rc::clone(&ctx.model),
            localdom: ctx.global_domain.clone(),
            pseudocost,
            nodestack: Vec::new(),
            depthoffset: 0,
            nnodes: 0,
            treeweight: 0.0,
            lp_iterations: 0,
            heur_lp_iterations: 0,
            sb_lp_iterations: 0,
            upper_limit: f64::INFINITY,
            in_heuristic: false,
            in_branching: false,
            child_selection: settings.child_selection,
            subroot_sol: Vec::new(),
            reliable_at_node: HashMap::new(),
            random: SmallRng::seed_from_u64(settings.random_seed),
        }
    }

    /// Logical depth of the current node.
    pub fn current_depth(&self) -> i64 {
        self.nodestack.len() as i64 + self.depthoffset
    }

    /// Whether a node is on the stack.
    pub fn has_node(&self) -> bool {
        !self.nodestack.is_empty()
    }

    /// The active root-to-leaf path, for inspection by the enclosing
    /// solver.
    pub fn frames(&self) -> &[NodeFrame] {
        &self.nodestack
    }

    /// The search's local domain.
    pub fn local_domain(&self) -> &Domain {
        &self.localdom
    }

    /// The LP relaxation the search drives.
    pub fn relaxation(&self) -> &R {
        &self.lp
    }

    /// Mutable access to the LP relaxation, for the enclosing solver.
    pub fn relaxation_mut(&mut self) -> &mut R {
        &mut self.lp
    }

    /// The search's pseudocost statistics.
    pub fn pseudocost(&self) -> &PseudocostStore {
        &self.pseudocost
    }

    /// Nodes visited since the last statistics flush.
    pub fn num_nodes(&self) -> i64 {
        self.nnodes
    }

    /// Tree weight pruned since the last statistics flush.
    pub fn tree_weight(&self) -> f64 {
        self.treeweight
    }

    /// LP iterations since the last statistics flush.
    pub fn local_lp_iterations(&self) -> i64 {
        self.lp_iterations
    }

    /// Strong-branching LP iterations since the last statistics flush.
    pub fn local_sb_lp_iterations(&self) -> i64 {
        self.sb_lp_iterations
    }

    /// Heuristic-mode LP iterations since the last statistics flush.
    pub fn local_heuristic_lp_iterations(&self) -> i64 {
        self.heur_lp_iterations
    }

    /// Local plus flushed LP iterations.
    pub fn total_lp_iterations(&self, ctx: &SolverContext) -> i64 {
        self.lp_iterations + ctx.stats.total_lp_iterations
    }

    /// Local plus flushed strong-branching LP iterations.
    pub fn strong_branching_lp_iterations(&self, ctx: &SolverContext) -> i64 {
        self.sb_lp_iterations + ctx.stats.sb_lp_iterations
    }

    /// Local plus flushed heuristic LP iterations.
    pub fn heuristic_lp_iterations(&self, ctx: &SolverContext) -> i64 {
        self.heur_lp_iterations + ctx.stats.heuristic_lp_iterations
    }

    /// Objective cutoff at the current node.
    pub fn cutoff_bound(&self, ctx: &SolverContext) -> f64 {
        ctx.upper_limit.min(self.upper_limit)
    }

    /// Restrict the local objective cutoff, as heuristic sub-searches do.
    pub fn set_upper_limit(&mut self, upper_limit: f64) {
        self.upper_limit = upper_limit;
    }

    /// Mark this search as running inside a primal heuristic: incumbents
    /// carry the heuristic tag and LP effort is attributed separately.
    pub fn set_heuristic_mode(&mut self, on: bool) {
        self.in_heuristic = on;
    }

    /// Whether branching-candidate selection is currently running; LP
    /// state observed from outside is transient while this holds.
    pub fn is_branching(&self) -> bool {
        self.in_branching
    }

    /// Change the pseudocost reliability threshold.
    pub fn set_min_reliable(&mut self, min_reliable: i32) {
        self.pseudocost.set_min_reliable(min_reliable);
    }

    /// Push a fresh frame for the current domain state.
    pub fn create_new_node(&mut self) {
        let mut frame = NodeFrame::new();
        frame.domchg_stack_pos = self.localdom.num_domain_changes();
        self.nodestack.push(frame);
    }

    /// Close the current node without exploring its children.
    pub fn cutoff_node(&mut self) {
        if let Some(frame) = self.nodestack.last_mut() {
            frame.opensubtrees = 0;
        }
    }

    /// Whether a branching keeps the current stabilizer valid in the
    /// child it creates.
    pub(crate) fn orbits_valid_in_child(&self, chg: &DomainChange) -> bool {
        let frame = self.nodestack.last().expect("no current node");
        match &frame.stabilizer_orbits {
            None => true,
            Some(orbits) => {
                if orbits.orbit_cols.is_empty() || orbits.is_stabilized(chg.column) {
                    return true;
                }
                // a down branch on a binary keeps the stabilizer valid
                chg.bound_type == BoundType::Upper && self.localdom.is_global_binary(chg.column)
            }
        }
    }

    pub(crate) fn push_child(&mut self, decision: DomainChange, branch_point: f64) {
        let top = self.nodestack.len() - 1;
        debug_assert_eq!(self.nodestack[top].opensubtrees, 2);
        debug_assert!(self.model.var_type(decision.column).is_integral());

        self.nodestack[top].opensubtrees = 1;
        self.nodestack[top].branching_point = branch_point;
        self.nodestack[top].branching_decision = Some(decision);

        let domchg_pos = self.localdom.num_domain_changes();
        let pass_orbits = self.orbits_valid_in_child(&decision);
        self.localdom.change_bound(decision);

        let parent = &self.nodestack[top];
        let mut child = NodeFrame::child(
            parent.lower_bound,
            parent.estimate,
            parent.basis.clone(),
            if pass_orbits {
                parent.stabilizer_orbits.clone()
            } else {
                None
            },
        );
        child.domchg_stack_pos = domchg_pos;
        self.nodestack.push(child);
    }

    /// Branch the current node downwards only: `col <= new_ub`.
    pub fn branch_downwards(&mut self, col: usize, new_ub: f64, branch_point: f64) {
        self.push_child(
            DomainChange {
                column: col,
                bound_type: BoundType::Upper,
                bound_val: new_ub,
            },
            branch_point,
        );
    }

    /// Branch the current node upwards only: `col >= new_lb`.
    pub fn branch_upwards(&mut self, col: usize, new_lb: f64, branch_point: f64) {
        self.push_child(
            DomainChange {
                column: col,
                bound_type: BoundType::Lower,
                bound_val: new_lb,
            },
            branch_point,
        );
    }

    /// Reset the local domain to the global snapshot.
    pub fn reset_local_domain(&mut self, ctx: &SolverContext) {
        self.localdom = ctx.global_domain.clone();
        self.lp.sync_bounds(&self.localdom);
    }

    /// Pop a suspended subtree from the queue into this search: replay
    /// its domain and push its frame. Global symmetry orbits are kept
    /// only when every branching along the path preserves them.
    pub fn install_node(&mut self, ctx: &SolverContext, node: OpenNode) {
        self.localdom
            .set_domain_change_stack(&node.domchg_stack, &node.branchings);

        let mut orbits_valid = ctx.global_orbits.is_some();
        if let Some(sym) = &ctx.symmetries {
            if orbits_valid {
                for &pos in self.localdom.branching_positions() {
                    let chg = self.localdom.domain_change_stack()[pos];
                    if !sym.is_active(chg.column) {
                        continue;
                    }
                    if !ctx.global_domain.is_binary(chg.column)
                        || (chg.bound_type == BoundType::Lower && chg.bound_val == 1.0)
                    {
                        orbits_valid = false;
                        break;
                    }
                }
            }
        } else {
            orbits_valid = false;
        }

        let mut frame = NodeFrame::child(
            node.lower_bound,
            node.estimate,
            None,
            if orbits_valid {
                ctx.global_orbits.clone()
            } else {
                None
            },
        );
        frame.domchg_stack_pos = self.localdom.num_domain_changes();
        self.nodestack.push(frame);
        self.subroot_sol.clear();
        self.depthoffset = node.depth - 1;
    }

    /// Repeatedly evaluate and branch until the node closes, a limit is
    /// hit, or branching fails.
    pub fn dive(&mut self, ctx: &mut SolverContext, queue: &NodeQueue) -> NodeResult {
        self.reliable_at_node.clear();

        loop {
            self.nnodes += 1;
            let result = self.evaluate_node(ctx);

            if ctx.check_limits(self.nnodes) {
                return result;
            }
            if result != NodeResult::Open {
                return result;
            }

            let result = self.branch(ctx, queue);
            if result != NodeResult::Branched {
                return result;
            }
        }
    }

    /// Dive and backtrack until the stack empties, a limit interrupts
    /// the dive, or `max_backtracks` subtrees have been closed.
    pub fn solve_depth_first(
        &mut self,
        ctx: &mut SolverContext,
        queue: &mut NodeQueue,
        max_backtracks: i64,
    ) {
        let mut remaining = max_backtracks;
        loop {
            if remaining == 0 {
                break;
            }

            let result = self.dive(ctx, queue);
            // a limit may leave the node open
            if result == NodeResult::Open {
                break;
            }
            remaining -= 1;

            if !self.backtrack(ctx, true) {
                break;
            }
        }
    }

    fn pop_closed_frames(&mut self) -> bool {
        while self.nodestack.last().map_or(false, |f| f.opensubtrees == 0) {
            let closed = self.nodestack.pop().expect("stack checked nonempty");
            self.depthoffset += closed.skip_depth_count;

            if self.nodestack.is_empty() {
                self.localdom.backtrack_to_global();
                self.lp.flush_domain(&mut self.localdom);
                return false;
            }

            let branchchg = self.localdom.backtrack();
            self.assert_branching_matches(branchchg);

            // repropagate: conflicts learned meanwhile may close this node
            let top = self.nodestack.len() - 1;
            if self.nodestack[top].opensubtrees != 0 {
                let old_num_changes = self.localdom.num_domain_changes();
                let old_changed = self.localdom.changed_cols().len();
                self.localdom.propagate();
                if let Some(orbits) = self.nodestack[top].stabilizer_orbits.clone() {
                    if !self.localdom.infeasible()
                        && old_num_changes != self.localdom.num_domain_changes()
                    {
                        orbits.orbital_fixing(&mut self.localdom);
                    }
                }
                if self.localdom.infeasible() {
                    self.localdom.clear_changed_cols_from(old_changed);
                    self.nodestack[top].opensubtrees = 0;
                }
            }
        }
        true
    }

    fn assert_branching_matches(&self, branchchg: Option<DomainChange>) {
        if cfg!(debug_assertions) {
            if let (Some(chg), Some(decision)) = (
                branchchg,
                self.nodestack.last().and_then(|f| f.branching_decision),
            ) {
                debug_assert_eq!(chg.column, decision.column);
                debug_assert_eq!(chg.bound_type, decision.bound_type);
                match chg.bound_type {
                    BoundType::Lower => debug_assert!(chg.bound_val >= decision.bound_val),
                    BoundType::Upper => debug_assert!(chg.bound_val <= decision.bound_val),
                }
            }
        }
    }

    /// Flip the branching of the most recent frame with an open sibling.
    /// Returns the flipped decision and whether the original branching
    /// was a fallback branch (bound equal to the branching point).
    fn flip_top_branching(&mut self) -> (DomainChange, bool) {
        let top = self.nodestack.len() - 1;
        debug_assert_eq!(self.nodestack[top].opensubtrees, 1);
        self.nodestack[top].opensubtrees = 0;

        let mut decision = self.nodestack[top]
            .branching_decision
            .expect("open sibling without a branching decision");
        let fallback_branch = decision.bound_val == self.nodestack[top].branching_point;

        match decision.bound_type {
            BoundType::Lower => {
                decision.bound_type = BoundType::Upper;
                decision.bound_val = (decision.bound_val - 0.5).floor();
            }
            BoundType::Upper => {
                decision.bound_type = BoundType::Lower;
                decision.bound_val = (decision.bound_val + 0.5).ceil();
            }
        }
        self.nodestack[top].branching_decision = Some(decision);
        if fallback_branch {
            self.nodestack[top].branching_point = decision.bound_val;
        }

        (decision, fallback_branch)
    }

    /// Apply a flipped sibling branching: propagate, orbital-fix, and
    /// prune if it is already closed. On success pushes the child frame
    /// and returns `true`.
    fn enter_flipped_sibling(
        &mut self,
        ctx: &mut SolverContext,
        decision: DomainChange,
    ) -> bool {
        let top = self.nodestack.len() - 1;
        let domchg_pos = self.localdom.num_domain_changes();
        let num_changed = self.localdom.changed_cols().len();
        let pass_orbits = self.orbits_valid_in_child(&decision);
        self.localdom.change_bound(decision);

        let mut prune = self.nodestack[top].lower_bound > self.cutoff_bound(ctx)
            || self.localdom.infeasible();
        if !prune {
            self.localdom.propagate();
            prune = self.localdom.infeasible();
            if prune {
                self.localdom.conflict_analysis(&mut ctx.conflict_pool);
            }
        }
        if !prune && pass_orbits {
            if let Some(orbits) = self.nodestack[top].stabilizer_orbits.clone() {
                orbits.orbital_fixing(&mut self.localdom);
                prune = self.localdom.infeasible();
            }
        }
        if prune {
            self.localdom.backtrack();
            self.localdom.clear_changed_cols_from(num_changed);
            self.treeweight += 0.5f64.powi(self.current_depth() as i32);
            return false;
        }

        let parent = &self.nodestack[top];
        let mut child = NodeFrame::child(
            parent.lower_bound,
            parent.estimate,
            parent.basis.clone(),
            if pass_orbits {
                parent.stabilizer_orbits.clone()
            } else {
                None
            },
        );
        child.domchg_stack_pos = domchg_pos;
        self.nodestack.push(child);
        self.lp.flush_domain(&mut self.localdom);
        true
    }

    /// Pop closed frames, flip the most recent open sibling and descend
    /// into it. Returns `false` once the stack is exhausted.
    pub fn backtrack(&mut self, ctx: &mut SolverContext, recover_basis: bool) -> bool {
        if self.nodestack.is_empty() {
            return false;
        }
        debug_assert_eq!(self.nodestack.last().unwrap().opensubtrees, 0);

        loop {
            if !self.pop_closed_frames() {
                return false;
            }
            let (decision, _) = self.flip_top_branching();
            if self.enter_flipped_sibling(ctx, decision) {
                break;
            }
        }

        if recover_basis {
            if let Some(basis) = self.nodestack.last().unwrap().basis.clone() {
                self.lp.set_stored_basis(Some(basis));
                self.lp.recover_basis();
            }
        }
        true
    }

    /// Like [`Search::backtrack`], but when switching to an ancestor's
    /// unexplored sibling promises a higher score, the flipped sibling
    /// is suspended to the queue and popping continues.
    pub fn backtrack_plunge(&mut self, ctx: &mut SolverContext, queue: &mut NodeQueue) -> bool {
        if self.nodestack.is_empty() {
            return false;
        }
        debug_assert_eq!(self.nodestack.last().unwrap().opensubtrees, 0);

        loop {
            if !self.pop_closed_frames() {
                return false;
            }
            let (decision, fallback_branch) = self.flip_top_branching();

            let branch_point = if fallback_branch {
                0.5
            } else {
                self.nodestack.last().unwrap().branching_point
            };
            let node_score = match decision.bound_type {
                BoundType::Upper => self.pseudocost.score_down(decision.column, branch_point),
                BoundType::Lower => self.pseudocost.score_up(decision.column, branch_point),
            };

            if !self.enter_flipped_sibling(ctx, decision) {
                continue;
            }

            // compare against the first ancestor that still has an
            // unexplored sibling
            let mut node_to_queue = false;
            for i in (0..self.nodestack.len() - 2).rev() {
                let anc = &self.nodestack[i];
                if anc.opensubtrees == 0 {
                    continue;
                }
                let anc_decision = match anc.branching_decision {
                    Some(d) => d,
                    None => break,
                };
                let anc_fallback = anc_decision.bound_val == anc.branching_point;
                let anc_point = if anc_fallback { 0.5 } else { anc.branching_point };
                let (active, inactive) = match anc_decision.bound_type {
                    BoundType::Lower => (
                        self.pseudocost.score_up(anc_decision.column, anc_point),
                        self.pseudocost.score_down(anc_decision.column, anc_point),
                    ),
                    BoundType::Upper => (
                        self.pseudocost.score_down(anc_decision.column, anc_point),
                        self.pseudocost.score_up(anc_decision.column, anc_point),
                    ),
                };
                node_to_queue = inactive - active > node_score + self.model.feastol;
                break;
            }

            if node_to_queue {
                // suspend the flipped sibling: capture its domain before
                // undoing the branching
                self.nodestack.pop();
                let (stack, branchings) = self.localdom.reduced_domain_change_stack();
                let top = self.nodestack.len() - 1;
                queue.emplace_node(
                    stack,
                    branchings,
                    self.nodestack[top].lower_bound,
                    self.nodestack[top].estimate,
                    self.current_depth() + 1,
                );
                self.localdom.backtrack();
                self.lp.flush_domain(&mut self.localdom);
                continue;
            }
            break;
        }

        if let Some(basis) = self.nodestack.last().unwrap().basis.clone() {
            self.lp.set_stored_basis(Some(basis));
            self.lp.recover_basis();
        }
        true
    }

    /// Force-close frames until the top sits above `target_depth`, then
    /// flip the usual sibling. No pruning checks are applied.
    pub fn backtrack_until_depth(&mut self, target_depth: i64) -> bool {
        if self.nodestack.is_empty() {
            return false;
        }
        if self.current_depth() >= target_depth {
            self.nodestack.last_mut().unwrap().opensubtrees = 0;
        }

        while self.nodestack.last().unwrap().opensubtrees == 0 {
            let closed = self.nodestack.pop().expect("stack checked nonempty");
            self.depthoffset += closed.skip_depth_count;

            let branchchg = self.localdom.backtrack();
            if self.nodestack.is_empty() {
                self.lp.flush_domain(&mut self.localdom);
                return false;
            }
            self.assert_branching_matches(branchchg);

            if self.current_depth() >= target_depth {
                self.nodestack.last_mut().unwrap().opensubtrees = 0;
            }
        }

        let (decision, _) = self.flip_top_branching();
        let top = self.nodestack.len() - 1;
        let domchg_pos = self.localdom.num_domain_changes();
        let pass_orbits = self.orbits_valid_in_child(&decision);
        self.localdom.change_bound(decision);

        let parent = &self.nodestack[top];
        let mut child = NodeFrame::child(
            parent.lower_bound,
            parent.estimate,
            parent.basis.clone(),
            if pass_orbits {
                parent.stabilizer_orbits.clone()
            } else {
                None
            },
        );
        child.domchg_stack_pos = domchg_pos;
        self.nodestack.push(child);
        self.lp.flush_domain(&mut self.localdom);

        let basis = self.nodestack.last().unwrap().basis.clone();
        if let Some(basis) = basis {
            if basis.row_status.len() == self.lp.num_rows() {
                self.lp.set_stored_basis(Some(basis));
            }
        }
        self.lp.recover_basis();
        true
    }

    fn suspend_top(&mut self, ctx: &mut SolverContext, queue: &mut NodeQueue) -> bool {
        let old_changed = self.localdom.changed_cols().len();
        let top = self.nodestack.len() - 1;
        let mut prune = self.nodestack[top].lower_bound > self.cutoff_bound(ctx);
        if !prune {
            self.localdom.propagate();
            self.localdom.clear_changed_cols_from(old_changed);
            prune = self.localdom.infeasible();
            if prune {
                self.localdom.conflict_analysis(&mut ctx.conflict_pool);
            }
        }
        if !prune {
            let (stack, branchings) = self.localdom.reduced_domain_change_stack();
            queue.emplace_node(
                stack,
                branchings,
                self.nodestack[top].lower_bound,
                self.nodestack[top].estimate,
                self.current_depth(),
            );
        }
        self.nodestack[top].opensubtrees = 0;
        prune
    }

    /// Suspend the current node to the queue and backtrack past it.
    pub fn current_node_to_queue(&mut self, ctx: &mut SolverContext, queue: &mut NodeQueue) {
        let pruned = self.suspend_top(ctx, queue);
        if pruned {
            self.treeweight += 0.5f64.powi((self.current_depth() - 1) as i32);
        }

        self.backtrack(ctx, true);
        self.lp.flush_domain(&mut self.localdom);
        if let Some(frame) = self.nodestack.last() {
            if let Some(basis) = frame.basis.clone() {
                self.lp.set_stored_basis(Some(basis));
                self.lp.recover_basis();
            }
        }
    }

    /// Suspend every open node on the stack to the queue, emptying the
    /// search.
    pub fn open_nodes_to_queue(&mut self, ctx: &mut SolverContext, queue: &mut NodeQueue) {
        if self.nodestack.is_empty() {
            return;
        }

        let mut basis: Option<Rc<LpBasis>> = None;
        if self.nodestack.last().unwrap().opensubtrees == 0 {
            basis = self.nodestack.last_mut().unwrap().basis.take();
            self.backtrack(ctx, false);
        }

        while !self.nodestack.is_empty() {
            let pruned = self.suspend_top(ctx, queue);
            if pruned {
                ctx.debug_solution.node_pruned(&self.localdom, ctx.upper_limit);
                self.treeweight += 0.5f64.powi((self.current_depth() - 1) as i32);
            }
            if let Some(b) = self.nodestack.last_mut().unwrap().basis.take() {
                basis = Some(b);
            }
            self.backtrack(ctx, false);
        }

        self.lp.flush_domain(&mut self.localdom);
        if let Some(basis) = basis {
            if basis.row_status.len() == self.lp.num_rows() {
                self.lp.set_stored_basis(Some(basis));
            }
            self.lp.recover_basis();
        }
    }

    /// Atomically transfer local counters into the shared statistics.
    pub fn flush_statistics(&mut self, ctx: &mut SolverContext) {
        ctx.stats.num_nodes += self.nnodes;
        self.nnodes = 0;

        ctx.stats.pruned_treeweight += self.treeweight;
        self.treeweight = 0.0;

        ctx.stats.total_lp_iterations += self.lp_iterations;
        self.lp_iterations = 0;

        ctx.stats.heuristic_lp_iterations += self.heur_lp_iterations;
        self.heur_lp_iterations = 0;

        ctx.stats.sb_lp_iterations += self.sb_lp_iterations;
        self.sb_lp_iterations = 0;
    }

    /// Restrict the domain to the neighbourhood of `base_sol` where the
    /// relaxation already agrees with it, for RINS-style heuristics.
    pub fn set_rins_neighbourhood(&mut self, base_sol: &[f64], relax_sol: &[f64]) {
        let feastol = self.model.feastol;
        let model = Rc::clone(&self.model);
        for &col in &model.integral_cols {
            if self.localdom.col_lower[col] == self.localdom.col_upper[col] {
                continue;
            }
            let intval = (base_sol[col] + 0.5).floor();
            if (relax_sol[col] - intval).abs() >= feastol {
                continue;
            }
            if self.localdom.col_lower[col] < intval {
                self.localdom.tighten_bound(DomainChange {
                    column: col,
                    bound_type: BoundType::Lower,
                    bound_val: intval.min(self.localdom.col_upper[col]),
                });
            }
            if self.localdom.col_upper[col] > intval {
                self.localdom.tighten_bound(DomainChange {
                    column: col,
                    bound_type: BoundType::Upper,
                    bound_val: intval.max(self.localdom.col_lower[col]),
                });
            }
        }
    }

    /// Restrict the domain to rounding the relaxation solution, for
    /// RENS-style heuristics.
    pub fn set_rens_neighbourhood(&mut self, lp_sol: &[f64]) {
        let feastol = self.model.feastol;
        let model = Rc::clone(&self.model);
        for &col in &model.integral_cols {
            if self.localdom.col_lower[col] == self.localdom.col_upper[col] {
                continue;
            }
            let downval = (lp_sol[col] + feastol).floor();
            let upval = (lp_sol[col] - feastol).ceil();

            if self.localdom.col_lower[col] < downval {
                self.localdom.tighten_bound(DomainChange {
                    column: col,
                    bound_type: BoundType::Lower,
                    bound_val: downval.min(self.localdom.col_upper[col]),
                });
                if self.localdom.infeasible() {
                    return;
                }
            }
            if self.localdom.col_upper[col] > upval {
                self.localdom.tighten_bound(DomainChange {
                    column: col,
                    bound_type: BoundType::Upper,
                    bound_val: upval.max(self.localdom.col_lower[col]),
                });
                if self.localdom.infeasible() {
                    return;
                }
            }
        }
    }
}
