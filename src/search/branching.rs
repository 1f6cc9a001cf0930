//! Branching candidate selection by reliability pseudocost branching
//! with bidirectional strong-branch probing.

use rand::Rng;

use super::driver::Search;
use super::node::NodeResult;
use super::queue::NodeQueue;
use crate::domain::{BoundType, DomainChange};
use crate::model::{IncumbentSource, SolverContext};
use crate::relax::{LpAlgorithm, Relaxation};
use crate::settings::ChildSelectionRule;

/// Probe LPs above this iteration count force a basis re-seed.
const BASISSTART_THRESHOLD: i64 = 20;

const RELIABLE_UP: u8 = 1;
const RELIABLE_DOWN: u8 = 2;

impl<R: Relaxation> Search<R> {
    fn branching_var_reliable_at_node(&self, col: usize) -> bool {
        self.reliable_at_node
            .get(&col)
            .map_or(false, |&flags| flags == RELIABLE_UP | RELIABLE_DOWN)
    }

    fn mark_up_reliable_at_node(&mut self, col: usize) {
        *self.reliable_at_node.entry(col).or_insert(0) |= RELIABLE_UP;
    }

    fn mark_down_reliable_at_node(&mut self, col: usize) {
        *self.reliable_at_node.entry(col).or_insert(0) |= RELIABLE_DOWN;
    }

    /// Convert the current node into a single-sided split toward the
    /// direction that survived a failed probe.
    fn single_sided_reduction(&mut self, col: usize, probed_up: bool, frac: f64) {
        if probed_up {
            self.branch_downwards(col, frac.floor(), frac);
        } else {
            self.branch_upwards(col, frac.ceil(), frac);
        }
        let reduced = self.nodestack.len() - 2;
        self.nodestack[reduced].opensubtrees = 0;
        self.nodestack[reduced].skip_depth_count = 1;
        self.depthoffset -= 1;
    }

    /// Pick a branching candidate among the LP's fractional integers.
    ///
    /// Returns the index into the fractional-integer list, or `None`
    /// when a probe already reduced the node to a single-sided split.
    /// Aside from accepted reductions, domain and LP state are restored
    /// before returning.
    pub fn select_branching_candidate(
        &mut self,
        ctx: &mut SolverContext,
        queue: &NodeQueue,
        max_sb_iters: i64,
    ) -> Option<usize> {
        let fracints: Vec<(usize, f64)> = self.lp.fractional_integers().to_vec();
        debug_assert!(!fracints.is_empty());
        let numfrac = fracints.len();
        let feastol = self.model.feastol;

        let mut upscore = vec![f64::INFINITY; numfrac];
        let mut downscore = vec![f64::INFINITY; numfrac];
        let mut up_reliable = vec![false; numfrac];
        let mut down_reliable = vec![false; numfrac];

        // seed candidates that need no probing
        for k in 0..numfrac {
            let (col, fracval) = fracints[k];
            debug_assert!(fracval > self.localdom.col_lower[col] + feastol);
            debug_assert!(fracval < self.localdom.col_upper[col] - feastol);

            if self.pseudocost.is_reliable(col) || self.branching_var_reliable_at_node(col) {
                upscore[k] = self.pseudocost.pseudocost_up(col, fracval, 0.0);
                downscore[k] = self.pseudocost.pseudocost_down(col, fracval, 0.0);
                up_reliable[k] = true;
                down_reliable[k] = true;
            }
        }

        let node_objective = self.nodestack.last().unwrap().lp_objective;
        let mut min_score = feastol;
        let mut reset_basis = false;

        loop {
            let must_stop = self.strong_branching_lp_iterations(ctx) >= max_sb_iters
                || ctx.check_limits(self.nnodes);

            // best candidate by score; ties go to the candidate whose
            // queue split promises the most balanced subtree counts
            let old_min_score = min_score;
            let mut best = 0usize;
            let mut best_score = -1.0;
            let mut best_nodes = -1.0;
            let mut best_num_nodes = 0i64;
            for k in 0..numfrac {
                if upscore[k] <= old_min_score {
                    up_reliable[k] = true;
                }
                if downscore[k] <= old_min_score {
                    down_reliable[k] = true;
                }
                let floor = 1e-3
                    * f64::min(
                        if up_reliable[k] { upscore[k] } else { 0.0 },
                        if down_reliable[k] { downscore[k] } else { 0.0 },
                    );
                min_score = min_score.max(floor);

                let (col, fracval) = fracints[k];
                let score = if upscore[k] <= old_min_score || downscore[k] <= old_min_score {
                    self.pseudocost.score(
                        col,
                        upscore[k].min(old_min_score),
                        downscore[k].min(old_min_score),
                    )
                } else if upscore[k] == f64::INFINITY || downscore[k] == f64::INFINITY {
                    if must_stop {
                        self.pseudocost.score_fractional(col, fracval)
                    } else {
                        f64::INFINITY
                    }
                } else {
                    self.pseudocost.score(col, upscore[k], downscore[k])
                };
                debug_assert!(score >= 0.0);

                let upnodes = queue.num_nodes_up(col);
                let downnodes = queue.num_nodes_down(col);
                let num_nodes = upnodes + downnodes;
                let nodes = if num_nodes != 0 {
                    (downnodes as f64 / num_nodes as f64) * (upnodes as f64 / num_nodes as f64)
                } else {
                    0.0
                };
                if score > best_score
                    || (score > best_score - feastol
                        && (nodes, num_nodes) > (best_nodes, best_num_nodes))
                {
                    best_score = score;
                    best = k;
                    best_nodes = nodes;
                    best_num_nodes = num_nodes;
                }
            }
            let candidate = best;

            if (up_reliable[candidate] && down_reliable[candidate]) || must_stop {
                if reset_basis {
                    let basis = self.nodestack.last().unwrap().basis.clone();
                    self.lp.set_stored_basis(basis);
                    self.lp.recover_basis();
                    self.lp.run();
                }
                return Some(candidate);
            }

            self.lp.set_objective_limit(ctx.upper_limit);

            let (col, fracval) = fracints[candidate];
            let upval = fracval.ceil();
            let downval = fracval.floor();

            // probe the unreliable direction, down first
            let probe_up = down_reliable[candidate];
            let domchg = if probe_up {
                DomainChange {
                    column: col,
                    bound_type: BoundType::Lower,
                    bound_val: upval,
                }
            } else {
                DomainChange {
                    column: col,
                    bound_type: BoundType::Upper,
                    bound_val: downval,
                }
            };

            let mut inferences = -(self.localdom.num_domain_changes() as i64) - 1;
            let mut orbital_fixing = self.nodestack.last().unwrap().stabilizer_orbits.is_some()
                && self.orbits_valid_in_child(&domchg);
            self.localdom.change_bound(domchg);
            self.localdom.propagate();

            if self.localdom.infeasible() {
                orbital_fixing = false;
            }
            if orbital_fixing {
                let orbits = self
                    .nodestack
                    .last()
                    .unwrap()
                    .stabilizer_orbits
                    .clone()
                    .expect("checked above");
                orbits.orbital_fixing(&mut self.localdom);
            }
            inferences += self.localdom.num_domain_changes() as i64;

            if self.localdom.infeasible() {
                self.localdom.conflict_analysis(&mut ctx.conflict_pool);
                self.pseudocost.add_cutoff_observation(col, probe_up);
                self.localdom.backtrack();
                self.localdom.clear_changed_cols();

                self.single_sided_reduction(col, probe_up, fracval);
                let basis = self.nodestack.last().unwrap().basis.clone();
                self.lp.set_stored_basis(basis);
                return None;
            }

            self.pseudocost.add_inference_observation(col, inferences, probe_up);
            self.lp.flush_domain(&mut self.localdom);

            reset_basis = true;
            let old_iters = self.lp.iterations();
            let status = self.lp.run();
            let numiters = self.lp.iterations() - old_iters;
            self.lp_iterations += numiters;
            self.sb_lp_iterations += numiters;

            if status.scaled_optimal() {
                self.lp.reset_ages();

                let delta = domchg.bound_val - fracval;
                let sol = self.lp.solution().to_vec();
                let (solobj, integer_feasible) = self.model.check_solution(&sol);

                let mut objdelta = (solobj - node_objective).max(0.0);
                if objdelta <= self.model.epsilon {
                    objdelta = 0.0;
                }

                if probe_up {
                    upscore[candidate] = objdelta;
                    up_reliable[candidate] = true;
                    self.mark_up_reliable_at_node(col);
                } else {
                    downscore[candidate] = objdelta;
                    down_reliable[candidate] = true;
                    self.mark_down_reliable_at_node(col);
                }
                self.pseudocost.add_observation(col, delta, objdelta);

                // dual inferences: candidates the probe pushed onto an
                // integer side inherit the probe's objective delta
                for k in 0..numfrac {
                    let (other_col, other_frac) = fracints[k];
                    let other_down = other_frac.floor();
                    let other_up = other_frac.ceil();
                    if sol[other_col] <= other_down + feastol {
                        if objdelta <= min_score
                            && self.localdom.col_upper[other_col] <= other_down + feastol
                        {
                            self.pseudocost
                                .add_observation(other_col, other_down - other_frac, objdelta);
                        }
                        downscore[k] = downscore[k].min(objdelta);
                    } else if sol[other_col] >= other_up - feastol {
                        if objdelta <= min_score
                            && self.localdom.col_lower[other_col] >= other_up - feastol
                        {
                            self.pseudocost
                                .add_observation(other_col, other_up - other_frac, objdelta);
                        }
                        upscore[k] = upscore[k].min(objdelta);
                    }
                }

                if status.unscaled_primal_feasible() && integer_feasible {
                    let cutoffbnd = self.cutoff_bound(ctx);
                    let source = if self.in_heuristic {
                        IncumbentSource::Heuristic
                    } else {
                        IncumbentSource::StrongBranching
                    };
                    ctx.add_incumbent(&sol, solobj, source);
                    if ctx.upper_limit < cutoffbnd {
                        self.lp.set_objective_limit(ctx.upper_limit);
                    }
                }

                if status.unscaled_dual_feasible() {
                    if solobj > self.cutoff_bound(ctx) {
                        ctx.debug_solution.node_pruned(&self.localdom, ctx.upper_limit);
                        self.add_bound_exceeding_conflict(ctx);
                        self.localdom.backtrack();
                        self.lp.flush_domain(&mut self.localdom);

                        self.single_sided_reduction(col, probe_up, fracval);
                        let basis = self.nodestack.last().unwrap().basis.clone();
                        self.lp.set_stored_basis(basis);
                        if numiters > BASISSTART_THRESHOLD {
                            self.lp.recover_basis();
                        }
                        return None;
                    }
                } else if solobj > self.cutoff_bound(ctx) {
                    self.add_bound_exceeding_conflict(ctx);
                    self.localdom.propagate();
                    if self.localdom.infeasible() {
                        self.localdom.backtrack();
                        self.lp.flush_domain(&mut self.localdom);

                        self.single_sided_reduction(col, probe_up, fracval);
                        let basis = self.nodestack.last().unwrap().basis.clone();
                        self.lp.set_stored_basis(basis);
                        if numiters > BASISSTART_THRESHOLD {
                            self.lp.recover_basis();
                        }
                        return None;
                    }
                }
            } else if status.infeasible() {
                ctx.debug_solution.node_pruned(&self.localdom, ctx.upper_limit);
                self.add_infeasible_conflict(ctx);
                self.pseudocost.add_cutoff_observation(col, probe_up);
                self.localdom.backtrack();
                self.lp.flush_domain(&mut self.localdom);

                self.single_sided_reduction(col, probe_up, fracval);
                let basis = self.nodestack.last().unwrap().basis.clone();
                self.lp.set_stored_basis(basis);
                if numiters > BASISSTART_THRESHOLD {
                    self.lp.recover_basis();
                }
                return None;
            } else {
                // LP error: zero both scores so the candidate is avoided
                downscore[candidate] = 0.0;
                upscore[candidate] = 0.0;
                down_reliable[candidate] = true;
                up_reliable[candidate] = true;
                self.mark_up_reliable_at_node(col);
                self.mark_down_reliable_at_node(col);
            }

            self.localdom.backtrack();
            self.lp.flush_domain(&mut self.localdom);
            if numiters > BASISSTART_THRESHOLD {
                self.lp.recover_basis();
            }
        }
    }

    /// Map the chosen column and fractional value to a branching
    /// direction via the configured child selection rule.
    fn apply_child_selection(
        &mut self,
        ctx: &SolverContext,
        queue: &NodeQueue,
        col: usize,
        frac: f64,
    ) -> DomainChange {
        let up = DomainChange {
            column: col,
            bound_type: BoundType::Lower,
            bound_val: frac.ceil(),
        };
        let down = DomainChange {
            column: col,
            bound_type: BoundType::Upper,
            bound_val: frac.floor(),
        };
        let feastol = self.model.feastol;
        let epsilon = self.model.epsilon;

        match self.child_selection {
            ChildSelectionRule::Up => up,
            ChildSelectionRule::Down => down,
            ChildSelectionRule::RootSol => {
                let mut down_prio = self.pseudocost.avg_inferences_down(col) + epsilon;
                let mut up_prio = self.pseudocost.avg_inferences_up(col) + epsilon;
                let down_val = frac.floor();
                let up_val = frac.ceil();

                if !self.subroot_sol.is_empty() {
                    let root_sol = self.subroot_sol[col].clamp(down_val, up_val);
                    up_prio *= 1.0 + (frac - root_sol);
                    down_prio *= 1.0 + (root_sol - frac);
                } else {
                    if self.nodestack.last().unwrap().lp_objective != f64::NEG_INFINITY {
                        self.subroot_sol = self.lp.solution().to_vec();
                    }
                    if !ctx.root_lp_sol.is_empty() {
                        let root_sol = ctx.root_lp_sol[col].clamp(down_val, up_val);
                        up_prio *= 1.0 + (frac - root_sol);
                        down_prio *= 1.0 + (root_sol - frac);
                    }
                }
                if up_prio + epsilon >= down_prio {
                    up
                } else {
                    down
                }
            }
            ChildSelectionRule::Obj => {
                if self.model.col_cost(col) >= 0.0 {
                    up
                } else {
                    down
                }
            }
            ChildSelectionRule::Random => {
                if self.random.gen_bool(0.5) {
                    up
                } else {
                    down
                }
            }
            ChildSelectionRule::BestCost => {
                if self.pseudocost.pseudocost_up(col, frac, feastol)
                    > self.pseudocost.pseudocost_down(col, frac, feastol)
                {
                    down
                } else {
                    up
                }
            }
            ChildSelectionRule::WorstCost => {
                if self.pseudocost.pseudocost_up(col, frac, 0.0)
                    >= self.pseudocost.pseudocost_down(col, frac, 0.0)
                {
                    up
                } else {
                    down
                }
            }
            ChildSelectionRule::Disjunction => {
                let up_nodes = queue.num_nodes_up(col);
                let down_nodes = queue.num_nodes_down(col);
                if up_nodes > down_nodes {
                    up
                } else if down_nodes > up_nodes {
                    down
                } else if self.model.col_cost(col) >= 0.0 {
                    up
                } else {
                    down
                }
            }
            ChildSelectionRule::HybridInferenceCost => {
                let up_score = (1.0 + self.pseudocost.avg_inferences_up(col))
                    / self.pseudocost.pseudocost_up(col, frac, feastol);
                let down_score = (1.0 + self.pseudocost.avg_inferences_down(col))
                    / self.pseudocost.pseudocost_down(col, frac, feastol);
                if up_score >= down_score {
                    up
                } else {
                    down
                }
            }
        }
    }

    /// Fallback branching column when the LP gave no usable fractional
    /// candidate: any integral column with room, ranked by pseudocost.
    fn choose_fallback_column(&mut self) {
        let top = self.nodestack.len() - 1;
        let mut best_score = -1.0;

        let model = std::rc::Rc::clone(&self.model);
        for &col in &model.integral_cols {
            if self.localdom.col_upper[col] - self.localdom.col_lower[col] < 0.5 {
                continue;
            }
            let lo = self.localdom.col_lower[col];
            let hi = self.localdom.col_upper[col];

            let mut fracval = 0.5;
            if lo != f64::NEG_INFINITY && hi != f64::INFINITY {
                fracval = (0.5 * (lo + hi + 0.5)).floor() + 0.5;
            }
            if lo != f64::NEG_INFINITY {
                fracval = lo + 0.5;
            } else if hi != f64::INFINITY {
                fracval = hi - 0.5;
            }

            let score = self.pseudocost.score_fractional(col, fracval);
            debug_assert!(score >= 0.0);

            if score > best_score {
                best_score = score;
                if self.model.col_cost(col) >= 0.0 {
                    let upval = fracval.ceil();
                    self.nodestack[top].branching_point = upval;
                    self.nodestack[top].branching_decision = Some(DomainChange {
                        column: col,
                        bound_type: BoundType::Lower,
                        bound_val: upval,
                    });
                } else {
                    let downval = fracval.floor();
                    self.nodestack[top].branching_point = downval;
                    self.nodestack[top].branching_decision = Some(DomainChange {
                        column: col,
                        bound_type: BoundType::Upper,
                        bound_val: downval,
                    });
                }
            }
        }
    }

    /// Last resort when the LP could not be solved at all: rebuild a
    /// fresh relaxation and retry with presolve, then primal simplex,
    /// then interior point. Failing all of that the node is declared
    /// infeasible.
    fn evaluate_with_fresh_lp(&mut self, ctx: &mut SolverContext) -> NodeResult {
        self.lp.set_iteration_limit(None);

        let mut fresh = self.lp.fresh(&self.localdom);
        fresh.set_presolve(true);
        std::mem::swap(&mut self.lp, &mut fresh);

        let mut result = self.evaluate_node(ctx);

        if result == NodeResult::Open {
            self.lp.clear_solver();
            self.lp.set_algorithm(LpAlgorithm::PrimalSimplex);
            result = self.evaluate_node(ctx);
            self.lp.set_algorithm(LpAlgorithm::DualSimplex);

            if result == NodeResult::Open {
                self.lp.clear_solver();
                self.lp.set_algorithm(LpAlgorithm::InteriorPoint);
                result = self.evaluate_node(ctx);

                if result == NodeResult::Open {
                    log::warn!(
                        "Failed to solve node with all integer columns fixed. \
                         Declaring node infeasible."
                    );
                    self.nodestack.last_mut().unwrap().opensubtrees = 0;
                    result = NodeResult::LpInfeasible;
                }
            }
        }

        std::mem::swap(&mut self.lp, &mut fresh);
        result
    }

    /// Select a branching, choose the first child, and push its frame.
    pub fn branch(&mut self, ctx: &mut SolverContext, queue: &NodeQueue) -> NodeResult {
        debug_assert!(self.localdom.changed_cols().is_empty());
        debug_assert_eq!(self.nodestack.last().unwrap().opensubtrees, 2);

        self.nodestack.last_mut().unwrap().branching_decision = None;
        self.in_branching = true;

        let minrel = self.pseudocost.min_reliable();
        let mut result = NodeResult::Open;

        while self.nodestack.last().unwrap().opensubtrees == 2
            && self.lp.status().scaled_optimal()
            && !self.lp.fractional_integers().is_empty()
        {
            // shrink the reliability requirement as the strong-branching
            // budget drains
            let mut sb_max_iters = 0i64;
            if minrel > 0 {
                let sb_iters = self.strong_branching_lp_iterations(ctx);
                sb_max_iters = 100_000
                    + ((self.total_lp_iterations(ctx)
                        - self.heuristic_lp_iterations(ctx)
                        - self.strong_branching_lp_iterations(ctx))
                        >> 1);
                if sb_iters > sb_max_iters {
                    self.pseudocost.set_min_reliable(0);
                } else if sb_iters > sb_max_iters / 2 {
                    let reduction_ratio = (sb_iters - sb_max_iters / 2) as f64
                        / (sb_max_iters - sb_max_iters / 2) as f64;
                    let minrel_reduced =
                        (minrel as f64 - reduction_ratio * (minrel - 1) as f64) as i32;
                    self.pseudocost.set_min_reliable(minrel.min(minrel_reduced));
                }
            }

            let degeneracy = self.lp.compute_degeneracy(&self.localdom);
            self.pseudocost.set_degeneracy_factor(degeneracy);
            if degeneracy >= 10.0 {
                self.pseudocost.set_min_reliable(0);
            }

            match self.select_branching_candidate(ctx, queue, sb_max_iters) {
                Some(cand) => {
                    let (col, fracval) = self.lp.fractional_integers()[cand];
                    let decision = self.apply_child_selection(ctx, queue, col, fracval);
                    let top = self.nodestack.len() - 1;
                    self.nodestack[top].branching_point = fracval;
                    self.nodestack[top].branching_decision = Some(decision);
                    result = NodeResult::Branched;
                    break;
                }
                None => {
                    // the node was reduced to a single-sided split;
                    // evaluate the new child
                    debug_assert!(!self.localdom.changed_cols().is_empty());
                    result = self.evaluate_node(ctx);
                }
            }
        }

        self.in_branching = false;
        self.pseudocost.set_min_reliable(minrel);
        self.pseudocost.set_degeneracy_factor(1.0);

        let top = self.nodestack.len() - 1;
        debug_assert!(matches!(self.nodestack[top].opensubtrees, 0 | 2));
        if self.nodestack[top].opensubtrees != 2 {
            return result;
        }

        if self.nodestack[top].branching_decision.is_none() {
            // LP-driven selection failed; pick any integral column with
            // a non-unit range
            self.choose_fallback_column();
        }

        if self.nodestack[top].branching_decision.is_none() {
            return self.evaluate_with_fresh_lp(ctx);
        }

        let decision = self.nodestack[top]
            .branching_decision
            .expect("set by selection or fallback");
        let branch_point = self.nodestack[top].branching_point;
        self.push_child(decision, branch_point);
        NodeResult::Branched
    }
}
