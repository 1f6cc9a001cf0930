//! Per-node evaluation: propagate, resolve the LP, fix by reduced
//! costs, record conflicts and classify the outcome.

use super::driver::Search;
use super::node::NodeResult;
use crate::conflict::ConflictSource;
use crate::domain::BoundType;
use crate::model::IncumbentSource;
use crate::model::SolverContext;
use crate::redcost;
use crate::relax::{LpStatus, Relaxation};

impl<R: Relaxation> Search<R> {
    /// Record a dual proof that the node's objective exceeds the global
    /// upper limit, feeding both the conflict pool and the cut
    /// generator.
    pub(crate) fn add_bound_exceeding_conflict(&mut self, ctx: &mut SolverContext) {
        if ctx.upper_limit == f64::INFINITY {
            return;
        }
        if let Some(proof) = self.lp.compute_dual_proof(&ctx.global_domain, ctx.upper_limit) {
            if ctx.global_domain.infeasible() {
                return;
            }
            self.localdom.conflict_analysis_row(
                &proof.cols,
                &proof.vals,
                proof.rhs,
                ConflictSource::DualProof,
                &mut ctx.conflict_pool,
            );
            ctx.debug_solution
                .check_cut(&proof.cols, &proof.vals, proof.rhs, ctx.upper_limit);
            ctx.cut_gen
                .generate_conflict(&self.localdom, &proof.cols, &proof.vals, proof.rhs);
        }
    }

    /// Record a dual ray proof of LP infeasibility.
    pub(crate) fn add_infeasible_conflict(&mut self, ctx: &mut SolverContext) {
        if let Some(proof) = self.lp.compute_dual_inf_proof(&ctx.global_domain) {
            if ctx.global_domain.infeasible() {
                return;
            }
            self.localdom.conflict_analysis_row(
                &proof.cols,
                &proof.vals,
                proof.rhs,
                ConflictSource::DualInfeasibilityProof,
                &mut ctx.conflict_pool,
            );
            ctx.debug_solution
                .check_cut(&proof.cols, &proof.vals, proof.rhs, ctx.upper_limit);
            ctx.cut_gen
                .generate_conflict(&self.localdom, &proof.cols, &proof.vals, proof.rhs);
        }
    }

    /// Attribute a cutoff to the parent's branching, when the branching
    /// actually moved the variable.
    fn parent_cutoff_observation(&mut self) {
        let top = self.nodestack.len() - 1;
        if top == 0 {
            return;
        }
        let parent = &self.nodestack[top - 1];
        if parent.lp_objective == f64::NEG_INFINITY {
            return;
        }
        let decision = match parent.branching_decision {
            Some(d) => d,
            None => return,
        };
        if decision.bound_val != parent.branching_point {
            self.pseudocost
                .add_cutoff_observation(decision.column, decision.bound_type == BoundType::Lower);
        }
    }

    /// Process the current top frame once.
    ///
    /// Reduced-cost fixing that produces new bound changes re-enters the
    /// pipeline; the re-entry is the loop below.
    pub fn evaluate_node(&mut self, ctx: &mut SolverContext) -> NodeResult {
        debug_assert!(!self.nodestack.is_empty());

        let mut result;
        loop {
            let top = self.nodestack.len() - 1;

            self.localdom.propagate();

            if !self.localdom.infeasible() {
                let sym_active = ctx.symmetries.as_ref().map_or(false, |s| s.num_perms > 0);
                if sym_active && self.nodestack[top].stabilizer_orbits.is_none() {
                    let parent_allows = match top.checked_sub(1) {
                        None => true,
                        Some(p) => self.nodestack[p]
                            .stabilizer_orbits
                            .as_ref()
                            .map_or(true, |o| !o.orbit_cols.is_empty()),
                    };
                    if parent_allows {
                        let sym = ctx.symmetries.as_ref().expect("checked above");
                        self.nodestack[top].stabilizer_orbits =
                            Some(sym.compute_stabilizer_orbits(&self.localdom));
                    }
                }

                if let Some(orbits) = self.nodestack[top].stabilizer_orbits.clone() {
                    orbits.orbital_fixing(&mut self.localdom);
                }
            }

            if top > 0 {
                let inferences = self.localdom.num_domain_changes() as i64
                    - (self.nodestack[top].domchg_stack_pos as i64 + 1);
                if let Some(decision) = self.nodestack[top - 1].branching_decision {
                    self.pseudocost.add_inference_observation(
                        decision.column,
                        inferences,
                        decision.bound_type == BoundType::Lower,
                    );
                }
            }

            result = NodeResult::Open;

            if self.localdom.infeasible() {
                result = NodeResult::DomainInfeasible;
                self.localdom.clear_changed_cols();
                self.parent_cutoff_observation();
                self.localdom.conflict_analysis(&mut ctx.conflict_pool);
                break;
            }

            self.lp.flush_domain(&mut self.localdom);
            self.lp.set_objective_limit(ctx.upper_limit);

            let old_iters = self.lp.iterations();
            let status = self.lp.resolve(&mut self.localdom);
            let numiters = self.lp.iterations() - old_iters;
            self.lp_iterations += numiters;
            if self.in_heuristic {
                self.heur_lp_iterations += numiters;
            }

            if self.localdom.infeasible() {
                result = NodeResult::DomainInfeasible;
                self.localdom.clear_changed_cols();
                self.parent_cutoff_observation();
                self.localdom.conflict_analysis(&mut ctx.conflict_pool);
                break;
            }

            if status.scaled_optimal() {
                self.lp.store_basis();
                self.lp.reset_ages();

                self.nodestack[top].basis = self.lp.stored_basis();
                self.nodestack[top].estimate = self.lp.best_estimate(&self.pseudocost);
                self.nodestack[top].lp_objective = self.lp.objective();

                if top > 0 {
                    let parent = &self.nodestack[top - 1];
                    let parent_obj = parent.lp_objective;
                    let parent_point = parent.branching_point;
                    if let Some(decision) = parent.branching_decision {
                        if parent_obj != f64::NEG_INFINITY && decision.bound_val != parent_point {
                            let delta = decision.bound_val - parent_point;
                            let objdelta =
                                (self.nodestack[top].lp_objective - parent_obj).max(0.0);
                            self.pseudocost.add_observation(decision.column, delta, objdelta);
                        }
                    }
                }

                if status.unscaled_primal_feasible() && self.lp.fractional_integers().is_empty() {
                    result = NodeResult::BoundExceeding;
                    let cutoffbnd = self.cutoff_bound(ctx);
                    let source = if self.in_heuristic {
                        IncumbentSource::Heuristic
                    } else {
                        IncumbentSource::Tree
                    };
                    let obj = self.lp.objective();
                    let sol = self.lp.solution().to_vec();
                    ctx.add_incumbent(&sol, obj, source);
                    if ctx.upper_limit < cutoffbnd {
                        self.lp.set_objective_limit(ctx.upper_limit);
                    }
                    self.add_bound_exceeding_conflict(ctx);
                }

                if result == NodeResult::Open {
                    if status.unscaled_dual_feasible() {
                        self.nodestack[top].lower_bound = self.nodestack[top]
                            .lower_bound
                            .max(self.nodestack[top].lp_objective);

                        if self.nodestack[top].lower_bound > self.cutoff_bound(ctx) {
                            result = NodeResult::BoundExceeding;
                            self.add_bound_exceeding_conflict(ctx);
                        } else if ctx.upper_limit != f64::INFINITY {
                            redcost::propagate_redcost(
                                &self.model,
                                &mut self.localdom,
                                &self.lp,
                                ctx.upper_limit,
                            );
                            if self.localdom.infeasible() {
                                result = NodeResult::BoundExceeding;
                                self.add_bound_exceeding_conflict(ctx);
                                self.localdom.clear_changed_cols();
                            } else if !self.localdom.changed_cols().is_empty() {
                                // tightened bounds invalidate the solve
                                continue;
                            }
                        }
                    } else if self.lp.objective() > self.cutoff_bound(ctx) {
                        // dual feasibility was lost to scaling; derive the
                        // proof as if bound exceeding and repropagate
                        self.add_bound_exceeding_conflict(ctx);
                        self.localdom.propagate();
                        if self.localdom.infeasible() {
                            result = NodeResult::BoundExceeding;
                        }
                    }
                }
            } else if status.infeasible() {
                result = if status == LpStatus::ObjectiveBound {
                    NodeResult::BoundExceeding
                } else {
                    NodeResult::LpInfeasible
                };
                self.add_infeasible_conflict(ctx);
                self.parent_cutoff_observation();
            }

            break;
        }

        if result != NodeResult::Open {
            ctx.debug_solution.node_pruned(&self.localdom, ctx.upper_limit);
            self.treeweight += 0.5f64.powi((self.current_depth() - 1) as i32);
            self.nodestack.last_mut().unwrap().opensubtrees = 0;
        }

        result
    }
}
