//! Reduced-cost fixing against the objective cutoff.

use crate::domain::{BoundType, Domain, DomainChange};
use crate::model::MipModel;
use crate::relax::Relaxation;

/// Tighten integral variable bounds using the LP reduced costs and the
/// known upper limit.
///
/// A variable with reduced cost `d` cannot move more than
/// `(cutoff - lp_objective) / |d|` from its LP value without pushing the
/// objective past the cutoff. New bounds are recorded on the domain as
/// propagated changes.
pub fn propagate_redcost<R: Relaxation>(
    model: &MipModel,
    dom: &mut Domain,
    lp: &R,
    cutoff: f64,
) {
    let gap = cutoff - lp.objective();
    if !gap.is_finite() || gap < 0.0 {
        return;
    }

    let sol = lp.solution();
    let redcost = lp.reduced_costs();
    let feastol = model.feastol;

    for &col in &model.integral_cols {
        let d = redcost[col];
        if d > feastol {
            let bound = (sol[col] + gap / d + feastol).floor();
            if bound < dom.col_upper[col] - feastol {
                dom.tighten_bound(DomainChange {
                    column: col,
                    bound_type: BoundType::Upper,
                    bound_val: bound,
                });
            }
        } else if d < -feastol {
            let bound = (sol[col] - gap / -d - feastol).ceil();
            if bound > dom.col_lower[col] + feastol {
                dom.tighten_bound(DomainChange {
                    column: col,
                    bound_type: BoundType::Lower,
                    bound_val: bound,
                });
            }
        }
        if dom.infeasible() {
            return;
        }
    }
}
