//! Per-variable pseudocost learning.
//!
//! Tracks the observed objective degradation per unit of bound change in
//! each direction, plus inference and cutoff counts, and combines them
//! into branching scores.

/// Additive weight on the one-sided estimates in the product score.
const SCORE_ADD_WEIGHT: f64 = 1e-4;

/// Weight of the average-inference term in scores.
const INFERENCE_WEIGHT: f64 = 1e-4;

/// Weight of the cutoff-rate term in scores.
const CUTOFF_WEIGHT: f64 = 1e-3;

/// Learned branching statistics for every column.
#[derive(Debug, Clone)]
pub struct PseudocostStore {
    cost_up: Vec<f64>,
    cost_down: Vec<f64>,
    n_up: Vec<u32>,
    n_down: Vec<u32>,

    inferences_up: Vec<f64>,
    inferences_down: Vec<f64>,
    n_inferences_up: Vec<u32>,
    n_inferences_down: Vec<u32>,

    cutoffs_up: Vec<u32>,
    cutoffs_down: Vec<u32>,

    cost_total_up: f64,
    cost_total_down: f64,
    n_total_up: u64,
    n_total_down: u64,

    min_reliable: i32,
    degeneracy_factor: f64,
}

impl PseudocostStore {
    /// Create a store for `num_cols` columns.
    pub fn new(num_cols: usize, min_reliable: i32) -> Self {
        Self {
            cost_up: vec![0.0; num_cols],
            cost_down: vec![0.0; num_cols],
            n_up: vec![0; num_cols],
            n_down: vec![0; num_cols],
            inferences_up: vec![0.0; num_cols],
            inferences_down: vec![0.0; num_cols],
            n_inferences_up: vec![0; num_cols],
            n_inferences_down: vec![0; num_cols],
            cutoffs_up: vec![0; num_cols],
            cutoffs_down: vec![0; num_cols],
            cost_total_up: 0.0,
            cost_total_down: 0.0,
            n_total_up: 0,
            n_total_down: 0,
            min_reliable,
            degeneracy_factor: 1.0,
        }
    }

    /// Record an objective observation. `delta` is the signed bound
    /// movement away from the fractional value; its sign selects the
    /// direction.
    pub fn add_observation(&mut self, col: usize, delta: f64, objdelta: f64) {
        debug_assert!(delta != 0.0);
        debug_assert!(objdelta >= 0.0);
        let unit = objdelta / delta.abs();
        if delta > 0.0 {
            self.cost_up[col] += unit;
            self.n_up[col] += 1;
            self.cost_total_up += unit;
            self.n_total_up += 1;
        } else {
            self.cost_down[col] += unit;
            self.n_down[col] += 1;
            self.cost_total_down += unit;
            self.n_total_down += 1;
        }
    }

    /// Record how many implied domain changes a branching produced.
    pub fn add_inference_observation(&mut self, col: usize, n_inferences: i64, upward: bool) {
        if upward {
            self.inferences_up[col] += n_inferences as f64;
            self.n_inferences_up[col] += 1;
        } else {
            self.inferences_down[col] += n_inferences as f64;
            self.n_inferences_down[col] += 1;
        }
    }

    /// Record that a direction was proven infeasible.
    pub fn add_cutoff_observation(&mut self, col: usize, upward: bool) {
        if upward {
            self.cutoffs_up[col] += 1;
        } else {
            self.cutoffs_down[col] += 1;
        }
    }

    fn unit_cost_up(&self, col: usize) -> f64 {
        if self.n_up[col] > 0 {
            self.cost_up[col] / self.n_up[col] as f64
        } else if self.n_total_up > 0 {
            self.cost_total_up / self.n_total_up as f64
        } else {
            0.0
        }
    }

    fn unit_cost_down(&self, col: usize) -> f64 {
        if self.n_down[col] > 0 {
            self.cost_down[col] / self.n_down[col] as f64
        } else if self.n_total_down > 0 {
            self.cost_total_down / self.n_total_down as f64
        } else {
            0.0
        }
    }

    /// Expected objective gain of rounding `frac` up. Values below `tol`
    /// collapse to zero.
    pub fn pseudocost_up(&self, col: usize, frac: f64, tol: f64) -> f64 {
        let dist = frac.ceil() - frac;
        let value = self.unit_cost_up(col) * dist;
        if value < tol {
            0.0
        } else {
            value
        }
    }

    /// Expected objective gain of rounding `frac` down. Values below
    /// `tol` collapse to zero.
    pub fn pseudocost_down(&self, col: usize, frac: f64, tol: f64) -> f64 {
        let dist = frac - frac.floor();
        let value = self.unit_cost_down(col) * dist;
        if value < tol {
            0.0
        } else {
            value
        }
    }

    /// Average implied changes of an up branching on this column.
    pub fn avg_inferences_up(&self, col: usize) -> f64 {
        if self.n_inferences_up[col] > 0 {
            self.inferences_up[col] / self.n_inferences_up[col] as f64
        } else {
            0.0
        }
    }

    /// Average implied changes of a down branching on this column.
    pub fn avg_inferences_down(&self, col: usize) -> f64 {
        if self.n_inferences_down[col] > 0 {
            self.inferences_down[col] / self.n_inferences_down[col] as f64
        } else {
            0.0
        }
    }

    fn cutoff_rate_up(&self, col: usize) -> f64 {
        self.cutoffs_up[col] as f64 / (self.n_up[col] + self.cutoffs_up[col] + 1) as f64
    }

    fn cutoff_rate_down(&self, col: usize) -> f64 {
        self.cutoffs_down[col] as f64 / (self.n_down[col] + self.cutoffs_down[col] + 1) as f64
    }

    /// Combine two one-sided estimates into a branching score.
    ///
    /// Product form with a small additive weight, so a candidate whose
    /// worse side is still costly wins; inference and cutoff history
    /// enter with the degeneracy factor scaling their weight.
    pub fn score(&self, col: usize, up_val: f64, down_val: f64) -> f64 {
        let up = up_val.max(0.0);
        let down = down_val.max(0.0);
        let cost = up * down + SCORE_ADD_WEIGHT * (up + down);
        let learned = INFERENCE_WEIGHT
            * (self.avg_inferences_up(col) + self.avg_inferences_down(col))
            + CUTOFF_WEIGHT * (self.cutoff_rate_up(col) + self.cutoff_rate_down(col));
        cost + self.degeneracy_factor * learned
    }

    /// Score a column at a fractional value using its own pseudocosts.
    pub fn score_fractional(&self, col: usize, frac: f64) -> f64 {
        self.score(
            col,
            self.pseudocost_up(col, frac, 0.0),
            self.pseudocost_down(col, frac, 0.0),
        )
    }

    /// One-sided score of the up direction, used for plunge ranking.
    pub fn score_up(&self, col: usize, frac: f64) -> f64 {
        self.pseudocost_up(col, frac, 0.0)
            + self.degeneracy_factor
                * (INFERENCE_WEIGHT * self.avg_inferences_up(col)
                    + CUTOFF_WEIGHT * self.cutoff_rate_up(col))
    }

    /// One-sided score of the down direction, used for plunge ranking.
    pub fn score_down(&self, col: usize, frac: f64) -> f64 {
        self.pseudocost_down(col, frac, 0.0)
            + self.degeneracy_factor
                * (INFERENCE_WEIGHT * self.avg_inferences_down(col)
                    + CUTOFF_WEIGHT * self.cutoff_rate_down(col))
    }

    /// Whether both directions of a column have enough samples.
    pub fn is_reliable(&self, col: usize) -> bool {
        self.min_reliable <= 0
            || (self.n_up[col] >= self.min_reliable as u32
                && self.n_down[col] >= self.min_reliable as u32)
    }

    /// Current reliability threshold.
    pub fn min_reliable(&self) -> i32 {
        self.min_reliable
    }

    /// Change the reliability threshold.
    pub fn set_min_reliable(&mut self, min_reliable: i32) {
        self.min_reliable = min_reliable;
    }

    /// Scale the weight of learned inference history in scores.
    pub fn set_degeneracy_factor(&mut self, factor: f64) {
        debug_assert!(factor >= 1.0);
        self.degeneracy_factor = factor;
    }

    /// Number of samples in the up direction.
    pub fn num_samples_up(&self, col: usize) -> u32 {
        self.n_up[col]
    }

    /// Number of samples in the down direction.
    pub fn num_samples_down(&self, col: usize) -> u32 {
        self.n_down[col]
    }
}
