//! MIP model representation.

use sprs::CsMat;

use crate::error::{SearchError, SearchResult};

/// Type tag of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarType {
    /// Continuous variable.
    #[default]
    Continuous,

    /// Integer variable.
    Integer,

    /// Semi-continuous variable: zero or within its bounds.
    SemiContinuous,

    /// Semi-integer variable: zero or integer within its bounds.
    SemiInteger,
}

impl VarType {
    /// Whether the variable takes integral values and is eligible
    /// for branching.
    pub fn is_integral(&self) -> bool {
        matches!(self, VarType::Integer | VarType::SemiInteger)
    }
}

/// Mixed-integer problem data seen by the search.
///
/// Rows are stored row-major so domain propagation can walk them
/// directly. The search never modifies the model.
#[derive(Clone)]
pub struct MipModel {
    /// Objective coefficients.
    pub col_cost: Vec<f64>,

    /// Constraint matrix, row-major.
    pub a: CsMat<f64>,

    /// Row lower bounds (`-inf` for one-sided rows).
    pub row_lower: Vec<f64>,

    /// Row upper bounds (`+inf` for one-sided rows).
    pub row_upper: Vec<f64>,

    /// Global variable lower bounds.
    pub col_lower: Vec<f64>,

    /// Global variable upper bounds.
    pub col_upper: Vec<f64>,

    /// Variable type tags.
    pub var_types: Vec<VarType>,

    /// Indices of integral columns.
    pub integral_cols: Vec<usize>,

    /// Primal feasibility tolerance.
    pub feastol: f64,

    /// Round-off tolerance for objective deltas.
    pub epsilon: f64,
}

impl MipModel {
    /// Create a model, validating dimensions and bounds.
    pub fn new(
        col_cost: Vec<f64>,
        a: CsMat<f64>,
        row_lower: Vec<f64>,
        row_upper: Vec<f64>,
        col_lower: Vec<f64>,
        col_upper: Vec<f64>,
        var_types: Vec<VarType>,
    ) -> SearchResult<Self> {
        let n = col_cost.len();
        let m = a.rows();

        if a.cols() != n || col_lower.len() != n || col_upper.len() != n || var_types.len() != n {
            return Err(SearchError::InvalidModel(format!(
                "column data sizes disagree: {} cost entries, {} matrix columns",
                n,
                a.cols()
            )));
        }
        if row_lower.len() != m || row_upper.len() != m {
            return Err(SearchError::InvalidModel(format!(
                "row data sizes disagree: {} matrix rows, {}/{} row bounds",
                m,
                row_lower.len(),
                row_upper.len()
            )));
        }
        for col in 0..n {
            if col_lower[col] > col_upper[col] {
                return Err(SearchError::InvalidBounds {
                    col,
                    lower: col_lower[col],
                    upper: col_upper[col],
                });
            }
        }

        let a = if a.is_csr() { a } else { a.to_csr() };

        let integral_cols = var_types
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_integral())
            .map(|(i, _)| i)
            .collect();

        Ok(Self {
            col_cost,
            a,
            row_lower,
            row_upper,
            col_lower,
            col_upper,
            var_types,
            integral_cols,
            feastol: 1e-6,
            epsilon: 1e-9,
        })
    }

    /// Set the feasibility tolerance.
    pub fn with_feastol(mut self, feastol: f64) -> Self {
        self.feastol = feastol;
        self
    }

    /// Number of variables.
    pub fn num_cols(&self) -> usize {
        self.col_cost.len()
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.a.rows()
    }

    /// Type of a variable.
    pub fn var_type(&self, col: usize) -> VarType {
        self.var_types[col]
    }

    /// Objective coefficient of a variable.
    pub fn col_cost(&self, col: usize) -> f64 {
        self.col_cost[col]
    }

    /// Whether the column is binary in the global model.
    pub fn is_binary(&self, col: usize) -> bool {
        self.var_types[col].is_integral() && self.col_lower[col] == 0.0 && self.col_upper[col] == 1.0
    }

    /// Objective value of a point, and whether all integral columns sit
    /// on integer values within `feastol`.
    pub fn check_solution(&self, sol: &[f64]) -> (f64, bool) {
        let mut obj = 0.0;
        let mut integer_feasible = true;
        for (i, &v) in sol.iter().enumerate() {
            obj += v * self.col_cost[i];
            if integer_feasible && self.var_types[i].is_integral() {
                let intval = (v + 0.5).floor();
                if (v - intval).abs() > self.feastol {
                    integer_feasible = false;
                }
            }
        }
        (obj, integer_feasible)
    }

    /// Integral columns whose value in `sol` is fractional beyond `feastol`.
    pub fn fractional_integers(&self, sol: &[f64]) -> Vec<(usize, f64)> {
        let mut fracints = Vec::new();
        for &col in &self.integral_cols {
            let v = sol[col];
            let frac = (v - (v + 0.5).floor()).abs();
            if frac > self.feastol {
                fracints.push((col, v));
            }
        }
        fracints
    }
}
