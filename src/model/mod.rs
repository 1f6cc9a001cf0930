//! Problem data and shared solver state.

mod context;
mod problem;

pub use context::{
    DebugSolution, IncumbentSource, IncumbentTracker, SearchStats, SolveLimits, SolverContext,
};
pub use problem::{MipModel, VarType};
