//! Canopy: branch-and-bound tree search core for mixed-integer
//! programming.
//!
//! This crate implements the tree exploration layer of an LP-based MIP
//! solver: reliability pseudocost branching with bidirectional
//! strong-branch probing, a per-node evaluation pipeline (propagation,
//! LP resolve, reduced-cost fixing, conflict recording), and an explicit
//! dive / backtrack / plunge stack that can suspend open subtrees to an
//! external priority queue.
//!
//! The LP engine is injected behind the [`relax::Relaxation`] trait; the
//! crate never solves an LP itself. Domain propagation, pseudocost
//! learning, conflict pooling and symmetry-driven orbital fixing are
//! provided here.
//!
//! # Structure
//!
//! - [`search::Search`] drives the tree: `dive`, `branch`, `backtrack`,
//!   `backtrack_plunge`, `install_node`, queue suspension.
//! - [`model::SolverContext`] carries the state shared with the
//!   enclosing solver: incumbent, cutoff, conflict pool, statistics and
//!   limits.
//! - [`domain::Domain`] holds the local bounds with a backtrackable
//!   change stack and activity-based propagation.
//! - [`pseudocost::PseudocostStore`] accumulates per-variable branching
//!   statistics.

#![warn(missing_docs)]

pub mod conflict;
pub mod domain;
pub mod error;
pub mod model;
pub mod pseudocost;
pub mod redcost;
pub mod relax;
pub mod search;
pub mod settings;
pub mod sym;

pub use conflict::{Conflict, ConflictPool, ConflictSource, CutGenerator, NullCutGenerator};
pub use domain::{BoundType, Domain, DomainChange};
pub use error::{SearchError, SearchResult};
pub use model::{
    DebugSolution, IncumbentSource, IncumbentTracker, MipModel, SearchStats, SolveLimits,
    SolverContext, VarType,
};
pub use pseudocost::PseudocostStore;
pub use relax::{DualProof, LpAlgorithm, LpBasis, LpStatus, Relaxation};
pub use search::{NodeFrame, NodeQueue, NodeResult, OpenNode, Search};
pub use settings::{ChildSelectionRule, SearchSettings};
pub use sym::{StabilizerOrbits, Symmetries};
