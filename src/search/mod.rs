//! Branch-and-bound tree exploration.

mod branching;
mod driver;
mod evaluate;
mod node;
mod queue;

pub use driver::Search;
pub use node::{NodeFrame, NodeResult};
pub use queue::{NodeQueue, OpenNode};
