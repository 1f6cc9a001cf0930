//! Configuration settings for the tree search.

/// Rule for choosing which child of a branching is explored first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildSelectionRule {
    /// Always take the up branch first.
    Up,

    /// Always take the down branch first.
    Down,

    /// Lean toward the side closer to the cached root LP solution,
    /// scaled by average inference counts.
    #[default]
    RootSol,

    /// Follow the sign of the objective coefficient.
    Obj,

    /// Uniform random direction.
    Random,

    /// Explore the cheaper side (smaller pseudocost) first.
    BestCost,

    /// Explore the more expensive side (larger pseudocost) first.
    WorstCost,

    /// Follow the side with more pending nodes in the global queue,
    /// ties broken by the objective sign.
    Disjunction,

    /// Maximize `(1 + avg inferences) / pseudocost` per side.
    HybridInferenceCost,
}

/// Tree search settings.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// Child selection rule applied after a branching variable is chosen.
    pub child_selection: ChildSelectionRule,

    /// Samples required in both directions before a pseudocost is
    /// considered reliable. Driven to 0 under strong-branching pressure.
    pub min_reliable: u32,

    /// Seed for the `Random` child selection rule.
    pub random_seed: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            child_selection: ChildSelectionRule::RootSol,
            min_reliable: 8,
            random_seed: 0,
        }
    }
}

impl SearchSettings {
    /// Settings for a sub-MIP solve, where inference-driven child
    /// selection outperforms the root-solution rule.
    pub fn submip() -> Self {
        Self {
            child_selection: ChildSelectionRule::HybridInferenceCost,
            ..Default::default()
        }
    }

    /// Set the child selection rule.
    pub fn with_child_selection(mut self, rule: ChildSelectionRule) -> Self {
        self.child_selection = rule;
        self
    }

    /// Set the pseudocost reliability threshold.
    pub fn with_min_reliable(mut self, n: u32) -> Self {
        self.min_reliable = n;
        self
    }

    /// Set the random seed.
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }
}
