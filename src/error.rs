//! Error types for the search core.

use thiserror::Error;

/// Errors that can occur when setting up a search.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Problem validation failed
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Inconsistent variable bounds
    #[error("Invalid bounds for column {col}: [{lower}, {upper}]")]
    InvalidBounds {
        /// Column index.
        col: usize,
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
    },
}

/// Result type for search setup operations.
pub type SearchResult<T> = Result<T, SearchError>;
