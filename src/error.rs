//! Error types for the decorrelation pass

use thiserror::Error;

/// Result type alias for planner and optimizer operations
pub type Result<T> = std::result::Result<T, QueryError>;

/// Main error type for the planner and optimizer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Type error: {0}")]
    Type(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
