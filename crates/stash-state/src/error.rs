//! Error types for the stash state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors a `StateStore` backend may report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Not Found")]
    NotFound,

    /// The record is locked by `holder`.
    #[error("Locked Conflict")]
    LockedConflict { holder: String },

    #[error("Not Yet Implemented: {0}")]
    NotImplemented(&'static str),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Current lock holder, if this is a lock conflict.
    pub fn holder(&self) -> Option<&str> {
        match self {
            StoreError::LockedConflict { holder } => Some(holder.as_str()),
            _ => None,
        }
    }
}
