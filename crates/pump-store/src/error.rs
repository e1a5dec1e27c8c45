//! Store Error Types

use pump_core::{PumpError, RunStatus};
use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Store error types
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Row lookup failed
    #[error("{0} not found")]
    NotFound(String),

    /// A run is already queued or running
    #[error("Run {0} is already active")]
    AlreadyRunning(i64),

    /// Run status change rejected
    #[error("Invalid transition for run {id}: {from} -> {to}")]
    InvalidTransition { id: i64, from: RunStatus, to: RunStatus },

    /// Caller supplied unusable data
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// Stored value could not be read back
    #[error("Corrupt row: {0}")]
    Decode(String),

    /// Database directory could not be created
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(what) => format!("{what} not found"),
            Self::AlreadyRunning(_) => "Agent is already running".into(),
            Self::InvalidTransition { from, to, .. } => {
                format!("Run cannot move from {from} to {to}")
            }
            Self::Invalid(msg) => msg.clone(),
            _ => "A database error occurred.".into(),
        }
    }
}

impl From<StoreError> for PumpError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::AlreadyRunning(id) => Self::AlreadyRunning(id),
            StoreError::InvalidTransition { from, to, .. } => Self::InvalidTransition { from, to },
            other => Self::Other(other.to_string()),
        }
    }
}
