//! Error Types

use thiserror::Error;

use crate::run::RunStatus;

/// Result type alias for pump-researcher operations
pub type Result<T> = std::result::Result<T, PumpError>;

/// Pump researcher error types
#[derive(Error, Debug)]
pub enum PumpError {
    /// Agent output could not be understood
    #[error("Parse error: {0}")]
    Parse(String),

    /// Agent process could not be started or driven
    #[error("Agent runner error: {0}")]
    Runner(String),

    /// Agent process exceeded its wall-clock budget
    #[error("Agent timed out after {0} seconds")]
    Timeout(u64),

    /// Illegal run status change
    #[error("Invalid run transition: {from} -> {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    /// A run is already queued or running
    #[error("Run {0} is already active")]
    AlreadyRunning(i64),

    /// Record lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl PumpError {
    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Parse(_) => "The agent returned output that could not be read.".into(),
            Self::Runner(msg) => format!("The agent could not be run: {msg}"),
            Self::Timeout(secs) => format!("The agent did not finish within {secs} seconds."),
            Self::AlreadyRunning(_) => "Agent is already running".into(),
            Self::NotFound(what) => format!("{what} not found"),
            Self::Config(msg) => format!("Configuration problem: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for PumpError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
