//! # pump-runtime
//!
//! Runners that drive the external research agent.
//!
//! ## Runners
//!
//! - **Claude CLI** (default): spawns the agent CLI headless and streams its
//!   stdout and stderr line by line
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pump_runtime::{AgentRunner, ClaudeCliRunner};
//!
//! let runner = ClaudeCliRunner::from_settings(&settings);
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let outcome = runner.run(&prompt, tx).await?;
//! ```

pub mod claude;
pub mod runner;

pub use claude::{ClaudeCliConfig, ClaudeCliRunner};
pub use runner::{AgentRunner, RunOutcome};

// Re-export core types for convenience
pub use pump_core::{PumpError, Result};
