//! Agent Runner Trait
//!
//! Abstraction over whatever executes the agent, so the worker can be driven
//! by a real CLI in production and a scripted fake in tests.

use std::time::Duration;

use async_trait::async_trait;
use pump_core::Result;
use tokio::sync::mpsc::UnboundedSender;

/// How an agent process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process exited on its own
    Exited {
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        success: bool,
    },

    /// The wall-clock limit elapsed and the process was killed
    TimedOut { after: Duration },
}

impl RunOutcome {
    pub const fn success() -> Self {
        Self::Exited { code: Some(0), success: true }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Exited { success: true, .. })
    }
}

/// Executes one agent session for a prompt
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Runner name for logs and `/health`
    fn name(&self) -> &str;

    /// Whether the runner can start an agent right now
    async fn health_check(&self) -> bool;

    /// Run the agent to completion.
    ///
    /// Every output line, stdout and stderr alike, is sent on `lines` as it
    /// arrives. A closed receiver does not stop the run.
    async fn run(&self, prompt: &str, lines: UnboundedSender<String>) -> Result<RunOutcome>;
}
