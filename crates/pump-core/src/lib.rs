//! # pump-core
//!
//! Shared domain types for the pump researcher.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   prompt    ┌──────────────────┐   stdout   ┌─────────────┐
//! │ pump-agents  │────────────▶│  external agent  │───────────▶│ run tracker │
//! │ (templates)  │             │  (CLI + MCP)     │            │ + log buffer│
//! └──────────────┘             └────────┬─────────┘            └──────┬──────┘
//!                                       │ SQL                         │
//!                                       ▼                             ▼
//!                              ┌──────────────────┐          ┌──────────────┐
//!                              │    pump-store    │◀─────────│ pump-server  │
//!                              └──────────────────┘          └──────────────┘
//! ```
//!
//! Nothing here talks to the network. The crate holds the records the other
//! crates pass around, the run state machine, the bounded log buffer, the
//! helpers that pull JSON out of agent output, and the settings loader.

pub mod config;
pub mod error;
pub mod extract;
pub mod mcp;
pub mod model;
pub mod run;

pub use config::Settings;
pub use error::{PumpError, Result};
pub use model::{
    AgentRun, ConfidenceLevel, DetectedPump, Finding, FindingReport, Investigation, Notification,
    Pump, PumpDetail, PumpGroup, Sentiment, Stats, Trigger, TriggerReport, TriggerType,
};
pub use run::{LogBuffer, RunStats, RunStatus, RunSummary};
