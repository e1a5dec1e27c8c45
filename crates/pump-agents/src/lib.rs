//! # pump-agents
//!
//! Instructions for the external research agent, and parsers for what it
//! sends back.
//!
//! ## Workflow
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ 1. Detect    │──▶│ 2. Investigate│──▶│ 3. Save      │──▶│ 4. Notify    │
//! │ Binance/CMC  │   │ X/Reddit/web  │   │ SQL via MCP  │   │ Telegram     │
//! └──────────────┘   └───────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! The orchestrator prompt strings all four phases together for a single
//! headless agent session. The detector and investigator prompts can also be
//! issued on their own, with their outputs parsed here and stored through
//! `pump-store`.

pub mod detector;
pub mod investigator;
pub mod orchestrator;
pub mod reporter;

pub use detector::{detection_prompt, parse_pump_results};
pub use investigator::{investigation_prompt, parse_investigation};
pub use orchestrator::full_prompt;
pub use reporter::{format_alert, telegram_report_prompt};

/// Human description of a detection window (`1 hour`, `90 minutes`)
pub fn describe_window(minutes: u32) -> String {
    match minutes {
        60 => "1 hour".into(),
        m if m % 60 == 0 => format!("{} hours", m / 60),
        1 => "1 minute".into(),
        m => format!("{m} minutes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_window() {
        assert_eq!(describe_window(60), "1 hour");
        assert_eq!(describe_window(240), "4 hours");
        assert_eq!(describe_window(90), "90 minutes");
        assert_eq!(describe_window(15), "15 minutes");
    }
}
