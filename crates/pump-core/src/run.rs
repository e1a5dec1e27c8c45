//! Run Lifecycle
//!
//! Status state machine for agent runs, the bounded log buffer polled by the
//! dashboard, and the counters scraped from agent output.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use crate::error::{PumpError, Result};
use crate::extract;

/// Default number of log lines kept in memory
pub const DEFAULT_LOG_CAPACITY: usize = 2000;

/// Status of an agent run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl RunStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }

    /// Queued or running
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    pub const fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Whether `self -> next` is a legal change
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running | Self::Failed)
                | (Self::Running, Self::Completed | Self::Failed | Self::Timeout)
        )
    }

    /// Validate a transition, returning the new status
    pub fn transition(self, next: Self) -> Result<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(PumpError::InvalidTransition { from: self, to: next })
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = PumpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "timeout" => Ok(Self::Timeout),
            other => Err(PumpError::Parse(format!("unknown run status '{other}'"))),
        }
    }
}

// ============================================================================
// Log buffer
// ============================================================================

/// Bounded circular buffer of output lines.
///
/// Lines carry absolute indices: the first line ever pushed is 0. Once the
/// buffer is full the oldest lines are dropped but indices keep counting, so
/// a poller that remembers the last index it saw never receives a line twice.
#[derive(Clone, Debug)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    total: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
            capacity,
            total: 0,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
        self.total += 1;
    }

    /// Index of the next line to be pushed
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Absolute index of the oldest retained line
    pub fn first_index(&self) -> usize {
        self.total - self.lines.len()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines with absolute index `>= from`, plus the index to poll from next
    pub fn since(&self, from: usize) -> (Vec<String>, usize) {
        let skip = from.saturating_sub(self.first_index());
        let lines = self.lines.iter().skip(skip).cloned().collect();
        (lines, self.total)
    }

    /// Retained lines joined with newlines
    pub fn joined(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(line);
        }
        out
    }
}

// ============================================================================
// Output scraping
// ============================================================================

/// Summary object the orchestrator prompt asks the agent to end with
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(default)]
    pub pumps_detected: i64,
    #[serde(default)]
    pub findings_count: i64,
    #[serde(default)]
    pub notifications_sent: i64,
}

impl RunSummary {
    /// Parse the summary from agent text (fenced or bare JSON)
    pub fn from_output(text: &str) -> Option<Self> {
        let block = extract::extract_json_block(text);
        let value: serde_json::Value = serde_json::from_str(block).ok()?;
        let has_counts =
            value.get("pumps_detected").is_some() || value.get("findings_count").is_some();
        if has_counts {
            serde_json::from_value(value).ok()
        } else {
            None
        }
    }
}

/// Counters accumulated while tailing agent output
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub pumps_detected: i64,
    pub findings_count: i64,
    pub notifications_sent: i64,
}

impl RunStats {
    /// Update counters from one output line. Later values win.
    pub fn scan_line(&mut self, line: &str) {
        if let Some(summary) =
            extract::stream_result_text(line).and_then(|t| RunSummary::from_output(&t))
        {
            self.pumps_detected = summary.pumps_detected;
            self.findings_count = summary.findings_count;
            self.notifications_sent = summary.notifications_sent;
            return;
        }

        if let Some(n) = scan_counter(line, "pumps_detected") {
            self.pumps_detected = n;
        }
        if let Some(n) = scan_counter(line, "findings_count") {
            self.findings_count = n;
        }
        if let Some(n) = scan_counter(line, "notifications_sent") {
            self.notifications_sent = n;
        }
    }
}

/// Find `"key": <digits>` in a line. Also matches the escaped form
/// `\"key\": <digits>` that appears inside stream-json text fields.
fn scan_counter(line: &str, key: &str) -> Option<i64> {
    let needle = format!("{key}\\\"");
    let plain = format!("{key}\"");

    let mut last = None;
    let mut search_from = 0;
    while let Some(pos) = line[search_from..].find(key) {
        let start = search_from + pos;
        search_from = start + key.len();

        // The key must be quoted on the left
        if !line[..start].ends_with('"') {
            continue;
        }

        let after_key = &line[start..];
        let rest = if after_key.starts_with(&needle) {
            &after_key[needle.len()..]
        } else if after_key.starts_with(&plain) {
            &after_key[plain.len()..]
        } else {
            continue;
        };

        let rest = rest.trim_start();
        let Some(rest) = rest.strip_prefix(':') else {
            continue;
        };
        let digits: String = rest
            .trim_start()
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        if let Ok(n) = digits.parse() {
            last = Some(n);
        }
    }
    last
}
