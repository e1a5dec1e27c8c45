//! Settings
//!
//! Process configuration read from environment variables (after `.env` has
//! been loaded by the binary).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{PumpError, Result};
use crate::run::DEFAULT_LOG_CAPACITY;

/// Runtime settings shared by the server and CLI
#[derive(Clone, Debug)]
pub struct Settings {
    /// sqlx connection string
    pub database_url: String,

    /// Address the HTTP server listens on
    pub bind_addr: String,

    /// Minimum price change (percent) that counts as a pump
    pub pump_threshold_pct: f64,

    /// Detection window in minutes
    pub pump_time_window_minutes: u32,

    /// Agent CLI executable
    pub agent_cli_path: String,

    /// Arguments placed before the prompt (e.g. `npx` + package name)
    pub agent_cli_args: Vec<String>,

    /// `--allowedTools` pattern handed to the agent
    pub agent_allowed_tools: String,

    /// Model override for the agent CLI
    pub agent_model: Option<String>,

    /// Wall-clock limit for one run
    pub agent_timeout: Duration,

    /// Working directory for the agent process
    pub agent_workdir: Option<PathBuf>,

    /// Interval between scheduled runs; `None` disables scheduling
    pub run_schedule: Option<Duration>,

    /// Lines kept in the live log buffer
    pub log_buffer_lines: usize,

    /// Directory served for non-API paths
    pub static_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/research.db".into(),
            bind_addr: "0.0.0.0:5000".into(),
            pump_threshold_pct: 5.0,
            pump_time_window_minutes: 60,
            agent_cli_path: "claude".into(),
            agent_cli_args: Vec::new(),
            agent_allowed_tools: "mcp__*".into(),
            agent_model: None,
            agent_timeout: Duration::from_secs(600),
            agent_workdir: None,
            run_schedule: Some(Duration::from_secs(3600)),
            log_buffer_lines: DEFAULT_LOG_CAPACITY,
            static_dir: PathBuf::from("static"),
        }
    }
}

impl Settings {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Unset or blank keys fall back to
    /// defaults; malformed numbers are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let schedule_secs: u64 = parse_or(get("RUN_SCHEDULE_SECS"), "RUN_SCHEDULE_SECS", 3600)?;

        let settings = Self {
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            pump_threshold_pct: parse_or(
                get("PUMP_THRESHOLD_PCT"),
                "PUMP_THRESHOLD_PCT",
                defaults.pump_threshold_pct,
            )?,
            pump_time_window_minutes: parse_or(
                get("PUMP_TIME_WINDOW_MINUTES"),
                "PUMP_TIME_WINDOW_MINUTES",
                defaults.pump_time_window_minutes,
            )?,
            agent_cli_path: get("AGENT_CLI_PATH").unwrap_or(defaults.agent_cli_path),
            agent_cli_args: get("AGENT_CLI_ARGS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            agent_allowed_tools: get("AGENT_ALLOWED_TOOLS").unwrap_or(defaults.agent_allowed_tools),
            agent_model: get("AGENT_MODEL"),
            agent_timeout: Duration::from_secs(parse_or(
                get("AGENT_TIMEOUT_SECS"),
                "AGENT_TIMEOUT_SECS",
                600,
            )?),
            agent_workdir: get("AGENT_WORKDIR").map(PathBuf::from),
            run_schedule: (schedule_secs > 0).then(|| Duration::from_secs(schedule_secs)),
            log_buffer_lines: parse_or(
                get("LOG_BUFFER_LINES"),
                "LOG_BUFFER_LINES",
                defaults.log_buffer_lines,
            )?,
            static_dir: get("STATIC_DIR").map_or(defaults.static_dir, PathBuf::from),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would make runs meaningless
    pub fn validate(&self) -> Result<()> {
        if !(self.pump_threshold_pct.is_finite() && self.pump_threshold_pct > 0.0) {
            return Err(PumpError::Config(format!(
                "PUMP_THRESHOLD_PCT must be positive, got {}",
                self.pump_threshold_pct
            )));
        }
        if self.pump_time_window_minutes == 0 {
            return Err(PumpError::Config("PUMP_TIME_WINDOW_MINUTES must be positive".into()));
        }
        if self.agent_timeout.is_zero() {
            return Err(PumpError::Config("AGENT_TIMEOUT_SECS must be positive".into()));
        }
        if self.log_buffer_lines == 0 {
            return Err(PumpError::Config("LOG_BUFFER_LINES must be positive".into()));
        }
        Ok(())
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    raw.map_or(Ok(default), |v| {
        v.parse()
            .map_err(|_| PumpError::Config(format!("{key} has invalid value '{v}'")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        Settings::from_lookup(|k| map.get(k).map(|v| (*v).to_string()))
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert!((s.pump_threshold_pct - 5.0).abs() < f64::EPSILON);
        assert_eq!(s.pump_time_window_minutes, 60);
        assert_eq!(s.agent_timeout, Duration::from_secs(600));
        assert_eq!(s.run_schedule, Some(Duration::from_secs(3600)));
        assert_eq!(s.agent_allowed_tools, "mcp__*");
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("PUMP_THRESHOLD_PCT", "7.5"),
            ("PUMP_TIME_WINDOW_MINUTES", "30"),
            ("AGENT_CLI_ARGS", "-y  @anthropic-ai/claude-code"),
            ("RUN_SCHEDULE_SECS", "0"),
            ("AGENT_MODEL", " "),
        ])
        .unwrap();
        assert!((s.pump_threshold_pct - 7.5).abs() < f64::EPSILON);
        assert_eq!(s.pump_time_window_minutes, 30);
        assert_eq!(s.agent_cli_args, vec!["-y", "@anthropic-ai/claude-code"]);
        assert!(s.run_schedule.is_none());
        assert!(s.agent_model.is_none());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(settings(&[("PUMP_THRESHOLD_PCT", "lots")]), Err(PumpError::Config(_))));
        assert!(settings(&[("PUMP_THRESHOLD_PCT", "-1")]).is_err());
        assert!(settings(&[("PUMP_TIME_WINDOW_MINUTES", "0")]).is_err());
        assert!(settings(&[("AGENT_TIMEOUT_SECS", "0")]).is_err());
    }
}
