//! Claude CLI Runner
//!
//! Implementation of `AgentRunner` that spawns the agent CLI in headless
//! mode with MCP tools allowed and stream-json output.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use pump_core::{PumpError, Result, Settings};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::runner::{AgentRunner, RunOutcome};

/// Limit for the `--version` probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Claude CLI runner configuration
#[derive(Clone, Debug)]
pub struct ClaudeCliConfig {
    /// Executable to spawn
    pub cli_path: String,

    /// Arguments placed before the prompt
    pub leading_args: Vec<String>,

    /// `--allowedTools` pattern
    pub allowed_tools: String,

    /// Optional `--model`
    pub model: Option<String>,

    /// Wall-clock limit for a run
    pub timeout: Duration,

    /// Working directory for the process
    pub workdir: Option<PathBuf>,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl ClaudeCliConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            cli_path: settings.agent_cli_path.clone(),
            leading_args: settings.agent_cli_args.clone(),
            allowed_tools: settings.agent_allowed_tools.clone(),
            model: settings.agent_model.clone(),
            timeout: settings.agent_timeout,
            workdir: settings.agent_workdir.clone(),
        }
    }

    /// Full argument list for a prompt
    pub fn args(&self, prompt: &str) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.push(prompt.to_string());
        args.extend([
            "--allowedTools".to_string(),
            self.allowed_tools.clone(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ]);
        if let Some(model) = &self.model {
            args.push("--model".into());
            args.push(model.clone());
        }
        args
    }
}

/// Runs the agent through its command line interface
pub struct ClaudeCliRunner {
    config: ClaudeCliConfig,
}

impl ClaudeCliRunner {
    pub const fn new(config: ClaudeCliConfig) -> Self {
        Self { config }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(ClaudeCliConfig::from_settings(settings))
    }

    pub const fn config(&self) -> &ClaudeCliConfig {
        &self.config
    }

    /// Check if the CLI can be executed
    pub async fn check_availability(&self) -> bool {
        let mut probe = Command::new(&self.config.cli_path);
        probe
            .args(&self.config.leading_args)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        match timeout(PROBE_TIMEOUT, probe.output()).await {
            Ok(Ok(out)) if out.status.success() => {
                let version = String::from_utf8_lossy(&out.stdout);
                info!("Agent CLI available: {}", version.trim());
                true
            }
            Ok(Ok(out)) => {
                warn!("Agent CLI returned error status: {}", out.status);
                false
            }
            Ok(Err(e)) => {
                warn!("Agent CLI not found at '{}': {}", self.config.cli_path, e);
                false
            }
            Err(_) => {
                warn!("Agent CLI version probe timed out");
                false
            }
        }
    }

    fn command(&self, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.config.cli_path);
        cmd.args(self.config.args(prompt))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.config.workdir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Forward each line of `reader` until EOF. Invalid UTF-8 is replaced.
async fn forward_lines<R>(reader: R, lines: &UnboundedSender<String>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(reader).split(b'\n');
    while let Some(segment) = segments.next_segment().await? {
        let line = String::from_utf8_lossy(&segment);
        // Receiver gone means nobody is watching; keep draining the pipe.
        let _ = lines.send(line.trim_end_matches('\r').to_string());
    }
    Ok(())
}

#[async_trait]
impl AgentRunner for ClaudeCliRunner {
    fn name(&self) -> &str {
        "claude-cli"
    }

    async fn health_check(&self) -> bool {
        self.check_availability().await
    }

    async fn run(&self, prompt: &str, lines: UnboundedSender<String>) -> Result<RunOutcome> {
        debug!(
            cli = %self.config.cli_path,
            prompt_bytes = prompt.len(),
            "Spawning agent process"
        );
        let mut child = self.command(prompt).spawn().map_err(|e| {
            PumpError::Runner(format!("Failed to spawn '{}': {e}", self.config.cli_path))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PumpError::Runner("Agent stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PumpError::Runner("Agent stderr was not captured".into()))?;

        // Pipes and exit share one budget; processes the agent started can
        // hold either pipe open after it exits.
        let drive = async {
            let (out, err, status) = tokio::join!(
                forward_lines(stdout, &lines),
                forward_lines(stderr, &lines),
                child.wait(),
            );
            if let Err(e) = err {
                warn!("Failed reading agent stderr: {}", e);
            }
            out?;
            status
        };
        let result = timeout(self.config.timeout, drive).await;

        match result {
            Ok(Ok(status)) => {
                info!(code = ?status.code(), "Agent process exited");
                Ok(RunOutcome::Exited {
                    code: status.code(),
                    success: status.success(),
                })
            }
            Ok(Err(e)) => {
                let _ = child.kill().await;
                Err(PumpError::Runner(format!("Failed reading agent output: {e}")))
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.timeout.as_secs(),
                    "Agent timed out, killing process"
                );
                // The agent may have exited already and left only its pipes open
                if matches!(child.try_wait(), Ok(None)) {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill agent process: {}", e);
                    }
                }
                Ok(RunOutcome::TimedOut {
                    after: self.config.timeout,
                })
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn script(body: &str, timeout: Duration) -> ClaudeCliRunner {
        ClaudeCliRunner::new(ClaudeCliConfig {
            cli_path: "sh".into(),
            leading_args: vec!["-c".into(), body.into(), "agent".into()],
            allowed_tools: "mcp__*".into(),
            model: None,
            timeout,
            workdir: None,
        })
    }

    async fn collect(mut rx: mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = rx.recv().await {
            out.push(line);
        }
        out
    }

    #[test]
    fn test_args_layout() {
        let config = ClaudeCliConfig {
            cli_path: "npx".into(),
            leading_args: vec!["@anthropic-ai/claude-code".into(), "-p".into()],
            allowed_tools: "mcp__*".into(),
            model: Some("sonnet".into()),
            timeout: Duration::from_secs(600),
            workdir: None,
        };
        assert_eq!(
            config.args("find pumps"),
            vec![
                "@anthropic-ai/claude-code",
                "-p",
                "find pumps",
                "--allowedTools",
                "mcp__*",
                "--output-format",
                "stream-json",
                "--verbose",
                "--model",
                "sonnet",
            ]
        );
    }

    #[test]
    fn test_config_from_settings() {
        let settings = Settings {
            agent_cli_path: "/usr/local/bin/claude".into(),
            agent_timeout: Duration::from_secs(30),
            ..Settings::default()
        };
        let config = ClaudeCliConfig::from_settings(&settings);
        assert_eq!(config.cli_path, "/usr/local/bin/claude");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.model.is_none());
        assert!(!config.args("x").contains(&"--model".to_string()));
    }

    #[tokio::test]
    async fn test_streams_stdout_and_stderr() {
        let runner = script(
            r#"echo "prompt: $1"; echo "warning" >&2; echo '{"pumps_detected": 2}'"#,
            Duration::from_secs(10),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let outcome = runner.run("scan now", tx).await.unwrap();
        assert_eq!(outcome, RunOutcome::success());

        let lines = collect(rx).await;
        assert!(lines.contains(&"prompt: scan now".to_string()));
        assert!(lines.contains(&"warning".to_string()));
        assert!(lines.contains(&r#"{"pumps_detected": 2}"#.to_string()));
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let runner = script("echo failing; exit 3", Duration::from_secs(10));
        let (tx, rx) = mpsc::unbounded_channel();
        let outcome = runner.run("p", tx).await.unwrap();
        assert_eq!(outcome, RunOutcome::Exited { code: Some(3), success: false });
        assert_eq!(collect(rx).await, vec!["failing".to_string()]);
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let runner = script("echo started; sleep 30", Duration::from_millis(300));
        let (tx, rx) = mpsc::unbounded_channel();
        let outcome = runner.run("p", tx).await.unwrap();
        assert_eq!(outcome, RunOutcome::TimedOut { after: Duration::from_millis(300) });
        assert_eq!(collect(rx).await.first().map(String::as_str), Some("started"));
    }

    #[tokio::test]
    async fn test_timeout_covers_inherited_stderr() {
        // The agent exits at once but leaves a background process holding stderr
        let runner = script("sleep 5 >/dev/null & echo done", Duration::from_millis(500));
        let (tx, rx) = mpsc::unbounded_channel();

        let started = std::time::Instant::now();
        let outcome = runner.run("p", tx).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(outcome, RunOutcome::TimedOut { after: Duration::from_millis(500) });

        // The runner has returned, so the channel is closed even though the
        // background process is still alive
        assert_eq!(collect(rx).await, vec!["done".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let runner = ClaudeCliRunner::new(ClaudeCliConfig {
            cli_path: "/nonexistent/agent-cli".into(),
            ..ClaudeCliConfig::default()
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = runner.run("p", tx).await.unwrap_err();
        assert!(matches!(err, PumpError::Runner(_)));
        assert!(!runner.health_check().await);
    }

    #[tokio::test]
    async fn test_health_check_available() {
        let runner = ClaudeCliRunner::new(ClaudeCliConfig {
            cli_path: "true".into(),
            ..ClaudeCliConfig::default()
        });
        assert!(runner.health_check().await);
        assert_eq!(runner.name(), "claude-cli");
    }
}
