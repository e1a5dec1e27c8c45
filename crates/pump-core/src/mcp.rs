//! MCP Service Registry
//!
//! The agent reaches market data, social sources and the database through
//! MCP servers. Each server needs credentials in the environment; this module
//! knows which, and reports whether enough of them are present to run.

use serde::Serialize;
use std::fmt::Write as _;

/// What a service is used for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRole {
    /// Must be configured
    Core,
    /// At least one must be configured
    DataSource,
    /// At least one is recommended
    Investigation,
    /// Optional overrides
    Storage,
}

/// One MCP server and its credentials
#[derive(Clone, Debug, Serialize)]
pub struct McpService {
    pub name: &'static str,
    pub description: &'static str,
    pub role: ServiceRole,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

/// Credential check result for one service
#[derive(Clone, Debug, Serialize)]
pub struct ServiceStatus {
    pub name: &'static str,
    pub description: &'static str,
    pub role: ServiceRole,
    pub configured: bool,
    pub missing: Vec<&'static str>,
}

/// Registry of known services
pub struct ServiceRegistry {
    services: Vec<McpService>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new(default_services())
    }
}

impl ServiceRegistry {
    pub const fn new(services: Vec<McpService>) -> Self {
        Self { services }
    }

    pub fn get(&self, name: &str) -> Option<&McpService> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn by_role(&self, role: ServiceRole) -> impl Iterator<Item = &McpService> {
        self.services.iter().filter(move |s| s.role == role)
    }

    /// Check every service against `lookup` (normally `std::env::var`).
    /// Empty values count as missing.
    pub fn validate<F>(&self, lookup: F) -> ValidationReport
    where
        F: Fn(&str) -> Option<String>,
    {
        let statuses = self
            .services
            .iter()
            .map(|service| {
                let missing: Vec<_> = service
                    .required
                    .iter()
                    .copied()
                    .filter(|var| lookup(var).is_none_or(|v| v.trim().is_empty()))
                    .collect();
                ServiceStatus {
                    name: service.name,
                    description: service.description,
                    role: service.role,
                    configured: missing.is_empty(),
                    missing,
                }
            })
            .collect();

        ValidationReport { services: statuses }
    }

    /// Validate against the process environment
    pub fn validate_env(&self) -> ValidationReport {
        self.validate(|var| std::env::var(var).ok())
    }
}

/// Outcome of a credential check
#[derive(Clone, Debug, Serialize)]
pub struct ValidationReport {
    pub services: Vec<ServiceStatus>,
}

impl ValidationReport {
    fn with_role(&self, role: ServiceRole) -> impl Iterator<Item = &ServiceStatus> {
        self.services.iter().filter(move |s| s.role == role)
    }

    pub fn core_ready(&self) -> bool {
        self.with_role(ServiceRole::Core).all(|s| s.configured)
    }

    pub fn has_data_source(&self) -> bool {
        self.with_role(ServiceRole::DataSource).any(|s| s.configured)
    }

    pub fn has_investigation_source(&self) -> bool {
        self.with_role(ServiceRole::Investigation).any(|s| s.configured)
    }

    /// Core services configured and at least one data source available
    pub fn is_ready(&self) -> bool {
        self.core_ready() && self.has_data_source()
    }

    /// Problems that do not block a run
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.has_investigation_source() {
            warnings.push("No investigation sources configured".to_string());
        }
        warnings
    }

    /// Plain-text report for terminals
    pub fn render(&self) -> String {
        let rule = "=".repeat(60);
        let mut out = String::new();
        let _ = writeln!(out, "\n{rule}\nPUMP RESEARCHER CONFIGURATION VALIDATION\n{rule}");

        let sections = [
            (ServiceRole::Core, "CORE SERVICES"),
            (ServiceRole::DataSource, "DATA SOURCES (at least one required)"),
            (ServiceRole::Investigation, "INVESTIGATION SOURCES (at least one recommended)"),
        ];

        for (role, title) in sections {
            let _ = writeln!(out, "\n[{title}]");
            for status in self.with_role(role) {
                let name = status.name.to_uppercase();
                if status.configured {
                    let _ = writeln!(out, "  {name}: configured");
                } else if role == ServiceRole::Core {
                    let _ = writeln!(out, "  {name}: MISSING - {}", status.missing.join(", "));
                } else {
                    let _ = writeln!(out, "  {name}: not configured");
                }
            }
        }

        if !self.has_data_source() {
            let _ = writeln!(out, "  WARNING: No data sources configured!");
        }
        for warning in self.warnings() {
            let _ = writeln!(out, "  WARNING: {warning}!");
        }

        let _ = writeln!(out, "\n{}", "-".repeat(60));
        if self.is_ready() {
            let _ = writeln!(out, "STATUS: Ready to run");
        } else {
            let _ = writeln!(out, "STATUS: Configuration incomplete");
            let _ = writeln!(
                out,
                "\nTo fix:\n1. Copy .env.example to .env\n2. Fill in the required API credentials\n3. Run the agent again"
            );
        }
        let _ = writeln!(out, "{rule}");
        out
    }
}

/// Services the orchestrator prompt relies on
pub fn default_services() -> Vec<McpService> {
    vec![
        McpService {
            name: "anthropic",
            description: "Claude API (required for agent execution)",
            role: ServiceRole::Core,
            required: &["ANTHROPIC_API_KEY"],
            optional: &[],
        },
        McpService {
            name: "binance",
            description: "Binance exchange data",
            role: ServiceRole::DataSource,
            required: &["BINANCE_API_KEY", "BINANCE_API_SECRET"],
            optional: &["BINANCE_TESTNET"],
        },
        McpService {
            name: "coinmarketcap",
            description: "CoinMarketCap market data",
            role: ServiceRole::DataSource,
            required: &["COINMARKETCAP_API_KEY"],
            optional: &["COINMARKETCAP_SUBSCRIPTION_LEVEL"],
        },
        McpService {
            name: "reddit",
            description: "Reddit API for r/cryptocurrency searches",
            role: ServiceRole::Investigation,
            required: &["REDDIT_CLIENT_ID", "REDDIT_CLIENT_SECRET"],
            optional: &[],
        },
        McpService {
            name: "twitter",
            description: "Twitter/X API for tweet searches",
            role: ServiceRole::Investigation,
            required: &[],
            optional: &[
                "TWITTER_API_KEY",
                "TWITTER_API_SECRET",
                "TWITTER_ACCESS_TOKEN",
                "TWITTER_ACCESS_TOKEN_SECRET",
                "TWITTER_USERNAME",
                "TWITTER_PASSWORD",
                "TWITTER_EMAIL",
            ],
        },
        McpService {
            name: "telegram",
            description: "Telegram for channel searches and notifications",
            role: ServiceRole::Investigation,
            required: &["TELEGRAM_API_ID", "TELEGRAM_API_HASH", "TELEGRAM_PHONE_NUMBER"],
            optional: &["TELEGRAM_CHAT_ID"],
        },
        McpService {
            name: "discord",
            description: "Discord for server searches",
            role: ServiceRole::Investigation,
            required: &["DISCORD_EMAIL", "DISCORD_PASSWORD"],
            optional: &[],
        },
        McpService {
            name: "grok",
            description: "Grok/xAI for sentiment analysis",
            role: ServiceRole::Investigation,
            required: &["XAI_API_KEY"],
            optional: &[],
        },
        McpService {
            name: "database",
            description: "Relational database connection",
            role: ServiceRole::Storage,
            required: &[],
            optional: &["DATABASE_URL"],
        },
    ]
}
