//! Domain Models
//!
//! Records persisted by the store and the shapes the external agent reports
//! back. Prices and market caps use `rust_decimal`; percentages and scores are
//! plain `f64` because they are ratios, not money.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::run::RunStatus;

/// Default market data source recorded for a pump
pub const DEFAULT_PUMP_SOURCE: &str = "coinmarketcap";

/// Default detection window in minutes
pub const DEFAULT_TIME_WINDOW_MINUTES: u32 = 60;

/// Default relevance for findings that omit one
pub const DEFAULT_RELEVANCE: f64 = 0.5;

/// Default confidence for triggers that omit one
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Findings with this many characters or fewer are treated as placeholders
pub const MIN_FINDING_CHARS: usize = 50;

// ============================================================================
// Classification enums
// ============================================================================

/// Category of the event believed to have caused a pump
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TriggerType {
    ExchangeListing,
    Partnership,
    WhaleActivity,
    InfluencerMention,
    TechnicalBreakout,
    NewsArticle,
    Announcement,
    ProductLaunch,
    SocialHype,
    Airdrop,
    Regulation,
    MarketTrend,
    #[default]
    Unknown,
}

impl TriggerType {
    /// Every category, in the order prompts list them
    pub const ALL: [Self; 13] = [
        Self::ExchangeListing,
        Self::Partnership,
        Self::WhaleActivity,
        Self::InfluencerMention,
        Self::TechnicalBreakout,
        Self::NewsArticle,
        Self::Announcement,
        Self::ProductLaunch,
        Self::SocialHype,
        Self::Airdrop,
        Self::Regulation,
        Self::MarketTrend,
        Self::Unknown,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ExchangeListing => "exchange_listing",
            Self::Partnership => "partnership",
            Self::WhaleActivity => "whale_activity",
            Self::InfluencerMention => "influencer_mention",
            Self::TechnicalBreakout => "technical_breakout",
            Self::NewsArticle => "news_article",
            Self::Announcement => "announcement",
            Self::ProductLaunch => "product_launch",
            Self::SocialHype => "social_hype",
            Self::Airdrop => "airdrop",
            Self::Regulation => "regulation",
            Self::MarketTrend => "market_trend",
            Self::Unknown => "unknown",
        }
    }

    /// One-line explanation used in prompts
    pub const fn description(&self) -> &'static str {
        match self {
            Self::ExchangeListing => "New listing on an exchange",
            Self::Partnership => "Partnership or collaboration announced",
            Self::WhaleActivity => "Large wallet purchases or transfers",
            Self::InfluencerMention => "Celebrity or influencer post",
            Self::TechnicalBreakout => "Chart pattern breakout",
            Self::NewsArticle => "Coverage by a news outlet",
            Self::Announcement => "Official project announcement",
            Self::ProductLaunch => "New product or feature shipped",
            Self::SocialHype => "Viral social media campaign",
            Self::Airdrop => "Airdrop or rewards program",
            Self::Regulation => "Regulatory news",
            Self::MarketTrend => "Following the broader market",
            Self::Unknown => "Cause could not be determined",
        }
    }

    /// Human label (`exchange listing`)
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl FromStr for TriggerType {
    type Err = std::convert::Infallible;

    /// Unrecognised categories map to `Unknown` rather than failing.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        Ok(match normalized.as_str() {
            "exchange_listing" | "listing" => Self::ExchangeListing,
            "partnership" => Self::Partnership,
            "whale_activity" => Self::WhaleActivity,
            "influencer_mention" => Self::InfluencerMention,
            "technical_breakout" => Self::TechnicalBreakout,
            "news_article" | "news" => Self::NewsArticle,
            "announcement" => Self::Announcement,
            "product_launch" => Self::ProductLaunch,
            "social_hype" => Self::SocialHype,
            "airdrop" => Self::Airdrop,
            "regulation" => Self::Regulation,
            "market_trend" => Self::MarketTrend,
            _ => Self::Unknown,
        })
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TriggerType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TriggerType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

/// Tone of a finding
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
    Mixed,
}

impl Sentiment {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Mixed => "mixed",
        }
    }
}

impl FromStr for Sentiment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "positive" | "bullish" => Self::Positive,
            "negative" | "bearish" => Self::Negative,
            "mixed" => Self::Mixed,
            _ => Self::Neutral,
        })
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Sentiment {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Sentiment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

/// Confidence bucket shown next to a trigger
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_score(confidence: f64) -> Self {
        if confidence > 0.7 {
            Self::High
        } else if confidence > 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

// ============================================================================
// Persisted records
// ============================================================================

/// A detected short-window price increase
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pump {
    pub id: i64,

    /// Ticker symbol, upper-cased
    pub symbol: String,

    /// Percent change over the window
    pub price_change_pct: f64,

    pub time_window_minutes: u32,

    pub detected_at: DateTime<Utc>,

    /// Price in USD when the pump was detected
    pub price_at_detection: Option<Decimal>,

    pub volume_change_pct: Option<f64>,

    pub market_cap: Option<Decimal>,

    /// Market data source (`binance`, `coinmarketcap` or `both`)
    pub source: String,
}

/// External content judged relevant to a pump
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Finding {
    pub id: i64,
    pub pump_id: i64,

    /// Where it came from (`twitter`, `reddit`, ...)
    pub source_type: String,

    pub source_url: Option<String>,

    pub content: String,

    /// 0.0 - 1.0
    pub relevance_score: f64,

    pub sentiment: Sentiment,

    pub found_at: DateTime<Utc>,
}

/// Best causal hypothesis for a pump
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trigger {
    pub id: i64,
    pub pump_id: i64,
    pub trigger_type: TriggerType,
    pub description: String,

    /// 0.0 - 1.0
    pub confidence: f64,

    pub identified_at: DateTime<Utc>,
}

impl Trigger {
    pub fn confidence_level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_score(self.confidence)
    }
}

/// Alert sent for a pump
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub pump_id: i64,
    pub channel: String,
    pub message: String,
    pub sent_at: DateTime<Utc>,
    pub status: String,
}

/// One execution of the external agent
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentRun {
    pub id: i64,
    pub status: RunStatus,

    /// Queue time, replaced by the actual start once running
    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,
    pub pumps_detected: i64,
    pub findings_count: i64,
    pub error_message: Option<String>,

    /// Captured agent output, newline separated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
}

impl AgentRun {
    /// Wall-clock duration, once the run has finished
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.started_at)
    }

    /// Stored log text split into lines
    pub fn log_lines(&self) -> Vec<String> {
        self.logs
            .as_deref()
            .filter(|l| !l.is_empty())
            .map(|l| l.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Dashboard counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_pumps: i64,
    pub total_findings: i64,
    pub total_triggers: i64,
    pub total_runs: i64,
}

/// A pump with its trigger and leading findings
#[derive(Clone, Debug, Serialize)]
pub struct PumpDetail {
    #[serde(flatten)]
    pub pump: Pump,
    pub trigger: Option<Trigger>,

    /// Bucket of `trigger.confidence`, if there is a trigger
    pub confidence_level: Option<ConfidenceLevel>,

    /// Findings ordered by relevance, possibly truncated
    pub findings: Vec<Finding>,

    /// Number of findings stored for the pump
    pub findings_total: i64,
}

impl PumpDetail {
    pub fn new(
        pump: Pump,
        trigger: Option<Trigger>,
        findings: Vec<Finding>,
        findings_total: i64,
    ) -> Self {
        let confidence_level = trigger.as_ref().map(Trigger::confidence_level);
        Self {
            pump,
            trigger,
            confidence_level,
            findings,
            findings_total,
        }
    }
}

/// Pumps for one symbol, newest first
#[derive(Clone, Debug, Serialize)]
pub struct PumpGroup {
    pub symbol: String,
    pub count: usize,
    pub pumps: Vec<PumpDetail>,
}

impl PumpGroup {
    /// Latest detection in the group
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.pumps.iter().map(|p| p.pump.detected_at).max()
    }

    /// Group pumps by symbol. Within a group the input order is kept; groups
    /// are ordered by their most recent detection.
    pub fn group(details: Vec<PumpDetail>) -> Vec<Self> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<Self> = Vec::new();

        for detail in details {
            let symbol = detail.pump.symbol.clone();
            if let Some(&i) = index.get(&symbol) {
                groups[i].pumps.push(detail);
                groups[i].count += 1;
            } else {
                index.insert(symbol.clone(), groups.len());
                groups.push(Self {
                    symbol,
                    count: 1,
                    pumps: vec![detail],
                });
            }
        }

        groups.sort_by(|a, b| b.latest().cmp(&a.latest()));
        groups
    }
}

// ============================================================================
// Agent reports
// ============================================================================

fn default_source() -> String {
    DEFAULT_PUMP_SOURCE.into()
}

fn default_relevance() -> f64 {
    DEFAULT_RELEVANCE
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

/// A pump as reported by the detection phase
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectedPump {
    pub symbol: String,
    pub price_change_pct: f64,
    pub volume_change_pct: Option<f64>,
    pub market_cap: Option<Decimal>,
    pub price_at_detection: Option<Decimal>,

    #[serde(default = "default_source")]
    pub source: String,

    pub time_window_minutes: Option<u32>,

    /// Stamped when the output is parsed
    #[serde(default = "Utc::now")]
    pub detected_at: DateTime<Utc>,
}

impl DetectedPump {
    pub fn new(symbol: impl Into<String>, price_change_pct: f64) -> Self {
        Self {
            symbol: symbol.into().trim().to_uppercase(),
            price_change_pct,
            volume_change_pct: None,
            market_cap: None,
            price_at_detection: None,
            source: default_source(),
            time_window_minutes: None,
            detected_at: Utc::now(),
        }
    }

    pub fn window_minutes(&self) -> u32 {
        self.time_window_minutes.unwrap_or(DEFAULT_TIME_WINDOW_MINUTES)
    }
}

/// A finding as reported by the investigation phase
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FindingReport {
    pub source_type: String,

    #[serde(default)]
    pub source_url: Option<String>,

    #[serde(default)]
    pub content: String,

    #[serde(default = "default_relevance")]
    pub relevance_score: f64,

    #[serde(default)]
    pub sentiment: Sentiment,

    /// Engagement counts and similar, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// The trigger hypothesis from the investigation phase
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TriggerReport {
    #[serde(default)]
    pub trigger_type: TriggerType,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_confidence")]
    pub confidence: f64,

    #[serde(default)]
    pub supporting_evidence: Vec<String>,
}

impl TriggerReport {
    /// Placeholder used when no cause could be established
    pub fn unknown(description: impl Into<String>) -> Self {
        Self {
            trigger_type: TriggerType::Unknown,
            description: description.into(),
            confidence: 0.0,
            supporting_evidence: Vec::new(),
        }
    }
}

/// Full result of investigating one pump
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Investigation {
    #[serde(default)]
    pub symbol: String,

    #[serde(default)]
    pub findings: Vec<FindingReport>,

    #[serde(default)]
    pub likely_trigger: Option<TriggerReport>,

    #[serde(default)]
    pub summary: String,

    #[serde(default = "Utc::now")]
    pub investigated_at: DateTime<Utc>,
}

impl Investigation {
    /// Result recorded when the agent output could not be parsed
    pub fn failed(reason: impl fmt::Display) -> Self {
        Self {
            symbol: String::new(),
            findings: Vec::new(),
            likely_trigger: Some(TriggerReport::unknown(format!("Investigation failed: {reason}"))),
            summary: "Investigation could not be completed".into(),
            investigated_at: Utc::now(),
        }
    }

    /// Trigger category, `Unknown` when none was reported
    pub fn trigger_type(&self) -> TriggerType {
        self.likely_trigger
            .as_ref()
            .map(|t| t.trigger_type)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn detail(id: i64, symbol: &str, minutes_ago: i64) -> PumpDetail {
        let pump = Pump {
            id,
            symbol: symbol.into(),
            price_change_pct: 6.0,
            time_window_minutes: 60,
            detected_at: Utc::now() - Duration::minutes(minutes_ago),
            price_at_detection: None,
            volume_change_pct: None,
            market_cap: None,
            source: DEFAULT_PUMP_SOURCE.into(),
        };
        PumpDetail::new(pump, None, Vec::new(), 0)
    }

    #[test]
    fn test_trigger_type_parsing() {
        assert_eq!("listing".parse::<TriggerType>().unwrap(), TriggerType::ExchangeListing);
        assert_eq!("Whale Activity".parse::<TriggerType>().unwrap(), TriggerType::WhaleActivity);
        assert_eq!("moon".parse::<TriggerType>().unwrap(), TriggerType::Unknown);

        let parsed: TriggerType = serde_json::from_str(r#""product_launch""#).unwrap();
        assert_eq!(parsed, TriggerType::ProductLaunch);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), r#""product_launch""#);
        assert_eq!(TriggerType::ExchangeListing.label(), "exchange listing");
    }

    #[test]
    fn test_sentiment_fallback() {
        let s: Sentiment = serde_json::from_str(r#""BULLISH""#).unwrap();
        assert_eq!(s, Sentiment::Positive);
        let s: Sentiment = serde_json::from_str(r#""whatever""#).unwrap();
        assert_eq!(s, Sentiment::Neutral);
    }

    #[test]
    fn test_confidence_buckets() {
        assert_eq!(ConfidenceLevel::from_score(0.85), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.7), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.41), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.4), ConfidenceLevel::Low);
    }

    #[test]
    fn test_detected_pump_defaults() {
        let pump: DetectedPump = serde_json::from_str(
            r#"{"symbol": "pepe", "price_change_pct": 12.5, "market_cap": 1200000000000, "price_at_detection": 0.0000123}"#,
        )
        .unwrap();
        assert_eq!(pump.source, "coinmarketcap");
        assert_eq!(pump.window_minutes(), 60);
        assert_eq!(pump.market_cap, Some(rust_decimal_macros::dec!(1200000000000)));
        assert!(pump.price_at_detection.is_some());
    }

    #[test]
    fn test_group_by_symbol() {
        let details = vec![
            detail(5, "SOL", 5),
            detail(4, "BTC", 10),
            detail(3, "SOL", 30),
            detail(2, "ETH", 40),
        ];

        let groups = PumpGroup::group(details);
        let symbols: Vec<_> = groups.iter().map(|g| g.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["SOL", "BTC", "ETH"]);
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].pumps[0].pump.id, 5);
        assert_eq!(groups[0].pumps[1].pump.id, 3);
    }

    #[test]
    fn test_failed_investigation() {
        let inv = Investigation::failed("expected value at line 1");
        assert!(inv.findings.is_empty());
        assert_eq!(inv.trigger_type(), TriggerType::Unknown);
        let trigger = inv.likely_trigger.unwrap();
        assert!(trigger.description.starts_with("Investigation failed:"));
        assert!(trigger.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn test_run_log_lines() {
        let run = AgentRun {
            id: 1,
            status: RunStatus::Completed,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
            pumps_detected: 0,
            findings_count: 0,
            error_message: None,
            logs: Some("a\nb".into()),
        };
        assert_eq!(run.log_lines(), vec!["a", "b"]);
        assert!(run.duration().is_some());
    }
}
