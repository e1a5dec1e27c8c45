//! News Investigator
//!
//! Per-pump investigation across social and news sources.

use chrono::Utc;
use pump_core::extract::parse_agent_json;
use pump_core::{Investigation, TriggerType};
use std::fmt::Write as _;

/// Where the agent should look, in order
const SOURCES: &[(&str, &str)] = &[
    ("Reddit", "reddit"),
    ("Twitter/X", "twitter"),
    ("Discord", "discord"),
    ("Telegram", "telegram"),
    ("Web Search", "WebSearch"),
    ("Grok", "grok"),
];

/// Bullet list of trigger categories for prompts
pub fn trigger_type_list() -> String {
    let mut out = String::new();
    for trigger in TriggerType::ALL {
        let _ = writeln!(out, "- {}: {}", trigger.as_str(), trigger.description());
    }
    out
}

/// Investigation prompt for one pump
pub fn investigation_prompt(symbol: &str, price_change_pct: f64) -> String {
    let symbol = symbol.trim().to_uppercase();
    let lower = symbol.to_lowercase();
    let source_names: Vec<_> = SOURCES
        .iter()
        .map(|(name, tool)| format!("{name} ({tool})"))
        .collect();
    let triggers = trigger_type_list();

    format!(
        r#"You are a crypto news investigation agent. Find the event that triggered a price pump.

## Target
- **Symbol:** {symbol}
- **Price Change:** {price_change_pct:.1}% in the detection window

## Sources
Search these in order: {sources}.

### Reddit
- r/cryptocurrency, r/CryptoMoonShots and r/{lower}
- Announcements, partnerships or hype posts from the last 24 hours

### Twitter/X
- Search ${symbol} and #{symbol}
- Official project accounts, news outlets, influencers; note likes and retweets

### Discord and Telegram
- Trading servers and channels mentioning {symbol}
- Coordinated pump signals or shared news

### Web Search
- "{symbol} crypto news today"
- "{symbol} announcement partnership"

### Grok
- Current sentiment and live news around {symbol}

## Guidelines
- Prefer official sources (project accounts, blog, Discord announcements)
- The news must precede or coincide with the pump
- Record the real text of each post or article, never a placeholder

## Trigger Categories
{triggers}
## Output
Return a JSON object:
```json
{{
  "symbol": "{symbol}",
  "findings": [
    {{
      "source_type": "twitter",
      "source_url": "https://x.com/...",
      "content": "Text of the post or article",
      "relevance_score": 0.85,
      "sentiment": "positive",
      "metadata": {{"likes": 1500, "retweets": 300}}
    }}
  ],
  "likely_trigger": {{
    "trigger_type": "partnership",
    "description": "What happened",
    "confidence": 0.8,
    "supporting_evidence": ["Key evidence"]
  }},
  "summary": "One paragraph on why {symbol} pumped"
}}
```

Investigate now and reply with the JSON only."#,
        sources = source_names.join(", "),
    )
}

/// Parse investigator output.
///
/// Never fails: unreadable output becomes an investigation with no findings
/// and an `unknown` trigger carrying the parse error.
pub fn parse_investigation(output: &str) -> Investigation {
    match parse_agent_json::<Investigation>(output) {
        Ok(mut investigation) => {
            investigation.symbol = investigation.symbol.trim().to_uppercase();
            investigation.investigated_at = Utc::now();
            investigation
        }
        Err(e) => {
            tracing::warn!(error = %e, "Error parsing investigation results");
            Investigation::failed(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pump_core::Sentiment;

    #[test]
    fn test_prompt_mentions_target() {
        let prompt = investigation_prompt("pepe", 12.345);
        assert!(prompt.contains("**Symbol:** PEPE"));
        assert!(prompt.contains("12.3%"));
        assert!(prompt.contains("r/pepe"));
        assert!(prompt.contains("- exchange_listing:"));
        assert!(prompt.contains("- unknown:"));
    }

    #[test]
    fn test_parse_full_investigation() {
        let output = r#"```json
{
  "symbol": "pepe",
  "findings": [
    {"source_type": "twitter", "source_url": "https://x.com/a/1", "content": "Binance will list PEPE perpetuals at 10:00 UTC", "relevance_score": 0.9, "sentiment": "positive"},
    {"source_type": "reddit", "content": "Thread"}
  ],
  "likely_trigger": {"trigger_type": "listing", "description": "Binance perp listing", "confidence": 0.82},
  "summary": "Listing news."
}
```"#;
        let inv = parse_investigation(output);
        assert_eq!(inv.symbol, "PEPE");
        assert_eq!(inv.findings.len(), 2);
        assert_eq!(inv.findings[0].sentiment, Sentiment::Positive);
        assert_eq!(inv.findings[1].sentiment, Sentiment::Neutral);
        assert!((inv.findings[1].relevance_score - 0.5).abs() < f64::EPSILON);
        assert_eq!(inv.trigger_type(), TriggerType::ExchangeListing);
    }

    #[test]
    fn test_parse_failure_yields_unknown() {
        let inv = parse_investigation("I could not find anything.");
        assert!(inv.findings.is_empty());
        assert_eq!(inv.trigger_type(), TriggerType::Unknown);
        assert_eq!(inv.summary, "Investigation could not be completed");
        let trigger = inv.likely_trigger.unwrap();
        assert!(trigger.description.starts_with("Investigation failed:"));
    }
}
