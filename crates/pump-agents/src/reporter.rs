//! Reporter
//!
//! Telegram alert text for a researched pump.

use pump_core::{Finding, Investigation, Pump, Trigger, TriggerType};
use std::fmt::Write as _;

use crate::describe_window;

/// Findings quoted in an alert
pub const ALERT_FINDINGS: usize = 3;

/// Characters kept from each quoted finding
const FINDING_PREVIEW_CHARS: usize = 200;

/// Alert layout shown to the agent; `format_alert` renders the same shape
pub const ALERT_TEMPLATE: &str = "🚀 PUMP DETECTED: ${symbol}

📈 Price: +{price_change_pct}% ({window})
💰 Current: ${price}

🔍 Trigger: {trigger_type}
{description}

Key Findings:
- {finding_1}
- {finding_2}

#crypto #{symbol}";

/// Cut `text` to `max` characters, marking the cut with `...`
pub fn preview(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push_str("...");
    cut
}

/// Render the alert for a stored pump
pub fn format_alert(pump: &Pump, trigger: Option<&Trigger>, findings: &[Finding]) -> String {
    let mut ranked: Vec<&Finding> = findings.iter().collect();
    ranked.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

    let mut out = String::new();
    let _ = writeln!(out, "🚀 PUMP DETECTED: ${}", pump.symbol);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "📈 Price: +{:.1}% ({})",
        pump.price_change_pct,
        describe_window(pump.time_window_minutes)
    );
    if let Some(price) = pump.price_at_detection {
        let _ = writeln!(out, "💰 Current: ${price}");
    }
    let _ = writeln!(out);

    match trigger {
        Some(t) => {
            let _ = writeln!(out, "🔍 Trigger: {}", t.trigger_type.label());
            if !t.description.is_empty() {
                let _ = writeln!(out, "{}", t.description);
            }
        }
        None => {
            let _ = writeln!(out, "🔍 Trigger: {}", TriggerType::Unknown.label());
        }
    }

    if !ranked.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Key Findings:");
        for finding in ranked.iter().take(ALERT_FINDINGS) {
            let _ = writeln!(out, "- {}", preview(&finding.content, FINDING_PREVIEW_CHARS));
        }
    }

    let _ = writeln!(out);
    let _ = write!(out, "#crypto #{}", pump.symbol);
    out
}

/// Prompt asking the agent to deliver an alert built from an investigation
pub fn telegram_report_prompt(pump: &Pump, investigation: &Investigation) -> String {
    let trigger = investigation.likely_trigger.as_ref();
    let trigger_type = investigation.trigger_type();
    let description = trigger.map(|t| t.description.as_str()).unwrap_or_default();
    let confidence = trigger.map_or(0.0, |t| t.confidence) * 100.0;

    let mut findings = String::new();
    for finding in investigation.findings.iter().take(ALERT_FINDINGS) {
        let _ = writeln!(
            findings,
            "- [{}] {}",
            finding.source_type,
            preview(&finding.content, FINDING_PREVIEW_CHARS)
        );
    }
    if findings.is_empty() {
        findings.push_str("- No findings recorded\n");
    }

    format!(
        r#"You are the reporting agent. Send one Telegram alert about a researched pump.

## Pump
- Symbol: {symbol}
- Change: +{change:.1}% over {window}
- Trigger: {trigger} ({confidence:.0}% confidence)
- Description: {description}

## Findings
{findings}
## Summary
{summary}

## Instructions
Use the Telegram MCP `send_message` tool with the chat ID from the TELEGRAM_CHAT_ID environment variable.
Follow this layout:
```
{template}
```

Reply with JSON: {{"sent": true, "message": "<the text you sent>"}}"#,
        symbol = pump.symbol,
        change = pump.price_change_pct,
        window = describe_window(pump.time_window_minutes),
        trigger = trigger_type.label(),
        summary = if investigation.summary.is_empty() {
            "(none)"
        } else {
            investigation.summary.as_str()
        },
        template = ALERT_TEMPLATE,
    )
}
