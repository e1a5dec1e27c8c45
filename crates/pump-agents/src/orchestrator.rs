//! Orchestrator
//!
//! Single prompt that drives a headless agent session through detection,
//! investigation, storage and notification.

use pump_core::model::MIN_FINDING_CHARS;

use crate::detector::detection_prompt;
use crate::investigator::trigger_type_list;
use crate::reporter::ALERT_TEMPLATE;

/// SQLite expression for "now" in the stored timestamp format
const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%f+00:00', 'now')";

/// The complete orchestrator prompt
pub fn full_prompt(threshold_pct: f64, window_minutes: u32) -> String {
    let detection = detection_prompt(threshold_pct, window_minutes);
    let triggers = trigger_type_list();

    format!(
        r#"You are the Pump Research Agent orchestrator. Carry out the workflow below from start to finish.

## Phase 1: Detect Pumps
{detection}

## Phase 2: Investigate Each Pump
For every detected pump you MUST search for the news or event behind it with the MCP tools.

### Twitter/X (required)
Search for:
- `${{symbol}} announcement`
- `${{symbol}} news`
- `${{symbol}} listing`
- `${{symbol}} partnership`
Prefer official accounts, crypto news outlets and well-known traders.

### Reddit (required)
Search r/cryptocurrency, r/CryptoMoonShots and r/altcoin for posts about the token from the last 24 hours.

### Web Search
Look for recent news articles about the token.

### What to extract
For EACH source record:
- **content**: the actual text of the post or article (not "search performed")
- **source_url**: direct link
- **relevance_score**: 0.0-1.0, how well it explains the pump
- **sentiment**: positive, negative or neutral

Pick the single most likely trigger from these categories:
{triggers}
## Phase 3: Save to Database
Use the database MCP server's query tools. Do NOT use Python or Bash.
Timestamps are stored as UTC text; `{now}` produces the right format.

### Check whether the pump was already recorded
```sql
SELECT id FROM pumps
WHERE symbol = 'SYMBOL'
  AND detected_at > strftime('%Y-%m-%dT%H:%M:%f+00:00', 'now', '-1 hour');
```

### Otherwise create it
```sql
INSERT INTO pumps (symbol, price_change_pct, time_window_minutes, detected_at, price_at_detection, volume_change_pct, market_cap, source)
VALUES ('SYMBOL', 10.5, {window_minutes}, {now}, '1.23', 50.0, '1000000', 'binance')
RETURNING id;
```

### Save findings (only when content is longer than {min_chars} characters)
```sql
INSERT OR IGNORE INTO findings (pump_id, source_type, source_url, content, relevance_score, sentiment, found_at)
VALUES (PUMP_ID, 'twitter', 'https://...', 'Actual content here...', 0.8, 'positive', {now});
```

### Save the trigger (replaces an existing one only when confidence is higher)
```sql
INSERT INTO news_triggers (pump_id, trigger_type, description, confidence, identified_at)
VALUES (PUMP_ID, 'exchange_listing', 'Description of trigger', 0.85, {now})
ON CONFLICT(pump_id) DO UPDATE SET
  trigger_type = excluded.trigger_type,
  description = excluded.description,
  confidence = excluded.confidence,
  identified_at = excluded.identified_at
WHERE excluded.confidence > news_triggers.confidence;
```

### Record the notification
```sql
INSERT INTO notifications (pump_id, channel, message, sent_at, status)
VALUES (PUMP_ID, 'telegram', 'MESSAGE', {now}, 'sent');
```

## Phase 4: Send Telegram Alert
Use the Telegram MCP `send_message` tool with the chat ID from the TELEGRAM_CHAT_ID environment variable.

Message format:
```
{alert}
```

## Rules
1. If no pumps are detected, output "No pumps detected" and stop
2. For each pump you MUST actually call the Twitter and Reddit tools; do not claim searches you did not run
3. Findings must hold real content from the sources, never placeholders
4. Save each pump with its real findings
5. Send one Telegram message per pump

Finish with this summary:
```json
{{
  "pumps_detected": <count>,
  "findings_count": <count>,
  "notifications_sent": <count>
}}
```"#,
        now = NOW_SQL,
        min_chars = MIN_FINDING_CHARS,
        alert = ALERT_TEMPLATE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embeds_detection_phase() {
        let prompt = full_prompt(5.0, 60);
        assert!(prompt.contains("## Phase 1: Detect Pumps"));
        assert!(prompt.contains("at least 5%"));
        assert!(prompt.contains("## Phase 4: Send Telegram Alert"));
    }

    #[test]
    fn test_substitution_leaves_no_template_markers() {
        let prompt = full_prompt(6.5, 120);
        assert!(prompt.contains("at least 6.5%"));
        assert!(prompt.contains("last 2 hours"));
        assert!(prompt.contains("`${symbol} announcement`"));
        assert!(prompt.contains("\"pumps_detected\": <count>"));
        assert!(!prompt.contains("{now}"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_sql_honors_store_rules() {
        let prompt = full_prompt(5.0, 60);
        assert!(prompt.contains("INSERT OR IGNORE INTO findings"));
        assert!(prompt.contains("WHERE excluded.confidence > news_triggers.confidence"));
        assert!(prompt.contains("longer than 50 characters"));
    }
}
