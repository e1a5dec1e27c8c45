//! JSON Extraction
//!
//! The agent answers in prose with JSON somewhere inside, usually in a
//! markdown code fence. These helpers find that JSON.

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// Locate the JSON payload in agent output.
///
/// Prefers a ```` ```json ```` fence, then any fence, then the whole text.
/// An unterminated fence yields everything after the marker.
pub fn extract_json_block(text: &str) -> &str {
    if let Some(start) = text.find(JSON_FENCE) {
        let after = &text[start + JSON_FENCE.len()..];
        let end = after.find(FENCE).unwrap_or(after.len());
        return after[..end].trim();
    }

    if let Some(start) = text.find(FENCE) {
        let after = &text[start + FENCE.len()..];
        let end = after.find(FENCE).unwrap_or(after.len());
        let inner = &after[..end];
        return strip_language_tag(inner).trim();
    }

    text.trim()
}

/// Drop a leading ```` ```lang ```` tag so the body parses as JSON
fn strip_language_tag(inner: &str) -> &str {
    let Some(newline) = inner.find('\n') else {
        return inner;
    };
    let first = inner[..newline].trim();
    let is_tag = !first.is_empty()
        && first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if is_tag { &inner[newline + 1..] } else { inner }
}

/// Final result text of a `--output-format stream-json` result event.
///
/// Returns `None` for any other line, including non-JSON lines.
pub fn stream_result_text(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') || !trimmed.contains("\"result\"") {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
    if value.get("type")?.as_str()? != "result" {
        return None;
    }
    value.get("result")?.as_str().map(str::to_string)
}

/// Parse the JSON payload of agent output into `T`
pub fn parse_agent_json<T: serde::de::DeserializeOwned>(text: &str) -> crate::Result<T> {
    let block = extract_json_block(text);
    serde_json::from_str(block).map_err(|e| crate::PumpError::Parse(e.to_string()))
}
