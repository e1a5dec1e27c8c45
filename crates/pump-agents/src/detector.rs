//! Pump Detector
//!
//! Asks the agent to scan exchange and aggregator data for symbols whose
//! price rose past the threshold inside the window.

use chrono::Utc;
use pump_core::extract::parse_agent_json;
use pump_core::DetectedPump;

use crate::describe_window;

/// Detection prompt for the given threshold and window
pub fn detection_prompt(threshold_pct: f64, window_minutes: u32) -> String {
    let window = describe_window(window_minutes);
    format!(
        r#"You are a crypto pump detection agent. Find tokens whose price rose sharply in the last {window}.

## Detection Criteria
- Price increase of at least {threshold_pct}% within the last {window} ({window_minutes} minutes)
- Use BOTH the Binance and the CoinMarketCap MCP servers

## Steps

### 1. Binance
- List trading pairs, focusing on USDT pairs
- Read the price change over the window for each pair
- Keep pairs at or above {threshold_pct}%

### 2. CoinMarketCap
- Fetch the top gainers for the window
- Collect market cap and volume for context

### 3. Merge
- Combine both lists, one entry per symbol
- A symbol seen on both sides gets source "both"
- Record symbol, price_change_pct, volume_change_pct, market_cap, price_at_detection

## Output
Return a JSON array:
```json
[
  {{
    "symbol": "SOL",
    "price_change_pct": 8.2,
    "volume_change_pct": 140.0,
    "market_cap": 91000000000,
    "price_at_detection": 195.40,
    "source": "both",
    "time_window_minutes": {window_minutes}
  }}
]
```

If nothing qualifies, return an empty array: []

Run the detection now and reply with the JSON only."#
    )
}

/// Parse detector output. Any failure yields an empty list.
///
/// Each pump is stamped with the current time, its symbol is normalized, and
/// a missing window is filled with `default_window`.
pub fn parse_pump_results(output: &str, default_window: u32) -> Vec<DetectedPump> {
    let pumps: Vec<DetectedPump> = match parse_agent_json(output) {
        Ok(pumps) => pumps,
        Err(e) => {
            tracing::warn!(error = %e, "Error parsing pump results");
            return Vec::new();
        }
    };

    let now = Utc::now();
    pumps
        .into_iter()
        .filter_map(|mut pump| {
            pump.symbol = pump.symbol.trim().to_uppercase();
            if pump.symbol.is_empty() {
                tracing::warn!("Dropping pump without symbol");
                return None;
            }
            pump.detected_at = now;
            pump.time_window_minutes.get_or_insert(default_window);
            Some(pump)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_prompt_substitutes_criteria() {
        let prompt = detection_prompt(7.5, 30);
        assert!(prompt.contains("at least 7.5%"));
        assert!(prompt.contains("last 30 minutes"));
        assert!(prompt.contains("\"time_window_minutes\": 30"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_parse_fenced_results() {
        let output = r#"Found two movers.
```json
[
  {"symbol": "sol", "price_change_pct": 8.2, "market_cap": 91000000000, "source": "both"},
  {"symbol": "WIF", "price_change_pct": 12.0, "time_window_minutes": 30}
]
```"#;
        let pumps = parse_pump_results(output, 60);
        assert_eq!(pumps.len(), 2);
        assert_eq!(pumps[0].symbol, "SOL");
        assert_eq!(pumps[0].source, "both");
        assert_eq!(pumps[0].market_cap, Some(dec!(91000000000)));
        assert_eq!(pumps[0].time_window_minutes, Some(60));
        assert_eq!(pumps[1].time_window_minutes, Some(30));
        assert_eq!(pumps[1].source, "coinmarketcap");
    }

    #[test]
    fn test_parse_empty_and_invalid() {
        assert!(parse_pump_results("[]", 60).is_empty());
        assert!(parse_pump_results("No pumps detected", 60).is_empty());
        assert!(parse_pump_results("```json\n{\"symbol\": \"BTC\"}\n```", 60).is_empty());
    }

    #[test]
    fn test_parse_drops_blank_symbols() {
        let pumps = parse_pump_results(r#"[{"symbol": " ", "price_change_pct": 9.0}]"#, 60);
        assert!(pumps.is_empty());
    }
}
