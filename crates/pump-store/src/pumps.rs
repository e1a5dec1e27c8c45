//! Pumps and everything attached to them

use chrono::{DateTime, Duration, Utc};
use pump_core::model::{
    DEFAULT_CONFIDENCE, DEFAULT_RELEVANCE, DEFAULT_TIME_WINDOW_MINUTES, MIN_FINDING_CHARS,
};
use pump_core::{
    DetectedPump, Finding, FindingReport, Investigation, Notification, Pump, PumpDetail, PumpGroup,
    Sentiment, Stats, Trigger, TriggerReport, TriggerType,
};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, info, warn};

use crate::{Result, Store, StoreError};

/// Minutes within which a repeated detection reuses the existing pump
pub const DEDUPE_WINDOW_MINUTES: i64 = 60;

/// Result of `Store::record_pump`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordedPump {
    pub id: i64,

    /// `false` when an earlier detection was reused
    pub created: bool,
}

/// Result of `Store::record_investigation`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InvestigationSaved {
    pub findings_saved: usize,
    pub trigger_saved: bool,
}

// ============================================================================
// Row mapping
// ============================================================================

fn decimal_column(row: &SqliteRow, column: &str) -> Result<Option<Decimal>> {
    let raw: Option<String> = row.try_get(column)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let raw = raw.trim();
    let parsed = raw.parse::<Decimal>().or_else(|_| Decimal::from_scientific(raw));
    match parsed {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(column, value = raw, error = %e, "Ignoring unreadable decimal");
            Ok(None)
        }
    }
}

fn pump_from_row(row: &SqliteRow) -> Result<Pump> {
    let window: i64 = row.try_get("time_window_minutes")?;
    Ok(Pump {
        id: row.try_get("id")?,
        symbol: row.try_get("symbol")?,
        price_change_pct: row.try_get("price_change_pct")?,
        time_window_minutes: u32::try_from(window).unwrap_or(DEFAULT_TIME_WINDOW_MINUTES),
        detected_at: row.try_get("detected_at")?,
        price_at_detection: decimal_column(row, "price_at_detection")?,
        volume_change_pct: row.try_get("volume_change_pct")?,
        market_cap: decimal_column(row, "market_cap")?,
        source: row.try_get("source")?,
    })
}

fn finding_from_row(row: &SqliteRow) -> Result<Finding> {
    let sentiment: String = row.try_get("sentiment")?;
    Ok(Finding {
        id: row.try_get("id")?,
        pump_id: row.try_get("pump_id")?,
        source_type: row.try_get("source_type")?,
        source_url: row.try_get("source_url")?,
        content: row.try_get("content")?,
        relevance_score: row.try_get("relevance_score")?,
        sentiment: sentiment.parse::<Sentiment>().unwrap_or_default(),
        found_at: row.try_get("found_at")?,
    })
}

fn trigger_from_row(row: &SqliteRow) -> Result<Trigger> {
    let trigger_type: String = row.try_get("trigger_type")?;
    Ok(Trigger {
        id: row.try_get("id")?,
        pump_id: row.try_get("pump_id")?,
        trigger_type: trigger_type.parse::<TriggerType>().unwrap_or_default(),
        description: row.try_get("description")?,
        confidence: row.try_get("confidence")?,
        identified_at: row.try_get("identified_at")?,
    })
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification> {
    Ok(Notification {
        id: row.try_get("id")?,
        pump_id: row.try_get("pump_id")?,
        channel: row.try_get("channel")?,
        message: row.try_get("message")?,
        sent_at: row.try_get("sent_at")?,
        status: row.try_get("status")?,
    })
}

/// Clamp a 0..1 score, substituting `default` for NaN and infinities
fn unit_score(value: f64, default: f64) -> f64 {
    if value.is_finite() { value.clamp(0.0, 1.0) } else { default }
}

pub(crate) fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

// ============================================================================
// Operations
// ============================================================================

impl Store {
    /// Record a detected pump, reusing a detection of the same symbol from
    /// the preceding hour
    pub async fn record_pump(&self, pump: &DetectedPump) -> Result<RecordedPump> {
        let symbol = pump.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(StoreError::Invalid("pump symbol is empty".into()));
        }
        if !pump.price_change_pct.is_finite() {
            return Err(StoreError::Invalid(format!("price change for {symbol} is not a number")));
        }

        let cutoff: DateTime<Utc> = pump.detected_at - Duration::minutes(DEDUPE_WINDOW_MINUTES);
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM pumps WHERE symbol = ? AND detected_at > ? ORDER BY detected_at DESC, id DESC LIMIT 1",
        )
        .bind(&symbol)
        .bind(cutoff)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(id) = existing {
            tx.commit().await?;
            debug!(id, symbol = %symbol, "Pump already recorded within the dedupe window");
            return Ok(RecordedPump { id, created: false });
        }

        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO pumps (
                symbol, price_change_pct, time_window_minutes, detected_at,
                price_at_detection, volume_change_pct, market_cap, source
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            ",
        )
        .bind(&symbol)
        .bind(pump.price_change_pct)
        .bind(i64::from(pump.window_minutes()))
        .bind(pump.detected_at)
        .bind(pump.price_at_detection.map(|d| d.to_string()))
        .bind(pump.volume_change_pct.filter(|v| v.is_finite()))
        .bind(pump.market_cap.map(|d| d.to_string()))
        .bind(pump.source.trim())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(id, symbol = %symbol, change_pct = pump.price_change_pct, "Recorded pump");
        Ok(RecordedPump { id, created: true })
    }

    async fn ensure_pump(&self, pump_id: i64) -> Result<()> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM pumps WHERE id = ?")
            .bind(pump_id)
            .fetch_optional(&self.pool)
            .await?;
        found
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("Pump {pump_id}")))
    }

    /// Store findings for a pump. Placeholder-length content and exact
    /// duplicates are skipped; returns how many rows were added.
    pub async fn save_findings(&self, pump_id: i64, findings: &[FindingReport]) -> Result<usize> {
        self.ensure_pump(pump_id).await?;

        let now = Utc::now();
        let mut saved = 0;
        let mut tx = self.pool.begin().await?;

        for finding in findings {
            let content = finding.content.trim();
            if content.chars().count() <= MIN_FINDING_CHARS {
                debug!(pump_id, source = %finding.source_type, "Skipping placeholder finding");
                continue;
            }

            let result = sqlx::query(
                r"
                INSERT OR IGNORE INTO findings (
                    pump_id, source_type, source_url, content, relevance_score, sentiment, found_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(pump_id)
            .bind(finding.source_type.trim())
            .bind(finding.source_url.as_deref().map(str::trim).filter(|u| !u.is_empty()))
            .bind(content)
            .bind(unit_score(finding.relevance_score, DEFAULT_RELEVANCE))
            .bind(finding.sentiment.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                saved += 1;
            }
        }

        tx.commit().await?;
        debug!(pump_id, saved, offered = findings.len(), "Saved findings");
        Ok(saved)
    }

    /// Store the trigger for a pump. An existing trigger is replaced only by
    /// a strictly higher confidence; returns whether anything was written.
    pub async fn save_trigger(&self, pump_id: i64, trigger: &TriggerReport) -> Result<bool> {
        self.ensure_pump(pump_id).await?;

        let result = sqlx::query(
            r"
            INSERT INTO news_triggers (pump_id, trigger_type, description, confidence, identified_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (pump_id) DO UPDATE SET
                trigger_type = excluded.trigger_type,
                description = excluded.description,
                confidence = excluded.confidence,
                identified_at = excluded.identified_at
            WHERE excluded.confidence > news_triggers.confidence
            ",
        )
        .bind(pump_id)
        .bind(trigger.trigger_type.as_str())
        .bind(trigger.description.trim())
        .bind(unit_score(trigger.confidence, DEFAULT_CONFIDENCE))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let written = result.rows_affected() > 0;
        if written {
            info!(
                pump_id,
                trigger = %trigger.trigger_type,
                confidence = trigger.confidence,
                "Saved trigger"
            );
        } else {
            debug!(pump_id, "Kept existing trigger with higher or equal confidence");
        }
        Ok(written)
    }

    /// Store the findings and trigger of an investigation
    pub async fn record_investigation(
        &self,
        pump_id: i64,
        investigation: &Investigation,
    ) -> Result<InvestigationSaved> {
        let findings_saved = self.save_findings(pump_id, &investigation.findings).await?;
        let trigger_saved = match &investigation.likely_trigger {
            Some(trigger) => self.save_trigger(pump_id, trigger).await?,
            None => false,
        };
        Ok(InvestigationSaved {
            findings_saved,
            trigger_saved,
        })
    }

    /// Record an alert sent for a pump
    pub async fn save_notification(
        &self,
        pump_id: i64,
        channel: &str,
        message: &str,
        status: &str,
    ) -> Result<i64> {
        self.ensure_pump(pump_id).await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO notifications (pump_id, channel, message, sent_at, status) VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(pump_id)
        .bind(channel)
        .bind(message)
        .bind(Utc::now())
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn get_pump(&self, pump_id: i64) -> Result<Pump> {
        let row = sqlx::query("SELECT * FROM pumps WHERE id = ?")
            .bind(pump_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Pump {pump_id}")))?;
        pump_from_row(&row)
    }

    pub async fn trigger_for(&self, pump_id: i64) -> Result<Option<Trigger>> {
        let row = sqlx::query("SELECT * FROM news_triggers WHERE pump_id = ?")
            .bind(pump_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(trigger_from_row).transpose()
    }

    /// Findings for a pump, most relevant first
    pub async fn findings_for(&self, pump_id: i64, limit: Option<usize>) -> Result<Vec<Finding>> {
        let rows = sqlx::query(
            "SELECT * FROM findings WHERE pump_id = ? ORDER BY relevance_score DESC, id ASC LIMIT ?",
        )
        .bind(pump_id)
        .bind(limit.map_or(-1, sql_limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(finding_from_row).collect()
    }

    pub async fn count_findings(&self, pump_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM findings WHERE pump_id = ?")
            .bind(pump_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn notifications_for(&self, pump_id: i64) -> Result<Vec<Notification>> {
        let rows = sqlx::query("SELECT * FROM notifications WHERE pump_id = ? ORDER BY id ASC")
            .bind(pump_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn detail(&self, pump: Pump, findings_limit: usize) -> Result<PumpDetail> {
        let trigger = self.trigger_for(pump.id).await?;
        let findings = self.findings_for(pump.id, Some(findings_limit)).await?;
        let total = self.count_findings(pump.id).await?;
        Ok(PumpDetail::new(pump, trigger, findings, total))
    }

    /// One pump with its trigger and top findings
    pub async fn pump_detail(&self, pump_id: i64, findings_limit: usize) -> Result<PumpDetail> {
        let pump = self.get_pump(pump_id).await?;
        self.detail(pump, findings_limit).await
    }

    /// Most recent pumps, newest first
    pub async fn recent_pumps(
        &self,
        limit: usize,
        findings_limit: usize,
    ) -> Result<Vec<PumpDetail>> {
        let rows = sqlx::query("SELECT * FROM pumps ORDER BY detected_at DESC, id DESC LIMIT ?")
            .bind(sql_limit(limit))
            .fetch_all(&self.pool)
            .await?;

        let mut details = Vec::with_capacity(rows.len());
        for row in &rows {
            let pump = pump_from_row(row)?;
            details.push(self.detail(pump, findings_limit).await?);
        }
        Ok(details)
    }

    /// Recent pumps grouped by symbol
    pub async fn pump_groups(&self, limit: usize, findings_limit: usize) -> Result<Vec<PumpGroup>> {
        Ok(PumpGroup::group(self.recent_pumps(limit, findings_limit).await?))
    }

    /// Delete a pump together with its findings, trigger and notifications
    pub async fn delete_pump(&self, pump_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM pumps WHERE id = ?")
            .bind(pump_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("Pump {pump_id}")));
        }
        info!(pump_id, "Deleted pump");
        Ok(())
    }

    /// Dashboard counters
    pub async fn stats(&self) -> Result<Stats> {
        let row = sqlx::query(
            r"
            SELECT
                (SELECT COUNT(*) FROM pumps) AS total_pumps,
                (SELECT COUNT(*) FROM findings) AS total_findings,
                (SELECT COUNT(*) FROM news_triggers) AS total_triggers,
                (SELECT COUNT(*) FROM agent_runs) AS total_runs
            ",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(Stats {
            total_pumps: row.try_get("total_pumps")?,
            total_findings: row.try_get("total_findings")?,
            total_triggers: row.try_get("total_triggers")?,
            total_runs: row.try_get("total_runs")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const LONG: &str = "Binance announced PEPE perpetual futures with up to 50x leverage starting today";

    fn report(content: &str, relevance: f64) -> FindingReport {
        FindingReport {
            source_type: "twitter".into(),
            source_url: Some("https://x.com/binance/status/1".into()),
            content: content.into(),
            relevance_score: relevance,
            sentiment: Sentiment::Positive,
            metadata: None,
        }
    }

    fn trigger(trigger_type: TriggerType, confidence: f64) -> TriggerReport {
        TriggerReport {
            trigger_type,
            description: format!("{trigger_type} at {confidence}"),
            confidence,
            supporting_evidence: Vec::new(),
        }
    }

    async fn store_with_pump() -> (Store, i64) {
        let store = Store::in_memory().await.unwrap();
        let mut pump = DetectedPump::new("pepe", 14.2);
        pump.price_at_detection = Some(dec!(0.0000123));
        pump.market_cap = Some(dec!(5200000000));
        let recorded = store.record_pump(&pump).await.unwrap();
        (store, recorded.id)
    }

    #[tokio::test]
    async fn test_record_pump_round_trips_decimals() {
        let (store, id) = store_with_pump().await;
        let pump = store.get_pump(id).await.unwrap();
        assert_eq!(pump.symbol, "PEPE");
        assert_eq!(pump.time_window_minutes, 60);
        assert_eq!(pump.price_at_detection, Some(dec!(0.0000123)));
        assert_eq!(pump.market_cap, Some(dec!(5200000000)));
        assert_eq!(pump.source, "coinmarketcap");
    }

    #[tokio::test]
    async fn test_record_pump_dedupes_within_window() {
        let (store, id) = store_with_pump().await;

        let again = store.record_pump(&DetectedPump::new("PEPE", 18.0)).await.unwrap();
        assert_eq!(again, RecordedPump { id, created: false });

        let other = store.record_pump(&DetectedPump::new("WIF", 9.0)).await.unwrap();
        assert!(other.created);

        let mut later = DetectedPump::new("PEPE", 7.0);
        later.detected_at += Duration::minutes(DEDUPE_WINDOW_MINUTES + 5);
        let later = store.record_pump(&later).await.unwrap();
        assert!(later.created);
        assert_ne!(later.id, id);
    }

    #[tokio::test]
    async fn test_record_pump_rejects_blank_symbol() {
        let store = Store::in_memory().await.unwrap();
        let err = store.record_pump(&DetectedPump::new("  ", 5.0)).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_findings_filter_and_dedupe() {
        let (store, id) = store_with_pump().await;
        let findings = vec![
            report(LONG, 0.9),
            report(LONG, 0.4),
            report("search performed", 0.8),
            report(&"x".repeat(MIN_FINDING_CHARS), 0.8),
            report(&format!("{LONG} (reddit repost)"), 3.0),
        ];

        assert_eq!(store.save_findings(id, &findings).await.unwrap(), 2);
        assert_eq!(store.save_findings(id, &findings).await.unwrap(), 0);

        let stored = store.findings_for(id, None).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!((stored[0].relevance_score - 1.0).abs() < f64::EPSILON);
        assert_eq!(stored[1].content, LONG);
        assert_eq!(stored[1].sentiment, Sentiment::Positive);
        assert_eq!(store.count_findings(id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_findings_for_unknown_pump() {
        let store = Store::in_memory().await.unwrap();
        let err = store.save_findings(42, &[report(LONG, 0.5)]).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_trigger_replaced_only_by_higher_confidence() {
        let (store, id) = store_with_pump().await;

        assert!(store.save_trigger(id, &trigger(TriggerType::SocialHype, 0.6)).await.unwrap());
        assert!(!store.save_trigger(id, &trigger(TriggerType::WhaleActivity, 0.6)).await.unwrap());
        assert!(!store.save_trigger(id, &trigger(TriggerType::WhaleActivity, 0.3)).await.unwrap());
        assert_eq!(
            store.trigger_for(id).await.unwrap().unwrap().trigger_type,
            TriggerType::SocialHype
        );

        assert!(
            store
                .save_trigger(id, &trigger(TriggerType::ExchangeListing, 0.85))
                .await
                .unwrap()
        );
        let stored = store.trigger_for(id).await.unwrap().unwrap();
        assert_eq!(stored.trigger_type, TriggerType::ExchangeListing);
        assert!((stored.confidence - 0.85).abs() < f64::EPSILON);
        assert_eq!(store.stats().await.unwrap().total_triggers, 1);
    }

    #[tokio::test]
    async fn test_record_investigation() {
        let (store, id) = store_with_pump().await;
        let investigation = Investigation {
            symbol: "PEPE".into(),
            findings: vec![report(LONG, 0.9), report("too short", 0.9)],
            likely_trigger: Some(trigger(TriggerType::ExchangeListing, 0.8)),
            summary: "Listing".into(),
            investigated_at: Utc::now(),
        };
        let saved = store.record_investigation(id, &investigation).await.unwrap();
        assert_eq!(saved, InvestigationSaved { findings_saved: 1, trigger_saved: true });

        let failed = Investigation::failed("bad json");
        let saved = store.record_investigation(id, &failed).await.unwrap();
        assert_eq!(saved, InvestigationSaved::default());
    }

    #[tokio::test]
    async fn test_pump_detail_and_groups() {
        let (store, pepe) = store_with_pump().await;
        let findings: Vec<_> = (0..7)
            .map(|i| report(&format!("{LONG} #{i}"), f64::from(i) / 10.0))
            .collect();
        store.save_findings(pepe, &findings).await.unwrap();
        store.save_trigger(pepe, &trigger(TriggerType::ExchangeListing, 0.9)).await.unwrap();

        let wif = store.record_pump(&DetectedPump::new("WIF", 6.0)).await.unwrap().id;

        let detail = store.pump_detail(pepe, 5).await.unwrap();
        assert_eq!(detail.findings.len(), 5);
        assert_eq!(detail.findings_total, 7);
        assert!(detail.findings[0].content.ends_with("#6"));
        assert_eq!(detail.confidence_level, Some(pump_core::ConfidenceLevel::High));

        let recent = store.recent_pumps(50, 5).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].pump.id, wif);

        let groups = store.pump_groups(100, 5).await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].symbol, "WIF");
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let (store, id) = store_with_pump().await;
        store.save_findings(id, &[report(LONG, 0.9)]).await.unwrap();
        store.save_trigger(id, &trigger(TriggerType::Airdrop, 0.5)).await.unwrap();
        store.save_notification(id, "telegram", "alert", "sent").await.unwrap();

        store.delete_pump(id).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_pumps, 0);
        assert_eq!(stats.total_findings, 0);
        assert_eq!(stats.total_triggers, 0);
        assert!(store.notifications_for(id).await.unwrap().is_empty());
        assert!(store.delete_pump(id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_notifications() {
        let (store, id) = store_with_pump().await;
        let nid = store
            .save_notification(id, "telegram", "🚀 PUMP DETECTED: $PEPE", "sent")
            .await
            .unwrap();
        let stored = store.notifications_for(id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, nid);
        assert_eq!(stored[0].channel, "telegram");
        assert!(store.save_notification(999, "telegram", "x", "sent").await.is_err());
    }
}
