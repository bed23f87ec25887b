//! Append-only event store
//!
//! Raw inbound events keyed by the caller's idempotency key. Rows are never
//! mutated after insert except for the `processed` flag, which the
//! reconciliation commit flips exactly once.

use chrono::{DateTime, Utc};
use journal_core::{EventKind, TradeEvent};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::StoreResult;

/// Stored event row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventRecord {
    pub id: Uuid,
    pub idempotency_key: String,
    pub account_id: Uuid,
    pub terminal_id: String,
    pub kind: String,
    pub via_history_sync: bool,
    pub position_id: i64,
    pub deal_id: Option<i64>,
    pub order_id: Option<i64>,
    pub symbol: Option<String>,
    pub direction: Option<String>,
    pub lots: Option<f64>,
    pub price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub commission: f64,
    pub swap: f64,
    pub profit: f64,
    pub occurred_at: DateTime<Utc>,
    pub equity_at_entry: Option<f64>,
    pub entry_price: Option<f64>,
    pub entry_time: Option<DateTime<Utc>>,
    pub raw_payload: Option<serde_json::Value>,
    pub processed: bool,
    pub received_at: DateTime<Utc>,
}

impl EventRecord {
    /// Rebuild the normalized event from the stored row, for re-running
    /// reconciliation on a still-unprocessed duplicate delivery.
    pub fn to_event(&self) -> StoreResult<TradeEvent> {
        let kind: EventKind = self.kind.parse()?;
        let direction = match &self.direction {
            Some(d) => Some(d.parse()?),
            None => None,
        };

        Ok(TradeEvent {
            idempotency_key: self.idempotency_key.clone(),
            terminal_id: self.terminal_id.clone(),
            kind,
            via_history_sync: self.via_history_sync,
            position_id: self.position_id,
            deal_id: self.deal_id,
            order_id: self.order_id,
            symbol: self.symbol.clone(),
            direction,
            lots: self.lots,
            price: self.price,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            commission: self.commission,
            swap: self.swap,
            profit: self.profit,
            occurred_at: self.occurred_at,
            equity_at_entry: self.equity_at_entry,
            entry_price: self.entry_price,
            entry_time: self.entry_time,
        })
    }
}

/// Store for the append-only event log
#[derive(Clone)]
pub struct EventStore {
    pool: PgPool,
}

impl EventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the event unless its idempotency key was already seen.
    ///
    /// Returns `(true, row)` when this call inserted the row and
    /// `(false, existing_row)` when another submission got there first. The
    /// insert and the uniqueness check are one atomic statement, so two
    /// racing submissions of the same key resolve to exactly one winner.
    #[instrument(skip(self, event, raw_payload), fields(idempotency_key = %event.idempotency_key))]
    pub async fn record_if_new(
        &self,
        account_id: Uuid,
        event: &TradeEvent,
        raw_payload: &serde_json::Value,
    ) -> StoreResult<(bool, EventRecord)> {
        let inserted = sqlx::query_as::<_, EventRecord>(
            r#"
            INSERT INTO events
                (id, idempotency_key, account_id, terminal_id, kind,
                 via_history_sync, position_id, deal_id, order_id, symbol,
                 direction, lots, price, stop_loss, take_profit, commission,
                 swap, profit, occurred_at, equity_at_entry, entry_price,
                 entry_time, raw_payload, processed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, FALSE)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&event.idempotency_key)
        .bind(account_id)
        .bind(&event.terminal_id)
        .bind(event.kind.as_str())
        .bind(event.via_history_sync)
        .bind(event.position_id)
        .bind(event.deal_id)
        .bind(event.order_id)
        .bind(&event.symbol)
        .bind(event.direction.map(|d| d.as_str()))
        .bind(event.lots)
        .bind(event.price)
        .bind(event.stop_loss)
        .bind(event.take_profit)
        .bind(event.commission)
        .bind(event.swap)
        .bind(event.profit)
        .bind(event.occurred_at)
        .bind(event.equity_at_entry)
        .bind(event.entry_price)
        .bind(event.entry_time)
        .bind(raw_payload)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(record) => {
                debug!(event_id = %record.id, "event recorded");
                Ok((true, record))
            }
            None => {
                // Lost the race (or a plain retry): surface the original row.
                let existing = self
                    .find_by_key(&event.idempotency_key)
                    .await?
                    .ok_or_else(|| {
                        crate::error::StoreError::NotFound(format!(
                            "event with idempotency key {}",
                            event.idempotency_key
                        ))
                    })?;
                debug!(event_id = %existing.id, "duplicate idempotency key");
                Ok((false, existing))
            }
        }
    }

    /// Look up a stored event by idempotency key
    pub async fn find_by_key(&self, idempotency_key: &str) -> StoreResult<Option<EventRecord>> {
        let record =
            sqlx::query_as::<_, EventRecord>("SELECT * FROM events WHERE idempotency_key = $1")
                .bind(idempotency_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use journal_core::Direction;

    fn record() -> EventRecord {
        EventRecord {
            id: Uuid::new_v4(),
            idempotency_key: "abc".into(),
            account_id: Uuid::new_v4(),
            terminal_id: "term-1".into(),
            kind: "exit".into(),
            via_history_sync: true,
            position_id: 42,
            deal_id: Some(7),
            order_id: None,
            symbol: Some("EURUSD".into()),
            direction: Some("sell".into()),
            lots: Some(0.5),
            price: 1.1,
            stop_loss: None,
            take_profit: None,
            commission: 1.0,
            swap: -0.5,
            profit: 25.0,
            occurred_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            equity_at_entry: Some(10_000.0),
            entry_price: Some(1.09),
            entry_time: None,
            raw_payload: None,
            processed: false,
            received_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 1).unwrap(),
        }
    }

    #[test]
    fn stored_row_rebuilds_the_event() {
        let event = record().to_event().unwrap();
        assert_eq!(event.kind, EventKind::Exit);
        assert_eq!(event.direction, Some(Direction::Sell));
        assert!(event.via_history_sync);
        assert_eq!(event.position_id, 42);
        assert_eq!(event.entry_price, Some(1.09));
    }

    #[test]
    fn corrupt_kind_is_rejected() {
        let mut row = record();
        row.kind = "teleport".into();
        assert!(row.to_event().is_err());
    }
}
