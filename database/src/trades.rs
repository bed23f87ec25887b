//! Reconciled trade aggregates
//!
//! One row per position lifecycle, keyed by `(account_id, position_id)`.
//! Every state transition lands in a single transaction together with the
//! event's `processed` flag (and the account equity settlement on close), so
//! concurrent readers never observe a partially-applied transition.

use chrono::{DateTime, Utc};
use journal_core::reconcile::Transition;
use journal_core::{PartialClose, Trade};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::StoreResult;

/// Database row for a trade aggregate
#[derive(Debug, Clone, FromRow)]
pub struct TradeRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub position_id: i64,
    pub symbol: String,
    pub direction: String,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
    pub stop_loss_initial: Option<f64>,
    pub take_profit_initial: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub lots_original: f64,
    pub lots_remaining: f64,
    pub partial_closes: Json<Vec<PartialClose>>,
    pub gross_pnl: f64,
    pub commission: f64,
    pub swap: f64,
    pub net_pnl: f64,
    pub r_multiple: Option<f64>,
    pub session: String,
    pub is_open: bool,
    pub duration_secs: Option<i64>,
    pub equity_at_entry: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TradeRow> for Trade {
    type Error = crate::error::StoreError;

    fn try_from(row: TradeRow) -> Result<Self, Self::Error> {
        Ok(Trade {
            id: row.id,
            account_id: row.account_id,
            position_id: row.position_id,
            symbol: row.symbol,
            direction: row.direction.parse()?,
            entry_price: row.entry_price,
            entry_time: row.entry_time,
            exit_price: row.exit_price,
            exit_time: row.exit_time,
            stop_loss_initial: row.stop_loss_initial,
            take_profit_initial: row.take_profit_initial,
            stop_loss: row.stop_loss,
            take_profit: row.take_profit,
            lots_original: row.lots_original,
            lots_remaining: row.lots_remaining,
            partial_closes: row.partial_closes.0,
            gross_pnl: row.gross_pnl,
            commission: row.commission,
            swap: row.swap,
            net_pnl: row.net_pnl,
            r_multiple: row.r_multiple,
            session: row.session.parse()?,
            is_open: row.is_open,
            duration_secs: row.duration_secs,
            equity_at_entry: row.equity_at_entry,
        })
    }
}

/// Closed-trade summary for one account
#[derive(Debug, Clone, serde::Serialize)]
pub struct AccountTradeStats {
    pub total_closed: i64,
    pub wins: i64,
    pub losses: i64,
    pub gross_pnl: f64,
    pub net_pnl: f64,
    pub avg_r_multiple: Option<f64>,
    pub by_session: Vec<SessionBucket>,
}

/// Per-session slice of the stats summary
#[derive(Debug, Clone, serde::Serialize, FromRow)]
pub struct SessionBucket {
    pub session: String,
    pub trades: i64,
    pub net_pnl: f64,
}

/// Store for trade aggregates
#[derive(Clone)]
pub struct TradeStore {
    pool: PgPool,
}

impl TradeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch the open aggregate for a position key, if any
    #[instrument(skip(self))]
    pub async fn find_open(&self, account_id: Uuid, position_id: i64) -> StoreResult<Option<Trade>> {
        let row = sqlx::query_as::<_, TradeRow>(
            "SELECT * FROM trades WHERE account_id = $1 AND position_id = $2 AND is_open",
        )
        .bind(account_id)
        .bind(position_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Trade::try_from).transpose()
    }

    /// Persist one reconciliation transition atomically.
    ///
    /// Writes the aggregate (when the transition carries one), settles the
    /// account equity on close, and flips the event's `processed` flag, all
    /// in one commit. Rolling back on any failure leaves the event
    /// unprocessed for a later retry.
    #[instrument(skip(self, transition), fields(event_id = %event_id))]
    pub async fn commit_transition(
        &self,
        event_id: Uuid,
        transition: &Transition,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        match transition {
            Transition::Opened(trade)
            | Transition::Adjusted(trade)
            | Transition::Reduced(trade) => {
                upsert_trade(&mut tx, trade).await?;
            }
            Transition::Closed(close) => {
                upsert_trade(&mut tx, &close.trade).await?;
                if let Some(equity) = close.settled_equity {
                    sqlx::query(
                        "UPDATE accounts SET equity = $2, updated_at = NOW() WHERE id = $1",
                    )
                    .bind(close.trade.account_id)
                    .bind(equity)
                    .execute(&mut *tx)
                    .await?;
                }
            }
            // Nothing to write for the aggregate; the event is still
            // consumed so replays stay side-effect free.
            Transition::Unchanged(_) | Transition::NoPosition => {}
        }

        sqlx::query("UPDATE events SET processed = TRUE WHERE id = $1")
            .bind(event_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("transition committed");
        Ok(())
    }

    /// List an account's trades, newest entry first
    #[instrument(skip(self))]
    pub async fn list_for_account(
        &self,
        account_id: Uuid,
        open: Option<bool>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Trade>> {
        let rows = sqlx::query_as::<_, TradeRow>(
            r#"
            SELECT * FROM trades
            WHERE account_id = $1 AND ($2::boolean IS NULL OR is_open = $2)
            ORDER BY entry_time DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(account_id)
        .bind(open)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Trade::try_from).collect()
    }

    /// Closed-trade summary with a per-session breakdown
    #[instrument(skip(self))]
    pub async fn stats_for_account(&self, account_id: Uuid) -> StoreResult<AccountTradeStats> {
        let totals: (i64, i64, i64, f64, f64, Option<f64>) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE net_pnl > 0),
                   COUNT(*) FILTER (WHERE net_pnl <= 0),
                   COALESCE(SUM(gross_pnl), 0),
                   COALESCE(SUM(net_pnl), 0),
                   AVG(r_multiple)
            FROM trades
            WHERE account_id = $1 AND NOT is_open
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        let by_session = sqlx::query_as::<_, SessionBucket>(
            r#"
            SELECT session, COUNT(*) AS trades, COALESCE(SUM(net_pnl), 0) AS net_pnl
            FROM trades
            WHERE account_id = $1 AND NOT is_open
            GROUP BY session
            ORDER BY session
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(AccountTradeStats {
            total_closed: totals.0,
            wins: totals.1,
            losses: totals.2,
            gross_pnl: totals.3,
            net_pnl: totals.4,
            avg_r_multiple: totals.5,
            by_session,
        })
    }
}

async fn upsert_trade(tx: &mut Transaction<'_, Postgres>, trade: &Trade) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO trades
            (id, account_id, position_id, symbol, direction, entry_price,
             entry_time, exit_price, exit_time, stop_loss_initial,
             take_profit_initial, stop_loss, take_profit, lots_original,
             lots_remaining, partial_closes, gross_pnl, commission, swap,
             net_pnl, r_multiple, session, is_open, duration_secs,
             equity_at_entry)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)
        ON CONFLICT (account_id, position_id) DO UPDATE SET
            exit_price = EXCLUDED.exit_price,
            exit_time = EXCLUDED.exit_time,
            stop_loss = EXCLUDED.stop_loss,
            take_profit = EXCLUDED.take_profit,
            lots_remaining = EXCLUDED.lots_remaining,
            partial_closes = EXCLUDED.partial_closes,
            gross_pnl = EXCLUDED.gross_pnl,
            commission = EXCLUDED.commission,
            swap = EXCLUDED.swap,
            net_pnl = EXCLUDED.net_pnl,
            r_multiple = EXCLUDED.r_multiple,
            is_open = EXCLUDED.is_open,
            duration_secs = EXCLUDED.duration_secs,
            equity_at_entry = EXCLUDED.equity_at_entry,
            updated_at = NOW()
        "#,
    )
    .bind(trade.id)
    .bind(trade.account_id)
    .bind(trade.position_id)
    .bind(&trade.symbol)
    .bind(trade.direction.as_str())
    .bind(trade.entry_price)
    .bind(trade.entry_time)
    .bind(trade.exit_price)
    .bind(trade.exit_time)
    .bind(trade.stop_loss_initial)
    .bind(trade.take_profit_initial)
    .bind(trade.stop_loss)
    .bind(trade.take_profit)
    .bind(trade.lots_original)
    .bind(trade.lots_remaining)
    .bind(Json(&trade.partial_closes))
    .bind(trade.gross_pnl)
    .bind(trade.commission)
    .bind(trade.swap)
    .bind(trade.net_pnl)
    .bind(trade.r_multiple)
    .bind(trade.session.as_str())
    .bind(trade.is_open)
    .bind(trade.duration_secs)
    .bind(trade.equity_at_entry)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use journal_core::{Direction, Session};

    fn row() -> TradeRow {
        TradeRow {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            position_id: 555,
            symbol: "XAUUSD".into(),
            direction: "buy".into(),
            entry_price: 2000.0,
            entry_time: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            exit_price: None,
            exit_time: None,
            stop_loss_initial: Some(1990.0),
            take_profit_initial: None,
            stop_loss: Some(1995.0),
            take_profit: None,
            lots_original: 1.0,
            lots_remaining: 0.6,
            partial_closes: Json(vec![PartialClose {
                closed_at: Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap(),
                lots: 0.4,
                price: 2005.0,
                profit: 40.0,
            }]),
            gross_pnl: 40.0,
            commission: 0.0,
            swap: 0.0,
            net_pnl: 40.0,
            r_multiple: None,
            session: "london".into(),
            is_open: true,
            duration_secs: None,
            equity_at_entry: Some(10_000.0),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap(),
        }
    }

    #[test]
    fn row_converts_to_domain_trade() {
        let trade = Trade::try_from(row()).unwrap();
        assert_eq!(trade.direction, Direction::Buy);
        assert_eq!(trade.session, Session::London);
        assert_eq!(trade.partial_closes.len(), 1);
        assert_eq!(trade.lots_partially_closed(), 0.4);
    }

    #[test]
    fn corrupt_direction_is_rejected() {
        let mut bad = row();
        bad.direction = "short".into();
        assert!(Trade::try_from(bad).is_err());
    }

    #[test]
    fn corrupt_session_is_rejected() {
        let mut bad = row();
        bad.session = "sydney".into();
        assert!(Trade::try_from(bad).is_err());
    }
}
