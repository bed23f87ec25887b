//! Core domain types for the trade-journal reconciliation engine.
//!
//! This module defines the normalized lifecycle event, the reconciled trade
//! aggregate, and their supporting enumerations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;
use crate::session::Session;

/// Unique identifier for a journal account
pub type AccountId = Uuid;

/// Broker-assigned position identifier, the grouping key for a trade's
/// lifecycle. Deal and order ids are carried as metadata only.
pub type PositionId = i64;

/// Trade direction as reported by the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
        }
    }
}

impl FromStr for Direction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(Direction::Buy),
            "sell" => Ok(Direction::Sell),
            other => Err(CoreError::UnknownDirection(other.to_string())),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized event kind after the wire-level aliases have been resolved.
///
/// `history_sync` is a transport wrapper, not a state-machine input: it is
/// resolved to its original kind at the decode boundary and flagged via
/// [`TradeEvent::via_history_sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Entry,
    Modify,
    Exit,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Entry => "entry",
            EventKind::Modify => "modify",
            EventKind::Exit => "exit",
        }
    }
}

impl FromStr for EventKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "entry" => Ok(EventKind::Entry),
            "modify" => Ok(EventKind::Modify),
            "exit" => Ok(EventKind::Exit),
            other => Err(CoreError::UnknownEventKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized, validated trade lifecycle event.
///
/// Produced by the API decode boundary from an inbound submission; immutable
/// from that point on. Fields that terminals routinely omit on exit events
/// (symbol, direction, lot size) stay optional here and are inherited from
/// the open aggregate during reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Caller-generated deduplication key, globally unique per logical event
    pub idempotency_key: String,

    /// Identifier of the submitting terminal process
    pub terminal_id: String,

    /// Normalized kind driving the state machine
    pub kind: EventKind,

    /// True when the event arrived wrapped in a history backfill
    pub via_history_sync: bool,

    /// Broker position id, the aggregate grouping key
    pub position_id: PositionId,

    /// Broker deal id, retained as metadata only
    pub deal_id: Option<i64>,

    /// Broker order id, retained as metadata only
    pub order_id: Option<i64>,

    /// Instrument symbol as reported (may carry broker suffixes)
    pub symbol: Option<String>,

    pub direction: Option<Direction>,

    /// Lot size of this fill; an exit without one closes the full remainder
    pub lots: Option<f64>,

    /// Fill or modification price
    pub price: f64,

    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,

    pub commission: f64,
    pub swap: f64,

    /// Realized profit of this fill (exit events)
    pub profit: f64,

    /// Event time normalized to UTC
    pub occurred_at: DateTime<Utc>,

    /// Account equity snapshot taken when the position was opened
    pub equity_at_entry: Option<f64>,

    /// Entry price duplicated onto exit payloads for orphan reconstruction
    pub entry_price: Option<f64>,

    /// Entry time duplicated onto exit payloads for orphan reconstruction
    pub entry_time: Option<DateTime<Utc>>,
}

/// One partial-close fill recorded against an open trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialClose {
    pub closed_at: DateTime<Utc>,
    pub lots: f64,
    pub price: f64,
    pub profit: f64,
}

/// The reconciled aggregate representing one position's full lifecycle,
/// keyed by `(account_id, position_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub account_id: AccountId,
    pub position_id: PositionId,

    pub symbol: String,
    pub direction: Direction,

    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,

    /// Stop-loss/take-profit as they were when the position opened
    pub stop_loss_initial: Option<f64>,
    pub take_profit_initial: Option<f64>,

    /// Latest stop-loss/take-profit after modifications
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,

    pub lots_original: f64,
    pub lots_remaining: f64,

    /// Ordered partial-close fills applied while the position was open
    pub partial_closes: Vec<PartialClose>,

    pub gross_pnl: f64,
    pub commission: f64,
    pub swap: f64,
    pub net_pnl: f64,

    /// Reward/risk multiple, set on close. `None` while open or when neither
    /// a usable stop nor an equity snapshot was available.
    pub r_multiple: Option<f64>,

    pub session: Session,
    pub is_open: bool,

    /// Seconds between entry and exit, set on close
    pub duration_secs: Option<i64>,

    /// Account equity snapshot at entry, used for equity settlement on close
    /// and as the R-multiple fallback denominator
    pub equity_at_entry: Option<f64>,
}

impl Trade {
    /// Net P&L per the journal's accounting rule: gross minus commission
    /// minus the absolute swap.
    pub fn settle_net(gross: f64, commission: f64, swap: f64) -> f64 {
        gross - commission - swap.abs()
    }

    /// Total lots closed so far through partial fills
    pub fn lots_partially_closed(&self) -> f64 {
        self.partial_closes.iter().map(|p| p.lots).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_round_trips_through_str() {
        assert_eq!("buy".parse::<Direction>().unwrap(), Direction::Buy);
        assert_eq!("SELL".parse::<Direction>().unwrap(), Direction::Sell);
        assert_eq!(Direction::Buy.as_str(), "buy");
        assert!("long".parse::<Direction>().is_err());
    }

    #[test]
    fn event_kind_round_trips_through_str() {
        assert_eq!("entry".parse::<EventKind>().unwrap(), EventKind::Entry);
        assert_eq!("Exit".parse::<EventKind>().unwrap(), EventKind::Exit);
        assert!("history_sync".parse::<EventKind>().is_err());
    }

    #[test]
    fn settle_net_subtracts_commission_and_absolute_swap() {
        assert_eq!(Trade::settle_net(100.0, 7.0, -3.0), 90.0);
        assert_eq!(Trade::settle_net(100.0, 7.0, 3.0), 90.0);
        assert_eq!(Trade::settle_net(-50.0, 2.0, 0.0), -52.0);
    }
}
