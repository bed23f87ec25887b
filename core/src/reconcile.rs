//! Trade reconciliation state machine
//!
//! Folds one validated lifecycle event into the current aggregate state for
//! its `(account, position)` key. States are Absent -> Open -> Closed; no
//! state regresses and Closed is terminal. Partial closes are an Open -> Open
//! self-transition with reduced size.
//!
//! The function is pure: the caller loads the open aggregate and the
//! account's running equity, and persists whatever transition comes back in
//! a single commit. Serialization of concurrent events for the same key is
//! also the caller's job.

use tracing::{info, warn};
use uuid::Uuid;

use crate::risk;
use crate::session::Session;
use crate::types::{AccountId, Direction, EventKind, PartialClose, Trade, TradeEvent};

/// Tolerance below which a remaining lot size counts as fully closed.
/// Terminals report lots as binary floats with 0.01 granularity.
pub const LOT_EPSILON: f64 = 1e-4;

/// A finalized trade plus the account equity it settles to.
///
/// Equity settles against the snapshot taken at entry, not the account's
/// current figure, so trades processed out of order cannot double-count each
/// other's P&L. `None` when no equity figure was ever available.
#[derive(Debug, Clone)]
pub struct SettledClose {
    pub trade: Trade,
    pub settled_equity: Option<f64>,
}

/// Outcome of applying one event to the current aggregate state
#[derive(Debug, Clone)]
pub enum Transition {
    /// Absent + entry: a new open trade
    Opened(Trade),
    /// Open + entry: duplicate open, existing aggregate returned untouched
    Unchanged(Trade),
    /// Open + modify: final stop/target levels updated
    Adjusted(Trade),
    /// Open + exit leaving lots behind: partial close recorded
    Reduced(Trade),
    /// Open + exit reaching zero lots, or an orphan exit reconstruction
    Closed(SettledClose),
    /// Modify with nothing open: nothing to write
    NoPosition,
}

impl Transition {
    /// The trade this transition writes or confirms, if any
    pub fn trade(&self) -> Option<&Trade> {
        match self {
            Transition::Opened(t)
            | Transition::Unchanged(t)
            | Transition::Adjusted(t)
            | Transition::Reduced(t) => Some(t),
            Transition::Closed(close) => Some(&close.trade),
            Transition::NoPosition => None,
        }
    }
}

/// Apply one event to the aggregate state for its position key.
///
/// `open_trade` is the currently-open aggregate for
/// `(account_id, event.position_id)`, if one exists. `account_equity` is the
/// account's running equity figure, used as the entry snapshot fallback and
/// the R-multiple fallback denominator.
pub fn apply(
    account_id: AccountId,
    open_trade: Option<Trade>,
    account_equity: Option<f64>,
    event: &TradeEvent,
) -> Transition {
    match (event.kind, open_trade) {
        (EventKind::Entry, None) => {
            Transition::Opened(open_position(account_id, account_equity, event))
        }
        (EventKind::Entry, Some(trade)) => {
            info!(
                position_id = event.position_id,
                trade_id = %trade.id,
                "entry for an already-open position, keeping existing aggregate"
            );
            Transition::Unchanged(trade)
        }
        (EventKind::Modify, Some(mut trade)) => {
            trade.stop_loss = event.stop_loss;
            trade.take_profit = event.take_profit;
            Transition::Adjusted(trade)
        }
        (EventKind::Modify, None) => {
            info!(
                position_id = event.position_id,
                "modify without an open position, nothing to update"
            );
            Transition::NoPosition
        }
        (EventKind::Exit, Some(trade)) => apply_exit(trade, account_equity, event),
        (EventKind::Exit, None) => {
            warn!(
                position_id = event.position_id,
                "exit without an open position, reconstructing orphan trade"
            );
            Transition::Closed(reconstruct_orphan(account_id, account_equity, event))
        }
    }
}

fn open_position(account_id: AccountId, account_equity: Option<f64>, event: &TradeEvent) -> Trade {
    let lots = event.lots.unwrap_or(0.0);
    let entry_time = event.occurred_at;

    Trade {
        id: Uuid::new_v4(),
        account_id,
        position_id: event.position_id,
        symbol: event.symbol.clone().unwrap_or_default(),
        direction: event.direction.unwrap_or(Direction::Buy),
        entry_price: event.price,
        entry_time,
        exit_price: None,
        exit_time: None,
        stop_loss_initial: event.stop_loss,
        take_profit_initial: event.take_profit,
        stop_loss: event.stop_loss,
        take_profit: event.take_profit,
        lots_original: lots,
        lots_remaining: lots,
        partial_closes: Vec::new(),
        gross_pnl: 0.0,
        commission: event.commission,
        swap: event.swap,
        net_pnl: Trade::settle_net(0.0, event.commission, event.swap),
        r_multiple: None,
        session: Session::classify(entry_time),
        is_open: true,
        duration_secs: None,
        equity_at_entry: event.equity_at_entry.or(account_equity),
    }
}

fn apply_exit(mut trade: Trade, account_equity: Option<f64>, event: &TradeEvent) -> Transition {
    // A fill with no lot size closes whatever is left.
    let lots_filled = event.lots.unwrap_or(trade.lots_remaining);
    let mut remaining = trade.lots_remaining - lots_filled;

    if remaining < -LOT_EPSILON {
        // Should be unreachable with a well-behaved terminal. Terminals are
        // untrusted, so clamp instead of corrupting the aggregate further.
        warn!(
            position_id = trade.position_id,
            lots_remaining = trade.lots_remaining,
            lots_filled,
            "exit fill exceeds remaining lots, clamping remainder to zero"
        );
        remaining = 0.0;
    }

    if event.stop_loss.is_some() {
        trade.stop_loss = event.stop_loss;
    }
    if event.take_profit.is_some() {
        trade.take_profit = event.take_profit;
    }

    trade.gross_pnl += event.profit;
    trade.commission += event.commission;
    trade.swap += event.swap;
    trade.net_pnl = Trade::settle_net(trade.gross_pnl, trade.commission, trade.swap);

    if remaining > LOT_EPSILON {
        trade.partial_closes.push(PartialClose {
            closed_at: event.occurred_at,
            lots: lots_filled,
            price: event.price,
            profit: event.profit,
        });
        trade.lots_remaining = remaining;
        Transition::Reduced(trade)
    } else {
        Transition::Closed(finalize(trade, account_equity, event))
    }
}

fn finalize(mut trade: Trade, account_equity: Option<f64>, event: &TradeEvent) -> SettledClose {
    trade.exit_price = Some(event.price);
    trade.exit_time = Some(event.occurred_at);
    trade.lots_remaining = 0.0;
    trade.is_open = false;
    trade.duration_secs = Some((event.occurred_at - trade.entry_time).num_seconds());
    trade.r_multiple = close_r_multiple(&trade, account_equity);

    let settled_equity = trade
        .equity_at_entry
        .or(account_equity)
        .map(|equity| equity + trade.net_pnl);

    SettledClose {
        trade,
        settled_equity,
    }
}

/// Synthesize a fully-closed trade straight from an exit event whose entry
/// was never observed. Entry price/time come from the auxiliary fields some
/// terminals duplicate onto exit payloads; failing that, the exit's own
/// price/time stand in as a degenerate entry.
fn reconstruct_orphan(
    account_id: AccountId,
    account_equity: Option<f64>,
    event: &TradeEvent,
) -> SettledClose {
    let entry_price = event.entry_price.unwrap_or(event.price);
    let entry_time = event.entry_time.unwrap_or(event.occurred_at);
    let lots = event.lots.unwrap_or(0.0);
    let net_pnl = Trade::settle_net(event.profit, event.commission, event.swap);

    let mut trade = Trade {
        id: Uuid::new_v4(),
        account_id,
        position_id: event.position_id,
        symbol: event.symbol.clone().unwrap_or_default(),
        direction: event.direction.unwrap_or(Direction::Buy),
        entry_price,
        entry_time,
        exit_price: Some(event.price),
        exit_time: Some(event.occurred_at),
        stop_loss_initial: event.stop_loss,
        take_profit_initial: event.take_profit,
        stop_loss: event.stop_loss,
        take_profit: event.take_profit,
        lots_original: lots,
        lots_remaining: 0.0,
        partial_closes: Vec::new(),
        gross_pnl: event.profit,
        commission: event.commission,
        swap: event.swap,
        net_pnl,
        r_multiple: None,
        session: Session::classify(entry_time),
        is_open: false,
        duration_secs: Some((event.occurred_at - entry_time).num_seconds()),
        equity_at_entry: event.equity_at_entry.or(account_equity),
    };
    trade.r_multiple = close_r_multiple(&trade, account_equity);

    let settled_equity = trade
        .equity_at_entry
        .map(|equity| equity + trade.net_pnl);

    SettledClose {
        trade,
        settled_equity,
    }
}

/// Stop-distance R-multiple when a stop was ever known, otherwise the
/// equity-ratio approximation.
fn close_r_multiple(trade: &Trade, account_equity: Option<f64>) -> Option<f64> {
    risk::r_multiple(
        trade.entry_price,
        trade.stop_loss_initial.or(trade.stop_loss),
        trade.net_pnl,
        &trade.symbol,
        trade.lots_original,
    )
    .or_else(|| {
        trade
            .equity_at_entry
            .or(account_equity)
            .and_then(|equity| risk::equity_ratio(trade.net_pnl, equity))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn account() -> AccountId {
        Uuid::new_v4()
    }

    fn base_event(kind: EventKind) -> TradeEvent {
        TradeEvent {
            idempotency_key: "k1".into(),
            terminal_id: "term-1".into(),
            kind,
            via_history_sync: false,
            position_id: 555,
            deal_id: Some(9001),
            order_id: Some(9002),
            symbol: Some("XAUUSD".into()),
            direction: Some(Direction::Buy),
            lots: Some(1.0),
            price: 2000.0,
            stop_loss: Some(1990.0),
            take_profit: None,
            commission: 0.0,
            swap: 0.0,
            profit: 0.0,
            occurred_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            equity_at_entry: Some(10_000.0),
            entry_price: None,
            entry_time: None,
        }
    }

    fn open_from(entry: &TradeEvent) -> Trade {
        match apply(account(), None, Some(9_000.0), entry) {
            Transition::Opened(trade) => trade,
            other => panic!("expected Opened, got {other:?}"),
        }
    }

    #[test]
    fn entry_opens_a_position() {
        let entry = base_event(EventKind::Entry);
        let trade = open_from(&entry);

        assert!(trade.is_open);
        assert_eq!(trade.entry_price, 2000.0);
        assert_eq!(trade.lots_original, 1.0);
        assert_eq!(trade.lots_remaining, 1.0);
        assert_eq!(trade.stop_loss_initial, Some(1990.0));
        assert_eq!(trade.stop_loss, Some(1990.0));
        // Event snapshot wins over the account's running equity.
        assert_eq!(trade.equity_at_entry, Some(10_000.0));
        assert_eq!(trade.session, Session::classify(entry.occurred_at));
        assert!(trade.partial_closes.is_empty());
        assert_eq!(trade.r_multiple, None);
    }

    #[test]
    fn entry_snapshot_falls_back_to_account_equity() {
        let mut entry = base_event(EventKind::Entry);
        entry.equity_at_entry = None;
        let trade = match apply(account(), None, Some(7_500.0), &entry) {
            Transition::Opened(t) => t,
            other => panic!("expected Opened, got {other:?}"),
        };
        assert_eq!(trade.equity_at_entry, Some(7_500.0));
    }

    #[test]
    fn duplicate_entry_keeps_existing_aggregate() {
        let entry = base_event(EventKind::Entry);
        let trade = open_from(&entry);
        let id = trade.id;

        let mut replay = base_event(EventKind::Entry);
        replay.price = 2222.0;
        match apply(trade.account_id, Some(trade), None, &replay) {
            Transition::Unchanged(existing) => {
                assert_eq!(existing.id, id);
                assert_eq!(existing.entry_price, 2000.0);
            }
            other => panic!("expected Unchanged, got {other:?}"),
        }
    }

    #[test]
    fn modify_touches_only_final_levels() {
        let trade = open_from(&base_event(EventKind::Entry));

        let mut modify = base_event(EventKind::Modify);
        modify.stop_loss = Some(1995.0);
        modify.take_profit = Some(2050.0);

        match apply(trade.account_id, Some(trade), None, &modify) {
            Transition::Adjusted(t) => {
                assert_eq!(t.stop_loss, Some(1995.0));
                assert_eq!(t.take_profit, Some(2050.0));
                assert_eq!(t.stop_loss_initial, Some(1990.0));
                assert_eq!(t.take_profit_initial, None);
                assert!(t.is_open);
            }
            other => panic!("expected Adjusted, got {other:?}"),
        }
    }

    #[test]
    fn modify_without_open_position_is_a_noop() {
        let modify = base_event(EventKind::Modify);
        assert!(matches!(
            apply(account(), None, None, &modify),
            Transition::NoPosition
        ));
    }

    #[test]
    fn partial_then_full_close_conserves_lots_and_pnl() {
        let trade = open_from(&base_event(EventKind::Entry));
        let account_id = trade.account_id;

        let mut partial = base_event(EventKind::Exit);
        partial.lots = Some(0.4);
        partial.price = 2005.0;
        partial.profit = 40.0;
        partial.occurred_at = Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap();

        let reduced = match apply(account_id, Some(trade), None, &partial) {
            Transition::Reduced(t) => t,
            other => panic!("expected Reduced, got {other:?}"),
        };
        assert!(reduced.is_open);
        assert!((reduced.lots_remaining - 0.6).abs() < 1e-9);
        assert_eq!(reduced.partial_closes.len(), 1);
        assert_eq!(reduced.partial_closes[0].lots, 0.4);
        assert_eq!(reduced.gross_pnl, 40.0);

        let mut full = base_event(EventKind::Exit);
        full.lots = Some(0.6);
        full.price = 2010.0;
        full.profit = 90.0;
        full.occurred_at = Utc.with_ymd_and_hms(2024, 1, 1, 14, 0, 0).unwrap();

        match apply(account_id, Some(reduced), None, &full) {
            Transition::Closed(close) => {
                let t = &close.trade;
                assert!(!t.is_open);
                assert_eq!(t.lots_remaining, 0.0);
                assert_eq!(t.gross_pnl, 130.0);
                assert_eq!(t.net_pnl, 130.0);
                assert_eq!(t.exit_price, Some(2010.0));
                assert_eq!(t.duration_secs, Some(2 * 3600));
                assert_eq!(t.partial_closes.len(), 1);
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn exit_without_lot_size_closes_the_remainder() {
        let trade = open_from(&base_event(EventKind::Entry));
        let account_id = trade.account_id;

        let mut exit = base_event(EventKind::Exit);
        exit.lots = None;
        exit.price = 2010.0;
        exit.profit = 1000.0;
        exit.occurred_at = Utc.with_ymd_and_hms(2024, 1, 1, 14, 0, 0).unwrap();

        match apply(account_id, Some(trade), None, &exit) {
            Transition::Closed(close) => {
                assert_eq!(close.trade.lots_remaining, 0.0);
                assert_eq!(close.trade.gross_pnl, 1000.0);
                // 100 gold pips * $10/pip = $1000 risk
                assert_eq!(close.trade.r_multiple, Some(1.0));
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn overfill_clamps_to_zero_and_closes() {
        let trade = open_from(&base_event(EventKind::Entry));
        let account_id = trade.account_id;

        let mut exit = base_event(EventKind::Exit);
        exit.lots = Some(1.5);
        exit.profit = 10.0;

        match apply(account_id, Some(trade), None, &exit) {
            Transition::Closed(close) => {
                assert_eq!(close.trade.lots_remaining, 0.0);
                assert!(!close.trade.is_open);
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn close_accounts_for_commission_and_swap() {
        let mut entry = base_event(EventKind::Entry);
        entry.commission = 3.5;
        let trade = open_from(&entry);
        let account_id = trade.account_id;

        let mut exit = base_event(EventKind::Exit);
        exit.profit = 100.0;
        exit.commission = 3.5;
        exit.swap = -2.0;

        match apply(account_id, Some(trade), None, &exit) {
            Transition::Closed(close) => {
                let t = &close.trade;
                assert_eq!(t.gross_pnl, 100.0);
                assert_eq!(t.commission, 7.0);
                assert_eq!(t.swap, -2.0);
                assert_eq!(t.net_pnl, 100.0 - 7.0 - 2.0);
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn close_settles_equity_from_the_entry_snapshot() {
        let trade = open_from(&base_event(EventKind::Entry));
        let account_id = trade.account_id;

        let mut exit = base_event(EventKind::Exit);
        exit.profit = 250.0;

        // The account's running equity has drifted to 12,000 in the meantime;
        // settlement still starts from the 10,000 snapshotted at entry.
        match apply(account_id, Some(trade), Some(12_000.0), &exit) {
            Transition::Closed(close) => {
                assert_eq!(close.settled_equity, Some(10_250.0));
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn close_without_stop_falls_back_to_equity_ratio() {
        let mut entry = base_event(EventKind::Entry);
        entry.stop_loss = None;
        let trade = open_from(&entry);
        let account_id = trade.account_id;

        let mut exit = base_event(EventKind::Exit);
        exit.stop_loss = None;
        exit.profit = 500.0;

        match apply(account_id, Some(trade), None, &exit) {
            Transition::Closed(close) => {
                // 500 / 10_000 * 100 = 5.00
                assert_eq!(close.trade.r_multiple, Some(5.0));
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn orphan_exit_with_auxiliary_entry_fields() {
        let mut exit = base_event(EventKind::Exit);
        exit.profit = 1000.0;
        exit.price = 2010.0;
        exit.entry_price = Some(2000.0);
        exit.entry_time = Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        exit.occurred_at = Utc.with_ymd_and_hms(2024, 1, 1, 14, 0, 0).unwrap();

        match apply(account(), None, Some(5_000.0), &exit) {
            Transition::Closed(close) => {
                let t = &close.trade;
                assert!(!t.is_open);
                assert_eq!(t.entry_price, 2000.0);
                assert_eq!(t.exit_price, Some(2010.0));
                assert_eq!(t.duration_secs, Some(2 * 3600));
                assert_eq!(t.r_multiple, Some(1.0));
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn orphan_exit_without_auxiliary_fields_degenerates() {
        let mut exit = base_event(EventKind::Exit);
        exit.stop_loss = None;
        exit.equity_at_entry = None;
        exit.profit = -75.0;

        match apply(account(), None, None, &exit) {
            Transition::Closed(close) => {
                let t = &close.trade;
                assert!(!t.is_open);
                assert_eq!(t.entry_price, t.exit_price.unwrap());
                assert_eq!(t.duration_secs, Some(0));
                // No stop and no equity figure anywhere: no metric.
                assert_eq!(t.r_multiple, None);
                assert_eq!(close.settled_equity, None);
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }
}
