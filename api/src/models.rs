//! Wire models and the decode/validate boundary
//!
//! Inbound submissions are loosely-typed JSON from terminals in the field;
//! everything is normalized into the closed `journal_core::TradeEvent` here,
//! before it can reach the state machine. Three overlapping broker
//! identifiers (position, deal, order) plus the legacy single `ticket` field
//! collapse to one canonical grouping key; deal/order ride along as stored
//! metadata only.

use axum::http::StatusCode;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use journal_core::{EventKind, PartialClose, Trade, TradeEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// One event submission as it arrives on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSubmission {
    pub idempotency_key: String,
    #[serde(default)]
    pub terminal_id: Option<String>,
    pub event_type: String,
    #[serde(default)]
    pub original_event_type: Option<String>,
    #[serde(default)]
    pub position_id: Option<i64>,
    /// Legacy single-identifier field older terminals send instead of
    /// `position_id`
    #[serde(default)]
    pub ticket: Option<i64>,
    #[serde(default)]
    pub deal_id: Option<i64>,
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub lot_size: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub sl: Option<f64>,
    #[serde(default)]
    pub tp: Option<f64>,
    #[serde(default)]
    pub commission: Option<f64>,
    #[serde(default)]
    pub swap: Option<f64>,
    #[serde(default)]
    pub profit: Option<f64>,
    pub timestamp: String,
    #[serde(default)]
    pub timezone_offset_seconds: Option<i32>,
    #[serde(default)]
    pub equity_at_entry: Option<f64>,
    #[serde(default)]
    pub entry_price: Option<f64>,
    #[serde(default)]
    pub entry_time: Option<String>,
    #[serde(default)]
    pub account_info: Option<TerminalSnapshot>,
    #[serde(default)]
    pub raw_payload: Option<serde_json::Value>,
}

/// Terminal account snapshot attached to submissions that may provision a
/// new account from a setup token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalSnapshot {
    #[serde(default)]
    pub login: Option<i64>,
    #[serde(default)]
    pub broker: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub balance: Option<f64>,
    #[serde(default)]
    pub equity: Option<f64>,
    #[serde(default)]
    pub account_type: Option<String>,
}

impl EventSubmission {
    /// Validate the submission and normalize it into the internal event.
    ///
    /// Entry events must carry symbol, direction, lot size and price; exit
    /// events may omit symbol/direction/lots (they are inherited from the
    /// open aggregate) but must carry a price. Terminals report unset
    /// stop/target levels as zero, which maps to absent here.
    pub fn validate_into_event(&self) -> Result<TradeEvent, ApiError> {
        if self.idempotency_key.trim().is_empty() {
            return Err(ApiError::validation(
                "idempotency_key must not be empty",
                Some("idempotency_key"),
            ));
        }

        let (kind, via_history_sync) =
            normalize_kind(&self.event_type, self.original_event_type.as_deref())?;

        let position_id = self.position_id.or(self.ticket).ok_or_else(|| {
            ApiError::validation("position_id is required", Some("position_id"))
        })?;

        let occurred_at = parse_timestamp(
            &self.timestamp,
            self.timezone_offset_seconds.unwrap_or(0),
        )
        .map_err(|message| ApiError::Validation {
            message,
            field: Some("timestamp".to_string()),
        })?;

        let direction = match self.direction.as_deref() {
            Some(raw) => Some(raw.parse().map_err(|_| {
                ApiError::validation(
                    format!("direction must be 'buy' or 'sell', got '{raw}'"),
                    Some("direction".to_string()),
                )
            })?),
            None => None,
        };

        let symbol = self
            .symbol
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let lots = self.lot_size.filter(|l| *l != 0.0);

        if kind == EventKind::Entry {
            if symbol.is_none() {
                return Err(ApiError::validation(
                    "symbol is required for entry events",
                    Some("symbol"),
                ));
            }
            if direction.is_none() {
                return Err(ApiError::validation(
                    "direction is required for entry events",
                    Some("direction"),
                ));
            }
            match lots {
                Some(l) if l > 0.0 => {}
                _ => {
                    return Err(ApiError::validation(
                        "lot_size must be positive for entry events",
                        Some("lot_size"),
                    ))
                }
            }
        }
        if let Some(l) = lots {
            if l < 0.0 {
                return Err(ApiError::validation(
                    "lot_size must not be negative",
                    Some("lot_size"),
                ));
            }
        }

        let price = match (kind, self.price) {
            (EventKind::Modify, price) => price.unwrap_or(0.0),
            (_, Some(price)) => price,
            (_, None) => {
                return Err(ApiError::validation(
                    "price is required",
                    Some("price"),
                ))
            }
        };

        let entry_time = match self.entry_time.as_deref() {
            Some(raw) => Some(
                parse_timestamp(raw, self.timezone_offset_seconds.unwrap_or(0)).map_err(
                    |message| ApiError::Validation {
                        message,
                        field: Some("entry_time".to_string()),
                    },
                )?,
            ),
            None => None,
        };

        Ok(TradeEvent {
            idempotency_key: self.idempotency_key.trim().to_string(),
            terminal_id: self
                .terminal_id
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            kind,
            via_history_sync,
            position_id,
            deal_id: self.deal_id,
            order_id: self.order_id,
            symbol,
            direction,
            lots,
            price,
            stop_loss: self.sl.filter(|v| *v != 0.0),
            take_profit: self.tp.filter(|v| *v != 0.0),
            commission: self.commission.unwrap_or(0.0),
            swap: self.swap.unwrap_or(0.0),
            profit: self.profit.unwrap_or(0.0),
            occurred_at,
            equity_at_entry: self.equity_at_entry,
            entry_price: self.entry_price.filter(|v| *v != 0.0),
            entry_time,
        })
    }
}

/// Resolve the wire-level `event_type` spellings to the internal kind.
///
/// `history_sync` is a transport wrapper and must name the original kind it
/// carries; everything else maps directly.
fn normalize_kind(
    event_type: &str,
    original_event_type: Option<&str>,
) -> Result<(EventKind, bool), ApiError> {
    match event_type.to_ascii_lowercase().as_str() {
        "entry" | "open" => Ok((EventKind::Entry, false)),
        "modify" => Ok((EventKind::Modify, false)),
        "exit" | "close" | "partial_close" => Ok((EventKind::Exit, false)),
        "history_sync" => match original_event_type.map(str::to_ascii_lowercase).as_deref() {
            Some("entry") | Some("open") => Ok((EventKind::Entry, true)),
            Some("exit") | Some("close") => Ok((EventKind::Exit, true)),
            Some(other) => Err(ApiError::validation(
                format!("original_event_type must be 'entry' or 'exit', got '{other}'"),
                Some("original_event_type".to_string()),
            )),
            None => Err(ApiError::validation(
                "original_event_type is required for history_sync events",
                Some("original_event_type"),
            )),
        },
        other => Err(ApiError::validation(
            format!("unknown event_type '{other}'"),
            Some("event_type".to_string()),
        )),
    }
}

/// Parse an event timestamp to UTC.
///
/// RFC-3339 strings carry their own offset. Naive strings (including the
/// terminal-native `YYYY.MM.DD HH:MM:SS` form) are broker-local and are
/// shifted by the reported broker UTC offset.
fn parse_timestamp(raw: &str, offset_seconds: i32) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y.%m.%d %H:%M:%S",
        "%Y.%m.%d %H:%M",
    ];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            let local = Utc.from_utc_datetime(&naive);
            return Ok(local - Duration::seconds(offset_seconds as i64));
        }
    }

    Err(format!("unparsable timestamp '{raw}'"))
}

/// Acknowledgment for one event submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IngestAck {
    Accepted {
        event_id: Uuid,
        account_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        trade_id: Option<Uuid>,
    },
    Duplicate {
        event_id: Uuid,
    },
    Skipped {
        reason: SkipReason,
    },
}

impl IngestAck {
    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestAck::Accepted { .. } => StatusCode::ACCEPTED,
            IngestAck::Duplicate { .. } | IngestAck::Skipped { .. } => StatusCode::OK,
        }
    }
}

/// Why a valid submission was intentionally not processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    HistorySyncDisabled,
    BeforeSyncCutoff,
}

/// Query parameters for the trade listing endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ListTradesQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub open: Option<bool>,
}

impl ListTradesQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 500)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Trade aggregate as exposed on the read surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResponse {
    pub id: Uuid,
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
    pub partial_closes: Vec<PartialClose>,
    pub gross_pnl: f64,
    pub commission: f64,
    pub swap: f64,
    pub net_pnl: f64,
    pub r_multiple: Option<f64>,
    pub session: String,
    pub is_open: bool,
    pub duration_secs: Option<i64>,
}

impl From<Trade> for TradeResponse {
    fn from(trade: Trade) -> Self {
        TradeResponse {
            id: trade.id,
            position_id: trade.position_id,
            symbol: trade.symbol,
            direction: trade.direction.as_str().to_string(),
            entry_price: trade.entry_price,
            entry_time: trade.entry_time,
            exit_price: trade.exit_price,
            exit_time: trade.exit_time,
            stop_loss_initial: trade.stop_loss_initial,
            take_profit_initial: trade.take_profit_initial,
            stop_loss: trade.stop_loss,
            take_profit: trade.take_profit,
            lots_original: trade.lots_original,
            lots_remaining: trade.lots_remaining,
            partial_closes: trade.partial_closes,
            gross_pnl: trade.gross_pnl,
            commission: trade.commission,
            swap: trade.swap,
            net_pnl: trade.net_pnl,
            r_multiple: trade.r_multiple,
            session: trade.session.as_str().to_string(),
            is_open: trade.is_open,
            duration_secs: trade.duration_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use journal_core::Direction;

    fn entry_submission() -> EventSubmission {
        serde_json::from_value(serde_json::json!({
            "idempotency_key": "abc",
            "terminal_id": "term-1",
            "event_type": "entry",
            "position_id": 555,
            "symbol": "XAUUSD",
            "direction": "buy",
            "lot_size": 1.0,
            "price": 2000.0,
            "sl": 1990.0,
            "timestamp": "2024-01-01T12:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn entry_submission_decodes_and_validates() {
        let event = entry_submission().validate_into_event().unwrap();
        assert_eq!(event.kind, EventKind::Entry);
        assert!(!event.via_history_sync);
        assert_eq!(event.position_id, 555);
        assert_eq!(event.symbol.as_deref(), Some("XAUUSD"));
        assert_eq!(event.direction, Some(Direction::Buy));
        assert_eq!(event.lots, Some(1.0));
        assert_eq!(event.price, 2000.0);
        assert_eq!(event.stop_loss, Some(1990.0));
        assert_eq!(
            event.occurred_at,
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn kind_aliases_normalize() {
        for (wire, expected) in [
            ("open", EventKind::Entry),
            ("close", EventKind::Exit),
            ("partial_close", EventKind::Exit),
            ("modify", EventKind::Modify),
        ] {
            let (kind, via_sync) = normalize_kind(wire, None).unwrap();
            assert_eq!(kind, expected, "wire kind {wire}");
            assert!(!via_sync);
        }
        assert!(normalize_kind("teleport", None).is_err());
    }

    #[test]
    fn history_sync_requires_original_kind() {
        assert!(normalize_kind("history_sync", None).is_err());
        assert!(normalize_kind("history_sync", Some("modify")).is_err());

        let (kind, via_sync) = normalize_kind("history_sync", Some("exit")).unwrap();
        assert_eq!(kind, EventKind::Exit);
        assert!(via_sync);
    }

    #[test]
    fn zero_levels_mean_unset() {
        let mut submission = entry_submission();
        submission.sl = Some(0.0);
        submission.tp = Some(0.0);
        let event = submission.validate_into_event().unwrap();
        assert_eq!(event.stop_loss, None);
        assert_eq!(event.take_profit, None);
    }

    #[test]
    fn exit_may_omit_symbol_direction_and_lots() {
        let submission: EventSubmission = serde_json::from_value(serde_json::json!({
            "idempotency_key": "abc2",
            "event_type": "exit",
            "position_id": 555,
            "price": 2010.0,
            "profit": 1000.0,
            "timestamp": "2024-01-01T14:00:00Z"
        }))
        .unwrap();

        let event = submission.validate_into_event().unwrap();
        assert_eq!(event.kind, EventKind::Exit);
        assert_eq!(event.symbol, None);
        assert_eq!(event.direction, None);
        assert_eq!(event.lots, None);
        assert_eq!(event.profit, 1000.0);
    }

    #[test]
    fn entry_requires_symbol_direction_and_lots() {
        let mut submission = entry_submission();
        submission.symbol = None;
        assert!(submission.validate_into_event().is_err());

        let mut submission = entry_submission();
        submission.direction = None;
        assert!(submission.validate_into_event().is_err());

        let mut submission = entry_submission();
        submission.lot_size = Some(0.0);
        assert!(submission.validate_into_event().is_err());
    }

    #[test]
    fn legacy_ticket_stands_in_for_position_id() {
        let mut submission = entry_submission();
        submission.position_id = None;
        submission.ticket = Some(777);
        let event = submission.validate_into_event().unwrap();
        assert_eq!(event.position_id, 777);

        submission.ticket = None;
        assert!(submission.validate_into_event().is_err());
    }

    #[test]
    fn naive_timestamps_shift_by_broker_offset() {
        // Broker clock at UTC+2: 14:00 local is 12:00 UTC.
        let utc = parse_timestamp("2024-01-01 14:00:00", 7200).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());

        let dotted = parse_timestamp("2024.01.01 14:00:00", 7200).unwrap();
        assert_eq!(dotted, utc);
    }

    #[test]
    fn rfc3339_timestamps_ignore_the_reported_offset() {
        let utc = parse_timestamp("2024-01-01T12:00:00+02:00", 10_800).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn garbage_timestamp_is_rejected() {
        assert!(parse_timestamp("yesterday-ish", 0).is_err());
    }

    #[test]
    fn ack_statuses_and_wire_shape() {
        let accepted = IngestAck::Accepted {
            event_id: Uuid::nil(),
            account_id: Uuid::nil(),
            trade_id: None,
        };
        assert_eq!(accepted.status_code(), StatusCode::ACCEPTED);
        let json = serde_json::to_value(&accepted).unwrap();
        assert_eq!(json["status"], "accepted");
        assert!(json.get("trade_id").is_none());

        let skipped = IngestAck::Skipped {
            reason: SkipReason::HistorySyncDisabled,
        };
        assert_eq!(skipped.status_code(), StatusCode::OK);
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["reason"], "history_sync_disabled");
    }

    #[test]
    fn list_query_clamps_pagination() {
        let query = ListTradesQuery {
            limit: Some(10_000),
            offset: Some(-5),
            open: None,
        };
        assert_eq!(query.limit(), 500);
        assert_eq!(query.offset(), 0);
        assert_eq!(ListTradesQuery::default().limit(), 50);
    }
}
