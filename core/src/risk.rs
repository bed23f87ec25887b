//! Risk math: pip sizing, pip value, and R-multiple
//!
//! The pip tables are heuristic substring classifications, not a live
//! instrument-specification lookup. True pip value depends on the quote
//! currency cross-rate at fill time, which this engine does not have; the
//! constants below are the documented approximations and should stay visible
//! rather than gaining invented precision.

/// Instrument buckets the heuristic tables distinguish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolClass {
    JpyQuoted,
    Gold,
    Silver,
    Other,
}

fn classify_symbol(symbol: &str) -> SymbolClass {
    let s = symbol.to_ascii_uppercase();
    if s.contains("JPY") {
        SymbolClass::JpyQuoted
    } else if s.contains("XAU") || s.contains("GOLD") {
        SymbolClass::Gold
    } else if s.contains("XAG") || s.contains("SILVER") {
        SymbolClass::Silver
    } else {
        SymbolClass::Other
    }
}

/// Price increment of one pip for the given symbol
pub fn pip_size(symbol: &str) -> f64 {
    match classify_symbol(symbol) {
        SymbolClass::JpyQuoted => 0.01,
        SymbolClass::Gold => 0.1,
        SymbolClass::Silver => 0.01,
        SymbolClass::Other => 0.0001,
    }
}

/// Approximate USD value of one pip for the given lot size
pub fn pip_value(symbol: &str, lots: f64) -> f64 {
    let per_standard_lot = match classify_symbol(symbol) {
        SymbolClass::JpyQuoted => 7.5,
        SymbolClass::Gold => 10.0,
        SymbolClass::Silver => 50.0,
        SymbolClass::Other => 10.0,
    };
    per_standard_lot * lots
}

/// Reward/risk multiple from the initial stop distance.
///
/// Returns `None` when no stop is known or the stop sits on the entry price,
/// leaving the denominator zero; the caller falls back to the equity ratio.
pub fn r_multiple(
    entry: f64,
    stop_loss: Option<f64>,
    net_pnl: f64,
    symbol: &str,
    lots: f64,
) -> Option<f64> {
    let stop = stop_loss?;
    let stop_distance = (entry - stop).abs();
    if stop_distance == 0.0 {
        return None;
    }

    let risk_amount = stop_distance / pip_size(symbol) * pip_value(symbol, lots);
    if risk_amount == 0.0 {
        return None;
    }

    Some(round2(net_pnl / risk_amount))
}

/// Secondary metric when no usable stop exists: net P&L over the equity
/// snapshotted at entry, expressed as a percentage-like ratio. Deliberately
/// approximate; not a true R-multiple.
pub fn equity_ratio(net_pnl: f64, equity_at_entry: f64) -> Option<f64> {
    if equity_at_entry == 0.0 {
        return None;
    }
    Some(round2(net_pnl / equity_at_entry * 100.0))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
