//! Trade read endpoints
//!
//! Journal analytics over the reconciled aggregates: the calling account's
//! trades and a closed-trade summary. Authentication reuses the terminal
//! credential; unlike ingestion, reads apply no first-contact side effects.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Json,
};
use std::sync::Arc;
use tracing::instrument;

use journal_database::AccountTradeStats;

use crate::error::{ApiError, ApiResult};
use crate::handlers::extract_api_key;
use crate::models::{ListTradesQuery, TradeResponse};
use crate::AppState;

/// GET /api/v1/trades
#[instrument(skip_all)]
pub async fn list_trades(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ListTradesQuery>,
) -> ApiResult<Json<Vec<TradeResponse>>> {
    let credential = extract_api_key(&headers)?;
    let account = state.resolver.authenticate(&credential).await?;

    let trades = state
        .trades
        .list_for_account(account.id, params.open, params.limit(), params.offset())
        .await
        .map_err(|e| ApiError::store(e.to_string(), state.config.retry_after_ms))?;

    Ok(Json(trades.into_iter().map(TradeResponse::from).collect()))
}

/// GET /api/v1/trades/stats
#[instrument(skip_all)]
pub async fn trade_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<AccountTradeStats>> {
    let credential = extract_api_key(&headers)?;
    let account = state.resolver.authenticate(&credential).await?;

    let stats = state
        .trades
        .stats_for_account(account.id)
        .await
        .map_err(|e| ApiError::store(e.to_string(), state.config.retry_after_ms))?;

    Ok(Json(stats))
}
