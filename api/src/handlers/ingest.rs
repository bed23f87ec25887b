//! Event ingestion endpoint
//!
//! The orchestration path for one submission: authenticate, apply the
//! account's backfill policy, deduplicate against the event log, reconcile
//! under the position lock, and acknowledge. Validation and authentication
//! failures surface before anything is written; once the event is durably
//! recorded it is always reconciled to completion, even if the caller
//! disconnects mid-request.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use journal_core::{reconcile, TradeEvent};
use journal_database::AccountRecord;

use crate::error::{ApiError, ApiResult};
use crate::handlers::extract_api_key;
use crate::models::{EventSubmission, IngestAck, SkipReason};
use crate::AppState;

/// POST /api/v1/events
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(submission): Json<EventSubmission>,
) -> ApiResult<(StatusCode, Json<IngestAck>)> {
    let credential = extract_api_key(&headers)?;
    let event = submission.validate_into_event()?;

    let account = state
        .resolver
        .resolve(
            &credential,
            &event.terminal_id,
            submission.account_info.as_ref(),
        )
        .await?;

    // Backfill policy gates fire before anything touches the event log, so
    // skipped events leave no trace.
    if event.via_history_sync {
        if !account.sync_enabled {
            info!(account_id = %account.id, "history sync disabled, skipping backfill event");
            return Ok(respond(IngestAck::Skipped {
                reason: SkipReason::HistorySyncDisabled,
            }));
        }
        if let Some(cutoff) = account.sync_from {
            if event.occurred_at < cutoff {
                info!(
                    account_id = %account.id,
                    occurred_at = %event.occurred_at,
                    cutoff = %cutoff,
                    "backfill event predates sync cutoff, skipping"
                );
                return Ok(respond(IngestAck::Skipped {
                    reason: SkipReason::BeforeSyncCutoff,
                }));
            }
        }
    }

    let raw_payload = serde_json::to_value(&submission)?;

    // Run the write path on a detached task and await it: a caller that
    // drops the connection cannot cancel a recording already underway.
    let worker_state = state.clone();
    let ack = tokio::spawn(async move {
        record_and_reconcile(worker_state, account, event, raw_payload).await
    })
    .await
    .map_err(|e| ApiError::internal(format!("reconciliation task failed: {e}")))??;

    Ok(respond(ack))
}

fn respond(ack: IngestAck) -> (StatusCode, Json<IngestAck>) {
    (ack.status_code(), Json(ack))
}

#[instrument(skip_all, fields(
    account_id = %account.id,
    position_id = event.position_id,
    idempotency_key = %event.idempotency_key
))]
async fn record_and_reconcile(
    state: Arc<AppState>,
    account: AccountRecord,
    event: TradeEvent,
    raw_payload: serde_json::Value,
) -> ApiResult<IngestAck> {
    let retry = state.config.retry_after_ms;

    // Transitions for one position run strictly one at a time; other
    // positions proceed in parallel.
    let _guard = state.locks.acquire(account.id, event.position_id).await;

    let (inserted, record) = state
        .events
        .record_if_new(account.id, &event, &raw_payload)
        .await
        .map_err(|e| ApiError::store(e.to_string(), retry))?;

    if !inserted {
        if record.processed {
            info!(event_id = %record.id, "duplicate submission, already processed");
            return Ok(IngestAck::Duplicate {
                event_id: record.id,
            });
        }

        // Recorded by an earlier attempt that failed before reconciliation
        // committed. Re-run against the stored copy rather than dropping it;
        // the aggregate write and the processed flag commit together, so
        // this stays exactly-once.
        warn!(event_id = %record.id, "stored event was never reconciled, re-running");
        let stored = record
            .to_event()
            .map_err(|e| ApiError::store(e.to_string(), retry))?;
        let trade_id = reconcile_event(&state, &account, record.id, &stored).await?;
        return Ok(IngestAck::Accepted {
            event_id: record.id,
            account_id: account.id,
            trade_id,
        });
    }

    let trade_id = reconcile_event(&state, &account, record.id, &event).await?;
    Ok(IngestAck::Accepted {
        event_id: record.id,
        account_id: account.id,
        trade_id,
    })
}

async fn reconcile_event(
    state: &AppState,
    account: &AccountRecord,
    event_id: Uuid,
    event: &TradeEvent,
) -> ApiResult<Option<Uuid>> {
    let retry = state.config.retry_after_ms;

    let open_trade = state
        .trades
        .find_open(account.id, event.position_id)
        .await
        .map_err(|e| ApiError::store(e.to_string(), retry))?;

    let transition = reconcile::apply(account.id, open_trade, account.equity, event);
    let trade_id = transition.trade().map(|t| t.id);

    state
        .trades
        .commit_transition(event_id, &transition)
        .await
        .map_err(|e| ApiError::store(e.to_string(), retry))?;

    Ok(trade_id)
}
