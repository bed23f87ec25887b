//! HTTP request handlers for the trade-journal API
//!
//! This module contains the endpoint handlers:
//! - Event ingestion (the reconciliation entry point)
//! - Trade reads (listing and closed-trade statistics)
//! - Utility endpoints (health check)

use axum::http::HeaderMap;
use axum::response::Json;
use serde_json::json;

use crate::error::{ApiError, ApiResult};

pub mod ingest;
pub mod trades;

// Re-export all handler functions
pub use ingest::ingest_event;
pub use trades::{list_trades, trade_stats};

/// Header carrying the terminal credential. Never accepted in the body.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Pull the credential out of the request headers
pub(crate) fn extract_api_key(headers: &HeaderMap) -> ApiResult<String> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::MissingApiKey)
}

/// Health check endpoint
///
/// Returns the current health status of the ingestion server. Used for
/// monitoring and load balancer health checks.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": "journal-api"
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn api_key_extraction() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            extract_api_key(&headers),
            Err(ApiError::MissingApiKey)
        ));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("  "));
        assert!(matches!(
            extract_api_key(&headers),
            Err(ApiError::MissingApiKey)
        ));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static(" tj_key_1 "));
        assert_eq!(extract_api_key(&headers).unwrap(), "tj_key_1");
    }
}
