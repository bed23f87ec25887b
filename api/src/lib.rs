//! # Journal API
//!
//! HTTP surface for the trade-journal reconciliation engine, built with
//! Axum.
//!
//! ## Features
//! - Event ingestion endpoint with idempotent acknowledgments
//! - Account resolution with setup-token auto-provisioning
//! - Per-position serialization of reconciliation transitions
//! - Trade listing and closed-trade statistics
//!
//! ## Architecture
//! The API is organized into several modules:
//! - `handlers`: HTTP request handlers
//! - `models`: wire request/response models and the decode/validate boundary
//! - `resolver`: credential-to-account resolution
//! - `locks`: per-position lock table
//! - `config`: server configuration
//! - `error`: error types and handling

use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use journal_database::{AccountStore, Database, DatabaseConfig, EventStore, TradeStore};

pub mod config;
pub mod error;
pub mod handlers;
pub mod locks;
pub mod models;
pub mod resolver;

use crate::error::ApiError;
use crate::locks::PositionLocks;
use crate::resolver::AccountResolver;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<config::ApiConfig>,
    /// Append-only event log
    pub events: EventStore,
    /// Reconciled trade aggregates
    pub trades: TradeStore,
    /// Accounts and setup tokens
    pub accounts: AccountStore,
    /// Credential resolution
    pub resolver: AccountResolver,
    /// Per-position serialization
    pub locks: PositionLocks,
}

impl AppState {
    pub async fn new(config: config::ApiConfig) -> Result<Self, ApiError> {
        let db_config = DatabaseConfig::for_url(config.database_url.clone());
        let database = Database::connect(&db_config)
            .await
            .map_err(|e| ApiError::config(format!("Failed to connect to database: {e}")))?;

        database
            .migrate()
            .await
            .map_err(|e| ApiError::config(format!("Migration failed: {e}")))?;

        let pool = database.pool().clone();
        let accounts = AccountStore::new(pool.clone());
        let resolver = AccountResolver::new(accounts.clone(), config.retry_after_ms);

        Ok(Self {
            config: Arc::new(config),
            events: EventStore::new(pool.clone()),
            trades: TradeStore::new(pool),
            accounts,
            resolver,
            locks: PositionLocks::new(),
        })
    }
}

/// Build the router with all routes and middleware configured
pub fn router(state: Arc<AppState>) -> Router {
    let timeout = TimeoutLayer::new(Duration::from_secs(state.config.request_timeout_secs));

    Router::new()
        // Health check endpoint
        .route("/health", get(handlers::health_check))
        // Ingestion endpoint
        .route("/api/v1/events", post(handlers::ingest_event))
        // Trade read endpoints
        .route("/api/v1/trades", get(handlers::list_trades))
        .route("/api/v1/trades/stats", get(handlers::trade_stats))
        .layer(TraceLayer::new_for_http())
        .layer(timeout)
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Main API server structure
pub struct ApiServer {
    router: Router,
    config: Arc<config::ApiConfig>,
}

impl ApiServer {
    /// Creates a new API server with all routes and state configured
    pub async fn new(config: config::ApiConfig) -> Result<Self, ApiError> {
        let state = Arc::new(AppState::new(config).await?);
        let config = state.config.clone();
        Ok(Self {
            router: router(state),
            config,
        })
    }

    /// Serve until a shutdown signal arrives
    pub async fn serve(self) -> Result<(), ApiError> {
        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| {
                ApiError::config(format!(
                    "Failed to bind {}: {e}",
                    self.config.bind_address
                ))
            })?;

        info!("API server listening on {}", self.config.bind_address);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ApiError::internal(format!("Server error: {e}")))
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
