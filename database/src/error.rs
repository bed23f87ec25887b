//! Store error types
//!
//! This module provides error types for persistence operations.

use thiserror::Error;

/// Persistence-related errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<journal_core::CoreError> for StoreError {
    fn from(err: journal_core::CoreError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// Type alias for store results
pub type StoreResult<T> = Result<T, StoreError>;
