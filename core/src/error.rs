//! Core domain error types
//!
//! This module provides error types for parsing and converting domain values.

use thiserror::Error;

/// Errors produced when converting stored or inbound labels into domain types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown trade direction: {0}")]
    UnknownDirection(String),

    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),

    #[error("Unknown session label: {0}")]
    UnknownSession(String),
}

/// Type alias for core results
pub type CoreResult<T> = Result<T, CoreError>;
