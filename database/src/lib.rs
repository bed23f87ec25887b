//! # Database Layer
//!
//! PostgreSQL persistence for the trade journal, built on SQLx with
//! connection pooling and embedded migrations. Exposes three stores: the
//! append-only event log, the reconciled trade aggregates, and the account /
//! setup-token tables the resolver works against.

pub mod accounts;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod trades;

// Re-export commonly used types
pub use accounts::*;
pub use config::*;
pub use database::*;
pub use error::*;
pub use events::*;
pub use trades::*;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
