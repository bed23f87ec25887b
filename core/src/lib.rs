//! # Journal Core
//!
//! Domain logic for the trade-journal reconciliation engine. Everything in
//! this crate is pure: typed lifecycle events, the trade aggregate, trading
//! session classification, risk math, and the state machine that folds events
//! into trades. All I/O (stores, HTTP) lives in the `journal-database` and
//! `journal-api` crates.

pub mod error;
pub mod reconcile;
pub mod risk;
pub mod session;
pub mod types;

pub use error::*;
pub use session::Session;
pub use types::*;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
