//! Trade Journal - ingestion server CLI
//!
//! This is the main entry point for the trade-journal event ingestion and
//! reconciliation service.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use journal_api::{config::ApiConfig, ApiServer};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    init_tracing(&args.log_level);

    info!("Starting trade-journal v{}", env!("CARGO_PKG_VERSION"));

    let config = ApiConfig::from_env()?;
    let server = ApiServer::new(config).await?;
    server.serve().await?;

    info!("Server stopped");
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
