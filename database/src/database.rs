//! # PostgreSQL Database Integration
//!
//! Connection-pool management and schema migrations. The migrations are
//! embedded at compile time from `database/migrations/`.

use sqlx::{postgres::PgPoolOptions, migrate::Migrator, PgPool};
use tracing::{debug, info, instrument};

use crate::config::DatabaseConfig;
use crate::error::StoreResult;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Handle to the PostgreSQL connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect a new pool with the given configuration
    #[instrument(skip(config))]
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        info!("Initializing database connection pool");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run any pending embedded migrations
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> StoreResult<()> {
        info!("Running database migrations");
        MIGRATOR.run(&self.pool).await?;
        info!("Migrations completed");
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> StoreResult<()> {
        debug!("Performing database health check");
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
