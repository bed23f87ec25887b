//! Account and setup-token storage
//!
//! The engine does not own account lifecycle policy: it looks accounts up by
//! credential, auto-provisions from single-use setup tokens, binds terminals
//! on first contact, and keeps the dashboard equity figure fresh.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::StoreResult;

/// Stored account row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccountRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub api_key: String,
    pub terminal_id: Option<String>,
    pub broker: Option<String>,
    pub server: Option<String>,
    pub login: Option<String>,
    pub provider: String,
    pub account_type: Option<String>,
    pub balance: Option<f64>,
    pub equity: Option<f64>,
    pub sync_enabled: bool,
    pub sync_from: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored setup-token row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SetupTokenRecord {
    pub token: String,
    pub owner_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Inputs for provisioning a new account from a consumed setup token
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub owner_id: Uuid,
    pub api_key: String,
    pub terminal_id: String,
    pub broker: Option<String>,
    pub server: Option<String>,
    pub login: Option<String>,
    pub account_type: Option<String>,
    pub balance: Option<f64>,
    pub equity: Option<f64>,
    pub provider: String,
}

/// Store for accounts and setup tokens
#[derive(Clone)]
pub struct AccountStore {
    pool: PgPool,
}

impl AccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Look up an active account by its exact credential
    #[instrument(skip(self, api_key))]
    pub async fn find_active_by_api_key(&self, api_key: &str) -> StoreResult<Option<AccountRecord>> {
        let record = sqlx::query_as::<_, AccountRecord>(
            "SELECT * FROM accounts WHERE api_key = $1 AND is_active",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Look up a setup token by value
    #[instrument(skip(self, token))]
    pub async fn find_setup_token(&self, token: &str) -> StoreResult<Option<SetupTokenRecord>> {
        let record =
            sqlx::query_as::<_, SetupTokenRecord>("SELECT * FROM setup_tokens WHERE token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record)
    }

    /// Consume the setup token and create the account it provisions, in one
    /// transaction.
    ///
    /// The token is claimed with a conditional update, so two submissions
    /// racing on the same token produce exactly one account; the loser gets
    /// `None` back.
    #[instrument(skip(self, request), fields(terminal_id = %request.terminal_id))]
    pub async fn provision_from_token(
        &self,
        token: &str,
        request: &ProvisionRequest,
    ) -> StoreResult<Option<AccountRecord>> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE setup_tokens
            SET used_at = NOW()
            WHERE token = $1 AND used_at IS NULL AND expires_at > NOW()
            RETURNING token
            "#,
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;

        if claimed.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let account = sqlx::query_as::<_, AccountRecord>(
            r#"
            INSERT INTO accounts
                (owner_id, api_key, terminal_id, broker, server, login,
                 provider, account_type, balance, equity)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(request.owner_id)
        .bind(&request.api_key)
        .bind(&request.terminal_id)
        .bind(&request.broker)
        .bind(&request.server)
        .bind(&request.login)
        .bind(&request.provider)
        .bind(&request.account_type)
        .bind(request.balance)
        .bind(request.equity)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(account_id = %account.id, "account provisioned from setup token");
        Ok(Some(account))
    }

    /// First-contact terminal binding; never overwrites an existing binding
    #[instrument(skip(self))]
    pub async fn bind_terminal_if_unbound(
        &self,
        account_id: Uuid,
        terminal_id: &str,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET terminal_id = $2, updated_at = NOW()
            WHERE id = $1 AND terminal_id IS NULL
            "#,
        )
        .bind(account_id)
        .bind(terminal_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!(account_id = %account_id, terminal_id, "terminal bound to account");
        }
        Ok(())
    }

    /// Last-write-wins refresh of the dashboard equity/balance figures.
    /// Display-only; never consulted for correctness-critical math.
    #[instrument(skip(self))]
    pub async fn refresh_equity(
        &self,
        account_id: Uuid,
        equity: f64,
        balance: Option<f64>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET equity = $2, balance = COALESCE($3, balance), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(account_id)
        .bind(equity)
        .bind(balance)
        .execute(&self.pool)
        .await?;

        debug!(account_id = %account_id, equity, "equity snapshot refreshed");
        Ok(())
    }
}
