//! Account resolution and auto-provisioning
//!
//! Maps the opaque credential from the `X-Api-Key` header to an account.
//! When no account matches and the submission carries a terminal snapshot,
//! the credential is treated as a single-use setup token and a fresh account
//! is provisioned against it. Every failure surfaces to the caller as the
//! same generic authentication error; the precise sub-reason stays in the
//! server logs.

use chrono::Utc;
use journal_database::{AccountRecord, AccountStore, ProvisionRequest};
use tracing::{info, instrument, warn};

use crate::error::{ApiError, ApiResult};
use crate::models::TerminalSnapshot;

/// Known prop-firm / broker substrings used for the coarse provider
/// classification of freshly provisioned accounts. Matching on the server
/// name is best-effort and not authoritative.
const PROVIDER_PATTERNS: [(&str, &str); 8] = [
    ("ftmo", "ftmo"),
    ("fundednext", "fundednext"),
    ("fundingpips", "fundingpips"),
    ("the5ers", "the5ers"),
    ("5%ers", "the5ers"),
    ("icmarkets", "icmarkets"),
    ("pepperstone", "pepperstone"),
    ("exness", "exness"),
];

/// Best-effort provider classification from the broker server name
pub fn classify_provider(server: Option<&str>) -> &'static str {
    let Some(server) = server else {
        return "unknown";
    };
    let server = server.to_ascii_lowercase();
    for (pattern, provider) in PROVIDER_PATTERNS {
        if server.contains(pattern) {
            return provider;
        }
    }
    "unknown"
}

/// Resolves credentials to accounts, provisioning from setup tokens when
/// needed
#[derive(Clone)]
pub struct AccountResolver {
    accounts: AccountStore,
    retry_after_ms: u64,
}

impl AccountResolver {
    pub fn new(accounts: AccountStore, retry_after_ms: u64) -> Self {
        Self {
            accounts,
            retry_after_ms,
        }
    }

    /// Resolve the credential to an account, or fail with the generic
    /// authentication error.
    ///
    /// On the primary path this also applies the first-contact terminal
    /// binding and the opportunistic equity refresh.
    #[instrument(skip_all, fields(terminal_id = %terminal_id))]
    pub async fn resolve(
        &self,
        credential: &str,
        terminal_id: &str,
        snapshot: Option<&TerminalSnapshot>,
    ) -> ApiResult<AccountRecord> {
        if let Some(account) = self
            .accounts
            .find_active_by_api_key(credential)
            .await
            .map_err(|e| self.store_err(e))?
        {
            self.apply_first_contact(&account, terminal_id, snapshot)
                .await?;
            return Ok(account);
        }

        let Some(snapshot) = snapshot else {
            warn!("credential matched no account and submission carries no terminal snapshot");
            return Err(ApiError::InvalidApiKey);
        };

        self.provision(credential, terminal_id, snapshot).await
    }

    /// Primary-path lookup only, with no first-contact side effects. Used by
    /// the read endpoints.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, credential: &str) -> ApiResult<AccountRecord> {
        self.accounts
            .find_active_by_api_key(credential)
            .await
            .map_err(|e| self.store_err(e))?
            .ok_or(ApiError::InvalidApiKey)
    }

    /// Setup-token fallback: the credential must name a live, unused token
    async fn provision(
        &self,
        credential: &str,
        terminal_id: &str,
        snapshot: &TerminalSnapshot,
    ) -> ApiResult<AccountRecord> {
        let Some(token) = self
            .accounts
            .find_setup_token(credential)
            .await
            .map_err(|e| self.store_err(e))?
        else {
            warn!("credential matched neither an account nor a setup token");
            return Err(ApiError::InvalidApiKey);
        };

        if token.used_at.is_some() {
            warn!("setup token already used");
            return Err(ApiError::InvalidApiKey);
        }
        if token.expires_at <= Utc::now() {
            warn!(expires_at = %token.expires_at, "setup token expired");
            return Err(ApiError::InvalidApiKey);
        }

        let request = ProvisionRequest {
            owner_id: token.owner_id,
            api_key: credential.to_string(),
            terminal_id: terminal_id.to_string(),
            broker: snapshot.broker.clone(),
            server: snapshot.server.clone(),
            login: snapshot.login.map(|l| l.to_string()),
            account_type: snapshot.account_type.clone(),
            balance: snapshot.balance,
            equity: snapshot.equity,
            provider: classify_provider(snapshot.server.as_deref()).to_string(),
        };

        match self
            .accounts
            .provision_from_token(credential, &request)
            .await
            .map_err(|e| self.store_err(e))?
        {
            Some(account) => {
                info!(account_id = %account.id, provider = %account.provider, "account auto-provisioned");
                Ok(account)
            }
            None => {
                // The conditional claim lost a race, or the token aged out
                // between the check and the claim.
                warn!("setup token could not be claimed");
                Err(ApiError::InvalidApiKey)
            }
        }
    }

    async fn apply_first_contact(
        &self,
        account: &AccountRecord,
        terminal_id: &str,
        snapshot: Option<&TerminalSnapshot>,
    ) -> ApiResult<()> {
        if account.terminal_id.is_none() {
            self.accounts
                .bind_terminal_if_unbound(account.id, terminal_id)
                .await
                .map_err(|e| self.store_err(e))?;
        }

        if let Some(equity) = snapshot.and_then(|s| s.equity) {
            self.accounts
                .refresh_equity(account.id, equity, snapshot.and_then(|s| s.balance))
                .await
                .map_err(|e| self.store_err(e))?;
        }

        Ok(())
    }

    fn store_err(&self, err: journal_database::StoreError) -> ApiError {
        ApiError::store(err.to_string(), self.retry_after_ms)
    }
}
