// src/services/token_service.rs
//! Server-side acquisition of valid Google access tokens.
//!
//! Reads the user's grant from the [`TokenStore`], returns it unchanged while at
//! least [`REFRESH_MARGIN_SECS`] of validity remain, and otherwise refreshes it at
//! Google and writes the merged record back. Refreshes are serialized per user so
//! two racing requests spend one provider round-trip, not two.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::common::helpers::now_epoch_secs;
use crate::services::google::{GoogleError, GoogleOAuthClient, GoogleTokens, TokenResponse};
use crate::services::token_store::{TokenRecord, TokenStore};

/// Tokens with less validity than this are refreshed before use
pub const REFRESH_MARGIN_SECS: i64 = 300;

pub struct GoogleTokenService {
    store: Arc<dyn TokenStore>,
    oauth: Arc<GoogleOAuthClient>,
    refresh_guards: RefreshGuards,
}

impl std::fmt::Debug for GoogleTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleTokenService")
            .field("oauth", &self.oauth)
            .finish_non_exhaustive()
    }
}

impl GoogleTokenService {
    pub fn new(store: Arc<dyn TokenStore>, oauth: Arc<GoogleOAuthClient>) -> Self {
        Self {
            store,
            oauth,
            refresh_guards: Mutex::new(HashMap::new()),
        }
    }

    /// A currently usable access token for `user_id`, refreshing when needed.
    ///
    /// `Ok(None)` means "no token available": the account is unlinked, the grant
    /// has no refresh token, or Google rejected the refresh. Store failures are errors.
    pub async fn get_valid_access_token(
        &self,
        user_id: &str,
    ) -> Result<Option<String>, GoogleError> {
        Ok(self
            .current_tokens(user_id)
            .await?
            .map(|record| record.access_token))
    }

    /// Same contract as [`Self::get_valid_access_token`] but returns the whole record
    pub async fn current_tokens(&self, user_id: &str) -> Result<Option<TokenRecord>, GoogleError> {
        if user_id.trim().is_empty() {
            return Err(GoogleError::EmptyUserId);
        }

        let Some(record) = self.store.get(user_id).await? else {
            debug!(user_id = %user_id, "No linked Google account");
            return Ok(None);
        };

        if is_fresh(&record, now_epoch_secs()) {
            return Ok(Some(record));
        }

        let lease = RefreshLease::acquire(&self.refresh_guards, user_id);
        let _refresh = lease.lock().await;
        self.refresh_locked(user_id).await
    }

    /// Runs with the user's refresh guard held
    async fn refresh_locked(&self, user_id: &str) -> Result<Option<TokenRecord>, GoogleError> {
        // Re-read: a concurrent request may have refreshed while we waited
        let Some(record) = self.store.get(user_id).await? else {
            return Ok(None);
        };

        if is_fresh(&record, now_epoch_secs()) {
            debug!(user_id = %user_id, "Token refreshed by a concurrent request");
            return Ok(Some(record));
        }

        if !record.has_refresh_token() {
            warn!(user_id = %user_id, "Stored Google grant has no refresh token; re-consent required");
            return Ok(None);
        }

        let response = match self.oauth.refresh_access_token(&record.refresh_token).await {
            Ok(response) => response,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to refresh Google access token");
                return Ok(None);
            }
        };

        let refreshed = merge_refresh(record, response, now_epoch_secs());
        self.store.upsert(&refreshed).await?;

        info!(
            user_id = %user_id,
            expires_at = refreshed.expires_at,
            "Refreshed Google access token"
        );
        Ok(Some(refreshed))
    }

    /// One-shot exchange of an authorization code for the initial token set
    pub async fn exchange_code_for_tokens(&self, code: &str) -> Result<GoogleTokens, GoogleError> {
        if code.trim().is_empty() {
            return Err(GoogleError::OAuthFailed {
                error: "invalid_request".to_string(),
                description: Some("authorization code is empty".to_string()),
            });
        }

        let response = self.oauth.exchange_code(code).await?;
        Ok(GoogleTokens::from_response(response, now_epoch_secs()))
    }

    /// Persist a freshly granted token set for `user_id`
    pub async fn store_tokens(
        &self,
        user_id: &str,
        tokens: GoogleTokens,
    ) -> Result<TokenRecord, GoogleError> {
        if user_id.trim().is_empty() {
            return Err(GoogleError::EmptyUserId);
        }

        if tokens.refresh_token.is_none() {
            warn!(user_id = %user_id, "Google did not issue a refresh token; keeping any stored one");
        }

        let record = TokenRecord {
            user_id: user_id.to_string(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token.unwrap_or_default(),
            id_token: tokens.id_token,
            expires_at: tokens.expires_at,
            scope: tokens.scope,
        };
        self.store.upsert(&record).await?;

        info!(user_id = %user_id, "Stored Google tokens");
        // The store may have kept an older refresh token
        Ok(self.store.get(user_id).await?.unwrap_or(record))
    }

    /// Exchange `code` and persist the result
    pub async fn link_account(&self, user_id: &str, code: &str) -> Result<TokenRecord, GoogleError> {
        let tokens = self.exchange_code_for_tokens(code).await?;
        self.store_tokens(user_id, tokens).await
    }

    /// The stored record as-is, without refreshing
    pub async fn stored_tokens(&self, user_id: &str) -> Result<Option<TokenRecord>, GoogleError> {
        if user_id.trim().is_empty() {
            return Err(GoogleError::EmptyUserId);
        }
        Ok(self.store.get(user_id).await?)
    }

    /// Best-effort revocation at Google, then unconditional local deletion
    pub async fn revoke_google_tokens(&self, user_id: &str) -> Result<(), GoogleError> {
        if user_id.trim().is_empty() {
            return Err(GoogleError::EmptyUserId);
        }

        let record = match self.store.get(user_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Could not read tokens to revoke; deleting anyway");
                None
            }
        };

        if let Some(record) = record {
            let tokens = [
                ("access", record.access_token.as_str()),
                ("refresh", record.refresh_token.as_str()),
            ];
            for (kind, token) in tokens {
                if token.is_empty() {
                    continue;
                }
                if let Err(e) = self.oauth.revoke_token(token).await {
                    warn!(user_id = %user_id, kind, error = %e, "Google token revocation failed");
                }
            }
        }

        let removed = self.store.delete(user_id).await?;
        info!(user_id = %user_id, removed, "Unlinked Google account");
        Ok(())
    }
}

fn is_fresh(record: &TokenRecord, now: i64) -> bool {
    record.remaining_secs(now) >= REFRESH_MARGIN_SECS
}

type RefreshGuards = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// A user's entry in the refresh guard map, released on drop so cancelled
/// requests leave nothing behind
struct RefreshLease<'a> {
    guards: &'a RefreshGuards,
    user_id: String,
    guard: Option<Arc<AsyncMutex<()>>>,
}

impl<'a> RefreshLease<'a> {
    fn acquire(guards: &'a RefreshGuards, user_id: &str) -> Self {
        let guard = guards
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        Self {
            guards,
            user_id: user_id.to_string(),
            guard: Some(guard),
        }
    }

    async fn lock(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        match &self.guard {
            Some(guard) => Some(guard.lock().await),
            None => None,
        }
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        let mut guards = self
            .guards
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(self.guard.take());
        // Clones are only taken under this lock, so a count of one means nobody is waiting
        if guards
            .get(&self.user_id)
            .map_or(false, |g| Arc::strong_count(g) == 1)
        {
            guards.remove(&self.user_id);
        }
    }
}

/// Apply a refresh response. The refresh token survives unless Google issued a new one.
fn merge_refresh(record: TokenRecord, response: TokenResponse, now: i64) -> TokenRecord {
    TokenRecord {
        user_id: record.user_id,
        access_token: response.access_token,
        refresh_token: response
            .refresh_token
            .filter(|t| !t.is_empty())
            .unwrap_or(record.refresh_token),
        id_token: response.id_token.or(record.id_token),
        expires_at: now.saturating_add(response.expires_in),
        scope: response.scope.unwrap_or(record.scope),
    }
}
