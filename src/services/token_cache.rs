// src/services/token_cache.rs
//! Single-flight Google token cache for untrusted consumers.
//!
//! Lookups go memory → session mirror → network, in that order. A snapshot is
//! "valid" while its access token has more than [`VALIDITY_MARGIN_SECS`] left.
//! Concurrent misses share one fetch; the in-flight marker is kept for a short
//! debounce after completion so a burst of late callers reuses the same result.
//! Public operations never fail: any fetch problem degrades to `None`.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::common::helpers::{now_epoch_millis, now_epoch_secs};
use crate::services::session_storage::{
    SessionStorage, ACCESS_TOKEN_KEY, EXPIRES_AT_KEY, LAST_FETCHED_KEY, REFRESH_TOKEN_KEY,
    SNAPSHOT_KEYS,
};

pub const VALIDITY_MARGIN_SECS: i64 = 300;

#[derive(Debug, Clone, Error)]
pub enum TokenCacheError {
    #[error("token fetch failed: {0}")]
    Fetch(String),

    #[error("token fetch timed out")]
    Timeout,

    #[error("token API returned {status}: {error}")]
    Api { status: u16, error: String },

    #[error("no Google tokens available")]
    Unavailable,
}

/// Tokens as served by the intermediating API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Epoch seconds
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// Non-authoritative copy of the user's tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    /// Epoch milliseconds
    pub last_fetched_at: i64,
}

impl TokenSnapshot {
    pub fn from_payload(payload: TokenPayload, fetched_at: i64) -> Self {
        Self {
            access_token: Some(payload.access_token).filter(|t| !t.is_empty()),
            refresh_token: payload.refresh_token.filter(|t| !t.is_empty()),
            expires_at: payload.expires_at,
            last_fetched_at: fetched_at,
        }
    }

    pub fn is_valid(&self, now: i64) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(_), Some(expires_at)) => expires_at - now > VALIDITY_MARGIN_SECS,
            _ => false,
        }
    }
}

/// How the cache obtains a fresh snapshot on a miss
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    async fn fetch_tokens(&self) -> Result<TokenPayload, TokenCacheError>;
}

#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// How long a finished fetch keeps answering new callers
    pub debounce: Duration,
    pub fetch_timeout: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

type SharedFetch = Shared<BoxFuture<'static, Option<TokenSnapshot>>>;

struct InFlight {
    id: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct CacheState {
    memory: Option<TokenSnapshot>,
    in_flight: Option<InFlight>,
    next_fetch_id: u64,
}

struct Inner<S, M> {
    source: S,
    mirror: M,
    options: CacheOptions,
    state: Mutex<CacheState>,
}

pub struct TokenCache<S, M> {
    inner: Arc<Inner<S, M>>,
}

impl<S, M> Clone for TokenCache<S, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SnapshotSource, M: SessionStorage> TokenCache<S, M> {
    pub fn new(source: S, mirror: M) -> Self {
        Self::with_options(source, mirror, CacheOptions::default())
    }

    pub fn with_options(source: S, mirror: M, options: CacheOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                mirror,
                options,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// An access token with more than five minutes left, or `None`
    pub async fn get_valid_access_token(&self) -> Option<String> {
        let now = now_epoch_secs();
        if let Some(snapshot) = self.inner.cached(|s| s.is_valid(now)) {
            return snapshot.access_token;
        }

        self.fetch().await.and_then(|s| s.access_token)
    }

    /// The refresh token from any tier; expiry of the access token is irrelevant here
    pub async fn get_refresh_token(&self) -> Option<String> {
        if let Some(snapshot) = self.inner.cached(|s| s.refresh_token.is_some()) {
            return snapshot.refresh_token;
        }

        self.fetch().await.and_then(|s| s.refresh_token)
    }

    /// Access token expiry (epoch seconds) from any tier
    pub async fn get_token_expiration(&self) -> Option<i64> {
        if let Some(snapshot) = self.inner.cached(|s| s.expires_at.is_some()) {
            return snapshot.expires_at;
        }

        self.fetch().await.and_then(|s| s.expires_at)
    }

    /// Drop any in-flight marker and fetch anew
    pub async fn refresh_tokens(&self) -> Option<TokenSnapshot> {
        self.inner.lock_state().in_flight = None;
        self.fetch().await
    }

    /// Wipe memory and mirror. Call on sign-out.
    pub fn clear(&self) {
        {
            let mut state = self.inner.lock_state();
            state.memory = None;
            state.in_flight = None;
        }
        self.inner.clear_mirror();
        debug!("Token cache cleared");
    }

    async fn fetch(&self) -> Option<TokenSnapshot> {
        let fetch = {
            let mut state = self.inner.lock_state();
            match &state.in_flight {
                Some(in_flight) => in_flight.fetch.clone(),
                None => {
                    let id = state.next_fetch_id;
                    state.next_fetch_id += 1;

                    let inner = Arc::clone(&self.inner);
                    let fetch = async move { inner.run_fetch(id).await }.boxed().shared();
                    state.in_flight = Some(InFlight {
                        id,
                        fetch: fetch.clone(),
                    });
                    fetch
                }
            }
        };

        fetch.await
    }
}

impl<S: SnapshotSource, M: SessionStorage> Inner<S, M> {
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// First snapshot satisfying `accept`, memory tier before mirror.
    /// A mirror hit is promoted into memory.
    fn cached(&self, accept: impl Fn(&TokenSnapshot) -> bool) -> Option<TokenSnapshot> {
        let mut state = self.lock_state();

        if let Some(snapshot) = state.memory.as_ref().filter(|s| accept(s)) {
            return Some(snapshot.clone());
        }

        let mirrored = self.load_mirror().filter(|s| accept(s))?;
        state.memory = Some(mirrored.clone());
        debug!("Token snapshot promoted from session mirror");
        Some(mirrored)
    }

    async fn run_fetch(self: Arc<Self>, id: u64) -> Option<TokenSnapshot> {
        debug!(fetch_id = id, "Fetching Google tokens");

        let outcome =
            match tokio::time::timeout(self.options.fetch_timeout, self.source.fetch_tokens()).await
            {
                Ok(result) => result,
                Err(_) => Err(TokenCacheError::Timeout),
            };

        let snapshot = match outcome {
            Ok(payload) => Some(TokenSnapshot::from_payload(payload, now_epoch_millis())),
            Err(e) => {
                warn!(fetch_id = id, error = %e, "Google token fetch failed");
                None
            }
        };

        if let Some(snapshot) = &snapshot {
            let mut state = self.lock_state();
            // A clear() or forced refresh since this fetch started supersedes it
            if state.in_flight.as_ref().map_or(false, |f| f.id == id) {
                state.memory = Some(snapshot.clone());
                self.save_mirror(snapshot);
            }
        }

        let inner = Arc::clone(&self);
        tokio::spawn(async move {
            tokio::time::sleep(inner.options.debounce).await;
            let mut state = inner.lock_state();
            if state.in_flight.as_ref().map_or(false, |f| f.id == id) {
                state.in_flight = None;
            }
        });

        snapshot
    }

    fn load_mirror(&self) -> Option<TokenSnapshot> {
        let access_token = self.mirror.get_item(ACCESS_TOKEN_KEY).filter(|v| !v.is_empty())?;
        let refresh_token = self.mirror.get_item(REFRESH_TOKEN_KEY).filter(|v| !v.is_empty())?;
        let last_fetched_at = self
            .mirror
            .get_item(LAST_FETCHED_KEY)
            .and_then(|v| v.parse::<i64>().ok())?;
        let expires_at = self
            .mirror
            .get_item(EXPIRES_AT_KEY)
            .and_then(|v| v.parse::<i64>().ok());

        Some(TokenSnapshot {
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            expires_at,
            last_fetched_at,
        })
    }

    fn save_mirror(&self, snapshot: &TokenSnapshot) {
        let expires_at = snapshot.expires_at.map(|e| e.to_string()).unwrap_or_default();
        let last_fetched_at = snapshot.last_fetched_at.to_string();
        let entries = [
            (ACCESS_TOKEN_KEY, snapshot.access_token.as_deref().unwrap_or("")),
            (REFRESH_TOKEN_KEY, snapshot.refresh_token.as_deref().unwrap_or("")),
            (EXPIRES_AT_KEY, expires_at.as_str()),
            (LAST_FETCHED_KEY, last_fetched_at.as_str()),
        ];

        for (key, value) in entries {
            if let Err(e) = self.mirror.set_item(key, value) {
                warn!(key, error = %e, "Failed to write token session mirror");
            }
        }
    }

    fn clear_mirror(&self) {
        for key in SNAPSHOT_KEYS {
            if let Err(e) = self.mirror.remove_item(key) {
                warn!(key, error = %e, "Failed to clear token session mirror");
            }
        }
    }
}
