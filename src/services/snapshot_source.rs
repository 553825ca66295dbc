// src/services/snapshot_source.rs
//! Where a [`TokenCache`](crate::services::token_cache::TokenCache) gets fresh tokens from

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::services::token_cache::{SnapshotSource, TokenCacheError, TokenPayload};
use crate::services::token_service::GoogleTokenService;

pub const GOOGLE_TOKENS_PATH: &str = "/api/auth/google-tokens";

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
}

/// Fetches from the intermediating HTTP endpoint with the caller's session token
#[derive(Debug, Clone)]
pub struct ApiSnapshotSource {
    client: Client,
    url: String,
    session_token: String,
}

impl ApiSnapshotSource {
    pub fn new(base_url: &str, session_token: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), GOOGLE_TOKENS_PATH),
            session_token: session_token.into(),
        }
    }
}

#[async_trait]
impl SnapshotSource for ApiSnapshotSource {
    async fn fetch_tokens(&self) -> Result<TokenPayload, TokenCacheError> {
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(&self.session_token)
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TokenCacheError::Timeout
                } else {
                    TokenCacheError::Fetch(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TokenCacheError::Fetch(e.to_string()))?;

        if !status.is_success() {
            let error = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
            return Err(TokenCacheError::Api {
                status: status.as_u16(),
                error,
            });
        }

        let payload: TokenPayload =
            serde_json::from_str(&body).map_err(|e| TokenCacheError::Fetch(e.to_string()))?;
        if payload.access_token.is_empty() {
            return Err(TokenCacheError::Unavailable);
        }

        debug!(expires_at = ?payload.expires_at, "Fetched Google tokens from API");
        Ok(payload)
    }
}

/// Reads straight from the server-side token service, for in-process consumers
#[derive(Debug, Clone)]
pub struct StoreSnapshotSource {
    service: Arc<GoogleTokenService>,
    user_id: String,
}

impl StoreSnapshotSource {
    pub fn new(service: Arc<GoogleTokenService>, user_id: impl Into<String>) -> Self {
        Self {
            service,
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl SnapshotSource for StoreSnapshotSource {
    async fn fetch_tokens(&self) -> Result<TokenPayload, TokenCacheError> {
        let record = self
            .service
            .current_tokens(&self.user_id)
            .await
            .map_err(|e| TokenCacheError::Fetch(e.to_string()))?
            .ok_or(TokenCacheError::Unavailable)?;

        Ok(TokenPayload {
            access_token: record.access_token,
            refresh_token: Some(record.refresh_token).filter(|t| !t.is_empty()),
            expires_at: Some(record.expires_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::helpers::now_epoch_secs;
    use crate::services::google::{test_config, GoogleOAuthClient};
    use crate::services::token_store::{sample_record, test_pool, SqliteTokenStore, TokenStore};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_api_source_sends_session_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(GOOGLE_TOKENS_PATH))
            .and(header("authorization", "Bearer session-jwt"))
            .and(header("cache-control", "no-cache"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "A1",
                "refresh_token": "R1",
                "expires_at": 1_700_000_000_i64
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = ApiSnapshotSource::new(&server.uri(), "session-jwt", Duration::from_secs(2));
        let payload = source.fetch_tokens().await.unwrap();

        assert_eq!(payload.access_token, "A1");
        assert_eq!(payload.refresh_token.as_deref(), Some("R1"));
        assert_eq!(payload.expires_at, Some(1_700_000_000));
    }

    #[tokio::test]
    async fn test_api_source_reports_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(GOOGLE_TOKENS_PATH))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"error": "No Google tokens found"})),
            )
            .mount(&server)
            .await;

        let source = ApiSnapshotSource::new(&server.uri(), "session-jwt", Duration::from_secs(2));

        match source.fetch_tokens().await {
            Err(TokenCacheError::Api { status, error }) => {
                assert_eq!(status, 404);
                assert_eq!(error, "No Google tokens found");
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_source_reads_service() {
        let store = Arc::new(SqliteTokenStore::new(test_pool().await, None));
        store
            .upsert(&sample_record("u1", now_epoch_secs() + 3600))
            .await
            .unwrap();
        let oauth = Arc::new(GoogleOAuthClient::new(Some(test_config())));
        let service = Arc::new(GoogleTokenService::new(store, oauth));

        let payload = StoreSnapshotSource::new(service.clone(), "u1")
            .fetch_tokens()
            .await
            .unwrap();
        assert_eq!(payload.access_token, "A1");

        let missing = StoreSnapshotSource::new(service, "u404").fetch_tokens().await;
        assert!(matches!(missing, Err(TokenCacheError::Unavailable)));
    }
}
