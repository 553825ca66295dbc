// src/services/google.rs
//! Client for Google's OAuth 2.0 authorization, token and revocation endpoints

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::common::config::GoogleOAuthConfig;
use crate::common::helpers::safe_token_log;
use crate::services::token_store::StoreError;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound accepted for a token response's `expires_in` (one day)
const MAX_EXPIRES_IN_SECS: i64 = 86_400;

/// Scopes requested when linking an account: identity plus read access to Gmail, Drive and Calendar
pub const GOOGLE_SCOPES: &[&str] = &[
    "openid",
    "email",
    "profile",
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/drive.readonly",
    "https://www.googleapis.com/auth/calendar.readonly",
];

#[derive(Debug, Error)]
pub enum GoogleError {
    #[error("Google OAuth not configured")]
    NotConfigured,

    #[error("User id must not be empty")]
    EmptyUserId,

    #[error(
        "OAuth flow failed: {error}{}",
        .description.as_deref().map(|d| format!(" ({})", d)).unwrap_or_default()
    )]
    OAuthFailed {
        error: String,
        description: Option<String>,
    },

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Token store error: {0}")]
    Store(#[from] StoreError),
}

/// Success body of the token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Error body of the token and revocation endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Initial token set obtained from an authorization code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    /// Epoch seconds
    pub expires_at: i64,
    pub scope: String,
}

impl GoogleTokens {
    pub fn from_response(response: TokenResponse, now: i64) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            id_token: response.id_token,
            expires_at: now.saturating_add(response.expires_in),
            scope: response.scope.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthClient {
    config: Option<GoogleOAuthConfig>,
    client: Client,
    auth_url: String,
    token_url: String,
    revoke_url: String,
}

impl GoogleOAuthClient {
    pub fn new(config: Option<GoogleOAuthConfig>) -> Self {
        let timeout = config
            .as_ref()
            .map(|c| c.http_timeout)
            .unwrap_or(DEFAULT_TIMEOUT);

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        if config.is_none() {
            warn!("Google OAuth client created without credentials; linking and refresh are disabled");
        }

        Self {
            config,
            client,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            revoke_url: GOOGLE_REVOKE_URL.to_string(),
        }
    }

    /// Override the token and revocation endpoints (for testing with wiremock).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.token_url = format!("{}/token", base);
        self.revoke_url = format!("{}/revoke", base);
        self
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    fn config(&self) -> Result<&GoogleOAuthConfig, GoogleError> {
        self.config.as_ref().ok_or(GoogleError::NotConfigured)
    }

    pub fn redirect_uri(&self) -> Result<&str, GoogleError> {
        Ok(&self.config()?.redirect_uri)
    }

    /// Build the consent screen URL. `state` is echoed back to the callback.
    pub fn authorization_url(&self, state: &str) -> Result<String, GoogleError> {
        let config = self.config()?;
        let scope_param = GOOGLE_SCOPES.join(" ");

        let auth_url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            self.auth_url,
            urlencoding::encode(&config.client_id),
            urlencoding::encode(&config.redirect_uri),
            urlencoding::encode(&scope_param),
            urlencoding::encode(state)
        );

        debug!(scopes = %scope_param, "Generated Google OAuth authorization URL");
        Ok(auth_url)
    }

    /// Exchange an authorization code. The redirect URI must equal the one used to authorize.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, GoogleError> {
        let config = self.config()?;

        let params = [
            ("code", code),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        debug!("Exchanging authorization code for tokens");
        let response = self.post_token_request(&params).await?;
        info!("Successfully exchanged authorization code for tokens");
        Ok(response)
    }

    /// Mint a new access token from a refresh token
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, GoogleError> {
        let config = self.config()?;

        let params = [
            ("refresh_token", refresh_token),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];

        debug!(
            refresh_token = %safe_token_log(refresh_token),
            "Refreshing access token with Google OAuth"
        );
        self.post_token_request(&params).await
    }

    /// Revoke an access or refresh token at Google
    pub async fn revoke_token(&self, token: &str) -> Result<(), GoogleError> {
        let response = self
            .client
            .post(&self.revoke_url)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| GoogleError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(token = %safe_token_log(token), "Token revoked at Google");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(parse_error_body(status, &body))
    }

    async fn post_token_request(
        &self,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, GoogleError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to send token request");
                GoogleError::RequestFailed(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GoogleError::RequestFailed(e.to_string()))?;

        if !status.is_success() {
            let err = parse_error_body(status, &body);
            warn!(status = %status, error = %err, "Token endpoint rejected request");
            return Err(err);
        }

        let token_response: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| GoogleError::SerializationError(e.to_string()))?;

        if token_response.access_token.is_empty() {
            return Err(GoogleError::SerializationError(
                "token response has an empty access_token".to_string(),
            ));
        }

        if token_response.expires_in <= 0 || token_response.expires_in > MAX_EXPIRES_IN_SECS {
            return Err(GoogleError::SerializationError(format!(
                "token response has an invalid expires_in: {}",
                token_response.expires_in
            )));
        }

        Ok(token_response)
    }
}

fn parse_error_body(status: reqwest::StatusCode, body: &str) -> GoogleError {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(parsed) => GoogleError::OAuthFailed {
            error: parsed.error,
            description: parsed.error_description,
        },
        Err(_) => GoogleError::OAuthFailed {
            error: format!("http_{}", status.as_u16()),
            description: (!body.is_empty()).then(|| body.to_string()),
        },
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> GoogleOAuthConfig {
    GoogleOAuthConfig {
        client_id: "test_client_id".to_string(),
        client_secret: "test_secret".to_string(),
        redirect_uri: "http://localhost:8080/auth/callback".to_string(),
        http_timeout: Duration::from_secs(2),
    }
}
