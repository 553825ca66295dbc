// src/common/config.rs
//! Environment configuration for the server and the Google OAuth client

use std::env;
use std::time::Duration;
use tracing::warn;

const DEFAULT_APP_URL: &str = "http://localhost:8080";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 5;

/// OAuth client credentials and endpoint settings for Google
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub http_timeout: Duration,
}

impl GoogleOAuthConfig {
    /// Read the Google OAuth settings from the environment.
    /// Returns `None` when the client id or secret is missing.
    pub fn from_env() -> Option<Self> {
        let client_id = non_empty_var("GOOGLE_CLIENT_ID")?;
        let client_secret = non_empty_var("GOOGLE_CLIENT_SECRET")?;

        let app_url = env::var("APP_URL").unwrap_or_else(|_| DEFAULT_APP_URL.to_string());
        let redirect_uri = resolve_redirect_uri(non_empty_var("GOOGLE_REDIRECT_URI"), &app_url);

        let http_timeout = env::var("GOOGLE_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));

        Some(Self {
            client_id,
            client_secret,
            redirect_uri,
            http_timeout,
        })
    }
}

/// Explicit redirect URI wins, otherwise `<app base url>/auth/callback`
pub fn resolve_redirect_uri(explicit: Option<String>, app_url: &str) -> String {
    match explicit {
        Some(uri) => uri,
        None => format!("{}/auth/callback", app_url.trim_end_matches('/')),
    }
}

/// Process-level server settings
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub cors_origins: Vec<String>,
    pub token_encryption_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://google_link.db".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(8080);

        let jwt_secret = match non_empty_var("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET not set, using an insecure placeholder secret");
                "replace_with_strong_secret".to_string()
            }
        };

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            database_url,
            port,
            jwt_secret,
            cors_origins,
            token_encryption_key: non_empty_var("TOKEN_ENCRYPTION_KEY"),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_uri_prefers_explicit_value() {
        let uri = resolve_redirect_uri(
            Some("https://app.example.com/custom/callback".to_string()),
            "https://ignored.example.com",
        );
        assert_eq!(uri, "https://app.example.com/custom/callback");
    }

    #[test]
    fn test_redirect_uri_falls_back_to_app_url() {
        let uri = resolve_redirect_uri(None, "https://app.example.com");
        assert_eq!(uri, "https://app.example.com/auth/callback");
    }

    #[test]
    fn test_redirect_uri_trims_trailing_slash() {
        let uri = resolve_redirect_uri(None, "https://app.example.com/");
        assert_eq!(uri, "https://app.example.com/auth/callback");
    }
}
