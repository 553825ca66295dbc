//! Tests for the auth and Google proxy routes
//!
//! Each test drives the real router with `tower::ServiceExt::oneshot` against an
//! in-memory token store and a wiremock stand-in for Google.

use axum::{
    body::{to_bytes, Body},
    extract::Extension,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::models::{self, Claims};
use crate::common::dev_mode::DevModeConfig;
use crate::common::helpers::now_epoch_secs;
use crate::common::AppState;
use crate::services::google::{test_config, GoogleOAuthClient};
use crate::services::token_store::{sample_record, test_pool, SqliteTokenStore, TokenStore};
use crate::services::{GoogleApiClient, GoogleTokenService};

pub(crate) const TEST_SECRET: &str = "test_secret_key";

pub(crate) struct TestApp {
    pub router: Router,
    pub store: Arc<SqliteTokenStore>,
    pub server: MockServer,
}

pub(crate) async fn test_app_with(dev_mode: DevModeConfig) -> TestApp {
    let server = MockServer::start().await;
    let store = Arc::new(SqliteTokenStore::new(test_pool().await, None));
    let google_oauth =
        Arc::new(GoogleOAuthClient::new(Some(test_config())).with_base_url(&server.uri()));
    let token_service = Arc::new(GoogleTokenService::new(store.clone(), google_oauth.clone()));
    let google_api = Arc::new(GoogleApiClient::new(token_service.clone()).with_base_url(&server.uri()));

    let state = AppState {
        jwt_secret: TEST_SECRET.to_string(),
        dev_mode,
        google_oauth,
        token_service,
        google_api,
    };

    let router = super::auth_routes()
        .merge(crate::google::google_routes())
        .layer(Extension(Arc::new(RwLock::new(state))));

    TestApp {
        router,
        store,
        server,
    }
}

pub(crate) async fn test_app() -> TestApp {
    test_app_with(DevModeConfig::disabled()).await
}

pub(crate) fn session_token(user_id: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: 9_999_999_999,
        email: Some("user@example.com".to_string()),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap()
}

fn get(uri: &str, user_id: Option<&str>) -> Request<Body> {
    request("GET", uri, user_id)
}

fn request(method: &str, uri: &str, user_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user_id) = user_id {
        builder = builder.header(
            header::AUTHORIZATION,
            format!("Bearer {}", session_token(user_id)),
        );
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

#[test]
fn test_link_state_round_trip() {
    let state = models::sign_link_state(TEST_SECRET, "u1", Some("/settings".to_string())).unwrap();

    let claims = models::verify_link_state(TEST_SECRET, &state).unwrap();
    assert_eq!(claims.sub, "u1");
    assert_eq!(claims.redirect_to.as_deref(), Some("/settings"));

    assert!(models::verify_link_state("wrong_secret_key", &state).is_none());
}

#[test]
fn test_session_token_is_not_a_link_state() {
    assert!(models::verify_link_state(TEST_SECRET, &session_token("u1")).is_none());
}

#[tokio::test]
async fn test_google_tokens_requires_session() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(get("/api/auth/google-tokens", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_google_tokens_rejects_forged_session() {
    let app = test_app().await;
    let forged = encode(
        &Header::new(Algorithm::HS256),
        &Claims {
            sub: "u1".to_string(),
            exp: 9_999_999_999,
            email: None,
        },
        &EncodingKey::from_secret(b"someone_elses_secret"),
    )
    .unwrap();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/api/auth/google-tokens")
                .header(header::AUTHORIZATION, format!("Bearer {}", forged))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_google_tokens_returns_valid_record() {
    let app = test_app().await;
    let expires_at = now_epoch_secs() + 3600;
    app.store.upsert(&sample_record("u1", expires_at)).await.unwrap();

    let response = app
        .router
        .oneshot(get("/api/auth/google-tokens", Some("u1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
    let body = body_json(response).await;
    assert_eq!(body["access_token"], "A1");
    assert_eq!(body["refresh_token"], "R1");
    assert_eq!(body["expires_at"], expires_at);
}

#[tokio::test]
async fn test_google_tokens_refreshes_expiring_record() {
    let app = test_app().await;
    app.store
        .upsert(&sample_record("u1", now_epoch_secs() + 60))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A2",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&app.server)
        .await;

    let response = app
        .router
        .oneshot(get("/api/auth/google-tokens", Some("u1")))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["access_token"], "A2");
    assert_eq!(body["refresh_token"], "R1");
}

#[tokio::test]
async fn test_google_tokens_unlinked_is_404() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(get("/api/auth/google-tokens", Some("u404")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "No Google tokens found");
}

#[tokio::test]
async fn test_status_reports_link_without_secrets() {
    let app = test_app().await;
    app.store
        .upsert(&sample_record("u1", 1_700_000_000))
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(get("/api/auth/google/status", Some("u1")))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body, json!({"linked": true, "expires_at": 1_700_000_000_i64, "scope": "s"}));

    let response = app
        .router
        .oneshot(get("/api/auth/google/status", Some("u2")))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["linked"], false);
}

#[tokio::test]
async fn test_oauth_start_redirects_with_signed_state() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(get("/auth/google?redirect_to=/settings", Some("u1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let target = location(&response);
    assert!(target.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));

    let state = target
        .split('&')
        .find_map(|pair| pair.strip_prefix("state="))
        .unwrap();
    let state = urlencoding::decode(state).unwrap();
    let claims = models::verify_link_state(TEST_SECRET, &state).unwrap();
    assert_eq!(claims.sub, "u1");
    assert_eq!(claims.redirect_to.as_deref(), Some("/settings"));
}

#[tokio::test]
async fn test_callback_links_account() {
    let app = test_app().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("code=auth-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A1",
            "refresh_token": "R1",
            "expires_in": 3600,
            "scope": "openid email"
        })))
        .expect(1)
        .mount(&app.server)
        .await;

    let state = models::sign_link_state(TEST_SECRET, "u1", None).unwrap();
    let response = app
        .router
        .oneshot(get(
            &format!("/auth/callback?code=auth-code&state={}", state),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");

    let stored = app.store.get("u1").await.unwrap().unwrap();
    assert_eq!(stored.access_token, "A1");
    assert_eq!(stored.refresh_token, "R1");
    assert_eq!(stored.scope, "openid email");
}

#[tokio::test]
async fn test_callback_honors_relative_redirect_only() {
    let app = test_app().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A1",
            "refresh_token": "R1",
            "expires_in": 3600
        })))
        .mount(&app.server)
        .await;

    let state = models::sign_link_state(TEST_SECRET, "u1", None).unwrap();
    let response = app
        .router
        .clone()
        .oneshot(get(
            &format!("/auth/callback?code=c&state={}&redirect_to=/inbox", state),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(location(&response), "/inbox");

    let response = app
        .router
        .oneshot(get(
            &format!(
                "/auth/callback?code=c&state={}&redirect_to=https%3A%2F%2Fevil.example.com",
                state
            ),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(location(&response), "/dashboard");
}

#[tokio::test]
async fn test_callback_provider_error_goes_to_login() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(get("/auth/callback?error=access_denied", None))
        .await
        .unwrap();

    assert_eq!(location(&response), "/login?error=access_denied");
}

#[tokio::test]
async fn test_callback_rejects_bad_state() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(get("/auth/callback?code=c&state=not-a-jwt", None))
        .await
        .unwrap();

    assert!(location(&response).starts_with("/login?error="));
    assert_eq!(app.store.get("u1").await.unwrap(), None);
}

#[tokio::test]
async fn test_callback_exchange_failure_goes_to_login() {
    let app = test_app().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .mount(&app.server)
        .await;

    let state = models::sign_link_state(TEST_SECRET, "u1", None).unwrap();
    let response = app
        .router
        .oneshot(get(&format!("/auth/callback?code=c&state={}", state), None))
        .await
        .unwrap();

    let target = location(&response);
    assert!(target.starts_with("/login?error="));
    assert!(target.contains("invalid_grant"));
}

#[tokio::test]
async fn test_unlink_revokes_and_deletes() {
    let app = test_app().await;
    app.store
        .upsert(&sample_record("u1", now_epoch_secs() + 3600))
        .await
        .unwrap();
    Mock::given(method("POST"))
        .and(path("/revoke"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&app.server)
        .await;

    let response = app
        .router
        .oneshot(request("DELETE", "/api/auth/google", Some("u1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.store.get("u1").await.unwrap(), None);
}

#[tokio::test]
async fn test_logout_acknowledges() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(request("POST", "/api/auth/logout", Some("u1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["message"], "Logout successful");
}

#[tokio::test]
async fn test_gmail_profile_without_link_is_401() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(get("/api/google/gmail/profile", Some("u1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_gmail_labels_proxies_google() {
    let app = test_app().await;
    app.store
        .upsert(&sample_record("u1", now_epoch_secs() + 3600))
        .await
        .unwrap();
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/labels"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"labels": [{"id": "INBOX"}]})),
        )
        .expect(1)
        .mount(&app.server)
        .await;

    let response = app
        .router
        .oneshot(get("/api/google/gmail/labels", Some("u1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["labels"][0]["id"], "INBOX");
}

#[tokio::test]
async fn test_dev_mode_bypasses_session() {
    let app = test_app_with(DevModeConfig {
        enabled: true,
        user_id: "dev-user".to_string(),
        user_email: "dev@test.com".to_string(),
    })
    .await;
    app.store
        .upsert(&sample_record("dev-user", 1_700_000_000))
        .await
        .unwrap();

    let response = app
        .router
        .oneshot(get("/api/auth/google/status", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["linked"], true);
}
