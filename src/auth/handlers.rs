//! Authentication handlers: Google account linking and the token endpoints

use axum::extract::{Extension, Json, Query};
use axum::http::header::CACHE_CONTROL;
use axum::response::{IntoResponse, Redirect};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::extractors::AuthedUser;
use super::models::{
    sign_link_state, verify_link_state, GoogleLinkStatus, GoogleTokensResponse, LinkStartQuery,
    OAuthCallbackQuery,
};
use crate::common::{ApiError, AppState};

const DEFAULT_POST_LINK_PATH: &str = "/dashboard";

/// GET /auth/google - Start linking the caller's Google account
/// Redirects to Google's consent screen with a signed `state`
pub async fn google_oauth_start(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Query(query): Query<LinkStartQuery>,
) -> Result<Redirect, ApiError> {
    let state = state_lock.read().await.clone();

    let redirect_to = query.redirect_to.filter(|p| is_safe_redirect(p));
    let link_state = sign_link_state(&state.jwt_secret, &authed.id, redirect_to).map_err(|e| {
        error!(error = %e, user_id = %authed.id, "Failed to sign OAuth state");
        ApiError::InternalServer("jwt error".to_string())
    })?;

    let auth_url = state.google_oauth.authorization_url(&link_state)?;

    info!(user_id = %authed.id, "Redirecting to Google OAuth consent screen");
    Ok(Redirect::to(&auth_url))
}

/// GET /auth/callback - Google redirects here after consent
///
/// Every outcome is a redirect: failures go to `/login?error=...`, success to
/// `redirect_to` (relative paths only) or `/dashboard`.
pub async fn oauth_callback(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Query(params): Query<OAuthCallbackQuery>,
) -> Redirect {
    let state = state_lock.read().await.clone();

    if let Some(oauth_error) = params.error {
        warn!(
            oauth_error = %oauth_error,
            description = ?params.error_description,
            "Google OAuth returned error"
        );
        let message = params.error_description.unwrap_or(oauth_error);
        return login_error(&message);
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        warn!("No authorization code in OAuth callback");
        return login_error("No authorization code provided");
    };

    let Some(link_state) = params
        .state
        .as_deref()
        .and_then(|s| verify_link_state(&state.jwt_secret, s))
    else {
        warn!("OAuth callback with missing or invalid state");
        return login_error("Invalid or expired OAuth state");
    };

    let user_id = link_state.sub;
    match state.token_service.link_account(&user_id, &code).await {
        Ok(record) => {
            info!(
                user_id = %user_id,
                expires_at = record.expires_at,
                has_refresh_token = record.has_refresh_token(),
                "Google account linked"
            );
        }
        Err(e) => {
            error!(error = %e, user_id = %user_id, "Failed to exchange authorization code for tokens");
            return login_error(&e.to_string());
        }
    }

    let target = params
        .redirect_to
        .or(link_state.redirect_to)
        .filter(|p| is_safe_redirect(p))
        .unwrap_or_else(|| DEFAULT_POST_LINK_PATH.to_string());
    Redirect::to(&target)
}

/// GET /api/auth/google-tokens
/// Hands the caller's current Google tokens to the client cache, refreshing first when needed
///
/// # Response
/// ```json
/// {
///   "access_token": "ya29...",
///   "refresh_token": "1//...",
///   "expires_at": 1700000000
/// }
/// ```
pub async fn google_tokens(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<impl IntoResponse, ApiError> {
    let state = state_lock.read().await.clone();

    let record = state
        .token_service
        .current_tokens(&authed.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No Google tokens found".to_string()))?;

    let body = GoogleTokensResponse {
        refresh_token: record.has_refresh_token().then(|| record.refresh_token.clone()),
        access_token: record.access_token,
        expires_at: record.expires_at,
    };

    Ok(([(CACHE_CONTROL, "no-store")], Json(body)))
}

/// GET /api/auth/google/status
pub async fn google_status(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<GoogleLinkStatus>, ApiError> {
    let state = state_lock.read().await.clone();

    let status = match state.token_service.stored_tokens(&authed.id).await? {
        Some(record) => GoogleLinkStatus {
            linked: true,
            expires_at: Some(record.expires_at),
            scope: Some(record.scope),
        },
        None => GoogleLinkStatus {
            linked: false,
            expires_at: None,
            scope: None,
        },
    };

    Ok(Json(status))
}

/// DELETE /api/auth/google - Revoke at Google and forget the stored grant
pub async fn unlink_google(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await.clone();

    state.token_service.revoke_google_tokens(&authed.id).await?;

    Ok(Json(serde_json::json!({
        "message": "Google account unlinked"
    })))
}

/// POST /api/auth/logout
/// Sessions are provider JWTs, so logout is client-side: clients clear their token cache.
pub async fn logout_handler(authed: AuthedUser) -> Json<serde_json::Value> {
    info!(user_id = %authed.id, "User logout acknowledged");
    Json(serde_json::json!({
        "message": "Logout successful"
    }))
}

fn login_error(message: &str) -> Redirect {
    Redirect::to(&format!("/login?error={}", urlencoding::encode(message)))
}

/// Only same-origin absolute paths are followed after linking
fn is_safe_redirect(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}
