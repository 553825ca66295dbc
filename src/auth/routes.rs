//! Authentication routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;

/// Creates and returns the authentication router
///
/// # Routes
/// - `GET /auth/google` - Start linking a Google account
/// - `GET /auth/callback` - OAuth redirect target
/// - `GET /api/auth/google-tokens` - Current Google tokens for the client cache
/// - `GET /api/auth/google/status` - Link status without secrets
/// - `DELETE /api/auth/google` - Unlink and revoke
/// - `POST /api/auth/logout` - Logout (client-side token removal)
pub fn auth_routes() -> Router {
    Router::new()
        .route("/auth/google", get(handlers::google_oauth_start))
        .route("/auth/callback", get(handlers::oauth_callback))
        .route("/api/auth/google-tokens", get(handlers::google_tokens))
        .route("/api/auth/google/status", get(handlers::google_status))
        .route("/api/auth/google", axum::routing::delete(handlers::unlink_google))
        .route("/api/auth/logout", post(handlers::logout_handler))
}
