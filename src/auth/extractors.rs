//! Authentication extractors for Axum

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::models::Claims;
use crate::common::{ApiError, AppState};

/// Authenticated user extractor
///
/// Validates the session JWT issued by the auth provider. The user id is the
/// token's `sub`; no local user table is consulted. In dev mode the configured
/// dev user is returned without looking at the request.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub id: String,
    pub email: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(state_lock): Extension<Arc<RwLock<AppState>>> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::InternalServer("missing app state".to_string()))?;

        let (jwt_secret, dev_mode) = {
            let app_state = state_lock.read().await;
            (app_state.jwt_secret.clone(), app_state.dev_mode.clone())
        };

        // DEV MODE: Bypass authentication completely
        if dev_mode.is_enabled() {
            debug!(user_id = %dev_mode.user_id, "DEV MODE: Authentication bypassed");
            return Ok(AuthedUser {
                id: dev_mode.user_id,
                email: Some(dev_mode.user_email),
            });
        }

        let token = match parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
        {
            Some(t) => t,
            None => {
                warn!("Authentication failed: missing Authorization header");
                return Err(ApiError::Unauthorized("missing auth".into()));
            }
        };

        // Handle "Bearer <token>" format or raw token
        let bare_token = token.strip_prefix("Bearer ").unwrap_or(token);

        let claims = match decode::<Claims>(
            bare_token,
            &DecodingKey::from_secret(jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        ) {
            Ok(d) => d.claims,
            Err(e) => {
                warn!(error = %e, "JWT token validation failed");
                return Err(ApiError::Unauthorized("invalid token".into()));
            }
        };

        if claims.sub.trim().is_empty() {
            warn!("Authentication failed: token has no subject");
            return Err(ApiError::Unauthorized("invalid token".into()));
        }

        Ok(AuthedUser {
            id: claims.sub,
            email: claims.email,
        })
    }
}
