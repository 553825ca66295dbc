//! Authentication data models

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audience of the OAuth `state` token, so a session JWT can never pass as one
pub const LINK_STATE_PURPOSE: &str = "google_link";

const LINK_STATE_TTL_MINUTES: i64 = 10;

/// Session JWT claims issued by the auth provider
#[derive(Serialize, Deserialize, Debug)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub email: Option<String>,
}

/// Claims carried through Google's consent screen in the `state` parameter
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LinkStateClaims {
    pub sub: String,
    pub exp: usize,
    pub purpose: String,
    /// Unique per authorization request
    pub jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

pub fn sign_link_state(
    secret: &str,
    user_id: &str,
    redirect_to: Option<String>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = (Utc::now() + Duration::minutes(LINK_STATE_TTL_MINUTES)).timestamp() as usize;
    let claims = LinkStateClaims {
        sub: user_id.to_string(),
        exp,
        purpose: LINK_STATE_PURPOSE.to_string(),
        jti: Uuid::new_v4().to_string(),
        redirect_to,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Returns `None` for expired, forged or foreign tokens
pub fn verify_link_state(secret: &str, state: &str) -> Option<LinkStateClaims> {
    let claims = decode::<LinkStateClaims>(
        state,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .ok()?
    .claims;

    (claims.purpose == LINK_STATE_PURPOSE && !claims.sub.is_empty()).then_some(claims)
}

/// Public view of a user's Google link
#[derive(Serialize, Debug)]
pub struct GoogleLinkStatus {
    pub linked: bool,
    pub expires_at: Option<i64>,
    pub scope: Option<String>,
}

/// Body of the intermediating token endpoint
#[derive(Serialize, Deserialize, Debug)]
pub struct GoogleTokensResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: i64,
}

#[derive(Deserialize, Debug, Default)]
pub struct LinkStartQuery {
    pub redirect_to: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub redirect_to: Option<String>,
}
