//! # Auth Module
//!
//! This module handles all authentication-related functionality including:
//! - Session JWT validation via the `AuthedUser` extractor
//! - Linking a Google account through the OAuth consent flow
//! - Serving the linked account's tokens to the client cache
//! - Unlinking and revocation

pub mod extractors;
pub mod handlers;
pub mod models;
pub mod routes;

#[cfg(test)]
pub(crate) mod tests;

pub use extractors::AuthedUser;
pub use routes::auth_routes;
