//! Google account linking and OAuth token management.
//!
//! The server side stores each user's Google grant, refreshes it on demand and
//! serves it to authenticated clients. The client side
//! ([`services::TokenCache`]) keeps a single-flight, session-mirrored copy of
//! those tokens for consumers of the HTTP API.

pub mod auth;
pub mod common;
pub mod google;
pub mod logging_middleware;
pub mod services;
