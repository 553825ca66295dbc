//! # Google Module
//!
//! Authenticated read-only proxies over Gmail, Drive and Calendar for the caller's
//! linked Google account.

pub mod handlers;
pub mod routes;

pub use routes::google_routes;
