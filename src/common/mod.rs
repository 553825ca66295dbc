// Common module - shared types and utilities across all modules

pub mod config;
pub mod dev_mode;
pub mod error;
pub mod helpers;
pub mod migrations;
pub mod state;

// Re-export commonly used types for convenience
pub use config::{AppConfig, GoogleOAuthConfig};
pub use error::ApiError;
pub use helpers::{now_epoch_millis, now_epoch_secs, safe_token_log};
pub use state::AppState;
