// src/services/mod.rs
//
// Shared services: the Google OAuth client, token persistence and acquisition,
// the client-side token cache and the Google API read helpers

pub mod encryption;
pub mod google;
pub mod google_api;
pub mod session_storage;
pub mod snapshot_source;
pub mod token_cache;
pub mod token_service;
pub mod token_store;

// Re-export commonly used types for convenience
pub use encryption::EncryptionService;
pub use google::GoogleOAuthClient;
pub use google_api::GoogleApiClient;
pub use session_storage::{FileSessionStorage, MemorySessionStorage, SessionStorage};
pub use snapshot_source::{ApiSnapshotSource, StoreSnapshotSource};
pub use token_cache::{CacheOptions, TokenCache};
pub use token_service::GoogleTokenService;
pub use token_store::{SqliteTokenStore, TokenStore};
