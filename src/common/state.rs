// Application state shared across all modules

use std::sync::Arc;

use crate::common::dev_mode::DevModeConfig;
use crate::services::{GoogleApiClient, GoogleOAuthClient, GoogleTokenService};

/// Application state containing configuration and the Google token services
#[derive(Clone)]
pub struct AppState {
    pub jwt_secret: String,
    pub dev_mode: DevModeConfig,
    pub google_oauth: Arc<GoogleOAuthClient>,
    pub token_service: Arc<GoogleTokenService>,
    pub google_api: Arc<GoogleApiClient>,
}
