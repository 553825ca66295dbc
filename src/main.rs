// src/main.rs
use axum::{extract::Extension, middleware, Router};
use dotenv::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::PathBuf;
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// COMMON IMPORTS
// ============================================================================

use google_link_api::common::dev_mode::{apply_cli_override, print_dev_mode_status, DevModeConfig};
use google_link_api::common::{self, AppConfig, AppState, GoogleOAuthConfig};
use google_link_api::services::{
    EncryptionService, GoogleApiClient, GoogleOAuthClient, GoogleTokenService, SqliteTokenStore,
};
use google_link_api::{auth, google, logging_middleware};

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // ========================================================================
    // ENVIRONMENT CONFIGURATION
    // ========================================================================

    let config = AppConfig::from_env();

    let dev_mode = apply_cli_override(DevModeConfig::from_env());
    print_dev_mode_status(&dev_mode);

    // ========================================================================
    // DATABASE SETUP
    // ========================================================================

    if let Some(path_part) = config.database_url.strip_prefix("sqlite://") {
        let path_without_params = path_part.split('?').next().unwrap_or("");
        if !path_without_params.is_empty() && !path_without_params.starts_with(':') {
            let db_path = PathBuf::from(path_without_params);
            if let Some(parent) = db_path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }
    }

    let connect_options =
        SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(connect_options)
        .await?;

    // Run database migrations
    common::migrations::run_migrations(&pool).await?;

    // ========================================================================
    // SERVICE INITIALIZATION
    // ========================================================================

    let encryption = match &config.token_encryption_key {
        Some(key) => Some(EncryptionService::from_key(key)?),
        None => {
            warn!("TOKEN_ENCRYPTION_KEY not set, Google tokens will be stored unencrypted");
            None
        }
    };
    let token_store = Arc::new(SqliteTokenStore::new(pool, encryption));
    info!("SqliteTokenStore initialized");

    let google_config = GoogleOAuthConfig::from_env();
    if let Some(google) = &google_config {
        info!(redirect_uri = %google.redirect_uri, "Google OAuth configured");
    }
    let google_oauth = Arc::new(GoogleOAuthClient::new(google_config));

    let token_service = Arc::new(GoogleTokenService::new(token_store, google_oauth.clone()));
    info!("GoogleTokenService initialized");

    let google_api = Arc::new(GoogleApiClient::new(token_service.clone()));

    // ========================================================================
    // APPLICATION STATE
    // ========================================================================

    let app_state = AppState {
        jwt_secret: config.jwt_secret.clone(),
        dev_mode,
        google_oauth,
        token_service,
        google_api,
    };

    let shared = Arc::new(RwLock::new(app_state));

    // ========================================================================
    // ROUTER COMPOSITION
    // ========================================================================

    let app = Router::new()
        // ====================================================================
        // AUTHENTICATION AND ACCOUNT LINKING ROUTES
        // ====================================================================
        .merge(auth::auth_routes())
        // ====================================================================
        // GOOGLE API ROUTES (Gmail, Drive, Calendar)
        // ====================================================================
        .merge(google::google_routes())
        // ====================================================================
        // MIDDLEWARE AND LAYERS
        // ====================================================================
        // Add request/response body logging in debug mode
        .layer(middleware::from_fn(logging_middleware::log_request_response))
        .layer(Extension(shared))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http());

    // ========================================================================
    // SERVER STARTUP
    // ========================================================================

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn cors_layer(cors_origins: &[String]) -> CorsLayer {
    let origins: Vec<axum::http::HeaderValue> = cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::header::CACHE_CONTROL,
        ])
        .allow_credentials(true)
}
