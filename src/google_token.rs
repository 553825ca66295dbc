// google_token.rs
// Command-line consumer of the token endpoint, backed by the client token cache

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use google_link_api::services::{
    ApiSnapshotSource, CacheOptions, FileSessionStorage, TokenCache,
};
use tracing_subscriber::EnvFilter;

/// Print the caller's Google tokens, fetching through the API only when the cached copy is stale
#[derive(Debug, Parser)]
#[command(name = "google_token")]
struct Cli {
    /// Base URL of the Google link API
    #[arg(long, default_value = "http://localhost:8080", env = "GOOGLE_LINK_API_URL")]
    api_url: String,

    /// Session JWT sent as the bearer token
    #[arg(long, env = "SESSION_TOKEN", hide_env_values = true)]
    session_token: String,

    /// File mirroring the cached tokens between runs
    #[arg(long, default_value = ".google_session.json", env = "GOOGLE_SESSION_FILE")]
    session_file: PathBuf,

    /// Fetch timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// A valid access token (more than five minutes left)
    AccessToken,
    /// The refresh token
    RefreshToken,
    /// Access token expiry, epoch seconds
    ExpiresAt,
    /// Ignore the cache and fetch again
    Refresh,
    /// Forget the cached tokens
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_millis(cli.timeout_ms);

    let cache = TokenCache::with_options(
        ApiSnapshotSource::new(&cli.api_url, cli.session_token, timeout),
        FileSessionStorage::open(&cli.session_file),
        CacheOptions {
            fetch_timeout: timeout,
            ..CacheOptions::default()
        },
    );

    let output = match cli.command {
        Command::AccessToken => cache.get_valid_access_token().await,
        Command::RefreshToken => cache.get_refresh_token().await,
        Command::ExpiresAt => cache.get_token_expiration().await.map(|e| e.to_string()),
        Command::Refresh => cache.refresh_tokens().await.and_then(|s| s.access_token),
        Command::Clear => {
            cache.clear();
            return ExitCode::SUCCESS;
        }
    };

    match output {
        Some(value) => {
            println!("{}", value);
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("No Google tokens available");
            ExitCode::FAILURE
        }
    }
}
