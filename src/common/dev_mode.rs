// src/common/dev_mode.rs
//! Development mode configuration and utilities
//! Allows bypassing session authentication for local testing

use std::env;

#[derive(Debug, Clone)]
pub struct DevModeConfig {
    pub enabled: bool,
    pub user_id: String,
    pub user_email: String,
}

impl DevModeConfig {
    pub fn from_env() -> Self {
        let enabled = env::var("DEV_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            == "true";

        // Fixed id so linked tokens survive restarts in dev
        let user_id = env::var("DEV_USER_ID")
            .unwrap_or_else(|_| "00000000-0000-0000-0000-000000000001".to_string());

        let user_email = env::var("DEV_USER_EMAIL").unwrap_or_else(|_| "dev@test.com".to_string());

        Self {
            enabled,
            user_id,
            user_email,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            user_id: String::new(),
            user_email: String::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Print dev mode status on startup
pub fn print_dev_mode_status(config: &DevModeConfig) {
    if config.enabled {
        println!("⚠️  🔓 DEV MODE ENABLED 🔓 ⚠️");
        println!("   Session authentication bypassed for testing");
        println!("   Dev User: {} ({})", config.user_id, config.user_email);
        println!("   ⚠️  DO NOT USE IN PRODUCTION ⚠️");
        println!();
    } else {
        println!("🔒 Production mode - Session authentication required");
    }
}

/// CLI argument parsing for dev mode
pub fn parse_dev_mode_args() -> Option<bool> {
    parse_dev_mode_flag(env::args())
}

fn parse_dev_mode_flag<I: IntoIterator<Item = String>>(args: I) -> Option<bool> {
    let mut result = None;
    for arg in args {
        match arg.as_str() {
            "--dev" | "--dev-mode" => result = Some(true),
            "--no-dev" | "--prod" => result = Some(false),
            _ => {}
        }
    }
    result
}

/// Override dev mode from CLI args
pub fn apply_cli_override(mut config: DevModeConfig) -> DevModeConfig {
    if let Some(cli_dev_mode) = parse_dev_mode_args() {
        println!("🔧 CLI override: DEV_MODE = {}", cli_dev_mode);
        config.enabled = cli_dev_mode;
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_disabled_config() {
        assert!(!DevModeConfig::disabled().is_enabled());
    }

    #[test]
    fn test_parse_dev_flag() {
        assert_eq!(parse_dev_mode_flag(args(&["bin", "--dev"])), Some(true));
        assert_eq!(parse_dev_mode_flag(args(&["bin", "--prod"])), Some(false));
        assert_eq!(parse_dev_mode_flag(args(&["bin"])), None);
    }

    #[test]
    fn test_last_flag_wins() {
        assert_eq!(
            parse_dev_mode_flag(args(&["bin", "--dev", "--no-dev"])),
            Some(false)
        );
    }
}
