// Helper functions for safe logging and time handling

use chrono::Utc;
use serde_json::Value;

/// JSON fields whose values must never reach the logs
const SECRET_FIELDS: &[&str] = &[
    "access_token",
    "refresh_token",
    "id_token",
    "code",
    "client_secret",
];

/// Masks tokens for safe logging
/// Shows only first and last 4 characters
///
/// # Example
/// ```
/// use google_link_api::common::safe_token_log;
///
/// assert_eq!(safe_token_log("ya29.a0AfH6SMBexampletoken"), "ya29...oken");
/// assert_eq!(safe_token_log("short"), "***");
/// ```
pub fn safe_token_log(token: &str) -> String {
    if token.len() > 8 && token.is_ascii() {
        format!("{}...{}", &token[..4], &token[token.len() - 4..])
    } else {
        "***".to_string()
    }
}

/// Replaces credential values in a JSON document with a masked form, recursively
pub fn redact_secrets(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if SECRET_FIELDS.contains(&key.as_str()) {
                    if let Value::String(s) = field {
                        *field = Value::String(safe_token_log(s));
                    }
                } else {
                    redact_secrets(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_secrets),
        _ => {}
    }
}

/// Current time as epoch seconds
pub fn now_epoch_secs() -> i64 {
    Utc::now().timestamp()
}

/// Current time as epoch milliseconds
pub fn now_epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}
