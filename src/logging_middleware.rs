// src/logging_middleware.rs
//! Middleware for logging request and response bodies in debug mode.
//! Credential fields are masked before anything is logged.

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::common::helpers::redact_secrets;

/// Middleware to log request and response bodies in debug mode
pub async fn log_request_response(request: Request, next: Next) -> Result<Response, StatusCode> {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if let Some(body) = loggable_body(&bytes) {
        debug!(method = %parts.method, path = %parts.uri.path(), request_body = %body, "📥 Request");
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    let response = next.run(request).await;

    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if let Some(body) = loggable_body(&bytes) {
        debug!(status = %parts.status, response_body = %body, "📤 Response");
    }

    Ok(Response::from_parts(parts, Body::from(bytes)))
}

/// JSON bodies are pretty-printed with secrets masked; anything else is withheld
fn loggable_body(bytes: &Bytes) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }

    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(mut json) => {
            redact_secrets(&mut json);
            serde_json::to_string_pretty(&json).ok()
        }
        Err(_) => Some(format!("<{} bytes, non-JSON>", bytes.len())),
    }
}
