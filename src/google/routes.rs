//! Google API proxy routes

use axum::{routing::get, Router};

use super::handlers;

/// All routes require a session and a linked Google account
pub fn google_routes() -> Router {
    Router::new()
        .route("/api/google/gmail/profile", get(handlers::gmail_profile))
        .route("/api/google/gmail/messages", get(handlers::gmail_messages))
        .route("/api/google/gmail/messages/:id", get(handlers::gmail_message))
        .route("/api/google/gmail/labels", get(handlers::gmail_labels))
        .route("/api/google/drive/files", get(handlers::drive_files))
        .route("/api/google/calendar/events", get(handlers::calendar_events))
}
