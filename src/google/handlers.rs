//! Google API proxy handlers

use axum::extract::{Extension, Json, Path, Query};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::auth::AuthedUser;
use crate::common::{ApiError, AppState};
use crate::services::google_api::{
    CalendarEventsParams, DriveListParams, GmailListParams, MessageFormat,
};

/// Query for `GET /api/google/gmail/messages`. `labelIds` is comma-separated.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessagesQuery {
    pub max_results: Option<u32>,
    pub q: Option<String>,
    pub label_ids: Option<String>,
    pub page_token: Option<String>,
}

impl From<GmailMessagesQuery> for GmailListParams {
    fn from(query: GmailMessagesQuery) -> Self {
        GmailListParams {
            max_results: query.max_results,
            q: query.q,
            label_ids: query
                .label_ids
                .map(|ids| {
                    ids.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            page_token: query.page_token,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GmailMessageQuery {
    #[serde(default)]
    pub format: MessageFormat,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFilesQuery {
    pub page_size: Option<u32>,
    pub q: Option<String>,
    pub order_by: Option<String>,
    pub page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEventsQuery {
    pub calendar_id: Option<String>,
    pub time_min: Option<String>,
    pub time_max: Option<String>,
    pub max_results: Option<u32>,
    pub single_events: Option<bool>,
    pub order_by: Option<String>,
    pub page_token: Option<String>,
}

/// GET /api/google/gmail/profile
pub async fn gmail_profile(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<Value>, ApiError> {
    let api = state_lock.read().await.google_api.clone();
    Ok(Json(api.gmail_profile(&authed.id).await?))
}

/// GET /api/google/gmail/messages
pub async fn gmail_messages(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Query(query): Query<GmailMessagesQuery>,
) -> Result<Json<Value>, ApiError> {
    let api = state_lock.read().await.google_api.clone();
    let params = GmailListParams::from(query);
    Ok(Json(api.list_gmail_messages(&authed.id, &params).await?))
}

/// GET /api/google/gmail/messages/:id
pub async fn gmail_message(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Path(message_id): Path<String>,
    Query(query): Query<GmailMessageQuery>,
) -> Result<Json<Value>, ApiError> {
    let api = state_lock.read().await.google_api.clone();
    Ok(Json(
        api.get_gmail_message(&authed.id, &message_id, query.format)
            .await?,
    ))
}

/// GET /api/google/gmail/labels
pub async fn gmail_labels(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<Value>, ApiError> {
    let api = state_lock.read().await.google_api.clone();
    Ok(Json(api.list_gmail_labels(&authed.id).await?))
}

/// GET /api/google/drive/files
pub async fn drive_files(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Query(query): Query<DriveFilesQuery>,
) -> Result<Json<Value>, ApiError> {
    let api = state_lock.read().await.google_api.clone();
    let params = DriveListParams {
        page_size: query.page_size,
        q: query.q,
        order_by: query.order_by,
        page_token: query.page_token,
    };
    Ok(Json(api.list_drive_files(&authed.id, &params).await?))
}

/// GET /api/google/calendar/events
pub async fn calendar_events(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Query(query): Query<CalendarEventsQuery>,
) -> Result<Json<Value>, ApiError> {
    let api = state_lock.read().await.google_api.clone();
    let params = CalendarEventsParams {
        time_min: query.time_min,
        time_max: query.time_max,
        max_results: query.max_results,
        single_events: query.single_events,
        order_by: query.order_by,
        page_token: query.page_token,
    };
    Ok(Json(
        api.list_calendar_events(&authed.id, query.calendar_id.as_deref(), &params)
            .await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_ids_split() {
        let query = GmailMessagesQuery {
            label_ids: Some("INBOX, UNREAD,,".to_string()),
            ..Default::default()
        };
        let params = GmailListParams::from(query);
        assert_eq!(params.label_ids, vec!["INBOX", "UNREAD"]);
    }
}
