// src/services/google_api.rs
//! Read-only helpers over Gmail, Drive and Calendar, authenticated with the
//! user's stored Google grant.

use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::services::google::GoogleError;
use crate::services::token_service::GoogleTokenService;

const GMAIL_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";
const DRIVE_BASE_URL: &str = "https://www.googleapis.com/drive/v3";
const CALENDAR_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

#[derive(Debug, Error)]
pub enum GoogleApiError {
    #[error("No valid access token available")]
    NoValidToken,

    #[error(transparent)]
    Token(#[from] GoogleError),

    #[error("Google API request failed: {0}")]
    RequestFailed(String),

    #[error("Google API request failed: {status} {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    #[default]
    Full,
    Minimal,
    Raw,
}

impl MessageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageFormat::Full => "full",
            MessageFormat::Minimal => "minimal",
            MessageFormat::Raw => "raw",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GmailListParams {
    pub max_results: Option<u32>,
    pub q: Option<String>,
    pub label_ids: Vec<String>,
    pub page_token: Option<String>,
}

impl GmailListParams {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        push_opt(&mut query, "maxResults", self.max_results);
        push_opt(&mut query, "q", self.q.clone());
        for label in self.label_ids.iter().filter(|l| !l.is_empty()) {
            query.push(("labelIds", label.clone()));
        }
        push_opt(&mut query, "pageToken", self.page_token.clone());
        query
    }
}

#[derive(Debug, Clone, Default)]
pub struct DriveListParams {
    pub page_size: Option<u32>,
    pub q: Option<String>,
    pub order_by: Option<String>,
    pub page_token: Option<String>,
}

impl DriveListParams {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        push_opt(&mut query, "pageSize", self.page_size);
        push_opt(&mut query, "q", self.q.clone());
        push_opt(&mut query, "orderBy", self.order_by.clone());
        push_opt(&mut query, "pageToken", self.page_token.clone());
        query
    }
}

#[derive(Debug, Clone, Default)]
pub struct CalendarEventsParams {
    pub time_min: Option<String>,
    pub time_max: Option<String>,
    pub max_results: Option<u32>,
    pub single_events: Option<bool>,
    pub order_by: Option<String>,
    pub page_token: Option<String>,
}

impl CalendarEventsParams {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        push_opt(&mut query, "timeMin", self.time_min.clone());
        push_opt(&mut query, "timeMax", self.time_max.clone());
        push_opt(&mut query, "maxResults", self.max_results);
        push_opt(&mut query, "singleEvents", self.single_events);
        push_opt(&mut query, "orderBy", self.order_by.clone());
        push_opt(&mut query, "pageToken", self.page_token.clone());
        query
    }
}

/// Zero counts and empty strings are treated as unset
fn push_opt<T: ToString>(query: &mut Vec<(&'static str, String)>, key: &'static str, value: Option<T>) {
    if let Some(value) = value.map(|v| v.to_string()) {
        if !value.is_empty() && value != "0" {
            query.push((key, value));
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoogleApiClient {
    tokens: Arc<GoogleTokenService>,
    client: Client,
    gmail_url: String,
    drive_url: String,
    calendar_url: String,
}

impl GoogleApiClient {
    pub fn new(tokens: Arc<GoogleTokenService>) -> Self {
        Self {
            tokens,
            client: Client::new(),
            gmail_url: GMAIL_BASE_URL.to_string(),
            drive_url: DRIVE_BASE_URL.to_string(),
            calendar_url: CALENDAR_BASE_URL.to_string(),
        }
    }

    /// Point all three APIs at one base URL (for testing with wiremock)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.gmail_url = format!("{}/gmail/v1", base);
        self.drive_url = format!("{}/drive/v3", base);
        self.calendar_url = format!("{}/calendar/v3", base);
        self
    }

    /// Bearer GET against any Google API URL with the user's current token
    pub async fn fetch_json(
        &self,
        user_id: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Value, GoogleApiError> {
        let access_token = self
            .tokens
            .get_valid_access_token(user_id)
            .await?
            .ok_or(GoogleApiError::NoValidToken)?;

        debug!(user_id = %user_id, url = %url, "Calling Google API");
        let response = self
            .client
            .get(url)
            .bearer_auth(&access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| GoogleApiError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(user_id = %user_id, status = %status, "Google API returned an error");
            return Err(GoogleApiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| GoogleApiError::RequestFailed(e.to_string()))
    }

    pub async fn gmail_profile(&self, user_id: &str) -> Result<Value, GoogleApiError> {
        let url = format!("{}/users/me/profile", self.gmail_url);
        self.fetch_json(user_id, &url, &[]).await
    }

    pub async fn list_gmail_messages(
        &self,
        user_id: &str,
        params: &GmailListParams,
    ) -> Result<Value, GoogleApiError> {
        let url = format!("{}/users/me/messages", self.gmail_url);
        self.fetch_json(user_id, &url, &params.query()).await
    }

    pub async fn get_gmail_message(
        &self,
        user_id: &str,
        message_id: &str,
        format: MessageFormat,
    ) -> Result<Value, GoogleApiError> {
        let url = format!(
            "{}/users/me/messages/{}",
            self.gmail_url,
            urlencoding::encode(message_id)
        );
        self.fetch_json(user_id, &url, &[("format", format.as_str().to_string())])
            .await
    }

    pub async fn list_gmail_labels(&self, user_id: &str) -> Result<Value, GoogleApiError> {
        let url = format!("{}/users/me/labels", self.gmail_url);
        self.fetch_json(user_id, &url, &[]).await
    }

    pub async fn list_drive_files(
        &self,
        user_id: &str,
        params: &DriveListParams,
    ) -> Result<Value, GoogleApiError> {
        let url = format!("{}/files", self.drive_url);
        self.fetch_json(user_id, &url, &params.query()).await
    }

    /// Events of `calendar_id`, or of the primary calendar when `None`
    pub async fn list_calendar_events(
        &self,
        user_id: &str,
        calendar_id: Option<&str>,
        params: &CalendarEventsParams,
    ) -> Result<Value, GoogleApiError> {
        let calendar_id = calendar_id.filter(|c| !c.is_empty()).unwrap_or("primary");
        let url = format!(
            "{}/calendars/{}/events",
            self.calendar_url,
            urlencoding::encode(calendar_id)
        );
        self.fetch_json(user_id, &url, &params.query()).await
    }
}
