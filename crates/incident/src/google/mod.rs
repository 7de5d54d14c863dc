//! Google Calendar and Docs integrations.
//!
//! - [`calendar::GoogleCalendar`] creates a short incident event and attaches
//!   a Meet conference to it ([`ConferenceProvider`]).
//! - [`docs::GoogleDocs`] creates the incident notes document from a fixed
//!   skeleton ([`NotesProvider`]).
//!
//! Both share one [`GoogleClient`], which signs requests with an access token
//! obtained from the configured refresh token.
//!
//! # Configuration
//!
//! - `GOOGLEAPI_CLIENT_ID` / `GOOGLEAPI_CLIENT_SECRET`: OAuth2 client
//! - `GOOGLE_REFRESH_TOKEN`: refresh token from `incident-bot google-token`
//! - `GOOGLE_CALENDAR_ID`, `GOOGLE_CALENDAR_TIMEZONE`: event target
//! - `GOOGLE_DRIVE_INCIDENTS_FOLDER`: folder for notes documents

pub mod auth;
pub mod calendar;
pub mod docs;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Url};

use crate::config::GoogleConfig;
use crate::error::ClientError;
use crate::incident::{ConferenceDetails, DocumentHandle, Incident};

pub use auth::GoogleAuth;
pub use calendar::GoogleCalendar;
pub use docs::GoogleDocs;

/// Base URLs of the Google APIs in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleEndpoints {
    pub token_url: String,
    pub calendar_url: String,
    pub drive_url: String,
    pub docs_url: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            calendar_url: "https://www.googleapis.com/calendar/v3".to_string(),
            drive_url: "https://www.googleapis.com/drive/v3".to_string(),
            docs_url: "https://docs.googleapis.com/v1".to_string(),
        }
    }
}

impl GoogleEndpoints {
    /// All APIs served under one base URL, e.g. a local mock server.
    #[must_use]
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            token_url: format!("{base}/token"),
            calendar_url: format!("{base}/calendar/v3"),
            drive_url: format!("{base}/drive/v3"),
            docs_url: format!("{base}/docs/v1"),
        }
    }
}

/// Authenticated HTTP access to the Google APIs.
#[derive(Debug)]
pub struct GoogleClient {
    auth: GoogleAuth,
    client: reqwest::Client,
    endpoints: GoogleEndpoints,
}

impl GoogleClient {
    #[must_use]
    pub fn new(config: &GoogleConfig, endpoints: GoogleEndpoints) -> Self {
        Self {
            auth: GoogleAuth::new(config, &endpoints),
            client: reqwest::Client::new(),
            endpoints,
        }
    }

    #[must_use]
    pub const fn endpoints(&self) -> &GoogleEndpoints {
        &self.endpoints
    }

    /// Request builder carrying a fresh bearer token.
    pub async fn request(&self, method: Method, url: Url) -> Result<RequestBuilder, ClientError> {
        let token = self.auth.access_token().await?;
        Ok(self.client.request(method, url).bearer_auth(token))
    }
}

/// Creates a calendar event with an attached conference.
#[async_trait]
pub trait ConferenceProvider: Send + Sync {
    /// Create the event, request a conference for it and return its join details.
    async fn create_event_with_conference(
        &self,
        incident: &Incident,
        channel_url: &str,
    ) -> Result<ConferenceDetails, ClientError>;
}

/// Inputs of a notes document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotesRequest {
    /// Drive file name.
    pub file_name: String,
    /// Parent folder id.
    pub folder: Option<String>,
    /// Document title.
    pub title: String,
    /// Reporter named in the first timeline entry.
    pub author: String,
    /// Time of the first timeline entry.
    pub started_at: DateTime<Utc>,
}

/// Creates the incident notes document.
#[async_trait]
pub trait NotesProvider: Send + Sync {
    /// Create the document and fill in the skeleton.
    async fn create_notes_document(
        &self,
        request: &NotesRequest,
    ) -> Result<DocumentHandle, ClientError>;
}
