//! Google Calendar event with a Meet conference.
//!
//! Insert a five-minute event, then patch it with a conference create request
//! keyed by the incident id so a retried patch reuses the same room. Join
//! details are read from the event's entry points. While the conference is
//! still `pending`, the event is re-read with exponential backoff.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, info};

use super::{ConferenceProvider, GoogleClient};
use crate::config::GoogleConfig;
use crate::error::{check_status, ClientError};
use crate::http::endpoint;
use crate::incident::{ConferenceDetails, Incident};

/// Length of the incident calendar event.
const EVENT_MINUTES: i64 = 5;

/// Calendar client bound to one calendar and timezone.
#[derive(Debug, Clone)]
pub struct GoogleCalendar {
    google: Arc<GoogleClient>,
    calendar_id: String,
    timezone: String,
    settle_attempts: u32,
    settle_backoff: StdDuration,
}

impl GoogleCalendar {
    #[must_use]
    pub fn new(google: Arc<GoogleClient>, config: &GoogleConfig) -> Self {
        Self {
            google,
            calendar_id: config.calendar_id.clone(),
            timezone: config.calendar_timezone.clone(),
            settle_attempts: config.settle_attempts.max(1),
            settle_backoff: config.settle_backoff,
        }
    }

    async fn fetch_event(&self, event_url: Url) -> Result<CalendarEvent, ClientError> {
        let response = self.google.request(Method::GET, event_url).await?.send().await?;
        Ok(check_status("google-calendar", response).await?.json().await?)
    }

    /// Wait for a pending conference to be allocated.
    async fn settle_conference(
        &self,
        event_url: Url,
        mut event: CalendarEvent,
    ) -> Result<Vec<EntryPoint>, ClientError> {
        let mut backoff = self.settle_backoff;
        let mut attempt = 1;

        loop {
            match conference_entry_points(event)? {
                Some(entry_points) => return Ok(entry_points),
                None if attempt < self.settle_attempts => {
                    debug!(
                        attempt,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        "Conference pending, retrying"
                    );
                    sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                    event = self.fetch_event(event_url.clone()).await?;
                }
                None => {
                    return Err(ClientError::Unfulfilled {
                        service: "google-calendar",
                        reason: format!("conference still pending after {attempt} attempts"),
                    })
                }
            }
        }
    }

    fn event(&self, incident: &Incident, channel_url: &str) -> EventRequest {
        let start = incident.started_at;
        let end = start + Duration::minutes(EVENT_MINUTES);

        EventRequest {
            summary: incident.name.clone(),
            description: event_description(incident, channel_url),
            start: EventTime {
                date_time: start.to_rfc3339(),
                time_zone: self.timezone.clone(),
            },
            end: EventTime {
                date_time: end.to_rfc3339(),
                time_zone: self.timezone.clone(),
            },
        }
    }
}

#[async_trait]
impl ConferenceProvider for GoogleCalendar {
    async fn create_event_with_conference(
        &self,
        incident: &Incident,
        channel_url: &str,
    ) -> Result<ConferenceDetails, ClientError> {
        let events_url = endpoint(
            &self.google.endpoints().calendar_url,
            &["calendars", &self.calendar_id, "events"],
        )?;

        let response = self
            .google
            .request(Method::POST, events_url)
            .await?
            .json(&self.event(incident, channel_url))
            .send()
            .await?;
        let created: CalendarEvent = check_status("google-calendar", response).await?.json().await?;

        debug!(incident_id = %incident.id, event_id = %created.id, "Calendar event created");

        let event_url = endpoint(
            &self.google.endpoints().calendar_url,
            &["calendars", &self.calendar_id, "events", &created.id],
        )?;
        let patch = json!({
            "conferenceData": {
                "createRequest": { "requestId": incident.id }
            }
        });

        let response = self
            .google
            .request(Method::PATCH, event_url.clone())
            .await?
            .query(&[("conferenceDataVersion", "1"), ("sendUpdates", "all")])
            .json(&patch)
            .send()
            .await?;
        let patched: CalendarEvent = check_status("google-calendar", response).await?.json().await?;

        let entry_points = self.settle_conference(event_url, patched).await?;

        info!(incident_id = %incident.id, event_id = %created.id, "Conference attached");
        Ok(extract_conference(&entry_points))
    }
}

/// Entry points of a ready conference, or `None` while it is still pending.
fn conference_entry_points(event: CalendarEvent) -> Result<Option<Vec<EntryPoint>>, ClientError> {
    let data = event.conference_data.unwrap_or_default();
    if !data.entry_points.is_empty() {
        return Ok(Some(data.entry_points));
    }

    let status = data
        .create_request
        .and_then(|request| request.status)
        .map(|status| status.status_code);
    match status.as_deref() {
        Some("pending") => Ok(None),
        Some("failure") => Err(ClientError::Unfulfilled {
            service: "google-calendar",
            reason: "conference creation failed".to_string(),
        }),
        _ => Err(ClientError::MissingField {
            service: "google-calendar",
            field: "conferenceData.entryPoints",
        }),
    }
}

/// HTML event description naming the incident, its start and the channel.
#[must_use]
pub fn event_description(incident: &Incident, channel_url: &str) -> String {
    format!(
        "<b>{name}</b>\n<small>Incident response triggered on {at} UTC\nReported by {reporter}\n<a href='{channel_url}'>Incident Slack Channel</a>\n</small>",
        name = escape_html(&incident.name),
        at = incident.started_at.format("%d/%m/%Y %H:%M"),
        reporter = escape_html(&incident.creator_handle),
        channel_url = escape_html(channel_url),
    )
}

/// Escape text placed in the HTML description.
fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Join details from a conference's entry points.
///
/// Entry points come in no guaranteed order; when a type repeats, the last
/// one listed wins.
#[must_use]
pub fn extract_conference(entry_points: &[EntryPoint]) -> ConferenceDetails {
    let mut details = ConferenceDetails::default();

    for entry in entry_points {
        match entry.entry_point_type.as_str() {
            "video" => {
                details.video_uri.clone_from(&entry.uri);
                details.video_label.clone_from(&entry.label);
            }
            "phone" => {
                details.phone_uri.clone_from(&entry.uri);
                details.phone_label.clone_from(&entry.label);
                details.pin.clone_from(&entry.pin);
                details.region_code.clone_from(&entry.region_code);
            }
            "more" => details.more_numbers_uri.clone_from(&entry.uri),
            other => debug!(entry_point_type = %other, "Ignoring conference entry point"),
        }
    }

    details
}

// =============================================================================
// Calendar API types
// =============================================================================

#[derive(Debug, Serialize)]
struct EventRequest {
    summary: String,
    description: String,
    start: EventTime,
    end: EventTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: String,
    time_zone: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarEvent {
    id: String,
    #[serde(default)]
    conference_data: Option<ConferenceData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConferenceData {
    #[serde(default)]
    entry_points: Vec<EntryPoint>,
    #[serde(default)]
    create_request: Option<CreateRequest>,
}

#[derive(Debug, Deserialize)]
struct CreateRequest {
    #[serde(default)]
    status: Option<CreateRequestStatus>,
}

/// `pending`, `success` or `failure`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequestStatus {
    status_code: String,
}

/// One way to join a conference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPoint {
    /// `video`, `phone`, `more` or `sip`.
    pub entry_point_type: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub pin: Option<String>,
    #[serde(default)]
    pub region_code: Option<String>,
}
