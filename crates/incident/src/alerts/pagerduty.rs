//! `PagerDuty` integration for paging and acknowledgment lookups.
//!
//! - [`PagerDutyClient`] triggers alerts through Events API v2.
//! - [`PagerDutyApi`] reads incident alerts through the REST API so an
//!   acknowledgment can be traced back to the incident channel.
//!
//! # Usage
//!
//! ```no_run
//! use incident::alerts::pagerduty::{PagerDutyClient, PagerDutyEvent, EventSeverity};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = PagerDutyClient::new("routing-key".to_string());
//!
//! let event = PagerDutyEvent::trigger("Database connection failed", "incident-2401020304")
//!     .with_severity(EventSeverity::Critical);
//!
//! let _dedup_key = client.send_event(&event).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! - `PAGERDUTY_ROUTING_KEY`: Integration key from your `PagerDuty` service
//! - `PAGERDUTY_API_KEY`: REST API key used by the acknowledgment listener

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{channel_from_details, AlertLookup, Page, Pager};
use crate::error::{check_status, ClientError};
use crate::http::endpoint;

/// `PagerDuty` Events API v2 endpoint.
const EVENTS_API_URL: &str = "https://events.pagerduty.com/v2/enqueue";

/// `PagerDuty` REST API base URL.
const REST_API_URL: &str = "https://api.pagerduty.com";

/// `PagerDuty` client for Events API v2.
#[derive(Debug, Clone)]
pub struct PagerDutyClient {
    routing_key: String,
    events_url: String,
    client: reqwest::Client,
}

impl PagerDutyClient {
    /// Create a new `PagerDuty` client with a specific routing key.
    #[must_use]
    pub fn new(routing_key: String) -> Self {
        Self {
            routing_key,
            events_url: EVENTS_API_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Send events to another endpoint.
    #[must_use]
    pub fn with_events_url(mut self, events_url: impl Into<String>) -> Self {
        self.events_url = events_url.into();
        self
    }

    /// Trigger an alert in `PagerDuty`.
    ///
    /// Returns the `dedup_key` assigned to the alert.
    pub async fn send_event(&self, event: &PagerDutyEvent) -> Result<String, ClientError> {
        let payload = ApiPayload {
            routing_key: &self.routing_key,
            event_action: TRIGGER_ACTION,
            payload: &event.payload,
            links: &event.links,
        };

        debug!(source = %event.payload.source, "Sending PagerDuty trigger event");

        let response = self.client.post(&self.events_url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            warn!(
                status = %status,
                body = %body,
                "PagerDuty API request failed"
            );

            return Err(ClientError::Api {
                service: "pagerduty",
                status: status.as_u16(),
                message: body,
            });
        }

        let result: ApiResponse = response.json().await?;
        debug!(dedup_key = %result.dedup_key, "PagerDuty event sent successfully");
        Ok(result.dedup_key)
    }
}

#[async_trait]
impl Pager for PagerDutyClient {
    fn name(&self) -> &'static str {
        "pagerduty"
    }

    async fn trigger(&self, page: &Page) -> Result<(), ClientError> {
        let event = PagerDutyEvent::trigger(&page.summary, &page.source)
            .with_severity(EventSeverity::Critical)
            .with_custom_details(page.custom_details())
            .with_link(&page.channel_url, "Incident channel");

        self.send_event(&event).await.map(|_| ())
    }
}

/// Events API v2 action opening an alert.
const TRIGGER_ACTION: &str = "trigger";

/// `PagerDuty` trigger event for Events API v2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagerDutyEvent {
    /// Event payload
    pub payload: EventPayload,
    /// Links shown on the alert
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<EventLink>,
}

/// `PagerDuty` event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    /// Brief summary of the event
    pub summary: String,
    /// Source of the event
    pub source: String,
    /// Severity level
    pub severity: EventSeverity,
    /// Custom details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_details: Option<Value>,
}

/// Link attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLink {
    /// Target URL
    pub href: String,
    /// Link text
    pub text: String,
}

/// `PagerDuty` event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    /// Critical severity
    Critical,
    /// Error severity
    Error,
}

impl PagerDutyEvent {
    /// Create a trigger event.
    #[must_use]
    pub fn trigger(summary: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            payload: EventPayload {
                summary: summary.into(),
                source: source.into(),
                severity: EventSeverity::Error,
                custom_details: None,
            },
            links: vec![],
        }
    }

    /// Set the severity.
    #[must_use]
    pub const fn with_severity(mut self, severity: EventSeverity) -> Self {
        self.payload.severity = severity;
        self
    }

    /// Set custom details.
    #[must_use]
    pub fn with_custom_details(mut self, details: Value) -> Self {
        self.payload.custom_details = Some(details);
        self
    }

    /// Attach a link.
    #[must_use]
    pub fn with_link(mut self, href: impl Into<String>, text: impl Into<String>) -> Self {
        self.links.push(EventLink {
            href: href.into(),
            text: text.into(),
        });
        self
    }
}

/// `PagerDuty` REST API client used to read incident alerts.
#[derive(Debug, Clone)]
pub struct PagerDutyApi {
    api_key: String,
    api_url: String,
    client: reqwest::Client,
}

impl PagerDutyApi {
    /// Create a REST client with an API key.
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            api_url: REST_API_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the client at another API base URL.
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// List the alerts of an incident.
    pub async fn incident_alerts(&self, incident_id: &str) -> Result<Vec<Alert>, ClientError> {
        let response = self
            .client
            .get(endpoint(&self.api_url, &["incidents", incident_id, "alerts"])?)
            .header("Authorization", format!("Token token={}", self.api_key))
            .header("Accept", "application/vnd.pagerduty+json;version=2")
            .send()
            .await?;

        let alerts: AlertsResponse = check_status("pagerduty", response).await?.json().await?;
        debug!(incident_id = %incident_id, count = alerts.alerts.len(), "Fetched incident alerts");
        Ok(alerts.alerts)
    }
}

#[async_trait]
impl AlertLookup for PagerDutyApi {
    async fn channel_for_incident(&self, incident_id: &str) -> Result<Option<String>, ClientError> {
        let alerts = self.incident_alerts(incident_id).await?;
        Ok(alerts.iter().find_map(Alert::channel_id))
    }
}

/// Alert attached to a `PagerDuty` incident.
#[derive(Debug, Clone, Deserialize)]
pub struct Alert {
    /// Alert id
    pub id: String,
    /// Alert body; custom details live under `details` or `cef_details.details`
    #[serde(default)]
    pub body: Option<Value>,
}

impl Alert {
    /// Incident channel recorded in this alert's custom details.
    #[must_use]
    pub fn channel_id(&self) -> Option<String> {
        let body = self.body.as_ref()?;
        body.get("details")
            .and_then(channel_from_details)
            .or_else(|| body.pointer("/cef_details/details").and_then(channel_from_details))
    }
}

// =============================================================================
// API types (internal)
// =============================================================================

#[derive(Debug, Serialize)]
struct ApiPayload<'a> {
    routing_key: &'a str,
    event_action: &'static str,
    payload: &'a EventPayload,
    #[serde(skip_serializing_if = "no_links")]
    links: &'a [EventLink],
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn no_links(links: &&[EventLink]) -> bool {
    links.is_empty()
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct ApiResponse {
    status: String,
    message: String,
    dedup_key: String,
}

#[derive(Debug, Deserialize)]
struct AlertsResponse {
    #[serde(default)]
    alerts: Vec<Alert>,
}
