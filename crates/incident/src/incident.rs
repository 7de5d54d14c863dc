//! Incident identity and the values produced by provider round trips.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format of the minute-resolution incident id.
const INCIDENT_ID_FORMAT: &str = "%y%m%d%H%M";

/// Slash-command payload that opens an incident.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Trigger {
    /// Free-text incident name; may be empty.
    #[serde(default)]
    pub text: String,
    /// Requester handle.
    #[serde(default)]
    pub user_name: String,
    /// Requester id.
    #[serde(default)]
    pub user_id: String,
}

/// Channel created for an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHandle {
    /// Channel name.
    pub name: String,
    /// Provider-assigned id used for every later call.
    pub id: String,
}

/// A single incident run. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Incident {
    /// Minute-resolution id derived from the trigger time.
    pub id: String,
    /// Incident title.
    pub name: String,
    /// Requester handle.
    pub creator_handle: String,
    /// Requester id.
    pub creator_id: String,
    /// Incident channel.
    pub channel: ChannelHandle,
    /// Trigger time.
    pub started_at: DateTime<Utc>,
}

/// Derive the incident id from the trigger time, e.g. `2401020304`.
///
/// Two incidents opened in the same minute share an id.
#[must_use]
pub fn incident_id(at: DateTime<Utc>) -> String {
    at.format(INCIDENT_ID_FORMAT).to_string()
}

/// Incident channel name: `prefix + incident id`.
#[must_use]
pub fn channel_name(prefix: &str, incident_id: &str) -> String {
    format!("{prefix}{incident_id}")
}

/// Incident title, defaulting to the channel name when none was given.
#[must_use]
pub fn incident_name(text: &str, channel_name: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        channel_name.to_string()
    } else {
        text.to_string()
    }
}

/// Conference call details parsed from the provider's entry points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceDetails {
    pub video_uri: Option<String>,
    pub video_label: Option<String>,
    pub phone_uri: Option<String>,
    pub phone_label: Option<String>,
    pub pin: Option<String>,
    pub region_code: Option<String>,
    pub more_numbers_uri: Option<String>,
}

/// Notes document allocated by the authoring API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHandle {
    pub id: String,
    pub url: String,
}

/// Follow-up ticket created in the issue tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketHandle {
    pub key: String,
    pub url: String,
}
