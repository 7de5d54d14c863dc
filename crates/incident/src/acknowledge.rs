//! Announces acknowledged pages in the incident channel.
//!
//! `PagerDuty` v2 webhooks carry a batch of `messages`. An
//! `incident.acknowledge` message from the incident-manager service is traced
//! back to its channel through the alert custom details written when the
//! page was triggered, and a "manager joining" message is posted there.
//!
//! Every message is handled on its own with no stored state, so a redelivered
//! webhook posts the announcement again.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, error, info};

use crate::alerts::{AlertLookup, ChatPlatform};
use crate::config::AckConfig;
use crate::messages;

/// Webhook event announced in the channel.
pub const ACKNOWLEDGE_EVENT: &str = "incident.acknowledge";

/// `PagerDuty` v2 webhook body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
}

/// One event in a webhook batch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookMessage {
    /// Event type, e.g. `incident.acknowledge`.
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub incident: Option<WebhookIncident>,
    #[serde(default)]
    pub log_entries: Vec<LogEntry>,
}

impl WebhookMessage {
    /// Name of whoever acted on the incident.
    #[must_use]
    pub fn responder(&self) -> Option<&str> {
        self.log_entries
            .iter()
            .find_map(|entry| entry.agent.as_ref()?.summary.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookIncident {
    pub id: String,
    #[serde(default)]
    pub service: Option<Reference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub agent: Option<Reference>,
}

/// `PagerDuty` object reference.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
}

/// What happened to one webhook message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// Announcement posted to the channel
    Announced {
        incident_id: String,
        channel_id: String,
    },
    /// Message not relevant or not traceable
    Ignored { reason: &'static str },
    /// Lookup or post failed
    Failed { error: String },
}

/// Handles acknowledgment webhooks.
pub struct AckListener {
    chat: Arc<dyn ChatPlatform>,
    lookup: Option<Arc<dyn AlertLookup>>,
    service_id: Option<String>,
}

impl AckListener {
    #[must_use]
    pub fn new(
        chat: Arc<dyn ChatPlatform>,
        lookup: Option<Arc<dyn AlertLookup>>,
        config: &AckConfig,
    ) -> Self {
        Self {
            chat,
            lookup,
            service_id: config.incident_manager_service_id.clone(),
        }
    }

    /// Handle every message of a webhook, in order.
    pub async fn handle(&self, payload: &WebhookPayload) -> Vec<AckOutcome> {
        let mut outcomes = Vec::with_capacity(payload.messages.len());
        for message in &payload.messages {
            outcomes.push(self.handle_message(message).await);
        }
        outcomes
    }

    async fn handle_message(&self, message: &WebhookMessage) -> AckOutcome {
        if message.event != ACKNOWLEDGE_EVENT {
            debug!(event = %message.event, "Ignoring webhook event");
            return AckOutcome::Ignored {
                reason: "not an acknowledgment",
            };
        }

        let Some(incident) = &message.incident else {
            return AckOutcome::Ignored {
                reason: "no incident in message",
            };
        };

        let Some(expected) = &self.service_id else {
            debug!(incident_id = %incident.id, "No incident manager service configured");
            return AckOutcome::Ignored {
                reason: "no incident manager service configured",
            };
        };

        let service = incident.service.as_ref().map(|s| s.id.as_str());
        if service != Some(expected.as_str()) {
            debug!(incident_id = %incident.id, service = ?service, "Acknowledgment from another service");
            return AckOutcome::Ignored {
                reason: "acknowledged on another service",
            };
        }

        let Some(lookup) = &self.lookup else {
            return AckOutcome::Ignored {
                reason: "no alert lookup configured",
            };
        };

        let channel_id = match lookup.channel_for_incident(&incident.id).await {
            Ok(Some(channel_id)) => channel_id,
            Ok(None) => {
                info!(incident_id = %incident.id, "No incident channel recorded on alerts");
                return AckOutcome::Ignored {
                    reason: "no incident channel on alerts",
                };
            }
            Err(e) => {
                error!(incident_id = %incident.id, error = %e, "Failed to look up incident alerts");
                return AckOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        let announcement = messages::manager_joining(message.responder());
        match self.chat.post_message(&channel_id, &announcement).await {
            Ok(_) => {
                info!(incident_id = %incident.id, channel_id = %channel_id, "Incident manager joining");
                AckOutcome::Announced {
                    incident_id: incident.id.clone(),
                    channel_id,
                }
            }
            Err(e) => {
                error!(channel_id = %channel_id, error = %e, "Failed to announce acknowledgment");
                AckOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
