//! Chat and on-call paging integrations.
//!
//! ## Chat
//!
//! - [`ChatPlatform`] is the capability the orchestrator needs from the chat
//!   platform: channels, topics, invites, messages and pins.
//! - [`slack::SlackClient`] implements it against the Slack Web API.
//! - [`dry_run::DryRunChat`] logs every call instead of performing it.
//!
//! ## Paging
//!
//! - [`Pager`] triggers an on-call alert carrying links back to the channel.
//! - [`pagerduty::PagerDutyClient`] (Events API v2) and
//!   [`opsgenie::OpsgenieClient`] (Alert API) implement it; exactly one is
//!   active, selected by [`PagingBackend`](crate::config::PagingBackend).
//! - [`AlertLookup`] recovers the incident channel from an acknowledged alert.
//!
//! # Configuration
//!
//! - `SLACK_API_TOKEN`: bot token for the Slack Web API
//! - `PAGERDUTY_ROUTING_KEY`: enables `PagerDuty` paging
//! - `OPSGENIE_API_KEY`: enables Opsgenie paging
//! - `PAGERDUTY_API_KEY`: enables acknowledgment lookups

pub mod dry_run;
pub mod opsgenie;
pub mod pagerduty;
pub mod slack;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::config::PagingBackend;
use crate::error::ClientError;
use crate::incident::ChannelHandle;
use crate::messages::ChatMessage;

pub use dry_run::DryRunChat;
pub use opsgenie::OpsgenieClient;
pub use pagerduty::{PagerDutyApi, PagerDutyClient};
pub use slack::SlackClient;

/// A message accepted by the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    /// Channel id the message landed in.
    pub channel: String,
    /// Message timestamp, the platform's message id.
    pub ts: String,
}

/// Operations the incident workflow needs from the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Create a channel.
    async fn create_channel(&self, name: &str) -> Result<ChannelHandle, ClientError>;

    /// Set the channel topic.
    async fn set_topic(&self, channel_id: &str, topic: &str) -> Result<(), ClientError>;

    /// Invite a user to the channel.
    async fn invite(&self, channel_id: &str, user_id: &str) -> Result<(), ClientError>;

    /// Post a message. `channel` may be an id or a channel name.
    async fn post_message(
        &self,
        channel: &str,
        message: &ChatMessage,
    ) -> Result<PostedMessage, ClientError>;

    /// Pin a previously posted message.
    async fn pin_message(&self, channel_id: &str, ts: &str) -> Result<(), ClientError>;

    /// Web link to a channel.
    fn channel_url(&self, channel_id: &str) -> String;

    /// Native-app deep link to a channel.
    fn channel_app_link(&self, channel_id: &str) -> String;

    /// Post a message and optionally pin it.
    ///
    /// A failed pin is logged; the message still counts as sent.
    async fn send(
        &self,
        channel: &str,
        message: &ChatMessage,
        pin: bool,
    ) -> Result<PostedMessage, ClientError> {
        let posted = self.post_message(channel, message).await?;

        if pin {
            if let Err(e) = self.pin_message(&posted.channel, &posted.ts).await {
                warn!(channel = %posted.channel, error = %e, "Failed to pin message");
            }
        }

        Ok(posted)
    }
}

/// On-call page for a new incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Alert summary.
    pub summary: String,
    /// Alert source, the incident channel name.
    pub source: String,
    /// Requester handle.
    pub reporter: String,
    /// Incident channel id.
    pub channel_id: String,
    /// Web link to the channel.
    pub channel_url: String,
    /// Native-app link to the channel.
    pub channel_app_link: String,
}

impl Page {
    /// Provider custom fields carrying the way back to the channel.
    #[must_use]
    pub fn custom_details(&self) -> serde_json::Value {
        json!({
            "reporter": self.reporter,
            "slack_channel_id": self.channel_id,
            "slack_channel_url": self.channel_url,
            "slack_app_link": self.channel_app_link,
        })
    }
}

/// On-call paging backend.
#[async_trait]
pub trait Pager: Send + Sync {
    /// Backend name.
    fn name(&self) -> &'static str;

    /// Trigger an alert.
    async fn trigger(&self, page: &Page) -> Result<(), ClientError>;
}

/// Resolves the incident channel recorded on an alert.
#[async_trait]
pub trait AlertLookup: Send + Sync {
    /// Channel id stored in the custom details of the incident's alerts.
    async fn channel_for_incident(&self, incident_id: &str) -> Result<Option<String>, ClientError>;
}

/// Build the pager for the configured backend.
#[must_use]
pub fn pager_for(backend: &PagingBackend) -> Arc<dyn Pager> {
    match backend {
        PagingBackend::PagerDuty { routing_key } => {
            Arc::new(PagerDutyClient::new(routing_key.clone()))
        }
        PagingBackend::Opsgenie { api_key, api_url } => {
            Arc::new(OpsgenieClient::new(api_key.clone(), api_url.clone()))
        }
    }
}

/// Channel id from a custom-details object written by [`Page::custom_details`].
#[must_use]
pub fn channel_from_details(details: &serde_json::Value) -> Option<String> {
    details
        .get("slack_channel_id")
        .and_then(serde_json::Value::as_str)
        .filter(|id| !id.is_empty())
        .map(String::from)
}
