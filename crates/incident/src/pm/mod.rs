//! Follow-up tracking for incidents.
//!
//! - [`jira::JiraClient`] opens the follow-up ticket ([`TicketTracker`]).
//! - [`postmortem::PostMortemClient`] records the incident in an external
//!   post-mortem log once a ticket exists ([`PostMortemRegistry`]).
//!
//! Both are optional: with no `JIRA_DOMAIN` no ticket is created, and with no
//! `POST_MORTEM_URL` nothing is registered.

pub mod jira;
pub mod postmortem;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ClientError;
use crate::incident::{ChannelHandle, Incident, TicketHandle};

pub use jira::JiraClient;
pub use postmortem::PostMortemClient;

/// Issue tracker holding incident follow-up work.
#[async_trait]
pub trait TicketTracker: Send + Sync {
    /// Create the follow-up ticket for an incident channel.
    async fn create_followup_ticket(
        &self,
        incident_name: &str,
        channel: &ChannelHandle,
        channel_url: &str,
    ) -> Result<TicketHandle, ClientError>;
}

/// Incident entry in the post-mortem log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostMortemEntry {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub ticket_key: String,
    pub ticket_url: String,
    pub channel_id: String,
    pub channel_name: String,
}

impl PostMortemEntry {
    #[must_use]
    pub fn new(incident: &Incident, ticket: &TicketHandle) -> Self {
        Self {
            name: incident.name.clone(),
            created_at: incident.started_at,
            ticket_key: ticket.key.clone(),
            ticket_url: ticket.url.clone(),
            channel_id: incident.channel.id.clone(),
            channel_name: incident.channel.name.clone(),
        }
    }
}

/// External log of incidents awaiting a post-mortem.
#[async_trait]
pub trait PostMortemRegistry: Send + Sync {
    async fn record(&self, entry: &PostMortemEntry) -> Result<(), ClientError>;
}
