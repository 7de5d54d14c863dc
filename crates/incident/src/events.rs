//! Enrichment outcome events published by the orchestrator.

use serde::Serialize;

use crate::incident::{ConferenceDetails, DocumentHandle, TicketHandle};

/// Side-effect integrations launched for an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Integration {
    Topic,
    Invite,
    Intro,
    Broadcast,
    Paging,
    Conference,
    Notes,
    Ticket,
    PostMortem,
}

impl Integration {
    /// Name used in log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Topic => "topic",
            Self::Invite => "invite",
            Self::Intro => "intro",
            Self::Broadcast => "broadcast",
            Self::Paging => "paging",
            Self::Conference => "conference",
            Self::Notes => "notes",
            Self::Ticket => "ticket",
            Self::PostMortem => "post_mortem",
        }
    }
}

/// Outcome of one enrichment branch.
///
/// Events from different branches arrive in no particular order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnrichmentEvent {
    /// On-call responder paged
    Paged {
        incident_id: String,
        backend: &'static str,
    },

    /// Conference details allocated and posted
    ConferenceReady {
        incident_id: String,
        details: ConferenceDetails,
    },

    /// Notes document created and posted
    NotesReady {
        incident_id: String,
        document: DocumentHandle,
    },

    /// Follow-up ticket created and posted
    TicketCreated {
        incident_id: String,
        ticket: TicketHandle,
    },

    /// Incident recorded in the post-mortem registry
    PostMortemRecorded {
        incident_id: String,
        ticket_key: String,
    },

    /// Integration intentionally not run
    Skipped {
        incident_id: String,
        integration: Integration,
        reason: String,
    },

    /// Integration failed; logged, never retried
    Failed {
        incident_id: String,
        integration: Integration,
        error: String,
    },
}

impl EnrichmentEvent {
    /// Incident this event belongs to.
    #[must_use]
    pub fn incident_id(&self) -> &str {
        match self {
            Self::Paged { incident_id, .. }
            | Self::ConferenceReady { incident_id, .. }
            | Self::NotesReady { incident_id, .. }
            | Self::TicketCreated { incident_id, .. }
            | Self::PostMortemRecorded { incident_id, .. }
            | Self::Skipped { incident_id, .. }
            | Self::Failed { incident_id, .. } => incident_id,
        }
    }

    /// Integration that produced this event.
    #[must_use]
    pub const fn integration(&self) -> Integration {
        match self {
            Self::Paged { .. } => Integration::Paging,
            Self::ConferenceReady { .. } => Integration::Conference,
            Self::NotesReady { .. } => Integration::Notes,
            Self::TicketCreated { .. } => Integration::Ticket,
            Self::PostMortemRecorded { .. } => Integration::PostMortem,
            Self::Skipped { integration, .. } | Self::Failed { integration, .. } => *integration,
        }
    }
}
