//! Slash-command incident response service.
//!
//! This crate provides:
//! - Incident workflow: channel creation and best-effort enrichment fan-out
//! - Slack, `PagerDuty` and Opsgenie clients
//! - Google Calendar conference and Google Docs notes clients
//! - Jira follow-up tickets and post-mortem registration
//! - `PagerDuty` acknowledgment announcements
//! - HTTP server for the slash command and webhooks (standalone service)

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Most provider calls can fail

pub mod acknowledge;
pub mod alerts;
pub mod config;
pub mod error;
pub mod events;
pub mod google;
mod http;
pub mod incident;
pub mod messages;
pub mod orchestrator;
pub mod pm;
pub mod server;

pub use config::Config;
pub use error::{ClientError, IncidentError};
pub use events::{EnrichmentEvent, Integration};
pub use incident::{Incident, Trigger};
pub use orchestrator::{Integrations, Orchestrator};
