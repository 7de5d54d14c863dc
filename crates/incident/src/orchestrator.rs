//! Incident workflow.
//!
//! Opening an incident creates its channel and returns as soon as the channel
//! exists. Everything else runs in spawned tasks that post their result into
//! the channel when the provider answers:
//!
//! - channel setup: topic, requester invite, intro message
//! - broadcast announcement to the configured channels
//! - on-call page
//! - calendar event with conference
//! - notes document
//! - follow-up ticket, then the post-mortem entry for it
//!
//! Branches are independent and best-effort. A failure is logged, published
//! as [`EnrichmentEvent::Failed`] and never affects another branch. Outcomes
//! are observable through [`Orchestrator::subscribe`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::alerts::{
    pager_for, AlertLookup, ChatPlatform, DryRunChat, Page, PagerDutyApi, Pager, SlackClient,
};
use crate::config::Config;
use crate::error::{ClientError, IncidentError};
use crate::events::{EnrichmentEvent, Integration};
use crate::google::{
    ConferenceProvider, GoogleCalendar, GoogleClient, GoogleDocs, GoogleEndpoints, NotesProvider,
    NotesRequest,
};
use crate::incident::{channel_name, incident_id, incident_name, Incident, Trigger};
use crate::messages::{self, ChatMessage};
use crate::pm::{
    JiraClient, PostMortemClient, PostMortemEntry, PostMortemRegistry, TicketTracker,
};

/// Capacity of the enrichment event channel.
const EVENT_CAPACITY: usize = 256;

/// Skip reason for every outbound integration in dry-run mode.
const DRY_RUN: &str = "dry run";

/// Collaborators used by the workflow. `None` disables an integration.
#[derive(Clone)]
pub struct Integrations {
    pub chat: Arc<dyn ChatPlatform>,
    pub pager: Option<Arc<dyn Pager>>,
    pub conference: Option<Arc<dyn ConferenceProvider>>,
    pub notes: Option<Arc<dyn NotesProvider>>,
    pub tickets: Option<Arc<dyn TicketTracker>>,
    pub post_mortem: Option<Arc<dyn PostMortemRegistry>>,
    pub alert_lookup: Option<Arc<dyn AlertLookup>>,
}

impl Integrations {
    /// Chat only; every other integration disabled.
    #[must_use]
    pub fn new(chat: Arc<dyn ChatPlatform>) -> Self {
        Self {
            chat,
            pager: None,
            conference: None,
            notes: None,
            tickets: None,
            post_mortem: None,
            alert_lookup: None,
        }
    }

    /// Build the production clients for a configuration.
    ///
    /// In dry-run mode chat goes to [`DryRunChat`] and no outbound
    /// integration is built.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let chat: Arc<dyn ChatPlatform> = match (&config.slack.api_token, config.dry_run) {
            (Some(token), false) => Arc::new(SlackClient::new(
                token.clone(),
                config.slack.team_id.clone(),
            )),
            _ => Arc::new(DryRunChat::new(config.slack.team_id.clone())),
        };

        let mut integrations = Self::new(chat);

        integrations.alert_lookup = config
            .acknowledgments
            .pagerduty_api_key
            .as_ref()
            .map(|key| Arc::new(PagerDutyApi::new(key.clone())) as Arc<dyn AlertLookup>);

        if config.dry_run {
            info!(dry_run = true, "Dry run: outbound integrations disabled");
            return integrations;
        }

        integrations.pager = config.paging.as_ref().map(pager_for);

        if let Some(google) = &config.google {
            let client = Arc::new(GoogleClient::new(google, GoogleEndpoints::default()));
            integrations.conference = Some(Arc::new(GoogleCalendar::new(Arc::clone(&client), google)));
            integrations.notes = Some(Arc::new(GoogleDocs::new(client, google)));
        }

        integrations.tickets = config
            .jira
            .as_ref()
            .map(|jira| Arc::new(JiraClient::new(jira)) as Arc<dyn TicketTracker>);
        integrations.post_mortem = config
            .post_mortem
            .as_ref()
            .map(|pm| Arc::new(PostMortemClient::new(pm)) as Arc<dyn PostMortemRegistry>);

        info!(
            paging = ?config.paging.as_ref().map(crate::config::PagingBackend::name),
            google = integrations.conference.is_some(),
            jira = integrations.tickets.is_some(),
            post_mortem = integrations.post_mortem.is_some(),
            "Integrations initialized"
        );

        integrations
    }

    #[must_use]
    pub fn with_pager(mut self, pager: Arc<dyn Pager>) -> Self {
        self.pager = Some(pager);
        self
    }

    #[must_use]
    pub fn with_conference(mut self, conference: Arc<dyn ConferenceProvider>) -> Self {
        self.conference = Some(conference);
        self
    }

    #[must_use]
    pub fn with_notes(mut self, notes: Arc<dyn NotesProvider>) -> Self {
        self.notes = Some(notes);
        self
    }

    #[must_use]
    pub fn with_tickets(mut self, tickets: Arc<dyn TicketTracker>) -> Self {
        self.tickets = Some(tickets);
        self
    }

    #[must_use]
    pub fn with_post_mortem(mut self, post_mortem: Arc<dyn PostMortemRegistry>) -> Self {
        self.post_mortem = Some(post_mortem);
        self
    }

    #[must_use]
    pub fn with_alert_lookup(mut self, alert_lookup: Arc<dyn AlertLookup>) -> Self {
        self.alert_lookup = Some(alert_lookup);
        self
    }
}

/// Opens incidents and fans out their enrichment.
pub struct Orchestrator {
    config: Arc<Config>,
    integrations: Integrations,
    events: broadcast::Sender<EnrichmentEvent>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(config: Arc<Config>, integrations: Integrations) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            integrations,
            events,
        }
    }

    /// Stream of enrichment outcomes for incidents opened from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EnrichmentEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub const fn integrations(&self) -> &Integrations {
        &self.integrations
    }

    /// Create the incident channel and start enrichment.
    ///
    /// Returns once the channel exists. Only channel creation can fail the
    /// call; enrichment keeps running after this returns.
    pub async fn open_incident(
        &self,
        trigger: &Trigger,
        now: DateTime<Utc>,
    ) -> Result<Incident, IncidentError> {
        let id = incident_id(now);
        let channel_name = channel_name(&self.config.slack.channel_prefix, &id);
        let name = incident_name(&trigger.text, &channel_name);

        let channel = self
            .integrations
            .chat
            .create_channel(&channel_name)
            .await
            .map_err(|e| {
                error!(incident_id = %id, channel = %channel_name, error = %e, "Failed to create incident channel");
                IncidentError::ChannelCreation(e)
            })?;

        info!(
            incident_id = %id,
            channel_id = %channel.id,
            channel = %channel.name,
            reporter = %trigger.user_name,
            "Incident channel created"
        );

        let incident = Incident {
            id,
            name,
            creator_handle: trigger.user_name.clone(),
            creator_id: trigger.user_id.clone(),
            channel,
            started_at: now,
        };

        self.dispatch(&incident);
        Ok(incident)
    }

    /// Spawn every enrichment branch for a freshly created channel.
    fn dispatch(&self, incident: &Incident) {
        let chat = Arc::clone(&self.integrations.chat);
        let run = Run {
            channel_url: chat.channel_url(&incident.channel.id),
            incident: Arc::new(incident.clone()),
            chat,
            events: self.events.clone(),
        };

        tokio::spawn(run.clone().setup_channel());
        tokio::spawn(run.clone().announce(self.config.slack.broadcast_channels.clone()));

        match self.enabled(self.integrations.pager.as_ref(), "no paging backend configured") {
            Ok(pager) => {
                tokio::spawn(run.clone().page(pager));
            }
            Err(reason) => run.skipped(Integration::Paging, reason),
        }

        match self.enabled(self.integrations.conference.as_ref(), "Google is not configured") {
            Ok(conference) => {
                tokio::spawn(run.clone().conference(conference));
            }
            Err(reason) => run.skipped(Integration::Conference, reason),
        }

        match self.enabled(self.integrations.notes.as_ref(), "Google is not configured") {
            Ok(notes) => {
                let request = NotesRequest {
                    file_name: notes_file_name(incident),
                    folder: self
                        .config
                        .google
                        .as_ref()
                        .and_then(|google| google.notes_folder.clone()),
                    title: incident.name.clone(),
                    author: incident.creator_handle.clone(),
                    started_at: incident.started_at,
                };
                tokio::spawn(run.clone().notes(notes, request));
            }
            Err(reason) => run.skipped(Integration::Notes, reason),
        }

        let registry = self.enabled(
            self.integrations.post_mortem.as_ref(),
            "no post-mortem registry configured",
        );
        match self.enabled(self.integrations.tickets.as_ref(), "no issue tracker configured") {
            Ok(tickets) => {
                tokio::spawn(run.ticket(tickets, registry));
            }
            Err(reason) => {
                run.skipped(Integration::Ticket, reason);
                run.skipped(Integration::PostMortem, "no follow-up ticket");
            }
        }
    }

    /// The integration if it may run, otherwise the reason it is skipped.
    fn enabled<T: ?Sized>(
        &self,
        integration: Option<&Arc<T>>,
        absent: &'static str,
    ) -> Result<Arc<T>, &'static str> {
        if self.config.dry_run {
            return Err(DRY_RUN);
        }
        integration.map(Arc::clone).ok_or(absent)
    }
}

/// Drive file name of the notes document.
fn notes_file_name(incident: &Incident) -> String {
    if incident.name == incident.channel.name {
        incident.channel.name.clone()
    } else {
        format!("{} {}", incident.channel.name, incident.name)
    }
}

/// State shared by the enrichment tasks of one incident.
#[derive(Clone)]
struct Run {
    incident: Arc<Incident>,
    chat: Arc<dyn ChatPlatform>,
    channel_url: String,
    events: broadcast::Sender<EnrichmentEvent>,
}

impl Run {
    fn publish(&self, event: EnrichmentEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn skipped(&self, integration: Integration, reason: &str) {
        info!(
            incident_id = %self.incident.id,
            integration = integration.as_str(),
            reason = %reason,
            "Integration skipped"
        );
        self.publish(EnrichmentEvent::Skipped {
            incident_id: self.incident.id.clone(),
            integration,
            reason: reason.to_string(),
        });
    }

    fn failed(&self, integration: Integration, error: &ClientError) {
        error!(
            incident_id = %self.incident.id,
            integration = integration.as_str(),
            error = %error,
            "Integration failed"
        );
        self.publish(EnrichmentEvent::Failed {
            incident_id: self.incident.id.clone(),
            integration,
            error: error.to_string(),
        });
    }

    /// Post an enrichment result into the incident channel.
    async fn post(&self, integration: Integration, message: &ChatMessage, pin: bool) {
        if let Err(e) = self.chat.send(&self.incident.channel.id, message, pin).await {
            warn!(
                incident_id = %self.incident.id,
                integration = integration.as_str(),
                error = %e,
                "Failed to post to incident channel"
            );
        }
    }

    async fn setup_channel(self) {
        let channel_id = &self.incident.channel.id;

        if let Err(e) = self
            .chat
            .set_topic(channel_id, &messages::topic(&self.incident))
            .await
        {
            self.failed(Integration::Topic, &e);
        }

        if self.incident.creator_id.is_empty() {
            self.skipped(Integration::Invite, "no requester id");
        } else if let Err(e) = self.chat.invite(channel_id, &self.incident.creator_id).await {
            self.failed(Integration::Invite, &e);
        }

        if let Err(e) = self
            .chat
            .send(channel_id, &messages::incident_opened(&self.incident), false)
            .await
        {
            self.failed(Integration::Intro, &e);
        }
    }

    async fn announce(self, channels: Vec<String>) {
        if channels.is_empty() {
            debug!(incident_id = %self.incident.id, "No broadcast channels configured");
            return;
        }

        let message = messages::broadcast(&self.incident);
        for channel in &channels {
            match self.chat.post_message(channel, &message).await {
                Ok(_) => debug!(incident_id = %self.incident.id, channel = %channel, "Incident announced"),
                Err(e) => self.failed(Integration::Broadcast, &e),
            }
        }
    }

    async fn page(self, pager: Arc<dyn Pager>) {
        let page = Page {
            summary: self.incident.name.clone(),
            source: self.incident.channel.name.clone(),
            reporter: self.incident.creator_handle.clone(),
            channel_id: self.incident.channel.id.clone(),
            channel_url: self.channel_url.clone(),
            channel_app_link: self.chat.channel_app_link(&self.incident.channel.id),
        };

        match pager.trigger(&page).await {
            Ok(()) => {
                info!(incident_id = %self.incident.id, backend = pager.name(), "On-call paged");
                self.post(Integration::Paging, &messages::paged(pager.name()), false)
                    .await;
                self.publish(EnrichmentEvent::Paged {
                    incident_id: self.incident.id.clone(),
                    backend: pager.name(),
                });
            }
            Err(e) => self.failed(Integration::Paging, &e),
        }
    }

    async fn conference(self, provider: Arc<dyn ConferenceProvider>) {
        match provider
            .create_event_with_conference(&self.incident, &self.channel_url)
            .await
        {
            Ok(details) => {
                self.post(Integration::Conference, &messages::conference(&details), true)
                    .await;
                self.publish(EnrichmentEvent::ConferenceReady {
                    incident_id: self.incident.id.clone(),
                    details,
                });
            }
            Err(e) => self.failed(Integration::Conference, &e),
        }
    }

    async fn notes(self, provider: Arc<dyn NotesProvider>, request: NotesRequest) {
        match provider.create_notes_document(&request).await {
            Ok(document) => {
                info!(incident_id = %self.incident.id, document_id = %document.id, "Notes document ready");
                self.post(Integration::Notes, &messages::notes(&document), true)
                    .await;
                self.publish(EnrichmentEvent::NotesReady {
                    incident_id: self.incident.id.clone(),
                    document,
                });
            }
            Err(e) => self.failed(Integration::Notes, &e),
        }
    }

    async fn ticket(
        self,
        tracker: Arc<dyn TicketTracker>,
        registry: Result<Arc<dyn PostMortemRegistry>, &'static str>,
    ) {
        let ticket = match tracker
            .create_followup_ticket(&self.incident.name, &self.incident.channel, &self.channel_url)
            .await
        {
            Ok(ticket) => ticket,
            Err(e) => {
                self.failed(Integration::Ticket, &e);
                self.skipped(Integration::PostMortem, "no follow-up ticket");
                return;
            }
        };

        info!(incident_id = %self.incident.id, ticket = %ticket.key, "Follow-up ticket created");
        self.post(Integration::Ticket, &messages::ticket(&ticket), false)
            .await;
        self.publish(EnrichmentEvent::TicketCreated {
            incident_id: self.incident.id.clone(),
            ticket: ticket.clone(),
        });

        let registry = match registry {
            Ok(registry) => registry,
            Err(reason) => {
                self.skipped(Integration::PostMortem, reason);
                return;
            }
        };

        match registry
            .record(&PostMortemEntry::new(&self.incident, &ticket))
            .await
        {
            Ok(()) => self.publish(EnrichmentEvent::PostMortemRecorded {
                incident_id: self.incident.id.clone(),
                ticket_key: ticket.key,
            }),
            Err(e) => self.failed(Integration::PostMortem, &e),
        }
    }
}
