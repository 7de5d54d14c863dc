//! In-memory fakes of the capability traits and shared test helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use incident::alerts::{AlertLookup, ChatPlatform, Page, Pager, PostedMessage};
use incident::google::{ConferenceProvider, NotesProvider, NotesRequest};
use incident::incident::{ChannelHandle, ConferenceDetails, DocumentHandle, TicketHandle};
use incident::messages::ChatMessage;
use incident::pm::{PostMortemEntry, PostMortemRegistry, TicketTracker};
use incident::{ClientError, Config, EnrichmentEvent, Incident};
use tokio::sync::broadcast;

/// Configuration with only the slash-command token and chat token set.
pub fn config(extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("SLACK_COMMAND_TOKEN".to_string(), "s3cret".to_string()),
        ("SLACK_API_TOKEN".to_string(), "xoxb-test".to_string()),
    ]);
    for (key, value) in extra {
        vars.insert((*key).to_string(), (*value).to_string());
    }
    Config::from_vars(|key| vars.get(key).cloned()).unwrap()
}

fn slack_error(method: &str) -> ClientError {
    ClientError::Slack(format!("{method}: fatal_error"))
}

// =============================================================================
// Chat
// =============================================================================

/// Records every chat call. Channel ids are fixed.
pub struct FakeChat {
    pub channel_id: String,
    pub fail_create: bool,
    pub fail_topic: bool,
    pub created: Mutex<Vec<String>>,
    pub topics: Mutex<Vec<(String, String)>>,
    pub invites: Mutex<Vec<(String, String)>>,
    pub posts: Mutex<Vec<(String, ChatMessage)>>,
    pub pins: Mutex<Vec<(String, String)>>,
}

impl FakeChat {
    pub fn new(channel_id: &str) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            fail_create: false,
            fail_topic: false,
            created: Mutex::new(vec![]),
            topics: Mutex::new(vec![]),
            invites: Mutex::new(vec![]),
            posts: Mutex::new(vec![]),
            pins: Mutex::new(vec![]),
        }
    }

    pub fn failing_create() -> Self {
        Self {
            fail_create: true,
            ..Self::new("C123")
        }
    }

    /// Posts to a channel whose text contains `needle`.
    pub fn posts_containing(&self, channel: &str, needle: &str) -> Vec<ChatMessage> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, m)| c == channel && m.full_text().contains(needle))
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatPlatform for FakeChat {
    async fn create_channel(&self, name: &str) -> Result<ChannelHandle, ClientError> {
        self.created.lock().unwrap().push(name.to_string());
        if self.fail_create {
            return Err(ClientError::Slack("conversations.create: name_taken".to_string()));
        }
        Ok(ChannelHandle {
            name: name.to_string(),
            id: self.channel_id.clone(),
        })
    }

    async fn set_topic(&self, channel_id: &str, topic: &str) -> Result<(), ClientError> {
        if self.fail_topic {
            return Err(slack_error("conversations.setTopic"));
        }
        self.topics
            .lock()
            .unwrap()
            .push((channel_id.to_string(), topic.to_string()));
        Ok(())
    }

    async fn invite(&self, channel_id: &str, user_id: &str) -> Result<(), ClientError> {
        self.invites
            .lock()
            .unwrap()
            .push((channel_id.to_string(), user_id.to_string()));
        Ok(())
    }

    async fn post_message(
        &self,
        channel: &str,
        message: &ChatMessage,
    ) -> Result<PostedMessage, ClientError> {
        let mut posts = self.posts.lock().unwrap();
        posts.push((channel.to_string(), message.clone()));
        Ok(PostedMessage {
            channel: channel.to_string(),
            ts: format!("1700000000.{:06}", posts.len()),
        })
    }

    async fn pin_message(&self, channel_id: &str, ts: &str) -> Result<(), ClientError> {
        self.pins
            .lock()
            .unwrap()
            .push((channel_id.to_string(), ts.to_string()));
        Ok(())
    }

    fn channel_url(&self, channel_id: &str) -> String {
        format!("https://slack.test/archives/{channel_id}")
    }

    fn channel_app_link(&self, channel_id: &str) -> String {
        format!("slack://channel?id={channel_id}")
    }
}

// =============================================================================
// Enrichment providers
// =============================================================================

pub struct FakePager {
    pub fail: bool,
    pub pages: Mutex<Vec<Page>>,
}

impl FakePager {
    pub fn new() -> Self {
        Self {
            fail: false,
            pages: Mutex::new(vec![]),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl Pager for FakePager {
    fn name(&self) -> &'static str {
        "fake-pager"
    }

    async fn trigger(&self, page: &Page) -> Result<(), ClientError> {
        self.pages.lock().unwrap().push(page.clone());
        if self.fail {
            return Err(ClientError::Api {
                service: "fake-pager",
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

pub struct FakeConference {
    pub details: ConferenceDetails,
    pub calls: AtomicUsize,
}

impl FakeConference {
    pub fn new(video_uri: &str) -> Self {
        Self {
            details: ConferenceDetails {
                video_uri: Some(video_uri.to_string()),
                video_label: Some(video_uri.trim_start_matches("https://").to_string()),
                ..ConferenceDetails::default()
            },
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ConferenceProvider for FakeConference {
    async fn create_event_with_conference(
        &self,
        _incident: &Incident,
        _channel_url: &str,
    ) -> Result<ConferenceDetails, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.details.clone())
    }
}

pub struct FakeNotes {
    pub document: DocumentHandle,
    pub requests: Mutex<Vec<NotesRequest>>,
}

impl FakeNotes {
    pub fn new(id: &str, url: &str) -> Self {
        Self {
            document: DocumentHandle {
                id: id.to_string(),
                url: url.to_string(),
            },
            requests: Mutex::new(vec![]),
        }
    }
}

#[async_trait]
impl NotesProvider for FakeNotes {
    async fn create_notes_document(
        &self,
        request: &NotesRequest,
    ) -> Result<DocumentHandle, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.document.clone())
    }
}

/// Ticket tracker that answers with a fixed key, or never answers.
pub struct FakeTickets {
    pub key: String,
    pub hang: bool,
    pub calls: AtomicUsize,
}

impl FakeTickets {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            hang: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new("NEVER-1")
        }
    }
}

#[async_trait]
impl TicketTracker for FakeTickets {
    async fn create_followup_ticket(
        &self,
        _incident_name: &str,
        _channel: &ChannelHandle,
        _channel_url: &str,
    ) -> Result<TicketHandle, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(TicketHandle {
            key: self.key.clone(),
            url: format!("https://jira.test/browse/{}", self.key),
        })
    }
}

#[derive(Default)]
pub struct FakePostMortem {
    pub entries: Mutex<Vec<PostMortemEntry>>,
}

#[async_trait]
impl PostMortemRegistry for FakePostMortem {
    async fn record(&self, entry: &PostMortemEntry) -> Result<(), ClientError> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

/// Alert lookup backed by a map of provider incident id to channel id.
#[derive(Default)]
pub struct FakeLookup {
    pub channels: HashMap<String, String>,
    pub calls: AtomicUsize,
}

impl FakeLookup {
    pub fn with(incident_id: &str, channel_id: &str) -> Self {
        Self {
            channels: HashMap::from([(incident_id.to_string(), channel_id.to_string())]),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AlertLookup for FakeLookup {
    async fn channel_for_incident(&self, incident_id: &str) -> Result<Option<String>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.channels.get(incident_id).cloned())
    }
}

// =============================================================================
// Event stream
// =============================================================================

/// Receive events until `done` holds for the collected list, or time out.
pub async fn collect_events<F>(
    rx: &mut broadcast::Receiver<EnrichmentEvent>,
    done: F,
) -> Vec<EnrichmentEvent>
where
    F: Fn(&[EnrichmentEvent]) -> bool,
{
    let mut events = vec![];
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

    while !done(&events) {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Ok(event)) => events.push(event),
            Ok(Err(e)) => panic!("event stream closed: {e}"),
            Err(_) => panic!("timed out waiting for events, got {events:?}"),
        }
    }

    events
}
