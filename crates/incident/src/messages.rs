//! Chat messages posted by the incident workflow.
//!
//! Messages are Block Kit payloads with a plain-text fallback. Each builder
//! produces the message for one step of the workflow.

use serde::Serialize;

use crate::incident::{ConferenceDetails, DocumentHandle, Incident, TicketHandle};

/// Heading of the notes message.
pub const NOTES_HEADING: &str = "Notes & Actions";

/// A chat message: fallback text plus Block Kit blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Fallback for notifications and clients without block support
    pub text: String,
    /// Block Kit blocks
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
}

impl ChatMessage {
    /// Plain text message without blocks.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            blocks: vec![],
        }
    }

    /// Message rendered as a single markdown section.
    #[must_use]
    pub fn section(fallback: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            text: fallback.into(),
            blocks: vec![Block::Section {
                text: Text::mrkdwn(body),
            }],
        }
    }

    /// All text carried by the message, blocks included.
    #[must_use]
    pub fn full_text(&self) -> String {
        let mut out = self.text.clone();
        for block in &self.blocks {
            match block {
                Block::Section { text } => {
                    out.push('\n');
                    out.push_str(&text.text);
                }
                Block::Context { elements } => {
                    for element in elements {
                        out.push('\n');
                        out.push_str(&element.text);
                    }
                }
            }
        }
        out
    }
}

/// Block Kit block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Section block with text
    Section { text: Text },
    /// Context block for metadata
    Context { elements: Vec<Text> },
}

/// Block Kit text object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Text {
    #[serde(rename = "type")]
    text_type: &'static str,
    text: String,
}

impl Text {
    fn mrkdwn(text: impl Into<String>) -> Self {
        Self {
            text_type: "mrkdwn",
            text: text.into(),
        }
    }
}

/// Escape free text for Slack `mrkdwn`.
///
/// Slack treats `&`, `<` and `>` as control characters: left raw they form
/// mentions such as `<!channel>` or disguised links.
#[must_use]
pub fn escape_mrkdwn(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Channel topic for a new incident.
#[must_use]
pub fn topic(incident: &Incident) -> String {
    format!(
        "{} | reported by @{} | incident {}",
        escape_mrkdwn(&incident.name),
        escape_mrkdwn(&incident.creator_handle),
        incident.id
    )
}

/// First message in the incident channel.
#[must_use]
pub fn incident_opened(incident: &Incident) -> ChatMessage {
    ChatMessage {
        text: format!("Incident reported: {} ({})", escape_mrkdwn(&incident.name), incident.id),
        blocks: vec![
            Block::Section {
                text: Text::mrkdwn(format!(
                    ":rotating_light: *Incident reported:* {}",
                    escape_mrkdwn(&incident.name)
                )),
            },
            Block::Context {
                elements: vec![Text::mrkdwn(format!(
                    "Reported by <@{}> • {} UTC",
                    incident.creator_id,
                    incident.started_at.format("%Y-%m-%d %H:%M")
                ))],
            },
        ],
    }
}

/// Announcement posted to each broadcast channel.
#[must_use]
pub fn broadcast(incident: &Incident) -> ChatMessage {
    let name = escape_mrkdwn(&incident.name);
    ChatMessage::section(
        format!("New incident: {name}"),
        format!(
            ":rotating_light: New incident *{name}* reported by <@{}>. Join <#{}>",
            incident.creator_id, incident.channel.id
        ),
    )
}

/// Confirmation that the on-call responder was paged.
#[must_use]
pub fn paged(backend: &str) -> ChatMessage {
    ChatMessage::plain(format!(
        ":pager: On-call responder paged via {backend}"
    ))
}

/// Conference call details.
#[must_use]
pub fn conference(details: &ConferenceDetails) -> ChatMessage {
    let mut lines = vec![":telephone_receiver: *Conference call*".to_string()];

    if let Some(uri) = &details.video_uri {
        let label = escape_mrkdwn(details.video_label.as_deref().unwrap_or(uri));
        lines.push(format!("Video: <{uri}|{label}>"));
    }
    if let Some(uri) = &details.phone_uri {
        let label = escape_mrkdwn(details.phone_label.as_deref().unwrap_or(uri));
        let mut line = format!("Phone: <{uri}|{label}>");
        if let Some(region) = &details.region_code {
            line.push_str(&format!(" ({region})"));
        }
        if let Some(pin) = &details.pin {
            line.push_str(&format!(" PIN: {pin}"));
        }
        lines.push(line);
    }
    if let Some(uri) = &details.more_numbers_uri {
        lines.push(format!("More phone numbers: {uri}"));
    }

    ChatMessage::section(
        details
            .video_uri
            .as_ref()
            .map_or_else(|| "Conference call".to_string(), |uri| format!("Conference call: {uri}")),
        lines.join("\n"),
    )
}

/// Link to the notes document.
#[must_use]
pub fn notes(document: &DocumentHandle) -> ChatMessage {
    ChatMessage::section(
        format!("{NOTES_HEADING}: {}", document.url),
        format!(
            ":spiral_note_pad: *{NOTES_HEADING}*\nKeep the timeline and actions in <{}|the incident document>",
            document.url
        ),
    )
}

/// Link to the follow-up ticket.
#[must_use]
pub fn ticket(ticket: &TicketHandle) -> ChatMessage {
    ChatMessage::section(
        format!("Follow-up ticket {}: {}", ticket.key, ticket.url),
        format!(":ticket: *Follow-up ticket:* <{}|{}>", ticket.url, ticket.key),
    )
}

/// Announcement that the incident manager acknowledged the page.
#[must_use]
pub fn manager_joining(responder: Option<&str>) -> ChatMessage {
    let who = responder.map_or_else(|| "The incident manager".to_string(), escape_mrkdwn);
    ChatMessage::plain(format!(
        ":runner: {who} acknowledged the page and is joining the incident"
    ))
}

/// Text returned to the slash-command caller.
#[must_use]
pub fn slash_response(incident: &Incident) -> String {
    format!(
        "Incident *{}* opened in <#{}>",
        escape_mrkdwn(&incident.name),
        incident.channel.id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::ChannelHandle;
    use chrono::{TimeZone, Utc};

    fn incident() -> Incident {
        Incident {
            id: "2401020304".to_string(),
            name: "API latency".to_string(),
            creator_handle: "alice".to_string(),
            creator_id: "U1".to_string(),
            channel: ChannelHandle {
                name: "incident-2401020304".to_string(),
                id: "C123".to_string(),
            },
            started_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 0).unwrap(),
        }
    }

    #[test]
    fn test_topic() {
        assert_eq!(
            topic(&incident()),
            "API latency | reported by @alice | incident 2401020304"
        );
    }

    #[test]
    fn test_opened_message() {
        let message = incident_opened(&incident());
        assert_eq!(message.text, "Incident reported: API latency (2401020304)");
        assert!(message.full_text().contains("<@U1>"));
        assert!(message.full_text().contains("2024-01-02 03:04"));
    }

    #[test]
    fn test_conference_message_uses_labels() {
        let details = ConferenceDetails {
            video_uri: Some("https://meet.google.com/abc".to_string()),
            video_label: Some("meet.google.com/abc".to_string()),
            phone_uri: Some("tel:+31-20-000".to_string()),
            phone_label: Some("+31 20 000".to_string()),
            pin: Some("1234".to_string()),
            region_code: Some("NL".to_string()),
            more_numbers_uri: None,
        };
        let text = conference(&details).full_text();
        assert!(text.contains("<https://meet.google.com/abc|meet.google.com/abc>"));
        assert!(text.contains("<tel:+31-20-000|+31 20 000> (NL) PIN: 1234"));
        assert!(!text.contains("More phone numbers"));
    }

    #[test]
    fn test_notes_message() {
        let document = DocumentHandle {
            id: "D1".to_string(),
            url: "https://docs/D1".to_string(),
        };
        let message = notes(&document);
        assert!(message.text.starts_with(NOTES_HEADING));
        assert!(message.full_text().contains("https://docs/D1"));
    }

    #[test]
    fn test_manager_joining() {
        assert_eq!(
            manager_joining(Some("Bob")).text,
            ":runner: Bob acknowledged the page and is joining the incident"
        );
        assert!(manager_joining(None).text.starts_with(":runner: The incident manager"));
    }

    #[test]
    fn test_block_serialization() {
        let json = serde_json::to_value(broadcast(&incident())).unwrap();
        assert_eq!(json["blocks"][0]["type"], "section");
        assert_eq!(json["blocks"][0]["text"]["type"], "mrkdwn");

        let json = serde_json::to_value(ChatMessage::plain("hi")).unwrap();
        assert!(json.get("blocks").is_none());
    }

    #[test]
    fn test_user_text_is_escaped() {
        let mut hostile = incident();
        hostile.name = "<!channel> db & <http://evil|login>".to_string();
        let escaped = "&lt;!channel&gt; db &amp; &lt;http://evil|login&gt;";

        let message = broadcast(&hostile);
        assert!(!message.full_text().contains("<!channel>"));
        assert!(message.full_text().contains(&format!("*{escaped}*")));
        assert!(topic(&hostile).starts_with(escaped));
        assert!(incident_opened(&hostile).full_text().contains(escaped));
        assert!(slash_response(&hostile).contains(escaped));
        assert_eq!(
            manager_joining(Some("<!here>")).text,
            ":runner: &lt;!here&gt; acknowledged the page and is joining the incident"
        );
    }
}
