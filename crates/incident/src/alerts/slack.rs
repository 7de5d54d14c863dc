//! Slack Web API client.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{ChatPlatform, PostedMessage};
use crate::error::{check_status, ClientError};
use crate::incident::ChannelHandle;
use crate::messages::{Block, ChatMessage};

/// Slack Web API base URL.
const SLACK_API_URL: &str = "https://slack.com/api";

/// Slack Web API client authenticated with a bot token.
#[derive(Debug, Clone)]
pub struct SlackClient {
    token: String,
    team_id: Option<String>,
    api_url: String,
    client: reqwest::Client,
}

impl SlackClient {
    /// Create a client for the public Slack API.
    #[must_use]
    pub fn new(token: impl Into<String>, team_id: Option<String>) -> Self {
        Self {
            token: token.into(),
            team_id,
            api_url: SLACK_API_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the client at another API base URL.
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Call a Web API method and decode the payload of an `"ok": true` reply.
    async fn call<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<R, ClientError> {
        debug!(method = %method, "Calling Slack API");

        let response = self
            .client
            .post(format!("{}/{method}", self.api_url))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        if response.status().as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();
            warn!(method = %method, retry_after = %retry_after, "Rate limited by Slack");
        }

        let value: Value = check_status("slack", response).await?.json().await?;

        if value.get("ok").and_then(Value::as_bool) != Some(true) {
            let error = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            return Err(ClientError::Slack(format!("{method}: {error}")));
        }

        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl ChatPlatform for SlackClient {
    async fn create_channel(&self, name: &str) -> Result<ChannelHandle, ClientError> {
        let response: CreateChannelResponse = self
            .call("conversations.create", &json!({ "name": name }))
            .await?;

        debug!(channel_id = %response.channel.id, name = %response.channel.name, "Channel created");

        Ok(ChannelHandle {
            name: response.channel.name,
            id: response.channel.id,
        })
    }

    async fn set_topic(&self, channel_id: &str, topic: &str) -> Result<(), ClientError> {
        let _: Value = self
            .call(
                "conversations.setTopic",
                &json!({ "channel": channel_id, "topic": topic }),
            )
            .await?;
        Ok(())
    }

    async fn invite(&self, channel_id: &str, user_id: &str) -> Result<(), ClientError> {
        let _: Value = self
            .call(
                "conversations.invite",
                &json!({ "channel": channel_id, "users": user_id }),
            )
            .await?;
        Ok(())
    }

    async fn post_message(
        &self,
        channel: &str,
        message: &ChatMessage,
    ) -> Result<PostedMessage, ClientError> {
        let request = PostMessageRequest {
            channel,
            text: &message.text,
            blocks: &message.blocks,
        };
        let response: PostMessageResponse = self.call("chat.postMessage", &request).await?;

        Ok(PostedMessage {
            channel: response.channel,
            ts: response.ts,
        })
    }

    async fn pin_message(&self, channel_id: &str, ts: &str) -> Result<(), ClientError> {
        let _: Value = self
            .call("pins.add", &json!({ "channel": channel_id, "timestamp": ts }))
            .await?;
        Ok(())
    }

    fn channel_url(&self, channel_id: &str) -> String {
        web_link(self.team_id.as_deref(), channel_id)
    }

    fn channel_app_link(&self, channel_id: &str) -> String {
        app_link(self.team_id.as_deref(), channel_id)
    }
}

/// Web deep link to a channel.
pub(crate) fn web_link(team_id: Option<&str>, channel_id: &str) -> String {
    match team_id {
        Some(team) => format!("https://slack.com/app_redirect?channel={channel_id}&team={team}"),
        None => format!("https://slack.com/app_redirect?channel={channel_id}"),
    }
}

/// Native-app deep link to a channel.
pub(crate) fn app_link(team_id: Option<&str>, channel_id: &str) -> String {
    match team_id {
        Some(team) => format!("slack://channel?team={team}&id={channel_id}"),
        None => format!("slack://channel?id={channel_id}"),
    }
}

// =============================================================================
// Slack API types
// =============================================================================

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "no_blocks")]
    blocks: &'a [Block],
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn no_blocks(blocks: &&[Block]) -> bool {
    blocks.is_empty()
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    channel: String,
    ts: String,
}

#[derive(Debug, Deserialize)]
struct CreateChannelResponse {
    channel: SlackChannel,
}

#[derive(Debug, Deserialize)]
struct SlackChannel {
    id: String,
    name: String,
}
