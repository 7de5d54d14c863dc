//! Chat platform stand-in for dry-run mode.

use async_trait::async_trait;
use tracing::info;

use super::{slack, ChatPlatform, PostedMessage};
use crate::error::ClientError;
use crate::incident::ChannelHandle;
use crate::messages::ChatMessage;

/// Logs every chat operation instead of performing it.
#[derive(Debug, Clone, Default)]
pub struct DryRunChat {
    team_id: Option<String>,
}

impl DryRunChat {
    #[must_use]
    pub const fn new(team_id: Option<String>) -> Self {
        Self { team_id }
    }
}

#[async_trait]
impl ChatPlatform for DryRunChat {
    async fn create_channel(&self, name: &str) -> Result<ChannelHandle, ClientError> {
        info!(dry_run = true, channel = %name, "Would create channel");
        Ok(ChannelHandle {
            name: name.to_string(),
            id: format!("dry-run-{name}"),
        })
    }

    async fn set_topic(&self, channel_id: &str, topic: &str) -> Result<(), ClientError> {
        info!(dry_run = true, channel_id = %channel_id, topic = %topic, "Would set topic");
        Ok(())
    }

    async fn invite(&self, channel_id: &str, user_id: &str) -> Result<(), ClientError> {
        info!(dry_run = true, channel_id = %channel_id, user_id = %user_id, "Would invite user");
        Ok(())
    }

    async fn post_message(
        &self,
        channel: &str,
        message: &ChatMessage,
    ) -> Result<PostedMessage, ClientError> {
        info!(dry_run = true, channel = %channel, text = %message.text, "Would post message");
        Ok(PostedMessage {
            channel: channel.to_string(),
            ts: "0".to_string(),
        })
    }

    async fn pin_message(&self, channel_id: &str, ts: &str) -> Result<(), ClientError> {
        info!(dry_run = true, channel_id = %channel_id, ts = %ts, "Would pin message");
        Ok(())
    }

    fn channel_url(&self, channel_id: &str) -> String {
        slack::web_link(self.team_id.as_deref(), channel_id)
    }

    fn channel_app_link(&self, channel_id: &str) -> String {
        slack::app_link(self.team_id.as_deref(), channel_id)
    }
}
