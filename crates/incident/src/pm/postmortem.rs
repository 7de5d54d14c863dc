//! Post-mortem registry client.
//!
//! Posts a JSON entry per incident to a configured endpoint, optionally
//! authenticated with a bearer key.

use async_trait::async_trait;
use tracing::debug;

use super::{PostMortemEntry, PostMortemRegistry};
use crate::config::PostMortemConfig;
use crate::error::{check_status, ClientError};

#[derive(Debug, Clone)]
pub struct PostMortemClient {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl PostMortemClient {
    #[must_use]
    pub fn new(config: &PostMortemConfig) -> Self {
        Self {
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PostMortemRegistry for PostMortemClient {
    async fn record(&self, entry: &PostMortemEntry) -> Result<(), ClientError> {
        let mut request = self.client.post(&self.url).json(entry);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        check_status("post-mortem", response).await?;

        debug!(ticket_key = %entry.ticket_key, "Post-mortem entry recorded");
        Ok(())
    }
}
