//! Opsgenie (Atlassian) paging backend.
//!
//! Creates alerts through the Alert API. The incident channel links travel in
//! the alert `details` map, which Opsgenie only accepts as string values.
//!
//! # Configuration
//!
//! - `OPSGENIE_API_KEY`: Opsgenie API key
//! - `OPSGENIE_API_URL`: API URL (default: `https://api.opsgenie.com`)

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{Page, Pager};
use crate::error::{check_status, ClientError};

/// Opsgenie Alert API client.
#[derive(Debug, Clone)]
pub struct OpsgenieClient {
    api_key: String,
    api_url: String,
    client: reqwest::Client,
}

impl OpsgenieClient {
    /// Create a client for the given API base URL.
    #[must_use]
    pub fn new(api_key: String, api_url: String) -> Self {
        Self {
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn alert_request(page: &Page) -> AlertRequest {
        let details = BTreeMap::from([
            ("reporter".to_string(), page.reporter.clone()),
            ("slack_channel_id".to_string(), page.channel_id.clone()),
            ("slack_channel_url".to_string(), page.channel_url.clone()),
            ("slack_app_link".to_string(), page.channel_app_link.clone()),
        ]);

        AlertRequest {
            // Opsgenie caps the message at 130 characters
            message: page.summary.chars().take(130).collect(),
            alias: page.source.clone(),
            description: format!(
                "Incident reported by {} in {}",
                page.reporter, page.channel_url
            ),
            source: page.source.clone(),
            priority: "P1",
            details,
        }
    }
}

#[async_trait]
impl Pager for OpsgenieClient {
    fn name(&self) -> &'static str {
        "opsgenie"
    }

    async fn trigger(&self, page: &Page) -> Result<(), ClientError> {
        let request = Self::alert_request(page);

        debug!(alias = %request.alias, "Creating Opsgenie alert");

        let response = self
            .client
            .post(format!("{}/v2/alerts", self.api_url))
            .header("Authorization", format!("GenieKey {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        check_status("opsgenie", response).await?;
        debug!(alias = %request.alias, "Opsgenie alert accepted");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct AlertRequest {
    message: String,
    alias: String,
    description: String,
    source: String,
    priority: &'static str,
    details: BTreeMap<String, String>,
}
