//! Jira follow-up tickets.
//!
//! Creates one issue per incident through the REST API v2, authenticated
//! with an account email and API token.
//!
//! # Configuration
//!
//! - `JIRA_DOMAIN`: Atlassian domain (e.g. `your-domain.atlassian.net`)
//! - `JIRA_USER`: account email
//! - `JIRA_API_KEY`: API token
//! - `JIRA_PROJECT`: project key
//! - `JIRA_ISSUE_TYPE`: issue type name (default: `Epic`)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::TicketTracker;
use crate::config::JiraConfig;
use crate::error::{check_status, ClientError};
use crate::incident::{ChannelHandle, TicketHandle};

/// Jira REST client.
#[derive(Debug, Clone)]
pub struct JiraClient {
    base_url: String,
    user: String,
    api_key: String,
    project: String,
    issue_type: String,
    client: reqwest::Client,
}

impl JiraClient {
    #[must_use]
    pub fn new(config: &JiraConfig) -> Self {
        let domain = config.domain.trim_end_matches('/');
        let base_url = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        };

        Self {
            base_url,
            user: config.user.clone(),
            api_key: config.api_key.clone(),
            project: config.project.clone(),
            issue_type: config.issue_type.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the client at another instance.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Browse URL of an issue.
    #[must_use]
    pub fn issue_url(&self, key: &str) -> String {
        format!("{}/browse/{key}", self.base_url)
    }

    fn issue_request<'a>(
        &'a self,
        incident_name: &'a str,
        channel: &ChannelHandle,
        channel_url: &str,
    ) -> CreateIssueRequest<'a> {
        CreateIssueRequest {
            fields: IssueFields {
                project: KeyRef { key: &self.project },
                summary: incident_name,
                description: format!(
                    "Follow-up for incident {incident_name}.\nIncident channel: #{} ({channel_url})",
                    channel.name
                ),
                issuetype: NameRef {
                    name: &self.issue_type,
                },
            },
        }
    }
}

#[async_trait]
impl TicketTracker for JiraClient {
    async fn create_followup_ticket(
        &self,
        incident_name: &str,
        channel: &ChannelHandle,
        channel_url: &str,
    ) -> Result<TicketHandle, ClientError> {
        let request = self.issue_request(incident_name, channel, channel_url);

        debug!(project = %self.project, issue_type = %self.issue_type, "Creating Jira issue");

        let response = self
            .client
            .post(format!("{}/rest/api/2/issue", self.base_url))
            .basic_auth(&self.user, Some(&self.api_key))
            .json(&request)
            .send()
            .await?;

        let created: CreatedIssue = check_status("jira", response).await?.json().await?;
        debug!(key = %created.key, "Jira issue created");

        Ok(TicketHandle {
            url: self.issue_url(&created.key),
            key: created.key,
        })
    }
}

// =============================================================================
// Jira API types
// =============================================================================

#[derive(Debug, Serialize)]
struct CreateIssueRequest<'a> {
    fields: IssueFields<'a>,
}

#[derive(Debug, Serialize)]
struct IssueFields<'a> {
    project: KeyRef<'a>,
    summary: &'a str,
    description: String,
    issuetype: NameRef<'a>,
}

#[derive(Debug, Serialize)]
struct KeyRef<'a> {
    key: &'a str,
}

#[derive(Debug, Serialize)]
struct NameRef<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(domain: &str) -> JiraConfig {
        JiraConfig {
            domain: domain.to_string(),
            user: "bot@acme.test".to_string(),
            api_key: "secret".to_string(),
            project: "OPS".to_string(),
            issue_type: "Epic".to_string(),
        }
    }

    #[test]
    fn test_base_url_from_domain() {
        let client = JiraClient::new(&config("acme.atlassian.net"));
        assert_eq!(client.issue_url("OPS-1"), "https://acme.atlassian.net/browse/OPS-1");

        let client = JiraClient::new(&config("http://jira.internal/"));
        assert_eq!(client.issue_url("OPS-2"), "http://jira.internal/browse/OPS-2");
    }

    #[test]
    fn test_issue_request_body() {
        let client = JiraClient::new(&config("acme.atlassian.net"));
        let channel = ChannelHandle {
            name: "incident-2401020304".to_string(),
            id: "C123".to_string(),
        };
        let request = client.issue_request("DB down", &channel, "https://slack.test/C123");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["fields"]["project"], json!({ "key": "OPS" }));
        assert_eq!(json["fields"]["summary"], "DB down");
        assert_eq!(json["fields"]["issuetype"], json!({ "name": "Epic" }));
        assert!(json["fields"]["description"]
            .as_str()
            .unwrap()
            .contains("#incident-2401020304"));
    }
}
