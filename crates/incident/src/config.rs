//! Process-wide configuration for the incident service.
//!
//! Built once at startup and shared read-only as `Arc<Config>`. Every
//! integration is optional: when its settings are absent the integration is
//! disabled rather than failing.

use std::env;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::Deserialize;

/// Default incident channel prefix.
const DEFAULT_CHANNEL_PREFIX: &str = "incident-";

/// Default Opsgenie API base URL.
const DEFAULT_OPSGENIE_URL: &str = "https://api.opsgenie.com";

/// Incident service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,
    /// Log intended side effects instead of performing them.
    pub dry_run: bool,
    /// Chat platform settings.
    pub slack: SlackConfig,
    /// Selected paging backend, if any.
    pub paging: Option<PagingBackend>,
    /// Settings for the acknowledgment listener.
    pub acknowledgments: AckConfig,
    /// Issue tracker; `None` disables follow-up tickets.
    pub jira: Option<JiraConfig>,
    /// Google calendar/docs; `None` disables conference and notes.
    pub google: Option<GoogleConfig>,
    /// Post-mortem registry; `None` disables registration.
    pub post_mortem: Option<PostMortemConfig>,
}

/// Chat platform settings.
#[derive(Debug, Clone)]
pub struct SlackConfig {
    /// Slash-command shared secret.
    pub command_token: String,
    /// Bot token used for Web API calls.
    pub api_token: Option<String>,
    /// Workspace (team) id, used to build deep links.
    pub team_id: Option<String>,
    /// Prefix of every incident channel name.
    pub channel_prefix: String,
    /// Channels that receive a "new incident" announcement.
    pub broadcast_channels: Vec<String>,
}

/// Paging backend. Exactly one may be configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagingBackend {
    /// `PagerDuty` Events API v2.
    PagerDuty {
        /// Integration routing key.
        routing_key: String,
    },
    /// Opsgenie Alert API.
    Opsgenie {
        /// `GenieKey` API key.
        api_key: String,
        /// API base URL.
        api_url: String,
    },
}

impl PagingBackend {
    /// Backend name for logs and messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PagerDuty { .. } => "pagerduty",
            Self::Opsgenie { .. } => "opsgenie",
        }
    }
}

/// Acknowledgment listener settings.
#[derive(Debug, Clone, Default)]
pub struct AckConfig {
    /// `PagerDuty` REST API key used to read alert details.
    pub pagerduty_api_key: Option<String>,
    /// Service whose acknowledgments are announced.
    pub incident_manager_service_id: Option<String>,
}

/// Jira settings.
#[derive(Debug, Clone)]
pub struct JiraConfig {
    /// Atlassian domain, e.g. `acme.atlassian.net`.
    pub domain: String,
    /// Account email.
    pub user: String,
    /// API token.
    pub api_key: String,
    /// Project key.
    pub project: String,
    /// Issue type name of the follow-up ticket.
    pub issue_type: String,
}

/// Google OAuth2 and calendar/drive settings.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// OAuth2 client id.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
    /// Calendar receiving the incident event.
    pub calendar_id: String,
    /// Timezone of the incident event.
    pub calendar_timezone: String,
    /// Drive folder holding incident notes.
    pub notes_folder: Option<String>,
    /// Attempts made against a new document or conference while it settles.
    pub settle_attempts: u32,
    /// First backoff between settle attempts.
    pub settle_backoff: Duration,
}

/// Post-mortem registry settings.
#[derive(Debug, Clone)]
pub struct PostMortemConfig {
    /// Registry endpoint.
    pub url: String,
    /// Optional bearer key.
    pub api_key: Option<String>,
}

/// Shape of the legacy `GOOGLE_AUTHORIZATION_TOKEN` JSON blob.
#[derive(Deserialize)]
struct StoredGoogleToken {
    refresh_token: Option<String>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// Empty values are treated as unset.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let flag = |key: &str| var(key).is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1");

        let dry_run = flag("DRY_RUN");

        let Some(command_token) = var("SLACK_COMMAND_TOKEN") else {
            bail!("SLACK_COMMAND_TOKEN must be set");
        };
        let api_token = var("SLACK_API_TOKEN");
        if api_token.is_none() && !dry_run {
            bail!("SLACK_API_TOKEN must be set unless DRY_RUN is enabled");
        }

        let slack = SlackConfig {
            command_token,
            api_token,
            team_id: var("SLACK_TEAM_ID"),
            channel_prefix: var("SLACK_INCIDENT_CHANNEL_PREFIX")
                .unwrap_or_else(|| DEFAULT_CHANNEL_PREFIX.to_string()),
            broadcast_channels: var("SLACK_BROADCAST_CHANNELS")
                .map(|s| {
                    s.split(',')
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        };

        let paging = match (var("PAGERDUTY_ROUTING_KEY"), var("OPSGENIE_API_KEY")) {
            (Some(_), Some(_)) => {
                bail!("PAGERDUTY_ROUTING_KEY and OPSGENIE_API_KEY are mutually exclusive")
            }
            (Some(routing_key), None) => Some(PagingBackend::PagerDuty { routing_key }),
            (None, Some(api_key)) => Some(PagingBackend::Opsgenie {
                api_key,
                api_url: var("OPSGENIE_API_URL")
                    .unwrap_or_else(|| DEFAULT_OPSGENIE_URL.to_string()),
            }),
            (None, None) => None,
        };

        let acknowledgments = AckConfig {
            pagerduty_api_key: var("PAGERDUTY_API_KEY"),
            incident_manager_service_id: var("PAGERDUTY_INCIDENT_MANAGER_SERVICE_ID"),
        };

        let jira = match var("JIRA_DOMAIN") {
            None => None,
            Some(domain) => {
                let (Some(user), Some(api_key), Some(project)) =
                    (var("JIRA_USER"), var("JIRA_API_KEY"), var("JIRA_PROJECT"))
                else {
                    bail!("JIRA_DOMAIN is set but JIRA_USER, JIRA_API_KEY or JIRA_PROJECT is missing");
                };
                Some(JiraConfig {
                    domain,
                    user,
                    api_key,
                    project,
                    issue_type: var("JIRA_ISSUE_TYPE").unwrap_or_else(|| "Epic".to_string()),
                })
            }
        };

        let google = match (var("GOOGLEAPI_CLIENT_ID"), var("GOOGLEAPI_CLIENT_SECRET")) {
            (None, None) => None,
            (Some(client_id), Some(client_secret)) => {
                let refresh_token = var("GOOGLE_REFRESH_TOKEN").or_else(|| {
                    var("GOOGLE_AUTHORIZATION_TOKEN")
                        .and_then(|raw| serde_json::from_str::<StoredGoogleToken>(&raw).ok())
                        .and_then(|t| t.refresh_token)
                });
                let Some(refresh_token) = refresh_token else {
                    bail!("Google client credentials are set but GOOGLE_REFRESH_TOKEN is missing");
                };
                Some(GoogleConfig {
                    client_id,
                    client_secret,
                    refresh_token,
                    calendar_id: var("GOOGLE_CALENDAR_ID").unwrap_or_else(|| "primary".to_string()),
                    calendar_timezone: var("GOOGLE_CALENDAR_TIMEZONE")
                        .unwrap_or_else(|| "Europe/Amsterdam".to_string()),
                    notes_folder: var("GOOGLE_DRIVE_INCIDENTS_FOLDER"),
                    settle_attempts: 5,
                    settle_backoff: Duration::from_millis(500),
                })
            }
            _ => bail!("GOOGLEAPI_CLIENT_ID and GOOGLEAPI_CLIENT_SECRET must be set together"),
        };

        let post_mortem = var("POST_MORTEM_URL").map(|url| PostMortemConfig {
            url,
            api_key: var("POST_MORTEM_API_KEY"),
        });

        let port = match var("PORT") {
            Some(raw) => match raw.parse() {
                Ok(port) => port,
                Err(_) => bail!("PORT must be a port number, got {raw:?}"),
            },
            None => 8080,
        };

        Ok(Self {
            port,
            dry_run,
            slack,
            paging,
            acknowledgments,
            jira,
            google,
            post_mortem,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    const BASE: [(&str, &str); 2] = [("SLACK_COMMAND_TOKEN", "secret"), ("SLACK_API_TOKEN", "xoxb-1")];

    #[test]
    fn test_minimal_config() {
        let config = load(&BASE).unwrap();
        assert_eq!(config.port, 8080);
        assert!(!config.dry_run);
        assert_eq!(config.slack.channel_prefix, "incident-");
        assert!(config.slack.broadcast_channels.is_empty());
        assert!(config.paging.is_none());
        assert!(config.jira.is_none());
        assert!(config.google.is_none());
        assert!(config.post_mortem.is_none());
    }

    #[test]
    fn test_command_token_required() {
        let err = load(&[("SLACK_API_TOKEN", "xoxb-1")]).unwrap_err();
        assert!(err.to_string().contains("SLACK_COMMAND_TOKEN"));
    }

    #[test]
    fn test_api_token_optional_in_dry_run() {
        assert!(load(&[("SLACK_COMMAND_TOKEN", "secret")]).is_err());

        let config = load(&[("SLACK_COMMAND_TOKEN", "secret"), ("DRY_RUN", "true")]).unwrap();
        assert!(config.dry_run);
        assert!(config.slack.api_token.is_none());
    }

    #[test]
    fn test_broadcast_channels_split() {
        let mut vars = BASE.to_vec();
        vars.push(("SLACK_BROADCAST_CHANNELS", " general, ops ,,sre"));
        let config = load(&vars).unwrap();
        assert_eq!(config.slack.broadcast_channels, vec!["general", "ops", "sre"]);
    }

    #[test]
    fn test_paging_backends_are_exclusive() {
        let mut vars = BASE.to_vec();
        vars.push(("PAGERDUTY_ROUTING_KEY", "rk"));
        let config = load(&vars).unwrap();
        assert_eq!(
            config.paging,
            Some(PagingBackend::PagerDuty {
                routing_key: "rk".to_string()
            })
        );

        vars.push(("OPSGENIE_API_KEY", "gk"));
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_opsgenie_default_url() {
        let mut vars = BASE.to_vec();
        vars.push(("OPSGENIE_API_KEY", "gk"));
        let config = load(&vars).unwrap();
        let backend = config.paging.unwrap();
        assert_eq!(backend.name(), "opsgenie");
        assert_eq!(
            backend,
            PagingBackend::Opsgenie {
                api_key: "gk".to_string(),
                api_url: "https://api.opsgenie.com".to_string()
            }
        );
    }

    #[test]
    fn test_partial_jira_is_an_error() {
        let mut vars = BASE.to_vec();
        vars.push(("JIRA_DOMAIN", "acme.atlassian.net"));
        assert!(load(&vars).is_err());

        vars.extend([("JIRA_USER", "ops@acme.io"), ("JIRA_API_KEY", "k"), ("JIRA_PROJECT", "OPS")]);
        let jira = load(&vars).unwrap().jira.unwrap();
        assert_eq!(jira.issue_type, "Epic");
        assert_eq!(jira.project, "OPS");
    }

    #[test]
    fn test_google_refresh_token_from_legacy_blob() {
        let mut vars = BASE.to_vec();
        vars.extend([
            ("GOOGLEAPI_CLIENT_ID", "cid"),
            ("GOOGLEAPI_CLIENT_SECRET", "csecret"),
            (
                "GOOGLE_AUTHORIZATION_TOKEN",
                r#"{"access_token":"ya29","refresh_token":"1//rt","scope":"x"}"#,
            ),
        ]);
        let google = load(&vars).unwrap().google.unwrap();
        assert_eq!(google.refresh_token, "1//rt");
        assert_eq!(google.calendar_id, "primary");
        assert_eq!(google.calendar_timezone, "Europe/Amsterdam");
        assert!(google.notes_folder.is_none());
    }

    #[test]
    fn test_google_requires_both_credentials() {
        let mut vars = BASE.to_vec();
        vars.push(("GOOGLEAPI_CLIENT_ID", "cid"));
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_empty_values_are_unset() {
        let mut vars = BASE.to_vec();
        vars.extend([("JIRA_DOMAIN", ""), ("PORT", "9000"), ("POST_MORTEM_URL", "  ")]);
        let config = load(&vars).unwrap();
        assert!(config.jira.is_none());
        assert!(config.post_mortem.is_none());
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        let mut vars = BASE.to_vec();
        vars.push(("PORT", "80a"));
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
