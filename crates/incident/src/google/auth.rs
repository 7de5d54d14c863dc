//! OAuth2 access tokens for the Google APIs.
//!
//! The service holds a long-lived refresh token and trades it for short-lived
//! access tokens, cached until shortly before they expire.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::GoogleEndpoints;
use crate::config::GoogleConfig;
use crate::error::{check_status, ClientError};

/// Scopes needed for calendar events and notes documents.
pub const SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/calendar.events",
    "https://www.googleapis.com/auth/documents",
    "https://www.googleapis.com/auth/drive.file",
];

/// Consent screen URL.
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Redirect target for the installed-app flow.
pub const REDIRECT_URI: &str = "http://localhost";

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Refresh-token based credentials shared by the calendar and docs clients.
#[derive(Debug)]
pub struct GoogleAuth {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    token_url: String,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl GoogleAuth {
    #[must_use]
    pub fn new(config: &GoogleConfig, endpoints: &GoogleEndpoints) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: config.refresh_token.clone(),
            token_url: endpoints.token_url.clone(),
            client: reqwest::Client::new(),
            cached: Mutex::new(None),
        }
    }

    /// A valid access token, refreshed when the cached one is about to expire.
    pub async fn access_token(&self) -> Result<String, ClientError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let token: TokenResponse = check_status("google-oauth", response).await?.json().await?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        debug!(expires_in_secs = lifetime.as_secs(), "Refreshed Google access token");

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        });

        Ok(token.access_token)
    }
}

/// Consent URL for the installed-app authorization flow.
#[must_use]
pub fn authorization_url(client_id: &str) -> String {
    let scope = SCOPES.join(" ");
    let params = [
        ("client_id", client_id),
        ("redirect_uri", REDIRECT_URI),
        ("response_type", "code"),
        ("access_type", "offline"),
        ("prompt", "consent"),
        ("scope", scope.as_str()),
    ];
    // Url::parse_with_params cannot fail on a constant base
    reqwest::Url::parse_with_params(AUTH_URL, &params)
        .map_or_else(|_| AUTH_URL.to_string(), |url| url.to_string())
}

/// Exchange an authorization code for tokens.
pub async fn exchange_code(
    client_id: &str,
    client_secret: &str,
    code: &str,
    endpoints: &GoogleEndpoints,
) -> Result<TokenResponse, ClientError> {
    let response = reqwest::Client::new()
        .post(&endpoints.token_url)
        .form(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("code", code),
            ("redirect_uri", REDIRECT_URI),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?;

    Ok(check_status("google-oauth", response).await?.json().await?)
}
