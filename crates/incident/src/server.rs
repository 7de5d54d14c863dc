//! HTTP server for the slash command and paging webhooks.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::FormRejection, State},
    response::Json,
    routing::{get, post},
    Form, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::acknowledge::{AckListener, AckOutcome, WebhookPayload};
use crate::config::Config;
use crate::error::IncidentError;
use crate::incident::Trigger;
use crate::messages;
use crate::orchestrator::{Integrations, Orchestrator};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Configuration.
    pub config: Arc<Config>,
    /// Incident workflow.
    pub orchestrator: Arc<Orchestrator>,
    /// Acknowledgment webhook handler.
    pub acknowledgments: Arc<AckListener>,
}

impl AppState {
    /// Wire the workflow and the acknowledgment listener to one set of integrations.
    #[must_use]
    pub fn new(config: Arc<Config>, integrations: Integrations) -> Self {
        let acknowledgments = AckListener::new(
            Arc::clone(&integrations.chat),
            integrations.alert_lookup.clone(),
            &config.acknowledgments,
        );

        Self {
            orchestrator: Arc::new(Orchestrator::new(Arc::clone(&config), integrations)),
            acknowledgments: Arc::new(acknowledgments),
            config,
        }
    }
}

/// Build the HTTP router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(slash_command).fallback(method_not_allowed))
        .route("/pagerduty", post(pagerduty_webhook).fallback(method_not_allowed))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Slash-command form body. Absent fields are empty.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SlashCommand {
    token: String,
    text: String,
    user_name: String,
    user_id: String,
}

/// Reply to the slash-command caller.
#[derive(Debug, Serialize)]
struct SlashResponse {
    text: String,
    incident_channel_id: String,
}

/// Compare the shared secret in constant time.
fn token_matches(given: &str, expected: &str) -> bool {
    given.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Open an incident.
async fn slash_command(
    State(state): State<AppState>,
    form: Result<Form<SlashCommand>, FormRejection>,
) -> Result<Json<SlashResponse>, IncidentError> {
    // An unreadable body carries no token.
    let Form(command) = form.map_err(|e| {
        warn!(error = %e, "Rejected slash command with unreadable body");
        IncidentError::Unauthorized
    })?;

    if !token_matches(&command.token, &state.config.slack.command_token) {
        warn!(user = %command.user_name, "Rejected slash command with invalid token");
        return Err(IncidentError::Unauthorized);
    }

    let trigger = Trigger {
        text: command.text,
        user_name: command.user_name,
        user_id: command.user_id,
    };

    info!(user = %trigger.user_name, text = %trigger.text, "Incident requested");

    let incident = state.orchestrator.open_incident(&trigger, Utc::now()).await?;

    Ok(Json(SlashResponse {
        text: messages::slash_response(&incident),
        incident_channel_id: incident.channel.id,
    }))
}

/// Handle `PagerDuty` webhooks.
///
/// Always answers `200` so the provider does not redeliver.
async fn pagerduty_webhook(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    match serde_json::from_slice::<WebhookPayload>(&body) {
        Ok(payload) => {
            let outcomes = state.acknowledgments.handle(&payload).await;
            let announced = outcomes
                .iter()
                .filter(|o| matches!(o, AckOutcome::Announced { .. }))
                .count();
            debug!(messages = outcomes.len(), announced, "PagerDuty webhook handled");
        }
        Err(e) => warn!(error = %e, "Ignoring malformed PagerDuty webhook"),
    }

    Json(json!({ "text": "OK" }))
}

/// Health check endpoint.
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn method_not_allowed() -> IncidentError {
    IncidentError::MethodNotAllowed
}
