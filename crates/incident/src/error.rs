//! Error types for provider clients and the HTTP boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors returned by outbound provider clients (chat, paging, Google, Jira, registry).
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("{service} returned {status}: {message}")]
    Api {
        /// Provider name
        service: &'static str,
        /// HTTP status code
        status: u16,
        /// Response body or provider error message
        message: String,
    },

    /// Slack answered `200` with `"ok": false`
    #[error("Slack API error: {0}")]
    Slack(String),

    /// A provider URL could not be built
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Provider accepted the request but reported it could not be fulfilled
    #[error("{service} could not complete the request: {reason}")]
    Unfulfilled {
        /// Provider name
        service: &'static str,
        /// Provider status or reason
        reason: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Provider response lacked a field we depend on
    #[error("{service} response missing {field}")]
    MissingField {
        /// Provider name
        service: &'static str,
        /// Missing field path
        field: &'static str,
    },
}

impl ClientError {
    /// HTTP status of an API error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Turn a non-success response into [`ClientError::Api`].
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(ClientError::Api {
        service,
        status: status.as_u16(),
        message,
    })
}

/// Errors surfaced to the slash-command caller.
#[derive(Debug, Error)]
pub enum IncidentError {
    /// Shared secret mismatch
    #[error("Invalid credentials")]
    Unauthorized,

    /// Wrong HTTP method
    #[error("Only POST requests are accepted")]
    MethodNotAllowed,

    /// The incident channel could not be created; nothing else can proceed
    #[error("Failed to create incident channel: {0}")]
    ChannelCreation(#[source] ClientError),
}

impl IncidentError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED"),
            Self::ChannelCreation(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CHANNEL_CREATION_FAILED")
            }
        }
    }
}

impl IntoResponse for IncidentError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            IncidentError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            IncidentError::MethodNotAllowed.into_response().status(),
            StatusCode::METHOD_NOT_ALLOWED
        );

        let err = IncidentError::ChannelCreation(ClientError::Slack("name_taken".to_string()));
        assert_eq!(err.to_string(), "Failed to create incident channel: Slack API error: name_taken");
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_client_error_status() {
        let err = ClientError::Api {
            service: "jira",
            status: 404,
            message: "not found".to_string(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(ClientError::Slack("x".to_string()).status(), None);
    }
}
