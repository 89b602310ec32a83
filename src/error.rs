//! Gateway error type.
//!
//! Every fallible library operation returns [`GatewayError`]. HTTP handlers
//! return it directly; the [`IntoResponse`] impl maps each variant onto a
//! status code and a small JSON body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Errors produced while talking to the agent service or serving the game API.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The agent service answered with a non-success status.
    ///
    /// The display form is exactly the response body text.
    #[error("{message}")]
    Upstream {
        /// HTTP status returned by the agent service.
        status: u16,
        /// Raw response body.
        message: String,
    },

    /// The agent service answered without a body to stream.
    #[error("agent response has no body")]
    MissingBody,

    /// Connection-level failure while calling the agent service.
    #[error("agent transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The agent service returned a payload that does not match the wire format.
    #[error("invalid agent payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The incoming request is missing required fields.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No debate session exists with the given id.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A trader code failed validation.
    #[error("invalid trader code: {0}")]
    InvalidTraderCode(String),
}

/// Result alias used across the crate.
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

impl GatewayError {
    /// HTTP status used when this error reaches a client.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Upstream { .. } | Self::MissingBody | Self::Transport(_) | Self::Decode(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::InvalidRequest(_) | Self::InvalidTraderCode(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "Request rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
