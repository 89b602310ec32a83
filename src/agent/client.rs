//! reqwest implementation of [`AgentTransport`].

use serde::Deserialize;

use super::{AgentRequest, AgentSettings, AgentTransport};
use crate::error::{GatewayError, Result};
use crate::stream::{MessageStream, UiMessage, messages_from_bytes};

const STREAM_PATH: &str = "/v1/agent/stream";
const ONE_SHOT_PATH: &str = "/v1/agent";

/// Body of a one-shot agent response.
#[derive(Debug, Deserialize)]
struct OneShotResponse {
    #[serde(default)]
    events: Vec<UiMessage>,
}

/// HTTP client for the agent service.
#[derive(Clone)]
pub struct HttpAgentClient {
    http: reqwest::Client,
    settings: AgentSettings,
}

impl std::fmt::Debug for HttpAgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAgentClient")
            .field("settings", &self.settings)
            .finish()
    }
}

impl HttpAgentClient {
    /// Create a client with its own connection pool.
    #[must_use]
    pub fn new(settings: AgentSettings) -> Self {
        Self::with_client(reqwest::Client::new(), settings)
    }

    /// Create a client sharing an existing connection pool.
    #[must_use]
    pub fn with_client(http: reqwest::Client, settings: AgentSettings) -> Self {
        Self { http, settings }
    }

    /// Settings this client was built with.
    #[must_use]
    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.settings.base_url.trim_end_matches('/'))
    }

    async fn post(&self, path: &str, req: AgentRequest) -> Result<reqwest::Response> {
        req.validate()?;
        let body = req.with_defaults(&self.settings);
        let url = self.endpoint(path);

        tracing::debug!(
            url = %url,
            session_id = ?body.session_id,
            toolkits = ?body.toolkits,
            "Calling agent service"
        );

        let resp = self.http.post(&url).json(&body).send().await?;
        ensure_success(resp).await
    }
}

/// Turn a non-success response into [`GatewayError::Upstream`] carrying the
/// body text.
async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let message = resp.text().await.unwrap_or_else(|e| e.to_string());
    tracing::warn!(
        name: "agent.upstream.error",
        status = status.as_u16(),
        body_len = message.len(),
        "Agent service returned an error status"
    );
    Err(GatewayError::Upstream {
        status: status.as_u16(),
        message,
    })
}

/// Keep only fully completed turns.
#[must_use]
pub fn completed_turns(events: Vec<UiMessage>) -> Vec<UiMessage> {
    events
        .into_iter()
        .filter(UiMessage::is_completed_turn)
        .collect()
}

#[async_trait::async_trait]
impl AgentTransport for HttpAgentClient {
    async fn stream_messages(&self, req: AgentRequest) -> Result<MessageStream> {
        let resp = self.post(STREAM_PATH, req).await?;
        if resp.content_length() == Some(0) {
            return Err(GatewayError::MissingBody);
        }

        tracing::info!(name: "agent.stream.opened", status = resp.status().as_u16(), "Agent stream opened");
        Ok(messages_from_bytes(resp.bytes_stream()))
    }

    async fn send(&self, req: AgentRequest) -> Result<Vec<UiMessage>> {
        let resp = self.post(ONE_SHOT_PATH, req).await?;
        let text = resp.text().await?;
        let body: OneShotResponse = serde_json::from_str(&text)?;

        let total = body.events.len();
        let turns = completed_turns(body.events);
        tracing::debug!(total, completed = turns.len(), "Agent one-shot response");
        Ok(turns)
    }
}
