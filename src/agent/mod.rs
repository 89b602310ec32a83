//! Agent service client.
//!
//! The external agent service exposes two endpoints:
//!
//! - `POST /v1/agent/stream`: SSE stream of UI message envelopes
//! - `POST /v1/agent`: one-shot call returning `{"events": [...]}`
//!
//! The [`AgentTransport`] trait is the seam the HTTP handlers depend on;
//! [`HttpAgentClient`] is the reqwest implementation.
//!
//! # Example
//!
//! ```rust,ignore
//! use mirror_debate_gateway::agent::{AgentRequest, AgentSettings, AgentTransport, HttpAgentClient};
//!
//! let client = HttpAgentClient::new(AgentSettings::new("http://localhost:8000"));
//! let turns = client.send(AgentRequest::from_message("Is BTC overbought?")).await?;
//! ```

mod client;

pub use client::{HttpAgentClient, completed_turns};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GatewayError, Result};
use crate::stream::{ChunkStream, MessageRole, MessageStream, UiMessage, ui_chunk_stream};

/// Sub-agent that rules on each debate round.
pub const JUDGE_AGENT: &str = "judge";
/// Sub-agent that argues against the user.
pub const OPPONENT_AGENT: &str = "opp";
/// Toolkits the opponent uses to fetch market evidence.
pub const OPPONENT_TOOLKITS: [&str; 1] = ["crypto"];

/// Connection and default request settings for the agent service.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Base URL of the agent service (e.g. `http://localhost:8000`).
    pub base_url: String,
    /// Toolkits requested when the caller does not name any.
    pub default_toolkits: Vec<String>,
    /// Agent run timeout in seconds, forwarded when the caller sets none.
    pub timeout_secs: Option<f64>,
    /// Default LLM provider.
    pub provider: Option<String>,
    /// Default model.
    pub model: Option<String>,
}

impl AgentSettings {
    /// Settings with only a base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_toolkits: Vec::new(),
            timeout_secs: None,
            provider: None,
            model: None,
        }
    }
}

/// A plain role/content chat message as the agent service accepts it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Configuration of a delegated sub-agent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubAgentSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolkits: Option<Vec<String>>,
}

impl SubAgentSpec {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Caller specs plus the judge and opponent, each added only when absent.
#[must_use]
pub fn with_debate_sub_agents(specs: Option<Vec<SubAgentSpec>>) -> Vec<SubAgentSpec> {
    let mut specs = specs.unwrap_or_default();
    if !specs.iter().any(|s| s.name == OPPONENT_AGENT) {
        specs.push(SubAgentSpec {
            toolkits: Some(OPPONENT_TOOLKITS.iter().map(ToString::to_string).collect()),
            ..SubAgentSpec::named(OPPONENT_AGENT)
        });
    }
    if !specs.iter().any(|s| s.name == JUDGE_AGENT) {
        specs.push(SubAgentSpec::named(JUDGE_AGENT));
    }
    specs
}

/// Request body for both agent endpoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolkits: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_agents: Option<Vec<SubAgentSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    /// Additional fields passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentRequest {
    /// Request carrying a single user message.
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Request carrying a message history.
    #[must_use]
    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages: Some(messages),
            ..Self::default()
        }
    }

    /// Reject requests the agent service would refuse.
    pub fn validate(&self) -> Result<()> {
        let has_message = self.message.as_deref().is_some_and(|m| !m.is_empty());
        let has_messages = self.messages.as_ref().is_some_and(|m| !m.is_empty());
        if has_message || has_messages {
            Ok(())
        } else {
            Err(GatewayError::InvalidRequest(
                "message or messages required".to_string(),
            ))
        }
    }

    /// Fill unset fields from the configured defaults.
    #[must_use]
    pub fn with_defaults(mut self, settings: &AgentSettings) -> Self {
        if self.toolkits.is_none() && !settings.default_toolkits.is_empty() {
            self.toolkits = Some(settings.default_toolkits.clone());
        }
        if self.timeout.is_none() {
            self.timeout = settings.timeout_secs;
        }
        if self.provider.is_none() {
            self.provider.clone_from(&settings.provider);
        }
        if self.model.is_none() {
            self.model.clone_from(&settings.model);
        }
        self
    }
}

/// Transport to the agent service.
#[async_trait::async_trait]
pub trait AgentTransport: Send + Sync {
    /// Open a streaming call and return the decoded envelopes.
    ///
    /// # Errors
    ///
    /// Fails before any envelope is produced when the request is invalid,
    /// the connection fails, or the service answers with a non-success
    /// status.
    async fn stream_messages(&self, req: AgentRequest) -> Result<MessageStream>;

    /// Open a streaming call translated into UI chunks.
    async fn stream(&self, req: AgentRequest) -> Result<ChunkStream> {
        let messages = self.stream_messages(req).await?;
        Ok(Box::pin(ui_chunk_stream(messages)))
    }

    /// One-shot call returning only fully completed turns.
    async fn send(&self, req: AgentRequest) -> Result<Vec<UiMessage>>;

    /// Resume a previously opened stream. Streams are not resumable, so
    /// this reports that there is nothing to resume.
    async fn reconnect(&self, chat_id: &str) -> Result<Option<ChunkStream>> {
        tracing::debug!(chat_id = %chat_id, "No stream to resume");
        Ok(None)
    }
}
