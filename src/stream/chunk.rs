//! Outbound UI message chunks.
//!
//! These are the discrete updates the chat UI consumes: a `start`, text
//! lifecycle chunks keyed by message id, tool lifecycle chunks keyed by tool
//! call id, and a closing `finish`. Each chunk is sent as one SSE `data:` line.
//!
//! # Example
//!
//! ```rust
//! use mirror_debate_gateway::stream::{UiMessageChunk, encode_sse};
//!
//! let chunk = UiMessageChunk::TextDelta {
//!     id: "m1".to_string(),
//!     delta: "Hello".to_string(),
//! };
//! let sse = encode_sse(&chunk);
//! assert!(sse.starts_with("data: {\"type\":\"text-delta\""));
//! assert!(sse.ends_with("\n\n"));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stream terminator sent after the last chunk.
pub const SSE_DONE: &str = "data: [DONE]\n\n";

/// Header announcing the UI message stream protocol to the chat client.
pub const UI_MESSAGE_STREAM_HEADER: &str = "x-vercel-ai-ui-message-stream";

/// Protocol version sent in [`UI_MESSAGE_STREAM_HEADER`].
pub const UI_MESSAGE_STREAM_VERSION: &str = "v1";

/// A typed update for the chat UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum UiMessageChunk {
    /// Opens the assistant message.
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// First content for a text block.
    TextStart { id: String },
    /// Incremental text for a block.
    TextDelta { id: String, delta: String },
    /// Text block completed.
    TextEnd { id: String },
    /// Tool invocation input is known.
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    /// The tool needs user approval before running.
    ToolApprovalRequest {
        approval_id: String,
        tool_call_id: String,
    },
    /// Tool finished successfully.
    ToolOutputAvailable { tool_call_id: String, output: Value },
    /// Tool failed.
    ToolOutputError {
        tool_call_id: String,
        error_text: String,
    },
    /// Tool execution was denied.
    ToolOutputDenied { tool_call_id: String },
    /// Stream-level failure.
    Error { error_text: String },
    /// Closes the assistant message.
    Finish,
}

impl UiMessageChunk {
    /// Wire name of the chunk type.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::TextStart { .. } => "text-start",
            Self::TextDelta { .. } => "text-delta",
            Self::TextEnd { .. } => "text-end",
            Self::ToolInputAvailable { .. } => "tool-input-available",
            Self::ToolApprovalRequest { .. } => "tool-approval-request",
            Self::ToolOutputAvailable { .. } => "tool-output-available",
            Self::ToolOutputError { .. } => "tool-output-error",
            Self::ToolOutputDenied { .. } => "tool-output-denied",
            Self::Error { .. } => "error",
            Self::Finish => "finish",
        }
    }
}

/// Render a chunk as one SSE event.
pub fn encode_sse<T: Serialize + ?Sized>(chunk: &T) -> String {
    let json = serde_json::to_string(chunk).unwrap_or_else(|e| {
        serde_json::json!({ "type": "error", "errorText": e.to_string() }).to_string()
    });
    format!("data: {json}\n\n")
}
