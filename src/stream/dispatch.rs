//! Part dispatcher: turns envelopes into UI message chunks.
//!
//! The agent re-sends the full text of a message on every update. The
//! dispatcher remembers the last full text per message id and emits only the
//! new suffix, so the concatenated deltas for an id equal its final text.
//! Tool parts are mapped by state; duplicate input notifications for the same
//! tool call are suppressed.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use super::chunk::UiMessageChunk;
use super::message::{TextPart, ToolPart, ToolState, UiMessage, UiPart};

/// Error text used when a failed tool part carries no message.
pub const DEFAULT_TOOL_ERROR: &str = "Tool execution failed";

/// Request-scoped translation state.
#[derive(Debug, Default)]
pub struct PartDispatcher {
    /// Last full text seen per message id.
    text_state: HashMap<String, String>,
    /// Ids that already emitted `text-start`.
    text_started: HashSet<String>,
    /// Ids that already emitted `text-end`.
    text_ended: HashSet<String>,
    /// Tool call ids that already emitted `tool-input-available`.
    tool_input_seen: HashSet<String>,
}

/// New text relative to what was already seen.
///
/// Returns the suffix when `current` extends `previous`, otherwise the whole
/// of `current` (full replacement).
#[must_use]
pub fn text_delta<'a>(previous: &str, current: &'a str) -> &'a str {
    current.strip_prefix(previous).unwrap_or(current)
}

impl PartDispatcher {
    /// Create a dispatcher with empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one envelope into zero or more chunks.
    pub fn dispatch(&mut self, message: &UiMessage) -> Vec<UiMessageChunk> {
        let mut out = Vec::new();
        for part in &message.parts {
            match part {
                UiPart::Text(text) => self.on_text(&message.id, text, &mut out),
                UiPart::Tool(tool) => self.on_tool(tool, &mut out),
                UiPart::Other(_) => {}
            }
        }
        out
    }

    /// Last full text observed for a message id.
    #[must_use]
    pub fn text_for(&self, id: &str) -> Option<&str> {
        self.text_state.get(id).map(String::as_str)
    }

    fn on_text(&mut self, id: &str, part: &TextPart, out: &mut Vec<UiMessageChunk>) {
        if self.text_ended.contains(id) {
            tracing::trace!(message_id = %id, "Ignoring text after text-end");
            return;
        }

        let delta = {
            let previous = self.text_state.get(id).map_or("", String::as_str);
            text_delta(previous, &part.text).to_string()
        };
        self.text_state.insert(id.to_string(), part.text.clone());

        if (!delta.is_empty() || part.is_done()) && self.text_started.insert(id.to_string()) {
            out.push(UiMessageChunk::TextStart { id: id.to_string() });
        }
        if !delta.is_empty() {
            out.push(UiMessageChunk::TextDelta {
                id: id.to_string(),
                delta,
            });
        }
        if part.is_done() {
            self.text_ended.insert(id.to_string());
            out.push(UiMessageChunk::TextEnd { id: id.to_string() });
        }
    }

    fn on_tool(&mut self, tool: &ToolPart, out: &mut Vec<UiMessageChunk>) {
        let tool_call_id = tool.tool_call_id.clone();
        match &tool.state {
            ToolState::InputAvailable | ToolState::InputStreaming => {
                if self.tool_input_seen.insert(tool_call_id.clone()) {
                    out.push(UiMessageChunk::ToolInputAvailable {
                        tool_call_id,
                        tool_name: tool.tool_name.clone(),
                        input: tool.input.clone(),
                    });
                }
            }
            ToolState::ApprovalRequested => {
                out.push(UiMessageChunk::ToolApprovalRequest {
                    approval_id: tool
                        .approval_id
                        .clone()
                        .unwrap_or_else(|| tool_call_id.clone()),
                    tool_call_id,
                });
            }
            ToolState::OutputAvailable => {
                out.push(UiMessageChunk::ToolOutputAvailable {
                    tool_call_id,
                    output: tool.output.clone().unwrap_or(Value::Null),
                });
            }
            ToolState::OutputError => {
                out.push(UiMessageChunk::ToolOutputError {
                    tool_call_id,
                    error_text: tool
                        .error_text
                        .clone()
                        .unwrap_or_else(|| DEFAULT_TOOL_ERROR.to_string()),
                });
            }
            ToolState::OutputDenied => {
                out.push(UiMessageChunk::ToolOutputDenied { tool_call_id });
            }
            ToolState::Unknown(state) => {
                tracing::trace!(tool_call_id = %tool.tool_call_id, state = %state, "Ignoring tool state");
            }
        }
    }
}
