//! Inbound envelope model: the UI messages the agent service streams.
//!
//! Each SSE `data:` payload is a [`UiMessage`] carrying an id and a list of
//! parts. Parts are decoded leniently: anything that is not a recognised text
//! or `tool-*` part is kept as [`UiPart::Other`] so an unexpected shape never
//! aborts a stream.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Prefix of tool part type tags (`tool-<name>`).
pub const TOOL_PART_PREFIX: &str = "tool-";

/// Text part state marking a completed turn.
pub const TEXT_STATE_DONE: &str = "done";

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
    /// Tool response.
    Tool,
}

/// One streamed envelope from the agent service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiMessage {
    /// Message identifier; text state is tracked per id.
    #[serde(default)]
    pub id: String,
    /// Author role, when the upstream supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    /// Ordered message parts.
    #[serde(default)]
    pub parts: Vec<UiPart>,
}

impl UiMessage {
    /// Whether this message is a fully completed turn.
    ///
    /// A message qualifies when at least one of its text parts is in the
    /// `done` state.
    #[must_use]
    pub fn is_completed_turn(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, UiPart::Text(text) if text.is_done()))
    }

    /// Concatenated text of all text parts.
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                UiPart::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Final text of each message in a streamed reply.
///
/// Upstream re-sends the full text on every update, so only the latest text
/// per id is kept. Ids stay in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct ReplyTranscript {
    texts: Vec<(String, String)>,
}

impl ReplyTranscript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the text carried by an envelope, if any.
    pub fn observe(&mut self, message: &UiMessage) {
        if !message.parts.iter().any(|p| matches!(p, UiPart::Text(_))) {
            return;
        }
        let text = message.text();
        match self.texts.iter_mut().find(|(id, _)| *id == message.id) {
            Some((_, current)) => *current = text,
            None => self.texts.push((message.id.clone(), text)),
        }
    }

    /// Non-empty texts joined by a blank line.
    #[must_use]
    pub fn text(&self) -> String {
        self.texts
            .iter()
            .map(|(_, text)| text.as_str())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// A single message part.
#[derive(Debug, Clone, PartialEq)]
pub enum UiPart {
    /// Progressive text content.
    Text(TextPart),
    /// Tool invocation lifecycle update.
    Tool(ToolPart),
    /// Any other part, kept verbatim.
    Other(Value),
}

/// Text content of a message, re-sent in full on every update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextPart {
    /// Full text observed so far.
    pub text: String,
    /// `streaming`, `done`, or absent.
    pub state: Option<String>,
}

impl TextPart {
    /// Whether the part marks the end of the text.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state.as_deref() == Some(TEXT_STATE_DONE)
    }
}

/// Tool invocation part (`type: "tool-<name>"`).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPart {
    /// Tool name (the type tag without the `tool-` prefix).
    pub tool_name: String,
    /// Call identifier shared by every update of one invocation.
    pub tool_call_id: String,
    /// Lifecycle state.
    pub state: ToolState,
    /// Input payload.
    pub input: Value,
    /// Output payload, present once the tool has run.
    pub output: Option<Value>,
    /// Error message for failed invocations.
    pub error_text: Option<String>,
    /// Approval id for `approval-requested` updates.
    pub approval_id: Option<String>,
}

/// Lifecycle state of a tool part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolState {
    InputStreaming,
    InputAvailable,
    ApprovalRequested,
    OutputAvailable,
    OutputError,
    OutputDenied,
    /// A state this gateway does not route.
    Unknown(String),
}

impl ToolState {
    /// Wire representation of the state.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::InputStreaming => "input-streaming",
            Self::InputAvailable => "input-available",
            Self::ApprovalRequested => "approval-requested",
            Self::OutputAvailable => "output-available",
            Self::OutputError => "output-error",
            Self::OutputDenied => "output-denied",
            Self::Unknown(other) => other,
        }
    }
}

impl From<&str> for ToolState {
    fn from(value: &str) -> Self {
        match value {
            "input-streaming" => Self::InputStreaming,
            "input-available" => Self::InputAvailable,
            "approval-requested" => Self::ApprovalRequested,
            "output-available" => Self::OutputAvailable,
            "output-error" => Self::OutputError,
            "output-denied" => Self::OutputDenied,
            other => Self::Unknown(other.to_string()),
        }
    }
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

impl UiPart {
    /// Build a text part.
    #[must_use]
    pub fn text(text: impl Into<String>, state: Option<&str>) -> Self {
        Self::Text(TextPart {
            text: text.into(),
            state: state.map(ToString::to_string),
        })
    }

    /// Classify a raw JSON part.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::Other(value);
        };
        let Some(part_type) = str_field(obj, "type") else {
            return Self::Other(value);
        };

        if part_type == "text" {
            return Self::Text(TextPart {
                text: str_field(obj, "text").unwrap_or_default().to_string(),
                state: str_field(obj, "state").map(ToString::to_string),
            });
        }

        if let Some(tool_name) = part_type.strip_prefix(TOOL_PART_PREFIX) {
            let approval_id = obj
                .get("approval")
                .and_then(|a| a.get("id"))
                .and_then(Value::as_str)
                .map(ToString::to_string);
            return Self::Tool(ToolPart {
                tool_name: tool_name.to_string(),
                tool_call_id: str_field(obj, "toolCallId").unwrap_or_default().to_string(),
                state: ToolState::from(str_field(obj, "state").unwrap_or_default()),
                input: obj.get("input").cloned().unwrap_or(Value::Null),
                output: obj.get("output").cloned(),
                error_text: str_field(obj, "errorText").map(ToString::to_string),
                approval_id,
            });
        }

        Self::Other(value)
    }

    /// Render the part back into its wire shape.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(text) => {
                let mut obj = Map::new();
                obj.insert("type".into(), Value::from("text"));
                obj.insert("text".into(), Value::from(text.text.clone()));
                if let Some(state) = &text.state {
                    obj.insert("state".into(), Value::from(state.clone()));
                }
                Value::Object(obj)
            }
            Self::Tool(tool) => {
                let mut obj = Map::new();
                obj.insert(
                    "type".into(),
                    Value::from(format!("{TOOL_PART_PREFIX}{}", tool.tool_name)),
                );
                obj.insert("toolCallId".into(), Value::from(tool.tool_call_id.clone()));
                obj.insert("state".into(), Value::from(tool.state.as_str()));
                obj.insert("input".into(), tool.input.clone());
                if let Some(output) = &tool.output {
                    obj.insert("output".into(), output.clone());
                }
                if let Some(error_text) = &tool.error_text {
                    obj.insert("errorText".into(), Value::from(error_text.clone()));
                }
                if let Some(approval_id) = &tool.approval_id {
                    obj.insert(
                        "approval".into(),
                        serde_json::json!({ "id": approval_id }),
                    );
                }
                Value::Object(obj)
            }
            Self::Other(value) => value.clone(),
        }
    }
}

impl<'de> Deserialize<'de> for UiPart {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

impl Serialize for UiPart {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}
