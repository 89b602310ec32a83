//! OpenAI-compatible chat completion chunks.
//!
//! Clients that speak the OpenAI chat API read the same agent envelopes as
//! `chat.completion.chunk` objects: text arrives as prefix-diffed `content`
//! deltas, each tool call is announced once in `tool_calls`, and tool results
//! are sent back as plain content. A closing chunk carries
//! `finish_reason: "stop"`.

use std::collections::{HashMap, HashSet};

use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::dispatch::text_delta;
use super::message::{MessageRole, ToolPart, ToolState, UiMessage, UiPart};
use crate::error::GatewayError;

/// `object` of a streamed chunk.
pub const CHUNK_OBJECT: &str = "chat.completion.chunk";
/// `object` of a one-shot completion.
pub const COMPLETION_OBJECT: &str = "chat.completion";
/// Finish reason sent on the closing chunk.
pub const FINISH_STOP: &str = "stop";

/// Identity shared by every chunk of one completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionMeta {
    pub id: String,
    pub created: i64,
    pub model: String,
}

impl CompletionMeta {
    /// Fresh `chatcmpl-` id stamped with the current time.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4()),
            created: chrono::Utc::now().timestamp(),
            model: model.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChoiceDelta,
    /// `null` until the closing chunk.
    pub finish_reason: Option<&'static str>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChoiceDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub index: u32,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments object.
    pub arguments: String,
}

/// Non-streaming completion body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: CompletionMessage,
    pub finish_reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionMessage {
    pub role: MessageRole,
    pub content: String,
}

impl Completion {
    /// Single-choice completion holding the final assistant text.
    #[must_use]
    pub fn from_text(meta: CompletionMeta, content: String) -> Self {
        Self {
            id: meta.id,
            object: COMPLETION_OBJECT,
            created: meta.created,
            model: meta.model,
            choices: vec![CompletionChoice {
                index: 0,
                message: CompletionMessage {
                    role: MessageRole::Assistant,
                    content,
                },
                finish_reason: FINISH_STOP,
            }],
        }
    }
}

/// Error frame for a stream that fails after the response head.
#[must_use]
pub fn error_body(error: &GatewayError) -> Value {
    json!({ "error": { "message": error.to_string(), "type": "upstream_error" } })
}

/// Request-scoped translation state for one completion.
#[derive(Debug)]
pub struct CompletionTranslator {
    meta: CompletionMeta,
    /// Last full text per message id.
    text_state: HashMap<String, String>,
    /// Tool call ids already announced.
    tool_calls_seen: HashSet<String>,
    role_sent: bool,
}

impl CompletionTranslator {
    #[must_use]
    pub fn new(meta: CompletionMeta) -> Self {
        Self {
            meta,
            text_state: HashMap::new(),
            tool_calls_seen: HashSet::new(),
            role_sent: false,
        }
    }

    /// Translate one envelope into zero or more chunks.
    pub fn translate(&mut self, message: &UiMessage) -> Vec<CompletionChunk> {
        let mut out = Vec::new();

        if message.parts.iter().any(|p| matches!(p, UiPart::Text(_))) {
            let text = message.text();
            let delta = {
                let previous = self.text_state.get(&message.id).map_or("", String::as_str);
                text_delta(previous, &text).to_string()
            };
            self.text_state.insert(message.id.clone(), text);

            // The first chunk always announces the role, even without text.
            if !delta.is_empty() || !self.role_sent {
                let content = (!delta.is_empty()).then_some(delta);
                out.push(self.chunk(ChoiceDelta {
                    content,
                    ..ChoiceDelta::default()
                }));
            }
        }

        for part in &message.parts {
            if let UiPart::Tool(tool) = part {
                self.on_tool(tool, &mut out);
            }
        }
        out
    }

    /// Closing chunk with an empty delta.
    #[must_use]
    pub fn finish(&self) -> CompletionChunk {
        CompletionChunk {
            id: self.meta.id.clone(),
            object: CHUNK_OBJECT,
            created: self.meta.created,
            model: self.meta.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChoiceDelta::default(),
                finish_reason: Some(FINISH_STOP),
            }],
        }
    }

    fn on_tool(&mut self, tool: &ToolPart, out: &mut Vec<CompletionChunk>) {
        let call_id = if tool.tool_call_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            tool.tool_call_id.clone()
        };

        match &tool.state {
            ToolState::InputAvailable | ToolState::InputStreaming | ToolState::ApprovalRequested => {
                if !self.tool_calls_seen.insert(call_id.clone()) {
                    return;
                }
                let args = if tool.input.is_object() {
                    tool.input.clone()
                } else {
                    json!({ "input": tool.input })
                };
                let call = ToolCall {
                    index: 0,
                    id: call_id,
                    kind: "function",
                    function: FunctionCall {
                        name: tool.tool_name.clone(),
                        arguments: args.to_string(),
                    },
                };
                out.push(self.chunk(ChoiceDelta {
                    tool_calls: Some(vec![call]),
                    ..ChoiceDelta::default()
                }));
            }
            ToolState::OutputAvailable | ToolState::OutputError => {
                let output = tool
                    .output
                    .clone()
                    .filter(|v| !v.is_null())
                    .or_else(|| tool.error_text.clone().map(Value::from))
                    .unwrap_or(Value::Null);
                let content = match output {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                tracing::debug!(tool_call_id = %call_id, tool = %tool.tool_name, state = tool.state.as_str(), "Tool result forwarded as content");
                out.push(self.chunk(ChoiceDelta {
                    content: Some(content),
                    ..ChoiceDelta::default()
                }));
            }
            ToolState::OutputDenied | ToolState::Unknown(_) => {}
        }
    }

    fn chunk(&mut self, mut delta: ChoiceDelta) -> CompletionChunk {
        if !self.role_sent {
            delta.role = Some(MessageRole::Assistant);
            self.role_sent = true;
        }
        CompletionChunk {
            id: self.meta.id.clone(),
            object: CHUNK_OBJECT,
            created: self.meta.created,
            model: self.meta.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: None,
            }],
        }
    }
}

/// Translate envelopes into completion chunks, ending with the `stop` chunk.
///
/// An input error is forwarded and ends the stream without the `stop` chunk.
pub fn completion_stream<S>(
    messages: S,
    meta: CompletionMeta,
) -> impl Stream<Item = Result<CompletionChunk, GatewayError>> + Send
where
    S: Stream<Item = Result<UiMessage, GatewayError>> + Send + 'static,
{
    async_stream::stream! {
        let mut translator = CompletionTranslator::new(meta);

        futures::pin_mut!(messages);
        while let Some(item) = messages.next().await {
            let message = match item {
                Ok(message) => message,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            for chunk in translator.translate(&message) {
                yield Ok(chunk);
            }
        }

        yield Ok(translator.finish());
    }
}

/// Latest text seen across a reply, for one-shot completions.
pub async fn final_text<S>(messages: S) -> Result<String, GatewayError>
where
    S: Stream<Item = Result<UiMessage, GatewayError>> + Send,
{
    futures::pin_mut!(messages);
    let mut text = String::new();
    while let Some(message) = messages.next().await {
        let message = message?;
        if message.parts.iter().any(|p| matches!(p, UiPart::Text(_))) {
            text = message.text();
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> CompletionMeta {
        CompletionMeta {
            id: "chatcmpl-1".into(),
            created: 1_700_000_000,
            model: "debate".into(),
        }
    }

    fn envelope(value: Value) -> UiMessage {
        serde_json::from_value(value).unwrap()
    }

    fn text_msg(text: &str) -> UiMessage {
        envelope(json!({
            "id": "m",
            "role": "assistant",
            "parts": [{ "type": "text", "text": text, "state": "streaming" }]
        }))
    }

    fn tool_msg(state: &str, extra: Value) -> UiMessage {
        let mut part = json!({
            "type": "tool-get_price",
            "toolCallId": "c1",
            "state": state,
            "input": { "symbol": "BTC" }
        });
        if let (Some(obj), Some(extra)) = (part.as_object_mut(), extra.as_object()) {
            obj.extend(extra.clone());
        }
        envelope(json!({ "id": "t", "parts": [part] }))
    }

    fn deltas(chunks: &[CompletionChunk]) -> Vec<Value> {
        chunks
            .iter()
            .map(|c| serde_json::to_value(&c.choices[0].delta).unwrap())
            .collect()
    }

    #[test]
    fn test_text_is_prefix_diffed_and_role_sent_once() {
        let mut t = CompletionTranslator::new(meta());
        let first = t.translate(&text_msg("Objec"));
        let second = t.translate(&text_msg("Objection!"));
        let repeat = t.translate(&text_msg("Objection!"));
        let rewrite = t.translate(&text_msg("Hold on."));

        assert_eq!(
            deltas(&first),
            vec![json!({ "role": "assistant", "content": "Objec" })]
        );
        assert_eq!(deltas(&second), vec![json!({ "content": "tion!" })]);
        assert!(repeat.is_empty());
        assert_eq!(deltas(&rewrite), vec![json!({ "content": "Hold on." })]);
    }

    #[test]
    fn test_empty_first_text_still_sends_role() {
        let mut t = CompletionTranslator::new(meta());
        assert_eq!(deltas(&t.translate(&text_msg(""))), vec![json!({ "role": "assistant" })]);
        assert!(t.translate(&text_msg("")).is_empty());
    }

    #[test]
    fn test_tool_call_announced_once() {
        let mut t = CompletionTranslator::new(meta());
        let first = t.translate(&tool_msg("input-streaming", json!({})));
        let again = t.translate(&tool_msg("input-available", json!({})));
        let approval = t.translate(&tool_msg("approval-requested", json!({})));

        assert_eq!(
            deltas(&first),
            vec![json!({
                "role": "assistant",
                "tool_calls": [{
                    "index": 0,
                    "id": "c1",
                    "type": "function",
                    "function": { "name": "get_price", "arguments": "{\"symbol\":\"BTC\"}" }
                }]
            })]
        );
        assert!(again.is_empty());
        assert!(approval.is_empty());
    }

    #[test]
    fn test_scalar_input_is_wrapped() {
        let mut t = CompletionTranslator::new(meta());
        let chunks = t.translate(&tool_msg("input-available", json!({ "input": "BTC" })));
        let calls = chunks[0].choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.arguments, "{\"input\":\"BTC\"}");
    }

    #[test]
    fn test_tool_results_become_content() {
        let mut t = CompletionTranslator::new(meta());
        let object = t.translate(&tool_msg("output-available", json!({ "output": { "price": 64000 } })));
        let string = t.translate(&tool_msg("output-available", json!({ "output": "flat" })));
        let failed = t.translate(&tool_msg("output-error", json!({ "errorText": "timeout" })));
        let denied = t.translate(&tool_msg("output-denied", json!({})));

        assert_eq!(
            deltas(&object),
            vec![json!({ "role": "assistant", "content": "{\"price\":64000}" })]
        );
        assert_eq!(deltas(&string), vec![json!({ "content": "flat" })]);
        assert_eq!(deltas(&failed), vec![json!({ "content": "timeout" })]);
        assert!(denied.is_empty());
    }

    #[test]
    fn test_chunk_and_finish_shape() {
        let mut t = CompletionTranslator::new(meta());
        let chunk = serde_json::to_value(&t.translate(&text_msg("Hi"))[0]).unwrap();
        assert_eq!(
            chunk,
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion.chunk",
                "created": 1_700_000_000,
                "model": "debate",
                "choices": [{ "index": 0, "delta": { "role": "assistant", "content": "Hi" }, "finish_reason": null }]
            })
        );
        let finish = serde_json::to_value(t.finish()).unwrap();
        assert_eq!(finish["choices"][0], json!({ "index": 0, "delta": {}, "finish_reason": "stop" }));
    }

    #[tokio::test]
    async fn test_stream_ends_with_stop_unless_failed() {
        let ok = futures::stream::iter(vec![Ok(text_msg("Hi"))]);
        let chunks: Vec<_> = completion_stream(ok, meta()).collect().await;
        assert_eq!(chunks.len(), 2);
        let last = chunks[1].as_ref().unwrap();
        assert_eq!(last.choices[0].finish_reason, Some("stop"));

        let failing = futures::stream::iter(vec![Ok(text_msg("Hi")), Err(GatewayError::MissingBody)]);
        let chunks: Vec<_> = completion_stream(failing, meta()).collect().await;
        assert_eq!(chunks.len(), 2);
        assert!(matches!(chunks[1], Err(GatewayError::MissingBody)));
    }

    #[tokio::test]
    async fn test_final_text_keeps_latest() {
        let messages = futures::stream::iter(vec![
            Ok(text_msg("Bull")),
            Ok(tool_msg("output-available", json!({ "output": 1 }))),
            Ok(text_msg("Bull case is thin.")),
        ]);
        assert_eq!(final_text(messages).await.unwrap(), "Bull case is thin.");
    }

    #[test]
    fn test_completion_body() {
        let body = serde_json::to_value(Completion::from_text(meta(), "Hold.".into())).unwrap();
        assert_eq!(body["object"], "chat.completion");
        assert_eq!(
            body["choices"][0],
            json!({ "index": 0, "message": { "role": "assistant", "content": "Hold." }, "finish_reason": "stop" })
        );
    }
}
