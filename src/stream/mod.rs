//! SSE to UI message translation.
//!
//! The agent service streams [`UiMessage`] envelopes over SSE; the chat UI
//! expects a sequence of [`UiMessageChunk`]s. This module bridges the two:
//!
//! - [`sse`]: framing reader (bytes → JSON payloads)
//! - [`message`]: inbound envelope model
//! - [`dispatch`]: per-request translation state (envelopes → chunks)
//! - [`chunk`]: outbound chunk vocabulary and SSE encoding
//! - [`openai`]: the same envelopes as OpenAI chat completion chunks
//!
//! [`ui_chunk_stream`] wires them together for one response body. All state
//! is owned by that stream and dropped with it.

pub mod chunk;
pub mod dispatch;
pub mod message;
pub mod openai;
pub mod sse;

pub use chunk::{
    SSE_DONE, UI_MESSAGE_STREAM_HEADER, UI_MESSAGE_STREAM_VERSION, UiMessageChunk, encode_sse,
};
pub use dispatch::PartDispatcher;
pub use message::{MessageRole, ReplyTranscript, TextPart, ToolPart, ToolState, UiMessage, UiPart};
pub use sse::{SseFrameReader, sse_json_stream};

use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::error::GatewayError;

/// Boxed stream of UI chunks for one chat response.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<UiMessageChunk, GatewayError>> + Send>>;

/// Boxed stream of decoded upstream envelopes.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<UiMessage, GatewayError>> + Send>>;

/// Decode SSE payloads into envelopes, skipping any that are not a
/// [`UiMessage`]. Input errors are forwarded.
pub fn message_stream<S>(values: S) -> impl Stream<Item = Result<UiMessage, GatewayError>> + Send
where
    S: Stream<Item = Result<Value, GatewayError>> + Send + 'static,
{
    values.filter_map(|item| async move {
        match item {
            Ok(value) => match serde_json::from_value::<UiMessage>(value) {
                Ok(message) => Some(Ok(message)),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping payload that is not a UI message");
                    None
                }
            },
            Err(e) => Some(Err(e)),
        }
    })
}

/// Translate a stream of envelopes into UI chunks.
///
/// Emits `start`, then the dispatcher output for every envelope, then
/// `finish` once the input ends. An input error is forwarded and ends the
/// stream without `finish`.
pub fn ui_chunk_stream<S>(messages: S) -> impl Stream<Item = Result<UiMessageChunk, GatewayError>> + Send
where
    S: Stream<Item = Result<UiMessage, GatewayError>> + Send + 'static,
{
    async_stream::stream! {
        let mut dispatcher = PartDispatcher::new();
        yield Ok(UiMessageChunk::Start { message_id: None });

        futures::pin_mut!(messages);
        while let Some(item) = messages.next().await {
            let message = match item {
                Ok(message) => message,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            for chunk in dispatcher.dispatch(&message) {
                yield Ok(chunk);
            }
        }

        yield Ok(UiMessageChunk::Finish);
    }
}

/// Response byte stream to boxed envelopes.
pub fn messages_from_bytes<S, B, E>(bytes: S) -> MessageStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<GatewayError> + Send + 'static,
{
    Box::pin(message_stream(sse_json_stream(bytes)))
}

/// Full pipeline from a response byte stream to boxed UI chunks.
pub fn chunks_from_bytes<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<GatewayError> + Send + 'static,
{
    Box::pin(ui_chunk_stream(messages_from_bytes(bytes)))
}
