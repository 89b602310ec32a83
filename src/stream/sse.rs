//! SSE framing reader.
//!
//! Accumulates raw response bytes, cuts them into events on blank-line
//! delimiters (`\n\n` or `\r\n\r\n`), and turns every `data:` line into a
//! parsed JSON value. Decoding happens per complete event, so a multi-byte
//! UTF-8 sequence split across network chunks is reassembled before it is
//! read.

use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::error::GatewayError;

const DONE_SENTINEL: &str = "[DONE]";

/// Incremental SSE event reader for one response body.
#[derive(Debug, Default)]
pub struct SseFrameReader {
    buf: Vec<u8>,
}

impl SseFrameReader {
    /// Create an empty reader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return the JSON payloads of every event it
    /// completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buf.extend_from_slice(chunk);

        let mut values = Vec::new();
        while let Some((pos, delimiter_len)) = find_event_delimiter(&self.buf) {
            let frame = self.buf.drain(..pos + delimiter_len).collect::<Vec<_>>();
            let text = String::from_utf8_lossy(&frame[..pos]);
            values.extend(parse_event(&text));
        }
        values
    }

    /// Bytes buffered for an event that has not been terminated yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// End of stream. An unterminated trailing event is dropped.
    pub fn finish(self) {
        if self.buf.iter().any(|b| !b.is_ascii_whitespace()) {
            tracing::warn!(
                name: "sse.partial_event.dropped",
                bytes = self.buf.len(),
                "Dropping unterminated SSE event at end of stream"
            );
        }
    }
}

/// Position and length of the earliest event delimiter in `buf`.
fn find_event_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buf
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Extract the JSON payloads from one event's text.
fn parse_event(event: &str) -> Vec<Value> {
    event
        .lines()
        .filter_map(|line| line.trim().strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty() && *data != DONE_SENTINEL)
        .filter_map(|data| match serde_json::from_str::<Value>(data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(error = %e, payload_len = data.len(), "Skipping malformed SSE payload");
                None
            }
        })
        .collect()
}

/// Adapt a response byte stream into a stream of SSE JSON payloads.
///
/// A transport error is yielded once and ends the stream.
pub fn sse_json_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<Value, GatewayError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<GatewayError> + Send + 'static,
{
    async_stream::stream! {
        let mut reader = SseFrameReader::new();

        futures::pin_mut!(bytes);
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for value in reader.push(chunk.as_ref()) {
                        yield Ok(value);
                    }
                }
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            }
        }

        reader.finish();
    }
}
