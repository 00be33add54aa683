//! Server-sent-events decoding for streamed chat completions.
//!
//! ## Why a separate decoder?
//!
//! HTTP chunks do not respect SSE line boundaries: one chunk may carry half
//! a `data:` line, or three of them, or split a multi-byte character. The
//! [`SseDecoder`] buffers raw bytes and only decodes complete lines, so the
//! network layer stays a plain byte stream and the decoding is unit-testable
//! without a server.
//!
//! [`delta_stream`] wraps any byte stream into a [`ChunkStream`] of text
//! deltas that ends at `data: [DONE]` (or at end of body).
//! [`accumulate`] drains it into the full response text.

use crate::error::RefinementError;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::debug;

/// A boxed stream of text deltas.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, RefinementError>> + Send>>;

/// One decoded SSE event that matters to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Content appended by the model.
    Delta(String),
    /// The `data: [DONE]` terminator.
    Done,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

/// Incremental decoder for an OpenAI-style `text/event-stream` body.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns the events completed by this chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, RefinementError> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(ev) = decode_line(&line)? {
                events.push(ev);
            }
        }
        Ok(events)
    }

    /// Decode whatever is left once the body has ended without a newline.
    pub fn finish(&mut self) -> Result<Option<SseEvent>, RefinementError> {
        let rest = std::mem::take(&mut self.buf);
        decode_line(&rest)
    }
}

fn decode_line(raw: &[u8]) -> Result<Option<SseEvent>, RefinementError> {
    let line = std::str::from_utf8(raw)
        .map_err(|e| RefinementError::Stream {
            detail: format!("invalid UTF-8 in event: {}", e),
        })?
        .trim();

    // Comments (": keep-alive"), event:/id: fields and blank separators.
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let chunk: StreamChunk = serde_json::from_str(data).map_err(|e| RefinementError::Stream {
        detail: format!("{}: {}", e, truncate(data, 120)),
    })?;
    if let Some(err) = chunk.error {
        return Err(RefinementError::Stream {
            detail: format!("provider error in stream: {}", err),
        });
    }

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .unwrap_or_default();
    if content.is_empty() {
        Ok(None)
    } else {
        Ok(Some(SseEvent::Delta(content)))
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => format!("{}…", &s[..i]),
        None => s.to_string(),
    }
}

// ── Delta stream ─────────────────────────────────────────────────────────

struct DeltaState<S> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

impl<S> DeltaState<S> {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for ev in events {
            match ev {
                SseEvent::Delta(d) => self.pending.push_back(d),
                SseEvent::Done => {
                    self.finished = true;
                    break;
                }
            }
        }
    }
}

/// Turn an SSE byte stream into a stream of text deltas.
///
/// The stream ends after `[DONE]` or at end of body. The first transport
/// or decoding error is yielded once, then the stream ends.
pub fn delta_stream<S, B>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, RefinementError>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = DeltaState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    let s = stream::unfold(state, |mut st| async move {
        loop {
            if let Some(delta) = st.pending.pop_front() {
                return Some((Ok(delta), st));
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => match st.decoder.feed(chunk.as_ref()) {
                    Ok(events) => st.absorb(events),
                    Err(e) => {
                        st.finished = true;
                        return Some((Err(e), st));
                    }
                },
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.finished = true;
                    match st.decoder.finish() {
                        Ok(Some(ev)) => st.absorb(vec![ev]),
                        Ok(None) => {}
                        Err(e) => return Some((Err(e), st)),
                    }
                }
            }
        }
    });

    Box::pin(s)
}

/// Drain a delta stream into the full text, calling `on_chunk` per delta.
pub async fn accumulate(
    mut chunks: ChunkStream,
    mut on_chunk: impl FnMut(&str),
) -> Result<String, RefinementError> {
    let mut text = String::new();
    let mut count = 0usize;
    while let Some(delta) = chunks.next().await {
        let delta = delta?;
        on_chunk(&delta);
        text.push_str(&delta);
        count += 1;
    }
    debug!("Stream finished: {} deltas, {} bytes", count, text.len());
    Ok(text)
}
