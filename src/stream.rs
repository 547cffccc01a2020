//! Synthetic chat-completion streaming.
//!
//! [`StreamEmitter`] decides what to send and in which order; it is a plain
//! iterator and knows nothing about the transport. [`into_event_stream`]
//! adapts it to SSE events and applies the optional inter-frame delay.

use crate::synth::{CompletionContext, ShapedContent};
use axum::response::sse::Event;
use futures_util::Stream;
use serde_json::{Map, Value, json};
use std::convert::Infallible;
use std::time::Duration;

/// Slice size in characters (Unicode scalar values).
pub const SLICE_CHARS: usize = 400;
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Role,
    Reasoning,
    Content,
    Stop,
    Done,
}

impl FrameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Role => "role",
            FrameKind::Reasoning => "reasoning",
            FrameKind::Content => "content",
            FrameKind::Stop => "stop",
            FrameKind::Done => "done",
        }
    }

    fn is_delta(self) -> bool {
        matches!(self, FrameKind::Reasoning | FrameKind::Content)
    }
}

/// One incremental update of the assistant message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunk {
    pub role: Option<&'static str>,
    pub reasoning_delta: Option<String>,
    pub content_delta: Option<String>,
    pub finish_reason: Option<&'static str>,
}

impl StreamChunk {
    fn to_json(&self, ctx: &CompletionContext) -> Value {
        let mut delta = Map::new();
        if let Some(role) = self.role {
            delta.insert("role".to_string(), Value::from(role));
        }
        if let Some(reasoning) = &self.reasoning_delta {
            delta.insert("reasoning_content".to_string(), Value::from(reasoning.as_str()));
        }
        if let Some(content) = &self.content_delta {
            delta.insert("content".to_string(), Value::from(content.as_str()));
        }
        json!({
            "id": ctx.id,
            "object": "chat.completion.chunk",
            "created": ctx.created,
            "model": ctx.model,
            "choices": [{ "index": 0, "delta": delta, "finish_reason": self.finish_reason }]
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: FrameKind,
    /// `None` only for the terminal sentinel.
    pub payload: Option<Value>,
}

impl Frame {
    pub fn data(&self) -> String {
        match &self.payload {
            Some(payload) => payload.to_string(),
            None => DONE_SENTINEL.to_string(),
        }
    }

    pub fn into_event(self) -> Event {
        Event::default().data(self.data())
    }

    /// Wire form: `data: <payload>` followed by a blank line.
    pub fn to_wire(&self) -> String {
        format!("data: {}\n\n", self.data())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Reasoning,
    Content,
    Stopped,
    Done,
    Closed,
}

/// Role, reasoning slices, content slices, stop, sentinel. Nothing after the sentinel.
#[derive(Debug)]
pub struct StreamEmitter {
    ctx: CompletionContext,
    reasoning: String,
    answer: String,
    cursor: usize,
    phase: Phase,
}

impl StreamEmitter {
    pub fn new(ctx: CompletionContext, content: &ShapedContent) -> Self {
        Self {
            ctx,
            reasoning: content.reasoning.clone(),
            answer: content.answer.clone(),
            cursor: 0,
            phase: Phase::Start,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    fn frame(&self, kind: FrameKind, chunk: StreamChunk) -> Frame {
        Frame {
            kind,
            payload: Some(chunk.to_json(&self.ctx)),
        }
    }
}

/// Next non-empty slice of at most [`SLICE_CHARS`] characters starting at `cursor`.
fn next_slice(text: &str, cursor: &mut usize) -> Option<String> {
    let rest = text.get(*cursor..).filter(|r| !r.is_empty())?;
    let end = rest
        .char_indices()
        .nth(SLICE_CHARS)
        .map(|(idx, _)| idx)
        .unwrap_or(rest.len());
    *cursor += end;
    Some(rest[..end].to_string())
}

impl Iterator for StreamEmitter {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        loop {
            match self.phase {
                Phase::Start => {
                    self.phase = Phase::Reasoning;
                    self.cursor = 0;
                    return Some(self.frame(
                        FrameKind::Role,
                        StreamChunk {
                            role: Some("assistant"),
                            ..StreamChunk::default()
                        },
                    ));
                }
                Phase::Reasoning => match next_slice(&self.reasoning, &mut self.cursor) {
                    Some(piece) => {
                        return Some(self.frame(
                            FrameKind::Reasoning,
                            StreamChunk {
                                reasoning_delta: Some(piece),
                                ..StreamChunk::default()
                            },
                        ));
                    }
                    None => {
                        self.phase = Phase::Content;
                        self.cursor = 0;
                    }
                },
                Phase::Content => match next_slice(&self.answer, &mut self.cursor) {
                    Some(piece) => {
                        return Some(self.frame(
                            FrameKind::Content,
                            StreamChunk {
                                content_delta: Some(piece),
                                ..StreamChunk::default()
                            },
                        ));
                    }
                    None => self.phase = Phase::Stopped,
                },
                Phase::Stopped => {
                    self.phase = Phase::Done;
                    return Some(self.frame(
                        FrameKind::Stop,
                        StreamChunk {
                            finish_reason: Some("stop"),
                            ..StreamChunk::default()
                        },
                    ));
                }
                Phase::Done => {
                    self.phase = Phase::Closed;
                    return Some(Frame {
                        kind: FrameKind::Done,
                        payload: None,
                    });
                }
                Phase::Closed => return None,
            }
        }
    }
}

impl Drop for StreamEmitter {
    fn drop(&mut self) {
        if self.phase != Phase::Closed {
            tracing::debug!(id = %self.ctx.id, "stream consumer went away before completion");
        }
    }
}

/// SSE adapter. The delay runs after each reasoning/content frame and is
/// abandoned together with the stream when the client disconnects.
pub fn into_event_stream(
    emitter: StreamEmitter,
    delay: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    futures_util::stream::unfold((emitter, false), move |(mut emitter, pause)| async move {
        if pause {
            tokio::time::sleep(delay).await;
        }
        let frame = emitter.next()?;
        metrics::counter!("k2proxy_stream_frames_total", "kind" => frame.kind.as_str())
            .increment(1);
        let pause_next = frame.kind.is_delta() && !delay.is_zero();
        Some((Ok(frame.into_event()), (emitter, pause_next)))
    })
}
