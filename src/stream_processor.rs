//! Stream Processor: assembles a sequence of [`Chunk`] deltas into one [`AssembledMessage`],
//! firing lifecycle events as reasoning/text/tool-call sections open, stream, and close.
//!
//! Generalizes the teacher SDK's `utils::ToolCallAggregator` (which only tracked tool-call
//! argument concatenation) into the full reasoning/text/tool-calls state machine the
//! specification describes, and adds the per-turn byte budget the teacher never needed because
//! it never streamed separate reasoning content.

use crate::error::{Error, Result};
use crate::types::{Chunk, FinishReason, ToolCall, ToolCallStatus, Usage};
use std::collections::BTreeMap;

/// Default combined byte budget across text + reasoning + tool-call arguments, per turn.
pub const DEFAULT_BUFFER_LIMIT: usize = 2 * 1024 * 1024;

/// A lifecycle event fired as the processor assembles a turn. Forwarded to the Event Bus and
/// any caller-supplied stream callback.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    ReasoningStart,
    ReasoningDelta(String),
    ReasoningComplete,
    TextStart,
    TextDelta(String),
    TextComplete,
    ToolCallCreated { index: u32, id: String, name: String },
    ToolCallArgsDelta { index: u32, delta: String },
    ToolCallsComplete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Idle,
    ReasoningOpen,
    TextOpen,
    ToolCallsOpen,
    Closed,
}

#[derive(Debug, Default, Clone)]
struct ToolCallBuilder {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// The assembled result of one streamed turn.
#[derive(Debug, Clone, Default)]
pub struct AssembledMessage {
    pub content: String,
    pub reasoning_content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
}

/// Drives the reasoning/text/tool-calls state machine over a chunk sequence for one turn.
pub struct StreamProcessor {
    state: State,
    content: String,
    reasoning_content: String,
    reasoning_seen: bool,
    tool_calls: BTreeMap<u32, ToolCallBuilder>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    buffered_bytes: usize,
    buffer_limit: usize,
    events: Vec<StreamEvent>,
}

impl StreamProcessor {
    pub fn new() -> Self {
        Self::with_buffer_limit(DEFAULT_BUFFER_LIMIT)
    }

    pub fn with_buffer_limit(buffer_limit: usize) -> Self {
        Self {
            state: State::Idle,
            content: String::new(),
            reasoning_content: String::new(),
            reasoning_seen: false,
            tool_calls: BTreeMap::new(),
            finish_reason: None,
            usage: None,
            buffered_bytes: 0,
            buffer_limit,
            events: Vec::new(),
        }
    }

    /// Feed one chunk in. Returns the lifecycle events fired as a result, in order. On budget
    /// overflow, returns `Err(Error::BufferOverflow)` and the turn is closed; callers must not
    /// feed further chunks afterward.
    pub fn feed(&mut self, chunk: Chunk) -> Result<Vec<StreamEvent>> {
        if self.state == State::Closed {
            return Ok(Vec::new());
        }
        self.events.clear();

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        for choice in &chunk.choices {
            let delta = &choice.delta;

            if let Some(reasoning) = &delta.reasoning_content {
                if !reasoning.is_empty() {
                    self.open_reasoning();
                    self.push_bytes(reasoning.len())?;
                    self.reasoning_content.push_str(reasoning);
                    self.events.push(StreamEvent::ReasoningDelta(reasoning.clone()));
                }
            }

            if let Some(text) = &delta.content {
                if !text.is_empty() {
                    self.open_text();
                    self.push_bytes(text.len())?;
                    self.content.push_str(text);
                    self.events.push(StreamEvent::TextDelta(text.clone()));
                }
            }

            if let Some(tool_calls) = &delta.tool_calls {
                if !tool_calls.is_empty() {
                    self.open_tool_calls();
                }
                for tc in tool_calls {
                    let is_new = !self.tool_calls.contains_key(&tc.index);
                    let builder = self.tool_calls.entry(tc.index).or_default();
                    if let Some(id) = &tc.id {
                        builder.id = Some(id.clone());
                    }
                    if let Some(name) = &tc.name {
                        builder.name = Some(name.clone());
                    }
                    if is_new {
                        if let (Some(id), Some(name)) = (&builder.id, &builder.name) {
                            self.events.push(StreamEvent::ToolCallCreated {
                                index: tc.index,
                                id: id.clone(),
                                name: name.clone(),
                            });
                        }
                    }
                    if let Some(args) = &tc.arguments {
                        if !args.is_empty() {
                            self.push_bytes(args.len())?;
                            builder.arguments.push_str(args);
                            self.events.push(StreamEvent::ToolCallArgsDelta {
                                index: tc.index,
                                delta: args.clone(),
                            });
                        }
                    }
                }
            }

            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
                self.close();
            }
        }

        Ok(std::mem::take(&mut self.events))
    }

    fn open_reasoning(&mut self) {
        if self.state == State::Idle {
            self.state = State::ReasoningOpen;
            self.reasoning_seen = true;
            self.events.push(StreamEvent::ReasoningStart);
        }
    }

    fn open_text(&mut self) {
        if self.state == State::ReasoningOpen {
            self.events.push(StreamEvent::ReasoningComplete);
        }
        if self.state != State::TextOpen {
            self.state = State::TextOpen;
            self.events.push(StreamEvent::TextStart);
        }
    }

    fn open_tool_calls(&mut self) {
        if self.state == State::ReasoningOpen {
            self.events.push(StreamEvent::ReasoningComplete);
        }
        if self.state == State::TextOpen {
            self.events.push(StreamEvent::TextComplete);
        }
        self.state = State::ToolCallsOpen;
    }

    fn push_bytes(&mut self, n: usize) -> Result<()> {
        self.buffered_bytes += n;
        if self.buffered_bytes > self.buffer_limit {
            self.truncate_all();
            self.state = State::Closed;
            return Err(Error::buffer_overflow(self.buffer_limit));
        }
        Ok(())
    }

    fn truncate_all(&mut self) {
        const HEAD: usize = 4_000;
        const TAIL: usize = 4_000;
        for buf in [&mut self.content, &mut self.reasoning_content] {
            if buf.len() > HEAD + TAIL {
                let head: String = buf.chars().take(HEAD).collect();
                let tail: String = buf.chars().rev().take(TAIL).collect::<Vec<_>>().into_iter().rev().collect();
                *buf = format!("{head}...[truncated]...{tail}");
            }
        }
    }

    fn close(&mut self) {
        match self.state {
            State::ReasoningOpen => {
                self.events.push(StreamEvent::ReasoningComplete);
            }
            State::TextOpen => {
                self.events.push(StreamEvent::TextComplete);
            }
            State::ToolCallsOpen => {
                self.events.push(StreamEvent::ToolCallsComplete);
            }
            _ => {}
        }
        self.state = State::Closed;
    }

    /// True once a terminal `finish_reason` has closed the turn.
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Consume the processor and produce the assembled message. Valid to call once the turn is
    /// closed (normally, or after a buffer overflow truncation).
    pub fn finish(self) -> AssembledMessage {
        let tool_calls = self
            .tool_calls
            .into_iter()
            .filter_map(|(_, b)| {
                let id = b.id?;
                let name = b.name?;
                Some(ToolCall {
                    id,
                    name,
                    arguments: b.arguments,
                    status: ToolCallStatus::Pending,
                    result: None,
                    started_at: None,
                    ended_at: None,
                })
            })
            .collect();

        AssembledMessage {
            content: self.content,
            reasoning_content: if self.reasoning_seen { Some(self.reasoning_content) } else { None },
            tool_calls,
            finish_reason: self.finish_reason,
            usage: self.usage,
        }
    }
}

impl Default for StreamProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkChoice, ChunkDelta, ToolCallDelta};

    fn text_chunk(text: &str, finish: Option<FinishReason>) -> Chunk {
        Chunk {
            id: None,
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    content: Some(text.to_string()),
                    reasoning_content: None,
                    tool_calls: None,
                },
                finish_reason: finish,
            }],
            usage: None,
        }
    }

    #[test]
    fn test_text_only_turn_fires_start_delta_complete() {
        let mut p = StreamProcessor::new();
        let events1 = p.feed(text_chunk("hello", None)).unwrap();
        assert!(matches!(events1[0], StreamEvent::TextStart));
        assert!(matches!(events1[1], StreamEvent::TextDelta(ref s) if s == "hello"));

        let events2 = p.feed(text_chunk(" world", Some(FinishReason::Stop))).unwrap();
        assert!(matches!(events2[0], StreamEvent::TextDelta(ref s) if s == " world"));
        assert!(matches!(events2[1], StreamEvent::TextComplete));

        let msg = p.finish();
        assert_eq!(msg.content, "hello world");
        assert_eq!(msg.finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn test_reasoning_closes_before_text_opens() {
        let mut p = StreamProcessor::new();
        let reasoning_chunk = Chunk {
            id: None,
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    content: None,
                    reasoning_content: Some("thinking".to_string()),
                    tool_calls: None,
                },
                finish_reason: None,
            }],
            usage: None,
        };
        let events = p.feed(reasoning_chunk).unwrap();
        assert!(matches!(events[0], StreamEvent::ReasoningStart));

        let events = p.feed(text_chunk("answer", Some(FinishReason::Stop))).unwrap();
        assert!(matches!(events[0], StreamEvent::ReasoningComplete));
        assert!(matches!(events[1], StreamEvent::TextStart));

        let msg = p.finish();
        assert_eq!(msg.reasoning_content.as_deref(), Some("thinking"));
        assert_eq!(msg.content, "answer");
    }

    #[test]
    fn test_tool_call_deltas_accumulate_by_index() {
        let mut p = StreamProcessor::new();
        let chunk1 = Chunk {
            id: None,
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    content: None,
                    reasoning_content: None,
                    tool_calls: Some(vec![ToolCallDelta {
                        index: 0,
                        id: Some("call_1".to_string()),
                        name: Some("bash".to_string()),
                        arguments: Some("{\"cmd\":".to_string()),
                    }]),
                },
                finish_reason: None,
            }],
            usage: None,
        };
        let chunk2 = Chunk {
            id: None,
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    content: None,
                    reasoning_content: None,
                    tool_calls: Some(vec![ToolCallDelta {
                        index: 0,
                        id: None,
                        name: None,
                        arguments: Some("\"ls\"}".to_string()),
                    }]),
                },
                finish_reason: Some(FinishReason::ToolCalls),
            }],
            usage: None,
        };
        let events1 = p.feed(chunk1).unwrap();
        assert!(matches!(events1[0], StreamEvent::ToolCallCreated { index: 0, .. }));
        p.feed(chunk2).unwrap();
        let msg = p.finish();
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].arguments, "{\"cmd\":\"ls\"}");
        assert_eq!(msg.finish_reason, Some(FinishReason::ToolCalls));
    }

    #[test]
    fn test_buffer_overflow_truncates_and_errors() {
        let mut p = StreamProcessor::with_buffer_limit(16);
        let result = p.feed(text_chunk("this text is definitely longer than sixteen bytes", None));
        assert!(matches!(result, Err(Error::BufferOverflow { limit: 16 })));
        assert!(p.is_closed());
    }
}
