//! Core data model: [`Session`], [`Message`], [`ToolCall`], [`Chunk`], [`ToolResult`], [`Plan`].
//!
//! Field shapes follow the specification's data model section; serde derives use the
//! teacher SDK's conventions (lowercase role tags, externally-tagged content where useful).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role of a [`Message`] within a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Status of a [`ToolCall`] across its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Pending,
    Running,
    Success,
    Error,
}

/// A structured request from the model to invoke a named tool, correlated to its eventual
/// result by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id, unique within its originating assistant message.
    pub id: String,
    pub name: String,
    /// Unparsed JSON argument string, accumulated during streaming.
    pub arguments: String,
    pub status: ToolCallStatus,
    /// Result payload, present once `status` reaches a terminal state.
    pub result: Option<serde_json::Value>,
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
            status: ToolCallStatus::Pending,
            result: None,
            started_at: None,
            ended_at: None,
        }
    }
}

/// Cumulative token usage, when the provider reports it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One message in a session's ordered history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Monotonic per-session id.
    pub id: u64,
    pub role: MessageRole,
    pub content: String,
    /// Reasoning/"thinking" content, for providers that expose it separately from `content`.
    pub reasoning_content: Option<String>,
    /// Present only on `Assistant` messages that requested tool calls.
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Present only on `Tool` messages; references the call it answers.
    pub tool_call_id: Option<String>,
    pub usage: Option<Usage>,
    pub timestamp: i64,
    /// Free-form metadata; used to flag compaction-generated summary messages
    /// (`metadata["compaction_summary"] == true`).
    pub metadata: Option<serde_json::Value>,
}

impl Message {
    pub fn new(id: u64, role: MessageRole, content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            reasoning_content: None,
            tool_calls: None,
            tool_call_id: None,
            usage: None,
            timestamp,
            metadata: None,
        }
    }

    pub fn system(id: u64, content: impl Into<String>, timestamp: i64) -> Self {
        Self::new(id, MessageRole::System, content, timestamp)
    }

    pub fn user(id: u64, content: impl Into<String>, timestamp: i64) -> Self {
        Self::new(id, MessageRole::User, content, timestamp)
    }

    pub fn assistant_text(id: u64, content: impl Into<String>, timestamp: i64) -> Self {
        Self::new(id, MessageRole::Assistant, content, timestamp)
    }

    pub fn assistant_tool_calls(
        id: u64,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
        timestamp: i64,
    ) -> Self {
        let mut msg = Self::new(id, MessageRole::Assistant, content, timestamp);
        msg.tool_calls = Some(tool_calls);
        msg
    }

    pub fn tool_result(
        id: u64,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        let mut msg = Self::new(id, MessageRole::Tool, content, timestamp);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Marks this message (typically an assistant message produced by the Compactor) as a
    /// generated summary rather than a model turn answering the user directly.
    pub fn mark_as_compaction_summary(&mut self) {
        self.metadata = Some(serde_json::json!({"compaction_summary": true}));
    }

    pub fn is_compaction_summary(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("compaction_summary"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Archived,
}

/// The persistent unit of conversational state, keyed by session id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub status: SessionStatus,
    pub total_messages: u64,
    pub compaction_count: u32,
    pub messages: Vec<Message>,
}

impl Session {
    pub fn new(id: impl Into<String>, now: i64) -> Self {
        Self {
            id: id.into(),
            created_at: now,
            updated_at: now,
            status: SessionStatus::Active,
            total_messages: 0,
            compaction_count: 0,
            messages: Vec::new(),
        }
    }

    /// Next message id for this session (monotonic, 1-based).
    pub fn next_message_id(&self) -> u64 {
        self.total_messages + 1
    }

    pub fn push(&mut self, message: Message, now: i64) {
        self.total_messages += 1;
        self.updated_at = now;
        self.messages.push(message);
    }
}

/// Character class session/plan ids must satisfy: alphanumeric, `-`, `_`, length 1..=128.
/// Rejects path-traversal tokens (`..`, `/`) and anything with whitespace or `@`.
pub fn validate_session_id(id: &str) -> crate::error::Result<()> {
    if id.is_empty() || id.len() > 128 {
        return Err(crate::error::Error::invalid_session_id(format!(
            "length {} out of bounds (1..=128)",
            id.len()
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(crate::error::Error::invalid_session_id(format!(
            "{id:?} contains characters outside [A-Za-z0-9_-]"
        )));
    }
    Ok(())
}

/// Transport-level chunk: one normalized frame extracted from an SSE stream, ephemeral
/// (never persisted).
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub id: Option<String>,
    pub choices: Vec<ChunkChoice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Clone, Default)]
pub struct ChunkDelta {
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Clone)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// Model-provided terminal cause of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
    Other,
}

impl FinishReason {
    pub fn parse(s: &str) -> Self {
        match s {
            "stop" => FinishReason::Stop,
            "tool_calls" => FinishReason::ToolCalls,
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Other,
        }
    }
}

/// Result of a tool invocation. Never throws across the tool boundary: errors are encoded in
/// `success=false` with `metadata["error"]` carrying a stable code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn error(code: &str, output: impl Into<String>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("error".to_string(), serde_json::Value::String(code.to_string()));
        Self {
            success: false,
            output: output.into(),
            metadata,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Metadata for a deliberative plan document; one plan per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanMeta {
    pub id: String,
    pub title: String,
    pub session_id: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub file_path: String,
}

/// A plan: markdown document plus its metadata.
#[derive(Debug, Clone)]
pub struct Plan {
    pub meta: PlanMeta,
    pub content: String,
}
