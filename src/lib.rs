//! # Agent Execution Core
//!
//! A long-running, streaming agent orchestrator for OpenAI-compatible and vendor-specific
//! chat-completions endpoints (`glm`, `kimi`, `minimax`, `deepseek`, and a generic OpenAI
//! fallback). Drives a turn loop over a persisted session: stream a completion, dispatch any
//! requested tool calls through a schema-validated registry, append results, repeat until the
//! model produces a final answer — with retry-with-backoff, opportunistic context compaction,
//! and mid-turn cancellation throughout.
//!
//! ## Example
//!
//! ```rust,no_run
//! use agent_core::{Agent, AgentConfig, MemoryStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let memory = Arc::new(MemoryStore::new("./sessions"));
//!     let agent = Agent::create(AgentConfig::new(memory)).await?;
//!     let assembled = agent.execute("What's 2+2?").await?;
//!     println!("{}", assembled.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **http_client**: single-shot streaming HTTP request/response with cancellation-aware
//!   deadlines and transport error classification.
//! - **sse**: tolerant Server-Sent Events framing over a byte stream.
//! - **adapter**: model-id to vendor resolution, request shaping, response normalization.
//! - **stream_processor**: assembles wire chunks into one [`stream_processor::AssembledMessage`].
//! - **memory**: crash-safe, atomically-written session persistence.
//! - **tools**: schema-validated, timeout-bounded, Plan-Mode-gated tool dispatch.
//! - **compaction**: threshold-triggered history summarization.
//! - **agent**: the turn-orchestration loop tying the above together.
//! - **plan_store**: per-session deliberative plan documents.
//! - **event_bus**: typed, synchronous pub/sub for session lifecycle events.
//! - **retry**: exponential backoff with jitter, shared by the agent loop.

mod adapter;
mod agent;
mod compaction;
mod config;
mod error;
mod event_bus;
mod http_client;
mod memory;
mod plan_store;
mod sse;
mod stream_processor;
mod tools;
mod types;

pub mod retry;

// --- Agent Loop ---

pub use agent::{Agent, AgentConfig, AgentStatus, CallbackEvent, StreamCallback};

// --- Provider Adapter / Transport ---

pub use adapter::{
    Adapter, AdapterRegistry, BuiltRequest, NormalizedRequest, ThinkingMode, WireChunk,
    classify_status,
};
pub use config::{Credentials, Vendor, resolve_model_id};
pub use http_client::{HttpClient, Request as HttpRequest};
pub use sse::parse_sse_stream;

// --- Stream Processor ---

pub use stream_processor::{AssembledMessage, StreamEvent, StreamProcessor};

// --- Memory Store ---

pub use memory::MemoryStore;

// --- Tool Registry & Executor ---

pub use tools::bash::BashTool;
pub use tools::fs::{BatchReplaceTool, ReadFileTool, WriteFileTool};
pub use tools::schema::{Field, FieldType, ToolSchema};
pub use tools::search::{GlobTool, GrepTool};
pub use tools::{ToolContext, ToolHandler, ToolRegistry};

// --- Context Compactor ---

pub use compaction::{CompactionConfig, compaction_split_point, estimate_tokens, should_compact};

// --- Plan Artifact Store ---

pub use plan_store::PlanStore;

// --- Event Bus ---

pub use event_bus::{Event, EventBus, EventKind, ListenerId};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Core Types ---

pub use types::{
    Chunk, ChunkChoice, ChunkDelta, FinishReason, Message, MessageRole, Plan, PlanMeta, Session,
    SessionStatus, ToolCall, ToolCallDelta, ToolCallStatus, ToolResult, Usage, validate_session_id,
};

/// Convenience module bundling the most commonly used types for typical usage:
/// `use agent_core::prelude::*;`.
pub mod prelude {
    pub use crate::{
        Agent, AgentConfig, AgentStatus, CallbackEvent, Error, Event, EventBus, MemoryStore,
        Message, PlanStore, Result, Session, ToolContext, ToolHandler, ToolRegistry, ToolResult,
    };
}
