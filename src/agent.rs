//! Agent Loop: the orchestration core. Drives one `execute(query)` call through
//! `Preparing → Calling → Processing → (ToolDispatch → Calling)* → Done`, with retry-with-
//! backoff wrapping each provider round trip and a single cancellation token covering the
//! whole call.
//!
//! Grounded on the teacher SDK's `Client::send`/`auto_execute_loop` turn-taking shape (build
//! request from history → stream → inspect tool calls → dispatch → loop), generalized to:
//! persist history through the Memory Store instead of an in-process `Vec`, use a
//! `CancellationToken` instead of the teacher's `Arc<AtomicBool>` interrupt flag (grounded on
//! the cancellation idiom found repeatedly in this lineage's agent-loop codebases), run
//! compaction opportunistically, and fan tool dispatch out through the Tool Registry instead of
//! calling `Tool::execute` one at a time.

use crate::adapter::{AdapterRegistry, NormalizedRequest, ThinkingMode, WireChunk};
use crate::compaction::{self, CompactionConfig};
use crate::config::resolve_model_id;
use crate::error::{Error, Result};
use crate::event_bus::{Event, EventBus};
use crate::http_client::{HttpClient, Request as HttpRequest};
use crate::memory::MemoryStore;
use crate::retry::RetryConfig;
use crate::sse::parse_sse_stream;
use crate::stream_processor::{AssembledMessage, StreamEvent, StreamProcessor};
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{FinishReason, Message, MessageRole, Session, ToolCallStatus};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Observable stream callback protocol, mirrored one-for-one from the specification's external
/// interface section.
#[derive(Debug, Clone)]
pub enum CallbackEvent {
    TextStart,
    TextDelta { content: String },
    TextComplete { content: String },
    ReasoningStart,
    ReasoningDelta { content: String },
    ReasoningComplete,
    ToolCallCreated { tool_calls: Vec<(String, String)> },
    ToolCallResult { call_id: String, status: ToolCallStatus, result: serde_json::Value },
    Status { state: AgentStatus, message: Option<String> },
    Error { error: String, phase: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Idle,
    Thinking,
    Running,
    Completed,
    Failed,
    Aborted,
}

pub type StreamCallback = Arc<dyn Fn(CallbackEvent) + Send + Sync>;

/// Configuration for [`Agent::create`].
pub struct AgentConfig {
    pub model_id: Option<String>,
    pub system_prompt: Option<String>,
    pub stream_callback: Option<StreamCallback>,
    pub tool_registry: Option<Arc<ToolRegistry>>,
    pub memory_store: Arc<MemoryStore>,
    pub event_bus: Option<Arc<EventBus>>,
    pub session_id: Option<String>,
    pub enable_compaction: bool,
    pub compaction_config: CompactionConfig,
    pub max_retries: u32,
    pub working_dir: std::path::PathBuf,
}

impl AgentConfig {
    pub fn new(memory_store: Arc<MemoryStore>) -> Self {
        Self {
            model_id: None,
            system_prompt: None,
            stream_callback: None,
            tool_registry: None,
            memory_store,
            event_bus: None,
            session_id: None,
            enable_compaction: true,
            compaction_config: CompactionConfig::default(),
            max_retries: 10,
            working_dir: std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from(".")),
        }
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn new_session_id() -> String {
    use rand::Rng;
    let suffix: u64 = rand::thread_rng().r#gen();
    format!("session-{:x}", suffix)
}

/// Drives turns for one session. Not `Clone`: callers share an `Arc<Agent>` if they need to
/// hold a handle across tasks (e.g. to call `abort()` from outside the `execute` future).
pub struct Agent {
    session_id: String,
    memory: Arc<MemoryStore>,
    tools: Arc<ToolRegistry>,
    adapters: AdapterRegistry,
    http: HttpClient,
    model_id: String,
    system_prompt: Option<String>,
    compaction_config: CompactionConfig,
    enable_compaction: bool,
    max_retries: u32,
    event_bus: Arc<EventBus>,
    stream_callback: Option<StreamCallback>,
    working_dir: std::path::PathBuf,
    busy: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
}

impl Agent {
    pub async fn create(config: AgentConfig) -> Result<Self> {
        let model_id = resolve_model_id(config.model_id.as_deref())?;
        let session_id = match config.session_id {
            Some(id) => id,
            None => new_session_id(),
        };

        if config.memory_store.load_session(&session_id).await.is_err() {
            config.memory_store.create(&session_id).await?;
        }

        Ok(Self {
            session_id,
            memory: config.memory_store,
            tools: config.tool_registry.unwrap_or_else(|| Arc::new(ToolRegistry::new())),
            adapters: AdapterRegistry::new(),
            http: HttpClient::new(),
            model_id,
            system_prompt: config.system_prompt,
            compaction_config: config.compaction_config,
            enable_compaction: config.enable_compaction,
            max_retries: config.max_retries,
            event_bus: config.event_bus.unwrap_or_else(|| Arc::new(EventBus::new())),
            stream_callback: config.stream_callback,
            working_dir: config.working_dir,
            busy: AtomicBool::new(false),
            cancel: Mutex::new(None),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn messages(&self) -> Result<Vec<Message>> {
        Ok(self.memory.load_session(&self.session_id).await?.messages)
    }

    /// Cancel the in-flight `execute` call, if any. A no-op if the agent is idle.
    pub fn abort(&self) {
        if let Some(token) = self.cancel.lock().unwrap().as_ref() {
            token.cancel();
        }
    }

    fn emit(&self, session_id: &str, event: StreamEvent) {
        let callback_event = match &event {
            StreamEvent::ReasoningStart => Some(CallbackEvent::ReasoningStart),
            StreamEvent::ReasoningDelta(s) => Some(CallbackEvent::ReasoningDelta { content: s.clone() }),
            StreamEvent::ReasoningComplete => Some(CallbackEvent::ReasoningComplete),
            StreamEvent::TextStart => Some(CallbackEvent::TextStart),
            StreamEvent::TextDelta(s) => Some(CallbackEvent::TextDelta { content: s.clone() }),
            StreamEvent::TextComplete => Some(CallbackEvent::TextComplete { content: String::new() }),
            StreamEvent::ToolCallCreated { id, name, .. } => {
                Some(CallbackEvent::ToolCallCreated { tool_calls: vec![(id.clone(), name.clone())] })
            }
            StreamEvent::ToolCallArgsDelta { .. } | StreamEvent::ToolCallsComplete => None,
        };
        if let Some(cb_event) = callback_event {
            if let Some(cb) = &self.stream_callback {
                cb(cb_event);
            }
        }
        match event {
            StreamEvent::TextDelta(delta) => {
                self.event_bus.emit(Event::TextDelta { session_id: session_id.to_string(), delta })
            }
            StreamEvent::ReasoningDelta(delta) => {
                self.event_bus.emit(Event::ReasoningDelta { session_id: session_id.to_string(), delta })
            }
            StreamEvent::ToolCallCreated { id, name, .. } => self.event_bus.emit(Event::ToolCallCreated {
                session_id: session_id.to_string(),
                call_id: id,
                name,
            }),
            _ => {}
        }
    }

    fn emit_status(&self, state: AgentStatus, message: Option<&str>) {
        if let Some(cb) = &self.stream_callback {
            cb(CallbackEvent::Status { state, message: message.map(str::to_string) });
        }
        let status_str = match state {
            AgentStatus::Idle => "idle",
            AgentStatus::Thinking => "thinking",
            AgentStatus::Running => "running",
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
            AgentStatus::Aborted => "aborted",
        };
        self.event_bus.emit(Event::Status {
            session_id: self.session_id.clone(),
            status: status_str.to_string(),
        });
    }

    /// Run one full turn (including any tool dispatch round trips) for `query`. Rejects with
    /// `AgentBusy` if another `execute` is already in flight on this instance.
    pub async fn execute(&self, query: &str) -> Result<AssembledMessage> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AgentBusy);
        }
        let _busy_guard = BusyGuard(&self.busy);

        let cancel = CancellationToken::new();
        *self.cancel.lock().unwrap() = Some(cancel.clone());

        let result = self.run_turn(query, &cancel).await;

        *self.cancel.lock().unwrap() = None;

        match &result {
            Ok(_) => self.emit_status(AgentStatus::Completed, None),
            Err(Error::Aborted) => self.emit_status(AgentStatus::Aborted, None),
            Err(e) => self.emit_status(AgentStatus::Failed, Some(&e.to_string())),
        }
        result
    }

    async fn run_turn(&self, query: &str, cancel: &CancellationToken) -> Result<AssembledMessage> {
        let mut session = self.memory.load_session(&self.session_id).await?;
        let user_msg_id = session.next_message_id();
        self.memory
            .append_message(&self.session_id, Message::user(user_msg_id, query, now_millis()))
            .await?;
        session = self.memory.load_session(&self.session_id).await?;

        if self.enable_compaction && compaction::should_compact(&session.messages, &self.compaction_config) {
            self.run_compaction(&mut session, cancel).await?;
        }

        self.emit_status(AgentStatus::Thinking, None);

        loop {
            if cancel.is_cancelled() {
                return Err(Error::aborted());
            }

            let assembled = self.call_with_retry(&session, cancel).await?;

            match assembled.finish_reason {
                Some(FinishReason::ContentFilter) => {
                    return Err(Error::terminal("CONTENT_FILTERED", "provider filtered the response"));
                }
                Some(FinishReason::ToolCalls) if !assembled.tool_calls.is_empty() => {
                    let assistant_msg_id = session.next_message_id();
                    let assistant_msg = Message::assistant_tool_calls(
                        assistant_msg_id,
                        assembled.content.clone(),
                        assembled.tool_calls.clone(),
                        now_millis(),
                    );
                    session = self
                        .memory
                        .append_message(&self.session_id, assistant_msg)
                        .await?;

                    self.emit_status(AgentStatus::Running, None);
                    let ctx = ToolContext {
                        cancel: cancel.child_token(),
                        plan_mode: false,
                        working_dir: self.working_dir.clone(),
                    };
                    let calls: Vec<(String, String, String)> = assembled
                        .tool_calls
                        .iter()
                        .map(|c| (c.id.clone(), c.name.clone(), c.arguments.clone()))
                        .collect();
                    let results = self.tools.invoke_many(calls, &ctx).await;

                    for (call_id, result) in results {
                        if let Some(cb) = &self.stream_callback {
                            cb(CallbackEvent::ToolCallResult {
                                call_id: call_id.clone(),
                                status: if result.success { ToolCallStatus::Success } else { ToolCallStatus::Error },
                                result: serde_json::to_value(&result).unwrap_or_default(),
                            });
                        }
                        self.event_bus.emit(Event::ToolCallCompleted {
                            session_id: self.session_id.clone(),
                            call_id: call_id.clone(),
                            success: result.success,
                        });
                        let msg_id = session.next_message_id();
                        let content = serde_json::to_string(&result).unwrap_or_default();
                        session = self
                            .memory
                            .append_message(&self.session_id, Message::tool_result(msg_id, call_id, content, now_millis()))
                            .await?;
                    }
                    self.emit_status(AgentStatus::Thinking, None);
                    continue;
                }
                _ => {
                    let assistant_msg_id = session.next_message_id();
                    self.memory
                        .append_message(
                            &self.session_id,
                            Message::assistant_text(assistant_msg_id, assembled.content.clone(), now_millis()),
                        )
                        .await?;
                    return Ok(assembled);
                }
            }
        }
    }

    async fn run_compaction(&self, session: &mut Session, cancel: &CancellationToken) -> Result<()> {
        let split = compaction::compaction_split_point(&session.messages, &self.compaction_config);
        if split == 0 {
            return Ok(());
        }

        let summarization_prompt = Message::user(
            0,
            "Summarize the conversation so far in a compact recap covering intents, decisions, and unresolved items.",
            now_millis(),
        );
        let mut summarization_history = session.messages[..split].to_vec();
        summarization_history.push(summarization_prompt);
        let summarization_session = Session {
            messages: summarization_history,
            ..session.clone()
        };

        let assembled = self.call_with_retry(&summarization_session, cancel).await?;
        let mut summary_msg = Message::assistant_text(0, assembled.content, now_millis());
        summary_msg.mark_as_compaction_summary();

        *session = self.memory.replace_prefix(&self.session_id, split, summary_msg).await?;
        self.event_bus.emit(Event::Compaction {
            session_id: self.session_id.clone(),
            compaction_count: session.compaction_count,
        });
        Ok(())
    }

    /// Wraps one provider round trip in the retry-with-backoff policy: `Retryable` errors are
    /// retried up to `max_retries` times honoring `retry_after`; `Aborted` and terminal errors
    /// propagate immediately.
    async fn call_with_retry(&self, session: &Session, cancel: &CancellationToken) -> Result<AssembledMessage> {
        let retry_config = RetryConfig::new()
            .with_max_attempts(self.max_retries.max(1))
            .with_jitter_factor(0.25);
        let mut attempt = 0u32;
        loop {
            match self.call_once(session, cancel).await {
                Ok(assembled) => return Ok(assembled),
                Err(Error::Aborted) => return Err(Error::Aborted),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        return Err(e);
                    }
                    let delay = retry_config.delay_for(attempt - 1, e.retry_after());
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn call_once(&self, session: &Session, cancel: &CancellationToken) -> Result<AssembledMessage> {
        let (adapter, creds) = self.adapters.resolve(&self.model_id)?;

        let mut messages = session.messages.clone();
        if let Some(prompt) = &self.system_prompt {
            if messages.first().map(|m| m.role) != Some(MessageRole::System) {
                messages.insert(0, Message::system(0, prompt.clone(), now_millis()));
            }
        }

        let tool_defs = self.tools.tool_definitions();
        let request = NormalizedRequest {
            model: self.model_id.clone(),
            messages,
            tools: if tool_defs.is_empty() { None } else { Some(tool_defs) },
            temperature: None,
            max_tokens: None,
            thinking_mode: ThinkingMode::Auto,
            stream: true,
        };

        let built = adapter.build_request(&request, &creds)?;
        let response = self
            .http
            .send(HttpRequest { url: built.url, headers: built.headers, body: built.body }, Some(cancel))
            .await?;

        let mut stream = parse_sse_stream::<WireChunk>(response);
        let mut processor = StreamProcessor::new();

        while let Some(frame) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(Error::aborted());
            }
            let wire_chunk = frame?;
            let chunk = adapter.map_chunk(wire_chunk);
            let events = processor.feed(chunk)?;
            for event in events {
                self.emit(&self.session_id, event);
            }
            if processor.is_closed() {
                break;
            }
        }

        Ok(processor.finish())
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (Arc<MemoryStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (Arc::new(MemoryStore::new(dir.path())), dir)
    }

    #[tokio::test]
    async fn test_create_assigns_session_id_and_persists_it() {
        let (memory, _dir) = store().await;
        unsafe { std::env::set_var("LLM_MODEL_ID", "deepseek-chat") };
        let agent = Agent::create(AgentConfig::new(memory.clone())).await.unwrap();
        let loaded = memory.load_session(agent.session_id()).await.unwrap();
        assert_eq!(loaded.id, agent.session_id());
        unsafe { std::env::remove_var("LLM_MODEL_ID") };
    }

    #[tokio::test]
    async fn test_concurrent_execute_rejected_with_agent_busy() {
        let (memory, _dir) = store().await;
        unsafe { std::env::set_var("LLM_MODEL_ID", "deepseek-chat") };
        let agent = Arc::new(Agent::create(AgentConfig::new(memory)).await.unwrap());
        agent.busy.store(true, Ordering::SeqCst);
        let result = agent.execute("hello").await;
        assert!(matches!(result, Err(Error::AgentBusy)));
        unsafe { std::env::remove_var("LLM_MODEL_ID") };
    }

    #[tokio::test]
    async fn test_abort_before_execute_is_a_no_op() {
        let (memory, _dir) = store().await;
        unsafe { std::env::set_var("LLM_MODEL_ID", "deepseek-chat") };
        let agent = Agent::create(AgentConfig::new(memory)).await.unwrap();
        agent.abort(); // no in-flight execute; must not panic
        unsafe { std::env::remove_var("LLM_MODEL_ID") };
    }
}
