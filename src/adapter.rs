//! Provider adapters: normalize a request for one vendor's endpoint, and map that vendor's
//! wire-format chunks back into the core's normalized [`Chunk`].
//!
//! Every named vendor in this implementation (GLM, Kimi, MiniMax, DeepSeek) speaks the same
//! OpenAI-compatible chat-completions wire shape as the generic/local adapter the teacher SDK
//! already builds requests for; the adapter's real job is resolving the right endpoint and
//! credentials and handling the handful of body-shape differences (GLM's `thinking` field).
//! `Adapter` is kept as a small trait — the same "one trait, one registry" shape the teacher
//! uses for `Tool` — so a genuinely different wire format could be added without touching the
//! Agent Loop.

use crate::config::{Credentials, Vendor};
use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkChoice, ChunkDelta, FinishReason, Message, MessageRole, ToolCallDelta, Usage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Controls whether extended "thinking"/reasoning output is requested, when the vendor
/// supports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThinkingMode {
    Enabled,
    Disabled,
    #[default]
    Auto,
}

/// Vendor-agnostic request shape the Agent Loop builds once per turn.
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    pub model: String,
    pub messages: Vec<Message>,
    /// OpenAI-format `tools` array (function declarations), if any tools are registered.
    pub tools: Option<Vec<Value>>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub thinking_mode: ThinkingMode,
    pub stream: bool,
}

/// Resolved (url, headers, body) ready to POST.
pub struct BuiltRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

/// A provider capability: build a request body for this vendor, and map its wire chunk shape
/// into the normalized [`Chunk`]. Adapters are stateless; all per-call state lives in the
/// request/response values passed through.
pub trait Adapter: Send + Sync {
    fn build_request(&self, req: &NormalizedRequest, creds: &Credentials) -> Result<BuiltRequest>;
    fn map_chunk(&self, wire: WireChunk) -> Chunk;
}

// ---------------------------------------------------------------------------------------
// Shared OpenAI-compatible wire format (request + streaming response)
// ---------------------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

fn to_wire_messages(messages: &[Message]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: role_str(m.role),
            content: if m.content.is_empty() { None } else { Some(m.content.clone()) },
            tool_calls: m.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|c| WireToolCall {
                        id: c.id.clone(),
                        call_type: "function",
                        function: WireFunction {
                            name: c.name.clone(),
                            arguments: c.arguments.clone(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: m.tool_call_id.clone(),
        })
        .collect()
}

fn build_openai_body(req: &NormalizedRequest, extra: Option<(&'static str, Value)>) -> Value {
    let mut body = serde_json::json!({
        "model": req.model,
        "messages": to_wire_messages(&req.messages),
        "stream": req.stream,
    });
    let obj = body.as_object_mut().unwrap();
    if let Some(t) = req.temperature {
        obj.insert("temperature".into(), serde_json::json!(t));
    }
    if let Some(mt) = req.max_tokens {
        obj.insert("max_tokens".into(), serde_json::json!(mt));
    }
    if let Some(tools) = &req.tools {
        obj.insert("tools".into(), serde_json::json!(tools));
    }
    if let Some((key, value)) = extra {
        obj.insert(key.into(), value);
    }
    body
}

/// Raw streaming chunk shape shared by every vendor covered here (OpenAI chat-completions
/// SSE frame). Deserialize-only; never constructed by the core.
#[derive(Debug, Clone, Deserialize)]
pub struct WireChunk {
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<WireChoice>,
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: WireDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireDelta {
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub call_type: Option<String>,
    pub function: Option<WireFunctionDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireFunctionDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

fn map_openai_chunk(wire: WireChunk) -> Chunk {
    Chunk {
        id: wire.id,
        choices: wire
            .choices
            .into_iter()
            .map(|c| ChunkChoice {
                index: c.index,
                delta: ChunkDelta {
                    content: c.delta.content,
                    reasoning_content: c.delta.reasoning_content,
                    tool_calls: c.delta.tool_calls.map(|tcs| {
                        tcs.into_iter()
                            .map(|tc| ToolCallDelta {
                                index: tc.index,
                                id: tc.id,
                                name: tc.function.as_ref().and_then(|f| f.name.clone()),
                                arguments: tc.function.and_then(|f| f.arguments),
                            })
                            .collect()
                    }),
                },
                finish_reason: c.finish_reason.as_deref().map(FinishReason::parse),
            })
            .collect(),
        usage: wire.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
    }
}

fn auth_headers(creds: &Credentials) -> Vec<(String, String)> {
    let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
    if let Some(key) = &creds.api_key {
        headers.push(("Authorization".to_string(), format!("Bearer {key}")));
    }
    headers
}

// ---------------------------------------------------------------------------------------
// Concrete adapters
// ---------------------------------------------------------------------------------------

/// Generic OpenAI-compatible adapter: used for local servers (LM Studio, Ollama, llama.cpp,
/// vLLM) and as the fallback for any model id not matched to a named vendor.
pub struct GenericAdapter;

impl Adapter for GenericAdapter {
    fn build_request(&self, req: &NormalizedRequest, creds: &Credentials) -> Result<BuiltRequest> {
        Ok(BuiltRequest {
            url: format!("{}/chat/completions", creds.base_url.trim_end_matches('/')),
            headers: auth_headers(creds),
            body: build_openai_body(req, None),
        })
    }

    fn map_chunk(&self, wire: WireChunk) -> Chunk {
        map_openai_chunk(wire)
    }
}

/// Zhipu GLM adapter: same shape as generic, plus a `thinking` field derived from
/// `thinking_mode`.
pub struct GlmAdapter;

impl Adapter for GlmAdapter {
    fn build_request(&self, req: &NormalizedRequest, creds: &Credentials) -> Result<BuiltRequest> {
        let thinking = match req.thinking_mode {
            ThinkingMode::Enabled => serde_json::json!({"type": "enabled"}),
            ThinkingMode::Disabled => serde_json::json!({"type": "disabled"}),
            ThinkingMode::Auto => serde_json::json!({"type": "auto"}),
        };
        Ok(BuiltRequest {
            url: format!("{}/chat/completions", creds.base_url.trim_end_matches('/')),
            headers: auth_headers(creds),
            body: build_openai_body(req, Some(("thinking", thinking))),
        })
    }

    fn map_chunk(&self, wire: WireChunk) -> Chunk {
        map_openai_chunk(wire)
    }
}

/// Moonshot Kimi adapter.
pub struct KimiAdapter;

impl Adapter for KimiAdapter {
    fn build_request(&self, req: &NormalizedRequest, creds: &Credentials) -> Result<BuiltRequest> {
        Ok(BuiltRequest {
            url: format!("{}/chat/completions", creds.base_url.trim_end_matches('/')),
            headers: auth_headers(creds),
            body: build_openai_body(req, None),
        })
    }

    fn map_chunk(&self, wire: WireChunk) -> Chunk {
        map_openai_chunk(wire)
    }
}

/// MiniMax adapter.
pub struct MiniMaxAdapter;

impl Adapter for MiniMaxAdapter {
    fn build_request(&self, req: &NormalizedRequest, creds: &Credentials) -> Result<BuiltRequest> {
        Ok(BuiltRequest {
            url: format!("{}/text/chatcompletion_v2", creds.base_url.trim_end_matches('/')),
            headers: auth_headers(creds),
            body: build_openai_body(req, None),
        })
    }

    fn map_chunk(&self, wire: WireChunk) -> Chunk {
        map_openai_chunk(wire)
    }
}

/// DeepSeek adapter.
pub struct DeepSeekAdapter;

impl Adapter for DeepSeekAdapter {
    fn build_request(&self, req: &NormalizedRequest, creds: &Credentials) -> Result<BuiltRequest> {
        Ok(BuiltRequest {
            url: format!("{}/chat/completions", creds.base_url.trim_end_matches('/')),
            headers: auth_headers(creds),
            body: build_openai_body(req, None),
        })
    }

    fn map_chunk(&self, wire: WireChunk) -> Chunk {
        map_openai_chunk(wire)
    }
}

/// Resolves a model id to its adapter + credentials. Adapters are stateless singletons;
/// credentials are read once from the environment at registry construction time.
pub struct AdapterRegistry {
    generic: GenericAdapter,
    glm: GlmAdapter,
    kimi: KimiAdapter,
    minimax: MiniMaxAdapter,
    deepseek: DeepSeekAdapter,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            generic: GenericAdapter,
            glm: GlmAdapter,
            kimi: KimiAdapter,
            minimax: MiniMaxAdapter,
            deepseek: DeepSeekAdapter,
        }
    }

    /// Resolve the adapter and credentials for `model_id`.
    pub fn resolve(&self, model_id: &str) -> Result<(&dyn Adapter, Credentials)> {
        let vendor = Vendor::from_model_id(model_id);
        let creds = Credentials::from_env(vendor)?;
        let adapter: &dyn Adapter = match vendor {
            Vendor::Glm => &self.glm,
            Vendor::Kimi => &self.kimi,
            Vendor::MiniMax => &self.minimax,
            Vendor::DeepSeek => &self.deepseek,
            Vendor::Generic => &self.generic,
        };
        Ok((adapter, creds))
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize an HTTP status/error classification error to the §7 taxonomy, given a response
/// status and any `Retry-After` header value already parsed to seconds.
pub fn classify_status(status: u16, retry_after_secs: Option<u64>) -> Error {
    match status {
        401 => Error::terminal("AUTH_FAILED", "authentication failed"),
        404 => Error::terminal("NOT_FOUND", "endpoint not found"),
        400 => Error::terminal("BAD_REQUEST", "bad request"),
        408 => retry_or_plain("TIMEOUT", "request timeout", retry_after_secs),
        429 => retry_or_plain("RATE_LIMITED", "rate limited", retry_after_secs),
        500..=599 => retry_or_plain("SERVER_ERROR", "server error", retry_after_secs),
        _ => Error::terminal("API_ERROR", format!("unexpected status {status}")),
    }
}

fn retry_or_plain(code: &'static str, msg: &str, retry_after_secs: Option<u64>) -> Error {
    match retry_after_secs {
        Some(secs) => Error::retryable_after(code, msg, std::time::Duration::from_secs(secs)),
        None => Error::retryable(code, msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    fn sample_request() -> NormalizedRequest {
        NormalizedRequest {
            model: "deepseek-chat".to_string(),
            messages: vec![Message::user(1, "hi", 0)],
            tools: None,
            temperature: None,
            max_tokens: None,
            thinking_mode: ThinkingMode::Auto,
            stream: true,
        }
    }

    #[test]
    fn test_registry_resolves_named_vendors() {
        let registry = AdapterRegistry::new();
        for (model, _) in [
            ("glm-4.7", "glm"),
            ("kimi-k2.5", "kimi"),
            ("minimax-2.1", "minimax"),
            ("deepseek-chat", "deepseek"),
            ("local-model", "generic"),
        ] {
            assert!(registry.resolve(model).is_ok());
        }
    }

    #[test]
    fn test_generic_adapter_builds_chat_completions_url() {
        let registry = AdapterRegistry::new();
        let (adapter, creds) = registry.resolve("local-model").unwrap();
        let built = adapter.build_request(&sample_request(), &creds).unwrap();
        assert!(built.url.ends_with("/chat/completions"));
        assert_eq!(built.body["model"], "deepseek-chat");
        assert_eq!(built.body["stream"], true);
    }

    #[test]
    fn test_glm_adapter_adds_thinking_field() {
        let registry = AdapterRegistry::new();
        let (adapter, creds) = registry.resolve("glm-4.7").unwrap();
        let mut req = sample_request();
        req.thinking_mode = ThinkingMode::Enabled;
        let built = adapter.build_request(&req, &creds).unwrap();
        assert_eq!(built.body["thinking"]["type"], "enabled");
    }

    #[test]
    fn test_map_chunk_extracts_text_delta() {
        let wire = WireChunk {
            id: Some("1".into()),
            choices: vec![WireChoice {
                index: 0,
                delta: WireDelta {
                    content: Some("hi".into()),
                    reasoning_content: None,
                    tool_calls: None,
                },
                finish_reason: None,
            }],
            usage: None,
        };
        let chunk = map_openai_chunk(wire);
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("hi"));
    }

    #[test]
    fn test_classify_status_retryable_with_retry_after() {
        let err = classify_status(503, Some(2));
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(2)));
    }

    #[test]
    fn test_classify_status_terminal() {
        let err = classify_status(401, None);
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "AUTH_FAILED");
    }
}
