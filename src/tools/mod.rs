//! Tool Registry & Executor: schema-validated, timeout-bounded, Plan-Mode-gated dispatch of
//! model-requested tool calls.
//!
//! Keeps the teacher SDK's `Tool`/type-erased-handler shape (a trait object behind `Arc` so
//! cloning the registry is cheap and handlers can close over their own state) but replaces its
//! `ToolHandler = Arc<dyn Fn(Value) -> Pin<Box<dyn Future<...>>>>` closure type with a proper
//! `#[async_trait]` trait, which is a better fit for the richer per-call context (cancellation
//! token, Plan Mode flag) and per-tool schema/timeout metadata this registry tracks that the
//! teacher's `Tool` struct never needed.

pub mod bash;
pub mod fs;
pub mod schema;
pub mod search;

use crate::types::ToolResult;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use schema::ToolSchema;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_PARALLELISM: usize = 4;

/// Per-call execution context passed to every tool.
#[derive(Clone)]
pub struct ToolContext {
    pub cancel: CancellationToken,
    pub plan_mode: bool,
    pub working_dir: std::path::PathBuf,
}

/// One registered tool. Handlers never let an error escape to the caller: [`ToolHandler::execute`]
/// always returns a [`ToolResult`], using `ToolResult::error` to report failure.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> &ToolSchema;
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult;
}

struct Registration {
    handler: Arc<dyn ToolHandler>,
    timeout: Duration,
}

/// Holds every registered tool plus the Plan Mode allow/blocklist, and dispatches calls with
/// bounded concurrency.
pub struct ToolRegistry {
    tools: HashMap<String, Registration>,
    plan_mode_allowlist: HashSet<String>,
    parallelism: usize,
}

const PLAN_MODE_BLOCKLIST: &[&str] = &["write_file", "precise_replace", "batch_replace", "bash"];

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            plan_mode_allowlist: [
                "read_file",
                "glob",
                "grep",
                "web_fetch",
                "web_search",
                "plan_create",
                "task_read",
                "skill",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            parallelism: DEFAULT_PARALLELISM,
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn register(&mut self, handler: impl ToolHandler + 'static) {
        self.register_with_timeout(handler, DEFAULT_TIMEOUT);
    }

    pub fn register_with_timeout(&mut self, handler: impl ToolHandler + 'static, timeout: Duration) {
        let name = handler.name().to_string();
        self.tools.insert(
            name,
            Registration {
                handler: Arc::new(handler),
                timeout: timeout.min(MAX_TIMEOUT),
            },
        );
    }

    /// OpenAI-format `tools` array for every registered tool, to attach to each outbound
    /// request so the model knows what it can call.
    pub fn tool_definitions(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|r| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": r.handler.name(),
                        "description": r.handler.description(),
                        "parameters": r.handler.input_schema().to_openai_schema(),
                    }
                })
            })
            .collect()
    }

    fn is_forbidden_in_plan_mode(&self, name: &str) -> bool {
        if self.plan_mode_allowlist.contains(name) {
            return false;
        }
        PLAN_MODE_BLOCKLIST.contains(&name) || !self.plan_mode_allowlist.contains(name)
    }

    /// Run the full invocation protocol for one call: lookup, Plan Mode gating, argument
    /// parsing, schema validation, timeout-bounded execution. Never returns `Err` — every
    /// failure mode is encoded in the returned [`ToolResult`].
    pub async fn invoke(&self, name: &str, raw_args: &str, ctx: &ToolContext) -> ToolResult {
        let Some(registration) = self.tools.get(name) else {
            return ToolResult::error("TOOL_NOT_FOUND", format!("no such tool: {name}"));
        };

        if ctx.plan_mode && self.is_forbidden_in_plan_mode(name) {
            return ToolResult::error(
                "TOOL_FORBIDDEN_IN_PLAN_MODE",
                format!("{name} is not permitted while in plan mode"),
            );
        }

        let args: Value = match serde_json::from_str(raw_args) {
            Ok(v) => v,
            Err(e) => return ToolResult::error("INVALID_ARGS", format!("failed to parse arguments: {e}")),
        };

        if let Err(detail) = registration.handler.input_schema().validate(&args) {
            return ToolResult::error("SCHEMA_VIOLATION", detail);
        }

        let exec_fut = registration.handler.execute(args, ctx);
        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return ToolResult::error("ABORTED", "cancelled before completion"),
            outcome = tokio::time::timeout(registration.timeout, exec_fut) => outcome,
        };

        match result {
            Ok(tool_result) => tool_result,
            Err(_) => ToolResult::error(
                "EXECUTION_FAILED",
                format!("{name} exceeded its {}s timeout", registration.timeout.as_secs()),
            ),
        }
    }

    /// Dispatch every call in `calls` (id, name, raw_args) with bounded concurrency, returning
    /// results paired with their call id in the same order `calls` was given, regardless of
    /// completion order.
    pub async fn invoke_many(
        &self,
        calls: Vec<(String, String, String)>,
        ctx: &ToolContext,
    ) -> Vec<(String, ToolResult)> {
        let mut indexed: HashMap<usize, (String, ToolResult)> = HashMap::new();
        let mut pending: FuturesUnordered<_> = FuturesUnordered::new();
        let mut iter = calls.into_iter().enumerate();

        for _ in 0..self.parallelism {
            if let Some((idx, (id, name, raw_args))) = iter.next() {
                pending.push(self.run_indexed(idx, id, name, raw_args, ctx));
            }
        }

        let mut results = Vec::new();
        while let Some((idx, id, result)) = pending.next().await {
            results.push((idx, id, result));
            if let Some((idx, (id, name, raw_args))) = iter.next() {
                pending.push(self.run_indexed(idx, id, name, raw_args, ctx));
            }
        }

        results.sort_by_key(|(idx, _, _)| *idx);
        results.into_iter().map(|(_, id, result)| (id, result)).collect()
    }

    async fn run_indexed(
        &self,
        idx: usize,
        id: String,
        name: String,
        raw_args: String,
        ctx: &ToolContext,
    ) -> (usize, String, ToolResult) {
        let result = self.invoke(&name, &raw_args, ctx).await;
        (idx, id, result)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{Field, FieldType};

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn input_schema(&self) -> &ToolSchema {
            static SCHEMA: std::sync::OnceLock<ToolSchema> = std::sync::OnceLock::new();
            SCHEMA.get_or_init(|| ToolSchema::new(vec![Field::new("text", FieldType::String)]))
        }
        async fn execute(&self, args: Value, _ctx: &ToolContext) -> ToolResult {
            ToolResult::ok(args["text"].as_str().unwrap_or_default())
        }
    }

    struct Slow;

    #[async_trait]
    impl ToolHandler for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "never returns within the test timeout"
        }
        fn input_schema(&self) -> &ToolSchema {
            static SCHEMA: std::sync::OnceLock<ToolSchema> = std::sync::OnceLock::new();
            SCHEMA.get_or_init(|| ToolSchema::new(vec![]))
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> ToolResult {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            ToolResult::ok("unreachable")
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            cancel: CancellationToken::new(),
            plan_mode: false,
            working_dir: std::env::temp_dir(),
        }
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool() {
        let registry = ToolRegistry::new();
        let result = registry.invoke("nope", "{}", &ctx()).await;
        assert!(!result.success);
        assert_eq!(result.metadata["error"], "TOOL_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo);
        let result = registry.invoke("echo", r#"{"text":"hi"}"#, &ctx()).await;
        assert!(result.success);
        assert_eq!(result.output, "hi");
    }

    #[tokio::test]
    async fn test_invoke_invalid_json() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo);
        let result = registry.invoke("echo", "not json", &ctx()).await;
        assert_eq!(result.metadata["error"], "INVALID_ARGS");
    }

    #[tokio::test]
    async fn test_invoke_schema_violation() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo);
        let result = registry.invoke("echo", "{}", &ctx()).await;
        assert_eq!(result.metadata["error"], "SCHEMA_VIOLATION");
    }

    #[tokio::test]
    async fn test_plan_mode_blocks_bash_shaped_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo);
        let mut plan_ctx = ctx();
        plan_ctx.plan_mode = true;
        // "echo" isn't on the allowlist, so plan mode forbids it even though it isn't
        // literally in the hardcoded blocklist, matching "anything not read-only" semantics.
        let result = registry.invoke("echo", r#"{"text":"hi"}"#, &plan_ctx).await;
        assert_eq!(result.metadata["error"], "TOOL_FORBIDDEN_IN_PLAN_MODE");
    }

    #[tokio::test]
    async fn test_timeout_produces_execution_failed() {
        let mut registry = ToolRegistry::new();
        registry.register_with_timeout(Slow, Duration::from_millis(20));
        let result = registry.invoke("slow", "{}", &ctx()).await;
        assert_eq!(result.metadata["error"], "EXECUTION_FAILED");
    }

    #[tokio::test]
    async fn test_invoke_many_preserves_call_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo);
        let calls = vec![
            ("c1".to_string(), "echo".to_string(), r#"{"text":"a"}"#.to_string()),
            ("c2".to_string(), "echo".to_string(), r#"{"text":"b"}"#.to_string()),
            ("c3".to_string(), "echo".to_string(), r#"{"text":"c"}"#.to_string()),
        ];
        let results = registry.invoke_many(calls, &ctx()).await;
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
    }
}
