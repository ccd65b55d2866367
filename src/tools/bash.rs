//! `bash` tool: runs a shell command, merges stdout+stderr, strips ANSI escapes, and
//! head/tail-truncates large output.

use super::schema::{Field, FieldType, ToolSchema};
use super::{ToolContext, ToolHandler};
use crate::types::ToolResult;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;

const TRUNCATE_THRESHOLD: usize = 10_000;
const HEAD_KEEP: usize = 4_000;
const TAIL_KEEP: usize = 4_000;

fn ansi_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("\x1b\\[[0-9;]*[A-Za-z]").unwrap())
}

fn strip_ansi(s: &str) -> String {
    ansi_pattern().replace_all(s, "").into_owned()
}

fn truncate_output(s: &str) -> String {
    if s.len() <= TRUNCATE_THRESHOLD {
        return s.to_string();
    }
    let head: String = s.chars().take(HEAD_KEEP).collect();
    let tail: String = s
        .chars()
        .rev()
        .take(TAIL_KEEP)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{head}\n...[{} bytes truncated]...\n{tail}", s.len() - HEAD_KEEP - TAIL_KEEP)
}

/// A rudimentary check that `command` isn't empty/whitespace-only before handing it to the
/// shell; the shell itself does the real POSIX parsing.
fn validate_command(command: &str) -> Result<(), String> {
    if command.trim().is_empty() {
        return Err("command must not be empty".to_string());
    }
    Ok(())
}

pub struct BashTool {
    schema: ToolSchema,
}

impl BashTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema::new(vec![
                Field::new("command", FieldType::String),
                Field::new("background", FieldType::Boolean).optional(),
            ]),
        }
    }
}

impl Default for BashTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a shell command and return its merged stdout/stderr output."
    }

    fn input_schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let Some(command) = args["command"].as_str() else {
            return ToolResult::error("INVALID_ARGS", "command must be a string");
        };
        if let Err(e) = validate_command(command) {
            return ToolResult::error("COMMAND_REQUIRED", e);
        }
        let background = args["background"].as_bool().unwrap_or(false);

        if background {
            return run_background(command, &ctx.working_dir).await;
        }

        run_foreground(command, &ctx.working_dir).await
    }
}

async fn run_foreground(command: &str, working_dir: &std::path::Path) -> ToolResult {
    // `2>&1` merges stderr into stdout at the shell level, matching the combined-output
    // semantics the tool promises regardless of how the two streams interleave.
    let output = Command::new("sh")
        .arg("-c")
        .arg(format!("{command} 2>&1"))
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .output()
        .await;

    let output = match output {
        Ok(o) => o,
        Err(e) => return ToolResult::error("EXECUTION_FAILED", format!("failed to spawn shell: {e}")),
    };

    let raw = String::from_utf8_lossy(&output.stdout).into_owned();
    let cleaned = truncate_output(&strip_ansi(&raw));
    let code = output.status.code().unwrap_or(-1);

    if code == 0 {
        ToolResult::ok(cleaned)
    } else {
        ToolResult::error(&format!("EXIT_CODE_{code}"), cleaned)
    }
}

async fn run_background(command: &str, working_dir: &std::path::Path) -> ToolResult {
    let log_path = std::env::temp_dir().join(format!("agent-core-bg-{}.log", uuid_like()));
    let log_file = match std::fs::File::create(&log_path) {
        Ok(f) => f,
        Err(e) => return ToolResult::error("EXECUTION_FAILED", format!("failed to create log file: {e}")),
    };
    let stdout_file = match log_file.try_clone() {
        Ok(f) => f,
        Err(e) => return ToolResult::error("EXECUTION_FAILED", format!("failed to clone log handle: {e}")),
    };

    let child = Command::new("sh")
        .arg("-c")
        .arg(format!("{command} 2>&1"))
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file))
        .stderr(Stdio::from(log_file))
        .kill_on_drop(false)
        .spawn();

    match child {
        Ok(mut child) => {
            let pid = child.id().unwrap_or(0);
            // Detach: we intentionally don't await the child. Dropping the handle without
            // `kill_on_drop` leaves the process running independently of this tool call.
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
            ToolResult::ok(format!("started in background (pid {pid})"))
                .with_metadata("pid", serde_json::json!(pid))
                .with_metadata("log_file", serde_json::json!(log_path.to_string_lossy()))
                .with_metadata("background", serde_json::json!(true))
        }
        Err(e) => ToolResult::error("EXECUTION_FAILED", format!("failed to spawn background shell: {e}")),
    }
}

fn uuid_like() -> String {
    use rand::Rng;
    let n: u64 = rand::thread_rng().r#gen();
    format!("{n:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ToolContext {
        ToolContext {
            cancel: tokio_util::sync::CancellationToken::new(),
            plan_mode: false,
            working_dir: std::env::temp_dir(),
        }
    }

    #[test]
    fn test_strip_ansi_removes_color_codes() {
        assert_eq!(strip_ansi("\x1b[31mred\x1b[0m"), "red");
    }

    #[test]
    fn test_truncate_output_short_unchanged() {
        assert_eq!(truncate_output("short"), "short");
    }

    #[test]
    fn test_truncate_output_long_keeps_head_and_tail() {
        let s = "a".repeat(20_000);
        let truncated = truncate_output(&s);
        assert!(truncated.len() < s.len());
        assert!(truncated.starts_with("aaaa"));
        assert!(truncated.ends_with("aaaa"));
    }

    #[tokio::test]
    async fn test_execute_success() {
        let tool = BashTool::new();
        let result = tool.execute(serde_json::json!({"command": "echo hi"}), &ctx()).await;
        assert!(result.success);
        assert!(result.output.contains("hi"));
    }

    #[tokio::test]
    async fn test_execute_nonzero_exit_reports_code() {
        let tool = BashTool::new();
        let result = tool.execute(serde_json::json!({"command": "exit 3"}), &ctx()).await;
        assert!(!result.success);
        assert_eq!(result.metadata["error"], "EXIT_CODE_3");
    }

    #[tokio::test]
    async fn test_execute_rejects_empty_command() {
        let tool = BashTool::new();
        let result = tool.execute(serde_json::json!({"command": "   "}), &ctx()).await;
        assert!(!result.success);
        assert_eq!(result.metadata["error"], "COMMAND_REQUIRED");
    }
}
