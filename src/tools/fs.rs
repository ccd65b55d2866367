//! Filesystem tools: `read_file`, `write_file`, and `batch_replace`.
//!
//! `batch_replace` applies every requested edit independently against the file's original
//! content (never against another operation's result), preserving CRLF-vs-LF and
//! trailing-newline presence. Replacement text is substituted with `regex::NoExpand` so `$1`,
//! `$&`, and similar sequences in `newText` are never interpreted as backreferences — the
//! Rust-idiomatic way to get the literal-replacement guarantee the specification calls for.

use super::schema::{Field, FieldType, ToolSchema};
use super::{ToolContext, ToolHandler};
use crate::types::ToolResult;
use async_trait::async_trait;
use regex::{Regex, NoExpand};
use serde_json::Value;

pub struct ReadFileTool {
    schema: ToolSchema,
}

impl ReadFileTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema::new(vec![Field::new("path", FieldType::String)]),
        }
    }
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }
    fn description(&self) -> &str {
        "Read a file's contents as UTF-8 text."
    }
    fn input_schema(&self) -> &ToolSchema {
        &self.schema
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let Some(path) = args["path"].as_str() else {
            return ToolResult::error("INVALID_ARGS", "path must be a string");
        };
        let resolved = ctx.working_dir.join(path);
        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => ToolResult::ok(content),
            Err(e) => ToolResult::error("EXECUTION_FAILED", format!("failed to read {path}: {e}")),
        }
    }
}

pub struct WriteFileTool {
    schema: ToolSchema,
}

impl WriteFileTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema::new(vec![
                Field::new("path", FieldType::String),
                Field::new("content", FieldType::String),
            ]),
        }
    }
}

impl Default for WriteFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }
    fn description(&self) -> &str {
        "Write UTF-8 text content to a file, creating parent directories as needed."
    }
    fn input_schema(&self) -> &ToolSchema {
        &self.schema
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let (Some(path), Some(content)) = (args["path"].as_str(), args["content"].as_str()) else {
            return ToolResult::error("INVALID_ARGS", "path and content must be strings");
        };
        let resolved = ctx.working_dir.join(path);
        if let Some(parent) = resolved.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::error("EXECUTION_FAILED", format!("failed to create parent dirs: {e}"));
            }
        }
        match tokio::fs::write(&resolved, content).await {
            Ok(()) => ToolResult::ok(format!("wrote {} bytes to {path}", content.len())),
            Err(e) => ToolResult::error("EXECUTION_FAILED", format!("failed to write {path}: {e}")),
        }
    }
}

struct LineEnding {
    crlf: bool,
    trailing_newline: bool,
}

fn detect_line_ending(content: &str) -> LineEnding {
    LineEnding {
        crlf: content.contains("\r\n"),
        trailing_newline: content.ends_with('\n'),
    }
}

fn split_lines(content: &str) -> Vec<String> {
    content.replace("\r\n", "\n").lines().map(String::from).collect()
}

fn join_lines(lines: &[String], ending: &LineEnding) -> String {
    let sep = if ending.crlf { "\r\n" } else { "\n" };
    let mut out = lines.join(sep);
    if ending.trailing_newline && !lines.is_empty() {
        out.push_str(sep);
    }
    out
}

struct ReplaceOp {
    line: usize,
    old_text: String,
    new_text: String,
}

fn parse_ops(value: &Value) -> Result<Vec<ReplaceOp>, String> {
    let Some(arr) = value.as_array() else {
        return Err("operations must be an array".to_string());
    };
    let mut ops = Vec::new();
    for (i, item) in arr.iter().enumerate() {
        let line = item["line"]
            .as_u64()
            .ok_or_else(|| format!("operations[{i}].line must be an integer"))? as usize;
        let old_text = item["oldText"]
            .as_str()
            .ok_or_else(|| format!("operations[{i}].oldText must be a string"))?
            .to_string();
        let new_text = item["newText"]
            .as_str()
            .ok_or_else(|| format!("operations[{i}].newText must be a string"))?
            .to_string();
        ops.push(ReplaceOp { line, old_text, new_text });
    }
    Ok(ops)
}

pub struct BatchReplaceTool {
    schema: ToolSchema,
}

impl BatchReplaceTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema::new(vec![
                Field::new("path", FieldType::String),
                Field::new("operations", FieldType::Array),
            ]),
        }
    }
}

impl Default for BatchReplaceTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for BatchReplaceTool {
    fn name(&self) -> &str {
        "batch_replace"
    }
    fn description(&self) -> &str {
        "Apply a batch of independent line-scoped text replacements to a file."
    }
    fn input_schema(&self) -> &ToolSchema {
        &self.schema
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let Some(path) = args["path"].as_str() else {
            return ToolResult::error("INVALID_ARGS", "path must be a string");
        };
        let ops = match parse_ops(&args["operations"]) {
            Ok(ops) => ops,
            Err(e) => return ToolResult::error("INVALID_ARGS", e),
        };
        if ops.is_empty() {
            return ToolResult::error("EMPTY_REPLACEMENTS", "operations must contain at least one replacement");
        }

        let resolved = ctx.working_dir.join(path);
        let original = match tokio::fs::read_to_string(&resolved).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error("EXECUTION_FAILED", format!("failed to read {path}: {e}")),
        };

        let ending = detect_line_ending(&original);
        let original_lines = split_lines(&original);
        let mut working_lines = original_lines.clone();

        let mut modified_count = 0u32;
        let mut failed_count = 0u32;
        let mut details = Vec::new();

        for op in &ops {
            let Some(source_line) = original_lines.get(op.line.saturating_sub(1)) else {
                failed_count += 1;
                details.push(serde_json::json!({"line": op.line, "success": false, "reason": "line out of range"}));
                continue;
            };
            if !source_line.contains(&op.old_text) {
                failed_count += 1;
                details.push(serde_json::json!({"line": op.line, "success": false, "reason": "oldText not found"}));
                continue;
            }
            let pattern = Regex::new(®ex::escape(&op.old_text)).expect("escaped pattern is always valid");
            let replaced = pattern.replacen(source_line, 1, NoExpand(&op.new_text)).into_owned();
            if let Some(slot) = working_lines.get_mut(op.line - 1) {
                *slot = replaced;
            }
            modified_count += 1;
            details.push(serde_json::json!({"line": op.line, "success": true}));
        }

        let new_content = join_lines(&working_lines, &ending);
        if let Err(e) = tokio::fs::write(&resolved, new_content).await {
            return ToolResult::error("EXECUTION_FAILED", format!("failed to write {path}: {e}"));
        }

        ToolResult::ok(format!("{modified_count} modified, {failed_count} failed"))
            .with_metadata("modifiedCount", serde_json::json!(modified_count))
            .with_metadata("failedCount", serde_json::json!(failed_count))
            .with_metadata("details", serde_json::json!(details))
    }
}
