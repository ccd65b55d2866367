//! `glob` and `grep` tools: filesystem pattern matching and content search, read-only so both
//! are on the Plan Mode allowlist.

use super::schema::{Field, FieldType, ToolSchema};
use super::{ToolContext, ToolHandler};
use crate::types::ToolResult;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};

pub struct GlobTool {
    schema: ToolSchema,
}

impl GlobTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema::new(vec![Field::new("pattern", FieldType::String)]),
        }
    }
}

impl Default for GlobTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }
    fn description(&self) -> &str {
        "List files matching a glob pattern, relative to the working directory."
    }
    fn input_schema(&self) -> &ToolSchema {
        &self.schema
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let Some(pattern) = args["pattern"].as_str() else {
            return ToolResult::error("INVALID_ARGS", "pattern must be a string");
        };
        let full_pattern = ctx.working_dir.join(pattern);
        let pattern_str = full_pattern.to_string_lossy().into_owned();
        let working_dir = ctx.working_dir.clone();

        let matches = tokio::task::spawn_blocking(move || -> Result<Vec<String>, String> {
            let paths = glob::glob(&pattern_str).map_err(|e| e.to_string())?;
            let mut out = Vec::new();
            for entry in paths {
                match entry {
                    Ok(path) => {
                        let rel = path.strip_prefix(&working_dir).unwrap_or(&path);
                        out.push(rel.to_string_lossy().into_owned());
                    }
                    Err(e) => return Err(e.to_string()),
                }
            }
            Ok(out)
        })
        .await;

        match matches {
            Ok(Ok(paths)) => ToolResult::ok(paths.join("\n")).with_metadata("count", serde_json::json!(paths.len())),
            Ok(Err(e)) => ToolResult::error("INVALID_ARGS", format!("bad glob pattern: {e}")),
            Err(e) => ToolResult::error("EXECUTION_FAILED", format!("glob task panicked: {e}")),
        }
    }
}

pub struct GrepTool {
    schema: ToolSchema,
}

impl GrepTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema::new(vec![
                Field::new("pattern", FieldType::String),
                Field::new("path", FieldType::String).optional(),
            ]),
        }
    }
}

impl Default for GrepTool {
    fn default() -> Self {
        Self::new()
    }
}

async fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut stack = vec![root.to_path_buf()];
    let mut files = Vec::new();
    while let Some(dir) = stack.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            match entry.file_type().await {
                Ok(ft) if ft.is_dir() => stack.push(path),
                Ok(ft) if ft.is_file() => files.push(path),
                _ => {}
            }
        }
    }
    files
}

#[async_trait]
impl ToolHandler for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }
    fn description(&self) -> &str {
        "Search files under a path for lines matching a regular expression."
    }
    fn input_schema(&self) -> &ToolSchema {
        &self.schema
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let Some(pattern) = args["pattern"].as_str() else {
            return ToolResult::error("INVALID_ARGS", "pattern must be a string");
        };
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => return ToolResult::error("INVALID_ARGS", format!("bad regex: {e}")),
        };
        let rel_path = args["path"].as_str().unwrap_or(".");
        let search_root = ctx.working_dir.join(rel_path);

        let is_file = tokio::fs::metadata(&search_root)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        let files = if is_file {
            vec![search_root.clone()]
        } else {
            walk_files(&search_root).await
        };

        let mut matches = Vec::new();
        for file in &files {
            let Ok(content) = tokio::fs::read_to_string(file).await else {
                continue;
            };
            let rel = file.strip_prefix(&ctx.working_dir).unwrap_or(file);
            for (i, line) in content.lines().enumerate() {
                if re.is_match(line) {
                    matches.push(format!("{}:{}: {}", rel.display(), i + 1, line));
                }
            }
        }

        ToolResult::ok(matches.join("\n")).with_metadata("count", serde_json::json!(matches.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(dir: &Path) -> ToolContext {
        ToolContext {
            cancel: tokio_util::sync::CancellationToken::new(),
            plan_mode: false,
            working_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_glob_finds_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.rs"), "").await.unwrap();
        tokio::fs::write(dir.path().join("b.txt"), "").await.unwrap();

        let tool = GlobTool::new();
        let result = tool.execute(serde_json::json!({"pattern": "*.rs"}), &ctx(dir.path())).await;
        assert!(result.success);
        assert!(result.output.contains("a.rs"));
        assert!(!result.output.contains("b.txt"));
    }

    #[tokio::test]
    async fn test_grep_finds_matching_lines_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        tokio::fs::create_dir_all(&sub).await.unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "hello\nworld\n").await.unwrap();
        tokio::fs::write(sub.join("b.txt"), "hello again\n").await.unwrap();

        let tool = GrepTool::new();
        let result = tool.execute(serde_json::json!({"pattern": "hello"}), &ctx(dir.path())).await;
        assert!(result.success);
        assert_eq!(result.metadata["count"], 2);
    }

    #[tokio::test]
    async fn test_grep_rejects_bad_regex() {
        let dir = tempfile::tempdir().unwrap();
        let tool = GrepTool::new();
        let result = tool.execute(serde_json::json!({"pattern": "("}), &ctx(dir.path())).await;
        assert!(!result.success);
        assert_eq!(result.metadata["error"], "INVALID_ARGS");
    }
}
