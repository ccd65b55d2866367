//! Integration tests for the Tool Registry wired up with its concrete tools, the way a
//! consumer of the crate would actually assemble one.

use agent_core::{BashTool, GlobTool, GrepTool, ReadFileTool, ToolContext, ToolRegistry, WriteFileTool};
use tokio_util::sync::CancellationToken;

fn ctx(dir: &std::path::Path, plan_mode: bool) -> ToolContext {
    ToolContext {
        cancel: CancellationToken::new(),
        plan_mode,
        working_dir: dir.to_path_buf(),
    }
}

fn full_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ReadFileTool::new());
    registry.register(WriteFileTool::new());
    registry.register(GlobTool::new());
    registry.register(GrepTool::new());
    registry.register(BashTool::new());
    registry
}

#[tokio::test]
async fn test_tool_definitions_cover_every_registered_tool() {
    let registry = full_registry();
    let defs = registry.tool_definitions();
    let names: Vec<&str> = defs.iter().map(|d| d["function"]["name"].as_str().unwrap()).collect();
    for expected in ["read_file", "write_file", "glob", "grep", "bash"] {
        assert!(names.contains(&expected), "missing {expected} in {names:?}");
    }
}

#[tokio::test]
async fn test_write_then_read_round_trip_through_registry() {
    let dir = tempfile::tempdir().unwrap();
    let registry = full_registry();
    let write_result = registry
        .invoke("write_file", r#"{"path":"note.txt","content":"hello agent"}"#, &ctx(dir.path(), false))
        .await;
    assert!(write_result.success);

    let read_result = registry.invoke("read_file", r#"{"path":"note.txt"}"#, &ctx(dir.path(), false)).await;
    assert_eq!(read_result.output, "hello agent");
}

#[tokio::test]
async fn test_plan_mode_allows_read_only_tools_and_blocks_mutating_ones() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("a.txt"), "needle here\n").await.unwrap();
    let registry = full_registry();

    let grep = registry.invoke("grep", r#"{"pattern":"needle"}"#, &ctx(dir.path(), true)).await;
    assert!(grep.success);

    let write = registry
        .invoke("write_file", r#"{"path":"x.txt","content":"x"}"#, &ctx(dir.path(), true))
        .await;
    assert!(!write.success);
    assert_eq!(write.metadata["error"], "TOOL_FORBIDDEN_IN_PLAN_MODE");

    let bash = registry.invoke("bash", r#"{"command":"echo hi"}"#, &ctx(dir.path(), true)).await;
    assert!(!bash.success);
    assert_eq!(bash.metadata["error"], "TOOL_FORBIDDEN_IN_PLAN_MODE");
}

#[tokio::test]
async fn test_invoke_many_across_mixed_tools_preserves_call_order() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("a.rs"), "").await.unwrap();
    let registry = full_registry();

    let calls = vec![
        ("c1".to_string(), "bash".to_string(), r#"{"command":"echo one"}"#.to_string()),
        ("c2".to_string(), "glob".to_string(), r#"{"pattern":"*.rs"}"#.to_string()),
        ("c3".to_string(), "read_file".to_string(), r#"{"path":"missing.txt"}"#.to_string()),
    ];
    let results = registry.invoke_many(calls, &ctx(dir.path(), false)).await;
    let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2", "c3"]);
    assert!(results[0].1.success);
    assert!(results[1].1.success);
    assert!(!results[2].1.success);
}
