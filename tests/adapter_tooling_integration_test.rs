//! Integration test verifying the Provider Adapter builds a request whose `tools` array is
//! exactly what the Tool Registry advertises, across every named vendor, since the Agent Loop
//! wires these two modules together at every turn but each module's own unit tests exercise
//! them independently.

use agent_core::{
    AdapterRegistry, BashTool, Message, NormalizedRequest, ReadFileTool, ThinkingMode, ToolRegistry,
};
use std::sync::Mutex;

// Vendor credential env vars are process-global; serialize tests that touch them.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for var in ["LLM_API_KEY", "LLM_BASE_URL", "GLM_API_KEY", "GLM_API_BASE", "KIMI_API_KEY", "MINIMAX_API_KEY", "DEEPSEEK_API_KEY"] {
        unsafe { std::env::remove_var(var) };
    }
}

#[test]
fn test_built_request_tools_array_matches_registry_definitions() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut tools = ToolRegistry::new();
    tools.register(ReadFileTool::new());
    tools.register(BashTool::new());
    let defs = tools.tool_definitions();

    let request = NormalizedRequest {
        model: "deepseek-chat".to_string(),
        messages: vec![Message::user(1, "list the files here", 0)],
        tools: Some(defs.clone()),
        temperature: None,
        max_tokens: None,
        thinking_mode: ThinkingMode::Auto,
        stream: true,
    };

    let registry = AdapterRegistry::new();
    let (adapter, creds) = registry.resolve(&request.model).unwrap();
    let built = adapter.build_request(&request, &creds).unwrap();

    let built_tools = built.body["tools"].as_array().unwrap();
    assert_eq!(built_tools.len(), defs.len());
    let names: Vec<&str> = built_tools.iter().map(|t| t["function"]["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"read_file"));
    assert!(names.contains(&"bash"));
}

#[test]
fn test_empty_registry_omits_tools_field_entirely() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let tools = ToolRegistry::new();
    let defs = tools.tool_definitions();
    assert!(defs.is_empty());

    let request = NormalizedRequest {
        model: "local-model".to_string(),
        messages: vec![Message::user(1, "hi", 0)],
        tools: None,
        temperature: None,
        max_tokens: None,
        thinking_mode: ThinkingMode::Auto,
        stream: true,
    };
    let registry = AdapterRegistry::new();
    let (adapter, creds) = registry.resolve(&request.model).unwrap();
    let built = adapter.build_request(&request, &creds).unwrap();
    assert!(built.body.get("tools").is_none());
}
