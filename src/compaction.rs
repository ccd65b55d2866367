//! Context Compactor: decides when a session's history has grown too large and replaces an
//! older slice with a generated summary message.
//!
//! `estimate_tokens` generalizes the teacher SDK's `context::estimate_tokens` character-based
//! heuristic (`~4 chars/token` plus fixed per-message/per-conversation overhead) to also count
//! tool-call argument and tool-result bytes, which the teacher's content-block model already
//! priced in but the new flat `Message` shape needs to price explicitly. `truncate_messages`'s
//! system-preserving, keep-last-N shape is replaced here with tail-preserving slice selection
//! that additionally keeps tool-call/tool-result pairs intact, since an orphaned tool result
//! with no matching call confuses providers that validate the pairing.

use crate::types::{Message, MessageRole};

/// Tunable thresholds controlling when and how much to compact. Defaults match the
/// specification's recorded Open Question resolution.
#[derive(Debug, Clone, Copy)]
pub struct CompactionConfig {
    /// Compact once the session holds at least this many messages.
    pub keep_messages_threshold: usize,
    /// Compact once estimated tokens reach this fraction of `model_context_limit`.
    pub trigger_ratio: f64,
    pub model_context_limit: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            keep_messages_threshold: 40,
            trigger_ratio: 0.90,
            model_context_limit: 32_000,
        }
    }
}

/// Character-based token estimate: ~4 characters per token, with fixed overhead per message
/// and per conversation, plus tool-call argument/result bytes (dropped entirely by the
/// teacher's original heuristic since it never separated tool payloads from message text).
pub fn estimate_tokens(messages: &[Message]) -> usize {
    if messages.is_empty() {
        return 0;
    }

    let mut total_chars = 0usize;
    for message in messages {
        total_chars += 8; // role formatting overhead
        total_chars += message.content.len();
        if let Some(reasoning) = &message.reasoning_content {
            total_chars += reasoning.len();
        }
        if let Some(tool_calls) = &message.tool_calls {
            for call in tool_calls {
                total_chars += call.name.len();
                total_chars += call.arguments.len();
                if let Some(result) = &call.result {
                    total_chars += result.to_string().len();
                }
            }
        }
    }
    total_chars += 16; // conversation-level overhead

    (total_chars + 3) / 4
}

/// True if `messages` should be compacted under `config`.
pub fn should_compact(messages: &[Message], config: &CompactionConfig) -> bool {
    if messages.len() >= config.keep_messages_threshold {
        return true;
    }
    let estimated = estimate_tokens(messages) as f64;
    let limit = config.model_context_limit as f64;
    limit > 0.0 && estimated / limit >= config.trigger_ratio
}

/// Index (exclusive) up to which the prefix should be summarized, given the keep-tail policy:
/// retain the last `keep_messages_threshold / 2` messages, but widen the kept tail backward if
/// needed so a tool-result message is never kept without the assistant message carrying its
/// matching call.
pub fn compaction_split_point(messages: &[Message], config: &CompactionConfig) -> usize {
    let keep = (config.keep_messages_threshold / 2).max(1);
    let mut split = messages.len().saturating_sub(keep);

    // System prompt, if first, is always summarized away with the rest of the prefix; it gets
    // folded into the summary's content by the caller, not kept verbatim.
    while split > 0 && split < messages.len() {
        let msg = &messages[split];
        let needs_pairing = msg.role == MessageRole::Tool
            || (msg.role == MessageRole::Assistant && msg.tool_calls.is_some());
        if !needs_pairing {
            break;
        }
        // Walk back to the start of this call/result run so we don't split a pair.
        let is_orphaned_result = msg.role == MessageRole::Tool
            && split > 0
            && !matches!(messages[split - 1].role, MessageRole::Assistant);
        if msg.role == MessageRole::Tool && !is_orphaned_result {
            split -= 1;
            continue;
        }
        break;
    }
    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, ToolCall};

    #[test]
    fn test_estimate_tokens_empty() {
        assert_eq!(estimate_tokens(&[]), 0);
    }

    #[test]
    fn test_estimate_tokens_counts_tool_call_bytes() {
        let call = ToolCall::new("call_1", "bash", "{\"cmd\":\"ls -la\"}");
        let msg = Message::assistant_tool_calls(1, "", vec![call], 0);
        let with_tool = estimate_tokens(std::slice::from_ref(&msg));
        let plain = estimate_tokens(&[Message::assistant_text(1, "", 0)]);
        assert!(with_tool > plain);
    }

    #[test]
    fn test_should_compact_triggers_on_message_count() {
        let config = CompactionConfig::default();
        let messages: Vec<Message> = (0..config.keep_messages_threshold)
            .map(|i| Message::user(i as u64, "hi", 0))
            .collect();
        assert!(should_compact(&messages, &config));
    }

    #[test]
    fn test_should_compact_false_for_small_session() {
        let config = CompactionConfig::default();
        let messages = vec![Message::user(1, "hi", 0)];
        assert!(!should_compact(&messages, &config));
    }

    #[test]
    fn test_split_point_keeps_tail_pairs_intact() {
        let config = CompactionConfig {
            keep_messages_threshold: 4,
            ..CompactionConfig::default()
        };
        let call = ToolCall::new("call_1", "bash", "{}");
        let messages = vec![
            Message::user(1, "q1", 0),
            Message::user(2, "q2", 0),
            Message::user(3, "q3", 0),
            Message::assistant_tool_calls(4, "", vec![call], 0),
            Message::tool_result(5, "call_1", "ok", 0),
        ];
        let split = compaction_split_point(&messages, &config);
        // split must not land between the assistant tool-call message and its tool result.
        if split > 0 && split < messages.len() {
            assert!(!(messages[split].role == MessageRole::Tool));
        }
    }
}
