//! Agent-level streaming events.
//!
//! `AgentStreamEvent` is what a streaming consumer sees of a run: every
//! state change, each thought, every tool call and its result, the final
//! answer in chunks, and one terminal `done` or `failed`.

use serde::{Deserialize, Serialize};

use crate::context::BudgetState;
use crate::loop_runner::LoopState;

/// Events emitted by the agent loop while it runs.
///
/// - `state_changed`: the loop moved to a new state
/// - `thought`      : reasoning from a parsed completion
/// - `tool_call`    : a tool is about to be dispatched
/// - `tool_result`  : a tool call finished
/// - `chunk`        : part of the final answer
/// - `done`         : the run finished with an answer
/// - `failed`       : the run ended without one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    StateChanged { from: LoopState, to: LoopState },

    Thought { content: String },

    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// Part of the final answer, in order.
    Chunk { content: String },

    Done {
        conversation_id: String,
        budget: BudgetState,
        tool_calls_made: usize,
    },

    Failed {
        conversation_id: String,
        reason: String,
        partial_answer: Option<String>,
    },
}

impl AgentStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "state_changed",
            Self::Thought { .. } => "thought",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Chunk { .. } => "chunk",
            Self::Done { .. } => "done",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_state_changed() {
        let event = AgentStreamEvent::StateChanged {
            from: LoopState::Thinking,
            to: LoopState::Acting,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"state_changed""#));
        assert!(json.contains(r#""from":"thinking""#));
        assert!(json.contains(r#""to":"acting""#));
    }

    #[test]
    fn event_serialization_tool_call() {
        let event = AgentStreamEvent::ToolCall {
            id: "call_1".into(),
            name: "local_search".into(),
            input: serde_json::json!({"query": "rust"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));
        assert!(json.contains(r#""name":"local_search""#));
    }

    #[test]
    fn event_serialization_done() {
        let event = AgentStreamEvent::Done {
            conversation_id: "abc".into(),
            budget: BudgetState {
                tokens_consumed: 120,
                iteration_count: 2,
                max_tokens: 1000,
                max_iterations: 10,
            },
            tool_calls_made: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""iteration_count":2"#));
        assert!(event.is_terminal());
    }

    #[test]
    fn event_type_names() {
        let cases = [
            (
                AgentStreamEvent::Thought {
                    content: "x".into(),
                },
                "thought",
            ),
            (
                AgentStreamEvent::ToolResult {
                    id: "a".into(),
                    name: "b".into(),
                    output: "c".into(),
                    success: true,
                },
                "tool_result",
            ),
            (
                AgentStreamEvent::Chunk {
                    content: "x".into(),
                },
                "chunk",
            ),
            (
                AgentStreamEvent::Failed {
                    conversation_id: "x".into(),
                    reason: "cancelled".into(),
                    partial_answer: None,
                },
                "failed",
            ),
        ];
        for (event, name) in cases {
            assert_eq!(event.event_type(), name);
        }
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"chunk","content":"hi"}"#;
        let event: AgentStreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            AgentStreamEvent::Chunk {
                content: "hi".into()
            }
        );
        assert!(!event.is_terminal());
    }
}
