//! Conversation and turn domain types.
//!
//! A conversation is the transcript of one user query: the rendered system
//! prompt, the query itself, and every thought, action, observation and
//! directive the loop produced on the way to an answer. Turn order is
//! enforced on every push.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConversationError;
use crate::tool::{ToolCall, ToolResult};

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a turn represents in the think/act/observe cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    /// The rendered system prompt.
    System,
    /// The user's query.
    User,
    /// The model's reasoning for this step.
    AgentThought,
    /// Tool calls the model requested.
    AgentAction,
    /// Results of one action's tool calls.
    ToolObservation,
    /// Instruction injected by the controller (correction, "conclude now").
    Directive,
    /// The model's final answer. Nothing may follow it.
    AgentResponse,
}

impl TurnKind {
    /// Agent-authored turns are replayed to the provider as assistant text.
    pub fn is_agent(&self) -> bool {
        matches!(
            self,
            Self::AgentThought | Self::AgentAction | Self::AgentResponse
        )
    }
}

impl std::fmt::Display for TurnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::System => "system",
            Self::User => "user",
            Self::AgentThought => "agent thought",
            Self::AgentAction => "agent action",
            Self::ToolObservation => "tool observation",
            Self::Directive => "directive",
            Self::AgentResponse => "agent response",
        };
        f.write_str(name)
    }
}

/// A single entry in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub kind: TurnKind,

    /// Plain text: the thought, the answer, the query, or formatted observations.
    pub content: String,

    /// Wire text for agent turns, as produced by the active response grammar.
    /// Replayed to the provider instead of `content` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,

    pub timestamp: DateTime<Utc>,
}

impl Turn {
    fn new(kind: TurnKind, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            content: content.into(),
            rendered: None,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(TurnKind::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnKind::User, content)
    }

    pub fn thought(content: impl Into<String>) -> Self {
        Self::new(TurnKind::AgentThought, content)
    }

    pub fn action(calls: Vec<ToolCall>) -> Self {
        let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
        let mut turn = Self::new(TurnKind::AgentAction, names.join(", "));
        turn.tool_calls = calls;
        turn
    }

    /// An observation turn; `content` lists every result in call order.
    pub fn observation(results: Vec<ToolResult>) -> Self {
        let content = results
            .iter()
            .map(ToolResult::render)
            .collect::<Vec<_>>()
            .join("\n\n");
        let mut turn = Self::new(TurnKind::ToolObservation, content);
        turn.tool_results = results;
        turn
    }

    pub fn directive(content: impl Into<String>) -> Self {
        Self::new(TurnKind::Directive, content)
    }

    pub fn response(content: impl Into<String>) -> Self {
        Self::new(TurnKind::AgentResponse, content)
    }

    /// Attach the grammar's wire rendering of this turn.
    pub fn with_rendered(mut self, rendered: impl Into<String>) -> Self {
        self.rendered = Some(rendered.into());
        self
    }

    /// The text sent to the provider for this turn.
    pub fn wire_text(&self) -> &str {
        self.rendered.as_deref().unwrap_or(&self.content)
    }
}

/// Chat roles understood by generation providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A flattened message handed to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// An ordered, grammar-checked sequence of turns for one user query.
///
/// Deserialising replays every turn through [`Conversation::push`], so a
/// stored transcript is held to the same turn order as a live one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "StoredConversation")]
pub struct Conversation {
    pub id: ConversationId,
    turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a turn, rejecting it if it would break the turn order.
    pub fn push(&mut self, turn: Turn) -> Result<(), ConversationError> {
        let last = self.turns.last().map(|t| t.kind);
        if last == Some(TurnKind::AgentResponse) {
            return Err(ConversationError::Closed);
        }

        let allowed = match turn.kind {
            TurnKind::System => last.is_none(),
            TurnKind::User => matches!(last, None | Some(TurnKind::System)),
            TurnKind::AgentThought => matches!(
                last,
                Some(TurnKind::User | TurnKind::ToolObservation | TurnKind::Directive)
            ),
            TurnKind::AgentAction | TurnKind::AgentResponse => {
                last == Some(TurnKind::AgentThought)
            }
            TurnKind::ToolObservation => last == Some(TurnKind::AgentAction),
            TurnKind::Directive => last.is_some_and(|k| k != TurnKind::AgentThought),
        };

        if !allowed {
            return Err(ConversationError::TurnOrder {
                turn: turn.kind.to_string(),
                after: last.map_or_else(|| "nothing".to_string(), |k| k.to_string()),
            });
        }

        self.updated_at = Utc::now();
        self.turns.push(turn);
        Ok(())
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// True once a final response has been recorded.
    pub fn is_closed(&self) -> bool {
        self.last().is_some_and(|t| t.kind == TurnKind::AgentResponse)
    }

    /// Every tool result observed so far, in order.
    pub fn observations(&self) -> impl Iterator<Item = &ToolResult> {
        self.turns.iter().flat_map(|t| t.tool_results.iter())
    }

    /// Flatten into provider chat messages.
    ///
    /// Consecutive agent turns (a thought and the action or response that
    /// follows it) become one assistant message. Observations and directives
    /// are sent back as user messages.
    pub fn to_chat_messages(&self) -> Vec<ChatMessage> {
        let mut messages: Vec<ChatMessage> = Vec::with_capacity(self.turns.len());
        let mut previous_agent = false;

        for turn in &self.turns {
            let role = match turn.kind {
                TurnKind::System => Role::System,
                TurnKind::User | TurnKind::ToolObservation | TurnKind::Directive => Role::User,
                _ => Role::Assistant,
            };

            if turn.kind.is_agent() && previous_agent {
                if let Some(last) = messages.last_mut() {
                    last.content.push('\n');
                    last.content.push_str(turn.wire_text());
                    continue;
                }
            }

            previous_agent = turn.kind.is_agent();
            messages.push(ChatMessage {
                role,
                content: turn.wire_text().to_string(),
            });
        }

        messages
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire shape of a conversation before its turns are checked.
#[derive(Deserialize)]
struct StoredConversation {
    id: ConversationId,
    turns: Vec<Turn>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StoredConversation> for Conversation {
    type Error = ConversationError;

    fn try_from(stored: StoredConversation) -> Result<Self, Self::Error> {
        let mut conversation = Conversation {
            id: stored.id,
            turns: Vec::with_capacity(stored.turns.len()),
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        };
        for turn in stored.turns {
            conversation.push(turn)?;
        }
        conversation.updated_at = stored.updated_at;
        Ok(conversation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments: json!({"query": "ai"}),
        }
    }

    fn started() -> Conversation {
        let mut conv = Conversation::new();
        conv.push(Turn::system("You are helpful.")).unwrap();
        conv.push(Turn::user("What is RAG?")).unwrap();
        conv
    }

    #[test]
    fn full_cycle_is_accepted() {
        let mut conv = started();
        let created = conv.created_at;

        conv.push(Turn::thought("search first")).unwrap();
        conv.push(Turn::action(vec![call("local_search")])).unwrap();
        conv.push(Turn::observation(vec![ToolResult::success(
            "call_1",
            "local_search",
            "RAG means retrieval augmented generation",
        )]))
        .unwrap();
        conv.push(Turn::thought("I know now")).unwrap();
        conv.push(Turn::response("Retrieval augmented generation.")).unwrap();

        assert_eq!(conv.len(), 7);
        assert!(conv.is_closed());
        assert!(conv.updated_at >= created);
        assert_eq!(conv.observations().count(), 1);
    }

    #[test]
    fn rejects_out_of_order_turns() {
        let mut conv = started();

        let err = conv.push(Turn::action(vec![call("local_search")])).unwrap_err();
        assert!(matches!(err, ConversationError::TurnOrder { .. }));

        let err = conv.push(Turn::system("again")).unwrap_err();
        assert!(matches!(err, ConversationError::TurnOrder { .. }));

        conv.push(Turn::thought("hmm")).unwrap();
        let err = conv.push(Turn::directive("fix it")).unwrap_err();
        assert!(matches!(err, ConversationError::TurnOrder { .. }));

        let err = conv.push(Turn::observation(vec![])).unwrap_err();
        assert!(err.to_string().contains("agent thought"));
    }

    #[test]
    fn nothing_follows_a_response() {
        let mut conv = started();
        conv.push(Turn::thought("easy")).unwrap();
        conv.push(Turn::response("42")).unwrap();

        assert_eq!(conv.push(Turn::directive("more")), Err(ConversationError::Closed));
        assert_eq!(conv.push(Turn::thought("more")), Err(ConversationError::Closed));
    }

    #[test]
    fn directive_allows_another_thought() {
        let mut conv = started();
        conv.push(Turn::directive("Use the required format.")).unwrap();
        conv.push(Turn::directive("Conclude now.")).unwrap();
        conv.push(Turn::thought("ok")).unwrap();
    }

    #[test]
    fn chat_messages_merge_agent_turns() {
        let mut conv = started();
        conv.push(Turn::thought("search").with_rendered("<Thought>search</Thought>"))
            .unwrap();
        conv.push(
            Turn::action(vec![call("local_search")]).with_rendered("<Action>..</Action>"),
        )
        .unwrap();
        conv.push(Turn::observation(vec![ToolResult::success(
            "call_1",
            "local_search",
            "found it",
        )]))
        .unwrap();

        let messages = conv.to_chat_messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(
            messages[2].content,
            "<Thought>search</Thought>\n<Action>..</Action>"
        );
        assert_eq!(messages[3].role, Role::User);
        assert!(messages[3].content.contains("found it"));
    }

    #[test]
    fn conversation_serializes_turns() {
        let conv = started();
        let json = serde_json::to_value(&conv).unwrap();
        assert_eq!(json["turns"][1]["kind"], "user");
        let back: Conversation = serde_json::from_value(json).unwrap();
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn stored_transcript_round_trips() {
        let mut conv = started();
        conv.push(Turn::thought("Easy.")).unwrap();
        conv.push(Turn::response("Retrieval-augmented generation.")).unwrap();

        let json = serde_json::to_string(&conv).unwrap();
        let loaded: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.id, conv.id);
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.updated_at, conv.updated_at);
        assert!(loaded.is_closed());
    }

    #[test]
    fn stored_transcript_out_of_order_is_rejected() {
        let conv = started();
        let mut value = serde_json::to_value(&conv).unwrap();
        let turns = value["turns"].as_array_mut().unwrap();
        turns.swap(0, 1);

        let err = serde_json::from_value::<Conversation>(value).unwrap_err();
        assert!(err.to_string().contains("cannot follow"), "{err}");
    }

}
