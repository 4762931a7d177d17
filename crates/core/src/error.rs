//! Error types for the ragent domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them all.

use thiserror::Error;

use crate::filter::FilterError;

/// The top-level error type for all ragent operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Retrieval errors ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Model output ---
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    // --- Conversation invariants ---
    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),

    #[error("Invalid filter: {0}")]
    Filter(#[from] FilterError),

    #[error("Prompt rendering failed: {0}")]
    Prompt(String),

}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures surfaced by a generation provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out: {0}")]
    Timeout(String),
}

impl ProviderError {
    /// Rate limits and timeouts are worth retrying; an unavailable provider is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Timeout(_))
    }
}

/// Errors raised by a tool handler or by argument validation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),
}

/// Errors from the external retrieval collaborators.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),
}

/// Rejections produced by the response parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed structure: {0}")]
    MalformedStructure(String),

    #[error("mixed tags: <{tag}> is not allowed inside a thought block")]
    MixedTags { tag: String },

    #[error("invalid arguments for tool call #{index} ({name}): {reason}")]
    InvalidToolArguments {
        index: usize,
        name: String,
        reason: String,
    },
}

/// Violations of the conversation turn grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("a {turn} turn cannot follow {after}")]
    TurnOrder { turn: String, after: String },

    #[error("conversation is closed: a final response has already been recorded")]
    Closed,
}
