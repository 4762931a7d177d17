//! # ragent Core
//!
//! Domain types, traits, and error definitions for the ragent retrieval
//! agent. This crate has no runtime dependencies: it defines the model
//! that the provider, tool and agent crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (generation provider, document store,
//! search backend, prompt renderer) is a trait here. Implementations live
//! in their respective crates or outside the workspace entirely, which
//! keeps the agent loop testable with scripted stand-ins.

pub mod args;
pub mod error;
pub mod filter;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod retrieval;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use args::{ContentArgs, ResultArgs, SearchArgs, ToolArgs};
pub use error::{
    ConversationError, Error, ParseError, ProviderError, Result, RetrievalError, ToolError,
};
pub use filter::{CompareOp, FilterError, FilterExpr};
pub use message::{ChatMessage, Conversation, ConversationId, Role, Turn, TurnKind};
pub use prompt::{PromptInputs, PromptRenderer};
pub use provider::{Completion, GenerationConfig, GenerationProvider, Usage};
pub use retrieval::{Document, DocumentStore, SearchBackend, SearchHit};
pub use tool::{
    Tool, ToolCall, ToolDefinition, ToolErrorKind, ToolFailure, ToolOutput, ToolRegistry,
    ToolResult,
};
