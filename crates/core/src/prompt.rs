//! Prompt rendering contract.
//!
//! Template storage lives outside the core; the agent only hands a
//! renderer the values it needs to fill in.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Values substituted into the initial system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptInputs {
    pub current_date: NaiveDate,

    /// Description of the documents the user is asking about, if any.
    #[serde(default)]
    pub document_context: String,

    /// Description of the collections in scope, if any.
    #[serde(default)]
    pub collection_context: String,

    /// Longest tool payload the model will be shown, in characters.
    pub max_tool_context_length: usize,
}

pub trait PromptRenderer: Send + Sync {
    fn render(&self, inputs: &PromptInputs) -> Result<String>;
}
