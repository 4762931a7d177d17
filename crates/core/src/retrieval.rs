//! Retrieval collaborators: document stores and search backends.
//!
//! The agent never talks to an index directly. Tools delegate to these
//! traits, which are implemented outside the orchestration core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RetrievalError;
use crate::filter::FilterExpr;

/// A stored document as returned by a metadata query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,

    #[serde(default)]
    pub title: String,

    pub text: String,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    /// Metadata as seen by filters: `id` and `title` are addressable too.
    pub fn filter_view(&self) -> Map<String, Value> {
        let mut view = self.metadata.clone();
        view.entry("id").or_insert_with(|| Value::String(self.id.clone()));
        view.entry("title")
            .or_insert_with(|| Value::String(self.title.clone()));
        view
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub snippet: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    pub score: f32,
}

/// Fetches whole documents by metadata filter.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn content(
        &self,
        filter: &FilterExpr,
        limit: usize,
    ) -> Result<Vec<Document>, RetrievalError>;
}

/// Free-text search over some corpus (a local index, the web).
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Backend name for logs (e.g., "local", "web").
    fn name(&self) -> &str;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, RetrievalError>;
}
