//! In-memory corpus: a document store and keyword search backend in one.
//!
//! Useful for tests and for running the CLI against a JSON file of
//! documents without a real index.

use async_trait::async_trait;
use ragent_core::error::RetrievalError;
use ragent_core::filter::FilterExpr;
use ragent_core::retrieval::{Document, DocumentStore, SearchBackend, SearchHit};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

const SNIPPET_CHARS: usize = 240;

/// Documents held in a Vec, searched by keyword occurrence.
#[derive(Clone, Default)]
pub struct InMemoryCorpus {
    documents: Arc<RwLock<Vec<Document>>>,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents(documents: Vec<Document>) -> Self {
        Self {
            documents: Arc::new(RwLock::new(documents)),
        }
    }

    /// Load a JSON array of documents.
    pub fn from_json_file(path: &Path) -> Result<Self, RetrievalError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RetrievalError::Unavailable(format!("failed to read {}: {e}", path.display()))
        })?;
        let documents: Vec<Document> = serde_json::from_str(&content).map_err(|e| {
            RetrievalError::Unavailable(format!("failed to parse {}: {e}", path.display()))
        })?;
        Ok(Self::from_documents(documents))
    }

    pub async fn add(&self, document: Document) {
        self.documents.write().await.push(document);
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryCorpus {
    async fn content(
        &self,
        filter: &FilterExpr,
        limit: usize,
    ) -> Result<Vec<Document>, RetrievalError> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .filter(|d| filter.matches(&d.filter_view()))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SearchBackend for InMemoryCorpus {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, RetrievalError> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            return Err(RetrievalError::QueryFailed("query has no searchable terms".into()));
        }

        let documents = self.documents.read().await;
        let mut hits: Vec<SearchHit> = documents
            .iter()
            .filter_map(|doc| {
                let haystack = format!("{}\n{}", doc.title, doc.text).to_lowercase();
                let occurrences: usize = terms.iter().map(|t| haystack.matches(t.as_str()).count()).sum();
                if occurrences == 0 {
                    return None;
                }
                // Simple keyword relevance score
                let score = occurrences as f32 / (haystack.len() as f32 / 100.0).max(1.0);
                Some(SearchHit {
                    id: doc.id.clone(),
                    title: doc.title.clone(),
                    snippet: snippet(&doc.text, &terms),
                    url: doc
                        .metadata
                        .get("url")
                        .and_then(|u| u.as_str())
                        .map(String::from),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}

/// A window of text starting near the first matching term.
fn snippet(text: &str, terms: &[String]) -> String {
    let lower = text.to_lowercase();
    let first = terms
        .iter()
        .filter_map(|t| lower.find(t.as_str()))
        .min()
        .unwrap_or(0);

    // Byte offsets in the lowercased copy only approximate the original;
    // map through char counts to stay on a boundary.
    let start_char = lower[..first].chars().count().saturating_sub(40);
    let window: String = text.chars().skip(start_char).take(SNIPPET_CHARS).collect();
    if start_char > 0 {
        format!("...{window}")
    } else {
        window
    }
}
