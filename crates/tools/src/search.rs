//! `local_search` and `web_search` tools.
//!
//! Both are free-text searches; they differ only in which backend they
//! delegate to and the name the model calls them by.

use async_trait::async_trait;
use ragent_core::args::{self, ToolArgs};
use ragent_core::error::ToolError;
use ragent_core::retrieval::{SearchBackend, SearchHit};
use ragent_core::tool::{Tool, ToolOutput};
use std::sync::Arc;
use tracing::debug;

const DEFAULT_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Local,
    Web,
}

pub struct SearchTool {
    scope: Scope,
    backend: Arc<dyn SearchBackend>,
}

impl SearchTool {
    /// Search over the user's own documents.
    pub fn local(backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            scope: Scope::Local,
            backend,
        }
    }

    /// Search the public web.
    pub fn web(backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            scope: Scope::Web,
            backend,
        }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        match self.scope {
            Scope::Local => args::LOCAL_SEARCH,
            Scope::Web => args::WEB_SEARCH,
        }
    }

    fn description(&self) -> &str {
        match self.scope {
            Scope::Local => {
                "Search the user's documents for passages relevant to a query. Returns ranked snippets."
            }
            Scope::Web => {
                "Search the web for information. Returns a list of relevant results with titles, URLs, and snippets."
            }
        }
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "limit": {
                    "type": "integer",
                    "description": "Number of results to return",
                    "minimum": args::MIN_LIMIT,
                    "maximum": args::MAX_LIMIT,
                    "default": DEFAULT_LIMIT
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let args = match (self.scope, args) {
            (Scope::Local, ToolArgs::LocalSearch(a)) | (Scope::Web, ToolArgs::WebSearch(a)) => a,
            _ => {
                return Err(ToolError::InvalidArguments(format!(
                    "{} expects a query and an optional limit",
                    self.name()
                )));
            }
        };

        let limit = args.limit.unwrap_or(DEFAULT_LIMIT) as usize;
        let hits = self.backend.search(&args.query, limit).await?;
        debug!(
            tool = self.name(),
            backend = self.backend.name(),
            hits = hits.len(),
            "search completed"
        );

        if hits.is_empty() {
            return Ok(ToolOutput::text(format!("No results for '{}'.", args.query)));
        }

        Ok(ToolOutput {
            payload: format_hits(&hits),
            data: serde_json::to_value(&hits).ok(),
        })
    }
}

fn format_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let source = hit.url.as_deref().unwrap_or(&hit.id);
            format!("{}. {} ({})\n{}", i + 1, hit.title, source, hit.snippet)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
