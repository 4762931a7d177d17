//! `content` tool: fetch whole documents whose metadata matches a filter.

use async_trait::async_trait;
use ragent_core::args::{self, ToolArgs};
use ragent_core::error::ToolError;
use ragent_core::retrieval::DocumentStore;
use ragent_core::tool::{Tool, ToolOutput};
use std::sync::Arc;
use tracing::debug;

const DEFAULT_LIMIT: u32 = 10;

pub struct ContentTool {
    store: Arc<dyn DocumentStore>,
}

impl ContentTool {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ContentTool {
    fn name(&self) -> &str {
        args::CONTENT
    }

    fn description(&self) -> &str {
        "Fetch full documents whose metadata matches a filter. Filters use \
         {\"field\": value} for equality, {\"field\": {\"$op\": value}} with $eq, $ne, \
         $gt, $gte, $lt, $lte, $like, $ilike, $in, $nin, $overlap, $contains, and \
         $and / $or / $not to combine conditions."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filters": {
                    "type": "object",
                    "description": "Metadata filter expression; {} matches every document"
                },
                "limit": {
                    "type": "integer",
                    "minimum": args::MIN_LIMIT,
                    "maximum": args::MAX_LIMIT,
                    "default": DEFAULT_LIMIT
                }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        let ToolArgs::Content(args) = args else {
            return Err(ToolError::InvalidArguments(
                "content expects filters and an optional limit".into(),
            ));
        };

        let limit = args.limit.unwrap_or(DEFAULT_LIMIT) as usize;
        let documents = self.store.content(&args.filters, limit).await?;
        debug!(matched = documents.len(), limit, "content tool fetched documents");

        if documents.is_empty() {
            return Ok(ToolOutput::text("No documents matched the filter."));
        }

        let payload = documents
            .iter()
            .enumerate()
            .map(|(i, d)| format!("Document {} [{}] {}\n{}", i + 1, d.id, d.title, d.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(ToolOutput {
            payload,
            data: serde_json::to_value(&documents).ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::InMemoryCorpus;
    use ragent_core::retrieval::Document;
    use serde_json::json;

    fn tool() -> ContentTool {
        let corpus = InMemoryCorpus::from_documents(vec![
            Document {
                id: "a".into(),
                title: "Alpha".into(),
                text: "first".into(),
                metadata: json!({"kind": "pdf"}).as_object().cloned().unwrap(),
            },
            Document {
                id: "b".into(),
                title: "Beta".into(),
                text: "second".into(),
                metadata: json!({"kind": "html"}).as_object().cloned().unwrap(),
            },
        ]);
        ContentTool::new(Arc::new(corpus))
    }

    #[tokio::test]
    async fn returns_matching_documents() {
        let tool = tool();
        let args = tool.parse_args(json!({"filters": {"kind": "pdf"}})).unwrap();
        let output = tool.execute(args).await.unwrap();
        assert!(output.payload.contains("[a] Alpha"));
        assert!(!output.payload.contains("Beta"));
        assert_eq!(output.data.unwrap().as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reports_no_matches() {
        let tool = tool();
        let args = tool.parse_args(json!({"filters": {"kind": "epub"}})).unwrap();
        let output = tool.execute(args).await.unwrap();
        assert_eq!(output.payload, "No documents matched the filter.");
    }

    #[tokio::test]
    async fn rejects_foreign_arguments() {
        let err = tool().execute(ToolArgs::Custom(json!({}))).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
