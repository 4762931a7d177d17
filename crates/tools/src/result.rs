//! `result` tool: the model's way of handing back a final answer.
//!
//! The agent loop intercepts `result` calls before dispatch. Dispatched
//! directly, the tool simply echoes the answer.

use async_trait::async_trait;
use ragent_core::args::{self, ToolArgs};
use ragent_core::error::ToolError;
use ragent_core::tool::{Tool, ToolOutput};

pub struct ResultTool;

#[async_trait]
impl Tool for ResultTool {
    fn name(&self) -> &str {
        args::RESULT
    }

    fn description(&self) -> &str {
        "Return the final answer to the user. Call this once you have gathered enough information."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "answer": {
                    "type": "string",
                    "description": "The complete final answer"
                }
            },
            "required": ["answer"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        match args {
            ToolArgs::Result(r) => Ok(ToolOutput::text(r.answer)),
            _ => Err(ToolError::InvalidArguments("result expects an answer".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_answer() {
        let args = ResultTool
            .parse_args(serde_json::json!({"answer": "42"}))
            .unwrap();
        let output = ResultTool.execute(args).await.unwrap();
        assert_eq!(output.payload, "42");
    }
}
