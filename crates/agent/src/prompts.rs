//! System prompt rendering and the fixed texts the controller injects.

use ragent_core::error::{Error, ParseError, Result};
use ragent_core::prompt::{PromptInputs, PromptRenderer};
use ragent_core::tool::{ToolDefinition, ToolResult};

/// The built-in system prompt. Placeholders are `{name}` and are replaced
/// verbatim; unknown braces are left alone.
pub const DEFAULT_TEMPLATE: &str = "\
You are a research assistant. Answer the user's question using the \
information you gather, and say so plainly when the information is not \
available.

Today's date is {current_date}.
{document_context}{collection_context}
## Tools
{tools}
Tool results longer than {max_tool_context_length} characters are truncated.

## Output format
{format_instructions}";

/// Renders [`DEFAULT_TEMPLATE`] (or a custom one) with the tool list and
/// grammar instructions fixed at construction.
#[derive(Debug, Clone)]
pub struct BasicPromptRenderer {
    template: String,
    tools: Vec<ToolDefinition>,
    format_instructions: String,
}

impl BasicPromptRenderer {
    pub fn new(tools: Vec<ToolDefinition>, format_instructions: impl Into<String>) -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            tools,
            format_instructions: format_instructions.into(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    fn tools_section(&self) -> String {
        if self.tools.is_empty() {
            return "No tools are available; answer directly.\n".into();
        }
        self.tools
            .iter()
            .map(|t| format!("- {}: {}\n  Parameters: {}\n", t.name, t.description, t.parameters))
            .collect()
    }
}

impl PromptRenderer for BasicPromptRenderer {
    fn render(&self, inputs: &PromptInputs) -> Result<String> {
        if self.template.trim().is_empty() {
            return Err(Error::Prompt("template is empty".into()));
        }

        let document_context = section("Document context", &inputs.document_context);
        let collection_context = section("Collection context", &inputs.collection_context);

        Ok(self
            .template
            .replace("{current_date}", &inputs.current_date.format("%B %-d, %Y").to_string())
            .replace("{document_context}", &document_context)
            .replace("{collection_context}", &collection_context)
            .replace("{tools}", &self.tools_section())
            .replace(
                "{max_tool_context_length}",
                &inputs.max_tool_context_length.to_string(),
            )
            .replace("{format_instructions}", &self.format_instructions))
    }
}

fn section(title: &str, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        String::new()
    } else {
        format!("\n## {title}\n{body}\n")
    }
}

/// Directive sent after output that could not be parsed.
pub fn corrective_directive(error: &ParseError) -> String {
    format!(
        "Your previous reply could not be processed ({error}). \
         Reply again using exactly the required format."
    )
}

/// Directive sent when the iteration or token ceiling is reached.
pub fn conclude_directive(omitted_results: usize) -> String {
    let mut text = String::from(
        "You have reached the limit of tool use for this question. \
         Do not call any more tools. Give your final answer now using only \
         the information gathered so far.",
    );
    if omitted_results > 0 {
        text.push_str(&format!(
            " {omitted_results} tool result(s) were omitted because the context budget is exhausted."
        ));
    }
    text
}

/// Answer used when the budget ran out and nothing useful was observed.
pub const INSUFFICIENT_INFORMATION: &str =
    "Insufficient information: the question could not be answered within the allowed budget.";

const PARTIAL_EXCERPT_CHARS: usize = 500;

/// Assemble a best-effort answer from successful observations.
pub fn partial_answer<'a>(observations: impl IntoIterator<Item = &'a ToolResult>) -> String {
    let excerpts: Vec<String> = observations
        .into_iter()
        .filter(|r| r.is_success() && !r.payload.trim().is_empty())
        .map(|r| {
            let excerpt: String = r.payload.chars().take(PARTIAL_EXCERPT_CHARS).collect();
            format!("- {}: {}", r.name, excerpt.trim())
        })
        .collect();

    if excerpts.is_empty() {
        return INSUFFICIENT_INFORMATION.to_string();
    }
    format!(
        "No final answer was reached. Information gathered so far:\n{}",
        excerpts.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ragent_core::tool::ToolErrorKind;
    use serde_json::json;

    fn inputs() -> PromptInputs {
        PromptInputs {
            current_date: NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(),
            document_context: "Quarterly reports".into(),
            collection_context: String::new(),
            max_tool_context_length: 2048,
        }
    }

    #[test]
    fn renders_all_inputs() {
        let tools = vec![ToolDefinition {
            name: "local_search".into(),
            description: "Search the corpus".into(),
            parameters: json!({"type": "object"}),
        }];
        let prompt = BasicPromptRenderer::new(tools, "USE TAGS").render(&inputs()).unwrap();
        assert!(prompt.contains("March 7, 2024"));
        assert!(prompt.contains("## Document context\nQuarterly reports"));
        assert!(!prompt.contains("Collection context"));
        assert!(prompt.contains("- local_search: Search the corpus"));
        assert!(prompt.contains("2048 characters"));
        assert!(prompt.ends_with("USE TAGS"));
    }

    #[test]
    fn custom_template_and_empty_template() {
        let renderer = BasicPromptRenderer::new(vec![], "x").with_template("{tools}JSON {\"a\": 1}");
        let prompt = renderer.render(&inputs()).unwrap();
        assert!(prompt.starts_with("No tools are available"));
        assert!(prompt.ends_with("{\"a\": 1}"));

        let renderer = BasicPromptRenderer::new(vec![], "x").with_template("  ");
        assert!(matches!(renderer.render(&inputs()), Err(Error::Prompt(_))));
    }

    #[test]
    fn directives_name_the_problem() {
        let text = corrective_directive(&ParseError::MixedTags {
            tag: "Action".into(),
        });
        assert!(text.contains("<Action>"));

        assert!(!conclude_directive(0).contains("omitted"));
        assert!(conclude_directive(3).contains("3 tool result(s) were omitted"));
    }

    #[test]
    fn partial_answer_uses_successful_results() {
        let results = vec![
            ToolResult::success("call_1", "local_search", "Paris is the capital."),
            ToolResult::failure("call_2", "web_search", ToolErrorKind::Timeout, "slow"),
        ];
        let answer = partial_answer(&results);
        assert!(answer.contains("local_search: Paris is the capital."));
        assert!(!answer.contains("web_search"));

        let failures = vec![ToolResult::failure(
            "call_1",
            "content",
            ToolErrorKind::UnknownTool,
            "no such tool",
        )];
        assert_eq!(partial_answer(&failures), INSUFFICIENT_INFORMATION);
        assert_eq!(partial_answer(std::iter::empty()), INSUFFICIENT_INFORMATION);
    }
}
