//! Typed tool arguments.
//!
//! Raw call arguments are validated against the built-in tool's schema
//! before a handler sees them. Unknown fields are rejected so the model
//! learns the exact parameter names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;
use crate::filter::FilterExpr;

pub const CONTENT: &str = "content";
pub const LOCAL_SEARCH: &str = "local_search";
pub const WEB_SEARCH: &str = "web_search";
pub const RESULT: &str = "result";

pub const MIN_LIMIT: u32 = 1;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentArgs {
    #[serde(default)]
    pub filters: FilterExpr,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchArgs {
    pub query: String,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResultArgs {
    pub answer: String,
}

/// Arguments for one call, keyed by the tool that receives them.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArgs {
    Content(ContentArgs),
    LocalSearch(SearchArgs),
    WebSearch(SearchArgs),
    Result(ResultArgs),
    /// Arguments for a tool with no built-in schema, passed through as-is.
    Custom(Value),
}

impl ToolArgs {
    /// Validate `arguments` for the tool named `tool`.
    pub fn parse(tool: &str, arguments: Value) -> Result<Self, ToolError> {
        if !arguments.is_object() {
            return Err(ToolError::InvalidArguments(
                "arguments must be a JSON object".into(),
            ));
        }

        let args = match tool {
            CONTENT => Self::Content(decode(arguments)?),
            LOCAL_SEARCH => Self::LocalSearch(decode(arguments)?),
            WEB_SEARCH => Self::WebSearch(decode(arguments)?),
            RESULT => Self::Result(decode(arguments)?),
            _ => Self::Custom(arguments),
        };
        args.validate()?;
        Ok(args)
    }

    fn validate(&self) -> Result<(), ToolError> {
        let limit = match self {
            Self::Content(a) => a.limit,
            Self::LocalSearch(a) | Self::WebSearch(a) => {
                if a.query.trim().is_empty() {
                    return Err(ToolError::InvalidArguments("query must not be empty".into()));
                }
                a.limit
            }
            Self::Result(_) | Self::Custom(_) => None,
        };

        match limit {
            Some(n) if !(MIN_LIMIT..=MAX_LIMIT).contains(&n) => Err(ToolError::InvalidArguments(
                format!("limit must be between {MIN_LIMIT} and {MAX_LIMIT}, got {n}"),
            )),
            _ => Ok(()),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}
