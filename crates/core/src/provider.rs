//! Generation provider contract.
//!
//! A provider turns a conversation into the model's next completion. The
//! agent loop never knows which backend is behind it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ProviderError;
use crate::message::Conversation;

/// Sampling parameters for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.1
}

fn default_top_p() -> f32 {
    1.0
}

impl GenerationConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: None,
            stream: false,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::new("gpt-4o-mini")
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The raw text of one model completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

impl Completion {
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
            model: model.into(),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// The core provider trait.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Submit the whole conversation and return the next completion.
    async fn submit(
        &self,
        conversation: &Conversation,
        config: &GenerationConfig,
    ) -> Result<Completion, ProviderError>;
}

#[async_trait]
impl<T: GenerationProvider + ?Sized> GenerationProvider for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn submit(
        &self,
        conversation: &Conversation,
        config: &GenerationConfig,
    ) -> Result<Completion, ProviderError> {
        (**self).submit(conversation, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_config_defaults() {
        let config: GenerationConfig = serde_json::from_str(r#"{"model": "m"}"#).unwrap();
        assert_eq!(config.model, "m");
        assert!((config.temperature - 0.1).abs() < f32::EPSILON);
        assert!((config.top_p - 1.0).abs() < f32::EPSILON);
        assert!(config.max_tokens.is_none());
        assert!(!config.stream);
    }

    #[test]
    fn completion_builder() {
        let completion = Completion::new("hi", "m").with_usage(Usage {
            prompt_tokens: 10,
            completion_tokens: 2,
            total_tokens: 12,
        });
        assert_eq!(completion.usage.map(|u| u.completion_tokens), Some(2));
    }
}
