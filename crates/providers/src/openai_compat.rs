//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any endpoint exposing
//! `/chat/completions`. The conversation is flattened into chat messages;
//! the model's reply is returned as raw text for the response parser.
//!
//! When `stream` is set the completion is read as server-sent events and
//! the content deltas are concatenated.

use async_trait::async_trait;
use futures::StreamExt;
use ragent_core::error::ProviderError;
use ragent_core::message::{ChatMessage, Conversation, Role};
use ragent_core::provider::{Completion, GenerationConfig, GenerationProvider, Usage};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Delay suggested to callers when a 429 carries no `Retry-After` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// An OpenAI-compatible generation provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(
            "openai",
            "https://api.openai.com/v1",
            api_key,
            Duration::from_secs(120),
        )
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Result<Self, ProviderError> {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
            Duration::from_secs(120),
        )
    }

    /// Convert chat messages to the OpenAI wire format.
    fn to_api_messages(messages: &[ChatMessage]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                },
                content: Some(m.content.clone()),
            })
            .collect()
    }

    fn request_body(conversation: &Conversation, config: &GenerationConfig) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": config.model,
            "messages": Self::to_api_messages(&conversation.to_chat_messages()),
            "temperature": config.temperature,
            "top_p": config.top_p,
            "stream": config.stream,
        });

        if let Some(max_tokens) = config.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if config.stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        body
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 408 || status == 504 {
            return Err(ProviderError::Timeout(format!(
                "{} returned status {status}",
                self.name
            )));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
            return Err(ProviderError::Unavailable(format!(
                "{} returned status {status}: {error_body}",
                self.name
            )));
        }

        Ok(response)
    }

    async fn complete(&self, body: &serde_json::Value) -> Result<Completion, ProviderError> {
        let response = self.send(body).await?;

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            ProviderError::Unavailable(format!("Failed to parse response: {e}"))
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Unavailable("No choices in response".into()))?;

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            usage: api_response.usage.map(ApiUsage::into_usage),
            model: api_response.model,
        })
    }

    async fn complete_streaming(
        &self,
        body: &serde_json::Value,
        model: &str,
    ) -> Result<Completion, ProviderError> {
        let response = self.send(body).await?;
        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut accumulator = StreamAccumulator::new(model);

        while let Some(chunk_result) = byte_stream.next().await {
            let bytes = chunk_result.map_err(map_transport_error)?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            // Process complete lines
            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim_end_matches('\r').to_string();
                buffer.drain(..=line_end);

                if accumulator.feed_line(&line, &self.name) {
                    return Ok(accumulator.finish());
                }
            }
        }

        // Stream ended without [DONE]
        if !buffer.trim().is_empty() {
            accumulator.feed_line(buffer.trim(), &self.name);
        }
        Ok(accumulator.finish())
    }
}

#[async_trait]
impl GenerationProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(
        &self,
        conversation: &Conversation,
        config: &GenerationConfig,
    ) -> Result<Completion, ProviderError> {
        let body = Self::request_body(conversation, config);

        debug!(
            provider = %self.name,
            model = %config.model,
            turns = conversation.len(),
            stream = config.stream,
            "Sending completion request"
        );

        if config.stream {
            self.complete_streaming(&body, &config.model).await
        } else {
            self.complete(&body).await
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Unavailable(e.to_string())
    }
}

/// Folds SSE `data:` lines into one completion.
struct StreamAccumulator {
    text: String,
    usage: Option<Usage>,
    model: String,
}

impl StreamAccumulator {
    fn new(model: &str) -> Self {
        Self {
            text: String::new(),
            usage: None,
            model: model.to_string(),
        }
    }

    /// Feed one line; returns true once the stream signals completion.
    fn feed_line(&mut self, line: &str, provider: &str) -> bool {
        // Skip empty lines and SSE comments
        if line.is_empty() || line.starts_with(':') {
            return false;
        }

        let Some(data) = line.strip_prefix("data:") else {
            return false;
        };
        let data = data.trim();

        if data == "[DONE]" {
            return true;
        }

        match serde_json::from_str::<StreamResponse>(data) {
            Ok(chunk) => {
                if let Some(model) = chunk.model {
                    self.model = model;
                }
                if let Some(content) = chunk.choices.first().and_then(|c| c.delta.content.as_ref()) {
                    self.text.push_str(content);
                }
                if let Some(usage) = chunk.usage {
                    self.usage = Some(usage.into_usage());
                }
            }
            Err(e) => {
                trace!(provider, data, error = %e, "Ignoring unparseable SSE chunk");
            }
        }
        false
    }

    fn finish(self) -> Completion {
        Completion {
            text: self.text,
            usage: self.usage,
            model: self.model,
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl ApiUsage {
    fn into_usage(self) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
        }
    }
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
