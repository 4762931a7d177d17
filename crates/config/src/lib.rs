//! Configuration loading, validation, and management for ragent.
//!
//! Loads configuration from `~/.ragent/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use ragent_core::provider::GenerationConfig;

/// The root configuration structure.
///
/// Maps directly to `~/.ragent/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the generation provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Sampling parameters
    #[serde(default)]
    pub generation: GenerationSettings,

    /// Agent loop limits and grammar
    #[serde(default, rename = "loop")]
    pub agent_loop: LoopConfig,

    /// Context budget
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Tool dispatch settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Retrieval collaborators
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("generation", &self.generation)
            .field("agent_loop", &self.agent_loop)
            .field("budget", &self.budget)
            .field("tools", &self.tools)
            .field("retrieval", &self.retrieval)
            .finish()
    }
}

/// `[generation]`: sampling parameters passed to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Maximum tokens per completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub stream: bool,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_top_p() -> f32 {
    1.0
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: None,
            stream: false,
        }
    }
}

impl GenerationSettings {
    pub fn to_generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            stream: self.stream,
        }
    }
}

/// Which output grammar the model is asked to follow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrammarKind {
    /// Thought then response; no tools.
    Plain,
    /// Thought then either an action or a response.
    #[default]
    ToolAugmented,
}

/// `[loop]`: agent loop limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(default)]
    pub grammar: GrammarKind,

    /// Think/act/observe cycles before the model is told to conclude
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Corrective re-prompts allowed after unparsable output
    #[serde(default = "default_max_parse_retries")]
    pub max_parse_retries: u32,

    /// Retries for rate-limited or timed-out provider calls
    #[serde(default = "default_provider_retries")]
    pub provider_retries: u32,

    /// Base delay for exponential backoff between provider retries
    #[serde(default = "default_provider_backoff_ms")]
    pub provider_backoff_ms: u64,

    /// In-flight provider requests shared by all conversations
    #[serde(default = "default_provider_concurrency")]
    pub provider_concurrency: usize,

    /// HTTP timeout for one provider request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_max_parse_retries() -> u32 {
    2
}
fn default_provider_retries() -> u32 {
    2
}
fn default_provider_backoff_ms() -> u64 {
    500
}
fn default_provider_concurrency() -> usize {
    4
}
fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            grammar: GrammarKind::default(),
            max_iterations: default_max_iterations(),
            max_parse_retries: default_max_parse_retries(),
            provider_retries: default_provider_retries(),
            provider_backoff_ms: default_provider_backoff_ms(),
            provider_concurrency: default_provider_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// `[budget]`: cumulative token ceiling per conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
}

fn default_max_tokens() -> u64 {
    100_000
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

/// `[tools]`: dispatch limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Calls from one action executing at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-call timeout
    #[serde(default = "default_tool_timeout_ms")]
    pub timeout_ms: u64,

    /// Longest payload shown to the model, in characters
    #[serde(default = "default_max_tool_context_length")]
    pub max_tool_context_length: usize,

    /// When set, only these tools may be dispatched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<Vec<String>>,
}

fn default_max_concurrency() -> usize {
    4
}
fn default_tool_timeout_ms() -> u64 {
    30_000
}
fn default_max_tool_context_length() -> usize {
    32_768
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            timeout_ms: default_tool_timeout_ms(),
            max_tool_context_length: default_max_tool_context_length(),
            enabled: None,
        }
    }
}

/// `[retrieval]`: where the local corpus lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// JSON file with a list of documents for the in-memory corpus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_path: Option<PathBuf>,

    /// Shown to the model as the document context
    #[serde(default)]
    pub document_context: String,

    /// Shown to the model as the collection context
    #[serde(default)]
    pub collection_context: String,
}

impl AppConfig {
    /// Load configuration from the default path (~/.ragent/config.toml).
    ///
    /// Environment overrides:
    /// - `RAGENT_API_KEY`, then `OPENAI_API_KEY` (when no key is configured)
    /// - `RAGENT_MODEL`
    /// - `RAGENT_API_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("RAGENT_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(model) = lookup("RAGENT_MODEL") {
            self.generation.model = model;
        }
        if let Some(url) = lookup("RAGENT_API_URL") {
            self.api_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ragent")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.into()));

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return invalid("generation.temperature must be between 0.0 and 2.0");
        }
        if !(0.0..=1.0).contains(&self.generation.top_p) || self.generation.top_p == 0.0 {
            return invalid("generation.top_p must be in (0.0, 1.0]");
        }
        if self.agent_loop.max_iterations == 0 {
            return invalid("loop.max_iterations must be at least 1");
        }
        if self.agent_loop.provider_concurrency == 0 {
            return invalid("loop.provider_concurrency must be at least 1");
        }
        if self.budget.max_tokens == 0 {
            return invalid("budget.max_tokens must be at least 1");
        }
        if self.tools.max_concurrency == 0 {
            return invalid("tools.max_concurrency must be at least 1");
        }
        if self.tools.timeout_ms == 0 {
            return invalid("tools.timeout_ms must be at least 1");
        }
        if self.tools.max_tool_context_length == 0 {
            return invalid("tools.max_tool_context_length must be at least 1");
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `ragent config --init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            generation: GenerationSettings::default(),
            agent_loop: LoopConfig::default(),
            budget: BudgetConfig::default(),
            tools: ToolsConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
