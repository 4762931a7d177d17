//! Concurrent tool dispatch.
//!
//! One action's calls fan out together, bounded by `max_concurrency`, and
//! each runs under its own timeout. Results come back in call order. A
//! failing, panicking or slow call never takes its siblings down with it:
//! every call yields exactly one [`ToolResult`].

use futures::{FutureExt, StreamExt};
use ragent_core::tool::{ToolCall, ToolErrorKind, ToolRegistry, ToolResult};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Dispatch limits.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Calls from one action executing at once
    pub max_concurrency: usize,

    /// Per-call timeout
    pub timeout: Duration,

    /// Payloads longer than this many characters are cut
    pub max_tool_context_length: usize,

    /// When set, only these tool names may run
    pub enabled: Option<HashSet<String>>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            timeout: Duration::from_secs(30),
            max_tool_context_length: 32_768,
            enabled: None,
        }
    }
}

/// Runs tool calls against a registry.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: ToolRegistry,
    config: DispatchConfig,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            config: DispatchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Whether `name` is registered and allowed to run.
    pub fn is_available(&self, name: &str) -> bool {
        self.registry.contains(name) && self.is_enabled(name)
    }

    fn is_enabled(&self, name: &str) -> bool {
        self.config
            .enabled
            .as_ref()
            .is_none_or(|enabled| enabled.contains(name))
    }

    /// Execute every call, returning one result per call in the same order.
    pub async fn dispatch(&self, calls: &[ToolCall], cancel: &CancellationToken) -> Vec<ToolResult> {
        debug!(
            calls = calls.len(),
            max_concurrency = self.config.max_concurrency,
            "Dispatching tool calls"
        );

        // Collected eagerly to sidestep a rustc higher-ranked lifetime
        // inference limitation when this future is checked for `Send`.
        let pending: Vec<_> = calls.iter().map(|call| self.run_one(call, cancel)).collect();
        futures::stream::iter(pending)
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await
    }

    async fn run_one(&self, call: &ToolCall, cancel: &CancellationToken) -> ToolResult {
        let tool = match self.registry.get(&call.name) {
            Some(tool) if self.is_enabled(&call.name) => tool,
            Some(_) => {
                return self.failed(call, ToolErrorKind::UnknownTool, format!(
                    "tool '{}' is not enabled",
                    call.name
                ));
            }
            None => {
                return self.failed(call, ToolErrorKind::UnknownTool, format!(
                    "no tool named '{}'; available: {}",
                    call.name,
                    self.available_names().join(", ")
                ));
            }
        };

        if cancel.is_cancelled() {
            return self.failed(call, ToolErrorKind::Cancelled, "conversation was cancelled");
        }

        let args = match tool.parse_args(call.arguments.clone()) {
            Ok(args) => args,
            Err(e) => return self.failed(call, ToolErrorKind::ToolExecutionFailed, e.to_string()),
        };

        let started = Instant::now();
        let execution = AssertUnwindSafe(tool.execute(args)).catch_unwind();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.failed(call, ToolErrorKind::Cancelled, "conversation was cancelled")
            }
            outcome = tokio::time::timeout(self.config.timeout, execution) => match outcome {
                Err(_) => self.failed(call, ToolErrorKind::Timeout, format!(
                    "no result after {}ms",
                    self.config.timeout.as_millis()
                )),
                Ok(Err(panic)) => self.failed(
                    call,
                    ToolErrorKind::ToolExecutionFailed,
                    format!("handler panicked: {}", panic_message(panic.as_ref())),
                ),
                Ok(Ok(Err(e))) => {
                    self.failed(call, ToolErrorKind::ToolExecutionFailed, e.to_string())
                }
                Ok(Ok(Ok(output))) => {
                    let mut result = ToolResult::from_output(call, output);
                    result.payload = truncate(result.payload, self.config.max_tool_context_length);
                    result
                }
            },
        };

        debug!(
            call_id = %call.id,
            tool = %call.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            success = result.is_success(),
            "Tool call finished"
        );
        result
    }

    fn failed(&self, call: &ToolCall, kind: ToolErrorKind, message: impl Into<String>) -> ToolResult {
        let message = message.into();
        warn!(call_id = %call.id, tool = %call.name, kind = %kind, error = %message, "Tool call failed");
        ToolResult::failure(&call.id, &call.name, kind, message)
    }

    fn available_names(&self) -> Vec<&str> {
        self.registry
            .names()
            .into_iter()
            .filter(|n| self.is_enabled(n))
            .collect()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

/// Cut `payload` to `max_chars` characters, noting how much was dropped.
pub fn truncate(payload: String, max_chars: usize) -> String {
    let total = payload.chars().count();
    if total <= max_chars {
        return payload;
    }
    let kept: String = payload.chars().take(max_chars).collect();
    format!("{kept}\n[truncated: {} more characters]", total - max_chars)
}
