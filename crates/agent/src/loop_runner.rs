//! The agent loop controller.
//!
//! One run drives one conversation through
//! `Init → Thinking → (Acting → Observing → Thinking)* → Responding → Done`,
//! with `Failed` reachable from anywhere. Each run is strictly sequential;
//! independent runs share nothing but the provider.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use ragent_config::{AppConfig, GrammarKind};
use ragent_core::args::{RESULT, ToolArgs};
use ragent_core::error::{ParseError, ProviderError, Result};
use ragent_core::message::{Conversation, Turn};
use ragent_core::prompt::{PromptInputs, PromptRenderer};
use ragent_core::provider::{Completion, GenerationConfig, GenerationProvider};
use ragent_core::tool::{ToolCall, ToolResult};
use ragent_tools::ToolDispatcher;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::{BudgetState, BudgetTracker, estimate_tokens};
use crate::parser::{ResponseGrammar, Step, ToolGrammar, grammar_for};
use crate::prompts::{self, BasicPromptRenderer};
use crate::stream_event::AgentStreamEvent;

/// Final answers are streamed in chunks of this many characters.
pub const CHUNK_CHARS: usize = 1024;

/// Controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Init,
    Thinking,
    Acting,
    Observing,
    Responding,
    Done,
    Failed,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Thinking => "thinking",
            Self::Acting => "acting",
            Self::Observing => "observing",
            Self::Responding => "responding",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a run ended without an answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("model output was still unparsable after {retries} corrective retries: {last}")]
    UnparsableOutput { retries: u32, last: ParseError },

    #[error("budget exhausted after {iterations} iterations and {tokens} tokens")]
    BudgetExhausted { iterations: u32, tokens: u64 },

    #[error("conversation cancelled")]
    Cancelled,

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(ProviderError),
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Done {
        answer: String,
    },
    Failed {
        reason: FailureReason,
        /// Set when the budget ran out: what was gathered, or an explicit
        /// "insufficient information" answer.
        partial_answer: Option<String>,
    },
}

/// Everything a finished run leaves behind.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub outcome: RunOutcome,
    pub conversation: Conversation,
    pub budget: BudgetState,
    /// Corrective re-prompts issued over the whole run.
    pub parse_retries: u32,
    pub tool_calls_made: usize,
}

impl AgentRun {
    pub fn is_done(&self) -> bool {
        matches!(self.outcome, RunOutcome::Done { .. })
    }

    /// The final answer, or the partial answer of a budget failure.
    pub fn answer(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Done { answer } => Some(answer),
            RunOutcome::Failed { partial_answer, .. } => partial_answer.as_deref(),
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.outcome {
            RunOutcome::Failed { reason, .. } => Some(reason),
            RunOutcome::Done { .. } => None,
        }
    }
}

/// Ceilings and retry policy for one run.
#[derive(Debug, Clone)]
pub struct LoopLimits {
    pub max_iterations: u32,
    pub max_tokens: u64,
    pub max_parse_retries: u32,
    pub provider_retries: u32,
    /// Base delay, doubled on every further retry.
    pub provider_backoff: Duration,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_tokens: 100_000,
            max_parse_retries: 2,
            provider_retries: 2,
            provider_backoff: Duration::from_millis(500),
        }
    }
}

impl From<&AppConfig> for LoopLimits {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_iterations: config.agent_loop.max_iterations,
            max_tokens: config.budget.max_tokens,
            max_parse_retries: config.agent_loop.max_parse_retries,
            provider_retries: config.agent_loop.provider_retries,
            provider_backoff: Duration::from_millis(config.agent_loop.provider_backoff_ms),
        }
    }
}

/// A user query plus the context shown in the system prompt.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub query: String,
    pub document_context: String,
    pub collection_context: String,
    pub current_date: NaiveDate,
}

impl AgentRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            document_context: String::new(),
            collection_context: String::new(),
            current_date: Utc::now().date_naive(),
        }
    }

    pub fn with_document_context(mut self, context: impl Into<String>) -> Self {
        self.document_context = context.into();
        self
    }

    pub fn with_collection_context(mut self, context: impl Into<String>) -> Self {
        self.collection_context = context.into();
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.current_date = date;
        self
    }
}

/// The agent loop controller. Cheap to share; each call to [`run`](Self::run)
/// owns its own conversation and budget.
pub struct AgentLoop {
    provider: Arc<dyn GenerationProvider>,
    dispatcher: ToolDispatcher,
    renderer: Arc<dyn PromptRenderer>,
    grammar: Arc<dyn ResponseGrammar>,
    generation: GenerationConfig,
    limits: LoopLimits,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        dispatcher: ToolDispatcher,
        renderer: Arc<dyn PromptRenderer>,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            renderer,
            grammar: Arc::new(ToolGrammar),
            generation: GenerationConfig::default(),
            limits: LoopLimits::default(),
        }
    }

    /// Build a loop from configuration, rendering prompts with
    /// [`BasicPromptRenderer`] and the configured grammar.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn GenerationProvider>,
        dispatcher: ToolDispatcher,
    ) -> Self {
        let grammar = grammar_for(config.agent_loop.grammar);
        let tools = if config.agent_loop.grammar == GrammarKind::Plain {
            Vec::new()
        } else {
            dispatcher
                .registry()
                .definitions()
                .into_iter()
                .filter(|d| dispatcher.is_available(&d.name))
                .collect()
        };
        let renderer = Arc::new(BasicPromptRenderer::new(tools, grammar.format_instructions()));

        Self::new(provider, dispatcher, renderer)
            .with_grammar(grammar)
            .with_generation_config(config.generation.to_generation_config())
            .with_limits(LoopLimits::from(config))
    }

    pub fn with_grammar(mut self, grammar: Arc<dyn ResponseGrammar>) -> Self {
        self.grammar = grammar;
        self
    }

    pub fn with_generation_config(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_limits(mut self, limits: LoopLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the maximum number of think/act/observe cycles.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.limits.max_iterations = max;
        self
    }

    pub fn limits(&self) -> &LoopLimits {
        &self.limits
    }

    /// Answer one query.
    ///
    /// Errors are reserved for setup failures (the prompt could not be
    /// rendered). Every other ending, including cancellation, comes back as
    /// an [`AgentRun`] carrying the transcript.
    pub async fn run(&self, request: AgentRequest, cancel: &CancellationToken) -> Result<AgentRun> {
        Run::new(self, cancel, None).execute(request).await
    }

    /// Like [`run`](Self::run), reporting progress on `events` as it goes.
    pub async fn run_streaming(
        &self,
        request: AgentRequest,
        cancel: &CancellationToken,
        events: mpsc::Sender<AgentStreamEvent>,
    ) -> Result<AgentRun> {
        Run::new(self, cancel, Some(events)).execute(request).await
    }
}

/// Where the controller goes next.
enum Phase {
    Thinking { grace: bool },
    Acting(Vec<ToolCall>),
    Observing(Vec<ToolResult>),
    Responding(String),
}

impl Phase {
    fn state(&self) -> LoopState {
        match self {
            Self::Thinking { .. } => LoopState::Thinking,
            Self::Acting(_) => LoopState::Acting,
            Self::Observing(_) => LoopState::Observing,
            Self::Responding(_) => LoopState::Responding,
        }
    }
}

enum Flow {
    Next(Phase),
    Stop(RunOutcome),
}

/// Mutable state of one run.
struct Run<'a> {
    agent: &'a AgentLoop,
    cancel: &'a CancellationToken,
    events: Option<mpsc::Sender<AgentStreamEvent>>,
    conversation: Conversation,
    budget: BudgetTracker,
    state: LoopState,
    /// Consecutive unparsable completions; reset on every successful parse.
    parse_failures: u32,
    parse_retries: u32,
    tool_calls_made: usize,
}

impl<'a> Run<'a> {
    fn new(
        agent: &'a AgentLoop,
        cancel: &'a CancellationToken,
        events: Option<mpsc::Sender<AgentStreamEvent>>,
    ) -> Self {
        Self {
            agent,
            cancel,
            events,
            conversation: Conversation::new(),
            budget: BudgetTracker::new(agent.limits.max_tokens, agent.limits.max_iterations),
            state: LoopState::Init,
            parse_failures: 0,
            parse_retries: 0,
            tool_calls_made: 0,
        }
    }

    async fn execute(mut self, request: AgentRequest) -> Result<AgentRun> {
        info!(
            conversation_id = %self.conversation.id,
            provider = self.agent.provider.name(),
            grammar = self.agent.grammar.name(),
            max_iterations = self.agent.limits.max_iterations,
            max_tokens = self.agent.limits.max_tokens,
            "Starting agent run"
        );

        let outcome = self.drive(request).await?;
        self.finish(outcome).await
    }

    async fn drive(&mut self, request: AgentRequest) -> Result<RunOutcome> {
        let mut phase = self.init(request)?;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(self.fail(FailureReason::Cancelled).await);
            }
            self.enter(phase.state()).await;

            let flow = match phase {
                Phase::Thinking { grace } => self.think(grace).await?,
                Phase::Acting(calls) => self.act(calls).await,
                Phase::Observing(results) => self.observe(results).await?,
                Phase::Responding(answer) => self.respond(answer).await,
            };

            phase = match flow {
                Flow::Next(next) => next,
                Flow::Stop(outcome) => return Ok(outcome),
            };
        }
    }

    // ── States ──

    fn init(&mut self, request: AgentRequest) -> Result<Phase> {
        let inputs = PromptInputs {
            current_date: request.current_date,
            document_context: request.document_context,
            collection_context: request.collection_context,
            max_tool_context_length: self.agent.dispatcher.config().max_tool_context_length,
        };
        let system = self.agent.renderer.render(&inputs)?;

        self.push_charged(Turn::system(system))?;
        self.push_charged(Turn::user(request.query))?;
        self.after_cycle(0)
    }

    async fn think(&mut self, grace: bool) -> Result<Flow> {
        let completion = match self.submit().await {
            Ok(completion) => completion,
            Err(reason) => return Ok(Flow::Stop(self.fail(reason).await)),
        };
        self.budget.charge_completion(&completion);

        let grammar = Arc::clone(&self.agent.grammar);
        let parsed = match grammar.parse(&completion.text) {
            Ok(parsed) => {
                self.parse_failures = 0;
                parsed
            }
            Err(error) => {
                self.parse_failures += 1;
                if self.parse_failures > self.agent.limits.max_parse_retries {
                    warn!(
                        conversation_id = %self.conversation.id,
                        error = %error,
                        "Model output unparsable, giving up"
                    );
                    let reason = FailureReason::UnparsableOutput {
                        retries: self.agent.limits.max_parse_retries,
                        last: error,
                    };
                    return Ok(Flow::Stop(self.fail(reason).await));
                }

                debug!(
                    conversation_id = %self.conversation.id,
                    attempt = self.parse_failures,
                    error = %error,
                    "Model output unparsable, asking for a correction"
                );
                self.parse_retries += 1;
                self.push_charged(Turn::directive(prompts::corrective_directive(&error)))?;
                return Ok(Flow::Next(Phase::Thinking { grace }));
            }
        };

        self.emit(AgentStreamEvent::Thought {
            content: parsed.thought.clone(),
        })
        .await;
        let rendered = grammar.render_thought(&parsed.thought);
        self.conversation.push(Turn::thought(parsed.thought).with_rendered(rendered))?;

        let calls = match parsed.step {
            Step::Respond(answer) => return self.conclude(answer, grace),
            Step::Act(calls) => calls,
        };

        if let Some(answer) = terminal_answer(&calls) {
            debug!(
                conversation_id = %self.conversation.id,
                skipped = calls.len() - 1,
                "Result tool called, finishing"
            );
            return self.conclude(answer, grace);
        }

        let rendered = grammar.render_action(&calls);
        self.conversation.push(Turn::action(calls.clone()).with_rendered(rendered))?;

        if grace {
            warn!(
                conversation_id = %self.conversation.id,
                iterations = self.budget.iteration_count(),
                tokens = self.budget.tokens_consumed(),
                "Model kept acting after being told to conclude"
            );
            let reason = FailureReason::BudgetExhausted {
                iterations: self.budget.iteration_count(),
                tokens: self.budget.tokens_consumed(),
            };
            return Ok(Flow::Stop(self.fail(reason).await));
        }

        Ok(Flow::Next(Phase::Acting(calls)))
    }

    async fn act(&mut self, calls: Vec<ToolCall>) -> Flow {
        for call in &calls {
            self.emit(AgentStreamEvent::ToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.arguments.clone(),
            })
            .await;
        }

        let results = self.agent.dispatcher.dispatch(&calls, self.cancel).await;
        self.tool_calls_made += calls.len();
        Flow::Next(Phase::Observing(results))
    }

    async fn observe(&mut self, results: Vec<ToolResult>) -> Result<Flow> {
        for result in &results {
            self.emit(AgentStreamEvent::ToolResult {
                id: result.call_id.clone(),
                name: result.name.clone(),
                output: result.payload.clone(),
                success: result.is_success(),
            })
            .await;
        }

        let mut kept = Vec::with_capacity(results.len());
        let mut omitted = 0;
        for result in results {
            if self.budget.exceeded() {
                omitted += 1;
                continue;
            }
            self.budget.charge(estimate_tokens(&result.render()) as u64);
            kept.push(result);
        }
        if omitted > 0 {
            warn!(
                conversation_id = %self.conversation.id,
                omitted,
                tokens = self.budget.tokens_consumed(),
                "Token budget exceeded, omitting tool results"
            );
        }

        self.conversation.push(Turn::observation(kept))?;
        self.budget.record_iteration();
        self.after_cycle(omitted).map(Flow::Next)
    }

    async fn respond(&mut self, answer: String) -> Flow {
        for chunk in chunks(&answer, CHUNK_CHARS) {
            self.emit(AgentStreamEvent::Chunk { content: chunk }).await;
        }
        self.enter(LoopState::Done).await;
        Flow::Stop(RunOutcome::Done { answer })
    }

    // ── Transitions ──

    /// Decide whether another full cycle fits. When it does not, ask the
    /// model to conclude and allow one last thinking pass.
    fn after_cycle(&mut self, omitted: usize) -> Result<Phase> {
        let ceiling = if self.budget.exceeded() {
            "token budget"
        } else if self.budget.iterations_exhausted() {
            "iteration limit"
        } else {
            return Ok(Phase::Thinking { grace: false });
        };

        warn!(
            conversation_id = %self.conversation.id,
            ceiling,
            iterations = self.budget.iteration_count(),
            tokens = self.budget.tokens_consumed(),
            "Ceiling reached, asking for a final answer"
        );
        self.push_charged(Turn::directive(prompts::conclude_directive(omitted)))?;
        Ok(Phase::Thinking { grace: true })
    }

    fn conclude(&mut self, answer: String, grace: bool) -> Result<Flow> {
        let rendered = self.agent.grammar.render_response(&answer);
        self.conversation.push(Turn::response(answer.clone()).with_rendered(rendered))?;
        if !grace {
            self.budget.record_iteration();
        }
        Ok(Flow::Next(Phase::Responding(answer)))
    }

    async fn fail(&mut self, reason: FailureReason) -> RunOutcome {
        let partial_answer = match reason {
            FailureReason::BudgetExhausted { .. } => {
                Some(prompts::partial_answer(self.conversation.observations()))
            }
            _ => None,
        };
        self.enter(LoopState::Failed).await;
        RunOutcome::Failed {
            reason,
            partial_answer,
        }
    }

    async fn enter(&mut self, to: LoopState) {
        if self.state == to {
            return;
        }
        let from = self.state;
        debug!(conversation_id = %self.conversation.id, %from, %to, "State transition");
        self.state = to;
        self.emit(AgentStreamEvent::StateChanged { from, to }).await;
    }

    async fn finish(self, outcome: RunOutcome) -> Result<AgentRun> {
        let budget = self.budget.state();
        let conversation_id = self.conversation.id.to_string();

        let event = match &outcome {
            RunOutcome::Done { .. } => {
                info!(
                    conversation_id = %conversation_id,
                    iterations = budget.iteration_count,
                    tokens = budget.tokens_consumed,
                    tool_calls = self.tool_calls_made,
                    "Agent run finished"
                );
                AgentStreamEvent::Done {
                    conversation_id,
                    budget,
                    tool_calls_made: self.tool_calls_made,
                }
            }
            RunOutcome::Failed {
                reason,
                partial_answer,
            } => {
                warn!(
                    conversation_id = %conversation_id,
                    iterations = budget.iteration_count,
                    tokens = budget.tokens_consumed,
                    reason = %reason,
                    "Agent run failed"
                );
                AgentStreamEvent::Failed {
                    conversation_id,
                    reason: reason.to_string(),
                    partial_answer: partial_answer.clone(),
                }
            }
        };
        self.emit(event).await;

        Ok(AgentRun {
            outcome,
            conversation: self.conversation,
            budget,
            parse_retries: self.parse_retries,
            tool_calls_made: self.tool_calls_made,
        })
    }

    // ── Helpers ──

    fn push_charged(&mut self, turn: Turn) -> Result<()> {
        self.budget.charge_turn(&turn);
        self.conversation.push(turn)?;
        Ok(())
    }

    async fn emit(&self, event: AgentStreamEvent) {
        if let Some(events) = &self.events {
            // A consumer that hung up does not stop the run.
            let _ = events.send(event).await;
        }
    }

    /// Submit the conversation, retrying rate limits and timeouts with
    /// exponential backoff. Cancellation interrupts both the call and the wait.
    async fn submit(&self) -> std::result::Result<Completion, FailureReason> {
        let limits = &self.agent.limits;
        let provider = &self.agent.provider;
        let mut attempt = 0;

        loop {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FailureReason::Cancelled),
                result = provider.submit(&self.conversation, &self.agent.generation) => result,
            };

            match result {
                Ok(completion) => return Ok(completion),
                Err(error) if error.is_transient() && attempt < limits.provider_retries => {
                    let delay = backoff_delay(limits.provider_backoff, attempt, &error);
                    attempt += 1;
                    warn!(
                        provider = provider.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Provider call failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(FailureReason::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(error) => {
                    warn!(provider = provider.name(), error = %error, "Provider call failed");
                    return Err(FailureReason::ProviderUnavailable(error));
                }
            }
        }
    }
}

/// The answer of the first well-formed `result` call, if any.
fn terminal_answer(calls: &[ToolCall]) -> Option<String> {
    calls
        .iter()
        .filter(|c| c.name == RESULT)
        .find_map(|c| match ToolArgs::parse(RESULT, c.arguments.clone()) {
            Ok(ToolArgs::Result(args)) => Some(args.answer),
            _ => None,
        })
}

fn backoff_delay(base: Duration, attempt: u32, error: &ProviderError) -> Duration {
    let delay = base.saturating_mul(1 << attempt.min(16));
    match error {
        ProviderError::RateLimited { retry_after_secs } => {
            delay.max(Duration::from_secs(*retry_after_secs))
        }
        _ => delay,
    }
}

/// Split `text` into pieces of at most `size` characters.
fn chunks(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|piece| piece.iter().collect())
        .collect()
}
