//! The agent loop for ragent.
//!
//! Given a user query, the loop drives a bounded sequence of
//! **think → act → observe** cycles:
//!
//! 1. **Render** the system prompt and record the query
//! 2. **Submit** the conversation to the generation provider
//! 3. **Parse** the completion with the active response grammar
//! 4. **If tool calls**: dispatch them concurrently, append the results, loop back to step 2
//! 5. **If a final answer**: stream it to the caller and stop
//!
//! Token and iteration ceilings end the loop with one last chance to
//! answer; unparsable output is corrected a bounded number of times.

pub mod context;
pub mod loop_runner;
pub mod parser;
pub mod prompts;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use context::{BudgetState, BudgetTracker};
pub use loop_runner::{
    AgentLoop, AgentRequest, AgentRun, FailureReason, LoopLimits, LoopState, RunOutcome,
};
pub use parser::{ParsedResponse, PlainGrammar, ResponseGrammar, Step, ToolGrammar, grammar_for};
pub use prompts::BasicPromptRenderer;
pub use stream_event::AgentStreamEvent;
