//! Per-conversation context budget.
//!
//! Tokens are charged as turns enter the conversation and as completions
//! come back. The tracker never refuses a charge; the controller asks
//! [`BudgetTracker::exceeded`] at the points where it can still change
//! course.

use ragent_core::message::Turn;
use ragent_core::provider::Completion;
use serde::{Deserialize, Serialize};

use super::token::{MESSAGE_OVERHEAD, estimate_tokens, estimate_turn_tokens};

/// A snapshot of budget consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetState {
    pub tokens_consumed: u64,
    pub iteration_count: u32,
    pub max_tokens: u64,
    pub max_iterations: u32,
}

/// Tracks tokens and completed think/act/observe cycles for one conversation.
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    state: BudgetState,
}

impl BudgetTracker {
    pub fn new(max_tokens: u64, max_iterations: u32) -> Self {
        Self {
            state: BudgetState {
                tokens_consumed: 0,
                iteration_count: 0,
                max_tokens,
                max_iterations,
            },
        }
    }

    pub fn charge(&mut self, tokens: u64) {
        self.state.tokens_consumed = self.state.tokens_consumed.saturating_add(tokens);
    }

    /// Charge a turn by its estimated wire size.
    pub fn charge_turn(&mut self, turn: &Turn) {
        self.charge(estimate_turn_tokens(turn) as u64);
    }

    /// Charge a completion, preferring the provider's own count.
    pub fn charge_completion(&mut self, completion: &Completion) {
        let tokens = match completion.usage {
            Some(usage) if usage.completion_tokens > 0 => u64::from(usage.completion_tokens),
            _ => (MESSAGE_OVERHEAD + estimate_tokens(&completion.text)) as u64,
        };
        self.charge(tokens);
    }

    /// Record one completed cycle.
    pub fn record_iteration(&mut self) {
        self.state.iteration_count = self.state.iteration_count.saturating_add(1);
    }

    /// True once consumption has reached the ceiling.
    pub fn exceeded(&self) -> bool {
        self.state.tokens_consumed >= self.state.max_tokens
    }

    /// True when another full cycle would pass the iteration ceiling.
    pub fn iterations_exhausted(&self) -> bool {
        self.state.iteration_count >= self.state.max_iterations
    }

    pub fn iteration_count(&self) -> u32 {
        self.state.iteration_count
    }

    pub fn tokens_consumed(&self) -> u64 {
        self.state.tokens_consumed
    }

    pub fn state(&self) -> BudgetState {
        self.state
    }
}
