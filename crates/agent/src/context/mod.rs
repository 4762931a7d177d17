//! Context accounting: token estimates and the per-conversation budget.

pub mod budget;
pub mod token;

pub use budget::{BudgetState, BudgetTracker};
pub use token::{estimate_tokens, estimate_turn_tokens};
