//! Generation provider implementations for ragent.
//!
//! All providers implement `ragent_core::GenerationProvider`. Wrap one in
//! a [`GatedProvider`] to share a bounded request gate across
//! conversations.

pub mod gate;
pub mod openai_compat;

pub use gate::{ConcurrencyGate, GatedProvider};
pub use openai_compat::OpenAiCompatProvider;
