//! Model capability for the Quorum engine.
//!
//! The engine only ever sees the [`ModelProvider`] trait. Two
//! implementations ship here: an adapter for any OpenAI-compatible chat
//! completions endpoint, and a scripted provider for tests and offline
//! runs.

mod mock;
mod openai_compat;
mod traits;

pub use mock::ScriptedProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use traits::{CompletionRequest, CompletionResponse, ModelProvider};
