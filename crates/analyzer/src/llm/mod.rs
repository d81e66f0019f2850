//! Language-model clients.
//!
//! The analyzer only needs "prompt in, completion out"; provider specifics live
//! behind [`LLMProvider`].

mod provider;

pub use provider::{
    create_provider, AnthropicProvider, LLMConfig, LLMProvider, MockProvider, OpenAIProvider,
};
#[cfg(test)]
pub use provider::MockLLMProvider;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("LLM request timed out")]
    Timeout,
    #[error("LLM provider error: {0}")]
    Provider(String),
    #[error("empty response from LLM")]
    EmptyResponse,
}
