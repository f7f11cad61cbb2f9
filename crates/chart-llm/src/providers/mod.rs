//! Concrete provider implementations
//!
//! Implementations of the LLMProvider trait for model-serving backends.

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "openai")]
pub use openai::{OpenAIConfig, OpenAIProvider};
