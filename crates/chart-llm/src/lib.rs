//! Reasoning-service abstraction for chart-rs
//!
//! Provider-agnostic types for single-shot completions, including the
//! image-bearing requests the pattern stage sends. It includes:
//!
//! - Message types with multi-modal content
//! - Completion request/response types
//! - Provider trait for concrete backends
//! - An OpenAI-compatible provider (behind the `openai` feature)

pub mod completion;
pub mod error;
pub mod messages;
pub mod provider;

// Re-export main types
pub use completion::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};
pub use error::{LLMError, Result};
pub use messages::{ContentBlock, ImageSource, Message, MessageContent, Role};
pub use provider::LLMProvider;

// Provider implementations (feature-gated)
#[cfg(feature = "openai")]
pub mod providers;
