//! Reasoning-service provider trait

use crate::{CompletionRequest, CompletionResponse, Result};
use async_trait::async_trait;

/// Trait for completion providers
///
/// Implementations give access to different model-serving backends
/// (OpenAI, OpenRouter, local OpenAI-compatible servers).
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion
    ///
    /// # Arguments
    ///
    /// * `request` - The completion request with messages and parameters
    ///
    /// # Returns
    ///
    /// The completion response with the assistant's message and metadata
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the provider name (e.g., "openai")
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Message, StopReason, TokenUsage};
    use mockall::mock;

    mock! {
        Provider {}

        #[async_trait]
        impl LLMProvider for Provider {
            async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
            fn name(&self) -> &str;
        }
    }

    #[test]
    fn test_trait_is_mockable_for_consumers() {
        let mut provider = MockProvider::new();
        provider.expect_complete().returning(|_| {
            Ok(CompletionResponse {
                message: Message::assistant("hi"),
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage {
                    input_tokens: 1,
                    output_tokens: 1,
                },
            })
        });
        provider.expect_name().return_const("mock".to_string());

        let request = CompletionRequest::builder("test-model")
            .add_message(Message::user("hello"))
            .build();
        let response = tokio_test::block_on(provider.complete(request)).unwrap();
        assert_eq!(response.message.text(), Some("hi"));
        assert_eq!(provider.name(), "mock");
    }
}
