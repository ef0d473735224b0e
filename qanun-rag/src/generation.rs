//! Generation provider trait for turning a prompt into an answer.

use async_trait::async_trait;

use crate::error::Result;

/// A generative model that answers a fully assembled prompt.
///
/// Output may differ between calls for the same prompt. Implementations
/// report failures as [`RagError::GenerationFailure`](crate::RagError::GenerationFailure).
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Produce the answer text for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Short provider name used in logs and error messages.
    fn name(&self) -> &str {
        "generation"
    }
}
