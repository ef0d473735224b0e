//! Embedding provider trait for turning text into vectors.

use async_trait::async_trait;

use crate::error::Result;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap a specific embedding backend behind a unified async
/// interface. Output must be deterministic for identical input within one
/// model version, and every vector must have [`dimensions`](Self::dimensions)
/// components.
///
/// # Example
///
/// ```rust,ignore
/// use qanun_rag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("ما هي أحكام المادة 23؟").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Short provider name used in logs and error messages.
    fn name(&self) -> &str {
        "embedding"
    }
}
