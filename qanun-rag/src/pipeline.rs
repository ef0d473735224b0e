//! Question-answering orchestrator.
//!
//! The [`QaPipeline`] turns a question into an answer by composing an
//! [`EmbeddingProvider`], a [`Retriever`] and a [`GenerationProvider`]:
//! embed → retrieve → assemble context → generate.
//!
//! Each call is self-contained; earlier questions never influence later
//! retrieval or generation. Dropping the future returned by
//! [`QaPipeline::answer`] abandons any in-flight collaborator call.
//!
//! # Example
//!
//! ```rust,ignore
//! use qanun_rag::{QaPipeline, RagConfig, Retriever};
//!
//! let pipeline = QaPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(embedder))
//!     .generator(Arc::new(llm))
//!     .retriever(Arc::new(Retriever::new(corpus, 5)?))
//!     .build()?;
//!
//! let answer = pipeline.answer("ما هي أحكام المادة 23؟").await?;
//! ```

use std::sync::Arc;

use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::config::RagConfig;
use crate::document::RetrievalResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{ErrorKind, RagError, Result};
use crate::generation::GenerationProvider;
use crate::prompt::{assemble_context, build_prompt, context_budget};
use crate::retriever::Retriever;

/// The question-answering orchestrator. Construct one via [`QaPipeline::builder()`].
pub struct QaPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    retriever: Arc<Retriever>,
}

impl QaPipeline {
    /// Create a new [`QaPipelineBuilder`].
    pub fn builder() -> QaPipelineBuilder {
        QaPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the retriever.
    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }

    /// Answer `question` from the corpus.
    ///
    /// Returns the generated text verbatim.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyQuery`] for an empty or whitespace-only question;
    ///   neither collaborator is called.
    /// - [`RagError::InvalidArgument`] if the question alone exceeds
    ///   `max_prompt_chars`; neither collaborator is called.
    /// - [`RagError::EmbeddingFailure`] if the question cannot be embedded.
    /// - [`RagError::GenerationFailure`] if the answer cannot be generated.
    /// - [`RagError::Consistency`] if the corpus is internally inconsistent.
    pub async fn answer(&self, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyQuery);
        }
        context_budget(question, self.config.max_prompt_chars)?;
        let results = self.retrieve_context(question, self.config.top_k).await?;

        let context = assemble_context(&results, question, self.config.max_prompt_chars)?;
        let prompt = build_prompt(question, &context.text);
        let answer = self.generate(&prompt).await?;

        info!(
            question_chars = question.chars().count(),
            retrieved = results.len(),
            included = context.included,
            dropped = context.dropped,
            truncated = context.truncated,
            answer_chars = answer.chars().count(),
            "question answered"
        );
        Ok(answer)
    }

    /// Embed `question` and return the `k` most relevant chunks without
    /// generating an answer.
    ///
    /// # Errors
    ///
    /// Same as [`answer`](Self::answer), minus generation failures, plus
    /// [`RagError::InvalidArgument`] when `k == 0`.
    pub async fn retrieve_context(&self, question: &str, k: usize) -> Result<RetrievalResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyQuery);
        }
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be greater than zero".to_string()));
        }

        let query_embedding = self.embed_query(question).await?;
        self.retriever.retrieve(&query_embedding, k).map_err(|e| {
            if e.kind() == ErrorKind::Consistency {
                error!(target: "qanun::consistency", error = %e, "retrieval aborted");
            } else {
                error!(error = %e, "retrieval failed");
            }
            e
        })
    }

    /// Embed with a per-attempt timeout and bounded exponential backoff.
    ///
    /// Transport failures and timeouts are retried; a vector of the wrong
    /// shape is not, since asking again returns the same vector.
    async fn embed_query(&self, question: &str) -> Result<Vec<f32>> {
        let provider = self.embedding_provider.name().to_string();
        let mut attempt: u32 = 0;
        loop {
            let outcome =
                timeout(self.config.embedding_timeout, self.embedding_provider.embed(question)).await;
            let failure = match outcome {
                Ok(Ok(embedding)) => return self.check_embedding(&provider, embedding),
                Ok(Err(e)) => as_embedding_failure(&provider, e),
                Err(_) => RagError::embedding(
                    &provider,
                    format!("timed out after {:?}", self.config.embedding_timeout),
                ),
            };

            if attempt >= self.config.embedding_retries {
                error!(provider = %provider, attempts = attempt + 1, error = %failure, "query embedding failed");
                return Err(failure);
            }
            let delay = self.config.retry_backoff.saturating_mul(1u32 << attempt.min(16));
            warn!(provider = %provider, attempt = attempt + 1, ?delay, error = %failure, "retrying query embedding");
            sleep(delay).await;
            attempt += 1;
        }
    }

    fn check_embedding(&self, provider: &str, embedding: Vec<f32>) -> Result<Vec<f32>> {
        let expected = self.retriever.dimensions();
        if embedding.len() != expected {
            error!(provider, expected, actual = embedding.len(), "embedding dimension drift");
            return Err(RagError::embedding(
                provider,
                format!("expected {expected} dimensions, got {}", embedding.len()),
            ));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            error!(provider, "embedding contains non-finite values");
            return Err(RagError::embedding(provider, "embedding contains non-finite values"));
        }
        Ok(embedding)
    }

    /// Generate once, bounded by the generation timeout. Never retried:
    /// a repeated call may be billed twice.
    async fn generate(&self, prompt: &str) -> Result<String> {
        let provider = self.generator.name().to_string();
        match timeout(self.config.generation_timeout, self.generator.generate(prompt)).await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(e)) => {
                let failure = match e {
                    e @ RagError::GenerationFailure { .. } => e,
                    other => RagError::generation(&provider, other.to_string()),
                };
                error!(provider = %provider, error = %failure, "generation failed");
                Err(failure)
            }
            Err(_) => {
                error!(provider = %provider, timeout = ?self.config.generation_timeout, "generation timed out");
                Err(RagError::generation(
                    &provider,
                    format!("timed out after {:?}", self.config.generation_timeout),
                ))
            }
        }
    }
}

fn as_embedding_failure(provider: &str, error: RagError) -> RagError {
    match error {
        e @ RagError::EmbeddingFailure { .. } => e,
        other => RagError::embedding(provider, other.to_string()),
    }
}

/// Builder for constructing a [`QaPipeline`].
///
/// All fields except `config` are required; `config` defaults to
/// [`RagConfig::default()`].
#[derive(Default)]
pub struct QaPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn GenerationProvider>>,
    retriever: Option<Arc<Retriever>>,
}

impl QaPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the generation provider.
    pub fn generator(mut self, generator: Arc<dyn GenerationProvider>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the retriever.
    pub fn retriever(mut self, retriever: Arc<Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Build the [`QaPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing, the
    /// configuration is invalid, or the embedding provider's dimensionality
    /// differs from the corpus'.
    pub fn build(self) -> Result<QaPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let generator =
            self.generator.ok_or_else(|| RagError::ConfigError("generator is required".to_string()))?;
        let retriever =
            self.retriever.ok_or_else(|| RagError::ConfigError("retriever is required".to_string()))?;

        if embedding_provider.dimensions() != retriever.dimensions() {
            return Err(RagError::ConfigError(format!(
                "embedding provider '{}' produces {} dimensions but the corpus has {}",
                embedding_provider.name(),
                embedding_provider.dimensions(),
                retriever.dimensions()
            )));
        }

        Ok(QaPipeline { config, embedding_provider, generator, retriever })
    }
}
