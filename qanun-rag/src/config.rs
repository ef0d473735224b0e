//! Configuration for the question-answering pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::prompt::template_overhead;

/// Configuration parameters for the question-answering pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Number of chunks retrieved per question.
    pub top_k: usize,
    /// Maximum prompt length, in characters, accepted by the generation service.
    pub max_prompt_chars: usize,
    /// Upper bound on a single embedding call.
    pub embedding_timeout: Duration,
    /// Upper bound on the generation call.
    pub generation_timeout: Duration,
    /// Extra embedding attempts after a transient failure.
    pub embedding_retries: u32,
    /// Delay before the first embedding retry; doubled for each further retry.
    pub retry_backoff: Duration,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_prompt_chars: 24_000,
            embedding_timeout: Duration::from_secs(30),
            generation_timeout: Duration::from_secs(120),
            embedding_retries: 2,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are usable.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `top_k == 0`
    /// - `max_prompt_chars` cannot hold the prompt template
    /// - either timeout is zero
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.max_prompt_chars <= template_overhead() {
            return Err(RagError::ConfigError(format!(
                "max_prompt_chars ({}) must exceed the prompt template length ({})",
                self.max_prompt_chars,
                template_overhead()
            )));
        }
        if self.embedding_timeout.is_zero() || self.generation_timeout.is_zero() {
            return Err(RagError::ConfigError("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the number of chunks retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the maximum prompt length in characters.
    pub fn max_prompt_chars(mut self, chars: usize) -> Self {
        self.config.max_prompt_chars = chars;
        self
    }

    /// Set the per-call embedding timeout.
    pub fn embedding_timeout(mut self, timeout: Duration) -> Self {
        self.config.embedding_timeout = timeout;
        self
    }

    /// Set the generation timeout.
    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.config.generation_timeout = timeout;
        self
    }

    /// Set how many times a failed embedding call is retried.
    pub fn embedding_retries(mut self, retries: u32) -> Self {
        self.config.embedding_retries = retries;
        self
    }

    /// Set the initial retry backoff.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
