//! Server configuration, read from the process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use qanun_rag::RagConfig;
use qanun_rag::openai::{DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL, DEFAULT_TEMPERATURE, OPENROUTER_API_BASE};

use crate::telemetry::LogFormat;

const DEFAULT_EMBEDDING_URL: &str = "http://127.0.0.1:8080/v1";

/// Where and how the embedding service is reached.
#[derive(Clone, Debug)]
pub struct EmbeddingSettings {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
}

/// Where and how the generation service is reached.
#[derive(Clone, Debug)]
pub struct GenerationSettings {
    pub url: String,
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub corpus_dir: PathBuf,
    pub docs_file: String,
    pub vectors_file: String,
    pub conversations_dir: PathBuf,
    /// Upper bound on a whole HTTP request, generation included.
    pub request_timeout: Duration,
    pub log_format: LogFormat,
    pub rag: RagConfig,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
}

impl ServerConfig {
    /// Read the configuration from the environment, after loading `.env`
    /// if one is present.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Unset or blank variables take their defaults. A variable that is set
    /// but cannot be parsed is an error.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let string = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let defaults = RagConfig::default();
        let rag = RagConfig::builder()
            .top_k(parsed(&var, "QANUN_TOP_K")?.unwrap_or(defaults.top_k))
            .max_prompt_chars(
                parsed(&var, "QANUN_MAX_PROMPT_CHARS")?.unwrap_or(defaults.max_prompt_chars),
            )
            .build()
            .context("invalid retrieval configuration")?;

        let Some(api_key) = var("OPENROUTER_API_KEY") else {
            bail!("OPENROUTER_API_KEY must be set");
        };

        let log_format = match var("QANUN_LOG_FORMAT") {
            Some(format) => format.parse()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            host: string("QANUN_HOST", "127.0.0.1"),
            port: parsed(&var, "QANUN_PORT")?.unwrap_or(5000),
            corpus_dir: PathBuf::from(string("QANUN_CORPUS_DIR", "./legal_RAG")),
            docs_file: string("QANUN_DOCS_FILE", "docs.jsonl"),
            vectors_file: string("QANUN_VECTORS_FILE", "vectors.bin"),
            conversations_dir: PathBuf::from(string("QANUN_CONVERSATIONS_DIR", "./conversations")),
            request_timeout: Duration::from_secs(
                parsed(&var, "QANUN_REQUEST_TIMEOUT_SECS")?.unwrap_or(180),
            ),
            log_format,
            rag,
            embedding: EmbeddingSettings {
                url: string("QANUN_EMBEDDING_URL", DEFAULT_EMBEDDING_URL),
                model: string("QANUN_EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
                api_key: var("QANUN_EMBEDDING_API_KEY"),
            },
            generation: GenerationSettings {
                url: string("QANUN_GENERATION_URL", OPENROUTER_API_BASE),
                model: string("QANUN_GENERATION_MODEL", DEFAULT_CHAT_MODEL),
                api_key,
                temperature: parsed(&var, "QANUN_TEMPERATURE")?.unwrap_or(DEFAULT_TEMPERATURE),
            },
        })
    }

    pub fn docs_path(&self) -> PathBuf {
        self.corpus_dir.join(&self.docs_file)
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.corpus_dir.join(&self.vectors_file)
    }
}

fn parsed<T, F>(var: &F, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|value| value.parse::<T>().with_context(|| format!("{key}={value:?} is not valid")))
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[("OPENROUTER_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 5000);
        assert_eq!(config.docs_path(), PathBuf::from("./legal_RAG/docs.jsonl"));
        assert_eq!(config.vectors_path(), PathBuf::from("./legal_RAG/vectors.bin"));
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.embedding.model, "BAAI/bge-m3");
        assert!(config.embedding.api_key.is_none());
        assert_eq!(config.generation.url, "https://openrouter.ai/api/v1");
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn overrides_are_read() {
        let config = config(&[
            ("OPENROUTER_API_KEY", "sk-test"),
            ("QANUN_PORT", "8081"),
            ("QANUN_TOP_K", "3"),
            ("QANUN_TEMPERATURE", "0.5"),
            ("QANUN_LOG_FORMAT", "json"),
            ("QANUN_EMBEDDING_API_KEY", "emb"),
        ])
        .unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.rag.top_k, 3);
        assert_eq!(config.generation.temperature, 0.5);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.embedding.api_key.as_deref(), Some("emb"));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = config(&[("OPENROUTER_API_KEY", "sk-test"), ("QANUN_PORT", "fifty")]).unwrap_err();
        assert!(err.to_string().contains("QANUN_PORT"));
    }

    #[test]
    fn zero_top_k_is_rejected() {
        assert!(config(&[("OPENROUTER_API_KEY", "sk-test"), ("QANUN_TOP_K", "0")]).is_err());
    }

    #[test]
    fn generation_key_is_required() {
        let err = config(&[("OPENROUTER_API_KEY", "  ")]).unwrap_err();
        assert!(err.to_string().contains("OPENROUTER_API_KEY"));
    }
}
