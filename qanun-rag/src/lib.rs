//! # qanun-rag
//!
//! Retrieval-augmented question answering over a fixed legal corpus.
//!
//! ## Overview
//!
//! - [`VectorRecordStore`] holds one normalised embedding per chunk and
//!   reads/writes the `QVEC` vectors file.
//! - [`SimilarityIndex`] / [`FlatIndex`] answer exact top-k cosine queries
//!   with a deterministic id tie-break.
//! - [`DocumentStore`] resolves chunk ids to text and metadata.
//! - [`Corpus`] builds the index and the store together and guarantees they
//!   hold the same ids.
//! - [`Retriever`] resolves index hits into ranked [`SearchResult`]s.
//! - [`QaPipeline`] embeds a question, retrieves context, assembles a
//!   bounded prompt and asks the [`GenerationProvider`] for an answer.
//!
//! ## Features
//!
//! - `openai`: [`openai::OpenAIEmbeddingProvider`] and
//!   [`openai::OpenAIChatGenerator`] for OpenAI-compatible HTTP APIs.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use qanun_rag::{Corpus, QaPipeline, RagConfig, Retriever};
//!
//! let corpus = Arc::new(Corpus::load("legal_RAG/docs.jsonl", "legal_RAG/vectors.bin")?);
//! let config = RagConfig::default();
//! let pipeline = QaPipeline::builder()
//!     .retriever(Arc::new(Retriever::new(corpus, config.top_k)?))
//!     .config(config)
//!     .embedding_provider(Arc::new(embedder))
//!     .generator(Arc::new(llm))
//!     .build()?;
//!
//! let answer = pipeline.answer("ما هي أحكام المادة 23 من قانون المسطرة الجنائية؟").await?;
//! ```

pub mod config;
pub mod corpus;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod store;
pub mod vectors;

#[cfg(feature = "openai")]
pub mod openai;

pub use config::{RagConfig, RagConfigBuilder};
pub use corpus::{Corpus, CorpusDocument};
pub use document::{Chunk, ChunkId, ChunkMetadata, RetrievalResult, ScoredId, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{ErrorKind, RagError, Result};
pub use generation::GenerationProvider;
pub use index::{FlatIndex, SimilarityIndex};
pub use pipeline::{QaPipeline, QaPipelineBuilder};
pub use prompt::{AssembledContext, assemble_context, build_prompt};
pub use retriever::Retriever;
pub use store::DocumentStore;
pub use vectors::VectorRecordStore;
