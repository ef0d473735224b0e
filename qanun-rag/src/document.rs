//! Data types for chunks and retrieval results.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Stable identity of an indexed chunk.
///
/// Identities are assigned in corpus order at load time, starting at zero.
pub type ChunkId = u64;

/// Descriptive metadata attached to a chunk. Never used in ranking.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Title of the law or document the chunk was taken from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Where the document came from (file name, URL, gazette reference).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Identifier of the chunk inside its source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    /// Tag of the corpus the document belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus: Option<String>,
}

/// The atomic retrievable unit: a passage of corpus text plus its metadata.
///
/// The chunk's embedding lives in the [`VectorRecordStore`](crate::VectorRecordStore)
/// under the same [`ChunkId`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Identity shared with the similarity index.
    pub id: ChunkId,
    /// The passage content. Never empty.
    pub text: String,
    /// Descriptive metadata.
    pub metadata: ChunkMetadata,
}

/// A retrieved [`Chunk`] paired with its similarity score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Arc<Chunk>,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}

/// Ranked retrieval output, most relevant first.
pub type RetrievalResult = Vec<SearchResult>;

/// An `(id, score)` pair produced by a [`SimilarityIndex`](crate::SimilarityIndex).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredId {
    /// Identity of the matched vector.
    pub id: ChunkId,
    /// Cosine similarity to the query.
    pub score: f32,
}
