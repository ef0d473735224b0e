//! Document store: resolves chunk identities to text and metadata.

use std::collections::HashMap;
use std::sync::Arc;

use crate::document::{Chunk, ChunkId};
use crate::error::{RagError, Result};

/// Maps each [`ChunkId`] to its [`Chunk`].
///
/// Populated in lock-step with the similarity index by
/// [`Corpus::build`](crate::Corpus::build) and read-only afterwards.
#[derive(Debug, Default, Clone)]
pub struct DocumentStore {
    chunks: HashMap<ChunkId, Arc<Chunk>>,
}

impl DocumentStore {
    /// Create an empty document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `chunk` under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] if `id` is already present, if
    /// `chunk.id` differs from `id`, or if the chunk text is empty.
    pub fn put(&mut self, id: ChunkId, chunk: Chunk) -> Result<()> {
        if chunk.id != id {
            return Err(RagError::InvalidArgument(format!(
                "chunk id {} stored under id {id}",
                chunk.id
            )));
        }
        if chunk.text.trim().is_empty() {
            return Err(RagError::InvalidArgument(format!("chunk {id} has empty text")));
        }
        if self.chunks.contains_key(&id) {
            return Err(RagError::InvalidArgument(format!("duplicate document id {id}")));
        }
        self.chunks.insert(id, Arc::new(chunk));
        Ok(())
    }

    /// Look up the chunk stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] if no chunk has that id.
    pub fn get(&self, id: ChunkId) -> Result<Arc<Chunk>> {
        self.chunks
            .get(&id)
            .cloned()
            .ok_or_else(|| RagError::NotFound(format!("chunk {id}")))
    }

    /// Whether a chunk is stored under `id`.
    pub fn contains(&self, id: ChunkId) -> bool {
        self.chunks.contains_key(&id)
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Iterate over stored ids in arbitrary order.
    pub fn ids(&self) -> impl Iterator<Item = ChunkId> + '_ {
        self.chunks.keys().copied()
    }
}
