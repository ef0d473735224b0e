//! Top-k retrieval: similarity search resolved through the document store.

use std::sync::Arc;

use tracing::{debug, error};

use crate::corpus::Corpus;
use crate::document::{RetrievalResult, SearchResult};
use crate::error::{RagError, Result};

/// Composes the similarity index and document store of a [`Corpus`].
#[derive(Debug, Clone)]
pub struct Retriever {
    corpus: Arc<Corpus>,
    default_top_k: usize,
}

impl Retriever {
    /// Create a retriever over `corpus` returning `default_top_k` results
    /// from [`retrieve_default`](Self::retrieve_default).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `default_top_k` is zero.
    pub fn new(corpus: Arc<Corpus>, default_top_k: usize) -> Result<Self> {
        if default_top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        Ok(Self { corpus, default_top_k })
    }

    /// The corpus this retriever reads from.
    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    /// Dimensionality query vectors must have.
    pub fn dimensions(&self) -> usize {
        self.corpus.dimensions()
    }

    /// The `k` used by [`retrieve_default`](Self::retrieve_default).
    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Retrieve with the configured default `k`.
    pub fn retrieve_default(&self, query: &[f32]) -> Result<RetrievalResult> {
        self.retrieve(query, self.default_top_k)
    }

    /// Return the `min(k, corpus size)` chunks most similar to `query`,
    /// most relevant first.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidArgument`] / [`RagError::DimensionMismatch`] for a
    ///   bad `k` or query vector.
    /// - [`RagError::Consistency`] if the index returns an id the store
    ///   cannot resolve. Such ids are never silently dropped.
    pub fn retrieve(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        let hits = self.corpus.index().search(query, k)?;
        let store = self.corpus.store();

        let results = hits
            .into_iter()
            .map(|hit| match store.get(hit.id) {
                Ok(chunk) => Ok(SearchResult { chunk, score: hit.score }),
                Err(e) => {
                    error!(
                        target: "qanun::consistency",
                        id = hit.id,
                        error = %e,
                        "indexed id missing from document store"
                    );
                    Err(RagError::Consistency(format!("indexed id {} has no document", hit.id)))
                }
            })
            .collect::<Result<RetrievalResult>>()?;

        debug!(k, returned = results.len(), "retrieval completed");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::CorpusDocument;
    use crate::document::{Chunk, ChunkId, ChunkMetadata, ScoredId};
    use crate::index::SimilarityIndex;
    use crate::store::DocumentStore;

    fn doc(text: &str) -> CorpusDocument {
        CorpusDocument { text: text.into(), title: None, source: None, chunk_id: None, corpus: None }
    }

    fn corpus() -> Arc<Corpus> {
        Arc::new(
            Corpus::build(
                3,
                vec![
                    (doc("Article 1 defines theft."), vec![1.0, 0.0, 0.0]),
                    (doc("Article 2 defines fraud."), vec![0.8, 0.6, 0.0]),
                    (doc("Article 3 defines bribery."), vec![0.0, 0.0, 1.0]),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn resolves_ranked_chunks() {
        let retriever = Retriever::new(corpus(), 5).unwrap();
        let results = retriever.retrieve(&[0.9, 0.1, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.text, "Article 1 defines theft.");
        assert_eq!(results[1].chunk.text, "Article 2 defines fraud.");
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn default_k_is_bounded_by_corpus_size() {
        let retriever = Retriever::new(corpus(), 5).unwrap();
        assert_eq!(retriever.retrieve_default(&[0.0, 0.0, 1.0]).unwrap().len(), 3);
    }

    #[test]
    fn zero_default_k_is_a_config_error() {
        assert!(matches!(Retriever::new(corpus(), 0), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn mismatched_query_fails_before_search() {
        let retriever = Retriever::new(corpus(), 5).unwrap();
        let err = retriever.retrieve(&[1.0, 0.0, 0.0, 0.0], 2).unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 4 }));
    }

    /// An index that reports ids its store never saw.
    struct PhantomIndex;

    impl SimilarityIndex for PhantomIndex {
        fn dimensions(&self) -> usize {
            2
        }
        fn len(&self) -> usize {
            1
        }
        fn search(&self, _query: &[f32], _k: usize) -> Result<Vec<ScoredId>> {
            Ok(vec![ScoredId { id: 0, score: 1.0 }, ScoredId { id: 99, score: 0.5 }])
        }
        fn contains(&self, id: ChunkId) -> bool {
            id == 0
        }
        fn ids(&self) -> Vec<ChunkId> {
            vec![0]
        }
    }

    #[test]
    fn unresolvable_id_is_a_consistency_error() {
        let mut store = DocumentStore::new();
        store
            .put(0, Chunk { id: 0, text: "present".into(), metadata: ChunkMetadata::default() })
            .unwrap();
        let corpus = Corpus::from_parts(Arc::new(PhantomIndex), store).unwrap();
        let retriever = Retriever::new(Arc::new(corpus), 5).unwrap();

        let err = retriever.retrieve(&[1.0, 0.0], 2).unwrap_err();
        assert!(matches!(err, RagError::Consistency(msg) if msg.contains("99")));
    }
}
