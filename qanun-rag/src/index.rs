//! Similarity index over chunk embeddings.
//!
//! [`FlatIndex`] is an exact index: every query scans all normalised rows
//! and keeps the best `k` in a bounded heap, so recall is always 1.0. It is
//! sufficient for corpora up to the low hundreds of thousands of chunks.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::debug;

use crate::document::{ChunkId, ScoredId};
use crate::error::{RagError, Result};
use crate::vectors::{VectorRecordStore, check_vector, normalized};

/// Nearest-neighbour search over fixed-dimension vectors using cosine similarity.
///
/// Results are ordered by descending score; equal scores are ordered by
/// ascending id so that repeated queries return identical rankings.
pub trait SimilarityIndex: Send + Sync {
    /// Dimensionality every query must match.
    fn dimensions(&self) -> usize;

    /// Number of indexed vectors.
    fn len(&self) -> usize;

    /// Whether the index holds no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the `min(k, len)` most similar ids to `query`.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidArgument`] if `k == 0` or the query has
    ///   non-finite components.
    /// - [`RagError::DimensionMismatch`] if the query has the wrong length.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>>;

    /// Whether `id` is indexed.
    fn contains(&self, id: ChunkId) -> bool;

    /// All indexed ids, in insertion order.
    fn ids(&self) -> Vec<ChunkId>;
}

/// Exact brute-force index over a [`VectorRecordStore`].
#[derive(Debug, Clone)]
pub struct FlatIndex {
    records: VectorRecordStore,
}

impl FlatIndex {
    /// Build an index from `(id, vector)` pairs.
    ///
    /// # Errors
    ///
    /// Fails if any vector has the wrong dimensionality, contains non-finite
    /// values, or reuses an id.
    pub fn build<I, V>(dimensions: usize, vectors: I) -> Result<Self>
    where
        I: IntoIterator<Item = (ChunkId, V)>,
        V: AsRef<[f32]>,
    {
        let mut records = VectorRecordStore::new(dimensions)?;
        for (id, vector) in vectors {
            records.push(id, vector.as_ref())?;
        }
        Ok(Self::from_records(records))
    }

    /// Wrap an already populated record store.
    pub fn from_records(records: VectorRecordStore) -> Self {
        Self { records }
    }

    /// The underlying record store.
    pub fn records(&self) -> &VectorRecordStore {
        &self.records
    }
}

impl SimilarityIndex for FlatIndex {
    fn dimensions(&self) -> usize {
        self.records.dimensions()
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>> {
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be greater than zero".into()));
        }
        check_vector(self.dimensions(), query)?;
        if self.records.is_empty() {
            return Ok(Vec::new());
        }

        let query = normalized(query);
        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k.min(self.len()) + 1);
        for (id, row) in self.records.iter() {
            let candidate = Candidate { score: dot(row, &query), id };
            if heap.len() < k {
                heap.push(candidate);
            } else if heap.peek().is_some_and(|worst| candidate < *worst) {
                heap.pop();
                heap.push(candidate);
            }
        }

        let results: Vec<ScoredId> = heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| ScoredId { id: c.id, score: c.score })
            .collect();
        debug!(scanned = self.len(), k, returned = results.len(), "flat index search");
        Ok(results)
    }

    fn contains(&self, id: ChunkId) -> bool {
        self.records.contains(id)
    }

    fn ids(&self) -> Vec<ChunkId> {
        self.records.iter().map(|(id, _)| id).collect()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    // `+ 0.0` folds -0.0 into 0.0 so that ties compare equal under total_cmp.
    a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>() + 0.0
}

/// Heap entry ordered so that the *worst* candidate is the greatest.
///
/// "Better" means a higher score, then a lower id. Sorting ascending
/// therefore yields best-first order.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f32,
    id: ChunkId,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other.score.total_cmp(&self.score).then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> FlatIndex {
        FlatIndex::build(
            2,
            vec![(0, vec![1.0, 0.0]), (1, vec![0.7, 0.3]), (2, vec![0.0, 1.0])],
        )
        .unwrap()
    }

    #[test]
    fn returns_nearest_first() {
        let results = index().search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 0);
        assert_eq!(results[1].id, 1);
        assert!(results[0].score >= results[1].score);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn magnitude_does_not_affect_ranking() {
        let idx = FlatIndex::build(2, vec![(0, vec![10.0, 0.0]), (1, vec![0.1, 0.1])]).unwrap();
        let results = idx.search(&[0.1, 0.12], 2).unwrap();
        assert_eq!(results[0].id, 1);
    }

    #[test]
    fn extreme_magnitudes_still_rank_by_direction() {
        let idx = FlatIndex::build(2, vec![(0, vec![0.0, 1.0]), (1, vec![1.0, 0.0])]).unwrap();
        for query in [[1e20, 0.0], [1e-30, 0.0]] {
            let results = idx.search(&query, 2).unwrap();
            assert_eq!(results[0].id, 1);
            assert!((results[0].score - 1.0).abs() < 1e-6);
            assert_eq!(results[1].score, 0.0);
        }
    }

    #[test]
    fn equal_scores_break_by_ascending_id() {
        let idx = FlatIndex::build(
            2,
            vec![(9, vec![1.0, 0.0]), (3, vec![2.0, 0.0]), (5, vec![1.0, 0.0]), (1, vec![0.0, 1.0])],
        )
        .unwrap();
        let ids: Vec<ChunkId> = idx.search(&[1.0, 0.0], 3).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 5, 9]);
    }

    #[test]
    fn k_larger_than_corpus_returns_everything() {
        let results = index().search(&[0.0, 1.0], 10).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, 2);
    }

    #[test]
    fn empty_index_returns_empty_result() {
        let idx = FlatIndex::build(4, Vec::<(ChunkId, Vec<f32>)>::new()).unwrap();
        assert!(idx.is_empty());
        assert!(idx.search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn zero_k_is_invalid() {
        assert!(matches!(index().search(&[1.0, 0.0], 0), Err(RagError::InvalidArgument(_))));
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        assert!(matches!(
            index().search(&[1.0, 0.0, 0.0], 1),
            Err(RagError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn non_finite_query_is_rejected() {
        assert!(matches!(
            index().search(&[f32::INFINITY, 0.0], 1),
            Err(RagError::InvalidArgument(_))
        ));
    }

    #[test]
    fn build_rejects_duplicate_ids() {
        let err = FlatIndex::build(2, vec![(0, vec![1.0, 0.0]), (0, vec![0.0, 1.0])]).unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
    }
}
