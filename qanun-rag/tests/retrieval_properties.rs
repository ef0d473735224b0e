//! Property tests for retrieval ranking and index/store coupling.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use qanun_rag::{ChunkId, Corpus, CorpusDocument, RagError, Retriever};

const DIM: usize = 8;

/// Generate an embedding with at least one non-zero component.
fn arb_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim)
        .prop_filter("non-zero embedding", |v| v.iter().any(|x| x.abs() > 1e-4))
}

fn arb_document() -> impl Strategy<Value = CorpusDocument> {
    ("[a-z]{1,8}( [a-z]{1,8}){0,4}", proptest::option::of("[A-Z][a-z]{2,10}")).prop_map(
        |(text, title)| CorpusDocument { text, title, source: None, chunk_id: None, corpus: None },
    )
}

fn arb_corpus(max: usize) -> impl Strategy<Value = Vec<(CorpusDocument, Vec<f32>)>> {
    proptest::collection::vec((arb_document(), arb_embedding(DIM)), 0..max)
}

fn retriever(entries: Vec<(CorpusDocument, Vec<f32>)>) -> Retriever {
    let corpus = Corpus::build(DIM, entries).expect("synthetic corpus builds");
    Retriever::new(Arc::new(corpus), 5).expect("valid top_k")
}

/// *For any* corpus and query, retrieval returns exactly `min(k, N)` results,
/// ordered by non-increasing score (ties by ascending id), without duplicates.
mod prop_retrieval_ranking {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn bounded_ordered_and_unique(
            entries in arb_corpus(40),
            query in arb_embedding(DIM),
            k in 1usize..50,
        ) {
            let n = entries.len();
            let retriever = retriever(entries);
            let results = retriever.retrieve(&query, k).unwrap();

            prop_assert_eq!(results.len(), k.min(n));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
                if window[0].score == window[1].score {
                    prop_assert!(window[0].chunk.id < window[1].chunk.id);
                }
            }

            let ids: HashSet<ChunkId> = results.iter().map(|r| r.chunk.id).collect();
            prop_assert_eq!(ids.len(), results.len());
        }

        #[test]
        fn repeated_queries_are_identical(
            entries in arb_corpus(40),
            query in arb_embedding(DIM),
            k in 1usize..20,
        ) {
            let retriever = retriever(entries);
            let first: Vec<(ChunkId, f32)> =
                retriever.retrieve(&query, k).unwrap().iter().map(|r| (r.chunk.id, r.score)).collect();
            let second: Vec<(ChunkId, f32)> =
                retriever.retrieve(&query, k).unwrap().iter().map(|r| (r.chunk.id, r.score)).collect();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn top_result_is_a_true_maximum(
            entries in arb_corpus(40).prop_filter("non-empty corpus", |e| !e.is_empty()),
            query in arb_embedding(DIM),
        ) {
            let n = entries.len();
            let retriever = retriever(entries);
            let top = retriever.retrieve(&query, 1).unwrap();
            let all = retriever.retrieve(&query, n).unwrap();
            prop_assert!(all.iter().all(|r| r.score <= top[0].score));
        }
    }
}

/// *For any* N synthetic chunks, every id in `[0, N)` is indexed and resolves
/// in the document store, and retrieving all of them returns each once.
mod prop_index_store_coupling {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn every_id_resolves(entries in arb_corpus(60), query in arb_embedding(DIM)) {
            let n = entries.len();
            let texts: Vec<String> = entries.iter().map(|(d, _)| d.text.clone()).collect();
            let corpus = Corpus::build(DIM, entries).unwrap();
            corpus.verify().unwrap();

            for id in 0..n as ChunkId {
                prop_assert!(corpus.index().contains(id));
                let chunk = corpus.store().get(id).unwrap();
                prop_assert_eq!(&chunk.text, &texts[id as usize]);
            }

            let retriever = Retriever::new(Arc::new(corpus), 5).unwrap();
            if n > 0 {
                let ids: HashSet<ChunkId> =
                    retriever.retrieve(&query, n).unwrap().iter().map(|r| r.chunk.id).collect();
                prop_assert_eq!(ids, (0..n as ChunkId).collect::<HashSet<_>>());
            }
        }
    }
}

#[test]
fn empty_corpus_returns_empty_result() {
    let retriever = retriever(Vec::new());
    assert!(retriever.retrieve(&[1.0; DIM], 5).unwrap().is_empty());
}

#[test]
fn k_larger_than_corpus_returns_whole_corpus() {
    let doc = |text: &str| CorpusDocument {
        text: text.into(),
        title: None,
        source: None,
        chunk_id: None,
        corpus: None,
    };
    let mut a = vec![0.0; DIM];
    a[0] = 1.0;
    let mut b = vec![0.0; DIM];
    b[1] = 1.0;
    let retriever = retriever(vec![(doc("a"), a.clone()), (doc("b"), b)]);
    let results = retriever.retrieve(&a, 5).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk.text, "a");
}

#[test]
fn dimension_mismatch_is_invalid_argument() {
    let retriever = retriever(Vec::new());
    let err = retriever.retrieve(&[1.0; DIM + 1], 1).unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: DIM, actual } if actual == DIM + 1));
    assert_eq!(err.kind(), qanun_rag::ErrorKind::InvalidArgument);
}
