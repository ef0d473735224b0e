//! Corpus loading: builds the similarity index and the document store together.
//!
//! A persisted corpus is a documents file (JSON array when the extension is
//! `.json`, JSON Lines otherwise) and a `QVEC` vectors file whose row `i`
//! is the embedding of document `i`. Identities are the document positions.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::document::{Chunk, ChunkId, ChunkMetadata};
use crate::error::{RagError, Result};
use crate::index::{FlatIndex, SimilarityIndex};
use crate::store::DocumentStore;
use crate::vectors::VectorRecordStore;

/// One document as supplied by the corpus loader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorpusDocument {
    /// Passage text.
    pub text: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub chunk_id: Option<String>,
    #[serde(default)]
    pub corpus: Option<String>,
}

impl CorpusDocument {
    fn into_chunk(self, id: ChunkId) -> Chunk {
        Chunk {
            id,
            text: self.text,
            metadata: ChunkMetadata {
                title: self.title,
                source: self.source,
                chunk_id: self.chunk_id,
                corpus: self.corpus,
            },
        }
    }
}

/// An immutable, coupled similarity index and document store.
///
/// Every id in the index resolves in the store and vice versa. Share it
/// behind an `Arc`; no locking is needed because nothing mutates it after
/// construction.
pub struct Corpus {
    index: Arc<dyn SimilarityIndex>,
    store: DocumentStore,
}

impl std::fmt::Debug for Corpus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Corpus")
            .field("dimensions", &self.index.dimensions())
            .field("len", &self.index.len())
            .finish()
    }
}

impl Corpus {
    /// Build a corpus from documents paired with their embeddings.
    ///
    /// Ids are assigned `0..n` in input order. Each vector is inserted into
    /// the index and each document into the store under the same id.
    ///
    /// # Errors
    ///
    /// Fails on the first document with empty text or an invalid vector;
    /// nothing is returned in that case.
    pub fn build<I>(dimensions: usize, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (CorpusDocument, Vec<f32>)>,
    {
        let mut records = VectorRecordStore::new(dimensions)?;
        let mut store = DocumentStore::new();
        for (position, (document, vector)) in entries.into_iter().enumerate() {
            let id = position as ChunkId;
            store.put(id, document.into_chunk(id))?;
            records.push(id, &vector)?;
        }
        Self::from_parts(Arc::new(FlatIndex::from_records(records)), store)
    }

    /// Couple an existing index with a document store, checking that their
    /// id sets are identical.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Consistency`] if any id is present in only one of them.
    pub fn from_parts(index: Arc<dyn SimilarityIndex>, store: DocumentStore) -> Result<Self> {
        let corpus = Self { index, store };
        corpus.verify()?;
        Ok(corpus)
    }

    /// Load a persisted corpus from a documents file and a `QVEC` vectors file.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::CorpusError`] if either file is malformed or if the
    /// number of documents differs from the number of vectors.
    pub fn load(docs_path: impl AsRef<Path>, vectors_path: impl AsRef<Path>) -> Result<Self> {
        let docs_path = docs_path.as_ref();
        let vectors_path = vectors_path.as_ref();

        let documents = read_documents(docs_path)?;
        let records = VectorRecordStore::read_from(BufReader::new(open(vectors_path)?))?;
        if documents.len() != records.len() {
            return Err(RagError::CorpusError(format!(
                "{} has {} documents but {} has {} vectors",
                docs_path.display(),
                documents.len(),
                vectors_path.display(),
                records.len()
            )));
        }

        let mut store = DocumentStore::new();
        for (position, document) in documents.into_iter().enumerate() {
            let id = position as ChunkId;
            store.put(id, document.into_chunk(id)).map_err(|e| {
                RagError::CorpusError(format!("document {position} in {}: {e}", docs_path.display()))
            })?;
        }

        let dimensions = records.dimensions();
        let corpus = Self::from_parts(Arc::new(FlatIndex::from_records(records)), store)?;
        info!(
            documents = corpus.len(),
            dimensions,
            docs = %docs_path.display(),
            vectors = %vectors_path.display(),
            "corpus loaded"
        );
        Ok(corpus)
    }

    /// Check that the index and the store hold exactly the same ids.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Consistency`] on the first drifted id.
    pub fn verify(&self) -> Result<()> {
        if self.index.len() != self.store.len() {
            let message = format!(
                "index holds {} vectors but store holds {} documents",
                self.index.len(),
                self.store.len()
            );
            error!(target: "qanun::consistency", %message, "corpus drift detected");
            return Err(RagError::Consistency(message));
        }
        if let Some(id) = self.index.ids().into_iter().find(|id| !self.store.contains(*id)) {
            let message = format!("indexed id {id} has no document");
            error!(target: "qanun::consistency", %message, "corpus drift detected");
            return Err(RagError::Consistency(message));
        }
        if let Some(id) = self.store.ids().find(|id| !self.index.contains(*id)) {
            let message = format!("document {id} has no index entry");
            error!(target: "qanun::consistency", %message, "corpus drift detected");
            return Err(RagError::Consistency(message));
        }
        Ok(())
    }

    /// The similarity index.
    pub fn index(&self) -> &dyn SimilarityIndex {
        self.index.as_ref()
    }

    /// The document store.
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Embedding dimensionality of the corpus.
    pub fn dimensions(&self) -> usize {
        self.index.dimensions()
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the corpus has no chunks.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path)
        .map_err(|e| RagError::CorpusError(format!("cannot open {}: {e}", path.display())))
}

fn read_documents(path: &Path) -> Result<Vec<CorpusDocument>> {
    let reader = BufReader::new(open(path)?);
    let is_json_array = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json_array {
        return serde_json::from_reader(reader)
            .map_err(|e| RagError::CorpusError(format!("{}: {e}", path.display())));
    }

    let mut documents = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let document = serde_json::from_str(&line).map_err(|e| {
            RagError::CorpusError(format!("{} line {}: {e}", path.display(), line_no + 1))
        })?;
        documents.push(document);
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn doc(text: &str) -> CorpusDocument {
        CorpusDocument {
            text: text.to_string(),
            title: Some("Code pénal".into()),
            source: None,
            chunk_id: None,
            corpus: Some("penal".into()),
        }
    }

    fn write_vectors(path: &Path, dimensions: usize, rows: &[Vec<f32>]) {
        let mut records = VectorRecordStore::new(dimensions).unwrap();
        for (i, row) in rows.iter().enumerate() {
            records.push(i as ChunkId, row).unwrap();
        }
        records.write_to(File::create(path).unwrap()).unwrap();
    }

    #[test]
    fn build_couples_ids_in_input_order() {
        let corpus = Corpus::build(
            2,
            vec![(doc("first"), vec![1.0, 0.0]), (doc("second"), vec![0.0, 1.0])],
        )
        .unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.store().get(1).unwrap().text, "second");
        assert_eq!(corpus.store().get(0).unwrap().metadata.corpus.as_deref(), Some("penal"));
        corpus.verify().unwrap();
    }

    #[test]
    fn build_rejects_empty_text() {
        let err = Corpus::build(2, vec![(doc(""), vec![1.0, 0.0])]).unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
    }

    #[test]
    fn from_parts_detects_drift() {
        let index = FlatIndex::build(2, vec![(0, vec![1.0, 0.0]), (1, vec![0.0, 1.0])]).unwrap();
        let mut store = DocumentStore::new();
        store.put(0, doc("only one").into_chunk(0)).unwrap();
        let err = Corpus::from_parts(Arc::new(index), store).unwrap_err();
        assert!(matches!(err, RagError::Consistency(_)));

        let index = FlatIndex::build(2, vec![(0, vec![1.0, 0.0])]).unwrap();
        let mut store = DocumentStore::new();
        store.put(7, doc("wrong id").into_chunk(7)).unwrap();
        let err = Corpus::from_parts(Arc::new(index), store).unwrap_err();
        assert!(matches!(err, RagError::Consistency(_)));
    }

    #[test]
    fn loads_jsonl_documents_with_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs.jsonl");
        let mut file = File::create(&docs).unwrap();
        writeln!(file, r#"{{"text":"Article 1 defines theft.","title":"Penal Code"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"text":"Article 2 defines fraud.","chunk_id":"a2"}}"#).unwrap();
        drop(file);
        let vectors = dir.path().join("vectors.bin");
        write_vectors(&vectors, 2, &[vec![1.0, 0.0], vec![0.0, 1.0]]);

        let corpus = Corpus::load(&docs, &vectors).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.dimensions(), 2);
        let second = corpus.store().get(1).unwrap();
        assert_eq!(second.metadata.chunk_id.as_deref(), Some("a2"));
        assert_eq!(second.metadata.title, None);
    }

    #[test]
    fn loads_json_array_documents() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs.json");
        std::fs::write(&docs, r#"[{"text":"one"},{"text":"two"},{"text":"three"}]"#).unwrap();
        let vectors = dir.path().join("vectors.bin");
        write_vectors(&vectors, 3, &[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]]);

        let corpus = Corpus::load(&docs, &vectors).unwrap();
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.store().get(2).unwrap().text, "three");
    }

    #[test]
    fn load_rejects_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs.jsonl");
        std::fs::write(&docs, "{\"text\":\"one\"}\n{\"text\":\"two\"}\n").unwrap();
        let vectors = dir.path().join("vectors.bin");
        write_vectors(&vectors, 2, &[vec![1.0, 0.0]]);

        let err = Corpus::load(&docs, &vectors).unwrap_err();
        assert!(matches!(err, RagError::CorpusError(msg) if msg.contains("2 documents")));
    }

    #[test]
    fn load_reports_bad_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs.jsonl");
        std::fs::write(&docs, "{\"text\":\"one\"}\nnot json\n").unwrap();
        let vectors = dir.path().join("vectors.bin");
        write_vectors(&vectors, 2, &[vec![1.0, 0.0], vec![0.0, 1.0]]);

        let err = Corpus::load(&docs, &vectors).unwrap_err();
        assert!(matches!(err, RagError::CorpusError(msg) if msg.contains("line 2")));
    }
}
