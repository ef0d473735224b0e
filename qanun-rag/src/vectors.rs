//! Vector record store: the embeddings of every indexed chunk.
//!
//! Rows are L2-normalised on insertion so that cosine similarity reduces to
//! an inner product at query time. The store also reads and writes the
//! `QVEC` file format used to persist a corpus' embeddings next to its
//! documents:
//!
//! | Offset | Size | Content |
//! |---|---|---|
//! | 0 | 4 | magic `b"QVEC"` |
//! | 4 | 4 | format version, `u32` LE (currently 1) |
//! | 8 | 4 | dimensions, `u32` LE |
//! | 12 | 8 | row count, `u64` LE |
//! | 20 | `count * dimensions * 4` | `f32` LE values, row-major |
//!
//! Row `i` of the file is the embedding of chunk `i`.

use std::collections::HashMap;
use std::io::{ErrorKind as IoErrorKind, Read, Write};

use crate::document::ChunkId;
use crate::error::{RagError, Result};

const MAGIC: &[u8; 4] = b"QVEC";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 20;

/// Embedding vectors keyed by [`ChunkId`], stored as contiguous normalised rows.
#[derive(Debug, Clone)]
pub struct VectorRecordStore {
    dimensions: usize,
    ids: Vec<ChunkId>,
    positions: HashMap<ChunkId, usize>,
    data: Vec<f32>,
}

impl VectorRecordStore {
    /// Create an empty store for vectors of the given dimensionality.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] if `dimensions` is zero.
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagError::InvalidArgument("dimensions must be greater than zero".into()));
        }
        Ok(Self { dimensions, ids: Vec::new(), positions: HashMap::new(), data: Vec::new() })
    }

    /// Dimensionality shared by every vector in the store.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the store holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether a vector is stored under `id`.
    pub fn contains(&self, id: ChunkId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Insert the vector for `id`, normalising it first.
    ///
    /// # Errors
    ///
    /// - [`RagError::DimensionMismatch`] if the vector has the wrong length.
    /// - [`RagError::InvalidArgument`] if it contains NaN or infinite values,
    ///   or if `id` is already present.
    pub fn push(&mut self, id: ChunkId, vector: &[f32]) -> Result<()> {
        check_vector(self.dimensions, vector)?;
        if self.positions.contains_key(&id) {
            return Err(RagError::InvalidArgument(format!("duplicate vector id {id}")));
        }
        self.positions.insert(id, self.ids.len());
        self.ids.push(id);
        self.data.extend(normalized(vector));
        Ok(())
    }

    /// The normalised vector stored under `id`.
    pub fn get(&self, id: ChunkId) -> Option<&[f32]> {
        self.positions.get(&id).map(|&pos| self.row(pos))
    }

    /// Iterate over `(id, normalised vector)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (ChunkId, &[f32])> + '_ {
        self.ids.iter().copied().zip(self.data.chunks_exact(self.dimensions))
    }

    fn row(&self, pos: usize) -> &[f32] {
        let start = pos * self.dimensions;
        &self.data[start..start + self.dimensions]
    }

    /// Read a `QVEC` payload. Rows receive ids `0..count` in file order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::CorpusError`] on a bad magic number, unsupported
    /// version, truncated or oversized payload, or non-finite values.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut header = [0u8; HEADER_LEN];
        read_exact_or_corrupt(&mut reader, &mut header, "header")?;

        if &header[0..4] != MAGIC {
            return Err(RagError::CorpusError("vectors file does not start with QVEC magic".into()));
        }
        let version = u32::from_le_bytes(le_array(&header[4..8]));
        if version != FORMAT_VERSION {
            return Err(RagError::CorpusError(format!(
                "unsupported vectors format version {version}"
            )));
        }
        let dimensions = u32::from_le_bytes(le_array(&header[8..12])) as usize;
        let count = u64::from_le_bytes(le_array(&header[12..20]));
        if dimensions == 0 {
            return Err(RagError::CorpusError("vectors file declares zero dimensions".into()));
        }

        let values = usize::try_from(count)
            .ok()
            .and_then(|count| count.checked_mul(dimensions))
            .ok_or_else(|| {
                RagError::CorpusError(format!("vector count {count} is too large"))
            })?;
        let byte_len = values
            .checked_mul(4)
            .ok_or_else(|| RagError::CorpusError(format!("vector count {count} is too large")))?;

        let mut payload = Vec::new();
        reader.by_ref().take(byte_len as u64 + 1).read_to_end(&mut payload)?;
        if payload.len() < byte_len {
            return Err(RagError::CorpusError(format!(
                "vectors file payload is truncated: {count} rows declared, {} bytes present",
                payload.len()
            )));
        }
        if payload.len() > byte_len {
            return Err(RagError::CorpusError(format!(
                "vectors file has trailing bytes after {count} rows"
            )));
        }

        let mut store = Self::new(dimensions)?;
        let mut row = Vec::with_capacity(dimensions);
        for (id, raw_row) in payload.chunks_exact(dimensions * 4).enumerate() {
            row.clear();
            row.extend(raw_row.chunks_exact(4).map(|b| f32::from_le_bytes(le_array(b))));
            store.push(id as ChunkId, &row).map_err(|e| {
                RagError::CorpusError(format!("invalid vector at row {id}: {e}"))
            })?;
        }
        Ok(store)
    }

    /// Write the store as a `QVEC` payload, in insertion order.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        let dimensions = u32::try_from(self.dimensions).map_err(|_| {
            RagError::InvalidArgument(format!("{} dimensions do not fit QVEC", self.dimensions))
        })?;
        writer.write_all(&dimensions.to_le_bytes())?;
        writer.write_all(&(self.len() as u64).to_le_bytes())?;
        for value in &self.data {
            writer.write_all(&value.to_le_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Reject vectors of the wrong length or with non-finite components.
pub(crate) fn check_vector(dimensions: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != dimensions {
        return Err(RagError::DimensionMismatch { expected: dimensions, actual: vector.len() });
    }
    if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
        return Err(RagError::InvalidArgument(format!("vector component {pos} is not finite")));
    }
    Ok(())
}

/// L2-normalised copy of `vector`. Zero vectors are returned unchanged.
///
/// The norm is taken in `f64` so extreme finite components neither overflow
/// nor underflow.
pub(crate) fn normalized(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|&x| (f64::from(x) / norm) as f32).collect()
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

fn read_exact_or_corrupt<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        IoErrorKind::UnexpectedEof => RagError::CorpusError(format!("vectors file {what} is truncated")),
        _ => RagError::Io(e),
    })
}
