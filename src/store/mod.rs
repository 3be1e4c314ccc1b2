//! Vector store abstraction and its SQLite + sqlite-vec implementation.
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Logical collection name used for SOP chunks.
pub const DEFAULT_COLLECTION: &str = "sop_documents";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("embedding has {actual} dimensions, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("entry {id} has an all-zero embedding")]
    ZeroVector { id: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Metadata attached to every stored chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// File name of the source document (no directories).
    pub source: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// Path relative to the source directory; unique per file.
    pub file_path: String,
    /// RFC 3339 timestamp of when the chunk was written.
    pub indexed_at: String,
}

/// A chunk ready to be written to the store.
#[derive(Debug, Clone)]
pub struct ChunkEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: ChunkMetadata,
}

/// A nearest-neighbour hit, ordered by ascending `distance`.
#[derive(Debug, Clone)]
pub struct QueryMatch {
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
    /// Cosine distance in `[0, 2]`.
    pub distance: f64,
}

/// Equality filter on a single metadata key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataFilter<'a> {
    Source(&'a str),
    FilePath(&'a str),
}

/// Persistence layer for embedded chunks.
///
/// Reads take `&self`; mutations take `&mut self` so a single owner (or a
/// mutex) serialises writers.
pub trait VectorStore {
    /// Insert entries; an existing entry with the same id is replaced.
    fn add(&mut self, entries: &[ChunkEntry]) -> Result<(), StoreError>;

    /// Return up to `top_k` entries closest to `embedding`.
    fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<QueryMatch>, StoreError>;

    /// Ids of all entries matching `filter`.
    fn get_ids(&self, filter: MetadataFilter<'_>) -> Result<Vec<String>, StoreError>;

    /// Delete entries by id, returning how many were removed.
    fn delete(&mut self, ids: &[String]) -> Result<usize, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;
}

/// True when every component is zero. Such vectors have no cosine distance
/// to anything.
#[must_use]
pub fn is_zero_vector(vec: &[f32]) -> bool {
    vec.iter().all(|v| *v == 0.0)
}

/// Helper to serialize a float32 vector into bytes for vec0 virtual table
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}
