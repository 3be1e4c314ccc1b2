//! Query-time retrieval of the chunks closest to a question.
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::embedder::{Embedder, EmbedderError};
use crate::store::{ChunkMetadata, StoreError, VectorStore};

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("vector search failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// `1 - cosine distance`; negative for vectors pointing away from the query.
    pub similarity: f64,
}

/// Embeds queries with the indexing embedder and searches the store.
pub struct Retriever<'a, S: VectorStore + ?Sized, E: Embedder + ?Sized> {
    store: &'a S,
    embedder: &'a E,
}

impl<'a, S: VectorStore + ?Sized, E: Embedder + ?Sized> Retriever<'a, S, E> {
    pub fn new(store: &'a S, embedder: &'a E) -> Self {
        Self { store, embedder }
    }

    /// Up to `top_k` chunks ordered by descending similarity.
    pub fn try_search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query)?;
        let matches = self.store.query(&query_vector, top_k)?;

        let mut results: Vec<RetrievedChunk> = matches
            .into_iter()
            .map(|m| RetrievedChunk {
                id: m.id,
                text: m.document,
                metadata: m.metadata,
                similarity: 1.0 - m.distance,
            })
            .collect();

        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(top_k);

        debug!("Query matched {} chunks", results.len());
        Ok(results)
    }

    /// Like [`try_search`](Self::try_search), but any failure yields an empty
    /// result so the caller can still answer without context.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<RetrievedChunk> {
        self.try_search(query, top_k).unwrap_or_else(|e| {
            warn!("Retrieval failed, continuing without context: {e}");
            Vec::new()
        })
    }
}
