/// Embedder trait and shared types for text embedding.
pub mod download;
pub mod hashing;
pub mod onnx;
pub mod tokenizer;

use thiserror::Error;
use tracing::info;

use crate::config::{Config, EmbedderBackend};

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),
}

/// Trait for text embedding implementations.
///
/// Indexing and retrieval must share one implementation: vectors from
/// different embedders live in unrelated spaces and compare meaninglessly.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// Build the embedder selected in `config.model`.
///
/// The ONNX backend downloads its model files on first use.
pub fn from_config(config: &Config) -> anyhow::Result<Box<dyn Embedder>> {
    match config.model.backend {
        EmbedderBackend::Hash => {
            info!(
                "Using hashing embedder ({} dimensions)",
                config.model.dimensions
            );
            Ok(Box::new(hashing::HashingEmbedder::new(
                config.model.dimensions,
            )))
        }
        EmbedderBackend::Onnx => {
            let model_dir = config.model_dir();
            download::download_model_files(&config.model.repo, &model_dir)?;
            let embedder = onnx::OnnxEmbedder::new(&model_dir, config.model.dimensions)?;
            Ok(Box::new(embedder))
        }
    }
}

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub(crate) fn l2_normalize(vec: &mut [f32]) {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq > 0.0 {
        let inv = 1.0 / norm_sq.sqrt();
        for v in vec.iter_mut() {
            *v *= inv;
        }
    }
}
