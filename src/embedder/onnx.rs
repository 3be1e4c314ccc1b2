/// ONNX Runtime embedder for sentence-transformer models.
///
/// Runs all-MiniLM-L6-v2 (or any BERT-style model exported with the same
/// inputs), mean-pools the last hidden state over real tokens and
/// L2-normalizes, matching `SentenceTransformer.encode` output.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tracing::info;

use super::tokenizer::SentenceTokenizer;
use super::{Embedder, EmbedderError, l2_normalize};

pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: SentenceTokenizer,
    dimensions: usize,
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn new(model_dir: &Path, dimensions: usize) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");
        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        info!("Loading ONNX model from {}", model_path.display());

        let session = Session::builder()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("session builder error: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model load error: {e}")))?;

        let tokenizer = SentenceTokenizer::from_model_dir(model_dir)?;
        info!(
            "Embedding model ready (vocab size: {}, dimensions: {dimensions})",
            tokenizer.vocab_size()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions,
        })
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let encoded = self.tokenizer.encode(text)?;
        let seq_len = encoded.len();

        let input_ids = Tensor::from_array(([1usize, seq_len], encoded.input_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask = Tensor::from_array(([1usize, seq_len], encoded.attention_mask.clone()))
            .map_err(|e| EmbedderError::InferenceFailed(format!("attention_mask error: {e}")))?;
        let token_type_ids = Tensor::from_array(([1usize, seq_len], encoded.token_type_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("token_type_ids error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            ])
            .map_err(|e| EmbedderError::InferenceFailed(format!("inference failed: {e}")))?;

        // last_hidden_state: [1, seq_len, hidden]
        let (_shape, hidden) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;

        if hidden.len() != seq_len * self.dimensions {
            return Err(EmbedderError::InferenceFailed(format!(
                "model produced {} values, expected {seq_len} x {}",
                hidden.len(),
                self.dimensions
            )));
        }

        let mut embedding = mean_pooling(hidden, &encoded.attention_mask, self.dimensions);
        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Average token vectors whose attention mask is set.
fn mean_pooling(hidden: &[f32], attention_mask: &[i64], hidden_size: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden_size];
    let mut weight = 0.0f32;

    for (token, &mask) in hidden.chunks_exact(hidden_size).zip(attention_mask) {
        if mask == 0 {
            continue;
        }
        weight += 1.0;
        for (acc, v) in pooled.iter_mut().zip(token) {
            *acc += v;
        }
    }

    if weight > 0.0 {
        for v in &mut pooled {
            *v /= weight;
        }
    }
    pooled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_pooling_simple() {
        let hidden = vec![1.0, 2.0, 3.0, 3.0, 4.0, 5.0];
        let result = mean_pooling(&hidden, &[1, 1], 3);
        assert_eq!(result, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_mean_pooling_skips_masked_tokens() {
        let hidden = vec![1.0, 2.0, 10.0, 20.0];
        let result = mean_pooling(&hidden, &[1, 0], 2);
        assert_eq!(result, vec![1.0, 2.0]);
    }

    #[test]
    fn test_missing_model() {
        let result = OnnxEmbedder::new(Path::new("/nonexistent/model"), 384);
        assert!(matches!(result, Err(EmbedderError::ModelLoadFailed(_))));
    }

    /// Requires downloaded model files and an ONNX Runtime library.
    #[test]
    #[ignore]
    fn test_onnx_embed() {
        let model_dir = Path::new("models/all-MiniLM-L6-v2");
        let embedder = OnnxEmbedder::new(model_dir, 384).unwrap();
        let vec = embedder.embed("Wear gloves when handling solvents.").unwrap();

        assert_eq!(vec.len(), 384);
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01, "expected unit vector, got {norm}");
    }
}
