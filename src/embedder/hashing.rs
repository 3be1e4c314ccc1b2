/// Feature-hashing embedder.
///
/// Maps lower-cased alphanumeric tokens into a fixed number of signed
/// buckets and L2-normalizes the result. Texts sharing vocabulary land close
/// together, which is enough for offline use and for tests that need
/// meaningful similarity without loading a model.
use super::{Embedder, EmbedderError, l2_normalize};

/// Deterministic bag-of-words embedder.
pub struct HashingEmbedder {
    pub dimensions: usize,
}

impl HashingEmbedder {
    /// Create a new `HashingEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        if self.dimensions == 0 {
            return Err(EmbedderError::InferenceFailed(
                "dimensions must be positive".to_string(),
            ));
        }

        let mut embedding = vec![0.0f32; self.dimensions];
        for token in tokens(text) {
            // md5 keeps bucket assignment stable across builds, unlike std hashers
            let digest = md5::compute(token.as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dimensions;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
