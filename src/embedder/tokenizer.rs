/// WordPiece tokenizer wrapper around HuggingFace `tokenizers`.
///
/// Produces the three input tensors a sentence-transformer expects.
use std::path::Path;

use tokenizers::{Tokenizer, TruncationParams};

use super::EmbedderError;

/// all-MiniLM-L6-v2 was trained on sequences of at most 256 word pieces.
pub const MAX_SEQ_LEN: usize = 256;

/// Model inputs for one text.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
}

impl Encoded {
    #[must_use]
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

pub struct SentenceTokenizer {
    inner: Tokenizer,
}

impl SentenceTokenizer {
    /// Load `tokenizer.json` from the model directory, truncating to [`MAX_SEQ_LEN`].
    pub fn from_model_dir(model_dir: &Path) -> Result<Self, EmbedderError> {
        let path = model_dir.join("tokenizer.json");
        if !path.exists() {
            return Err(EmbedderError::TokenizerError(format!(
                "tokenizer.json not found in {}",
                model_dir.display()
            )));
        }

        let mut inner = Tokenizer::from_file(&path)
            .map_err(|e| EmbedderError::TokenizerError(format!("failed to load tokenizer: {e}")))?;

        inner
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| EmbedderError::TokenizerError(format!("truncation config: {e}")))?;
        // One text per inference call, so padding would only add masked tokens
        inner.with_padding(None);

        Ok(Self { inner })
    }

    pub fn encode(&self, text: &str) -> Result<Encoded, EmbedderError> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| EmbedderError::TokenizerError(format!("failed to encode text: {e}")))?;

        let widen = |xs: &[u32]| xs.iter().map(|&x| i64::from(x)).collect::<Vec<i64>>();

        Ok(Encoded {
            input_ids: widen(encoding.get_ids()),
            attention_mask: widen(encoding.get_attention_mask()),
            token_type_ids: widen(encoding.get_type_ids()),
        })
    }

    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(false)
    }
}
