//! Overlapping word-window chunking.
use thiserror::Error;

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_OVERLAP: usize = 50;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChunkerError {
    #[error("chunk size must be positive")]
    ZeroChunkSize,

    #[error("overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// Splits text into windows of `chunk_size` whitespace-delimited words.
///
/// Each window starts `chunk_size - overlap` words after the previous one, so
/// neighbours share `overlap` words. The step is validated at construction,
/// so iteration always terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkerError> {
        if chunk_size == 0 {
            return Err(ChunkerError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkerError::OverlapTooLarge {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    #[must_use]
    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Lazily yield the windows of `text`. Calling again restarts from the top.
    pub fn windows<'a>(&self, text: &'a str) -> Windows<'a> {
        Windows {
            words: text.split_whitespace().collect(),
            start: 0,
            chunk_size: self.chunk_size,
            step: self.step(),
        }
    }

    /// Collect all windows of `text`.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        self.windows(text).collect()
    }
}

/// Iterator returned by [`Chunker::windows`].
pub struct Windows<'a> {
    words: Vec<&'a str>,
    start: usize,
    chunk_size: usize,
    step: usize,
}

impl Iterator for Windows<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while self.start < self.words.len() {
            let end = (self.start + self.chunk_size).min(self.words.len());
            let chunk = self.words[self.start..end].join(" ");
            self.start += self.step;
            if !chunk.trim().is_empty() {
                return Some(chunk);
            }
        }
        None
    }
}
