/// Configuration module for soprag.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::indexer::chunker::Chunker;

// ── Default value functions ──────────────────────────────────────────

fn default_source_dir() -> String {
    "./SOPs".to_string()
}

fn default_metadata_path() -> String {
    "sop_metadata.json".to_string()
}

fn default_db_path() -> String {
    "./sop_vectors.db".to_string()
}

fn default_collection() -> String {
    "sop_documents".to_string()
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_search_top_k() -> usize {
    5
}

fn default_lock_stale_secs() -> u64 {
    60 * 60
}

fn default_backend() -> EmbedderBackend {
    EmbedderBackend::Onnx
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_model_repo() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_model_dir() -> String {
    "models/all-MiniLM-L6-v2".to_string()
}

fn default_dimensions() -> usize {
    384
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Directory scanned recursively for SOP documents.
    #[serde(default = "default_source_dir")]
    pub source_dir: String,

    /// JSON file holding per-file hashes and the fetch history.
    #[serde(default = "default_metadata_path")]
    pub metadata_path: String,

    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    /// Window size, in words.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Words shared by consecutive windows. Must be below `chunk_size`.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    /// Age after which a left-over sync lock is considered abandoned.
    #[serde(default = "default_lock_stale_secs")]
    pub lock_stale_secs: u64,

    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderBackend {
    /// Sentence-transformer model run through ONNX Runtime.
    Onnx,
    /// Offline feature-hashing embedder; no model download required.
    Hash,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_backend")]
    pub backend: EmbedderBackend,

    #[serde(default = "default_model_name")]
    pub name: String,

    /// HuggingFace repository the model files are fetched from.
    #[serde(default = "default_model_repo")]
    pub repo: String,

    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            metadata_path: default_metadata_path(),
            db_path: default_db_path(),
            collection: default_collection(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            search_top_k: default_search_top_k(),
            lock_stale_secs: default_lock_stale_secs(),
            model: ModelConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            name: default_model_name(),
            repo: default_model_repo(),
            model_dir: default_model_dir(),
            dimensions: default_dimensions(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and, for the
    /// default path only, writes a template next to the binary.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == "config.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(
            self.chunk_overlap < self.chunk_size,
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            self.chunk_overlap,
            self.chunk_size
        );
        anyhow::ensure!(self.search_top_k > 0, "search_top_k must be positive");
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(
            !self.collection.trim().is_empty(),
            "collection name must not be empty"
        );
        Ok(())
    }

    /// Build the chunker described by `chunk_size` / `chunk_overlap`.
    pub fn chunker(&self) -> Result<Chunker> {
        Chunker::new(self.chunk_size, self.chunk_overlap).context("invalid chunking parameters")
    }

    #[must_use]
    pub fn source_dir(&self) -> PathBuf {
        PathBuf::from(&self.source_dir)
    }

    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        PathBuf::from(&self.metadata_path)
    }

    #[must_use]
    pub fn model_dir(&self) -> PathBuf {
        PathBuf::from(&self.model.model_dir)
    }

    #[must_use]
    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_secs)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
