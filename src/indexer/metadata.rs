//! Persisted fetch metadata: per-file fingerprints and the sync history.
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Number of sync summaries kept in `fetch_history`.
pub const HISTORY_LIMIT: usize = 10;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("failed to read metadata {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("corrupt metadata {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write metadata {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to encode metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Fingerprint of a source file at the time it was indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Hex MD5 of the file contents.
    pub hash: String,
    /// Modification time, seconds since the Unix epoch.
    pub modified: f64,
    pub size: u64,
}

/// Summary of one completed sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRecord {
    pub timestamp: DateTime<Utc>,
    pub new_files: usize,
    pub modified_files: usize,
    pub deleted_files: usize,
    pub total_files: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchMetadata {
    pub last_fetch: Option<DateTime<Utc>>,
    /// Keyed by path relative to the source directory.
    #[serde(default)]
    pub files: BTreeMap<String, FileRecord>,
    #[serde(default)]
    pub fetch_history: Vec<FetchRecord>,
}

impl FetchMetadata {
    /// Append a history record, keeping only the newest [`HISTORY_LIMIT`].
    pub fn push_history(&mut self, record: FetchRecord) {
        self.fetch_history.push(record);
        if self.fetch_history.len() > HISTORY_LIMIT {
            let excess = self.fetch_history.len() - HISTORY_LIMIT;
            self.fetch_history.drain(..excess);
        }
    }
}

/// JSON file holding [`FetchMetadata`].
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the metadata, or an empty record if the file does not exist yet.
    pub fn load(&self) -> Result<FetchMetadata, MetadataError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No metadata at {}, starting fresh", self.path.display());
                return Ok(FetchMetadata::default());
            }
            Err(source) => {
                return Err(MetadataError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_str(&data).map_err(|source| MetadataError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the metadata file. Readers see either the old or the new
    /// contents, never a partial write.
    pub fn save(&self, metadata: &FetchMetadata) -> Result<(), MetadataError> {
        let data = serde_json::to_string_pretty(metadata)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let write_err = |source| MetadataError::Write {
            path: self.path.clone(),
            source,
        };
        fs::write(&tmp, data).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: usize) -> FetchRecord {
        FetchRecord {
            timestamp: Utc::now(),
            new_files: n,
            modified_files: 0,
            deleted_files: 0,
            total_files: n,
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("meta.json"));
        let meta = store.load().unwrap();
        assert!(meta.last_fetch.is_none());
        assert!(meta.files.is_empty());
        assert!(meta.fetch_history.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("meta.json"));

        let mut meta = FetchMetadata {
            last_fetch: Some(Utc::now()),
            ..Default::default()
        };
        meta.files.insert(
            "sub/policy.txt".to_string(),
            FileRecord {
                hash: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
                modified: 1_700_000_000.5,
                size: 42,
            },
        );
        meta.push_history(record(1));
        store.save(&meta).unwrap();

        assert_eq!(store.load().unwrap(), meta);
        assert!(!dir.path().join("meta.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        fs::write(&path, "{ \"files\": [").unwrap();
        let err = MetadataStore::new(&path).load().unwrap_err();
        assert!(matches!(err, MetadataError::Corrupt { .. }));
    }

    #[test]
    fn test_reads_legacy_layout() {
        let json = r#"{
            "last_fetch": null,
            "files": {"a.md": {"hash": "abc", "modified": 1.0, "size": 3}},
            "fetch_history": []
        }"#;
        let meta: FetchMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.files["a.md"].size, 3);
    }

    #[test]
    fn test_history_is_trimmed() {
        let mut meta = FetchMetadata::default();
        for n in 0..15 {
            meta.push_history(record(n));
        }
        assert_eq!(meta.fetch_history.len(), HISTORY_LIMIT);
        assert_eq!(meta.fetch_history[0].new_files, 5);
        assert_eq!(meta.fetch_history[9].new_files, 14);
    }
}
