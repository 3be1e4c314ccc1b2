use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::chunker::Chunker;
use super::lock::{LockError, RunLock};
use super::metadata::{FetchRecord, MetadataError, MetadataStore};
use super::tracker::{self, ScannedFile};
use crate::embedder::{Embedder, EmbedderError};
use crate::extractor::{ExtractError, TextExtractor};
use crate::store::{
    ChunkEntry, ChunkMetadata, MetadataFilter, StoreError, VectorStore, is_zero_vector,
};

const DEFAULT_LOCK_STALE_AFTER: Duration = Duration::from_secs(60 * 60);

/// Errors that stop a sync before the store is touched.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error(transparent)]
    Locked(#[from] LockError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("failed to scan {path}: {source}")]
    Scan { path: PathBuf, source: io::Error },
}

/// Failure confined to a single file; recorded and the run moves on.
#[derive(Error, Debug)]
enum FileError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Embed(#[from] EmbedderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of one [`Indexer::reindex`] run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub new_count: usize,
    pub modified_count: usize,
    pub deleted_count: usize,
    /// New and modified files handled without an embedding or store failure.
    pub total_processed: usize,
    pub chunks_added: usize,
    pub chunks_removed: usize,
    pub errors: Vec<String>,
}

/// Deterministic chunk id, unique per relative path.
///
/// The readable stem is followed by a short digest of the full path, so
/// `hr/policy.txt` and `ops/policy.txt` never collide.
#[must_use]
pub fn chunk_id(relative_path: &str, index: usize) -> String {
    let stem = Path::new(relative_path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let digest = format!("{:x}", md5::compute(relative_path.as_bytes()));
    format!("{stem}-{}_{index}", &digest[..8])
}

/// Keeps a vector store in step with a source directory.
///
/// Each run is sequential and per-file: one file's failure never aborts the
/// batch. Metadata is written once, at the end of the run.
pub struct Indexer<'a, S: VectorStore + ?Sized, E: Embedder + ?Sized> {
    source_dir: PathBuf,
    metadata: MetadataStore,
    store: &'a mut S,
    embedder: &'a E,
    extractor: &'a dyn TextExtractor,
    chunker: Chunker,
    lock_stale_after: Duration,
}

impl<'a, S: VectorStore + ?Sized, E: Embedder + ?Sized> Indexer<'a, S, E> {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        metadata: MetadataStore,
        store: &'a mut S,
        embedder: &'a E,
        extractor: &'a dyn TextExtractor,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            metadata,
            store,
            embedder,
            extractor,
            chunker: Chunker::default(),
            lock_stale_after: DEFAULT_LOCK_STALE_AFTER,
        }
    }

    #[must_use]
    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    #[must_use]
    pub fn with_lock_stale_after(mut self, stale_after: Duration) -> Self {
        self.lock_stale_after = stale_after;
        self
    }

    /// Lock file guarding runs that share this metadata file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        let mut path = self.metadata.path().as_os_str().to_owned();
        path.push(".lock");
        PathBuf::from(path)
    }

    /// Bring the store up to date with the source directory.
    ///
    /// `progress` receives `(fraction, message)` before each new or modified
    /// file and `(1.0, "Completed!")` at the end.
    pub fn reindex(
        &mut self,
        mut progress: Option<&mut dyn FnMut(f32, &str)>,
    ) -> Result<SyncReport, IndexError> {
        let _lock = RunLock::acquire(&self.lock_path(), self.lock_stale_after)?;

        let mut metadata = self.metadata.load()?;
        let delta =
            tracker::compute_delta(&self.source_dir, &metadata).map_err(|source| {
                IndexError::Scan {
                    path: self.source_dir.clone(),
                    source,
                }
            })?;

        info!(
            "Sync started: {} new, {} modified, {} deleted",
            delta.new_files.len(),
            delta.modified_files.len(),
            delta.deleted_files.len()
        );

        let mut report = SyncReport {
            new_count: delta.new_files.len(),
            modified_count: delta.modified_files.len(),
            deleted_count: delta.deleted_files.len(),
            ..Default::default()
        };

        // Files whose embedding or store write failed keep their previous
        // fingerprint (or none) so the next run retries them
        let mut retry = HashSet::new();

        for skipped in &delta.unreadable {
            report
                .errors
                .push(format!("Error reading {}: {}", skipped.relative_path, skipped.reason));
            retry.insert(skipped.relative_path.clone());
        }

        let total = delta.new_files.len() + delta.modified_files.len();
        let work = delta
            .new_files
            .iter()
            .map(|f| (f, false))
            .chain(delta.modified_files.iter().map(|f| (f, true)));

        for (position, (file, modified)) in work.enumerate() {
            let name = file.file_name();
            if let Some(cb) = progress.as_mut() {
                let kind = if modified { "modified" } else { "new" };
                cb(
                    position as f32 / total as f32,
                    &format!("Processing {kind} file: {name}"),
                );
            }

            match self.sync_file(file, modified) {
                Ok((removed, added)) => {
                    report.chunks_removed += removed;
                    report.chunks_added += added;
                    report.total_processed += 1;
                }
                Err((removed, FileError::Extract(e))) => {
                    // Unreadable documents still count as processed
                    warn!("Skipping {}: {e}", file.relative_path);
                    report.chunks_removed += removed;
                    report.total_processed += 1;
                    report.errors.push(e.to_string());
                }
                Err((removed, e)) => {
                    warn!("Failed to index {}: {e}", file.relative_path);
                    report.chunks_removed += removed;
                    report.errors.push(format!("Error processing {name}: {e}"));
                    retry.insert(file.relative_path.clone());
                }
            }
        }

        for key in &delta.deleted_files {
            match self.remove_chunks(key) {
                Ok(removed) => {
                    debug!("Removed {removed} chunks of deleted file {key}");
                    report.chunks_removed += removed;
                }
                Err(e) => {
                    warn!("Failed to remove chunks of {key}: {e}");
                    report.errors.push(format!("Error removing {key}: {e}"));
                }
            }
        }

        match tracker::scan_directory(&self.source_dir) {
            Ok(scan) => {
                let mut files: BTreeMap<_, _> = scan
                    .files
                    .into_iter()
                    .filter_map(|f| {
                        if retry.contains(&f.relative_path) {
                            let previous = metadata.files.get(&f.relative_path).cloned()?;
                            Some((f.relative_path, previous))
                        } else {
                            Some((f.relative_path, f.record))
                        }
                    })
                    .collect();
                for skipped in scan.unreadable {
                    if let Some(previous) = metadata.files.get(&skipped.relative_path) {
                        files.insert(skipped.relative_path, previous.clone());
                    }
                }
                let now = Utc::now();
                metadata.push_history(FetchRecord {
                    timestamp: now,
                    new_files: report.new_count,
                    modified_files: report.modified_count,
                    deleted_files: report.deleted_count,
                    total_files: files.len(),
                });
                metadata.files = files;
                metadata.last_fetch = Some(now);

                if let Err(e) = self.metadata.save(&metadata) {
                    // The store is already updated; the next run will redo some work
                    warn!("{e}");
                    report.errors.push(e.to_string());
                }
            }
            Err(e) => {
                warn!("Rescan failed, metadata left unchanged: {e}");
                report
                    .errors
                    .push(format!("Error rescanning {}: {e}", self.source_dir.display()));
            }
        }

        if let Some(cb) = progress.as_mut() {
            cb(1.0, "Completed!");
        }

        info!(
            "Sync finished: {} processed, {} chunks added, {} removed, {} errors",
            report.total_processed,
            report.chunks_added,
            report.chunks_removed,
            report.errors.len()
        );

        Ok(report)
    }

    /// Index one file, clearing its previous chunks first when `replace` is
    /// set. Returns `(chunks_removed, chunks_added)`; on failure, the number
    /// of chunks already removed travels with the error.
    fn sync_file(
        &mut self,
        file: &ScannedFile,
        replace: bool,
    ) -> Result<(usize, usize), (usize, FileError)> {
        let removed = if replace {
            self.remove_chunks(&file.relative_path)
                .map_err(|e| (0, FileError::from(e)))?
        } else {
            0
        };

        let added = self.index_file(file).map_err(|e| (removed, e))?;
        Ok((removed, added))
    }

    fn remove_chunks(&mut self, relative_path: &str) -> Result<usize, StoreError> {
        let ids = self.store.get_ids(MetadataFilter::FilePath(relative_path))?;
        self.store.delete(&ids)
    }

    fn index_file(&mut self, file: &ScannedFile) -> Result<usize, FileError> {
        let text = self.extractor.extract(&file.path)?;

        let chunks = self.chunker.split(&text);
        if chunks.is_empty() {
            debug!("{} has no text to index", file.relative_path);
            return Ok(0);
        }

        let text_refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let vectors = self.embedder.embed_batch(&text_refs)?;
        if vectors.len() != chunks.len() {
            return Err(EmbedderError::InferenceFailed(format!(
                "got {} embeddings for {} chunks",
                vectors.len(),
                chunks.len()
            ))
            .into());
        }

        // Chunks without a single word token embed to the zero vector and
        // cannot be ranked; leave them out of the store
        let (chunks, vectors): (Vec<String>, Vec<Vec<f32>>) = chunks
            .into_iter()
            .zip(vectors)
            .filter(|(_, vector)| !is_zero_vector(vector))
            .unzip();
        if chunks.is_empty() {
            debug!("{} has no embeddable text", file.relative_path);
            return Ok(0);
        }

        let source = file.file_name();
        let total_chunks = chunks.len();
        let indexed_at = Utc::now().to_rfc3339();

        let entries: Vec<ChunkEntry> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (document, embedding))| ChunkEntry {
                id: chunk_id(&file.relative_path, i),
                embedding,
                document,
                metadata: ChunkMetadata {
                    source: source.clone(),
                    chunk_index: i,
                    total_chunks,
                    file_path: file.relative_path.clone(),
                    indexed_at: indexed_at.clone(),
                },
            })
            .collect();

        self.store.add(&entries)?;
        debug!("Indexed {} ({total_chunks} chunks)", file.relative_path);
        Ok(total_chunks)
    }
}
