//! Incremental indexing: change detection, chunking and store synchronisation.
pub mod chunker;
pub mod core;
pub mod lock;
pub mod metadata;
pub mod tracker;

pub use self::core::{IndexError, Indexer, SyncReport, chunk_id};
pub use chunker::{Chunker, ChunkerError};
pub use metadata::{FetchMetadata, FetchRecord, FileRecord, MetadataError, MetadataStore};
pub use tracker::{
    Delta, FetchStatus, Scan, ScannedFile, UnreadableFile, compute_delta, fetch_status,
    scan_directory,
};
