//! Change detection for the source directory.
//!
//! Files are identified by their path relative to the source directory and
//! compared by content hash. Modification times are recorded but only used
//! for the cheap staleness check in [`fetch_status`].
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use serde::Serialize;
use tracing::{debug, warn};

use super::metadata::{FetchMetadata, FetchRecord, FileRecord};
use crate::extractor;

/// A supported file found by [`scan_directory`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// Forward-slash separated path relative to the scanned directory.
    pub relative_path: String,
    pub record: FileRecord,
}

impl ScannedFile {
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.relative_path.clone())
    }
}

/// A supported file that exists but whose fingerprint could not be taken.
#[derive(Debug, Clone, PartialEq)]
pub struct UnreadableFile {
    pub relative_path: String,
    pub reason: String,
}

/// Result of [`scan_directory`].
#[derive(Debug, Default)]
pub struct Scan {
    pub files: Vec<ScannedFile>,
    pub unreadable: Vec<UnreadableFile>,
}

/// Classification of the source directory against stored metadata.
#[derive(Debug, Default)]
pub struct Delta {
    pub new_files: Vec<ScannedFile>,
    pub modified_files: Vec<ScannedFile>,
    /// Relative paths that are tracked but no longer on disk.
    pub deleted_files: Vec<String>,
    /// On disk but unreadable this run; neither indexed nor purged.
    pub unreadable: Vec<UnreadableFile>,
}

impl Delta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.modified_files.is_empty() && self.deleted_files.is_empty()
    }
}

/// Hex MD5 digest of a file, read in fixed-size blocks.
pub fn file_hash(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut ctx = md5::Context::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        ctx.consume(&buf[..n]);
    }
    Ok(format!("{:x}", ctx.compute()))
}

/// Modification time of `path` in fractional Unix seconds.
pub fn modified_time(path: &Path) -> io::Result<f64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0))
}

/// Recursively list supported files under `dir` with their fingerprints.
///
/// Entries are yielded in file-name order within each directory. A missing
/// directory yields nothing. Files that cannot be read are reported in
/// [`Scan::unreadable`] instead of failing the scan.
pub fn scan_directory(dir: &Path) -> io::Result<Scan> {
    let mut scan = Scan::default();
    if !dir.is_dir() {
        warn!("Source directory {} does not exist", dir.display());
        return Ok(scan);
    }

    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        let path = entry.path();
        if !entry.file_type().is_some_and(|t| t.is_file()) || !extractor::is_supported(path) {
            continue;
        }

        let Ok(relative) = path.strip_prefix(dir) else {
            continue;
        };
        let relative_path = relative.to_string_lossy().replace('\\', "/");

        match fingerprint(path) {
            Ok(record) => scan.files.push(ScannedFile {
                path: path.to_path_buf(),
                relative_path,
                record,
            }),
            Err(e) => {
                warn!("Cannot read {relative_path}: {e}");
                scan.unreadable.push(UnreadableFile {
                    relative_path,
                    reason: e.to_string(),
                });
            }
        }
    }

    debug!(
        "Scanned {} supported files in {} ({} unreadable)",
        scan.files.len(),
        dir.display(),
        scan.unreadable.len()
    );
    Ok(scan)
}

fn fingerprint(path: &Path) -> io::Result<FileRecord> {
    Ok(FileRecord {
        hash: file_hash(path)?,
        modified: modified_time(path)?,
        size: fs::metadata(path)?.len(),
    })
}

/// Classify the current contents of `dir` as new, modified or deleted
/// relative to `metadata`. Reads only; nothing is written.
pub fn compute_delta(dir: &Path, metadata: &FetchMetadata) -> io::Result<Delta> {
    let current = scan_directory(dir)?;
    Ok(classify(current, metadata))
}

/// Split a scan into a [`Delta`].
///
/// Unreadable files count as present, so a transient read error never
/// purges a tracked document.
#[must_use]
pub fn classify(scan: Scan, metadata: &FetchMetadata) -> Delta {
    let mut delta = Delta::default();
    let mut seen = HashSet::with_capacity(scan.files.len() + scan.unreadable.len());

    for file in scan.files {
        seen.insert(file.relative_path.clone());
        match metadata.files.get(&file.relative_path) {
            None => delta.new_files.push(file),
            Some(stored) if stored.hash != file.record.hash => delta.modified_files.push(file),
            Some(_) => {}
        }
    }
    for skipped in &scan.unreadable {
        seen.insert(skipped.relative_path.clone());
    }
    delta.unreadable = scan.unreadable;

    delta.deleted_files = metadata
        .files
        .keys()
        .filter(|key| !seen.contains(*key))
        .cloned()
        .collect();

    delta
}

/// Summary shown to operators before deciding to sync.
#[derive(Debug, Clone, Serialize)]
pub struct FetchStatus {
    pub last_fetch: Option<DateTime<Utc>>,
    pub last_fetch_formatted: String,
    pub total_files: usize,
    pub needs_update: bool,
    pub fetch_history: Vec<FetchRecord>,
}

/// Report when the last sync ran and whether any tracked file looks newer.
///
/// Staleness is judged by modification time only, so a touched-but-unchanged
/// file reports `needs_update` even though the next sync will skip it.
pub fn fetch_status(dir: &Path, metadata: &FetchMetadata, now: DateTime<Utc>) -> FetchStatus {
    let Some(last_fetch) = metadata.last_fetch else {
        return FetchStatus {
            last_fetch: None,
            last_fetch_formatted: "Never".to_string(),
            total_files: 0,
            needs_update: true,
            fetch_history: metadata.fetch_history.clone(),
        };
    };

    let needs_update = metadata.files.iter().any(|(key, stored)| {
        let path = dir.join(key);
        // Deleted files are picked up by the next sync, not by this check
        modified_time(&path).is_ok_and(|current| current > stored.modified)
    });

    FetchStatus {
        last_fetch: Some(last_fetch),
        last_fetch_formatted: format_ago(now - last_fetch),
        total_files: metadata.files.len(),
        needs_update,
        fetch_history: metadata.fetch_history.clone(),
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("{n} {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}

/// Human-readable age, e.g. `"3 hours ago"`.
#[must_use]
pub fn format_ago(elapsed: chrono::TimeDelta) -> String {
    let days = elapsed.num_days();
    let seconds = elapsed.num_seconds() - days * 86_400;

    if days > 0 {
        plural(days, "day")
    } else if seconds > 3600 {
        plural(seconds / 3600, "hour")
    } else if seconds > 60 {
        plural(seconds / 60, "minute")
    } else {
        "Just now".to_string()
    }
}
