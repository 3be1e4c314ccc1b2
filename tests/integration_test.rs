/// End-to-end integration tests for the SopRAG pipeline.
///
/// Tests the complete flow:
///   source directory → Indexer → SqliteStore → Retriever → prompt
use soprag::embedder::hashing::HashingEmbedder;
use soprag::extractor::DocumentExtractor;
use soprag::indexer::{IndexError, Indexer, MetadataStore, SyncReport, chunk_id, compute_delta};
use soprag::prompt;
use soprag::retriever::Retriever;
use soprag::store::{MetadataFilter, SqliteStore, VectorStore};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::{TempDir, tempdir};

const DIMS: usize = 256;

struct Fixture {
    _root: TempDir,
    sops: PathBuf,
    meta_path: PathBuf,
    store: SqliteStore,
    embedder: HashingEmbedder,
}

impl Fixture {
    fn new() -> Self {
        let root = tempdir().unwrap();
        let sops = root.path().join("SOPs");
        fs::create_dir_all(&sops).unwrap();
        let meta_path = root.path().join("sop_metadata.json");
        Self {
            _root: root,
            sops,
            meta_path,
            store: SqliteStore::open_in_memory("sop_documents", DIMS).unwrap(),
            embedder: HashingEmbedder::new(DIMS),
        }
    }

    fn write(&self, relative: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.sops.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    fn metadata(&self) -> MetadataStore {
        MetadataStore::new(&self.meta_path)
    }

    fn try_reindex(&mut self) -> Result<SyncReport, IndexError> {
        let metadata = self.metadata();
        let mut indexer = Indexer::new(
            &self.sops,
            metadata,
            &mut self.store,
            &self.embedder,
            &DocumentExtractor,
        );
        indexer.reindex(None)
    }

    fn reindex(&mut self) -> SyncReport {
        self.try_reindex().unwrap()
    }

    fn ids_for(&self, relative: &str) -> Vec<String> {
        let mut ids = self
            .store
            .get_ids(MetadataFilter::FilePath(relative))
            .unwrap();
        ids.sort();
        ids
    }
}

fn words(prefix: &str, n: usize) -> String {
    (0..n)
        .map(|i| format!("{prefix}{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn set_mtime(path: &Path, when: SystemTime) {
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(when)
        .unwrap();
}

#[test]
fn test_second_run_without_changes_is_a_no_op() {
    let mut fx = Fixture::new();
    fx.write("safety/forklift.md", "Inspect forklift brakes before each shift.");
    fx.write("hr/onboarding.txt", "New hires receive badges on day one.");

    let first = fx.reindex();
    assert_eq!(first.new_count, 2);
    assert_eq!(first.total_processed, 2);
    assert!(first.errors.is_empty(), "errors: {:?}", first.errors);

    let second = fx.reindex();
    assert_eq!(
        (second.new_count, second.modified_count, second.deleted_count),
        (0, 0, 0)
    );
    assert_eq!(second.total_processed, 0);
    assert_eq!(fx.store.count().unwrap(), 2);

    let saved = fx.metadata().load().unwrap();
    assert_eq!(saved.fetch_history.len(), 2);
    assert!(saved.last_fetch.is_some());
}

#[test]
fn test_touch_without_edit_is_not_modified() {
    let mut fx = Fixture::new();
    let path = fx.write("policy.txt", "Badges must be worn at all times.");
    fx.reindex();

    set_mtime(&path, SystemTime::now() + Duration::from_secs(120));

    let metadata = fx.metadata().load().unwrap();
    let delta = compute_delta(&fx.sops, &metadata).unwrap();
    assert!(delta.is_empty());
    assert_eq!(fx.reindex().modified_count, 0);
}

#[test]
fn test_single_byte_edit_is_modified() {
    let mut fx = Fixture::new();
    fx.write("policy.txt", "Badges must be worn at all times.");
    fx.reindex();

    fx.write("policy.txt", "Badges must be worn at all times!");

    let metadata = fx.metadata().load().unwrap();
    let delta = compute_delta(&fx.sops, &metadata).unwrap();
    assert_eq!(delta.modified_files.len(), 1);
    assert_eq!(delta.modified_files[0].relative_path, "policy.txt");
}

#[test]
fn test_deleted_file_is_purged_from_store_and_metadata() {
    let mut fx = Fixture::new();
    let doomed = fx.write("retired.md", words("w", 1200));
    fx.write("kept.md", "This procedure stays.");
    fx.reindex();
    assert_eq!(fx.ids_for("retired.md").len(), 3);

    fs::remove_file(doomed).unwrap();
    let report = fx.reindex();

    assert_eq!(report.deleted_count, 1);
    assert_eq!(report.chunks_removed, 3);
    assert!(fx.ids_for("retired.md").is_empty());
    assert_eq!(fx.ids_for("kept.md").len(), 1);

    let saved = fx.metadata().load().unwrap();
    assert!(!saved.files.contains_key("retired.md"));
    assert!(saved.files.contains_key("kept.md"));
}

#[test]
fn test_policy_grows_from_one_chunk_to_three() {
    let mut fx = Fixture::new();
    fx.write("policy.txt", words("a", 280));

    let first = fx.reindex();
    assert_eq!(first.chunks_added, 1);
    assert_eq!(fx.ids_for("policy.txt"), vec![chunk_id("policy.txt", 0)]);

    let retriever = Retriever::new(&fx.store, &fx.embedder);
    let hit = &retriever.search(&words("a", 20), 1)[0];
    assert_eq!(hit.metadata.chunk_index, 0);
    assert_eq!(hit.metadata.total_chunks, 1);
    assert_eq!(hit.metadata.source, "policy.txt");

    fx.write("policy.txt", words("b", 1200));
    let second = fx.reindex();

    assert_eq!(second.modified_count, 1);
    assert_eq!(second.chunks_removed, 1);
    assert_eq!(second.chunks_added, 3);
    assert_eq!(
        fx.ids_for("policy.txt"),
        vec![
            chunk_id("policy.txt", 0),
            chunk_id("policy.txt", 1),
            chunk_id("policy.txt", 2),
        ]
    );

    let retriever = Retriever::new(&fx.store, &fx.embedder);
    let chunks = retriever.search("b1000 b1100 b1199", 3);
    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(|c| c.metadata.total_chunks == 3));

    // Last window covers words 900..1200
    let tail = chunks
        .iter()
        .find(|c| c.id == chunk_id("policy.txt", 2))
        .unwrap();
    assert_eq!(tail.metadata.chunk_index, 2);
    assert!(tail.text.starts_with("b900 "));
    assert!(tail.text.ends_with("b1199"));
}

#[test]
fn test_same_file_name_in_two_directories() {
    let mut fx = Fixture::new();
    fx.write("hr/policy.txt", "Vacation requests go to your manager.");
    fx.write("ops/policy.txt", "Change requests go to the release board.");

    let report = fx.reindex();
    assert_eq!(report.chunks_added, 2);
    assert_eq!(fx.store.count().unwrap(), 2);

    fs::remove_file(fx.sops.join("hr/policy.txt")).unwrap();
    fx.reindex();

    assert!(fx.ids_for("hr/policy.txt").is_empty());
    assert_eq!(fx.ids_for("ops/policy.txt"), vec![chunk_id("ops/policy.txt", 0)]);
    assert_eq!(
        fx.store.get_ids(MetadataFilter::Source("policy.txt")).unwrap().len(),
        1
    );
}

#[test]
fn test_unreadable_documents_are_reported_not_fatal() {
    let mut fx = Fixture::new();
    fx.write("legacy.doc", b"\xD0\xCF\x11\xE0 binary word document");
    fx.write("broken.txt", b"\xFF\xFE\xFD not utf-8");
    fx.write("good.md", "Escalate outages to the on-call engineer.");

    let report = fx.reindex();
    assert_eq!(report.new_count, 3);
    assert_eq!(report.total_processed, 3);
    assert_eq!(report.chunks_added, 1);
    assert_eq!(report.errors.len(), 2, "errors: {:?}", report.errors);

    // Extraction failures are not retried until the file changes
    let again = fx.reindex();
    assert_eq!(again.new_count, 0);
}

#[test]
fn test_held_lock_refuses_to_run() {
    let mut fx = Fixture::new();
    fx.write("policy.txt", "Badges must be worn at all times.");

    let lock_path = PathBuf::from(format!("{}.lock", fx.meta_path.display()));
    fs::write(
        &lock_path,
        format!(
            r#"{{"pid": 1, "acquired_at": "{}"}}"#,
            chrono::Utc::now().to_rfc3339()
        ),
    )
    .unwrap();

    assert!(matches!(fx.try_reindex(), Err(IndexError::Locked(_))));
    assert_eq!(fx.store.count().unwrap(), 0);
    assert!(lock_path.exists(), "someone else's lock is left alone");
}

#[test]
fn test_corrupt_metadata_stops_before_store_changes() {
    let mut fx = Fixture::new();
    fx.write("policy.txt", "Badges must be worn at all times.");
    fs::write(&fx.meta_path, "{ this is not json").unwrap();

    assert!(matches!(fx.try_reindex(), Err(IndexError::Metadata(_))));
    assert_eq!(fx.store.count().unwrap(), 0);
    assert_eq!(
        fs::read_to_string(&fx.meta_path).unwrap(),
        "{ this is not json"
    );
}

#[test]
fn test_search_and_prompt_over_indexed_sops() {
    let mut fx = Fixture::new();
    fx.write(
        "finance/refunds.md",
        "Refund requests are approved by the billing team within five days.",
    );
    fx.write(
        "safety/forklift.md",
        "Forklift operators inspect brakes and horn before each shift.",
    );
    fx.write("front/badges.txt", "Visitor badges are issued at reception.");
    fx.reindex();

    let retriever = Retriever::new(&fx.store, &fx.embedder);
    let results = retriever.search("who approves refund requests billing team", 2);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].metadata.source, "refunds.md");
    assert!(results[0].similarity >= results[1].similarity);

    let text = prompt::build_prompt("Who approves refunds?", &results, None);
    assert!(text.contains("Document: refunds.md"));
    assert!(text.contains("Refund requests are approved"));
}

#[test]
fn test_punctuation_only_file_does_not_break_search() {
    let mut fx = Fixture::new();
    fx.write("refunds.md", "Refund requests are approved by the billing team.");
    fx.write("divider.md", "--- *** --- ===");

    let report = fx.reindex();
    assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
    assert_eq!(report.total_processed, 2);
    assert_eq!(fx.store.count().unwrap(), 1);

    let retriever = Retriever::new(&fx.store, &fx.embedder);
    let results = retriever.try_search("refund requests billing", 5).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].metadata.source, "refunds.md");

    assert!(retriever.try_search("--- ***", 5).unwrap().is_empty());
}
