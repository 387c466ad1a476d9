//! End-to-end tests of incremental index runs against an in-memory store.
//!
//! Every run builds a fresh `IndexBuilder` that reloads the manifest from
//! disk, the way separate CLI invocations would.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use siteindex::backup::BackupManager;
use siteindex::builder::{BuildOptions, IndexBuilder, IndexReport};
use siteindex::chunk::{Chunker, ChunkerConfig};
use siteindex::config::SourceConfig;
use siteindex::embedding::Embedder;
use siteindex::error::IndexError;
use siteindex::manifest::Manifest;
use siteindex::models::Chunk;
use siteindex::store::{InMemoryVectorStore, VectorStore};

#[derive(Default)]
struct CountingEmbedder {
    texts: AtomicUsize,
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn model_name(&self) -> &str {
        "counting"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| vec![t.len() as f32, 0.0, 1.0])
            .collect())
    }
}

/// Reads the on-disk manifest when the given embed call starts.
struct ManifestPeeker {
    manifest_path: PathBuf,
    peek_on_call: usize,
    calls: AtomicUsize,
    seen_files: Mutex<Option<usize>>,
}

#[async_trait]
impl Embedder for ManifestPeeker {
    fn model_name(&self) -> &str {
        "peeker"
    }
    fn dims(&self) -> usize {
        1
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.peek_on_call {
            let files = if self.manifest_path.exists() {
                Manifest::load(self.manifest_path.clone())?.get_file_count()
            } else {
                0
            };
            *self.seen_files.lock().unwrap() = Some(files);
        }
        Ok(vec![vec![1.0]; texts.len()])
    }
}

/// In-memory store whose upserts fail for chunks of matching files.
struct FaultyStore {
    inner: Arc<InMemoryVectorStore>,
    fail_for: Mutex<Option<String>>,
}

impl FaultyStore {
    fn fail_upserts_for(&self, needle: &str) {
        *self.fail_for.lock().unwrap() = Some(needle.to_string());
    }
}

#[async_trait]
impl VectorStore for FaultyStore {
    async fn upsert_many(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        chunks: &[Chunk],
    ) -> anyhow::Result<()> {
        let needle = self.fail_for.lock().unwrap().clone();
        if let Some(needle) = needle {
            if let Some(c) = chunks.iter().find(|c| c.source_file.contains(&needle)) {
                anyhow::bail!("upsert rejected for {}", c.source_file);
            }
        }
        self.inner.upsert_many(ids, vectors, chunks).await
    }

    async fn delete_many(&self, ids: &[String]) -> anyhow::Result<()> {
        self.inner.delete_many(ids).await
    }

    async fn flush(&self) -> anyhow::Result<()> {
        self.inner.flush().await
    }
}

struct Env {
    _tmp: TempDir,
    corpus: PathBuf,
    index_dir: PathBuf,
    backup_dir: PathBuf,
    store: Arc<InMemoryVectorStore>,
    faulty: Arc<FaultyStore>,
    embedder: Arc<CountingEmbedder>,
}

impl Env {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let corpus = tmp.path().join("corpus");
        std::fs::create_dir_all(&corpus).unwrap();
        let store = Arc::new(InMemoryVectorStore::new());
        Self {
            corpus,
            index_dir: tmp.path().join("index"),
            backup_dir: tmp.path().join("backups"),
            _tmp: tmp,
            faulty: Arc::new(FaultyStore {
                inner: store.clone(),
                fail_for: Mutex::new(None),
            }),
            store,
            embedder: Arc::new(CountingEmbedder::default()),
        }
    }

    fn write(&self, rel: &str, body: &str) {
        let path = self.corpus.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn remove(&self, rel: &str) {
        std::fs::remove_file(self.corpus.join(rel)).unwrap();
    }

    fn manifest_path(&self) -> PathBuf {
        self.index_dir.join("manifest.json")
    }

    fn sources(&self) -> BTreeMap<String, SourceConfig> {
        let mut sources = BTreeMap::new();
        sources.insert(
            "project".to_string(),
            SourceConfig {
                root: self.corpus.clone(),
                exclude_globs: Vec::new(),
                follow_symlinks: false,
            },
        );
        sources
    }

    fn builder(&self) -> IndexBuilder {
        self.builder_with(self.embedder.clone())
    }

    fn builder_with(&self, embedder: Arc<dyn Embedder>) -> IndexBuilder {
        let store: Arc<dyn VectorStore> = self.faulty.clone();
        IndexBuilder::new(
            self.sources(),
            Chunker::new(ChunkerConfig::default()).unwrap(),
            Manifest::load(self.manifest_path()).unwrap(),
            store,
            embedder,
        )
        .with_backups(BackupManager::new(&self.index_dir, &self.backup_dir, 3))
        .with_batch_size(2)
    }

    async fn run(&self, opts: BuildOptions) -> IndexReport {
        self.builder().run(&opts).await.unwrap()
    }

    fn manifest(&self) -> Manifest {
        Manifest::load(self.manifest_path()).unwrap()
    }

    /// Manifest chunk IDs must equal the store's IDs: no orphans, no gaps.
    fn assert_in_sync(&self) {
        let manifest = self.manifest();
        let ledger: BTreeSet<String> = manifest
            .get_all_chunk_ids()
            .into_iter()
            .map(str::to_string)
            .collect();
        assert_eq!(ledger, self.store.ids());
        assert_eq!(manifest.get_chunk_count(), self.store.len());
    }
}

fn paragraphs(topic: &str, n: usize) -> String {
    (0..n)
        .map(|i| {
            format!(
                "{topic} paragraph {i}. The contractor shall verify all dimensions on site \
                 before fabrication begins. Shop drawings are required for review."
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn full() -> BuildOptions {
    BuildOptions::default()
}

fn limited(n: usize) -> BuildOptions {
    BuildOptions {
        limit: Some(n),
        ..BuildOptions::default()
    }
}

#[tokio::test]
async fn test_first_run_indexes_everything() {
    let env = Env::new();
    env.write("specs/concrete.txt", &paragraphs("Concrete", 4));
    env.write("notes.txt", &paragraphs("Meeting", 2));
    env.write("drawings/A-101.dwg", "binary");

    let report = env.run(full()).await;
    assert_eq!(report.files_processed, 2);
    assert_eq!(report.files_unchanged, 0);
    assert_eq!(report.files_skipped, 1);
    assert_eq!(report.files_errored, 0);
    assert!(report.chunks_added >= 2);
    assert_eq!(report.chunks_deleted, 0);

    let manifest = env.manifest();
    assert_eq!(manifest.get_file_count(), 2);
    let entry = manifest.get_file("project", "specs/concrete.txt").unwrap();
    assert_eq!(entry.chunk_count, entry.chunk_ids.len());
    env.assert_in_sync();
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let env = Env::new();
    env.write("a.txt", &paragraphs("Alpha", 3));
    env.write("b.txt", &paragraphs("Beta", 3));
    env.run(full()).await;
    let embedded = env.embedder.texts.load(Ordering::SeqCst);

    let report = env.run(full()).await;
    assert_eq!(report.files_unchanged, 2);
    assert_eq!(report.files_processed, 0);
    assert_eq!(report.chunks_added, 0);
    assert_eq!(report.chunks_deleted, 0);
    assert_eq!(env.embedder.texts.load(Ordering::SeqCst), embedded);
    env.assert_in_sync();
}

#[tokio::test]
async fn test_single_byte_change_forces_update() {
    let env = Env::new();
    env.write("a.txt", &paragraphs("Alpha", 3));
    env.run(full()).await;
    let before = env.manifest().get_file("project", "a.txt").unwrap().clone();

    let mut body = paragraphs("Alpha", 3);
    body.push('!');
    env.write("a.txt", &body);

    let report = env.run(full()).await;
    assert_eq!(report.files_processed, 1);
    assert_eq!(report.files_unchanged, 0);
    assert_eq!(report.chunks_deleted, before.chunk_count);

    let after = env.manifest().get_file("project", "a.txt").unwrap().clone();
    assert_ne!(after.content_hash, before.content_hash);
    assert_eq!(after.file_size, before.file_size + 1);
    env.assert_in_sync();
}

#[tokio::test]
async fn test_force_reprocesses_unchanged_files() {
    let env = Env::new();
    env.write("a.txt", &paragraphs("Alpha", 2));
    env.run(full()).await;
    let ids = env.manifest().get_file("project", "a.txt").unwrap().chunk_ids.clone();

    let report = env
        .run(BuildOptions {
            force: true,
            ..BuildOptions::default()
        })
        .await;
    assert_eq!(report.files_processed, 1);
    assert_eq!(report.files_unchanged, 0);
    assert_eq!(report.chunks_added, ids.len());
    // Same content, same IDs.
    assert_eq!(env.manifest().get_file("project", "a.txt").unwrap().chunk_ids, ids);
    env.assert_in_sync();
}

#[tokio::test]
async fn test_full_run_deletes_stale_entries() {
    let env = Env::new();
    env.write("keep.txt", &paragraphs("Keep", 2));
    env.write("gone/old.txt", &paragraphs("Old", 2));
    env.run(full()).await;
    let stale_ids = env.manifest().get_file("project", "gone/old.txt").unwrap().chunk_ids.clone();

    env.remove("gone/old.txt");
    let report = env.run(full()).await;
    assert_eq!(report.files_deleted, 1);
    assert_eq!(report.chunks_deleted, stale_ids.len());
    assert!(env.manifest().get_file("project", "gone/old.txt").is_none());
    for id in &stale_ids {
        assert!(env.store.get(id).is_none());
    }
    env.assert_in_sync();
}

#[tokio::test]
async fn test_partial_run_never_deletes() {
    let env = Env::new();
    for name in ["a.txt", "b.txt", "c.txt"] {
        env.write(name, &paragraphs(name, 2));
    }
    env.run(full()).await;

    env.remove("c.txt");
    for limit in [1, 2] {
        let report = env.run(limited(limit)).await;
        assert_eq!(report.files_deleted, 0);
        assert!(!report.full_run);
        assert!(report.backup.is_none());
        assert!(env.manifest().get_file("project", "c.txt").is_some());
    }
    env.assert_in_sync();

    let report = env.run(full()).await;
    assert_eq!(report.files_deleted, 1);
    env.assert_in_sync();
}

#[tokio::test]
async fn test_limit_caps_files_considered() {
    let env = Env::new();
    for name in ["a.txt", "b.txt", "c.txt"] {
        env.write(name, &paragraphs(name, 1));
    }
    let report = env.run(limited(2)).await;
    assert_eq!(report.files_processed, 2);
    assert_eq!(env.manifest().get_file_count(), 2);
    assert!(env.manifest().get_file("project", "c.txt").is_none());
}

#[tokio::test]
async fn test_file_errors_are_collected_not_fatal() {
    let env = Env::new();
    env.write("good.txt", &paragraphs("Good", 2));
    env.write("broken.pdf", "this is not a pdf");
    env.write("legacy.doc", "old binary");

    let report = env.run(full()).await;
    assert_eq!(report.files_processed, 1);
    assert_eq!(report.files_errored, 2);
    let failed: Vec<&str> = report.errors.iter().map(|e| e.file.as_str()).collect();
    assert_eq!(failed, vec!["project/broken.pdf", "project/legacy.doc"]);
    assert!(env.manifest().get_file("project", "broken.pdf").is_none());
    env.assert_in_sync();
}

#[tokio::test]
async fn test_failed_update_keeps_ledger_consistent() {
    let env = Env::new();
    env.write("a.txt", &paragraphs("Alpha", 2));
    env.write("b.txt", &paragraphs("Beta", 2));
    env.run(full()).await;

    env.write("b.txt", &paragraphs("Beta revised", 3));
    env.faulty.fail_upserts_for("b.txt");
    let report = env.run(full()).await;
    assert_eq!(report.files_errored, 1);
    assert_eq!(report.errors[0].file, "project/b.txt");
    assert!(env.manifest().get_file("project", "b.txt").is_none());
    assert!(env.manifest().get_file("project", "a.txt").is_some());
    env.assert_in_sync();
}

#[tokio::test]
async fn test_full_run_backs_up_before_mutating() {
    let env = Env::new();
    env.write("a.txt", &paragraphs("Alpha", 2));

    // Nothing on disk yet, so nothing to snapshot.
    let report = env.run(full()).await;
    assert!(report.backup.is_none());

    env.remove("a.txt");
    let report = env.run(full()).await;
    let backup = report.backup.expect("backup taken before deletion");

    // The snapshot holds the pre-deletion manifest.
    let manager = BackupManager::new(&env.index_dir, &env.backup_dir, 3);
    manager.restore_backup(&backup).unwrap();
    assert!(env.manifest().get_file("project", "a.txt").is_some());
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let env = Env::new();
    env.write("a.txt", &paragraphs("Alpha", 2));

    let report = env
        .run(BuildOptions {
            dry_run: true,
            ..BuildOptions::default()
        })
        .await;
    assert!(report.dry_run);
    assert_eq!(report.files_processed, 1);
    assert_eq!(report.chunks_added, 0);
    assert!(!env.manifest_path().exists());
    assert!(env.store.is_empty());
    assert!(!env.backup_dir.exists());
}

#[tokio::test]
async fn test_missing_root_aborts_before_mutation() {
    let env = Env::new();
    env.write("a.txt", &paragraphs("Alpha", 2));
    env.run(full()).await;
    let saved = std::fs::read(env.manifest_path()).unwrap();

    std::fs::rename(&env.corpus, env.corpus.with_extension("unmounted")).unwrap();
    let err = env.builder().run(&full()).await.unwrap_err();
    assert!(matches!(err, IndexError::MissingRoot { .. }));
    assert_eq!(std::fs::read(env.manifest_path()).unwrap(), saved);
    assert!(!env.store.is_empty());
}

#[tokio::test]
async fn test_unknown_source_rejected() {
    let env = Env::new();
    let opts = BuildOptions {
        sources: vec!["nope".to_string()],
        ..BuildOptions::default()
    };
    let err = env.builder().run(&opts).await.unwrap_err();
    assert!(matches!(err, IndexError::UnknownSource(name) if name == "nope"));
}

#[tokio::test]
async fn test_unconfigured_manifest_sources_are_untouched() {
    let env = Env::new();
    env.write("a.txt", &paragraphs("Alpha", 1));
    let mut manifest = Manifest::new(env.manifest_path());
    manifest.add_file(
        "retired",
        "old.txt",
        siteindex::models::FileEntry::new("h".into(), 1, Vec::new()),
    );
    manifest.save().unwrap();

    let report = env.run(full()).await;
    assert_eq!(report.files_deleted, 0);
    assert!(env.manifest().get_file("retired", "old.txt").is_some());
}

#[tokio::test]
async fn test_checkpoints_persist_progress() {
    let env = Env::new();
    for i in 0..5 {
        env.write(&format!("f{i}.txt"), &paragraphs("Doc", 1));
    }
    // One chunk per file, so embed call 3 belongs to the fourth file.
    let peeker = Arc::new(ManifestPeeker {
        manifest_path: env.manifest_path(),
        peek_on_call: 3,
        calls: AtomicUsize::new(0),
        seen_files: Mutex::new(None),
    });
    let mut builder = env.builder_with(peeker.clone()).with_checkpoint_every(2);
    let report = builder.run(&full()).await.unwrap();

    assert_eq!(report.files_processed, 5);
    assert_eq!(*peeker.seen_files.lock().unwrap(), Some(2));
    assert_eq!(Manifest::load(env.manifest_path()).unwrap().get_file_count(), 5);
    assert_eq!(builder.manifest().get_file_count(), 5);
}

#[tokio::test]
async fn test_failed_backup_aborts_before_mutation() {
    let env = Env::new();
    env.write("a.txt", &paragraphs("Alpha", 2));
    env.write("b.txt", &paragraphs("Beta", 2));
    env.run(full()).await;
    let saved = std::fs::read(env.manifest_path()).unwrap();
    let ids = env.store.ids();
    let embedded = env.embedder.texts.load(Ordering::SeqCst);

    // A regular file where the backup directory should be.
    std::fs::write(&env.backup_dir, b"not a directory").unwrap();
    env.write("a.txt", &paragraphs("Alpha revised", 3));
    env.remove("b.txt");

    let err = env.builder().run(&full()).await.unwrap_err();
    assert!(matches!(err, IndexError::Backup(_)), "{err}");
    assert_eq!(std::fs::read(env.manifest_path()).unwrap(), saved);
    assert_eq!(env.store.ids(), ids);
    assert_eq!(env.embedder.texts.load(Ordering::SeqCst), embedded);
}

#[tokio::test]
async fn test_failed_manifest_save_is_a_run_error() {
    let env = Env::new();
    env.write("a.txt", &paragraphs("Alpha", 2));
    env.run(full()).await;
    let saved = std::fs::read(env.manifest_path()).unwrap();

    env.write("a.txt", &paragraphs("Alpha revised", 3));
    let mut builder = env.builder();

    // A non-empty directory in place of the manifest cannot be replaced.
    std::fs::remove_file(env.manifest_path()).unwrap();
    std::fs::create_dir_all(env.manifest_path().join("held")).unwrap();

    let err = builder.run(&limited(10)).await.unwrap_err();
    assert!(matches!(err, IndexError::Persistence(_)), "{err}");
    assert!(env.manifest_path().join("held").is_dir());
    let leftovers: Vec<String> = std::fs::read_dir(&env.index_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");

    // Put the last saved manifest back: the next run catches up.
    std::fs::remove_dir_all(env.manifest_path()).unwrap();
    std::fs::write(env.manifest_path(), &saved).unwrap();
    let report = env.run(full()).await;
    assert_eq!(report.files_processed, 1);
    env.assert_in_sync();
}

#[tokio::test]
async fn test_skipped_counts_whole_scan_on_partial_run() {
    let env = Env::new();
    for name in ["a.txt", "b.txt", "c.txt"] {
        env.write(name, &paragraphs(name, 1));
    }
    env.write("drawings/A-101.dwg", "binary");
    env.write("drawings/S-301.dwg", "binary");

    let report = env.run(limited(1)).await;
    assert_eq!(report.files_processed, 1);
    assert_eq!(report.files_skipped, 2);
}
