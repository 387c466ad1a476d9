//! Incremental index build orchestration.
//!
//! Walks every selected source, diffs each file's content fingerprint
//! against the [`Manifest`], and applies the minimum set of store
//! mutations:
//!
//! | Condition                         | Action                                  |
//! |-----------------------------------|-----------------------------------------|
//! | `force`                           | re-process regardless of hash           |
//! | not in manifest                   | ADD                                     |
//! | in manifest, same hash            | SKIP (unchanged)                        |
//! | in manifest, different hash       | UPDATE: delete old ids, store new ones  |
//! | in manifest, not walked (full run)| DELETE ids and manifest entry           |
//!
//! A run with a `limit` is partial: it sees only part of the corpus, so it
//! never deletes and never takes a backup. A full run snapshots the index
//! directory before its first mutation and aborts if the snapshot fails.
//!
//! Per-file failures are logged and collected in the [`IndexReport`]; they
//! never abort sibling files. Store flush and manifest save failures are
//! run-level and propagate.
//!
//! The walk and all manifest mutation happen on one task. Extraction runs on
//! the blocking pool since PDF and OOXML parsing is CPU-bound.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};

use crate::backup::BackupManager;
use crate::chunk::Chunker;
use crate::config::{Config, SourceConfig};
use crate::corpus::{self, CorpusFile};
use crate::embedding::Embedder;
use crate::error::IndexError;
use crate::extract::{self, DocumentExtractor, Extractor};
use crate::fingerprint;
use crate::manifest::Manifest;
use crate::models::{Chunk, FileEntry};
use crate::store::VectorStore;

/// What one `run` should cover.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Re-process every walked file even when its hash is unchanged.
    pub force: bool,
    /// Consider at most this many files. Makes the run partial.
    pub limit: Option<usize>,
    /// Restrict the run to these sources. Empty means all configured sources.
    pub sources: Vec<String>,
    /// Decide and report, but touch neither store, manifest nor backups.
    pub dry_run: bool,
}

impl BuildOptions {
    pub fn is_full_run(&self) -> bool {
        self.limit.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Add,
    Update,
    Skip,
}

/// Per-file decision, in priority order: force, new, unchanged, changed.
pub fn decide(existing: Option<&FileEntry>, content_hash: &str, force: bool) -> FileAction {
    match existing {
        None => FileAction::Add,
        Some(_) if force => FileAction::Update,
        Some(entry) if entry.content_hash == content_hash => FileAction::Skip,
        Some(_) => FileAction::Update,
    }
}

/// A file that failed, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileError {
    pub file: String,
    pub error: String,
}

/// Counters for one run.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    pub dry_run: bool,
    pub full_run: bool,
    pub files_processed: usize,
    pub files_unchanged: usize,
    /// Files skipped for an unsupported extension, counted over the whole
    /// scan of the selected sources. `--limit` caps only supported files,
    /// so a partial run still reports every unsupported file it saw.
    pub files_skipped: usize,
    pub files_errored: usize,
    pub files_deleted: usize,
    pub chunks_added: usize,
    pub chunks_deleted: usize,
    pub errors: Vec<FileError>,
    pub backup: Option<PathBuf>,
}

impl IndexReport {
    fn record_error(&mut self, file: String, error: &anyhow::Error) {
        tracing::warn!(file = %file, error = %format!("{:#}", error), "file failed");
        self.files_errored += 1;
        self.errors.push(FileError {
            file,
            error: format!("{:#}", error),
        });
    }

    pub fn print_summary(&self) {
        let mode = match (self.dry_run, self.full_run) {
            (true, _) => " (dry-run)",
            (false, true) => "",
            (false, false) => " (partial)",
        };
        println!("index{}", mode);
        println!("  files processed: {}", self.files_processed);
        println!("  files unchanged: {}", self.files_unchanged);
        println!("  files skipped (unsupported): {}", self.files_skipped);
        println!("  files errored: {}", self.files_errored);
        println!("  files deleted: {}", self.files_deleted);
        println!("  chunks added: {}", self.chunks_added);
        println!("  chunks deleted: {}", self.chunks_deleted);
        if let Some(backup) = &self.backup {
            println!("  backup: {}", backup.display());
        }
        if self.errors.is_empty() {
            println!("ok");
        } else {
            println!("  errors:");
            for e in &self.errors {
                println!("    {}: {}", e.file, e.error);
            }
            println!("completed with {} failed file(s)", self.errors.len());
        }
    }
}

/// Keeps a vector store and its manifest in step with the corpus.
pub struct IndexBuilder {
    sources: BTreeMap<String, SourceConfig>,
    chunker: Chunker,
    manifest: Manifest,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn Extractor>,
    backups: Option<BackupManager>,
    batch_size: usize,
    checkpoint_every: usize,
}

impl IndexBuilder {
    pub fn new(
        sources: BTreeMap<String, SourceConfig>,
        chunker: Chunker,
        manifest: Manifest,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            sources,
            chunker,
            manifest,
            store,
            embedder,
            extractor: Arc::new(DocumentExtractor),
            backups: None,
            batch_size: 64,
            checkpoint_every: 50,
        }
    }

    /// Wire a builder from configuration, loading the manifest from disk.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
    ) -> anyhow::Result<Self> {
        let chunker = Chunker::new(config.chunking)?;
        let manifest = Manifest::load(config.manifest_path())?;
        let mut builder = Self::new(config.sources.clone(), chunker, manifest, store, embedder)
            .with_batch_size(config.embedding.batch_size)
            .with_checkpoint_every(config.index.checkpoint_every);
        if config.backup.enabled {
            builder = builder.with_backups(BackupManager::new(
                config.index.dir.clone(),
                config.backup_dir(),
                config.backup.max_backups,
            ));
        }
        Ok(builder)
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_backups(mut self, backups: BackupManager) -> Self {
        self.backups = Some(backups);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Files mutated between checkpoints; 0 checkpoints only at the end.
    pub fn with_checkpoint_every(mut self, every: usize) -> Self {
        self.checkpoint_every = every;
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn into_manifest(self) -> Manifest {
        self.manifest
    }

    pub async fn run(&mut self, opts: &BuildOptions) -> Result<IndexReport, IndexError> {
        let selected = self.select_sources(&opts.sources)?;
        for name in self.manifest.source_names() {
            if !self.sources.contains_key(name) {
                tracing::warn!(source = name, "manifest source is not configured, leaving it untouched");
            }
        }

        let full_run = opts.is_full_run();
        let mut report = IndexReport {
            dry_run: opts.dry_run,
            full_run,
            ..IndexReport::default()
        };

        // Scan everything before mutating anything: a missing root aborts here.
        let mut files = Vec::new();
        for name in &selected {
            let scan = corpus::scan_source(name, &self.sources[name])?;
            report.files_skipped += scan.unsupported;
            files.extend(scan.files);
        }
        if let Some(limit) = opts.limit {
            files.truncate(limit);
        }
        tracing::info!(files = files.len(), full_run, dry_run = opts.dry_run, "corpus scanned");

        if full_run && !opts.dry_run {
            if let Some(backups) = &self.backups {
                report.backup = backups.create_backup()?;
            }
        }

        let mut since_checkpoint = 0usize;
        for file in &files {
            match self.index_file(file, opts, &mut report).await {
                Ok(true) => since_checkpoint += 1,
                Ok(false) => {}
                Err(e) => report.record_error(file.source_file(), &e),
            }
            self.maybe_checkpoint(opts, &mut since_checkpoint).await?;
        }

        if full_run {
            let seen: HashSet<(&str, &str)> = files
                .iter()
                .map(|f| (f.source.as_str(), f.relative_path.as_str()))
                .collect();
            for name in &selected {
                for path in self.manifest.source_paths(name) {
                    if seen.contains(&(name.as_str(), path.as_str())) {
                        continue;
                    }
                    if self.delete_stale(name, &path, opts.dry_run, &mut report).await {
                        since_checkpoint += 1;
                    }
                    self.maybe_checkpoint(opts, &mut since_checkpoint).await?;
                }
            }
        }

        if !opts.dry_run {
            self.checkpoint().await?;
        }
        tracing::info!(
            processed = report.files_processed,
            unchanged = report.files_unchanged,
            errored = report.files_errored,
            deleted = report.files_deleted,
            "index run finished"
        );
        Ok(report)
    }

    fn select_sources(&self, requested: &[String]) -> Result<Vec<String>, IndexError> {
        if requested.is_empty() {
            return Ok(self.sources.keys().cloned().collect());
        }
        let mut selected = Vec::new();
        for name in requested {
            if !self.sources.contains_key(name) {
                return Err(IndexError::UnknownSource(name.clone()));
            }
            if !selected.contains(name) {
                selected.push(name.clone());
            }
        }
        Ok(selected)
    }

    /// Returns whether the store or manifest was changed.
    async fn index_file(
        &mut self,
        file: &CorpusFile,
        opts: &BuildOptions,
        report: &mut IndexReport,
    ) -> anyhow::Result<bool> {
        let label = file.source_file();
        let (hash, size) = fingerprint::hash_file(&file.path)
            .with_context(|| format!("failed to read {}", file.path.display()))?;

        let existing = self.manifest.get_file(&file.source, &file.relative_path);
        let action = decide(existing, &hash, opts.force);
        if action == FileAction::Skip {
            tracing::debug!(file = %label, "unchanged");
            report.files_unchanged += 1;
            return Ok(false);
        }
        let old_ids = existing.map(|e| e.chunk_ids.clone()).unwrap_or_default();

        if opts.dry_run {
            tracing::info!(file = %label, ?action, "would index");
            report.files_processed += 1;
            return Ok(false);
        }

        let chunks = self.prepare_chunks(file, &label).await?;
        let vectors = self.embed_chunks(&chunks).await?;
        let new_ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();

        if !old_ids.is_empty() {
            self.store
                .delete_many(&old_ids)
                .await
                .context("failed to delete previous chunks")?;
            report.chunks_deleted += old_ids.len();
        }

        if let Err(e) = self.store.upsert_many(&new_ids, &vectors, &chunks).await {
            // Old chunks are gone: drop the entry so the ledger still matches the store.
            self.manifest.remove_file(&file.source, &file.relative_path);
            if let Err(cleanup) = self.store.delete_many(&new_ids).await {
                tracing::warn!(file = %label, error = %cleanup, "cleanup after failed upsert also failed");
            }
            return Err(e.context("failed to store chunks"));
        }

        tracing::info!(file = %label, ?action, chunks = new_ids.len(), "indexed");
        report.files_processed += 1;
        report.chunks_added += new_ids.len();
        self.manifest.add_file(
            &file.source,
            &file.relative_path,
            FileEntry::new(hash, size, new_ids),
        );
        Ok(true)
    }

    async fn prepare_chunks(&self, file: &CorpusFile, label: &str) -> anyhow::Result<Vec<Chunk>> {
        let extractor = Arc::clone(&self.extractor);
        let path = file.path.clone();
        let doc = tokio::task::spawn_blocking(move || extractor.extract(&path))
            .await
            .context("extraction task failed")??;

        let file_type = extract::file_type(&file.path).unwrap_or_default();
        let chunks = self.chunker.chunk(label, &file_type, &doc)?;
        if chunks.is_empty() {
            tracing::debug!(file = %label, "no text extracted");
        }
        Ok(chunks)
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = self
                .embedder
                .embed(&texts)
                .await
                .with_context(|| format!("embedding with {} failed", self.embedder.model_name()))?;
            if embedded.len() != batch.len() {
                bail!(
                    "embedder returned {} vectors for {} chunks",
                    embedded.len(),
                    batch.len()
                );
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    /// Returns whether an entry was removed.
    async fn delete_stale(
        &mut self,
        source: &str,
        path: &str,
        dry_run: bool,
        report: &mut IndexReport,
    ) -> bool {
        let label = format!("{}/{}", source, path);
        let ids = match self.manifest.get_file(source, path) {
            Some(entry) => entry.chunk_ids.clone(),
            None => return false,
        };

        if dry_run {
            tracing::info!(file = %label, "would delete");
            report.files_deleted += 1;
            return false;
        }

        if !ids.is_empty() {
            if let Err(e) = self.store.delete_many(&ids).await {
                report.record_error(label, &e.context("failed to delete stale chunks"));
                return false;
            }
        }
        self.manifest.remove_file(source, path);
        tracing::info!(file = %label, chunks = ids.len(), "deleted");
        report.files_deleted += 1;
        report.chunks_deleted += ids.len();
        true
    }

    async fn maybe_checkpoint(
        &mut self,
        opts: &BuildOptions,
        since_checkpoint: &mut usize,
    ) -> Result<(), IndexError> {
        if opts.dry_run || self.checkpoint_every == 0 || *since_checkpoint < self.checkpoint_every {
            return Ok(());
        }
        self.checkpoint().await?;
        *since_checkpoint = 0;
        Ok(())
    }

    /// Flush the store, then persist the manifest. The store goes first so a
    /// saved manifest never names chunks the store has not made durable.
    async fn checkpoint(&mut self) -> Result<(), IndexError> {
        self.store.flush().await.map_err(IndexError::Store)?;
        self.manifest.save()?;
        tracing::debug!(path = %self.manifest.path().display(), "checkpoint saved");
        Ok(())
    }
}
