//! Index status overview.
//!
//! Summarises what the manifest says is indexed, per source, plus the
//! backup situation. Used by `siteindex status` to check that runs are
//! landing without opening the manifest by hand.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::backup::{BackupInfo, BackupManager};
use crate::config::Config;
use crate::manifest::Manifest;

/// Per-source breakdown of file and chunk counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStatus {
    pub source: String,
    pub files: usize,
    pub chunks: usize,
    pub last_indexed: Option<DateTime<Utc>>,
    /// Present in the manifest but not in the configuration.
    pub orphaned: bool,
}

#[derive(Debug, Clone)]
pub struct IndexStatus {
    pub manifest_path: PathBuf,
    pub manifest_exists: bool,
    pub updated_at: DateTime<Utc>,
    pub total_files: usize,
    pub total_chunks: usize,
    pub sources: Vec<SourceStatus>,
    pub backups: Vec<BackupInfo>,
}

pub fn collect_status(config: &Config) -> Result<IndexStatus> {
    let manifest_path = config.manifest_path();
    let manifest = Manifest::load(&manifest_path)?;
    let backups = BackupManager::new(
        config.index.dir.clone(),
        config.backup_dir(),
        config.backup.max_backups,
    )
    .list_backups()?;

    let mut per_source: BTreeMap<String, SourceStatus> = config
        .sources
        .keys()
        .map(|name| {
            (
                name.clone(),
                SourceStatus {
                    source: name.clone(),
                    files: 0,
                    chunks: 0,
                    last_indexed: None,
                    orphaned: false,
                },
            )
        })
        .collect();

    for file in manifest.get_all_files() {
        let stats = per_source
            .entry(file.source.to_string())
            .or_insert_with(|| SourceStatus {
                source: file.source.to_string(),
                files: 0,
                chunks: 0,
                last_indexed: None,
                orphaned: true,
            });
        stats.files += 1;
        stats.chunks += file.entry.chunk_count;
        stats.last_indexed = stats.last_indexed.max(Some(file.entry.indexed_at));
    }

    Ok(IndexStatus {
        manifest_exists: manifest_path.is_file(),
        manifest_path,
        updated_at: manifest.updated_at(),
        total_files: manifest.get_file_count(),
        total_chunks: manifest.get_chunk_count(),
        sources: per_source.into_values().collect(),
        backups,
    })
}

/// Run the status command: read the manifest and print a summary.
pub fn run_status(config: &Config) -> Result<()> {
    let status = collect_status(config)?;

    println!("siteindex status");
    println!("================");
    println!();
    println!("  Manifest:    {}", status.manifest_path.display());
    if !status.manifest_exists {
        println!("  (not yet written; run `siteindex index`)");
    } else {
        println!("  Updated:     {}", format_time(status.updated_at));
    }
    println!();
    println!("  Files:       {}", status.total_files);
    println!("  Chunks:      {}", status.total_chunks);

    if !status.sources.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<24} {:>8} {:>8}   {}",
            "SOURCE", "FILES", "CHUNKS", "LAST INDEXED"
        );
        println!("  {}", "-".repeat(64));
        for s in &status.sources {
            let last = s
                .last_indexed
                .map(format_time)
                .unwrap_or_else(|| "never".to_string());
            let name = if s.orphaned {
                format!("{} (unconfigured)", s.source)
            } else {
                s.source.clone()
            };
            println!("  {:<24} {:>8} {:>8}   {}", name, s.files, s.chunks, last);
        }
    }

    println!();
    match status.backups.first() {
        Some(latest) => {
            println!("  Backups:     {}", status.backups.len());
            println!(
                "  Latest:      {} ({}, {})",
                latest.path.display(),
                format_bytes(latest.size),
                format_time(latest.modified)
            );
        }
        None => println!("  Backups:     none"),
    }
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
pub(crate) fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

pub(crate) fn format_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
