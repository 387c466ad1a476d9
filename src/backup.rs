//! Rotating compressed snapshots of the index directory.
//!
//! A full index run snapshots the whole index directory (manifest plus local
//! vector store) before it deletes anything, so an accidental mass deletion
//! can be rolled back with [`BackupManager::restore_backup`].
//!
//! Archives are gzip-compressed tarballs named
//! `backup-<UTC timestamp, microseconds>.tar.gz` holding the directory
//! under the fixed root [`ARCHIVE_ROOT`]. Both directions are staged: the
//! archive is written to a temp file and renamed into place, and a restore
//! unpacks into a temp directory before the live directory is swapped out.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Deserialize;

use crate::error::{backup_io, BackupError};

/// Directory name the index is stored under inside every archive.
pub const ARCHIVE_ROOT: &str = "index";

const BACKUP_PREFIX: &str = "backup-";
const BACKUP_SUFFIX: &str = ".tar.gz";

#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    /// Defaults to `<index dir>.backups` next to the index directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_max_backups() -> usize {
    5
}
fn default_enabled() -> bool {
    true
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_backups: default_max_backups(),
            enabled: default_enabled(),
        }
    }
}

/// One archive on disk.
#[derive(Debug, Clone)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BackupManager {
    index_dir: PathBuf,
    backup_dir: PathBuf,
    max_backups: usize,
}

impl BackupManager {
    pub fn new(
        index_dir: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        max_backups: usize,
    ) -> Self {
        Self {
            index_dir: index_dir.into(),
            backup_dir: backup_dir.into(),
            max_backups: max_backups.max(1),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Snapshot the index directory, then rotate old archives.
    ///
    /// Returns `None` without writing anything when the index directory is
    /// missing or empty.
    pub fn create_backup(&self) -> Result<Option<PathBuf>, BackupError> {
        if !self.index_dir.is_dir() || is_empty_dir(&self.index_dir)? {
            tracing::debug!(dir = %self.index_dir.display(), "index directory empty, no backup taken");
            return Ok(None);
        }

        fs::create_dir_all(&self.backup_dir).map_err(backup_io(&self.backup_dir))?;
        let final_path = self.next_backup_path();

        let mut tmp = tempfile::Builder::new()
            .prefix(".backup-")
            .suffix(".partial")
            .tempfile_in(&self.backup_dir)
            .map_err(backup_io(&self.backup_dir))?;
        let tmp_path = tmp.path().to_path_buf();
        {
            let encoder = GzEncoder::new(tmp.as_file_mut(), Compression::default());
            let mut builder = tar::Builder::new(encoder);
            builder.follow_symlinks(false);
            builder
                .append_dir_all(ARCHIVE_ROOT, &self.index_dir)
                .map_err(backup_io(&self.index_dir))?;
            let encoder = builder.into_inner().map_err(backup_io(&tmp_path))?;
            encoder.finish().map_err(backup_io(&tmp_path))?;
        }
        tmp.as_file().sync_all().map_err(backup_io(&tmp_path))?;
        tmp.persist(&final_path)
            .map_err(|e| backup_io(&final_path)(e.error))?;

        tracing::info!(path = %final_path.display(), "backup created");
        self.rotate_backups()?;
        Ok(Some(final_path))
    }

    fn next_backup_path(&self) -> PathBuf {
        loop {
            let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ");
            let path = self
                .backup_dir
                .join(format!("{BACKUP_PREFIX}{stamp}{BACKUP_SUFFIX}"));
            if !path.exists() {
                return path;
            }
            std::thread::sleep(std::time::Duration::from_micros(1));
        }
    }

    /// Delete everything but the `max_backups` most recent archives.
    fn rotate_backups(&self) -> Result<Vec<PathBuf>, BackupError> {
        let mut removed = Vec::new();
        for stale in self.list_backups()?.into_iter().skip(self.max_backups) {
            fs::remove_file(&stale.path).map_err(backup_io(&stale.path))?;
            tracing::info!(path = %stale.path.display(), "rotated out old backup");
            removed.push(stale.path);
        }
        Ok(removed)
    }

    /// Archives in the backup directory, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>, BackupError> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(backup_io(&self.backup_dir)(e)),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(backup_io(&self.backup_dir))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(BACKUP_PREFIX) || !name.ends_with(BACKUP_SUFFIX) {
                continue;
            }
            let meta = entry.metadata().map_err(backup_io(entry.path()))?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().map_err(backup_io(entry.path()))?;
            backups.push(BackupInfo {
                path: entry.path(),
                size: meta.len(),
                modified: DateTime::<Utc>::from(modified),
            });
        }

        // Names embed the creation timestamp, so they break mtime ties.
        backups.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.path.cmp(&a.path)));
        Ok(backups)
    }

    pub fn get_latest_backup(&self) -> Result<Option<PathBuf>, BackupError> {
        Ok(self.list_backups()?.into_iter().next().map(|b| b.path))
    }

    /// Replace the index directory with the contents of `archive`.
    ///
    /// The archive is unpacked into a staging directory first. The live
    /// index directory is then moved aside, the staged tree renamed into its
    /// place, and the old tree removed only once that rename has succeeded.
    pub fn restore_backup(&self, archive: &Path) -> Result<(), BackupError> {
        if !archive.is_file() {
            return Err(BackupError::NotFound(archive.to_path_buf()));
        }

        let parent = match self.index_dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(backup_io(&parent))?;
        let staging = tempfile::Builder::new()
            .prefix(".restore-")
            .tempdir_in(&parent)
            .map_err(backup_io(&parent))?;

        let file = File::open(archive).map_err(backup_io(archive))?;
        let mut tarball = tar::Archive::new(GzDecoder::new(file));
        tarball
            .unpack(staging.path())
            .map_err(|e| BackupError::InvalidArchive {
                path: archive.to_path_buf(),
                reason: e.to_string(),
            })?;

        let extracted = staging.path().join(ARCHIVE_ROOT);
        if !extracted.is_dir() {
            return Err(BackupError::InvalidArchive {
                path: archive.to_path_buf(),
                reason: format!("missing '{ARCHIVE_ROOT}/' root"),
            });
        }

        let displaced = parent.join(format!(
            ".restore-old-{}",
            Utc::now().format("%Y%m%dT%H%M%S%.6fZ")
        ));
        swap_in(&extracted, &self.index_dir, &displaced)?;

        tracing::info!(
            archive = %archive.display(),
            dir = %self.index_dir.display(),
            "index restored from backup"
        );
        Ok(())
    }
}

/// Move `staged` into place at `live`, parking any existing `live` tree at
/// `displaced` until the swap has succeeded. On failure `live` is put back.
fn swap_in(staged: &Path, live: &Path, displaced: &Path) -> Result<(), BackupError> {
    let had_live = live.exists();
    if had_live {
        fs::rename(live, displaced).map_err(backup_io(live))?;
    }

    if let Err(e) = fs::rename(staged, live) {
        if had_live {
            if let Err(back) = fs::rename(displaced, live) {
                tracing::error!(
                    previous = %displaced.display(),
                    error = %back,
                    "could not move previous index back into place"
                );
            }
        }
        return Err(BackupError::Io {
            path: live.to_path_buf(),
            source: e,
        });
    }

    if had_live {
        if let Err(e) = fs::remove_dir_all(displaced) {
            tracing::warn!(
                path = %displaced.display(),
                error = %e,
                "restored, but the previous index could not be removed"
            );
        }
    }
    Ok(())
}

fn is_empty_dir(dir: &Path) -> Result<bool, BackupError> {
    let mut entries = fs::read_dir(dir).map_err(backup_io(dir))?;
    Ok(entries.next().is_none())
}
