//! Error taxonomy for the indexing engine.
//!
//! Per-file failures ([`ExtractionError`], [`ChunkingError`]) are caught by the
//! builder, logged, and aggregated into the run report. Run-level failures
//! ([`ManifestError`], [`BackupError`], [`IndexError`]) propagate to the caller.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A source document could not be turned into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),

    #[error("legacy binary format is not supported: {0} (convert to the OOXML equivalent)")]
    LegacyFormat(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// Chunking could not satisfy its size constraints.
#[derive(Debug, Error)]
pub enum ChunkingError {
    #[error("invalid chunker configuration: {0}")]
    InvalidConfig(String),

    #[error("chunk {index} is {len} chars, over the {max} char limit")]
    Oversized { index: usize, len: usize, max: usize },
}

/// Manifest load/save failures. A failed save leaves the previous file untouched.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("manifest at {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("manifest at {path} has unsupported version {found} (expected {expected})")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("failed to atomically replace manifest at {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Backup archive creation or restore failed.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup not found: {0}")]
    NotFound(PathBuf),

    #[error("backup I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid backup archive {path}: {reason}")]
    InvalidArchive { path: PathBuf, reason: String },
}

/// Run-level failure of an index build. Aborts the run.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Persistence(#[from] ManifestError),

    #[error("pre-run backup failed, refusing to continue: {0}")]
    Backup(#[from] BackupError),

    #[error("vector store error: {0:#}")]
    Store(anyhow::Error),

    #[error("source '{source_name}' root does not exist: {root}")]
    MissingRoot { source_name: String, root: PathBuf },

    #[error("unknown source '{0}'")]
    UnknownSource(String),

    #[error("failed to walk {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("invalid exclude pattern: {0}")]
    Glob(#[from] globset::Error),
}

pub(crate) fn backup_io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> BackupError {
    let path = path.into();
    move |source| BackupError::Io { path, source }
}
