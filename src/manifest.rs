//! Persisted reconciliation ledger: `(source, relative path) → FileEntry`.
//!
//! The manifest records which chunk IDs the vector store holds for each
//! indexed file version. It stores identifiers only, never chunk text or
//! vectors. Saves are atomic: the document is written to a temp file in the
//! manifest's directory and renamed over the previous file, so a failed
//! save leaves the old manifest untouched and no temp file behind.
//!
//! # On-disk schema
//!
//! ```json
//! {
//!   "version": 1,
//!   "created_at": "2026-01-05T09:12:44.118203Z",
//!   "updated_at": "2026-01-05T09:14:02.550917Z",
//!   "sources": {
//!     "drawings": {
//!       "files": {
//!         "L2/plan.pdf": {
//!           "content_hash": "9f86d0…",
//!           "file_size": 48213,
//!           "chunk_count": 2,
//!           "chunk_ids": ["drawings_l2_plan_pdf-1a2b3c4d_0000", "…_0001"],
//!           "indexed_at": "2026-01-05T09:13:10.004411Z"
//!         }
//!       }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ManifestError;
use crate::models::FileEntry;

/// The only schema version this build reads or writes.
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct SourceFiles {
    files: BTreeMap<String, FileEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ManifestDocument {
    version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    sources: BTreeMap<String, SourceFiles>,
}

impl ManifestDocument {
    fn empty() -> Self {
        let now = Utc::now();
        Self {
            version: MANIFEST_VERSION,
            created_at: now,
            updated_at: now,
            sources: BTreeMap::new(),
        }
    }
}

/// A borrowed view of one ledger entry.
#[derive(Debug, Clone, Copy)]
pub struct FileRef<'a> {
    pub source: &'a str,
    pub path: &'a str,
    pub entry: &'a FileEntry,
}

/// In-memory manifest bound to its file path.
///
/// Not safe for concurrent mutation; the builder owns it for the whole run.
#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    doc: ManifestDocument,
}

impl Manifest {
    /// A fresh, empty manifest that will be saved to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            doc: ManifestDocument::empty(),
        }
    }

    /// Load the manifest at `path`, or start empty if no file exists yet.
    ///
    /// A manifest with any `version` other than [`MANIFEST_VERSION`] is
    /// rejected rather than interpreted.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ManifestError> {
        let path = path.into();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no manifest found, starting empty");
                return Ok(Self::new(path));
            }
            Err(source) => return Err(ManifestError::Io { path, source }),
        };

        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|source| ManifestError::Parse {
                path: path.clone(),
                source,
            })?;
        let found = value
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32;
        if found != MANIFEST_VERSION {
            return Err(ManifestError::UnsupportedVersion {
                path,
                found,
                expected: MANIFEST_VERSION,
            });
        }

        let doc: ManifestDocument =
            serde_json::from_value(value).map_err(|source| ManifestError::Parse {
                path: path.clone(),
                source,
            })?;
        Ok(Self { path, doc })
    }

    /// Atomically write the manifest to its path.
    pub fn save(&mut self) -> Result<(), ManifestError> {
        self.doc.updated_at = Utc::now();

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|source| ManifestError::Io {
            path: dir.clone(),
            source,
        })?;

        let body = serde_json::to_vec_pretty(&self.doc).map_err(|source| ManifestError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let io_err = |source| ManifestError::Io {
            path: self.path.clone(),
            source,
        };
        // Dropping the temp file on any early return deletes it.
        let mut tmp = tempfile::Builder::new()
            .prefix(".manifest-")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(io_err)?;
        tmp.write_all(&body).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path)
            .map_err(|e| ManifestError::Persist {
                path: self.path.clone(),
                source: e.error,
            })?;

        tracing::debug!(
            path = %self.path.display(),
            files = self.get_file_count(),
            chunks = self.get_chunk_count(),
            "manifest saved"
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.doc.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.doc.updated_at
    }

    /// Insert or replace the entry for a file.
    pub fn add_file(&mut self, source: &str, path: &str, entry: FileEntry) {
        self.doc
            .sources
            .entry(source.to_string())
            .or_default()
            .files
            .insert(path.to_string(), entry);
    }

    pub fn get_file(&self, source: &str, path: &str) -> Option<&FileEntry> {
        self.doc.sources.get(source)?.files.get(path)
    }

    /// Remove and return a file's entry.
    ///
    /// The caller is responsible for deleting the returned chunk IDs from
    /// the vector store.
    pub fn remove_file(&mut self, source: &str, path: &str) -> Option<FileEntry> {
        let files = &mut self.doc.sources.get_mut(source)?.files;
        let removed = files.remove(path);
        if files.is_empty() {
            self.doc.sources.remove(source);
        }
        removed
    }

    /// All entries, ordered by source then path.
    pub fn get_all_files(&self) -> Vec<FileRef<'_>> {
        self.doc
            .sources
            .iter()
            .flat_map(|(source, files)| {
                files.files.iter().map(move |(path, entry)| FileRef {
                    source,
                    path,
                    entry,
                })
            })
            .collect()
    }

    /// Relative paths recorded for one source.
    pub fn source_paths(&self, source: &str) -> Vec<String> {
        self.doc
            .sources
            .get(source)
            .map(|s| s.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.doc.sources.keys().map(String::as_str).collect()
    }

    pub fn get_all_chunk_ids(&self) -> Vec<&str> {
        self.doc
            .sources
            .values()
            .flat_map(|s| s.files.values())
            .flat_map(|e| e.chunk_ids.iter().map(String::as_str))
            .collect()
    }

    pub fn get_file_count(&self) -> usize {
        self.doc.sources.values().map(|s| s.files.len()).sum()
    }

    pub fn get_chunk_count(&self) -> usize {
        self.doc
            .sources
            .values()
            .flat_map(|s| s.files.values())
            .map(|e| e.chunk_ids.len())
            .sum()
    }
}
