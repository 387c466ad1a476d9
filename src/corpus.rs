//! Filesystem corpus walk.
//!
//! Each configured source is a root directory scanned recursively. Files
//! with a supported extension become [`CorpusFile`]s keyed by a
//! `/`-separated path relative to the root; everything else is only
//! counted. A missing root is a run-level error: an unmounted share must
//! never look like a corpus whose files were all deleted.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::SourceConfig;
use crate::error::IndexError;
use crate::extract;

/// Always excluded: VCS metadata, Office lock files, Finder droppings.
pub const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/~$*", "**/.DS_Store"];

/// A supported document found under a source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusFile {
    pub source: String,
    /// Path relative to the source root, `/`-separated.
    pub relative_path: String,
    pub path: PathBuf,
}

impl CorpusFile {
    /// `<source>/<relative path>`, the label chunk IDs are derived from.
    pub fn source_file(&self) -> String {
        format!("{}/{}", self.source, self.relative_path)
    }
}

/// Result of scanning one source.
#[derive(Debug, Default)]
pub struct SourceScan {
    pub source: String,
    /// Supported files, sorted by relative path.
    pub files: Vec<CorpusFile>,
    /// Regular files skipped for their extension.
    pub unsupported: usize,
}

pub fn scan_source(name: &str, config: &SourceConfig) -> Result<SourceScan, IndexError> {
    let root = &config.root;
    if !root.is_dir() {
        return Err(IndexError::MissingRoot {
            source_name: name.to_string(),
            root: root.clone(),
        });
    }

    let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    patterns.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&patterns)?;

    let mut scan = SourceScan {
        source: name.to_string(),
        ..SourceScan::default()
    };

    let walker = WalkDir::new(root)
        .follow_links(config.follow_symlinks)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|source| IndexError::Walk {
            root: root.clone(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let rel_str = relative_key(path, root);

        if exclude_set.is_match(&rel_str) {
            continue;
        }

        if !extract::is_supported(path) {
            tracing::debug!(source = name, path = %rel_str, "unsupported file type");
            scan.unsupported += 1;
            continue;
        }

        scan.files.push(CorpusFile {
            source: name.to_string(),
            relative_path: rel_str,
            path: path.to_path_buf(),
        });
    }

    // Sort for deterministic ordering
    scan.files
        .sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    Ok(scan)
}

/// Relative path with `/` separators regardless of platform.
fn relative_key(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, IndexError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
