//! TOML configuration.
//!
//! ```toml
//! [index]
//! dir = "./data/index"
//!
//! [chunking]
//! max_chunk_chars = 4000
//! min_chunk_chars = 100
//! overlap_chars = 200
//!
//! [backup]
//! max_backups = 5
//!
//! [embedding]
//! provider = "disabled"
//!
//! [sources.drawings]
//! root = "/srv/projects/tower-b/drawings"
//! ```

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::backup::BackupConfig;
use crate::chunk::ChunkerConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkerConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Persisted index directory. Holds the manifest and the local vector store.
    pub dir: PathBuf,
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
    /// Processed files between manifest checkpoints; 0 saves only at the end.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
}

fn default_manifest_file() -> String {
    "manifest.json".to_string()
}
fn default_checkpoint_every() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// One named corpus root.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Config {
    pub fn manifest_path(&self) -> PathBuf {
        self.index.dir.join(&self.index.manifest_file)
    }

    /// `[backup].dir`, or `<index dir>.backups` beside the index directory.
    pub fn backup_dir(&self) -> PathBuf {
        if let Some(dir) = &self.backup.dir {
            return dir.clone();
        }
        let name = self
            .index
            .dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "index".to_string());
        self.index.dir.with_file_name(format!("{}.backups", name))
    }

    pub fn from_toml_str(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.chunking
            .validate()
            .map_err(|e| anyhow::anyhow!("chunking: {}", e))?;

        if self.index.manifest_file.is_empty() || self.index.manifest_file.contains(['/', '\\']) {
            anyhow::bail!("index.manifest_file must be a plain file name");
        }

        if self.backup.max_backups == 0 {
            anyhow::bail!("backup.max_backups must be >= 1");
        }
        if normalize(&self.backup_dir()).starts_with(normalize(&self.index.dir)) {
            anyhow::bail!("backup.dir must not live inside index.dir");
        }

        if self.sources.is_empty() {
            anyhow::bail!("at least one [sources.<name>] section is required");
        }

        if self.embedding.is_enabled() {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }
        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }

        Ok(())
    }
}

/// Absolute form of `path` with `.` and `..` folded away lexically.
fn normalize(path: &Path) -> PathBuf {
    let joined = if path.is_relative() {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    } else {
        path.to_path_buf()
    };
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Config::from_toml_str(&content)
}
