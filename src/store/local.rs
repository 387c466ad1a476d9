//! File-backed [`VectorStore`] living inside the index directory.
//!
//! Records are held in memory and written as one JSON document on
//! [`flush`](VectorStore::flush), using the same temp-file-and-rename
//! pattern as the manifest. Suitable for small and medium corpora; larger
//! deployments plug a real vector database in behind the same trait.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::Chunk;

use super::{check_lengths, VectorStore};

/// File name of the store inside the index directory.
pub const STORE_FILE: &str = "vectors.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalRecord {
    vector: Vec<f32>,
    chunk: Chunk,
}

#[derive(Default)]
struct State {
    records: BTreeMap<String, LocalRecord>,
    dirty: bool,
}

pub struct LocalVectorStore {
    path: PathBuf,
    state: Mutex<State>,
}

impl LocalVectorStore {
    /// Open the store in `index_dir`, loading any records already on disk.
    pub fn open(index_dir: &Path) -> Result<Self> {
        let path = index_dir.join(STORE_FILE);
        let records = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse vector store: {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read vector store: {}", path.display()))
            }
        };
        Ok(Self {
            path,
            state: Mutex::new(State {
                records,
                dirty: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| anyhow!("vector store lock poisoned"))
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn upsert_many(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        chunks: &[Chunk],
    ) -> Result<()> {
        check_lengths(ids, vectors, chunks)?;
        let mut state = self.lock()?;
        for ((id, vector), chunk) in ids.iter().zip(vectors).zip(chunks) {
            state.records.insert(
                id.clone(),
                LocalRecord {
                    vector: vector.clone(),
                    chunk: chunk.clone(),
                },
            );
        }
        state.dirty = true;
        Ok(())
    }

    async fn delete_many(&self, ids: &[String]) -> Result<()> {
        let mut state = self.lock()?;
        for id in ids {
            if state.records.remove(id).is_some() {
                state.dirty = true;
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut state = self.lock()?;
        if !state.dirty {
            return Ok(());
        }
        let dir = self
            .path
            .parent()
            .ok_or_else(|| anyhow!("vector store path has no parent: {}", self.path.display()))?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let body = serde_json::to_vec(&state.records)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".vectors-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to persist vector store: {}", self.path.display()))?;
        state.dirty = false;
        Ok(())
    }
}
