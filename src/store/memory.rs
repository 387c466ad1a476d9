//! In-memory [`VectorStore`] implementation for tests.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Exposes read accessors so
//! tests can check the manifest against what the store actually holds.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::Chunk;

use super::{check_lengths, VectorStore};

#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    records: RwLock<HashMap<String, StoredRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> BTreeSet<String> {
        self.records
            .read()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<StoredRecord> {
        self.records.read().ok()?.get(id).cloned()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert_many(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        chunks: &[Chunk],
    ) -> Result<()> {
        check_lengths(ids, vectors, chunks)?;
        let mut records = self
            .records
            .write()
            .map_err(|_| anyhow!("store lock poisoned"))?;
        for ((id, vector), chunk) in ids.iter().zip(vectors).zip(chunks) {
            records.insert(
                id.clone(),
                StoredRecord {
                    vector: vector.clone(),
                    chunk: chunk.clone(),
                },
            );
        }
        Ok(())
    }

    async fn delete_many(&self, ids: &[String]) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| anyhow!("store lock poisoned"))?;
        for id in ids {
            records.remove(id);
        }
        Ok(())
    }
}
