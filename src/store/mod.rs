//! Vector store abstraction.
//!
//! The indexing engine only ever writes to the vector store: it upserts
//! chunk vectors with their metadata and deletes chunk IDs the manifest
//! says are gone. It never reads the store back, so any backend that can
//! do those two things (and optionally flush) plugs in here.
//!
//! | Backend | Purpose |
//! |---------|---------|
//! | [`InMemoryVectorStore`](memory::InMemoryVectorStore) | Tests and dry experiments |
//! | [`LocalVectorStore`](local::LocalVectorStore) | JSON file inside the index directory |

pub mod local;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Chunk;

pub use local::LocalVectorStore;
pub use memory::InMemoryVectorStore;

/// Write-only capability over an embedding store.
///
/// Implementations must be `Send + Sync` to work with async runtimes.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite one record per ID.
    ///
    /// `ids`, `vectors` and `chunks` are parallel slices of equal length.
    /// A zero-length vector means embeddings are disabled for this index.
    async fn upsert_many(&self, ids: &[String], vectors: &[Vec<f32>], chunks: &[Chunk])
        -> Result<()>;

    /// Delete records by ID. Unknown IDs are ignored.
    async fn delete_many(&self, ids: &[String]) -> Result<()>;

    /// Make all prior writes durable. Called before every manifest save.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

pub(crate) fn check_lengths(ids: &[String], vectors: &[Vec<f32>], chunks: &[Chunk]) -> Result<()> {
    if ids.len() != vectors.len() || ids.len() != chunks.len() {
        anyhow::bail!(
            "upsert_many length mismatch: {} ids, {} vectors, {} chunks",
            ids.len(),
            vectors.len(),
            chunks.len()
        );
    }
    Ok(())
}
