//! Core data models used throughout siteindex.
//!
//! These types describe the extracted documents, chunks, and ledger entries
//! that flow through the indexing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Text produced by an extractor for one source document.
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    /// The full document text.
    pub text: String,
    /// Ordered page/section segments. Empty when the format has no
    /// natural segmentation; the chunker then treats `text` as page 1.
    pub pages: Vec<String>,
}

impl ExtractedDocument {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pages: Vec::new(),
        }
    }

    pub fn from_pages(pages: Vec<String>) -> Self {
        let text = pages.join("\n\n");
        Self { text, pages }
    }
}

/// A bounded span of document text with a deterministic identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    /// `<source>/<relative path>` of the originating file.
    pub source_file: String,
    pub chunk_index: usize,
    /// 1-based page or section the chunk starts in.
    pub page_number: usize,
    pub total_chunks: usize,
    /// Lower-case extension without the dot, e.g. `pdf`.
    pub file_type: String,
    /// Number of leading chars (overlap plus its separator) copied from the
    /// previous chunk's tail.
    #[serde(default)]
    pub overlap_chars: usize,
}

impl Chunk {
    /// Chunk text without the overlap prefix.
    pub fn body(&self) -> &str {
        if self.overlap_chars == 0 {
            return &self.text;
        }
        let start = self
            .text
            .char_indices()
            .nth(self.overlap_chars)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len());
        &self.text[start..]
    }
}

/// Ledger record for one indexed file version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub content_hash: String,
    pub file_size: u64,
    pub chunk_count: usize,
    pub chunk_ids: Vec<String>,
    pub indexed_at: DateTime<Utc>,
}

impl FileEntry {
    pub fn new(content_hash: String, file_size: u64, chunk_ids: Vec<String>) -> Self {
        Self {
            content_hash,
            file_size,
            chunk_count: chunk_ids.len(),
            chunk_ids,
            indexed_at: Utc::now(),
        }
    }
}
