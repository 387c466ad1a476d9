//! # siteindex
//!
//! Incremental document indexing for construction-project folders.
//!
//! siteindex keeps a vector-embedding index in step with folders of PDF,
//! DOCX, XLSX, PPTX and TXT documents without rebuilding it on every run.
//! Each file's content is fingerprinted; only files whose bytes changed are
//! re-chunked and re-embedded, and files that disappeared from a full scan
//! have their chunks removed. A rotating backup of the index directory is
//! taken before every full run.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────┐   ┌───────────┐
//! │  Corpus  │──▶│ Extract  │──▶│ Chunker │──▶│ Embedder  │
//! │  walk    │   │ pdf/ooxml│   │         │   │           │
//! └────┬─────┘   └──────────┘   └─────────┘   └─────┬─────┘
//!      │ fingerprint                                 ▼
//!      ▼                                       ┌───────────┐
//! ┌──────────┐  chunk ids per file             │  Vector   │
//! │ Manifest │◀───────────────────────────────▶│  store    │
//! └──────────┘                                 └───────────┘
//!      ▲ snapshot before full runs
//! ┌──────────┐
//! │  Backup  │
//! └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! siteindex index                     # full incremental run
//! siteindex index --limit 20          # partial run, never deletes
//! siteindex status                    # per-source counts
//! siteindex backup list
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`chunk`] | Bounded, sentence-aware chunking with overlap |
//! | [`fingerprint`] | Content hashing |
//! | [`manifest`] | Ledger of indexed files and their chunk IDs |
//! | [`backup`] | Rotating tar.gz snapshots of the index directory |
//! | [`corpus`] | Filesystem walk per source |
//! | [`extract`] | Document text extraction |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store abstraction and backends |
//! | [`builder`] | Incremental build orchestration |
//! | [`status`] | Index status overview |

pub mod backup;
pub mod builder;
pub mod chunk;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod manifest;
pub mod models;
pub mod status;
pub mod store;
