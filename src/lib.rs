//! Document indexing and retrieval.
//!
//! Build once with [`IndexBuilder`], query later (possibly from another
//! process) with [`QueryService`]. The only thing shared between the two is
//! the index file.

pub mod ann;
pub mod builder;
pub mod chunker;
pub mod config;
pub mod embedder;
pub mod error;
pub mod index;
pub mod loader;
pub mod persistence;
pub mod search;
pub mod vector_entry;
pub mod vector_ops;

pub use builder::{BuildReport, IndexBuilder};
pub use chunker::TextChunker;
pub use config::{SearchMethod, Settings};
pub use embedder::{Embedder, EmbedderConfig, EmbedderFingerprint, HashingEmbedder};
pub use error::{Error, Result};
pub use index::{Metric, SearchHit, VectorIndex};
pub use loader::{AutoLoader, DocumentLoader, DocumentUnit, PdfLoader, TextLoader};
pub use search::QueryService;
pub use vector_entry::{Chunk, EmbeddingVector, IndexEntry};
