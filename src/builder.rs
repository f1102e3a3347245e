use serde::Serialize;
use std::path::Path;
use std::time::Instant;

use crate::chunker::TextChunker;
use crate::embedder::Embedder;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::loader::{AutoLoader, DocumentLoader};
use crate::vector_entry::IndexEntry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub units: usize,
    pub chunks: usize,
    pub dimensions: usize,
}

/// Runs load, split, embed, build and save in order. Nothing is written to
/// `index_path` unless every earlier stage succeeded.
pub struct IndexBuilder<'a> {
    embedder: &'a dyn Embedder,
    loader: Box<dyn DocumentLoader + 'a>,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(embedder: &'a dyn Embedder) -> Self {
        Self {
            embedder,
            loader: Box::new(AutoLoader),
        }
    }

    pub fn with_loader(mut self, loader: impl DocumentLoader + 'a) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn build_index(
        &self,
        document_path: &Path,
        index_path: &Path,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<BuildReport> {
        let chunker = TextChunker::new(chunk_size, overlap)?;
        let start = Instant::now();

        let units = self.loader.load(document_path)?;
        log::info!("Loaded {} document unit(s) from '{}'", units.len(), document_path.display());

        let chunks = chunker.split(&units);
        log::info!(
            "Split into {} chunks (chunk_size={}, overlap={})",
            chunks.len(),
            chunk_size,
            overlap
        );

        let embed_start = Instant::now();
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_many(&texts)?;
        log::debug!("Embedded {} chunks in {:?}", texts.len(), embed_start.elapsed());

        let entries: Vec<IndexEntry> = vectors
            .into_iter()
            .zip(chunks)
            .map(|(vector, chunk)| IndexEntry::new(vector, chunk))
            .collect();
        let fingerprint = self.embedder.fingerprint();
        let index = VectorIndex::build(entries)?.with_embedder(&fingerprint)?;

        index.save(index_path)?;
        log::debug!("Index build finished in {:?}", start.elapsed());

        Ok(BuildReport {
            units: units.len(),
            chunks: index.len(),
            dimensions: index.dimensions(),
        })
    }
}
