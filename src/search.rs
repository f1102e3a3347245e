use std::path::Path;
use std::time::{Duration, Instant};

use crate::config::SearchMethod;
use crate::embedder::Embedder;
use crate::error::{Error, Result};
use crate::index::{SearchHit, VectorIndex};

#[derive(Debug, Default, Clone, Copy)]
pub struct SearchTimings {
    pub embed_duration: Duration,
    pub search_duration: Duration,
    pub total_duration: Duration,
}

/// Answers text queries against a persisted index.
///
/// The embedder must be the one the index was built with. When the index
/// records its embedder, `open` refuses a different model name or width.
pub struct QueryService<'a> {
    embedder: &'a dyn Embedder,
    index: VectorIndex,
}

impl<'a> QueryService<'a> {
    pub fn open(embedder: &'a dyn Embedder, index_path: &Path) -> Result<Self> {
        let index = VectorIndex::load(index_path)?;
        Self::new(embedder, index)
    }

    pub fn new(embedder: &'a dyn Embedder, index: VectorIndex) -> Result<Self> {
        let fingerprint = embedder.fingerprint();

        let model_differs = index
            .embedder_model()
            .map(|model| model != fingerprint.model_name)
            .unwrap_or(false);
        let width_differs = (index.embedder_model().is_some() || !index.is_empty())
            && index.dimensions() != fingerprint.dimensions;

        if model_differs || width_differs {
            return Err(Error::EmbedderMismatch {
                expected: format!(
                    "{} ({} dimensions)",
                    index.embedder_model().unwrap_or("unknown model"),
                    index.dimensions()
                ),
                actual: fingerprint.to_string(),
            });
        }

        Ok(Self { embedder, index })
    }

    /// Builds the random-projection table so `ann`/`hybrid` queries use it.
    pub fn with_ann(mut self) -> Self {
        self.index = self.index.with_ann();
        self
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn query(&self, query_text: &str, k: usize) -> Result<Vec<SearchHit>> {
        self.query_with(query_text, k, SearchMethod::Exact)
    }

    pub fn query_with(&self, query_text: &str, k: usize, method: SearchMethod) -> Result<Vec<SearchHit>> {
        self.query_timed(query_text, k, method).map(|(hits, _)| hits)
    }

    pub fn query_timed(
        &self,
        query_text: &str,
        k: usize,
        method: SearchMethod,
    ) -> Result<(Vec<SearchHit>, SearchTimings)> {
        if k == 0 {
            return Err(Error::Config("k must be greater than 0".to_string()));
        }

        let start = Instant::now();
        let query_vector = self.embedder.embed(query_text)?;
        let embed_duration = start.elapsed();

        let search_start = Instant::now();
        let hits = self.index.search_with(&query_vector, k, method)?;
        let search_duration = search_start.elapsed();

        let timings = SearchTimings {
            embed_duration,
            search_duration,
            total_duration: start.elapsed(),
        };
        log::debug!(
            "{} search over {} entries returned {} hits: {:?}",
            method,
            self.index.len(),
            hits.len(),
            timings
        );

        Ok((hits, timings))
    }
}

/// Loads the index at `index_path` and runs one exact query against it.
pub fn query(
    embedder: &dyn Embedder,
    index_path: &Path,
    query_text: &str,
    k: usize,
) -> Result<Vec<SearchHit>> {
    QueryService::open(embedder, index_path)?.query(query_text, k)
}
