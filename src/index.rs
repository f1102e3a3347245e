//! In-memory vector index.
//!
//! Vectors are L2-normalized on the way in and stored contiguously. Scoring
//! is cosine similarity; results are ordered by decreasing score with ties
//! resolved by insertion order.

use rayon::prelude::*;
use std::path::Path;

use crate::ann::RandomProjectionIndex;
use crate::config::{Number, SearchMethod};
use crate::embedder::EmbedderFingerprint;
use crate::error::{Error, Result};
use crate::persistence;
use crate::vector_entry::{Chunk, IndexEntry};
use crate::vector_ops::{compute_cosine_similarity_simd, normalize_vector};

pub(crate) fn is_finite(vector: &[Number]) -> bool {
    vector.iter().all(|x| x.is_finite())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Cosine,
}

impl Metric {
    pub(crate) fn code(self) -> u8 {
        match self {
            Metric::Cosine => 1,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Metric::Cosine),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: Number,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimensions: usize,
    metric: Metric,
    embedder_model: Option<String>,
    vectors: Vec<Number>,
    chunks: Vec<Chunk>,
    ann_index: Option<RandomProjectionIndex>,
}

impl VectorIndex {
    /// Builds an index in one pass. Every entry must have the same vector
    /// length as the first one.
    pub fn build(entries: Vec<IndexEntry>) -> Result<Self> {
        let dimensions = entries.first().map(|e| e.vector.len()).unwrap_or(0);

        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dimensions) {
            return Err(Error::DimensionMismatch {
                expected: dimensions,
                actual: bad.vector.len(),
            });
        }
        if let Some(position) = entries.iter().position(|e| !is_finite(&e.vector)) {
            return Err(Error::NonFiniteVector { position });
        }

        let mut vectors = Vec::with_capacity(entries.len() * dimensions);
        let mut chunks = Vec::with_capacity(entries.len());
        for IndexEntry { mut vector, chunk } in entries {
            normalize_vector(&mut vector);
            vectors.extend_from_slice(&vector);
            chunks.push(chunk);
        }

        log::debug!("Built index with {} entries of dimension {}", chunks.len(), dimensions);

        Ok(Self {
            dimensions,
            metric: Metric::Cosine,
            embedder_model: None,
            vectors,
            chunks,
            ann_index: None,
        })
    }

    pub(crate) fn from_parts(
        dimensions: usize,
        metric: Metric,
        embedder_model: Option<String>,
        vectors: Vec<Number>,
        chunks: Vec<Chunk>,
    ) -> Self {
        Self {
            dimensions,
            metric,
            embedder_model,
            vectors,
            chunks,
            ann_index: None,
        }
    }

    /// Records which embedder produced the vectors.
    pub fn with_embedder(mut self, fingerprint: &EmbedderFingerprint) -> Result<Self> {
        if self.is_empty() {
            self.dimensions = fingerprint.dimensions;
        } else if fingerprint.dimensions != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: fingerprint.dimensions,
            });
        }
        self.embedder_model = Some(fingerprint.model_name.clone());
        Ok(self)
    }

    /// Builds the random-projection table used by `ann` and `hybrid` search.
    pub fn with_ann(mut self) -> Self {
        let mut ann = RandomProjectionIndex::new(self.dimensions, self.len());
        for i in 0..self.len() {
            ann.add(self.vector(i), i);
        }
        self.ann_index = Some(ann);
        self
    }

    pub fn load(path: &Path) -> Result<Self> {
        persistence::load_index(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        persistence::save_index(self, path)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn embedder_model(&self) -> Option<&str> {
        self.embedder_model.as_deref()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub(crate) fn raw_vectors(&self) -> &[Number] {
        &self.vectors
    }

    pub fn vector(&self, i: usize) -> &[Number] {
        &self.vectors[i * self.dimensions..(i + 1) * self.dimensions]
    }

    /// Exact top-`k` search.
    pub fn search(&self, query_vector: &[Number], k: usize) -> Result<Vec<SearchHit>> {
        self.search_with(query_vector, k, SearchMethod::Exact)
    }

    pub fn search_with(
        &self,
        query_vector: &[Number],
        k: usize,
        method: SearchMethod,
    ) -> Result<Vec<SearchHit>> {
        if query_vector.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: query_vector.len(),
            });
        }
        if !is_finite(query_vector) {
            return Err(Error::NonFiniteVector { position: 0 });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = query_vector.to_vec();
        normalize_vector(&mut query);

        let scored = match (method, &self.ann_index) {
            (SearchMethod::Exact, _) | (_, None) => {
                if method != SearchMethod::Exact {
                    log::warn!("No ANN table built, falling back to exact search");
                }
                self.score((0..self.len()).collect(), &query)
            }
            (SearchMethod::Ann, Some(ann)) => self.score(ann.candidates(&query), &query),
            (SearchMethod::Hybrid, Some(ann)) => {
                let candidates = ann.candidates(&query);
                if candidates.len() < k {
                    log::debug!(
                        "ANN found {} candidates for k={}, performing exact search",
                        candidates.len(),
                        k
                    );
                    self.score((0..self.len()).collect(), &query)
                } else {
                    self.score(candidates, &query)
                }
            }
        };

        Ok(self.sort_and_limit_results(scored, k))
    }

    fn score(&self, positions: Vec<usize>, query: &[Number]) -> Vec<(Number, usize)> {
        positions
            .into_par_iter()
            .map(|i| {
                let similarity = compute_cosine_similarity_simd(query, self.vector(i)).unwrap_or(0.0);
                (similarity, i)
            })
            .collect()
    }

    fn sort_and_limit_results(&self, mut scored: Vec<(Number, usize)>, k: usize) -> Vec<SearchHit> {
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        scored.truncate(k);
        scored
            .into_iter()
            .map(|(score, i)| SearchHit {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_entry::Metadata;

    fn entry(text: &str, vector: Vec<Number>) -> IndexEntry {
        IndexEntry::new(
            vector,
            Chunk {
                text: text.to_string(),
                metadata: Metadata::new(),
                sequence_index: 0,
            },
        )
    }

    fn texts(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.chunk.text.as_str()).collect()
    }

    #[test]
    fn test_mismatched_dimensions_rejected() {
        let result = VectorIndex::build(vec![
            entry("a", vec![1.0, 0.0, 0.0]),
            entry("b", vec![1.0, 0.0]),
        ]);
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_non_finite_vectors_rejected() {
        let entries: Vec<IndexEntry> = (0..64)
            .map(|i| {
                let v = if i % 3 == 2 { vec![Number::NAN, 1.0] } else { vec![1.0, i as Number] };
                entry(&format!("e{}", i), v)
            })
            .collect();
        assert!(matches!(
            VectorIndex::build(entries),
            Err(Error::NonFiniteVector { position: 2 })
        ));

        let result = VectorIndex::build(vec![
            entry("a", vec![1.0, 0.0]),
            entry("b", vec![Number::INFINITY, 1.0]),
        ]);
        assert!(matches!(result, Err(Error::NonFiniteVector { position: 1 })));
    }

    #[test]
    fn test_nan_query_is_rejected_without_panicking() {
        let entries: Vec<IndexEntry> = (0..64)
            .map(|i| entry(&format!("e{}", i), vec![1.0, i as Number]))
            .collect();
        let index = VectorIndex::build(entries).unwrap();
        assert!(matches!(
            index.search(&[Number::NAN, 0.0], 64),
            Err(Error::NonFiniteVector { .. })
        ));
        assert_eq!(index.search(&[1.0, 0.0], 64).unwrap().len(), 64);
    }

    #[test]
    fn test_nan_scores_sort_totally() {
        let entries: Vec<IndexEntry> = (0..64)
            .map(|i| entry(&format!("e{}", i), vec![1.0, i as Number]))
            .collect();
        let index = VectorIndex::build(entries).unwrap();
        let scored: Vec<(Number, usize)> = (0..64)
            .map(|i| if i % 3 == 2 { (Number::NAN, i) } else { (i as Number / 64.0, i) })
            .collect();

        let hits = index.sort_and_limit_results(scored, 64);
        assert_eq!(hits.len(), 64);
        let finite: Vec<Number> = hits.iter().map(|h| h.score).filter(|s| s.is_finite()).collect();
        assert!(finite.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let index = VectorIndex::build(vec![
            entry("x", vec![1.0, 0.0]),
            entry("y", vec![0.0, 1.0]),
            entry("xy", vec![1.0, 1.0]),
        ])
        .unwrap();

        let hits = index.search(&[1.0, 0.1], 3).unwrap();
        assert_eq!(texts(&hits), vec!["x", "xy", "y"]);
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let index = VectorIndex::build(vec![
            entry("first", vec![0.0, 2.0]),
            entry("second", vec![0.0, 1.0]),
            entry("third", vec![0.0, 5.0]),
        ])
        .unwrap();
        let hits = index.search(&[0.0, 1.0], 2).unwrap();
        assert_eq!(texts(&hits), vec!["first", "second"]);
    }

    #[test]
    fn test_k_larger_than_len_returns_all() {
        let index = VectorIndex::build(vec![
            entry("a", vec![1.0, 0.0]),
            entry("b", vec![0.0, 1.0]),
        ])
        .unwrap();
        assert_eq!(index.search(&[0.0, 1.0], 10).unwrap().len(), 2);
        assert!(index.search(&[0.0, 1.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let index = VectorIndex::build(vec![entry("a", vec![1.0, 0.0])]).unwrap();
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0], 1),
            Err(Error::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_with_embedder_checks_dimensions() {
        let fingerprint = EmbedderFingerprint {
            model_name: "m".to_string(),
            dimensions: 4,
        };
        let index = VectorIndex::build(vec![entry("a", vec![1.0, 0.0])]).unwrap();
        assert!(matches!(
            index.with_embedder(&fingerprint),
            Err(Error::DimensionMismatch { .. })
        ));

        let empty = VectorIndex::build(Vec::new()).unwrap().with_embedder(&fingerprint).unwrap();
        assert_eq!(empty.dimensions(), 4);
        assert_eq!(empty.embedder_model(), Some("m"));
        assert!(empty.search(&[0.0; 4], 3).unwrap().is_empty());
    }

    #[test]
    fn test_ann_and_hybrid_agree_with_exact_on_top_hit() {
        let entries: Vec<IndexEntry> = (0..64)
            .map(|i| {
                let v = (0..16)
                    .map(|d| (((i * 31 + d * 17) % 23) as Number) - 11.0)
                    .collect();
                entry(&format!("e{}", i), v)
            })
            .collect();
        let query = entries[5].vector.clone();
        let index = VectorIndex::build(entries).unwrap().with_ann();

        let exact = index.search(&query, 1).unwrap();
        let ann = index.search_with(&query, 1, SearchMethod::Ann).unwrap();
        let hybrid = index.search_with(&query, 1, SearchMethod::Hybrid).unwrap();
        assert_eq!(texts(&exact), vec!["e5"]);
        assert_eq!(texts(&ann), vec!["e5"]);
        assert_eq!(texts(&hybrid), vec!["e5"]);
    }

    #[test]
    fn test_hybrid_falls_back_to_exact() {
        let index = VectorIndex::build(vec![
            entry("a", vec![1.0, 0.0]),
            entry("b", vec![-1.0, 0.0]),
        ])
        .unwrap()
        .with_ann();
        let hits = index.search_with(&[1.0, 0.0], 2, SearchMethod::Hybrid).unwrap();
        assert_eq!(hits.len(), 2);
    }
}
