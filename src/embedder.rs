//! Text embedding.
//!
//! An [`Embedder`] is an explicit object handed to the build and query
//! pipelines by reference; there is no process-wide model state. The
//! shipped model, [`HashingEmbedder`], is a deterministic bag-of-words
//! random projection: every token is mapped to a fixed Gaussian direction
//! seeded from its SHA-256 digest, and a text's vector is the normalized sum
//! of its token directions. Texts sharing vocabulary land close together.

use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::config::Number;
use crate::error::{Error, Result};
use crate::vector_entry::EmbeddingVector;
use crate::vector_ops::normalize_vector;

pub const HASHING_MODEL_NAME: &str = "docvec-hashing-v1";

/// Identifies the embedder an index was built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedderFingerprint {
    pub model_name: String,
    pub dimensions: usize,
}

impl fmt::Display for EmbedderFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} dimensions)", self.model_name, self.dimensions)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedderConfig {
    pub model_name: String,
    pub dimensions: usize,
}

pub trait Embedder: Send + Sync {
    fn fingerprint(&self) -> EmbedderFingerprint;

    fn embed(&self, text: &str) -> Result<EmbeddingVector>;

    /// Embeds every text, returning vectors in input order.
    fn embed_many(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        texts.par_iter().map(|text| self.embed(text)).collect()
    }
}

pub fn from_config(config: &EmbedderConfig) -> Result<Box<dyn Embedder>> {
    match config.model_name.as_str() {
        HASHING_MODEL_NAME => Ok(Box::new(HashingEmbedder::new(config.dimensions)?)),
        other => Err(Error::Model(format!(
            "unknown embedding model '{}' (available: {})",
            other, HASHING_MODEL_NAME
        ))),
    }
}

pub struct HashingEmbedder {
    dimensions: usize,
    normal: Normal<Number>,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::Config("embedding dimensions must be greater than 0".to_string()));
        }
        let normal = Normal::new(0.0, 1.0).map_err(|e| Error::Model(e.to_string()))?;
        Ok(Self { dimensions, normal })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn token_seed(token: &str) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(HASHING_MODEL_NAME.as_bytes());
        hasher.update([0u8]);
        hasher.update(token.as_bytes());
        let digest = hasher.finalize();
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(seed)
    }

    fn accumulate_token(&self, token: &str, vector: &mut [Number]) {
        let mut rng = StdRng::seed_from_u64(Self::token_seed(token));
        for (slot, value) in vector.iter_mut().zip(self.normal.sample_iter(&mut rng)) {
            *slot += value;
        }
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
}

impl Embedder for HashingEmbedder {
    fn fingerprint(&self) -> EmbedderFingerprint {
        EmbedderFingerprint {
            model_name: HASHING_MODEL_NAME.to_string(),
            dimensions: self.dimensions,
        }
    }

    fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        let mut vector = vec![0.0; self.dimensions];
        for token in tokenize(text) {
            self.accumulate_token(&token, &mut vector);
        }
        normalize_vector(&mut vector);
        Ok(vector)
    }
}
