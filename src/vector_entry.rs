use crate::config::Number;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Metadata = BTreeMap<String, String>;

pub type EmbeddingVector = Vec<Number>;

/// A bounded span of text cut from one document unit.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    /// Inherited from the owning unit (`source`, `page`, ...).
    pub metadata: Metadata,
    /// Position of this chunk within its unit.
    pub sequence_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub vector: EmbeddingVector,
    pub chunk: Chunk,
}

impl IndexEntry {
    pub fn new(vector: EmbeddingVector, chunk: Chunk) -> Self {
        Self { vector, chunk }
    }
}
