use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::collections::{BTreeSet, HashMap};

use crate::config::Number;

const SEED: u64 = 42;
const MIN_PROJECTIONS: usize = 2;
const MAX_PROJECTIONS: usize = 16;
const MIN_TABLES: usize = 1;
const MAX_TABLES: usize = 8;

/// Sign-random-projection LSH over entry positions.
///
/// Seeded, so two tables built from the same vectors in the same order are
/// identical. Not persisted; rebuilt from stored vectors after a load.
#[derive(Debug, Clone)]
pub struct RandomProjectionIndex {
    random_vectors: Vec<Vec<Number>>,
    hash_tables: Vec<HashMap<u64, Vec<usize>>>,
    num_tables: usize,
    num_projections: usize,
}

impl RandomProjectionIndex {
    pub fn new(dim: usize, data_size: usize) -> Self {
        let (num_projections, num_tables) = Self::calculate_params(data_size);
        log::debug!(
            "Using {} projections and {} tables for {} vectors",
            num_projections,
            num_tables,
            data_size
        );

        let mut rng = StdRng::seed_from_u64(SEED);
        let normal = Normal::new(0.0, 1.0).unwrap();

        let random_vectors: Vec<Vec<Number>> = (0..num_tables * num_projections)
            .map(|_| normal.sample_iter(&mut rng).take(dim).collect())
            .collect();

        RandomProjectionIndex {
            random_vectors,
            hash_tables: vec![HashMap::new(); num_tables],
            num_tables,
            num_projections,
        }
    }

    fn calculate_params(data_size: usize) -> (usize, usize) {
        let log_size = (data_size.max(1) as f64).log2() as usize;
        let num_projections = (log_size + 2).clamp(MIN_PROJECTIONS, MAX_PROJECTIONS);
        let num_tables = (log_size / 2 + 2).clamp(MIN_TABLES, MAX_TABLES);
        (num_projections, num_tables)
    }

    fn hash_vector(&self, vector: &[Number], table_index: usize) -> u64 {
        let start = table_index * self.num_projections;
        let end = start + self.num_projections;

        self.random_vectors[start..end]
            .iter()
            .map(|rv| {
                rv.iter()
                    .zip(vector.iter())
                    .map(|(&a, &b)| a * b)
                    .sum::<Number>()
            })
            .enumerate()
            .fold(0u64, |acc, (i, proj)| if proj >= 0.0 { acc | (1 << i) } else { acc })
    }

    pub fn add(&mut self, vector: &[Number], id: usize) {
        for i in 0..self.num_tables {
            let hash = self.hash_vector(vector, i);
            self.hash_tables[i].entry(hash).or_default().push(id);
        }
    }

    /// Candidate ids from the query's bucket and every bucket one bit away,
    /// in ascending id order.
    pub fn candidates(&self, query: &[Number]) -> Vec<usize> {
        let mut candidates = BTreeSet::new();

        for (i, table) in self.hash_tables.iter().enumerate() {
            let query_hash = self.hash_vector(query, i);

            if let Some(bucket) = table.get(&query_hash) {
                candidates.extend(bucket.iter().copied());
            }

            for j in 0..self.num_projections {
                if let Some(bucket) = table.get(&(query_hash ^ (1 << j))) {
                    candidates.extend(bucket.iter().copied());
                }
            }
        }

        candidates.into_iter().collect()
    }
}
