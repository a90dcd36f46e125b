use crate::error::{Result, VectorStoreError};

/// Approximate nearest-neighbour index over int8 scalar-quantized vectors.
///
/// Each vector is stored as `i8` codes plus one scale factor, so scores are close to but not
/// exactly the true cosine; callers re-rank candidates against the exact embeddings.
pub struct QuantizedIndex {
    dimension: usize,
    codes: Vec<i8>,
    scales: Vec<f32>,
    norms: Vec<f32>,
}

impl QuantizedIndex {
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self {
            dimension,
            codes: Vec::new(),
            scales: Vec::new(),
            norms: Vec::new(),
        }
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Add a vector; ids are assigned sequentially from zero.
    pub fn add(&mut self, vector: &[f32]) -> Result<usize> {
        if vector.len() != self.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let max_abs = vector.iter().fold(0.0_f32, |acc, v| acc.max(v.abs()));
        let scale = if max_abs > 0.0 { max_abs / 127.0 } else { 0.0 };
        let mut norm_sq = 0.0_f32;
        for &value in vector {
            #[allow(clippy::cast_possible_truncation)]
            let code = if scale > 0.0 {
                (value / scale).round().clamp(-127.0, 127.0) as i8
            } else {
                0
            };
            let restored = f32::from(code) * scale;
            norm_sq += restored * restored;
            self.codes.push(code);
        }

        let id = self.scales.len();
        self.scales.push(scale);
        self.norms.push(norm_sq.sqrt());
        Ok(id)
    }

    /// Search for k nearest neighbors by approximate cosine similarity.
    /// Returns (id, score) sorted by score descending; equal scores keep id order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query_norm = query.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mut scores: Vec<(usize, f32)> = (0..self.len())
            .map(|id| (id, self.approximate_cosine(id, query, query_norm)))
            .collect();

        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(k);

        Ok(scores)
    }

    fn approximate_cosine(&self, id: usize, query: &[f32], query_norm: f32) -> f32 {
        let norm = self.norms[id];
        if norm == 0.0 || query_norm == 0.0 {
            return 0.0;
        }
        let start = id * self.dimension;
        let codes = &self.codes[start..start + self.dimension];
        let scale = self.scales[id];
        let dot: f32 = codes
            .iter()
            .zip(query)
            .map(|(code, q)| f32::from(*code) * scale * q)
            .sum();
        dot / (norm * query_norm)
    }

    /// Get number of vectors in index
    #[must_use]
    pub fn len(&self) -> usize {
        self.scales.len()
    }

    /// Check if index is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scales.is_empty()
    }
}
