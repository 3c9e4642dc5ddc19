//! Flat (brute-force) nearest-neighbor index over L2 distance.
//!
//! Rows are positional and permanent: row *i* corresponds to chunk *i* in
//! the chunk list, and a changed document requires a full rebuild. Distances
//! are squared Euclidean (the usual flat-index convention); only rank order
//! and the threshold cutoff matter downstream.

use crate::error::{Error, Result};

/// Convert an L2 distance into a similarity in `(0, 1]`.
///
/// Monotonic-decreasing in distance, so rank order is preserved. Not a
/// metric; used only for ordering and threshold filtering.
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

/// A flat vector index: contiguous f32 rows of one fixed dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index. A dimension of zero is allowed only for an
    /// index that will stay empty (e.g. a document with no text).
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Reassemble an index from persisted rows.
    pub fn from_rows(dimension: usize, data: Vec<f32>) -> Result<Self> {
        if dimension == 0 && !data.is_empty() {
            return Err(Error::Corruption(
                "vector data present but dimension is zero".into(),
            ));
        }
        if dimension != 0 && data.len() % dimension != 0 {
            return Err(Error::Corruption(format!(
                "vector data length {} is not a multiple of dimension {dimension}",
                data.len()
            )));
        }
        Ok(Self { dimension, data })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn row_count(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, index: usize) -> &[f32] {
        let start = index * self.dimension;
        &self.data[start..start + self.dimension]
    }

    /// Append rows in the order given.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for vector in vectors {
            if vector.len() != self.dimension || self.dimension == 0 {
                return Err(Error::Config(format!(
                    "cannot add vector of dimension {} to index of dimension {}",
                    vector.len(),
                    self.dimension
                )));
            }
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Return up to `k` `(row_index, distance)` pairs, ascending by distance.
    ///
    /// Searching an empty index is a "not ready" condition, distinct from a
    /// valid query that simply matches nothing.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if self.is_empty() {
            return Err(Error::NotReady);
        }
        if query.len() != self.dimension {
            return Err(Error::Config(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }

        let mut hits: Vec<(usize, f32)> = (0..self.row_count())
            .map(|i| {
                let distance = self
                    .row(i)
                    .iter()
                    .zip(query)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                (i, distance)
            })
            .collect();

        hits.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits.truncate(k);
        Ok(hits)
    }
}
