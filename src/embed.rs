//! Embedding gateway: a call boundary between the engine and an injected
//! embedding capability.
//!
//! The gateway batches texts for throughput and may run batches in parallel,
//! but results are always reassembled in submission order so vector-index
//! rows stay aligned with the chunk list. Any failure in any batch fails the
//! whole call; the engine never persists a partially embedded index.

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Arc,
};

use rayon::prelude::*;

use crate::error::{Error, Result};

/// An injected embedding capability: text in, fixed-length float vectors out.
///
/// Implementations must preserve input order and produce one vector per
/// input, all of the same dimension for the lifetime of an index.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Batches texts through an [`Embedder`] and validates the results.
pub struct EmbeddingGateway {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl EmbeddingGateway {
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed all texts, dispatching batches in parallel.
    ///
    /// `par_chunks` keeps batch outputs in submission order regardless of
    /// completion order, which is what keeps row alignment deterministic.
    pub fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<Vec<Vec<f32>>> = texts
            .par_chunks(self.batch_size)
            .map(|batch| {
                let vectors = self.embedder.embed(batch)?;
                if vectors.len() != batch.len() {
                    return Err(Error::EmbeddingBatch(format!(
                        "embedder returned {} vectors for {} texts",
                        vectors.len(),
                        batch.len()
                    )));
                }
                Ok(vectors)
            })
            .collect::<Result<Vec<_>>>()?;

        let vectors: Vec<Vec<f32>> = batches.into_iter().flatten().collect();

        let dimension = vectors[0].len();
        if dimension == 0 {
            return Err(Error::EmbeddingBatch("embedder returned empty vectors".into()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(Error::EmbeddingBatch(format!(
                "inconsistent embedding dimensions: expected {dimension}, got {}",
                bad.len()
            )));
        }

        Ok(vectors)
    }

    /// Embed a single query string.
    pub fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embedder.embed(&[text.to_string()])?;
        match vectors.len() {
            1 => Ok(vectors.remove(0)),
            n => Err(Error::EmbeddingBatch(format!(
                "embedder returned {n} vectors for a single text"
            ))),
        }
    }
}

impl std::fmt::Debug for EmbeddingGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingGateway")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

/// Deterministic bag-of-hashed-tokens embedder.
///
/// Projects each whitespace token onto a fixed-size vector by hashing, then
/// L2-normalizes. No model weights, no I/O; meant for tests and offline
/// smoke runs. Production deployments inject a real model behind
/// [`Embedder`] instead.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let h = hasher.finish();
            let slot = (h % self.dimension as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
