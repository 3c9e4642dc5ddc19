//! Engine tuning knobs.
//!
//! Every field has a sensible default and can be overridden through
//! `MANUALRAG_*` environment variables, so deployments can tune chunking
//! and ranking without recompiling.

use std::str::FromStr;

use crate::error::{Error, Result};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between adjacent chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Default number of results returned by a query.
pub const DEFAULT_TOP_K: usize = 10;

/// Default minimum similarity for semantic results.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;

/// Default multiplier applied to keyword-only scores during hybrid fusion.
pub const DEFAULT_KEYWORD_WEIGHT: f32 = 0.7;

/// Default over-fetch multiplier for the two hybrid sub-rankers.
pub const DEFAULT_OVERFETCH_FACTOR: usize = 2;

/// Default number of texts per embedding batch.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

/// Retrieval engine configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters. Must be smaller
    /// than `chunk_size`.
    pub chunk_overlap: usize,
    /// Number of results returned by a query.
    pub top_k: usize,
    /// Minimum similarity for semantic results; anything below is dropped.
    pub similarity_threshold: f32,
    /// Multiplier applied to keyword-only scores during hybrid fusion.
    pub keyword_weight: f32,
    /// Each hybrid sub-ranker fetches `overfetch_factor * top_k` candidates
    /// before fusion.
    pub overfetch_factor: usize,
    /// Number of texts per embedding batch.
    pub embed_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            keyword_weight: DEFAULT_KEYWORD_WEIGHT,
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }
}

fn env_override<T: FromStr>(var: &str, current: T) -> Result<T> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("invalid value for {var}: {raw:?}"))),
        Err(_) => Ok(current),
    }
}

impl EngineConfig {
    /// Build a config from defaults plus `MANUALRAG_*` environment overrides.
    ///
    /// The result is validated; an unparsable variable or an inconsistent
    /// combination (e.g. overlap >= chunk size) fails before any I/O happens.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            chunk_size: env_override("MANUALRAG_CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: env_override("MANUALRAG_CHUNK_OVERLAP", defaults.chunk_overlap)?,
            top_k: env_override("MANUALRAG_TOP_K", defaults.top_k)?,
            similarity_threshold: env_override(
                "MANUALRAG_SIMILARITY_THRESHOLD",
                defaults.similarity_threshold,
            )?,
            keyword_weight: env_override("MANUALRAG_KEYWORD_WEIGHT", defaults.keyword_weight)?,
            overfetch_factor: env_override(
                "MANUALRAG_OVERFETCH_FACTOR",
                defaults.overfetch_factor,
            )?,
            embed_batch_size: env_override(
                "MANUALRAG_EMBED_BATCH_SIZE",
                defaults.embed_batch_size,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    ///
    /// Rejecting `chunk_overlap >= chunk_size` here is load-bearing: the
    /// chunker's window step is `chunk_size - chunk_overlap`, and a
    /// non-positive step would never terminate.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.overfetch_factor == 0 {
            return Err(Error::Config("overfetch_factor must be positive".into()));
        }
        if self.embed_batch_size == 0 {
            return Err(Error::Config("embed_batch_size must be positive".into()));
        }
        if !self.similarity_threshold.is_finite() || self.similarity_threshold < 0.0 {
            return Err(Error::Config(format!(
                "similarity_threshold must be a non-negative number, got {}",
                self.similarity_threshold
            )));
        }
        if !self.keyword_weight.is_finite() || self.keyword_weight <= 0.0 {
            return Err(Error::Config(format!(
                "keyword_weight must be a positive number, got {}",
                self.keyword_weight
            )));
        }
        Ok(())
    }
}
