//! Lexical overlap scoring over chunk text.
//!
//! Deliberately simple: lower-cased whitespace tokens treated as sets, score
//! is the fraction of query terms present in the chunk. Recall-oriented, not
//! TF-IDF. The output order is input order; callers sort.

use std::collections::HashSet;

use crate::chunker::Chunk;

fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Score chunks by query-term overlap.
///
/// Returns `(chunk_index, score)` pairs with `score = |query ∩ chunk| / |query|`.
/// Chunks with zero overlap are excluded, not scored zero.
pub fn score(query: &str, chunks: &[Chunk]) -> Vec<(usize, f32)> {
    let query_terms = tokens(query);
    if query_terms.is_empty() {
        return Vec::new();
    }

    chunks
        .iter()
        .enumerate()
        .filter_map(|(idx, chunk)| {
            let chunk_terms = tokens(&chunk.text);
            let matches = query_terms.intersection(&chunk_terms).count();
            if matches > 0 {
                Some((idx, matches as f32 / query_terms.len() as f32))
            } else {
                None
            }
        })
        .collect()
}
