//! Query-time ranking: semantic, keyword, and hybrid fusion.
//!
//! Hybrid fusion over-fetches from both sub-rankers before merging because
//! neither is reliable alone: vector search misses exact jargon (part
//! numbers, acronyms), keyword search misses paraphrase. Semantic evidence
//! is authoritative when both paths find the same passage.

use std::collections::BTreeMap;

use tracing::warn;

use crate::{
    chunker::Chunk,
    config::EngineConfig,
    embed::EmbeddingGateway,
    error::{Error, Result},
    keyword,
    vector_index::{FlatIndex, similarity_from_distance},
};

/// Which sub-ranker produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Semantic,
    Keyword,
}

/// A ranked passage. Transient; never persisted.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchResult {
    pub text: String,
    pub page: u32,
    pub similarity: f32,
    pub kind: SearchKind,
}

/// Dedup key: page number plus the first 100 characters of the passage.
/// Two results with the same key are "the same passage" even if both
/// sub-rankers produced them.
fn dedup_key(result: &SearchResult) -> (u32, String) {
    (result.page, result.text.chars().take(100).collect())
}

/// Similarity descending, then page ascending, then text ascending. The
/// trailing keys make the order total, so exact score ties (common with
/// keyword scores, which are small rationals) rank reproducibly.
fn sort_descending(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.page.cmp(&b.page))
            .then_with(|| a.text.cmp(&b.text))
    });
}

/// Nearest-neighbor search over the vector index, thresholded.
///
/// Returns at most `top_k` results whose similarity clears `threshold`.
/// An empty result list is a normal response; an unbuilt index is
/// [`Error::NotReady`].
pub fn search_semantic(
    index: &FlatIndex,
    chunks: &[Chunk],
    gateway: &EmbeddingGateway,
    query: &str,
    top_k: usize,
    threshold: f32,
) -> Result<Vec<SearchResult>> {
    if chunks.is_empty() {
        return Err(Error::NotReady);
    }

    let query_vector = gateway.embed_one(query)?;
    let hits = index.search(&query_vector, top_k)?;

    Ok(hits
        .into_iter()
        .filter_map(|(row, distance)| {
            let similarity = similarity_from_distance(distance);
            if similarity < threshold {
                return None;
            }
            chunks.get(row).map(|chunk| SearchResult {
                text: chunk.text.clone(),
                page: chunk.page,
                similarity,
                kind: SearchKind::Semantic,
            })
        })
        .collect())
}

/// Lexical overlap search over the chunk list.
pub fn search_keyword(chunks: &[Chunk], query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
    if chunks.is_empty() {
        return Err(Error::NotReady);
    }

    let mut results: Vec<SearchResult> = keyword::score(query, chunks)
        .into_iter()
        .map(|(idx, score)| SearchResult {
            text: chunks[idx].text.clone(),
            page: chunks[idx].page,
            similarity: score,
            kind: SearchKind::Keyword,
        })
        .collect();

    sort_descending(&mut results);
    results.truncate(top_k);
    Ok(results)
}

/// Fused search: over-fetch both sub-rankers, deduplicate, re-rank.
///
/// Merge policy: a semantic result always wins a key collision against a
/// keyword result. Keyword-only results carry `keyword_weight` times their
/// raw overlap score; when two keyword results collide, the higher
/// down-weighted score survives. If one sub-ranker fails the other's
/// results are still returned; partial evidence beats none at query time.
pub fn search_hybrid(
    index: &FlatIndex,
    chunks: &[Chunk],
    gateway: &EmbeddingGateway,
    config: &EngineConfig,
    query: &str,
    top_k: usize,
) -> Result<Vec<SearchResult>> {
    let fetch = top_k.saturating_mul(config.overfetch_factor).max(top_k);

    let semantic = search_semantic(
        index,
        chunks,
        gateway,
        query,
        fetch,
        config.similarity_threshold,
    );
    let keyword = search_keyword(chunks, query, fetch);

    let (semantic, keyword) = match (semantic, keyword) {
        (Ok(s), Ok(k)) => (s, k),
        (Ok(s), Err(e)) => {
            warn!(error = %e, "keyword ranker failed, returning semantic results only");
            (s, Vec::new())
        }
        (Err(e), Ok(k)) => {
            warn!(error = %e, "semantic ranker failed, returning keyword results only");
            (Vec::new(), k)
        }
        (Err(e), Err(_)) => return Err(e),
    };

    // BTreeMap keeps merge iteration deterministic; the total sort key below
    // then fixes the final order regardless of which path inserted first.
    let mut merged: BTreeMap<(u32, String), SearchResult> = BTreeMap::new();

    for result in semantic {
        let key = dedup_key(&result);
        match merged.get(&key) {
            Some(existing) if existing.similarity >= result.similarity => {}
            _ => {
                merged.insert(key, result);
            }
        }
    }

    for mut result in keyword {
        result.similarity *= config.keyword_weight;
        let key = dedup_key(&result);
        match merged.get(&key) {
            // Semantic evidence is authoritative for the same passage.
            Some(existing) if existing.kind == SearchKind::Semantic => {}
            Some(existing) if existing.similarity >= result.similarity => {}
            _ => {
                merged.insert(key, result);
            }
        }
    }

    let mut results: Vec<SearchResult> = merged.into_values().collect();
    sort_descending(&mut results);
    results.truncate(top_k);
    Ok(results)
}
