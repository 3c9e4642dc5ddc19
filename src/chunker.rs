//! Splitting per-page text into overlapping retrievable passages.
//!
//! Chunks are produced in page order, then offset order. That ordering is
//! the implicit row index into the vector index, so it must be stable:
//! identical input text and parameters always yield identical boundaries.

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    ingest::PageText,
};

/// A retrievable unit: a contiguous, offset-tagged slice of a page's text.
///
/// `start_pos`/`end_pos` are character offsets into the page's extracted
/// text; `text` is the window content with surrounding whitespace trimmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub page: u32,
    pub start_pos: usize,
    pub end_pos: usize,
}

/// Split pages into overlapping chunks.
///
/// Walks a sliding window `[start, start + chunk_size)` over each page,
/// advancing by `chunk_size - overlap`. Windows that trim to empty produce
/// no chunk but the walk still advances. `overlap >= chunk_size` is a
/// configuration error (the step would be non-positive).
pub fn chunk_pages(pages: &[PageText], chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    if chunk_size == 0 {
        return Err(Error::Config("chunk_size must be positive".into()));
    }
    if overlap >= chunk_size {
        return Err(Error::Config(format!(
            "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
        )));
    }

    let step = chunk_size - overlap;
    let mut chunks = Vec::new();

    for page in pages {
        // Map char offsets to byte offsets once so windows stay UTF-8 safe.
        let char_to_byte: Vec<usize> = page
            .text
            .char_indices()
            .map(|(byte_idx, _)| byte_idx)
            .chain(std::iter::once(page.text.len()))
            .collect();
        let char_count = char_to_byte.len() - 1;

        let mut start = 0;
        while start < char_count {
            let end = (start + chunk_size).min(char_count);
            let window = &page.text[char_to_byte[start]..char_to_byte[end]];

            let trimmed = window.trim();
            if !trimmed.is_empty() {
                chunks.push(Chunk {
                    text: trimmed.to_string(),
                    page: page.page,
                    start_pos: start,
                    end_pos: end,
                });
            }

            start += step;
        }
    }

    Ok(chunks)
}
