//! Fixed-window text chunker with page provenance.
//!
//! Concatenates a document's page texts in page order, slides a
//! fixed-size character window across the concatenation, and records for
//! each window the set of original pages it overlaps. The page set is
//! what lets an answer cite "page 3 of report.pdf" even though retrieval
//! operates on windows, not pages.
//!
//! Page attribution rule: a page is covered by a window when their
//! half-open character intervals overlap at all (`page.start < w_end &&
//! page.end > w_start`). Containment is not required, so a page whose
//! text straddles a window boundary is attributed to both adjacent
//! chunks, and a window that falls strictly inside one long page is
//! attributed to that page. Pages with empty text (failed extraction)
//! contribute a zero-length interval and are never covered.

use crate::error::ChunkError;
use crate::models::{Chunk, Page};

/// Split a document's pages into overlapping chunks.
///
/// Windows are `window_size` characters long and advance by
/// `window_size - overlap` characters per step; the last window is
/// truncated at the end of the buffer, and no further window starts
/// once one has reached it. Offsets are character offsets into the
/// concatenated buffer, and `split_id`s are contiguous from 0.
///
/// Requires `window_size > overlap`, a non-empty page sequence, and all
/// pages from the same source. A document whose pages are all empty
/// produces no chunks.
pub fn chunk_pages(
    pages: &[Page],
    window_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ChunkError> {
    if window_size <= overlap {
        return Err(ChunkError::WindowNotLargerThanOverlap {
            window: window_size,
            overlap,
        });
    }
    let source = match pages.first() {
        Some(p) => p.source.clone(),
        None => return Err(ChunkError::NoPages),
    };
    if let Some(other) = pages.iter().find(|p| p.source != source) {
        return Err(ChunkError::MixedSources {
            expected: source,
            found: other.source.clone(),
        });
    }

    // Concatenate page texts, recording each page's [start, end) character
    // interval as the offsets accumulate.
    let mut buffer: Vec<char> = Vec::new();
    let mut intervals: Vec<(u32, usize, usize)> = Vec::with_capacity(pages.len());
    for page in pages {
        let start = buffer.len();
        buffer.extend(page.text.chars());
        intervals.push((page.page_number, start, buffer.len()));
    }

    let total = buffer.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let stride = window_size - overlap;
    let mut chunks = Vec::new();
    let mut w_start = 0usize;

    loop {
        let w_end = (w_start + window_size).min(total);

        let page_indices: Vec<u32> = intervals
            .iter()
            .filter(|(_, p_start, p_end)| {
                // Zero-length intervals (empty pages) never overlap.
                p_start < p_end && *p_start < w_end && *p_end > w_start
            })
            .map(|(page_number, _, _)| *page_number)
            .collect();

        chunks.push(Chunk {
            source: source.clone(),
            split_id: chunks.len() as u32,
            content: buffer[w_start..w_end].iter().collect(),
            char_start: w_start,
            char_end: w_end,
            page_indices,
        });

        if w_end == total {
            break;
        }
        w_start += stride;
    }

    Ok(chunks)
}
