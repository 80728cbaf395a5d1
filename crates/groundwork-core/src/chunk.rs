//! Sentence-aware, position-tracking text chunker.
//!
//! Splits extracted document text into overlapping [`Chunk`]s of at most
//! `max_chars` characters. Each chunk records its true character offsets
//! in the source text so callers can reconstruct or highlight it exactly.
//!
//! # Algorithm
//!
//! 1. If the text fits in one window, return a single chunk spanning it.
//! 2. Otherwise the candidate end of each chunk is `start + max_chars`
//!    (clamped to the text length).
//! 3. When that end is interior to the text, search the last 20% of the
//!    window for a sentence boundary (`". "`, `"\n"`, `"? "`, `"! "`) and
//!    cut just after the latest one found.
//! 4. The next chunk starts `overlap_chars` before the cut, but always at
//!    least one character after the previous start.
//! 5. Stop once a chunk reaches the end of the text.
//!
//! Offsets count Unicode scalar values, so slicing never splits a UTF-8
//! sequence.
//!
//! # Example
//!
//! ```rust
//! use groundwork_core::chunk::chunk_text;
//!
//! let text = "a".repeat(2400);
//! let chunks = chunk_text(&text, 1000, 200).unwrap();
//! let starts: Vec<usize> = chunks.iter().map(|c| c.start_pos).collect();
//! assert_eq!(starts, vec![0, 800, 1600]);
//! assert_eq!(chunks[2].end_pos, 2400);
//! ```

use thiserror::Error;

use crate::models::Chunk;

/// Approximate characters-per-token ratio used to turn token budgets
/// into character windows.
pub const CHARS_PER_TOKEN: usize = 4;

/// Reasons a text cannot be chunked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("Content is empty")]
    EmptyText,
    #[error("max_chars must be > 0")]
    ZeroWindow,
}

/// Split `text` into overlapping, position-tracked chunks.
///
/// Pure function of its arguments: identical input always yields identical
/// chunk boundaries.
///
/// # Guarantees
///
/// - `0 <= start_pos < end_pos <= len(text)` for every chunk.
/// - `start_pos` strictly increases from one chunk to the next.
/// - The `[start_pos, end_pos)` ranges cover the whole text; consecutive
///   ranges overlap by at most `overlap_chars`.
/// - The last chunk ends at `len(text)`.
///
/// # Errors
///
/// [`ChunkError::EmptyText`] for empty or whitespace-only text and
/// [`ChunkError::ZeroWindow`] when `max_chars` is zero.
pub fn chunk_text(
    text: &str,
    max_chars: usize,
    overlap_chars: usize,
) -> Result<Vec<Chunk>, ChunkError> {
    if text.trim().is_empty() {
        return Err(ChunkError::EmptyText);
    }
    if max_chars == 0 {
        return Err(ChunkError::ZeroWindow);
    }

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    let mut spans: Vec<(usize, usize)> = Vec::new();
    if len <= max_chars {
        spans.push((0, len));
    } else {
        let lookback = max_chars / 5;
        let mut start = 0usize;
        loop {
            let mut end = (start + max_chars).min(len);

            if end < len {
                let search_start = end - lookback;
                if let Some(idx) = last_boundary(&chars[search_start..end]) {
                    end = search_start + idx + 1;
                }
            }

            spans.push((start, end));
            if end >= len {
                break;
            }

            start = end.saturating_sub(overlap_chars).max(start + 1);
        }
    }

    // Byte offset of every char index, plus the end of the string.
    let mut byte_at: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
    byte_at.push(text.len());

    let total_chunks = spans.len();
    Ok(spans
        .into_iter()
        .enumerate()
        .map(|(chunk_index, (start_pos, end_pos))| Chunk {
            text: text[byte_at[start_pos]..byte_at[end_pos]].to_string(),
            start_pos,
            end_pos,
            chunk_index,
            total_chunks,
        })
        .collect())
}

/// Index of the latest sentence-boundary marker fully inside `window`.
fn last_boundary(window: &[char]) -> Option<usize> {
    (0..window.len()).rev().find(|&i| match window[i] {
        '\n' => true,
        '.' | '?' | '!' => window.get(i + 1) == Some(&' '),
        _ => false,
    })
}
