//! Property tests for the chunker and citation deduplication.

use std::collections::HashSet;

use groundwork_core::chunk::chunk_text;
use groundwork_core::citations::dedup_citations;
use groundwork_core::models::Citation;
use proptest::prelude::*;

/// Text drawn from letters, spaces, and sentence punctuation so boundary
/// cuts actually happen.
fn prose() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            8 => proptest::char::range('a', 'z'),
            2 => Just(' '),
            1 => Just('.'),
            1 => Just('\n'),
            1 => Just('?'),
            1 => Just('é'),
        ],
        1..3000,
    )
    .prop_map(|chars| chars.into_iter().collect::<String>())
    .prop_filter("non-blank", |s| !s.trim().is_empty())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_chunks_cover_text(text in prose(), max in 1usize..400, overlap in 0usize..200) {
        let chunks = chunk_text(&text, max, overlap).unwrap();
        let len = text.chars().count();

        prop_assert_eq!(chunks[0].start_pos, 0);
        prop_assert_eq!(chunks.last().unwrap().end_pos, len);
        for c in &chunks {
            prop_assert!(c.start_pos < c.end_pos);
            prop_assert!(c.end_pos <= len);
            prop_assert!(c.end_pos - c.start_pos <= max);
            prop_assert_eq!(c.text.chars().count(), c.end_pos - c.start_pos);
        }
        for w in chunks.windows(2) {
            prop_assert!(w[0].start_pos < w[1].start_pos);
            // No gap between consecutive chunks, and overlap never exceeds the configured amount.
            prop_assert!(w[1].start_pos <= w[0].end_pos);
            prop_assert!(w[0].end_pos - w[1].start_pos <= overlap);
        }
    }

    #[test]
    fn prop_chunking_is_deterministic(text in prose(), max in 1usize..400, overlap in 0usize..200) {
        prop_assert_eq!(chunk_text(&text, max, overlap), chunk_text(&text, max, overlap));
    }

    #[test]
    fn prop_chunk_count_bounded_without_boundaries(
        len in 1usize..5000,
        max in 2usize..600,
        overlap_frac in 0.0f64..0.95,
    ) {
        let overlap = ((max as f64) * overlap_frac) as usize;
        prop_assume!(overlap < max);
        let text = "x".repeat(len);
        let chunks = chunk_text(&text, max, overlap).unwrap();
        let bound = len.div_ceil(max - overlap) + 1;
        prop_assert!(chunks.len() <= bound, "{} chunks > bound {}", chunks.len(), bound);
    }

    #[test]
    fn prop_dedup_one_entry_per_document(ids in proptest::collection::vec(0u8..8, 0..40)) {
        let citations: Vec<Citation> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let mut c = Citation::new(&format!("doc-{}", id), "f.pdf");
                c.snippet = Some(format!("seen at {}", i));
                c
            })
            .collect();

        let unique: HashSet<String> = citations.iter().map(|c| c.document_id.clone()).collect();
        let out = dedup_citations(citations.clone());

        prop_assert_eq!(out.len(), unique.len());
        for c in &out {
            // The surviving entry carries the metadata of the last occurrence.
            let last = citations.iter().rev().find(|x| x.document_id == c.document_id).unwrap();
            prop_assert_eq!(c, last);
        }
    }
}
