//! Citation deduplication.
//!
//! Citations collected across tool calls are keyed by document id. When the
//! same document is cited more than once the **last** citation's metadata
//! is kept, while the list position is the one where the document was
//! **first** seen. This mirrors insertion into an ordered map that
//! overwrites values in place.

use std::collections::HashMap;

use crate::models::Citation;

/// Collapse citations to one entry per document id, last write wins.
pub fn dedup_citations(citations: Vec<Citation>) -> Vec<Citation> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Citation> = Vec::with_capacity(citations.len());

    for citation in citations {
        match position.get(&citation.document_id) {
            Some(&i) => out[i] = citation,
            None => {
                position.insert(citation.document_id.clone(), out.len());
                out.push(citation);
            }
        }
    }

    out
}
