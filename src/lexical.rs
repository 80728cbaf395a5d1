//! Keyword search and full-document fetch.
//!
//! Used by the `gw search` / `gw get` commands, the `/search` and
//! `/documents/{id}` routes, and the `search_documents` / `get_document`
//! tools. Both operations are scoped to one owner: documents of other
//! owners are never counted, ranked, or returned.

use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use groundwork_core::lexical::LexicalQuery;
use groundwork_core::models::{DocumentFilter, LexicalHit};
use groundwork_core::store::Store;
use serde::Serialize;
use tracing::debug;

/// Marker appended to content cut at `max_length` characters.
pub const TRUNCATION_MARKER: &str = "\n\n[Content truncated...]";

/// One page of keyword search results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<LexicalHit>,
    /// Matches across all pages.
    pub total: u64,
    pub page: usize,
    pub page_size: usize,
    pub has_more: bool,
}

/// Pagination knobs after clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: usize,
    pub size: usize,
}

impl Page {
    /// Clamp `size` to `[1, max_size]` and treat pages below 1 as 1.
    pub fn new(page: usize, size: usize, max_size: usize) -> Self {
        Self {
            page: page.max(1),
            size: size.clamp(1, max_size.max(1)),
        }
    }

    /// Rows to skip, or `None` when the page lies past any addressable
    /// SQLite offset.
    pub fn offset(&self) -> Option<usize> {
        (self.page - 1)
            .checked_mul(self.size)
            .filter(|offset| *offset <= i64::MAX as usize)
    }
}

/// Rank the owner's documents against `query`.
///
/// Fetches one row past the page to compute `has_more`, and runs a
/// separate count query for `total`.
pub async fn search_documents(
    store: &dyn Store,
    owner_id: &str,
    query: &str,
    filter: &DocumentFilter,
    page: Page,
) -> Result<SearchResponse> {
    let parsed = LexicalQuery::parse(query);
    let offset = page
        .offset()
        .ok_or_else(|| anyhow!("page {} is out of range", page.page))?;

    let mut results = store
        .lexical_search(owner_id, &parsed, filter, page.size + 1, offset)
        .await?;
    let has_more = results.len() > page.size;
    results.truncate(page.size);

    let total = store.lexical_count(owner_id, &parsed, filter).await?;

    debug!(
        owner_id,
        terms = parsed.terms().len(),
        total,
        returned = results.len(),
        "lexical search"
    );

    Ok(SearchResponse {
        results,
        total,
        page: page.page,
        page_size: page.size,
        has_more,
    })
}

/// A document's content and metadata for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentContent {
    pub id: String,
    pub filename: String,
    pub mime_type: String,
    pub document_type: Option<String>,
    pub document_year: Option<String>,
    pub document_date: Option<String>,
    /// Character length of the full, untruncated content.
    pub size: usize,
    pub content: String,
    /// ISO-8601 creation time.
    pub created_at: String,
}

/// Fetch one document, truncating content past `max_length` characters.
///
/// Returns `None` when the document does not exist or belongs to another
/// owner; the two cases are indistinguishable to the caller.
pub async fn get_document(
    store: &dyn Store,
    owner_id: &str,
    document_id: &str,
    max_length: usize,
) -> Result<Option<DocumentContent>> {
    let Some(doc) = store.get_document(owner_id, document_id).await? else {
        return Ok(None);
    };

    let size = doc.content.chars().count();
    let content = if size > max_length {
        let mut cut: String = doc.content.chars().take(max_length).collect();
        cut.push_str(TRUNCATION_MARKER);
        cut
    } else {
        doc.content
    };

    Ok(Some(DocumentContent {
        id: doc.id,
        filename: doc.filename,
        mime_type: doc.mime_type,
        document_type: doc.document_type,
        document_year: doc.document_year,
        document_date: doc.document_date,
        size,
        content,
        created_at: ts_to_iso(doc.created_at),
    }))
}

pub fn ts_to_iso(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamping() {
        assert_eq!(Page::new(0, 10, 50), Page { page: 1, size: 10 });
        assert_eq!(Page::new(3, 500, 50), Page { page: 3, size: 50 });
        assert_eq!(Page::new(2, 0, 50), Page { page: 2, size: 1 });
        assert_eq!(Page::new(3, 10, 50).offset(), Some(20));
    }

    #[test]
    fn test_page_offset_out_of_range() {
        assert_eq!(Page::new(usize::MAX, 10, 50).offset(), None);
        assert_eq!(Page::new(usize::MAX, 1, 50).offset(), None);
        assert_eq!(Page::new(1, 50, 50).offset(), Some(0));
    }

    #[test]
    fn test_ts_to_iso() {
        assert_eq!(ts_to_iso(0), "1970-01-01T00:00:00+00:00");
    }
}
