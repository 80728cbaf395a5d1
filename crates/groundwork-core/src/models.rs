//! Core data models used throughout Groundwork.
//!
//! These types represent the documents, chunks, embeddings, and retrieval
//! results that flow through the ingestion and answer pipelines.

use serde::{Deserialize, Serialize};

/// An extracted document owned by a single user.
///
/// Produced by an external extraction step; the pipeline treats `content`
/// as immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    pub filename: String,
    pub mime_type: String,
    pub document_type: Option<String>,
    pub document_year: Option<String>,
    /// ISO-8601 date (`YYYY-MM-DD`).
    pub document_date: Option<String>,
    pub content: String,
    /// Unix timestamp (seconds).
    pub created_at: i64,
}

impl Document {
    /// Create a plain-text document with a fresh UUID and the current time.
    pub fn new(owner_id: &str, filename: &str, content: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            filename: filename.to_string(),
            mime_type: "text/plain".to_string(),
            document_type: None,
            document_year: None,
            document_date: None,
            content: content.to_string(),
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// A contiguous, position-tracked segment of a document's text.
///
/// `start_pos`/`end_pos` are character offsets into the source text, not
/// into `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub start_pos: usize,
    pub end_pos: usize,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

impl Chunk {
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            chunk_index: self.chunk_index,
            total_chunks: self.total_chunks,
            start_pos: self.start_pos,
            end_pos: self.end_pos,
        }
    }
}

/// Chunk position metadata persisted with each embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub start_pos: usize,
    pub end_pos: usize,
}

/// An embedding row ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewEmbedding {
    pub id: String,
    pub owner_id: String,
    pub document_id: Option<String>,
    /// Source chunk text.
    pub content: String,
    /// Hex SHA-256 of `content`.
    pub content_hash: String,
    pub model: String,
    pub metadata: ChunkMetadata,
    pub vector: Vec<f32>,
}

/// Result of an atomic insert-if-absent of a document's embedding set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The rows were written; ids in chunk order.
    Inserted(Vec<String>),
    /// Another writer already holds an embedding set for the document.
    Existing(Vec<String>),
}

/// One stored chunk ranked by cosine similarity to a query vector.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorHit {
    pub embedding_id: String,
    pub document_id: Option<String>,
    pub filename: Option<String>,
    pub content: String,
    pub metadata: Option<ChunkMetadata>,
    pub similarity: f64,
}

impl VectorHit {
    /// Chunk ordinal, `0` when metadata is missing.
    pub fn chunk_index(&self) -> usize {
        self.metadata.map(|m| m.chunk_index).unwrap_or(0)
    }
}

/// Metadata filters applied by lexical search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFilter {
    pub document_type: Option<String>,
    pub document_year: Option<String>,
    /// Inclusive lower bound on `document_date`.
    pub date_from: Option<String>,
    /// Inclusive upper bound on `document_date`.
    pub date_to: Option<String>,
}

impl DocumentFilter {
    /// Whether a document passes every filter that is set.
    pub fn accepts(&self, doc: &Document) -> bool {
        if let Some(t) = &self.document_type {
            if doc.document_type.as_deref() != Some(t.as_str()) {
                return false;
            }
        }
        if let Some(y) = &self.document_year {
            if doc.document_year.as_deref() != Some(y.as_str()) {
                return false;
            }
        }
        if self.date_from.is_some() || self.date_to.is_some() {
            let date = match doc.document_date.as_deref() {
                Some(d) => d,
                None => return false,
            };
            if let Some(from) = &self.date_from {
                if date < from.as_str() {
                    return false;
                }
            }
            if let Some(to) = &self.date_to {
                if date > to.as_str() {
                    return false;
                }
            }
        }
        true
    }
}

/// A whole document ranked by keyword match.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LexicalHit {
    pub id: String,
    pub filename: String,
    pub document_type: Option<String>,
    pub document_year: Option<String>,
    pub document_date: Option<String>,
    /// Leading excerpt of the content.
    pub snippet: String,
    /// Highlighted match fragments; falls back to `snippet`.
    pub headline: String,
    pub rank: f64,
}

/// A pointer from an answer back to a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub document_id: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    /// Ordinal source tag such as `[1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

impl Citation {
    pub fn new(document_id: &str, filename: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            filename: filename.to_string(),
            document_type: None,
            snippet: None,
            source_tag: None,
            chunk_index: None,
            similarity: None,
        }
    }
}

/// Kind of a user-facing activity entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityAction {
    Search,
    Retrieve,
}

/// A human-readable trace of one tool call, for UI display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub action: ActivityAction,
    pub details: String,
}

impl Activity {
    pub fn search(query: &str) -> Self {
        let details = if query.trim().is_empty() {
            "documents".to_string()
        } else {
            query.to_string()
        };
        Self {
            action: ActivityAction::Search,
            details,
        }
    }

    pub fn retrieve() -> Self {
        Self {
            action: ActivityAction::Retrieve,
            details: "document content".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dated(date: Option<&str>) -> Document {
        let mut doc = Document::new("u1", "a.txt", "body");
        doc.document_type = Some("invoice".to_string());
        doc.document_year = Some("2023".to_string());
        doc.document_date = date.map(str::to_string);
        doc
    }

    #[test]
    fn test_filter_default_accepts_everything() {
        assert!(DocumentFilter::default().accepts(&dated(None)));
    }

    #[test]
    fn test_filter_type_and_year() {
        let doc = dated(None);
        let mut f = DocumentFilter {
            document_type: Some("invoice".to_string()),
            ..Default::default()
        };
        assert!(f.accepts(&doc));
        f.document_year = Some("2022".to_string());
        assert!(!f.accepts(&doc));
    }

    #[test]
    fn test_filter_date_range_is_inclusive() {
        let f = DocumentFilter {
            date_from: Some("2023-01-01".to_string()),
            date_to: Some("2023-12-31".to_string()),
            ..Default::default()
        };
        assert!(f.accepts(&dated(Some("2023-01-01"))));
        assert!(f.accepts(&dated(Some("2023-12-31"))));
        assert!(!f.accepts(&dated(Some("2024-01-01"))));
        assert!(!f.accepts(&dated(None)));
    }

    #[test]
    fn test_metadata_serializes_camel_case() {
        let meta = ChunkMetadata {
            chunk_index: 1,
            total_chunks: 3,
            start_pos: 800,
            end_pos: 1800,
        };
        let json = serde_json::to_value(meta).unwrap();
        assert_eq!(json["chunkIndex"], 1);
        assert_eq!(json["totalChunks"], 3);
        assert_eq!(json["startPos"], 800);
        assert_eq!(json["endPos"], 1800);
    }

    #[test]
    fn test_search_activity_defaults_details() {
        assert_eq!(Activity::search("  ").details, "documents");
        assert_eq!(Activity::search("tax").details, "tax");
        assert_eq!(Activity::retrieve().action, ActivityAction::Retrieve);
    }
}
