//! Storage abstraction for Groundwork.
//!
//! The [`Store`] trait defines every storage operation the retrieval
//! pipeline needs: documents, owner-scoped vector ranking, owner-scoped
//! lexical ranking, and the atomic insert-if-absent that makes embedding
//! ingestion idempotent under concurrency.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::lexical::LexicalQuery;
use crate::models::{Document, DocumentFilter, InsertOutcome, LexicalHit, NewEmbedding, VectorHit};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_document`](Store::upsert_document) | Insert or replace a document |
/// | [`get_document`](Store::get_document) | Fetch a document visible to an owner |
/// | [`delete_document`](Store::delete_document) | Remove a document and its embeddings |
/// | [`embedding_ids`](Store::embedding_ids) | Ids of a document's stored embeddings |
/// | [`insert_embeddings_if_absent`](Store::insert_embeddings_if_absent) | Atomically claim and write a document's embedding set |
/// | [`delete_embeddings`](Store::delete_embeddings) | Bulk delete a document's embeddings |
/// | [`vector_search`](Store::vector_search) | Cosine-similarity ranking scoped by owner |
/// | [`lexical_search`](Store::lexical_search) | Keyword ranking scoped by owner |
/// | [`lexical_count`](Store::lexical_count) | Match count for the same filter |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a document, replacing any existing one with the same id.
    async fn upsert_document(&self, doc: &Document) -> Result<()>;

    /// Fetch a document by id. Documents of other owners are invisible.
    async fn get_document(&self, owner_id: &str, id: &str) -> Result<Option<Document>>;

    /// Delete a document and every embedding bound to it.
    ///
    /// Returns `false` when no such document exists for the owner.
    async fn delete_document(&self, owner_id: &str, id: &str) -> Result<bool>;

    /// Ids of the embeddings stored for a document, in chunk order.
    async fn embedding_ids(&self, document_id: &str) -> Result<Vec<String>>;

    /// Write `rows` as the embedding set of `document_id` unless one exists.
    ///
    /// The check and the write happen in one atomic step: of two concurrent
    /// callers exactly one gets [`InsertOutcome::Inserted`]; the other gets
    /// [`InsertOutcome::Existing`] with the winner's ids.
    async fn insert_embeddings_if_absent(
        &self,
        document_id: &str,
        rows: &[NewEmbedding],
    ) -> Result<InsertOutcome>;

    /// Delete every embedding of a document. Returns the number removed.
    async fn delete_embeddings(&self, document_id: &str) -> Result<u64>;

    /// Rank the owner's embeddings by cosine similarity, best first.
    async fn vector_search(
        &self,
        owner_id: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorHit>>;

    /// Rank the owner's documents matching `query` and `filter`, best first.
    async fn lexical_search(
        &self,
        owner_id: &str,
        query: &LexicalQuery,
        filter: &DocumentFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LexicalHit>>;

    /// Number of the owner's documents matching `query` and `filter`.
    async fn lexical_count(
        &self,
        owner_id: &str,
        query: &LexicalQuery,
        filter: &DocumentFilter,
    ) -> Result<u64>;
}

/// Leading characters of a document kept as the unhighlighted snippet.
pub const SNIPPET_CHARS: usize = 500;

/// First [`SNIPPET_CHARS`] characters of `content`.
pub fn leading_snippet(content: &str) -> String {
    content.chars().take(SNIPPET_CHARS).collect()
}
