//! In-memory [`Store`] implementation for tests and embedding in other hosts.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Vector search is
//! brute-force cosine similarity; lexical search scans every document of
//! the owner with [`LexicalQuery::matches`] and ranks with
//! [`LexicalQuery::rank`].

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::lexical::{headline, HeadlineOptions, LexicalQuery};
use crate::models::{
    Document, DocumentFilter, InsertOutcome, LexicalHit, NewEmbedding, VectorHit,
};

use super::{leading_snippet, Store};

/// In-memory store.
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    embeddings: RwLock<Vec<NewEmbedding>>,
    headline: HeadlineOptions,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            embeddings: RwLock::new(Vec::new()),
            headline: HeadlineOptions::default(),
        }
    }

    /// Total number of stored embedding rows, across all documents.
    pub fn embedding_count(&self) -> usize {
        self.embeddings.read().map(|e| e.len()).unwrap_or(0)
    }

    fn read_docs(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Document>>> {
        self.docs.read().map_err(|_| anyhow!("document lock poisoned"))
    }

    fn write_docs(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Document>>> {
        self.docs.write().map_err(|_| anyhow!("document lock poisoned"))
    }

    fn read_embeddings(&self) -> Result<RwLockReadGuard<'_, Vec<NewEmbedding>>> {
        self.embeddings
            .read()
            .map_err(|_| anyhow!("embedding lock poisoned"))
    }

    fn write_embeddings(&self) -> Result<RwLockWriteGuard<'_, Vec<NewEmbedding>>> {
        self.embeddings
            .write()
            .map_err(|_| anyhow!("embedding lock poisoned"))
    }

    fn matching_docs(
        &self,
        owner_id: &str,
        query: &LexicalQuery,
        filter: &DocumentFilter,
    ) -> Result<Vec<(Document, f64)>> {
        let docs = self.read_docs()?;
        Ok(docs
            .values()
            .filter(|d| d.owner_id == owner_id && filter.accepts(d))
            .filter_map(|d| {
                let searchable = format!("{}\n{}", d.filename, d.content);
                query
                    .matches(&searchable)
                    .then(|| (d.clone(), query.rank(&searchable)))
            })
            .collect())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_document(&self, doc: &Document) -> Result<()> {
        self.write_docs()?.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_document(&self, owner_id: &str, id: &str) -> Result<Option<Document>> {
        Ok(self
            .read_docs()?
            .get(id)
            .filter(|d| d.owner_id == owner_id)
            .cloned())
    }

    async fn delete_document(&self, owner_id: &str, id: &str) -> Result<bool> {
        {
            let mut docs = self.write_docs()?;
            match docs.get(id) {
                Some(d) if d.owner_id == owner_id => {
                    docs.remove(id);
                }
                _ => return Ok(false),
            }
        }
        self.delete_embeddings(id).await?;
        Ok(true)
    }

    async fn embedding_ids(&self, document_id: &str) -> Result<Vec<String>> {
        Ok(self
            .read_embeddings()?
            .iter()
            .filter(|e| e.document_id.as_deref() == Some(document_id))
            .map(|e| e.id.clone())
            .collect())
    }

    async fn insert_embeddings_if_absent(
        &self,
        document_id: &str,
        rows: &[NewEmbedding],
    ) -> Result<InsertOutcome> {
        let mut stored = self.write_embeddings()?;
        let existing: Vec<String> = stored
            .iter()
            .filter(|e| e.document_id.as_deref() == Some(document_id))
            .map(|e| e.id.clone())
            .collect();
        if !existing.is_empty() {
            return Ok(InsertOutcome::Existing(existing));
        }
        stored.extend(rows.iter().cloned());
        Ok(InsertOutcome::Inserted(
            rows.iter().map(|r| r.id.clone()).collect(),
        ))
    }

    async fn delete_embeddings(&self, document_id: &str) -> Result<u64> {
        let mut stored = self.write_embeddings()?;
        let before = stored.len();
        stored.retain(|e| e.document_id.as_deref() != Some(document_id));
        Ok((before - stored.len()) as u64)
    }

    async fn vector_search(
        &self,
        owner_id: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorHit>> {
        let docs = self.read_docs()?;
        let stored = self.read_embeddings()?;

        let mut hits: Vec<VectorHit> = stored
            .iter()
            .filter(|e| e.owner_id == owner_id)
            .map(|e| VectorHit {
                embedding_id: e.id.clone(),
                document_id: e.document_id.clone(),
                filename: e
                    .document_id
                    .as_ref()
                    .and_then(|id| docs.get(id))
                    .map(|d| d.filename.clone()),
                content: e.content.clone(),
                metadata: Some(e.metadata),
                similarity: cosine_similarity(query_vec, &e.vector) as f64,
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn lexical_search(
        &self,
        owner_id: &str,
        query: &LexicalQuery,
        filter: &DocumentFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LexicalHit>> {
        let mut matched = self.matching_docs(owner_id, query, filter)?;
        matched.sort_by(|(da, ra), (db, rb)| {
            rb.partial_cmp(ra)
                .unwrap_or(Ordering::Equal)
                .then_with(|| da.id.cmp(&db.id))
        });

        Ok(matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(d, rank)| {
                let snippet = leading_snippet(&d.content);
                let highlighted = headline(&d.content, query, &self.headline);
                LexicalHit {
                    id: d.id,
                    filename: d.filename,
                    document_type: d.document_type,
                    document_year: d.document_year,
                    document_date: d.document_date,
                    headline: if highlighted.is_empty() {
                        snippet.clone()
                    } else {
                        highlighted
                    },
                    snippet,
                    rank,
                }
            })
            .collect())
    }

    async fn lexical_count(
        &self,
        owner_id: &str,
        query: &LexicalQuery,
        filter: &DocumentFilter,
    ) -> Result<u64> {
        Ok(self.matching_docs(owner_id, query, filter)?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn doc(id: &str, owner: &str, filename: &str, content: &str) -> Document {
        let mut d = Document::new(owner, filename, content);
        d.id = id.to_string();
        d
    }

    fn row(id: &str, owner: &str, doc_id: &str, vector: Vec<f32>) -> NewEmbedding {
        NewEmbedding {
            id: id.to_string(),
            owner_id: owner.to_string(),
            document_id: Some(doc_id.to_string()),
            content: format!("content of {}", id),
            content_hash: String::new(),
            model: "test".to_string(),
            metadata: ChunkMetadata {
                chunk_index: 0,
                total_chunks: 1,
                start_pos: 0,
                end_pos: 10,
            },
            vector,
        }
    }

    #[tokio::test]
    async fn test_insert_if_absent_keeps_first_set() {
        let store = InMemoryStore::new();
        let first = store
            .insert_embeddings_if_absent("d1", &[row("e1", "u", "d1", vec![1.0])])
            .await
            .unwrap();
        assert_eq!(first, InsertOutcome::Inserted(vec!["e1".to_string()]));

        let second = store
            .insert_embeddings_if_absent("d1", &[row("e2", "u", "d1", vec![1.0])])
            .await
            .unwrap();
        assert_eq!(second, InsertOutcome::Existing(vec!["e1".to_string()]));
        assert_eq!(store.embedding_count(), 1);
    }

    #[tokio::test]
    async fn test_vector_search_scoped_by_owner_and_sorted() {
        let store = InMemoryStore::new();
        store.upsert_document(&doc("d1", "u", "a.txt", "x")).await.unwrap();
        store
            .insert_embeddings_if_absent(
                "d1",
                &[
                    row("far", "u", "d1", vec![0.0, 1.0]),
                    row("near", "u", "d1", vec![1.0, 0.1]),
                ],
            )
            .await
            .unwrap();
        store
            .insert_embeddings_if_absent("d2", &[row("other", "v", "d2", vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = store.vector_search("u", &[1.0, 0.0], 10).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.embedding_id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);
        assert_eq!(hits[0].filename.as_deref(), Some("a.txt"));
    }

    #[tokio::test]
    async fn test_delete_document_cascades() {
        let store = InMemoryStore::new();
        store.upsert_document(&doc("d1", "u", "a.txt", "x")).await.unwrap();
        store
            .insert_embeddings_if_absent("d1", &[row("e1", "u", "d1", vec![1.0])])
            .await
            .unwrap();

        assert!(!store.delete_document("someone-else", "d1").await.unwrap());
        assert!(store.delete_document("u", "d1").await.unwrap());
        assert!(store.embedding_ids("d1").await.unwrap().is_empty());
        assert!(store.get_document("u", "d1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lexical_search_ranks_and_pages() {
        let store = InMemoryStore::new();
        store
            .upsert_document(&doc("a", "u", "a.txt", "income income income tax"))
            .await
            .unwrap();
        store
            .upsert_document(&doc("b", "u", "b.txt", "income tax return"))
            .await
            .unwrap();
        store
            .upsert_document(&doc("c", "u", "c.txt", "grocery list"))
            .await
            .unwrap();
        store
            .upsert_document(&doc("d", "v", "d.txt", "income tax"))
            .await
            .unwrap();

        let q = LexicalQuery::parse("inc");
        let filter = DocumentFilter::default();
        let hits = store.lexical_search("u", &q, &filter, 10, 0).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(hits[0].headline.contains("<b>income</b>"));
        assert_eq!(store.lexical_count("u", &q, &filter).await.unwrap(), 2);

        let page2 = store.lexical_search("u", &q, &filter, 1, 1).await.unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].id, "b");
    }

    #[tokio::test]
    async fn test_get_document_hides_other_owners() {
        let store = InMemoryStore::new();
        store.upsert_document(&doc("d1", "u", "a.txt", "x")).await.unwrap();
        assert!(store.get_document("u", "d1").await.unwrap().is_some());
        assert!(store.get_document("v", "d1").await.unwrap().is_none());
    }
}
