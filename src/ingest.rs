//! Embedding generation for documents.
//!
//! [`EmbeddingGenerator::embed`] turns a document's text into one stored
//! embedding per chunk:
//!
//! 1. Reject blank text.
//! 2. If the document already has embeddings, return their ids without
//!    calling the provider.
//! 3. Chunk the text and embed every chunk in a single batch call.
//! 4. Persist all rows through the store's atomic insert-if-absent. If a
//!    concurrent ingestion claimed the document first, its ids are
//!    returned and this batch is discarded.
//!
//! Failures never escape as `Err`: they are reported through
//! [`EmbeddingOutcome`] with `success = false`, and nothing is persisted.

use anyhow::{anyhow, bail, Result};
use groundwork_core::chunk::chunk_text;
use groundwork_core::embedding::{content_hash, EmbeddingProvider};
use groundwork_core::models::{Document, InsertOutcome, NewEmbedding};
use groundwork_core::store::Store;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ChunkingConfig;

/// Result of an embedding request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingOutcome {
    pub success: bool,
    pub embedding_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EmbeddingOutcome {
    fn ok(embedding_ids: Vec<String>) -> Self {
        Self {
            success: true,
            embedding_ids,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            success: false,
            embedding_ids: Vec::new(),
            error: Some(error),
        }
    }
}

/// Chunks, embeds, and persists document text.
pub struct EmbeddingGenerator {
    store: Arc<dyn Store>,
    provider: Arc<dyn EmbeddingProvider>,
    max_chars: usize,
    overlap_chars: usize,
    timeout: Duration,
}

impl EmbeddingGenerator {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn EmbeddingProvider>,
        chunking: &ChunkingConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            max_chars: chunking.max_chars(),
            overlap_chars: chunking.overlap_chars(),
            timeout,
        }
    }

    /// Embed `text` as the content of `document_id`.
    pub async fn embed(&self, document_id: &str, owner_id: &str, text: &str) -> EmbeddingOutcome {
        match self.try_embed(document_id, owner_id, text).await {
            Ok(ids) => EmbeddingOutcome::ok(ids),
            Err(e) => {
                warn!(document_id, error = %e, "embedding generation failed");
                EmbeddingOutcome::failed(e.to_string())
            }
        }
    }

    async fn try_embed(&self, document_id: &str, owner_id: &str, text: &str) -> Result<Vec<String>> {
        let chunks = chunk_text(text, self.max_chars, self.overlap_chars)?;

        let existing = self.store.embedding_ids(document_id).await?;
        if !existing.is_empty() {
            info!(document_id, count = existing.len(), "embeddings exist, skipping");
            return Ok(existing);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = tokio::time::timeout(self.timeout, self.provider.embed_batch(&texts))
            .await
            .map_err(|_| anyhow!("embedding request timed out after {:?}", self.timeout))??;

        if vectors.len() != chunks.len() {
            bail!(
                "provider returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let model = self.provider.model_name().to_string();
        let rows: Vec<NewEmbedding> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| NewEmbedding {
                id: Uuid::new_v4().to_string(),
                owner_id: owner_id.to_string(),
                document_id: Some(document_id.to_string()),
                content: chunk.text.clone(),
                content_hash: content_hash(&chunk.text),
                model: model.clone(),
                metadata: chunk.metadata(),
                vector,
            })
            .collect();

        match self.store.insert_embeddings_if_absent(document_id, &rows).await? {
            InsertOutcome::Inserted(ids) => {
                info!(document_id, chunks = ids.len(), model = %model, "embeddings stored");
                Ok(ids)
            }
            InsertOutcome::Existing(ids) => {
                info!(document_id, "concurrent ingestion won, discarding batch");
                Ok(ids)
            }
        }
    }

    /// Remove every embedding of a document in one bulk delete.
    pub async fn delete(&self, document_id: &str) -> Result<u64> {
        let removed = self.store.delete_embeddings(document_id).await?;
        info!(document_id, removed, "embeddings deleted");
        Ok(removed)
    }

    /// Drop and regenerate a document's embeddings.
    pub async fn reembed(
        &self,
        document_id: &str,
        owner_id: &str,
        text: &str,
    ) -> Result<EmbeddingOutcome> {
        self.delete(document_id).await?;
        Ok(self.embed(document_id, owner_id, text).await)
    }

    /// Store a document, then embed its content.
    pub async fn add_document(&self, doc: &Document) -> Result<EmbeddingOutcome> {
        self.store.upsert_document(doc).await?;
        Ok(self.embed(&doc.id, &doc.owner_id, &doc.content).await)
    }
}
