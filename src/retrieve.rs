//! Semantic (vector) retrieval.
//!
//! Embeds the query with the configured provider and ranks the owner's
//! stored chunks by cosine similarity. The store returns the `top_k` best
//! chunks; anything below the similarity threshold is then dropped, so
//! raising the threshold can only shrink the result.

use anyhow::{anyhow, Result};
use groundwork_core::embedding::{embed_one, EmbeddingProvider};
use groundwork_core::models::VectorHit;
use groundwork_core::store::Store;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Ranked chunks, best first, all at or above the threshold.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<VectorHit>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

pub struct VectorRetriever {
    store: Arc<dyn Store>,
    provider: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
}

impl VectorRetriever {
    pub fn new(store: Arc<dyn Store>, provider: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        Self {
            store,
            provider,
            timeout,
        }
    }

    /// Top `top_k` chunks of `owner_id` with `similarity >= threshold`.
    ///
    /// A blank query returns an empty result without calling the provider.
    pub async fn retrieve(
        &self,
        owner_id: &str,
        query: &str,
        top_k: usize,
        threshold: f64,
    ) -> Result<RetrievalResult> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(RetrievalResult::default());
        }

        let query_vec = tokio::time::timeout(self.timeout, embed_one(self.provider.as_ref(), query))
            .await
            .map_err(|_| anyhow!("query embedding timed out after {:?}", self.timeout))??;

        let ranked = self.store.vector_search(owner_id, &query_vec, top_k).await?;
        let candidates = ranked.len();
        let hits: Vec<VectorHit> = ranked
            .into_iter()
            .filter(|h| h.similarity >= threshold)
            .collect();

        debug!(owner_id, candidates, kept = hits.len(), threshold, "vector retrieval");
        Ok(RetrievalResult { hits })
    }
}
