//! Wiring of store, providers, and pipeline components.
//!
//! The CLI and the HTTP server both build one [`App`] from the loaded
//! config and call into its components.

use anyhow::Result;
use groundwork_core::embedding::EmbeddingProvider;
use groundwork_core::llm::LanguageModel;
use groundwork_core::store::Store;
use std::sync::Arc;

use crate::agent::Agent;
use crate::config::Config;
use crate::embedding::create_provider;
use crate::ingest::EmbeddingGenerator;
use crate::llm::create_model;
use crate::retrieve::VectorRetriever;
use crate::sqlite_store::SqliteStore;
use crate::synthesize::{self, AnswerSynthesizer, AskResponse};
use crate::tools::ToolContext;

pub struct App {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub generator: EmbeddingGenerator,
    pub retriever: VectorRetriever,
    pub synthesizer: AnswerSynthesizer,
    pub agent: Agent,
    pub tools: ToolContext,
}

impl App {
    /// Open the SQLite store (running migrations) and build the configured providers.
    pub async fn open(config: Config) -> Result<Self> {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&config).await?);
        let embedder = create_provider(&config.embedding)?;
        let model = create_model(&config.llm)?;
        Ok(Self::from_parts(config, store, embedder, model))
    }

    pub fn from_parts(
        config: Config,
        store: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        let embed_timeout = config.embedding.timeout();
        Self {
            generator: EmbeddingGenerator::new(
                store.clone(),
                embedder.clone(),
                &config.chunking,
                embed_timeout,
            ),
            retriever: VectorRetriever::new(store.clone(), embedder, embed_timeout),
            synthesizer: AnswerSynthesizer::new(
                model.clone(),
                config.llm.max_tokens,
                config.llm.timeout(),
            ),
            agent: Agent::new(model, store.clone(), &config),
            tools: ToolContext::new(store.clone(), config.retrieval.clone()),
            store,
            config: Arc::new(config),
        }
    }

    /// Retrieve-then-answer with the configured `top_k` and threshold.
    pub async fn ask(&self, owner_id: &str, question: &str) -> Result<AskResponse> {
        synthesize::ask(
            &self.retriever,
            &self.synthesizer,
            owner_id,
            question,
            self.config.retrieval.top_k,
            self.config.retrieval.similarity_threshold,
        )
        .await
    }
}
