//! Deterministic fakes shared by the integration tests.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use groundwork::app::App;
use groundwork::config::Config;
use groundwork_core::embedding::EmbeddingProvider;
use groundwork_core::llm::{GenerateRequest, LanguageModel, ModelTurn, ToolCallRequest};
use groundwork_core::store::memory::InMemoryStore;
use groundwork_core::store::Store;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DIMS: usize = 3;

/// Embeds known texts to fixed vectors and everything else to `[0, 0, 1]`.
pub struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
    pub calls: AtomicUsize,
    pub fail: bool,
    pub drop_last: bool,
}

impl TableEmbedder {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
            calls: AtomicUsize::new(0),
            fail: false,
            drop_last: false,
        }
    }

    pub fn with(mut self, text: &str, vector: [f32; DIMS]) -> Self {
        self.table.insert(text.to_string(), vector.to_vec());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    fn model_name(&self) -> &str {
        "table-embedder"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail {
            bail!("provider unavailable");
        }
        let mut out: Vec<Vec<f32>> = texts
            .iter()
            .map(|t| self.table.get(t).cloned().unwrap_or_else(|| vec![0.0, 0.0, 1.0]))
            .collect();
        if self.drop_last {
            out.pop();
        }
        Ok(out)
    }
}

/// A unit vector at cosine similarity `s` to `[1, 0, 0]`.
pub fn at_similarity(s: f32) -> [f32; DIMS] {
    [s, (1.0 - s * s).sqrt(), 0.0]
}

/// Replays scripted turns, then repeats `fallback` forever.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<ModelTurn, String>>>,
    fallback: ModelTurn,
    delay: Duration,
    pub requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<ModelTurn>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(Ok).collect()),
            fallback: ModelTurn::default(),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        let model = Self::new(Vec::new());
        model.script.lock().unwrap().push_back(Err(message.to_string()));
        model
    }

    pub fn repeating(mut self, turn: ModelTurn) -> Self {
        self.fallback = turn;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, i: usize) -> GenerateRequest {
        self.requests.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<ModelTurn> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(turn)) => Ok(turn),
            Some(Err(message)) => bail!(message),
            None => Ok(self.fallback.clone()),
        }
    }
}

/// A turn that only issues tool calls, ids `call_1..`.
pub fn tool_turn(calls: &[(&str, &str)]) -> ModelTurn {
    ModelTurn {
        text: String::new(),
        tool_calls: calls
            .iter()
            .enumerate()
            .map(|(i, (name, args))| ToolCallRequest {
                id: format!("call_{}", i + 1),
                name: name.to_string(),
                arguments: args.to_string(),
            })
            .collect(),
    }
}

pub fn test_config() -> Config {
    Config::with_db_path("unused.sqlite")
}

pub struct Harness {
    pub app: App,
    pub store: Arc<InMemoryStore>,
    pub embedder: Arc<TableEmbedder>,
    pub model: Arc<ScriptedModel>,
}

pub fn harness(config: Config, embedder: TableEmbedder, model: ScriptedModel) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(embedder);
    let model = Arc::new(model);
    let app = App::from_parts(
        config,
        store.clone() as Arc<dyn Store>,
        embedder.clone(),
        model.clone(),
    );
    Harness {
        app,
        store,
        embedder,
        model,
    }
}
