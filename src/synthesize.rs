//! Grounded answer synthesis over retrieved chunks.
//!
//! The retrieved chunks are listed in the system prompt under ordinal
//! `[n]` tags and the model is asked to cite those tags. Every chunk that
//! came from a document becomes a [`Citation`] carrying its tag, so the
//! caller can resolve `[n]` markers in the answer text.

use anyhow::{anyhow, Result};
use groundwork_core::llm::{ChatMessage, GenerateRequest, LanguageModel};
use groundwork_core::models::{Citation, VectorHit};
use groundwork_core::prompt::{self, FOUND_BUT_FAILED_ANSWER, NO_EVIDENCE_ANSWER};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::retrieve::VectorRetriever;

const CITATION_SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct SynthesizedAnswer {
    pub answer: String,
    pub citations: Vec<Citation>,
}

pub struct AnswerSynthesizer {
    model: Arc<dyn LanguageModel>,
    max_tokens: u32,
    timeout: Duration,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, max_tokens: u32, timeout: Duration) -> Self {
        Self {
            model,
            max_tokens,
            timeout,
        }
    }

    /// Answer `question` from `hits` alone.
    ///
    /// With no hits the fixed no-evidence answer is returned and the model
    /// is not called.
    pub async fn synthesize(&self, question: &str, hits: &[VectorHit]) -> Result<SynthesizedAnswer> {
        if hits.is_empty() {
            info!("no evidence above threshold, skipping generation");
            return Ok(SynthesizedAnswer {
                answer: NO_EVIDENCE_ANSWER.to_string(),
                citations: Vec::new(),
            });
        }

        let request = GenerateRequest {
            system: Some(prompt::grounding_prompt(hits)),
            messages: vec![ChatMessage::user(question)],
            tools: Vec::new(),
            max_tokens: Some(self.max_tokens),
        };

        let turn = tokio::time::timeout(self.timeout, self.model.generate(&request))
            .await
            .map_err(|_| anyhow!("answer generation timed out after {:?}", self.timeout))??;

        let answer = if turn.text.trim().is_empty() {
            warn!(units = hits.len(), "model returned an empty answer");
            FOUND_BUT_FAILED_ANSWER.to_string()
        } else {
            turn.text
        };

        Ok(SynthesizedAnswer {
            answer,
            citations: citations_for(hits),
        })
    }
}

/// One citation per hit that belongs to a document, tagged `[n]` by position.
pub fn citations_for(hits: &[VectorHit]) -> Vec<Citation> {
    hits.iter()
        .enumerate()
        .filter_map(|(i, hit)| {
            let document_id = hit.document_id.as_deref()?;
            let mut citation =
                Citation::new(document_id, hit.filename.as_deref().unwrap_or("Unknown"));
            citation.snippet = Some(hit.content.chars().take(CITATION_SNIPPET_CHARS).collect());
            citation.source_tag = Some(prompt::source_tag(i));
            citation.chunk_index = Some(hit.chunk_index());
            citation.similarity = Some(hit.similarity);
            Some(citation)
        })
        .collect()
}

/// Result of a single-shot retrieve-then-answer.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub hits: Vec<VectorHit>,
}

/// Retrieve the owner's best chunks for `question`, then answer from them.
pub async fn ask(
    retriever: &VectorRetriever,
    synthesizer: &AnswerSynthesizer,
    owner_id: &str,
    question: &str,
    top_k: usize,
    threshold: f64,
) -> Result<AskResponse> {
    let retrieved = retriever.retrieve(owner_id, question, top_k, threshold).await?;
    let answer = synthesizer.synthesize(question, &retrieved.hits).await?;
    Ok(AskResponse {
        answer: answer.answer,
        citations: answer.citations,
        hits: retrieved.hits,
    })
}
