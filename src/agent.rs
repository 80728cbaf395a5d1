//! The tool-driven answer loop.
//!
//! [`Agent::chat`] hands the question to the language model together with
//! the `search_documents` and `get_document` tools, runs whatever tool
//! calls the model issues, and feeds the results back until the model
//! answers in plain text.
//!
//! # Bounds
//!
//! - At most `[agent] max_turns` model calls.
//! - The whole loop runs under `[agent] deadline_secs`; each model call
//!   additionally under `[llm] timeout_secs`.
//! - A [`CancelToken`] is raced against every model call and every batch
//!   of tool calls. Once it fires no further calls are made.
//!
//! # Stall recovery
//!
//! When the loop ends without answer text (the model stopped after tool
//! calls, or a bound was hit) and at least one document was cited, the
//! first cited document is fetched and the model is asked once more,
//! without tools, to answer from that document's text. If that also
//! produces nothing a fixed fallback answer is used, so the response text
//! is never empty. The recovery call shares the loop deadline; once the
//! deadline is spent the fallback is used without calling the model.

use anyhow::anyhow;
use futures::future::join_all;
use groundwork_core::citations::dedup_citations;
use groundwork_core::llm::{ChatMessage, GenerateRequest, LanguageModel, ModelTurn, ToolCallRequest};
use groundwork_core::models::{Activity, Citation, Document};
use groundwork_core::prompt::{
    self, AGENT_SYSTEM_PROMPT, FOUND_BUT_FAILED_ANSWER, NOTHING_FOUND_ANSWER,
};
use groundwork_core::store::Store;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::tools::{self, ToolCall, ToolCallRecord, ToolContext, ToolOutcome};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("request cancelled")]
    Cancelled,
    #[error("referenced document not found: {0}")]
    DocumentNotFound(String),
    #[error("language model call failed: {0:#}")]
    Model(anyhow::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Author of a prior conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: HistoryRole,
    pub content: String,
}

impl HistoryMessage {
    fn to_chat_message(&self) -> ChatMessage {
        match self.role {
            HistoryRole::User => ChatMessage::user(self.content.clone()),
            HistoryRole::Assistant => ChatMessage::assistant(self.content.clone(), Vec::new()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(alias = "owner_id")]
    pub owner_id: String,
    pub question: String,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
    /// Documents the user pointed at explicitly; their text is inlined.
    #[serde(default, alias = "referenced_document_ids")]
    pub referenced_document_ids: Vec<String>,
}

impl ChatRequest {
    pub fn new(owner_id: &str, question: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            question: question.to_string(),
            history: Vec::new(),
            referenced_document_ids: Vec::new(),
        }
    }
}

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The model answered in plain text.
    Answered,
    /// The model stopped without answer text.
    Stalled,
    /// `max_turns` model calls were spent.
    TurnLimit,
    /// The loop deadline passed.
    Deadline,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub tool_call_count: usize,
    pub tool_call_details: Vec<ToolCallRecord>,
    pub activities: Vec<Activity>,
    pub termination: Termination,
    /// Whether the answer came from stall recovery or a fallback.
    pub recovered: bool,
}

/// Loop limits, taken from `[agent]`, `[llm]` and `[retrieval]`.
#[derive(Debug, Clone, Copy)]
pub struct AgentSettings {
    pub max_turns: usize,
    pub deadline: Duration,
    pub llm_timeout: Duration,
    pub max_tokens: u32,
    pub recovery_max_chars: usize,
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_turns: config.agent.max_turns,
            deadline: config.agent.deadline(),
            llm_timeout: config.llm.timeout(),
            max_tokens: config.llm.max_tokens,
            recovery_max_chars: config.retrieval.recovery_max_chars,
        }
    }
}

pub struct Agent {
    model: Arc<dyn LanguageModel>,
    store: Arc<dyn Store>,
    tools: ToolContext,
    settings: AgentSettings,
}

/// Everything collected while the loop runs.
#[derive(Default)]
struct LoopState {
    answer: String,
    citations: Vec<Citation>,
    activities: Vec<Activity>,
    records: Vec<ToolCallRecord>,
    tool_call_count: usize,
}

impl Agent {
    pub fn new(model: Arc<dyn LanguageModel>, store: Arc<dyn Store>, config: &Config) -> Self {
        Self {
            tools: ToolContext::new(store.clone(), config.retrieval.clone()),
            model,
            store,
            settings: AgentSettings::from_config(config),
        }
    }

    pub async fn chat(
        &self,
        request: &ChatRequest,
        cancel: &CancelToken,
    ) -> Result<ChatResponse, AgentError> {
        let started = Instant::now();
        let deadline = started + self.settings.deadline;
        let owner_id = request.owner_id.as_str();

        let referenced = self.referenced_documents(request).await?;

        let mut question = request.question.clone();
        question.push_str(&prompt::referenced_documents_context(&referenced));

        let mut messages: Vec<ChatMessage> = request
            .history
            .iter()
            .map(HistoryMessage::to_chat_message)
            .collect();
        messages.push(ChatMessage::user(question));

        let mut state = LoopState::default();
        let mut termination = Termination::TurnLimit;

        for turn_index in 0..self.settings.max_turns {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                termination = Termination::Deadline;
                break;
            }

            let request = GenerateRequest {
                system: Some(AGENT_SYSTEM_PROMPT.to_string()),
                messages: messages.clone(),
                tools: tools::tool_specs(),
                max_tokens: Some(self.settings.max_tokens),
            };

            let turn = match self.generate_bounded(&request, deadline, cancel).await? {
                Some(turn) => turn,
                None => {
                    termination = Termination::Deadline;
                    break;
                }
            };

            if turn.tool_calls.is_empty() {
                state.answer = turn.text;
                termination = if state.answer.trim().is_empty() {
                    Termination::Stalled
                } else {
                    Termination::Answered
                };
                break;
            }

            debug!(turn = turn_index, calls = turn.tool_calls.len(), "model requested tools");
            messages.push(ChatMessage::assistant(turn.text.clone(), turn.tool_calls.clone()));

            let outcomes = tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                outcomes = join_all(turn.tool_calls.iter().map(|c| self.run_tool(owner_id, c))) => outcomes,
            };

            for (call, (output, citations)) in turn.tool_calls.iter().zip(outcomes) {
                state.tool_call_count += 1;
                if let Some(activity) = tools::activity_for(&call.name, &call.arguments) {
                    state.activities.push(activity);
                }
                state.citations.extend(citations);
                state.records.push(ToolCallRecord {
                    tool_name: call.name.clone(),
                    arguments: serde_json::from_str(&call.arguments)
                        .unwrap_or_else(|_| Value::String(call.arguments.clone())),
                    result: output.clone(),
                });
                messages.push(ChatMessage::tool_result(&call.id, output.to_string()));
            }
        }

        let mut citations = dedup_citations(std::mem::take(&mut state.citations));
        if !referenced.is_empty() {
            citations.extend(referenced.iter().map(|doc| {
                let mut c = Citation::new(&doc.id, &doc.filename);
                c.document_type = doc.document_type.clone();
                c
            }));
            citations = dedup_citations(citations);
        }

        let mut recovered = false;
        if state.answer.trim().is_empty() {
            recovered = true;
            state.answer = match citations.first() {
                Some(first) => {
                    warn!(?termination, document_id = %first.document_id, "no answer text, attempting recovery");
                    self.recover(owner_id, &request.question, first, deadline, cancel)
                        .await?
                }
                None => {
                    info!(?termination, "no answer and no citations");
                    NOTHING_FOUND_ANSWER.to_string()
                }
            };
        }

        info!(
            owner_id,
            ?termination,
            tool_calls = state.tool_call_count,
            citations = citations.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "chat finished"
        );

        Ok(ChatResponse {
            answer: state.answer,
            citations,
            tool_call_count: state.tool_call_count,
            tool_call_details: state.records,
            activities: state.activities,
            termination,
            recovered,
        })
    }

    /// One model call under the per-call timeout, the loop deadline, and
    /// cancellation. `Ok(None)` means the deadline cut the call short.
    async fn generate_bounded(
        &self,
        request: &GenerateRequest,
        deadline: Instant,
        cancel: &CancelToken,
    ) -> Result<Option<ModelTurn>, AgentError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let limit = remaining.min(self.settings.llm_timeout);

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            result = tokio::time::timeout(limit, self.model.generate(request)) => result,
        };

        match result {
            Ok(Ok(turn)) => Ok(Some(turn)),
            Ok(Err(e)) => Err(AgentError::Model(e)),
            Err(_) if remaining <= self.settings.llm_timeout => Ok(None),
            Err(_) => Err(AgentError::Model(anyhow!(
                "model call timed out after {:?}",
                self.settings.llm_timeout
            ))),
        }
    }

    /// Execute one model-issued call. Failures become an `{"error": ...}`
    /// output for the model rather than aborting the loop.
    async fn run_tool(&self, owner_id: &str, call: &ToolCallRequest) -> (Value, Vec<Citation>) {
        let parsed = match ToolCall::parse(&call.name, &call.arguments) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "rejected tool call");
                return (tools::error_output(&e.to_string()), Vec::new());
            }
        };

        match self.tools.execute(owner_id, &parsed).await {
            Ok(ToolOutcome { output, citations }) => {
                info!(tool = parsed.name(), citations = citations.len(), "tool call");
                (output, citations)
            }
            Err(e) => {
                warn!(tool = parsed.name(), error = %e, "tool execution failed");
                (tools::error_output(&e.to_string()), Vec::new())
            }
        }
    }

    /// One tool-free generation from the first cited document, bounded by
    /// whatever is left of the loop deadline.
    async fn recover(
        &self,
        owner_id: &str,
        question: &str,
        citation: &Citation,
        deadline: Instant,
        cancel: &CancelToken,
    ) -> Result<String, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!("deadline spent, skipping recovery");
            return Ok(FOUND_BUT_FAILED_ANSWER.to_string());
        }

        let doc = match self.store.get_document(owner_id, &citation.document_id).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                warn!(document_id = %citation.document_id, "recovery document vanished");
                return Ok(FOUND_BUT_FAILED_ANSWER.to_string());
            }
            Err(e) => {
                warn!(error = %e, "recovery fetch failed");
                return Ok(FOUND_BUT_FAILED_ANSWER.to_string());
            }
        };

        let request = GenerateRequest {
            system: None,
            messages: vec![ChatMessage::user(prompt::recovery_prompt(
                question,
                &doc.filename,
                &doc.content,
                self.settings.recovery_max_chars,
            ))],
            tools: Vec::new(),
            max_tokens: Some(self.settings.max_tokens),
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            result = tokio::time::timeout(remaining.min(self.settings.llm_timeout), self.model.generate(&request)) => result,
        };

        match result {
            Ok(Ok(turn)) if !turn.text.trim().is_empty() => {
                info!(document_id = %doc.id, "recovered answer");
                Ok(turn.text)
            }
            Ok(Ok(_)) => {
                warn!("recovery produced no text");
                Ok(FOUND_BUT_FAILED_ANSWER.to_string())
            }
            Ok(Err(e)) => {
                warn!(error = %e, "recovery generation failed");
                Ok(FOUND_BUT_FAILED_ANSWER.to_string())
            }
            Err(_) => {
                warn!("recovery generation timed out");
                Ok(FOUND_BUT_FAILED_ANSWER.to_string())
            }
        }
    }

    async fn referenced_documents(&self, request: &ChatRequest) -> Result<Vec<Document>, AgentError> {
        let mut docs = Vec::with_capacity(request.referenced_document_ids.len());
        for id in &request.referenced_document_ids {
            match self.store.get_document(&request.owner_id, id).await? {
                Some(doc) => docs.push(doc),
                None => return Err(AgentError::DocumentNotFound(id.clone())),
            }
        }
        Ok(docs)
    }
}
