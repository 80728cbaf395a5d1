//! Tools the answer loop exposes to the model.
//!
//! Two tools are available, both scoped to the requesting owner:
//!
//! | Tool | Arguments | Delegates to |
//! |------|-----------|--------------|
//! | `search_documents` | `query`, `documentType?`, `documentYear?`, `dateFrom?`, `dateTo?`, `page?`, `pageSize?` | [`search_documents`] |
//! | `get_document` | `documentId`, `maxLength?` | [`get_document`] |
//!
//! A model-issued call arrives as a name plus raw JSON text. [`ToolCall::parse`]
//! turns that pair into a typed call; unknown names and malformed arguments
//! become a [`ToolError`] that is reported back to the model instead of
//! aborting the loop. The same enum backs `POST /tools/{name}`.

use anyhow::Result;
use groundwork_core::llm::ToolSpec;
use groundwork_core::models::{Activity, Citation, DocumentFilter};
use groundwork_core::store::Store;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::config::RetrievalConfig;
use crate::lexical::{get_document, search_documents, Page};

pub const SEARCH_DOCUMENTS: &str = "search_documents";
pub const GET_DOCUMENT: &str = "get_document";

const NOT_FOUND_MESSAGE: &str = "Document not found or you do not have access to it.";
const CITATION_SNIPPET_CHARS: usize = 200;

/// Why a tool call could not be turned into a [`ToolCall`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchArgs {
    pub query: String,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub document_year: Option<String>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl SearchArgs {
    pub fn filter(&self) -> DocumentFilter {
        DocumentFilter {
            document_type: self.document_type.clone(),
            document_year: self.document_year.clone(),
            date_from: self.date_from.clone(),
            date_to: self.date_to.clone(),
        }
    }
}

fn default_page() -> usize {
    1
}
fn default_page_size() -> usize {
    10
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchArgs {
    pub document_id: String,
    #[serde(default)]
    pub max_length: Option<usize>,
}

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum ToolCall {
    SearchDocuments(SearchArgs),
    GetDocument(FetchArgs),
}

impl ToolCall {
    /// Parse a model-issued call from its name and raw argument text.
    ///
    /// Blank argument text is read as `{}`.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolError> {
        let args: Value = if arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(arguments).map_err(|e| ToolError::InvalidArguments {
                tool: name.to_string(),
                message: e.to_string(),
            })?
        };
        Self::from_value(name, args)
    }

    /// Build a call from a name and already-parsed JSON arguments.
    pub fn from_value(name: &str, args: Value) -> Result<Self, ToolError> {
        if name != SEARCH_DOCUMENTS && name != GET_DOCUMENT {
            return Err(ToolError::UnknownTool(name.to_string()));
        }
        serde_json::from_value(json!({ "tool": name, "args": args })).map_err(|e| {
            ToolError::InvalidArguments {
                tool: name.to_string(),
                message: e.to_string(),
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::SearchDocuments(_) => SEARCH_DOCUMENTS,
            ToolCall::GetDocument(_) => GET_DOCUMENT,
        }
    }
}

/// The activity entry shown for a call, even when its arguments are malformed.
pub fn activity_for(name: &str, arguments: &str) -> Option<Activity> {
    match name {
        SEARCH_DOCUMENTS => {
            let query = serde_json::from_str::<Value>(arguments)
                .ok()
                .and_then(|v| v.get("query").and_then(|q| q.as_str()).map(str::to_string))
                .unwrap_or_default();
            Some(Activity::search(&query))
        }
        GET_DOCUMENT => Some(Activity::retrieve()),
        _ => None,
    }
}

/// Debug record of one tool call and its result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub arguments: Value,
    pub result: Value,
}

/// JSON output of a tool plus the citations it surfaced.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub output: Value,
    pub citations: Vec<Citation>,
}

/// Tool output reporting a failure to the model.
pub fn error_output(message: &str) -> Value {
    json!({ "error": message })
}

/// Executes tool calls for one owner against the store.
#[derive(Clone)]
pub struct ToolContext {
    store: Arc<dyn Store>,
    retrieval: RetrievalConfig,
}

impl ToolContext {
    pub fn new(store: Arc<dyn Store>, retrieval: RetrievalConfig) -> Self {
        Self { store, retrieval }
    }

    pub async fn execute(&self, owner_id: &str, call: &ToolCall) -> Result<ToolOutcome> {
        match call {
            ToolCall::SearchDocuments(args) => self.search(owner_id, args).await,
            ToolCall::GetDocument(args) => self.fetch(owner_id, args).await,
        }
    }

    async fn search(&self, owner_id: &str, args: &SearchArgs) -> Result<ToolOutcome> {
        let page = Page::new(args.page, args.page_size, self.retrieval.max_page_size);
        if page.offset().is_none() {
            let err = ToolError::InvalidArguments {
                tool: SEARCH_DOCUMENTS.to_string(),
                message: format!("page {} is out of range", args.page),
            };
            return Ok(ToolOutcome {
                output: error_output(&err.to_string()),
                citations: Vec::new(),
            });
        }
        let response =
            search_documents(self.store.as_ref(), owner_id, &args.query, &args.filter(), page)
                .await?;

        let results: Vec<Value> = response
            .results
            .iter()
            .map(|hit| {
                json!({
                    "id": hit.id,
                    "filename": hit.filename,
                    "type": hit.document_type,
                    "year": hit.document_year,
                    "date": hit.document_date,
                    "snippet": hit.headline,
                    "relevance": hit.rank,
                })
            })
            .collect();

        let citations = response
            .results
            .iter()
            .map(|hit| {
                let mut c = Citation::new(&hit.id, &hit.filename);
                c.document_type = hit.document_type.clone();
                c.snippet = Some(hit.headline.chars().take(CITATION_SNIPPET_CHARS).collect());
                c
            })
            .collect();

        let output = json!({
            "results": results,
            "total": response.total,
            "page": response.page,
            "hasMore": response.has_more,
            "message": format!(
                "Found {} documents. Showing {} results on page {}.",
                response.total,
                response.results.len(),
                response.page
            ),
        });

        Ok(ToolOutcome { output, citations })
    }

    async fn fetch(&self, owner_id: &str, args: &FetchArgs) -> Result<ToolOutcome> {
        let max_length = args.max_length.unwrap_or(self.retrieval.fetch_max_chars);
        let Some(doc) =
            get_document(self.store.as_ref(), owner_id, &args.document_id, max_length).await?
        else {
            return Ok(ToolOutcome {
                output: json!({ "success": false, "error": NOT_FOUND_MESSAGE }),
                citations: Vec::new(),
            });
        };

        let mut citation = Citation::new(&doc.id, &doc.filename);
        citation.document_type = doc.document_type.clone();
        // Only the leading `max_length` chars are document text.
        citation.snippet = Some(
            doc.content
                .chars()
                .take(CITATION_SNIPPET_CHARS.min(max_length))
                .collect(),
        );

        let output = json!({
            "success": true,
            "id": doc.id,
            "filename": doc.filename,
            "type": doc.document_type,
            "year": doc.document_year,
            "date": doc.document_date,
            "mimeType": doc.mime_type,
            "size": doc.size,
            "content": doc.content,
            "createdAt": doc.created_at,
        });

        Ok(ToolOutcome {
            output,
            citations: vec![citation],
        })
    }
}

/// Specs handed to the model on every loop turn.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: SEARCH_DOCUMENTS.to_string(),
            description: "Keyword search over the user's documents. Every term must appear; terms match word prefixes. Returns ranked documents with highlighted snippets.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Keywords to search for" },
                    "documentType": { "type": "string", "description": "Only documents of this type" },
                    "documentYear": { "type": "string", "description": "Only documents from this year (YYYY)" },
                    "dateFrom": { "type": "string", "description": "Earliest document date (YYYY-MM-DD)" },
                    "dateTo": { "type": "string", "description": "Latest document date (YYYY-MM-DD)" },
                    "page": { "type": "integer", "description": "Result page, starting at 1", "default": 1 },
                    "pageSize": { "type": "integer", "description": "Results per page", "default": 10 }
                },
                "required": ["query"]
            }),
        },
        ToolSpec {
            name: GET_DOCUMENT.to_string(),
            description: "Fetch the full text of one document by id.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "documentId": { "type": "string", "description": "Document id from search results" },
                    "maxLength": { "type": "integer", "description": "Maximum characters of content to return", "default": 50000 }
                },
                "required": ["documentId"]
            }),
        },
    ]
}

/// Body of `GET /tools/list`.
pub fn tool_list() -> Value {
    let tools: Vec<Value> = tool_specs()
        .into_iter()
        .map(|spec| {
            json!({
                "name": spec.name,
                "description": spec.description,
                "builtin": true,
                "parameters": spec.parameters,
            })
        })
        .collect();
    json!({ "tools": tools })
}
