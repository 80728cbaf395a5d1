//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/embed` | Embed a document's text |
//! | `DELETE` | `/embed/{document_id}` | Delete a document's embeddings |
//! | `POST`   | `/search` | Keyword search with filters and paging |
//! | `POST`   | `/retrieve` | Vector retrieval |
//! | `POST`   | `/ask` | Retrieve-then-answer |
//! | `POST`   | `/chat` | Tool-driven answer loop |
//! | `GET`    | `/documents/{id}?owner_id=` | Fetch a document |
//! | `GET`    | `/tools/list` | List tools with schemas |
//! | `POST`   | `/tools/{name}?owner_id=` | Call a tool directly |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `timeout` (408),
//! `model_error` (502), `internal` (500).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use groundwork_core::models::DocumentFilter;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::agent::{AgentError, ChatRequest, ChatResponse};
use crate::app::App;
use crate::cancel::CancelToken;
use crate::ingest::EmbeddingOutcome;
use crate::lexical::{self, DocumentContent, Page, SearchResponse};
use crate::retrieve::RetrievalResult;
use crate::synthesize::AskResponse;
use crate::tools::{self, ToolCall, ToolError};

type AppState = Arc<App>;

/// Build the router. Exposed so tests can serve it on an ephemeral port.
pub fn router(app: Arc<App>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/embed", post(handle_embed))
        .route("/embed/{document_id}", delete(handle_unembed))
        .route("/search", post(handle_search))
        .route("/retrieve", post(handle_retrieve))
        .route("/ask", post(handle_ask))
        .route("/chat", post(handle_chat))
        .route("/documents/{id}", get(handle_get_document))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .layer(cors)
        .with_state(app)
}

/// Serve on `[server] bind` until the process is terminated.
pub async fn run_server(app: Arc<App>) -> anyhow::Result<()> {
    let bind_addr = app.config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening");
    axum::serve(listener, router(app)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("{:#}", err),
    }
}

impl From<AgentError> for AppError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Cancelled => AppError {
                status: StatusCode::REQUEST_TIMEOUT,
                code: "timeout",
                message: err.to_string(),
            },
            AgentError::DocumentNotFound(_) => not_found(err.to_string()),
            AgentError::Model(_) => AppError {
                status: StatusCode::BAD_GATEWAY,
                code: "model_error",
                message: err.to_string(),
            },
            AgentError::Store(e) => internal(e),
        }
    }
}

impl From<ToolError> for AppError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::UnknownTool(name) => not_found(format!("no tool registered with name: {}", name)),
            ToolError::InvalidArguments { .. } => bad_request(err.to_string()),
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(bad_request(format!("{} must not be empty", field)));
    }
    Ok(())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /embed ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest {
    document_id: String,
    owner_id: String,
    text: String,
}

/// Always 200; a failed embedding reports `success: false` in the body.
async fn handle_embed(
    State(app): State<AppState>,
    Json(req): Json<EmbedRequest>,
) -> Result<Json<EmbeddingOutcome>, AppError> {
    require("documentId", &req.document_id)?;
    Ok(Json(
        app.generator
            .embed(&req.document_id, &req.owner_id, &req.text)
            .await,
    ))
}

async fn handle_unembed(
    State(app): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let deleted = app.generator.delete(&document_id).await.map_err(internal)?;
    Ok(Json(json!({ "deleted": deleted })))
}

// ============ POST /search ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    owner_id: String,
    #[serde(default)]
    query: String,
    #[serde(flatten)]
    filter: DocumentFilter,
    page: Option<usize>,
    page_size: Option<usize>,
}

async fn handle_search(
    State(app): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let retrieval = &app.config.retrieval;
    let page = Page::new(
        req.page.unwrap_or(1),
        req.page_size.unwrap_or(retrieval.page_size),
        retrieval.max_page_size,
    );
    if page.offset().is_none() {
        return Err(bad_request(format!("page {} is out of range", page.page)));
    }
    let response = lexical::search_documents(
        app.store.as_ref(),
        &req.owner_id,
        &req.query,
        &req.filter,
        page,
    )
    .await
    .map_err(internal)?;
    Ok(Json(response))
}

// ============ POST /retrieve ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveRequest {
    owner_id: String,
    query: String,
    top_k: Option<usize>,
    threshold: Option<f64>,
}

async fn handle_retrieve(
    State(app): State<AppState>,
    Json(req): Json<RetrieveRequest>,
) -> Result<Json<RetrievalResult>, AppError> {
    let retrieval = &app.config.retrieval;
    let result = app
        .retriever
        .retrieve(
            &req.owner_id,
            &req.query,
            req.top_k.unwrap_or(retrieval.top_k),
            req.threshold.unwrap_or(retrieval.similarity_threshold),
        )
        .await
        .map_err(internal)?;
    Ok(Json(result))
}

// ============ POST /ask ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AskRequest {
    owner_id: String,
    question: String,
}

async fn handle_ask(
    State(app): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    require("question", &req.question)?;
    let response = app.ask(&req.owner_id, &req.question).await.map_err(internal)?;
    Ok(Json(response))
}

// ============ POST /chat ============

async fn handle_chat(
    State(app): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    require("question", &req.question)?;
    // A dropped connection drops this future, which stops the loop.
    let response = app.agent.chat(&req, &CancelToken::never()).await?;
    Ok(Json(response))
}

// ============ GET /documents/{id} ============

#[derive(Deserialize)]
struct OwnerQuery {
    owner_id: String,
    max_length: Option<usize>,
}

async fn handle_get_document(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<OwnerQuery>,
) -> Result<Json<DocumentContent>, AppError> {
    let max_length = q.max_length.unwrap_or(app.config.retrieval.fetch_max_chars);
    lexical::get_document(app.store.as_ref(), &q.owner_id, &id, max_length)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| not_found(format!("document not found: {}", id)))
}

// ============ /tools ============

async fn handle_list_tools() -> Json<Value> {
    Json(tools::tool_list())
}

async fn handle_tool_call(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<OwnerQuery>,
    Json(params): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let call = ToolCall::from_value(&name, params)?;
    let outcome = app
        .tools
        .execute(&q.owner_id, &call)
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "result": outcome.output })))
}
