//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Answer a question (`{query, thread_id?}`) |
//! | `POST` | `/upload` | Queue a `.md`/`.txt` document for indexing (`{filename, content}`) → 202 |
//! | `GET`  | `/health` | Health check with index sizes |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500), `unavailable` (503).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted for browser clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use audit_assistant_core::error::AuditError;
use audit_assistant_core::engine::{AuditAssistant, QueryRequest};
use audit_assistant_core::search::HybridRetriever;
use audit_assistant_core::store::{InvoiceFilter, InvoiceStore};

use crate::app::Services;
use crate::ingest::ingest_document;

#[derive(Clone)]
struct AppState {
    assistant: Arc<AuditAssistant>,
    retriever: Arc<HybridRetriever>,
    invoices: Arc<dyn InvoiceStore>,
    max_tokens: usize,
}

impl AppState {
    fn from_services(services: &Services) -> Self {
        Self {
            assistant: services.assistant.clone(),
            retriever: services.retriever.clone(),
            invoices: services.invoices.clone(),
            max_tokens: services.config.ingest.max_tokens,
        }
    }
}

/// Build the router. Exposed separately from [`run_server`] for tests.
pub fn router(services: &Services) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/query", post(handle_query))
        .route("/upload", post(handle_upload))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState::from_services(services))
}

/// Serve on `[server].bind` until the process is terminated.
pub async fn run_server(services: &Services) -> anyhow::Result<()> {
    let bind_addr = services.config.server.bind.clone();
    let app = router(services);

    info!(bind = %bind_addr, mode = services.assistant.answer_mode().as_str(), "server listening");
    println!("Audit assistant listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

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

struct AppError {
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

impl From<AuditError> for AppError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::StoreUnavailable { .. } => AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "unavailable",
                message: err.to_string(),
            },
            other => {
                error!(error = %other, "query failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message: other.to_string(),
                }
            }
        }
    }
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryBody {
    query: String,
    #[serde(default)]
    thread_id: Option<String>,
}

#[derive(Serialize)]
struct QueryReply {
    response: String,
    route: String,
    scores: BTreeMap<&'static str, usize>,
    sources: Vec<String>,
    mode: &'static str,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<Json<QueryReply>, AppError> {
    if body.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let mut request = QueryRequest::new(body.query);
    if let Some(thread) = body.thread_id {
        request = request.with_session(thread);
    }

    let response = state.assistant.ask(request).await?;
    let scores = BTreeMap::from([
        ("structured", response.decision.structured_score),
        ("unstructured", response.decision.unstructured_score),
    ]);

    Ok(Json(QueryReply {
        response: response.answer,
        route: response.decision.route.as_str().to_string(),
        scores,
        sources: response.sources,
        mode: response.mode.as_str(),
    }))
}

// ============ POST /upload ============

#[derive(Deserialize)]
struct UploadBody {
    filename: String,
    content: String,
}

#[derive(Serialize)]
struct UploadReply {
    status: &'static str,
    filename: String,
}

fn valid_upload_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    !name.contains('/')
        && !name.contains('\\')
        && (lower.ends_with(".md") || lower.ends_with(".txt"))
}

async fn handle_upload(
    State(state): State<AppState>,
    Json(body): Json<UploadBody>,
) -> Result<(StatusCode, Json<UploadReply>), AppError> {
    let filename = body.filename.trim().to_string();
    if !valid_upload_name(&filename) {
        return Err(bad_request("filename must be a plain .md or .txt file name"));
    }
    if body.content.trim().is_empty() {
        return Err(bad_request("content must not be empty"));
    }

    let retriever = state.retriever.clone();
    let source = filename.clone();
    let max_tokens = state.max_tokens;
    tokio::spawn(async move {
        if let Err(e) = ingest_document(&retriever, &source, &body.content, max_tokens).await {
            error!(source = %source, error = %format!("{:#}", e), "background ingestion failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadReply {
            status: "processing",
            filename,
        }),
    ))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    mode: &'static str,
    chunks: usize,
    invoices: Option<u64>,
}

/// `invoices` is `null` when the invoice store cannot be reached.
async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let invoices = state
        .invoices
        .totals(&InvoiceFilter::all())
        .await
        .ok()
        .map(|t| t.count);

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        mode: state.assistant.answer_mode().as_str(),
        chunks: state.retriever.len().await,
        invoices,
    })
}
