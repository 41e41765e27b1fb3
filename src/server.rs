//! JSON HTTP API for the notes assistant.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/subjects` | Processed documents grouped by subject |
//! | `POST` | `/api/chat` | Answer a question from a subject or one document |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Error responses carry a single message:
//!
//! ```json
//! { "error": "Missing 'query'" }
//! ```
//!
//! Answering itself never produces an HTTP error; degraded or failed answers
//! come back as `200` with a fixed explanatory `answer` string.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! served from another origin can call the API.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::metadata::MetadataStore;
use crate::models::DocumentSummary;
use crate::rag::{Responder, Scope};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub responder: Arc<Responder>,
    /// `None` when the metadata database could not be opened at startup.
    pub metadata: Option<Arc<dyn MetadataStore>>,
}

/// Binds `[server].bind` and serves until the process is terminated.
pub async fn run_server(config: &Config, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.server.bind).await?;
    println!("Sahayak server listening on http://{}", config.server.bind);
    serve(listener, state).await
}

/// Serves the API on an already-bound listener.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/subjects", get(handle_subjects))
        .route("/api/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
    }
}

fn database_unavailable() -> AppError {
    internal("Database connection not available")
}

fn database_error(err: anyhow::Error) -> AppError {
    error!(error = %format!("{:#}", err), "Metadata query failed");
    internal("Database error. Please check the server logs.")
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

// ============ GET /api/subjects ============

/// Groups processed documents under their subject name.
async fn handle_subjects(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, Vec<DocumentSummary>>>, AppError> {
    let metadata = state.metadata.as_ref().ok_or_else(database_unavailable)?;
    let docs = metadata
        .list_processed_documents()
        .await
        .map_err(database_error)?;

    let mut grouped: BTreeMap<String, Vec<DocumentSummary>> = BTreeMap::new();
    for doc in docs {
        grouped.entry(doc.subject_name.clone()).or_default().push(doc);
    }
    Ok(Json(grouped))
}

// ============ POST /api/chat ============

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChatRequest {
    pub subject_name: Option<String>,
    pub doc_id: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Answers from the named subject, or from one document when only `doc_id`
/// is given. `subject_name` wins when both are present.
async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = body.map_err(|e| bad_request(format!("Invalid request body: {}", e)))?;

    let query = non_empty(&req.query).ok_or_else(|| bad_request("Missing 'query'"))?;

    let scope = if let Some(subject) = non_empty(&req.subject_name) {
        Scope::Subject(subject.to_string())
    } else if let Some(doc_id) = non_empty(&req.doc_id) {
        resolve_document(&state, doc_id).await?
    } else {
        return Err(bad_request("Missing 'subject_name' or 'doc_id'"));
    };

    info!(collection = %scope.collection(), "Chat request");
    let answer = state.responder.answer_in(&scope, query).await;
    Ok(Json(ChatResponse { answer }))
}

async fn resolve_document(state: &AppState, doc_id: &str) -> Result<Scope, AppError> {
    let metadata = state.metadata.as_ref().ok_or_else(database_unavailable)?;

    let doc = metadata
        .get_document(doc_id)
        .await
        .map_err(database_error)?
        .ok_or_else(|| not_found(format!("Document not found: {}", doc_id)))?;
    let subject = metadata
        .get_subject(doc.subject_id)
        .await
        .map_err(database_error)?
        .ok_or_else(|| not_found(format!("Subject not found for document: {}", doc_id)))?;

    Ok(Scope::Document {
        subject: subject.name,
        document_id: doc.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::InMemoryVectorStore;

    fn degraded_state() -> AppState {
        AppState {
            responder: Arc::new(Responder::new(
                None,
                None,
                Arc::new(InMemoryVectorStore::new()),
                3,
            )),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn chat_requires_query() {
        let req = ChatRequest {
            subject_name: Some("Physics".to_string()),
            doc_id: None,
            query: Some("   ".to_string()),
        };
        let err = handle_chat(State(degraded_state()), Ok(Json(req)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_requires_a_selector() {
        let req = ChatRequest {
            query: Some("What is F=ma?".to_string()),
            ..ChatRequest::default()
        };
        let err = handle_chat(State(degraded_state()), Ok(Json(req)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn doc_id_without_database_is_500() {
        let req = ChatRequest {
            doc_id: Some("abc".to_string()),
            query: Some("What is F=ma?".to_string()),
            ..ChatRequest::default()
        };
        let err = handle_chat(State(degraded_state()), Ok(Json(req)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Database connection not available");
    }

    #[tokio::test]
    async fn degraded_models_still_answer_200() {
        let req = ChatRequest {
            subject_name: Some("Physics".to_string()),
            query: Some("What is F=ma?".to_string()),
            ..ChatRequest::default()
        };
        let Json(resp) = handle_chat(State(degraded_state()), Ok(Json(req)))
            .await
            .unwrap();
        assert_eq!(resp.answer, crate::rag::MODELS_UNAVAILABLE);
    }

    #[tokio::test]
    async fn subjects_without_database_is_500() {
        let err = handle_subjects(State(degraded_state())).await.unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
