use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::MultipartRejection,
        rejection::JsonRejection,
    },
    routing::{get, post},
};
use docqa_rag::huggingface::{HuggingFaceConfig, HuggingFaceEmbeddingProvider, HuggingFaceGenerator};
use docqa_rag::{RagError, RetrievalEngine, UploadedFile};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::protocol::{IngestResponse, MessageResponse, QueryRequest, QueryResponse};

const ROOT_WELCOME: &str =
    "Welcome to the RAG Document Retrieval System. Visit /api for the API.";
const API_WELCOME: &str = "Welcome to the RAG API.";

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RetrievalEngine>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(engine: RetrievalEngine, max_upload_bytes: usize) -> Self {
        Self { engine: Arc::new(engine), max_upload_bytes }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("persist_directory", &self.engine.persist_directory())
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(api_welcome))
        .route("/ingest", post(ingest))
        .route("/query", post(query))
        .route("/reset", post(reset))
}

/// Build the application router
pub fn app_router(state: AppState) -> Router {
    let max_upload_bytes = state.max_upload_bytes;

    Router::new()
        .route("/", get(root_welcome))
        .route("/ingest", post(ingest))
        .route("/query", post(query))
        .route("/reset", post(reset))
        .nest("/api", api_routes())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Wire the Hugging Face backends into an engine.
pub fn build_engine(config: &ServerConfig) -> anyhow::Result<RetrievalEngine> {
    let hub = |model: &str| {
        HuggingFaceConfig::new(model)
            .with_api_base(&config.hf_api_base)
            .with_token(config.hf_token.clone())
    };

    let engine = RetrievalEngine::builder()
        .config(config.rag_config()?)
        .persist_directory(&config.persist_directory)
        .embedding_provider(Arc::new(HuggingFaceEmbeddingProvider::new(hub(&config.embedding_model))))
        .generator(Arc::new(HuggingFaceGenerator::new(hub(&config.llm_model))))
        .loaders(config.loader_registry())
        .build()?;
    Ok(engine)
}

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let engine = build_engine(&config)?;
    let app = app_router(AppState::new(engine, config.max_upload_bytes));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        addr = %listener.local_addr()?,
        persist_directory = %config.persist_directory.display(),
        embedding_model = %config.embedding_model,
        llm_model = %config.llm_model,
        "docqa-server listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    info!("docqa-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}

async fn root_welcome() -> Json<MessageResponse> {
    Json(MessageResponse::new(ROOT_WELCOME))
}

async fn api_welcome() -> Json<MessageResponse> {
    Json(MessageResponse::new(API_WELCOME))
}

/// POST /ingest - Upload one or more documents
async fn ingest(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<IngestResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let mut files = Vec::new();
    let mut replace = false;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("files") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                files.push(UploadedFile::new(name, bytes.to_vec()));
            }
            Some("replace") => replace = parse_bool(&field.text().await?)?,
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(ApiError::BadRequest("Upload at least one file in the 'files' field.".into()));
    }

    let report = state.engine.ingest(files, replace).await?;
    Ok(Json(report.into()))
}

/// POST /query - Answer a question from the ingested documents
async fn query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let k = req.k.map(|k| usize::try_from(k).unwrap_or(0));

    match state.engine.retrieve(&req.question, k).await {
        Ok(result) => Ok(Json(result.into())),
        Err(e @ RagError::StoreNotInitialized) => Ok(Json(QueryResponse::no_store(e.to_string()))),
        Err(e) => Err(e.into()),
    }
}

/// POST /reset - Discard all ingested documents
async fn reset(State(state): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    let message = state.engine.reset().await?;
    Ok(Json(MessageResponse::new(message)))
}

/// Form booleans as HTML forms and common clients send them.
fn parse_bool(value: &str) -> Result<bool, ApiError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(ApiError::BadRequest(format!("'replace' must be a boolean, got '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true").unwrap());
        assert!(parse_bool(" TRUE ").unwrap());
        assert!(parse_bool("1").unwrap());
        assert!(!parse_bool("false").unwrap());
        assert!(!parse_bool("").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_build_engine_from_defaults() {
        use clap::Parser;

        let dir = tempfile::tempdir().unwrap();
        let persist = dir.path().join("db");
        let config = ServerConfig::try_parse_from([
            "docqa-server",
            "--persist-directory",
            persist.to_str().unwrap(),
        ])
        .unwrap();

        let engine = build_engine(&config).unwrap();
        assert_eq!(engine.persist_directory(), persist);
        assert_eq!(engine.config().collection_name, "my_docs");
        assert!(!persist.exists());
    }
}
