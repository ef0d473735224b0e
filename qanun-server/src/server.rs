use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use qanun_rag::openai::{OpenAIChatGenerator, OpenAIEmbeddingProvider};
use qanun_rag::{Corpus, QaPipeline, RagError, Retriever};
use qanun_session::{Conversation, ConversationStore, HistoryEntry, SessionError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::identity::{SwitchSession, Visitor, identify};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<QaPipeline>,
    pub conversations: ConversationStore,
}

impl AppState {
    pub fn new(pipeline: Arc<QaPipeline>, conversations: ConversationStore) -> Self {
        Self { pipeline, conversations }
    }
}

/// Errors returned to HTTP clients. Bodies never carry internal detail.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Empty message")]
    EmptyMessage,
    #[error("not found")]
    NotFound,
    #[error("failed to answer question")]
    Answer,
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::EmptyMessage => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Answer | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(_) => Self::NotFound,
            other => {
                error!(error = %other, "conversation store failure");
                Self::Internal
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
}

/// Routes without the outer layers.
///
/// Everything except `/health` passes through [`identify`].
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/chat", post(chat))
        .route("/api/history", get(history))
        .route("/api/session/{session_id}", get(session))
        .route("/api/clear", post(clear))
        .route("/api/new_session", post(new_session))
        .route_layer(middleware::from_fn_with_state(state.clone(), identify))
        .route("/health", get(health))
        .with_state(state)
}

/// The full application: routes plus tracing, timeout and CORS layers.
pub fn app_router(state: AppState, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    routes(state)
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Load the corpus, connect the collaborators, and serve until Ctrl-C.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let docs = config.docs_path();
    let vectors = config.vectors_path();
    let corpus = tokio::task::spawn_blocking({
        let (docs, vectors) = (docs.clone(), vectors.clone());
        move || Corpus::load(docs, vectors)
    })
    .await
    .context("corpus loader panicked")?
    .with_context(|| format!("failed to load corpus from {} and {}", docs.display(), vectors.display()))?;
    corpus.verify().context("corpus index and document store disagree")?;
    info!(chunks = corpus.len(), dimensions = corpus.dimensions(), "corpus ready");

    let pipeline = build_pipeline(&config, Arc::new(corpus))?;
    let conversations = ConversationStore::open(&config.conversations_dir)
        .await
        .with_context(|| format!("failed to open {}", config.conversations_dir.display()))?;

    let app = app_router(AppState::new(Arc::new(pipeline), conversations), config.request_timeout);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for qanun server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("qanun listening on http://{}", addr);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    info!("qanun shut down");
    Ok(())
}

fn build_pipeline(config: &ServerConfig, corpus: Arc<Corpus>) -> Result<QaPipeline, RagError> {
    let mut embedder = OpenAIEmbeddingProvider::new(&config.embedding.url)
        .with_model(&config.embedding.model)
        .with_dimensions(corpus.dimensions());
    if let Some(key) = &config.embedding.api_key {
        embedder = embedder.with_api_key(key);
    }
    let generator = OpenAIChatGenerator::new(&config.generation.url, &config.generation.api_key)?
        .with_model(&config.generation.model)
        .with_temperature(config.generation.temperature);

    QaPipeline::builder()
        .retriever(Arc::new(Retriever::new(corpus, config.rag.top_k)?))
        .config(config.rag.clone())
        .embedding_provider(Arc::new(embedder))
        .generator(Arc::new(generator))
        .build()
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "cannot listen for Ctrl-C; serving until killed");
            std::future::pending::<()>().await;
        }
    }
}

async fn index() -> impl IntoResponse {
    Html(include_str!("../ui/index.html"))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let chunks = state.pipeline.retriever().corpus().len();
    Json(json!({"status": "ok", "service": "qanun", "chunks": chunks}))
}

async fn chat(
    State(state): State<AppState>,
    Extension(visitor): Extension<Visitor>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = request.message.unwrap_or_default();
    if message.trim().is_empty() {
        return Err(ApiError::EmptyMessage);
    }

    let answer = state.pipeline.answer(&message).await.map_err(|e| {
        error!(session_id = %visitor.session_id, error = %e, kind = ?e.kind(), "chat failed");
        match e {
            RagError::EmptyQuery => ApiError::EmptyMessage,
            _ => ApiError::Answer,
        }
    })?;

    state.conversations.append_exchange(&visitor.session_id, &message, &answer).await.map_err(|e| {
        error!(session_id = %visitor.session_id, error = %e, "failed to record exchange");
        ApiError::Answer
    })?;

    Ok(Json(ChatResponse { answer }))
}

async fn history(
    State(state): State<AppState>,
    Extension(visitor): Extension<Visitor>,
) -> Json<Vec<HistoryEntry>> {
    Json(state.conversations.history(&visitor.user_id).await)
}

async fn session(
    State(state): State<AppState>,
    Extension(visitor): Extension<Visitor>,
    Path(session_id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    Ok(Json(state.conversations.transcript(&session_id, &visitor.user_id).await?))
}

async fn clear(
    State(state): State<AppState>,
    Extension(visitor): Extension<Visitor>,
) -> Result<StatusCode, ApiError> {
    state.conversations.clear(&visitor.session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn new_session(
    State(state): State<AppState>,
    Extension(visitor): Extension<Visitor>,
) -> Result<Response, ApiError> {
    let session_id = state.conversations.create_session(&visitor.user_id).await?;
    let mut response = StatusCode::NO_CONTENT.into_response();
    response.extensions_mut().insert(SwitchSession(session_id));
    Ok(response)
}
