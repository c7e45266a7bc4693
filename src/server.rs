//! HTTP service for saving and searching thought traces.
//!
//! # Endpoints
//!
//! - `GET /` - Health check
//! - `POST /trace` - Save a trace (embeds it, appends vector and record)
//! - `GET /traces` - List every stored trace
//! - `GET /search?q=` - Case-insensitive substring search
//! - `GET /semantic-search?q=&top_k=` - Nearest-neighbor search over embeddings

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::config::SkillShadowConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{Result, ShadowError};
use crate::index::FlatIndex;
use crate::trace::{NewTrace, ThoughtTrace, TraceStore};

pub const HEALTH_STATUS: &str = "Skill-Shadow backend is running";
pub const SAVED_MESSAGE: &str = "Thought trace saved successfully";

/// Process-wide service context, built once at startup and shared by every handler.
///
/// The index mutex doubles as the writer lock: a save holds it from the vector append
/// through the store rewrite, so concurrent saves cannot interleave and the store and
/// index stay the same length.
pub struct AppState {
    pub store: TraceStore,
    pub index: Mutex<FlatIndex>,
    pub embedding: Arc<dyn EmbeddingProvider>,
    pub default_top_k: usize,
}

impl AppState {
    pub fn new(
        store: TraceStore,
        index: FlatIndex,
        embedding: Arc<dyn EmbeddingProvider>,
        default_top_k: usize,
    ) -> Self {
        Self {
            store,
            index: Mutex::new(index),
            embedding,
            default_top_k,
        }
    }

    /// Open the store and index at the configured paths around an already loaded
    /// embedding provider.
    pub fn open(
        config: &SkillShadowConfig,
        embedding: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let store = TraceStore::new(config.resolved_traces_path());
        let index = FlatIndex::load_or_create(config.resolved_index_path(), embedding.dimensions())?;

        let stored = store.len()?;
        if stored != index.len() {
            tracing::warn!(
                traces = stored,
                vectors = index.len(),
                "trace store and vector index lengths differ; run `skill-shadow reindex`"
            );
        }
        tracing::info!(
            store = %store.path().display(),
            index = %index.path().display(),
            traces = stored,
            "trace storage ready"
        );

        Ok(Self::new(store, index, embedding, config.retrieval.default_top_k))
    }

    pub fn lock_index(&self) -> Result<MutexGuard<'_, FlatIndex>> {
        self.index
            .lock()
            .map_err(|e| ShadowError::Io(std::io::Error::other(format!("index lock poisoned: {e}"))))
    }

    /// Write path: append the vector, persist the index, append the trace.
    /// Returns the trace's position.
    ///
    /// Refuses to write when the store cannot be read or its length differs from the
    /// index, leaving both files untouched.
    pub fn save(&self, trace: ThoughtTrace, vector: &[f32]) -> Result<usize> {
        let mut index = self.lock_index()?;
        let stored_len = self.store.len()?;
        if stored_len != index.len() {
            return Err(ShadowError::OutOfSync {
                traces: stored_len,
                vectors: index.len(),
            });
        }

        let position = index.add(vector)?;
        if let Err(e) = index.persist() {
            index.truncate(position);
            return Err(e);
        }

        // Not transactional: an IO failure here leaves the index one vector ahead,
        // and later saves are refused until a reindex.
        let stored = self.store.append(trace)?;
        if stored != position {
            tracing::warn!(
                trace_position = stored,
                vector_position = position,
                "trace store and vector index are out of step"
            );
        }
        Ok(stored)
    }

    /// Records nearest to `vector`, closest first. Positions past the end of the store
    /// are skipped.
    pub fn nearest_traces(&self, vector: &[f32], top_k: usize) -> Result<Vec<ThoughtTrace>> {
        let traces = self.store.read_all()?;
        if traces.is_empty() {
            return Ok(Vec::new());
        }

        let neighbors = self.lock_index()?.search(vector, top_k)?;
        Ok(neighbors
            .into_iter()
            .filter_map(|n| {
                let trace = traces.get(n.position).cloned();
                if trace.is_none() {
                    tracing::warn!(
                        position = n.position,
                        traces = traces.len(),
                        "skipping vector with no matching trace"
                    );
                }
                trace
            })
            .collect())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub count: usize,
    pub results: Vec<ThoughtTrace>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SemanticSearchResponse {
    pub query: String,
    pub results: Vec<ThoughtTrace>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SemanticSearchParams {
    pub q: Option<String>,
    pub top_k: Option<usize>,
}

impl IntoResponse for ShadowError {
    fn into_response(self) -> Response {
        let status = match &self {
            ShadowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<JsonRejection> for ShadowError {
    fn from(rejection: JsonRejection) -> Self {
        ShadowError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ShadowError {
    fn from(rejection: QueryRejection) -> Self {
        ShadowError::Validation(rejection.body_text())
    }
}

fn required_query(q: Option<String>) -> Result<String> {
    q.ok_or_else(|| ShadowError::Validation("query parameter `q` is required".into()))
}

/// Run disk or model work off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ShadowError::Io(std::io::Error::other(format!("blocking task failed: {e}"))))?
}

async fn embed_text(state: &Arc<AppState>, text: String) -> Result<Vec<f32>> {
    let provider = Arc::clone(&state.embedding);
    blocking(move || provider.embed(&text).map_err(ShadowError::Embedding)).await
}

/// GET / - Health check
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HEALTH_STATUS.into(),
    })
}

/// POST /trace - Save a thought trace
async fn save_trace(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<NewTrace>, JsonRejection>,
) -> Result<Json<MessageResponse>> {
    let Json(submission) = payload?;
    tracing::info!(
        error_signature = %submission.error_signature,
        author = %submission.author,
        files = submission.files_changed.len(),
        "save_trace called"
    );

    let vector = embed_text(&state, submission.embedding_text()).await?;
    let trace = submission.into_trace();

    let writer = Arc::clone(&state);
    let position = blocking(move || writer.save(trace, &vector)).await?;
    tracing::info!(position, "thought trace saved");

    Ok(Json(MessageResponse {
        message: SAVED_MESSAGE.into(),
    }))
}

/// GET /traces - List all traces in insertion order
async fn list_traces(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ThoughtTrace>>> {
    let reader = Arc::clone(&state);
    let traces = blocking(move || reader.store.read_all()).await?;
    Ok(Json(traces))
}

/// GET /search - Substring search over error signatures and summaries
async fn search(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>> {
    let Query(params) = params?;
    let query = required_query(params.q)?;

    let reader = Arc::clone(&state);
    let needle = query.clone();
    let results = blocking(move || reader.store.search_substring(&needle)).await?;
    tracing::debug!(query = %query, matches = results.len(), "substring search");

    Ok(Json(SearchResponse {
        query,
        count: results.len(),
        results,
    }))
}

/// GET /semantic-search - Nearest traces by embedding distance
async fn semantic_search(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Query<SemanticSearchParams>, QueryRejection>,
) -> Result<Json<SemanticSearchResponse>> {
    let Query(params) = params?;
    let query = required_query(params.q)?;
    let top_k = params.top_k.unwrap_or(state.default_top_k);

    let results = if top_k == 0 {
        Vec::new()
    } else {
        let vector = embed_text(&state, query.clone()).await?;
        let reader = Arc::clone(&state);
        blocking(move || reader.nearest_traces(&vector, top_k)).await?
    };
    tracing::debug!(query = %query, top_k, matches = results.len(), "semantic search");

    Ok(Json(SemanticSearchResponse {
        query,
        count: results.len(),
        results,
    }))
}

/// Build the router over a shared service context.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/trace", post(save_trace))
        .route("/traces", get(list_traces))
        .route("/search", get(search))
        .route("/semantic-search", get(semantic_search))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load the model, store, and index, then serve HTTP until Ctrl-C.
pub async fn serve_http(config: SkillShadowConfig) -> anyhow::Result<()> {
    let provider = embedding::create_provider(&config.embedding)
        .context("failed to load embedding model")?;
    let embedding: Arc<dyn EmbeddingProvider> = Arc::from(provider);
    tracing::info!(model = %config.embedding.model, "embedding provider ready");

    let state = Arc::new(AppState::open(&config, embedding)?);
    let router = create_router(state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "Skill-Shadow listening at http://{bind_addr}/");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
