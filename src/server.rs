//! HTTP API over the query engine.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/query` | Answer a question about a repository |
//! | `POST` | `/index` | Build (or rebuild with `force`) a repository index |
//! | `POST` | `/overview` | Summarize a repository's structure and stack |
//! | `GET`  | `/indexes` | List stored indexes |
//!
//! # Error Contract
//!
//! Every failure carries the same body the query contract defines:
//!
//! ```json
//! { "success": false, "error_kind": "invalid_request", "message": "question is empty" }
//! ```
//!
//! Status codes: `invalid_request` (400), `not_found` (404), `timeout` (408),
//! `acquisition_error` (502), everything else (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use scout_core::models::IndexMeta;
use scout_core::ScoutError;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::overview::RepoOverview;
use crate::query::{resolve_reference, QueryEngine, QueryFailure, QueryOutcome, QueryRequest};

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config, engine: QueryEngine) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(engine);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("HTTP server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// The route table, separated from [`run_server`] so tests can drive it
/// without a socket.
pub fn router(engine: QueryEngine) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/query", post(handle_query))
        .route("/index", post(handle_index))
        .route("/overview", post(handle_overview))
        .route("/indexes", get(handle_list_indexes))
        .layer(cors)
        .with_state(engine)
}

/// HTTP status for an error kind.
pub fn status_for(error: &ScoutError) -> StatusCode {
    match error {
        ScoutError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ScoutError::NotFound(_) => StatusCode::NOT_FOUND,
        ScoutError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
        ScoutError::Acquisition { .. } => StatusCode::BAD_GATEWAY,
        ScoutError::Chunking { .. } | ScoutError::Embedding(_) | ScoutError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// ============ Error response ============

struct AppError(ScoutError);

impl From<ScoutError> for AppError {
    fn from(e: ScoutError) -> Self {
        Self(e)
    }
}

/// Malformed, mistyped or incomplete request bodies are invalid requests.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ScoutError::InvalidRequest(rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = QueryOutcome::Failure {
            success: false,
            failure: QueryFailure::from(&self.0),
        };
        (status, Json(body)).into_response()
    }
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

// ============ POST /query ============

async fn handle_query(
    State(engine): State<QueryEngine>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryOutcome>, AppError> {
    let Json(request) = payload?;
    let response = engine.answer(&request).await?;
    Ok(Json(QueryOutcome::from(Ok(response))))
}

// ============ POST /index ============

#[derive(Deserialize)]
struct IndexRequest {
    repository_reference: String,
    #[serde(default)]
    force: bool,
}

#[derive(Serialize)]
struct IndexResponse {
    success: bool,
    index: IndexMeta,
}

/// Builds the index if it is missing or stale. With `force`, rebuilds
/// unconditionally.
async fn handle_index(
    State(engine): State<QueryEngine>,
    payload: Result<Json<IndexRequest>, JsonRejection>,
) -> Result<Json<IndexResponse>, AppError> {
    let Json(request) = payload?;
    let reference = resolve_reference(&request.repository_reference)?;
    let coordinator = engine.coordinator();
    let meta = if request.force {
        coordinator.rebuild(&reference).await?
    } else {
        coordinator.ensure_index(&reference).await?
    };
    Ok(Json(IndexResponse {
        success: true,
        index: meta,
    }))
}

// ============ POST /overview ============

#[derive(Deserialize)]
struct OverviewRequest {
    repository_reference: String,
}

#[derive(Serialize)]
struct OverviewResponse {
    success: bool,
    overview: RepoOverview,
}

async fn handle_overview(
    State(engine): State<QueryEngine>,
    payload: Result<Json<OverviewRequest>, JsonRejection>,
) -> Result<Json<OverviewResponse>, AppError> {
    let Json(request) = payload?;
    let overview = engine.overview(&request.repository_reference).await?;
    Ok(Json(OverviewResponse {
        success: true,
        overview,
    }))
}

// ============ GET /indexes ============

#[derive(Serialize)]
struct IndexListResponse {
    indexes: Vec<IndexMeta>,
}

async fn handle_list_indexes(
    State(engine): State<QueryEngine>,
) -> Result<Json<IndexListResponse>, AppError> {
    let indexes = engine.coordinator().list().await?;
    Ok(Json(IndexListResponse { indexes }))
}
