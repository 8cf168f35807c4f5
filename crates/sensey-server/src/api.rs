//! HTTP endpoints for the collector.
//!
//! Two surfaces share one router: the ingest endpoint clients post readings
//! to, and the query API the dashboard reads from. All endpoints return
//! structured JSON errors via [`AppError`]; storage failures map to 500,
//! malformed payloads to 400.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use sensey_store::StorageError;
use sensey_types::{ParseError, TimeWindow, codec};

use crate::state::AppState;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Ingest
        .route("/data/{client_id}", post(ingest))
        // Health
        .route("/api/health", get(health))
        // Query API
        .route("/api/clients", get(list_clients))
        .route("/api/clients/{client_id}/latest", get(get_latest))
        .route("/api/clients/{client_id}/readings", get(get_readings))
}

/// Ingest response.
#[derive(Debug, Serialize)]
struct IngestResponse {
    status: &'static str,
}

/// Accept one reading from a client.
///
/// The payload is decoded and persisted before the 200 goes out, so a
/// success response means the reading is durable.
async fn ingest(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    body: Bytes,
) -> Result<Json<IngestResponse>, AppError> {
    let reading = codec::decode(&client_id, &body).map_err(|e| {
        warn!("Rejected payload from {}: {}", client_id, e);
        AppError::Parse(e)
    })?;

    state.store.store(&reading).await?;
    debug!(
        "Ingested reading from {} with {} field(s)",
        client_id,
        reading.fields.len()
    );
    Ok(Json(IngestResponse { status: "success" }))
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

/// Health check endpoint. Probes the storage backend; a 503 here means the
/// server is up but cannot persist readings.
async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    state
        .store
        .health_check()
        .await
        .map_err(|e| AppError::Unavailable(e.to_string()))?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    }))
}

/// List all clients with stored readings.
async fn list_clients(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.store.list_clients().await?))
}

#[derive(Debug, Deserialize)]
struct LatestParams {
    n: Option<usize>,
}

/// The most recent readings for a client, newest first.
async fn get_latest(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    Query(params): Query<LatestParams>,
) -> Result<Json<Vec<serde_json::Value>>, AppError> {
    let n = params.n.unwrap_or(1);
    let readings = state.store.latest(&client_id, n).await?;
    Ok(Json(readings.iter().map(codec::encode).collect()))
}

#[derive(Debug, Deserialize)]
struct RangeParams {
    range: Option<String>,
}

/// Readings for a client within a time window, oldest first.
///
/// A missing or unrecognized `range` falls back to the default window
/// rather than failing, matching what the dashboard expects.
async fn get_readings(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Vec<serde_json::Value>>, AppError> {
    let window = params
        .range
        .as_deref()
        .and_then(|raw| raw.parse::<TimeWindow>().ok())
        .unwrap_or_default();

    let readings = state.store.range_query(&client_id, window).await?;
    Ok(Json(readings.iter().map(codec::encode).collect()))
}

/// API error type.
#[derive(Debug)]
pub enum AppError {
    Parse(ParseError),
    Store(StorageError),
    Unavailable(String),
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        AppError::Store(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Parse(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::Store(e @ StorageError::InvalidClientId(_)) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
