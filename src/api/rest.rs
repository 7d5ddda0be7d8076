// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// The control surface of the monitor: add and remove positions in the book,
// read the latest snapshot, probe liveness. No authentication — this serves a
// trusted local panel.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::app_state::AppState;
use crate::positions::BookError;
use crate::snapshot::MonitorSnapshot;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/positions", get(positions))
        .route("/api/positions/add", post(add_position))
        .route("/api/positions/del", post(remove_position))
        .route("/api/monitor", get(monitor))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    cycles: u64,
    uptime_secs: i64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        cycles: state.cycles_completed(),
        uptime_secs: state.uptime_secs(),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Position book
// =============================================================================

async fn positions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.book.load())
}

#[derive(Deserialize)]
struct AddPositionRequest {
    pair: String,
    side: String,
    entry_price: f64,
    leverage: f64,
    #[serde(default)]
    target_gain_pct: Option<f64>,
}

async fn add_position(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddPositionRequest>,
) -> impl IntoResponse {
    match state.book.add(
        &req.pair,
        &req.side,
        req.entry_price,
        req.leverage,
        req.target_gain_pct,
    ) {
        Ok(position) => (StatusCode::OK, Json(serde_json::json!({ "ok": true, "position": position }))),
        Err(e) => book_error_response(e),
    }
}

#[derive(Deserialize)]
struct RemovePositionRequest {
    id: String,
}

async fn remove_position(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RemovePositionRequest>,
) -> impl IntoResponse {
    match state.book.remove(&req.id) {
        Ok(removed) => (
            StatusCode::OK,
            Json(serde_json::json!({ "ok": true, "removed": removed })),
        ),
        Err(e) => book_error_response(e),
    }
}

fn book_error_response(e: BookError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &e {
        BookError::Invalid(_) | BookError::Duplicate(_) => StatusCode::BAD_REQUEST,
        BookError::Io(inner) => {
            warn!(error = %inner, "position book write failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(serde_json::json!({ "ok": false, "error": e.to_string() })))
}

// =============================================================================
// Monitor snapshot
// =============================================================================

async fn monitor(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Before the first cycle completes, serve an empty document rather
    // than an error so the panel can render immediately.
    let snapshot = state
        .last_snapshot
        .read()
        .clone()
        .unwrap_or_else(MonitorSnapshot::default);
    Json(snapshot)
}
