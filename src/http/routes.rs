//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::app::AppState;
use crate::game::host::PlayerId;
use crate::game::progression::rank_index;
use crate::game::{EngineInput, MatchPhase, MatchStatus};
use crate::http::middleware::require_operator;
use crate::util::time::uptime_secs;
use crate::ws::handler::host_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/host", get(host_handler));

    let operator_routes = Router::new()
        .route("/match/start", post(force_start_handler))
        .route("/match/reset", post(reset_handler))
        .route("/progress/:player_id", get(progress_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_operator));

    Router::new()
        .merge(public_routes)
        .merge(operator_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Health / status
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    phase: MatchPhase,
    players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.engine.status();

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        phase: status.phase,
        players: status.players,
    })
}

async fn status_handler(State(state): State<AppState>) -> Json<MatchStatus> {
    Json(state.engine.status())
}

// ============================================================================
// Operator endpoints
// ============================================================================

#[derive(Serialize)]
struct AcceptedResponse {
    accepted: bool,
}

async fn force_start_handler(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<AcceptedResponse>), AppError> {
    send_input(&state, EngineInput::ForceStart).await?;
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true })))
}

async fn reset_handler(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<AcceptedResponse>), AppError> {
    send_input(&state, EngineInput::Reset).await?;
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true })))
}

async fn send_input(state: &AppState, input: EngineInput) -> Result<(), AppError> {
    state
        .engine
        .input_tx
        .send(input)
        .await
        .map_err(|_| AppError::Internal("Match engine is not running".to_string()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressResponse {
    player_id: PlayerId,
    total_exp: u64,
    rank_index: usize,
}

async fn progress_handler(
    State(state): State<AppState>,
    Path(player_id): Path<PlayerId>,
) -> Result<Json<ProgressResponse>, AppError> {
    let progress = state
        .progress
        .load(player_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("No progress for {}", player_id)))?;

    let thresholds = state.config.game.rank_thresholds();

    Ok(Json(ProgressResponse {
        player_id,
        total_exp: progress.total_exp,
        rank_index: rank_index(&thresholds, progress.total_exp),
    }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
