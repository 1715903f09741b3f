use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::service::{CoordinatorError, NodeStatus};
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/jobs", post(submit_job))
        .route("/difficulty", put(set_difficulty))
        .route("/status", get(status))
        .route("/stop", post(stop))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize, Deserialize)]
pub struct SubmitJobRequest {
    pub data: String,
    pub difficulty: u8,
}

#[derive(Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
}

async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let data = hex::decode(req.data.trim_start_matches("0x"))
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid hex data: {e}")))?;

    let job_id = state
        .coordinator
        .submit_request(data, req.difficulty)
        .map_err(|e| {
            let code = match e {
                CoordinatorError::NoWorker { .. } => StatusCode::SERVICE_UNAVAILABLE,
                CoordinatorError::Transport(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (code, e.to_string())
        })?;

    Ok(Json(SubmitJobResponse {
        job_id: job_id.to_string(),
    }))
}

#[derive(Serialize, Deserialize)]
pub struct SetDifficultyRequest {
    pub difficulty: u8,
}

async fn set_difficulty(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetDifficultyRequest>,
) -> StatusCode {
    state.coordinator.set_difficulty(req.difficulty);
    StatusCode::NO_CONTENT
}

async fn status(State(state): State<Arc<AppState>>) -> Json<NodeStatus> {
    Json(state.coordinator.status())
}

async fn stop(State(state): State<Arc<AppState>>) -> StatusCode {
    state.coordinator.stop();
    state.node.shutdown();
    StatusCode::ACCEPTED
}
