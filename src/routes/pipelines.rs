// src/routes/pipelines.rs
//! Pipeline listing and manual run-now.
//!
//! - `GET /pipelines`: name, interval, running flag and last report per job
//! - `POST /pipelines/{name}/run`: run through the scheduler's skip-if-running
//!   guard; 404 for an unknown name, 409 when a run is already in flight

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use super::AppState;
use crate::error::SchedulerError;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/pipelines", get(list))
        .route("/pipelines/{name}/run", post(run))
}

async fn list(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.status().await)
}

async fn run(Path(name): Path<String>, State(state): State<AppState>) -> impl IntoResponse {
    // ---
    tracing::info!(pipeline = %name, "POST /pipelines/{{name}}/run");

    match state.scheduler.run_now(&name).await {
        Ok(report) => {
            let status = if report.success {
                StatusCode::OK
            } else {
                StatusCode::BAD_GATEWAY
            };
            (status, Json(report)).into_response()
        }
        Err(e @ SchedulerError::UnknownPipeline(_)) => {
            (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response()
        }
        Err(e @ SchedulerError::AlreadyRunning(_)) => {
            (StatusCode::CONFLICT, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}
