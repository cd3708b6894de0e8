// src/routes/tide.rs
//! `GET /tide/forecast/locations`: locations that currently hold forecast data.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

use super::AppState;
use crate::pipelines::tide_forecast;

// ---

pub fn router() -> Router<AppState> {
    Router::new().route("/tide/forecast/locations", get(locations))
}

async fn locations(State(state): State<AppState>) -> impl IntoResponse {
    // ---
    match tide_forecast::locations(state.store.as_ref()).await {
        Ok(locations) => (StatusCode::OK, Json(json!({ "locations": locations }))).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to list tide forecast locations");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "store unavailable" })),
            )
                .into_response()
        }
    }
}
