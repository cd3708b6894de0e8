// src/routes/health.rs
//! Liveness endpoint for the hydroflow control API.
//!
//! Sibling module of the `routes` gateway (EMBP): the handler stays private
//! here and only the subrouter is exported. Used by container health checks;
//! it does not touch the document store or any upstream, so a slow upstream
//! never makes the service look dead.

use axum::{routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct Liveness {
    status: &'static str,
    version: &'static str,
}

/// Handle `GET /health`.
async fn health() -> Json<Liveness> {
    Json(Liveness {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `/health` subrouter, generic over the gateway state.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}
