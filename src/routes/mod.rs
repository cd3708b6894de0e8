//! Control API gateway.
//!
//! Follows the Explicit Module Boundary Pattern (EMBP): each sibling module
//! exports a subrouter and this gateway merges them and attaches the shared
//! state, so `main.rs` never sees individual endpoints.

use std::sync::Arc;

use axum::Router;

use crate::scheduler::Scheduler;
use crate::store::DocumentStore;

mod health;
mod pipelines;
mod tide;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub store: Arc<dyn DocumentStore>,
}

// ---

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(pipelines::router())
        .merge(tide::router())
        .merge(health::router())
        .with_state(state)
}
