//! Shared fixtures: an in-process axum upstream and fast retry settings.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use serde_json::Value;

use hydroflow::config::SourceConfig;
use hydroflow::{Backoff, RetryClient};

/// Bind `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: Router) -> String {
    // ---
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn fast_backoff() -> Backoff {
    Backoff {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
        jitter: false,
    }
}

pub fn client() -> RetryClient {
    RetryClient::new(fast_backoff()).unwrap()
}

pub fn source(url: String) -> SourceConfig {
    SourceConfig {
        url,
        max_retries: 3,
        timeout: Duration::from_secs(2),
        interval: Duration::from_secs(60),
    }
}

/// Counts upstream calls and keeps what was sent.
#[derive(Clone, Default)]
pub struct Recorder {
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
}

impl Recorder {
    // ---
    pub fn record(&self, body: Value, auth: Option<String>) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        self.bodies.lock().unwrap().push(body);
        self.auth.lock().unwrap().push(auth);
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_body(&self) -> Option<Value> {
        self.bodies.lock().unwrap().last().cloned()
    }

    pub fn last_auth(&self) -> Option<String> {
        self.auth.lock().unwrap().last().cloned().flatten()
    }
}
