//! Error types for the ingestion core.
//!
//! Each layer owns its own enum so that callers can tell a transient upstream
//! failure from a terminal one, and a write that failed before touching the
//! store from one that left a collection half-replaced. Pipelines fold all of
//! these into a [`crate::pipelines::PipelineReport`]; nothing here escapes to
//! the scheduler.

use thiserror::Error;

/// Failure of an outbound call after the retry client gave up.
#[derive(Debug, Error)]
pub enum FetchError {
    /// No HTTP response at all: connect error, reset, or timeout.
    #[error("no response from {url} after {attempts} attempt(s): {source}")]
    NoResponse {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered with a non-2xx status.
    #[error("{url} returned HTTP {status} after {attempts} attempt(s): {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
        attempts: u32,
    },

    /// The request could not be built or sent (bad URL, body encoding).
    #[error("request setup failed for {url}: {message}")]
    Setup { url: String, message: String },

    /// A 2xx response whose body was not what we asked for.
    #[error("response from {url} could not be decoded: {message}")]
    Decode { url: String, message: String },
}

impl FetchError {
    /// Upstream status code, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Whole-batch normalization failure. Single bad rows are dropped with a
/// warning instead and never surface here.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("expected a non-empty array under one of {expected:?}")]
    MissingArray { expected: Vec<&'static str> },

    #[error("all {dropped} upstream row(s) were dropped during normalization")]
    NoRecords { dropped: usize },

    #[error("html table not found or unreadable: {0}")]
    Html(String),
}

/// Document store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("document (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a failed full replace, split on whether the delete already ran.
#[derive(Debug, Error)]
pub enum ReplaceError {
    /// Nothing was deleted; the collection still holds the previous cycle.
    #[error("replace of {collection} failed before delete: {source}")]
    BeforeDelete {
        collection: String,
        #[source]
        source: StoreError,
    },

    /// Old documents are gone and the new ones are not in. The collection
    /// stays empty until the next successful cycle.
    #[error("replace of {collection} failed after deleting {deleted} document(s): {source}")]
    AfterDelete {
        collection: String,
        deleted: u64,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Replace(#[from] ReplaceError),

    /// Some scopes (locations, stations) of a multi-scope pipeline failed;
    /// the others were written.
    #[error("{failed} of {total} scope(s) failed, first: {first}")]
    Partial {
        failed: usize,
        total: usize,
        first: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("unknown pipeline '{0}'")]
    UnknownPipeline(String),

    #[error("pipeline '{0}' is already running")]
    AlreadyRunning(String),
}
