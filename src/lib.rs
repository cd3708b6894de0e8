//! Hydrological telemetry ingestion.
//!
//! Fetches reservoir, tide, scraped-table and industrial-station data from
//! upstream HTTP sources, normalizes each payload family into fixed record
//! schemas and persists them into a document store, on a per-source schedule.
//!
//! Module layout follows the Explicit Module Boundary Pattern (EMBP): leaves
//! (`time`, `error`, `models`, `http`, `normalize`, `store`) know nothing about
//! the layers above; `pipelines` composes them, `scheduler` drives pipelines
//! and `routes` exposes the scheduler over HTTP.

pub mod config;
pub mod error;
pub mod http;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod persist;
pub mod pipelines;
pub mod routes;
pub mod scheduler;
pub mod schema;
pub mod store;
pub mod time;

pub use config::Config;
pub use error::{FetchError, NormalizeError, PipelineError, ReplaceError, SchedulerError, StoreError};
pub use http::{Backoff, RetryClient};
pub use pipelines::{Pipeline, PipelineReport, WriteStats};
pub use scheduler::Scheduler;
pub use store::{DocumentStore, MemoryStore, PgDocumentStore};
