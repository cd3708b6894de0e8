//! Source pipelines: build payload, call, normalize, persist.
//!
//! Every pipeline implements [`Pipeline`]; [`run_once`] wraps one execution in
//! a `pipeline`/`run_id` span and folds the outcome into a [`PipelineReport`].
//! Errors never escape to the scheduler.
//!
//! This module follows the Explicit Module Boundary Pattern (EMBP): one file
//! per source, and [`register_all`] is the only place that knows which
//! pipelines exist.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::error::PipelineError;
use crate::http::RetryClient;
use crate::normalize::hydro::SeriesKind;
use crate::normalize::Normalized;
use crate::scheduler::Scheduler;
use crate::store::DocumentStore;

pub mod hydro;
pub mod lake;
pub mod station;
pub mod tide_forecast;
pub mod tide_realtime;

pub use hydro::HydroSeriesPipeline;
pub use lake::LakePipeline;
pub use station::StationPipeline;
pub use tide_forecast::TideForecastPipeline;
pub use tide_realtime::TideRealtimePipeline;

/// Counters accumulated during one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    pub fetched: u64,
    pub dropped: u64,
    pub deleted: u64,
    pub inserted: u64,
    pub upserted: u64,
    pub skipped: u64,
    pub served_from_cache: u64,
}

impl WriteStats {
    /// Count a normalized batch.
    pub fn record_batch<T>(&mut self, batch: &Normalized<T>) {
        self.fetched += (batch.records.len() + batch.dropped) as u64;
        self.dropped += batch.dropped as u64;
    }
}

/// Outcome of one pipeline run, as logged and served by the control API.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub pipeline: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub message: String,
    pub stats: WriteStats,
}

#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
    /// State carried between runs of the same pipeline, owned by its job.
    type State: Default + Send + 'static;

    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    /// One fetch-normalize-persist cycle. Counters are updated in place so
    /// partial progress is reported even when the run fails.
    async fn execute(
        &self,
        state: &mut Self::State,
        stats: &mut WriteStats,
    ) -> Result<String, PipelineError>;
}

/// Execute a pipeline once inside its span and report the result.
pub async fn run_once<P: Pipeline>(pipeline: &P, state: &mut P::State) -> PipelineReport {
    // ---
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("pipeline", pipeline = pipeline.name(), %run_id);

    async move {
        let started_at = Utc::now();
        tracing::info!("run started");

        let mut stats = WriteStats::default();
        let result = pipeline.execute(state, &mut stats).await;
        let finished_at = Utc::now();

        let (success, message) = match result {
            Ok(message) => {
                tracing::info!(?stats, "run finished: {}", message);
                (true, message)
            }
            Err(e) => {
                tracing::error!(?stats, error = %e, "run failed");
                (false, e.to_string())
            }
        };

        PipelineReport {
            pipeline: pipeline.name().to_string(),
            run_id,
            started_at,
            finished_at,
            success,
            message,
            stats,
        }
    }
    .instrument(span)
    .await
}

/// Collects per-scope failures of multi-scope pipelines.
#[derive(Debug, Default)]
pub(crate) struct ScopeFailures {
    total: usize,
    failed: Vec<String>,
}

impl ScopeFailures {
    pub(crate) fn ok(&mut self) {
        self.total += 1;
    }

    pub(crate) fn failed(&mut self, scope: &str, error: &PipelineError) {
        // ---
        tracing::error!(scope, error = %error, "scope failed");
        self.total += 1;
        self.failed.push(format!("{scope}: {error}"));
    }

    pub(crate) fn finish(self, message: String) -> Result<String, PipelineError> {
        // ---
        match self.failed.first() {
            None => Ok(message),
            Some(first) => Err(PipelineError::Partial {
                failed: self.failed.len(),
                total: self.total,
                first: first.clone(),
            }),
        }
    }
}

/// Register one pipeline per configured source.
pub fn register_all(
    cfg: &Config,
    client: &RetryClient,
    store: &Arc<dyn DocumentStore>,
    scheduler: &mut Scheduler,
) {
    // ---
    if let Some(hydro) = &cfg.hydro {
        for kind in [SeriesKind::Level, SeriesKind::Inflow, SeriesKind::Outflow] {
            scheduler.register(HydroSeriesPipeline::new(
                kind,
                hydro.clone(),
                client.clone(),
                store.clone(),
            ));
        }
    }
    if let Some(tide) = &cfg.tide_forecast {
        scheduler.register(TideForecastPipeline::new(
            tide.clone(),
            client.clone(),
            store.clone(),
        ));
    }
    if let Some(tide) = &cfg.tide_realtime {
        scheduler.register(TideRealtimePipeline::new(
            tide.clone(),
            Default::default(),
            client.clone(),
            store.clone(),
        ));
    }
    if let Some(lake) = &cfg.lake {
        scheduler.register(LakePipeline::new(lake.clone(), client.clone(), store.clone()));
    }
    if let Some(station) = &cfg.station {
        scheduler.register(StationPipeline::new(
            station.clone(),
            client.clone(),
            store.clone(),
        ));
    }

    if scheduler.is_empty() {
        tracing::warn!("no upstream source configured; nothing will be scheduled");
    }
}
