//! Tide forecast pipeline: one request per location, each location's
//! documents fully replaced on every cycle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::{Pipeline, ScopeFailures, WriteStats};
use crate::config::TideForecastConfig;
use crate::error::{PipelineError, StoreError};
use crate::http::RetryClient;
use crate::models::collections;
use crate::normalize::tide::normalize_forecast;
use crate::persist::replace_all;
use crate::store::{to_documents, DocumentStore};
use crate::time::{self, Window};

/// Days of forecast requested per location.
pub const FORECAST_DAYS: u32 = 7;

pub struct TideForecastPipeline {
    cfg: TideForecastConfig,
    client: RetryClient,
    store: Arc<dyn DocumentStore>,
}

impl TideForecastPipeline {
    // ---
    pub fn new(cfg: TideForecastConfig, client: RetryClient, store: Arc<dyn DocumentStore>) -> Self {
        Self { cfg, client, store }
    }

    /// Forecast from the start of the local day.
    pub fn payload(location_code: &str, now: DateTime<Utc>) -> Value {
        // ---
        let window = Window::lookback(now, 0);
        let window = Window {
            from: window.from,
            to: Window::ahead(now, FORECAST_DAYS).to,
        };
        json!({
            "data": {
                "locationCode": location_code,
                "from": window.wire_from(),
                "to": window.wire_to(),
            }
        })
    }

    async fn refresh_location(
        &self,
        location: &str,
        now: DateTime<Utc>,
        stats: &mut WriteStats,
    ) -> Result<(), PipelineError> {
        // ---
        let source = &self.cfg.source;
        let raw = self
            .client
            .call_with_retry(
                &source.url,
                &Self::payload(location, now),
                source.max_retries,
                source.timeout,
            )
            .await?;

        let batch = normalize_forecast(&raw, location)?;
        stats.record_batch(&batch);
        if let Some((first, last)) = time::date_range(batch.records.iter().map(|r| r.date)) {
            tracing::debug!(
                location,
                from = %time::display_time(first),
                to = %time::display_time(last),
                "forecast range"
            );
        }

        let docs = to_documents(&batch.records)?;
        let outcome =
            replace_all(self.store.as_ref(), collections::TIDE_FORECASTS, Some(location), docs)
                .await?;
        stats.deleted += outcome.deleted;
        stats.inserted += outcome.inserted;
        Ok(())
    }
}

/// Locations that currently have forecast documents.
pub async fn locations(store: &dyn DocumentStore) -> Result<Vec<String>, StoreError> {
    store.distinct_scopes(collections::TIDE_FORECASTS).await
}

#[async_trait]
impl Pipeline for TideForecastPipeline {
    type State = ();

    fn name(&self) -> &str {
        "tide_forecast"
    }

    fn interval(&self) -> Duration {
        self.cfg.source.interval
    }

    async fn execute(&self, _: &mut (), stats: &mut WriteStats) -> Result<String, PipelineError> {
        // ---
        let now = Utc::now();
        let mut failures = ScopeFailures::default();
        for location in &self.cfg.locations {
            match self.refresh_location(location, now, stats).await {
                Ok(()) => failures.ok(),
                Err(e) => failures.failed(location, &e),
            }
        }
        failures.finish(format!(
            "{} location(s), {} forecast point(s) stored",
            self.cfg.locations.len(),
            stats.inserted
        ))
    }
}
