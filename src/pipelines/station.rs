//! Industrial monitoring stations: one GET for all stations, then the
//! current/metadata/bucket writes of [`crate::persist::station`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Pipeline, WriteStats};
use crate::config::StationConfig;
use crate::error::PipelineError;
use crate::http::RetryClient;
use crate::normalize::station::normalize_stations;
use crate::persist::persist_station_batch;
use crate::store::DocumentStore;

pub struct StationPipeline {
    cfg: StationConfig,
    client: RetryClient,
    store: Arc<dyn DocumentStore>,
}

impl StationPipeline {
    pub fn new(cfg: StationConfig, client: RetryClient, store: Arc<dyn DocumentStore>) -> Self {
        Self { cfg, client, store }
    }
}

#[async_trait]
impl Pipeline for StationPipeline {
    type State = ();

    fn name(&self) -> &str {
        "industrial_stations"
    }

    fn interval(&self) -> Duration {
        self.cfg.source.interval
    }

    async fn execute(&self, _: &mut (), stats: &mut WriteStats) -> Result<String, PipelineError> {
        // ---
        let source = &self.cfg.source;
        let raw = self
            .client
            .get_json(
                &source.url,
                self.cfg.token.as_deref(),
                source.max_retries,
                source.timeout,
            )
            .await?;

        let batch = normalize_stations(&raw)?;
        stats.record_batch(&batch);

        let written = persist_station_batch(self.store.as_ref(), batch.records).await?;
        stats.upserted += written.current_upserts;
        stats.inserted += written.entries_appended;
        stats.skipped += written.skipped;

        Ok(format!(
            "{} station(s): {} updated, {} unchanged, {} bucket write(s)",
            written.stations, written.current_upserts, written.skipped, written.buckets_written
        ))
    }
}
