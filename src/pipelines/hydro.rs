//! Reservoir level / inflow / outflow pipelines.
//!
//! One pipeline per [`SeriesKind`], all against the same POST endpoint. Each
//! cycle requests the lookback window plus a forecast window and fully
//! replaces the target collection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::{Pipeline, WriteStats};
use crate::config::HydroConfig;
use crate::error::PipelineError;
use crate::http::RetryClient;
use crate::models::{collections, DataSource};
use crate::normalize::hydro::{normalize_inflow, normalize_levels, normalize_outflow, SeriesKind};
use crate::persist::replace_all;
use crate::store::{to_documents, DocumentStore};
use crate::time::Window;

pub struct HydroSeriesPipeline {
    kind: SeriesKind,
    cfg: HydroConfig,
    client: RetryClient,
    store: Arc<dyn DocumentStore>,
}

impl HydroSeriesPipeline {
    // ---
    pub fn new(
        kind: SeriesKind,
        cfg: HydroConfig,
        client: RetryClient,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            kind,
            cfg,
            client,
            store,
        }
    }

    pub fn collection(&self) -> &'static str {
        match self.kind {
            SeriesKind::Level => collections::RESERVOIR_LEVELS,
            SeriesKind::Inflow => collections::INFLOW_RATES,
            SeriesKind::Outflow => collections::OUTFLOW_RATES,
        }
    }

    /// Request envelope for a cycle starting at `now`.
    pub fn payload(&self, now: DateTime<Utc>) -> Value {
        // ---
        let realtime = Window::lookback(now, self.cfg.lookback_days);
        let mut data = json!({
            "stationId": self.cfg.station_id,
            "stationName": self.cfg.station_name,
            "parameterCode": self.kind.parameter_code(),
            "from": realtime.wire_from(),
            "to": realtime.wire_to(),
        });
        if self.cfg.forecast_days > 0 {
            let forecast = Window::ahead(now, self.cfg.forecast_days);
            data["forecastFrom"] = json!(forecast.wire_from());
            data["forecastTo"] = json!(forecast.wire_to());
        }
        json!({ "data": data })
    }
}

#[async_trait]
impl Pipeline for HydroSeriesPipeline {
    type State = ();

    fn name(&self) -> &str {
        self.kind.pipeline_name()
    }

    fn interval(&self) -> Duration {
        self.cfg.source.interval
    }

    async fn execute(&self, _: &mut (), stats: &mut WriteStats) -> Result<String, PipelineError> {
        // ---
        let now = Utc::now();
        let source = &self.cfg.source;
        let raw = self
            .client
            .call_with_retry(
                &source.url,
                &self.payload(now),
                source.max_retries,
                source.timeout,
            )
            .await?;

        let (docs, forecast) = match self.kind {
            SeriesKind::Level => {
                let batch = normalize_levels(&raw, now)?;
                stats.record_batch(&batch);
                let forecast = count_forecast(batch.records.iter().map(|r| r.data_source));
                (to_documents(&batch.records)?, forecast)
            }
            SeriesKind::Inflow => {
                let batch = normalize_inflow(&raw, now)?;
                stats.record_batch(&batch);
                let forecast = count_forecast(batch.records.iter().map(|r| r.data_source));
                (to_documents(&batch.records)?, forecast)
            }
            SeriesKind::Outflow => {
                let batch = normalize_outflow(&raw, now)?;
                stats.record_batch(&batch);
                let forecast = count_forecast(batch.records.iter().map(|r| r.data_source));
                (to_documents(&batch.records)?, forecast)
            }
        };

        let outcome = replace_all(self.store.as_ref(), self.collection(), None, docs).await?;
        stats.deleted += outcome.deleted;
        stats.inserted += outcome.inserted;

        let realtime = (stats.fetched - stats.dropped).saturating_sub(forecast);
        Ok(format!(
            "replaced {}: {} document(s) from {} realtime + {} forecast row(s)",
            self.collection(),
            outcome.inserted,
            realtime,
            forecast
        ))
    }
}

fn count_forecast(sources: impl Iterator<Item = DataSource>) -> u64 {
    sources.filter(|s| *s == DataSource::Forecast).count() as u64
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::config::SourceConfig;
    use crate::http::Backoff;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn pipeline(forecast_days: u32) -> HydroSeriesPipeline {
        // ---
        let cfg = HydroConfig {
            source: SourceConfig {
                url: "http://upstream.invalid/hydro".into(),
                max_retries: 1,
                timeout: Duration::from_secs(1),
                interval: Duration::from_secs(900),
            },
            station_id: "TriAn".into(),
            station_name: "Tri An".into(),
            lookback_days: 3,
            forecast_days,
        };
        HydroSeriesPipeline::new(
            SeriesKind::Outflow,
            cfg,
            RetryClient::new(Backoff::default()).unwrap(),
            Arc::new(MemoryStore::new()),
        )
    }

    #[test]
    fn payload_carries_both_windows_in_wire_format() {
        // ---
        let now = Utc.with_ymd_and_hms(2025, 1, 5, 3, 0, 0).unwrap();
        let payload = pipeline(2).payload(now);
        let data = &payload["data"];
        assert_eq!(data["parameterCode"], "QXA");
        assert_eq!(data["stationId"], "TriAn");
        assert_eq!(data["from"], "2025-1-2 0:0:0");
        assert_eq!(data["to"], "2025-1-5 10:0:0");
        assert_eq!(data["forecastFrom"], "2025-1-5 10:0:0");
        assert_eq!(data["forecastTo"], "2025-1-7 10:0:0");
    }

    #[test]
    fn no_forecast_window_when_disabled() {
        let now = Utc.with_ymd_and_hms(2025, 1, 5, 3, 0, 0).unwrap();
        let payload = pipeline(0).payload(now);
        assert!(payload["data"].get("forecastFrom").is_none());
    }
}
