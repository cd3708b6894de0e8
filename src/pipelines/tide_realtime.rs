//! Tide realtime pipeline with per-station call gating.
//!
//! The upstream is slow to change and easily overloaded, so each station is
//! only called on clock-aligned hours (GMT+7), never more often than a minimum
//! interval, and not at all while its circuit is open after repeated errors.
//! A gated station serves its stored snapshot instead. Writes are per-point
//! upserts, with a full per-station replace once a day to clear stale points.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::{Pipeline, ScopeFailures, WriteStats};
use crate::config::TideRealtimeConfig;
use crate::error::PipelineError;
use crate::http::RetryClient;
use crate::models::collections;
use crate::normalize::tide::normalize_realtime;
use crate::persist::replace_all;
use crate::store::{to_documents, DocumentStore, UpsertOutcome};
use crate::time::{self, Window};

/// Gate tuning.
#[derive(Debug, Clone)]
pub struct TideGatePolicy {
    /// Local hours at which calls are allowed.
    pub call_hours: Vec<u32>,
    /// Minutes after a call hour that still count as on schedule.
    pub slot_tolerance_minutes: u32,
    pub min_interval: chrono::Duration,
    /// Consecutive errors that open the circuit.
    pub error_threshold: u32,
    pub cooldown: chrono::Duration,
    pub full_replace_every: chrono::Duration,
}

impl Default for TideGatePolicy {
    fn default() -> Self {
        Self {
            call_hours: vec![0, 3, 6, 9, 12, 15, 18, 21],
            slot_tolerance_minutes: 15,
            min_interval: chrono::Duration::minutes(150),
            error_threshold: 3,
            cooldown: chrono::Duration::hours(1),
            full_replace_every: chrono::Duration::hours(24),
        }
    }
}

/// What the gate remembers about one station.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationGate {
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
    pub circuit_open_until: Option<DateTime<Utc>>,
    pub last_full_replace: Option<DateTime<Utc>>,
}

/// Gate memory for all stations; owned by the scheduler job between runs.
#[derive(Debug, Default)]
pub struct TideGateState {
    pub stations: HashMap<String, StationGate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateSkip {
    CircuitOpen,
    TooSoon,
    OffSchedule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Call,
    Skip(GateSkip),
}

impl TideGatePolicy {
    // ---
    pub fn decide(&self, gate: &StationGate, now: DateTime<Utc>) -> GateDecision {
        // ---
        if gate.circuit_open_until.is_some_and(|until| now < until) {
            return GateDecision::Skip(GateSkip::CircuitOpen);
        }
        let Some(last) = gate.last_success else {
            return GateDecision::Call;
        };
        if now - last < self.min_interval {
            return GateDecision::Skip(GateSkip::TooSoon);
        }
        let (hour, minute) = time::local_hour_minute(now);
        if self.call_hours.contains(&hour) && minute <= self.slot_tolerance_minutes {
            GateDecision::Call
        } else {
            GateDecision::Skip(GateSkip::OffSchedule)
        }
    }

    pub fn needs_full_replace(&self, gate: &StationGate, now: DateTime<Utc>) -> bool {
        gate.last_full_replace
            .map_or(true, |at| now - at >= self.full_replace_every)
    }

    pub fn record_success(&self, gate: &mut StationGate, now: DateTime<Utc>) {
        gate.last_success = Some(now);
        gate.consecutive_errors = 0;
        gate.circuit_open_until = None;
    }

    /// Count a failed call; opens the circuit at the threshold.
    pub fn record_error(&self, gate: &mut StationGate, now: DateTime<Utc>) {
        // ---
        gate.consecutive_errors += 1;
        if gate.consecutive_errors >= self.error_threshold {
            gate.circuit_open_until = Some(now + self.cooldown);
            gate.consecutive_errors = 0;
        }
    }
}

pub struct TideRealtimePipeline {
    cfg: TideRealtimeConfig,
    policy: TideGatePolicy,
    client: RetryClient,
    store: Arc<dyn DocumentStore>,
}

impl TideRealtimePipeline {
    // ---
    pub fn new(
        cfg: TideRealtimeConfig,
        policy: TideGatePolicy,
        client: RetryClient,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            cfg,
            policy,
            client,
            store,
        }
    }

    /// The last 24 hours of observations.
    pub fn payload(station_code: &str, now: DateTime<Utc>) -> Value {
        // ---
        let window = Window {
            from: now - chrono::Duration::hours(24),
            to: now,
        };
        json!({
            "data": {
                "stationCode": station_code,
                "from": window.wire_from(),
                "to": window.wire_to(),
            }
        })
    }

    async fn serve_cached(&self, station: &str, stats: &mut WriteStats) -> Result<(), PipelineError> {
        // ---
        let snapshot = self
            .store
            .find_scope(collections::TIDE_REALTIME, Some(station))
            .await?;
        stats.served_from_cache += snapshot.len() as u64;
        Ok(())
    }

    async fn refresh_station(
        &self,
        station: &str,
        full_replace: bool,
        now: DateTime<Utc>,
        stats: &mut WriteStats,
    ) -> Result<(), PipelineError> {
        // ---
        let source = &self.cfg.source;
        let raw = self
            .client
            .call_with_retry(
                &source.url,
                &Self::payload(station, now),
                source.max_retries,
                source.timeout,
            )
            .await?;

        let batch = normalize_realtime(&raw, station)?;
        stats.record_batch(&batch);
        let docs = to_documents(&batch.records)?;

        if full_replace {
            let outcome =
                replace_all(self.store.as_ref(), collections::TIDE_REALTIME, Some(station), docs)
                    .await?;
            stats.deleted += outcome.deleted;
            stats.inserted += outcome.inserted;
            return Ok(());
        }

        for doc in docs {
            match self.store.upsert(collections::TIDE_REALTIME, doc).await? {
                UpsertOutcome::Inserted => stats.inserted += 1,
                UpsertOutcome::Updated => stats.upserted += 1,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Pipeline for TideRealtimePipeline {
    type State = TideGateState;

    fn name(&self) -> &str {
        "tide_realtime"
    }

    fn interval(&self) -> Duration {
        self.cfg.source.interval
    }

    async fn execute(
        &self,
        state: &mut TideGateState,
        stats: &mut WriteStats,
    ) -> Result<String, PipelineError> {
        // ---
        let now = Utc::now();
        let mut failures = ScopeFailures::default();
        let mut called = 0usize;

        for station in &self.cfg.stations {
            let gate = state.stations.entry(station.clone()).or_default();

            if let GateDecision::Skip(reason) = self.policy.decide(gate, now) {
                tracing::warn!(station = %station, ?reason, "upstream call gated, serving stored snapshot");
                match self.serve_cached(station, stats).await {
                    Ok(()) => failures.ok(),
                    Err(e) => failures.failed(station, &e),
                }
                continue;
            }

            called += 1;
            let full_replace = self.policy.needs_full_replace(gate, now);
            match self.refresh_station(station, full_replace, now, stats).await {
                Ok(()) => {
                    self.policy.record_success(gate, now);
                    if full_replace {
                        gate.last_full_replace = Some(now);
                    }
                    failures.ok();
                }
                Err(e) => {
                    self.policy.record_error(gate, now);
                    if gate.circuit_open_until.is_some() {
                        tracing::warn!(station = %station, "circuit opened after repeated errors");
                    }
                    failures.failed(station, &e);
                }
            }
        }

        failures.finish(format!(
            "{} of {} station(s) called, {} point(s) served from cache",
            called,
            self.cfg.stations.len(),
            stats.served_from_cache
        ))
    }
}
