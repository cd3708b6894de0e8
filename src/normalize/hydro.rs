//! Reservoir series normalizers (level, inflow, outflow).
//!
//! The reservoir API family returns observed rows under `dtDataTable` (or
//! `dtData`) and, when a forecast window was requested, projected rows under
//! `dtDataForecast` (or `dtForecast`) in the same response. Rows are tagged
//! with their origin; forecast rows also carry their horizon relative to the
//! fetch time.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{find_array, Candidates, Normalized};
use crate::error::NormalizeError;
use crate::models::{
    DataSource, InflowRatePoint, OutflowRatePoint, ReservoirLevelPoint, UNIT_FLOW, UNIT_METERS,
};
use crate::time;

pub const REALTIME_ARRAYS: &[&str] = &["dtDataTable", "dtData"];
pub const FORECAST_ARRAYS: &[&str] = &["dtDataForecast", "dtForecast"];

pub const TIMESTAMP: Candidates =
    Candidates::new("timestamp", &["thoigian", "time", "timestamp", "date", "ngay"]);

pub const LEVEL: Candidates =
    Candidates::new("level", &["mucnuocho", "value", "giatri", "val", "data"]);
pub const INFLOW: Candidates = Candidates::new("inflow", &["qden", "qvao", "value", "giatri"]);
pub const DISCHARGE: Candidates = Candidates::new("discharge", &["qxa", "tongqxa", "value"]);
pub const GATE: Candidates = Candidates::new("gate", &["qxacua", "qcua"]);
pub const SPILLWAY: Candidates = Candidates::new("spillway", &["qxatran", "qtran"]);
pub const HYDROPOWER: Candidates = Candidates::new("hydropower", &["qnhamay", "qxanhamay", "qcm"]);

/// Which reservoir series a pipeline fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    Level,
    Inflow,
    Outflow,
}

impl SeriesKind {
    // ---
    /// Parameter code sent in the request envelope.
    pub fn parameter_code(self) -> &'static str {
        match self {
            SeriesKind::Level => "MUCNUOCHO",
            SeriesKind::Inflow => "QDEN",
            SeriesKind::Outflow => "QXA",
        }
    }

    pub fn pipeline_name(self) -> &'static str {
        match self {
            SeriesKind::Level => "reservoir_level",
            SeriesKind::Inflow => "reservoir_inflow",
            SeriesKind::Outflow => "reservoir_outflow",
        }
    }
}

/// A row read out of the response together with its origin.
struct SourcedRow<'a> {
    row: &'a Value,
    source: DataSource,
}

fn sourced_rows(raw: &Value) -> Result<Vec<SourcedRow<'_>>, NormalizeError> {
    // ---
    let realtime = find_array(raw, REALTIME_ARRAYS);
    let forecast = find_array(raw, FORECAST_ARRAYS);
    if realtime.is_none() && forecast.is_none() {
        return Err(NormalizeError::MissingArray {
            expected: REALTIME_ARRAYS.iter().chain(FORECAST_ARRAYS).copied().collect(),
        });
    }

    Ok(tag(realtime, DataSource::Realtime)
        .chain(tag(forecast, DataSource::Forecast))
        .collect())
}

fn tag(rows: Option<&Vec<Value>>, source: DataSource) -> impl Iterator<Item = SourcedRow<'_>> {
    rows.into_iter()
        .flatten()
        .map(move |row| SourcedRow { row, source })
}

/// Shared skeleton: read the timestamp, let `build` read the values.
fn normalize_series<T, F>(
    raw: &Value,
    now: DateTime<Utc>,
    quantity: &str,
    build: F,
) -> Result<Normalized<T>, NormalizeError>
where
    F: Fn(&Value, DateTime<Utc>, DataSource, Option<f64>) -> Option<T>,
{
    // ---
    let mut out = Normalized::new();
    for SourcedRow { row, source } in sourced_rows(raw)? {
        let Some(ts) = TIMESTAMP.timestamp(row) else {
            tracing::warn!(%quantity, ?row, "dropping row with unparseable timestamp");
            out.push(None);
            continue;
        };
        let horizon = match source {
            DataSource::Forecast => Some(time::hours_ahead(ts, now)),
            DataSource::Realtime => None,
        };
        let record = build(row, ts, source, horizon);
        if record.is_none() {
            tracing::warn!(%quantity, ?row, "dropping row with no numeric value");
        }
        out.push(record);
    }
    out.finish()
}

pub fn normalize_levels(
    raw: &Value,
    now: DateTime<Utc>,
) -> Result<Normalized<ReservoirLevelPoint>, NormalizeError> {
    // ---
    normalize_series(raw, now, LEVEL.quantity, |row, ts, source, horizon| {
        Some(ReservoirLevelPoint {
            timestamp: ts,
            display_time: time::display_time(ts),
            level_meters: LEVEL.number(row)?,
            unit: UNIT_METERS.to_string(),
            data_source: source,
            forecast_horizon_hours: horizon,
        })
    })
}

pub fn normalize_inflow(
    raw: &Value,
    now: DateTime<Utc>,
) -> Result<Normalized<InflowRatePoint>, NormalizeError> {
    // ---
    normalize_series(raw, now, INFLOW.quantity, |row, ts, source, horizon| {
        Some(InflowRatePoint {
            timestamp: ts,
            display_time: time::display_time(ts),
            rate_m3s: INFLOW.number(row)?,
            unit: UNIT_FLOW.to_string(),
            data_source: source,
            forecast_horizon_hours: horizon,
        })
    })
}

/// Total discharge is required; the gate/spillway/hydropower split defaults
/// to zero when the upstream omits it.
pub fn normalize_outflow(
    raw: &Value,
    now: DateTime<Utc>,
) -> Result<Normalized<OutflowRatePoint>, NormalizeError> {
    // ---
    normalize_series(raw, now, DISCHARGE.quantity, |row, ts, source, horizon| {
        Some(OutflowRatePoint {
            timestamp: ts,
            display_time: time::display_time(ts),
            discharge_rate: DISCHARGE.number(row)?,
            gate_rate: GATE.number(row).unwrap_or(0.0),
            spillway_rate: SPILLWAY.number(row).unwrap_or(0.0),
            hydropower_rate: HYDROPOWER.number(row).unwrap_or(0.0),
            unit: UNIT_FLOW.to_string(),
            data_source: source,
            forecast_horizon_hours: horizon,
        })
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        // 2025-01-05 10:00 local
        Utc.with_ymd_and_hms(2025, 1, 5, 3, 0, 0).unwrap()
    }

    #[test]
    fn inflow_value_found_under_alternate_name() {
        // ---
        let raw = json!({"dtDataTable": [
            {"thoigian": "5/1/2025 08:00", "qvao": 412.7}
        ]});
        let batch = normalize_inflow(&raw, now()).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].rate_m3s, 412.7);
        assert_eq!(batch.records[0].unit, "m3/s");
    }

    #[test]
    fn level_rows_tagged_by_array() {
        // ---
        let raw = json!({
            "dtDataTable": [
                {"thoigian": "2025-01-05T08:00:00", "mucnuocho": 62.1},
                {"thoigian": "2025-01-05T09:00:00", "giatri": "62.2"}
            ],
            "dtDataForecast": [
                {"thoigian": "2025-01-05T13:00:00", "value": 62.5},
                {"thoigian": "2025-01-05T07:00:00", "value": 62.0}
            ]
        });
        let batch = normalize_levels(&raw, now()).unwrap();
        let realtime: Vec<_> = batch
            .records
            .iter()
            .filter(|r| r.data_source == DataSource::Realtime)
            .collect();
        let forecast: Vec<_> = batch
            .records
            .iter()
            .filter(|r| r.data_source == DataSource::Forecast)
            .collect();

        assert_eq!(realtime.len(), 2);
        assert!(realtime.iter().all(|r| r.forecast_horizon_hours.is_none()));
        assert_eq!(forecast.len(), 2);
        assert_eq!(forecast[0].forecast_horizon_hours, Some(3.0));
        // Behind "now": clamped
        assert_eq!(forecast[1].forecast_horizon_hours, Some(0.0));
    }

    #[test]
    fn bad_rows_dropped_not_fatal() {
        // ---
        let raw = json!({"dtData": [
            {"thoigian": "not a date", "mucnuocho": 1.0},
            {"thoigian": "5/1/2025 08:00", "mucnuocho": "??"},
            {"thoigian": "5/1/2025 09:00", "mucnuocho": 61.9}
        ]});
        let batch = normalize_levels(&raw, now()).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.dropped, 2);
    }

    #[test]
    fn nothing_surviving_is_a_failure() {
        // ---
        let raw = json!({"dtData": [{"thoigian": "5/1/2025 08:00"}]});
        assert!(matches!(
            normalize_levels(&raw, now()),
            Err(NormalizeError::NoRecords { dropped: 1 })
        ));
        assert!(matches!(
            normalize_levels(&json!({"rows": []}), now()),
            Err(NormalizeError::MissingArray { .. })
        ));
    }

    #[test]
    fn outflow_split_defaults_to_zero() {
        // ---
        let raw = json!({"dtDataTable": [
            {"thoigian": "5/1/2025 08:00", "qxa": 900.0, "qnhamay": 600.0}
        ]});
        let batch = normalize_outflow(&raw, now()).unwrap();
        let row = &batch.records[0];
        assert_eq!(row.discharge_rate, 900.0);
        assert_eq!(row.hydropower_rate, 600.0);
        assert_eq!(row.gate_rate, 0.0);
        assert_eq!(row.spillway_rate, 0.0);
    }
}
