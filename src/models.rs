//! Normalized record schemas persisted by the pipelines.
//!
//! Every record is an immutable observation keyed by its source identity and
//! timestamp. The [`Keyed`] impls at the bottom decide the collection, the
//! document key and the replace scope of each type.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Keyed;

// ---

pub const UNIT_METERS: &str = "m";
pub const UNIT_FLOW: &str = "m3/s";
pub const UNIT_CENTIMETERS: &str = "cm";

/// Collection names, one per logical series.
pub mod collections {
    pub const RESERVOIR_LEVELS: &str = "reservoir_levels";
    pub const INFLOW_RATES: &str = "inflow_rates";
    pub const OUTFLOW_RATES: &str = "outflow_rates";
    pub const TIDE_FORECASTS: &str = "tide_forecasts";
    pub const TIDE_REALTIME: &str = "tide_realtime";
    pub const LAKE_ROWS: &str = "lake_scrape_rows";
    pub const STATION_METADATA: &str = "station_metadata";
    pub const STATION_CURRENT: &str = "station_current";
    pub const STATION_BUCKETS: &str = "station_buckets";
    pub const LEGACY_STATIONS: &str = "legacy_stations";
}

/// Whether a row was observed or projected by the upstream model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Realtime,
    Forecast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirLevelPoint {
    pub timestamp: DateTime<Utc>,
    pub display_time: String,
    pub level_meters: f64,
    pub unit: String,
    pub data_source: DataSource,
    /// Hours ahead of the fetch time; forecast rows only.
    pub forecast_horizon_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InflowRatePoint {
    pub timestamp: DateTime<Utc>,
    pub display_time: String,
    pub rate_m3s: f64,
    pub unit: String,
    pub data_source: DataSource,
    pub forecast_horizon_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutflowRatePoint {
    pub timestamp: DateTime<Utc>,
    pub display_time: String,
    pub discharge_rate: f64,
    pub gate_rate: f64,
    pub spillway_rate: f64,
    pub hydropower_rate: f64,
    pub unit: String,
    pub data_source: DataSource,
    pub forecast_horizon_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TideForecastPoint {
    pub date: DateTime<Utc>,
    pub display_time: String,
    pub tide_cm: f64,
    pub location_code: String,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TideRealtimePoint {
    pub station_code: String,
    pub timestamp_epoch: i64,
    pub utc_time: DateTime<Utc>,
    pub vietnam_time_display: String,
    /// Calibration-adjusted level.
    pub water_level_cm: f64,
    pub unit: String,
}

/// One parameter reading reported by an industrial monitoring station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuringLog {
    pub value: f64,
    pub unit: String,
    pub min_limit: Option<f64>,
    pub max_limit: Option<f64>,
    pub status: String,
}

/// A full snapshot of a station at `received_at`. Also the shape of the
/// per-station "current" document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationReading {
    pub station_key: String,
    pub station_name: String,
    pub address: Option<String>,
    pub received_at: DateTime<Utc>,
    pub measuring_logs: BTreeMap<String, MeasuringLog>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub unit: String,
    pub min_limit: Option<f64>,
    pub max_limit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationMetadata {
    pub station_key: String,
    pub station_name: String,
    pub address: Option<String>,
    pub parameters: BTreeMap<String, ParameterInfo>,
}

impl StationMetadata {
    // ---
    pub fn from_reading(reading: &StationReading) -> Self {
        // ---
        let parameters = reading
            .measuring_logs
            .iter()
            .map(|(name, log)| {
                (
                    name.clone(),
                    ParameterInfo {
                        unit: log.unit.clone(),
                        min_limit: log.min_limit,
                        max_limit: log.max_limit,
                    },
                )
            })
            .collect();

        Self {
            station_key: reading.station_key.clone(),
            station_name: reading.station_name.clone(),
            address: reading.address.clone(),
            parameters,
        }
    }
}

/// Aggregate quality of one station snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Good,
    Exceeded,
    Unknown,
}

impl Quality {
    // ---
    /// Worst status across all parameters. An empty map is `Unknown`.
    pub fn from_logs(logs: &BTreeMap<String, MeasuringLog>) -> Self {
        // ---
        if logs.is_empty() {
            return Quality::Unknown;
        }
        let mut quality = Quality::Good;
        for log in logs.values() {
            let status = log.status.to_ascii_uppercase();
            if status.starts_with("EXCEEDED") {
                return Quality::Exceeded;
            }
            if status != "GOOD" && status != "NORMAL" {
                quality = Quality::Unknown;
            }
        }
        quality
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketEntry {
    pub timestamp: DateTime<Utc>,
    pub data: BTreeMap<String, MeasuringLog>,
    pub quality: Quality,
}

impl BucketEntry {
    pub fn from_reading(reading: &StationReading) -> Self {
        Self {
            timestamp: reading.received_at,
            data: reading.measuring_logs.clone(),
            quality: Quality::from_logs(&reading.measuring_logs),
        }
    }
}

/// One station-day of measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesBucket {
    pub station_key: String,
    pub bucket_date: NaiveDate,
    pub measurements: Vec<BucketEntry>,
    pub count: usize,
    pub content_hash: String,
}

/// One row of the scraped reservoir operations table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LakeRow {
    pub time: DateTime<Utc>,
    pub display_time: String,
    /// Head level (m).
    pub htl: Option<f64>,
    /// Normal water level (m).
    pub hdbt: Option<f64>,
    /// Current level (m).
    pub hc: Option<f64>,
    /// Inflow (m3/s).
    pub qve: Option<f64>,
    /// Total outflow (m3/s).
    pub sum_qx: Option<f64>,
    /// Spillway outflow (m3/s).
    pub qxt: Option<f64>,
    /// Turbine outflow (m3/s).
    pub qxm: Option<f64>,
    pub ncxs: Option<f64>,
    pub ncxm: Option<f64>,
}

// --- document identity

fn ts_key(ts: DateTime<Utc>) -> String {
    ts.timestamp().to_string()
}

impl Keyed for ReservoirLevelPoint {
    fn doc_key(&self) -> String {
        ts_key(self.timestamp)
    }
}

impl Keyed for InflowRatePoint {
    fn doc_key(&self) -> String {
        ts_key(self.timestamp)
    }
}

impl Keyed for OutflowRatePoint {
    fn doc_key(&self) -> String {
        ts_key(self.timestamp)
    }
}

impl Keyed for TideForecastPoint {
    fn doc_key(&self) -> String {
        format!("{}:{}", self.location_code, ts_key(self.date))
    }
    fn scope(&self) -> Option<String> {
        Some(self.location_code.clone())
    }
}

impl Keyed for TideRealtimePoint {
    fn doc_key(&self) -> String {
        format!("{}:{}", self.station_code, self.timestamp_epoch)
    }
    fn scope(&self) -> Option<String> {
        Some(self.station_code.clone())
    }
}

impl Keyed for StationReading {
    fn doc_key(&self) -> String {
        self.station_key.clone()
    }
    fn scope(&self) -> Option<String> {
        Some(self.station_key.clone())
    }
}

impl Keyed for StationMetadata {
    fn doc_key(&self) -> String {
        self.station_key.clone()
    }
    fn scope(&self) -> Option<String> {
        Some(self.station_key.clone())
    }
}

impl Keyed for TimeseriesBucket {
    fn doc_key(&self) -> String {
        format!("{}:{}", self.station_key, self.bucket_date)
    }
    fn scope(&self) -> Option<String> {
        Some(self.station_key.clone())
    }
}

impl Keyed for LakeRow {
    fn doc_key(&self) -> String {
        ts_key(self.time)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn log(value: f64, status: &str) -> MeasuringLog {
        MeasuringLog {
            value,
            unit: "mg/L".to_string(),
            min_limit: None,
            max_limit: Some(50.0),
            status: status.to_string(),
        }
    }

    fn logs(statuses: &[&str]) -> BTreeMap<String, MeasuringLog> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, s)| (format!("P{i}"), log(i as f64, s)))
            .collect()
    }

    #[test]
    fn quality_is_worst_status() {
        // ---
        assert_eq!(Quality::from_logs(&logs(&["GOOD", "good"])), Quality::Good);
        assert_eq!(
            Quality::from_logs(&logs(&["GOOD", "EXCEEDED_PREPARING"])),
            Quality::Exceeded
        );
        assert_eq!(
            Quality::from_logs(&logs(&["GOOD", "DATA_LOSS"])),
            Quality::Unknown
        );
        assert_eq!(Quality::from_logs(&BTreeMap::new()), Quality::Unknown);
    }

    #[test]
    fn metadata_catalogue_follows_reading() {
        // ---
        let reading = StationReading {
            station_key: "ST01".to_string(),
            station_name: "Outfall 1".to_string(),
            address: Some("KCN Nhon Trach".to_string()),
            received_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            measuring_logs: logs(&["GOOD", "GOOD"]),
        };
        let meta = StationMetadata::from_reading(&reading);
        assert_eq!(meta.station_key, "ST01");
        assert_eq!(meta.parameters.len(), 2);
        assert_eq!(meta.parameters["P0"].max_limit, Some(50.0));
    }

    #[test]
    fn document_keys_carry_scope() {
        // ---
        let point = TideForecastPoint {
            date: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            display_time: String::new(),
            tide_cm: 120.0,
            location_code: "VT".to_string(),
            unit: UNIT_CENTIMETERS.to_string(),
        };
        assert_eq!(point.doc_key(), "VT:1735689600");
        assert_eq!(point.scope().as_deref(), Some("VT"));
    }

    #[test]
    fn data_source_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(DataSource::Forecast).unwrap(),
            serde_json::json!("forecast")
        );
    }
}
