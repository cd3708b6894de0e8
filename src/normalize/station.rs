//! Industrial monitoring station normalizer.
//!
//! Each upstream row is one station snapshot: identity, the time the
//! platform received it, and a `measuringLogs` map of parameter readings.

use std::collections::BTreeMap;

use serde_json::Value;

use super::{extract, require_array, Candidates, Normalized};
use crate::error::NormalizeError;
use crate::models::{MeasuringLog, StationReading};

pub const ARRAYS: &[&str] = &["data", "stations", "dtData"];

pub const KEY: Candidates = Candidates::new("station key", &["key", "stationKey", "station_key"]);
pub const NAME: Candidates = Candidates::new("station name", &["name", "stationName"]);
pub const ADDRESS: Candidates = Candidates::new("address", &["address", "location"]);
pub const RECEIVED_AT: Candidates =
    Candidates::new("received at", &["receivedAt", "received_at", "time"]);
pub const LOGS_FIELD: &str = "measuringLogs";

pub const LOG_VALUE: Candidates = Candidates::new("value", &["value", "val"]);
pub const LOG_UNIT: Candidates = Candidates::new("unit", &["unit"]);
pub const LOG_MIN: Candidates = Candidates::new("min limit", &["minLimit", "min_limit"]);
pub const LOG_MAX: Candidates = Candidates::new("max limit", &["maxLimit", "max_limit"]);
pub const LOG_STATUS: Candidates = Candidates::new("status", &["status", "warningLevel"]);

/// Read a `measuringLogs` object. Parameters without a numeric value are
/// skipped.
pub fn parse_logs(raw: &Value) -> BTreeMap<String, MeasuringLog> {
    // ---
    let Some(obj) = raw.as_object() else {
        return BTreeMap::new();
    };
    obj.iter()
        .filter_map(|(name, log)| {
            let value = LOG_VALUE.number(log).or_else(|| extract::as_finite(log));
            let Some(value) = value else {
                tracing::warn!(parameter = %name, "skipping parameter without a numeric value");
                return None;
            };
            Some((
                name.clone(),
                MeasuringLog {
                    value,
                    unit: LOG_UNIT.text(log).unwrap_or_default(),
                    min_limit: LOG_MIN.number(log),
                    max_limit: LOG_MAX.number(log),
                    status: LOG_STATUS.text(log).unwrap_or_else(|| "GOOD".to_string()),
                },
            ))
        })
        .collect()
}

fn normalize_row(row: &Value) -> Option<StationReading> {
    // ---
    let station_key = KEY.text(row)?;
    let received_at = RECEIVED_AT.timestamp(row)?;
    let measuring_logs = parse_logs(extract::field(row, LOGS_FIELD)?);
    if measuring_logs.is_empty() {
        return None;
    }
    Some(StationReading {
        station_name: NAME.text(row).unwrap_or_else(|| station_key.clone()),
        station_key,
        address: ADDRESS.text(row),
        received_at,
        measuring_logs,
    })
}

pub fn normalize_stations(raw: &Value) -> Result<Normalized<StationReading>, NormalizeError> {
    // ---
    let mut out = Normalized::new();
    for row in require_array(raw, ARRAYS)? {
        let record = normalize_row(row);
        if record.is_none() {
            tracing::warn!(?row, "dropping station row without key, time or readings");
        }
        out.push(record);
    }
    out.finish()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_station_snapshot() {
        // ---
        let raw = json!({"data": [{
            "key": "NT_01",
            "name": "Nhon Trach outfall",
            "address": "Dong Nai",
            "receivedAt": "2025-01-01T00:00:00Z",
            "measuringLogs": {
                "pH": {"value": 7.2, "unit": "", "minLimit": 6.0, "maxLimit": 9.0, "status": "GOOD"},
                "COD": {"value": "41.5", "unit": "mg/L", "maxLimit": 75, "status": "GOOD"},
                "Flow": {"value": null, "unit": "m3/h"}
            }
        }]});
        let batch = normalize_stations(&raw).unwrap();
        let reading = &batch.records[0];
        assert_eq!(reading.station_key, "NT_01");
        assert_eq!(reading.measuring_logs.len(), 2);
        assert_eq!(reading.measuring_logs["COD"].value, 41.5);
        assert_eq!(reading.measuring_logs["pH"].min_limit, Some(6.0));
    }

    #[test]
    fn rows_without_readings_are_dropped() {
        // ---
        let raw = json!({"stations": [
            {"key": "A", "receivedAt": "2025-01-01T00:00:00Z", "measuringLogs": {}},
            {"key": "B", "receivedAt": "bad", "measuringLogs": {"pH": {"value": 7}}},
            {"key": "C", "receivedAt": "2025-01-01T00:00:00Z", "measuringLogs": {"pH": {"value": 7}}}
        ]});
        let batch = normalize_stations(&raw).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].station_key, "C");
        assert_eq!(batch.records[0].station_name, "C");
        assert_eq!(batch.dropped, 2);
    }
}
