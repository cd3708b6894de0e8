//! Tide forecast and tide realtime normalizers.

use serde_json::Value;

use super::{require_array, Candidates, Normalized};
use crate::error::NormalizeError;
use crate::models::{TideForecastPoint, TideRealtimePoint, UNIT_CENTIMETERS};
use crate::time;

pub const ARRAYS: &[&str] = &["dtData", "dtDataTable", "data"];

pub const FORECAST_DATE: Candidates = Candidates::new("date", &["date", "thoigian", "time"]);
pub const FORECAST_VALUE: Candidates = Candidates::new("tide", &["value", "tide", "giatri"]);

pub const REALTIME_TIME: Candidates =
    Candidates::new("timestamp", &["timestamp", "time", "utcTime", "thoigian"]);
pub const REALTIME_VALUE: Candidates =
    Candidates::new("water level", &["value", "waterlevel", "water_level", "giatri"]);

/// Fixed per-station offsets (cm) subtracted from raw realtime readings to
/// bring them onto the national datum.
pub const CALIBRATIONS: &[(&str, f64)] = &[("VUNGTAU", 287.0)];

/// Offset to subtract for a station; zero for uncalibrated stations.
pub fn calibration_offset(station_code: &str) -> f64 {
    CALIBRATIONS
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(station_code))
        .map_or(0.0, |(_, offset)| *offset)
}

pub fn normalize_forecast(
    raw: &Value,
    location_code: &str,
) -> Result<Normalized<TideForecastPoint>, NormalizeError> {
    // ---
    let mut out = Normalized::new();
    for row in require_array(raw, ARRAYS)? {
        let record = FORECAST_DATE.timestamp(row).and_then(|date| {
            Some(TideForecastPoint {
                date,
                display_time: time::display_time(date),
                tide_cm: FORECAST_VALUE.number(row)?,
                location_code: location_code.to_string(),
                unit: UNIT_CENTIMETERS.to_string(),
            })
        });
        if record.is_none() {
            tracing::warn!(location = %location_code, ?row, "dropping tide forecast row");
        }
        out.push(record);
    }
    out.finish()
}

pub fn normalize_realtime(
    raw: &Value,
    station_code: &str,
) -> Result<Normalized<TideRealtimePoint>, NormalizeError> {
    // ---
    let offset = calibration_offset(station_code);
    let mut out = Normalized::new();
    for row in require_array(raw, ARRAYS)? {
        let record = REALTIME_TIME.timestamp(row).and_then(|utc_time| {
            Some(TideRealtimePoint {
                station_code: station_code.to_string(),
                timestamp_epoch: utc_time.timestamp(),
                utc_time,
                vietnam_time_display: time::display_time(utc_time),
                water_level_cm: REALTIME_VALUE.number(row)? - offset,
                unit: UNIT_CENTIMETERS.to_string(),
            })
        });
        if record.is_none() {
            tracing::warn!(station = %station_code, ?row, "dropping tide realtime row");
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

    fn one_row(value: f64) -> Value {
        json!({"dtData": [{"timestamp": 1_735_689_600, "value": value}]})
    }

    #[test]
    fn calibrated_station_is_offset() {
        // ---
        let batch = normalize_realtime(&one_row(300.0), "VUNGTAU").unwrap();
        assert_eq!(batch.records[0].water_level_cm, 300.0 - 287.0);
    }

    #[test]
    fn other_stations_unchanged() {
        // ---
        let batch = normalize_realtime(&one_row(300.0), "CANTHO").unwrap();
        assert_eq!(batch.records[0].water_level_cm, 300.0);
        assert_eq!(batch.records[0].timestamp_epoch, 1_735_689_600);
        assert_eq!(batch.records[0].vietnam_time_display, "07:00 01/01/2025");
    }

    #[test]
    fn realtime_accepts_millisecond_epochs_and_iso() {
        // ---
        let raw = json!({"dtData": [
            {"timestamp": 1_735_689_600_000_i64, "waterlevel": 120},
            {"utcTime": "2025-01-01T01:00:00Z", "giatri": "121.5"},
            {"time": "??", "value": 1}
        ]});
        let batch = normalize_realtime(&raw, "CANTHO").unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.dropped, 1);
        assert_eq!(batch.records[1].timestamp_epoch, 1_735_693_200);
    }

    #[test]
    fn forecast_rows_carry_location() {
        // ---
        let raw = json!({"dtData": [
            {"date": "1/1/2025 00:00", "value": 310},
            {"date": "1/1/2025 01:00", "tide": 295.5}
        ]});
        let batch = normalize_forecast(&raw, "VT").unwrap();
        assert_eq!(batch.records.len(), 2);
        assert!(batch.records.iter().all(|r| r.location_code == "VT"));
        assert_eq!(batch.records[1].tide_cm, 295.5);
    }
}
