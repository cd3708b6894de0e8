//! Industrial station persistence: current reading, metadata and day buckets.
//!
//! Per station in a batch:
//! 1. load the stored current reading
//! 2. skip the station when the newest reading is not newer than the stored
//!    one *and* carries identical parameter values
//! 3. otherwise upsert the current reading and the metadata document
//! 4. append readings newer than the stored one into their day buckets
//!
//! A newer reading with identical values is still written.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::bucket;
use crate::error::StoreError;
use crate::models::{collections, BucketEntry, StationMetadata, StationReading};
use crate::store::{from_body, Document, DocumentStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StationWriteStats {
    pub stations: u64,
    pub skipped: u64,
    pub current_upserts: u64,
    pub buckets_written: u64,
    pub entries_appended: u64,
}

/// Whether `incoming` adds nothing over `stored`.
pub fn is_duplicate(stored: &StationReading, incoming: &StationReading) -> bool {
    incoming.received_at <= stored.received_at && incoming.measuring_logs == stored.measuring_logs
}

/// Readings grouped per station, sorted by time; a repeated timestamp keeps
/// the last reading seen.
fn group_by_station(readings: Vec<StationReading>) -> BTreeMap<String, Vec<StationReading>> {
    // ---
    let mut grouped: BTreeMap<String, BTreeMap<DateTime<Utc>, StationReading>> = BTreeMap::new();
    for reading in readings {
        grouped
            .entry(reading.station_key.clone())
            .or_default()
            .insert(reading.received_at, reading);
    }
    grouped
        .into_iter()
        .map(|(key, by_time)| (key, by_time.into_values().collect()))
        .collect()
}

pub async fn persist_station_batch(
    store: &dyn DocumentStore,
    readings: Vec<StationReading>,
) -> Result<StationWriteStats, StoreError> {
    // ---
    let mut stats = StationWriteStats::default();

    for (station_key, history) in group_by_station(readings) {
        let Some(newest) = history.last() else {
            continue;
        };
        stats.stations += 1;

        let previous: Option<StationReading> = store
            .find_one(collections::STATION_CURRENT, &station_key)
            .await?
            .map(from_body)
            .transpose()?;

        if let Some(prev) = &previous {
            if is_duplicate(prev, newest) {
                tracing::debug!(station = %station_key, "unchanged reading, skipping");
                stats.skipped += 1;
                continue;
            }
        }

        store
            .upsert(collections::STATION_CURRENT, Document::from_record(newest)?)
            .await?;
        stats.current_upserts += 1;

        let metadata = StationMetadata::from_reading(newest);
        store
            .upsert(collections::STATION_METADATA, Document::from_record(&metadata)?)
            .await?;

        let since = previous.as_ref().map(|p| p.received_at);
        let entries: Vec<BucketEntry> = history
            .iter()
            .filter(|r| since.map_or(true, |s| r.received_at > s))
            .map(BucketEntry::from_reading)
            .collect();
        if entries.is_empty() {
            continue;
        }

        let appended = entries.len() as u64;
        for day in bucket::group_by_day(&station_key, entries) {
            if store
                .append_bucket(collections::STATION_BUCKETS, Document::from_record(&day)?)
                .await?
            {
                stats.buckets_written += 1;
            }
        }
        stats.entries_appended += appended;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::MeasuringLog;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn reading(key: &str, at: DateTime<Utc>, ph: f64) -> StationReading {
        // ---
        let mut logs = BTreeMap::new();
        logs.insert(
            "pH".to_string(),
            MeasuringLog {
                value: ph,
                unit: String::new(),
                min_limit: Some(6.0),
                max_limit: Some(9.0),
                status: "GOOD".into(),
            },
        );
        StationReading {
            station_key: key.to_string(),
            station_name: key.to_string(),
            address: None,
            received_at: at,
            measuring_logs: logs,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 1, 3, 0, 0).unwrap()
    }

    #[test]
    fn same_reading_twice_writes_once() {
        // ---
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let first = persist_station_batch(&store, vec![reading("S1", t0(), 7.0)])
                .await
                .unwrap();
            assert_eq!(first.current_upserts, 1);
            assert_eq!(first.entries_appended, 1);

            let second = persist_station_batch(&store, vec![reading("S1", t0(), 7.0)])
                .await
                .unwrap();
            assert_eq!(second.skipped, 1);
            assert_eq!(second.current_upserts, 0);
            assert_eq!(store.write_count(collections::STATION_CURRENT).await, 1);
            assert_eq!(store.write_count(collections::STATION_BUCKETS).await, 1);
        });
    }

    #[test]
    fn newer_reading_with_same_values_is_written() {
        // ---
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            persist_station_batch(&store, vec![reading("S1", t0(), 7.0)]).await.unwrap();
            let later = t0() + Duration::minutes(5);
            let stats = persist_station_batch(&store, vec![reading("S1", later, 7.0)])
                .await
                .unwrap();
            assert_eq!(stats.skipped, 0);
            assert_eq!(stats.entries_appended, 1);

            let bucket = store
                .find_one(collections::STATION_BUCKETS, "S1:2025-02-01")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(bucket["count"], 2);
        });
    }

    #[test]
    fn metadata_carries_parameter_catalogue() {
        // ---
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            persist_station_batch(&store, vec![reading("S9", t0(), 8.1)]).await.unwrap();
            let meta: StationMetadata = from_body(
                store
                    .find_one(collections::STATION_METADATA, "S9")
                    .await
                    .unwrap()
                    .unwrap(),
            )
            .unwrap();
            assert_eq!(meta.parameters["pH"].max_limit, Some(9.0));
        });
    }
}
