//! Legacy station migration.
//!
//! Older deployments kept one document per industrial station with the whole
//! reading history inlined as an ever-growing array. [`split_legacy`] turns
//! such a document into the metadata / current / day-bucket trio written by
//! live ingestion, using the same bucketing code so both paths produce
//! identical buckets.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::models::{
    collections, BucketEntry, StationMetadata, StationReading, TimeseriesBucket,
};
use crate::normalize::station::parse_logs;
use crate::persist::bucket;
use crate::store::{from_body, Document, DocumentStore, Keyed};
use crate::time;

/// A flat-history station document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LegacyStation {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub history: Vec<LegacyEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyEntry {
    pub received_at: Value,
    #[serde(default)]
    pub measuring_logs: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigratedStation {
    pub metadata: StationMetadata,
    pub current: StationReading,
    pub buckets: Vec<TimeseriesBucket>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub stations: u64,
    pub skipped: u64,
    /// Stations whose current reading moved forward.
    pub current_updates: u64,
    /// Day buckets created or merged into.
    pub buckets: u64,
    /// Legacy entries added to buckets.
    pub entries: u64,
}

fn entry_time(raw: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    match raw {
        Value::String(s) => time::parse_timestamp(s),
        Value::Number(n) => n.as_i64().and_then(time::from_epoch),
        _ => None,
    }
}

/// Split one legacy document. Returns `None` when no history entry is usable.
pub fn split_legacy(legacy: LegacyStation) -> Option<MigratedStation> {
    // ---
    let name = legacy.name.unwrap_or_else(|| legacy.key.clone());
    let mut readings: Vec<StationReading> = legacy
        .history
        .iter()
        .filter_map(|entry| {
            let received_at = entry_time(&entry.received_at)?;
            let measuring_logs = parse_logs(&entry.measuring_logs);
            (!measuring_logs.is_empty()).then(|| StationReading {
                station_key: legacy.key.clone(),
                station_name: name.clone(),
                address: legacy.address.clone(),
                received_at,
                measuring_logs,
            })
        })
        .collect();
    readings.sort_by_key(|r| r.received_at);
    readings.dedup_by_key(|r| r.received_at);

    let current = readings.last()?.clone();
    let buckets = bucket::group_by_day(&legacy.key, readings.iter().map(BucketEntry::from_reading));

    Some(MigratedStation {
        metadata: StationMetadata::from_reading(&current),
        current,
        buckets,
    })
}

/// Fold the split buckets into what is already stored. A bucket live
/// ingestion already wrote is merged by timestamp, so re-running the migration
/// or migrating after live ingestion never duplicates an entry.
async fn plan_buckets(
    store: &dyn DocumentStore,
    buckets: Vec<TimeseriesBucket>,
) -> Result<(Vec<TimeseriesBucket>, u64), StoreError> {
    // ---
    let mut writes = Vec::new();
    let mut added = 0u64;

    for day in buckets {
        let stored: Option<TimeseriesBucket> = store
            .find_one(collections::STATION_BUCKETS, &day.doc_key())
            .await?
            .map(from_body)
            .transpose()?;

        match stored {
            None => {
                added += day.count as u64;
                writes.push(day);
            }
            Some(stored) => {
                let (merged, n) = bucket::merge(&stored, &day);
                if merged.measurements != stored.measurements {
                    added += n as u64;
                    writes.push(merged);
                }
            }
        }
    }
    Ok((writes, added))
}

/// Migrate every document in the legacy collection. With `dry_run` nothing is
/// written.
///
/// The current reading and metadata are only replaced when the legacy history
/// ends later than what is stored.
pub async fn run_migration(
    store: &dyn DocumentStore,
    dry_run: bool,
) -> Result<MigrationReport, StoreError> {
    // ---
    let mut report = MigrationReport::default();

    for body in store.find_scope(collections::LEGACY_STATIONS, None).await? {
        let legacy: LegacyStation = match from_body(body) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(error = %e, "unreadable legacy station document, skipping");
                report.skipped += 1;
                continue;
            }
        };
        let key = legacy.key.clone();
        let Some(migrated) = split_legacy(legacy) else {
            tracing::warn!(station = %key, "legacy station has no usable history, skipping");
            report.skipped += 1;
            continue;
        };
        report.stations += 1;

        let previous: Option<StationReading> = store
            .find_one(collections::STATION_CURRENT, &key)
            .await?
            .map(from_body)
            .transpose()?;
        let advance_current = previous
            .as_ref()
            .map_or(true, |p| migrated.current.received_at > p.received_at);

        let (writes, added) = plan_buckets(store, migrated.buckets).await?;
        report.buckets += writes.len() as u64;
        report.entries += added;
        if advance_current {
            report.current_updates += 1;
        }
        tracing::info!(
            station = %key,
            buckets = writes.len(),
            entries = added,
            advance_current,
            dry_run,
            "migrating legacy station"
        );
        if dry_run {
            continue;
        }

        if advance_current {
            store
                .upsert(collections::STATION_METADATA, Document::from_record(&migrated.metadata)?)
                .await?;
            store
                .upsert(collections::STATION_CURRENT, Document::from_record(&migrated.current)?)
                .await?;
        }
        for day in &writes {
            store
                .upsert(collections::STATION_BUCKETS, Document::from_record(day)?)
                .await?;
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::MeasuringLog;
    use crate::persist::persist_station_batch;
    use std::collections::BTreeMap;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn legacy_doc() -> Value {
        json!({
            "key": "NT_01",
            "name": "Nhon Trach",
            "history": [
                {"receivedAt": "2025-01-02T01:00:00Z", "measuringLogs": {"pH": {"value": 7.1, "unit": "", "status": "GOOD"}}},
                {"receivedAt": "2025-01-01T01:00:00Z", "measuringLogs": {"pH": {"value": 7.0, "unit": "", "status": "GOOD"}}},
                {"receivedAt": "2025-01-01T02:00:00Z", "measuringLogs": {"pH": {"value": 9.5, "unit": "", "status": "EXCEEDED"}}},
                {"receivedAt": "broken", "measuringLogs": {"pH": {"value": 1}}}
            ]
        })
    }

    #[test]
    fn splits_history_into_day_buckets() {
        // ---
        let legacy: LegacyStation = serde_json::from_value(legacy_doc()).unwrap();
        let migrated = split_legacy(legacy).unwrap();
        assert_eq!(migrated.buckets.len(), 2);
        assert_eq!(migrated.buckets[0].count, 2);
        assert_eq!(migrated.current.measuring_logs["pH"].value, 7.1);
        assert_eq!(migrated.metadata.station_name, "Nhon Trach");
    }

    #[test]
    fn legacy_and_live_paths_build_the_same_buckets() {
        // ---
        tokio_test::block_on(async {
            let legacy: LegacyStation = serde_json::from_value(legacy_doc()).unwrap();
            let migrated = split_legacy(legacy.clone()).unwrap();

            let live = MemoryStore::new();
            let readings: Vec<StationReading> = migrated
                .buckets
                .iter()
                .flat_map(|b| b.measurements.iter())
                .map(|e| StationReading {
                    station_key: "NT_01".into(),
                    station_name: "Nhon Trach".into(),
                    address: None,
                    received_at: e.timestamp,
                    measuring_logs: e.data.clone(),
                })
                .collect();
            persist_station_batch(&live, readings).await.unwrap();

            for day in &migrated.buckets {
                let key = format!("NT_01:{}", day.bucket_date);
                let stored = live
                    .find_one(collections::STATION_BUCKETS, &key)
                    .await
                    .unwrap()
                    .unwrap();
                let stored: TimeseriesBucket = from_body(stored).unwrap();
                assert_eq!(&stored, day);
            }
        });
    }

    #[test]
    fn dry_run_writes_nothing() {
        // ---
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            store
                .insert_many(
                    collections::LEGACY_STATIONS,
                    vec![Document {
                        key: "NT_01".into(),
                        scope: None,
                        body: legacy_doc(),
                    }],
                )
                .await
                .unwrap();

            let report = run_migration(&store, true).await.unwrap();
            assert_eq!(report.stations, 1);
            assert_eq!(report.entries, 3);
            assert_eq!(store.len(collections::STATION_BUCKETS).await, 0);

            run_migration(&store, false).await.unwrap();
            assert_eq!(store.len(collections::STATION_BUCKETS).await, 2);
            assert_eq!(store.len(collections::STATION_CURRENT).await, 1);
        });
    }

    #[test]
    fn migration_after_live_ingestion_merges_instead_of_duplicating() {
        // ---
        tokio_test::block_on(async {
            let live_at = time::parse_timestamp("2025-01-02T03:00:00Z").unwrap();
            let mut logs = BTreeMap::new();
            logs.insert(
                "pH".to_string(),
                MeasuringLog {
                    value: 7.3,
                    unit: String::new(),
                    min_limit: None,
                    max_limit: None,
                    status: "GOOD".into(),
                },
            );
            let live_reading = StationReading {
                station_key: "NT_01".into(),
                station_name: "Nhon Trach".into(),
                address: None,
                received_at: live_at,
                measuring_logs: logs,
            };

            let store = MemoryStore::new();
            persist_station_batch(&store, vec![live_reading.clone()]).await.unwrap();
            store
                .insert_many(
                    collections::LEGACY_STATIONS,
                    vec![Document {
                        key: "NT_01".into(),
                        scope: None,
                        body: json!({
                            "key": "NT_01",
                            "name": "Nhon Trach",
                            "history": [
                                {"receivedAt": "2025-01-02T01:00:00Z", "measuringLogs": {"pH": {"value": 7.1, "status": "GOOD"}}},
                                {"receivedAt": "2025-01-02T03:00:00Z", "measuringLogs": {"pH": {"value": 6.9, "status": "GOOD"}}}
                            ]
                        }),
                    }],
                )
                .await
                .unwrap();

            let first = run_migration(&store, false).await.unwrap();
            assert_eq!(first.entries, 1);
            assert_eq!(first.current_updates, 0);
            let second = run_migration(&store, false).await.unwrap();
            assert_eq!(second.entries, 0);
            assert_eq!(second.buckets, 0);

            let stored: TimeseriesBucket = from_body(
                store
                    .find_one(collections::STATION_BUCKETS, "NT_01:2025-01-02")
                    .await
                    .unwrap()
                    .unwrap(),
            )
            .unwrap();
            let times: Vec<_> = stored.measurements.iter().map(|e| e.timestamp).collect();
            assert_eq!(times, vec![live_at - chrono::Duration::hours(2), live_at]);
            assert_eq!(stored.count, 2);
            assert_eq!(stored.measurements[1].data["pH"].value, 7.3);

            // The live reading stays current
            let current: StationReading = from_body(
                store
                    .find_one(collections::STATION_CURRENT, "NT_01")
                    .await
                    .unwrap()
                    .unwrap(),
            )
            .unwrap();
            assert_eq!(current, live_reading);

            // Same bucket the live path builds from both readings at once
            let legacy_early = StationReading {
                received_at: times[0],
                measuring_logs: stored.measurements[0].data.clone(),
                ..live_reading.clone()
            };
            let fresh = MemoryStore::new();
            persist_station_batch(&fresh, vec![legacy_early, live_reading]).await.unwrap();
            let expected: TimeseriesBucket = from_body(
                fresh
                    .find_one(collections::STATION_BUCKETS, "NT_01:2025-01-02")
                    .await
                    .unwrap()
                    .unwrap(),
            )
            .unwrap();
            assert_eq!(stored, expected);
        });
    }
}
