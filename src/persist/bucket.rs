//! Day bucketing for station time series.
//!
//! One bucket per station per GMT+7 calendar day. A bucket's `content_hash`
//! is the SHA-256 of its serialized measurements, so re-appending the exact
//! same batch is detected by the store and skipped.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use sha2::{Digest, Sha256};

use crate::models::{BucketEntry, TimeseriesBucket};
use crate::time;

/// Hex SHA-256 of the measurements as JSON.
pub fn content_hash(measurements: &[BucketEntry]) -> String {
    // ---
    let bytes = serde_json::to_vec(measurements).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
}

/// Group entries into day buckets, ordered by day, entries ordered by time.
pub fn group_by_day<I>(station_key: &str, entries: I) -> Vec<TimeseriesBucket>
where
    I: IntoIterator<Item = BucketEntry>,
{
    // ---
    let mut days: BTreeMap<NaiveDate, Vec<BucketEntry>> = BTreeMap::new();
    for entry in entries {
        days.entry(time::local_day(entry.timestamp))
            .or_default()
            .push(entry);
    }

    days.into_iter()
        .map(|(bucket_date, mut measurements)| {
            measurements.sort_by_key(|e| e.timestamp);
            TimeseriesBucket {
                station_key: station_key.to_string(),
                bucket_date,
                count: measurements.len(),
                content_hash: content_hash(&measurements),
                measurements,
            }
        })
        .collect()
}

/// Merge `incoming` into `stored` by timestamp; a stored entry wins over an
/// incoming one with the same timestamp. Returns the merged bucket, entries in
/// time order, and the number of incoming entries it took.
pub fn merge(stored: &TimeseriesBucket, incoming: &TimeseriesBucket) -> (TimeseriesBucket, usize) {
    // ---
    let mut by_time: BTreeMap<DateTime<Utc>, BucketEntry> = stored
        .measurements
        .iter()
        .map(|e| (e.timestamp, e.clone()))
        .collect();

    let mut added = 0;
    for entry in &incoming.measurements {
        if let Entry::Vacant(slot) = by_time.entry(entry.timestamp) {
            slot.insert(entry.clone());
            added += 1;
        }
    }

    let measurements: Vec<BucketEntry> = by_time.into_values().collect();
    let merged = TimeseriesBucket {
        station_key: stored.station_key.clone(),
        bucket_date: stored.bucket_date,
        count: measurements.len(),
        content_hash: content_hash(&measurements),
        measurements,
    };
    (merged, added)
}
