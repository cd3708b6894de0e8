//! Write strategies on top of [`crate::store::DocumentStore`].
//!
//! - [`replace`]: full replace of a collection or scope (delete, then insert)
//! - [`bucket`]: day bucketing of station snapshots
//! - [`station`]: dedup-aware current/metadata/bucket writes for stations
//!
//! Per-point upsert and insert-if-absent need no helper; pipelines call the
//! store directly for those.

pub mod bucket;
pub mod replace;
pub mod station;

pub use replace::{replace_all, ReplaceOutcome};
pub use station::{persist_station_batch, StationWriteStats};
