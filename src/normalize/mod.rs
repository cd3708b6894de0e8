//! Response normalizers: upstream payload shapes in, fixed record schemas out.
//!
//! Normalizers are pure functions. A row that cannot be read (unparseable
//! timestamp, no numeric candidate) is dropped with a warning; the batch only
//! fails when the expected array is missing or nothing survives.

use serde_json::Value;

use crate::error::NormalizeError;

pub mod extract;
pub mod hydro;
pub mod lake;
pub mod station;
pub mod tide;

pub use extract::Candidates;

/// Records that survived normalization plus the number dropped on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    pub dropped: usize,
}

impl<T> Normalized<T> {
    // ---
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            dropped: 0,
        }
    }

    /// Keep the record, or count it as dropped.
    pub fn push(&mut self, record: Option<T>) {
        match record {
            Some(r) => self.records.push(r),
            None => self.dropped += 1,
        }
    }

    /// Fail when every row was dropped.
    pub fn finish(self) -> Result<Self, NormalizeError> {
        if self.records.is_empty() {
            return Err(NormalizeError::NoRecords {
                dropped: self.dropped,
            });
        }
        Ok(self)
    }
}

impl<T> Default for Normalized<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// First of `names` that holds a non-empty array, at the top level or under
/// the `data` envelope.
pub fn find_array<'a>(raw: &'a Value, names: &[&'static str]) -> Option<&'a Vec<Value>> {
    // ---
    let scopes = [Some(raw), raw.get("data").filter(|d| d.is_object())];
    scopes.into_iter().flatten().find_map(|scope| {
        names
            .iter()
            .filter_map(|name| extract::field(scope, name))
            .filter_map(Value::as_array)
            .find(|rows| !rows.is_empty())
    })
}

/// Like [`find_array`], but a missing array is a normalization failure.
pub fn require_array<'a>(
    raw: &'a Value,
    names: &[&'static str],
) -> Result<&'a Vec<Value>, NormalizeError> {
    find_array(raw, names).ok_or_else(|| NormalizeError::MissingArray {
        expected: names.to_vec(),
    })
}
