//! Ordered field-name extractors.
//!
//! Upstream APIs are inconsistent about what they call the same quantity
//! (`mucnuocho`, `value`, `giatri` ... depending on the parameter type). A
//! [`Candidates`] list names the quantity and the fields to try, in priority
//! order; the first field that parses wins.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::time;

/// A named, ordered list of candidate field names.
#[derive(Debug, Clone, Copy)]
pub struct Candidates {
    pub quantity: &'static str,
    pub fields: &'static [&'static str],
}

impl Candidates {
    // ---
    pub const fn new(quantity: &'static str, fields: &'static [&'static str]) -> Self {
        Self { quantity, fields }
    }

    /// First candidate that holds a finite number (JSON number or numeric
    /// string).
    pub fn number(&self, row: &Value) -> Option<f64> {
        self.fields
            .iter()
            .filter_map(|f| field(row, f))
            .find_map(as_finite)
    }

    /// First candidate that holds a non-empty string (numbers are rendered).
    pub fn text(&self, row: &Value) -> Option<String> {
        // ---
        self.fields
            .iter()
            .filter_map(|f| field(row, f))
            .find_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }

    /// First candidate that parses as a timestamp: a string in any format
    /// [`time::parse_timestamp`] accepts, or an epoch number.
    pub fn timestamp(&self, row: &Value) -> Option<DateTime<Utc>> {
        // ---
        self.fields
            .iter()
            .filter_map(|f| field(row, f))
            .find_map(|v| match v {
                Value::String(s) => time::parse_timestamp(s),
                Value::Number(n) => n.as_i64().and_then(time::from_epoch),
                _ => None,
            })
    }
}

/// Field lookup that falls back to a case-insensitive match.
pub fn field<'a>(row: &'a Value, name: &str) -> Option<&'a Value> {
    // ---
    let obj = row.as_object()?;
    if let Some(v) = obj.get(name) {
        return Some(v);
    }
    obj.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

/// Coerce a JSON value to a finite `f64`.
pub fn as_finite(value: &Value) -> Option<f64> {
    // ---
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_number(s)?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Parse a number as printed by the upstream pages: `12.5`, `12,5`,
/// `1,234.5`, with `-` or blank meaning "no value".
pub fn parse_number(raw: &str) -> Option<f64> {
    // ---
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() || s == "-" {
        return None;
    }
    let cleaned = if s.contains(',') && !s.contains('.') {
        s.replace(',', ".")
    } else {
        s.replace(',', "")
    };
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}
