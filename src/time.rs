//! Timestamp helpers shared by every pipeline.
//!
//! Upstream hydrology APIs speak local Vietnamese time (GMT+7) in a
//! non-padded `"YYYY-M-D H:m:s"` wire format, while everything we persist is
//! normalized to UTC. This module owns both directions of that conversion plus
//! the lookback/forecast windows each pipeline requests.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset,
    TimeZone, Timelike, Utc,
};

/// Offset of the upstream local clock (Indochina Time, no DST).
pub const LOCAL_OFFSET_SECS: i32 = 7 * 3600;

/// GMT+7 as a chrono offset.
pub fn local_offset() -> FixedOffset {
    FixedOffset::east_opt(LOCAL_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Format an instant in the upstream wire format, e.g. `2025-1-5 7:0:0`.
pub fn format_wire(ts: DateTime<Utc>) -> String {
    // ---
    let local = ts.with_timezone(&local_offset());
    format!(
        "{}-{}-{} {}:{}:{}",
        local.year(),
        local.month(),
        local.day(),
        local.hour(),
        local.minute(),
        local.second()
    )
}

/// Parse the wire format back into UTC. Zero-padded fields are accepted too.
pub fn parse_wire(s: &str) -> Option<DateTime<Utc>> {
    // ---
    let (date, time) = s.trim().split_once(' ')?;
    let [y, m, d] = split_fields::<3>(date, '-')?;
    let [h, mi, sec] = split_fields::<3>(time, ':')?;
    local_to_utc(y as i32, m, d, h, mi, sec)
}

/// Parse any timestamp shape the upstream APIs are known to emit:
///
/// - RFC 3339 / ISO-8601 with an explicit offset (`2025-01-05T07:00:00+07:00`)
/// - naive ISO-8601 (`2025-01-05T07:00:00`, `2025-01-05 07:00`), interpreted
///   as GMT+7
/// - the wire format (`2025-1-5 7:0:0`)
/// - local day-first (`5/1/2025 07:00`, optionally with seconds)
/// - a bare date in either order, taken as local midnight
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    // ---
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return naive_local_to_utc(naive);
        }
    }

    if s.contains('/') {
        return parse_day_first(s);
    }

    if let Some(ts) = parse_wire(s) {
        return Some(ts);
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(naive_local_to_utc)
}

/// Interpret an epoch number as seconds, or milliseconds when it is too large
/// to be a plausible seconds value.
pub fn from_epoch(raw: i64) -> Option<DateTime<Utc>> {
    if raw.abs() >= 100_000_000_000 {
        DateTime::from_timestamp_millis(raw)
    } else {
        DateTime::from_timestamp(raw, 0)
    }
}

/// Human display string in local time, e.g. `07:00 05/01/2025`.
pub fn display_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&local_offset())
        .format("%H:%M %d/%m/%Y")
        .to_string()
}

/// Calendar day of an instant as seen on the GMT+7 clock.
pub fn local_day(ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&local_offset()).date_naive()
}

/// Hour of day on the GMT+7 clock together with the minute inside it.
pub fn local_hour_minute(ts: DateTime<Utc>) -> (u32, u32) {
    let local = ts.with_timezone(&local_offset());
    (local.hour(), local.minute())
}

/// Hours between `now` and `ts`, rounded to one decimal and never negative.
pub fn hours_ahead(ts: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    // ---
    let hours = (ts - now).num_seconds() as f64 / 3600.0;
    ((hours * 10.0).round() / 10.0).max(0.0)
}

/// Earliest and latest timestamp of a result set.
pub fn date_range<I>(timestamps: I) -> Option<(DateTime<Utc>, DateTime<Utc>)>
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    timestamps.into_iter().fold(None, |acc, ts| match acc {
        None => Some((ts, ts)),
        Some((lo, hi)) => Some((lo.min(ts), hi.max(ts))),
    })
}

/// Longest request window, in days, on either side of "now".
pub const MAX_WINDOW_DAYS: u32 = 3650;

/// A closed request window sent to an upstream API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Window {
    // ---
    /// From local midnight `days` days ago up to `now`. `days` is capped at
    /// [`MAX_WINDOW_DAYS`].
    pub fn lookback(now: DateTime<Utc>, days: u32) -> Self {
        // ---
        let span = Duration::days(i64::from(days.min(MAX_WINDOW_DAYS)));
        let from = local_day(now)
            .checked_sub_signed(span)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .and_then(naive_local_to_utc)
            .or_else(|| now.checked_sub_signed(span))
            .unwrap_or(now);
        Self { from, to: now }
    }

    /// From `now` up to `days` days ahead, capped like [`Window::lookback`].
    pub fn ahead(now: DateTime<Utc>, days: u32) -> Self {
        let span = Duration::days(i64::from(days.min(MAX_WINDOW_DAYS)));
        Self {
            from: now,
            to: now.checked_add_signed(span).unwrap_or(now),
        }
    }

    pub fn wire_from(&self) -> String {
        format_wire(self.from)
    }

    pub fn wire_to(&self) -> String {
        format_wire(self.to)
    }
}

// ---

fn parse_day_first(s: &str) -> Option<DateTime<Utc>> {
    // ---
    let (date, time) = match s.split_once(' ') {
        Some((d, t)) => (d, Some(t.trim())),
        None => (s, None),
    };
    let [d, m, y] = split_fields::<3>(date, '/')?;
    let (h, mi, sec) = match time {
        None => (0, 0, 0),
        Some(t) => match t.split(':').count() {
            2 => {
                let [h, mi] = split_fields::<2>(t, ':')?;
                (h, mi, 0)
            }
            _ => {
                let [h, mi, sec] = split_fields::<3>(t, ':')?;
                (h, mi, sec)
            }
        },
    };
    local_to_utc(y as i32, m, d, h, mi, sec)
}

fn split_fields<const N: usize>(s: &str, sep: char) -> Option<[u32; N]> {
    // ---
    let mut out = [0u32; N];
    let mut parts = s.split(sep);
    for slot in out.iter_mut() {
        *slot = parts.next()?.trim().parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

fn local_to_utc(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> Option<DateTime<Utc>> {
    let naive = NaiveDate::from_ymd_opt(y, m, d)?.and_hms_opt(h, mi, s)?;
    naive_local_to_utc(naive)
}

fn naive_local_to_utc(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    local_offset()
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn wire_format_is_not_padded_and_local() {
        // ---
        let ts = Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 9).unwrap();
        assert_eq!(format_wire(ts), "2025-1-5 7:0:9");
    }

    #[test]
    fn wire_format_parses_back() {
        // ---
        let ts = Utc.with_ymd_and_hms(2024, 12, 31, 17, 30, 0).unwrap();
        let wire = format_wire(ts);
        assert_eq!(wire, "2025-1-1 0:30:0");
        assert_eq!(parse_wire(&wire), Some(ts));
        assert_eq!(parse_wire("2025-01-01 00:30:00"), Some(ts));
    }

    #[test]
    fn parses_day_first_local_format() {
        // ---
        let expected = Utc.with_ymd_and_hms(2025, 3, 4, 1, 15, 0).unwrap();
        assert_eq!(parse_timestamp("4/3/2025 08:15"), Some(expected));
        assert_eq!(parse_timestamp("04/03/2025 08:15:00"), Some(expected));
    }

    #[test]
    fn parses_iso_with_and_without_offset() {
        // ---
        let expected = Utc.with_ymd_and_hms(2025, 3, 4, 1, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2025-03-04T01:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-04T08:00:00+07:00"), Some(expected));
        // Naive ISO is local time
        assert_eq!(parse_timestamp("2025-03-04T08:00:00"), Some(expected));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("31/2/2025 10:00"), None);
        assert_eq!(parse_timestamp("2025-13-01 0:0:0"), None);
    }

    #[test]
    fn epoch_seconds_and_millis() {
        // ---
        let expected = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(from_epoch(1_735_689_600), Some(expected));
        assert_eq!(from_epoch(1_735_689_600_000), Some(expected));
    }

    #[test]
    fn hours_ahead_is_clamped() {
        // ---
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(hours_ahead(now + Duration::minutes(90), now), 1.5);
        assert_eq!(hours_ahead(now - Duration::hours(3), now), 0.0);
    }

    #[test]
    fn lookback_starts_at_local_midnight() {
        // ---
        // 2025-01-05 10:00 local
        let now = Utc.with_ymd_and_hms(2025, 1, 5, 3, 0, 0).unwrap();
        let window = Window::lookback(now, 2);
        assert_eq!(window.wire_from(), "2025-1-3 0:0:0");
        assert_eq!(window.to, now);
    }

    #[test]
    fn huge_windows_are_capped() {
        // ---
        let now = Utc.with_ymd_and_hms(2025, 1, 5, 3, 0, 0).unwrap();
        let back = Window::lookback(now, u32::MAX);
        assert_eq!(back, Window::lookback(now, MAX_WINDOW_DAYS));
        assert!(back.from < now);

        let ahead = Window::ahead(now, u32::MAX);
        assert_eq!(ahead.to, now + Duration::days(i64::from(MAX_WINDOW_DAYS)));
    }

    #[test]
    fn parses_space_separated_iso_without_seconds() {
        // ---
        let expected = Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2025-01-05 07:00"), Some(expected));
    }

    #[test]
    fn date_range_over_unordered_set() {
        // ---
        let a = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let c = Utc.with_ymd_and_hms(2025, 1, 3, 0, 0, 0).unwrap();
        assert_eq!(date_range([a, b, c]), Some((b, c)));
        assert_eq!(date_range(Vec::new()), None);
    }

    #[test]
    fn local_day_crosses_midnight() {
        // ---
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 18, 0, 0).unwrap();
        assert_eq!(local_day(ts), NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
    }
}
