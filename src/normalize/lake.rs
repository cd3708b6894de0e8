//! Reservoir operations page scraper.
//!
//! The page renders one `<table>` of hourly operations rows. Only the first
//! table carrying ten-cell rows is read; header rows and rows whose first cell
//! is not a time are dropped.

use chrono::{DateTime, Utc};
use regex::Regex;

use super::{extract::parse_number, Normalized};
use crate::error::NormalizeError;
use crate::models::LakeRow;
use crate::time;

pub const CELLS_PER_ROW: usize = 10;

struct Patterns {
    table: Regex,
    row: Regex,
    cell: Regex,
    tag: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, NormalizeError> {
        // ---
        let build = |p: &str| Regex::new(p).map_err(|e| NormalizeError::Html(e.to_string()));
        Ok(Self {
            table: build(r"(?is)<table[^>]*>(.*?)</table>")?,
            row: build(r"(?is)<tr[^>]*>(.*?)</tr>")?,
            cell: build(r"(?is)<t[dh][^>]*>(.*?)</t[dh]>")?,
            tag: build(r"(?s)<[^>]*>")?,
        })
    }

    fn cells(&self, row_html: &str) -> Vec<String> {
        self.cell
            .captures_iter(row_html)
            .map(|c| clean_text(&self.tag.replace_all(&c[1], " ")))
            .collect()
    }
}

fn clean_text(raw: &str) -> String {
    raw.replace("&nbsp;", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Times appear either day-first (`5/1/2025 07:00`) or time-first
/// (`07:00 5/1/2025`).
fn parse_cell_time(cell: &str) -> Option<DateTime<Utc>> {
    // ---
    if let Some(ts) = time::parse_timestamp(cell) {
        return Some(ts);
    }
    let (first, rest) = cell.split_once(' ')?;
    if first.contains(':') {
        return time::parse_timestamp(&format!("{} {}", rest.trim(), first));
    }
    None
}

fn row_from_cells(cells: &[String]) -> Option<LakeRow> {
    // ---
    if cells.len() < CELLS_PER_ROW {
        return None;
    }
    let time = parse_cell_time(&cells[0])?;
    let num = |i: usize| parse_number(&cells[i]);
    Some(LakeRow {
        time,
        display_time: time::display_time(time),
        htl: num(1),
        hdbt: num(2),
        hc: num(3),
        qve: num(4),
        sum_qx: num(5),
        qxt: num(6),
        qxm: num(7),
        ncxs: num(8),
        ncxm: num(9),
    })
}

/// Read the operations table out of the page.
pub fn parse_lake_table(html: &str) -> Result<Normalized<LakeRow>, NormalizeError> {
    // ---
    let patterns = Patterns::compile()?;
    let mut saw_table = false;

    for table in patterns.table.captures_iter(html) {
        saw_table = true;
        let mut out = Normalized::new();
        for row in patterns.row.captures_iter(&table[1]) {
            let cells = patterns.cells(&row[1]);
            if cells.len() < CELLS_PER_ROW {
                continue;
            }
            let record = row_from_cells(&cells);
            if record.is_none() {
                tracing::debug!(first_cell = %cells[0], "skipping lake row without a time");
            }
            out.push(record);
        }
        if !out.records.is_empty() {
            return Ok(out);
        }
    }

    if !saw_table {
        return Err(NormalizeError::Html("no <table> element in page".into()));
    }
    Err(NormalizeError::Html(format!(
        "no table with {CELLS_PER_ROW}-cell rows and a readable time"
    )))
}
