//! Offline inspection of a finished log.
//!
//! Used by the `verify` command and by tests to check what actually reached
//! the medium.

use crate::storage::writer::{LogHeader, HEADER_LINES};
use serde::{Deserialize, Serialize};

/// What was found in a log file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogReport {
    /// First and last header lines are as expected
    pub header_ok: bool,
    /// Complete, well-formed data rows
    pub rows: usize,
    pub malformed_rows: usize,
    /// Rows whose timestamp did not increase over the previous row
    pub non_monotonic: usize,
    /// The file ends in the middle of a row
    pub trailing_partial: bool,
    pub first_timestamp_us: Option<u64>,
    pub last_timestamp_us: Option<u64>,
}

impl LogReport {
    /// Mean spacing between consecutive rows.
    pub fn mean_interval_us(&self) -> Option<f64> {
        match (self.first_timestamp_us, self.last_timestamp_us) {
            (Some(first), Some(last)) if self.rows > 1 => {
                Some((last.saturating_sub(first)) as f64 / (self.rows - 1) as f64)
            }
            _ => None,
        }
    }

    /// Header intact and every complete row valid and increasing.
    pub fn is_clean(&self) -> bool {
        self.header_ok && self.malformed_rows == 0 && self.non_monotonic == 0
    }
}

fn parse_row(line: &str) -> Option<u64> {
    let mut fields = line.split(',');
    let timestamp: u64 = fields.next()?.parse().ok()?;

    let mut values = 0;
    for field in fields {
        let value: f32 = field.parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        values += 1;
    }
    (values == 6).then_some(timestamp)
}

/// Scan a log's text.
pub fn inspect_log(text: &str) -> LogReport {
    let mut report = LogReport::default();

    // A file cut mid-row has no final newline; the fragment is not a row
    let complete = match text.rfind('\n') {
        Some(end) => {
            report.trailing_partial = end + 1 < text.len();
            &text[..end + 1]
        }
        None => {
            report.trailing_partial = !text.is_empty();
            ""
        }
    };

    let mut lines = complete.lines();
    let header: Vec<&str> = lines.by_ref().take(HEADER_LINES).collect();
    report.header_ok = header.len() == HEADER_LINES
        && header[0] == LogHeader::identity()
        && header[HEADER_LINES - 1] == LogHeader::columns();

    let mut previous: Option<u64> = None;
    for line in lines {
        let Some(timestamp) = parse_row(line) else {
            report.malformed_rows += 1;
            continue;
        };

        if let Some(prev) = previous {
            if timestamp <= prev {
                report.non_monotonic += 1;
            }
        }
        if report.first_timestamp_us.is_none() {
            report.first_timestamp_us = Some(timestamp);
        }
        report.last_timestamp_us = Some(timestamp);
        previous = Some(timestamp);
        report.rows += 1;
    }

    report
}
