//! # CIER Log File Format
//!
//! Timestamped log lines of the form
//!
//! ```text
//! [2025-12-17 09:04:33.123] +CIEV:0,3
//! [2025-12-17 09:04:33.456] +CIEV:3,109,24,1,3716,-824,6052
//! ```
//!
//! Lines starting with `#` and blank lines are ignored. Timestamps are UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, trace};

use super::parser::parse_line;
use super::protocol::IndicatorEvent;
use crate::error::{Result, SurveyError};

/// chrono format of the bracketed timestamp
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Format a UTC instant as a log timestamp (millisecond precision)
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format(LOG_TIMESTAMP_FORMAT).to_string()
}

/// Parse a log timestamp as UTC milliseconds since the Unix epoch
pub fn parse_timestamp(text: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(text.trim(), LOG_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Decode a single log line into an indicator event
///
/// Returns `None` for comments, blank lines, lines without a valid bracketed
/// timestamp, and lines whose payload is not an indicator event.
pub fn parse_log_line(line: &str) -> Option<IndicatorEvent> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let rest = line.strip_prefix('[')?;
    let (stamp, payload) = rest.split_once(']')?;
    let timestamp = parse_timestamp(stamp)?;

    parse_line(payload, timestamp)
}

/// Decode a whole log file, dropping malformed lines
///
/// # Errors
///
/// Returns [`SurveyError::LogImport`] if the text contains no indicator events.
pub fn import_log(text: &str) -> Result<Vec<IndicatorEvent>> {
    let mut events = Vec::new();
    let mut dropped = 0usize;

    for line in text.lines() {
        match parse_log_line(line) {
            Some(event) => events.push(event),
            None => {
                let trimmed = line.trim();
                if !trimmed.is_empty() && !trimmed.starts_with('#') {
                    trace!("Skipping log line: {}", trimmed);
                    dropped += 1;
                }
            }
        }
    }

    if events.is_empty() {
        return Err(SurveyError::LogImport(
            "no indicator events found".to_string()
        ));
    }

    debug!("Imported {} events ({} lines skipped)", events.len(), dropped);
    Ok(events)
}
