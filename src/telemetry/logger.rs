//! CIER log writer
//!
//! Produces files the log importer reads back:
//!
//! ```text
//! # CIER Log - 2025-12-17 09:04:30
//! # Port: /dev/ttyUSB0 @ 19200 baud
//! # Time source: Iridium
//! #
//! [2025-12-17 09:04:33.123] +CIEV:0,3
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::cier::clock::TimeSource;
use crate::cier::logfile::format_timestamp;
use crate::cier::protocol::CIEV_PREFIX;
use crate::error::Result;

/// File name for a log started at `started`
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use site_survey::telemetry::logger::log_file_name;
///
/// let started = Utc.with_ymd_and_hms(2025, 12, 17, 9, 4, 30).unwrap();
/// assert_eq!(log_file_name(started), "cier_log_20251217_090430.log");
/// ```
pub fn log_file_name(started: DateTime<Utc>) -> String {
    format!("cier_log_{}.log", started.format("%Y%m%d_%H%M%S"))
}

/// Writes timestamped `+CIEV` lines to a log
pub struct CierLogWriter<W: Write> {
    writer: W,
    lines_written: u64,
}

impl CierLogWriter<BufWriter<File>> {
    /// Create a new log file in `dir` and write its header
    pub fn create_in<P: AsRef<Path>>(
        dir: P,
        started: DateTime<Utc>,
        port: &str,
        baud_rate: u32,
        source: TimeSource,
    ) -> Result<(Self, PathBuf)> {
        std::fs::create_dir_all(dir.as_ref())?;
        let path = dir.as_ref().join(log_file_name(started));
        let file = File::create(&path)?;
        let writer = Self::new(BufWriter::new(file), started, port, baud_rate, source)?;
        info!("Logging CIER events to {}", path.display());
        Ok((writer, path))
    }
}

impl<W: Write> CierLogWriter<W> {
    /// Wrap `writer` and emit the header
    pub fn new(
        mut writer: W,
        started: DateTime<Utc>,
        port: &str,
        baud_rate: u32,
        source: TimeSource,
    ) -> Result<Self> {
        writeln!(writer, "# CIER Log - {}", started.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(writer, "# Port: {} @ {} baud", port, baud_rate)?;
        writeln!(writer, "# Time source: {}", source)?;
        writeln!(writer, "#")?;
        writer.flush()?;

        Ok(Self {
            writer,
            lines_written: 0,
        })
    }

    /// Append `line` if it is an indicator report
    ///
    /// Returns whether the line was written. Each written line is flushed so
    /// an abrupt power loss costs at most the line in flight.
    pub fn log_line(&mut self, timestamp: DateTime<Utc>, line: &str) -> Result<bool> {
        let line = line.trim();
        if !line.starts_with(CIEV_PREFIX) {
            return Ok(false);
        }

        writeln!(self.writer, "[{}] {}", format_timestamp(timestamp), line)?;
        self.writer.flush()?;
        self.lines_written += 1;
        Ok(true)
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// Flush and hand back the underlying writer
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        debug!("CIER log closed after {} lines", self.lines_written);
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cier::logfile::import_log;
    use crate::cier::protocol::Indicator;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 17, 9, 4, 30).unwrap()
    }

    #[test]
    fn test_header_and_lines() {
        let mut log = CierLogWriter::new(Vec::new(), started(), "/dev/ttyUSB0", 19_200, TimeSource::Iridium).unwrap();
        let t = started() + chrono::Duration::milliseconds(3_123);

        assert!(log.log_line(t, "+CIEV:0,3\r").unwrap());
        assert!(!log.log_line(t, "OK").unwrap());
        assert!(!log.log_line(t, "-MSSTM: 0000000a").unwrap());
        assert_eq!(log.lines_written(), 1);

        let text = String::from_utf8(log.finish().unwrap()).unwrap();
        assert_eq!(
            text,
            "# CIER Log - 2025-12-17 09:04:30\n\
             # Port: /dev/ttyUSB0 @ 19200 baud\n\
             # Time source: Iridium\n\
             #\n\
             [2025-12-17 09:04:33.123] +CIEV:0,3\n"
        );
    }

    #[test]
    fn test_written_log_imports() {
        let mut log = CierLogWriter::new(Vec::new(), started(), "/dev/serial0", 19_200, TimeSource::System).unwrap();
        log.log_line(started(), "+CIEV:1,1").unwrap();
        log.log_line(started() + chrono::Duration::seconds(1), "+CIEV:0,5").unwrap();
        let text = String::from_utf8(log.finish().unwrap()).unwrap();

        let events = import_log(&text).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp, started().timestamp_millis());
        assert_eq!(events[1].indicator, Indicator::SignalStrength(5));
    }

    #[test]
    fn test_create_in_directory() {
        let dir = tempdir().unwrap();
        let logs = dir.path().join("logs");
        let (mut log, path) =
            CierLogWriter::create_in(&logs, started(), "/dev/ttyUSB0", 19_200, TimeSource::System).unwrap();
        log.log_line(started(), "+CIEV:2,0").unwrap();
        drop(log);

        assert_eq!(path, logs.join("cier_log_20251217_090430.log"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("# Time source: System"));
        assert!(text.ends_with("+CIEV:2,0\n"));
    }
}
