//! # Iridium Network Clock
//!
//! Converts `AT-MSSTM` system time replies into UTC and keeps the offset
//! between network time and the local system clock.
//!
//! MSSTM reports a hexadecimal count of 90 ms ticks since the Iridium ERA2
//! epoch (2014-05-11 14:23:55 UTC).

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Length of one MSSTM tick in milliseconds
pub const IRIDIUM_TICK_MS: i64 = 90;

/// Reply text when the modem has no network time
const NO_NETWORK_SERVICE: &str = "no network service";

/// Iridium ERA2 epoch as a UTC instant
pub fn iridium_era2_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2014, 5, 11, 14, 23, 55)
        .single()
        .unwrap_or_default()
}

/// Convert a hexadecimal MSSTM tick count into a UTC instant
///
/// Returns `None` for empty, non-hex or overflowing values.
///
/// # Examples
///
/// ```
/// use site_survey::cier::clock::{iridium_era2_epoch, msstm_to_datetime};
///
/// let t = msstm_to_datetime("a").unwrap();
/// assert_eq!((t - iridium_era2_epoch()).num_milliseconds(), 900);
/// ```
pub fn msstm_to_datetime(hex_value: &str) -> Option<DateTime<Utc>> {
    let ticks = i64::from_str_radix(hex_value.trim(), 16).ok()?;
    let millis = ticks.checked_mul(IRIDIUM_TICK_MS)?;
    iridium_era2_epoch().checked_add_signed(Duration::milliseconds(millis))
}

/// Extract network time from an `AT-MSSTM` response line
///
/// Accepts lines such as `-MSSTM: 3a5f1c20`; returns `None` for other lines
/// and for `-MSSTM: no network service`.
pub fn parse_msstm_reply(line: &str) -> Option<DateTime<Utc>> {
    let (_, value) = line.split_once("-MSSTM:")?;
    let value = value.trim();
    if value.is_empty() || value == NO_NETWORK_SERVICE {
        return None;
    }
    msstm_to_datetime(value)
}

/// Source of the timestamps written to logs and events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSource {
    /// Corrected by Iridium network time
    Iridium,
    /// Local system clock only
    System,
}

impl std::fmt::Display for TimeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeSource::Iridium => write!(f, "Iridium"),
            TimeSource::System => write!(f, "System"),
        }
    }
}

/// System clock corrected by the last known network time offset
#[derive(Debug, Clone, Copy)]
pub struct NetworkClock {
    offset_ms: i64,
    source: TimeSource,
}

impl Default for NetworkClock {
    fn default() -> Self {
        Self {
            offset_ms: 0,
            source: TimeSource::System,
        }
    }
}

impl NetworkClock {
    /// Record a network time reading taken at `system_now`
    ///
    /// Returns how far corrected time moved, in milliseconds.
    pub fn sync(&mut self, network_time: DateTime<Utc>, system_now: DateTime<Utc>) -> i64 {
        let offset_ms = (network_time - system_now).num_milliseconds();
        let delta_ms = offset_ms - self.offset_ms;
        self.offset_ms = offset_ms;
        self.source = TimeSource::Iridium;
        delta_ms
    }

    /// Offset of network time over system time in milliseconds
    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    pub fn source(&self) -> TimeSource {
        self.source
    }

    /// Corrected instant for a given system time
    pub fn at(&self, system_now: DateTime<Utc>) -> DateTime<Utc> {
        system_now + Duration::milliseconds(self.offset_ms)
    }

    /// Corrected current time in milliseconds since the Unix epoch
    pub fn now_ms(&self) -> i64 {
        self.at(Utc::now()).timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch() {
        let epoch = iridium_era2_epoch();
        assert_eq!(epoch.to_rfc3339(), "2014-05-11T14:23:55+00:00");
    }

    #[test]
    fn test_msstm_conversion() {
        // 0x10 = 16 ticks = 1440 ms
        let t = msstm_to_datetime("10").unwrap();
        assert_eq!((t - iridium_era2_epoch()).num_milliseconds(), 1440);

        // Upper case and surrounding whitespace are accepted
        let t = msstm_to_datetime(" FF ").unwrap();
        assert_eq!((t - iridium_era2_epoch()).num_milliseconds(), 255 * 90);
    }

    #[test]
    fn test_msstm_invalid() {
        assert!(msstm_to_datetime("").is_none());
        assert!(msstm_to_datetime("xyz").is_none());
    }

    #[test]
    fn test_parse_msstm_reply() {
        let t = parse_msstm_reply("-MSSTM: 0000000a").unwrap();
        assert_eq!((t - iridium_era2_epoch()).num_milliseconds(), 900);

        assert!(parse_msstm_reply("-MSSTM: no network service").is_none());
        assert!(parse_msstm_reply("OK").is_none());
    }

    #[test]
    fn test_clock_sync_offset() {
        let system = Utc.with_ymd_and_hms(2025, 12, 17, 9, 0, 0).unwrap();
        let network = system + Duration::milliseconds(1500);

        let mut clock = NetworkClock::default();
        assert_eq!(clock.source(), TimeSource::System);

        assert_eq!(clock.sync(network, system), 1500);
        assert_eq!(clock.offset_ms(), 1500);
        assert_eq!(clock.source(), TimeSource::Iridium);
        assert_eq!(clock.at(system), network);

        // A later reading reports only the change
        assert_eq!(clock.sync(network + Duration::milliseconds(200), system), 200);
        assert_eq!(clock.offset_ms(), 1700);
    }

    #[test]
    fn test_time_source_display() {
        assert_eq!(TimeSource::Iridium.to_string(), "Iridium");
        assert_eq!(TimeSource::System.to_string(), "System");
    }
}
