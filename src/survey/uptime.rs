//! # Service Uptime Tracker
//!
//! Reduces the current session's service on/off events, plus accumulators
//! carried over from a saved session, into an uptime percentage and an
//! outage count.
//!
//! Carried-over values exist so that the wall-clock gap between saving and
//! resuming a survey is never counted as downtime.

use serde::Serialize;

/// Minimum elapsed time before uptime is reported for a fresh survey
pub const MIN_ELAPSED_MS: i64 = 60_000;

/// One service availability change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceEvent {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub available: bool,
}

/// Totals carried across session boundaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurveyAccumulators {
    pub loaded_duration_ms: i64,
    pub loaded_uptime_ms: i64,
    pub loaded_outage_count: u32,
}

/// Combined uptime figures
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UptimeStats {
    pub total_uptime_ms: i64,
    pub total_elapsed_ms: i64,
    pub outage_count: u32,
    pub percent: f64,
}

/// Result of an uptime computation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UptimeStatus {
    /// Less than a minute of data and nothing carried over
    InsufficientData,
    Measured(UptimeStats),
}

impl Default for UptimeStatus {
    fn default() -> Self {
        UptimeStatus::InsufficientData
    }
}

impl UptimeStatus {
    pub fn percent(&self) -> Option<f64> {
        match self {
            UptimeStatus::InsufficientData => None,
            UptimeStatus::Measured(stats) => Some(stats.percent),
        }
    }
}

/// Uptime and outages accrued by one session's events
///
/// Repeated "online" events restart the pending interval instead of being
/// counted twice. An interval still open at the end accrues up to `now_ms`.
/// Intervals that would be negative (out-of-order timestamps) contribute 0.
pub fn session_uptime(events: &[ServiceEvent], now_ms: i64) -> (i64, u32) {
    let mut uptime_ms = 0i64;
    let mut outages = 0u32;
    let mut online_since: Option<i64> = None;

    for event in events {
        if event.available {
            online_since = Some(event.timestamp);
        } else if let Some(start) = online_since.take() {
            uptime_ms += (event.timestamp - start).max(0);
            outages += 1;
        }
    }

    if let Some(start) = online_since {
        uptime_ms += (now_ms - start).max(0);
    }

    (uptime_ms, outages)
}

/// Tracks service availability for the live session
#[derive(Debug, Clone, Default)]
pub struct UptimeTracker {
    events: Vec<ServiceEvent>,
    session_start_ms: i64,
    carried: SurveyAccumulators,
}

impl UptimeTracker {
    /// Start tracking a live session at `session_start_ms`
    pub fn new(session_start_ms: i64) -> Self {
        Self {
            events: Vec::new(),
            session_start_ms,
            carried: SurveyAccumulators::default(),
        }
    }

    /// Append a service event in arrival order
    pub fn record(&mut self, timestamp: i64, available: bool) {
        self.events.push(ServiceEvent { timestamp, available });
    }

    pub fn events(&self) -> &[ServiceEvent] {
        &self.events
    }

    pub fn session_start_ms(&self) -> i64 {
        self.session_start_ms
    }

    pub fn carried(&self) -> SurveyAccumulators {
        self.carried
    }

    /// Last reported availability, if any event was seen this session
    pub fn is_available(&self) -> Option<bool> {
        self.events.last().map(|e| e.available)
    }

    /// Elapsed time including carried-over duration
    pub fn total_elapsed_ms(&self, now_ms: i64) -> i64 {
        self.carried.loaded_duration_ms + (now_ms - self.session_start_ms).max(0)
    }

    /// Uptime including carried-over uptime
    pub fn total_uptime_ms(&self, now_ms: i64) -> i64 {
        self.carried.loaded_uptime_ms + session_uptime(&self.events, now_ms).0
    }

    /// Outages including carried-over outages
    pub fn total_outages(&self, now_ms: i64) -> u32 {
        self.carried.loaded_outage_count + session_uptime(&self.events, now_ms).1
    }

    /// Compute combined uptime at `now_ms`
    pub fn compute(&self, now_ms: i64) -> UptimeStatus {
        let total_elapsed_ms = self.total_elapsed_ms(now_ms);
        if total_elapsed_ms < MIN_ELAPSED_MS && self.carried.loaded_duration_ms == 0 {
            return UptimeStatus::InsufficientData;
        }

        let (session_ms, session_outages) = session_uptime(&self.events, now_ms);
        let total_uptime_ms = self.carried.loaded_uptime_ms + session_ms;
        let percent = if total_elapsed_ms > 0 {
            (total_uptime_ms as f64 / total_elapsed_ms as f64 * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        UptimeStatus::Measured(UptimeStats {
            total_uptime_ms,
            total_elapsed_ms,
            outage_count: self.carried.loaded_outage_count + session_outages,
            percent,
        })
    }

    /// Replace carried totals and start a fresh live session at `now_ms`
    ///
    /// Live events are discarded: their timestamps belong to a different
    /// wall-clock session.
    pub fn resume(&mut self, carried: SurveyAccumulators, now_ms: i64) {
        self.carried = carried;
        self.events.clear();
        self.session_start_ms = now_ms;
    }

    /// Move the live session onto a clock that runs `delta_ms` ahead of the old one
    ///
    /// The session start and every recorded event shift together, so intervals
    /// measured so far are unchanged.
    pub fn rebase(&mut self, delta_ms: i64) {
        self.session_start_ms += delta_ms;
        for event in &mut self.events {
            event.timestamp += delta_ms;
        }
    }

    /// Forget everything and start over at `now_ms`
    pub fn reset(&mut self, now_ms: i64) {
        *self = Self::new(now_ms);
    }
}
