//! # Survey Engine
//!
//! Single owner of all mutable survey state: coverage grid, satellite tracks,
//! raw report lists and the uptime tracker. Indicator events are applied in
//! arrival order; derived metrics are computed on demand.
//!
//! Readers get [`SurveySummary`] snapshots through a `tokio::sync::watch`
//! channel instead of touching engine state directly.
//!
//! ## Usage
//!
//! ```
//! use site_survey::cier::parser::parse_line;
//! use site_survey::survey::engine::{SurveyEngine, SurveySettings};
//! use site_survey::survey::geometry::Location;
//!
//! let mut engine = SurveyEngine::new(SurveySettings::default(), Location::new(52.0, -1.0), 0);
//! if let Some(event) = parse_line("+CIEV:1,1", 0) {
//!     engine.process(&event);
//! }
//! let summary = engine.summary(120_000);
//! assert_eq!(summary.service_available, Some(true));
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, trace};

use super::geometry::{ecef_to_elev_az, Location};
use super::grid::{min_observations_for_valid_cell, CoverageGrid};
use super::horizon::{classify_horizon, HorizonSummary};
use super::uptime::{SurveyAccumulators, UptimeStatus, UptimeTracker};
use super::verdict::{evaluate, Verdict};
use crate::cier::protocol::{Indicator, IndicatorEvent, PositionType, SvBeamPosition};

/// Default minimum elevation for an observation to enter the grid
pub const DEFAULT_MIN_ELEVATION_DEG: f64 = 8.0;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Tunables of the aggregation engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurveySettings {
    /// Observations below this elevation are tracked but not gridded
    pub min_elevation_deg: f64,
}

impl Default for SurveySettings {
    fn default() -> Self {
        Self {
            min_elevation_deg: DEFAULT_MIN_ELEVATION_DEG,
        }
    }
}

/// One signal strength report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RssiReport {
    pub timestamp: i64,
    pub rssi: u8,
}

/// A satellite position seen from the observer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SatelliteObservation {
    pub timestamp: i64,
    pub sv_id: u32,
    pub beam_id: u32,
    pub x: i64,
    pub y: i64,
    pub z: i64,
    /// Clamped to ≥ 0 at transform time
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
}

/// Everything reported about one satellite
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SatelliteTrack {
    pub reports: Vec<SatelliteObservation>,
    pub beams: BTreeSet<u32>,
}

/// Signal strength statistics over the stored reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SignalStats {
    pub samples: usize,
    pub last: Option<u8>,
    pub mean: Option<f64>,
}

/// State changes worth surfacing to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveyNotice {
    /// Service availability changed
    ServiceChanged(bool),
    /// Antenna fault went from clear to asserted
    AntennaFaultAsserted,
    /// First position report from this satellite
    NewSatellite(u32),
}

/// Point-in-time view of the derived survey metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SurveySummary {
    pub timestamp: i64,
    pub elapsed_ms: i64,
    pub uptime: UptimeStatus,
    pub min_observations: u32,
    pub coverage_percent: u32,
    pub horizon_coverage_percent: u32,
    pub horizon: HorizonSummary,
    pub verdict: Verdict,
    pub satellites_seen: usize,
    pub observation_count: usize,
    pub signal: SignalStats,
    pub service_available: Option<bool>,
    pub antenna_fault: bool,
    pub antenna_fault_count: u32,
}

/// Persistable engine state, swapped in wholesale on restore
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    pub accumulators: SurveyAccumulators,
    pub location: Location,
    pub rssi_reports: Vec<RssiReport>,
    pub observations: Vec<SatelliteObservation>,
    pub grid: CoverageGrid,
    pub tracks: BTreeMap<u32, SatelliteTrack>,
}

/// Telemetry interpretation and aggregation engine
#[derive(Debug)]
pub struct SurveyEngine {
    settings: SurveySettings,
    location: Location,
    grid: CoverageGrid,
    tracks: BTreeMap<u32, SatelliteTrack>,
    rssi_reports: Vec<RssiReport>,
    observations: Vec<SatelliteObservation>,
    uptime: UptimeTracker,
    antenna_fault: bool,
    antenna_fault_count: u32,
    notifier: watch::Sender<SurveySummary>,
}

impl SurveyEngine {
    /// Create an engine whose live session starts at `now_ms`
    pub fn new(settings: SurveySettings, location: Location, now_ms: i64) -> Self {
        let engine = Self {
            settings,
            location,
            grid: CoverageGrid::new(),
            tracks: BTreeMap::new(),
            rssi_reports: Vec::new(),
            observations: Vec::new(),
            uptime: UptimeTracker::new(now_ms),
            antenna_fault: false,
            antenna_fault_count: 0,
            notifier: watch::channel(SurveySummary::default()).0,
        };
        engine.publish(now_ms);
        engine
    }

    /// Rebuild a survey from a recorded event sequence
    ///
    /// The live session starts at the first event; call [`summary`] with the
    /// last event's timestamp to evaluate it.
    ///
    /// [`summary`]: SurveyEngine::summary
    pub fn replay<'a, I>(settings: SurveySettings, location: Location, events: I) -> Self
    where
        I: IntoIterator<Item = &'a IndicatorEvent>,
    {
        let mut events = events.into_iter().peekable();
        let start = events.peek().map(|e| e.timestamp).unwrap_or_default();

        let mut engine = Self::new(settings, location, start);
        for event in events {
            engine.process(event);
        }
        engine
    }

    /// Apply one indicator event
    pub fn process(&mut self, event: &IndicatorEvent) -> Option<SurveyNotice> {
        match event.indicator {
            Indicator::SignalStrength(rssi) => {
                self.rssi_reports.push(RssiReport {
                    timestamp: event.timestamp,
                    rssi,
                });
                None
            }
            Indicator::ServiceAvailability(available) => {
                let changed = self.uptime.is_available() != Some(available);
                self.uptime.record(event.timestamp, available);
                changed.then_some(SurveyNotice::ServiceChanged(available))
            }
            Indicator::AntennaFault(fault) => {
                let asserted = fault && !self.antenna_fault;
                self.antenna_fault = fault;
                if asserted {
                    self.antenna_fault_count += 1;
                    Some(SurveyNotice::AntennaFaultAsserted)
                } else {
                    None
                }
            }
            Indicator::SatellitePosition(position) => self.process_position(event.timestamp, &position),
        }
    }

    fn process_position(&mut self, timestamp: i64, position: &SvBeamPosition) -> Option<SurveyNotice> {
        if position.position_type != PositionType::Satellite {
            trace!("Ignoring beam landing report from SV {}", position.sv_id);
            return None;
        }

        let (elevation_deg, azimuth_deg) = ecef_to_elev_az(
            position.x as f64,
            position.y as f64,
            position.z as f64,
            self.location.lat,
            self.location.lon,
        );

        let observation = SatelliteObservation {
            timestamp,
            sv_id: position.sv_id,
            beam_id: position.beam_id,
            x: position.x,
            y: position.y,
            z: position.z,
            elevation_deg,
            azimuth_deg,
        };
        self.observations.push(observation);

        let is_new = !self.tracks.contains_key(&position.sv_id);
        let track = self.tracks.entry(position.sv_id).or_default();
        track.reports.push(observation);
        track.beams.insert(position.beam_id);

        if elevation_deg >= self.settings.min_elevation_deg {
            if let Some((sector, band)) = self.grid.record(azimuth_deg, elevation_deg, position.sv_id) {
                trace!("SV {} -> cell ({}, {})", position.sv_id, sector, band);
            }
        }

        is_new.then_some(SurveyNotice::NewSatellite(position.sv_id))
    }

    /// Compute derived metrics at `now_ms`
    pub fn summary(&self, now_ms: i64) -> SurveySummary {
        let elapsed_ms = self.uptime.total_elapsed_ms(now_ms);
        let min_observations = min_observations_for_valid_cell(elapsed_ms as f64 / MS_PER_HOUR);
        let uptime = self.uptime.compute(now_ms);
        let horizon = classify_horizon(&self.grid, min_observations);

        SurveySummary {
            timestamp: now_ms,
            elapsed_ms,
            uptime,
            min_observations,
            coverage_percent: self.grid.coverage_percent(min_observations),
            horizon_coverage_percent: self.grid.horizon_coverage_percent(min_observations),
            horizon,
            verdict: evaluate(&uptime, &horizon),
            satellites_seen: self.tracks.len(),
            observation_count: self.observations.len(),
            signal: self.signal_stats(),
            service_available: self.uptime.is_available(),
            antenna_fault: self.antenna_fault,
            antenna_fault_count: self.antenna_fault_count,
        }
    }

    /// Compute a summary and hand it to every subscriber
    pub fn publish(&self, now_ms: i64) -> SurveySummary {
        let summary = self.summary(now_ms);
        self.notifier.send_replace(summary.clone());
        summary
    }

    /// Receive summaries as they are published
    pub fn subscribe(&self) -> watch::Receiver<SurveySummary> {
        self.notifier.subscribe()
    }

    fn signal_stats(&self) -> SignalStats {
        let samples = self.rssi_reports.len();
        let sum: u64 = self.rssi_reports.iter().map(|r| r.rssi as u64).sum();
        SignalStats {
            samples,
            last: self.rssi_reports.last().map(|r| r.rssi),
            mean: (samples > 0).then(|| sum as f64 / samples as f64),
        }
    }

    /// Change the observer location
    ///
    /// Stored elevation/azimuth values are not recomputed.
    pub fn set_location(&mut self, location: Location) {
        debug!("Observer location set to {:.5}, {:.5}", location.lat, location.lon);
        self.location = location;
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn settings(&self) -> SurveySettings {
        self.settings
    }

    pub fn grid(&self) -> &CoverageGrid {
        &self.grid
    }

    pub fn tracks(&self) -> &BTreeMap<u32, SatelliteTrack> {
        &self.tracks
    }

    pub fn rssi_reports(&self) -> &[RssiReport] {
        &self.rssi_reports
    }

    /// Sky positions of satellite reports (beam landings excluded)
    pub fn observations(&self) -> &[SatelliteObservation] {
        &self.observations
    }

    pub fn uptime(&self) -> &UptimeTracker {
        &self.uptime
    }

    /// Carried-over totals combined with the live session at `now_ms`
    pub fn accumulators(&self, now_ms: i64) -> SurveyAccumulators {
        SurveyAccumulators {
            loaded_duration_ms: self.uptime.total_elapsed_ms(now_ms),
            loaded_uptime_ms: self.uptime.total_uptime_ms(now_ms),
            loaded_outage_count: self.uptime.total_outages(now_ms),
        }
    }

    /// Copy out everything a saved session needs
    pub fn export_state(&self, now_ms: i64) -> EngineState {
        EngineState {
            accumulators: self.accumulators(now_ms),
            location: self.location,
            rssi_reports: self.rssi_reports.clone(),
            observations: self.observations.clone(),
            grid: self.grid.clone(),
            tracks: self.tracks.clone(),
        }
    }

    /// Replace all state with a loaded session; the live session restarts at `now_ms`
    pub fn restore(&mut self, state: EngineState, now_ms: i64) {
        self.location = state.location;
        self.rssi_reports = state.rssi_reports;
        self.observations = state.observations;
        self.grid = state.grid;
        self.tracks = state.tracks;
        self.uptime.resume(state.accumulators, now_ms);
        self.antenna_fault = false;
        self.antenna_fault_count = 0;
        self.publish(now_ms);
    }

    /// Follow a clock correction of `delta_ms`
    ///
    /// Call when the timestamp source jumps, e.g. after a network time sync,
    /// so the live session start stays on the same clock as later events.
    pub fn rebase_clock(&mut self, delta_ms: i64) {
        if delta_ms != 0 {
            self.uptime.rebase(delta_ms);
        }
    }

    /// Drop all survey data and start a new live session at `now_ms`
    pub fn reset(&mut self, now_ms: i64) {
        self.grid.reset();
        self.tracks.clear();
        self.rssi_reports.clear();
        self.observations.clear();
        self.uptime.reset(now_ms);
        self.antenna_fault = false;
        self.antenna_fault_count = 0;
        self.publish(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cier::parser::parse_line;
    use crate::survey::geometry::{observer_ecef, EARTH_RADIUS_KM};
    use crate::survey::grid::{AZIMUTH_SECTORS, GRID_CELLS};

    const LAT: f64 = 0.0;
    const LON: f64 = 0.0;

    fn engine() -> SurveyEngine {
        SurveyEngine::new(SurveySettings::default(), Location::new(LAT, LON), 0)
    }

    fn event(line: &str, timestamp: i64) -> IndicatorEvent {
        parse_line(line, timestamp).unwrap()
    }

    /// Position line for a satellite straight overhead
    fn overhead_line(sv: u32, beam: u32, flag: u8) -> String {
        let [x, y, z] = observer_ecef(LAT, LON);
        let scale = (EARTH_RADIUS_KM + 780.0) / EARTH_RADIUS_KM;
        format!(
            "+CIEV:3,{},{},{},{},{},{}",
            sv,
            beam,
            flag,
            (x * scale).round() as i64,
            (y * scale).round() as i64,
            (z * scale).round() as i64
        )
    }

    #[test]
    fn test_satellite_position_is_aggregated() {
        let mut engine = engine();
        let notice = engine.process(&event(&overhead_line(42, 7, 1), 1_000));
        assert_eq!(notice, Some(SurveyNotice::NewSatellite(42)));

        assert_eq!(engine.observations().len(), 1);
        let obs = engine.observations()[0];
        assert!(obs.elevation_deg > 89.0);

        let track = &engine.tracks()[&42];
        assert_eq!(track.reports.len(), 1);
        assert!(track.beams.contains(&7));

        assert_eq!(engine.grid().total_observations(), 1);
        // Zenith lands in the top band
        let top: u32 = (0..AZIMUTH_SECTORS).map(|s| engine.grid().count(s, 6)).sum();
        assert_eq!(top, 1);

        // Second report from the same satellite is not new
        assert_eq!(engine.process(&event(&overhead_line(42, 8, 1), 2_000)), None);
        assert_eq!(engine.tracks()[&42].beams.len(), 2);
    }

    #[test]
    fn test_beam_landing_is_excluded_everywhere() {
        let mut engine = engine();
        assert_eq!(engine.process(&event(&overhead_line(42, 7, 0), 1_000)), None);

        assert!(engine.observations().is_empty());
        assert!(engine.tracks().is_empty());
        assert_eq!(engine.grid().total_observations(), 0);
    }

    #[test]
    fn test_low_elevation_tracked_but_not_gridded() {
        let mut engine = engine();
        // Far side of the Earth: clamped to 0° elevation
        engine.process(&event("+CIEV:3,5,1,1,-7000,0,0", 1_000));

        assert_eq!(engine.observations().len(), 1);
        assert_eq!(engine.observations()[0].elevation_deg, 0.0);
        assert_eq!(engine.tracks().len(), 1);
        assert_eq!(engine.grid().total_observations(), 0);
    }

    #[test]
    fn test_antenna_fault_transitions() {
        let mut engine = engine();
        assert_eq!(engine.process(&event("+CIEV:2,1", 0)), Some(SurveyNotice::AntennaFaultAsserted));
        assert_eq!(engine.process(&event("+CIEV:2,1", 1)), None);
        assert_eq!(engine.process(&event("+CIEV:2,0", 2)), None);
        assert_eq!(engine.process(&event("+CIEV:2,1", 3)), Some(SurveyNotice::AntennaFaultAsserted));

        let summary = engine.summary(10);
        assert!(summary.antenna_fault);
        assert_eq!(summary.antenna_fault_count, 2);
    }

    #[test]
    fn test_service_notices() {
        let mut engine = engine();
        assert_eq!(engine.process(&event("+CIEV:1,1", 0)), Some(SurveyNotice::ServiceChanged(true)));
        assert_eq!(engine.process(&event("+CIEV:1,1", 5)), None);
        assert_eq!(engine.process(&event("+CIEV:1,0", 9)), Some(SurveyNotice::ServiceChanged(false)));
    }

    #[test]
    fn test_signal_stats() {
        let mut engine = engine();
        assert_eq!(engine.summary(0).signal.mean, None);
        engine.process(&event("+CIEV:0,2", 0));
        engine.process(&event("+CIEV:0,4", 1));

        let signal = engine.summary(2).signal;
        assert_eq!(signal.samples, 2);
        assert_eq!(signal.last, Some(4));
        assert_eq!(signal.mean, Some(3.0));
    }

    #[test]
    fn test_insufficient_data_after_thirty_seconds() {
        let mut engine = engine();
        engine.process(&event("+CIEV:1,1", 0));
        let summary = engine.summary(30_000);
        assert_eq!(summary.uptime, UptimeStatus::InsufficientData);
        assert_eq!(summary.verdict, Verdict::InsufficientData);
    }

    #[test]
    fn test_clock_correction_before_first_event() {
        // Started on a system clock stuck in 2000, then synced to 2026 network time
        let system_start = 946_684_800_000;
        let network_now = 1_792_368_600_000;
        let mut engine = SurveyEngine::new(SurveySettings::default(), Location::new(LAT, LON), system_start);
        engine.rebase_clock(network_now - system_start);

        engine.process(&event("+CIEV:1,1", network_now));
        let summary = engine.summary(network_now + 600_000);
        assert_eq!(summary.elapsed_ms, 600_000);
        match summary.uptime {
            UptimeStatus::Measured(stats) => assert!((stats.percent - 100.0).abs() < 1e-9),
            other => panic!("Expected measured uptime, got {:?}", other),
        }
        assert_eq!(engine.accumulators(network_now + 600_000).loaded_duration_ms, 600_000);
    }

    #[test]
    fn test_summary_is_idempotent() {
        let mut engine = engine();
        engine.process(&event("+CIEV:1,1", 0));
        engine.process(&event(&overhead_line(1, 1, 1), 10));
        assert_eq!(engine.summary(90_000), engine.summary(90_000));
    }

    #[test]
    fn test_restore_replaces_state() {
        let mut source = engine();
        source.process(&event("+CIEV:1,1", 0));
        source.process(&event(&overhead_line(9, 3, 1), 10));
        source.process(&event("+CIEV:0,5", 20));
        let state = source.export_state(100_000);
        assert_eq!(state.accumulators.loaded_duration_ms, 100_000);
        assert_eq!(state.accumulators.loaded_uptime_ms, 100_000);

        let mut target = engine();
        target.process(&event("+CIEV:1,0", 0));
        target.process(&event(&overhead_line(77, 1, 1), 10));
        target.restore(state.clone(), 5_000_000);

        assert!(target.uptime().events().is_empty());
        assert_eq!(target.grid(), &state.grid);
        assert_eq!(target.tracks().len(), 1);
        assert!(target.tracks().contains_key(&9));
        assert_eq!(target.rssi_reports(), state.rssi_reports.as_slice());
    }

    #[test]
    fn test_resumed_uptime_combines() {
        let mut engine = engine();
        engine.restore(
            EngineState {
                accumulators: SurveyAccumulators {
                    loaded_duration_ms: 100_000,
                    loaded_uptime_ms: 95_000,
                    loaded_outage_count: 2,
                },
                location: Location::new(LAT, LON),
                rssi_reports: Vec::new(),
                observations: Vec::new(),
                grid: CoverageGrid::new(),
                tracks: BTreeMap::new(),
            },
            1_000_000,
        );
        engine.process(&event("+CIEV:1,1", 1_000_000));

        let summary = engine.summary(1_100_000);
        let percent = summary.uptime.percent().unwrap();
        assert!((percent - 97.5).abs() < 1e-9);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut engine = engine();
        engine.process(&event("+CIEV:1,1", 0));
        engine.process(&event(&overhead_line(1, 1, 1), 10));
        engine.process(&event("+CIEV:2,1", 20));
        engine.reset(1_000);

        let summary = engine.summary(1_000);
        assert_eq!(summary.observation_count, 0);
        assert_eq!(summary.satellites_seen, 0);
        assert_eq!(summary.service_available, None);
        assert!(!summary.antenna_fault);
        assert_eq!(engine.grid().valid_cells(1), 0);
        assert_eq!(engine.grid().iter().count(), GRID_CELLS);
    }

    #[test]
    fn test_set_location_does_not_recompute() {
        let mut engine = engine();
        engine.process(&event(&overhead_line(1, 1, 1), 10));
        let before = engine.observations()[0];
        engine.set_location(Location::new(45.0, 90.0));
        assert_eq!(engine.observations()[0], before);
        assert_eq!(engine.location(), Location::new(45.0, 90.0));
    }

    #[test]
    fn test_replay() {
        let events = vec![
            event("+CIEV:1,1", 1_000),
            event("+CIEV:0,3", 2_000),
            event(&overhead_line(4, 2, 1), 3_000),
        ];
        let engine = SurveyEngine::replay(SurveySettings::default(), Location::new(LAT, LON), &events);
        assert_eq!(engine.uptime().session_start_ms(), 1_000);
        assert_eq!(engine.summary(61_000).elapsed_ms, 60_000);
        assert_eq!(engine.tracks().len(), 1);
    }

    #[test]
    fn test_subscribers_receive_published_summary() {
        let mut engine = engine();
        let mut rx = engine.subscribe();
        engine.process(&event("+CIEV:0,4", 0));
        engine.publish(5_000);

        assert!(rx.has_changed().unwrap());
        let summary = rx.borrow_and_update().clone();
        assert_eq!(summary.timestamp, 5_000);
        assert_eq!(summary.signal.last, Some(4));
    }
}
