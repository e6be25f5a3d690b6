//! Session document schema
//!
//! JSON layout (camelCase keys):
//!
//! ```text
//! {
//!   "version": 1, "timestamp": <ms>, "duration": <ms>, "uptime": <ms>, "outageCount": n,
//!   "location": {"lat": f, "lon": f},
//!   "rssiReports": [{"timestamp": ms, "rssi": 0-5}],
//!   "svBeamReports": [{"timestamp", "svId", "beamId", "x", "y", "z", "elevationDeg", "azimuthDeg"}],
//!   "coverageGrid": {"counts": [[u32; 7]; 8], "satellites": [[[svId]; 7]; 8]},
//!   "satellites": [{"svId": n, "reports": [...], "beams": [beamId]}]
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SurveyError};
use crate::survey::engine::{EngineState, RssiReport, SatelliteObservation, SatelliteTrack, SurveyEngine};
use crate::survey::geometry::Location;
use crate::survey::grid::{CoverageCell, CoverageGrid, AZIMUTH_SECTORS, ELEVATION_BANDS};
use crate::survey::uptime::SurveyAccumulators;

/// Session format version written and accepted by this build
pub const SESSION_VERSION: u32 = 1;

/// Serialized coverage grid, indexed `[sector][band]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridDocument {
    pub counts: Vec<Vec<u32>>,
    pub satellites: Vec<Vec<Vec<u32>>>,
}

/// Serialized satellite track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDocument {
    pub sv_id: u32,
    pub reports: Vec<SatelliteObservation>,
    pub beams: Vec<u32>,
}

/// Complete persisted survey state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    pub version: u32,
    /// Save time, ms since the Unix epoch
    pub timestamp: i64,
    /// Total surveyed duration, ms
    pub duration: i64,
    /// Total service uptime, ms
    pub uptime: i64,
    pub outage_count: u32,
    pub location: Location,
    pub rssi_reports: Vec<RssiReport>,
    pub sv_beam_reports: Vec<SatelliteObservation>,
    pub coverage_grid: GridDocument,
    pub satellites: Vec<TrackDocument>,
}

impl GridDocument {
    fn from_grid(grid: &CoverageGrid) -> Self {
        let mut counts = vec![vec![0u32; ELEVATION_BANDS]; AZIMUTH_SECTORS];
        let mut satellites = vec![vec![Vec::<u32>::new(); ELEVATION_BANDS]; AZIMUTH_SECTORS];
        for ((sector, band), cell) in grid.iter() {
            counts[sector][band] = cell.count;
            satellites[sector][band] = cell.satellites.iter().copied().collect();
        }
        Self { counts, satellites }
    }

    fn into_grid(self) -> Result<CoverageGrid> {
        check_dims("counts", self.counts.iter().map(Vec::len), self.counts.len())?;
        check_dims("satellites", self.satellites.iter().map(Vec::len), self.satellites.len())?;

        let mut grid = CoverageGrid::new();
        for (sector, (counts, sats)) in self.counts.into_iter().zip(self.satellites).enumerate() {
            for (band, (count, ids)) in counts.into_iter().zip(sats).enumerate() {
                let satellites: BTreeSet<u32> = ids.into_iter().collect();
                // Every satellite in a cell contributed at least one observation
                if satellites.len() > count as usize {
                    return Err(SurveyError::SessionSchema(format!(
                        "coverageGrid cell ({}, {}) lists {} satellites but only {} observations",
                        sector,
                        band,
                        satellites.len(),
                        count
                    )));
                }
                grid.set_cell(sector, band, CoverageCell { count, satellites });
            }
        }
        Ok(grid)
    }
}

fn check_dims(field: &str, mut rows: impl Iterator<Item = usize>, len: usize) -> Result<()> {
    if len != AZIMUTH_SECTORS || !rows.all(|r| r == ELEVATION_BANDS) {
        return Err(SurveyError::SessionSchema(format!(
            "coverageGrid.{} must be {}x{}",
            field, AZIMUTH_SECTORS, ELEVATION_BANDS
        )));
    }
    Ok(())
}

impl SessionDocument {
    /// Snapshot `engine` as it stands at `now_ms`
    pub fn from_engine(engine: &SurveyEngine, now_ms: i64) -> Self {
        Self::from_state(engine.export_state(now_ms), now_ms)
    }

    pub fn from_state(state: EngineState, now_ms: i64) -> Self {
        let satellites = state
            .tracks
            .into_iter()
            .map(|(sv_id, track)| TrackDocument {
                sv_id,
                reports: track.reports,
                beams: track.beams.into_iter().collect(),
            })
            .collect();

        Self {
            version: SESSION_VERSION,
            timestamp: now_ms,
            duration: state.accumulators.loaded_duration_ms,
            uptime: state.accumulators.loaded_uptime_ms,
            outage_count: state.accumulators.loaded_outage_count,
            location: state.location,
            rssi_reports: state.rssi_reports,
            sv_beam_reports: state.observations,
            coverage_grid: GridDocument::from_grid(&state.grid),
            satellites,
        }
    }

    /// Validate and convert into engine state
    ///
    /// # Errors
    ///
    /// * [`SurveyError::SessionVersion`] if `version` differs from [`SESSION_VERSION`]
    /// * [`SurveyError::SessionSchema`] for negative totals, a malformed grid, a
    ///   cell listing more satellites than observations, or duplicated satellite
    ///   entries
    pub fn into_state(self) -> Result<EngineState> {
        if self.version != SESSION_VERSION {
            return Err(SurveyError::SessionVersion {
                expected: SESSION_VERSION,
                found: self.version,
            });
        }
        if self.duration < 0 || self.uptime < 0 {
            return Err(SurveyError::SessionSchema(
                "duration and uptime must not be negative".to_string(),
            ));
        }

        let grid = self.coverage_grid.into_grid()?;

        let mut tracks = BTreeMap::new();
        for track in self.satellites {
            let beams: BTreeSet<u32> = track.beams.into_iter().collect();
            let entry = SatelliteTrack {
                reports: track.reports,
                beams,
            };
            if tracks.insert(track.sv_id, entry).is_some() {
                return Err(SurveyError::SessionSchema(format!(
                    "satellite {} listed more than once",
                    track.sv_id
                )));
            }
        }

        Ok(EngineState {
            accumulators: SurveyAccumulators {
                loaded_duration_ms: self.duration,
                loaded_uptime_ms: self.uptime,
                loaded_outage_count: self.outage_count,
            },
            location: self.location,
            rssi_reports: self.rssi_reports,
            observations: self.sv_beam_reports,
            grid,
            tracks,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode a document; missing required fields surface as a JSON error
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> EngineState {
        let mut grid = CoverageGrid::new();
        grid.set_cell(
            0,
            0,
            CoverageCell {
                count: 3,
                satellites: [1, 2].into_iter().collect(),
            },
        );
        grid.set_cell(
            0,
            1,
            CoverageCell {
                count: 7,
                satellites: [5].into_iter().collect(),
            },
        );

        let observation = SatelliteObservation {
            timestamp: 1_000,
            sv_id: 5,
            beam_id: 12,
            x: 1,
            y: 2,
            z: 3,
            elevation_deg: 15.5,
            azimuth_deg: 3.0,
        };
        let mut tracks = BTreeMap::new();
        tracks.insert(
            5,
            SatelliteTrack {
                reports: vec![observation],
                beams: [12, 40].into_iter().collect(),
            },
        );

        EngineState {
            accumulators: SurveyAccumulators {
                loaded_duration_ms: 100_000,
                loaded_uptime_ms: 95_000,
                loaded_outage_count: 2,
            },
            location: Location::new(51.5, -0.12),
            rssi_reports: vec![RssiReport { timestamp: 900, rssi: 4 }],
            observations: vec![observation],
            grid,
            tracks,
        }
    }

    #[test]
    fn test_round_trip_preserves_state() {
        let state = sample_state();
        let json = SessionDocument::from_state(state.clone(), 123).to_json().unwrap();
        let restored = SessionDocument::from_json(&json).unwrap().into_state().unwrap();

        assert_eq!(restored, state);
        assert_eq!(restored.grid.count(0, 0), 3);
        assert_eq!(restored.grid.count(0, 1), 7);
        assert_eq!(restored.grid.count(0, 2), 0);
        assert_eq!(restored.grid.cell(0, 0).satellites, BTreeSet::from([1, 2]));
    }

    #[test]
    fn test_id_order_is_not_significant() {
        let mut doc = SessionDocument::from_state(sample_state(), 0);
        doc.coverage_grid.satellites[0][0] = vec![2, 1, 2];
        let state = doc.into_state().unwrap();
        assert_eq!(state.grid.cell(0, 0).satellites, BTreeSet::from([1, 2]));
    }

    #[test]
    fn test_camel_case_keys() {
        let json = SessionDocument::from_state(sample_state(), 0).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        for key in [
            "version",
            "timestamp",
            "duration",
            "uptime",
            "outageCount",
            "location",
            "rssiReports",
            "svBeamReports",
            "coverageGrid",
            "satellites",
        ] {
            assert!(value.get(key).is_some(), "missing key {}", key);
        }
        assert_eq!(value["satellites"][0]["svId"], 5);
        assert_eq!(value["svBeamReports"][0]["beamId"], 12);
    }

    #[test]
    fn test_version_mismatch() {
        let mut doc = SessionDocument::from_state(sample_state(), 0);
        doc.version = 2;
        match doc.into_state() {
            Err(SurveyError::SessionVersion { expected, found }) => {
                assert_eq!(expected, SESSION_VERSION);
                assert_eq!(found, 2);
            }
            other => panic!("Expected version error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let mut value: serde_json::Value =
            serde_json::from_str(&SessionDocument::from_state(sample_state(), 0).to_json().unwrap()).unwrap();
        value.as_object_mut().unwrap().remove("coverageGrid");
        let result = SessionDocument::from_json(&value.to_string());
        assert!(matches!(result, Err(SurveyError::Json(_))));
    }

    #[test]
    fn test_bad_grid_shape() {
        let mut doc = SessionDocument::from_state(sample_state(), 0);
        doc.coverage_grid.counts.pop();
        assert!(matches!(doc.into_state(), Err(SurveyError::SessionSchema(_))));

        let mut doc = SessionDocument::from_state(sample_state(), 0);
        doc.coverage_grid.satellites[3].push(Vec::new());
        assert!(matches!(doc.into_state(), Err(SurveyError::SessionSchema(_))));
    }

    #[test]
    fn test_cell_with_more_satellites_than_observations() {
        let mut doc = SessionDocument::from_state(sample_state(), 0);
        doc.coverage_grid.counts[0][0] = 0;
        doc.coverage_grid.satellites[0][0] = vec![1, 2, 3];
        assert!(matches!(doc.into_state(), Err(SurveyError::SessionSchema(_))));

        // Repeated IDs count once
        let mut doc = SessionDocument::from_state(sample_state(), 0);
        doc.coverage_grid.counts[0][0] = 2;
        doc.coverage_grid.satellites[0][0] = vec![1, 2, 2, 1];
        assert!(doc.into_state().is_ok());
    }

    #[test]
    fn test_duplicate_satellite() {
        let mut doc = SessionDocument::from_state(sample_state(), 0);
        let dup = doc.satellites[0].clone();
        doc.satellites.push(dup);
        assert!(matches!(doc.into_state(), Err(SurveyError::SessionSchema(_))));
    }

    #[test]
    fn test_negative_duration() {
        let mut doc = SessionDocument::from_state(sample_state(), 0);
        doc.duration = -1;
        assert!(matches!(doc.into_state(), Err(SurveyError::SessionSchema(_))));
    }
}
