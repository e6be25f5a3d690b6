//! # CIER Protocol Constants and Types
//!
//! Core definitions for Iridium `+CIEV` indicator event reporting.

use serde::{Deserialize, Serialize};

/// Prefix of every unsolicited indicator report line
pub const CIEV_PREFIX: &str = "+CIEV";

/// Indicator number: signal strength (0-5 bars)
pub const INDICATOR_SIGNAL: u8 = 0;

/// Indicator number: service availability
pub const INDICATOR_SERVICE: u8 = 1;

/// Indicator number: antenna fault
pub const INDICATOR_ANTENNA: u8 = 2;

/// Indicator number: satellite vehicle / beam position
pub const INDICATOR_SV_BEAM: u8 = 3;

/// Highest signal strength the modem reports
pub const SIGNAL_BARS_MAX: u8 = 5;

/// Minimum number of comma-separated values in a position report
pub const SV_BEAM_FIELD_COUNT: usize = 6;

/// Command enabling all indicator reports
pub const AT_CIER_ENABLE: &str = "AT+CIER=1,1,1,1,1";

/// Command disabling indicator reports
pub const AT_CIER_DISABLE: &str = "AT+CIER=0";

/// What a position report describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionType {
    /// Ground footprint of the serving beam
    BeamLanding,
    /// Position of the satellite itself
    Satellite,
}

impl PositionType {
    /// Decode the numeric flag from the wire (`1` = satellite)
    pub fn from_flag(flag: i64) -> Self {
        if flag == 1 {
            PositionType::Satellite
        } else {
            PositionType::BeamLanding
        }
    }
}

/// Raw satellite/beam position report (indicator 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SvBeamPosition {
    /// Satellite vehicle ID
    pub sv_id: u32,

    /// Beam ID
    pub beam_id: u32,

    /// Satellite or beam-landing report
    pub position_type: PositionType,

    /// ECEF X component as reported (km)
    pub x: i64,

    /// ECEF Y component as reported (km)
    pub y: i64,

    /// ECEF Z component as reported (km)
    pub z: i64,
}

/// Decoded indicator payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    /// Signal strength in bars (0-5)
    SignalStrength(u8),
    /// Network service available
    ServiceAvailability(bool),
    /// Antenna fault asserted
    AntennaFault(bool),
    /// Satellite or beam position
    SatellitePosition(SvBeamPosition),
}

/// A decoded indicator event with its capture time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorEvent {
    /// Capture timestamp in milliseconds since the Unix epoch
    pub timestamp: i64,

    /// Decoded payload
    pub indicator: Indicator,
}

impl IndicatorEvent {
    pub fn new(timestamp: i64, indicator: Indicator) -> Self {
        Self { timestamp, indicator }
    }
}
