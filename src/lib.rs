//! # Site Survey Library
//!
//! Judge how well an Iridium antenna can see the sky from where it stands.
//!
//! This library turns the CIER indicator stream of an Iridium 9602/9603
//! modem (signal strength, service availability, antenna fault and
//! satellite/beam positions) into a directional coverage grid, cumulative
//! service uptime, per-direction horizon visibility and a site verdict.
//! Surveys can be saved and resumed across sessions, or rebuilt from a
//! recorded CIER log.

pub mod config;
pub mod error;
pub mod cier;
pub mod survey;
pub mod session;
pub mod serial;
pub mod schedule;
pub mod telemetry;
