//! # Survey Module
//!
//! Turns indicator events into sky-visibility and reliability metrics.
//!
//! This module handles:
//! - ECEF to local elevation/azimuth transform
//! - 8×7 directional/elevation coverage grid
//! - Service uptime with multi-session continuation
//! - Per-direction horizon classification
//! - Site-quality verdict

pub mod geometry;
pub mod grid;
pub mod uptime;
pub mod horizon;
pub mod verdict;
pub mod engine;
