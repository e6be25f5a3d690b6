//! # Telemetry Module
//!
//! Writes survey output to disk.
//!
//! This module handles:
//! - Raw CIER indicator logs in the importable format
//! - Coverage grid CSV, summary JSON and text report exports

pub mod export;
pub mod logger;
