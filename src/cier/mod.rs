//! # CIER Protocol Module
//!
//! Iridium indicator event reporting (`AT+CIER` / `+CIEV`).
//!
//! This module handles:
//! - Decoding `+CIEV` lines into typed indicator events
//! - The timestamped CIER log file format
//! - Iridium network time (`AT-MSSTM`) conversion

pub mod protocol;
pub mod parser;
pub mod logfile;
pub mod clock;
