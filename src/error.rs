//! # Error Types
//!
//! Custom error types for Site Survey using `thiserror`.
//!
//! Malformed indicator lines never reach this type; they are dropped by the
//! parser. Everything here is surfaced to the caller.

use thiserror::Error;

/// Main error type for Site Survey
#[derive(Debug, Error)]
pub enum SurveyError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Session document could not be encoded or decoded
    #[error("Session document error: {0}")]
    Json(#[from] serde_json::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate device paths could be opened
    #[error("No modem found (tried: {0})")]
    SerialPortNotFound(String),

    /// Modem did not respond as expected to an AT command
    #[error("Modem error: {0}")]
    Modem(String),

    /// Session document carries a different format version
    #[error("Unsupported session version {found} (expected {expected})")]
    SessionVersion { expected: u32, found: u32 },

    /// Session document is well-formed JSON but structurally invalid
    #[error("Invalid session document: {0}")]
    SessionSchema(String),

    /// CIER log file could not be imported
    #[error("Log import failed: {0}")]
    LogImport(String),
}

/// Result type alias for Site Survey
pub type Result<T> = std::result::Result<T, SurveyError>;
