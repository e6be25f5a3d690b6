//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::error::{Result, SurveyError};
use crate::serial::SUPPORTED_BAUD_RATES;
use crate::survey::engine::SurveySettings;
use crate::survey::geometry::Location;
use crate::survey::grid::ELEVATION_BAND_TABLE;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub observer: ObserverConfig,
    #[serde(default)]
    pub survey: SurveyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

/// Observer location
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ObserverConfig {
    #[serde(default)]
    pub lat: f64,

    #[serde(default)]
    pub lon: f64,
}

/// Survey configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SurveyConfig {
    #[serde(default = "default_min_elevation_deg")]
    pub min_elevation_deg: f64,

    #[serde(default = "default_session_file")]
    pub session_file: String,

    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,

    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// 0 disables periodic autosave
    #[serde(default = "default_autosave_interval_s")]
    pub autosave_interval_s: u64,

    #[serde(default = "default_time_sync_interval_s")]
    pub time_sync_interval_s: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Mirror tracing output to a daily rotating file
    #[serde(default = "default_file_logging")]
    pub file_logging: bool,

    /// Record raw CIER lines in the importable log format
    #[serde(default = "default_cier_log")]
    pub cier_log: bool,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 19200 }
fn default_command_timeout_ms() -> u64 { 2000 }
fn default_reconnect_interval_ms() -> u64 { 1000 }

fn default_min_elevation_deg() -> f64 { 8.0 }
fn default_session_file() -> String { "./survey-session.json".to_string() }
fn default_status_interval_ms() -> u64 { 1000 }
fn default_refresh_interval_ms() -> u64 { 5000 }
fn default_autosave_interval_s() -> u64 { 60 }
fn default_time_sync_interval_s() -> u64 { 300 }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_file_logging() -> bool { true }
fn default_cier_log() -> bool { true }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            command_timeout_ms: default_command_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            min_elevation_deg: default_min_elevation_deg(),
            session_file: default_session_file(),
            status_interval_ms: default_status_interval_ms(),
            refresh_interval_ms: default_refresh_interval_ms(),
            autosave_interval_s: default_autosave_interval_s(),
            time_sync_interval_s: default_time_sync_interval_s(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            file_logging: default_file_logging(),
            cier_log: default_cier_log(),
        }
    }
}

impl SerialConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

impl ObserverConfig {
    pub fn location(&self) -> Location {
        Location::new(self.lat, self.lon)
    }
}

impl SurveyConfig {
    pub fn settings(&self) -> SurveySettings {
        SurveySettings {
            min_elevation_deg: self.min_elevation_deg,
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> SurveyError {
    SurveyError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use site_survey::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise use the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            info!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Serial
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid("baud_rate must be one of: 9600, 19200, 38400, 57600, 115200"));
        }

        if self.serial.command_timeout_ms == 0 || self.serial.command_timeout_ms > 30000 {
            return Err(invalid("command_timeout_ms must be between 1 and 30000"));
        }

        if self.serial.reconnect_interval_ms == 0 || self.serial.reconnect_interval_ms > 60000 {
            return Err(invalid("reconnect_interval_ms must be between 1 and 60000"));
        }

        // Observer
        if !(-90.0..=90.0).contains(&self.observer.lat) {
            return Err(invalid("observer lat must be between -90 and 90"));
        }

        if !(-180.0..=180.0).contains(&self.observer.lon) {
            return Err(invalid("observer lon must be between -180 and 180"));
        }

        // Survey
        // The grid has no band below its lowest one, so the setting can only raise it
        let floor = ELEVATION_BAND_TABLE[0].min_deg;
        if !(floor..=90.0).contains(&self.survey.min_elevation_deg) {
            return Err(invalid(format!("min_elevation_deg must be between {} and 90", floor)));
        }

        if self.survey.session_file.is_empty() {
            return Err(invalid("session_file cannot be empty"));
        }

        if self.survey.status_interval_ms == 0 {
            return Err(invalid("status_interval_ms must be greater than 0"));
        }

        if self.survey.refresh_interval_ms == 0 {
            return Err(invalid("refresh_interval_ms must be greater than 0"));
        }

        if self.survey.time_sync_interval_s == 0 {
            return Err(invalid("time_sync_interval_s must be greater than 0"));
        }

        // Logging
        if (self.logging.file_logging || self.logging.cier_log) && self.logging.log_dir.is_empty() {
            return Err(invalid("log_dir cannot be empty when file or CIER logging is enabled"));
        }

        Ok(())
    }
}
