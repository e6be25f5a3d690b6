//! # Serial Communication Module
//!
//! Handles the AT conversation with an Iridium 9603/9602 modem (RockBLOCK
//! and similar) over a USB or UART serial link.
//!
//! This module handles:
//! - Opening the serial port at 8N1 with the configured baud rate
//! - Candidate device discovery
//! - Command/response exchanges terminated by `OK`, `ERROR` or `READY`
//! - Enabling and disabling CIER indicator reporting
//! - Network time queries (`AT-MSSTM`)
//! - Streaming unsolicited indicator lines

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};
use tokio::time::{timeout_at, Instant};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, trace, warn};

use crate::cier::clock::parse_msstm_reply;
use crate::cier::protocol::{AT_CIER_DISABLE, AT_CIER_ENABLE, CIEV_PREFIX};
use crate::error::{Result, SurveyError};

/// Default modem baud rate
pub const DEFAULT_BAUD_RATE: u32 = 19_200;

/// Baud rates the modem can be configured for
pub const SUPPORTED_BAUD_RATES: &[u32] = &[19_200, 9_600, 38_400, 57_600, 115_200];

/// Default time to wait for a command's final result code
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Device paths to try when the configured port cannot be opened
pub const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // USB-to-serial adapters (RockBLOCK)
    "/dev/ttyACM0", // USB CDC devices
    "/dev/serial0", // Raspberry Pi primary UART alias
    "/dev/ttyAMA0", // Raspberry Pi PL011 UART
    "/dev/ttyS0",   // Raspberry Pi mini UART
];

/// GPIO UARTs that do not always show up in port enumeration
const UART_DEVICE_PATHS: &[&str] = &["/dev/serial0", "/dev/ttyAMA0", "/dev/ttyS0"];

const AT_ECHO_OFF: &str = "ATE0";
const AT_ATTENTION: &str = "AT";
const AT_SYSTEM_TIME: &str = "AT-MSSTM";

/// Final result code of an AT command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    Error,
    /// SBD "READY" prompt
    Ready,
    /// No final result code before the command timeout
    TimedOut,
}

impl CommandStatus {
    fn from_line(line: &str) -> Option<Self> {
        match line {
            "OK" => Some(CommandStatus::Ok),
            "ERROR" => Some(CommandStatus::Error),
            "READY" => Some(CommandStatus::Ready),
            _ => None,
        }
    }
}

/// Lines received while waiting for a command to finish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub status: CommandStatus,
    /// Information text lines, result code excluded
    pub lines: Vec<String>,
    /// `+CIEV` lines that arrived during the exchange
    pub unsolicited: Vec<String>,
}

impl CommandResponse {
    pub fn is_ok(&self) -> bool {
        self.status == CommandStatus::Ok
    }
}

/// Iridium modem connection
///
/// Generic over the transport so the AT conversation can be exercised
/// against an in-memory stream.
pub struct ModemSerial<P = SerialStream> {
    reader: BufReader<ReadHalf<P>>,
    /// Bytes of a line not yet terminated
    pending: Vec<u8>,
    writer: WriteHalf<P>,
    device_path: String,
    command_timeout: Duration,
}

impl<P> std::fmt::Debug for ModemSerial<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModemSerial")
            .field("device_path", &self.device_path)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl ModemSerial<SerialStream> {
    /// Open the modem, trying `port` first and then the default device paths
    ///
    /// # Arguments
    ///
    /// * `port` - Preferred device path (e.g., "/dev/ttyUSB0")
    /// * `baud_rate` - Line speed
    /// * `command_timeout` - Time to wait for each command's result code
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::SerialPortNotFound`] listing every path tried
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use site_survey::serial::{ModemSerial, DEFAULT_BAUD_RATE, DEFAULT_COMMAND_TIMEOUT};
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let mut modem = ModemSerial::open("/dev/ttyUSB0", DEFAULT_BAUD_RATE, DEFAULT_COMMAND_TIMEOUT)?;
    ///     modem.initialise().await?;
    ///     modem.enable_indicators().await?;
    ///     Ok(())
    /// }
    /// ```
    pub fn open(port: &str, baud_rate: u32, command_timeout: Duration) -> Result<Self> {
        let paths = candidate_paths(port);
        let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
        Self::open_with_paths(&paths, baud_rate, command_timeout)
    }

    /// Open the first device in `paths` that accepts the connection
    pub fn open_with_paths(paths: &[&str], baud_rate: u32, command_timeout: Duration) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened modem at {} @ {} baud", path, baud_rate);
                    return Ok(Self::from_stream(port, path, command_timeout));
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                }
            }
        }

        Err(SurveyError::SerialPortNotFound(paths.join(", ")))
    }

    fn open_port(path: &str, baud_rate: u32) -> Result<SerialStream> {
        tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| SurveyError::Serial(format!("Failed to open {}: {}", path, e)))
    }
}

impl<P> ModemSerial<P>
where
    P: AsyncRead + AsyncWrite,
{
    /// Wrap an already-open transport
    pub fn from_stream(stream: P, device_path: &str, command_timeout: Duration) -> Self {
        let (read_half, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read_half),
            pending: Vec::new(),
            writer,
            device_path: device_path.to_string(),
            command_timeout,
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Next non-empty line from the modem, trimmed
    ///
    /// Cancel-safe: a partly received line stays buffered, so it can sit in
    /// a `tokio::select!` next to timers. Bytes that are not valid UTF-8
    /// (line noise at power-up) are dropped from the line.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::Serial`] when the port reaches end of stream
    pub async fn next_line(&mut self) -> Result<String> {
        loop {
            if self.reader.read_until(b'\n', &mut self.pending).await? == 0 {
                return Err(SurveyError::Serial(format!(
                    "{} closed the connection",
                    self.device_path
                )));
            }

            let raw = std::mem::take(&mut self.pending);
            let decoded = String::from_utf8_lossy(&raw);
            if decoded.contains(char::REPLACEMENT_CHARACTER) {
                trace!("Dropped undecodable bytes from {:?}", raw);
            }
            let line = decoded.replace(char::REPLACEMENT_CHARACTER, "");
            let line = line.trim();
            if !line.is_empty() {
                trace!("RX {}", line);
                return Ok(line.to_string());
            }
        }
    }

    /// Send `command` and collect its response
    ///
    /// A missing result code is not an error: the response comes back with
    /// [`CommandStatus::TimedOut`] and whatever lines arrived.
    pub async fn send_command(&mut self, command: &str) -> Result<CommandResponse> {
        debug!("TX {}", command);
        self.writer
            .write_all(format!("{}\r", command).as_bytes())
            .await
            .map_err(|e| SurveyError::Serial(format!("Failed to write {}: {}", command, e)))?;
        self.writer
            .flush()
            .await
            .map_err(|e| SurveyError::Serial(format!("Failed to flush serial port: {}", e)))?;

        let deadline = Instant::now() + self.command_timeout;
        let mut lines = Vec::new();
        let mut unsolicited = Vec::new();

        loop {
            let line = match timeout_at(deadline, self.next_line()).await {
                Ok(line) => line?,
                Err(_) => {
                    warn!("No result code for {} within {:?}", command, self.command_timeout);
                    return Ok(CommandResponse {
                        status: CommandStatus::TimedOut,
                        lines,
                        unsolicited,
                    });
                }
            };

            if let Some(status) = CommandStatus::from_line(&line) {
                return Ok(CommandResponse {
                    status,
                    lines,
                    unsolicited,
                });
            }
            if line.starts_with(CIEV_PREFIX) {
                unsolicited.push(line);
            } else if line != command {
                // Anything equal to the command is local echo
                lines.push(line);
            }
        }
    }

    async fn expect_ok(&mut self, command: &str) -> Result<CommandResponse> {
        let response = self.send_command(command).await?;
        if !response.is_ok() {
            return Err(SurveyError::Modem(format!(
                "{} returned {:?} ({})",
                command,
                response.status,
                response.lines.join(" | ")
            )));
        }
        Ok(response)
    }

    /// Turn echo off and check the modem answers
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::Modem`] if `AT` does not return `OK`
    pub async fn initialise(&mut self) -> Result<()> {
        // Echo may still be on, so only the follow-up AT must succeed
        let echo = self.send_command(AT_ECHO_OFF).await?;
        if !echo.is_ok() {
            debug!("{} returned {:?}", AT_ECHO_OFF, echo.status);
        }
        self.expect_ok(AT_ATTENTION).await?;
        info!("Modem on {} is responding", self.device_path);
        Ok(())
    }

    /// Enable all CIER indicators
    ///
    /// The modem immediately reports current values; those lines are
    /// returned for processing.
    pub async fn enable_indicators(&mut self) -> Result<Vec<String>> {
        let response = self.expect_ok(AT_CIER_ENABLE).await?;
        info!("CIER indicator reporting enabled");
        Ok(response.unsolicited)
    }

    /// Disable CIER indicators
    pub async fn disable_indicators(&mut self) -> Result<Vec<String>> {
        let response = self.expect_ok(AT_CIER_DISABLE).await?;
        info!("CIER indicator reporting disabled");
        Ok(response.unsolicited)
    }

    /// Query Iridium network time
    ///
    /// Returns `Ok((None, ..))` when the modem has no network service. Any
    /// `+CIEV` lines received meanwhile are returned alongside.
    pub async fn network_time(&mut self) -> Result<(Option<DateTime<Utc>>, Vec<String>)> {
        let response = self.send_command(AT_SYSTEM_TIME).await?;
        let time = response.lines.iter().find_map(|l| parse_msstm_reply(l));
        match time {
            Some(t) => debug!("Iridium network time {}", t),
            None => debug!("Network time unavailable"),
        }
        Ok((time, response.unsolicited))
    }
}

/// Configured port first, then the defaults, without duplicates
pub fn candidate_paths(preferred: &str) -> Vec<String> {
    let mut paths = Vec::with_capacity(DEFAULT_DEVICE_PATHS.len() + 1);
    if !preferred.is_empty() {
        paths.push(preferred.to_string());
    }
    for path in DEFAULT_DEVICE_PATHS {
        if !paths.iter().any(|p| p == path) {
            paths.push(path.to_string());
        }
    }
    paths
}

/// Serial devices a modem could be attached to
///
/// USB serial ports (`ttyUSB*`, `ttyACM*`) come first, followed by any
/// Raspberry Pi GPIO UARTs present.
pub fn list_ports() -> Vec<String> {
    let mut usb: Vec<String> = match tokio_serial::available_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|p| p.port_name)
            .filter(|name| name.contains("ttyUSB") || name.contains("ttyACM"))
            .collect(),
        Err(e) => {
            warn!("Port enumeration failed: {}", e);
            Vec::new()
        }
    };
    usb.sort();
    usb.dedup();

    let uarts = UART_DEVICE_PATHS
        .iter()
        .filter(|p| std::path::Path::new(p).exists())
        .map(|p| p.to_string());

    usb.into_iter().chain(uarts).collect()
}
