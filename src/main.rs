//! # Site Survey - Main Entry Point
//!
//! Iridium sky-visibility site survey from CIER indicator events.
//!
//! This is the main entry point for the site-survey application.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use site_survey::cier::clock::NetworkClock;
use site_survey::cier::logfile::import_log;
use site_survey::cier::parser::parse_line;
use site_survey::config::{Config, LoggingConfig};
use site_survey::schedule::{Scheduler, Tick, TickKind};
use site_survey::serial::{list_ports, ModemSerial};
use site_survey::session::{load_session, save_session};
use site_survey::survey::engine::{SurveyEngine, SurveyNotice, SurveySummary};
use site_survey::telemetry::export::{grid_csv, summary_json, text_report};
use site_survey::telemetry::logger::CierLogWriter;

/// System clocks earlier than this are assumed unset (no RTC, no NTP)
const PLAUSIBLE_YEAR: i32 = 2024;

#[derive(Parser)]
#[command(
    name = "site-survey",
    version,
    about = "Iridium antenna site survey from CIER indicator events"
)]
struct Cli {
    /// Configuration file (defaults are used if it does not exist)
    #[arg(short, long, global = true, default_value = "config/default.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a live survey against a connected modem
    Survey {
        /// Serial device, overriding the configured port
        #[arg(short, long)]
        port: Option<String>,

        /// Continue the survey saved in the session file
        #[arg(short, long)]
        resume: bool,
    },

    /// Rebuild a survey from a recorded CIER log
    Replay {
        /// CIER log file
        log: PathBuf,

        /// Write the rebuilt session document here
        #[arg(long)]
        session_out: Option<PathBuf>,

        /// Write the coverage grid as CSV here
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Print the summary as JSON instead of a text report
        #[arg(long)]
        json: bool,
    },

    /// Report on a saved session
    Report {
        /// Session document
        session: PathBuf,

        /// Print the summary as JSON instead of a text report
        #[arg(long)]
        json: bool,
    },

    /// List serial devices a modem could be attached to
    ListPorts,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    // Held for the lifetime of main so buffered file logs are flushed
    let _guard = init_logging(&config.logging);

    info!("Site Survey v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Survey { port, resume } => cmd_survey(config, port, resume).await,
        Commands::Replay {
            log,
            session_out,
            csv,
            json,
        } => cmd_replay(&config, &log, session_out, csv, json).await,
        Commands::Report { session, json } => cmd_report(&config, &session, json),
        Commands::ListPorts => {
            cmd_list_ports();
            Ok(())
        }
    }
}

/// Stderr logging filtered by `RUST_LOG` (default `info`), plus an optional
/// daily rotating file under the log directory
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = if logging.file_logging {
        if let Err(e) = std::fs::create_dir_all(&logging.log_dir) {
            eprintln!("Cannot create log directory {}: {}", logging.log_dir, e);
        }
        let appender = tracing_appender::rolling::daily(&logging.log_dir, "site-survey.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn print_summary(summary: &SurveySummary, engine: &SurveyEngine, json: bool) -> Result<()> {
    if json {
        println!("{}", summary_json(summary)?);
    } else {
        print!("{}", text_report(summary, engine.location()));
    }
    Ok(())
}

fn cmd_list_ports() {
    let ports = list_ports();
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
}

fn cmd_report(config: &Config, session: &Path, json: bool) -> Result<()> {
    let now = Utc::now().timestamp_millis();
    let mut engine = SurveyEngine::new(config.survey.settings(), config.observer.location(), now);
    load_session(&mut engine, session, now)
        .with_context(|| format!("Failed to load session {}", session.display()))?;

    print_summary(&engine.summary(now), &engine, json)
}

async fn cmd_replay(
    config: &Config,
    log: &Path,
    session_out: Option<PathBuf>,
    csv: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let text = tokio::fs::read_to_string(log)
        .await
        .with_context(|| format!("Failed to read {}", log.display()))?;
    let events = import_log(&text).with_context(|| format!("Failed to import {}", log.display()))?;

    let engine = SurveyEngine::replay(config.survey.settings(), config.observer.location(), &events);
    let end = events.last().map(|e| e.timestamp).unwrap_or_default();
    info!("Replayed {} events from {}", events.len(), log.display());

    if let Some(path) = session_out {
        save_session(&engine, &path, end)?;
    }
    if let Some(path) = csv {
        tokio::fs::write(&path, grid_csv(engine.grid()))
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote coverage grid to {}", path.display());
    }

    print_summary(&engine.summary(end), &engine, json)
}

fn check_system_clock() {
    let now = Utc::now();
    if now.year() < PLAUSIBLE_YEAR {
        warn!(
            "System time appears incorrect ({}); relying on Iridium network time",
            now.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

/// Why a modem session stopped
enum SessionEnd {
    /// Ctrl+C
    Shutdown,
    /// Modem stopped answering; reconnect
    Disconnected,
}

/// State of a live survey that outlives individual modem connections
struct LiveSurvey {
    config: Config,
    port: String,
    engine: SurveyEngine,
    clock: NetworkClock,
    scheduler: Scheduler,
    ticks: mpsc::Receiver<Tick>,
    cier_log: Option<CierLogWriter<BufWriter<File>>>,
    session_path: PathBuf,
}

impl LiveSurvey {
    /// Feed one modem line through the log and the engine
    fn handle_line(&mut self, line: &str) {
        let system_now = Utc::now();
        let stamped = self.clock.at(system_now);

        if let Some(log) = self.cier_log.as_mut() {
            if let Err(e) = log.log_line(stamped, line) {
                warn!("CIER log write failed: {}", e);
            }
        }

        let Some(event) = parse_line(line, stamped.timestamp_millis()) else {
            debug!("Ignoring modem line: {}", line);
            return;
        };

        match self.engine.process(&event) {
            Some(SurveyNotice::ServiceChanged(true)) => info!("Network service available"),
            Some(SurveyNotice::ServiceChanged(false)) => warn!("Network service lost"),
            Some(SurveyNotice::AntennaFaultAsserted) => warn!("Antenna fault reported"),
            Some(SurveyNotice::NewSatellite(sv)) => info!("First report from SV {}", sv),
            None => {}
        }
    }

    async fn sync_time(&mut self, modem: &mut ModemSerial) -> site_survey::error::Result<()> {
        let (network_time, lines) = modem.network_time().await?;
        if let Some(time) = network_time {
            let delta_ms = self.clock.sync(time, Utc::now());
            // Keep the live session start on the corrected clock
            self.engine.rebase_clock(delta_ms);
            debug!("Clock offset {} ms from Iridium time", self.clock.offset_ms());
        }
        for line in lines {
            self.handle_line(&line);
        }
        Ok(())
    }

    fn save(&self) {
        let now = self.clock.now_ms();
        if let Err(e) = save_session(&self.engine, &self.session_path, now) {
            error!("Failed to save session: {}", e);
        }
    }

    async fn start_timers(&mut self) {
        let survey = &self.config.survey;
        let timers = [
            (TickKind::Status, Duration::from_millis(survey.status_interval_ms)),
            (TickKind::Refresh, Duration::from_millis(survey.refresh_interval_ms)),
            (TickKind::TimeSync, Duration::from_secs(survey.time_sync_interval_s)),
            (TickKind::Autosave, Duration::from_secs(survey.autosave_interval_s)),
        ];
        for (kind, period) in timers {
            if !period.is_zero() {
                self.scheduler.start(kind, period).await;
            }
        }
    }

    async fn handle_tick(&mut self, tick: Tick, modem: &mut ModemSerial) -> site_survey::error::Result<()> {
        let now = self.clock.now_ms();
        match tick.kind {
            TickKind::Status => {
                let s = self.engine.summary(now);
                debug!(
                    "Elapsed {}s | signal {:?} | service {:?} | {} satellites | {} observations",
                    s.elapsed_ms / 1000,
                    s.signal.last,
                    s.service_available,
                    s.satellites_seen,
                    s.observation_count
                );
            }
            TickKind::Refresh => {
                let s = self.engine.publish(now);
                info!(
                    "Uptime {} | coverage {}% | horizon {}/100 | verdict {}",
                    s.uptime
                        .percent()
                        .map(|p| format!("{:.1}%", p))
                        .unwrap_or_else(|| "n/a".to_string()),
                    s.coverage_percent,
                    s.horizon.weighted_score,
                    s.verdict
                );
            }
            TickKind::Autosave => self.save(),
            TickKind::TimeSync => self.sync_time(modem).await?,
        }
        Ok(())
    }

    /// One connected session: initialise, enable indicators, then stream
    async fn run_session(&mut self, modem: &mut ModemSerial) -> site_survey::error::Result<SessionEnd> {
        // No timer from a previous connection may tick into this one
        self.scheduler.cancel_all().await;

        modem.initialise().await?;
        self.sync_time(modem).await?;
        info!("Time source: {}", self.clock.source());

        if self.config.logging.cier_log && self.cier_log.is_none() {
            let (log, _) = CierLogWriter::create_in(
                &self.config.logging.log_dir,
                self.clock.at(Utc::now()),
                modem.device_path(),
                self.config.serial.baud_rate,
                self.clock.source(),
            )?;
            self.cier_log = Some(log);
        }

        for line in modem.enable_indicators().await? {
            self.handle_line(&line);
        }
        self.start_timers().await;
        info!("Surveying. Press Ctrl+C to stop");

        loop {
            tokio::select! {
                line = modem.next_line() => match line {
                    Ok(line) => self.handle_line(&line),
                    Err(e) => {
                        warn!("Lost modem: {}", e);
                        return Ok(SessionEnd::Disconnected);
                    }
                },

                Some(tick) = self.ticks.recv() => {
                    if let Err(e) = self.handle_tick(tick, modem).await {
                        warn!("Modem error during {:?}: {}", tick.kind, e);
                        return Ok(SessionEnd::Disconnected);
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down...");
                    return Ok(SessionEnd::Shutdown);
                }
            }
        }
    }
}

/// Wait out the reconnect interval; `false` if Ctrl+C arrived meanwhile
async fn reconnect_delay(interval: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => true,
        _ = tokio::signal::ctrl_c() => false,
    }
}

async fn cmd_survey(config: Config, port: Option<String>, resume: bool) -> Result<()> {
    check_system_clock();

    let clock = NetworkClock::default();
    let mut engine = SurveyEngine::new(config.survey.settings(), config.observer.location(), clock.now_ms());
    let session_path = PathBuf::from(&config.survey.session_file);

    if resume {
        load_session(&mut engine, &session_path, clock.now_ms())
            .with_context(|| format!("Failed to resume {}", session_path.display()))?;
        let carried = engine.uptime().carried();
        info!(
            "Resumed survey: {}s surveyed, {} outages so far",
            carried.loaded_duration_ms / 1000,
            carried.loaded_outage_count
        );
    }

    // Log each verdict change as published summaries arrive
    let mut summaries = engine.subscribe();
    tokio::spawn(async move {
        let mut last = None;
        while summaries.changed().await.is_ok() {
            let verdict = summaries.borrow_and_update().verdict;
            if last != Some(verdict) {
                info!("Site verdict: {}", verdict);
                last = Some(verdict);
            }
        }
    });

    let (scheduler, ticks) = Scheduler::new();
    let mut survey = LiveSurvey {
        port: port.unwrap_or_else(|| config.serial.port.clone()),
        config,
        engine,
        clock,
        scheduler,
        ticks,
        cier_log: None,
        session_path,
    };
    let reconnect_interval = survey.config.serial.reconnect_interval();

    let mut modem = loop {
        let mut modem = match ModemSerial::open(
            &survey.port,
            survey.config.serial.baud_rate,
            survey.config.serial.command_timeout(),
        ) {
            Ok(modem) => modem,
            Err(e) => {
                warn!("{}", e);
                if reconnect_delay(reconnect_interval).await {
                    continue;
                }
                break None;
            }
        };

        match survey.run_session(&mut modem).await {
            Ok(SessionEnd::Shutdown) => break Some(modem),
            Ok(SessionEnd::Disconnected) => {}
            Err(e) => error!("Session failed on {}: {}", modem.device_path(), e),
        }

        survey.scheduler.cancel_all().await;
        if !reconnect_delay(reconnect_interval).await {
            break Some(modem);
        }
        info!("Reconnecting...");
    };

    survey.scheduler.cancel_all().await;

    if let Some(modem) = modem.as_mut() {
        if let Err(e) = modem.disable_indicators().await {
            warn!("Could not disable CIER reporting: {}", e);
        }
    }
    if let Some(log) = survey.cier_log.take() {
        info!("CIER log holds {} lines", log.lines_written());
        log.finish()?;
    }

    survey.save();
    let summary = survey.engine.publish(survey.clock.now_ms());
    print!("{}", text_report(&summary, survey.engine.location()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_survey_args() {
        let cli = Cli::try_parse_from(["site-survey", "survey", "--port", "/dev/ttyUSB1", "--resume"]).unwrap();
        match cli.command {
            Commands::Survey { port, resume } => {
                assert_eq!(port.as_deref(), Some("/dev/ttyUSB1"));
                assert!(resume);
            }
            _ => panic!("Expected survey command"),
        }
        assert_eq!(cli.config, PathBuf::from("config/default.toml"));
    }

    #[test]
    fn test_parse_replay_args() {
        let cli = Cli::try_parse_from([
            "site-survey",
            "replay",
            "cier.log",
            "--csv",
            "grid.csv",
            "--config",
            "other.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        match cli.command {
            Commands::Replay {
                log,
                session_out,
                csv,
                json,
            } => {
                assert_eq!(log, PathBuf::from("cier.log"));
                assert!(session_out.is_none());
                assert_eq!(csv, Some(PathBuf::from("grid.csv")));
                assert!(!json);
            }
            _ => panic!("Expected replay command"),
        }
    }

    #[test]
    fn test_plausible_year() {
        assert!(Utc::now().year() >= PLAUSIBLE_YEAR);
    }
}
