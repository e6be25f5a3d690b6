//! Derived, export-only views of a survey
//!
//! None of these are read back; the session document is the only
//! persisted form.

use std::fmt;

use crate::error::Result;
use crate::survey::engine::SurveySummary;
use crate::survey::geometry::Location;
use crate::survey::grid::{CoverageGrid, DIRECTION_LABELS, ELEVATION_BAND_TABLE};
use crate::survey::uptime::UptimeStatus;

/// Header row of the coverage grid CSV
pub const GRID_CSV_HEADER: &str = "azimuth,elevation_band,count,satellites";

/// One row per grid cell, sector-major
///
/// Satellite IDs are separated by `;` within the last column.
pub fn grid_csv(grid: &CoverageGrid) -> String {
    let mut out = String::from(GRID_CSV_HEADER);
    out.push('\n');

    for ((sector, band), cell) in grid.iter() {
        let bounds = ELEVATION_BAND_TABLE[band];
        let satellites: Vec<String> = cell.satellites.iter().map(u32::to_string).collect();
        out.push_str(&format!(
            "{},{}-{},{},{}\n",
            DIRECTION_LABELS[sector],
            bounds.min_deg,
            bounds.max_deg,
            cell.count,
            satellites.join(";")
        ));
    }
    out
}

/// Pretty-printed JSON of a summary
pub fn summary_json(summary: &SurveySummary) -> Result<String> {
    Ok(serde_json::to_string_pretty(summary)?)
}

fn format_duration(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Plain-text site report, rendered through [`fmt::Display`]
pub struct TextReport<'a> {
    pub summary: &'a SurveySummary,
    pub location: Location,
}

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self.summary;
        writeln!(f, "Iridium Site Survey Report")?;
        writeln!(f, "==========================")?;
        writeln!(f, "Location:        {:.5}, {:.5}", self.location.lat, self.location.lon)?;
        writeln!(f, "Duration:        {}", format_duration(summary.elapsed_ms))?;

        match summary.uptime {
            UptimeStatus::InsufficientData => writeln!(f, "Uptime:          insufficient data")?,
            UptimeStatus::Measured(stats) => {
                writeln!(
                    f,
                    "Uptime:          {:.1}% ({} of {})",
                    stats.percent,
                    format_duration(stats.total_uptime_ms),
                    format_duration(stats.total_elapsed_ms)
                )?;
                writeln!(f, "Outages:         {}", stats.outage_count)?;
            }
        }

        match summary.signal.mean {
            Some(mean) => writeln!(f, "Signal:          mean {:.1}/5 over {} reports", mean, summary.signal.samples)?,
            None => writeln!(f, "Signal:          no reports")?,
        }
        if summary.antenna_fault_count > 0 {
            writeln!(f, "Antenna faults:  {}", summary.antenna_fault_count)?;
        }

        writeln!(f, "Satellites:      {}", summary.satellites_seen)?;
        writeln!(f, "Observations:    {}", summary.observation_count)?;
        writeln!(f, "Cell threshold:  {} observations", summary.min_observations)?;
        writeln!(f, "Sky coverage:    {}%", summary.coverage_percent)?;
        writeln!(f, "Horizon cover:   {}%", summary.horizon_coverage_percent)?;
        writeln!(f)?;

        writeln!(f, "Horizon (score {}/100)", summary.horizon.weighted_score)?;
        for (label, tier) in DIRECTION_LABELS.iter().zip(summary.horizon.tiers.iter()) {
            writeln!(f, "  {:<3} {}", label, tier)?;
        }
        writeln!(f)?;
        writeln!(f, "Verdict:         {}", summary.verdict)
    }
}

/// Plain-text site report
pub fn text_report(summary: &SurveySummary, location: Location) -> String {
    TextReport { summary, location }.to_string()
}
