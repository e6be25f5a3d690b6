//! # Coverage Grid
//!
//! Dense 8×7 grid of azimuth sectors by elevation bands. Each cell counts
//! observations and remembers which satellites were seen in it.
//!
//! ## Azimuth sectors
//!
//! | Index | Direction | Centre |
//! |-------|-----------|--------|
//! | 0 | N  | 0°   |
//! | 1 | NE | 45°  |
//! | 2 | E  | 90°  |
//! | 3 | SE | 135° |
//! | 4 | S  | 180° |
//! | 5 | SW | 225° |
//! | 6 | W  | 270° |
//! | 7 | NW | 315° |
//!
//! ## Elevation bands
//!
//! Half-open `[min, max)` bands, except the last which is closed at 90°:
//! 8-14, 14-20, 20-35, 35-50, 50-65, 65-80, 80-90. The two lowest are the
//! horizon bands.

use std::collections::BTreeSet;

/// Number of azimuth sectors
pub const AZIMUTH_SECTORS: usize = 8;

/// Number of elevation bands
pub const ELEVATION_BANDS: usize = 7;

/// Total number of grid cells
pub const GRID_CELLS: usize = AZIMUTH_SECTORS * ELEVATION_BANDS;

/// Width of one azimuth sector in degrees
pub const SECTOR_WIDTH_DEG: f64 = 45.0;

/// Number of low elevation bands counted as horizon
pub const HORIZON_BANDS: usize = 2;

/// Compass labels for the azimuth sectors
pub const DIRECTION_LABELS: [&str; AZIMUTH_SECTORS] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Elevation band boundaries in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationBand {
    pub min_deg: f64,
    pub max_deg: f64,
}

/// Elevation bands, lowest first
pub const ELEVATION_BAND_TABLE: [ElevationBand; ELEVATION_BANDS] = [
    ElevationBand { min_deg: 8.0, max_deg: 14.0 },
    ElevationBand { min_deg: 14.0, max_deg: 20.0 },
    ElevationBand { min_deg: 20.0, max_deg: 35.0 },
    ElevationBand { min_deg: 35.0, max_deg: 50.0 },
    ElevationBand { min_deg: 50.0, max_deg: 65.0 },
    ElevationBand { min_deg: 65.0, max_deg: 80.0 },
    ElevationBand { min_deg: 80.0, max_deg: 90.0 },
];

/// Survey-duration cutoffs (hours) and the minimum observations per cell
/// that apply below each cutoff
const CONFIDENCE_TABLE: [(f64, u32); 3] = [(2.0, 3), (8.0, 10), (24.0, 20)];

/// Minimum observations once the survey passes the last cutoff
const LONG_SURVEY_MIN_OBSERVATIONS: u32 = 30;

/// Azimuth sector index for an azimuth in degrees
///
/// Sectors are centred on the compass points, so 350° and 10° both fall in N.
/// Returns `None` for non-finite input.
pub fn azimuth_index(azimuth_deg: f64) -> Option<usize> {
    if !azimuth_deg.is_finite() {
        return None;
    }
    let shifted = (azimuth_deg + SECTOR_WIDTH_DEG / 2.0).rem_euclid(360.0);
    // rem_euclid may round up to exactly 360.0
    let index = (shifted / SECTOR_WIDTH_DEG).floor() as usize;
    Some(index.min(AZIMUTH_SECTORS - 1))
}

/// Elevation band index, or `None` below 8°, above 90° or for NaN
pub fn elevation_index(elevation_deg: f64) -> Option<usize> {
    let last = ELEVATION_BANDS - 1;
    ELEVATION_BAND_TABLE.iter().enumerate().position(|(i, band)| {
        elevation_deg >= band.min_deg
            && (elevation_deg < band.max_deg || (i == last && elevation_deg <= band.max_deg))
    })
}

/// Minimum observations for a cell to count as covered after `survey_hours`
///
/// Longer surveys demand more observations before a cell is trusted.
pub fn min_observations_for_valid_cell(survey_hours: f64) -> u32 {
    CONFIDENCE_TABLE
        .iter()
        .find(|(cutoff, _)| survey_hours < *cutoff)
        .map(|(_, min)| *min)
        .unwrap_or(LONG_SURVEY_MIN_OBSERVATIONS)
}

/// One grid cell
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageCell {
    /// Observations recorded in this cell
    pub count: u32,
    /// Distinct satellite IDs seen in this cell
    pub satellites: BTreeSet<u32>,
}

/// Directional/elevation coverage grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageGrid {
    cells: [CoverageCell; GRID_CELLS],
}

impl Default for CoverageGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl CoverageGrid {
    pub fn new() -> Self {
        Self {
            cells: std::array::from_fn(|_| CoverageCell::default()),
        }
    }

    fn offset(sector: usize, band: usize) -> usize {
        sector * ELEVATION_BANDS + band
    }

    /// Record one observation; returns the `(sector, band)` it landed in
    ///
    /// Observations outside every band (below 8°, NaN) are not aggregated.
    pub fn record(&mut self, azimuth_deg: f64, elevation_deg: f64, sv_id: u32) -> Option<(usize, usize)> {
        let sector = azimuth_index(azimuth_deg)?;
        let band = elevation_index(elevation_deg)?;

        let cell = &mut self.cells[Self::offset(sector, band)];
        cell.count = cell.count.saturating_add(1);
        cell.satellites.insert(sv_id);

        Some((sector, band))
    }

    /// Cell at `(sector, band)`
    ///
    /// # Panics
    ///
    /// Panics if either index is out of range.
    pub fn cell(&self, sector: usize, band: usize) -> &CoverageCell {
        assert!(sector < AZIMUTH_SECTORS && band < ELEVATION_BANDS, "grid index out of range");
        &self.cells[Self::offset(sector, band)]
    }

    /// Replace a cell wholesale (used when restoring a session)
    pub(crate) fn set_cell(&mut self, sector: usize, band: usize, cell: CoverageCell) {
        self.cells[Self::offset(sector, band)] = cell;
    }

    /// Observation count at `(sector, band)`
    pub fn count(&self, sector: usize, band: usize) -> u32 {
        self.cell(sector, band).count
    }

    /// Iterate cells with their `(sector, band)` coordinates
    pub fn iter(&self) -> impl Iterator<Item = ((usize, usize), &CoverageCell)> {
        self.cells
            .iter()
            .enumerate()
            .map(|(i, cell)| ((i / ELEVATION_BANDS, i % ELEVATION_BANDS), cell))
    }

    /// Total observations across all cells
    pub fn total_observations(&self) -> u64 {
        self.cells.iter().map(|c| c.count as u64).sum()
    }

    /// Distinct satellites seen anywhere in the grid
    pub fn distinct_satellites(&self) -> BTreeSet<u32> {
        self.cells
            .iter()
            .flat_map(|c| c.satellites.iter().copied())
            .collect()
    }

    /// Number of cells with at least `threshold` observations
    pub fn valid_cells(&self, threshold: u32) -> usize {
        self.cells.iter().filter(|c| c.count >= threshold).count()
    }

    /// Percentage of all 56 cells meeting `threshold`, rounded
    pub fn coverage_percent(&self, threshold: u32) -> u32 {
        percent(self.valid_cells(threshold), GRID_CELLS)
    }

    /// Percentage of horizon-band cells meeting `threshold`, rounded
    pub fn horizon_coverage_percent(&self, threshold: u32) -> u32 {
        let valid = self
            .iter()
            .filter(|((_, band), cell)| *band < HORIZON_BANDS && cell.count >= threshold)
            .count();
        percent(valid, AZIMUTH_SECTORS * HORIZON_BANDS)
    }

    /// Clear every cell
    pub fn reset(&mut self) {
        for cell in self.cells.iter_mut() {
            *cell = CoverageCell::default();
        }
    }
}

fn percent(part: usize, whole: usize) -> u32 {
    (part as f64 / whole as f64 * 100.0).round() as u32
}
