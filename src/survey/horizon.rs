//! # Horizon Classifier
//!
//! Compares low-elevation observation counts per compass direction to judge
//! how open the horizon is in each direction.

use serde::Serialize;

use super::grid::{CoverageGrid, AZIMUTH_SECTORS};

/// Ratio to the best direction at or above which a direction is clear
pub const CLEAR_RATIO: f64 = 0.70;

/// Ratio at or above which a direction is partially obstructed
pub const PARTIAL_RATIO: f64 = 0.40;

/// Visibility of one compass direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizonTier {
    Clear,
    Partial,
    Sparse,
    Blocked,
}

impl HorizonTier {
    /// Contribution to the weighted horizon score
    pub fn weight(self) -> f64 {
        match self {
            HorizonTier::Clear => 1.0,
            HorizonTier::Partial => 0.7,
            HorizonTier::Sparse => 0.3,
            HorizonTier::Blocked => 0.0,
        }
    }
}

impl std::fmt::Display for HorizonTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HorizonTier::Clear => write!(f, "clear"),
            HorizonTier::Partial => write!(f, "partial"),
            HorizonTier::Sparse => write!(f, "sparse"),
            HorizonTier::Blocked => write!(f, "blocked"),
        }
    }
}

/// Per-direction tiers and their tallies
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HorizonSummary {
    pub tiers: [HorizonTier; AZIMUTH_SECTORS],
    pub clear: usize,
    pub partial: usize,
    pub sparse: usize,
    pub blocked: usize,
    /// Weighted score 0-100
    pub weighted_score: u32,
}

impl Default for HorizonSummary {
    fn default() -> Self {
        Self::from_tiers([HorizonTier::Blocked; AZIMUTH_SECTORS])
    }
}

impl HorizonSummary {
    /// Tally a set of per-direction tiers
    pub fn from_tiers(tiers: [HorizonTier; AZIMUTH_SECTORS]) -> Self {
        let tally = |tier| tiers.iter().filter(|t| **t == tier).count();
        let weight_sum: f64 = tiers.iter().map(|t| t.weight()).sum();

        Self {
            tiers,
            clear: tally(HorizonTier::Clear),
            partial: tally(HorizonTier::Partial),
            sparse: tally(HorizonTier::Sparse),
            blocked: tally(HorizonTier::Blocked),
            weighted_score: (weight_sum / AZIMUTH_SECTORS as f64 * 100.0).round() as u32,
        }
    }
}

/// Classify one direction
///
/// `lowest_count` is the direction's count in the 8-14° band, `bands_valid`
/// whether both horizon bands meet the observation threshold.
pub fn classify_direction(lowest_count: u32, bands_valid: bool, max_count: u32) -> HorizonTier {
    if !bands_valid || max_count == 0 {
        return HorizonTier::Blocked;
    }

    let ratio = lowest_count as f64 / max_count as f64;
    if ratio >= CLEAR_RATIO {
        HorizonTier::Clear
    } else if ratio >= PARTIAL_RATIO {
        HorizonTier::Partial
    } else {
        HorizonTier::Sparse
    }
}

/// Classify all eight directions of `grid` at the given observation threshold
pub fn classify_horizon(grid: &CoverageGrid, threshold: u32) -> HorizonSummary {
    let lowest: [u32; AZIMUTH_SECTORS] = std::array::from_fn(|sector| grid.count(sector, 0));
    let max_count = lowest.iter().copied().max().unwrap_or(0);

    let tiers = std::array::from_fn(|sector| {
        let bands_valid = grid.count(sector, 0) >= threshold && grid.count(sector, 1) >= threshold;
        classify_direction(lowest[sector], bands_valid, max_count)
    });

    HorizonSummary::from_tiers(tiers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(grid: &mut CoverageGrid, azimuth: f64, elevation: f64, n: u32) {
        for i in 0..n {
            grid.record(azimuth, elevation, i % 4);
        }
    }

    #[test]
    fn test_classify_direction_thresholds() {
        assert_eq!(classify_direction(70, true, 100), HorizonTier::Clear);
        assert_eq!(classify_direction(69, true, 100), HorizonTier::Partial);
        assert_eq!(classify_direction(40, true, 100), HorizonTier::Partial);
        assert_eq!(classify_direction(39, true, 100), HorizonTier::Sparse);
        assert_eq!(classify_direction(100, false, 100), HorizonTier::Blocked);
        assert_eq!(classify_direction(0, true, 0), HorizonTier::Blocked);
    }

    #[test]
    fn test_one_sparse_direction() {
        let mut grid = CoverageGrid::new();
        for sector in 0..AZIMUTH_SECTORS {
            let azimuth = sector as f64 * 45.0;
            let n = if sector == 3 { 10 } else { 40 };
            fill(&mut grid, azimuth, 10.0, n);
            fill(&mut grid, azimuth, 16.0, n);
        }

        let summary = classify_horizon(&grid, 3);
        for (sector, tier) in summary.tiers.iter().enumerate() {
            if sector == 3 {
                assert_eq!(*tier, HorizonTier::Sparse);
            } else {
                assert_eq!(*tier, HorizonTier::Clear);
            }
        }
        assert_eq!(summary.clear, 7);
        assert_eq!(summary.sparse, 1);
        // (7 × 1.0 + 0.3) / 8 × 100 = 91.25
        assert_eq!(summary.weighted_score, 91);
    }

    #[test]
    fn test_missing_upper_horizon_band_blocks() {
        let mut grid = CoverageGrid::new();
        for sector in 0..AZIMUTH_SECTORS {
            let azimuth = sector as f64 * 45.0;
            fill(&mut grid, azimuth, 10.0, 20);
            if sector != 0 {
                fill(&mut grid, azimuth, 16.0, 20);
            }
        }

        let summary = classify_horizon(&grid, 10);
        assert_eq!(summary.tiers[0], HorizonTier::Blocked);
        assert_eq!(summary.blocked, 1);
        assert_eq!(summary.clear, 7);
    }

    #[test]
    fn test_empty_grid_all_blocked() {
        let summary = classify_horizon(&CoverageGrid::new(), 0);
        assert_eq!(summary.blocked, 8);
        assert_eq!(summary.weighted_score, 0);
    }

    #[test]
    fn test_weighted_score() {
        let summary = HorizonSummary::from_tiers([
            HorizonTier::Clear,
            HorizonTier::Clear,
            HorizonTier::Partial,
            HorizonTier::Partial,
            HorizonTier::Sparse,
            HorizonTier::Sparse,
            HorizonTier::Blocked,
            HorizonTier::Blocked,
        ]);
        // (2 + 1.4 + 0.6) / 8 × 100 = 50
        assert_eq!(summary.weighted_score, 50);
        assert_eq!(summary.partial, 2);
    }
}
