//! # Site Verdict
//!
//! Ordered decision list combining uptime and horizon tiers into a discrete
//! site-quality verdict. First matching rule wins:
//!
//! | Verdict | Uptime | Horizon |
//! |---------|--------|---------|
//! | Excellent | ≥ 95% | clear ≥ 7, blocked = 0, sparse = 0 |
//! | Good | ≥ 90% | clear ≥ 5, blocked = 0, sparse ≤ 1 |
//! | Adequate | ≥ 80% | blocked ≤ 1, weighted score ≥ 50 |
//! | Marginal | ≥ 60% | blocked ≤ 2 |
//! | Poor | otherwise | |
//!
//! Stateless: every call recomputes from scratch.

use serde::Serialize;

use super::horizon::HorizonSummary;
use super::uptime::{UptimeStatus, MIN_ELAPSED_MS};

/// Site-quality verdict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Not enough elapsed time to judge
    #[default]
    InsufficientData,
    Excellent,
    Good,
    Adequate,
    Marginal,
    Poor,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::InsufficientData => write!(f, "Insufficient data"),
            Verdict::Excellent => write!(f, "Excellent"),
            Verdict::Good => write!(f, "Good"),
            Verdict::Adequate => write!(f, "Adequate"),
            Verdict::Marginal => write!(f, "Marginal"),
            Verdict::Poor => write!(f, "Poor"),
        }
    }
}

/// Apply the decision list to a measured uptime percentage
pub fn classify(uptime_percent: f64, horizon: &HorizonSummary) -> Verdict {
    let h = horizon;
    if uptime_percent >= 95.0 && h.clear >= 7 && h.blocked == 0 && h.sparse == 0 {
        Verdict::Excellent
    } else if uptime_percent >= 90.0 && h.clear >= 5 && h.blocked == 0 && h.sparse <= 1 {
        Verdict::Good
    } else if uptime_percent >= 80.0 && h.blocked <= 1 && h.weighted_score >= 50 {
        Verdict::Adequate
    } else if uptime_percent >= 60.0 && h.blocked <= 2 {
        Verdict::Marginal
    } else {
        Verdict::Poor
    }
}

/// Verdict for an uptime result, short-circuiting on insufficient data
///
/// A measured result still needs a minute of total elapsed time.
pub fn evaluate(uptime: &UptimeStatus, horizon: &HorizonSummary) -> Verdict {
    match uptime {
        UptimeStatus::Measured(stats) if stats.total_elapsed_ms >= MIN_ELAPSED_MS => {
            classify(stats.percent, horizon)
        }
        _ => Verdict::InsufficientData,
    }
}
