//! Risk propagation layer
//!
//! Turns the hazard field of a [`GridEnvironment`](crate::grid::GridEnvironment) into a dense
//! risk-cost surface that the prioritizer and the path planner read.

pub mod propagator;
pub mod surface;

pub use propagator::RiskPropagator;
pub use surface::RiskSurface;

use serde::{Deserialize, Serialize};

/// Coarse classification of a risk cost, used in decision records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Classify a cost against ascending `[medium, high, critical]` thresholds
    pub fn classify(cost: f64, thresholds: [f64; 3]) -> Self {
        let [medium, high, critical] = thresholds;
        if cost >= critical {
            RiskLevel::Critical
        } else if cost >= high {
            RiskLevel::High
        } else if cost >= medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_thresholds() {
        let thresholds = [0.2, 0.5, 0.8];
        assert_eq!(RiskLevel::classify(0.0, thresholds), RiskLevel::Low);
        assert_eq!(RiskLevel::classify(0.19, thresholds), RiskLevel::Low);
        assert_eq!(RiskLevel::classify(0.2, thresholds), RiskLevel::Medium);
        assert_eq!(RiskLevel::classify(0.64, thresholds), RiskLevel::High);
        assert_eq!(RiskLevel::classify(1.5, thresholds), RiskLevel::Critical);
        assert!(RiskLevel::Critical > RiskLevel::Low);
    }
}
