//! Multi-objective edge weights and named planning presets

use crate::error::{PlanningError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Edge cost weights: α (time), β (risk), γ (energy)
///
/// Deserialization goes through [`ObjectiveWeights::new`], so loaded documents are validated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWeights")]
pub struct ObjectiveWeights {
    time: f64,
    risk: f64,
    energy: f64,
}

#[derive(Deserialize)]
struct RawWeights {
    time: f64,
    risk: f64,
    energy: f64,
}

impl TryFrom<RawWeights> for ObjectiveWeights {
    type Error = PlanningError;

    fn try_from(raw: RawWeights) -> Result<Self> {
        ObjectiveWeights::new(raw.time, raw.risk, raw.energy)
    }
}

impl ObjectiveWeights {
    /// Validated weights; each must be finite and non-negative and at least one positive
    pub fn new(time: f64, risk: f64, energy: f64) -> Result<Self> {
        let weights = ObjectiveWeights { time, risk, energy };
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("time", self.time), ("risk", self.risk), ("energy", self.energy)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(PlanningError::config(format!(
                    "objective weight {name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if self.time + self.risk + self.energy <= 0.0 {
            return Err(PlanningError::config("objective weights are all zero"));
        }
        Ok(())
    }

    /// Risk-only weighting (α = γ = 0, β = 1) used for accessibility scoring
    pub const fn risk_only() -> Self {
        ObjectiveWeights {
            time: 0.0,
            risk: 1.0,
            energy: 0.0,
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn risk(&self) -> f64 {
        self.risk
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// Weighted sum of cost components
    #[inline]
    pub fn combine(&self, time: f64, risk: f64, energy: f64) -> f64 {
        self.time * time + self.risk * risk + self.energy * energy
    }
}

/// Named objective presets plus caller-defined weights
///
/// Distinct requests optimize different objectives over the same search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanningObjective {
    #[default]
    MinimizeRiskExposure,
    MinimizeTime,
    Balanced,
    Custom(ObjectiveWeights),
}

impl PlanningObjective {
    pub fn weights(&self) -> ObjectiveWeights {
        match self {
            PlanningObjective::MinimizeRiskExposure => ObjectiveWeights {
                time: 1.0,
                risk: 10.0,
                energy: 0.1,
            },
            PlanningObjective::MinimizeTime => ObjectiveWeights {
                time: 1.0,
                risk: 1.0,
                energy: 0.1,
            },
            PlanningObjective::Balanced => ObjectiveWeights {
                time: 1.0,
                risk: 4.0,
                energy: 0.25,
            },
            PlanningObjective::Custom(weights) => *weights,
        }
    }
}

impl fmt::Display for PlanningObjective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanningObjective::MinimizeRiskExposure => write!(f, "minimize_risk_exposure"),
            PlanningObjective::MinimizeTime => write!(f, "minimize_time"),
            PlanningObjective::Balanced => write!(f, "balanced"),
            PlanningObjective::Custom(w) => write!(f, "custom({}, {}, {})", w.time, w.risk, w.energy),
        }
    }
}

impl FromStr for PlanningObjective {
    type Err = PlanningError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimize_risk_exposure" | "risk" => Ok(PlanningObjective::MinimizeRiskExposure),
            "minimize_time" | "time" => Ok(PlanningObjective::MinimizeTime),
            "balanced" => Ok(PlanningObjective::Balanced),
            other => Err(PlanningError::config(format!(
                "unknown planning objective '{other}'"
            ))),
        }
    }
}
