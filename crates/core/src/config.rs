//! Engine configuration
//!
//! Every section has research-free but tunable defaults and can be partially overridden from
//! a serialized document: unspecified fields fall back to [`Default`].

use crate::error::{PlanningError, Result};
use crate::grid::HazardType;
use crate::planner::PlanningObjective;
use serde::{Deserialize, Serialize};

/// Tolerance used when checking that weight vectors sum to one
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

fn check_unit_interval(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PlanningError::config(format!("{name} must be within [0, 1], got {value}")))
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(PlanningError::config(format!("{name} must be finite and non-negative, got {value}")))
    }
}

/// Severity weight per hazard type used by the risk normalization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HazardWeights {
    pub fire: f64,
    pub collapse: f64,
    pub flood: f64,
}

impl Default for HazardWeights {
    fn default() -> Self {
        Self {
            fire: 1.0,
            collapse: 1.5,
            flood: 0.7,
        }
    }
}

impl HazardWeights {
    /// Weight applied to a hazard type (`None` carries no risk)
    pub fn for_type(&self, hazard: HazardType) -> f64 {
        match hazard {
            HazardType::None => 0.0,
            HazardType::Fire => self.fire,
            HazardType::Collapse => self.collapse,
            HazardType::Flood => self.flood,
        }
    }
}

/// Risk propagation and hazard evolution parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Per-type severity weights
    pub hazard_weights: HazardWeights,
    /// Exponent of the monotonic intensity curve (2.0 gives intensity²)
    pub curve_exponent: f64,
    /// Fraction of the strongest neighbouring base cost bled into a cell
    pub neighbour_influence: f64,
    /// Spread probability lost per cell of distance from the event origin
    pub distance_decay: f64,
    /// Collapse intensity at or above which a cell is impassable rubble
    pub collapsed_intensity: f64,
    /// Risk change above which a cell is reported in a change set
    pub change_threshold: f64,
    /// Exponential fire burn-out rate (1/s)
    pub fire_burnout_rate: f64,
    /// Exponential flood recession rate (1/s)
    pub flood_recession_rate: f64,
    /// Intensity under which a decaying hazard is extinguished
    pub extinguish_below: f64,
    /// Risk cost thresholds for medium, high and critical levels
    pub level_thresholds: [f64; 3],
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            hazard_weights: HazardWeights::default(),
            curve_exponent: 2.0,
            neighbour_influence: 0.1,
            distance_decay: 0.15,
            collapsed_intensity: 0.7,
            change_threshold: 0.05,
            fire_burnout_rate: 0.001,
            flood_recession_rate: 0.0005,
            extinguish_below: 0.01,
            level_thresholds: [0.2, 0.5, 0.8],
        }
    }
}

impl RiskConfig {
    /// Check ranges of every field
    pub fn validate(&self) -> Result<()> {
        check_non_negative("hazard_weights.fire", self.hazard_weights.fire)?;
        check_non_negative("hazard_weights.collapse", self.hazard_weights.collapse)?;
        check_non_negative("hazard_weights.flood", self.hazard_weights.flood)?;
        if !(self.curve_exponent.is_finite() && self.curve_exponent > 0.0) {
            return Err(PlanningError::config(format!(
                "curve_exponent must be positive, got {}",
                self.curve_exponent
            )));
        }
        check_unit_interval("neighbour_influence", self.neighbour_influence)?;
        check_non_negative("distance_decay", self.distance_decay)?;
        check_unit_interval("collapsed_intensity", self.collapsed_intensity)?;
        check_non_negative("change_threshold", self.change_threshold)?;
        check_non_negative("fire_burnout_rate", self.fire_burnout_rate)?;
        check_non_negative("flood_recession_rate", self.flood_recession_rate)?;
        check_unit_interval("extinguish_below", self.extinguish_below)?;
        let [medium, high, critical] = self.level_thresholds;
        if !(medium <= high && high <= critical) {
            return Err(PlanningError::config(
                "level_thresholds must be non-decreasing",
            ));
        }
        Ok(())
    }
}

/// Prioritizer weights: w1 severity, w2 urgency, w3 accessibility
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    pub severity: f64,
    pub urgency: f64,
    pub accessibility: f64,
    /// Survival window (s) at or below which the urgency term saturates at 1
    pub urgency_reference_secs: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            severity: 0.4,
            urgency: 0.4,
            accessibility: 0.2,
            urgency_reference_secs: 60.0,
        }
    }
}

impl PriorityWeights {
    /// Weights must be non-negative and sum to one
    pub fn validate(&self) -> Result<()> {
        check_non_negative("priority.severity", self.severity)?;
        check_non_negative("priority.urgency", self.urgency)?;
        check_non_negative("priority.accessibility", self.accessibility)?;
        let sum = self.severity + self.urgency + self.accessibility;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(PlanningError::config(format!(
                "priority weights must sum to 1, got {sum}"
            )));
        }
        if !(self.urgency_reference_secs.is_finite() && self.urgency_reference_secs > 0.0) {
            return Err(PlanningError::config(
                "priority.urgency_reference_secs must be positive",
            ));
        }
        Ok(())
    }
}

/// Grid adjacency used by the path planner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// Orthogonal moves only
    #[default]
    Four,
    /// Orthogonal and diagonal moves
    Eight,
}

/// Path planner parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub connectivity: Connectivity,
    /// Cells whose risk cost is strictly above this are never entered
    pub default_risk_ceiling: f64,
    /// Time cost of moving one cell of distance
    pub seconds_per_cell: f64,
    /// Expansions between two cancellation checks
    pub cancellation_check_interval: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::Four,
            default_risk_ceiling: 1.0,
            seconds_per_cell: 1.0,
            cancellation_check_interval: 64,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<()> {
        check_non_negative("planner.default_risk_ceiling", self.default_risk_ceiling)?;
        if !(self.seconds_per_cell.is_finite() && self.seconds_per_cell > 0.0) {
            return Err(PlanningError::config("planner.seconds_per_cell must be positive"));
        }
        if self.cancellation_check_interval == 0 {
            return Err(PlanningError::config(
                "planner.cancellation_check_interval must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Which allocation strategy the coordinator runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategyKind {
    /// Priority-ordered greedy auction
    #[default]
    Greedy,
    /// Minimum total cost assignment over the top-priority victims
    MinCostMatching,
}

/// Coordinator retry bounds and defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Wait steps a lower-priority agent may take to clear a conflict
    pub max_holds: u32,
    /// Conflict re-routes tried after holding is exhausted
    pub max_conflict_reroutes: u32,
    /// Re-routing attempts after a plan is invalidated
    pub max_reroute_attempts: u32,
    /// Ceiling multiplier applied on each re-routing attempt after the first
    pub ceiling_relaxation: f64,
    /// Objective used for allocation and re-planning
    pub objective: PlanningObjective,
    pub strategy: AllocationStrategyKind,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_holds: 3,
            max_conflict_reroutes: 2,
            max_reroute_attempts: 3,
            ceiling_relaxation: 1.5,
            objective: PlanningObjective::MinimizeRiskExposure,
            strategy: AllocationStrategyKind::Greedy,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_reroute_attempts == 0 {
            return Err(PlanningError::config(
                "coordinator.max_reroute_attempts must be at least 1",
            ));
        }
        if !(self.ceiling_relaxation.is_finite() && self.ceiling_relaxation >= 1.0) {
            return Err(PlanningError::config(
                "coordinator.ceiling_relaxation must be >= 1",
            ));
        }
        self.objective.weights().validate()
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub risk: RiskConfig,
    pub priority: PriorityWeights,
    pub planner: PlannerConfig,
    pub coordinator: CoordinatorConfig,
}

impl EngineConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.risk.validate()?;
        self.priority.validate()?;
        self.planner.validate()?;
        self.coordinator.validate()
    }
}
