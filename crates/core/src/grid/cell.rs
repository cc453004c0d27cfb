//! Cell-level grid types: coordinates, terrain, hazards and hazard events

use crate::agent::Mobility;
use crate::error::{PlanningError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete grid coordinate (row-major)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    pub const fn new(row: usize, col: usize) -> Self {
        Coord { row, col }
    }

    /// Chebyshev (king-move) distance
    #[inline]
    pub fn chebyshev(&self, other: &Coord) -> usize {
        self.row.abs_diff(other.row).max(self.col.abs_diff(other.col))
    }

    /// Manhattan distance
    #[inline]
    pub fn manhattan(&self, other: &Coord) -> usize {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }

    /// Straight-line distance in cell units
    #[inline]
    pub fn euclidean(&self, other: &Coord) -> f64 {
        let dr = self.row.abs_diff(other.row) as f64;
        let dc = self.col.abs_diff(other.col) as f64;
        dr.hypot(dc)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Static ground cover of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Terrain {
    #[default]
    Open,
    /// Debris field, slow and tiring for ground units
    Rubble,
    /// Shallow standing water
    Water,
    /// Impassable structure
    Wall,
}

impl Terrain {
    #[inline]
    pub fn is_passable(self) -> bool {
        !matches!(self, Terrain::Wall)
    }

    /// Energy multiplier for moving one cell of distance into this terrain
    ///
    /// Aerial units ignore ground cover. Walls return infinity for everyone.
    pub fn energy_factor(self, mobility: Mobility) -> f64 {
        match (self, mobility) {
            (Terrain::Wall, _) => f64::INFINITY,
            (_, Mobility::Aerial) | (Terrain::Open, Mobility::Ground) => 1.0,
            (Terrain::Rubble, Mobility::Ground) => 1.8,
            (Terrain::Water, Mobility::Ground) => 1.4,
        }
    }
}

/// Hazard category carried by a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HazardType {
    #[default]
    None,
    Fire,
    Collapse,
    Flood,
}

impl HazardType {
    pub const ACTIVE: [HazardType; 3] = [HazardType::Fire, HazardType::Collapse, HazardType::Flood];

    #[inline]
    pub fn is_hazard(self) -> bool {
        self != HazardType::None
    }
}

/// Index of a hazard event in the environment's event arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HazardEventId(pub u32);

/// A typed hazard source
///
/// Events are immutable once created. A later event on the same cell supersedes an earlier
/// one through the idempotent-max rule instead of mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardEvent {
    origin: Coord,
    hazard_type: HazardType,
    base_intensity: f64,
    spread_probability: f64,
    decay_rate: f64,
}

impl HazardEvent {
    /// Create a validated hazard event
    ///
    /// # Arguments
    /// * `origin` - Cell the hazard starts in
    /// * `hazard_type` - Fire, collapse or flood (`None` is rejected)
    /// * `base_intensity` - Starting intensity in [0, 1]
    /// * `spread_probability` - Per-tick chance of spreading to an adjacent cell, in [0, 1]
    /// * `decay_rate` - Intensity ratio handed to a cell the hazard spreads into, in [0, 1]
    pub fn new(
        origin: Coord,
        hazard_type: HazardType,
        base_intensity: f64,
        spread_probability: f64,
        decay_rate: f64,
    ) -> Result<Self> {
        if !hazard_type.is_hazard() {
            return Err(PlanningError::config("hazard event needs a hazard type"));
        }
        for (name, value) in [
            ("base_intensity", base_intensity),
            ("spread_probability", spread_probability),
            ("decay_rate", decay_rate),
        ] {
            if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
                return Err(PlanningError::config(format!(
                    "hazard {name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(HazardEvent {
            origin,
            hazard_type,
            base_intensity,
            spread_probability,
            decay_rate,
        })
    }

    /// Hazard that stays where it is placed
    pub fn stationary(origin: Coord, hazard_type: HazardType, base_intensity: f64) -> Result<Self> {
        Self::new(origin, hazard_type, base_intensity, 0.0, 0.0)
    }

    pub fn origin(&self) -> Coord {
        self.origin
    }

    pub fn hazard_type(&self) -> HazardType {
        self.hazard_type
    }

    pub fn base_intensity(&self) -> f64 {
        self.base_intensity
    }

    pub fn spread_probability(&self) -> f64 {
        self.spread_probability
    }

    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }
}

/// One cell of the environment
///
/// Cells are never destroyed, only mutated by hazard events, decay, spread and risk refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub(crate) coord: Coord,
    pub(crate) terrain: Terrain,
    pub(crate) hazard_type: HazardType,
    /// Hazard intensity in [0, 1]
    pub(crate) intensity: f64,
    /// Derived path-search weight (>= 0)
    pub(crate) risk_cost: f64,
    /// Event that last raised this cell
    pub(crate) source_event: Option<HazardEventId>,
}

impl GridCell {
    pub fn new(coord: Coord, terrain: Terrain) -> Self {
        GridCell {
            coord,
            terrain,
            hazard_type: HazardType::None,
            intensity: 0.0,
            risk_cost: 0.0,
            source_event: None,
        }
    }

    pub fn coord(&self) -> Coord {
        self.coord
    }

    pub fn terrain(&self) -> Terrain {
        self.terrain
    }

    pub fn hazard_type(&self) -> HazardType {
        self.hazard_type
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    pub fn risk_cost(&self) -> f64 {
        self.risk_cost
    }

    pub fn source_event(&self) -> Option<HazardEventId> {
        self.source_event
    }

    pub fn is_hazardous(&self) -> bool {
        self.hazard_type.is_hazard() && self.intensity > 0.0
    }

    /// Structural collapse at or above the given intensity turns the cell into rubble
    pub fn is_collapsed(&self, collapsed_intensity: f64) -> bool {
        self.hazard_type == HazardType::Collapse && self.intensity >= collapsed_intensity
    }

    /// Whether units can enter this cell at all
    pub fn is_blocked(&self, collapsed_intensity: f64) -> bool {
        !self.terrain.is_passable() || self.is_collapsed(collapsed_intensity)
    }

    pub(crate) fn clear_hazard(&mut self) {
        self.hazard_type = HazardType::None;
        self.intensity = 0.0;
        self.source_event = None;
    }
}
