//! Immutable risk-cost surface shared with planners

use crate::grid::{Coord, HazardType, Terrain};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Dense per-cell risk costs, blocked mask and terrain, keyed by cell id
///
/// Valid until the next tick or hazard injection of the grid it was derived from.
/// Cloning only bumps reference counts, so every allocation round and worker thread can hold
/// its own frozen copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSurface {
    pub(crate) width: usize,
    pub(crate) height: usize,
    /// Grid revision this surface was computed against
    pub(crate) revision: u64,
    pub(crate) costs: Arc<[f64]>,
    pub(crate) blocked: Arc<[bool]>,
    pub(crate) terrain: Arc<[Terrain]>,
    pub(crate) hazards: Arc<[HazardType]>,
    /// Cheapest cost among enterable cells (heuristic scale)
    pub(crate) min_cost: f64,
    pub(crate) max_cost: f64,
}

impl RiskSurface {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    #[inline]
    pub fn contains(&self, coord: Coord) -> bool {
        coord.row < self.height && coord.col < self.width
    }

    /// Row-major cell id, also the deterministic tie-break key of the planner
    #[inline]
    pub fn cell_id(&self, coord: Coord) -> usize {
        coord.row * self.width + coord.col
    }

    #[inline]
    pub fn coord_of(&self, id: usize) -> Coord {
        Coord::new(id / self.width, id % self.width)
    }

    #[inline]
    pub fn cost(&self, coord: Coord) -> f64 {
        self.costs[self.cell_id(coord)]
    }

    #[inline]
    pub fn cost_at(&self, id: usize) -> f64 {
        self.costs[id]
    }

    #[inline]
    pub fn is_blocked(&self, coord: Coord) -> bool {
        self.blocked[self.cell_id(coord)]
    }

    #[inline]
    pub fn blocked_at(&self, id: usize) -> bool {
        self.blocked[id]
    }

    #[inline]
    pub fn terrain(&self, coord: Coord) -> Terrain {
        self.terrain[self.cell_id(coord)]
    }

    #[inline]
    pub fn terrain_at(&self, id: usize) -> Terrain {
        self.terrain[id]
    }

    /// Hazard type currently dominating a cell
    pub fn hazard(&self, coord: Coord) -> HazardType {
        self.hazards[self.cell_id(coord)]
    }

    pub fn costs(&self) -> &[f64] {
        &self.costs
    }

    pub fn min_cost(&self) -> f64 {
        self.min_cost
    }

    pub fn max_cost(&self) -> f64 {
        self.max_cost
    }
}
