//! Authoritative cell array and hazard event arena for one mission
//!
//! The environment owns its random number generator, so identical seeds and identical call
//! sequences reproduce identical hazard fields.

use crate::config::RiskConfig;
use crate::error::{PlanningError, Result};
use crate::grid::{Coord, GridCell, HazardEvent, HazardEventId, Terrain};
use crate::risk::{RiskPropagator, RiskSurface};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Risk movement of one cell between two grid revisions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellChange {
    pub coord: Coord,
    pub previous_risk: f64,
    pub current_risk: f64,
    /// Cell became or stopped being enterable
    pub blocked_changed: bool,
}

/// Cells whose risk moved beyond the change threshold in one tick or injection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Grid revision after the change
    pub revision: u64,
    pub cells: Vec<CellChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn contains(&self, coord: Coord) -> bool {
        self.cells.iter().any(|c| c.coord == coord)
    }

    pub fn coords(&self) -> impl Iterator<Item = Coord> + '_ {
        self.cells.iter().map(|c| c.coord)
    }
}

/// Immutable view of the grid handed to planners and external consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub width: usize,
    pub height: usize,
    pub revision: u64,
    pub cells: Arc<[GridCell]>,
}

impl GridSnapshot {
    pub fn cell_at(&self, coord: Coord) -> Option<&GridCell> {
        if coord.row < self.height && coord.col < self.width {
            self.cells.get(coord.row * self.width + coord.col)
        } else {
            None
        }
    }
}

/// Mission grid with hazard state
#[derive(Debug, Clone)]
pub struct GridEnvironment {
    width: usize,
    height: usize,
    cells: Vec<GridCell>,
    events: Vec<HazardEvent>,
    revision: u64,
    elapsed_secs: f64,
    rng: StdRng,
    propagator: Option<RiskPropagator>,
}

impl GridEnvironment {
    /// Placeholder grid that rejects every operation until replaced by an initialized one
    pub fn uninitialized() -> Self {
        GridEnvironment {
            width: 0,
            height: 0,
            cells: Vec::new(),
            events: Vec::new(),
            revision: 0,
            elapsed_secs: 0.0,
            rng: StdRng::seed_from_u64(0),
            propagator: None,
        }
    }

    /// Open grid of `width` × `height` cells
    pub fn new(width: usize, height: usize, seed: u64, config: RiskConfig) -> Result<Self> {
        Self::with_terrain(width, height, vec![Terrain::Open; width * height], seed, config)
    }

    /// Grid with explicit row-major terrain
    pub fn with_terrain(
        width: usize,
        height: usize,
        terrain: Vec<Terrain>,
        seed: u64,
        config: RiskConfig,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PlanningError::config(format!(
                "grid dimensions must be positive, got {width}x{height}"
            )));
        }
        if terrain.len() != width * height {
            return Err(PlanningError::config(format!(
                "terrain has {} cells, expected {}",
                terrain.len(),
                width * height
            )));
        }
        let propagator = RiskPropagator::new(config)?;
        let cells = terrain
            .into_iter()
            .enumerate()
            .map(|(id, t)| GridCell::new(Coord::new(id / width, id % width), t))
            .collect();

        info!("Initialized {}x{} grid (seed {})", width, height, seed);
        Ok(GridEnvironment {
            width,
            height,
            cells,
            events: Vec::new(),
            revision: 0,
            elapsed_secs: 0.0,
            rng: StdRng::seed_from_u64(seed),
            propagator: Some(propagator),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Monotonic counter bumped by every tick and hazard injection
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Simulated hazard time
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    pub fn is_initialized(&self) -> bool {
        self.propagator.is_some()
    }

    pub fn contains(&self, coord: Coord) -> bool {
        coord.row < self.height && coord.col < self.width
    }

    #[inline]
    pub fn cell_id(&self, coord: Coord) -> usize {
        coord.row * self.width + coord.col
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn events(&self) -> &[HazardEvent] {
        &self.events
    }

    pub fn event(&self, id: HazardEventId) -> Option<&HazardEvent> {
        self.events.get(id.0 as usize)
    }

    /// Propagator configured for this grid
    pub fn propagator(&self) -> Result<&RiskPropagator> {
        self.ready()
    }

    /// Cell at a coordinate
    pub fn cell_at(&self, coord: Coord) -> Result<&GridCell> {
        self.ready()?;
        if !self.contains(coord) {
            return Err(PlanningError::config(format!(
                "{coord} is outside the {}x{} grid",
                self.width, self.height
            )));
        }
        Ok(&self.cells[self.cell_id(coord)])
    }

    /// Store a hazard event and raise its origin cell
    ///
    /// Returns the cells whose risk moved beyond the change threshold.
    pub fn apply_hazard_event(&mut self, event: HazardEvent) -> Result<ChangeSet> {
        self.ready()?;
        let origin = event.origin();
        if !self.contains(origin) {
            return Err(PlanningError::config(format!(
                "hazard origin {origin} is outside the {}x{} grid",
                self.width, self.height
            )));
        }
        let id = HazardEventId(u32::try_from(self.events.len()).map_err(|_| {
            PlanningError::grid("hazard event arena is full")
        })?);
        let before = self.risk_snapshot();
        let origin_id = self.cell_id(origin);
        let propagator = self.ready()?.clone();
        let raised = propagator.raise(
            &mut self.cells[origin_id],
            event.hazard_type(),
            event.base_intensity(),
            id,
        );
        debug!(
            "Hazard {:?} {:?} at {} intensity {:.2} (raised: {})",
            id,
            event.hazard_type(),
            origin,
            event.base_intensity(),
            raised
        );
        self.events.push(event);
        propagator.refresh_costs(&mut self.cells, self.width, self.height);
        self.revision += 1;
        Ok(self.diff(&propagator, &before))
    }

    /// Advance hazard time by `dt` seconds
    ///
    /// Decays fire and flood, samples probabilistic spread, refreshes risk costs and reports
    /// the cells whose risk moved beyond the change threshold.
    pub fn tick(&mut self, dt: f64) -> Result<ChangeSet> {
        let propagator = self.ready()?.clone();
        if !(dt.is_finite() && dt >= 0.0) {
            return Err(PlanningError::config(format!(
                "tick delta must be finite and non-negative, got {dt}"
            )));
        }
        let before = self.risk_snapshot();

        let extinguished = propagator.decay(&mut self.cells, dt);
        let spread = propagator.spread(
            &mut self.cells,
            self.width,
            self.height,
            &self.events,
            &mut self.rng,
        );
        propagator.refresh_costs(&mut self.cells, self.width, self.height);
        self.revision += 1;
        self.elapsed_secs += dt;

        let changes = self.diff(&propagator, &before);
        debug!(
            "Tick {} (t={:.1}s): {} spread, {} extinguished, {} cells changed",
            self.revision,
            self.elapsed_secs,
            spread,
            extinguished,
            changes.len()
        );
        Ok(changes)
    }

    /// Immutable copy of the current cell array
    pub fn snapshot(&self) -> Result<GridSnapshot> {
        self.ready()?;
        Ok(GridSnapshot {
            width: self.width,
            height: self.height,
            revision: self.revision,
            cells: self.cells.iter().cloned().collect(),
        })
    }

    /// Current risk-cost surface
    pub fn risk_surface(&self) -> Result<RiskSurface> {
        let propagator = self.ready()?;
        Ok(propagator.surface(&self.cells, self.width, self.height, self.revision))
    }

    fn ready(&self) -> Result<&RiskPropagator> {
        let propagator = self
            .propagator
            .as_ref()
            .ok_or_else(|| PlanningError::grid("grid has not been initialized"))?;
        if self.cells.len() != self.width * self.height {
            return Err(PlanningError::grid(format!(
                "grid holds {} cells, expected {}",
                self.cells.len(),
                self.width * self.height
            )));
        }
        Ok(propagator)
    }

    fn risk_snapshot(&self) -> Vec<(f64, bool)> {
        let collapsed = self
            .propagator
            .as_ref()
            .map_or(f64::INFINITY, |p| p.config().collapsed_intensity);
        self.cells
            .iter()
            .map(|c| (c.risk_cost, c.is_blocked(collapsed)))
            .collect()
    }

    fn diff(&self, propagator: &RiskPropagator, before: &[(f64, bool)]) -> ChangeSet {
        let threshold = propagator.config().change_threshold;
        let cells = self
            .cells
            .iter()
            .zip(before)
            .filter_map(|(cell, &(previous_risk, was_blocked))| {
                let blocked_changed = propagator.is_blocked(cell) != was_blocked;
                ((cell.risk_cost - previous_risk).abs() > threshold || blocked_changed).then_some(
                    CellChange {
                        coord: cell.coord,
                        previous_risk,
                        current_risk: cell.risk_cost,
                        blocked_changed,
                    },
                )
            })
            .collect();
        ChangeSet {
            revision: self.revision,
            cells,
        }
    }

    #[cfg(test)]
    pub(crate) fn cells_mut(&mut self) -> &mut Vec<GridCell> {
        &mut self.cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::HazardType;

    fn grid(size: usize) -> GridEnvironment {
        GridEnvironment::new(size, size, 42, RiskConfig::default()).unwrap()
    }

    #[test]
    fn test_uninitialized_grid_rejects_operations() {
        let mut env = GridEnvironment::uninitialized();
        assert!(matches!(
            env.tick(1.0),
            Err(PlanningError::InvalidGridState(_))
        ));
        assert!(matches!(
            env.snapshot(),
            Err(PlanningError::InvalidGridState(_))
        ));
        assert!(env.cell_at(Coord::new(0, 0)).is_err());
    }

    #[test]
    fn test_corrupt_grid_rejected() {
        let mut env = grid(3);
        env.cells_mut().pop();
        assert!(matches!(
            env.tick(1.0),
            Err(PlanningError::InvalidGridState(_))
        ));
    }

    #[test]
    fn test_terrain_size_mismatch() {
        let result = GridEnvironment::with_terrain(2, 2, vec![Terrain::Open; 3], 1, RiskConfig::default());
        assert!(matches!(result, Err(PlanningError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_hazard_injection_reports_changes() {
        let mut env = grid(5);
        let event = HazardEvent::stationary(Coord::new(2, 2), HazardType::Fire, 0.8).unwrap();
        let changes = env.apply_hazard_event(event).unwrap();

        assert_eq!(env.revision(), 1);
        assert_eq!(changes.revision, 1);
        assert!(changes.contains(Coord::new(2, 2)));
        // 0.1 × 0.64 spills into the 4-neighbourhood, above the 0.05 threshold
        assert!(changes.contains(Coord::new(1, 2)));
        assert!(!changes.contains(Coord::new(0, 0)));

        let cell = env.cell_at(Coord::new(2, 2)).unwrap();
        assert_eq!(cell.hazard_type(), HazardType::Fire);
        assert!((cell.risk_cost() - 0.64).abs() < 1e-12);
        assert_eq!(cell.source_event(), Some(HazardEventId(0)));
    }

    #[test]
    fn test_weaker_event_does_not_lower_cell() {
        let mut env = grid(3);
        let strong = HazardEvent::stationary(Coord::new(1, 1), HazardType::Collapse, 0.6).unwrap();
        let weak = HazardEvent::stationary(Coord::new(1, 1), HazardType::Collapse, 0.2).unwrap();
        env.apply_hazard_event(strong).unwrap();
        let changes = env.apply_hazard_event(weak).unwrap();

        assert!(changes.is_empty());
        assert_eq!(env.cell_at(Coord::new(1, 1)).unwrap().intensity(), 0.6);
        assert_eq!(env.events().len(), 2);
    }

    #[test]
    fn test_out_of_bounds_origin_rejected() {
        let mut env = grid(3);
        let event = HazardEvent::stationary(Coord::new(3, 0), HazardType::Flood, 0.5).unwrap();
        assert!(env.apply_hazard_event(event).is_err());
        assert_eq!(env.revision(), 0);
    }

    #[test]
    fn test_tick_is_reproducible_for_same_seed() {
        let run = || {
            let mut env = grid(8);
            let event =
                HazardEvent::new(Coord::new(4, 4), HazardType::Fire, 0.9, 0.6, 0.8).unwrap();
            env.apply_hazard_event(event).unwrap();
            for _ in 0..5 {
                env.tick(1.0).unwrap();
            }
            env.snapshot().unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_collapse_reaching_threshold_blocks_cell() {
        let mut env = grid(3);
        let event = HazardEvent::stationary(Coord::new(0, 0), HazardType::Collapse, 0.75).unwrap();
        let changes = env.apply_hazard_event(event).unwrap();
        let change = changes.cells.iter().find(|c| c.coord == Coord::new(0, 0)).unwrap();
        assert!(change.blocked_changed);
        assert!(env.risk_surface().unwrap().is_blocked(Coord::new(0, 0)));
    }

    #[test]
    fn test_tick_advances_time_and_revision() {
        let mut env = grid(3);
        env.tick(2.5).unwrap();
        env.tick(2.5).unwrap();
        assert_eq!(env.revision(), 2);
        assert!((env.elapsed_secs() - 5.0).abs() < 1e-12);
        assert!(env.tick(f64::NAN).is_err());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut env = grid(3);
        let snapshot = env.snapshot().unwrap();
        let event = HazardEvent::stationary(Coord::new(1, 1), HazardType::Fire, 1.0).unwrap();
        env.apply_hazard_event(event).unwrap();

        assert_eq!(snapshot.revision, 0);
        assert_eq!(
            snapshot.cell_at(Coord::new(1, 1)).unwrap().hazard_type(),
            HazardType::None
        );
        assert!(snapshot.cell_at(Coord::new(5, 5)).is_none());
    }

    #[test]
    fn test_snapshot_and_surface_survive_json() {
        let mut env = grid(3);
        let event = HazardEvent::stationary(Coord::new(0, 2), HazardType::Flood, 0.6).unwrap();
        env.apply_hazard_event(event).unwrap();

        let snapshot = env.snapshot().unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: GridSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.revision, snapshot.revision);
        assert_eq!(restored.cells.len(), 9);
        for (a, b) in restored.cells.iter().zip(snapshot.cells.iter()) {
            assert_eq!(a.coord(), b.coord());
            assert_eq!(a.hazard_type(), b.hazard_type());
            assert!((a.risk_cost() - b.risk_cost()).abs() < 1e-12);
        }

        let surface = env.risk_surface().unwrap();
        let json = serde_json::to_string(&surface).unwrap();
        let restored: RiskSurface = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.revision(), surface.revision());
        assert_eq!(restored.hazard(Coord::new(0, 2)), HazardType::Flood);
        for (a, b) in restored.costs().iter().zip(surface.costs()) {
            assert!((a - b).abs() < 1e-12);
        }
        assert!(restored.cost(Coord::new(0, 2)) > 0.0);
    }
}
