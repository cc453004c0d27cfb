//! Hazard-to-risk normalization, hazard evolution and probabilistic spread
//!
//! # Cost model
//!
//! ```text
//! base(c)  = intensity(c)^k × weight(type(c))
//! cost(c)  = max(base(c), influence × max base(n) for passable 4-neighbours n)
//! ```
//!
//! The cost is monotonically non-decreasing in intensity for a fixed hazard type.
//!
//! # Spread
//!
//! Every hazardous cell whose originating event has a non-zero spread probability samples
//! each passable 4-neighbour once per tick with
//!
//! ```text
//! p = spread × (1 − min(1, decay × chebyshev(candidate, origin)))
//! ```
//!
//! and on success raises it to `parent intensity × event decay rate`. Raising never lowers an
//! existing hazard (idempotent max).

use crate::config::RiskConfig;
use crate::error::Result;
use crate::grid::{orthogonal_neighbours, Coord, GridCell, HazardEvent, HazardEventId, HazardType};
use crate::risk::{RiskLevel, RiskSurface};
use rand::Rng;
use tracing::trace;

/// Derives risk costs from hazard intensities and evolves hazards over time
#[derive(Debug, Clone)]
pub struct RiskPropagator {
    config: RiskConfig,
}

impl RiskPropagator {
    /// Create a propagator, validating the risk configuration
    pub fn new(config: RiskConfig) -> Result<Self> {
        config.validate()?;
        Ok(RiskPropagator { config })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Normalized risk cost of a hazard at a given intensity
    pub fn base_cost(&self, hazard: HazardType, intensity: f64) -> f64 {
        if !hazard.is_hazard() {
            return 0.0;
        }
        intensity.clamp(0.0, 1.0).powf(self.config.curve_exponent)
            * self.config.hazard_weights.for_type(hazard)
    }

    pub fn risk_level(&self, cost: f64) -> RiskLevel {
        RiskLevel::classify(cost, self.config.level_thresholds)
    }

    /// Cell cannot be entered (wall or collapsed structure)
    pub fn is_blocked(&self, cell: &GridCell) -> bool {
        cell.is_blocked(self.config.collapsed_intensity)
    }

    /// Raise a cell to a hazard unless it already carries an equal or stronger one
    ///
    /// Returns true when the cell changed.
    pub(crate) fn raise(
        &self,
        cell: &mut GridCell,
        hazard: HazardType,
        intensity: f64,
        source: HazardEventId,
    ) -> bool {
        if intensity <= 0.0 || !hazard.is_hazard() {
            return false;
        }
        let derived = self.base_cost(hazard, intensity);
        let existing = self.base_cost(cell.hazard_type, cell.intensity);
        if intensity < cell.intensity || derived < existing {
            return false;
        }
        if hazard == cell.hazard_type && intensity == cell.intensity {
            return false;
        }
        cell.hazard_type = hazard;
        cell.intensity = intensity.min(1.0);
        cell.source_event = Some(source);
        true
    }

    /// Exponential burn-out of fires and recession of floods; collapse persists
    ///
    /// Returns the number of cells whose hazard was extinguished.
    pub(crate) fn decay(&self, cells: &mut [GridCell], dt: f64) -> usize {
        let mut extinguished = 0;
        for cell in cells.iter_mut().filter(|c| c.is_hazardous()) {
            let rate = match cell.hazard_type {
                HazardType::Fire => self.config.fire_burnout_rate,
                HazardType::Flood => self.config.flood_recession_rate,
                HazardType::Collapse | HazardType::None => 0.0,
            };
            if rate == 0.0 {
                continue;
            }
            cell.intensity *= (-rate * dt).exp();
            if cell.intensity < self.config.extinguish_below {
                cell.clear_hazard();
                extinguished += 1;
            }
        }
        extinguished
    }

    /// One round of probabilistic spread
    ///
    /// Sources are read from the pre-spread state so a freshly raised cell does not spread in
    /// the same tick. A random number is drawn for every candidate in cell-id order whether or
    /// not its probability is zero, keeping the RNG stream independent of outcomes.
    ///
    /// Returns the number of cells raised.
    pub(crate) fn spread<R: Rng>(
        &self,
        cells: &mut [GridCell],
        width: usize,
        height: usize,
        events: &[HazardEvent],
        rng: &mut R,
    ) -> usize {
        let sources: Vec<(usize, f64, HazardEventId)> = cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_hazardous())
            .filter_map(|(id, cell)| cell.source_event.map(|event| (id, cell.intensity, event)))
            .collect();
        let blocked_before: Vec<bool> = cells.iter().map(|c| self.is_blocked(c)).collect();

        let mut raised = 0;
        for (id, parent_intensity, event_id) in sources {
            let Some(event) = events.get(event_id.0 as usize) else {
                continue;
            };
            if event.spread_probability() <= 0.0 {
                continue;
            }
            let coord = Coord::new(id / width, id % width);
            for neighbour in orthogonal_neighbours(coord, width, height) {
                let nid = neighbour.row * width + neighbour.col;
                if blocked_before[nid] {
                    continue;
                }
                let roll: f64 = rng.random();
                let distance = neighbour.chebyshev(&event.origin()) as f64;
                let p = event.spread_probability()
                    * (1.0 - (self.config.distance_decay * distance).min(1.0));
                if roll < p
                    && self.raise(
                        &mut cells[nid],
                        event.hazard_type(),
                        parent_intensity * event.decay_rate(),
                        event_id,
                    )
                {
                    trace!("{:?} spread from {} to {}", event.hazard_type(), coord, neighbour);
                    raised += 1;
                }
            }
        }
        raised
    }

    /// Recompute every cell's risk cost from the current hazard field
    pub(crate) fn refresh_costs(&self, cells: &mut [GridCell], width: usize, height: usize) {
        let base: Vec<f64> = cells
            .iter()
            .map(|c| self.base_cost(c.hazard_type, c.intensity))
            .collect();
        let passable: Vec<bool> = cells.iter().map(|c| c.terrain.is_passable()).collect();
        let influence = self.config.neighbour_influence;

        for (id, cell) in cells.iter_mut().enumerate() {
            let coord = Coord::new(id / width, id % width);
            let strongest_neighbour = orthogonal_neighbours(coord, width, height)
                .map(|n| n.row * width + n.col)
                .filter(|&nid| passable[nid])
                .map(|nid| base[nid])
                .fold(0.0_f64, f64::max);
            cell.risk_cost = base[id].max(influence * strongest_neighbour);
        }
    }

    /// Freeze the current cell state into a shareable surface
    pub fn surface(
        &self,
        cells: &[GridCell],
        width: usize,
        height: usize,
        revision: u64,
    ) -> RiskSurface {
        let costs: Vec<f64> = cells.iter().map(GridCell::risk_cost).collect();
        let blocked: Vec<bool> = cells.iter().map(|c| self.is_blocked(c)).collect();
        let min_cost = costs
            .iter()
            .zip(&blocked)
            .filter(|(_, &b)| !b)
            .map(|(&c, _)| c)
            .fold(f64::INFINITY, f64::min);
        let max_cost = costs.iter().copied().fold(0.0_f64, f64::max);

        RiskSurface {
            width,
            height,
            revision,
            costs: costs.into(),
            blocked: blocked.into(),
            terrain: cells.iter().map(GridCell::terrain).collect(),
            hazards: cells.iter().map(GridCell::hazard_type).collect(),
            min_cost: if min_cost.is_finite() { min_cost } else { 0.0 },
            max_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Terrain;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn blank(width: usize, height: usize) -> Vec<GridCell> {
        (0..width * height)
            .map(|id| GridCell::new(Coord::new(id / width, id % width), Terrain::Open))
            .collect()
    }

    fn propagator() -> RiskPropagator {
        RiskPropagator::new(RiskConfig::default()).unwrap()
    }

    #[test]
    fn test_base_cost_curve() {
        let p = propagator();
        assert!((p.base_cost(HazardType::Fire, 0.8) - 0.64).abs() < 1e-12);
        assert!((p.base_cost(HazardType::Collapse, 0.5) - 0.375).abs() < 1e-12);
        assert!((p.base_cost(HazardType::Flood, 1.0) - 0.7).abs() < 1e-12);
        assert_eq!(p.base_cost(HazardType::None, 1.0), 0.0);
    }

    #[test]
    fn test_base_cost_monotonic_in_intensity() {
        let p = propagator();
        for hazard in HazardType::ACTIVE {
            let mut previous = 0.0;
            for step in 0..=100 {
                let cost = p.base_cost(hazard, f64::from(step) / 100.0);
                assert!(cost >= previous);
                assert!(cost >= 0.0);
                previous = cost;
            }
        }
    }

    #[test]
    fn test_neighbour_influence() {
        let p = propagator();
        let mut cells = blank(3, 3);
        cells[4].hazard_type = HazardType::Fire;
        cells[4].intensity = 1.0;
        p.refresh_costs(&mut cells, 3, 3);

        assert!((cells[4].risk_cost - 1.0).abs() < 1e-12);
        for id in [1, 3, 5, 7] {
            assert!((cells[id].risk_cost - 0.1).abs() < 1e-12);
        }
        for id in [0, 2, 6, 8] {
            assert_eq!(cells[id].risk_cost, 0.0);
        }
    }

    #[test]
    fn test_raise_is_idempotent_max() {
        let p = propagator();
        let mut cell = GridCell::new(Coord::new(0, 0), Terrain::Open);
        assert!(p.raise(&mut cell, HazardType::Collapse, 0.6, HazardEventId(0)));
        assert!(!p.raise(&mut cell, HazardType::Collapse, 0.4, HazardEventId(1)));
        assert_eq!(cell.intensity, 0.6);
        assert_eq!(cell.source_event, Some(HazardEventId(0)));

        // Same intensity but a lower-weighted type would reduce the cost
        assert!(!p.raise(&mut cell, HazardType::Fire, 0.6, HazardEventId(2)));
        assert!(p.raise(&mut cell, HazardType::Collapse, 0.9, HazardEventId(3)));
        assert_eq!(cell.intensity, 0.9);
    }

    #[test]
    fn test_decay_extinguishes_fire_but_not_collapse() {
        let p = propagator();
        let mut cells = blank(2, 1);
        cells[0].hazard_type = HazardType::Fire;
        cells[0].intensity = 0.5;
        cells[1].hazard_type = HazardType::Collapse;
        cells[1].intensity = 0.5;

        let extinguished = p.decay(&mut cells, 10_000.0);
        assert_eq!(extinguished, 1);
        assert_eq!(cells[0].hazard_type, HazardType::None);
        assert_eq!(cells[1].intensity, 0.5);
    }

    #[test]
    fn test_spread_respects_zero_probability() {
        let p = propagator();
        let mut cells = blank(3, 3);
        let event = HazardEvent::stationary(Coord::new(1, 1), HazardType::Fire, 1.0).unwrap();
        p.raise(&mut cells[4], HazardType::Fire, 1.0, HazardEventId(0));
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(p.spread(&mut cells, 3, 3, &[event], &mut rng), 0);
    }

    #[test]
    fn test_certain_spread_reaches_all_passable_neighbours() {
        let config = RiskConfig {
            distance_decay: 0.0,
            ..RiskConfig::default()
        };
        let p = RiskPropagator::new(config).unwrap();
        let mut cells = blank(3, 3);
        cells[1].terrain = Terrain::Wall;
        let event =
            HazardEvent::new(Coord::new(1, 1), HazardType::Collapse, 0.6, 1.0, 0.5).unwrap();
        p.raise(&mut cells[4], HazardType::Collapse, 0.6, HazardEventId(0));

        let mut rng = StdRng::seed_from_u64(1);
        let raised = p.spread(&mut cells, 3, 3, &[event], &mut rng);
        assert_eq!(raised, 3);
        assert_eq!(cells[1].intensity, 0.0);
        for id in [3, 5, 7] {
            assert!((cells[id].intensity - 0.3).abs() < 1e-12);
        }
        assert!(!p.is_blocked(&cells[3]));
        assert!(p.is_blocked(&cells[1]));
    }

    #[test]
    fn test_surface_masks_blocked_cells() {
        let p = propagator();
        let mut cells = blank(2, 2);
        cells[0].terrain = Terrain::Wall;
        cells[3].hazard_type = HazardType::Collapse;
        cells[3].intensity = 0.8;
        p.refresh_costs(&mut cells, 2, 2);
        let surface = p.surface(&cells, 2, 2, 5);

        assert_eq!(surface.revision(), 5);
        assert!(surface.is_blocked(Coord::new(0, 0)));
        assert!(surface.is_blocked(Coord::new(1, 1)));
        assert!(!surface.is_blocked(Coord::new(0, 1)));
        assert_eq!(surface.hazard(Coord::new(1, 1)), HazardType::Collapse);
        assert!((surface.max_cost() - 0.96).abs() < 1e-12);
        assert!((surface.min_cost() - 0.096).abs() < 1e-12);
    }
}
