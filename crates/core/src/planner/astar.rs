//! Risk-weighted A* search over the grid
//!
//! Edge cost between adjacent cells `a → b` at distance `d` (1 orthogonal, √2 diagonal):
//!
//! ```text
//! time   = d × seconds_per_cell
//! risk   = cost(b)
//! energy = d × terrain_factor(b, mobility) × (1 + cost(b))
//! edge   = α·time + β·risk + γ·energy
//! ```
//!
//! A wait keeps the agent in place for one step and costs `α·seconds_per_cell + β·cost(a)`.
//! Waits are only generated while time-step reservations are still ahead; past the last
//! reserved step the search collapses back to a plain spatial search.
//!
//! A reserved target cell counts against arrival too: the target is only accepted at a step
//! whose following step, spent on the target completing the rescue, is free.
//!
//! The heuristic is the Euclidean (4-connected) or Chebyshev (8-connected) distance to the
//! target times the cheapest possible step on the surface, so it never overestimates and the
//! first time the target is popped its cost is optimal. Queue ties are broken by lowest cell id.

use crate::config::{Connectivity, PlannerConfig};
use crate::error::{PlanningError, Result};
use crate::grid::{orthogonal_neighbours, Coord};
use crate::planner::{PlanRequest, RouteCost, RoutePlan};
use crate::risk::RiskSurface;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tracing::{debug, trace};

/// Search state: a cell at a (clamped) time step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct StateKey {
    cell: usize,
    step: u64,
}

#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    f: f64,
    g: f64,
    key: StateKey,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f
            .total_cmp(&other.f)
            .then_with(|| self.key.cell.cmp(&other.key.cell))
            .then_with(|| self.key.step.cmp(&other.key.step))
    }
}

/// Risk-aware shortest path planner
///
/// Stateless apart from its configuration, so one planner can serve concurrent searches
/// against the same frozen [`RiskSurface`].
#[derive(Debug, Clone)]
pub struct PathPlanner {
    config: PlannerConfig,
}

impl PathPlanner {
    pub fn new(config: PlannerConfig) -> Result<Self> {
        config.validate()?;
        Ok(PathPlanner { config })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Minimum-cost route for a request over a surface
    ///
    /// # Errors
    /// * `InvalidConfiguration` - start or target outside the grid, or a negative ceiling
    /// * `NoPathFound` - target blocked, above the ceiling, or unreachable
    /// * `PlanningTimeout` - the request's cancel token fired or its deadline passed
    pub fn plan(&self, surface: &RiskSurface, request: &PlanRequest) -> Result<RoutePlan> {
        let start = request.start;
        let target = request.target;
        for (name, coord) in [("start", start), ("target", target)] {
            if !surface.contains(coord) {
                return Err(PlanningError::config(format!(
                    "{name} {coord} is outside the {}x{} grid",
                    surface.width(),
                    surface.height()
                )));
            }
        }
        let ceiling = request
            .risk_ceiling
            .unwrap_or(self.config.default_risk_ceiling);
        if ceiling.is_nan() || ceiling < 0.0 {
            return Err(PlanningError::config(format!(
                "risk ceiling must be non-negative, got {ceiling}"
            )));
        }

        let no_path = || PlanningError::NoPathFound {
            from: start,
            to: target,
        };
        let start_id = surface.cell_id(start);
        let target_id = surface.cell_id(target);
        if !enterable(surface, target_id, ceiling) {
            return Err(no_path());
        }
        let excluded: FxHashSet<(usize, u64)> = request
            .exclusions
            .iter()
            .filter(|r| r.step > 0 && surface.contains(r.cell))
            .map(|r| (surface.cell_id(r.cell), r.step))
            .collect();
        if start_id == target_id && !excluded.contains(&(target_id, 1)) {
            return Ok(self.build_plan(surface, request, ceiling, vec![start_id]));
        }
        let horizon = excluded.iter().map(|&(_, step)| step).max().map_or(0, |s| s + 1);

        let weights = request.weights;
        let step_secs = self.config.seconds_per_cell;
        let floor = surface.min_cost();
        let step_floor = weights.combine(step_secs, floor, 1.0 + floor);
        let heuristic = |coord: Coord| -> f64 {
            let distance = match self.config.connectivity {
                Connectivity::Four => coord.euclidean(&target),
                Connectivity::Eight => coord.chebyshev(&target) as f64,
            };
            distance * step_floor
        };

        let start_key = StateKey {
            cell: start_id,
            step: 0,
        };
        let mut open = BinaryHeap::new();
        let mut best: FxHashMap<StateKey, f64> = FxHashMap::default();
        let mut parent: FxHashMap<StateKey, StateKey> = FxHashMap::default();
        let mut closed: FxHashSet<StateKey> = FxHashSet::default();
        best.insert(start_key, 0.0);
        open.push(Reverse(OpenEntry {
            f: heuristic(start),
            g: 0.0,
            key: start_key,
        }));

        let interval = self.config.cancellation_check_interval;
        let mut expanded = 0usize;
        let mut successors: Vec<(usize, f64)> = Vec::with_capacity(9);

        while let Some(Reverse(entry)) = open.pop() {
            if expanded % interval == 0 && request.is_cancelled() {
                debug!(
                    "Planning for agent {} cancelled after {} expansions",
                    request.agent, expanded
                );
                return Err(PlanningError::PlanningTimeout { expanded });
            }
            if !closed.insert(entry.key) {
                continue;
            }
            expanded += 1;

            if entry.key.cell == target_id && !excluded.contains(&(target_id, entry.key.step + 1)) {
                let mut path = vec![entry.key.cell];
                let mut key = entry.key;
                while let Some(&previous) = parent.get(&key) {
                    path.push(previous.cell);
                    key = previous;
                }
                path.reverse();
                trace!("A* expanded {} states", expanded);
                return Ok(self.build_plan(surface, request, ceiling, path));
            }

            let coord = surface.coord_of(entry.key.cell);
            let raw_step = entry.key.step + 1;
            let next_step = raw_step.min(horizon);

            successors.clear();
            for (next, distance) in self.neighbours(surface, coord) {
                let id = surface.cell_id(next);
                if enterable(surface, id, ceiling) {
                    let (time, risk, energy) =
                        move_components(surface, id, distance, step_secs, request);
                    successors.push((id, weights.combine(time, risk, energy)));
                }
            }
            if entry.key.step < horizon {
                let cell = entry.key.cell;
                successors.push((cell, weights.combine(step_secs, surface.cost_at(cell), 0.0)));
            }

            for &(id, edge) in &successors {
                if excluded.contains(&(id, raw_step)) {
                    continue;
                }
                let key = StateKey {
                    cell: id,
                    step: next_step,
                };
                if closed.contains(&key) {
                    continue;
                }
                let tentative = entry.g + edge;
                if tentative < best.get(&key).copied().unwrap_or(f64::INFINITY) {
                    best.insert(key, tentative);
                    parent.insert(key, entry.key);
                    open.push(Reverse(OpenEntry {
                        f: tentative + heuristic(surface.coord_of(id)),
                        g: tentative,
                        key,
                    }));
                }
            }
        }

        debug!(
            "No path for agent {} from {} to {} (ceiling {:.2}, {} expansions)",
            request.agent, start, target, ceiling, expanded
        );
        Err(no_path())
    }

    /// Adjacent cells with their step distance, in ascending cell-id order
    fn neighbours(&self, surface: &RiskSurface, coord: Coord) -> Vec<(Coord, f64)> {
        match self.config.connectivity {
            Connectivity::Four => orthogonal_neighbours(coord, surface.width(), surface.height())
                .map(|c| (c, 1.0))
                .collect(),
            Connectivity::Eight => {
                let mut out = Vec::with_capacity(8);
                for dr in -1_i64..=1 {
                    for dc in -1_i64..=1 {
                        if dr == 0 && dc == 0 {
                            continue;
                        }
                        let row = coord.row as i64 + dr;
                        let col = coord.col as i64 + dc;
                        if row < 0
                            || col < 0
                            || row >= surface.height() as i64
                            || col >= surface.width() as i64
                        {
                            continue;
                        }
                        let next = Coord::new(row as usize, col as usize);
                        if dr != 0 && dc != 0 {
                            // No squeezing diagonally past a blocked corner
                            let side_a = Coord::new(coord.row, next.col);
                            let side_b = Coord::new(next.row, coord.col);
                            if surface.is_blocked(side_a) || surface.is_blocked(side_b) {
                                continue;
                            }
                            out.push((next, std::f64::consts::SQRT_2));
                        } else {
                            out.push((next, 1.0));
                        }
                    }
                }
                out
            }
        }
    }

    /// Assemble a plan and recompute its cost components along the path
    fn build_plan(
        &self,
        surface: &RiskSurface,
        request: &PlanRequest,
        ceiling: f64,
        path: Vec<usize>,
    ) -> RoutePlan {
        let step_secs = self.config.seconds_per_cell;
        let mut cost = RouteCost::default();
        let mut wait_steps = 0;
        for pair in path.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            if from == to {
                wait_steps += 1;
                cost.time += step_secs;
                cost.risk += surface.cost_at(to);
            } else {
                let a = surface.coord_of(from);
                let b = surface.coord_of(to);
                let distance = if a.row != b.row && a.col != b.col {
                    std::f64::consts::SQRT_2
                } else {
                    1.0
                };
                let (time, risk, energy) = move_components(surface, to, distance, step_secs, request);
                cost.time += time;
                cost.risk += risk;
                cost.energy += energy;
            }
        }
        cost.total = request.weights.combine(cost.time, cost.risk, cost.energy);

        let waypoints: Vec<Coord> = path.into_iter().map(|id| surface.coord_of(id)).collect();
        debug!(
            "Route for agent {} {} -> {}: {} steps, {} waits, total {:.3}",
            request.agent,
            request.start,
            request.target,
            waypoints.len() - 1,
            wait_steps,
            cost.total
        );
        RoutePlan {
            agent: request.agent,
            target: request.target,
            waypoints,
            cost,
            weights: request.weights,
            risk_ceiling: ceiling,
            mobility: request.mobility,
            departure_step: request.departure_step,
            wait_steps,
            step_secs,
            surface_revision: surface.revision(),
            valid: true,
            progress: 0,
        }
    }
}

/// Cell can be entered under a hard risk ceiling (strictly greater is excluded)
#[inline]
fn enterable(surface: &RiskSurface, id: usize, ceiling: f64) -> bool {
    !surface.blocked_at(id) && surface.cost_at(id) <= ceiling
}

/// `(time, risk, energy)` of moving `distance` into cell `to`
#[inline]
fn move_components(
    surface: &RiskSurface,
    to: usize,
    distance: f64,
    step_secs: f64,
    request: &PlanRequest,
) -> (f64, f64, f64) {
    let risk = surface.cost_at(to);
    let factor = surface.terrain_at(to).energy_factor(request.mobility);
    (distance * step_secs, risk, distance * factor * (1.0 + risk))
}
