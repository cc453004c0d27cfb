//! Route plans produced by the path planner

use crate::agent::{AgentId, Mobility};
use crate::grid::{ChangeSet, Coord};
use crate::planner::ObjectiveWeights;
use serde::{Deserialize, Serialize};

/// Per-component cost totals of a route
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteCost {
    /// Seconds of travel, waits included
    pub time: f64,
    /// Sum of risk costs of the cells entered or waited in
    pub risk: f64,
    pub energy: f64,
    /// Weighted total under the route's objective
    pub total: f64,
}

/// Ordered waypoint sequence for one agent
///
/// Waypoint `i` is occupied at absolute motion step `departure_step + i`; a repeated
/// waypoint is a wait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub(crate) agent: AgentId,
    pub(crate) target: Coord,
    pub(crate) waypoints: Vec<Coord>,
    pub(crate) cost: RouteCost,
    pub(crate) weights: ObjectiveWeights,
    pub(crate) risk_ceiling: f64,
    pub(crate) mobility: Mobility,
    pub(crate) departure_step: u64,
    pub(crate) wait_steps: u32,
    pub(crate) step_secs: f64,
    /// Risk surface revision the route was computed against
    pub(crate) surface_revision: u64,
    pub(crate) valid: bool,
    /// Index of the waypoint the agent currently stands on
    pub(crate) progress: usize,
}

impl RoutePlan {
    pub fn agent(&self) -> AgentId {
        self.agent
    }

    pub fn target(&self) -> Coord {
        self.target
    }

    pub fn start(&self) -> Coord {
        self.waypoints[0]
    }

    pub fn waypoints(&self) -> &[Coord] {
        &self.waypoints
    }

    /// Waypoints not yet reached, current position first
    pub fn remaining(&self) -> &[Coord] {
        &self.waypoints[self.progress..]
    }

    pub fn cost(&self) -> RouteCost {
        self.cost
    }

    pub fn weights(&self) -> ObjectiveWeights {
        self.weights
    }

    pub fn risk_ceiling(&self) -> f64 {
        self.risk_ceiling
    }

    pub fn mobility(&self) -> Mobility {
        self.mobility
    }

    pub fn departure_step(&self) -> u64 {
        self.departure_step
    }

    /// Motion step at which the target is reached
    pub fn arrival_step(&self) -> u64 {
        self.departure_step + (self.waypoints.len() as u64 - 1)
    }

    pub fn wait_steps(&self) -> u32 {
        self.wait_steps
    }

    pub fn surface_revision(&self) -> u64 {
        self.surface_revision
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn is_complete(&self) -> bool {
        self.progress + 1 >= self.waypoints.len()
    }

    /// Cell the route occupies at an absolute step (clamped to start and target)
    pub fn cell_at_step(&self, step: u64) -> Coord {
        let index = step.saturating_sub(self.departure_step) as usize;
        self.waypoints[index.min(self.waypoints.len() - 1)]
    }

    /// Step after arrival, spent on the target completing the rescue
    pub fn dwell_step(&self) -> u64 {
        self.arrival_step() + 1
    }

    /// `(absolute step, cell)` pairs from `from_step` through the dwell step on the target
    pub fn occupancy_from(&self, from_step: u64) -> impl Iterator<Item = (u64, Coord)> + '_ {
        let departure = self.departure_step;
        self.waypoints
            .iter()
            .enumerate()
            .map(move |(i, &cell)| (departure + i as u64, cell))
            .chain(std::iter::once((self.dwell_step(), self.target)))
            .filter(move |&(step, _)| step >= from_step)
    }

    /// Whether any not-yet-reached waypoint lies in a change set
    pub fn crosses(&self, changes: &ChangeSet) -> bool {
        self.remaining().iter().any(|&cell| changes.contains(cell))
    }

    /// Wait one step at waypoint `index - 1` before moving on to waypoint `index`
    ///
    /// `dwell_risk` is the risk cost of the cell waited in. Returns false when `index` does not
    /// name a move that can be delayed.
    pub(crate) fn hold_at(&mut self, index: usize, dwell_risk: f64) -> bool {
        if index == 0 || index >= self.waypoints.len() {
            return false;
        }
        let previous = self.waypoints[index - 1];
        self.waypoints.insert(index, previous);
        self.wait_steps += 1;
        self.cost.time += self.step_secs;
        self.cost.risk += dwell_risk;
        self.cost.total = self
            .weights
            .combine(self.cost.time, self.cost.risk, self.cost.energy);
        true
    }

    /// Record that the agent stands on the waypoint for `step`
    pub(crate) fn advance_to(&mut self, step: u64) {
        let index = step.saturating_sub(self.departure_step) as usize;
        self.progress = index.min(self.waypoints.len() - 1);
    }
}
