//! Space-time conflict resolution between route plans
//!
//! Plans are admitted one at a time in priority order into a reservation table of
//! `(cell, step)` pairs, including the step each agent spends on its target completing the
//! rescue. Sharing a cell at a step and swapping two cells head-on over one
//! step both count as collisions. A plan that collides with an admitted one first waits in place
//! (bounded holds), then plans again with the contested cell reserved at that step (bounded
//! re-routes), and is otherwise rejected with `AllocationDeadlock`.

use crate::agent::AgentId;
use crate::config::CoordinatorConfig;
use crate::decision::{ConflictAction, DecisionLog, DecisionRecord};
use crate::error::{PlanningError, Result};
use crate::grid::Coord;
use crate::planner::{PathPlanner, PlanRequest, Reservation, RoutePlan};
use crate::risk::RiskSurface;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

/// First collision found on a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Conflict {
    /// Waypoint index; one past the last waypoint for the dwell on the target
    pub index: usize,
    pub step: u64,
    pub cell: Coord,
    pub blocking_agent: AgentId,
}

/// Cells claimed by admitted plans, per absolute step
#[derive(Debug, Default)]
pub(crate) struct ReservationTable {
    claims: FxHashMap<(Coord, u64), AgentId>,
}

impl ReservationTable {
    pub fn reserve(&mut self, plan: &RoutePlan, from_step: u64) {
        for (step, cell) in plan.occupancy_from(from_step) {
            self.claims.insert((cell, step), plan.agent());
        }
    }

    /// Earliest step at which the plan shares a cell with an admitted plan, or swaps cells
    /// head-on with one
    pub fn first_conflict(&self, plan: &RoutePlan, from_step: u64) -> Option<Conflict> {
        let agent = plan.agent();
        let mut previous: Option<Coord> = None;
        for (step, cell) in plan.occupancy_from(from_step) {
            let conflict = |blocking_agent| Conflict {
                index: (step - plan.departure_step()) as usize,
                step,
                cell,
                blocking_agent,
            };
            if let Some(owner) = self.owner(cell, step, agent) {
                return Some(conflict(owner));
            }
            if let Some(from) = previous.filter(|&from| from != cell) {
                let leaving = self.owner(cell, step - 1, agent);
                if leaving.is_some() && leaving == self.owner(from, step, agent) {
                    return leaving.map(conflict);
                }
            }
            previous = Some(cell);
        }
        None
    }

    fn owner(&self, cell: Coord, step: u64, agent: AgentId) -> Option<AgentId> {
        self.claims
            .get(&(cell, step))
            .copied()
            .filter(|&owner| owner != agent)
    }
}

pub(crate) struct ConflictResolver<'a> {
    planner: &'a PathPlanner,
    surface: &'a RiskSurface,
    config: &'a CoordinatorConfig,
    now: u64,
    table: ReservationTable,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(
        planner: &'a PathPlanner,
        surface: &'a RiskSurface,
        config: &'a CoordinatorConfig,
        now: u64,
    ) -> Self {
        ConflictResolver {
            planner,
            surface,
            config,
            now,
            table: ReservationTable::default(),
        }
    }

    /// Admit a plan without checking it (already-resolved active plans)
    pub fn reserve(&mut self, plan: &RoutePlan) {
        self.table.reserve(plan, self.now);
    }

    /// Make a plan conflict-free against everything admitted so far and admit it
    pub fn resolve(&mut self, mut plan: RoutePlan, log: &mut DecisionLog) -> Result<RoutePlan> {
        let agent = plan.agent();
        let mut holds = 0;
        let mut reroutes = 0;
        let mut exclusions: Vec<Reservation> = Vec::new();

        while let Some(conflict) = self.table.first_conflict(&plan, self.now) {
            let record = |action| DecisionRecord::Conflict {
                agent,
                blocking_agent: conflict.blocking_agent,
                cell: conflict.cell,
                step: conflict.step,
                action,
            };

            // A clash on the dwell step is cleared by delaying the final move
            let hold_index = conflict.index.min(plan.waypoints().len() - 1);
            if hold_index > 0 && holds < self.config.max_holds {
                let dwell = self.surface.cost(plan.waypoints()[hold_index - 1]);
                if plan.hold_at(hold_index, dwell) {
                    holds += 1;
                    debug!(
                        "Agent {} holds before {} at step {} (blocked by agent {})",
                        agent, conflict.cell, conflict.step, conflict.blocking_agent
                    );
                    log.push(record(ConflictAction::Hold));
                    continue;
                }
            }

            if conflict.index > 0 && reroutes < self.config.max_conflict_reroutes {
                reroutes += 1;
                exclusions.push(Reservation::new(
                    conflict.cell,
                    conflict.step - plan.departure_step(),
                ));
                let request = PlanRequest::new(agent, plan.start(), plan.target())
                    .mobility(plan.mobility())
                    .objective(plan.weights())
                    .risk_ceiling(plan.risk_ceiling())
                    .departure_step(plan.departure_step())
                    .exclusions(exclusions.iter().copied());
                match self.planner.plan(self.surface, &request) {
                    Ok(rerouted) => {
                        debug!(
                            "Agent {} re-routed around {} at step {}",
                            agent, conflict.cell, conflict.step
                        );
                        log.push(record(ConflictAction::Reroute));
                        plan = rerouted;
                        continue;
                    }
                    Err(err) if !err.is_recoverable() => return Err(err),
                    Err(_) => {}
                }
            }

            let attempts = holds + reroutes;
            warn!(
                "Conflict deadlock for agent {} at {} step {} after {} attempts",
                agent, conflict.cell, conflict.step, attempts
            );
            log.push(record(ConflictAction::Deadlock));
            return Err(PlanningError::AllocationDeadlock { agent, attempts });
        }

        self.table.reserve(&plan, self.now);
        Ok(plan)
    }
}
