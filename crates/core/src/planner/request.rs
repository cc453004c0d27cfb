//! Planning requests, time-step reservations and cancellation

use crate::agent::{Agent, AgentId, Mobility};
use crate::grid::Coord;
use crate::planner::{ObjectiveWeights, PlanningObjective};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A cell that may not be occupied at a given step of the route
///
/// Steps are relative to the route's departure: step 0 is the start cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reservation {
    pub cell: Coord,
    pub step: u64,
}

impl Reservation {
    pub const fn new(cell: Coord, step: u64) -> Self {
        Reservation { cell, step }
    }
}

/// Shared flag an orchestrator flips to abort a running search
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One route query
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub(crate) agent: AgentId,
    pub(crate) start: Coord,
    pub(crate) target: Coord,
    pub(crate) mobility: Mobility,
    pub(crate) weights: ObjectiveWeights,
    /// `None` uses the planner's default ceiling
    pub(crate) risk_ceiling: Option<f64>,
    pub(crate) exclusions: Vec<Reservation>,
    pub(crate) departure_step: u64,
    pub(crate) cancel: Option<CancelToken>,
    pub(crate) deadline: Option<Instant>,
}

impl PlanRequest {
    pub fn new(agent: AgentId, start: Coord, target: Coord) -> Self {
        PlanRequest {
            agent,
            start,
            target,
            mobility: Mobility::Ground,
            weights: PlanningObjective::default().weights(),
            risk_ceiling: None,
            exclusions: Vec::new(),
            departure_step: 0,
            cancel: None,
            deadline: None,
        }
    }

    /// Route from an agent's current position with its mobility
    pub fn for_agent(agent: &Agent, target: Coord) -> Self {
        Self::new(agent.id(), agent.location(), target).mobility(agent.mobility())
    }

    pub fn mobility(mut self, mobility: Mobility) -> Self {
        self.mobility = mobility;
        self
    }

    pub fn objective(mut self, weights: ObjectiveWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn risk_ceiling(mut self, ceiling: f64) -> Self {
        self.risk_ceiling = Some(ceiling);
        self
    }

    pub fn maybe_risk_ceiling(mut self, ceiling: Option<f64>) -> Self {
        self.risk_ceiling = ceiling;
        self
    }

    pub fn exclude(mut self, reservation: Reservation) -> Self {
        self.exclusions.push(reservation);
        self
    }

    pub fn exclusions(mut self, reservations: impl IntoIterator<Item = Reservation>) -> Self {
        self.exclusions.extend(reservations);
        self
    }

    /// Absolute motion step at which the agent leaves `start`
    pub fn departure_step(mut self, step: u64) -> Self {
        self.departure_step = step;
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn agent(&self) -> AgentId {
        self.agent
    }

    pub fn start(&self) -> Coord {
        self.start
    }

    pub fn target(&self) -> Coord {
        self.target
    }

    pub fn weights(&self) -> ObjectiveWeights {
        self.weights
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let request = PlanRequest::new(AgentId(1), Coord::new(0, 0), Coord::new(1, 1))
            .cancel_token(token.clone());
        assert!(!request.is_cancelled());
        token.cancel();
        assert!(request.is_cancelled());
    }

    #[test]
    fn test_expired_deadline_cancels() {
        let past = Instant::now()
            .checked_sub(Duration::from_millis(5))
            .unwrap_or_else(Instant::now);
        let request =
            PlanRequest::new(AgentId(1), Coord::new(0, 0), Coord::new(1, 1)).deadline(past);
        assert!(request.is_cancelled());
    }

    #[test]
    fn test_builder_defaults() {
        let request = PlanRequest::new(AgentId(2), Coord::new(0, 0), Coord::new(3, 3))
            .exclude(Reservation::new(Coord::new(1, 1), 2));
        assert_eq!(request.weights(), PlanningObjective::MinimizeRiskExposure.weights());
        assert_eq!(request.risk_ceiling, None);
        assert_eq!(request.exclusions.len(), 1);
    }
}
