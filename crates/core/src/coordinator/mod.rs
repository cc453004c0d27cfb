//! Mission coordinator
//!
//! Single writer for one mission's planning state: the grid, the current risk surface, the
//! active route plans and the per-agent task states. Every mutation (tick, hazard injection,
//! allocation, re-planning, execution) goes through `&mut self`, so no operation can observe a
//! half-updated surface. Victims and agents stay owned by the caller's mission aggregate and
//! are passed in by reference.
//!
//! Within one allocation round the candidate routes are costed in parallel against a frozen
//! surface; everything after that (strategy, conflict resolution, state changes) runs
//! sequentially in priority order, so results do not depend on thread scheduling.

pub mod allocation;
pub(crate) mod conflict;
pub mod execution;
pub mod replan;
pub mod task_state;

pub use allocation::{AllocationStrategy, Assignment, CandidateTable, GreedyAuction, MinCostMatching};
pub use execution::ExecutionReport;
pub use replan::ReplanOutcome;
pub use task_state::TaskState;

use crate::agent::{Agent, AgentId, AgentStatus, DisableReason};
use crate::config::{AllocationStrategyKind, EngineConfig};
use crate::decision::{DecisionLog, DecisionRecord};
use crate::error::{PlanningError, Result};
use crate::grid::{ChangeSet, Coord, GridEnvironment, HazardEvent};
use crate::planner::{ObjectiveWeights, PathPlanner, PlanRequest, RoutePlan};
use crate::prioritizer::{OrderedVictimList, Prioritizer};
use crate::risk::{RiskLevel, RiskSurface};
use crate::victim::{VictimId, VictimRegistry, VictimStatus};
use conflict::ConflictResolver;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Result of one allocation round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationOutcome {
    /// Conflict-free plans created this round
    pub plans: Vec<RoutePlan>,
    /// Victims still pending after the round
    pub unresolved: Vec<VictimId>,
    /// Agents disabled for the round by conflict deadlock
    pub deadlocked: Vec<AgentId>,
}

/// Plans and coordinates agents for one mission
#[derive(Debug)]
pub struct Coordinator {
    config: EngineConfig,
    environment: GridEnvironment,
    surface: RiskSurface,
    planner: PathPlanner,
    prioritizer: Prioritizer,
    strategy: Box<dyn AllocationStrategy>,
    plans: BTreeMap<AgentId, RoutePlan>,
    tasks: BTreeMap<AgentId, TaskState>,
    /// Discrete motion step; route waypoints are indexed against it
    step: u64,
    decisions: DecisionLog,
}

impl Coordinator {
    /// Take ownership of an initialized grid
    ///
    /// Fails with `InvalidGridState` for an uninitialized grid and `InvalidConfiguration` for
    /// an invalid configuration.
    pub fn new(environment: GridEnvironment, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let surface = environment.risk_surface()?;
        let planner = PathPlanner::new(config.planner.clone())?;
        let prioritizer = Prioritizer::new(config.priority, planner.clone())?;
        let strategy: Box<dyn AllocationStrategy> = match config.coordinator.strategy {
            AllocationStrategyKind::Greedy => Box::new(GreedyAuction),
            AllocationStrategyKind::MinCostMatching => Box::new(MinCostMatching),
        };
        info!(
            "Coordinator ready on {}x{} grid ({} allocation, objective {})",
            surface.width(),
            surface.height(),
            strategy.name(),
            config.coordinator.objective
        );
        Ok(Coordinator {
            config,
            environment,
            surface,
            planner,
            prioritizer,
            strategy,
            plans: BTreeMap::new(),
            tasks: BTreeMap::new(),
            step: 0,
            decisions: DecisionLog::default(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn environment(&self) -> &GridEnvironment {
        &self.environment
    }

    /// Risk surface every planning call of this mission currently reads
    pub fn surface(&self) -> &RiskSurface {
        &self.surface
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn set_strategy(&mut self, strategy: Box<dyn AllocationStrategy>) {
        self.strategy = strategy;
    }

    /// Active plans in agent id order
    pub fn plans(&self) -> impl Iterator<Item = &RoutePlan> {
        self.plans.values()
    }

    pub fn plan(&self, agent: AgentId) -> Option<&RoutePlan> {
        self.plans.get(&agent)
    }

    pub fn task_state(&self, agent: AgentId) -> TaskState {
        self.tasks.get(&agent).copied().unwrap_or_default()
    }

    pub fn decisions(&self) -> &[DecisionRecord] {
        self.decisions.records()
    }

    /// Drain the decision log for an explanation consumer
    pub fn take_decisions(&mut self) -> Vec<DecisionRecord> {
        self.decisions.take()
    }

    /// Add a hazard and refresh the risk surface
    pub fn inject_hazard(&mut self, event: HazardEvent) -> Result<ChangeSet> {
        let changes = self.environment.apply_hazard_event(event)?;
        self.surface = self.environment.risk_surface()?;
        info!(
            "Hazard injected: {} cells changed (revision {})",
            changes.len(),
            changes.revision
        );
        Ok(changes)
    }

    /// Advance hazard time and refresh the risk surface
    pub fn tick(&mut self, dt: f64) -> Result<ChangeSet> {
        let changes = self.environment.tick(dt)?;
        self.surface = self.environment.risk_surface()?;
        Ok(changes)
    }

    /// Score pending victims against the current surface and log the breakdowns
    pub fn score_victims(
        &mut self,
        victims: &mut VictimRegistry,
        agents: &[Agent],
    ) -> Result<OrderedVictimList> {
        let list = self
            .prioritizer
            .score_victims(victims, agents, &self.surface)?;
        for (rank, entry) in list.entries.iter().enumerate() {
            self.decisions.push(DecisionRecord::Priority {
                victim: entry.victim,
                rank,
                score: entry.score,
                breakdown: entry.breakdown,
            });
        }
        Ok(list)
    }

    /// Route from an agent's position to a target, departing at the current step
    ///
    /// `risk_ceiling` of `None` uses the planner default.
    pub fn plan_route(
        &self,
        agent: &Agent,
        target: Coord,
        weights: ObjectiveWeights,
        risk_ceiling: Option<f64>,
    ) -> Result<RoutePlan> {
        let request = PlanRequest::for_agent(agent, target)
            .objective(weights)
            .maybe_risk_ceiling(risk_ceiling)
            .departure_step(self.step);
        self.planner.plan(&self.surface, &request)
    }

    /// Run one allocation round
    ///
    /// Agents disabled by a deadlock in the previous round are re-enabled first. Pending
    /// victims are re-scored, every capable (victim, available agent) pair is costed in
    /// parallel, the strategy pairs them up, and the new plans are made conflict-free in
    /// victim priority order against the plans already active. A victim nobody can reach
    /// stays pending; a plan that cannot be made conflict-free disables its agent for the
    /// round. Only non-recoverable errors abort the round.
    pub fn allocate_and_plan(
        &mut self,
        victims: &mut VictimRegistry,
        agents: &mut [Agent],
    ) -> Result<AllocationOutcome> {
        for agent in agents.iter_mut() {
            if agent.disable_reason() == Some(DisableReason::Deadlock) {
                agent.release();
                self.set_task(agent.id(), TaskState::Idle);
                debug!("Agent {} re-enabled after last round's deadlock", agent.id());
            }
        }

        let ordered = self.score_victims(victims, agents)?;
        let mut available: Vec<AgentId> = agents
            .iter()
            .filter(|a| a.is_available() && self.task_state(a.id()) == TaskState::Idle)
            .map(Agent::id)
            .collect();
        available.sort_unstable();

        let weights = self.config.coordinator.objective.weights();
        let mut pairs: Vec<(VictimId, AgentId, PlanRequest)> = Vec::new();
        for entry in &ordered.entries {
            let Some(victim) = victims.get(entry.victim) else {
                continue;
            };
            for agent in agents.iter().filter(|a| available.contains(&a.id())) {
                if agent.can_serve(victim) {
                    let request = PlanRequest::for_agent(agent, victim.location())
                        .objective(weights)
                        .departure_step(self.step);
                    pairs.push((victim.id(), agent.id(), request));
                }
            }
        }

        // Frozen surface: workers only read it
        let planner = &self.planner;
        let surface = &self.surface;
        let routes: Vec<Result<RoutePlan>> = pairs
            .par_iter()
            .map(|(_, _, request)| planner.plan(surface, request))
            .collect();

        let mut table = CandidateTable::default();
        for ((victim, agent, _), route) in pairs.into_iter().zip(routes) {
            if let Err(err) = &route {
                if !err.is_recoverable() {
                    return Err(err.clone());
                }
            }
            table.insert(victim, agent, route);
        }

        let order: Vec<VictimId> = ordered.ids().collect();
        let assignments = self.strategy.assign(&order, &available, &table);
        for &victim in &order {
            let assigned = assignments
                .iter()
                .find(|a| a.victim == victim)
                .map(|a| a.agent);
            self.decisions.push(DecisionRecord::Allocation {
                victim,
                strategy: self.strategy.name().to_string(),
                assigned,
                candidates: table.bids(victim, &available),
            });
        }

        let mut admitted = Vec::new();
        let mut deadlocked = Vec::new();
        {
            let mut resolver = ConflictResolver::new(
                &self.planner,
                &self.surface,
                &self.config.coordinator,
                self.step,
            );
            for plan in self.plans.values() {
                resolver.reserve(plan);
            }
            for assignment in &assignments {
                let Some(plan) = table.take_plan(assignment.victim, assignment.agent) else {
                    continue;
                };
                match resolver.resolve(plan, &mut self.decisions) {
                    Ok(plan) => admitted.push((*assignment, plan)),
                    Err(PlanningError::AllocationDeadlock { .. }) => deadlocked.push(*assignment),
                    Err(err) => return Err(err),
                }
            }
        }

        let mut outcome = AllocationOutcome::default();
        for (assignment, plan) in admitted {
            let agent = find_agent(agents, assignment.agent)?;
            let victim = victims.get_mut(assignment.victim).ok_or_else(|| {
                PlanningError::config(format!("victim {} is not registered", assignment.victim))
            })?;
            victim.status = VictimStatus::Assigned;
            victim.assigned_agent = Some(agent.id());
            agent.task = Some(victim.id());
            agent.status = AgentStatus::EnRoute;
            self.set_task(agent.id(), TaskState::Assigned);
            self.set_task(agent.id(), TaskState::EnRoute);
            self.log_route(&plan, assignment.victim);
            self.plans.insert(agent.id(), plan.clone());
            outcome.plans.push(plan);
        }
        for assignment in deadlocked {
            let agent = find_agent(agents, assignment.agent)?;
            self.set_task(agent.id(), TaskState::Assigned);
            self.disable_agent(agent, DisableReason::Deadlock);
            outcome.deadlocked.push(assignment.agent);
        }
        outcome.unresolved = victims.pending().map(|v| v.id()).collect();

        info!(
            "Allocation round at step {}: {} assigned, {} pending, {} deadlocked",
            self.step,
            outcome.plans.len(),
            outcome.unresolved.len(),
            outcome.deadlocked.len()
        );
        Ok(outcome)
    }

    /// Move an agent's task state, warning about transitions outside the state machine
    pub(crate) fn set_task(&mut self, agent: AgentId, next: TaskState) {
        let current = self.task_state(agent);
        if !current.can_transition_to(next) {
            warn!(
                "Agent {} task state {:?} -> {:?} is outside the state machine",
                agent, current, next
            );
        }
        self.tasks.insert(agent, next);
    }

    /// Take an agent out of service and drop its plan
    pub(crate) fn disable_agent(&mut self, agent: &mut Agent, reason: DisableReason) {
        warn!("Agent {} disabled: {:?}", agent.id(), reason);
        self.plans.remove(&agent.id());
        self.set_task(agent.id(), TaskState::Disabled);
        agent.disable(reason);
        self.decisions.push(DecisionRecord::AgentDisabled {
            agent: agent.id(),
            reason,
        });
    }

    pub(crate) fn log_route(&mut self, plan: &RoutePlan, victim: VictimId) {
        let peak = plan
            .waypoints()
            .iter()
            .map(|&c| self.surface.cost(c))
            .fold(0.0_f64, f64::max);
        let peak_risk = RiskLevel::classify(peak, self.config.risk.level_thresholds);
        self.decisions.push(DecisionRecord::Route {
            agent: plan.agent(),
            victim,
            cost: plan.cost(),
            steps: plan.waypoints().len() - 1,
            wait_steps: plan.wait_steps(),
            peak_risk,
        });
    }
}

/// Agent by id in the caller's agent set
pub(crate) fn find_agent(agents: &mut [Agent], id: AgentId) -> Result<&mut Agent> {
    agents
        .iter_mut()
        .find(|a| a.id() == id)
        .ok_or_else(|| PlanningError::config(format!("agent {id} is not part of this mission")))
}

/// Return a victim to the pending pool
pub(crate) fn release_victim(victims: &mut VictimRegistry, id: Option<VictimId>) {
    if let Some(victim) = id.and_then(|id| victims.get_mut(id)) {
        if victim.status == VictimStatus::Assigned {
            victim.status = VictimStatus::Pending;
            victim.assigned_agent = None;
            victim.mark_stale();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Mobility;
    use crate::config::RiskConfig;
    use crate::grid::{HazardType, Terrain};
    use crate::victim::Victim;

    fn coordinator(width: usize, height: usize) -> Coordinator {
        let env = GridEnvironment::new(width, height, 9, RiskConfig::default()).unwrap();
        Coordinator::new(env, EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_uninitialized_grid_rejected() {
        let result = Coordinator::new(GridEnvironment::uninitialized(), EngineConfig::default());
        assert!(matches!(result, Err(PlanningError::InvalidGridState(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let env = GridEnvironment::new(3, 3, 1, RiskConfig::default()).unwrap();
        let mut config = EngineConfig::default();
        config.priority.severity = 0.9;
        assert!(matches!(
            Coordinator::new(env, config),
            Err(PlanningError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_single_assignment_updates_state() {
        let mut coordinator = coordinator(5, 5);
        let mut agents = vec![Agent::new(AgentId(1), Coord::new(0, 0), Mobility::Ground)];
        let mut victims: VictimRegistry =
            [Victim::new(VictimId(1), Coord::new(4, 4), 3, 600.0).unwrap()]
                .into_iter()
                .collect();

        let outcome = coordinator.allocate_and_plan(&mut victims, &mut agents).unwrap();
        assert_eq!(outcome.plans.len(), 1);
        assert!(outcome.unresolved.is_empty());
        assert_eq!(agents[0].status(), AgentStatus::EnRoute);
        assert_eq!(agents[0].task(), Some(VictimId(1)));
        assert_eq!(coordinator.task_state(AgentId(1)), TaskState::EnRoute);

        let victim = victims.get(VictimId(1)).unwrap();
        assert_eq!(victim.status(), VictimStatus::Assigned);
        assert_eq!(victim.assigned_agent(), Some(AgentId(1)));
        assert!(victim.is_score_current(coordinator.surface().revision()));

        let kinds: Vec<&'static str> = coordinator
            .decisions()
            .iter()
            .map(|d| match d {
                DecisionRecord::Priority { .. } => "priority",
                DecisionRecord::Allocation { .. } => "allocation",
                DecisionRecord::Route { .. } => "route",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["priority", "allocation", "route"]);
    }

    #[test]
    fn test_capability_filter_leaves_victim_pending() {
        let mut coordinator = coordinator(4, 4);
        let mut agents = vec![Agent::new(AgentId(1), Coord::new(0, 0), Mobility::Ground)];
        let mut victims: VictimRegistry = [Victim::new(VictimId(1), Coord::new(3, 3), 4, 600.0)
            .unwrap()
            .with_required_mobility(Mobility::Aerial)]
        .into_iter()
        .collect();

        let outcome = coordinator.allocate_and_plan(&mut victims, &mut agents).unwrap();
        assert!(outcome.plans.is_empty());
        assert_eq!(outcome.unresolved, vec![VictimId(1)]);
        assert!(agents[0].is_available());
    }

    #[test]
    fn test_unreachable_victim_does_not_block_others() {
        let mut terrain = vec![Terrain::Open; 25];
        // Wall ring around (4, 4)
        for id in [18, 19, 23] {
            terrain[id] = Terrain::Wall;
        }
        let env = GridEnvironment::with_terrain(5, 5, terrain, 1, RiskConfig::default()).unwrap();
        let mut coordinator = Coordinator::new(env, EngineConfig::default()).unwrap();
        let mut agents = vec![
            Agent::new(AgentId(1), Coord::new(0, 0), Mobility::Ground),
            Agent::new(AgentId(2), Coord::new(0, 4), Mobility::Ground),
        ];
        let mut victims: VictimRegistry = [
            Victim::new(VictimId(1), Coord::new(4, 4), 5, 30.0).unwrap(),
            Victim::new(VictimId(2), Coord::new(2, 0), 1, 900.0).unwrap(),
        ]
        .into_iter()
        .collect();

        let outcome = coordinator.allocate_and_plan(&mut victims, &mut agents).unwrap();
        assert_eq!(outcome.plans.len(), 1);
        assert_eq!(outcome.plans[0].target(), Coord::new(2, 0));
        assert_eq!(outcome.unresolved, vec![VictimId(1)]);
    }

    #[test]
    fn test_inject_hazard_refreshes_surface() {
        let mut coordinator = coordinator(3, 3);
        let before = coordinator.surface().revision();
        let changes = coordinator
            .inject_hazard(HazardEvent::stationary(Coord::new(1, 1), HazardType::Flood, 1.0).unwrap())
            .unwrap();
        assert!(changes.contains(Coord::new(1, 1)));
        assert_eq!(coordinator.surface().revision(), before + 1);
        assert!((coordinator.surface().cost(Coord::new(1, 1)) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_plan_route_uses_requested_ceiling() {
        let mut coordinator = coordinator(3, 1);
        coordinator
            .inject_hazard(HazardEvent::stationary(Coord::new(0, 1), HazardType::Fire, 0.9).unwrap())
            .unwrap();
        let agent = Agent::new(AgentId(1), Coord::new(0, 0), Mobility::Ground);
        let weights = ObjectiveWeights::new(1.0, 1.0, 0.0).unwrap();
        assert!(coordinator
            .plan_route(&agent, Coord::new(0, 2), weights, Some(0.5))
            .is_err());
        let plan = coordinator
            .plan_route(&agent, Coord::new(0, 2), weights, None)
            .unwrap();
        assert_eq!(plan.waypoints().len(), 3);
    }

    #[test]
    fn test_take_decisions_drains() {
        let mut coordinator = coordinator(3, 3);
        let mut agents = vec![Agent::new(AgentId(1), Coord::new(0, 0), Mobility::Ground)];
        let mut victims: VictimRegistry =
            [Victim::new(VictimId(1), Coord::new(2, 2), 3, 600.0).unwrap()]
                .into_iter()
                .collect();
        coordinator.allocate_and_plan(&mut victims, &mut agents).unwrap();
        assert!(!coordinator.take_decisions().is_empty());
        assert!(coordinator.decisions().is_empty());
    }
}
