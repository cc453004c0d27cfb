//! Re-planning of routes invalidated by hazard changes
//!
//! Only plans whose not-yet-walked waypoints touch a changed cell are re-planned. Each attempt
//! starts from the agent's current cell at the current step and relaxes the risk ceiling by
//! `ceiling_relaxation`; a plan that still has no conflict-free route after
//! `max_reroute_attempts` disables its agent and returns the victim to the pending pool.

use super::conflict::ConflictResolver;
use super::{find_agent, release_victim, Coordinator, TaskState};
use crate::agent::{Agent, AgentId, DisableReason};
use crate::decision::{DecisionRecord, ReplanResult};
use crate::error::Result;
use crate::grid::ChangeSet;
use crate::planner::{PlanRequest, RoutePlan};
use crate::victim::VictimRegistry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Result of one re-planning pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplanOutcome {
    /// Agents whose plans crossed the change set
    pub invalidated: Vec<AgentId>,
    /// Replacement plans
    pub replanned: Vec<RoutePlan>,
    /// Agents left without a route
    pub disabled: Vec<AgentId>,
}

impl ReplanOutcome {
    pub fn is_empty(&self) -> bool {
        self.invalidated.is_empty()
    }
}

impl Coordinator {
    /// Re-plan every en-route plan that a change set touches
    ///
    /// Plans already marked invalid are picked up as well. Unaffected plans are left
    /// untouched and keep their reservations.
    pub fn replan_if_invalidated(
        &mut self,
        changes: &ChangeSet,
        victims: &mut VictimRegistry,
        agents: &mut [Agent],
    ) -> Result<ReplanOutcome> {
        let mut outcome = ReplanOutcome::default();
        let affected: Vec<AgentId> = self
            .plans
            .iter()
            .filter(|(&id, plan)| {
                self.task_state(id) == TaskState::EnRoute
                    && (!plan.is_valid() || plan.crosses(changes))
            })
            .map(|(&id, _)| id)
            .collect();
        if affected.is_empty() {
            return Ok(outcome);
        }

        for &id in &affected {
            if let Some(plan) = self.plans.get_mut(&id) {
                plan.invalidate();
            }
            self.set_task(id, TaskState::ReRouting);
            outcome.invalidated.push(id);
        }
        info!(
            "Hazard change at revision {} invalidated {} route(s)",
            changes.revision,
            affected.len()
        );

        for id in affected {
            let agent = find_agent(agents, id)?;
            let Some(previous) = self.plans.get(&id).cloned() else {
                continue;
            };
            let victim = agent.task();

            match self.replan_agent(agent, &previous)? {
                Some((plan, attempts)) => {
                    if let Some(victim) = victim {
                        self.decisions.push(DecisionRecord::Replan {
                            agent: id,
                            victim,
                            outcome: ReplanResult::Replanned {
                                attempts,
                                risk_ceiling: plan.risk_ceiling(),
                            },
                        });
                        self.log_route(&plan, victim);
                    }
                    self.plans.insert(id, plan.clone());
                    self.set_task(id, TaskState::EnRoute);
                    outcome.replanned.push(plan);
                }
                None => {
                    if let Some(victim) = victim {
                        self.decisions.push(DecisionRecord::Replan {
                            agent: id,
                            victim,
                            outcome: ReplanResult::Disabled {
                                attempts: self.config.coordinator.max_reroute_attempts,
                            },
                        });
                    }
                    release_victim(victims, victim);
                    self.disable_agent(agent, DisableReason::NoRoute);
                    outcome.disabled.push(id);
                }
            }
        }
        Ok(outcome)
    }

    /// Search for a conflict-free replacement of `previous` with an escalating risk ceiling
    fn replan_agent(&mut self, agent: &Agent, previous: &RoutePlan) -> Result<Option<(RoutePlan, u32)>> {
        let coordinator = &self.config.coordinator;
        for attempt in 0..coordinator.max_reroute_attempts {
            let ceiling = previous.risk_ceiling() * coordinator.ceiling_relaxation.powi(attempt as i32);
            let request = PlanRequest::for_agent(agent, previous.target())
                .objective(previous.weights())
                .risk_ceiling(ceiling)
                .departure_step(self.step);
            let plan = match self.planner.plan(&self.surface, &request) {
                Ok(plan) => plan,
                Err(err) if err.is_recoverable() => {
                    debug!(
                        "Re-plan attempt {} for agent {} at ceiling {:.3} failed: {}",
                        attempt + 1,
                        agent.id(),
                        ceiling,
                        err
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };

            let mut resolver =
                ConflictResolver::new(&self.planner, &self.surface, coordinator, self.step);
            for (other, active) in &self.plans {
                if *other != agent.id() && active.is_valid() {
                    resolver.reserve(active);
                }
            }
            match resolver.resolve(plan, &mut self.decisions) {
                Ok(plan) => return Ok(Some((plan, attempt + 1))),
                Err(err) if err.is_recoverable() => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }
}
