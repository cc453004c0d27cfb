//! Step-wise execution of active route plans
//!
//! One call advances the motion clock by one step. En-route agents move to the waypoint their
//! plan lists for the new step and pay the move's energy; an agent standing on its target
//! engages, and an engaged agent completes the rescue on the following step.

use super::{release_victim, Coordinator, TaskState};
use crate::agent::{Agent, AgentId, AgentStatus, DisableReason};
use crate::error::Result;
use crate::victim::{VictimId, VictimRegistry, VictimStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// What happened during one execution step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub step: u64,
    pub moved: Vec<AgentId>,
    /// Agents that reached their target this step
    pub arrived: Vec<AgentId>,
    pub rescued: Vec<VictimId>,
    pub disabled: Vec<AgentId>,
    /// Agents whose victim was lost before they arrived
    pub cancelled: Vec<AgentId>,
}

/// Per-agent result of walking one step
enum Walk {
    Waiting,
    Moved,
    Arrived { moved: bool },
    Failed(DisableReason),
}

impl Coordinator {
    /// Advance every active agent by one step
    pub fn advance_agents(
        &mut self,
        victims: &mut VictimRegistry,
        agents: &mut [Agent],
    ) -> Result<ExecutionReport> {
        self.step += 1;
        let step = self.step;
        let mut report = ExecutionReport {
            step,
            ..ExecutionReport::default()
        };

        for agent in agents.iter_mut() {
            let id = agent.id();
            match agent.status() {
                AgentStatus::Returning => {
                    agent.release();
                    continue;
                }
                AgentStatus::Idle | AgentStatus::Disabled => continue,
                AgentStatus::EnRoute | AgentStatus::Engaged => {}
            }
            if !self.plans.contains_key(&id) {
                continue;
            }

            let victim = agent.task();
            let lost = victim
                .and_then(|v| victims.get(v))
                .is_none_or(|v| v.status() == VictimStatus::Lost);
            if lost {
                debug!("Agent {} stands down: victim {:?} lost", id, victim);
                self.plans.remove(&id);
                self.set_task(id, TaskState::Idle);
                agent.release();
                report.cancelled.push(id);
                continue;
            }

            match self.task_state(id) {
                TaskState::Engaged => {
                    if let Some(v) = victim.and_then(|v| victims.get_mut(v)) {
                        v.status = VictimStatus::Rescued;
                        report.rescued.push(v.id());
                        info!("Victim {} rescued by agent {} at step {}", v.id(), id, step);
                    }
                    self.plans.remove(&id);
                    self.set_task(id, TaskState::Idle);
                    agent.task = None;
                    agent.status = AgentStatus::Returning;
                }
                TaskState::EnRoute => match self.walk(agent, step) {
                    Walk::Waiting => {}
                    Walk::Moved => report.moved.push(id),
                    Walk::Arrived { moved } => {
                        if moved {
                            report.moved.push(id);
                        }
                        self.set_task(id, TaskState::Engaged);
                        agent.status = AgentStatus::Engaged;
                        report.arrived.push(id);
                    }
                    Walk::Failed(reason) => {
                        report.moved.push(id);
                        release_victim(victims, victim);
                        self.disable_agent(agent, reason);
                        report.disabled.push(id);
                    }
                },
                _ => {}
            }
        }
        Ok(report)
    }

    /// Move an en-route agent to its plan's waypoint for `step`
    fn walk(&mut self, agent: &mut Agent, step: u64) -> Walk {
        let Some(plan) = self.plans.get_mut(&agent.id()) else {
            return Walk::Waiting;
        };
        // Invalidated plans hold the agent in place until re-planned
        if !plan.is_valid() {
            return Walk::Waiting;
        }

        let next = plan.cell_at_step(step);
        plan.advance_to(step);
        let arrived = next == plan.target() && plan.is_complete();
        if next == agent.location() {
            return if arrived {
                Walk::Arrived { moved: false }
            } else {
                Walk::Waiting
            };
        }

        let distance = agent.location().euclidean(&next);
        let factor = self.surface.terrain(next).energy_factor(agent.mobility());
        agent.energy -= distance * factor * (1.0 + self.surface.cost(next));
        agent.location = next;

        if self.surface.is_blocked(next) {
            Walk::Failed(DisableReason::Hazard)
        } else if agent.energy <= 0.0 {
            Walk::Failed(DisableReason::EnergyDepleted)
        } else if arrived {
            Walk::Arrived { moved: true }
        } else {
            Walk::Moved
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Mobility;
    use crate::config::{EngineConfig, RiskConfig};
    use crate::decision::DecisionRecord;
    use crate::grid::{Coord, GridEnvironment, HazardEvent, HazardType};
    use crate::victim::Victim;

    fn corridor(length: usize) -> (Coordinator, VictimRegistry, Vec<Agent>) {
        let env = GridEnvironment::new(length, 1, 5, RiskConfig::default()).unwrap();
        let mut coordinator = Coordinator::new(env, EngineConfig::default()).unwrap();
        let mut agents = vec![Agent::new(AgentId(1), Coord::new(0, 0), Mobility::Ground)];
        let mut victims: VictimRegistry =
            [Victim::new(VictimId(1), Coord::new(0, length - 1), 3, 600.0).unwrap()]
                .into_iter()
                .collect();
        coordinator.allocate_and_plan(&mut victims, &mut agents).unwrap();
        (coordinator, victims, agents)
    }

    #[test]
    fn test_agent_walks_engages_and_rescues() {
        let (mut coordinator, mut victims, mut agents) = corridor(3);

        let first = coordinator.advance_agents(&mut victims, &mut agents).unwrap();
        assert_eq!(first.step, 1);
        assert_eq!(first.moved, vec![AgentId(1)]);
        assert_eq!(agents[0].location(), Coord::new(0, 1));
        assert!((agents[0].energy() - 99.0).abs() < 1e-9);

        let second = coordinator.advance_agents(&mut victims, &mut agents).unwrap();
        assert_eq!(second.arrived, vec![AgentId(1)]);
        assert_eq!(agents[0].status(), AgentStatus::Engaged);
        assert_eq!(coordinator.task_state(AgentId(1)), TaskState::Engaged);

        let third = coordinator.advance_agents(&mut victims, &mut agents).unwrap();
        assert_eq!(third.rescued, vec![VictimId(1)]);
        assert_eq!(victims.get(VictimId(1)).unwrap().status(), VictimStatus::Rescued);
        assert_eq!(agents[0].status(), AgentStatus::Returning);
        assert!(coordinator.plan(AgentId(1)).is_none());

        coordinator.advance_agents(&mut victims, &mut agents).unwrap();
        assert!(agents[0].is_available());
        assert_eq!(coordinator.task_state(AgentId(1)), TaskState::Idle);
    }

    #[test]
    fn test_lost_victim_cancels_route() {
        let (mut coordinator, mut victims, mut agents) = corridor(4);
        coordinator.advance_agents(&mut victims, &mut agents).unwrap();
        victims.get_mut(VictimId(1)).unwrap().status = VictimStatus::Lost;

        let report = coordinator.advance_agents(&mut victims, &mut agents).unwrap();
        assert_eq!(report.cancelled, vec![AgentId(1)]);
        assert!(coordinator.plan(AgentId(1)).is_none());
        assert!(agents[0].is_available());
    }

    #[test]
    fn test_energy_depletion_disables_agent() {
        let (mut coordinator, mut victims, mut agents) = corridor(4);
        agents[0].energy = 1.5;

        coordinator.advance_agents(&mut victims, &mut agents).unwrap();
        let report = coordinator.advance_agents(&mut victims, &mut agents).unwrap();
        assert_eq!(report.disabled, vec![AgentId(1)]);
        assert_eq!(agents[0].disable_reason(), Some(DisableReason::EnergyDepleted));
        assert_eq!(victims.get(VictimId(1)).unwrap().status(), VictimStatus::Pending);
        assert!(matches!(
            coordinator.decisions().last(),
            Some(DecisionRecord::AgentDisabled {
                reason: DisableReason::EnergyDepleted,
                ..
            })
        ));
    }

    #[test]
    fn test_invalidated_plan_holds_agent() {
        let (mut coordinator, mut victims, mut agents) = corridor(4);
        coordinator
            .inject_hazard(HazardEvent::stationary(Coord::new(0, 3), HazardType::Flood, 0.5).unwrap())
            .unwrap();
        coordinator.plans.get_mut(&AgentId(1)).unwrap().invalidate();

        let report = coordinator.advance_agents(&mut victims, &mut agents).unwrap();
        assert!(report.moved.is_empty());
        assert_eq!(agents[0].location(), Coord::new(0, 0));
    }
}
