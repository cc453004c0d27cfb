//! Mission aggregate
//!
//! Pure data owned by the orchestrator. The coordinator borrows the victim and agent sets for
//! each call and never stores lifecycle state of its own.

use crate::agent::Agent;
use crate::error::{PlanningError, Result};
use crate::victim::{VictimRegistry, VictimStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MissionId(pub u32);

impl fmt::Display for MissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mission-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    #[default]
    Created,
    Simulating,
    Planning,
    Completed,
    Failed,
}

impl MissionStatus {
    /// Simulation and planning alternate until the mission finishes
    pub fn can_transition_to(self, next: MissionStatus) -> bool {
        use MissionStatus::{Completed, Created, Failed, Planning, Simulating};
        match (self, next) {
            (Completed | Failed, _) => false,
            (_, Failed) => true,
            (Created, Simulating | Planning) => true,
            (Simulating, Planning | Completed) => true,
            (Planning, Simulating | Completed) => true,
            _ => false,
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(self, MissionStatus::Completed | MissionStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub(crate) status: MissionStatus,
    pub victims: VictimRegistry,
    pub agents: Vec<Agent>,
}

impl Mission {
    pub fn new(id: MissionId, victims: VictimRegistry, agents: Vec<Agent>) -> Self {
        Mission {
            id,
            status: MissionStatus::Created,
            victims,
            agents,
        }
    }

    pub fn status(&self) -> MissionStatus {
        self.status
    }

    /// Move to `next`, rejecting transitions out of a finished state or backwards to `Created`
    pub fn transition(&mut self, next: MissionStatus) -> Result<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(PlanningError::config(format!(
                "{} cannot move from {:?} to {:?}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// No victim is waiting for or receiving help
    pub fn is_resolved(&self) -> bool {
        self.victims
            .iter()
            .all(|v| matches!(v.status(), VictimStatus::Rescued | VictimStatus::Lost))
    }

    /// Every agent is out of service
    pub fn is_stranded(&self) -> bool {
        !self.agents.is_empty() && self.agents.iter().all(|a| a.disable_reason().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentId, DisableReason, Mobility};
    use crate::grid::Coord;
    use crate::victim::{Victim, VictimId};

    fn mission() -> Mission {
        let victims: VictimRegistry = [Victim::new(VictimId(1), Coord::new(1, 1), 2, 60.0).unwrap()]
            .into_iter()
            .collect();
        let agents = vec![Agent::new(AgentId(1), Coord::new(0, 0), Mobility::Ground)];
        Mission::new(MissionId(7), victims, agents)
    }

    #[test]
    fn test_lifecycle() {
        let mut mission = mission();
        assert_eq!(mission.status(), MissionStatus::Created);
        mission.transition(MissionStatus::Simulating).unwrap();
        mission.transition(MissionStatus::Planning).unwrap();
        mission.transition(MissionStatus::Simulating).unwrap();
        mission.transition(MissionStatus::Completed).unwrap();
        assert!(mission.status().is_finished());
        assert!(mission.transition(MissionStatus::Planning).is_err());
    }

    #[test]
    fn test_created_cannot_complete_directly() {
        let mut mission = mission();
        assert!(mission.transition(MissionStatus::Completed).is_err());
        mission.transition(MissionStatus::Failed).unwrap();
    }

    #[test]
    fn test_resolution_and_stranding() {
        let mut mission = mission();
        assert!(!mission.is_resolved());
        mission.victims.get_mut(VictimId(1)).unwrap().status = VictimStatus::Rescued;
        assert!(mission.is_resolved());

        assert!(!mission.is_stranded());
        mission.agents[0].disable(DisableReason::EnergyDepleted);
        assert!(mission.is_stranded());
    }

    #[test]
    fn test_display() {
        assert_eq!(MissionId(3).to_string(), "mission-3");
    }
}
