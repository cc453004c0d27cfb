//! Per-agent task state machine
//!
//! ```text
//! idle → assigned → en_route → engaged    → idle
//!                       ↓   ↑
//!                    re_routing → disabled
//! ```
//!
//! Execution failures (energy, hazard) move `en_route` straight to `disabled`, a lost victim
//! sends `en_route` back to `idle`, and a deadlocked assignment disables the agent until the
//! next allocation round.

use crate::agent::AgentStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Idle,
    Assigned,
    EnRoute,
    Engaged,
    ReRouting,
    Disabled,
}

impl TaskState {
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::{Assigned, Disabled, Engaged, EnRoute, Idle, ReRouting};
        matches!(
            (self, next),
            (Idle, Assigned)
                | (Assigned, EnRoute | Disabled)
                | (EnRoute, Engaged | ReRouting | Disabled | Idle)
                | (ReRouting, EnRoute | Disabled)
                | (Engaged, Idle)
                | (Disabled, Idle)
        )
    }

    /// Agent status shown to the outside while in this state
    pub fn agent_status(self) -> AgentStatus {
        match self {
            TaskState::Idle => AgentStatus::Idle,
            TaskState::Assigned | TaskState::EnRoute | TaskState::ReRouting => AgentStatus::EnRoute,
            TaskState::Engaged => AgentStatus::Engaged,
            TaskState::Disabled => AgentStatus::Disabled,
        }
    }

    /// Holds an active route plan
    pub fn has_route(self) -> bool {
        matches!(
            self,
            TaskState::Assigned | TaskState::EnRoute | TaskState::ReRouting | TaskState::Engaged
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let path = [
            TaskState::Idle,
            TaskState::Assigned,
            TaskState::EnRoute,
            TaskState::ReRouting,
            TaskState::EnRoute,
            TaskState::Engaged,
            TaskState::Idle,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(!TaskState::Idle.can_transition_to(TaskState::EnRoute));
        assert!(!TaskState::Assigned.can_transition_to(TaskState::ReRouting));
        assert!(!TaskState::Engaged.can_transition_to(TaskState::ReRouting));
        assert!(!TaskState::Disabled.can_transition_to(TaskState::EnRoute));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(TaskState::ReRouting.agent_status(), AgentStatus::EnRoute);
        assert_eq!(TaskState::Engaged.agent_status(), AgentStatus::Engaged);
        assert!(!TaskState::Idle.has_route());
    }
}
