//! Mission summary metrics

use crate::agent::{Agent, AgentStatus};
use crate::planner::RoutePlan;
use crate::victim::{VictimRegistry, VictimStatus};
use serde::{Deserialize, Serialize};

/// Snapshot of mission progress for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionMetrics {
    pub rescued: usize,
    pub lost: usize,
    pub pending: usize,
    pub assigned: usize,
    pub active_agents: usize,
    pub disabled_agents: usize,
    /// Sum of the risk component over the given plans
    pub total_planned_risk: f64,
    pub mean_planned_risk: f64,
    /// Fraction of agents currently working a task
    pub utilisation: f64,
}

impl MissionMetrics {
    pub fn collect<'a>(
        victims: &VictimRegistry,
        agents: &[Agent],
        plans: impl IntoIterator<Item = &'a RoutePlan>,
    ) -> Self {
        let (plan_count, total_planned_risk) = plans
            .into_iter()
            .fold((0usize, 0.0), |(n, sum), plan| (n + 1, sum + plan.cost().risk));
        let busy = agents
            .iter()
            .filter(|a| matches!(a.status(), AgentStatus::EnRoute | AgentStatus::Engaged))
            .count();

        MissionMetrics {
            rescued: victims.count(VictimStatus::Rescued),
            lost: victims.count(VictimStatus::Lost),
            pending: victims.count(VictimStatus::Pending),
            assigned: victims.count(VictimStatus::Assigned),
            active_agents: agents
                .iter()
                .filter(|a| a.status() != AgentStatus::Disabled)
                .count(),
            disabled_agents: agents
                .iter()
                .filter(|a| a.status() == AgentStatus::Disabled)
                .count(),
            total_planned_risk,
            mean_planned_risk: if plan_count == 0 {
                0.0
            } else {
                total_planned_risk / plan_count as f64
            },
            utilisation: if agents.is_empty() {
                0.0
            } else {
                busy as f64 / agents.len() as f64
            },
        }
    }

    /// Share of victims with a final outcome that were rescued
    pub fn rescue_rate(&self) -> f64 {
        let closed = self.rescued + self.lost;
        if closed == 0 {
            0.0
        } else {
            self.rescued as f64 / closed as f64
        }
    }
}
