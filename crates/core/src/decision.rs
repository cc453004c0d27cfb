//! Structured decision records
//!
//! The coordinator appends one record per priority, allocation, route, conflict and re-plan
//! decision. Explanation generators and visualizers drain and read them; nothing flows back
//! into planning state.

use crate::agent::{AgentId, DisableReason};
use crate::grid::Coord;
use crate::planner::RouteCost;
use crate::prioritizer::PriorityBreakdown;
use crate::risk::RiskLevel;
use crate::victim::VictimId;
use serde::{Deserialize, Serialize};

/// One agent's bid for a victim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateCost {
    pub agent: AgentId,
    /// Route total under the allocation objective (`None` when no route was found)
    pub total: Option<f64>,
    /// Why the candidate could not bid
    pub failure: Option<String>,
}

/// How a route conflict was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictAction {
    /// Waited one step before the contested move
    Hold,
    /// Planned again with the contested cell reserved at that step
    Reroute,
    /// Retry bounds exhausted; the plan was dropped
    Deadlock,
}

/// Result of re-planning an invalidated route
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ReplanResult {
    Replanned { attempts: u32, risk_ceiling: f64 },
    Disabled { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionRecord {
    Priority {
        victim: VictimId,
        rank: usize,
        score: f64,
        breakdown: PriorityBreakdown,
    },
    Allocation {
        victim: VictimId,
        strategy: String,
        assigned: Option<AgentId>,
        candidates: Vec<CandidateCost>,
    },
    Route {
        agent: AgentId,
        victim: VictimId,
        cost: RouteCost,
        steps: usize,
        wait_steps: u32,
        /// Highest risk level of any cell on the route
        peak_risk: RiskLevel,
    },
    Conflict {
        agent: AgentId,
        /// Higher-priority agent holding the contested cell
        blocking_agent: AgentId,
        cell: Coord,
        step: u64,
        action: ConflictAction,
    },
    Replan {
        agent: AgentId,
        victim: VictimId,
        outcome: ReplanResult,
    },
    AgentDisabled {
        agent: AgentId,
        reason: DisableReason,
    },
}

/// Append-only buffer of decision records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionLog {
    records: Vec<DecisionRecord>,
}

impl DecisionLog {
    pub fn push(&mut self, record: DecisionRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[DecisionRecord] {
        &self.records
    }

    /// Remove and return every record
    pub fn take(&mut self) -> Vec<DecisionRecord> {
        std::mem::take(&mut self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_serialize_with_kind_tag() {
        let record = DecisionRecord::Conflict {
            agent: AgentId(2),
            blocking_agent: AgentId(1),
            cell: Coord::new(1, 2),
            step: 4,
            action: ConflictAction::Hold,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "conflict");
        assert_eq!(json["action"], "hold");
        assert_eq!(json["cell"]["row"], 1);

        let back: DecisionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_take_drains_log() {
        let mut log = DecisionLog::default();
        log.push(DecisionRecord::AgentDisabled {
            agent: AgentId(1),
            reason: DisableReason::EnergyDepleted,
        });
        assert_eq!(log.len(), 1);
        assert_eq!(log.take().len(), 1);
        assert!(log.is_empty());
    }
}
