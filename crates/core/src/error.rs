//! Error taxonomy shared by every planning component
//!
//! Algorithmic components (grid, propagator, prioritizer, planner) return these as typed
//! failures. Only the coordinator degrades gracefully by marking victims pending or agents
//! disabled instead of aborting an allocation round.

use crate::agent::AgentId;
use crate::grid::Coord;
use thiserror::Error;

/// Failures produced by the planning engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanningError {
    /// Malformed weights or configuration. Fatal to the call, never retried.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Operation on an uninitialized or corrupt grid. Fatal.
    #[error("invalid grid state: {0}")]
    InvalidGridState(String),

    /// No route exists under the current constraints.
    ///
    /// The caller may relax the risk ceiling or mark the task unreachable.
    #[error("no path found from {from} to {to}")]
    NoPathFound {
        /// Search origin
        from: Coord,
        /// Search target
        to: Coord,
    },

    /// Search was cancelled or exceeded its deadline
    #[error("planning timed out after expanding {expanded} states")]
    PlanningTimeout {
        /// States expanded before the cancellation was observed
        expanded: usize,
    },

    /// Conflict resolution exceeded its retry bound for one agent
    #[error("allocation deadlock for agent {agent} after {attempts} resolution attempts")]
    AllocationDeadlock {
        /// Agent whose route could not be made conflict-free
        agent: AgentId,
        /// Holds plus re-routes tried before giving up
        attempts: u32,
    },
}

impl PlanningError {
    /// Shorthand for [`PlanningError::InvalidConfiguration`]
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Shorthand for [`PlanningError::InvalidGridState`]
    pub(crate) fn grid(message: impl Into<String>) -> Self {
        Self::InvalidGridState(message.into())
    }

    /// Whether a caller can reasonably retry (relaxed constraints, smaller scope, next round)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoPathFound { .. } | Self::PlanningTimeout { .. } | Self::AllocationDeadlock { .. }
        )
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, PlanningError>;
