//! Rescue agents and their capabilities

use crate::grid::Coord;
use crate::victim::{Victim, VictimId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique agent identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u32);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How an agent moves through the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mobility {
    #[default]
    Ground,
    Aerial,
}

/// Lifecycle status of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    EnRoute,
    Engaged,
    /// Carrying a rescued victim out; available again on the next step
    Returning,
    Disabled,
}

/// Why an agent was taken out of service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisableReason {
    /// Conflict resolution gave up; cleared at the next allocation round
    Deadlock,
    EnergyDepleted,
    /// Entered an impassable or collapsed cell
    Hazard,
    /// No valid route after the bounded re-routing attempts
    NoRoute,
}

/// Default energy budget of a freshly created agent
pub const DEFAULT_ENERGY: f64 = 100.0;

/// A rescue unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub(crate) id: AgentId,
    pub(crate) mobility: Mobility,
    pub(crate) payload_capacity: u32,
    pub(crate) location: Coord,
    pub(crate) task: Option<VictimId>,
    pub(crate) energy: f64,
    pub(crate) status: AgentStatus,
    pub(crate) disable_reason: Option<DisableReason>,
}

impl Agent {
    pub fn new(id: AgentId, location: Coord, mobility: Mobility) -> Self {
        Agent {
            id,
            mobility,
            payload_capacity: 1,
            location,
            task: None,
            energy: DEFAULT_ENERGY,
            status: AgentStatus::Idle,
            disable_reason: None,
        }
    }

    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy = energy;
        self
    }

    pub fn with_payload_capacity(mut self, capacity: u32) -> Self {
        self.payload_capacity = capacity;
        self
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn mobility(&self) -> Mobility {
        self.mobility
    }

    pub fn payload_capacity(&self) -> u32 {
        self.payload_capacity
    }

    pub fn location(&self) -> Coord {
        self.location
    }

    pub fn task(&self) -> Option<VictimId> {
        self.task
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn disable_reason(&self) -> Option<DisableReason> {
        self.disable_reason
    }

    /// Free to take a new task this round
    pub fn is_available(&self) -> bool {
        self.status == AgentStatus::Idle && self.task.is_none()
    }

    /// Counted when locating the agent nearest to a victim
    pub fn is_active(&self) -> bool {
        matches!(self.status, AgentStatus::Idle | AgentStatus::EnRoute)
    }

    /// Capability filter applied before any route is costed
    pub fn can_serve(&self, victim: &Victim) -> bool {
        self.payload_capacity >= victim.payload()
            && victim.required_mobility().is_none_or(|m| m == self.mobility)
    }

    pub(crate) fn disable(&mut self, reason: DisableReason) {
        self.status = AgentStatus::Disabled;
        self.disable_reason = Some(reason);
        self.task = None;
    }

    pub(crate) fn release(&mut self) {
        self.status = AgentStatus::Idle;
        self.disable_reason = None;
        self.task = None;
    }
}
