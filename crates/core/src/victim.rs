//! Victim records and the per-mission registry

use crate::agent::{AgentId, Mobility};
use crate::error::{PlanningError, Result};
use crate::grid::Coord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

/// Unique victim identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VictimId(pub u32);

impl fmt::Display for VictimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VictimStatus {
    #[default]
    Pending,
    Assigned,
    Rescued,
    Lost,
}

/// Ordinal injury severity bounds
pub const MIN_SEVERITY: u8 = 1;
pub const MAX_SEVERITY: u8 = 5;

/// A person awaiting rescue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Victim {
    pub(crate) id: VictimId,
    pub(crate) location: Coord,
    pub(crate) severity: u8,
    /// Seconds of survival remaining, strictly decreasing with simulated time
    pub(crate) survival_window_secs: f64,
    /// Payload units an agent needs to carry this victim
    pub(crate) payload: u32,
    pub(crate) required_mobility: Option<Mobility>,
    /// Risk-only path cost from the nearest active agent (`None` when unreachable)
    pub(crate) accessibility_risk: Option<f64>,
    pub(crate) priority_score: Option<f64>,
    /// Risk surface revision the score was computed against; cleared by attribute changes
    pub(crate) scored_revision: Option<u64>,
    pub(crate) status: VictimStatus,
    pub(crate) assigned_agent: Option<AgentId>,
}

impl Victim {
    /// Create a pending victim
    pub fn new(id: VictimId, location: Coord, severity: u8, survival_window_secs: f64) -> Result<Self> {
        check_severity(severity)?;
        check_window(survival_window_secs)?;
        Ok(Victim {
            id,
            location,
            severity,
            survival_window_secs,
            payload: 1,
            required_mobility: None,
            accessibility_risk: None,
            priority_score: None,
            scored_revision: None,
            status: VictimStatus::Pending,
            assigned_agent: None,
        })
    }

    pub fn with_payload(mut self, payload: u32) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_required_mobility(mut self, mobility: Mobility) -> Self {
        self.required_mobility = Some(mobility);
        self
    }

    pub fn id(&self) -> VictimId {
        self.id
    }

    pub fn location(&self) -> Coord {
        self.location
    }

    pub fn severity(&self) -> u8 {
        self.severity
    }

    pub fn survival_window_secs(&self) -> f64 {
        self.survival_window_secs
    }

    pub fn payload(&self) -> u32 {
        self.payload
    }

    pub fn required_mobility(&self) -> Option<Mobility> {
        self.required_mobility
    }

    pub fn accessibility_risk(&self) -> Option<f64> {
        self.accessibility_risk
    }

    pub fn priority_score(&self) -> Option<f64> {
        self.priority_score
    }

    pub fn status(&self) -> VictimStatus {
        self.status
    }

    pub fn assigned_agent(&self) -> Option<AgentId> {
        self.assigned_agent
    }

    pub fn is_pending(&self) -> bool {
        self.status == VictimStatus::Pending
    }

    /// Still waiting for, or on the way to, rescue
    pub fn is_open(&self) -> bool {
        matches!(self.status, VictimStatus::Pending | VictimStatus::Assigned)
    }

    /// Score was computed against `revision` and no attribute changed since
    pub fn is_score_current(&self, revision: u64) -> bool {
        self.scored_revision == Some(revision)
    }

    pub fn set_severity(&mut self, severity: u8) -> Result<()> {
        check_severity(severity)?;
        self.severity = severity;
        self.mark_stale();
        Ok(())
    }

    pub fn set_survival_window(&mut self, secs: f64) -> Result<()> {
        check_window(secs)?;
        self.survival_window_secs = secs;
        self.mark_stale();
        Ok(())
    }

    pub fn set_location(&mut self, location: Coord) {
        self.location = location;
        self.mark_stale();
    }

    pub(crate) fn mark_stale(&mut self) {
        self.scored_revision = None;
    }

    /// Burn survival time; returns true when the victim was lost by this call
    pub(crate) fn elapse(&mut self, dt: f64) -> bool {
        if !self.is_open() || dt <= 0.0 {
            return false;
        }
        self.survival_window_secs = (self.survival_window_secs - dt).max(0.0);
        self.mark_stale();
        if self.survival_window_secs == 0.0 {
            self.status = VictimStatus::Lost;
            true
        } else {
            false
        }
    }
}

fn check_severity(severity: u8) -> Result<()> {
    if (MIN_SEVERITY..=MAX_SEVERITY).contains(&severity) {
        Ok(())
    } else {
        Err(PlanningError::config(format!(
            "victim severity must be within {MIN_SEVERITY}..={MAX_SEVERITY}, got {severity}"
        )))
    }
}

fn check_window(secs: f64) -> Result<()> {
    if secs.is_finite() && secs > 0.0 {
        Ok(())
    } else {
        Err(PlanningError::config(format!(
            "survival window must be positive, got {secs}"
        )))
    }
}

/// Victims of one mission, iterated in id order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VictimRegistry {
    victims: BTreeMap<VictimId, Victim>,
}

impl VictimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a victim; duplicate ids are rejected
    pub fn insert(&mut self, victim: Victim) -> Result<()> {
        if self.victims.contains_key(&victim.id) {
            return Err(PlanningError::config(format!(
                "victim {} is already registered",
                victim.id
            )));
        }
        self.victims.insert(victim.id, victim);
        Ok(())
    }

    pub fn get(&self, id: VictimId) -> Option<&Victim> {
        self.victims.get(&id)
    }

    pub fn get_mut(&mut self, id: VictimId) -> Option<&mut Victim> {
        self.victims.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.victims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.victims.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Victim> {
        self.victims.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Victim> {
        self.victims.values_mut()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Victim> {
        self.iter().filter(|v| v.is_pending())
    }

    pub fn count(&self, status: VictimStatus) -> usize {
        self.iter().filter(|v| v.status == status).count()
    }

    /// Advance survival clocks by `dt` seconds
    ///
    /// Returns the ids of victims lost during this call.
    pub fn elapse(&mut self, dt: f64) -> Vec<VictimId> {
        let lost: Vec<VictimId> = self
            .victims
            .values_mut()
            .filter_map(|v| v.elapse(dt).then_some(v.id))
            .collect();
        if !lost.is_empty() {
            info!("{} victims lost: {:?}", lost.len(), lost);
        }
        lost
    }
}

impl FromIterator<Victim> for VictimRegistry {
    /// Collect victims; a later duplicate id replaces the earlier record
    fn from_iter<I: IntoIterator<Item = Victim>>(iter: I) -> Self {
        VictimRegistry {
            victims: iter.into_iter().map(|v| (v.id, v)).collect(),
        }
    }
}
