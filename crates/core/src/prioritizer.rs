//! Victim prioritization
//!
//! ```text
//! score = w1·(severity / 5) + w2·min(1, reference / window) + w3·(1 − accessibilityRiskNorm)
//! ```
//!
//! Accessibility risk is the risk-only path cost from the nearest idle or en-route agent,
//! normalized by the largest accessibility risk in the scored set. Unreachable victims count
//! as fully inaccessible. Ordering is score descending, then survival window ascending, then
//! victim id ascending, which makes it a total order.

use crate::agent::{Agent, AgentId};
use crate::config::PriorityWeights;
use crate::error::{PlanningError, Result};
use crate::grid::Coord;
use crate::planner::{ObjectiveWeights, PathPlanner, PlanRequest};
use crate::risk::RiskSurface;
use crate::victim::{VictimId, VictimRegistry, MAX_SEVERITY};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Weighted terms of a priority score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityBreakdown {
    pub severity_term: f64,
    pub urgency_term: f64,
    pub accessibility_term: f64,
    /// Raw risk-only path cost (`None` when no active agent can reach the victim)
    pub accessibility_risk: Option<f64>,
    pub nearest_agent: Option<AgentId>,
}

/// A victim with its score, ready for allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredVictim {
    pub victim: VictimId,
    pub location: Coord,
    pub score: f64,
    pub survival_window_secs: f64,
    pub breakdown: PriorityBreakdown,
}

impl ScoredVictim {
    /// Priority order: higher score first, then shorter window, then lower id
    pub fn priority_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.survival_window_secs.total_cmp(&other.survival_window_secs))
            .then_with(|| self.victim.cmp(&other.victim))
    }
}

/// Pending victims in priority order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderedVictimList {
    /// Risk surface revision the scores were computed against
    pub revision: u64,
    pub entries: Vec<ScoredVictim>,
}

impl OrderedVictimList {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = VictimId> + '_ {
        self.entries.iter().map(|e| e.victim)
    }

    pub fn get(&self, victim: VictimId) -> Option<&ScoredVictim> {
        self.entries.iter().find(|e| e.victim == victim)
    }

    /// Position in the order (0 is the highest priority)
    pub fn rank(&self, victim: VictimId) -> Option<usize> {
        self.entries.iter().position(|e| e.victim == victim)
    }
}

/// Scores victims against the current risk surface
///
/// Risk-only path queries are cached per surface revision, keyed by (agent cell, victim cell).
#[derive(Debug, Clone)]
pub struct Prioritizer {
    weights: PriorityWeights,
    planner: PathPlanner,
    cache: FxHashMap<(Coord, Coord), Option<f64>>,
    cache_revision: Option<u64>,
}

impl Prioritizer {
    /// Create a prioritizer; weights must be non-negative and sum to 1
    pub fn new(weights: PriorityWeights, planner: PathPlanner) -> Result<Self> {
        weights.validate()?;
        Ok(Prioritizer {
            weights,
            planner,
            cache: FxHashMap::default(),
            cache_revision: None,
        })
    }

    pub fn weights(&self) -> &PriorityWeights {
        &self.weights
    }

    /// Replace the weights after validating them
    pub fn set_weights(&mut self, weights: PriorityWeights) -> Result<()> {
        weights.validate()?;
        self.weights = weights;
        Ok(())
    }

    /// Number of cached risk-only path costs
    pub fn cached_queries(&self) -> usize {
        self.cache.len()
    }

    /// Score every pending victim, write the scores back into the registry and return them
    /// in priority order
    pub fn score_victims(
        &mut self,
        victims: &mut VictimRegistry,
        agents: &[Agent],
        surface: &RiskSurface,
    ) -> Result<OrderedVictimList> {
        if self.cache_revision != Some(surface.revision()) {
            self.cache.clear();
            self.cache_revision = Some(surface.revision());
        }

        let mut active: Vec<&Agent> = agents.iter().filter(|a| a.is_active()).collect();
        active.sort_by_key(|a| a.id());

        let mut raw = Vec::new();
        for victim in victims.pending() {
            let nearest = active
                .iter()
                .min_by_key(|a| (a.location().chebyshev(&victim.location()), a.id()))
                .copied();
            let risk = match nearest {
                Some(agent) => self.accessibility_risk(agent, victim.location(), surface)?,
                None => None,
            };
            raw.push((victim.id(), nearest.map(Agent::id), risk));
        }

        let max_risk = raw
            .iter()
            .filter_map(|(_, _, risk)| *risk)
            .fold(0.0_f64, f64::max);

        let mut entries = Vec::with_capacity(raw.len());
        for (id, nearest_agent, accessibility_risk) in raw {
            let victim = victims
                .get_mut(id)
                .ok_or_else(|| PlanningError::config(format!("victim {id} vanished while scoring")))?;
            let severity_norm = f64::from(victim.severity()) / f64::from(MAX_SEVERITY);
            let urgency = (self.weights.urgency_reference_secs / victim.survival_window_secs()).min(1.0);
            let risk_norm = match accessibility_risk {
                None => 1.0,
                Some(_) if max_risk <= 0.0 => 0.0,
                Some(risk) => risk / max_risk,
            };
            let breakdown = PriorityBreakdown {
                severity_term: self.weights.severity * severity_norm,
                urgency_term: self.weights.urgency * urgency,
                accessibility_term: self.weights.accessibility * (1.0 - risk_norm),
                accessibility_risk,
                nearest_agent,
            };
            let score = breakdown.severity_term + breakdown.urgency_term + breakdown.accessibility_term;

            victim.accessibility_risk = accessibility_risk;
            victim.priority_score = Some(score);
            victim.scored_revision = Some(surface.revision());

            entries.push(ScoredVictim {
                victim: id,
                location: victim.location(),
                score,
                survival_window_secs: victim.survival_window_secs(),
                breakdown,
            });
        }
        entries.sort_by(ScoredVictim::priority_cmp);

        debug!(
            "Scored {} pending victims at revision {} ({} cached path queries)",
            entries.len(),
            surface.revision(),
            self.cache.len()
        );
        Ok(OrderedVictimList {
            revision: surface.revision(),
            entries,
        })
    }

    /// Risk-only path cost from an agent to a cell; `None` when unreachable
    fn accessibility_risk(
        &mut self,
        agent: &Agent,
        target: Coord,
        surface: &RiskSurface,
    ) -> Result<Option<f64>> {
        let key = (agent.location(), target);
        if let Some(&cached) = self.cache.get(&key) {
            return Ok(cached);
        }
        let request = PlanRequest::for_agent(agent, target).objective(ObjectiveWeights::risk_only());
        let risk = match self.planner.plan(surface, &request) {
            Ok(plan) => Some(plan.cost().risk),
            Err(PlanningError::NoPathFound { .. }) => None,
            Err(err) => return Err(err),
        };
        self.cache.insert(key, risk);
        Ok(risk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentId, Mobility};
    use crate::config::{PlannerConfig, RiskConfig};
    use crate::grid::{GridEnvironment, HazardEvent, HazardType};
    use crate::victim::{Victim, VictimStatus};

    fn prioritizer() -> Prioritizer {
        Prioritizer::new(
            PriorityWeights::default(),
            PathPlanner::new(PlannerConfig::default()).unwrap(),
        )
        .unwrap()
    }

    fn open_surface(size: usize) -> RiskSurface {
        GridEnvironment::new(size, size, 3, RiskConfig::default())
            .unwrap()
            .risk_surface()
            .unwrap()
    }

    fn victim(id: u32, at: Coord, severity: u8, window: f64) -> Victim {
        Victim::new(VictimId(id), at, severity, window).unwrap()
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let weights = PriorityWeights {
            severity: 0.6,
            ..PriorityWeights::default()
        };
        let result = Prioritizer::new(weights, PathPlanner::new(PlannerConfig::default()).unwrap());
        assert!(matches!(result, Err(PlanningError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_score_terms() {
        let surface = open_surface(5);
        let agents = vec![Agent::new(AgentId(1), Coord::new(0, 0), Mobility::Ground)];
        let mut victims: VictimRegistry = [victim(1, Coord::new(4, 4), 5, 30.0)].into_iter().collect();

        let list = prioritizer().score_victims(&mut victims, &agents, &surface).unwrap();
        let entry = &list.entries[0];
        // severity 5/5, urgency saturated, zero-risk path
        assert!((entry.score - 1.0).abs() < 1e-12);
        assert_eq!(entry.breakdown.accessibility_risk, Some(0.0));
        assert_eq!(entry.breakdown.nearest_agent, Some(AgentId(1)));

        let stored = victims.get(VictimId(1)).unwrap();
        assert_eq!(stored.priority_score(), Some(entry.score));
        assert!(stored.is_score_current(surface.revision()));
    }

    #[test]
    fn test_tie_break_by_window_then_id() {
        let surface = open_surface(5);
        let agents = vec![Agent::new(AgentId(1), Coord::new(2, 2), Mobility::Ground)];
        // Identical attributes: the id decides
        let mut victims: VictimRegistry = [
            victim(3, Coord::new(0, 0), 3, 600.0),
            victim(1, Coord::new(4, 4), 3, 600.0),
            victim(2, Coord::new(0, 4), 3, 600.0),
        ]
        .into_iter()
        .collect();
        let list = prioritizer().score_victims(&mut victims, &agents, &surface).unwrap();
        let ids: Vec<u32> = list.ids().map(|v| v.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        // Saturated urgency: equal scores, shorter window wins
        let mut victims: VictimRegistry = [
            victim(1, Coord::new(0, 0), 3, 50.0),
            victim(2, Coord::new(4, 4), 3, 20.0),
        ]
        .into_iter()
        .collect();
        let list = prioritizer().score_victims(&mut victims, &agents, &surface).unwrap();
        assert_eq!(list.entries[0].score, list.entries[1].score);
        assert_eq!(list.entries[0].victim, VictimId(2));
    }

    #[test]
    fn test_risky_access_lowers_priority() {
        let mut env = GridEnvironment::new(5, 1, 3, RiskConfig::default()).unwrap();
        env.apply_hazard_event(
            HazardEvent::stationary(Coord::new(0, 3), HazardType::Fire, 0.9).unwrap(),
        )
        .unwrap();
        let surface = env.risk_surface().unwrap();
        let agents = vec![Agent::new(AgentId(1), Coord::new(0, 2), Mobility::Ground)];
        let mut victims: VictimRegistry = [
            victim(1, Coord::new(0, 0), 3, 600.0),
            victim(2, Coord::new(0, 4), 3, 600.0),
        ]
        .into_iter()
        .collect();

        let list = prioritizer().score_victims(&mut victims, &agents, &surface).unwrap();
        assert_eq!(list.entries[0].victim, VictimId(1));
        let risky = list.get(VictimId(2)).unwrap();
        assert_eq!(risky.breakdown.accessibility_term, 0.0);
    }

    #[test]
    fn test_unreachable_victim_counts_as_inaccessible() {
        let mut env = GridEnvironment::new(3, 1, 3, RiskConfig::default()).unwrap();
        env.apply_hazard_event(
            HazardEvent::stationary(Coord::new(0, 1), HazardType::Collapse, 1.0).unwrap(),
        )
        .unwrap();
        let surface = env.risk_surface().unwrap();
        let agents = vec![Agent::new(AgentId(1), Coord::new(0, 0), Mobility::Ground)];
        let mut victims: VictimRegistry = [victim(1, Coord::new(0, 2), 5, 600.0)].into_iter().collect();

        let list = prioritizer().score_victims(&mut victims, &agents, &surface).unwrap();
        assert_eq!(list.entries[0].breakdown.accessibility_risk, None);
        assert_eq!(list.entries[0].breakdown.accessibility_term, 0.0);
    }

    #[test]
    fn test_only_pending_victims_scored_and_cache_reset() {
        let surface = open_surface(4);
        let agents = vec![Agent::new(AgentId(1), Coord::new(0, 0), Mobility::Ground)];
        let mut victims: VictimRegistry = [
            victim(1, Coord::new(3, 3), 2, 600.0),
            victim(2, Coord::new(1, 1), 2, 600.0),
        ]
        .into_iter()
        .collect();
        victims.get_mut(VictimId(2)).unwrap().status = VictimStatus::Rescued;

        let mut prioritizer = prioritizer();
        let list = prioritizer.score_victims(&mut victims, &agents, &surface).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(prioritizer.cached_queries(), 1);

        prioritizer.score_victims(&mut victims, &agents, &surface).unwrap();
        assert_eq!(prioritizer.cached_queries(), 1);

        let mut env = GridEnvironment::new(4, 4, 3, RiskConfig::default()).unwrap();
        env.tick(1.0).unwrap();
        let newer = env.risk_surface().unwrap();
        prioritizer.score_victims(&mut victims, &agents, &newer).unwrap();
        assert_eq!(prioritizer.cached_queries(), 1);
    }

    #[test]
    fn test_no_active_agents() {
        let surface = open_surface(3);
        let mut victims: VictimRegistry = [victim(1, Coord::new(2, 2), 5, 600.0)].into_iter().collect();
        let list = prioritizer().score_victims(&mut victims, &[], &surface).unwrap();
        assert_eq!(list.entries[0].breakdown.nearest_agent, None);
        assert_eq!(list.entries[0].breakdown.accessibility_risk, None);
    }
}
