//! Victim-to-agent allocation strategies
//!
//! Both strategies read route costs from a [`CandidateTable`] that the coordinator fills in
//! parallel before the round starts, so a strategy never runs the planner itself.

use crate::agent::AgentId;
use crate::decision::CandidateCost;
use crate::error::Result;
use crate::planner::RoutePlan;
use crate::victim::VictimId;
use rustc_hash::FxHashMap;
use std::fmt;

/// Cost standing in for an impossible pairing in the assignment matrix
const INFEASIBLE: f64 = 1e12;

/// Costed candidate routes of one allocation round
#[derive(Debug, Default)]
pub struct CandidateTable {
    entries: FxHashMap<(VictimId, AgentId), Result<RoutePlan>>,
}

impl CandidateTable {
    pub fn insert(&mut self, victim: VictimId, agent: AgentId, route: Result<RoutePlan>) {
        self.entries.insert((victim, agent), route);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Route total for a feasible pairing
    pub fn cost(&self, victim: VictimId, agent: AgentId) -> Option<f64> {
        match self.entries.get(&(victim, agent)) {
            Some(Ok(plan)) => Some(plan.cost().total),
            _ => None,
        }
    }

    /// Bids of the given agents for a victim, for the decision log
    pub fn bids(&self, victim: VictimId, agents: &[AgentId]) -> Vec<CandidateCost> {
        agents
            .iter()
            .filter_map(|&agent| {
                self.entries.get(&(victim, agent)).map(|route| match route {
                    Ok(plan) => CandidateCost {
                        agent,
                        total: Some(plan.cost().total),
                        failure: None,
                    },
                    Err(err) => CandidateCost {
                        agent,
                        total: None,
                        failure: Some(err.to_string()),
                    },
                })
            })
            .collect()
    }

    pub(crate) fn take_plan(&mut self, victim: VictimId, agent: AgentId) -> Option<RoutePlan> {
        match self.entries.remove(&(victim, agent)) {
            Some(Ok(plan)) => Some(plan),
            _ => None,
        }
    }
}

/// A victim handed to an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub victim: VictimId,
    pub agent: AgentId,
}

/// Pluggable allocation policy
pub trait AllocationStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Pair victims with agents
    ///
    /// `victims` is in priority order and `agents` in ascending id order. Returned
    /// assignments follow victim priority order and use each agent at most once.
    fn assign(&self, victims: &[VictimId], agents: &[AgentId], table: &CandidateTable) -> Vec<Assignment>;
}

/// Deterministic greedy auction
///
/// Each victim in priority order goes to the cheapest capable agent still in the pool
/// (ties to the lowest agent id), which then leaves the pool for the round.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyAuction;

impl AllocationStrategy for GreedyAuction {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn assign(&self, victims: &[VictimId], agents: &[AgentId], table: &CandidateTable) -> Vec<Assignment> {
        let mut pool = agents.to_vec();
        let mut out = Vec::new();
        for &victim in victims {
            if pool.is_empty() {
                break;
            }
            let winner = pool
                .iter()
                .filter_map(|&agent| table.cost(victim, agent).map(|cost| (cost, agent)))
                .min_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
            if let Some((_, agent)) = winner {
                pool.retain(|&a| a != agent);
                out.push(Assignment { victim, agent });
            }
        }
        out
    }
}

/// Minimum total cost assignment over the top-priority victims
///
/// Takes the `k` highest-priority victims that at least one agent can reach, where `k` is the
/// number of available agents, and solves the rectangular assignment problem exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinCostMatching;

impl AllocationStrategy for MinCostMatching {
    fn name(&self) -> &'static str {
        "min_cost_matching"
    }

    fn assign(&self, victims: &[VictimId], agents: &[AgentId], table: &CandidateTable) -> Vec<Assignment> {
        let top: Vec<VictimId> = victims
            .iter()
            .copied()
            .filter(|&v| agents.iter().any(|&a| table.cost(v, a).is_some()))
            .take(agents.len())
            .collect();
        if top.is_empty() {
            return Vec::new();
        }

        let matrix: Vec<Vec<f64>> = top
            .iter()
            .map(|&v| {
                agents
                    .iter()
                    .map(|&a| table.cost(v, a).unwrap_or(INFEASIBLE))
                    .collect()
            })
            .collect();

        hungarian(&matrix)
            .into_iter()
            .enumerate()
            .filter_map(|(row, col)| {
                let col = col?;
                (matrix[row][col] < INFEASIBLE).then_some(Assignment {
                    victim: top[row],
                    agent: agents[col],
                })
            })
            .collect()
    }
}

/// Hungarian algorithm (potentials form) for an `n × m` matrix with `n ≤ m`
///
/// Returns the column assigned to each row.
fn hungarian(cost: &[Vec<f64>]) -> Vec<Option<usize>> {
    let n = cost.len();
    let m = cost.first().map_or(0, Vec::len);
    if n == 0 || m < n {
        return vec![None; n];
    }

    // 1-based potentials; column 0 is a virtual start
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; m + 1];
    let mut owner = vec![0_usize; m + 1];
    let mut way = vec![0_usize; m + 1];

    for row in 1..=n {
        owner[0] = row;
        let mut col0 = 0;
        let mut min_slack = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];
        loop {
            used[col0] = true;
            let row0 = owner[col0];
            let mut delta = f64::INFINITY;
            let mut col1 = 0;
            for col in 1..=m {
                if used[col] {
                    continue;
                }
                let slack = cost[row0 - 1][col - 1] - u[row0] - v[col];
                if slack < min_slack[col] {
                    min_slack[col] = slack;
                    way[col] = col0;
                }
                if min_slack[col] < delta {
                    delta = min_slack[col];
                    col1 = col;
                }
            }
            for col in 0..=m {
                if used[col] {
                    u[owner[col]] += delta;
                    v[col] -= delta;
                } else {
                    min_slack[col] -= delta;
                }
            }
            col0 = col1;
            if owner[col0] == 0 {
                break;
            }
        }
        loop {
            let col1 = way[col0];
            owner[col0] = owner[col1];
            col0 = col1;
            if col0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![None; n];
    for col in 1..=m {
        if owner[col] != 0 {
            assignment[owner[col] - 1] = Some(col - 1);
        }
    }
    assignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Mobility;
    use crate::error::PlanningError;
    use crate::grid::Coord;
    use crate::planner::{ObjectiveWeights, RouteCost};

    fn plan(agent: AgentId, total: f64) -> RoutePlan {
        RoutePlan {
            agent,
            target: Coord::new(0, 0),
            waypoints: vec![Coord::new(0, 0)],
            cost: RouteCost {
                total,
                ..RouteCost::default()
            },
            weights: ObjectiveWeights::risk_only(),
            risk_ceiling: 1.0,
            mobility: Mobility::Ground,
            departure_step: 0,
            wait_steps: 0,
            step_secs: 1.0,
            surface_revision: 0,
            valid: true,
            progress: 0,
        }
    }

    fn table(costs: &[(u32, u32, f64)]) -> CandidateTable {
        let mut table = CandidateTable::default();
        for &(v, a, c) in costs {
            table.insert(VictimId(v), AgentId(a), Ok(plan(AgentId(a), c)));
        }
        table
    }

    #[test]
    fn test_greedy_gives_top_victim_cheapest_agent() {
        let table = table(&[(1, 1, 5.0), (1, 2, 5.0), (2, 1, 3.0), (2, 2, 9.0)]);
        let victims = [VictimId(1), VictimId(2)];
        let agents = [AgentId(1), AgentId(2)];
        let out = GreedyAuction.assign(&victims, &agents, &table);
        assert_eq!(
            out,
            vec![
                Assignment { victim: VictimId(1), agent: AgentId(1) },
                Assignment { victim: VictimId(2), agent: AgentId(2) },
            ]
        );
    }

    #[test]
    fn test_greedy_skips_unreachable_victim() {
        let mut table = table(&[(2, 1, 4.0)]);
        table.insert(
            VictimId(1),
            AgentId(1),
            Err(PlanningError::NoPathFound {
                from: Coord::new(0, 0),
                to: Coord::new(1, 1),
            }),
        );
        let out = GreedyAuction.assign(&[VictimId(1), VictimId(2)], &[AgentId(1)], &table);
        assert_eq!(out, vec![Assignment { victim: VictimId(2), agent: AgentId(1) }]);

        let bids = table.bids(VictimId(1), &[AgentId(1)]);
        assert_eq!(bids[0].total, None);
        assert!(bids[0].failure.as_deref().unwrap().contains("no path"));
    }

    #[test]
    fn test_matching_beats_greedy_total() {
        // Greedy gives victim 1 to agent 1 (cost 1) forcing victim 2 onto agent 2 (cost 10)
        let table = table(&[(1, 1, 1.0), (1, 2, 2.0), (2, 1, 2.0), (2, 2, 10.0)]);
        let victims = [VictimId(1), VictimId(2)];
        let agents = [AgentId(1), AgentId(2)];

        let total = |out: &[Assignment]| -> f64 {
            out.iter().map(|a| table.cost(a.victim, a.agent).unwrap()).sum()
        };
        let greedy = GreedyAuction.assign(&victims, &agents, &table);
        let matched = MinCostMatching.assign(&victims, &agents, &table);
        assert_eq!(total(&greedy), 11.0);
        assert_eq!(total(&matched), 4.0);
        assert_eq!(matched[0], Assignment { victim: VictimId(1), agent: AgentId(2) });
    }

    #[test]
    fn test_matching_limits_to_top_k() {
        let table = table(&[(1, 1, 3.0), (2, 1, 1.0), (3, 1, 0.5)]);
        let out = MinCostMatching.assign(&[VictimId(1), VictimId(2), VictimId(3)], &[AgentId(1)], &table);
        assert_eq!(out, vec![Assignment { victim: VictimId(1), agent: AgentId(1) }]);
    }

    #[test]
    fn test_matching_leaves_infeasible_pairs_out() {
        let table = table(&[(1, 1, 3.0), (2, 1, 1.0)]);
        let out = MinCostMatching.assign(&[VictimId(1), VictimId(2)], &[AgentId(1), AgentId(2)], &table);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_hungarian_rectangular() {
        let cost = vec![vec![4.0, 1.0, 3.0], vec![2.0, 0.0, 5.0]];
        let assignment = hungarian(&cost);
        let total: f64 = assignment
            .iter()
            .enumerate()
            .map(|(r, c)| cost[r][c.unwrap()])
            .sum();
        assert_eq!(total, 3.0);
    }
}
