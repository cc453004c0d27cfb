//! Risk-Aware Multi-Agent Mission Planning Core
//!
//! Plans rescue missions on a discrete hazard grid: hazards raise a risk-cost surface, victims
//! are ranked by severity, urgency and accessibility, and a coordinator hands them to agents
//! along conflict-free, risk-weighted routes that are re-planned when the hazard field moves.
//!
//! ## Flow
//!
//! - [`GridEnvironment`] owns the cell array and hazard events; `tick` and hazard injection
//!   return a [`ChangeSet`] of cells whose risk moved.
//! - [`RiskPropagator`] derives a dense [`RiskSurface`] from the hazard field.
//! - [`Prioritizer`] orders pending victims into an [`OrderedVictimList`].
//! - [`PathPlanner`] runs risk-weighted A* with time-step reservations.
//! - [`Coordinator`] allocates victims to agents, resolves route conflicts, re-plans invalidated
//!   routes and steps agents along their plans, logging every decision as a [`DecisionRecord`].
//!
//! The library never installs a tracing subscriber; binaries and tests do.

// Data model and configuration
pub mod agent;
pub mod config;
pub mod error;
pub mod mission;
pub mod victim;

// Hazard field and risk
pub mod grid;
pub mod risk;

// Planning
pub mod coordinator;
pub mod decision;
pub mod metrics;
pub mod planner;
pub mod prioritizer;

// Re-export main types
pub use agent::{Agent, AgentId, AgentStatus, DisableReason, Mobility};
pub use config::{
    AllocationStrategyKind, Connectivity, CoordinatorConfig, EngineConfig, HazardWeights,
    PlannerConfig, PriorityWeights, RiskConfig,
};
pub use coordinator::{
    AllocationOutcome, AllocationStrategy, Coordinator, ExecutionReport, GreedyAuction,
    MinCostMatching, ReplanOutcome, TaskState,
};
pub use decision::{ConflictAction, DecisionLog, DecisionRecord};
pub use error::{PlanningError, Result};
pub use grid::{
    generate_agents, generate_victims, init_grid, ChangeSet, Coord, GridCell, GridEnvironment,
    GridSnapshot, HazardEvent, HazardType, ScenarioConfig, Terrain,
};
pub use metrics::MissionMetrics;
pub use mission::{Mission, MissionId, MissionStatus};
pub use planner::{
    CancelToken, ObjectiveWeights, PathPlanner, PlanRequest, PlanningObjective, Reservation,
    RouteCost, RoutePlan,
};
pub use prioritizer::{OrderedVictimList, PriorityBreakdown, Prioritizer, ScoredVictim};
pub use risk::{RiskLevel, RiskPropagator, RiskSurface};
pub use victim::{Victim, VictimId, VictimRegistry, VictimStatus};
