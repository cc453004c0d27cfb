//! Path planning: risk-weighted A* with time-step reservations

pub mod astar;
pub mod objective;
pub mod request;
pub mod route;

pub use astar::PathPlanner;
pub use objective::{ObjectiveWeights, PlanningObjective};
pub use request::{CancelToken, PlanRequest, Reservation};
pub use route::{RouteCost, RoutePlan};
