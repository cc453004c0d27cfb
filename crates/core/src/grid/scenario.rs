//! Seeded procedural scenario generation
//!
//! Hazard density follows `size² × factor × 0.05` events with intensity
//! `U(0.1, 1.0) × factor`. Victims and agents are placed on distinct enterable cells.

use crate::agent::{Agent, AgentId, Mobility};
use crate::config::EngineConfig;
use crate::error::{PlanningError, Result};
use crate::grid::{Coord, GridEnvironment, GridSnapshot, HazardEvent, HazardType, Terrain};
use crate::victim::{Victim, VictimId, VictimRegistry};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Fraction of the grid that becomes hazard origins at factor 1.0
const HAZARD_DENSITY: f64 = 0.05;
const RUBBLE_FRACTION: f64 = 0.10;
const WATER_FRACTION: f64 = 0.05;

/// Survival window range for generated victims (30 minutes to 6 hours)
const SURVIVAL_WINDOW_SECS: std::ops::Range<f64> = 1800.0..21_600.0;

/// Energy budget of generated agents
const GENERATED_AGENT_ENERGY: f64 = 250.0;

/// Parameters of a generated mission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Side length of the square grid
    pub size: usize,
    pub seed: u64,
    /// Scales both hazard count and hazard intensity, in [0, 1]
    pub hazard_intensity_factor: f64,
    pub wall_fraction: f64,
    pub num_victims: usize,
    pub num_agents: usize,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            size: 20,
            seed: 42,
            hazard_intensity_factor: 0.5,
            wall_fraction: 0.05,
            num_victims: 6,
            num_agents: 3,
        }
    }
}

impl ScenarioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(PlanningError::config("scenario size must be positive"));
        }
        if !(0.0..=1.0).contains(&self.hazard_intensity_factor) {
            return Err(PlanningError::config(
                "hazard_intensity_factor must be within [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.wall_fraction) {
            return Err(PlanningError::config("wall_fraction must be within [0, 1]"));
        }
        Ok(())
    }

    /// Number of hazard events placed at initialisation
    pub fn hazard_count(&self) -> usize {
        (self.size as f64 * self.size as f64 * self.hazard_intensity_factor * HAZARD_DENSITY)
            as usize
    }
}

/// Build a seeded grid with terrain and initial hazards
pub fn init_grid(
    scenario: &ScenarioConfig,
    config: &EngineConfig,
) -> Result<(GridEnvironment, GridSnapshot)> {
    scenario.validate()?;
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(scenario.seed);
    let size = scenario.size;

    let terrain: Vec<Terrain> = (0..size * size)
        .map(|_| {
            let roll: f64 = rng.random();
            if roll < scenario.wall_fraction {
                Terrain::Wall
            } else if roll < scenario.wall_fraction + RUBBLE_FRACTION {
                Terrain::Rubble
            } else if roll < scenario.wall_fraction + RUBBLE_FRACTION + WATER_FRACTION {
                Terrain::Water
            } else {
                Terrain::Open
            }
        })
        .collect();
    let mut env = GridEnvironment::with_terrain(size, size, terrain, scenario.seed, config.risk.clone())?;

    let passable: Vec<Coord> = env
        .cells()
        .iter()
        .filter(|c| c.terrain().is_passable())
        .map(|c| c.coord())
        .collect();
    if !passable.is_empty() {
        for _ in 0..scenario.hazard_count() {
            let origin = passable[rng.random_range(0..passable.len())];
            let hazard_type = HazardType::ACTIVE[rng.random_range(0..HazardType::ACTIVE.len())];
            let intensity = rng.random_range(0.1..1.0) * scenario.hazard_intensity_factor;
            let spread = rng.random_range(0.05..0.3);
            let decay = rng.random_range(0.5..0.9);
            env.apply_hazard_event(HazardEvent::new(origin, hazard_type, intensity, spread, decay)?)?;
        }
    }

    info!(
        "Generated {}x{} scenario with {} hazards (seed {})",
        size,
        size,
        env.events().len(),
        scenario.seed
    );
    let snapshot = env.snapshot()?;
    Ok((env, snapshot))
}

/// Enterable cells in a seeded random order, minus the excluded ones
fn free_cells(env: &GridEnvironment, exclude: &[Coord], rng: &mut StdRng) -> Result<Vec<Coord>> {
    let propagator = env.propagator()?;
    let mut cells: Vec<Coord> = env
        .cells()
        .iter()
        .filter(|c| !propagator.is_blocked(c) && !exclude.contains(&c.coord()))
        .map(|c| c.coord())
        .collect();
    cells.shuffle(rng);
    Ok(cells)
}

/// Place victims on distinct enterable cells
pub fn generate_victims(env: &GridEnvironment, scenario: &ScenarioConfig) -> Result<VictimRegistry> {
    let mut rng = StdRng::seed_from_u64(scenario.seed.wrapping_add(1));
    let cells = free_cells(env, &[], &mut rng)?;
    if cells.len() < scenario.num_victims {
        return Err(PlanningError::config(format!(
            "only {} free cells for {} victims",
            cells.len(),
            scenario.num_victims
        )));
    }

    let mut registry = VictimRegistry::new();
    for (index, location) in cells.into_iter().take(scenario.num_victims).enumerate() {
        let severity = rng.random_range(1..=5);
        let window = rng.random_range(SURVIVAL_WINDOW_SECS);
        let id = VictimId(u32::try_from(index + 1).map_err(|_| PlanningError::config("too many victims"))?);
        registry.insert(Victim::new(id, location, severity, window)?)?;
    }
    Ok(registry)
}

/// Place agents on distinct enterable cells not already holding a victim
///
/// Every third agent is aerial.
pub fn generate_agents(
    env: &GridEnvironment,
    scenario: &ScenarioConfig,
    occupied: &[Coord],
) -> Result<Vec<Agent>> {
    let mut rng = StdRng::seed_from_u64(scenario.seed.wrapping_add(2));
    let cells = free_cells(env, occupied, &mut rng)?;
    if cells.len() < scenario.num_agents {
        return Err(PlanningError::config(format!(
            "only {} free cells for {} agents",
            cells.len(),
            scenario.num_agents
        )));
    }

    cells
        .into_iter()
        .take(scenario.num_agents)
        .enumerate()
        .map(|(index, location)| {
            let id = AgentId(u32::try_from(index + 1).map_err(|_| PlanningError::config("too many agents"))?);
            let mobility = if index % 3 == 2 {
                Mobility::Aerial
            } else {
                Mobility::Ground
            };
            Ok(Agent::new(id, location, mobility).with_energy(GENERATED_AGENT_ENERGY))
        })
        .collect()
}
