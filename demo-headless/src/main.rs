use clap::{Parser, ValueEnum};
use rescue_plan_core::{
    generate_agents, generate_victims, init_grid, AllocationStrategyKind, Coord, Coordinator,
    EngineConfig, MissionMetrics, PlanningObjective, ScenarioConfig, Victim, VictimStatus,
};
use std::error::Error;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    Greedy,
    Matching,
}

impl From<Strategy> for AllocationStrategyKind {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Greedy => AllocationStrategyKind::Greedy,
            Strategy::Matching => AllocationStrategyKind::MinCostMatching,
        }
    }
}

/// Headless rescue mission planner
#[derive(Parser, Debug)]
#[command(name = "demo-headless")]
#[command(about = "Run a seeded rescue mission through the planning engine", long_about = None)]
struct Args {
    /// Grid edge length in cells
    #[arg(short, long, default_value_t = 20)]
    size: usize,

    /// Scenario seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of victims
    #[arg(short, long, default_value_t = 6)]
    victims: usize,

    /// Number of agents
    #[arg(short, long, default_value_t = 3)]
    agents: usize,

    /// Hazard intensity factor (0-1)
    #[arg(long, default_value_t = 0.5)]
    hazard_factor: f64,

    /// Number of simulation ticks
    #[arg(short, long, default_value_t = 120)]
    ticks: usize,

    /// Seconds of hazard time per tick
    #[arg(long, default_value_t = 1.0)]
    dt: f64,

    /// Planning objective (minimize_risk_exposure, minimize_time, balanced)
    #[arg(short, long)]
    objective: Option<PlanningObjective>,

    /// Allocation strategy
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Engine configuration JSON (partial documents allowed)
    #[arg(short, long)]
    config: Option<String>,

    /// Print every decision record as JSON lines
    #[arg(long)]
    dump_decisions: bool,

    /// Debug-level logging unless RUST_LOG is set
    #[arg(long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let mut config: EngineConfig = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };
    if let Some(objective) = args.objective {
        config.coordinator.objective = objective;
    }
    if let Some(strategy) = args.strategy {
        config.coordinator.strategy = strategy.into();
    }

    let scenario = ScenarioConfig {
        size: args.size,
        seed: args.seed,
        hazard_intensity_factor: args.hazard_factor,
        num_victims: args.victims,
        num_agents: args.agents,
        ..ScenarioConfig::default()
    };

    println!("=== Rescue Mission Planner ===\n");
    let (env, snapshot) = init_grid(&scenario, &config)?;
    let mut victims = generate_victims(&env, &scenario)?;
    let occupied: Vec<Coord> = victims.iter().map(Victim::location).collect();
    let mut agents = generate_agents(&env, &scenario, &occupied)?;
    let hazardous = snapshot.cells.iter().filter(|c| c.is_hazardous()).count();
    println!(
        "Grid {}x{} (seed {}), {} hazardous cells, {} victims, {} agents",
        snapshot.width,
        snapshot.height,
        args.seed,
        hazardous,
        victims.len(),
        agents.len()
    );

    let mut coordinator = Coordinator::new(env, config)?;
    println!(
        "Objective: {}, allocation: {}\n",
        coordinator.config().coordinator.objective,
        coordinator.strategy_name()
    );

    let outcome = coordinator.allocate_and_plan(&mut victims, &mut agents)?;
    println!(
        "Initial allocation: {} routes, {} victims pending",
        outcome.plans.len(),
        outcome.unresolved.len()
    );
    let mut decisions = coordinator.take_decisions();

    let mut replans = 0;
    for tick in 1..=args.ticks {
        let changes = coordinator.tick(args.dt)?;
        let replan = coordinator.replan_if_invalidated(&changes, &mut victims, &mut agents)?;
        replans += replan.replanned.len();
        let report = coordinator.advance_agents(&mut victims, &mut agents)?;
        let lost = victims.elapse(args.dt);
        coordinator.allocate_and_plan(&mut victims, &mut agents)?;
        decisions.extend(coordinator.take_decisions());

        if !report.rescued.is_empty() || !lost.is_empty() || !report.disabled.is_empty() {
            println!(
                "[tick {:4}] rescued {:?}, lost {:?}, disabled {:?}",
                tick, report.rescued, lost, report.disabled
            );
        }
        if victims
            .iter()
            .all(|v| matches!(v.status(), VictimStatus::Rescued | VictimStatus::Lost))
        {
            info!("All victims resolved after {} ticks", tick);
            break;
        }
    }

    let metrics = MissionMetrics::collect(&victims, &agents, coordinator.plans());
    println!("\n=== Summary (step {}) ===", coordinator.step());
    println!(
        "Victims: {} rescued, {} lost, {} assigned, {} pending",
        metrics.rescued, metrics.lost, metrics.assigned, metrics.pending
    );
    println!(
        "Agents: {} active, {} disabled, utilisation {:.0}%",
        metrics.active_agents,
        metrics.disabled_agents,
        metrics.utilisation * 100.0
    );
    println!(
        "Planned risk: total {:.3}, mean {:.3}; {} re-plans; {} decisions logged",
        metrics.total_planned_risk,
        metrics.mean_planned_risk,
        replans,
        decisions.len()
    );

    if args.dump_decisions {
        for record in &decisions {
            println!("{}", serde_json::to_string(record)?);
        }
    }
    Ok(())
}
