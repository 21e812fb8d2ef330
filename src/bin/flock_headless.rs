/*
 * Headless Runner
 *
 * Runs the flocking simulation without a window for a fixed number of steps
 * and logs periodic summaries. Useful for long runs and parameter sweeps.
 */

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use torus_flock::{Simulation, SimulationParams, StepStats};

#[derive(Parser, Debug)]
#[command(name = "flock_headless", version, about = "Run the toroidal flocking simulation without a window")]
struct Cli {
    /// Number of steps to simulate.
    #[arg(long, default_value_t = 1000)]
    steps: u64,

    /// Override the number of agents.
    #[arg(long)]
    agents: Option<usize>,

    /// Override the random seed.
    #[arg(long)]
    seed: Option<u64>,

    /// JSON parameter file; missing keys use the defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log a summary every N steps (0 disables).
    #[arg(long, default_value_t = 100)]
    report_every: u64,

    /// Compute steering on all cores.
    #[arg(long)]
    parallel: bool,

    /// Print the effective parameters as JSON and exit.
    #[arg(long)]
    dump_config: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut params = match &cli.config {
        Some(path) => SimulationParams::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => SimulationParams::default(),
    };
    if let Some(agents) = cli.agents {
        params.agent_count = agents;
    }
    if let Some(seed) = cli.seed {
        params.seed = seed;
    }
    params.parallel |= cli.parallel;

    if cli.dump_config {
        println!("{}", params.to_json_pretty()?);
        return Ok(());
    }

    let mut sim = Simulation::new(params).context("building simulation")?;
    info!(agents = sim.agents().len(), steps = cli.steps, "headless run started");

    let started = Instant::now();
    let mut stats = StepStats::default();
    for _ in 0..cli.steps {
        let report = sim.step()?;
        stats.record(&report);

        if !report.is_clean() {
            warn!(
                step = report.step,
                failures = report.failures.len(),
                grid_misses = report.grid_misses,
                "step had rejected updates"
            );
        }
        if cli.report_every > 0 && report.step % cli.report_every == 0 {
            info!(
                step = report.step,
                time = report.time,
                collisions = report.collisions,
                mean_speed = report.mean_speed,
                coverage = sim.grid().coverage()?,
                "progress"
            );
        }
    }

    let wall = started.elapsed();
    info!(
        steps = stats.steps,
        sim_seconds = sim.elapsed(),
        wall_ms = wall.as_millis() as u64,
        collisions = stats.collisions,
        collisions_per_step = stats.collisions_per_step(),
        command_resets = stats.command_resets,
        failures = stats.failures,
        coverage = sim.grid().coverage()?,
        "headless run finished"
    );

    let updates = stats.steps * sim.agents().len() as u64;
    if updates > 0 && stats.failures as u64 == updates {
        bail!("every agent update was rejected");
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
