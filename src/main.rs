/*
 * Toroidal Flocking Simulation
 *
 * Interactive viewer: agents with a mass-damper model flock on a periodic
 * field following separation, alignment, cohesion and repulsion from visited
 * grid cells. Sliders adjust the parameters in real time; arrow keys or WASD
 * take over agent 0.
 */

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use torus_flock::{app, SimulationParams};

#[derive(Parser, Debug)]
#[command(name = "torus_flock", version, about = "Interactive toroidal flocking viewer")]
struct Cli {
    /// JSON parameter file; missing keys use the defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the number of agents.
    #[arg(long)]
    agents: Option<usize>,

    /// Override the random seed.
    #[arg(long)]
    seed: Option<u64>,
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
    params.validate().context("invalid parameters")?;

    info!(agents = params.agent_count, seed = params.seed, "starting viewer");
    app::set_initial_params(params);
    nannou::app(app::model).update(app::update).run();
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
