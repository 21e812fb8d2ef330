/*
 * Simulation Module
 *
 * Owns the agent population, the occupancy grid and the random generator,
 * and advances everything by one discrete step:
 *
 *   1. snapshot all agents
 *   2. steering for every agent from the snapshot (optionally on rayon)
 *   3. tentative integration
 *   4. collision check against the tentative states, commit or repel
 *   5. mark the grid with the new positions
 *
 * Each agent gets its own sub-seed drawn in index order from the simulation
 * generator, so parallel and sequential runs produce identical results.
 */

use std::collections::{HashMap, HashSet};

use nannou::prelude::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::agent::{self, Agent, AgentKey, PhysicalParams};
use crate::collision;
use crate::debug::{AgentFailure, StepReport};
use crate::error::{ConfigError, SimError};
use crate::flocking::{self, FlockingParams, Steering};
use crate::geometry::FieldBounds;
use crate::integrator::Integration;
use crate::occupancy_grid::OccupancyGrid;
use crate::params::SimulationParams;

#[derive(Debug)]
pub struct Simulation {
    agents: Vec<Agent>,
    grid: OccupancyGrid,
    params: SimulationParams,
    bounds: FieldBounds,
    rng: ChaCha8Rng,
    step_count: u64,
    elapsed: f32,
    last_steering: Vec<Steering>,
}

impl Simulation {
    /// Validate the parameters and spawn `agent_count` agents with ids
    /// `0..agent_count`.
    pub fn new(params: SimulationParams) -> Result<Self, SimError> {
        let mut sim = Self::empty(params)?;
        sim.spawn_population()?;
        info!(
            agents = sim.agents.len(),
            seed = sim.params.seed,
            half_extent = sim.params.field_half_extent,
            "simulation created"
        );
        Ok(sim)
    }

    /// Validated simulation with no agents; add them with [`Simulation::add_agent`].
    pub fn empty(params: SimulationParams) -> Result<Self, SimError> {
        params.validate()?;
        let bounds = params.bounds()?;
        let grid = OccupancyGrid::with_bounds(bounds, params.grid_scale)?;
        let rng = ChaCha8Rng::seed_from_u64(params.seed);

        Ok(Self {
            agents: Vec::with_capacity(params.agent_count),
            grid,
            params,
            bounds,
            rng,
            step_count: 0,
            elapsed: 0.0,
            last_steering: Vec::new(),
        })
    }

    fn spawn_population(&mut self) -> Result<(), SimError> {
        let half = self.params.field_half_extent;
        let range = half * self.params.spawn_fraction;
        for i in 0..self.params.agent_count {
            let id = u32::try_from(i).map_err(|_| ConfigError::InvalidSetting {
                field: "agent_count",
                value: self.params.agent_count as f64,
                reason: "ids must fit in u32",
            })?;
            let mut agent = Agent::init(id, self.params.agent_kind, half, &mut self.rng)?
                .with_physical(self.params.physical)?;
            agent.set_random_position(range, &mut self.rng)?;
            self.agents.push(agent);
        }
        Ok(())
    }

    /// Respawn the population from the configured seed.
    pub fn reset(&mut self) -> Result<(), SimError> {
        self.agents.clear();
        self.grid.clear()?;
        self.rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        self.step_count = 0;
        self.elapsed = 0.0;
        self.last_steering.clear();
        self.spawn_population()?;
        info!(agents = self.agents.len(), "simulation reset");
        Ok(())
    }

    /// Add an agent; it is moved onto this simulation's field. Identities must
    /// be unique.
    pub fn add_agent(&mut self, mut agent: Agent) -> Result<(), SimError> {
        if self.agents.iter().any(|a| a.is_same(&agent)) {
            return Err(ConfigError::DuplicateAgent(agent.key()).into());
        }
        agent.set_bounds(self.bounds);
        self.agents.push(agent);
        Ok(())
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent(&self, key: AgentKey) -> Option<&Agent> {
        self.agents.iter().find(|a| a.key() == key)
    }

    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn bounds(&self) -> &FieldBounds {
        &self.bounds
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Steering computed during the most recent step, in agent order.
    pub fn last_steering(&self) -> &[Steering] {
        &self.last_steering
    }

    pub fn nearest_agent(&self, key: AgentKey) -> Result<Option<AgentKey>, SimError> {
        match self.agent(key) {
            Some(me) => Ok(agent::nearest_agent(me, &self.agents)?),
            None => Ok(None),
        }
    }

    pub fn set_flocking_params(&mut self, flocking: FlockingParams) -> Result<(), ConfigError> {
        flocking.validate()?;
        self.params.flocking = flocking;
        Ok(())
    }

    /// Apply new physical parameters to every agent. Nothing changes if any
    /// agent rejects them.
    pub fn set_physical_params(&mut self, physical: PhysicalParams) -> Result<(), ConfigError> {
        for agent in &self.agents {
            physical.validate(agent.key())?;
        }
        for agent in &mut self.agents {
            agent.set_physical_params(physical)?;
        }
        self.params.physical = physical;
        Ok(())
    }

    /// Update the settings that do not need a respawn: physics, flocking,
    /// time step, clearing, separation and parallelism.
    pub fn apply_live_params(&mut self, params: &SimulationParams) -> Result<(), ConfigError> {
        params.validate()?;
        self.set_physical_params(params.physical)?;
        self.params.flocking = params.flocking;
        self.params.dt = params.dt;
        self.params.grid_clear_interval = params.grid_clear_interval;
        self.params.min_separation = params.min_separation;
        self.params.parallel = params.parallel;
        Ok(())
    }

    pub fn step(&mut self) -> Result<StepReport, SimError> {
        self.step_with_overrides(&HashMap::new())
    }

    /// Advance one step. Agents listed in `overrides` use the given command
    /// instead of their flocking steering.
    pub fn step_with_overrides(&mut self, overrides: &HashMap<AgentKey, Vec2>) -> Result<StepReport, SimError> {
        let dt = self.params.dt;
        let snapshot = self.agents.clone();
        let seeds: Vec<u64> = snapshot.iter().map(|_| self.rng.gen()).collect();

        let mut report = StepReport {
            step: self.step_count + 1,
            ..StepReport::default()
        };

        // Steering from the frozen snapshot
        let steering = self.compute_all_steering(&snapshot, &seeds, overrides);
        report.overrides = snapshot.iter().filter(|a| overrides.contains_key(&a.key())).count();

        // Tentative integration
        let mut failed = HashSet::new();
        let mut commands = Vec::with_capacity(snapshot.len());
        let mut probes = snapshot.clone();
        for (i, result) in steering.into_iter().enumerate() {
            let key = snapshot[i].key();
            let outcome = result.and_then(|s| Ok((s, snapshot[i].drive(s.command, dt)?)));
            match outcome {
                Ok((s, Integration { state, command_reset })) => {
                    if command_reset {
                        report.command_resets += 1;
                    }
                    probes[i].set_state(state)?;
                    commands.push(s);
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    warn!(agent = %key, %error, "agent step rejected, keeping previous state");
                    failed.insert(i);
                    commands.push(Steering::default());
                    report.failures.push(AgentFailure { agent: key, error });
                }
            }
        }

        // Collisions against the tentative states
        for i in 0..self.agents.len() {
            if failed.contains(&i) {
                continue;
            }
            match collision::detect(&probes[i], &probes, self.params.min_separation)? {
                Some(contact) => {
                    collision::apply_repulsion(&mut self.agents[i], contact.repulsion)?;
                    debug!(agent = %probes[i].key(), with = %contact.with, distance = contact.distance, "collision");
                    report.collisions += 1;
                }
                None => self.agents[i].set_state(*probes[i].state())?,
            }
        }

        self.update_grid(&mut report)?;

        self.step_count += 1;
        self.elapsed += dt;
        self.last_steering = commands;

        report.time = self.elapsed;
        report.mean_speed = self.mean_speed();

        debug!(
            step = report.step,
            collisions = report.collisions,
            failures = report.failures.len(),
            new_cells = report.new_cells,
            mean_speed = report.mean_speed,
            "step complete"
        );
        Ok(report)
    }

    fn compute_all_steering(
        &self,
        snapshot: &[Agent],
        seeds: &[u64],
        overrides: &HashMap<AgentKey, Vec2>,
    ) -> Vec<Result<Steering, SimError>> {
        let grid = &self.grid;
        let flocking = &self.params.flocking;

        let steer = |agent: &Agent, seed: u64| -> Result<Steering, SimError> {
            if let Some(&command) = overrides.get(&agent.key()) {
                return Ok(Steering { command, ..Steering::default() });
            }
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            flocking::compute_steering(agent, snapshot, grid, flocking, &mut rng)
        };

        if self.params.parallel {
            snapshot
                .par_iter()
                .zip(seeds.par_iter())
                .map(|(agent, &seed)| steer(agent, seed))
                .collect()
        } else {
            snapshot
                .iter()
                .zip(seeds.iter())
                .map(|(agent, &seed)| steer(agent, seed))
                .collect()
        }
    }

    // Grid writes happen here only, after every agent has moved
    fn update_grid(&mut self, report: &mut StepReport) -> Result<(), SimError> {
        let interval = self.params.grid_clear_interval;
        if interval > 0 && (self.step_count + 1) % interval == 0 {
            self.grid.clear()?;
            report.grid_cleared = true;
        }

        for agent in &self.agents {
            match self.grid.assign(agent.key(), agent.position()) {
                Ok(true) => report.new_cells += 1,
                Ok(false) => {}
                Err(error) => {
                    warn!(agent = %agent.key(), %error, "position not on the grid");
                    report.grid_misses += 1;
                }
            }
        }
        Ok(())
    }

    fn mean_speed(&self) -> f32 {
        if self.agents.is_empty() {
            return 0.0;
        }
        self.agents.iter().map(|a| a.velocity().length()).sum::<f32>() / self.agents.len() as f32
    }
}
