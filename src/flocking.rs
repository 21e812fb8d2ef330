/*
 * Flocking Module
 *
 * Boid steering law: separation, alignment and cohesion over the neighbours
 * in sight, repulsion from occupied grid cells, and an optional random walk.
 *
 *     u = k1*sep + k2*align + k3*coh + k4*env + k5*walk
 *
 * The policy only reads the agent snapshot and the grid; it never mutates
 * either.
 */

use nannou::prelude::{vec2, Vec2};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::error::{ConfigError, SimError, ValidationError};
use crate::geometry::{self, normalize};
use crate::occupancy_grid::OccupancyGrid;

/// Sight range used for flocking neighbours unless configured otherwise.
pub const DEFAULT_FLOCK_SIGHT: f32 = 100.0;

/// Distances below this are treated as this value in the falloff terms.
pub const DEFAULT_MIN_DISTANCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlockingWeights {
    pub separation: f32,
    pub alignment: f32,
    pub cohesion: f32,
    pub environment: f32,
    pub random_walk: f32,
}

impl Default for FlockingWeights {
    fn default() -> Self {
        Self {
            separation: 1.3,
            alignment: 1.0,
            cohesion: 1.8,
            environment: 4.0,
            random_walk: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RandomWalk {
    #[default]
    Off,
    /// Each axis uniform in `[-range, range]`.
    Uniform { range: f32 },
    /// Each axis drawn from `N(mean, sigma)`.
    Gaussian { mean: f32, sigma: f32 },
}

impl RandomWalk {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec2, ValidationError> {
        match *self {
            RandomWalk::Off => Ok(Vec2::ZERO),
            RandomWalk::Uniform { range } => random_walk_uniform(range, rng),
            RandomWalk::Gaussian { mean, sigma } => random_walk_gaussian(mean, sigma, rng),
        }
    }
}

pub fn random_walk_uniform<R: Rng + ?Sized>(range: f32, rng: &mut R) -> Result<Vec2, ValidationError> {
    if !range.is_finite() || range < 0.0 {
        return Err(ValidationError::InvalidArgument { what: "random walk range", value: range });
    }
    if range == 0.0 {
        return Ok(Vec2::ZERO);
    }
    Ok(vec2(rng.gen_range(-range..=range), rng.gen_range(-range..=range)))
}

pub fn random_walk_gaussian<R: Rng + ?Sized>(mean: f32, sigma: f32, rng: &mut R) -> Result<Vec2, ValidationError> {
    if !mean.is_finite() {
        return Err(ValidationError::InvalidArgument { what: "random walk mean", value: mean });
    }
    let normal = Normal::new(mean, sigma)
        .ok()
        .filter(|_| sigma.is_finite())
        .ok_or(ValidationError::InvalidArgument { what: "random walk sigma", value: sigma })?;
    Ok(vec2(normal.sample(rng), normal.sample(rng)))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlockingParams {
    pub weights: FlockingWeights,
    pub sight_range: f32,
    pub random_walk: RandomWalk,
    /// Rescale the combined steering vector to unit length.
    pub normalize_output: bool,
    pub min_distance: f32,
}

impl Default for FlockingParams {
    fn default() -> Self {
        Self {
            weights: FlockingWeights::default(),
            sight_range: DEFAULT_FLOCK_SIGHT,
            random_walk: RandomWalk::Off,
            normalize_output: false,
            min_distance: DEFAULT_MIN_DISTANCE,
        }
    }
}

impl FlockingParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.weights;
        let fields = [
            ("flocking.weights.separation", w.separation),
            ("flocking.weights.alignment", w.alignment),
            ("flocking.weights.cohesion", w.cohesion),
            ("flocking.weights.environment", w.environment),
            ("flocking.weights.random_walk", w.random_walk),
            ("flocking.sight_range", self.sight_range),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidSetting {
                    field,
                    value: value as f64,
                    reason: "must be non-negative and finite",
                });
            }
        }
        if !self.min_distance.is_finite() || self.min_distance <= 0.0 {
            return Err(ConfigError::InvalidSetting {
                field: "flocking.min_distance",
                value: self.min_distance as f64,
                reason: "must be positive and finite",
            });
        }
        match self.random_walk {
            RandomWalk::Off => {}
            RandomWalk::Uniform { range } if range.is_finite() && range >= 0.0 => {}
            RandomWalk::Uniform { range } => {
                return Err(ConfigError::InvalidSetting {
                    field: "flocking.random_walk.range",
                    value: range as f64,
                    reason: "must be non-negative and finite",
                })
            }
            RandomWalk::Gaussian { mean, sigma } => {
                if !mean.is_finite() || !sigma.is_finite() || sigma < 0.0 {
                    return Err(ConfigError::InvalidSetting {
                        field: "flocking.random_walk.sigma",
                        value: sigma as f64,
                        reason: "mean must be finite and sigma non-negative",
                    });
                }
            }
        }
        Ok(())
    }
}

/// Steering vector plus its unweighted components.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Steering {
    pub command: Vec2,
    pub separation: Vec2,
    pub alignment: Vec2,
    pub cohesion: Vec2,
    pub environment: Vec2,
    pub random_walk: Vec2,
    pub neighbours: usize,
    pub occupied_cells: usize,
}

/// Compute the steering command for `agent` from a snapshot of `others`.
///
/// Neighbours are the other agents whose perceived surface distance is under
/// `params.sight_range` and that fall inside the agent's field of view.
/// Perception noise follows the agent's `sight_sigma`.
pub fn compute_steering<R: Rng + ?Sized>(
    agent: &Agent,
    others: &[Agent],
    grid: &OccupancyGrid,
    params: &FlockingParams,
    rng: &mut R,
) -> Result<Steering, SimError> {
    let position = agent.position();
    let bounds = agent.bounds();
    let sigma = agent.physical().sight_sigma;
    let min_distance = params.min_distance;

    let mut steering = Steering::default();
    let mut cohesion_sum = Vec2::ZERO;

    for other in others {
        if agent.is_same(other) {
            continue;
        }
        let towards = geometry::perceived_displacement(position, other.position(), bounds, sigma, rng)?;
        let distance = towards.length() - agent.radius() - other.radius();
        if distance >= params.sight_range || !agent.sees_direction(towards) {
            continue;
        }

        let d = distance.max(min_distance);
        steering.separation += -towards / (d * d);
        steering.alignment += other.velocity();
        // Unwrapped image of the neighbour, so the centroid does not jump at the edges
        cohesion_sum += position + towards;
        steering.neighbours += 1;
    }

    if steering.neighbours > 0 {
        let count = steering.neighbours as f32;
        steering.alignment /= count;
        steering.cohesion = cohesion_sum / count - position;
    }

    let (environment, occupied_cells) = environment_repulsion(agent, grid, params)?;
    steering.environment = environment;
    steering.occupied_cells = occupied_cells;

    steering.random_walk = params.random_walk.sample(rng)?;

    let w = &params.weights;
    let mut command = w.separation * steering.separation
        + w.alignment * steering.alignment
        + w.cohesion * steering.cohesion
        + w.environment * steering.environment
        + w.random_walk * steering.random_walk;

    if params.normalize_output {
        command = normalize(command).0;
    }
    steering.command = command;
    Ok(steering)
}

/// Inverse-cube push away from every occupied cell within sight, except the
/// cell the agent is standing in.
pub fn environment_repulsion(
    agent: &Agent,
    grid: &OccupancyGrid,
    params: &FlockingParams,
) -> Result<(Vec2, usize), ValidationError> {
    let position = agent.position();
    let own_cell = grid.index(position).ok();

    let mut repulsion = Vec2::ZERO;
    let mut count = 0;
    for cell in grid.neighborhood(position, params.sight_range)? {
        if Some(cell) == own_cell {
            continue;
        }
        let away = position - grid.cell_center(cell)?;
        let d = away.length().max(params.min_distance);
        repulsion += away / (d * d * d);
        count += 1;
    }
    Ok((repulsion, count))
}
