/*
 * Toroidal Flocking Simulation - Module Definitions
 *
 * Point agents with a mass-damper model flocking on a periodic 2-D field.
 * The core (geometry, agent, integrator, collision, flocking, grid and the
 * simulation step) is window-free; the app, renderer, input and ui modules
 * make up the nannou viewer.
 */

// Re-export key components for easier access
pub use agent::{nearest_agent, Agent, AgentKey, AgentState, PhysicalParams};
pub use collision::{step_agent, CollisionOutcome};
pub use debug::{DebugInfo, StepReport, StepStats};
pub use error::{ConfigError, NumericError, SimError, SimResult, ValidationError};
pub use flocking::{compute_steering, FlockingParams, FlockingWeights, RandomWalk, Steering};
pub use geometry::FieldBounds;
pub use occupancy_grid::OccupancyGrid;
pub use params::SimulationParams;
pub use simulation::Simulation;

// Define modules
pub mod agent;
pub mod app;
pub mod collision;
pub mod debug;
pub mod error;
pub mod flocking;
pub mod geometry;
pub mod input;
pub mod integrator;
pub mod occupancy_grid;
pub mod params;
pub mod renderer;
pub mod simulation;
pub mod ui;

// Model defaults
pub const DEFAULT_U_MAX: f32 = 50.0;
pub const DEFAULT_V_MAX: f32 = 50.0;
pub const DEFAULT_M: f32 = 1.0;
pub const DEFAULT_D: f32 = 1.0;
pub const DEFAULT_G: f32 = 4.0;
pub const DEFAULT_SIGHT_RANGE: f32 = 200.0;
pub const DEFAULT_SIGHT_ANGLE: f32 = 360.0;
pub const DEFAULT_SIGHT_SIGMA: f32 = 0.0;
pub const DEFAULT_RADIUS: f32 = 2.0;
pub const DEFAULT_FIELD_MAX: f32 = 100.0;

/// Simulation time step in seconds.
pub const SAMPLING_TIME: f32 = 0.033;
