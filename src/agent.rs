/*
 * Agent Module
 *
 * This module defines the Agent value type: identity, the 8-scalar kinematic
 * state (position, velocity, acceleration, last command), the physical
 * parameters of the mass-damper model, and the periodic field it lives in.
 * Agents are mutated in place once per step by the integrator and the
 * collision resolver; every setter validates before committing.
 */

use std::fmt;

use nannou::prelude::{pt2, vec2, Point2, Vec2};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, NumericError, SimError, ValidationError};
use crate::geometry::{self, FieldBounds};
use crate::integrator::{self, Integration};
use crate::{
    DEFAULT_D, DEFAULT_G, DEFAULT_M, DEFAULT_RADIUS, DEFAULT_SIGHT_ANGLE, DEFAULT_SIGHT_RANGE,
    DEFAULT_SIGHT_SIGMA, DEFAULT_U_MAX, DEFAULT_V_MAX,
};

// Initial positions are drawn from this fraction of the field extent
const SPAWN_FRACTION: f32 = 0.85;

/// Identity of an agent: id plus type tag. Two agents are "the same" only
/// when both match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentKey {
    pub id: u32,
    pub kind: u32,
}

impl AgentKey {
    pub fn new(id: u32, kind: u32) -> Self {
        Self { id, kind }
    }
}

impl fmt::Display for AgentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Mass-damper model parameters and perception limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicalParams {
    pub mass: f32,
    pub damping: f32,
    pub gain: f32,
    pub u_max: f32,
    pub v_max: f32,
    pub sight_range: f32,
    /// Full field-of-view in degrees; 360 sees everything.
    pub sight_angle: f32,
    /// Standard deviation of the perception noise on observed positions.
    pub sight_sigma: f32,
    pub radius: f32,
}

impl Default for PhysicalParams {
    fn default() -> Self {
        Self {
            mass: DEFAULT_M,
            damping: DEFAULT_D,
            gain: DEFAULT_G,
            u_max: DEFAULT_U_MAX,
            v_max: DEFAULT_V_MAX,
            sight_range: DEFAULT_SIGHT_RANGE,
            sight_angle: DEFAULT_SIGHT_ANGLE,
            sight_sigma: DEFAULT_SIGHT_SIGMA,
            radius: DEFAULT_RADIUS,
        }
    }
}

impl PhysicalParams {
    pub fn validate(&self, agent: AgentKey) -> Result<(), ConfigError> {
        let fields = [
            ("mass", self.mass),
            ("damping", self.damping),
            ("gain", self.gain),
            ("u_max", self.u_max),
            ("v_max", self.v_max),
            ("sight_range", self.sight_range),
            ("sight_angle", self.sight_angle),
            ("sight_sigma", self.sight_sigma),
            ("radius", self.radius),
        ];
        for (field, value) in fields {
            check_parameter(agent, field, value)?;
        }
        if self.mass <= 0.0 {
            return Err(ConfigError::NonPositiveMass { agent, value: self.mass });
        }
        Ok(())
    }
}

fn check_parameter(agent: AgentKey, field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NonFiniteParameter { agent, field, value });
    }
    if value < 0.0 {
        return Err(ConfigError::NegativeParameter { agent, field, value });
    }
    Ok(())
}

/// The 8-scalar state vector `[x, y, vx, vy, ax, ay, ux, uy]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AgentState {
    pub position: Point2,
    pub velocity: Vec2,
    pub acceleration: Vec2,
    pub command: Vec2,
}

impl AgentState {
    pub const SIZE: usize = 8;

    pub fn at_rest(position: Point2) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn to_array(&self) -> [f32; Self::SIZE] {
        [
            self.position.x,
            self.position.y,
            self.velocity.x,
            self.velocity.y,
            self.acceleration.x,
            self.acceleration.y,
            self.command.x,
            self.command.y,
        ]
    }

    pub fn from_slice(values: &[f32]) -> Result<Self, ValidationError> {
        if values.len() != Self::SIZE {
            return Err(ValidationError::DimensionMismatch {
                expected: Self::SIZE,
                got: values.len(),
            });
        }
        for (index, &value) in values.iter().enumerate() {
            if !value.is_finite() {
                return Err(ValidationError::NonFiniteInput { what: "agent state", index, value });
            }
        }
        Ok(Self {
            position: pt2(values[0], values[1]),
            velocity: vec2(values[2], values[3]),
            acceleration: vec2(values[4], values[5]),
            command: vec2(values[6], values[7]),
        })
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    key: AgentKey,
    state: AgentState,
    physical: PhysicalParams,
    bounds: FieldBounds,
}

impl Agent {
    /// Agent at rest in the middle of `bounds` with default physics.
    pub fn new(id: u32, kind: u32, bounds: FieldBounds) -> Self {
        Self {
            key: AgentKey::new(id, kind),
            state: AgentState::at_rest(bounds.center()),
            physical: PhysicalParams::default(),
            bounds,
        }
    }

    /// Create an agent on the square field `[-half_extent, half_extent]²`.
    /// Position is uniform within 85% of the extent; velocity, acceleration
    /// and command components are drawn from N(0, 1).
    pub fn init<R: Rng + ?Sized>(id: u32, kind: u32, half_extent: f32, rng: &mut R) -> Result<Self, SimError> {
        let bounds = FieldBounds::symmetric(half_extent)?;
        let mut agent = Self::new(id, kind, bounds);

        agent.state.position = pt2(
            rng.gen_range(bounds.x_min * SPAWN_FRACTION..=bounds.x_max * SPAWN_FRACTION),
            rng.gen_range(bounds.y_min * SPAWN_FRACTION..=bounds.y_max * SPAWN_FRACTION),
        );
        let mut noise = [0.0f32; 6];
        for v in noise.iter_mut() {
            *v = StandardNormal.sample(&mut *rng);
        }
        agent.state.velocity = vec2(noise[0], noise[1]);
        agent.state.acceleration = vec2(noise[2], noise[3]);
        agent.state.command = vec2(noise[4], noise[5]);

        Ok(agent)
    }

    pub fn with_physical(mut self, physical: PhysicalParams) -> Result<Self, ConfigError> {
        self.set_physical_params(physical)?;
        Ok(self)
    }

    pub fn with_state(mut self, state: AgentState) -> Result<Self, SimError> {
        self.set_state(state)?;
        Ok(self)
    }

    // Identity

    #[inline]
    pub fn key(&self) -> AgentKey {
        self.key
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.key.id
    }

    #[inline]
    pub fn kind(&self) -> u32 {
        self.key.kind
    }

    pub fn label(&self) -> String {
        self.key.to_string()
    }

    pub fn is_same(&self, other: &Agent) -> bool {
        self.key == other.key
    }

    // State access

    #[inline]
    pub fn state(&self) -> &AgentState {
        &self.state
    }

    #[inline]
    pub fn position(&self) -> Point2 {
        self.state.position
    }

    #[inline]
    pub fn velocity(&self) -> Vec2 {
        self.state.velocity
    }

    #[inline]
    pub fn acceleration(&self) -> Vec2 {
        self.state.acceleration
    }

    #[inline]
    pub fn command(&self) -> Vec2 {
        self.state.command
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.physical.radius
    }

    #[inline]
    pub fn physical(&self) -> &PhysicalParams {
        &self.physical
    }

    #[inline]
    pub fn bounds(&self) -> &FieldBounds {
        &self.bounds
    }

    /// Replace the whole state. Rejected (state untouched) if any component
    /// is non-finite.
    pub fn set_state(&mut self, state: AgentState) -> Result<(), NumericError> {
        if !state.is_finite() {
            return Err(NumericError::NonFiniteState { agent: self.key });
        }
        self.state = state;
        Ok(())
    }

    pub fn set_position(&mut self, position: Point2) -> Result<(), NumericError> {
        self.check_vector("position", position)?;
        self.state.position = self.bounds.wrap_fully(position);
        Ok(())
    }

    pub fn set_velocity(&mut self, velocity: Vec2) -> Result<(), NumericError> {
        self.check_vector("velocity", velocity)?;
        self.state.velocity = velocity;
        Ok(())
    }

    /// Instantaneous positional nudge, wrapped back into the field.
    pub fn add_position(&mut self, delta: Vec2) -> Result<(), NumericError> {
        self.set_position(self.state.position + delta)
    }

    /// Uniform placement in `[-range, range]` on both axes, folded back into
    /// the field when the range is wider than it.
    pub fn set_random_position<R: Rng + ?Sized>(&mut self, range: f32, rng: &mut R) -> Result<(), ValidationError> {
        if !range.is_finite() || range < 0.0 {
            return Err(ValidationError::InvalidArgument { what: "placement range", value: range });
        }
        let p = pt2(rng.gen_range(-range..=range), rng.gen_range(-range..=range));
        self.state.position = self.bounds.wrap_fully(p);
        Ok(())
    }

    fn check_vector(&self, quantity: &'static str, v: Vec2) -> Result<(), NumericError> {
        if v.is_finite() {
            Ok(())
        } else {
            Err(NumericError::NonFinite { agent: self.key, quantity, x: v.x, y: v.y })
        }
    }

    // Physical parameters

    pub fn set_physical_params(&mut self, physical: PhysicalParams) -> Result<(), ConfigError> {
        physical.validate(self.key)?;
        self.physical = physical;
        Ok(())
    }

    pub fn set_mass(&mut self, mass: f32) -> Result<(), ConfigError> {
        self.set_physical_params(PhysicalParams { mass, ..self.physical })
    }

    pub fn set_damping(&mut self, damping: f32) -> Result<(), ConfigError> {
        self.set_physical_params(PhysicalParams { damping, ..self.physical })
    }

    pub fn set_gain(&mut self, gain: f32) -> Result<(), ConfigError> {
        self.set_physical_params(PhysicalParams { gain, ..self.physical })
    }

    pub fn set_u_max(&mut self, u_max: f32) -> Result<(), ConfigError> {
        self.set_physical_params(PhysicalParams { u_max, ..self.physical })
    }

    pub fn set_v_max(&mut self, v_max: f32) -> Result<(), ConfigError> {
        self.set_physical_params(PhysicalParams { v_max, ..self.physical })
    }

    pub fn set_sight_range(&mut self, sight_range: f32) -> Result<(), ConfigError> {
        self.set_physical_params(PhysicalParams { sight_range, ..self.physical })
    }

    pub fn set_sight_sigma(&mut self, sight_sigma: f32) -> Result<(), ConfigError> {
        self.set_physical_params(PhysicalParams { sight_sigma, ..self.physical })
    }

    pub fn set_radius(&mut self, radius: f32) -> Result<(), ConfigError> {
        self.set_physical_params(PhysicalParams { radius, ..self.physical })
    }

    /// Move the agent to another field; the position is wrapped into it.
    pub fn set_bounds(&mut self, bounds: FieldBounds) {
        self.bounds = bounds;
        self.state.position = bounds.wrap_fully(self.state.position);
    }

    // Relations to other agents

    pub fn displacement_to(&self, other: &Agent) -> Result<Vec2, ValidationError> {
        geometry::displacement(self.position(), other.position(), &self.bounds)
    }

    /// Toroidal surface distance (centre distance minus both radii).
    pub fn distance_to(&self, other: &Agent) -> Result<f32, ValidationError> {
        geometry::distance(self.position(), other.position(), &self.bounds, self.radius(), other.radius())
    }

    /// Angle in degrees between the heading and the direction to `other`.
    /// `None` while standing still.
    pub fn bearing_to(&self, other: &Agent) -> Result<Option<f32>, ValidationError> {
        let towards = self.displacement_to(other)?;
        Ok(geometry::relative_bearing_deg(self.velocity(), towards))
    }

    /// Whether a direction falls inside the field of view. A stationary agent
    /// has no heading and sees all around.
    pub fn sees_direction(&self, direction: Vec2) -> bool {
        if self.physical.sight_angle >= 360.0 {
            return true;
        }
        match geometry::relative_bearing_deg(self.velocity(), direction) {
            Some(bearing) => bearing.abs() <= 0.5 * self.physical.sight_angle,
            None => true,
        }
    }

    pub fn is_in_sight(&self, other: &Agent) -> Result<bool, ValidationError> {
        if self.is_same(other) {
            return Ok(false);
        }
        if self.distance_to(other)? >= self.physical.sight_range {
            return Ok(false);
        }
        Ok(self.sees_direction(self.displacement_to(other)?))
    }

    // Dynamics

    /// Integrate one step without committing it.
    pub fn drive(&self, command: Vec2, dt: f32) -> Result<Integration, SimError> {
        integrator::drive(self.key, &self.state, &self.physical, &self.bounds, command, dt)
    }

    /// Integrate one step and commit it. On failure the state is untouched.
    pub fn drive_in_place(&mut self, command: Vec2, dt: f32) -> Result<Integration, SimError> {
        let integration = self.drive(command, dt)?;
        self.state = integration.state;
        Ok(integration)
    }
}

/// Closest other agent by toroidal surface distance.
pub fn nearest_agent(agent: &Agent, others: &[Agent]) -> Result<Option<AgentKey>, ValidationError> {
    let mut nearest = None;
    let mut min_distance = f32::INFINITY;
    for other in others {
        if agent.is_same(other) {
            continue;
        }
        let d = agent.distance_to(other)?;
        if d < min_distance {
            min_distance = d;
            nearest = Some(other.key());
        }
    }
    Ok(nearest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn field() -> FieldBounds {
        FieldBounds::symmetric(100.0).unwrap()
    }

    #[test]
    fn init_places_agent_inside_spawn_area() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for id in 0..50 {
            let agent = Agent::init(id, 0, 100.0, &mut rng).unwrap();
            assert!(agent.position().x.abs() <= 85.0);
            assert!(agent.position().y.abs() <= 85.0);
            assert!(agent.state().is_finite());
            assert_eq!(agent.key(), AgentKey::new(id, 0));
        }
    }

    #[test]
    fn init_rejects_bad_field() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = Agent::init(0, 0, -1.0, &mut rng).unwrap_err();
        assert!(matches!(err, SimError::Config(ConfigError::InvalidBounds { .. })));
    }

    #[test]
    fn negative_parameters_are_rejected_with_context() {
        let mut agent = Agent::new(3, 1, field());
        let err = agent.set_damping(-0.5).unwrap_err();
        assert_eq!(
            err,
            ConfigError::NegativeParameter {
                agent: AgentKey::new(3, 1),
                field: "damping",
                value: -0.5
            }
        );
        assert_eq!(agent.physical().damping, DEFAULT_D);

        assert!(matches!(agent.set_mass(0.0), Err(ConfigError::NonPositiveMass { .. })));
        assert!(matches!(agent.set_radius(f32::NAN), Err(ConfigError::NonFiniteParameter { .. })));
        agent.set_u_max(10.0).unwrap();
        assert_eq!(agent.physical().u_max, 10.0);
    }

    #[test]
    fn non_finite_state_is_never_committed() {
        let mut agent = Agent::new(0, 0, field());
        let before = *agent.state();
        assert!(agent.set_velocity(vec2(f32::NAN, 0.0)).is_err());
        assert!(agent.set_position(pt2(0.0, f32::INFINITY)).is_err());
        assert_eq!(*agent.state(), before);
    }

    #[test]
    fn state_round_trips_through_slices() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let state = AgentState::from_slice(&values).unwrap();
        assert_eq!(state.to_array(), values);
        assert!(AgentState::from_slice(&values[..7]).is_err());
    }

    #[test]
    fn random_position_respects_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut agent = Agent::new(0, 0, field());
        for _ in 0..20 {
            agent.set_random_position(75.0, &mut rng).unwrap();
            assert!(agent.position().x.abs() <= 75.0 && agent.position().y.abs() <= 75.0);
        }
        agent.set_random_position(0.0, &mut rng).unwrap();
        assert_eq!(agent.position(), pt2(0.0, 0.0));
        assert!(agent.set_random_position(-1.0, &mut rng).is_err());
    }

    #[test]
    fn wide_random_range_still_lands_in_the_field() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let mut agent = Agent::new(0, 0, field());
        for _ in 0..200 {
            agent.set_random_position(500.0, &mut rng).unwrap();
            assert!(field().contains(agent.position()));
        }

        agent.set_position(pt2(730.0, -0.5)).unwrap();
        assert_eq!(agent.position(), pt2(-70.0, -0.5));
    }

    #[test]
    fn sameness_needs_id_and_kind() {
        let a = Agent::new(1, 0, field());
        let b = Agent::new(1, 1, field());
        assert!(!a.is_same(&b));
        assert!(a.is_same(&a.clone()));
    }

    #[test]
    fn field_of_view_filters_behind() {
        let mut watcher = Agent::new(0, 0, field());
        watcher.set_velocity(vec2(1.0, 0.0)).unwrap();
        watcher
            .set_physical_params(PhysicalParams { sight_angle: 90.0, ..PhysicalParams::default() })
            .unwrap();

        let mut ahead = Agent::new(1, 0, field());
        ahead.set_position(pt2(20.0, 5.0)).unwrap();
        let mut behind = Agent::new(2, 0, field());
        behind.set_position(pt2(-20.0, 0.0)).unwrap();

        assert!(watcher.is_in_sight(&ahead).unwrap());
        assert!(!watcher.is_in_sight(&behind).unwrap());
        assert!(!watcher.is_in_sight(&watcher).unwrap());
    }

    #[test]
    fn nearest_agent_uses_wrapped_distance() {
        let bounds = field();
        let mut me = Agent::new(0, 0, bounds);
        me.set_position(pt2(-95.0, 0.0)).unwrap();
        let mut across_edge = Agent::new(1, 0, bounds);
        across_edge.set_position(pt2(95.0, 0.0)).unwrap();
        let mut inside = Agent::new(2, 0, bounds);
        inside.set_position(pt2(-70.0, 0.0)).unwrap();

        let others = vec![me.clone(), across_edge, inside];
        assert_eq!(nearest_agent(&me, &others).unwrap(), Some(AgentKey::new(1, 0)));
    }
}
