/*
 * Integrator Module
 *
 * Advances one agent by one timestep of the mass-damper model
 *
 *     a = (1/M) * (-D * v + G * u)
 *
 * with the command clamped to U_MAX, speed clamped to V_MAX, explicit Euler
 * integration and a toroidal wrap of the new position. The result is a
 * tentative state; nothing is committed here.
 */

use nannou::prelude::Vec2;
use tracing::warn;

use crate::agent::{AgentKey, AgentState, PhysicalParams};
use crate::error::{NumericError, SimError, ValidationError};
use crate::geometry::{normalize, FieldBounds, SPEED_SNAP_EPSILON};

/// Outcome of a successful [`drive`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integration {
    pub state: AgentState,
    /// The requested command was unusable and was replaced by zero.
    pub command_reset: bool,
}

pub fn drive(
    agent: AgentKey,
    state: &AgentState,
    physical: &PhysicalParams,
    bounds: &FieldBounds,
    command: Vec2,
    dt: f32,
) -> Result<Integration, SimError> {
    if !dt.is_finite() || dt < 0.0 {
        return Err(ValidationError::InvalidArgument { what: "time step", value: dt }.into());
    }
    if !command.is_finite() {
        return Err(NumericError::NonFinite {
            agent,
            quantity: "command",
            x: command.x,
            y: command.y,
        }
        .into());
    }

    // Clamp the command magnitude, keeping its direction
    let (direction, magnitude) = normalize(command);
    let mut command = direction * magnitude.min(physical.u_max);

    let accelerate = |u: Vec2| (physical.gain * u - physical.damping * state.velocity) / physical.mass;

    let mut command_reset = false;
    let mut acceleration = accelerate(command);
    if !command.is_finite() || !acceleration.is_finite() {
        warn!(
            agent = %agent,
            ux = command.x,
            uy = command.y,
            "non-finite acceleration, retrying with a zero command"
        );
        command = Vec2::ZERO;
        command_reset = true;
        acceleration = accelerate(command);
        if !acceleration.is_finite() {
            return Err(NumericError::NonFinite {
                agent,
                quantity: "acceleration",
                x: acceleration.x,
                y: acceleration.y,
            }
            .into());
        }
    }

    let raw_velocity = state.velocity + acceleration * dt;
    if !raw_velocity.is_finite() {
        return Err(NumericError::NonFinite {
            agent,
            quantity: "velocity",
            x: raw_velocity.x,
            y: raw_velocity.y,
        }
        .into());
    }

    // Speed limit; near-zero speeds snap to exactly zero
    let (heading, speed) = normalize(raw_velocity);
    let velocity = if speed < SPEED_SNAP_EPSILON {
        Vec2::ZERO
    } else {
        heading * speed.min(physical.v_max)
    };

    let position = bounds.wrap(state.position + velocity * dt);

    let next = AgentState {
        position,
        velocity,
        acceleration,
        command,
    };
    if !next.is_finite() {
        return Err(NumericError::NonFiniteState { agent }.into());
    }

    Ok(Integration {
        state: next,
        command_reset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::SAMPLING_TIME;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use nannou::prelude::{pt2, vec2};

    fn field() -> FieldBounds {
        FieldBounds::symmetric(100.0).unwrap()
    }

    #[test]
    fn oversized_command_is_clamped_to_u_max() {
        let agent = Agent::new(0, 0, field());
        let out = agent.drive(vec2(300.0, 400.0), SAMPLING_TIME).unwrap();
        assert_relative_eq!(out.state.command.length(), agent.physical().u_max, max_relative = 1e-5);
        assert_relative_eq!(out.state.command.x / out.state.command.y, 0.75, max_relative = 1e-5);
        assert!(!out.command_reset);
    }

    #[test]
    fn huge_command_keeps_its_direction() {
        let agent = Agent::new(0, 0, field());
        let out = agent.drive(vec2(1.0e20, 1.0e20), SAMPLING_TIME).unwrap();
        assert!(!out.command_reset);
        assert_relative_eq!(out.state.command.length(), 50.0, max_relative = 1e-5);
        assert_relative_eq!(out.state.command.x, out.state.command.y, max_relative = 1e-5);
        assert!(out.state.command.x > 0.0);
    }

    #[test]
    fn tiny_command_is_not_dropped() {
        let agent = Agent::new(0, 0, field());
        let out = agent.drive(vec2(0.0, 1.0e-4), SAMPLING_TIME).unwrap();
        assert_eq!(out.state.command, vec2(0.0, 1.0e-4));
        assert!(!out.command_reset);
    }

    #[test]
    fn small_command_passes_through() {
        let agent = Agent::new(0, 0, field());
        let out = agent.drive(vec2(3.0, -4.0), SAMPLING_TIME).unwrap();
        assert_abs_diff_eq!(out.state.command.x, 3.0, epsilon = 1e-5);
        assert_abs_diff_eq!(out.state.command.y, -4.0, epsilon = 1e-5);
        // a = G * u / M from rest
        assert_abs_diff_eq!(out.state.acceleration.x, 12.0, epsilon = 1e-4);
        assert_abs_diff_eq!(out.state.acceleration.y, -16.0, epsilon = 1e-4);
    }

    #[test]
    fn zero_command_at_rest_is_a_fixed_point() {
        let mut agent = Agent::new(0, 0, field());
        agent.set_position(pt2(12.5, -40.0)).unwrap();
        for _ in 0..50 {
            agent.drive_in_place(Vec2::ZERO, SAMPLING_TIME).unwrap();
        }
        assert_eq!(agent.position(), pt2(12.5, -40.0));
        assert_eq!(agent.velocity(), Vec2::ZERO);
    }

    #[test]
    fn speed_never_exceeds_v_max() {
        let mut agent = Agent::new(0, 0, field());
        agent.set_v_max(5.0).unwrap();
        for _ in 0..200 {
            agent.drive_in_place(vec2(50.0, 0.0), SAMPLING_TIME).unwrap();
            assert!(agent.velocity().length() <= 5.0 + 1e-4);
        }
        assert_relative_eq!(agent.velocity().length(), 5.0, max_relative = 1e-4);
    }

    #[test]
    fn damping_slows_a_coasting_agent() {
        let mut agent = Agent::new(0, 0, field());
        agent.set_velocity(vec2(10.0, 0.0)).unwrap();
        let out = agent.drive(Vec2::ZERO, 0.1).unwrap();
        // v' = v + (-D v / M) dt = 10 - 1
        assert_abs_diff_eq!(out.state.velocity.x, 9.0, epsilon = 1e-4);
        assert_abs_diff_eq!(out.state.position.x, 0.9, epsilon = 1e-4);
    }

    #[test]
    fn position_wraps_across_the_edge() {
        let mut agent = Agent::new(0, 0, field());
        agent.set_position(pt2(99.9, 0.0)).unwrap();
        agent.set_velocity(vec2(40.0, 0.0)).unwrap();
        let out = agent.drive(Vec2::ZERO, 0.1).unwrap();
        assert!(out.state.position.x < -90.0);
        assert!(field().contains(out.state.position));
    }

    #[test]
    fn non_finite_command_is_rejected_without_mutation() {
        let mut agent = Agent::new(0, 0, field());
        let before = *agent.state();
        let err = agent.drive_in_place(vec2(f32::NAN, 1.0), SAMPLING_TIME).unwrap_err();
        assert!(matches!(err, SimError::Numeric(NumericError::NonFinite { quantity: "command", .. })));
        assert_eq!(*agent.state(), before);
    }

    #[test]
    fn overflowing_gain_falls_back_to_zero_command() {
        let mut agent = Agent::new(0, 0, field());
        agent.set_gain(f32::MAX).unwrap();
        agent.set_u_max(f32::MAX).unwrap();
        let out = agent.drive(vec2(1.0e15, 0.0), SAMPLING_TIME).unwrap();
        assert!(out.command_reset);
        assert_eq!(out.state.command, Vec2::ZERO);
        assert!(out.state.is_finite());
    }

    #[test]
    fn negative_time_step_is_invalid() {
        let agent = Agent::new(0, 0, field());
        assert!(matches!(agent.drive(Vec2::ZERO, -0.1), Err(SimError::Validation(_))));
    }
}
