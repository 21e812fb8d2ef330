/*
 * Collision Module
 *
 * Post-integration separation check. An agent whose surface distance to any
 * other agent drops below the minimum separation is pushed away from the
 * first offender found: its velocity becomes the unit repulsion vector and
 * the same vector is added straight onto its position.
 */

use std::f32::consts::PI;

use nannou::prelude::{vec2, Vec2};
use tracing::debug;

use crate::agent::{Agent, AgentKey};
use crate::error::{SimError, ValidationError};
use crate::geometry::normalize;

pub const DEFAULT_MIN_SEPARATION: f32 = 0.1;

// Spreads tie-break directions for coincident pairs around the circle
const GOLDEN_ANGLE: f32 = 2.399_963;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollisionOutcome {
    NoCollision,
    CollisionDetected { with: AgentKey, distance: f32 },
}

impl CollisionOutcome {
    pub fn is_collision(&self) -> bool {
        matches!(self, CollisionOutcome::CollisionDetected { .. })
    }
}

/// First separation violation found for an agent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub with: AgentKey,
    pub distance: f32,
    /// Unit vector pointing away from `with`.
    pub repulsion: Vec2,
}

impl Contact {
    pub fn outcome(&self) -> CollisionOutcome {
        CollisionOutcome::CollisionDetected {
            with: self.with,
            distance: self.distance,
        }
    }
}

/// Scan `others` in order and stop at the first one closer than
/// `min_separation` (surface distance). The agent itself is skipped.
pub fn detect(agent: &Agent, others: &[Agent], min_separation: f32) -> Result<Option<Contact>, ValidationError> {
    if !min_separation.is_finite() {
        return Err(ValidationError::InvalidArgument {
            what: "minimum separation",
            value: min_separation,
        });
    }

    for other in others {
        if agent.is_same(other) {
            continue;
        }
        let distance = agent.distance_to(other)?;
        if distance < min_separation {
            let towards = agent.displacement_to(other)?;
            return Ok(Some(Contact {
                with: other.key(),
                distance,
                repulsion: repulsion_direction(agent.key(), other.key(), towards),
            }));
        }
    }
    Ok(None)
}

/// Unit vector away from the neighbour. Exactly coincident agents get a
/// direction derived from both identities; the two members of a pair always
/// receive opposite directions.
pub fn repulsion_direction(agent: AgentKey, other: AgentKey, towards: Vec2) -> Vec2 {
    let (away, _) = normalize(-towards);
    if away != Vec2::ZERO {
        return away;
    }

    let seed = agent.id as u64 + agent.kind as u64 + other.id as u64 + other.kind as u64;
    let mut angle = (seed as f32 * GOLDEN_ANGLE) % (2.0 * PI);
    if agent > other {
        angle += PI;
    }
    vec2(angle.cos(), angle.sin())
}

/// Overwrite velocity with the repulsion vector and nudge the position by it.
pub fn apply_repulsion(agent: &mut Agent, repulsion: Vec2) -> Result<(), SimError> {
    agent.set_velocity(repulsion)?;
    agent.add_position(repulsion)?;
    Ok(())
}

/// Check the agent's current position and repel it in place on violation.
pub fn resolve(agent: &mut Agent, others: &[Agent], min_separation: f32) -> Result<CollisionOutcome, SimError> {
    match detect(agent, others, min_separation)? {
        Some(contact) => {
            apply_repulsion(agent, contact.repulsion)?;
            debug!(agent = %agent.key(), with = %contact.with, distance = contact.distance, "collision resolved");
            Ok(contact.outcome())
        }
        None => Ok(CollisionOutcome::NoCollision),
    }
}

/// Drive one agent and resolve collisions against `others`.
///
/// The tentative state from the integrator is checked first. It is committed
/// only when no neighbour is too close; otherwise it is dropped and the
/// repulsion is applied to the state the agent had before the step.
pub fn step_agent(
    agent: &mut Agent,
    command: Vec2,
    others: &[Agent],
    dt: f32,
    min_separation: f32,
) -> Result<CollisionOutcome, SimError> {
    let integration = agent.drive(command, dt)?;
    let probe = agent.clone().with_state(integration.state)?;

    match detect(&probe, others, min_separation)? {
        Some(contact) => {
            apply_repulsion(agent, contact.repulsion)?;
            Ok(contact.outcome())
        }
        None => {
            agent.set_state(integration.state)?;
            Ok(CollisionOutcome::NoCollision)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::FieldBounds;
    use crate::SAMPLING_TIME;
    use approx::assert_abs_diff_eq;
    use nannou::prelude::pt2;

    fn field() -> FieldBounds {
        FieldBounds::symmetric(100.0).unwrap()
    }

    fn agent_at(id: u32, x: f32, y: f32) -> Agent {
        let mut agent = Agent::new(id, 0, field());
        agent.set_position(pt2(x, y)).unwrap();
        agent
    }

    #[test]
    fn threshold_uses_surface_distance() {
        // Radii 2 + 2: centres 4.15 apart leave a 0.15 gap
        let a = agent_at(0, 0.0, 0.0);
        let clear = agent_at(1, 4.15, 0.0);
        let inside = agent_at(2, 4.05, 0.0);

        assert!(detect(&a, &[clear.clone()], 0.1).unwrap().is_none());
        let contact = detect(&a, &[clear, inside], 0.1).unwrap().unwrap();
        assert_eq!(contact.with, AgentKey::new(2, 0));
        assert_abs_diff_eq!(contact.distance, 0.05, epsilon = 1e-4);
    }

    #[test]
    fn resolve_pushes_away_with_unit_velocity() {
        let mut a = agent_at(0, 0.0, 0.0);
        let b = agent_at(1, 3.0, 0.0);
        let outcome = resolve(&mut a, &[b], DEFAULT_MIN_SEPARATION).unwrap();

        assert!(outcome.is_collision());
        assert_abs_diff_eq!(a.velocity().length(), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(a.velocity().x, -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(a.position().x, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn self_is_never_a_collision() {
        let mut a = agent_at(0, 0.0, 0.0);
        let others = vec![a.clone()];
        assert_eq!(resolve(&mut a, &others, DEFAULT_MIN_SEPARATION).unwrap(), CollisionOutcome::NoCollision);
        assert_eq!(a.position(), pt2(0.0, 0.0));
    }

    #[test]
    fn first_violation_short_circuits() {
        let mut a = agent_at(0, 0.0, 0.0);
        let left = agent_at(1, -1.0, 0.0);
        let right = agent_at(2, 1.0, 0.0);
        let outcome = resolve(&mut a, &[left, right], DEFAULT_MIN_SEPARATION).unwrap();
        assert_eq!(
            outcome,
            CollisionOutcome::CollisionDetected { with: AgentKey::new(1, 0), distance: -3.0 }
        );
        assert_abs_diff_eq!(a.velocity().x, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn repulsion_across_the_edge_points_inward() {
        let mut a = agent_at(0, 99.0, 0.0);
        let b = agent_at(1, -99.0, 0.0);
        resolve(&mut a, &[b], DEFAULT_MIN_SEPARATION).unwrap();
        assert_abs_diff_eq!(a.velocity().x, -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(a.position().x, 98.0, epsilon = 1e-4);
    }

    #[test]
    fn coincident_pair_gets_opposite_unit_directions() {
        let a = AgentKey::new(3, 0);
        let b = AgentKey::new(7, 1);
        let da = repulsion_direction(a, b, Vec2::ZERO);
        let db = repulsion_direction(b, a, Vec2::ZERO);
        assert_abs_diff_eq!(da.length(), 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!((da + db).length(), 0.0, epsilon = 1e-5);
        assert_eq!(da, repulsion_direction(a, b, Vec2::ZERO));
    }

    #[test]
    fn step_agent_commits_when_clear() {
        let mut a = agent_at(0, 0.0, 0.0);
        let far = agent_at(1, 50.0, 50.0);
        let outcome = step_agent(&mut a, vec2(10.0, 0.0), &[far], SAMPLING_TIME, DEFAULT_MIN_SEPARATION).unwrap();
        assert_eq!(outcome, CollisionOutcome::NoCollision);
        assert!(a.position().x > 0.0);
        assert_abs_diff_eq!(a.command().x, 10.0, epsilon = 1e-5);
    }

    #[test]
    fn step_agent_discards_tentative_state_on_collision() {
        let mut a = agent_at(0, 0.0, 0.0);
        let blocker = agent_at(1, 4.2, 0.0);
        // Heading into the blocker pushes the surface distance under 0.1
        a.set_velocity(vec2(10.0, 0.0)).unwrap();
        let outcome = step_agent(&mut a, Vec2::ZERO, &[blocker], 0.033, DEFAULT_MIN_SEPARATION).unwrap();

        assert!(outcome.is_collision());
        assert_abs_diff_eq!(a.velocity().x, -1.0, epsilon = 1e-6);
        // Nudged from the pre-step position, not the tentative one
        assert_abs_diff_eq!(a.position().x, -1.0, epsilon = 1e-6);
    }
}
