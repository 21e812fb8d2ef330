/*
 * Simulation Parameters Module
 *
 * This module defines the SimulationParams struct: population, field, time
 * step, physical model, flocking weights, grid and seeding settings. The
 * parameters are read from JSON config files by the headless runner and
 * edited live by the viewer, which uses ParamTracker to tell whether a change
 * needs a full rebuild of the simulation or can be applied in place.
 */

use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent::{AgentKey, PhysicalParams};
use crate::collision::DEFAULT_MIN_SEPARATION;
use crate::error::ConfigError;
use crate::flocking::FlockingParams;
use crate::geometry::FieldBounds;
use crate::{DEFAULT_FIELD_MAX, SAMPLING_TIME};

pub const DEFAULT_AGENT_COUNT: usize = 22;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    pub agent_count: usize,
    /// Type tag given to every spawned agent.
    pub agent_kind: u32,
    /// Agents are scattered over this fraction of the half extent.
    pub spawn_fraction: f32,
    pub field_half_extent: f32,
    pub dt: f32,
    pub physical: PhysicalParams,
    pub flocking: FlockingParams,
    pub grid_scale: f32,
    /// Clear the grid every N steps; 0 keeps trails forever.
    pub grid_clear_interval: u64,
    pub min_separation: f32,
    pub seed: u64,
    /// Compute steering on the rayon pool.
    pub parallel: bool,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            agent_count: DEFAULT_AGENT_COUNT,
            agent_kind: 0,
            spawn_fraction: 0.75,
            field_half_extent: DEFAULT_FIELD_MAX,
            dt: SAMPLING_TIME,
            physical: PhysicalParams::default(),
            flocking: FlockingParams::default(),
            grid_scale: 1.0,
            grid_clear_interval: 1,
            min_separation: DEFAULT_MIN_SEPARATION,
            seed: 0,
            parallel: false,
        }
    }
}

impl SimulationParams {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let params: Self = serde_json::from_str(json).map_err(|e| ConfigError::Malformed { reason: e.to_string() })?;
        params.validate()?;
        Ok(params)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Malformed { reason: e.to_string() })
    }

    pub fn bounds(&self) -> Result<FieldBounds, ConfigError> {
        FieldBounds::symmetric(self.field_half_extent)
    }

    /// Reject anything that would produce a malformed field or agent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bounds()?;

        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(invalid("dt", self.dt, "must be positive and finite"));
        }
        if !self.grid_scale.is_finite() || self.grid_scale <= 0.0 {
            return Err(invalid("grid_scale", self.grid_scale, "must be positive and finite"));
        }
        if !self.min_separation.is_finite() {
            return Err(invalid("min_separation", self.min_separation, "must be finite"));
        }
        if !(0.0..=1.0).contains(&self.spawn_fraction) {
            return Err(invalid("spawn_fraction", self.spawn_fraction, "must lie in [0, 1]"));
        }
        if u32::try_from(self.agent_count).is_err() {
            return Err(ConfigError::InvalidSetting {
                field: "agent_count",
                value: self.agent_count as f64,
                reason: "ids must fit in u32",
            });
        }

        self.physical.validate(AgentKey::new(0, self.agent_kind))?;
        self.flocking.validate()
    }

    // Slider ranges for the viewer

    pub fn get_agent_count_range() -> RangeInclusive<usize> {
        1..=400
    }

    pub fn get_weight_range() -> RangeInclusive<f32> {
        0.0..=6.0
    }

    pub fn get_sight_range() -> RangeInclusive<f32> {
        0.0..=200.0
    }

    pub fn get_speed_range() -> RangeInclusive<f32> {
        1.0..=100.0
    }

    pub fn get_grid_scale_range() -> RangeInclusive<f32> {
        0.5..=10.0
    }
}

fn invalid(field: &'static str, value: f32, reason: &'static str) -> ConfigError {
    ConfigError::InvalidSetting {
        field,
        value: value as f64,
        reason,
    }
}

/// What kind of update a parameter edit calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParamChanges {
    /// Population, field, grid or seed changed: rebuild the simulation.
    pub rebuild: bool,
    /// Only physics or flocking settings changed: apply in place.
    pub live: bool,
}

impl ParamChanges {
    pub fn any(&self) -> bool {
        self.rebuild || self.live
    }
}

/// Snapshot-based change detection for UI edits.
#[derive(Debug, Clone, Default)]
pub struct ParamTracker {
    previous: Option<SimulationParams>,
}

impl ParamTracker {
    pub fn take_snapshot(&mut self, params: &SimulationParams) {
        self.previous = Some(params.clone());
    }

    pub fn detect_changes(&self, params: &SimulationParams) -> ParamChanges {
        let Some(prev) = &self.previous else {
            return ParamChanges::default();
        };

        let rebuild = params.agent_count != prev.agent_count
            || params.agent_kind != prev.agent_kind
            || params.spawn_fraction != prev.spawn_fraction
            || params.field_half_extent != prev.field_half_extent
            || params.grid_scale != prev.grid_scale
            || params.seed != prev.seed;

        let live = params.physical != prev.physical
            || params.flocking != prev.flocking
            || params.dt != prev.dt
            || params.grid_clear_interval != prev.grid_clear_interval
            || params.min_separation != prev.min_separation
            || params.parallel != prev.parallel;

        ParamChanges { rebuild, live }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flocking::RandomWalk;

    #[test]
    fn defaults_are_valid() {
        let params = SimulationParams::default();
        params.validate().unwrap();
        assert_eq!(params.agent_count, 22);
        assert_eq!(params.flocking.sight_range, 100.0);
        assert_eq!(params.physical.gain, 4.0);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let params = SimulationParams::from_json_str(r#"{ "agent_count": 5, "physical": { "v_max": 10.0 } }"#).unwrap();
        assert_eq!(params.agent_count, 5);
        assert_eq!(params.physical.v_max, 10.0);
        assert_eq!(params.physical.u_max, 50.0);
        assert_eq!(params.dt, SAMPLING_TIME);
    }

    #[test]
    fn random_walk_is_tagged() {
        let json = r#"{ "flocking": { "random_walk": { "kind": "gaussian", "mean": 0.0, "sigma": 0.5 } } }"#;
        let params = SimulationParams::from_json_str(json).unwrap();
        assert_eq!(params.flocking.random_walk, RandomWalk::Gaussian { mean: 0.0, sigma: 0.5 });
    }

    #[test]
    fn negative_physics_is_a_config_error() {
        let err = SimulationParams::from_json_str(r#"{ "physical": { "damping": -1.0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::NegativeParameter { field: "damping", .. }));
    }

    #[test]
    fn bad_settings_are_rejected() {
        let mut params = SimulationParams { dt: 0.0, ..SimulationParams::default() };
        assert!(params.validate().is_err());
        params = SimulationParams { field_half_extent: 0.0, ..SimulationParams::default() };
        assert!(matches!(params.validate(), Err(ConfigError::InvalidBounds { .. })));
        params = SimulationParams { spawn_fraction: 1.5, ..SimulationParams::default() };
        assert!(params.validate().is_err());
        assert!(matches!(
            SimulationParams::from_json_str("{ not json"),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn json_round_trip_preserves_values() {
        let params = SimulationParams { seed: 77, parallel: true, ..SimulationParams::default() };
        let json = params.to_json_pretty().unwrap();
        assert_eq!(SimulationParams::from_json_str(&json).unwrap(), params);
    }

    #[test]
    fn tracker_separates_rebuild_from_live_edits() {
        let mut params = SimulationParams::default();
        let mut tracker = ParamTracker::default();
        assert!(!tracker.detect_changes(&params).any());

        tracker.take_snapshot(&params);
        params.flocking.weights.cohesion = 0.5;
        assert_eq!(tracker.detect_changes(&params), ParamChanges { rebuild: false, live: true });

        tracker.take_snapshot(&params);
        params.agent_count = 40;
        assert_eq!(tracker.detect_changes(&params), ParamChanges { rebuild: true, live: false });
    }
}
