/*
 * Debug Information Module
 *
 * Per-step reports produced by the simulation, running totals over many
 * steps, and the metrics the viewer shows in its debug panel.
 */

use std::time::Duration;

use crate::agent::AgentKey;
use crate::error::SimError;

/// An agent whose step was rejected; it kept its previous state.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentFailure {
    pub agent: AgentKey,
    pub error: SimError,
}

/// What happened during one simulation step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepReport {
    pub step: u64,
    pub time: f32,
    pub collisions: usize,
    pub command_resets: usize,
    pub overrides: usize,
    pub failures: Vec<AgentFailure>,
    /// Cells marked for the first time since the last clear.
    pub new_cells: usize,
    pub grid_misses: usize,
    pub grid_cleared: bool,
    pub mean_speed: f32,
}

impl StepReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.grid_misses == 0
    }
}

/// Running totals over many steps.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepStats {
    pub steps: u64,
    pub collisions: usize,
    pub command_resets: usize,
    pub failures: usize,
    pub grid_misses: usize,
}

impl StepStats {
    pub fn record(&mut self, report: &StepReport) {
        self.steps += 1;
        self.collisions += report.collisions;
        self.command_resets += report.command_resets;
        self.failures += report.failures.len();
        self.grid_misses += report.grid_misses;
    }

    pub fn collisions_per_step(&self) -> f32 {
        if self.steps == 0 {
            0.0
        } else {
            self.collisions as f32 / self.steps as f32
        }
    }
}

// Debug information to display
#[derive(Debug, Clone, Default)]
pub struct DebugInfo {
    pub fps: f32,
    pub frame_time: Duration,
    pub steps_per_frame: usize,
    pub coverage: f32,
    pub last_report: Option<StepReport>,
    pub totals: StepStats,
}

impl DebugInfo {
    pub fn record(&mut self, report: StepReport) {
        self.totals.record(&report);
        self.last_report = Some(report);
    }
}
