/*
 * Application Module
 *
 * This module defines the viewer model and its update loop. The simulation
 * runs on a fixed timestep accumulator: wall-clock frame time is added up and
 * the simulation is stepped once per `dt` that has elapsed, so the model time
 * does not depend on the frame rate.
 */

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use nannou::prelude::*;
use nannou_egui::Egui;
use tracing::{error, info, warn};

use crate::agent::AgentKey;
use crate::debug::DebugInfo;
use crate::input::{self, HumanControl};
use crate::params::{ParamTracker, SimulationParams};
use crate::renderer;
use crate::simulation::Simulation;
use crate::ui;

// Bound the catch-up work after a stall
const MAX_STEPS_PER_FRAME: usize = 8;

static INITIAL_PARAMS: OnceLock<SimulationParams> = OnceLock::new();

/// Parameters the viewer starts from. Must be called before `nannou::app`
/// runs; later calls are ignored.
pub fn set_initial_params(params: SimulationParams) {
    if INITIAL_PARAMS.set(params).is_err() {
        warn!("initial parameters already set, ignoring");
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ViewSettings {
    pub paused: bool,
    pub show_trails: bool,
    pub show_debug: bool,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            paused: false,
            show_trails: true,
            show_debug: false,
        }
    }
}

// Main model for the application
pub struct Model {
    pub sim: Simulation,
    /// Parameters as edited in the UI; applied to `sim` when they change.
    pub params: SimulationParams,
    pub tracker: ParamTracker,
    pub view: ViewSettings,
    pub egui: Egui,
    pub debug_info: DebugInfo,
    pub control: HumanControl,
    pub reset_requested: bool,
    pub error_message: Option<String>,
    // Fixed timestep variables
    pub physics_accumulator: Duration,
    pub last_update_time: Instant,
}

// Initialize the model
pub fn model(app: &App) -> Model {
    let window_id = match app
        .new_window()
        .title("Toroidal Flocking")
        .size(800, 800)
        .view(renderer::view)
        .key_pressed(input::key_pressed)
        .key_released(input::key_released)
        .raw_event(input::raw_window_event)
        .build()
    {
        Ok(id) => id,
        Err(e) => {
            error!(error = ?e, "failed to open window");
            std::process::exit(1);
        }
    };

    let egui = match app.window(window_id) {
        Some(window) => Egui::from_window(&window),
        None => {
            error!("window closed during start-up");
            std::process::exit(1);
        }
    };

    let params = INITIAL_PARAMS.get().cloned().unwrap_or_default();
    let (sim, params, error_message) = match Simulation::new(params.clone()) {
        Ok(sim) => (sim, params, None),
        Err(e) => {
            warn!(error = %e, "invalid start-up parameters, using defaults");
            let defaults = SimulationParams::default();
            match Simulation::new(defaults.clone()) {
                Ok(sim) => (sim, defaults, Some(e.to_string())),
                Err(e) => {
                    error!(error = %e, "default parameters rejected");
                    std::process::exit(1);
                }
            }
        }
    };

    Model {
        sim,
        params,
        tracker: ParamTracker::default(),
        view: ViewSettings::default(),
        egui,
        debug_info: DebugInfo::default(),
        control: HumanControl::new(AgentKey::new(0, 0)),
        reset_requested: false,
        error_message,
        physics_accumulator: Duration::ZERO,
        last_update_time: Instant::now(),
    }
}

// Update the model
pub fn update(app: &App, model: &mut Model, update: Update) {
    model.debug_info.fps = app.fps();
    model.debug_info.frame_time = update.since_last;
    model.egui.set_elapsed_time(update.since_start);

    let actions = ui::update_ui(
        &mut model.egui,
        &mut model.params,
        &mut model.tracker,
        &mut model.view,
        &model.debug_info,
        model.error_message.as_deref(),
    );

    if actions.changes.rebuild || actions.reset || model.reset_requested {
        rebuild(model);
    } else if actions.changes.live {
        if let Err(e) = model.sim.apply_live_params(&model.params) {
            warn!(error = %e, "rejected parameter change");
            model.error_message = Some(e.to_string());
        } else {
            model.error_message = None;
        }
    }

    let now = Instant::now();
    let frame_time = now.duration_since(model.last_update_time);
    model.last_update_time = now;

    if model.view.paused {
        model.debug_info.steps_per_frame = 0;
        return;
    }

    let step_size = Duration::from_secs_f32(model.sim.params().dt);
    model.physics_accumulator += frame_time;

    let mut steps = 0;
    while model.physics_accumulator >= step_size && steps < MAX_STEPS_PER_FRAME {
        step_simulation(model);
        model.physics_accumulator -= step_size;
        steps += 1;
    }
    if steps == MAX_STEPS_PER_FRAME {
        model.physics_accumulator = Duration::ZERO;
    }

    model.debug_info.steps_per_frame = steps;
    model.debug_info.coverage = model.sim.grid().coverage().unwrap_or(0.0);
}

fn step_simulation(model: &mut Model) {
    let mut overrides = HashMap::new();
    if let Some(command) = model.control.command(model.sim.params().physical.u_max) {
        overrides.insert(model.control.target, command);
    }

    match model.sim.step_with_overrides(&overrides) {
        Ok(report) => model.debug_info.record(report),
        Err(e) => {
            error!(error = %e, "simulation step failed, pausing");
            model.error_message = Some(e.to_string());
            model.view.paused = true;
        }
    }
}

fn rebuild(model: &mut Model) {
    model.reset_requested = false;
    match Simulation::new(model.params.clone()) {
        Ok(sim) => {
            info!(agents = sim.agents().len(), "simulation rebuilt");
            model.sim = sim;
            model.debug_info = DebugInfo::default();
            model.physics_accumulator = Duration::ZERO;
            model.error_message = None;
        }
        Err(e) => {
            warn!(error = %e, "rejected parameters, keeping the running simulation");
            model.error_message = Some(e.to_string());
        }
    }
}
