/*
 * UI Module
 *
 * This module contains functions for creating and updating the user interface
 * using nannou_egui. It provides controls for the flocking weights, physics,
 * population and grid settings, plus a small debug overlay drawn with nannou.
 */

use nannou_egui::{egui, Egui};

use crate::app::ViewSettings;
use crate::debug::DebugInfo;
use crate::flocking::RandomWalk;
use crate::params::{ParamChanges, ParamTracker, SimulationParams};

/// What the user asked for this frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct UiActions {
    pub reset: bool,
    pub changes: ParamChanges,
}

pub fn update_ui(
    egui: &mut Egui,
    params: &mut SimulationParams,
    tracker: &mut ParamTracker,
    view: &mut ViewSettings,
    debug_info: &DebugInfo,
    error_message: Option<&str>,
) -> UiActions {
    let mut reset = false;

    tracker.take_snapshot(params);

    let ctx = egui.begin_frame();

    egui::Window::new("Simulation Controls")
        .default_pos([10.0, 10.0])
        .show(&ctx, |ui| {
            ui.collapsing("Population", |ui| {
                ui.add(
                    egui::Slider::new(&mut params.agent_count, SimulationParams::get_agent_count_range())
                        .text("Agents"),
                );
                ui.add(egui::Slider::new(&mut params.seed, 0..=1000).text("Seed"));
                ui.add(egui::Slider::new(&mut params.spawn_fraction, 0.0..=1.0).text("Spawn Fraction"));
                if ui.button("Reset Agents").clicked() {
                    reset = true;
                }
            });

            ui.collapsing("Flocking Weights", |ui| {
                let w = &mut params.flocking.weights;
                let range = SimulationParams::get_weight_range;
                ui.add(egui::Slider::new(&mut w.separation, range()).text("Separation (k1)"));
                ui.add(egui::Slider::new(&mut w.alignment, range()).text("Alignment (k2)"));
                ui.add(egui::Slider::new(&mut w.cohesion, range()).text("Cohesion (k3)"));
                ui.add(egui::Slider::new(&mut w.environment, range()).text("Environment (k4)"));
                ui.add(egui::Slider::new(&mut w.random_walk, range()).text("Random Walk (k5)"));
                ui.add(
                    egui::Slider::new(&mut params.flocking.sight_range, SimulationParams::get_sight_range())
                        .text("Sight Range"),
                );
                ui.checkbox(&mut params.flocking.normalize_output, "Normalize Steering");

                let mut walk_enabled = params.flocking.random_walk != RandomWalk::Off;
                if ui.checkbox(&mut walk_enabled, "Uniform Random Walk").changed() {
                    params.flocking.random_walk = if walk_enabled {
                        RandomWalk::Uniform { range: 1.0 }
                    } else {
                        RandomWalk::Off
                    };
                }
            });

            ui.collapsing("Physics", |ui| {
                let p = &mut params.physical;
                ui.add(egui::Slider::new(&mut p.v_max, SimulationParams::get_speed_range()).text("Max Speed"));
                ui.add(egui::Slider::new(&mut p.u_max, SimulationParams::get_speed_range()).text("Max Command"));
                ui.add(egui::Slider::new(&mut p.damping, 0.0..=5.0).text("Damping"));
                ui.add(egui::Slider::new(&mut p.gain, 0.0..=10.0).text("Gain"));
                ui.add(egui::Slider::new(&mut p.sight_angle, 10.0..=360.0).text("Sight Angle"));
                ui.add(egui::Slider::new(&mut p.sight_sigma, 0.0..=5.0).text("Perception Noise"));
                ui.add(egui::Slider::new(&mut params.min_separation, 0.0..=2.0).text("Min Separation"));
            });

            ui.collapsing("Grid", |ui| {
                ui.add(
                    egui::Slider::new(&mut params.grid_scale, SimulationParams::get_grid_scale_range())
                        .text("Cell Size"),
                );
                ui.add(egui::Slider::new(&mut params.grid_clear_interval, 0..=600).text("Clear Every N Steps"));
                ui.checkbox(&mut view.show_trails, "Show Trails");
                ui.label(format!("Coverage: {:.1}%", debug_info.coverage * 100.0));
            });

            ui.collapsing("Performance", |ui| {
                ui.checkbox(&mut params.parallel, "Parallel Steering");
                ui.label(format!("FPS: {:.1}", debug_info.fps));
                ui.label(format!("Frame time: {:.2} ms", debug_info.frame_time.as_secs_f64() * 1000.0));
                ui.label(format!("Steps this frame: {}", debug_info.steps_per_frame));
            });

            ui.checkbox(&mut view.show_debug, "Show Debug Info");
            ui.checkbox(&mut view.paused, "Pause Simulation");

            if let Some(message) = error_message {
                ui.separator();
                ui.colored_label(egui::Color32::LIGHT_RED, message);
            }
        });

    UiActions {
        reset,
        changes: tracker.detect_changes(params),
    }
}

// Draw debug information on the screen
pub fn draw_debug_info(draw: &nannou::Draw, debug_info: &DebugInfo, window_rect: nannou::geom::Rect, agent_count: usize) {
    let margin = 20.0;
    let line_height = 20.0;

    let mut lines = vec![
        format!("FPS: {:.1}", debug_info.fps),
        format!("Agents: {}", agent_count),
        format!("Coverage: {:.1}%", debug_info.coverage * 100.0),
        format!("Collisions/step: {:.2}", debug_info.totals.collisions_per_step()),
    ];
    if let Some(report) = &debug_info.last_report {
        lines.push(format!("Step: {}  t = {:.2}s", report.step, report.time));
        lines.push(format!("Mean speed: {:.2}", report.mean_speed));
        lines.push(format!("Failures: {}", debug_info.totals.failures));
    }

    let panel_width = 220.0;
    let panel_height = line_height * lines.len() as f32 + margin;
    draw.rect()
        .x_y(window_rect.right() - panel_width / 2.0, window_rect.top() - panel_height / 2.0)
        .w_h(panel_width, panel_height)
        .color(nannou::color::rgba(0.0, 0.0, 0.0, 0.7));

    let text_x = window_rect.right() - panel_width / 2.0;
    let text_y = window_rect.top() - margin;
    for (i, text) in lines.iter().enumerate() {
        draw.text(text)
            .x_y(text_x, text_y - i as f32 * line_height)
            .w(panel_width - margin)
            .left_justify()
            .color(nannou::color::WHITE)
            .font_size(14);
    }
}
