/*
 * Input Module
 *
 * This module handles keyboard and raw window events for the viewer.
 *
 * - Arrow keys / WASD steer the human-controlled agent (an override command
 *   that replaces its flocking steering)
 * - Space pauses, R resets, T toggles trails, F1 toggles debug overlays
 * - Esc / Q quit
 */

use nannou::prelude::*;

use crate::agent::AgentKey;
use crate::app::Model;

/// Held direction keys for the human-controlled agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct HumanControl {
    pub enabled: bool,
    pub target: AgentKey,
    up: bool,
    down: bool,
    left: bool,
    right: bool,
}

impl HumanControl {
    pub fn new(target: AgentKey) -> Self {
        Self {
            enabled: true,
            target,
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.enabled && (self.up || self.down || self.left || self.right)
    }

    /// Command for the target agent, scaled to `u_max`. `None` while no key
    /// is held, so the agent falls back to flocking.
    pub fn command(&self, u_max: f32) -> Option<Vec2> {
        if !self.is_active() {
            return None;
        }
        let axis = |pos: bool, neg: bool| (pos as i32 - neg as i32) as f32;
        let direction = vec2(axis(self.right, self.left), axis(self.up, self.down));
        Some(direction.normalize_or_zero() * u_max)
    }

    fn set_key(&mut self, key: Key, held: bool) -> bool {
        match key {
            Key::Up | Key::W => self.up = held,
            Key::Down | Key::S => self.down = held,
            Key::Left | Key::A => self.left = held,
            Key::Right | Key::D => self.right = held,
            _ => return false,
        }
        true
    }
}

pub fn key_pressed(app: &App, model: &mut Model, key: Key) {
    if model.egui.ctx().wants_keyboard_input() {
        return;
    }
    if model.control.set_key(key, true) {
        return;
    }
    match key {
        Key::Escape | Key::Q => app.quit(),
        Key::Space => model.view.paused = !model.view.paused,
        Key::R => model.reset_requested = true,
        Key::T => model.view.show_trails = !model.view.show_trails,
        Key::F1 => model.view.show_debug = !model.view.show_debug,
        _ => {}
    }
}

pub fn key_released(_app: &App, model: &mut Model, key: Key) {
    model.control.set_key(key, false);
}

// Handle raw window events for egui
pub fn raw_window_event(_app: &App, model: &mut Model, event: &nannou::winit::event::WindowEvent) {
    model.egui.handle_raw_event(event);
}
