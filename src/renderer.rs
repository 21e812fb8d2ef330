/*
 * Renderer Module
 *
 * This module draws the simulation: the field border, visited grid cells,
 * agents as discs with a velocity tick, and optional debug overlays. The
 * field is scaled to fit the window with a small margin.
 */

use nannou::prelude::*;
use tracing::warn;

use crate::app::Model;
use crate::geometry::FieldBounds;
use crate::ui;

// Fraction of the shorter window side used by the field
const FIELD_FILL: f32 = 0.92;
// Seconds of travel drawn for the velocity tick
const VELOCITY_TICK: f32 = 0.25;

/// Maps field coordinates to window coordinates.
#[derive(Debug, Clone, Copy)]
pub struct FieldView {
    scale: f32,
    center: Point2,
}

impl FieldView {
    pub fn fit(bounds: &FieldBounds, window_rect: Rect) -> Self {
        let scale = FIELD_FILL * window_rect.w().min(window_rect.h()) / bounds.width().max(bounds.height());
        Self {
            scale,
            center: bounds.center(),
        }
    }

    pub fn to_screen(&self, p: Point2) -> Point2 {
        (p - self.center) * self.scale
    }

    pub fn length(&self, l: f32) -> f32 {
        l * self.scale
    }
}

// Render the model
pub fn view(app: &App, model: &Model, frame: Frame) {
    let draw = app.draw();
    draw.background().color(BLACK);

    let window_rect = app.window_rect();
    let bounds = *model.sim.bounds();
    let fv = FieldView::fit(&bounds, window_rect);

    // Field border
    draw.rect()
        .xy(fv.to_screen(bounds.center()))
        .w_h(fv.length(bounds.width()), fv.length(bounds.height()))
        .no_fill()
        .stroke_weight(1.0)
        .stroke(rgba(0.3, 0.3, 0.3, 1.0));

    if model.view.show_trails {
        draw_trails(&draw, model, &fv);
    }

    let controlled = model.control.is_active().then_some(model.control.target);
    for agent in model.sim.agents() {
        let p = fv.to_screen(agent.position());
        let r = fv.length(agent.radius()).max(2.0);
        let is_controlled = controlled == Some(agent.key());

        let fill = if is_controlled {
            rgba(1.0, 0.6, 0.1, 1.0)
        } else {
            rgba(0.35, 0.85, 0.45, 1.0)
        };
        draw.ellipse().xy(p).radius(r).color(fill);

        let tip = p + fv.length(VELOCITY_TICK) * agent.velocity();
        draw.line().start(p).end(tip).weight(1.0).color(rgba(0.9, 0.9, 0.9, 0.8));
    }

    if model.view.show_debug {
        draw_sight(&draw, model, &fv);
        ui::draw_debug_info(&draw, &model.debug_info, window_rect, model.sim.agents().len());
    }

    if let Err(e) = draw.to_frame(app, &frame) {
        warn!(error = ?e, "failed to draw frame");
    }
    if let Err(e) = model.egui.draw_to_frame(&frame) {
        warn!(error = ?e, "failed to draw ui");
    }
}

fn draw_trails(draw: &Draw, model: &Model, fv: &FieldView) {
    let grid = model.sim.grid();
    let Ok(scale) = grid.scale() else {
        return;
    };
    let Ok(cells) = grid.occupied_cells() else {
        return;
    };
    let side = fv.length(scale);
    for (index, _) in cells {
        if let Ok(center) = grid.cell_center(index) {
            draw.rect()
                .xy(fv.to_screen(center))
                .w_h(side, side)
                .color(rgba(0.2, 0.35, 0.8, 0.35));
        }
    }
}

// Sight ring and steering vector of the first agent
fn draw_sight(draw: &Draw, model: &Model, fv: &FieldView) {
    let Some(first) = model.sim.agents().first() else {
        return;
    };
    let p = fv.to_screen(first.position());
    draw.ellipse()
        .xy(p)
        .radius(fv.length(model.sim.params().flocking.sight_range))
        .no_fill()
        .stroke(rgba(0.3, 0.6, 1.0, 0.6))
        .stroke_weight(1.0);

    if let Some(steering) = model.sim.last_steering().first() {
        let (dir, _) = crate::geometry::normalize(steering.command);
        draw.arrow()
            .start(p)
            .end(p + dir * fv.length(10.0))
            .color(YELLOW)
            .stroke_weight(2.0);
    }
}
