use crate::controls::ControlState;
use macroquad::prelude::*;
use std::time::{Duration, Instant};

/// Haptic feedback, surfaced as a pulsing indicator instead of a motor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rumble {
    strength: f32,
    until: Option<Instant>,
}

impl Rumble {
    pub fn start(&mut self, strength: f32, duration_ms: u32, now: Instant) {
        self.strength = strength.clamp(0.0, 1.0);
        self.until = Some(now + Duration::from_millis(duration_ms as u64));
    }

    pub fn stop(&mut self) {
        self.strength = 0.0;
        self.until = None;
    }

    /// Current strength, 0 once the rumble has run out.
    pub fn level(&self, now: Instant) -> f32 {
        match self.until {
            Some(until) if now < until => self.strength,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HudConfig<'a> {
    pub player_name: &'a str,
    pub companion: &'a str,
    pub server: &'a str,
    pub controls: ControlState,
    pub rumble_level: f32,
}

pub struct Renderer {
    width: f32,
    height: f32,
}

impl Renderer {
    pub fn new(width: usize, height: usize) -> Self {
        Renderer {
            width: width as f32,
            height: height as f32,
        }
    }

    pub fn render(&mut self, config: HudConfig<'_>) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        self.draw_status(&config);
        let controls = config.controls;
        let stick_y = self.height * 0.6;
        self.draw_stick(self.width * 0.3, stick_y, controls.dx, controls.dy, "MOVE");
        self.draw_stick(self.width * 0.7, stick_y, controls.rx, controls.ry, "LOOK");
        self.draw_vertical(self.width * 0.5, stick_y, controls.dz);
        self.draw_compass(controls.yaw);
        self.draw_rumble(config.rumble_level);
    }

    fn draw_status(&mut self, config: &HudConfig<'_>) {
        let text = format!(
            "{} as {} on {}",
            config.companion, config.player_name, config.server
        );
        draw_rectangle(10.0, 10.0, 8.0, 8.0, GREEN);
        draw_text(&text, 24.0, 18.0, 16.0, WHITE);
        draw_text(
            "WASD move, Q/E down/up, arrows look, Backspace home, Esc quit",
            10.0,
            self.height - 10.0,
            14.0,
            GRAY,
        );
    }

    fn draw_stick(&mut self, x: f32, y: f32, ax: i16, ay: i16, label: &str) {
        let radius = 50.0;
        draw_circle_lines(x, y, radius, 2.0, WHITE);

        let knob_x = x + radius * ax as f32 / i16::MAX as f32;
        let knob_y = y + radius * ay as f32 / i16::MAX as f32;
        draw_circle(knob_x, knob_y, 10.0, Color::from_rgba(0, 170, 255, 255));

        draw_text(label, x - 16.0, y + radius + 20.0, 14.0, WHITE);
    }

    fn draw_vertical(&mut self, x: f32, y: f32, dz: i16) {
        let half = 50.0;
        draw_rectangle_lines(x - 6.0, y - half, 12.0, half * 2.0, 1.0, WHITE);
        let offset = -half * dz as f32 / i16::MAX as f32;
        draw_rectangle(x - 6.0, y + offset - 3.0, 12.0, 6.0, YELLOW);
    }

    fn draw_compass(&mut self, yaw: f32) {
        let (cx, cy, radius) = (self.width - 50.0, 50.0, 30.0);
        draw_circle_lines(cx, cy, radius, 1.0, WHITE);
        let (sin, cos) = yaw.sin_cos();
        draw_line(cx, cy, cx + radius * cos, cy - radius * sin, 2.0, YELLOW);
        let label = format!("{:.2} rad", yaw);
        draw_text(&label, cx - 28.0, cy + radius + 16.0, 14.0, WHITE);
    }

    fn draw_rumble(&mut self, level: f32) {
        let (x, y) = (10.0, 30.0);
        let color = if level > 0.0 {
            Color::new(1.0, 0.3, 0.0, 0.4 + 0.6 * level)
        } else {
            Color::from_rgba(51, 51, 51, 255)
        };
        draw_rectangle(x, y, 80.0 * level.max(0.05), 8.0, color);
        draw_rectangle_lines(x, y, 80.0, 8.0, 1.0, WHITE);
        draw_text("RUMBLE", x + 86.0, y + 8.0, 12.0, WHITE);
    }
}
