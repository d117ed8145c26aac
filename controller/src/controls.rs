//! Gamepad state and the motion math that turns it into packets.
//!
//! Axis values are raw `i16` stick readings. Movement is relative to the
//! avatar's current yaw, so pushing the left stick forward always walks the
//! companion the way it is facing.

use shared::{ServerboundPacket, TeleportTarget};

/// World units per sampler tick at full stick deflection.
pub const MOVE_SCALE: f32 = 0.01;
/// Radians per sampler tick at full stick deflection.
pub const ROTATE_SCALE: f32 = 0.01;

/// Strength and length of the local rumble played on a button press.
pub const BUTTON_RUMBLE_STRENGTH: f32 = 0.5;
pub const BUTTON_RUMBLE_MS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    LeftX,
    LeftY,
    RightX,
    RightY,
    TriggerLeft,
    TriggerRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    South,
    Back,
    Start,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerEvent {
    Axis { axis: Axis, value: i16 },
    ButtonDown(Button),
    ButtonUp(Button),
    Quit,
}

/// What the program should do in response to an input event.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    Send(ServerboundPacket),
    Rumble { strength: f32, duration_ms: u32 },
    StopRumble,
    Quit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlState {
    pub dx: i16,
    pub dy: i16,
    pub dz: i16,
    pub rx: i16,
    pub ry: i16,
    /// Absolute yaw last sent to the server, in radians.
    pub yaw: f32,
}

fn normalise(value: i16) -> f32 {
    value as f32 / i16::MAX as f32
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the pad state and returns what the event asks for, in order.
    /// Every button press rumbles, on top of whatever the button does.
    pub fn apply_event(&mut self, event: ControllerEvent) -> Vec<Reaction> {
        match event {
            ControllerEvent::Axis { axis, value } => {
                match axis {
                    Axis::LeftX => self.dx = value,
                    Axis::LeftY => self.dy = value,
                    Axis::TriggerLeft => self.dz = value.saturating_neg(),
                    Axis::TriggerRight => self.dz = value,
                    Axis::RightX => self.rx = value,
                    Axis::RightY => self.ry = value,
                }
                Vec::new()
            }
            ControllerEvent::ButtonDown(button) => {
                let mut reactions = Vec::with_capacity(2);
                if button == Button::Back {
                    reactions.push(Reaction::Send(ServerboundPacket::Teleport {
                        target: TeleportTarget::Origin,
                    }));
                }
                reactions.push(Reaction::Rumble {
                    strength: BUTTON_RUMBLE_STRENGTH,
                    duration_ms: BUTTON_RUMBLE_MS,
                });
                reactions
            }
            ControllerEvent::ButtonUp(_) => vec![Reaction::StopRumble],
            ControllerEvent::Quit => vec![Reaction::Quit],
        }
    }

    pub fn is_moving(&self) -> bool {
        self.dx != 0 || self.dy != 0 || self.dz != 0
    }

    pub fn is_looking(&self) -> bool {
        self.rx != 0 || self.ry != 0
    }

    /// The yaw-relative move for one tick at the current stick position.
    pub fn move_packet(&self) -> ServerboundPacket {
        let ndx = normalise(self.dx);
        let ndy = normalise(self.dy);
        let ndz = normalise(self.dz);
        let (sin, cos) = self.yaw.sin_cos();

        let rdx = -ndy * cos - ndx * sin;
        let rdy = -ndy * sin + ndx * cos;

        ServerboundPacket::Move {
            dx: MOVE_SCALE * rdx,
            dy: MOVE_SCALE * ndz,
            dz: MOVE_SCALE * rdy,
        }
    }

    /// Packets for one sampler tick. Turning happens after moving, so the
    /// move uses the yaw from before this tick.
    pub fn tick(&mut self) -> Vec<ServerboundPacket> {
        let mut packets = Vec::new();
        if self.is_moving() {
            packets.push(self.move_packet());
        }
        if self.is_looking() {
            self.yaw += ROTATE_SCALE * normalise(self.rx);
            packets.push(ServerboundPacket::Rotate { yaw: self.yaw });
        }
        packets
    }
}
