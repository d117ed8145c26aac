//! Keyboard-driven virtual gamepad with change detection

use crate::controls::{Axis, Button, ControllerEvent};
use macroquad::prelude::{is_key_down, KeyCode};

/// Keys held during one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeySnapshot {
    pub a: bool,
    pub d: bool,
    pub w: bool,
    pub s: bool,
    pub q: bool,
    pub e: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub space: bool,
    pub backspace: bool,
    pub enter: bool,
    pub escape: bool,
}

impl KeySnapshot {
    pub fn capture() -> Self {
        Self {
            a: is_key_down(KeyCode::A),
            d: is_key_down(KeyCode::D),
            w: is_key_down(KeyCode::W),
            s: is_key_down(KeyCode::S),
            q: is_key_down(KeyCode::Q),
            e: is_key_down(KeyCode::E),
            left: is_key_down(KeyCode::Left),
            right: is_key_down(KeyCode::Right),
            up: is_key_down(KeyCode::Up),
            down: is_key_down(KeyCode::Down),
            space: is_key_down(KeyCode::Space),
            backspace: is_key_down(KeyCode::Backspace),
            enter: is_key_down(KeyCode::Enter),
            escape: is_key_down(KeyCode::Escape),
        }
    }

    fn axes(&self) -> [(Axis, i16); 6] {
        [
            (Axis::LeftX, axis_value(self.a, self.d)),
            // Stick up reads negative, as on a physical pad.
            (Axis::LeftY, axis_value(self.w, self.s)),
            (Axis::RightX, axis_value(self.left, self.right)),
            (Axis::RightY, axis_value(self.up, self.down)),
            (Axis::TriggerLeft, trigger_value(self.q)),
            (Axis::TriggerRight, trigger_value(self.e)),
        ]
    }

    fn buttons(&self) -> [(Button, bool); 3] {
        [
            (Button::South, self.space),
            (Button::Back, self.backspace),
            (Button::Start, self.enter),
        ]
    }
}

/// Full deflection towards whichever key is held; both or neither is centred.
pub fn axis_value(negative: bool, positive: bool) -> i16 {
    match (negative, positive) {
        (true, false) => -i16::MAX,
        (false, true) => i16::MAX,
        _ => 0,
    }
}

fn trigger_value(held: bool) -> i16 {
    if held {
        i16::MAX
    } else {
        0
    }
}

/// Turns per-frame key state into gamepad events, emitting only changes.
#[derive(Debug, Default)]
pub struct InputManager {
    previous: KeySnapshot,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples the keyboard and returns this frame's events
    pub fn update(&mut self) -> Vec<ControllerEvent> {
        self.events_for(KeySnapshot::capture())
    }

    pub fn events_for(&mut self, current: KeySnapshot) -> Vec<ControllerEvent> {
        let mut events = Vec::new();

        for ((axis, value), (_, before)) in current.axes().into_iter().zip(self.previous.axes()) {
            if value != before {
                events.push(ControllerEvent::Axis { axis, value });
            }
        }

        for ((button, down), (_, was_down)) in
            current.buttons().into_iter().zip(self.previous.buttons())
        {
            match (down, was_down) {
                (true, false) => events.push(ControllerEvent::ButtonDown(button)),
                (false, true) => events.push(ControllerEvent::ButtonUp(button)),
                _ => {}
            }
        }

        if current.escape && !self.previous.escape {
            events.push(ControllerEvent::Quit);
        }

        self.previous = current;
        events
    }
}
