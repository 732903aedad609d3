use cartwheel_session::input::{Control, Controller};
use gilrs::{Axis, Button, EventType, GamepadId, Gilrs};
use log::{info, warn};
use std::collections::HashSet;

const AXIS_THRESHOLD: f32 = 0.5;

/// Physical button bound to each abstract control.
fn control_for(button: Button) -> Option<Control> {
    Some(match button {
        Button::DPadUp => Control::Up,
        Button::DPadDown => Control::Down,
        Button::DPadLeft => Control::Left,
        Button::DPadRight => Control::Right,
        Button::South => Control::A,
        Button::East => Control::B,
        Button::West => Control::X,
        Button::North => Control::Y,
        Button::Select => Control::Select,
        Button::Start => Control::Start,
        Button::LeftTrigger => Control::LeftBumper,
        Button::RightTrigger => Control::RightBumper,
        Button::Mode => Control::Menu,
        _ => return None,
    })
}

/// Player one on the most recently active gamepad.
pub struct GilrsController {
    gilrs: Gilrs,
    active: Option<GamepadId>,
    down: HashSet<Control>,
}

impl GilrsController {
    pub fn new() -> Option<Self> {
        match Gilrs::new() {
            Ok(gilrs) => {
                let active = gilrs.gamepads().next().map(|(id, pad)| {
                    info!("gamepad: {}", pad.name());
                    id
                });
                Some(Self {
                    gilrs,
                    active,
                    down: HashSet::new(),
                })
            }
            Err(e) => {
                warn!("gamepad support unavailable: {e}");
                None
            }
        }
    }
}

impl Controller for GilrsController {
    fn poll(&mut self) {
        while let Some(event) = self.gilrs.next_event() {
            match event.event {
                EventType::Disconnected if self.active == Some(event.id) => self.active = None,
                EventType::Disconnected => {}
                _ => self.active = Some(event.id),
            }
        }

        self.down.clear();
        let Some(pad) = self.active.and_then(|id| self.gilrs.connected_gamepad(id)) else {
            return;
        };
        for button in [
            Button::DPadUp,
            Button::DPadDown,
            Button::DPadLeft,
            Button::DPadRight,
            Button::South,
            Button::East,
            Button::West,
            Button::North,
            Button::Select,
            Button::Start,
            Button::LeftTrigger,
            Button::RightTrigger,
            Button::Mode,
        ] {
            if pad.is_pressed(button)
                && let Some(control) = control_for(button)
            {
                self.down.insert(control);
            }
        }

        if let Some(axis) = pad.axis_data(Axis::LeftStickX) {
            if axis.value() > AXIS_THRESHOLD {
                self.down.insert(Control::Right);
            } else if axis.value() < -AXIS_THRESHOLD {
                self.down.insert(Control::Left);
            }
        }
        if let Some(axis) = pad.axis_data(Axis::LeftStickY) {
            if axis.value() > AXIS_THRESHOLD {
                self.down.insert(Control::Up);
            } else if axis.value() < -AXIS_THRESHOLD {
                self.down.insert(Control::Down);
            }
        }
    }

    fn is_down(&self, control: Control) -> bool {
        self.down.contains(&control)
    }
}
