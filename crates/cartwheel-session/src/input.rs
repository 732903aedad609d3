use crate::config::Rotation;

/// Abstract controls reported by a controller backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Control {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    X,
    Y,
    Select,
    Start,
    LeftBumper,
    RightBumper,
    /// Escape / home. Never reaches the core.
    Menu,
}

/// Source of physical controller state for player one.
pub trait Controller {
    /// Refreshes the state reported by `is_down`.
    fn poll(&mut self);

    fn is_down(&self, control: Control) -> bool;
}

/// A controller with nothing pressed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullController;

impl Controller for NullController {
    fn poll(&mut self) {}

    fn is_down(&self, _control: Control) -> bool {
        false
    }
}

/// Core joypad bits.
pub mod button {
    pub const A: u16 = 1 << 0;
    pub const B: u16 = 1 << 1;
    pub const SELECT: u16 = 1 << 2;
    pub const START: u16 = 1 << 3;
    pub const RIGHT: u16 = 1 << 4;
    pub const LEFT: u16 = 1 << 5;
    pub const UP: u16 = 1 << 6;
    pub const DOWN: u16 = 1 << 7;
    pub const R: u16 = 1 << 8;
    pub const L: u16 = 1 << 9;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub const fn bit(self) -> u16 {
        match self {
            Direction::Up => button::UP,
            Direction::Down => button::DOWN,
            Direction::Left => button::LEFT,
            Direction::Right => button::RIGHT,
        }
    }

    const fn index(self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Down => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }

    /// Core-relative direction for a physical direction on a screen rotated
    /// by `rotation`.
    pub const fn remap(self, rotation: Rotation) -> Direction {
        ROTATION_TABLE[self.index()][rotation.quadrant() as usize]
    }
}

use Direction as D;

// Rows: physical Up, Down, Left, Right. Columns: quadrant 0..=3.
const ROTATION_TABLE: [[Direction; 4]; 4] = [
    [D::Up, D::Left, D::Down, D::Right],
    [D::Down, D::Right, D::Up, D::Left],
    [D::Left, D::Down, D::Right, D::Up],
    [D::Right, D::Up, D::Left, D::Down],
];

/// Packed core input mask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct InputState(pub u16);

impl InputState {
    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, bits: u16) -> bool {
        self.0 & bits == bits
    }
}

/// Result of one controller poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Poll {
    Input(InputState),
    /// The menu control was just pressed.
    PauseRequested,
    /// The menu control is still held after a pause request or resume.
    WaitingForRelease,
}

/// Turns controller state into the core's rotation-aware input mask.
#[derive(Debug)]
pub struct ControllerInputMapper {
    rotation: Rotation,
    shoulders: bool,
    menu_latched: bool,
    state: InputState,
}

impl ControllerInputMapper {
    /// `shoulders` enables the L/R bits, which only the GBA has.
    pub fn new(rotation: Rotation, shoulders: bool) -> Self {
        Self {
            rotation,
            shoulders,
            menu_latched: false,
            state: InputState::default(),
        }
    }

    pub fn poll(&mut self, controller: &mut dyn Controller) -> Poll {
        controller.poll();

        let menu_down = controller.is_down(Control::Menu);
        if self.menu_latched {
            if menu_down {
                self.state = InputState::default();
                return Poll::WaitingForRelease;
            }
            self.menu_latched = false;
        } else if menu_down {
            self.menu_latched = true;
            self.state = InputState::default();
            return Poll::PauseRequested;
        }

        self.state = InputState(self.mask(controller));
        Poll::Input(self.state)
    }

    fn mask(&self, c: &dyn Controller) -> u16 {
        let mut input = 0;

        // First checked wins for opposing directions.
        if c.is_down(Control::Up) {
            input |= Direction::Up.remap(self.rotation).bit();
        } else if c.is_down(Control::Down) {
            input |= Direction::Down.remap(self.rotation).bit();
        }
        if c.is_down(Control::Right) {
            input |= Direction::Right.remap(self.rotation).bit();
        } else if c.is_down(Control::Left) {
            input |= Direction::Left.remap(self.rotation).bit();
        }

        // The core's A sits on the pad's B/X side and vice versa.
        if c.is_down(Control::B) || c.is_down(Control::X) {
            input |= button::A;
        }
        if c.is_down(Control::A) || c.is_down(Control::Y) {
            input |= button::B;
        }
        if c.is_down(Control::Select) {
            input |= button::SELECT;
        }
        if c.is_down(Control::Start) {
            input |= button::START;
        }
        if self.shoulders {
            if c.is_down(Control::LeftBumper) {
                input |= button::L;
            }
            if c.is_down(Control::RightBumper) {
                input |= button::R;
            }
        }

        input
    }

    /// Called on resume: a menu control still held from the pause UI is
    /// ignored until released.
    pub fn rearm(&mut self) {
        self.menu_latched = true;
        self.state = InputState::default();
    }

    /// Mask produced by the last poll.
    pub fn state(&self) -> InputState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct Held(HashSet<Control>);

    impl Held {
        fn with(controls: &[Control]) -> Self {
            Self(controls.iter().copied().collect())
        }
    }

    impl Controller for Held {
        fn poll(&mut self) {}

        fn is_down(&self, control: Control) -> bool {
            self.0.contains(&control)
        }
    }

    fn mask_for(rotation: u8, shoulders: bool, held: &[Control]) -> u16 {
        let mut mapper = ControllerInputMapper::new(Rotation::from_quadrant(rotation), shoulders);
        match mapper.poll(&mut Held::with(held)) {
            Poll::Input(state) => state.bits(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn remap_is_a_bijection_with_inverse() {
        for q in 0..4 {
            let rot = Rotation::from_quadrant(q);
            let image: HashSet<Direction> = Direction::ALL.iter().map(|d| d.remap(rot)).collect();
            assert_eq!(image.len(), 4, "quadrant {q}");
            for d in Direction::ALL {
                assert_eq!(d.remap(rot).remap(rot.inverse()), d, "quadrant {q} {d:?}");
            }
        }
    }

    #[test]
    fn up_follows_rotation() {
        let up = [Control::Up];
        let bits: Vec<u16> = (0..4).map(|q| mask_for(q, false, &up)).collect();
        assert_eq!(
            bits,
            vec![button::UP, button::LEFT, button::DOWN, button::RIGHT]
        );
    }

    #[test]
    fn first_checked_direction_wins() {
        assert_eq!(
            mask_for(0, false, &[Control::Up, Control::Down]),
            button::UP
        );
        assert_eq!(
            mask_for(0, false, &[Control::Left, Control::Right]),
            button::RIGHT
        );
    }

    #[test]
    fn face_buttons_cross_over() {
        assert_eq!(mask_for(0, false, &[Control::B]), button::A);
        assert_eq!(mask_for(0, false, &[Control::X]), button::A);
        assert_eq!(mask_for(0, false, &[Control::A]), button::B);
        assert_eq!(mask_for(0, false, &[Control::Y]), button::B);
        assert_eq!(
            mask_for(0, false, &[Control::Select, Control::Start]),
            button::SELECT | button::START
        );
    }

    #[test]
    fn shoulders_are_gba_only() {
        let held = [Control::LeftBumper, Control::RightBumper];
        assert_eq!(mask_for(0, true, &held), button::L | button::R);
        assert_eq!(mask_for(0, false, &held), 0);
    }

    #[test]
    fn menu_blocks_until_released() {
        let mut mapper = ControllerInputMapper::new(Rotation::NONE, false);
        let mut pad = Held::with(&[Control::Menu, Control::Start]);

        assert_eq!(mapper.poll(&mut pad), Poll::PauseRequested);
        assert_eq!(mapper.state(), InputState(0));
        assert_eq!(mapper.poll(&mut pad), Poll::WaitingForRelease);

        pad.0.remove(&Control::Menu);
        assert_eq!(
            mapper.poll(&mut pad),
            Poll::Input(InputState(button::START))
        );
    }

    #[test]
    fn rearm_ignores_held_menu() {
        let mut mapper = ControllerInputMapper::new(Rotation::NONE, false);
        let mut pad = Held::with(&[Control::Menu]);
        mapper.rearm();
        assert_eq!(mapper.poll(&mut pad), Poll::WaitingForRelease);

        let mut released = Held::default();
        assert_eq!(mapper.poll(&mut released), Poll::Input(InputState(0)));
        assert_eq!(mapper.poll(&mut pad), Poll::PauseRequested);
    }
}
