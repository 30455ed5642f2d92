//! Input capture.
//!
//! A device reports raw state; [`InputCapture::sample`] turns it into an
//! [`InputSnapshot`] once per client frame. The snapshot keeps the current
//! and the previous frame's state, and edge events are derived from the two.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    /// Left mouse button.
    Left,
    /// Right mouse button.
    Right,
    /// Middle mouse button (scroll wheel click).
    Middle,
}

impl MouseButton {
    const fn mask(self) -> u8 {
        match self {
            MouseButton::Left => 1,
            MouseButton::Right => 2,
            MouseButton::Middle => 4,
        }
    }
}

/// Keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Key {
    /// Escape key.
    Escape,
    /// Enter/Return key.
    Enter,
    /// Tab key.
    Tab,
    /// Space bar.
    Space,
    /// Either shift key.
    Shift,
    /// Either control key.
    Ctrl,
    /// Arrow up.
    Up,
    /// Arrow down.
    Down,
    /// Arrow left.
    Left,
    /// Arrow right.
    Right,
    /// Letter key A.
    A,
    /// Letter key B.
    B,
    /// Letter key C.
    C,
    /// Letter key D.
    D,
    /// Letter key E.
    E,
    /// Letter key F.
    F,
    /// Letter key G.
    G,
    /// Letter key H.
    H,
    /// Letter key I.
    I,
    /// Letter key J.
    J,
    /// Letter key K.
    K,
    /// Letter key L.
    L,
    /// Letter key M.
    M,
    /// Letter key N.
    N,
    /// Letter key O.
    O,
    /// Letter key P.
    P,
    /// Letter key Q.
    Q,
    /// Letter key R.
    R,
    /// Letter key S.
    S,
    /// Letter key T.
    T,
    /// Letter key U.
    U,
    /// Letter key V.
    V,
    /// Letter key W.
    W,
    /// Letter key X.
    X,
    /// Letter key Y.
    Y,
    /// Letter key Z.
    Z,
    /// Number key 0.
    Num0,
    /// Number key 1.
    Num1,
    /// Number key 2.
    Num2,
    /// Number key 3.
    Num3,
    /// Number key 4.
    Num4,
    /// Number key 5.
    Num5,
    /// Number key 6.
    Num6,
    /// Number key 7.
    Num7,
    /// Number key 8.
    Num8,
    /// Number key 9.
    Num9,
}

/// Set of held keys, one bit per [`Key`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KeySet(u64);

impl KeySet {
    /// Empty set.
    pub const EMPTY: Self = Self(0);

    /// Builds a set from a list of keys.
    #[must_use]
    pub fn of(keys: &[Key]) -> Self {
        keys.iter().fold(Self::EMPTY, |set, &k| set.with(k))
    }

    /// Returns the set with `key` added.
    #[must_use]
    pub const fn with(self, key: Key) -> Self {
        Self(self.0 | (1 << key as u8))
    }

    /// Adds a key.
    pub fn insert(&mut self, key: Key) {
        self.0 |= 1 << key as u8;
    }

    /// Removes a key.
    pub fn remove(&mut self, key: Key) {
        self.0 &= !(1 << key as u8);
    }

    /// Returns true if `key` is in the set.
    #[must_use]
    pub const fn contains(self, key: Key) -> bool {
        self.0 & (1 << key as u8) != 0
    }

    /// Returns true if no key is held.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Raw device state for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeviceState {
    /// Keys currently held.
    pub keys: KeySet,
    /// Mouse buttons currently held (bit mask).
    pub buttons: u8,
    /// Relative pointer motion since the last poll, `None` if the device
    /// reported none.
    pub pointer_motion: Option<(f32, f32)>,
    /// Scroll since the last poll.
    pub scroll: f32,
}

impl DeviceState {
    /// Device state with the given keys held and nothing else.
    #[must_use]
    pub fn keys(keys: &[Key]) -> Self {
        Self { keys: KeySet::of(keys), ..Self::default() }
    }

    /// Returns a copy with pointer motion set.
    #[must_use]
    pub fn with_motion(mut self, dx: f32, dy: f32) -> Self {
        self.pointer_motion = Some((dx, dy));
        self
    }

    /// Returns a copy with a mouse button held.
    #[must_use]
    pub fn with_button(mut self, button: MouseButton) -> Self {
        self.buttons |= button.mask();
        self
    }
}

/// Source of raw device state. Polled once per client frame.
pub trait InputDevice: Send {
    /// Returns the device state accumulated since the previous poll.
    fn poll(&mut self) -> DeviceState;
}

/// Device fed by platform key/mouse events.
///
/// Motion and scroll accumulate between polls and reset on poll; held keys
/// and buttons persist.
#[derive(Debug, Default)]
pub struct EventDevice {
    keys: KeySet,
    buttons: u8,
    motion: Option<(f32, f32)>,
    scroll: f32,
}

impl EventDevice {
    /// Creates a device with nothing held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a key press.
    pub fn key_down(&mut self, key: Key) {
        self.keys.insert(key);
    }

    /// Records a key release.
    pub fn key_up(&mut self, key: Key) {
        self.keys.remove(key);
    }

    /// Records a mouse button press.
    pub fn mouse_button_down(&mut self, button: MouseButton) {
        self.buttons |= button.mask();
    }

    /// Records a mouse button release.
    pub fn mouse_button_up(&mut self, button: MouseButton) {
        self.buttons &= !button.mask();
    }

    /// Records relative pointer motion.
    pub fn mouse_motion(&mut self, dx: f32, dy: f32) {
        let (x, y) = self.motion.unwrap_or((0.0, 0.0));
        self.motion = Some((x + dx, y + dy));
    }

    /// Records scroll input.
    pub fn scroll(&mut self, delta: f32) {
        self.scroll += delta;
    }
}

impl InputDevice for EventDevice {
    fn poll(&mut self) -> DeviceState {
        DeviceState {
            keys: self.keys,
            buttons: self.buttons,
            pointer_motion: self.motion.take(),
            scroll: std::mem::take(&mut self.scroll),
        }
    }
}

/// Device replaying a fixed script, one state per poll.
///
/// When the script runs out the last held keys stay held with no motion.
#[derive(Debug, Default)]
pub struct ScriptedDevice {
    frames: VecDeque<DeviceState>,
    held: KeySet,
    held_buttons: u8,
}

impl ScriptedDevice {
    /// Creates a device from a sequence of frames.
    #[must_use]
    pub fn new(frames: impl IntoIterator<Item = DeviceState>) -> Self {
        Self { frames: frames.into_iter().collect(), ..Self::default() }
    }

    /// Appends a frame.
    pub fn push(&mut self, frame: DeviceState) {
        self.frames.push_back(frame);
    }

    /// Frames left to replay.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl InputDevice for ScriptedDevice {
    fn poll(&mut self) -> DeviceState {
        match self.frames.pop_front() {
            Some(state) => {
                self.held = state.keys;
                self.held_buttons = state.buttons;
                state
            }
            None => DeviceState { keys: self.held, buttons: self.held_buttons, ..DeviceState::default() },
        }
    }
}

/// Input for one client frame: current state plus the previous frame's.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSnapshot {
    /// Frame this snapshot was sampled for.
    pub frame: u64,
    current: DeviceState,
    previous: DeviceState,
}

impl InputSnapshot {
    /// Returns true if the key is held this frame.
    #[must_use]
    pub fn is_down(&self, key: Key) -> bool {
        self.current.keys.contains(key)
    }

    /// Returns true if the key went down this frame.
    #[must_use]
    pub fn pressed_this_frame(&self, key: Key) -> bool {
        self.current.keys.contains(key) && !self.previous.keys.contains(key)
    }

    /// Returns true if the key went up this frame.
    #[must_use]
    pub fn released_this_frame(&self, key: Key) -> bool {
        !self.current.keys.contains(key) && self.previous.keys.contains(key)
    }

    /// Returns true if the mouse button is held this frame.
    #[must_use]
    pub fn button_down(&self, button: MouseButton) -> bool {
        self.current.buttons & button.mask() != 0
    }

    /// Returns true if the mouse button went down this frame.
    #[must_use]
    pub fn button_pressed(&self, button: MouseButton) -> bool {
        self.button_down(button) && self.previous.buttons & button.mask() == 0
    }

    /// Pointer motion since the previous sample. Zero if none was reported.
    #[must_use]
    pub fn pointer_delta(&self) -> (f32, f32) {
        self.current.pointer_motion.unwrap_or((0.0, 0.0))
    }

    /// Scroll since the previous sample.
    #[must_use]
    pub fn scroll(&self) -> f32 {
        self.current.scroll
    }

    /// Returns true if any key or button is held.
    #[must_use]
    pub fn any_down(&self) -> bool {
        !self.current.keys.is_empty() || self.current.buttons != 0
    }
}

/// Owns the input device and the two-deep snapshot history.
pub struct InputCapture {
    device: Box<dyn InputDevice>,
    snapshot: InputSnapshot,
    sampled: Option<u64>,
}

impl InputCapture {
    /// Creates a capture over `device`.
    #[must_use]
    pub fn new(device: Box<dyn InputDevice>) -> Self {
        Self { device, snapshot: InputSnapshot::default(), sampled: None }
    }

    /// Samples the device for `frame`.
    ///
    /// The new snapshot's previous half is the old current half. Sampling
    /// the same frame twice does not poll the device again.
    pub fn sample(&mut self, frame: u64) -> &InputSnapshot {
        if self.sampled != Some(frame) {
            let state = self.device.poll();
            self.snapshot = InputSnapshot {
                frame,
                previous: self.snapshot.current,
                current: state,
            };
            self.sampled = Some(frame);
        }
        &self.snapshot
    }

    /// The most recent snapshot.
    #[must_use]
    pub fn latest(&self) -> &InputSnapshot {
        &self.snapshot
    }
}

impl std::fmt::Debug for InputCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputCapture")
            .field("snapshot", &self.snapshot)
            .field("sampled", &self.sampled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(frames: Vec<DeviceState>) -> InputCapture {
        InputCapture::new(Box::new(ScriptedDevice::new(frames)))
    }

    #[test]
    fn test_edges_derived_from_history() {
        let mut input = capture(vec![
            DeviceState::keys(&[Key::W]),
            DeviceState::keys(&[Key::W]),
            DeviceState::keys(&[]),
        ]);

        let s = *input.sample(0);
        assert!(s.pressed_this_frame(Key::W));
        assert!(s.is_down(Key::W));

        let s = *input.sample(1);
        assert!(!s.pressed_this_frame(Key::W));
        assert!(s.is_down(Key::W));

        let s = *input.sample(2);
        assert!(s.released_this_frame(Key::W));
        assert!(!s.is_down(Key::W));
    }

    #[test]
    fn test_same_frame_samples_once() {
        let mut input = capture(vec![DeviceState::keys(&[Key::E]), DeviceState::keys(&[])]);
        assert!(input.sample(7).pressed_this_frame(Key::E));
        assert!(input.sample(7).pressed_this_frame(Key::E));
        assert!(input.sample(8).released_this_frame(Key::E));
    }

    #[test]
    fn test_pointer_delta_zero_without_motion() {
        let mut input = capture(vec![DeviceState::default().with_motion(3.0, -2.0), DeviceState::default()]);
        assert_eq!(input.sample(0).pointer_delta(), (3.0, -2.0));
        assert_eq!(input.sample(1).pointer_delta(), (0.0, 0.0));
    }

    #[test]
    fn test_event_device_accumulates_motion() {
        let mut device = EventDevice::new();
        device.key_down(Key::Shift);
        device.mouse_motion(1.0, 1.0);
        device.mouse_motion(2.0, -3.0);
        device.mouse_button_down(MouseButton::Left);

        let state = device.poll();
        assert!(state.keys.contains(Key::Shift));
        assert_eq!(state.pointer_motion, Some((3.0, -2.0)));
        assert_eq!(state.buttons & MouseButton::Left.mask(), 1);

        let state = device.poll();
        assert!(state.keys.contains(Key::Shift));
        assert_eq!(state.pointer_motion, None);
    }

    #[test]
    fn test_scripted_device_holds_last_keys() {
        let mut device = ScriptedDevice::new([DeviceState::keys(&[Key::D]).with_motion(1.0, 0.0)]);
        device.poll();
        let tail = device.poll();
        assert!(tail.keys.contains(Key::D));
        assert_eq!(tail.pointer_motion, None);
    }

    #[test]
    fn test_button_edges() {
        let mut input = capture(vec![
            DeviceState::default().with_button(MouseButton::Right),
            DeviceState::default().with_button(MouseButton::Right),
        ]);
        assert!(input.sample(0).button_pressed(MouseButton::Right));
        let s = input.sample(1);
        assert!(s.button_down(MouseButton::Right));
        assert!(!s.button_pressed(MouseButton::Right));
    }
}
