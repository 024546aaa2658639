// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Input device state (§6): a double-buffered keyboard + mouse snapshot. The platform backend
//! (out of scope per the Non-goals) polls OS input and calls [`InputState::begin_frame`] then
//! [`InputState::set_key`]/[`InputState::set_mouse_position`]/etc. once per frame; systems only
//! ever read through the `is_*` query methods, never the raw per-frame buffers.

use glam::Vec2;
use smallvec::SmallVec;

/// Maximum distinct key codes tracked; keys beyond this are silently ignored rather than
/// panicking, since an out-of-range code is a platform-backend bug, not a core programming
/// contract violation.
pub const MAX_KEYS: usize = 256;

/// Mouse button indices, dense and small enough for a fixed array rather than a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

const MOUSE_BUTTON_COUNT: usize = 3;

fn mouse_button_index(button: MouseButton) -> usize {
    match button {
        MouseButton::Left => 0,
        MouseButton::Right => 1,
        MouseButton::Middle => 2,
    }
}

/// Double-buffered keyboard + mouse state: `current` is authoritative for this frame, `previous`
/// is last frame's snapshot, used to derive `Triggered`/`Released` edges.
pub struct InputState {
    keys_current: [bool; MAX_KEYS],
    keys_previous: [bool; MAX_KEYS],
    mouse_buttons_current: [bool; MOUSE_BUTTON_COUNT],
    mouse_buttons_previous: [bool; MOUSE_BUTTON_COUNT],
    mouse_position: Vec2,
    mouse_delta: Vec2,
    wheel_delta: f32,
    captured: bool,
    text_input: SmallVec<[char; 16]>,
}

impl InputState {
    pub fn new() -> Self {
        Self {
            keys_current: [false; MAX_KEYS],
            keys_previous: [false; MAX_KEYS],
            mouse_buttons_current: [false; MOUSE_BUTTON_COUNT],
            mouse_buttons_previous: [false; MOUSE_BUTTON_COUNT],
            mouse_position: Vec2::ZERO,
            mouse_delta: Vec2::ZERO,
            wheel_delta: 0.0,
            captured: false,
            text_input: SmallVec::new(),
        }
    }

    /// Rotates `current` into `previous` and clears per-frame deltas. Called once by the
    /// platform backend before polling this frame's OS input events.
    pub fn begin_frame(&mut self) {
        self.keys_previous = self.keys_current;
        self.mouse_buttons_previous = self.mouse_buttons_current;
        self.mouse_delta = Vec2::ZERO;
        self.wheel_delta = 0.0;
        self.text_input.clear();
    }

    pub fn set_key(&mut self, key_code: usize, pressed: bool) {
        if let Some(slot) = self.keys_current.get_mut(key_code) {
            *slot = pressed;
        }
    }

    pub fn is_key_pressed(&self, key_code: usize) -> bool {
        self.keys_current.get(key_code).copied().unwrap_or(false)
    }

    pub fn is_key_released(&self, key_code: usize) -> bool {
        let was_down = self.keys_previous.get(key_code).copied().unwrap_or(false);
        let is_down = self.keys_current.get(key_code).copied().unwrap_or(false);
        was_down && !is_down
    }

    /// Triggered: down this frame, not down last frame (the rising edge).
    pub fn is_key_triggered(&self, key_code: usize) -> bool {
        let was_down = self.keys_previous.get(key_code).copied().unwrap_or(false);
        let is_down = self.keys_current.get(key_code).copied().unwrap_or(false);
        is_down && !was_down
    }

    pub fn set_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        self.mouse_buttons_current[mouse_button_index(button)] = pressed;
    }

    pub fn is_mouse_button_pressed(&self, button: MouseButton) -> bool {
        self.mouse_buttons_current[mouse_button_index(button)]
    }

    pub fn is_mouse_button_triggered(&self, button: MouseButton) -> bool {
        let index = mouse_button_index(button);
        self.mouse_buttons_current[index] && !self.mouse_buttons_previous[index]
    }

    pub fn is_mouse_button_released(&self, button: MouseButton) -> bool {
        let index = mouse_button_index(button);
        self.mouse_buttons_previous[index] && !self.mouse_buttons_current[index]
    }

    /// Absolute cursor position; also accumulates the per-frame delta.
    pub fn set_mouse_position(&mut self, position: Vec2) {
        self.mouse_delta += position - self.mouse_position;
        self.mouse_position = position;
    }

    pub fn mouse_position(&self) -> Vec2 {
        self.mouse_position
    }

    pub fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }

    pub fn add_wheel_delta(&mut self, delta: f32) {
        self.wheel_delta += delta;
    }

    pub fn wheel_delta(&self) -> f32 {
        self.wheel_delta
    }

    /// Mouse-capture state (cursor hidden and locked to the window, e.g. during free-look).
    pub fn set_captured(&mut self, captured: bool) {
        self.captured = captured;
    }

    pub fn is_captured(&self) -> bool {
        self.captured
    }

    pub fn push_text_input(&mut self, c: char) {
        self.text_input.push(c);
    }

    pub fn text_input(&self) -> &[char] {
        &self.text_input
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_and_release_edges() {
        let mut input = InputState::new();
        input.begin_frame();
        input.set_key(10, true);
        assert!(input.is_key_triggered(10));
        assert!(!input.is_key_released(10));

        input.begin_frame();
        assert!(!input.is_key_triggered(10));
        assert!(input.is_key_pressed(10));

        input.begin_frame();
        input.set_key(10, false);
        assert!(input.is_key_released(10));
        assert!(!input.is_key_pressed(10));
    }

    #[test]
    fn test_mouse_delta_accumulates_then_resets_on_begin_frame() {
        let mut input = InputState::new();
        input.set_mouse_position(Vec2::new(10.0, 0.0));
        input.set_mouse_position(Vec2::new(15.0, 0.0));
        assert_eq!(input.mouse_delta(), Vec2::new(15.0, 0.0));

        input.begin_frame();
        assert_eq!(input.mouse_delta(), Vec2::ZERO);
    }

    #[test]
    fn test_mouse_button_trigger_and_release() {
        let mut input = InputState::new();
        input.begin_frame();
        input.set_mouse_button(MouseButton::Left, true);
        assert!(input.is_mouse_button_triggered(MouseButton::Left));

        input.begin_frame();
        input.set_mouse_button(MouseButton::Left, false);
        assert!(input.is_mouse_button_released(MouseButton::Left));
    }

    #[test]
    fn test_key_code_out_of_range_is_ignored_not_fatal() {
        let mut input = InputState::new();
        input.set_key(MAX_KEYS + 10, true);
        assert!(!input.is_key_pressed(MAX_KEYS + 10));
    }

    #[test]
    fn test_text_input_clears_each_frame() {
        let mut input = InputState::new();
        input.push_text_input('a');
        assert_eq!(input.text_input(), &['a']);
        input.begin_frame();
        assert!(input.text_input().is_empty());
    }
}
