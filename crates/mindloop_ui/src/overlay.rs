//! UI state driven by the client loop.
//!
//! The client decides which view is active; this module only tracks it,
//! owns the menu cursor and the shared status line.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::input::{InputSnapshot, Key};

/// Modal overlays shown over the live game view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverlayKind {
    /// Inventory panel.
    Inventory,
    /// World map.
    Map,
}

/// What the UI is currently presenting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UiView {
    /// In-game HUD only, no input captured by the UI.
    #[default]
    Hud,
    /// A modal overlay capturing all input.
    Overlay(OverlayKind),
    /// The pause menu.
    Menu,
}

/// Entries of the pause menu, top to bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    /// Return to the game.
    Resume,
    /// Leave the session.
    Quit,
}

const MENU_ITEMS: [MenuItem; 2] = [MenuItem::Resume, MenuItem::Quit];

/// Result of feeding one frame of input to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiResponse {
    /// Nothing for the client to act on.
    None,
    /// The player activated a menu entry.
    Activated(MenuItem),
}

/// Status line shared between the loading screen and the server init.
///
/// Cloning shares the same line.
#[derive(Debug, Clone, Default)]
pub struct StatusText {
    inner: Arc<Mutex<String>>,
}

impl StatusText {
    /// Creates an empty status line.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the status text.
    pub fn set(&self, text: impl Into<String>) {
        *self.inner.lock() = text.into();
    }

    /// Clears the status text.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Returns a copy of the current text.
    #[must_use]
    pub fn get(&self) -> String {
        self.inner.lock().clone()
    }
}

/// UI state for one client.
#[derive(Debug, Default)]
pub struct UiState {
    view: UiView,
    menu_cursor: usize,
    status: StatusText,
    /// Frames in which the UI consumed input.
    consumed_frames: u64,
}

impl UiState {
    /// Creates UI state presenting the HUD.
    #[must_use]
    pub fn new(status: StatusText) -> Self {
        Self { status, ..Self::default() }
    }

    /// Switches the presented view. Entering the menu resets its cursor.
    pub fn present(&mut self, view: UiView) {
        if view == UiView::Menu && self.view != UiView::Menu {
            self.menu_cursor = 0;
        }
        self.view = view;
    }

    /// The presented view.
    #[must_use]
    pub const fn view(&self) -> UiView {
        self.view
    }

    /// The overlay that is visually active, if any.
    #[must_use]
    pub const fn active_overlay(&self) -> Option<OverlayKind> {
        match self.view {
            UiView::Overlay(kind) => Some(kind),
            _ => None,
        }
    }

    /// The highlighted menu entry.
    #[must_use]
    pub fn menu_selection(&self) -> MenuItem {
        MENU_ITEMS[self.menu_cursor]
    }

    /// The shared status line.
    #[must_use]
    pub fn status(&self) -> &StatusText {
        &self.status
    }

    /// Number of frames in which the UI consumed input.
    #[must_use]
    pub const fn consumed_frames(&self) -> u64 {
        self.consumed_frames
    }

    /// Feeds one frame of input. Only overlays and the menu consume input.
    pub fn handle_input(&mut self, input: &InputSnapshot) -> UiResponse {
        match self.view {
            UiView::Hud => UiResponse::None,
            UiView::Overlay(_) => {
                self.consumed_frames += 1;
                UiResponse::None
            }
            UiView::Menu => {
                self.consumed_frames += 1;
                if input.pressed_this_frame(Key::Down) {
                    self.menu_cursor = (self.menu_cursor + 1) % MENU_ITEMS.len();
                }
                if input.pressed_this_frame(Key::Up) {
                    self.menu_cursor = (self.menu_cursor + MENU_ITEMS.len() - 1) % MENU_ITEMS.len();
                }
                if input.pressed_this_frame(Key::Enter) {
                    UiResponse::Activated(self.menu_selection())
                } else {
                    UiResponse::None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{DeviceState, InputCapture, ScriptedDevice};

    #[test]
    fn test_status_text_is_shared() {
        let status = StatusText::new();
        let ui = UiState::new(status.clone());
        status.set("Spawning bots 3/10");
        assert_eq!(ui.status().get(), "Spawning bots 3/10");
        status.clear();
        assert!(ui.status().get().is_empty());
    }

    #[test]
    fn test_menu_navigation() {
        let mut input = InputCapture::new(Box::new(ScriptedDevice::new([
            DeviceState::keys(&[Key::Down]),
            DeviceState::keys(&[]),
            DeviceState::keys(&[Key::Enter]),
        ])));
        let mut ui = UiState::default();
        ui.present(UiView::Menu);

        assert_eq!(ui.handle_input(input.sample(0)), UiResponse::None);
        assert_eq!(ui.menu_selection(), MenuItem::Quit);
        ui.handle_input(input.sample(1));
        assert_eq!(ui.handle_input(input.sample(2)), UiResponse::Activated(MenuItem::Quit));
        assert_eq!(ui.consumed_frames(), 3);
    }

    #[test]
    fn test_hud_consumes_nothing() {
        let mut ui = UiState::default();
        let snapshot = InputSnapshot::default();
        assert_eq!(ui.handle_input(&snapshot), UiResponse::None);
        assert_eq!(ui.consumed_frames(), 0);
        assert_eq!(ui.active_overlay(), None);

        ui.present(UiView::Overlay(OverlayKind::Map));
        assert_eq!(ui.active_overlay(), Some(OverlayKind::Map));
    }
}
