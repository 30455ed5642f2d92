//! Client session state machine.
//!
//! ```text
//!            open overlay                pause
//!   GAME ─────────────────> INTERFACE ──────────> MENU
//!    ↑  <─────────────────      │                  │
//!    │      close overlay       │ pause            │
//!    │                          ↓                  │
//!    └──────────────────────── MENU <──────────────┘
//!              resume
//! ```

use mindloop_ui::{OverlayKind, UiView};

/// Where the player's input goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Input drives the world.
    #[default]
    Game,
    /// A modal overlay captures input; the world keeps running.
    GameInterface(OverlayKind),
    /// Pause menu.
    Menu,
}

/// Transition requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Show an overlay over the game.
    OpenOverlay(OverlayKind),
    /// Hide the overlay.
    CloseOverlay,
    /// Open the pause menu.
    Pause,
    /// Back to the game from the menu.
    Resume,
}

/// Session state holder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Session {
    state: SessionState,
}

impl Session {
    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Applies `action`. Returns false, changing nothing, if the action is
    /// not valid from the current state.
    pub fn apply(&mut self, action: SessionAction) -> bool {
        let next = match (self.state, action) {
            (SessionState::Game, SessionAction::OpenOverlay(kind)) => SessionState::GameInterface(kind),
            // Switching overlays directly.
            (SessionState::GameInterface(_), SessionAction::OpenOverlay(kind)) => {
                SessionState::GameInterface(kind)
            }
            (SessionState::GameInterface(_), SessionAction::CloseOverlay) => SessionState::Game,
            (SessionState::Game | SessionState::GameInterface(_), SessionAction::Pause) => SessionState::Menu,
            (SessionState::Menu, SessionAction::Resume) => SessionState::Game,
            _ => return false,
        };
        tracing::debug!(from = ?self.state, to = ?next, "Session transition");
        self.state = next;
        true
    }

    /// True if movement and bot-control input reach the world.
    #[must_use]
    pub const fn allows_world_input(&self) -> bool {
        matches!(self.state, SessionState::Game)
    }

    /// View the UI layer should present.
    #[must_use]
    pub const fn ui_view(&self) -> UiView {
        match self.state {
            SessionState::Game => UiView::Hud,
            SessionState::GameInterface(kind) => UiView::Overlay(kind),
            SessionState::Menu => UiView::Menu,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_round_trip() {
        let mut s = Session::default();
        assert!(s.apply(SessionAction::OpenOverlay(OverlayKind::Inventory)));
        assert_eq!(s.state(), SessionState::GameInterface(OverlayKind::Inventory));
        assert!(!s.allows_world_input());
        assert_eq!(s.ui_view(), UiView::Overlay(OverlayKind::Inventory));
        assert!(s.apply(SessionAction::CloseOverlay));
        assert_eq!(s.state(), SessionState::Game);
    }

    #[test]
    fn test_pause_from_overlay_then_resume() {
        let mut s = Session::default();
        s.apply(SessionAction::OpenOverlay(OverlayKind::Map));
        assert!(s.apply(SessionAction::Pause));
        assert_eq!(s.state(), SessionState::Menu);
        assert!(s.apply(SessionAction::Resume));
        assert_eq!(s.state(), SessionState::Game);
    }

    #[test]
    fn test_invalid_transitions_change_nothing() {
        let mut s = Session::default();
        assert!(!s.apply(SessionAction::Resume));
        assert!(!s.apply(SessionAction::CloseOverlay));
        s.apply(SessionAction::Pause);
        assert!(!s.apply(SessionAction::Pause));
        assert!(!s.apply(SessionAction::OpenOverlay(OverlayKind::Map)));
        assert_eq!(s.state(), SessionState::Menu);
    }
}
