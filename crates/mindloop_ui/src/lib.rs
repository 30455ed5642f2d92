//! # MINDLOOP UI
//!
//! Client-side input and interface state:
//! - Per-frame device snapshots with derived edge detection
//! - The active view (HUD, modal overlay, menu) chosen by the client loop
//! - A status line shared with the server's loading phase
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                     INPUT PIPELINE                      │
//! ├────────────────────────────────────────────────────────┤
//! │  Device → InputCapture::sample → InputSnapshot          │
//! │                                     ↓                   │
//! │                 Client session (GAME / OVERLAY / MENU)   │
//! │                        ↓                    ↓           │
//! │              World requests           UiState input     │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! Widget rendering and layout are not part of this crate.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod input;
pub mod overlay;

pub use input::{
    DeviceState, EventDevice, InputCapture, InputDevice, InputSnapshot, Key, KeySet, MouseButton,
    ScriptedDevice,
};
pub use overlay::{MenuItem, OverlayKind, StatusText, UiResponse, UiState, UiView};
