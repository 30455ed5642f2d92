//! # MINDLOOP
//!
//! Real-time simulation core: a fixed-quantum world tick, a scheduler for
//! the minds that drive bots, and a client loop that turns input into world
//! requests and renders published snapshots.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  requests   ┌──────────────────────────────┐
//! │  ClientLoop   │────────────>│          ServerLoop          │
//! │ input/session │             │ requests → integrate → minds │
//! │ camera/render │<────────────│ → intents → effects → publish│
//! └───────────────┘ events +    └──────────────────────────────┘
//!                   snapshots
//! ```
//!
//! The server is the only world mutator. The [`Host`](host::Host) owns both
//! loops and either alternates them on one thread or runs the server on its
//! own thread.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod mind;
pub mod server;
pub mod world;

pub use backend::{AudioBackend, Drawable, RenderBackend};
pub use client::ClientLoop;
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use host::Host;
pub use server::ServerLoop;

/// Lifecycle phase shared by both loops.
///
/// `Uninitialized → Ready (init) → Running (start) → Stopped (stop) →
/// Uninitialized (free)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LoopPhase {
    /// Nothing allocated.
    #[default]
    Uninitialized,
    /// Initialized, not yet running.
    Ready,
    /// Accepting updates.
    Running,
    /// Halted; transient objects released.
    Stopped,
}

impl LoopPhase {
    /// Lowercase name for logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

/// Hooks every loop exposes to the host.
///
/// Out-of-order calls return [`EngineError::InvalidState`] and change
/// nothing.
pub trait Lifecycle {
    /// Input for one update.
    type Frame;

    /// Allocates and prepares state.
    ///
    /// # Errors
    ///
    /// `InvalidState` outside `Uninitialized`, or whatever setup fails with.
    fn init(&mut self) -> EngineResult<()>;

    /// Begins accepting updates.
    ///
    /// # Errors
    ///
    /// `InvalidState` outside `Ready`.
    fn start(&mut self) -> EngineResult<()>;

    /// Runs one step. `Ok(false)` means the loop asks to stop.
    ///
    /// # Errors
    ///
    /// `InvalidState` outside `Running`, or a fatal step failure.
    fn update(&mut self, frame: Self::Frame) -> EngineResult<bool>;

    /// Halts and releases transient objects.
    ///
    /// # Errors
    ///
    /// `InvalidState` outside `Running`.
    fn stop(&mut self) -> EngineResult<()>;

    /// Releases everything `init` allocated.
    ///
    /// # Errors
    ///
    /// `InvalidState` outside `Ready` or `Stopped`.
    fn free(&mut self) -> EngineResult<()>;

    /// Current phase.
    fn phase(&self) -> LoopPhase;
}

/// Builds the `InvalidState` error for `component` if `phase` is not one of
/// `allowed`.
pub(crate) fn require_phase(
    component: &'static str,
    operation: &'static str,
    phase: LoopPhase,
    allowed: &[LoopPhase],
) -> EngineResult<()> {
    if allowed.contains(&phase) {
        return Ok(());
    }
    tracing::error!(component, operation, state = phase.as_str(), "Lifecycle misuse");
    Err(EngineError::InvalidState { component, operation, state: phase.as_str() })
}
