//! # Minds
//!
//! A mind drives one entity. Minds never write the world: each update reads
//! the world as it stood at the start of the tick and returns an [`Intent`].
//! The server applies all intents once the sweep is done.

mod bot;
mod list;

pub use bot::{BotMind, BotState};
pub use list::{MindHandle, MindList, SpawnPolicy, TickReport};

use mindloop_core::Vec3;
use thiserror::Error;

use crate::world::{EffectKind, Entity, EntityId, World};

/// A mind could not produce an intent. The scheduler drops it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MindError {
    /// The body's state is NaN or infinite.
    #[error("entity {entity} has a non-finite position or velocity")]
    NonFinite {
        /// The body.
        entity: EntityId,
    },

    /// Behavior-specific failure.
    #[error("mind of {entity} failed: {reason}")]
    Behavior {
        /// The body.
        entity: EntityId,
        /// What went wrong.
        reason: String,
    },
}

/// What a mind can see during one update.
#[derive(Debug, Clone, Copy)]
pub struct MindContext<'w> {
    /// World as of the start of the tick.
    pub world: &'w World,
    /// Current tick id.
    pub tick: u64,
    /// Fixed quantum, seconds.
    pub dt: f32,
    /// Where the player is watching from, if anywhere.
    pub observer: Option<Vec3>,
    /// The body this mind drives.
    pub entity: EntityId,
}

/// What a mind wants its body to do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Intent {
    /// Desired velocity, units per second.
    pub velocity: Vec3,
    /// Desired facing, degrees.
    pub yaw: f32,
    /// Effect to spawn at the body's position.
    pub effect: Option<EffectKind>,
    /// The commanded destination was reached.
    pub clear_move_target: bool,
}

impl Intent {
    /// Stand still, keep facing `yaw`.
    #[must_use]
    pub fn hold(yaw: f32) -> Self {
        Self { yaw, ..Self::default() }
    }
}

/// Behavior attached to a single entity.
pub trait Mind: Sized {
    /// Builds a mind for `entity`. Runs every time a slot is acquired, so no
    /// state carries over from a previous occupant.
    fn spawn(entity: EntityId, body: &Entity, seed: u64) -> Self;

    /// Decides this tick's intent.
    ///
    /// # Errors
    ///
    /// Any [`MindError`]; the mind is then released by the sweep.
    fn update(&mut self, ctx: &MindContext<'_>, body: &Entity) -> Result<Intent, MindError>;
}
