//! # Engine Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file (or no file) yields a runnable configuration.
//!
//! ```toml
//! [world]
//! seed = 7
//! bot_count = 12
//!
//! [server]
//! tick_rate = 30
//! max_mind_spawns_per_tick = 4
//!
//! [client]
//! slow_speed = 3.0
//! fast_speed = 12.0
//! ```

use std::path::Path;

use mindloop_ui::Key;
use serde::Deserialize;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {message}")]
    Io {
        /// Path that was read.
        path: String,
        /// OS error text.
        message: String,
    },

    /// The TOML could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// World population and storage limits.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Seed for spawn placement and every bot's decisions.
    pub seed: u64,
    /// Bots spawned at init.
    pub bot_count: usize,
    /// Static props spawned at init.
    pub prop_count: usize,
    /// Entity pool capacity.
    pub max_entities: usize,
    /// Transient effect pool capacity.
    pub max_effects: usize,
    /// Radius around the origin used for initial placement.
    pub spawn_radius: f32,
    /// Half-size of the square world on X and Z.
    pub half_extent: f32,
    /// World ceiling on Y.
    pub height: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED,
            bot_count: 16,
            prop_count: 8,
            max_entities: 1024,
            max_effects: 256,
            spawn_radius: 24.0,
            half_extent: 64.0,
            height: 32.0,
        }
    }
}

/// Highest accepted `server.tick_rate`.
pub const MAX_TICK_RATE: u32 = 10_000;

/// Server loop timing and mind scheduling policy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Fixed ticks per second. The quantum is `1 / tick_rate`.
    pub tick_rate: u32,
    /// Catch-up cap: ticks run per wall-clock update at most.
    pub max_ticks_per_update: u32,
    /// Mind pool capacity.
    pub max_minds: usize,
    /// New minds created per tick at most. The rest wait for later ticks.
    pub max_mind_spawns_per_tick: usize,
    /// Bound of the client → server request queue.
    pub request_capacity: usize,
    /// Bound of the server → client event queue.
    pub event_capacity: usize,
    /// Lifetime of a transient effect, in ticks.
    pub effect_ttl_ticks: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30,
            max_ticks_per_update: 5,
            max_minds: 256,
            max_mind_spawns_per_tick: 8,
            request_capacity: 1024,
            event_capacity: 2048,
            effect_ttl_ticks: 15,
        }
    }
}

/// Client key bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    /// Pause menu (and resume from it).
    pub pause: Key,
    /// Toggle the inventory overlay.
    pub inventory: Key,
    /// Toggle the map overlay.
    pub map: Key,
    /// Possess the nearest bot.
    pub possess: Key,
    /// Release the possessed bot.
    pub release: Key,
    /// Send the nearest bot to the camera position.
    pub command: Key,
    /// Held for the fast free-camera speed.
    pub fast_modifier: Key,
    /// Move forward.
    pub forward: Key,
    /// Move back.
    pub back: Key,
    /// Strafe left.
    pub left: Key,
    /// Strafe right.
    pub right: Key,
    /// Free camera up.
    pub up: Key,
    /// Free camera down.
    pub down: Key,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            pause: Key::Escape,
            inventory: Key::I,
            map: Key::M,
            possess: Key::E,
            release: Key::R,
            command: Key::F,
            fast_modifier: Key::Shift,
            forward: Key::W,
            back: Key::S,
            left: Key::A,
            right: Key::D,
            up: Key::Space,
            down: Key::Ctrl,
        }
    }
}

/// Client loop tuning. Sensitivities are inputs, never computed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Degrees of rotation per pointer count.
    pub mouse_sensitivity: f32,
    /// Invert vertical look.
    pub invert_y: bool,
    /// Free camera speed, units per second.
    pub slow_speed: f32,
    /// Free camera speed with the fast modifier held.
    pub fast_speed: f32,
    /// Speed of a possessed bot.
    pub walk_speed: f32,
    /// Max distance for possess/command targeting.
    pub possess_range: f32,
    /// Render proxy pool capacity (per frame).
    pub render_proxy_capacity: usize,
    /// Elapsed time is clamped to this before use.
    pub max_frame_delta_ms: u64,
    /// Check backend error state after every call.
    pub validate_backends: bool,
    /// Treat a backend validation failure as fatal.
    pub fatal_backend_errors: bool,
    /// Frames a ticket may stay unanswered before it is given up on.
    pub ticket_timeout_frames: u64,
    /// Key bindings.
    pub bindings: KeyBindings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            mouse_sensitivity: 0.15,
            invert_y: false,
            slow_speed: 4.0,
            fast_speed: 16.0,
            walk_speed: 3.0,
            possess_range: 12.0,
            render_proxy_capacity: 2048,
            max_frame_delta_ms: 100,
            validate_backends: cfg!(debug_assertions),
            fatal_backend_errors: false,
            ticket_timeout_frames: 120,
            bindings: KeyBindings::default(),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// World settings.
    pub world: WorldConfig,
    /// Server loop settings.
    pub server: ServerConfig,
    /// Client loop settings.
    pub client: ClientConfig,
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on bad TOML, [`ConfigError::Invalid`] on
    /// out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`EngineConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks ranges and cross-field constraints.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_owned()));

        if self.server.tick_rate == 0 {
            return invalid("server.tick_rate must be positive");
        }
        if self.server.tick_rate > MAX_TICK_RATE {
            return invalid("server.tick_rate exceeds 10000 ticks per second");
        }
        if self.server.max_ticks_per_update == 0 {
            return invalid("server.max_ticks_per_update must be positive");
        }
        if self.server.max_minds == 0 || self.world.max_entities == 0 || self.world.max_effects == 0 {
            return invalid("pool capacities must be positive");
        }
        if self.server.max_mind_spawns_per_tick == 0 {
            return invalid("server.max_mind_spawns_per_tick must be positive");
        }
        if self.server.request_capacity == 0 || self.server.event_capacity == 0 {
            return invalid("channel capacities must be positive");
        }
        if self.client.render_proxy_capacity == 0 {
            return invalid("client.render_proxy_capacity must be positive");
        }
        if self.client.ticket_timeout_frames == 0 {
            return invalid("client.ticket_timeout_frames must be positive");
        }
        if self.world.bot_count + self.world.prop_count > self.world.max_entities {
            return invalid("world.bot_count + world.prop_count exceeds world.max_entities");
        }
        if self.world.spawn_radius > self.world.half_extent {
            return invalid("world.spawn_radius must fit inside world.half_extent");
        }
        if !(self.client.slow_speed > 0.0 && self.client.slow_speed <= self.client.fast_speed) {
            return invalid("client speeds must satisfy 0 < slow_speed <= fast_speed");
        }
        Ok(())
    }
}
