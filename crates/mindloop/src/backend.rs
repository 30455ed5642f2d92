//! # Backend Interfaces
//!
//! Rendering and audio are collaborators behind traits. A backend never
//! aborts its caller: failures are parked in `last_error` and picked up by
//! [`validate_backend!`](crate::validate_backend) after each call.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use mindloop_core::Vec3;
use parking_lot::Mutex;

use crate::error::{EngineError, EngineResult};

/// Model asset identifier. Resolved by the render backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ModelId(pub u32);

impl ModelId {
    /// Bot body.
    pub const BOT: Self = Self(1);
    /// Static prop.
    pub const PROP: Self = Self(2);
}

/// Sound asset identifier. Resolved by the audio backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SoundId(pub u32);

impl SoundId {
    /// A bot noticed the observer.
    pub const ALERT: Self = Self(1);
    /// A commanded bot reached its target.
    pub const ARRIVE: Self = Self(2);
}

/// GPU-ready draw record.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Drawable {
    /// World position.
    pub position: [f32; 3],
    /// Facing, degrees.
    pub yaw: f32,
    /// Model to draw.
    pub model: u32,
    /// Bit 0: possessed.
    pub flags: u32,
}

impl Drawable {
    /// Flag set on the possessed entity.
    pub const FLAG_POSSESSED: u32 = 1;
}

/// What a drawable is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// World space.
    World,
    /// Follows the camera (first-person body).
    Camera,
    /// Attached to an entity slot.
    Entity(u32),
}

/// Render collaborator.
pub trait RenderBackend: Send {
    /// Queues one drawable for the current frame.
    fn draw(&mut self, drawable: &Drawable, attachment: Attachment);

    /// Error raised by the most recent call, if any. Reading clears it.
    fn last_error(&mut self) -> Option<String>;
}

/// Audio collaborator.
pub trait AudioBackend: Send {
    /// Plays a positional sound.
    fn play(&mut self, sound: SoundId, position: Vec3);

    /// Error raised by the most recent call, if any. Reading clears it.
    fn last_error(&mut self) -> Option<String>;
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl RenderBackend for NullRenderer {
    fn draw(&mut self, _drawable: &Drawable, _attachment: Attachment) {}

    fn last_error(&mut self) -> Option<String> {
        None
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudio;

impl AudioBackend for NullAudio {
    fn play(&mut self, _sound: SoundId, _position: Vec3) {}

    fn last_error(&mut self) -> Option<String> {
        None
    }
}

/// Render backend that records calls into a shared log. Used by tests and
/// the headless host.
#[derive(Debug, Default, Clone)]
pub struct RecordingRenderer {
    /// Draw calls of every frame so far.
    pub log: Arc<Mutex<Vec<(Drawable, Attachment)>>>,
    /// Error reported after the next call.
    pub inject_error: Arc<Mutex<Option<String>>>,
    pending_error: Option<String>,
}

impl RenderBackend for RecordingRenderer {
    fn draw(&mut self, drawable: &Drawable, attachment: Attachment) {
        self.log.lock().push((*drawable, attachment));
        if let Some(err) = self.inject_error.lock().take() {
            self.pending_error = Some(err);
        }
    }

    fn last_error(&mut self) -> Option<String> {
        self.pending_error.take()
    }
}

/// Audio backend that records calls into a shared log.
#[derive(Debug, Default, Clone)]
pub struct RecordingAudio {
    /// Sounds played so far.
    pub log: Arc<Mutex<Vec<(SoundId, Vec3)>>>,
    /// Error reported after the next call.
    pub inject_error: Arc<Mutex<Option<String>>>,
    pending_error: Option<String>,
}

impl AudioBackend for RecordingAudio {
    fn play(&mut self, sound: SoundId, position: Vec3) {
        self.log.lock().push((sound, position));
        if let Some(err) = self.inject_error.lock().take() {
            self.pending_error = Some(err);
        }
    }

    fn last_error(&mut self) -> Option<String> {
        self.pending_error.take()
    }
}

/// Call-site of a validated backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    /// Source file.
    pub file: &'static str,
    /// Source line.
    pub line: u32,
    /// Module path.
    pub function: &'static str,
}

/// Backend validation policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendValidation {
    /// Check `last_error` after each call.
    pub enabled: bool,
    /// Turn a failure into an error instead of a log line.
    pub fatal: bool,
}

impl BackendValidation {
    /// Handles the error state read after a call at `site`.
    ///
    /// # Errors
    ///
    /// [`EngineError::BackendValidation`] when `error` is set and the
    /// policy is fatal.
    pub fn check(
        self,
        backend: &'static str,
        error: Option<String>,
        site: CallSite,
    ) -> EngineResult<()> {
        let Some(message) = error else {
            return Ok(());
        };
        tracing::error!(
            backend,
            file = site.file,
            line = site.line,
            function = site.function,
            %message,
            "Backend call failed"
        );
        if self.fatal {
            return Err(EngineError::BackendValidation {
                backend,
                file: site.file,
                line: site.line,
                function: site.function,
                message,
            });
        }
        Ok(())
    }
}

/// Runs a backend call, then checks its error state when validation is
/// enabled, reporting this call site.
///
/// ```ignore
/// validate_backend!(self.validation, "audio", self.audio, play(sound, pos))?;
/// ```
#[macro_export]
macro_rules! validate_backend {
    ($policy:expr, $name:literal, $backend:expr, $method:ident($($arg:expr),* $(,)?)) => {{
        let policy: $crate::backend::BackendValidation = $policy;
        $backend.$method($($arg),*);
        if policy.enabled {
            let error = $backend.last_error();
            policy.check(
                $name,
                error,
                $crate::backend::CallSite { file: file!(), line: line!(), function: module_path!() },
            )
        } else {
            Ok(())
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drawable_is_pod() {
        let d = Drawable { position: [1.0, 2.0, 3.0], yaw: 90.0, model: 1, flags: 0 };
        let bytes: &[u8] = bytemuck::bytes_of(&d);
        assert_eq!(bytes.len(), 24);
    }

    #[test]
    fn test_validation_nonfatal_logs_only() {
        let mut audio = RecordingAudio::default();
        *audio.inject_error.lock() = Some("device lost".into());
        let policy = BackendValidation { enabled: true, fatal: false };
        let result: EngineResult<()> = validate_backend!(policy, "audio", audio, play(SoundId::ALERT, Vec3::ZERO));
        assert!(result.is_ok());
        assert_eq!(audio.log.lock().len(), 1);
    }

    #[test]
    fn test_validation_fatal_reports_call_site() {
        let mut audio = RecordingAudio::default();
        *audio.inject_error.lock() = Some("device lost".into());
        let policy = BackendValidation { enabled: true, fatal: true };
        let result: EngineResult<()> = validate_backend!(policy, "audio", audio, play(SoundId::ALERT, Vec3::ZERO));
        match result {
            Err(EngineError::BackendValidation { backend, file, message, .. }) => {
                assert_eq!(backend, "audio");
                assert!(file.ends_with("backend.rs"));
                assert_eq!(message, "device lost");
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_disabled_skips_check() {
        let mut render = RecordingRenderer::default();
        *render.inject_error.lock() = Some("lost".into());
        let policy = BackendValidation { enabled: false, fatal: true };
        let result: EngineResult<()> =
            validate_backend!(policy, "render", render, draw(&Drawable::default(), Attachment::World));
        assert!(result.is_ok());
        // Still pending because nobody read it.
        assert_eq!(render.last_error().as_deref(), Some("lost"));
    }
}
