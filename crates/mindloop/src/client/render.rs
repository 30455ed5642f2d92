//! Per-frame render submission.
//!
//! Every frame the snapshot is turned into render proxies taken from a
//! fixed pool, submitted, and released before the frame ends. Entities that
//! do not fit in the pool are culled for that frame.

use mindloop_core::PoolAllocator;

use crate::backend::{Attachment, BackendValidation, Drawable, RenderBackend};
use crate::error::EngineResult;
use crate::validate_backend;
use crate::world::{EntityView, WorldSnapshot};

#[derive(Debug, Clone, Copy)]
struct RenderProxy {
    drawable: Drawable,
    attachment: Attachment,
}

impl RenderProxy {
    fn from_view(view: &EntityView) -> Self {
        let drawable = Drawable {
            position: view.position.to_array(),
            yaw: view.yaw,
            model: view.model.0,
            flags: if view.possessed { Drawable::FLAG_POSSESSED } else { 0 },
        };
        let attachment = if view.possessed { Attachment::Camera } else { Attachment::Entity(view.id.slot()) };
        Self { drawable, attachment }
    }
}

/// What one frame submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameDraw {
    /// Drawables submitted.
    pub drawn: usize,
    /// Entities skipped because the proxy pool was full.
    pub culled: usize,
}

/// Builds and submits render proxies.
#[derive(Debug)]
pub struct FrameRenderer {
    proxies: PoolAllocator<RenderProxy>,
    last: FrameDraw,
}

impl FrameRenderer {
    /// Creates a renderer with room for `capacity` proxies per frame.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { proxies: PoolAllocator::new(capacity), last: FrameDraw::default() }
    }

    /// Submits `snapshot` to `backend`. All proxies are released again
    /// before this returns, also on error.
    ///
    /// # Errors
    ///
    /// A backend validation failure when validation is fatal.
    pub fn render(
        &mut self,
        snapshot: &WorldSnapshot,
        backend: &mut dyn RenderBackend,
        validation: BackendValidation,
    ) -> EngineResult<FrameDraw> {
        let mut frame = FrameDraw::default();
        for view in &snapshot.entities {
            if self.proxies.acquire_with(|| RenderProxy::from_view(view)).is_err() {
                frame.culled += 1;
            }
        }
        if frame.culled > 0 {
            tracing::warn!(
                culled = frame.culled,
                capacity = self.proxies.capacity(),
                "Render proxy pool full, culling"
            );
        }

        let mut result = Ok(());
        for (_, proxy) in self.proxies.iter() {
            result = validate_backend!(validation, "render", backend, draw(&proxy.drawable, proxy.attachment));
            if result.is_err() {
                break;
            }
            frame.drawn += 1;
        }
        self.proxies.release_all();
        self.last = frame;
        result.map(|()| frame)
    }

    /// What the previous frame submitted.
    #[must_use]
    pub const fn last_frame(&self) -> FrameDraw {
        self.last
    }

    /// Proxies live right now. Zero outside `render`.
    #[must_use]
    pub const fn live_proxies(&self) -> usize {
        self.proxies.live_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingRenderer;
    use crate::config::WorldConfig;
    use crate::error::EngineError;
    use crate::world::{EntityKind, World};
    use mindloop_core::Vec3;

    fn snapshot(n: usize) -> WorldSnapshot {
        let mut world = World::new(&WorldConfig::default(), 0.1);
        for i in 0..n {
            world.spawn(EntityKind::Bot, Vec3::new(i as f32, 0.0, 0.0)).unwrap();
        }
        world.snapshot()
    }

    #[test]
    fn test_draws_everything_and_releases() {
        let mut renderer = FrameRenderer::new(8);
        let mut backend = RecordingRenderer::default();
        let frame = renderer.render(&snapshot(3), &mut backend, BackendValidation::default()).unwrap();
        assert_eq!(frame, FrameDraw { drawn: 3, culled: 0 });
        assert_eq!(renderer.live_proxies(), 0);
        assert_eq!(backend.log.lock().len(), 3);
    }

    #[test]
    fn test_culls_when_full() {
        let mut renderer = FrameRenderer::new(2);
        let mut backend = RecordingRenderer::default();
        for _ in 0..3 {
            let frame = renderer.render(&snapshot(5), &mut backend, BackendValidation::default()).unwrap();
            assert_eq!(frame, FrameDraw { drawn: 2, culled: 3 });
        }
        assert_eq!(renderer.live_proxies(), 0);
    }

    #[test]
    fn test_fatal_validation_still_releases() {
        let mut renderer = FrameRenderer::new(8);
        let mut backend = RecordingRenderer::default();
        *backend.inject_error.lock() = Some("lost device".into());
        let policy = BackendValidation { enabled: true, fatal: true };
        let err = renderer.render(&snapshot(3), &mut backend, policy).unwrap_err();
        assert!(matches!(err, EngineError::BackendValidation { backend: "render", .. }));
        assert_eq!(renderer.live_proxies(), 0);
        assert_eq!(backend.log.lock().len(), 1);
    }
}
