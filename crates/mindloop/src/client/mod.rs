//! # Client Loop
//!
//! One `update` per rendered frame:
//!
//! 1. Sample input
//! 2. Drain server events (ticket answers, sounds)
//! 3. Route input by session state: menu and overlays go to the UI, the
//!    game state drives the camera or the possessed bot
//! 4. Render the latest snapshot
//!
//! The client never touches the world. Everything it wants goes out as a
//! [`WorldRequest`].

mod camera;
mod render;
mod session;

pub use camera::{FreeCamera, MoveAxes, PITCH_LIMIT_DEG};
pub use render::{FrameDraw, FrameRenderer};
pub use session::{Session, SessionAction, SessionState};

use std::collections::HashMap;
use std::time::Duration;

use mindloop_core::Vec3;
use mindloop_ui::{
    InputCapture, InputDevice, InputSnapshot, Key, MenuItem, OverlayKind, StatusText, UiResponse, UiState,
};

use crate::backend::{AudioBackend, BackendValidation, RenderBackend};
use crate::config::ClientConfig;
use crate::error::EngineResult;
use crate::events::{ClientLink, TicketId, TicketOutcome, WorldEvent, WorldRequest};
use crate::validate_backend;
use crate::world::{EntityId, EntityKind, WorldSnapshot};
use crate::{require_phase, Lifecycle, LoopPhase};

const COMPONENT: &str = "client";

/// Eye height above a possessed body's feet.
const EYE_HEIGHT: f32 = 1.7;

/// What an outstanding ticket asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketKind {
    /// Possess a bot.
    Possess,
    /// Release the possessed bot.
    Release,
    /// Send a bot somewhere.
    Command,
}

#[derive(Debug, Clone, Copy)]
struct PendingTicket {
    kind: TicketKind,
    issued_frame: u64,
}

/// Client counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Frames updated.
    pub frames: u64,
    /// Tickets sent.
    pub tickets_issued: u64,
    /// Tickets granted.
    pub tickets_granted: u64,
    /// Tickets rejected.
    pub tickets_rejected: u64,
    /// Tickets dropped after going unanswered for too long.
    pub tickets_expired: u64,
    /// Sounds handed to the audio backend.
    pub sounds_played: u64,
    /// Drawables submitted.
    pub drawn: u64,
    /// Entities culled by the proxy pool.
    pub culled: u64,
}

/// Input, session and render loop for one player.
pub struct ClientLoop {
    config: ClientConfig,
    phase: LoopPhase,
    input: InputCapture,
    session: Session,
    ui: UiState,
    camera: FreeCamera,
    link: ClientLink,
    renderer: FrameRenderer,
    render: Box<dyn RenderBackend>,
    audio: Box<dyn AudioBackend>,
    validation: BackendValidation,
    frame: u64,
    next_ticket: u64,
    pending: HashMap<TicketId, PendingTicket>,
    last_ticket: Option<(TicketId, TicketKind, TicketOutcome)>,
    possessed: Option<EntityId>,
    observer_sent: Option<Vec3>,
    quit_requested: bool,
    stats: ClientStats,
}

impl ClientLoop {
    /// Creates an uninitialized client talking to the server behind `link`.
    #[must_use]
    pub fn new(
        config: &ClientConfig,
        link: ClientLink,
        device: Box<dyn InputDevice>,
        render: Box<dyn RenderBackend>,
        audio: Box<dyn AudioBackend>,
        status: StatusText,
    ) -> Self {
        Self {
            validation: BackendValidation {
                enabled: config.validate_backends,
                fatal: config.fatal_backend_errors,
            },
            renderer: FrameRenderer::new(config.render_proxy_capacity),
            config: config.clone(),
            phase: LoopPhase::Uninitialized,
            input: InputCapture::new(device),
            session: Session::default(),
            ui: UiState::new(status),
            camera: FreeCamera::default(),
            link,
            render,
            audio,
            frame: 0,
            next_ticket: 1,
            pending: HashMap::new(),
            last_ticket: None,
            possessed: None,
            observer_sent: None,
            quit_requested: false,
            stats: ClientStats::default(),
        }
    }

    /// Session state.
    #[must_use]
    pub const fn session(&self) -> SessionState {
        self.session.state()
    }

    /// UI state.
    #[must_use]
    pub const fn ui(&self) -> &UiState {
        &self.ui
    }

    /// Free camera.
    #[must_use]
    pub const fn camera(&self) -> &FreeCamera {
        &self.camera
    }

    /// Bot the player controls, as last confirmed by the server.
    #[must_use]
    pub const fn possessed(&self) -> Option<EntityId> {
        self.possessed
    }

    /// Tickets not yet answered.
    #[must_use]
    pub fn pending_tickets(&self) -> usize {
        self.pending.len()
    }

    /// Most recently answered ticket.
    #[must_use]
    pub const fn last_ticket(&self) -> Option<(TicketId, TicketKind, TicketOutcome)> {
        self.last_ticket
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> ClientStats {
        self.stats
    }

    /// Applies a session transition directly (scripted flows, tests).
    pub fn apply_session(&mut self, action: SessionAction) -> bool {
        let changed = self.session.apply(action);
        self.ui.present(self.session.ui_view());
        changed
    }

    fn issue(&mut self, kind: TicketKind, build: impl FnOnce(TicketId) -> WorldRequest) {
        let ticket = TicketId(self.next_ticket);
        self.next_ticket += 1;
        if self.link.requests.send(build(ticket)) {
            self.pending.insert(ticket, PendingTicket { kind, issued_frame: self.frame });
            self.stats.tickets_issued += 1;
            tracing::debug!(ticket = ticket.0, ?kind, "Ticket issued");
        }
    }

    fn drain_events(&mut self) -> EngineResult<()> {
        while let Ok(event) = self.link.events.try_recv() {
            match event {
                WorldEvent::TicketResolved { ticket, entity, outcome } => {
                    let Some(PendingTicket { kind, .. }) = self.pending.remove(&ticket) else {
                        tracing::debug!(ticket = ticket.0, "Answer for unknown ticket");
                        continue;
                    };
                    match outcome {
                        TicketOutcome::Granted => {
                            self.stats.tickets_granted += 1;
                            match kind {
                                TicketKind::Possess => self.possessed = entity,
                                TicketKind::Release => self.possessed = None,
                                TicketKind::Command => {}
                            }
                        }
                        TicketOutcome::Rejected(reason) => {
                            self.stats.tickets_rejected += 1;
                            tracing::debug!(ticket = ticket.0, ?kind, ?reason, "Ticket rejected");
                        }
                    }
                    self.last_ticket = Some((ticket, kind, outcome));
                }
                WorldEvent::Sound { sound, position } => {
                    validate_backend!(self.validation, "audio", self.audio, play(sound, position))?;
                    self.stats.sounds_played += 1;
                }
                WorldEvent::PossessionLost { entity } => {
                    if self.possessed == Some(entity) {
                        self.possessed = None;
                    }
                }
                WorldEvent::EntityDespawned { entity } => {
                    tracing::trace!(%entity, "Entity despawned");
                }
            }
        }
        Ok(())
    }

    fn expire_tickets(&mut self) {
        let frame = self.frame;
        let timeout = self.config.ticket_timeout_frames;
        let before = self.pending.len();
        self.pending.retain(|ticket, pending| {
            let waiting = frame.saturating_sub(pending.issued_frame);
            if waiting > timeout {
                tracing::warn!(ticket = ticket.0, kind = ?pending.kind, waiting, "Ticket expired unanswered");
                return false;
            }
            true
        });
        self.stats.tickets_expired += (before - self.pending.len()) as u64;
    }

    fn route_session_keys(&mut self, input: &InputSnapshot) {
        let keys = self.config.bindings;
        if input.pressed_this_frame(keys.pause) {
            let action = if self.session.state() == SessionState::Menu {
                SessionAction::Resume
            } else {
                SessionAction::Pause
            };
            self.apply_session(action);
            return;
        }
        for (key, kind) in [(keys.inventory, OverlayKind::Inventory), (keys.map, OverlayKind::Map)] {
            if !input.pressed_this_frame(key) {
                continue;
            }
            let action = match self.session.state() {
                SessionState::GameInterface(open) if open == kind => SessionAction::CloseOverlay,
                _ => SessionAction::OpenOverlay(kind),
            };
            self.apply_session(action);
            return;
        }
    }

    fn move_axes(&self, input: &InputSnapshot) -> MoveAxes {
        let keys = self.config.bindings;
        let axis = |pos: Key, neg: Key| f32::from(u8::from(input.is_down(pos))) - f32::from(u8::from(input.is_down(neg)));
        MoveAxes {
            forward: axis(keys.forward, keys.back),
            right: axis(keys.right, keys.left),
            up: axis(keys.up, keys.down),
        }
    }

    fn game_input(&mut self, input: &InputSnapshot, dt: f32, snapshot: &WorldSnapshot) {
        let (dx, dy) = input.pointer_delta();
        self.camera.look(dx, dy, self.config.mouse_sensitivity, self.config.invert_y);
        let axes = self.move_axes(input);
        let keys = self.config.bindings;

        if let Some(body) = self.possessed.and_then(|id| snapshot.get(id)) {
            let velocity = FreeCamera::planar_velocity(self.camera.yaw, axes, self.config.walk_speed);
            self.link.requests.send(WorldRequest::DrivePossessed { velocity, yaw: self.camera.yaw });
            self.camera.position = body.position + Vec3::Y * EYE_HEIGHT;
        } else {
            let speed = if input.is_down(keys.fast_modifier) {
                self.config.fast_speed
            } else {
                self.config.slow_speed
            };
            if !axes.is_zero() {
                self.camera.fly(axes, speed, dt);
            }
        }

        let eye = self.camera.position;
        let range = self.config.possess_range;
        let controllable = |e: &crate::world::EntityView| e.kind == EntityKind::Bot && !e.possessed;

        if input.pressed_this_frame(keys.possess) && self.possessed.is_none() {
            if let Some(target) = snapshot.nearest(eye, range, controllable).map(|e| e.id) {
                self.issue(TicketKind::Possess, |ticket| WorldRequest::Possess { ticket, entity: target });
            }
        }
        if input.pressed_this_frame(keys.release) && self.possessed.is_some() {
            self.issue(TicketKind::Release, |ticket| WorldRequest::Release { ticket });
        }
        if input.pressed_this_frame(keys.command) {
            if let Some(target) = snapshot.nearest(eye, range, controllable).map(|e| e.id) {
                let point = Vec3::new(eye.x, 0.0, eye.z);
                self.issue(TicketKind::Command, |ticket| WorldRequest::CommandMove {
                    ticket,
                    entity: target,
                    target: point,
                });
            }
        }
    }

    fn sync_observer(&mut self) {
        let observer = match self.session.state() {
            SessionState::Menu => None,
            _ => Some(self.camera.position),
        };
        if observer != self.observer_sent && self.link.requests.send(WorldRequest::SetObserver { position: observer }) {
            self.observer_sent = observer;
        }
    }
}

impl Lifecycle for ClientLoop {
    type Frame = Duration;

    fn init(&mut self) -> EngineResult<()> {
        require_phase(COMPONENT, "init", self.phase, &[LoopPhase::Uninitialized])?;
        self.session = Session::default();
        self.ui.present(self.session.ui_view());
        self.camera = FreeCamera::default();
        self.phase = LoopPhase::Ready;
        tracing::info!(
            slow = self.config.slow_speed,
            fast = self.config.fast_speed,
            validation = self.validation.enabled,
            "Client initialized"
        );
        Ok(())
    }

    fn start(&mut self) -> EngineResult<()> {
        require_phase(COMPONENT, "start", self.phase, &[LoopPhase::Ready])?;
        self.quit_requested = false;
        self.stats = ClientStats::default();
        self.phase = LoopPhase::Running;
        tracing::info!("Client running");
        Ok(())
    }

    fn update(&mut self, elapsed: Duration) -> EngineResult<bool> {
        require_phase(COMPONENT, "update", self.phase, &[LoopPhase::Running])?;
        let dt = elapsed.min(Duration::from_millis(self.config.max_frame_delta_ms)).as_secs_f32();
        self.frame += 1;
        self.stats.frames += 1;
        let input = *self.input.sample(self.frame);

        self.drain_events()?;
        self.expire_tickets();
        let snapshot = self.link.snapshots.load();

        self.route_session_keys(&input);
        match self.ui.handle_input(&input) {
            UiResponse::Activated(MenuItem::Resume) => {
                self.apply_session(SessionAction::Resume);
            }
            UiResponse::Activated(MenuItem::Quit) => {
                tracing::info!("Quit selected");
                self.quit_requested = true;
            }
            UiResponse::None => {}
        }

        if self.session.allows_world_input() {
            self.game_input(&input, dt, &snapshot);
        } else if self.possessed.is_some() {
            // Body stands still while the player is in a menu or overlay.
            self.link.requests.send(WorldRequest::DrivePossessed { velocity: Vec3::ZERO, yaw: self.camera.yaw });
        }
        self.sync_observer();

        let frame = self.renderer.render(&snapshot, self.render.as_mut(), self.validation)?;
        self.stats.drawn += frame.drawn as u64;
        self.stats.culled += frame.culled as u64;

        Ok(!self.quit_requested)
    }

    fn stop(&mut self) -> EngineResult<()> {
        require_phase(COMPONENT, "stop", self.phase, &[LoopPhase::Running])?;
        self.phase = LoopPhase::Stopped;
        tracing::info!(
            frames = self.stats.frames,
            tickets = self.stats.tickets_issued,
            pending = self.pending.len(),
            "Client stopped"
        );
        Ok(())
    }

    fn free(&mut self) -> EngineResult<()> {
        require_phase(COMPONENT, "free", self.phase, &[LoopPhase::Ready, LoopPhase::Stopped])?;
        self.pending.clear();
        self.last_ticket = None;
        self.possessed = None;
        self.observer_sent = None;
        self.phase = LoopPhase::Uninitialized;
        tracing::info!("Client freed");
        Ok(())
    }

    fn phase(&self) -> LoopPhase {
        self.phase
    }
}

impl std::fmt::Debug for ClientLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientLoop")
            .field("phase", &self.phase)
            .field("session", &self.session)
            .field("frame", &self.frame)
            .field("possessed", &self.possessed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NullAudio, NullRenderer, SoundId};
    use crate::events::channel_pair;
    use mindloop_core::SnapshotCell;
    use mindloop_ui::{DeviceState, ScriptedDevice, UiView};

    fn client(frames: Vec<DeviceState>) -> ClientLoop {
        let (_server, requests, events) = channel_pair(64, 64);
        let cell = SnapshotCell::new(WorldSnapshot::default());
        let link = ClientLink { requests, events, snapshots: cell.reader() };
        let mut client = ClientLoop::new(
            &ClientConfig::default(),
            link,
            Box::new(ScriptedDevice::new(frames)),
            Box::new(NullRenderer),
            Box::new(NullAudio),
            StatusText::new(),
        );
        client.init().unwrap();
        client.start().unwrap();
        client
    }

    const FRAME: Duration = Duration::from_millis(100);

    #[test]
    fn test_update_before_start_is_rejected() {
        let (_server, requests, events) = channel_pair(4, 4);
        let cell = SnapshotCell::new(WorldSnapshot::default());
        let link = ClientLink { requests, events, snapshots: cell.reader() };
        let mut client = ClientLoop::new(
            &ClientConfig::default(),
            link,
            Box::new(ScriptedDevice::new([])),
            Box::new(NullRenderer),
            Box::new(NullAudio),
            StatusText::new(),
        );
        assert!(client.update(FRAME).is_err());
        assert_eq!(client.stats().frames, 0);
    }

    #[test]
    fn test_free_camera_slow_and_fast() {
        let mut c = client(vec![DeviceState::keys(&[Key::W]), DeviceState::keys(&[Key::W, Key::Shift])]);
        let z0 = c.camera().position.z;
        c.update(FRAME).unwrap();
        let z1 = c.camera().position.z;
        c.update(FRAME).unwrap();
        let z2 = c.camera().position.z;
        assert!((z1 - z0 - 0.4).abs() < 1e-4);
        assert!((z2 - z1 - 1.6).abs() < 1e-4);
    }

    #[test]
    fn test_frame_delta_is_clamped() {
        let mut c = client(vec![DeviceState::keys(&[Key::W])]);
        let z0 = c.camera().position.z;
        c.update(Duration::from_secs(5)).unwrap();
        assert!((c.camera().position.z - z0 - 0.4).abs() < 1e-4);
    }

    #[test]
    fn test_overlay_blocks_movement() {
        let mut c = client(vec![
            DeviceState::keys(&[Key::I]),
            DeviceState::keys(&[Key::W]),
            DeviceState::keys(&[Key::I]),
        ]);
        let start = c.camera().position;
        c.update(FRAME).unwrap();
        assert_eq!(c.session(), SessionState::GameInterface(OverlayKind::Inventory));
        assert_eq!(c.ui().view(), UiView::Overlay(OverlayKind::Inventory));
        c.update(FRAME).unwrap();
        assert_eq!(c.camera().position, start);
        c.update(FRAME).unwrap();
        assert_eq!(c.session(), SessionState::Game);
    }

    #[test]
    fn test_movement_resumes_after_overlay_closes() {
        let mut c = client(vec![
            DeviceState::keys(&[Key::I]),
            DeviceState::keys(&[Key::W]),
            DeviceState::keys(&[Key::I, Key::W]),
            DeviceState::keys(&[Key::W]),
        ]);
        let start = c.camera().position;
        c.update(FRAME).unwrap();
        c.update(FRAME).unwrap();
        assert_eq!(c.camera().position, start);

        c.update(FRAME).unwrap();
        assert_eq!(c.session(), SessionState::Game);
        assert_eq!(c.ui().view(), UiView::Hud);
        c.update(FRAME).unwrap();
        assert!((c.camera().position.z - start.z - 0.8).abs() < 1e-4);
    }

    #[test]
    fn test_one_frame_drains_every_queued_event() {
        let (server, requests, events) = channel_pair(8, 8);
        let cell = SnapshotCell::new(WorldSnapshot::default());
        let link = ClientLink { requests, events, snapshots: cell.reader() };
        let mut c = ClientLoop::new(
            &ClientConfig::default(),
            link,
            Box::new(ScriptedDevice::new([])),
            Box::new(NullRenderer),
            Box::new(NullAudio),
            StatusText::new(),
        );
        c.init().unwrap();
        c.start().unwrap();

        for _ in 0..3 {
            assert!(server.events.send(WorldEvent::Sound { sound: SoundId::ALERT, position: Vec3::ZERO }));
        }
        c.update(FRAME).unwrap();
        assert_eq!(c.stats().sounds_played, 3);
        assert!(server.events.send(WorldEvent::Sound { sound: SoundId::ARRIVE, position: Vec3::ZERO }));
        c.update(FRAME).unwrap();
        assert_eq!(c.stats().sounds_played, 4);
    }

    #[test]
    fn test_unanswered_ticket_expires() {
        use crate::config::WorldConfig;
        use crate::world::World;

        let mut world = World::new(&WorldConfig::default(), 0.1);
        world.spawn(EntityKind::Bot, Vec3::new(0.0, 0.0, -8.0)).unwrap();
        let (_server, requests, events) = channel_pair(64, 64);
        let cell = SnapshotCell::new(world.snapshot());
        let link = ClientLink { requests, events, snapshots: cell.reader() };
        let config = ClientConfig { ticket_timeout_frames: 5, ..ClientConfig::default() };
        let mut c = ClientLoop::new(
            &config,
            link,
            Box::new(ScriptedDevice::new([DeviceState::keys(&[Key::F])])),
            Box::new(NullRenderer),
            Box::new(NullAudio),
            StatusText::new(),
        );
        c.init().unwrap();
        c.start().unwrap();

        c.update(FRAME).unwrap();
        assert_eq!(c.stats().tickets_issued, 1);
        for _ in 0..5 {
            c.update(FRAME).unwrap();
        }
        assert_eq!(c.pending_tickets(), 1);
        c.update(FRAME).unwrap();
        assert_eq!(c.pending_tickets(), 0);
        assert_eq!(c.stats().tickets_expired, 1);
    }

    #[test]
    fn test_menu_resume_and_quit() {
        let mut c = client(vec![
            DeviceState::keys(&[Key::Escape]),
            DeviceState::keys(&[Key::Enter]),
            DeviceState::keys(&[Key::Escape]),
            DeviceState::keys(&[Key::Down]),
            DeviceState::keys(&[Key::Enter]),
        ]);
        assert!(c.update(FRAME).unwrap());
        assert_eq!(c.session(), SessionState::Menu);
        assert!(c.update(FRAME).unwrap());
        assert_eq!(c.session(), SessionState::Game);
        c.update(FRAME).unwrap();
        c.update(FRAME).unwrap();
        assert!(!c.update(FRAME).unwrap());
    }
}
