//! # Server Loop
//!
//! Owns the world and is its only mutator. Each `update` runs exactly one
//! fixed-quantum tick:
//!
//! 1. Apply queued client requests
//! 2. Integrate movement
//! 3. Tick the mind list
//! 4. Apply mind intents, spawn their effects
//! 5. Expire effects
//! 6. Publish a snapshot

mod tick;

pub use tick::{TickClock, TickStats};

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use mindloop_core::{SnapshotCell, Vec3};
use mindloop_ui::StatusText;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::{EngineConfig, ServerConfig, WorldConfig};
use crate::error::{EngineError, EngineResult};
use crate::events::{
    channel_pair, ClientLink, RejectReason, RequestSender, ServerLink, TicketOutcome, WorldEvent,
    WorldRequest,
};
use crate::mind::{BotMind, Mind, MindList, SpawnPolicy, TickReport};
use crate::world::{EntityId, EntityKind, World, WorldSnapshot};
use crate::{require_phase, Lifecycle, LoopPhase};

const COMPONENT: &str = "server";

/// Result of [`ServerLoop::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    /// Ticks run.
    pub ticks: u32,
    /// False once a shutdown was requested.
    pub running: bool,
}

/// Running totals since `start`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerTotals {
    /// Ticks run.
    pub ticks: u64,
    /// Minds created.
    pub minds_created: u64,
    /// Minds released by sweeps.
    pub minds_released: u64,
    /// Mind updates that failed.
    pub mind_failures: u64,
    /// Effects dropped because the pool was full.
    pub effects_dropped: u64,
    /// Requests applied.
    pub requests: u64,
}

/// Fixed-quantum world simulation.
pub struct ServerLoop<M = BotMind> {
    world_config: WorldConfig,
    config: ServerConfig,
    phase: LoopPhase,
    world: Option<World>,
    minds: MindList<M>,
    link: ServerLink,
    client_requests: RequestSender,
    client_events: Receiver<WorldEvent>,
    snapshots: Arc<SnapshotCell<WorldSnapshot>>,
    clock: TickClock,
    status: StatusText,
    observer: Option<Vec3>,
    possessed: Option<EntityId>,
    shutdown_requested: bool,
    last_report: TickReport,
    totals: ServerTotals,
}

impl<M: Mind> ServerLoop<M> {
    /// Creates an uninitialized server. `status` is updated during `init`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] if `config` does not validate.
    pub fn new(config: &EngineConfig, status: StatusText) -> EngineResult<Self> {
        config.validate()?;
        let server = &config.server;
        let (link, client_requests, client_events) =
            channel_pair(server.request_capacity, server.event_capacity);
        Ok(Self {
            world_config: config.world.clone(),
            config: server.clone(),
            phase: LoopPhase::Uninitialized,
            world: None,
            minds: MindList::new(server.max_minds, config.world.seed),
            link,
            client_requests,
            client_events,
            snapshots: SnapshotCell::new(WorldSnapshot::default()),
            clock: TickClock::new(server.tick_rate, server.max_ticks_per_update),
            status,
            observer: None,
            possessed: None,
            shutdown_requested: false,
            last_report: TickReport::default(),
            totals: ServerTotals::default(),
        })
    }

    /// A client's end of this server's queues.
    #[must_use]
    pub fn client_link(&self) -> ClientLink {
        ClientLink {
            requests: self.client_requests.clone(),
            events: self.client_events.clone(),
            snapshots: self.snapshots.reader(),
        }
    }

    /// Runs as many ticks as `elapsed` wall time makes due (capped).
    ///
    /// # Errors
    ///
    /// As [`Lifecycle::update`].
    pub fn advance(&mut self, elapsed: Duration) -> EngineResult<Advance> {
        require_phase(COMPONENT, "advance", self.phase, &[LoopPhase::Running])?;
        let due = self.clock.accumulate(elapsed);
        let mut ticks = 0;
        for _ in 0..due {
            let started = Instant::now();
            let running = self.update(())?;
            self.clock.record_tick(started.elapsed());
            ticks += 1;
            if !running {
                return Ok(Advance { ticks, running: false });
            }
        }
        Ok(Advance { ticks, running: !self.shutdown_requested })
    }

    /// The world, once initialized.
    #[must_use]
    pub const fn world(&self) -> Option<&World> {
        self.world.as_ref()
    }

    /// The mind list.
    #[must_use]
    pub const fn minds(&self) -> &MindList<M> {
        &self.minds
    }

    /// What the last tick's scheduler pass did.
    #[must_use]
    pub const fn last_report(&self) -> TickReport {
        self.last_report
    }

    /// Totals since `start`.
    #[must_use]
    pub const fn totals(&self) -> ServerTotals {
        self.totals
    }

    /// The tick clock.
    #[must_use]
    pub const fn clock(&self) -> &TickClock {
        &self.clock
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<WorldSnapshot> {
        self.snapshots.load()
    }

    /// The possessed entity, if any.
    #[must_use]
    pub const fn possessed(&self) -> Option<EntityId> {
        self.possessed
    }

    fn populate(&self, world: &mut World) -> EngineResult<()> {
        let cfg = &self.world_config;
        let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
        let place = |rng: &mut ChaCha8Rng| {
            let angle = rng.gen::<f32>() * std::f32::consts::TAU;
            let radius = rng.gen::<f32>().sqrt() * cfg.spawn_radius;
            Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius)
        };

        for i in 0..cfg.bot_count {
            self.status.set(format!("Spawning bots {}/{}", i + 1, cfg.bot_count));
            world.spawn(EntityKind::Bot, place(&mut rng))?;
        }
        for i in 0..cfg.prop_count {
            self.status.set(format!("Placing props {}/{}", i + 1, cfg.prop_count));
            world.spawn(EntityKind::Prop, place(&mut rng))?;
        }
        Ok(())
    }

    fn apply_requests(&mut self) {
        let Some(world) = self.world.as_mut() else { return };
        let events = &self.link.events;

        for request in self.link.requests.try_iter() {
            self.totals.requests += 1;
            match request {
                WorldRequest::Possess { ticket, entity } => {
                    let outcome = possess(world, &mut self.possessed, entity);
                    events.send(WorldEvent::TicketResolved { ticket, entity: Some(entity), outcome });
                }
                WorldRequest::Release { ticket } => {
                    let (entity, outcome) = match self.possessed.take() {
                        Some(id) => {
                            if let Some(e) = world.get_mut(id) {
                                e.possessed = false;
                                e.velocity = Vec3::ZERO;
                            }
                            (Some(id), TicketOutcome::Granted)
                        }
                        None => (None, TicketOutcome::Rejected(RejectReason::NothingPossessed)),
                    };
                    events.send(WorldEvent::TicketResolved { ticket, entity, outcome });
                }
                WorldRequest::CommandMove { ticket, entity, target } => {
                    let outcome = command(world, entity, target);
                    events.send(WorldEvent::TicketResolved { ticket, entity: Some(entity), outcome });
                }
                WorldRequest::DrivePossessed { velocity, yaw } => {
                    if let Some(e) = self.possessed.and_then(|id| world.get_mut(id)) {
                        e.velocity = velocity;
                        e.yaw = yaw;
                    }
                }
                WorldRequest::SetObserver { position } => self.observer = position,
                WorldRequest::Spawn { kind, position } => {
                    if let Err(err) = world.spawn(kind, position) {
                        tracing::warn!(%err, ?kind, "Spawn request dropped");
                    }
                }
                WorldRequest::Despawn { entity } => match world.despawn(entity) {
                    Ok(_) => {
                        events.send(WorldEvent::EntityDespawned { entity });
                        if self.possessed == Some(entity) {
                            self.possessed = None;
                            events.send(WorldEvent::PossessionLost { entity });
                        }
                    }
                    Err(err) => tracing::warn!(%err, %entity, "Despawn request ignored"),
                },
                WorldRequest::Shutdown => {
                    tracing::info!("Shutdown requested");
                    self.shutdown_requested = true;
                }
            }
        }
    }
}

fn possess(world: &mut World, possessed: &mut Option<EntityId>, entity: EntityId) -> TicketOutcome {
    let Some(e) = world.get_mut(entity) else {
        return TicketOutcome::Rejected(RejectReason::UnknownEntity);
    };
    if e.kind != EntityKind::Bot {
        return TicketOutcome::Rejected(RejectReason::NotControllable);
    }
    if possessed.is_some() {
        return TicketOutcome::Rejected(RejectReason::AlreadyPossessed);
    }
    e.possessed = true;
    e.velocity = Vec3::ZERO;
    e.move_target = None;
    *possessed = Some(entity);
    TicketOutcome::Granted
}

fn command(world: &mut World, entity: EntityId, target: Vec3) -> TicketOutcome {
    let (target, _) = world.bounds().clamp(target);
    let Some(e) = world.get_mut(entity) else {
        return TicketOutcome::Rejected(RejectReason::UnknownEntity);
    };
    if e.kind != EntityKind::Bot {
        return TicketOutcome::Rejected(RejectReason::NotControllable);
    }
    if e.possessed {
        return TicketOutcome::Rejected(RejectReason::AlreadyPossessed);
    }
    e.move_target = Some(target);
    TicketOutcome::Granted
}

impl<M: Mind> Lifecycle for ServerLoop<M> {
    type Frame = ();

    fn init(&mut self) -> EngineResult<()> {
        require_phase(COMPONENT, "init", self.phase, &[LoopPhase::Uninitialized])?;
        self.status.set("Building world");
        let quantum = self.clock.quantum().as_secs_f32();
        let mut world = World::new(&self.world_config, quantum);
        if let Err(err) = self.populate(&mut world) {
            self.status.set(format!("World setup failed: {err}"));
            return Err(err);
        }
        self.snapshots.publish(world.snapshot());
        tracing::info!(
            entities = world.entity_count(),
            bots = self.world_config.bot_count,
            tick_rate = self.config.tick_rate,
            "Server initialized"
        );
        self.world = Some(world);
        self.status.set("Ready");
        self.phase = LoopPhase::Ready;
        Ok(())
    }

    fn start(&mut self) -> EngineResult<()> {
        require_phase(COMPONENT, "start", self.phase, &[LoopPhase::Ready])?;
        self.clock.reset();
        self.totals = ServerTotals::default();
        self.shutdown_requested = false;
        self.status.clear();
        self.phase = LoopPhase::Running;
        tracing::info!("Server running");
        Ok(())
    }

    fn update(&mut self, (): ()) -> EngineResult<bool> {
        require_phase(COMPONENT, "update", self.phase, &[LoopPhase::Running])?;
        self.apply_requests();

        let Some(world) = self.world.as_mut() else {
            return Err(EngineError::InvalidState { component: COMPONENT, operation: "update", state: "worldless" });
        };
        world.integrate();

        let tick_id = world.tick() + 1;
        let policy = SpawnPolicy { max_spawns_per_tick: self.config.max_mind_spawns_per_tick };
        let report = self.minds.tick(world, tick_id, self.observer, policy);

        for &(entity, intent) in self.minds.intents() {
            let Some(body) = world.get_mut(entity) else { continue };
            body.velocity = intent.velocity;
            body.yaw = intent.yaw;
            if intent.clear_move_target {
                body.move_target = None;
            }
            let position = body.position;
            if let Some(kind) = intent.effect {
                match world.spawn_effect(kind, position, entity, self.config.effect_ttl_ticks) {
                    Ok(()) => {
                        self.link.events.send(WorldEvent::Sound { sound: kind.sound(), position });
                    }
                    Err(err) => {
                        self.totals.effects_dropped += 1;
                        tracing::warn!(%err, ?kind, "Effect dropped");
                    }
                }
            }
        }

        world.expire_effects();
        world.advance_tick();
        self.snapshots.publish(world.snapshot());

        self.last_report = report;
        self.totals.ticks += 1;
        self.totals.minds_created += report.created as u64;
        self.totals.minds_released += report.stale_released as u64;
        self.totals.mind_failures += report.failed as u64;
        Ok(!self.shutdown_requested)
    }

    fn stop(&mut self) -> EngineResult<()> {
        require_phase(COMPONENT, "stop", self.phase, &[LoopPhase::Running])?;
        let minds = self.minds.release_all();
        let slots = match self.world.as_mut() {
            Some(world) => {
                let released = world.release_all();
                self.snapshots.publish(world.snapshot());
                released
            }
            None => 0,
        };
        self.possessed = None;
        self.phase = LoopPhase::Stopped;
        tracing::info!(minds, slots, ticks = self.totals.ticks, "Server stopped");
        Ok(())
    }

    fn free(&mut self) -> EngineResult<()> {
        require_phase(COMPONENT, "free", self.phase, &[LoopPhase::Ready, LoopPhase::Stopped])?;
        self.minds.release_all();
        self.world = None;
        self.observer = None;
        self.possessed = None;
        self.snapshots.publish(WorldSnapshot::default());
        // Requests sent after stop are meaningless for the next session.
        self.link.requests.try_iter().for_each(drop);
        self.phase = LoopPhase::Uninitialized;
        tracing::info!("Server freed");
        Ok(())
    }

    fn phase(&self) -> LoopPhase {
        self.phase
    }
}

impl<M> std::fmt::Debug for ServerLoop<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerLoop")
            .field("phase", &self.phase)
            .field("tick", &self.world.as_ref().map(World::tick))
            .field("minds", &self.minds)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(bots: usize, props: usize) -> EngineConfig {
        let mut cfg = EngineConfig::default();
        cfg.world.bot_count = bots;
        cfg.world.prop_count = props;
        cfg
    }

    fn running(bots: usize, props: usize) -> ServerLoop {
        let mut server = ServerLoop::new(&config(bots, props), StatusText::new()).unwrap();
        server.init().unwrap();
        server.start().unwrap();
        server
    }

    #[test]
    fn test_init_is_deterministic() {
        let mut a: ServerLoop = ServerLoop::new(&config(5, 3), StatusText::new()).unwrap();
        let mut b: ServerLoop = ServerLoop::new(&config(5, 3), StatusText::new()).unwrap();
        a.init().unwrap();
        b.init().unwrap();
        assert_eq!(a.snapshot().entities, b.snapshot().entities);
        assert_eq!(a.snapshot().entities.len(), 8);
    }

    #[test]
    fn test_status_text_during_init() {
        let status = StatusText::new();
        let mut server: ServerLoop = ServerLoop::new(&config(2, 0), status.clone()).unwrap();
        server.init().unwrap();
        assert_eq!(status.get(), "Ready");
        server.start().unwrap();
        assert!(status.get().is_empty());
    }

    #[test]
    fn test_update_ticks_minds_and_publishes() {
        let mut server = running(4, 2);
        let link = server.client_link();
        assert!(server.update(()).unwrap());
        assert_eq!(server.last_report().created, 4);
        assert_eq!(server.minds().len(), 4);
        assert_eq!(link.snapshots.load().tick, 1);
    }

    #[test]
    fn test_possess_release_tickets() {
        let mut server = running(2, 1);
        let link = server.client_link();
        let snap = server.snapshot();
        let bot = snap.entities.iter().find(|e| e.kind == EntityKind::Bot).unwrap().id;
        let prop = snap.entities.iter().find(|e| e.kind == EntityKind::Prop).unwrap().id;

        link.requests.send(WorldRequest::Possess { ticket: crate::events::TicketId(1), entity: prop });
        link.requests.send(WorldRequest::Possess { ticket: crate::events::TicketId(2), entity: bot });
        link.requests.send(WorldRequest::Possess { ticket: crate::events::TicketId(3), entity: bot });
        server.update(()).unwrap();

        let outcomes: Vec<_> = link
            .drain_events()
            .filter_map(|e| match e {
                WorldEvent::TicketResolved { outcome, .. } => Some(outcome),
                _ => None,
            })
            .collect();
        assert_eq!(
            outcomes,
            vec![
                TicketOutcome::Rejected(RejectReason::NotControllable),
                TicketOutcome::Granted,
                TicketOutcome::Rejected(RejectReason::AlreadyPossessed),
            ]
        );
        assert_eq!(server.possessed(), Some(bot));
        assert!(server.minds().get(bot).is_none());
        assert_eq!(server.minds().len(), 1);

        link.requests.send(WorldRequest::Release { ticket: crate::events::TicketId(4) });
        server.update(()).unwrap();
        assert_eq!(server.possessed(), None);
        assert_eq!(server.minds().len(), 2);
    }

    #[test]
    fn test_shutdown_request_stops_update() {
        let mut server = running(1, 0);
        server.client_link().requests.send(WorldRequest::Shutdown);
        assert!(!server.update(()).unwrap());
    }

    #[test]
    fn test_advance_runs_due_ticks() {
        let mut server = running(1, 0);
        let quantum = server.clock().quantum();
        let adv = server.advance(quantum * 3).unwrap();
        assert_eq!(adv, Advance { ticks: 3, running: true });
        assert_eq!(server.snapshot().tick, 3);
    }

    #[test]
    fn test_stop_releases_every_pool_slot() {
        let mut server = running(3, 2);
        let link = server.client_link();
        for _ in 0..3 {
            server.update(()).unwrap();
        }
        server.stop().unwrap();

        let world = server.world().unwrap();
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.effect_count(), 0);
        assert_eq!(server.minds().live_slots(), 0);
        assert!(link.snapshots.load().entities.is_empty());
    }

    #[test]
    fn test_free_requires_stop() {
        let mut server = running(1, 0);
        assert!(matches!(server.free(), Err(EngineError::InvalidState { operation: "free", .. })));
        server.stop().unwrap();
        server.free().unwrap();
        assert!(server.world().is_none());
        assert_eq!(server.phase(), LoopPhase::Uninitialized);
        // A freed server can be initialized again.
        server.init().unwrap();
    }
}
