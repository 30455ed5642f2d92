//! # World State
//!
//! Entities and transient effects, both stored in fixed-capacity pools.
//! Only the server loop holds a `&mut World`; the client sees
//! [`WorldSnapshot`]s.

use mindloop_core::{Aabb, PoolAllocator, PoolHandle, Vec3};

use crate::backend::{ModelId, SoundId};
use crate::config::WorldConfig;
use crate::error::{EngineError, EngineResult};

/// Generation-checked entity id. Never aliases a later occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(PoolHandle);

impl EntityId {
    /// Underlying pool slot index.
    #[must_use]
    pub const fn slot(self) -> u32 {
        self.0.index()
    }

    /// Generation of the slot when this id was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.0.generation()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{}v{}", self.0.index(), self.0.generation())
    }
}

/// Entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// AI-driven unless possessed.
    Bot,
    /// Static scenery.
    Prop,
}

impl EntityKind {
    /// Model drawn for this kind.
    #[must_use]
    pub const fn model(self) -> ModelId {
        match self {
            Self::Bot => ModelId::BOT,
            Self::Prop => ModelId::PROP,
        }
    }
}

/// One world entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Kind.
    pub kind: EntityKind,
    /// Feet position.
    pub position: Vec3,
    /// Units per second.
    pub velocity: Vec3,
    /// Facing, degrees (0 = +Z, 90 = +X).
    pub yaw: f32,
    /// Model drawn for it.
    pub model: ModelId,
    /// Driven by the player instead of a mind.
    pub possessed: bool,
    /// Destination set by a command ticket, cleared on arrival.
    pub move_target: Option<Vec3>,
}

impl Entity {
    /// A fresh entity at rest.
    #[must_use]
    pub fn new(kind: EntityKind, position: Vec3) -> Self {
        Self {
            kind,
            position,
            velocity: Vec3::ZERO,
            yaw: 0.0,
            model: kind.model(),
            possessed: false,
            move_target: None,
        }
    }

    /// True if a mind should drive this entity this tick.
    #[must_use]
    pub fn requires_mind(&self) -> bool {
        self.kind == EntityKind::Bot && !self.possessed
    }
}

/// Transient effect kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// Bark when a bot notices the observer.
    Alert,
    /// A commanded bot reached its destination.
    Arrive,
}

impl EffectKind {
    /// Sound played when the effect spawns.
    #[must_use]
    pub const fn sound(self) -> SoundId {
        match self {
            Self::Alert => SoundId::ALERT,
            Self::Arrive => SoundId::ARRIVE,
        }
    }
}

/// A short-lived world object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Effect {
    /// Kind.
    pub kind: EffectKind,
    /// Where it happened.
    pub position: Vec3,
    /// Ticks left before release.
    pub ttl_ticks: u32,
    /// Entity that caused it.
    pub source: EntityId,
}

/// Read-only view of one entity inside a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityView {
    /// Id at publish time.
    pub id: EntityId,
    /// Kind.
    pub kind: EntityKind,
    /// Position.
    pub position: Vec3,
    /// Facing, degrees.
    pub yaw: f32,
    /// Model.
    pub model: ModelId,
    /// Possessed by the player.
    pub possessed: bool,
}

/// Immutable world state published after every tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldSnapshot {
    /// Tick this snapshot was taken after. 0 = before the first tick.
    pub tick: u64,
    /// Simulated seconds.
    pub time: f64,
    /// Entities in slot order.
    pub entities: Vec<EntityView>,
    /// Live transient effects.
    pub effect_count: usize,
}

impl WorldSnapshot {
    /// Looks up an entity by id.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&EntityView> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Nearest entity to `point` on the ground plane within `max_distance`
    /// that passes `filter`.
    #[must_use]
    pub fn nearest<F>(&self, point: Vec3, max_distance: f32, filter: F) -> Option<&EntityView>
    where
        F: Fn(&EntityView) -> bool,
    {
        self.entities
            .iter()
            .filter(|e| filter(e))
            .map(|e| (e, e.position.planar_distance(point)))
            .filter(|(_, d)| *d <= max_distance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(e, _)| e)
    }

    /// The entity the player currently possesses.
    #[must_use]
    pub fn possessed(&self) -> Option<&EntityView> {
        self.entities.iter().find(|e| e.possessed)
    }
}

/// The simulated world.
#[derive(Debug)]
pub struct World {
    entities: PoolAllocator<Entity>,
    effects: PoolAllocator<Effect>,
    bounds: Aabb,
    tick: u64,
    time: f64,
    quantum: f32,
}

impl World {
    /// Creates an empty world. `quantum` is the fixed tick length in seconds.
    #[must_use]
    pub fn new(config: &WorldConfig, quantum: f32) -> Self {
        let h = config.half_extent;
        Self {
            entities: PoolAllocator::new(config.max_entities),
            effects: PoolAllocator::new(config.max_effects),
            bounds: Aabb::new(Vec3::new(-h, 0.0, -h), Vec3::new(h, config.height, h)),
            tick: 0,
            time: 0.0,
            quantum,
        }
    }

    /// Spawns an entity. Positions outside the bounds are clamped.
    ///
    /// # Errors
    ///
    /// [`EngineError::CapacityExceeded`] when the entity pool is full.
    pub fn spawn(&mut self, kind: EntityKind, position: Vec3) -> EngineResult<EntityId> {
        let (position, _) = self.bounds.clamp(position);
        self.entities
            .acquire_with(|| Entity::new(kind, position))
            .map(EntityId)
            .map_err(|e| EngineError::from_pool("entities", e))
    }

    /// Removes an entity and returns it. Effects it caused stay until
    /// they expire.
    ///
    /// # Errors
    ///
    /// [`EngineError::PoolMisuse`] if `id` is stale or already removed.
    pub fn despawn(&mut self, id: EntityId) -> EngineResult<Entity> {
        self.entities.release(id.0).map_err(|e| EngineError::from_pool("entities", e))
    }

    /// True if `id` names a live entity.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains(id.0)
    }

    /// Entity by id.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.0)
    }

    /// Mutable entity by id.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id.0)
    }

    /// Live entities in slot order.
    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities.iter().map(|(h, e)| (EntityId(h), e))
    }

    /// Live entity count.
    #[must_use]
    pub const fn entity_count(&self) -> usize {
        self.entities.live_count()
    }

    /// Moves every entity by one quantum and clamps it into the bounds.
    /// An entity that hits the bounds stops.
    pub fn integrate(&mut self) {
        let dt = self.quantum;
        let bounds = self.bounds;
        for (_, entity) in self.entities.iter_mut() {
            let (position, hit) = bounds.clamp(entity.position + entity.velocity * dt);
            entity.position = position;
            if hit {
                entity.velocity = Vec3::ZERO;
            }
        }
    }

    /// Spawns a transient effect.
    ///
    /// # Errors
    ///
    /// [`EngineError::CapacityExceeded`] when the effect pool is full.
    pub fn spawn_effect(
        &mut self,
        kind: EffectKind,
        position: Vec3,
        source: EntityId,
        ttl_ticks: u32,
    ) -> EngineResult<()> {
        self.effects
            .acquire_with(|| Effect { kind, position, ttl_ticks: ttl_ticks.max(1), source })
            .map(|_| ())
            .map_err(|e| EngineError::from_pool("effects", e))
    }

    /// Ages every effect by one tick and releases the expired ones.
    /// Returns how many were released.
    pub fn expire_effects(&mut self) -> usize {
        self.effects.retain(|_, effect| {
            effect.ttl_ticks = effect.ttl_ticks.saturating_sub(1);
            effect.ttl_ticks > 0
        })
    }

    /// Live effects in slot order.
    pub fn effects(&self) -> impl Iterator<Item = &Effect> {
        self.effects.iter().map(|(_, e)| e)
    }

    /// Live effect count.
    #[must_use]
    pub const fn effect_count(&self) -> usize {
        self.effects.live_count()
    }

    /// Releases every entity and effect, leaving both pools empty.
    /// Returns how many slots were released.
    pub fn release_all(&mut self) -> usize {
        self.entities.release_all() + self.effects.release_all()
    }

    /// Advances the tick counter and simulated time.
    pub fn advance_tick(&mut self) {
        self.tick += 1;
        self.time += f64::from(self.quantum);
    }

    /// Ticks completed.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulated seconds.
    #[must_use]
    pub const fn time(&self) -> f64 {
        self.time
    }

    /// Fixed tick length in seconds.
    #[must_use]
    pub const fn quantum(&self) -> f32 {
        self.quantum
    }

    /// World bounds.
    #[must_use]
    pub const fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Builds an immutable snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            time: self.time,
            entities: self
                .entities()
                .map(|(id, e)| EntityView {
                    id,
                    kind: e.kind,
                    position: e.position,
                    yaw: e.yaw,
                    model: e.model,
                    possessed: e.possessed,
                })
                .collect(),
            effect_count: self.effects.live_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_world() -> World {
        let cfg = WorldConfig { max_entities: 4, max_effects: 2, half_extent: 10.0, ..WorldConfig::default() };
        World::new(&cfg, 0.5)
    }

    #[test]
    fn test_spawn_and_despawn() {
        let mut world = small_world();
        let a = world.spawn(EntityKind::Bot, Vec3::new(1.0, 0.0, 1.0)).unwrap();
        assert!(world.contains(a));
        assert!(world.get(a).unwrap().requires_mind());

        world.despawn(a).unwrap();
        assert!(!world.contains(a));
        assert!(matches!(world.despawn(a), Err(EngineError::PoolMisuse { pool: "entities", .. })));
    }

    #[test]
    fn test_entity_pool_full() {
        let mut world = small_world();
        for _ in 0..4 {
            world.spawn(EntityKind::Prop, Vec3::ZERO).unwrap();
        }
        assert_eq!(
            world.spawn(EntityKind::Prop, Vec3::ZERO),
            Err(EngineError::CapacityExceeded { pool: "entities", capacity: 4 })
        );
    }

    #[test]
    fn test_integrate_clamps_and_stops() {
        let mut world = small_world();
        let id = world.spawn(EntityKind::Bot, Vec3::new(9.0, 0.0, 0.0)).unwrap();
        world.get_mut(id).unwrap().velocity = Vec3::new(4.0, 0.0, 0.0);
        world.integrate();
        let e = world.get(id).unwrap();
        assert_eq!(e.position.x, 10.0);
        assert_eq!(e.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_effects_expire() {
        let mut world = small_world();
        let src = world.spawn(EntityKind::Bot, Vec3::ZERO).unwrap();
        world.spawn_effect(EffectKind::Alert, Vec3::ZERO, src, 2).unwrap();
        world.spawn_effect(EffectKind::Arrive, Vec3::ZERO, src, 1).unwrap();
        assert!(matches!(
            world.spawn_effect(EffectKind::Alert, Vec3::ZERO, src, 1),
            Err(EngineError::CapacityExceeded { pool: "effects", .. })
        ));

        assert_eq!(world.expire_effects(), 1);
        assert_eq!(world.effect_count(), 1);
        assert_eq!(world.expire_effects(), 1);
        assert_eq!(world.effect_count(), 0);
    }

    #[test]
    fn test_release_all_empties_both_pools() {
        let mut world = small_world();
        let src = world.spawn(EntityKind::Bot, Vec3::ZERO).unwrap();
        world.spawn(EntityKind::Prop, Vec3::ZERO).unwrap();
        world.spawn_effect(EffectKind::Alert, Vec3::ZERO, src, 5).unwrap();

        assert_eq!(world.release_all(), 3);
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.effect_count(), 0);
        assert!(!world.contains(src));
        assert!(world.snapshot().entities.is_empty());
    }

    #[test]
    fn test_snapshot_nearest() {
        let mut world = small_world();
        let near = world.spawn(EntityKind::Bot, Vec3::new(1.0, 0.0, 0.0)).unwrap();
        world.spawn(EntityKind::Bot, Vec3::new(5.0, 0.0, 0.0)).unwrap();
        world.spawn(EntityKind::Prop, Vec3::new(0.5, 0.0, 0.0)).unwrap();
        world.advance_tick();

        let snap = world.snapshot();
        assert_eq!(snap.tick, 1);
        assert_eq!(snap.time, 0.5);
        let hit = snap.nearest(Vec3::ZERO, 3.0, |e| e.kind == EntityKind::Bot).unwrap();
        assert_eq!(hit.id, near);
        assert!(snap.nearest(Vec3::new(-9.0, 0.0, 0.0), 3.0, |_| true).is_none());
    }
}
