//! # Mind List
//!
//! Minds live in a fixed-capacity pool and are chained into a doubly-linked
//! list by pool handles. The list order is insertion order; that is the
//! order minds are updated in.
//!
//! ## Tick
//!
//! 1. Every entity that needs a mind and has none gets one, appended at the
//!    tail (bounded by [`SpawnPolicy`]).
//! 2. The list is walked from the head. Each mind whose body still needs
//!    it is updated; success stamps `last_tick_ran` with the tick id.
//! 3. Sweep: every mind not stamped this tick is unlinked, then released.
//!
//! Freshness is a tick id comparison, so nothing is cleared between ticks.

use std::collections::HashMap;

use mindloop_core::{PoolAllocator, PoolError, PoolHandle, Vec3};

use super::{Intent, Mind, MindContext};
use crate::world::{Entity, EntityId, World};

/// Handle to a live mind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MindHandle(PoolHandle);

/// Mind creation budget for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnPolicy {
    /// New minds created per tick at most.
    pub max_spawns_per_tick: usize,
}

impl Default for SpawnPolicy {
    fn default() -> Self {
        Self { max_spawns_per_tick: usize::MAX }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Minds updated successfully.
    pub updated: usize,
    /// Minds created.
    pub created: usize,
    /// Minds released by the sweep (includes failures).
    pub stale_released: usize,
    /// Updates that returned an error.
    pub failed: usize,
    /// Entities left without a mind for now (budget or pool full).
    pub deferred: usize,
}

struct MindNode<M> {
    mind: M,
    entity: EntityId,
    prev: Option<PoolHandle>,
    next: Option<PoolHandle>,
    last_tick_ran: Option<u64>,
}

/// Ordered collection of minds, one per driven entity.
pub struct MindList<M> {
    nodes: PoolAllocator<MindNode<M>>,
    head: Option<PoolHandle>,
    tail: Option<PoolHandle>,
    by_entity: HashMap<EntityId, PoolHandle>,
    seed: u64,
    intents: Vec<(EntityId, Intent)>,
    /// Scratch buffers reused across ticks.
    pending: Vec<EntityId>,
    stale: Vec<PoolHandle>,
}

impl<M: Mind> MindList<M> {
    /// Creates an empty list with room for `capacity` minds. `seed` feeds
    /// every mind's own randomness.
    #[must_use]
    pub fn new(capacity: usize, seed: u64) -> Self {
        Self {
            nodes: PoolAllocator::new(capacity),
            head: None,
            tail: None,
            by_entity: HashMap::with_capacity(capacity),
            seed,
            intents: Vec::with_capacity(capacity),
            pending: Vec::new(),
            stale: Vec::new(),
        }
    }

    /// Runs one scheduler tick against `world`. See the module docs.
    pub fn tick(
        &mut self,
        world: &World,
        tick_id: u64,
        observer: Option<Vec3>,
        policy: SpawnPolicy,
    ) -> TickReport {
        let mut report = TickReport::default();
        self.intents.clear();

        // Phase 1: resolve or create, in world order.
        self.pending.clear();
        self.pending.extend(
            world
                .entities()
                .filter(|(id, e)| e.requires_mind() && !self.by_entity.contains_key(id))
                .map(|(id, _)| id),
        );
        let pending = std::mem::take(&mut self.pending);
        for &entity in &pending {
            if report.created >= policy.max_spawns_per_tick || self.nodes.is_full() {
                report.deferred += 1;
                continue;
            }
            let Some(body) = world.get(entity) else { continue };
            match self.attach(entity, body) {
                Ok(_) => report.created += 1,
                Err(_) => report.deferred += 1,
            }
        }
        self.pending = pending;
        if report.deferred > 0 {
            tracing::warn!(tick = tick_id, deferred = report.deferred, "Mind creation deferred");
        }

        // Phase 2: update in list order.
        let mut cursor = self.head;
        while let Some(handle) = cursor {
            let Some(node) = self.nodes.get_mut(handle) else {
                tracing::error!(tick = tick_id, slot = handle.index(), "Broken mind chain");
                break;
            };
            cursor = node.next;

            let Some(body) = world.get(node.entity).filter(|e| e.requires_mind()) else {
                continue;
            };
            let ctx = MindContext {
                world,
                tick: tick_id,
                dt: world.quantum(),
                observer,
                entity: node.entity,
            };
            match node.mind.update(&ctx, body) {
                Ok(intent) => {
                    node.last_tick_ran = Some(tick_id);
                    self.intents.push((node.entity, intent));
                    report.updated += 1;
                }
                Err(err) => {
                    tracing::warn!(tick = tick_id, entity = %node.entity, %err, "Mind update failed");
                    report.failed += 1;
                }
            }
        }

        // Phase 3: sweep.
        self.stale.clear();
        let mut cursor = self.head;
        while let Some(handle) = cursor {
            let Some(node) = self.nodes.get(handle) else { break };
            cursor = node.next;
            if node.last_tick_ran != Some(tick_id) {
                self.stale.push(handle);
            }
        }
        let stale = std::mem::take(&mut self.stale);
        for &handle in &stale {
            match self.remove(MindHandle(handle)) {
                Ok(_) => report.stale_released += 1,
                Err(err) => tracing::error!(tick = tick_id, %err, "Stale mind release failed"),
            }
        }
        self.stale = stale;
        if report.stale_released > 0 {
            tracing::debug!(tick = tick_id, released = report.stale_released, "Swept stale minds");
        }

        report
    }

    /// Creates a mind for `entity` and appends it at the tail.
    ///
    /// # Errors
    ///
    /// [`PoolError::CapacityExceeded`] when every mind slot is live.
    pub fn attach(&mut self, entity: EntityId, body: &Entity) -> Result<MindHandle, PoolError> {
        let seed = mix_seed(self.seed, entity);
        let prev = self.tail;
        let handle = self.nodes.acquire_with(|| MindNode {
            mind: M::spawn(entity, body, seed),
            entity,
            prev,
            next: None,
            last_tick_ran: None,
        })?;

        match prev.and_then(|t| self.nodes.get_mut(t)) {
            Some(tail) => tail.next = Some(handle),
            None => self.head = Some(handle),
        }
        self.tail = Some(handle);
        if let Some(old) = self.by_entity.insert(entity, handle) {
            tracing::error!(%entity, slot = old.index(), "Entity had two minds");
        }
        Ok(MindHandle(handle))
    }

    /// Unlinks a mind, then releases its slot. Returns the mind.
    ///
    /// # Errors
    ///
    /// [`PoolError::StaleHandle`] or [`PoolError::DoubleFree`] if the handle
    /// no longer names a live mind. Nothing is changed in that case.
    pub fn remove(&mut self, handle: MindHandle) -> Result<M, PoolError> {
        let h = handle.0;
        let (prev, next, entity) = match self.nodes.get(h) {
            Some(node) => (node.prev, node.next, node.entity),
            None => return self.nodes.release(h).map(|node| node.mind),
        };

        match prev.and_then(|p| self.nodes.get_mut(p)) {
            Some(p) => p.next = next,
            None => self.head = next,
        }
        match next.and_then(|n| self.nodes.get_mut(n)) {
            Some(n) => n.prev = prev,
            None => self.tail = prev,
        }
        self.by_entity.remove(&entity);

        self.nodes.release(h).map(|node| node.mind)
    }

    /// Removes the mind driving `entity`, if any.
    pub fn detach(&mut self, entity: EntityId) -> Option<M> {
        let handle = *self.by_entity.get(&entity)?;
        self.remove(MindHandle(handle)).ok()
    }

    /// Releases every mind. Returns how many were released.
    pub fn release_all(&mut self) -> usize {
        self.head = None;
        self.tail = None;
        self.by_entity.clear();
        self.intents.clear();
        self.nodes.release_all()
    }

    /// Intents produced by the last tick, in update order.
    #[must_use]
    pub fn intents(&self) -> &[(EntityId, Intent)] {
        &self.intents
    }

    /// The mind driving `entity`.
    #[must_use]
    pub fn get(&self, entity: EntityId) -> Option<&M> {
        let handle = self.by_entity.get(&entity)?;
        self.nodes.get(*handle).map(|n| &n.mind)
    }

    /// Tick id of the last successful update of `entity`'s mind.
    #[must_use]
    pub fn last_tick_ran(&self, entity: EntityId) -> Option<u64> {
        let handle = self.by_entity.get(&entity)?;
        self.nodes.get(*handle).and_then(|n| n.last_tick_ran)
    }

    /// Bodies in list order.
    #[must_use]
    pub fn order(&self) -> Vec<EntityId> {
        self.iter().map(|(entity, _)| entity).collect()
    }

    /// Walks the list from the head.
    pub fn iter(&self) -> Iter<'_, M> {
        Iter { nodes: &self.nodes, cursor: self.head }
    }

    /// Number of minds.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.nodes.live_count()
    }

    /// True if there are no minds.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Live mind slots. Equals [`MindList::len`].
    #[must_use]
    pub const fn live_slots(&self) -> usize {
        self.nodes.live_count()
    }

    /// Mind pool capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.nodes.capacity()
    }
}

impl<M> std::fmt::Debug for MindList<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MindList")
            .field("nodes", &self.nodes)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .finish_non_exhaustive()
    }
}

/// List-order iterator over `(body, mind)`.
pub struct Iter<'a, M> {
    nodes: &'a PoolAllocator<MindNode<M>>,
    cursor: Option<PoolHandle>,
}

impl<'a, M> Iterator for Iter<'a, M> {
    type Item = (EntityId, &'a M);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.nodes.get(self.cursor?)?;
        self.cursor = node.next;
        Some((node.entity, &node.mind))
    }
}

fn mix_seed(seed: u64, entity: EntityId) -> u64 {
    let key = (u64::from(entity.generation()) << 32) | u64::from(entity.slot());
    (seed ^ key.wrapping_mul(0x9E37_79B9_7F4A_7C15)).rotate_left(17)
}
