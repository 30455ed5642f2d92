//! # Loop Channels
//!
//! Client and server talk through two bounded queues and one snapshot cell:
//!
//! ```text
//! ┌──────────┐   WorldRequest (bounded)   ┌──────────┐
//! │  Client  │───────────────────────────>│  Server  │
//! │   loop   │<───────────────────────────│   loop   │
//! └──────────┘   WorldEvent (bounded)     └──────────┘
//!       ↑                                      │
//!       └────────── Arc<WorldSnapshot> ────────┘
//! ```
//!
//! Requests are applied at the top of the next server tick. Nothing blocks:
//! a full queue drops the message and logs it.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use mindloop_core::{SnapshotReader, Vec3};

use crate::backend::SoundId;
use crate::world::{EntityId, EntityKind, WorldSnapshot};

/// Correlates a bot-control request with its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TicketId(pub u64);

/// Client → server requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorldRequest {
    /// Take direct control of a bot.
    Possess {
        /// Answer key.
        ticket: TicketId,
        /// Bot to possess.
        entity: EntityId,
    },
    /// Hand the possessed bot back to its mind.
    Release {
        /// Answer key.
        ticket: TicketId,
    },
    /// Send a bot to a point. Its mind walks it there.
    CommandMove {
        /// Answer key.
        ticket: TicketId,
        /// Bot to command.
        entity: EntityId,
        /// Destination.
        target: Vec3,
    },
    /// Per-frame drive of the possessed bot.
    DrivePossessed {
        /// Units per second.
        velocity: Vec3,
        /// Facing, degrees.
        yaw: f32,
    },
    /// Where the player is watching from. Minds react to it.
    SetObserver {
        /// Camera or possessed-body position; `None` while paused.
        position: Option<Vec3>,
    },
    /// Adds an entity.
    Spawn {
        /// Kind.
        kind: EntityKind,
        /// Position.
        position: Vec3,
    },
    /// Removes an entity.
    Despawn {
        /// Entity to remove.
        entity: EntityId,
    },
    /// Asks the server loop to report stop from its next update.
    Shutdown,
}

/// Why a ticket was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The entity is gone or the id is stale.
    UnknownEntity,
    /// Props cannot be controlled.
    NotControllable,
    /// Someone already possesses it (or another bot is possessed).
    AlreadyPossessed,
    /// Release with nothing possessed.
    NothingPossessed,
}

/// Answer to a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketOutcome {
    /// Request applied.
    Granted,
    /// Request refused.
    Rejected(RejectReason),
}

/// Server → client notifications.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorldEvent {
    /// Answer to a bot-control request.
    TicketResolved {
        /// The request's ticket.
        ticket: TicketId,
        /// Entity the request targeted, if any.
        entity: Option<EntityId>,
        /// Result.
        outcome: TicketOutcome,
    },
    /// A positional sound should play.
    Sound {
        /// Which sound.
        sound: SoundId,
        /// Where.
        position: Vec3,
    },
    /// An entity was removed.
    EntityDespawned {
        /// The removed entity.
        entity: EntityId,
    },
    /// The possessed entity went away.
    PossessionLost {
        /// The lost entity.
        entity: EntityId,
    },
}

/// Client-side request handle. Cloneable.
#[derive(Debug, Clone)]
pub struct RequestSender {
    sender: Sender<WorldRequest>,
}

impl RequestSender {
    /// Queues a request without blocking. Returns false if it was dropped.
    pub fn send(&self, request: WorldRequest) -> bool {
        match self.sender.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!(?dropped, "Request queue full, dropping request");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Server-side event handle.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: Sender<WorldEvent>,
}

impl EventSender {
    /// Queues an event without blocking. Returns false if it was dropped.
    pub fn send(&self, event: WorldEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped @ WorldEvent::TicketResolved { .. })) => {
                tracing::error!(?dropped, "Event queue full, ticket answer lost");
                false
            }
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!(?dropped, "Event queue full, dropping event");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Server's end of the queues.
#[derive(Debug)]
pub struct ServerLink {
    /// Pending requests.
    pub requests: Receiver<WorldRequest>,
    /// Outgoing events.
    pub events: EventSender,
}

/// Everything a client needs to talk to one server.
#[derive(Debug, Clone)]
pub struct ClientLink {
    /// Outgoing requests.
    pub requests: RequestSender,
    /// Incoming events.
    pub events: Receiver<WorldEvent>,
    /// Latest world state.
    pub snapshots: SnapshotReader<WorldSnapshot>,
}

impl ClientLink {
    /// Drains every pending event without blocking.
    pub fn drain_events(&self) -> impl Iterator<Item = WorldEvent> + '_ {
        self.events.try_iter()
    }
}

/// Creates both request/event queue ends.
#[must_use]
pub fn channel_pair(
    request_capacity: usize,
    event_capacity: usize,
) -> (ServerLink, RequestSender, Receiver<WorldEvent>) {
    let (req_tx, req_rx) = bounded(request_capacity);
    let (evt_tx, evt_rx) = bounded(event_capacity);
    (
        ServerLink { requests: req_rx, events: EventSender { sender: evt_tx } },
        RequestSender { sender: req_tx },
        evt_rx,
    )
}
