//! # Snapshot Publication Between Loops
//!
//! ```text
//! Server tick N:
//!   mutate World (exclusive, &mut)
//!   publish(snapshot N)      ── Arc swap under a short write lock
//!
//! Client frame:
//!   load() -> Arc<snapshot N>  ── never observes a half-written tick
//! ```
//!
//! Readers hold an `Arc` to an immutable snapshot, so the server can publish
//! the next tick while a client is still rendering the previous one.

mod snapshot;

pub use snapshot::{SnapshotCell, SnapshotReader};
