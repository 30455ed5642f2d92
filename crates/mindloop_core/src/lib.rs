//! # MINDLOOP Core
//!
//! Bounded-memory primitives shared by the server and client loops:
//! - Fixed-capacity pools with generation-checked handles
//! - Immutable snapshot publication between the loops
//! - Small math types used by both sides
//!
//! ## Architecture Rules
//!
//! 1. **No heap allocations in the hot path** - pools are sized at startup
//! 2. **No ambient globals** - every pool and cell has exactly one owner
//! 3. **Stale handles are detected** - never silently aliased
//!
//! ## Example
//!
//! ```rust
//! use mindloop_core::PoolAllocator;
//!
//! let mut pool: PoolAllocator<u32> = PoolAllocator::new(4);
//! let handle = pool.acquire(7).expect("pool has room");
//! assert_eq!(pool.get(handle), Some(&7));
//! assert_eq!(pool.release(handle), Ok(7));
//! ```

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod math;
pub mod memory;
pub mod sync;

pub use math::{Aabb, Vec3};
pub use memory::{PoolAllocator, PoolError, PoolHandle};
pub use sync::{SnapshotCell, SnapshotReader};
