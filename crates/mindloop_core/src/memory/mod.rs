//! # Memory Management
//!
//! Pre-allocated pools for bounded-lifetime objects.
//!
//! ## Design Philosophy
//!
//! All slots are allocated once at startup. During gameplay:
//! - No heap allocations on acquire or release
//! - Exhaustion is a typed error, never growth
//! - Predictable, flat latency

mod pool;

pub use pool::{PoolAllocator, PoolError, PoolHandle};
