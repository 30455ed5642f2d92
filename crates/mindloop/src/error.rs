//! # Engine Error Types
//!
//! Every error a loop can hand back to its caller.
//!
//! Stale minds are not here: the scheduler recovers them inside the sweep.

use mindloop_core::PoolError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by the server loop, client loop and host.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A pool has no FREE slot. Drop or defer the request.
    #[error("{pool} pool exhausted: all {capacity} slots are live")]
    CapacityExceeded {
        /// Which pool ran out.
        pool: &'static str,
        /// Its fixed capacity.
        capacity: usize,
    },

    /// A lifecycle method was called out of order.
    #[error("{component}: `{operation}` is not allowed while {state}")]
    InvalidState {
        /// `server` or `client`.
        component: &'static str,
        /// The method that was called.
        operation: &'static str,
        /// The phase the loop was in.
        state: &'static str,
    },

    /// A backend reported an error after a call, and validation is fatal.
    #[error("{backend} backend failed at {file}:{line} ({function}): {message}")]
    BackendValidation {
        /// `render` or `audio`.
        backend: &'static str,
        /// Call-site file.
        file: &'static str,
        /// Call-site line.
        line: u32,
        /// Call-site module path.
        function: &'static str,
        /// The backend's own message.
        message: String,
    },

    /// Pool misuse (double free, stale handle). A programming error.
    #[error("pool misuse in {pool}: {source}")]
    PoolMisuse {
        /// Which pool.
        pool: &'static str,
        /// The pool's report.
        source: PoolError,
    },

    /// A loop thread panicked and could not be joined.
    #[error("{component} thread panicked")]
    ThreadPanicked {
        /// Which loop.
        component: &'static str,
    },

    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Maps a pool error raised by `pool`.
    #[must_use]
    pub fn from_pool(pool: &'static str, err: PoolError) -> Self {
        match err {
            PoolError::CapacityExceeded { capacity } => Self::CapacityExceeded { pool, capacity },
            other => Self::PoolMisuse { pool, source: other },
        }
    }

    /// Returns true for errors that end the session (lifecycle misuse,
    /// fatal backend validation, pool misuse, bad config).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::CapacityExceeded { .. })
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_map_by_kind() {
        let full = EngineError::from_pool("effects", PoolError::CapacityExceeded { capacity: 8 });
        assert_eq!(full, EngineError::CapacityExceeded { pool: "effects", capacity: 8 });
        assert!(!full.is_terminal());

        let misuse = EngineError::from_pool("minds", PoolError::DoubleFree { index: 2 });
        assert!(matches!(misuse, EngineError::PoolMisuse { pool: "minds", .. }));
        assert!(misuse.is_terminal());
    }

    #[test]
    fn test_invalid_state_message() {
        let err = EngineError::InvalidState { component: "server", operation: "update", state: "ready" };
        assert_eq!(err.to_string(), "server: `update` is not allowed while ready");
    }
}
