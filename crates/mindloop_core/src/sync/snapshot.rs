//! Single-writer, many-reader cell holding the latest published snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Holds the most recently published immutable snapshot.
///
/// Only the owning loop publishes. Readers obtain a [`SnapshotReader`] and
/// load `Arc`s; a loaded snapshot never changes underneath them.
#[derive(Debug)]
pub struct SnapshotCell<T> {
    current: RwLock<Arc<T>>,
    /// Number of publishes so far. 0 = only the initial value.
    version: AtomicU64,
}

impl<T> SnapshotCell<T> {
    /// Creates a cell holding `initial`.
    #[must_use]
    pub fn new(initial: T) -> Arc<Self> {
        Arc::new(Self {
            current: RwLock::new(Arc::new(initial)),
            version: AtomicU64::new(0),
        })
    }

    /// Replaces the current snapshot.
    pub fn publish(&self, value: T) {
        let next = Arc::new(value);
        *self.current.write() = next;
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Loads the current snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<T> {
        Arc::clone(&self.current.read())
    }

    /// Returns the publish count.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Creates a read-only handle for another loop.
    #[must_use]
    pub fn reader(self: &Arc<Self>) -> SnapshotReader<T> {
        SnapshotReader { cell: Arc::clone(self) }
    }
}

/// Read-only handle to a [`SnapshotCell`].
#[derive(Debug)]
pub struct SnapshotReader<T> {
    cell: Arc<SnapshotCell<T>>,
}

impl<T> Clone for SnapshotReader<T> {
    fn clone(&self) -> Self {
        Self { cell: Arc::clone(&self.cell) }
    }
}

impl<T> SnapshotReader<T> {
    /// Loads the current snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<T> {
        self.cell.load()
    }

    /// Returns the publish count.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.cell.version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loaded_snapshot_is_stable() {
        let cell = SnapshotCell::new(vec![1, 2, 3]);
        let reader = cell.reader();

        let before = reader.load();
        cell.publish(vec![4]);

        assert_eq!(*before, vec![1, 2, 3]);
        assert_eq!(*reader.load(), vec![4]);
        assert_eq!(reader.version(), 1);
    }

    #[test]
    fn test_cross_thread_reads() {
        let cell = SnapshotCell::new(0u64);
        let reader = cell.reader();

        let handle = std::thread::spawn(move || {
            let mut last = 0;
            for _ in 0..1000 {
                let v = *reader.load();
                assert!(v >= last);
                last = v;
            }
        });
        for i in 1..=1000 {
            cell.publish(i);
        }
        handle.join().unwrap();
    }
}
