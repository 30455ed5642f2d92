//! # Pool Allocator
//!
//! Fixed-capacity slot allocator for objects that are acquired and released
//! every tick or every frame (minds, render proxies, transient effects).

use thiserror::Error;

/// Errors returned by [`PoolAllocator`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// Every slot is LIVE. The caller should drop or defer the request.
    #[error("pool capacity exceeded: all {capacity} slots are live")]
    CapacityExceeded {
        /// Fixed capacity of the pool.
        capacity: usize,
    },

    /// The slot named by the handle is already FREE.
    #[error("double free of pool slot {index}")]
    DoubleFree {
        /// Slot index.
        index: u32,
    },

    /// The handle belongs to an earlier occupant of a reused slot, or to
    /// no slot at all.
    #[error("stale pool handle: slot {index}, generation {generation}")]
    StaleHandle {
        /// Slot index carried by the handle.
        index: u32,
        /// Generation carried by the handle.
        generation: u32,
    },
}

/// Handle to a LIVE object in a pool.
///
/// A handle stays valid until its object is released. After that the slot's
/// generation moves on and the old handle is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolHandle {
    /// Index into the pool.
    index: u32,
    /// Generation of the slot when this handle was issued.
    generation: u32,
}

impl PoolHandle {
    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the slot generation this handle was issued for.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A pool allocator for same-typed objects with a fixed capacity.
///
/// Capacity is fixed at construction and never grows. Acquiring always
/// stores a freshly constructed value, so nothing from a previous occupant
/// can leak into a reused slot.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. It is owned by exactly one loop.
///
/// # Example
///
/// ```rust
/// use mindloop_core::{PoolAllocator, PoolError};
///
/// struct Proxy { model: u32, visible: bool }
///
/// let mut pool: PoolAllocator<Proxy> = PoolAllocator::new(1);
/// let handle = pool.acquire_with(|| Proxy { model: 3, visible: true })?;
/// assert!(matches!(
///     pool.acquire(Proxy { model: 4, visible: false }),
///     Err(PoolError::CapacityExceeded { capacity: 1 })
/// ));
/// pool.release(handle)?;
/// # Ok::<(), PoolError>(())
/// ```
pub struct PoolAllocator<T> {
    /// The slot array.
    slots: Box<[Slot<T>]>,
    /// Indices of FREE slots. Popped from the back.
    free_list: Vec<u32>,
    /// Number of LIVE slots.
    live_count: usize,
}

impl<T> PoolAllocator<T> {
    /// Creates a new pool with the specified capacity.
    ///
    /// All slots and the free list are allocated upfront.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or does not fit in a `u32`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero");
        let max = u32::try_from(capacity).expect("pool capacity must fit in u32");

        let slots: Vec<Slot<T>> = (0..capacity)
            .map(|_| Slot { generation: 0, value: None })
            .collect();

        // Reversed so slot 0 is handed out first.
        let free_list: Vec<u32> = (0..max).rev().collect();

        Self {
            slots: slots.into_boxed_slice(),
            free_list,
            live_count: 0,
        }
    }

    /// Returns the total capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of LIVE objects.
    #[inline]
    #[must_use]
    pub const fn live_count(&self) -> usize {
        self.live_count
    }

    /// Returns the number of FREE slots.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.capacity() - self.live_count
    }

    /// Returns true if no slot is LIVE.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Returns true if every slot is LIVE.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.free_list.is_empty()
    }

    /// Stores `value` in a FREE slot and marks it LIVE.
    ///
    /// O(1), no heap allocation.
    ///
    /// # Errors
    ///
    /// [`PoolError::CapacityExceeded`] when every slot is LIVE.
    pub fn acquire(&mut self, value: T) -> Result<PoolHandle, PoolError> {
        self.acquire_with(|| value)
    }

    /// Runs `init` to construct the occupant of a FREE slot and marks it LIVE.
    ///
    /// `init` is only called when a slot is available.
    ///
    /// # Errors
    ///
    /// [`PoolError::CapacityExceeded`] when every slot is LIVE.
    pub fn acquire_with<F>(&mut self, init: F) -> Result<PoolHandle, PoolError>
    where
        F: FnOnce() -> T,
    {
        let Some(index) = self.free_list.pop() else {
            return Err(PoolError::CapacityExceeded { capacity: self.capacity() });
        };

        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.value.is_none(), "free list handed out a live slot");
        slot.value = Some(init());
        self.live_count += 1;

        Ok(PoolHandle { index, generation: slot.generation })
    }

    /// Releases a LIVE object and returns it.
    ///
    /// O(1), no heap deallocation. The slot's generation advances so every
    /// outstanding copy of `handle` is rejected from now on.
    ///
    /// # Errors
    ///
    /// - [`PoolError::DoubleFree`] if the slot is already FREE.
    /// - [`PoolError::StaleHandle`] if the slot is LIVE under a newer
    ///   occupant, or the index is out of range.
    pub fn release(&mut self, handle: PoolHandle) -> Result<T, PoolError> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .ok_or(PoolError::StaleHandle { index: handle.index, generation: handle.generation })?;

        if slot.value.is_none() {
            return Err(PoolError::DoubleFree { index: handle.index });
        }
        if slot.generation != handle.generation {
            return Err(PoolError::StaleHandle { index: handle.index, generation: handle.generation });
        }

        let value = slot.value.take().ok_or(PoolError::DoubleFree { index: handle.index })?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.live_count -= 1;

        Ok(value)
    }

    /// Returns true if `handle` refers to a LIVE object.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: PoolHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Gets a reference to a LIVE object.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Gets a mutable reference to a LIVE object.
    #[inline]
    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Releases every LIVE object. Returns how many were released.
    ///
    /// No memory is freed; slot storage stays reserved.
    pub fn release_all(&mut self) -> usize {
        self.retain(|_, _| false)
    }

    /// Releases every LIVE object for which `keep` returns false.
    ///
    /// Returns how many objects were released.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(PoolHandle, &mut T) -> bool,
    {
        let mut released = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let handle = PoolHandle {
                index: u32::try_from(index).unwrap_or(u32::MAX),
                generation: slot.generation,
            };
            let drop_it = match slot.value.as_mut() {
                Some(value) => !keep(handle, value),
                None => false,
            };
            if drop_it {
                slot.value = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(handle.index);
                released += 1;
            }
        }
        self.live_count -= released;
        released
    }

    /// Iterates over all LIVE objects in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (PoolHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let value = slot.value.as_ref()?;
            let index = u32::try_from(index).ok()?;
            Some((PoolHandle { index, generation: slot.generation }, value))
        })
    }

    /// Iterates mutably over all LIVE objects in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PoolHandle, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            let value = slot.value.as_mut()?;
            let index = u32::try_from(index).ok()?;
            Some((PoolHandle { index, generation }, value))
        })
    }
}

impl<T> std::fmt::Debug for PoolAllocator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("capacity", &self.capacity())
            .field("live", &self.live_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, PartialEq)]
    struct Proxy {
        model: u32,
        tint: [f32; 4],
        hits: u32,
    }

    impl Proxy {
        fn fresh(model: u32) -> Self {
            Self { model, tint: [1.0; 4], hits: 0 }
        }
    }

    #[test]
    fn test_pool_acquire_release() {
        let mut pool: PoolAllocator<u32> = PoolAllocator::new(10);

        let h1 = pool.acquire(42).unwrap();
        assert_eq!(*pool.get(h1).unwrap(), 42);
        assert_eq!(pool.live_count(), 1);

        assert_eq!(pool.release(h1), Ok(42));
        assert_eq!(pool.live_count(), 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_capacity_four_scenario() {
        let mut pool: PoolAllocator<Proxy> = PoolAllocator::new(4);

        let handles: Vec<_> = (0..4).map(|i| pool.acquire(Proxy::fresh(i)).unwrap()).collect();
        assert!(pool.is_full());
        assert_eq!(
            pool.acquire(Proxy::fresh(99)).unwrap_err(),
            PoolError::CapacityExceeded { capacity: 4 }
        );

        // Dirty the occupant before releasing it.
        let victim = handles[2];
        pool.get_mut(victim).unwrap().hits = 17;
        pool.get_mut(victim).unwrap().tint = [0.0; 4];
        pool.release(victim).unwrap();

        let reused = pool.acquire_with(|| Proxy::fresh(5)).unwrap();
        assert_eq!(reused.index(), victim.index());
        assert_eq!(pool.get(reused), Some(&Proxy::fresh(5)));
    }

    #[test]
    fn test_double_free_detected() {
        let mut pool: PoolAllocator<u8> = PoolAllocator::new(2);
        let h = pool.acquire(1).unwrap();
        pool.release(h).unwrap();
        assert_eq!(pool.release(h), Err(PoolError::DoubleFree { index: h.index() }));
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_stale_handle_rejected_after_reuse() {
        let mut pool: PoolAllocator<u8> = PoolAllocator::new(1);
        let old = pool.acquire(1).unwrap();
        pool.release(old).unwrap();
        let new = pool.acquire(2).unwrap();

        assert_eq!(old.index(), new.index());
        assert!(pool.get(old).is_none());
        assert!(matches!(pool.release(old), Err(PoolError::StaleHandle { .. })));
        assert_eq!(pool.get(new), Some(&2));
    }

    #[test]
    fn test_acquire_with_not_called_when_full() {
        let mut pool: PoolAllocator<u8> = PoolAllocator::new(1);
        pool.acquire(0).unwrap();
        let mut called = false;
        let result = pool.acquire_with(|| {
            called = true;
            1
        });
        assert!(result.is_err());
        assert!(!called);
    }

    #[test]
    fn test_retain_and_release_all() {
        let mut pool: PoolAllocator<u32> = PoolAllocator::new(8);
        for i in 0..6 {
            pool.acquire(i).unwrap();
        }
        let released = pool.retain(|_, v| *v % 2 == 0);
        assert_eq!(released, 3);
        assert_eq!(pool.live_count(), 3);
        assert!(pool.iter().all(|(_, v)| v % 2 == 0));

        assert_eq!(pool.release_all(), 3);
        assert!(pool.is_empty());
        assert_eq!(pool.free_count(), 8);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Acquire(u32),
        Release(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<u32>().prop_map(Op::Acquire),
            (0usize..16).prop_map(Op::Release),
        ]
    }

    proptest! {
        #[test]
        fn live_count_never_exceeds_capacity(
            capacity in 1usize..8,
            ops in proptest::collection::vec(op_strategy(), 0..64),
        ) {
            let mut pool: PoolAllocator<u32> = PoolAllocator::new(capacity);
            let mut live: Vec<(PoolHandle, u32)> = Vec::new();

            for op in ops {
                match op {
                    Op::Acquire(v) => match pool.acquire(v) {
                        Ok(h) => live.push((h, v)),
                        Err(PoolError::CapacityExceeded { capacity: c }) => {
                            prop_assert_eq!(c, capacity);
                            prop_assert_eq!(live.len(), capacity);
                        }
                        Err(e) => prop_assert!(false, "unexpected {e}"),
                    },
                    Op::Release(i) if !live.is_empty() => {
                        let (h, v) = live.remove(i % live.len());
                        prop_assert_eq!(pool.release(h), Ok(v));
                        prop_assert!(pool.release(h).is_err());
                    }
                    Op::Release(_) => {}
                }
                prop_assert!(pool.live_count() <= capacity);
                prop_assert_eq!(pool.live_count(), live.len());
                for (h, v) in &live {
                    prop_assert_eq!(pool.get(*h), Some(v));
                }
            }
        }
    }
}
