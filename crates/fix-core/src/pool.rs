//! C5 — bounded object pool for reusable message builders/flyweight
//! buffers, shared safely across producer/consumer tasks.
//!
//! An `Arc<Mutex<...>>`-guarded shared-state idiom, generalized from a
//! `HashMap`-backed store to a fixed-capacity slot array plus a `tokio`
//! `Semaphore` for blocking acquire.

use std::sync::Arc;

use tokio::sync::{Semaphore, TryAcquireError};

/// A slot in the pool: either a live value or, transiently, `None` while a
/// value is checked out.
struct Slot<T> {
    value: std::sync::Mutex<Option<T>>,
}

/// Bounded pool of pre-allocated `T` values.
///
/// `acquire` blocks until a slot is free, `try_acquire` fails fast,
/// `try_acquire_timeout` waits up to a caller-supplied duration. Returned
/// [`PoolGuard`]s release their slot back to the pool on drop; a guard
/// released twice (which cannot happen through the safe API, but is
/// defended against for belt-and-braces double-release safety) is a no-op
/// on the second call.
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    free_indices: std::sync::Mutex<Vec<usize>>,
    semaphore: Arc<Semaphore>,
}

impl<T> Pool<T> {
    /// Builds a pool of `capacity` values, each produced by `make`.
    pub fn new(capacity: usize, mut make: impl FnMut() -> T) -> Self {
        let slots = (0..capacity).map(|_| Slot { value: std::sync::Mutex::new(Some(make())) }).collect();
        Self {
            slots,
            free_indices: std::sync::Mutex::new((0..capacity).collect()),
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Total number of slots, free or checked out.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Blocks until a slot is free, then checks one out.
    pub async fn acquire(self: &Arc<Self>) -> PoolGuard<T> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await.expect("semaphore never closed");
        self.take_slot(permit)
    }

    /// Checks out a slot if one is immediately free, otherwise returns
    /// `None` without waiting.
    #[must_use]
    pub fn try_acquire(self: &Arc<Self>) -> Option<PoolGuard<T>> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Some(self.take_slot(permit)),
            Err(TryAcquireError::NoPermits) => None,
            Err(TryAcquireError::Closed) => unreachable!("semaphore never closed"),
        }
    }

    /// Checks out a slot, waiting up to `timeout` before giving up.
    pub async fn try_acquire_timeout(self: &Arc<Self>, timeout: std::time::Duration) -> Option<PoolGuard<T>> {
        tokio::time::timeout(timeout, self.acquire()).await.ok()
    }

    fn take_slot(self: &Arc<Self>, permit: tokio::sync::OwnedSemaphorePermit) -> PoolGuard<T> {
        let index = {
            let mut free = self.free_indices.lock().expect("pool mutex poisoned");
            free.pop().expect("semaphore permit implies a free slot exists")
        };
        let value = self.slots[index].value.lock().expect("pool mutex poisoned").take().expect("slot was free");
        PoolGuard { pool: Arc::clone(self), index, value: Some(value), _permit: permit, released: false }
    }

    fn release(&self, index: usize, value: T) {
        let mut slot = self.slots[index].value.lock().expect("pool mutex poisoned");
        if slot.is_some() {
            tracing::warn!(index, "pool slot released while already occupied, ignoring");
            return;
        }
        *slot = Some(value);
        self.free_indices.lock().expect("pool mutex poisoned").push(index);
    }
}

/// A checked-out pool value. Dropping the guard resets and returns the
/// value to the pool.
pub struct PoolGuard<T> {
    pool: Arc<Pool<T>>,
    index: usize,
    value: Option<T>,
    _permit: tokio::sync::OwnedSemaphorePermit,
    released: bool,
}

impl<T> std::ops::Deref for PoolGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().expect("guard holds its value until release")
    }
}

impl<T> std::ops::DerefMut for PoolGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("guard holds its value until release")
    }
}

impl<T> PoolGuard<T> {
    /// Explicitly releases the value back to the pool. Idempotent: calling
    /// this twice (or letting `Drop` run after an explicit call) is a
    /// logged no-op on the second attempt rather than a panic.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if self.released {
            tracing::warn!(index = self.index, "pool guard double-released, ignoring");
            return;
        }
        self.released = true;
        if let Some(value) = self.value.take() {
            self.pool.release(self.index, value);
        }
    }
}

impl<T> Drop for PoolGuard<T> {
    fn drop(&mut self) {
        self.release_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_and_release_returns_slot() {
        let pool = Arc::new(Pool::new(2, Vec::<u8>::new));
        assert_eq!(pool.available(), 2);

        let guard = pool.acquire().await;
        assert_eq!(pool.available(), 1);
        drop(guard);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn try_acquire_fails_when_empty() {
        let pool = Arc::new(Pool::new(1, Vec::<u8>::new));
        let first = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_none());
        drop(first);
        assert!(pool.try_acquire().is_some());
    }

    #[tokio::test]
    async fn double_release_is_a_no_op() {
        let pool = Arc::new(Pool::new(1, Vec::<u8>::new));
        let guard = pool.acquire().await;
        guard.release();
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn try_acquire_timeout_gives_up() {
        let pool = Arc::new(Pool::new(1, Vec::<u8>::new));
        let _held = pool.acquire().await;

        let result = pool.try_acquire_timeout(std::time::Duration::from_millis(10)).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn guard_derefs_to_value() {
        let pool = Arc::new(Pool::new(1, || vec![1u8, 2, 3]));
        let guard = pool.acquire().await;
        assert_eq!(guard.len(), 3);
    }
}
