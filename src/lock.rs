//! Reader/writer resource lock with observable ownership.
//!
//! `ResourceLock` models the host's own locking primitive: callers acquire and
//! release explicitly (not only through guards), and anyone can poll `owned()`
//! to observe whether somebody currently holds it. The core never constructs
//! the host's save lock; it receives an `Arc<ResourceLock>` through the
//! accessor facade and only observes it.
//!
//! Waiting writers block new readers, so a thread that already holds a shared
//! lock must not request it again while a writer is queued.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct LockState {
    exclusive: bool,
    shared: usize,
    waiting_exclusive: usize,
}

impl LockState {
    const fn owned(&self) -> bool {
        self.exclusive || self.shared > 0
    }
}

/// Explicit acquire/release reader-writer lock.
#[derive(Default)]
pub struct ResourceLock {
    state: Mutex<LockState>,
    released: Condvar,
}

impl ResourceLock {
    /// Creates an unowned lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the lock is held exclusively by the caller.
    pub fn acquire_exclusive(&self) {
        let mut state = self.state.lock();
        state.waiting_exclusive += 1;
        while state.owned() {
            self.released.wait(&mut state);
        }
        state.waiting_exclusive -= 1;
        state.exclusive = true;
    }

    /// Like [`acquire_exclusive`](Self::acquire_exclusive) but gives up after
    /// `timeout`. Returns whether the lock was acquired.
    pub fn acquire_exclusive_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        state.waiting_exclusive += 1;
        while state.owned() {
            if self.released.wait_until(&mut state, deadline).timed_out() && state.owned() {
                state.waiting_exclusive -= 1;
                // Readers held back by this waiter may proceed now.
                drop(state);
                self.released.notify_all();
                return false;
            }
        }
        state.waiting_exclusive -= 1;
        state.exclusive = true;
        true
    }

    /// Acquires exclusively if nobody holds the lock.
    pub fn try_acquire_exclusive(&self) -> bool {
        let mut state = self.state.lock();
        if state.owned() {
            return false;
        }
        state.exclusive = true;
        true
    }

    /// Releases an exclusive hold. Returns false if the lock was not held
    /// exclusively.
    pub fn release_exclusive(&self) -> bool {
        let mut state = self.state.lock();
        if !state.exclusive {
            return false;
        }
        state.exclusive = false;
        drop(state);
        self.released.notify_all();
        true
    }

    /// Blocks until a shared hold is granted.
    pub fn acquire_shared(&self) {
        let mut state = self.state.lock();
        while state.exclusive || state.waiting_exclusive > 0 {
            self.released.wait(&mut state);
        }
        state.shared += 1;
    }

    /// Takes a shared hold if no writer holds or waits for the lock.
    pub fn try_acquire_shared(&self) -> bool {
        let mut state = self.state.lock();
        if state.exclusive || state.waiting_exclusive > 0 {
            return false;
        }
        state.shared += 1;
        true
    }

    /// Releases one shared hold. Returns false if no shared hold existed.
    pub fn release_shared(&self) -> bool {
        let mut state = self.state.lock();
        if state.shared == 0 {
            return false;
        }
        state.shared -= 1;
        let now_free = state.shared == 0;
        drop(state);
        if now_free {
            self.released.notify_all();
        }
        true
    }

    /// Whether anyone currently holds the lock, shared or exclusive.
    #[must_use]
    pub fn owned(&self) -> bool {
        self.state.lock().owned()
    }

    /// Whether the lock is currently held exclusively.
    #[must_use]
    pub fn owned_exclusive(&self) -> bool {
        self.state.lock().exclusive
    }

    /// Number of outstanding shared holds.
    #[must_use]
    pub fn shared_owners(&self) -> usize {
        self.state.lock().shared
    }

    /// Acquires exclusively and returns a guard releasing on drop.
    pub fn exclusive(&self) -> ExclusiveGuard<'_> {
        self.acquire_exclusive();
        ExclusiveGuard { lock: self }
    }

    /// Acquires shared and returns a guard releasing on drop.
    pub fn shared(&self) -> SharedGuard<'_> {
        self.acquire_shared();
        SharedGuard { lock: self }
    }
}

impl fmt::Debug for ResourceLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResourceLock")
            .field("exclusive", &state.exclusive)
            .field("shared", &state.shared)
            .finish()
    }
}

/// Exclusive hold on a [`ResourceLock`], released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ExclusiveGuard<'a> {
    lock: &'a ResourceLock,
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_exclusive();
    }
}

/// Shared hold on a [`ResourceLock`], released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SharedGuard<'a> {
    lock: &'a ResourceLock,
}

impl Drop for SharedGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_shared();
    }
}
