// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
A reader/writer spinlock guarding one registry shard.

On the wasm main thread, we can't necessarily block, so we spin instead.  Critical
sections are a single hash map operation plus an `Arc` clone, so the lock is held
for as short a time as possible.

Unlike a closure-based lock, the guards release on drop, so a panic while the lock
is held (for instance a duplicate-insert assertion) cannot wedge the shard.
*/

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

const UNLOCKED: u8 = 0;
//we allow for 254 readers or 1 writer (val = 255)
const LOCKED_WRITE: u8 = u8::MAX;

pub(crate) struct Spinlock<T> {
    data: UnsafeCell<T>,
    state: AtomicU8,
}

// Readers hand out `&T` on several threads at once, so `Sync` needs `T: Sync` too.
unsafe impl<T: Send> Send for Spinlock<T> {}
unsafe impl<T: Send + Sync> Sync for Spinlock<T> {}

impl<T> Spinlock<T> {
    pub(crate) fn new(data: T) -> Self {
        Spinlock {
            data: UnsafeCell::new(data),
            state: AtomicU8::new(UNLOCKED),
        }
    }

    pub(crate) fn read(&self) -> ReadGuard<'_, T> {
        while self
            .state
            .fetch_update(Acquire, Relaxed, |v| {
                if v < (LOCKED_WRITE - 1) {
                    Some(v + 1)
                } else {
                    None
                }
            })
            .is_err()
        {
            std::hint::spin_loop();
        }
        ReadGuard { lock: self }
    }

    pub(crate) fn write(&self) -> WriteGuard<'_, T> {
        while self
            .state
            .compare_exchange_weak(UNLOCKED, LOCKED_WRITE, Acquire, Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
        WriteGuard { lock: self }
    }
}

impl<T: Default> Default for Spinlock<T> {
    fn default() -> Self {
        Spinlock::new(T::default())
    }
}

impl<T> std::fmt::Debug for Spinlock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spinlock")
            .field("state", &self.state.load(Relaxed))
            .finish_non_exhaustive()
    }
}

pub(crate) struct ReadGuard<'a, T> {
    lock: &'a Spinlock<T>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the reader count is nonzero while this guard lives, so no writer exists
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.state.fetch_sub(1, Release);
    }
}

pub(crate) struct WriteGuard<'a, T> {
    lock: &'a Spinlock<T>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: we hold the write lock
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: we hold the write lock, so access is exclusive
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.state.store(UNLOCKED, Release);
    }
}
