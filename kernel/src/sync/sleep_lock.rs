use core::ops::{Deref, DerefMut};

use parking_lot::{Mutex, MutexGuard};

/// A blocking mutex.
///
/// The holder may suspend; waiters sleep rather than spin. Safe to hold
/// across vnode I/O and anything else that blocks.
pub struct SleepLock<T> {
    inner: Mutex<T>,
}

impl<T> SleepLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        SleepLockGuard {
            inner: self.inner.lock(),
        }
    }
}

impl<T: Default> Default for SleepLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

pub struct SleepLockGuard<'a, T> {
    inner: MutexGuard<'a, T>,
}

impl<T> Deref for SleepLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
