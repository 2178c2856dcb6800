use core::ops::{Deref, DerefMut};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A blocking reader/writer lock.
///
/// Many concurrent readers, or one writer. Writers may suspend while
/// holding the lock.
pub struct RwSleepLock<T> {
    inner: RwLock<T>,
}

impl<T> RwSleepLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    pub fn read(&self) -> RwSleepLockReadGuard<'_, T> {
        RwSleepLockReadGuard {
            inner: self.inner.read(),
        }
    }

    pub fn write(&self) -> RwSleepLockWriteGuard<'_, T> {
        RwSleepLockWriteGuard {
            inner: self.inner.write(),
        }
    }
}

impl<T: Default> Default for RwSleepLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

pub struct RwSleepLockReadGuard<'a, T> {
    inner: RwLockReadGuard<'a, T>,
}

impl<T> Deref for RwSleepLockReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

pub struct RwSleepLockWriteGuard<'a, T> {
    inner: RwLockWriteGuard<'a, T>,
}

impl<T> Deref for RwSleepLockWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> DerefMut for RwSleepLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
