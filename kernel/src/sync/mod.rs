//! Lock primitives.
//!
//! Two families, by whether the holder may block:
//!
//! - [`SpinLock`] is for leaf critical sections that touch a couple of
//!   words and never suspend.
//! - [`SleepLock`], [`RwSleepLock`] and [`Semaphore`] may be held (or
//!   waited on) across anything that blocks, including I/O.
//!
//! Holding a spin lock across an operation that can suspend is a bug.

pub use self::{
    rw_lock::{RwSleepLock, RwSleepLockReadGuard, RwSleepLockWriteGuard},
    semaphore::Semaphore,
    sleep_lock::{SleepLock, SleepLockGuard},
    spin_lock::{SpinLock, SpinLockGuard},
};

mod rw_lock;
mod semaphore;
mod sleep_lock;
mod spin_lock;
