use parking_lot::{Condvar, Mutex};

/// A counting semaphore.
///
/// `wait` (P) blocks until the count is positive and takes one;
/// `post` (V) adds one and wakes a waiter.
pub struct Semaphore {
    count: Mutex<usize>,
    wakeup: Condvar,
}

impl Semaphore {
    pub const fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            wakeup: Condvar::new(),
        }
    }

    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.wakeup.wait(&mut count);
        }
        *count -= 1;
    }

    pub fn post(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.wakeup.notify_one();
    }
}
