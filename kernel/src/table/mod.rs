//! The sparse, lock-striped table behind the process and open-file
//! tables.
//!
//! A table is a logical array of up to `max` slots, physically a vector
//! of containers, one per [`SECTION_SIZE`] slice of the index space.
//! Each container pairs a reader/writer lock with a lazily created
//! [`Section`]; the section is torn down again when its population hits
//! zero, but the container (and so the lock) lives for the life of the
//! table. Distinct sections can be written in parallel.
//!
//! Lock order: container vector lock, then one section lock, then the
//! population spin lock. The section lock is never held while taking the
//! container lock.

use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use self::section::Section;
use crate::{
    param::SECTION_SIZE,
    sync::{RwSleepLock, SleepLock, SpinLock},
};

mod section;

/// No empty slot between the scan start and the end of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("table full")]
pub struct TableFull;

struct Container<T> {
    section: RwSleepLock<Option<Section<T>>>,
}

impl<T> Container<T> {
    fn new() -> Self {
        Self {
            section: RwSleepLock::new(None),
        }
    }
}

pub struct Table<T> {
    /// Container vector; growth and lookup serialise here, briefly.
    containers: SleepLock<Vec<Arc<Container<T>>>>,
    /// Number of occupied slots.
    num: SpinLock<usize>,
    /// Logical capacity. Grows, never shrinks.
    max: AtomicUsize,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Table<T> {
    pub fn new() -> Self {
        Self {
            containers: SleepLock::new(Vec::new()),
            num: SpinLock::new(0),
            max: AtomicUsize::new(0),
        }
    }

    pub fn num(&self) -> usize {
        *self.num.lock()
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::Relaxed)
    }

    /// Grows the capacity to `n` slots. Never shrinks.
    pub fn setsize(&self, n: usize) {
        self.max.fetch_max(n, Ordering::Relaxed);
    }

    fn container(&self, sect: usize) -> Option<Arc<Container<T>>> {
        self.containers.lock().get(sect).map(Arc::clone)
    }

    fn container_or_create(&self, sect: usize) -> Arc<Container<T>> {
        let mut containers = self.containers.lock();
        while containers.len() <= sect {
            containers.push(Arc::new(Container::new()));
        }
        Arc::clone(&containers[sect])
    }

    /// Returns the element at `index`, if any.
    pub fn get(&self, index: usize) -> Option<T>
    where
        T: Clone,
    {
        assert!(index < self.max());
        let (sect, rem) = (index / SECTION_SIZE, index % SECTION_SIZE);

        let container = self.container(sect)?;
        let section = container.section.read();
        section.as_ref().and_then(|s| s.get(rem).cloned())
    }

    /// Stores `val` at `index`, creating the container and section on the
    /// way if needed. An occupied slot is overwritten (the old value is
    /// dropped).
    pub fn set(&self, index: usize, val: T) {
        assert!(index < self.max());
        let (sect, rem) = (index / SECTION_SIZE, index % SECTION_SIZE);

        let container = self.container_or_create(sect);
        let mut section = container.section.write();
        let newadd = section.get_or_insert_with(Section::new).set(rem, val);
        drop(section);

        if newadd {
            *self.num.lock() += 1;
        }
    }

    /// Stores `val` in the lowest empty slot at or above `start` and
    /// returns its index.
    ///
    /// The scan takes each section's write lock in turn, so the chosen
    /// slot is empty at the moment it is claimed; concurrent writers may
    /// however take or free slots behind the scan front, and a freed slot
    /// below the returned index is not revisited. Callers that want
    /// wrap-around restart the scan themselves.
    pub fn setfirst(&self, mut val: T, start: usize) -> Result<usize, TableFull> {
        let max = self.max();
        assert!(start < max);

        let mut sect = start / SECTION_SIZE;
        let mut from = start % SECTION_SIZE;
        let sect_count = max.div_ceil(SECTION_SIZE);

        while sect < sect_count {
            let container = self.container_or_create(sect);
            let end = usize::min(SECTION_SIZE, max - sect * SECTION_SIZE);

            let mut section = container.section.write();
            match section
                .get_or_insert_with(Section::new)
                .setfirst(val, from, end)
            {
                Ok(i) => {
                    drop(section);
                    *self.num.lock() += 1;
                    return Ok(sect * SECTION_SIZE + i);
                }
                Err(v) => val = v,
            }
            drop(section);

            sect += 1;
            from = 0;
        }

        Err(TableFull)
    }

    /// Appends `val` one past the current capacity and returns its index.
    ///
    /// Not linearisable with other `add` calls; call sites serialise
    /// concurrent appends externally.
    pub fn add(&self, val: T) -> usize {
        let index = self.max();
        self.setsize(index + 1);
        self.set(index, val);
        index
    }

    /// Clears `index`. Clearing an already empty slot is a no-op.
    ///
    /// When the slot was the section's last occupant the section is torn
    /// down; its container stays so the lock address remains stable.
    pub fn remove(&self, index: usize) {
        assert!(index < self.max());
        let (sect, rem) = (index / SECTION_SIZE, index % SECTION_SIZE);

        let Some(container) = self.container(sect) else {
            return;
        };

        let mut section = container.section.write();
        let removed = match section.as_mut() {
            Some(s) => {
                let removed = s.remove(rem);
                if removed && s.num() == 0 {
                    *section = None;
                }
                removed
            }
            None => false,
        };
        drop(section);

        if removed {
            *self.num.lock() -= 1;
        }
    }

    #[cfg(test)]
    fn container_count(&self) -> usize {
        self.containers.lock().len()
    }

    #[cfg(test)]
    fn section_is_live(&self, sect: usize) -> bool {
        self.container(sect)
            .is_some_and(|c| c.section.read().is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Barrier, thread};

    use super::*;

    const BIGTESTSIZE: usize = 10000;
    const NLOOPS: usize = 500;
    const NTHREADS: usize = 8;

    fn nth(i: usize) -> usize {
        0xb007 + 3 * i
    }

    #[test]
    fn sequential_sweep() {
        let tb = Table::new();
        let p = 0xc0ffee_usize;

        for i in 0..BIGTESTSIZE {
            assert_eq!(tb.add(p), i);
        }
        assert_eq!(tb.num(), BIGTESTSIZE);

        for i in 0..BIGTESTSIZE {
            assert_eq!(tb.get(i), Some(p));
        }

        for i in 0..BIGTESTSIZE {
            tb.remove(i);
            assert_eq!(tb.get(i), None);
            assert_eq!(tb.num(), BIGTESTSIZE - (i + 1));
        }
        assert_eq!(tb.num(), 0);

        for i in 0..BIGTESTSIZE {
            tb.set(i, nth(i));
            assert_eq!(tb.num(), i + 1);
        }

        for i in 0..BIGTESTSIZE {
            assert_eq!(tb.get(i), Some(nth(i)));
            tb.remove(i);
            assert_eq!(tb.get(i), None);
            assert_eq!(tb.num(), BIGTESTSIZE - 1);
            assert_eq!(tb.setfirst(nth(i), 0), Ok(i));
            assert_eq!(tb.num(), BIGTESTSIZE);
            assert_eq!(tb.get(i), Some(nth(i)));
        }

        // Full table: no hole anywhere.
        assert_eq!(tb.setfirst(nth(0), 0), Err(TableFull));

        // The scan runs forward only; a hole below `start` is not found.
        tb.remove(234);
        tb.remove(35);
        assert_eq!(tb.setfirst(p, 235), Err(TableFull));
        assert_eq!(tb.setfirst(p, 230), Ok(234));
        assert_eq!(tb.get(234), Some(p));
        assert_eq!(tb.setfirst(p, 28), Ok(35));
        assert_eq!(tb.get(35), Some(p));

        for i in 0..BIGTESTSIZE {
            tb.remove(i);
            assert_eq!(tb.num(), BIGTESTSIZE - (i + 1));
        }
    }

    #[test]
    fn setsize_never_shrinks() {
        let tb = Table::<usize>::new();
        tb.setsize(500);
        assert_eq!(tb.max(), 500);
        tb.setsize(100);
        assert_eq!(tb.max(), 500);
        tb.setsize(501);
        assert_eq!(tb.max(), 501);
    }

    #[test]
    fn remove_of_empty_slot_keeps_population() {
        let tb = Table::new();
        tb.setsize(600);
        tb.set(300, 1_usize);
        tb.remove(5);
        tb.remove(599);
        assert_eq!(tb.num(), 1);
    }

    #[test]
    fn section_reclaimed_when_drained() {
        let tb = Table::new();
        tb.setsize(SECTION_SIZE * 2);

        for i in 0..SECTION_SIZE {
            tb.set(i, nth(i));
        }
        assert!(tb.section_is_live(0));

        for i in 0..SECTION_SIZE {
            tb.remove(i);
        }
        assert!(!tb.section_is_live(0));
        assert_eq!(tb.container_count(), 1);

        // A reclaimed range is immediately reusable.
        tb.set(17, nth(17));
        assert!(tb.section_is_live(0));
        assert_eq!(tb.get(17), Some(nth(17)));
        tb.remove(17);
        assert_eq!(tb.num(), 0);
    }

    #[test]
    fn same_section_interleaving() {
        let tb = Table::new();
        tb.setsize(500);

        thread::scope(|scope| {
            for t in 0..2 {
                let tb = &tb;
                scope.spawn(move || {
                    let index = 257 + t;
                    for _ in 0..NLOOPS {
                        thread::yield_now();
                        tb.set(index, nth(index));
                        thread::yield_now();
                        assert_eq!(tb.get(index), Some(nth(index)));
                        thread::yield_now();
                        tb.remove(index);
                        thread::yield_now();
                        assert_eq!(tb.get(index), None);
                    }
                });
            }
        });

        assert_eq!(tb.num(), 0);
    }

    #[test]
    fn disjoint_section_stress() {
        let tb = Table::new();
        tb.setsize(SECTION_SIZE * NTHREADS);
        let filled = Barrier::new(NTHREADS);

        thread::scope(|scope| {
            for t in 0..NTHREADS {
                let tb = &tb;
                let filled = &filled;
                scope.spawn(move || {
                    let lo = SECTION_SIZE * t;
                    let hi = lo + SECTION_SIZE;
                    for i in lo..hi {
                        tb.set(i, nth(t));
                    }
                    filled.wait();
                    for i in lo..hi {
                        assert_eq!(tb.get(i), Some(nth(t)));
                    }
                    for i in lo..hi {
                        tb.remove(i);
                        assert_eq!(tb.get(i), None);
                    }
                });
            }
        });

        assert_eq!(tb.num(), 0);
        for t in 0..NTHREADS {
            assert!(!tb.section_is_live(t));
        }
    }

    #[test]
    fn concurrent_setfirst_claims_distinct_slots() {
        let tb = Table::new();
        tb.setsize(SECTION_SIZE * 4);

        let claimed: Vec<usize> = thread::scope(|scope| {
            let handles: Vec<_> = (0..NTHREADS)
                .map(|t| {
                    let tb = &tb;
                    scope.spawn(move || {
                        let mut got = Vec::new();
                        for _ in 0..100 {
                            got.push(tb.setfirst(nth(t), 0).unwrap());
                            thread::yield_now();
                        }
                        got
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        let mut sorted = claimed.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), claimed.len());
        assert_eq!(tb.num(), NTHREADS * 100);
    }
}
