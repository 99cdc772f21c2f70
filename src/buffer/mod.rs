//! Capture unit storage
//!
//! - `ring`: fixed-capacity rolling window used by one-shot flush
//! - `drain`: FIFO hand-off used by continuous drain
//!
//! Producers only see the [`UnitStore`] trait, so they are agnostic to
//! which flush strategy the session runs.

mod drain;
mod ring;

pub use drain::DrainQueue;
pub use ring::{BoundedRing, OrderedEntries};

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

/// Producer-facing insertion point for timestamped units
pub trait UnitStore<T>: Send + Sync {
    /// Insert one unit. Never blocks on the consumer.
    fn insert(&self, unit: T, timestamp_us: u64);

    /// Units currently held
    fn occupancy(&self) -> usize;
}

/// A [`BoundedRing`] shared between one producer and the flush walk
pub struct SharedRing<T> {
    ring: Arc<Mutex<BoundedRing<T>>>,
}

impl<T> SharedRing<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Arc::new(Mutex::new(BoundedRing::new(capacity))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }

    pub fn write_index(&self) -> u64 {
        self.ring.lock().write_index()
    }

    /// Exclusive access for the flush walk
    pub fn lock(&self) -> MutexGuard<'_, BoundedRing<T>> {
        self.ring.lock()
    }
}

impl<T> Clone for SharedRing<T> {
    fn clone(&self) -> Self {
        Self {
            ring: self.ring.clone(),
        }
    }
}

impl<T: Send> UnitStore<T> for SharedRing<T> {
    fn insert(&self, unit: T, timestamp_us: u64) {
        // The evicted unit is dropped outside the lock.
        let evicted = self.ring.lock().insert(unit, timestamp_us);
        drop(evicted);
    }

    fn occupancy(&self) -> usize {
        self.ring.lock().len()
    }
}

impl<T: Send> UnitStore<T> for DrainQueue<T> {
    fn insert(&self, unit: T, timestamp_us: u64) {
        self.push(unit, timestamp_us);
    }

    fn occupancy(&self) -> usize {
        self.len()
    }
}
