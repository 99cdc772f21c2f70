//! Fixed-capacity circular store of timestamped capture units
//!
//! Units and their timestamps live in two parallel slot arrays indexed by
//! `write_index % capacity`. `write_index` only ever grows, so the retained
//! units are always the half-open range
//! `[max(0, write_index - capacity), write_index)`.

/// Circular buffer that overwrites its oldest entry once full
pub struct BoundedRing<T> {
    units: Vec<Option<T>>,
    timestamps: Vec<Option<u64>>,
    write_index: u64,
}

impl<T> BoundedRing<T> {
    /// Create a ring holding at most `capacity` units (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut units = Vec::with_capacity(capacity);
        units.resize_with(capacity, || None);

        Self {
            units,
            timestamps: vec![None; capacity],
            write_index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.units.len()
    }

    /// Total number of inserts since creation (or the last `clear`)
    pub fn write_index(&self) -> u64 {
        self.write_index
    }

    /// Number of retained units
    pub fn len(&self) -> usize {
        self.write_index.min(self.capacity() as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.write_index == 0
    }

    /// True once at least one unit has been overwritten
    pub fn has_wrapped(&self) -> bool {
        self.write_index > self.capacity() as u64
    }

    /// Store `unit` in the next slot. O(1), never blocks.
    ///
    /// Returns the evicted entry when the slot was already occupied so the
    /// caller can recycle its allocation.
    pub fn insert(&mut self, unit: T, timestamp_us: u64) -> Option<(T, u64)> {
        let slot = (self.write_index % self.capacity() as u64) as usize;
        let evicted_unit = self.units[slot].replace(unit);
        let evicted_timestamp = self.timestamps[slot].replace(timestamp_us);
        self.write_index += 1;

        match (evicted_unit, evicted_timestamp) {
            (Some(unit), Some(ts)) => Some((unit, ts)),
            _ => None,
        }
    }

    /// Retained entries oldest-first, unwrapping the circular index.
    ///
    /// Never-written slots are skipped. The iterator borrows the ring, so
    /// calling this again restarts the walk from the oldest entry.
    pub fn read_ordered(&self) -> OrderedEntries<'_, T> {
        let capacity = self.capacity() as u64;
        let (start, count) = if self.write_index <= capacity {
            (0, self.write_index)
        } else {
            (self.write_index % capacity, capacity)
        };

        OrderedEntries {
            ring: self,
            start: start as usize,
            offset: 0,
            count: count as usize,
        }
    }

    /// Most recently inserted valid entry
    pub fn latest(&self) -> Option<(&T, u64)> {
        let capacity = self.capacity() as u64;
        let retained = self.len() as u64;
        (1..=retained).find_map(|back| {
            let slot = ((self.write_index - back) % capacity) as usize;
            match (&self.units[slot], self.timestamps[slot]) {
                (Some(unit), Some(ts)) => Some((unit, ts)),
                _ => None,
            }
        })
    }

    pub fn latest_timestamp(&self) -> Option<u64> {
        self.latest().map(|(_, ts)| ts)
    }

    /// Drop every unit and reset the write index
    pub fn clear(&mut self) {
        self.units.iter_mut().for_each(|u| *u = None);
        self.timestamps.iter_mut().for_each(|t| *t = None);
        self.write_index = 0;
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for BoundedRing<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedRing")
            .field("capacity", &self.capacity())
            .field("write_index", &self.write_index)
            .field("len", &self.len())
            .finish()
    }
}

/// Chronological walk over a [`BoundedRing`]
pub struct OrderedEntries<'a, T> {
    ring: &'a BoundedRing<T>,
    start: usize,
    offset: usize,
    count: usize,
}

impl<'a, T> Clone for OrderedEntries<'a, T> {
    fn clone(&self) -> Self {
        Self {
            ring: self.ring,
            start: self.start,
            offset: self.offset,
            count: self.count,
        }
    }
}

impl<'a, T> Iterator for OrderedEntries<'a, T> {
    type Item = (&'a T, u64);

    fn next(&mut self) -> Option<Self::Item> {
        let capacity = self.ring.capacity();
        while self.offset < self.count {
            let slot = (self.start + self.offset) % capacity;
            self.offset += 1;
            if let (Some(unit), Some(ts)) = (&self.ring.units[slot], self.ring.timestamps[slot]) {
                return Some((unit, ts));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.count - self.offset))
    }
}
