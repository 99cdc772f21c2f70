//! FIFO hand-off queue for continuous-drain sessions
//!
//! One producer appends at the tail, one consumer pops from the head. The
//! queue is lock-protected so a pop is atomic and pushes are visible to the
//! consumer thread. An optional limit turns it into a drop-oldest queue.

use std::collections::VecDeque;

use parking_lot::Mutex;

struct DrainInner<T> {
    items: VecDeque<(T, u64)>,
    limit: Option<usize>,
    dropped: u64,
    pushed: u64,
    peak: usize,
    closed: bool,
}

/// Ordered queue of `(unit, timestamp_us)` pairs
pub struct DrainQueue<T> {
    inner: Mutex<DrainInner<T>>,
}

impl<T> DrainQueue<T> {
    /// Queue that grows without bound while the consumer stalls
    pub fn unbounded() -> Self {
        Self::with_limit(None)
    }

    /// Queue that drops its oldest entry once `limit` entries are pending
    pub fn bounded(limit: usize) -> Self {
        Self::with_limit(Some(limit.max(1)))
    }

    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(DrainInner {
                items: VecDeque::with_capacity(limit.unwrap_or(64).min(1024)),
                limit,
                dropped: 0,
                pushed: 0,
                peak: 0,
                closed: false,
            }),
        }
    }

    /// Append at the tail. Returns false once the queue is closed.
    pub fn push(&self, unit: T, timestamp_us: u64) -> bool {
        let mut g = self.inner.lock();
        if g.closed {
            return false;
        }

        if let Some(limit) = g.limit {
            if g.items.len() >= limit {
                g.items.pop_front();
                g.dropped = g.dropped.saturating_add(1);
                if g.dropped % 100 == 1 {
                    log::debug!("Drain queue full ({} pending), dropped {} units so far", limit, g.dropped);
                }
            }
        }

        g.items.push_back((unit, timestamp_us));
        g.pushed = g.pushed.saturating_add(1);
        g.peak = g.peak.max(g.items.len());
        true
    }

    /// Remove the head entry
    pub fn pop(&self) -> Option<(T, u64)> {
        self.inner.lock().items.pop_front()
    }

    /// Timestamp of the head entry without removing it
    pub fn peek_timestamp(&self) -> Option<u64> {
        self.inner.lock().items.front().map(|(_, ts)| *ts)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Entries evicted by the drop-oldest limit
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }

    /// Entries accepted since creation
    pub fn pushed(&self) -> u64 {
        self.inner.lock().pushed
    }

    /// Largest number of entries pending at once
    pub fn peak_len(&self) -> usize {
        self.inner.lock().peak
    }

    /// Reject further pushes; pending entries can still be popped
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Discard all pending entries, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut g = self.inner.lock();
        let n = g.items.len();
        g.items.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let q = DrainQueue::unbounded();
        for i in 0..5u32 {
            assert!(q.push(i, i as u64));
        }
        assert_eq!(q.peek_timestamp(), Some(0));
        let out: Vec<u32> = std::iter::from_fn(|| q.pop().map(|(v, _)| v)).collect();
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_bounded_drops_oldest() {
        let q = DrainQueue::bounded(3);
        for i in 0..5u32 {
            q.push(i, i as u64);
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.dropped(), 2);
        assert_eq!(q.pushed(), 5);
        assert_eq!(q.pop(), Some((2, 2)));
    }

    #[test]
    fn test_closed_rejects_push_but_drains() {
        let q = DrainQueue::unbounded();
        q.push(1u32, 1);
        q.close();
        assert!(!q.push(2, 2));
        assert_eq!(q.pop(), Some((1, 1)));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        let q = Arc::new(DrainQueue::unbounded());
        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..1000u64 {
                    q.push(i, i);
                }
                q.close();
            })
        };

        let mut received = Vec::new();
        loop {
            match q.pop() {
                Some((v, _)) => received.push(v),
                None if q.is_closed() && q.is_empty() => break,
                None => thread::yield_now(),
            }
        }
        producer.join().unwrap();

        assert_eq!(received.len(), 1000);
        assert!(received.windows(2).all(|w| w[0] < w[1]));
    }
}
