//! Property-Based Tests for ReplayCam buffers
//!
//! Invariants of the rolling ring, the drain hand-off queue and timestamp
//! normalization, checked with proptest input generation and shrinking.
//!
//! Run with: cargo test --test ring_props

use proptest::prelude::*;

use replaycam::buffer::{BoundedRing, DrainQueue};
use replaycam::flush::{normalize_timestamps, TimestampWindow};

// ═══════════════════════════════════════════════════════════════════════════
// BOUNDED RING INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// INVARIANT: the ring holds min(inserted, capacity) units
    #[test]
    fn ring_len_is_bounded(capacity in 1usize..64, inserts in 0usize..256) {
        let mut ring = BoundedRing::new(capacity);
        for i in 0..inserts {
            ring.insert(i, i as u64);
        }

        prop_assert_eq!(ring.len(), inserts.min(capacity));
        prop_assert_eq!(ring.write_index(), inserts as u64);
        prop_assert_eq!(ring.has_wrapped(), inserts > capacity);
    }

    /// INVARIANT: ordered reads yield exactly the most recent units, oldest first
    #[test]
    fn ring_reads_most_recent_in_order(capacity in 1usize..64, inserts in 1usize..256) {
        let mut ring = BoundedRing::new(capacity);
        for i in 0..inserts {
            ring.insert(i, i as u64 * 1_000);
        }

        let expected: Vec<usize> = (inserts.saturating_sub(capacity)..inserts).collect();
        let units: Vec<usize> = ring.read_ordered().map(|(u, _)| *u).collect();
        prop_assert_eq!(units, expected);

        let stamps: Vec<u64> = ring.read_ordered().map(|(_, ts)| ts).collect();
        prop_assert!(stamps.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(ring.latest_timestamp(), Some((inserts as u64 - 1) * 1_000));
    }

    /// INVARIANT: an insert returns the evicted unit only once the ring is full
    #[test]
    fn ring_evicts_oldest(capacity in 1usize..32, extra in 1usize..32) {
        let mut ring = BoundedRing::new(capacity);
        for i in 0..capacity {
            prop_assert!(ring.insert(i, i as u64).is_none());
        }
        for i in capacity..capacity + extra {
            let evicted = ring.insert(i, i as u64);
            prop_assert_eq!(evicted, Some((i - capacity, (i - capacity) as u64)));
        }
    }

    /// INVARIANT: clear empties the ring but it stays usable
    #[test]
    fn ring_clear_then_reuse(capacity in 1usize..32, inserts in 0usize..64) {
        let mut ring = BoundedRing::new(capacity);
        for i in 0..inserts {
            ring.insert(i, i as u64);
        }
        ring.clear();
        prop_assert!(ring.is_empty());
        prop_assert_eq!(ring.read_ordered().count(), 0);

        ring.insert(7, 7);
        prop_assert_eq!(ring.len(), 1);
        prop_assert_eq!(ring.latest_timestamp(), Some(7));
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// DRAIN QUEUE INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// INVARIANT: a bounded queue keeps the newest `limit` units in FIFO order
    #[test]
    fn bounded_queue_drops_oldest(limit in 1usize..32, pushes in 0usize..128) {
        let queue = DrainQueue::bounded(limit);
        for i in 0..pushes {
            prop_assert!(queue.push(i, i as u64));
        }

        let kept = pushes.min(limit);
        prop_assert_eq!(queue.len(), kept);
        prop_assert_eq!(queue.dropped(), (pushes - kept) as u64);
        prop_assert_eq!(queue.pushed(), pushes as u64);

        let mut popped = Vec::new();
        while let Some((unit, _)) = queue.pop() {
            popped.push(unit);
        }
        let expected: Vec<usize> = (pushes - kept..pushes).collect();
        prop_assert_eq!(popped, expected);
    }

    /// INVARIANT: an unbounded queue never drops
    #[test]
    fn unbounded_queue_keeps_everything(pushes in 0usize..512) {
        let queue = DrainQueue::unbounded();
        for i in 0..pushes {
            queue.push(i, i as u64);
        }
        prop_assert_eq!(queue.len(), pushes);
        prop_assert_eq!(queue.dropped(), 0);
        prop_assert_eq!(queue.peak_len(), pushes);
    }
}

#[test]
fn closed_queue_rejects_pushes() {
    let queue = DrainQueue::unbounded();
    assert!(queue.push(1u8, 10));
    queue.close();
    assert!(queue.is_closed());
    assert!(!queue.push(2u8, 20));
    // Pending units remain poppable after close
    assert_eq!(queue.pop(), Some((1, 10)));
    assert_eq!(queue.pop(), None);
}

// ═══════════════════════════════════════════════════════════════════════════
// TIMESTAMP NORMALIZATION INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// INVARIANT: normalized stamps are shifted by one base, stay ordered and
    /// never exceed the window
    #[test]
    fn normalized_stamps_fit_window(
        gaps in prop::collection::vec(1u64..200_000, 1..200),
        window_us in 1u64..10_000_000,
    ) {
        let mut raw = Vec::with_capacity(gaps.len());
        let mut t = 0u64;
        for gap in &gaps {
            t += gap;
            raw.push(t);
        }

        let latest = *raw.last().unwrap();
        let window = TimestampWindow::new(latest, window_us);
        let normalized = normalize_timestamps(&raw, window_us);

        let kept: Vec<u64> = raw.iter().copied().filter(|&r| window.contains(r)).collect();
        prop_assert_eq!(normalized.len(), kept.len());
        prop_assert!(normalized.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(normalized.iter().all(|&ts| ts <= window_us));
        for (n, r) in normalized.iter().zip(&kept) {
            prop_assert_eq!(*n, r - window.base_us);
        }
        // The latest unit always survives
        prop_assert_eq!(normalized.last().copied(), Some(latest - window.base_us));
    }

    /// INVARIANT: a run shorter than the window is left unshifted
    #[test]
    fn short_run_is_not_shifted(raw in prop::collection::vec(0u64..1_000_000, 1..50)) {
        let mut raw = raw;
        raw.sort_unstable();
        let normalized = normalize_timestamps(&raw, 1_000_000);
        prop_assert_eq!(normalized, raw);
    }
}

#[test]
fn empty_run_normalizes_to_nothing() {
    assert!(normalize_timestamps(&[], 5_000_000).is_empty());
}
