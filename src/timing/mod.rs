//! Session timebase for capture timestamps
//!
//! Every captured unit is stamped with microseconds elapsed since the
//! session start instant. Both producers share one clock so video and
//! audio stamps live on the same axis.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of capture timestamps relative to a resettable start instant.
pub trait ClockSource: Send + Sync {
    /// Microseconds elapsed since the current start instant.
    fn now_us(&self) -> u64;

    /// Move the start instant to "now".
    fn reset(&self);
}

/// Monotonic clock backed by [`Instant`]
///
/// The start instant is stored as an offset from a fixed anchor so that
/// `reset` and `now_us` are lock-free and safe to call from the camera
/// callback thread and the audio thread at the same time.
#[derive(Debug, Clone)]
pub struct SessionClock {
    anchor: Instant,
    start_offset_us: Arc<AtomicU64>,
}

impl SessionClock {
    /// Create a clock whose time zero is the current instant
    pub fn new() -> Self {
        Self::from_instant(Instant::now())
    }

    /// Create a clock whose time zero is `start`
    pub fn from_instant(start: Instant) -> Self {
        Self {
            anchor: start,
            start_offset_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current time zero
    pub fn start_instant(&self) -> Instant {
        self.anchor + std::time::Duration::from_micros(self.start_offset_us.load(Ordering::Acquire))
    }

    #[inline]
    fn anchor_elapsed_us(&self) -> u64 {
        self.anchor.elapsed().as_micros() as u64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for SessionClock {
    #[inline]
    fn now_us(&self) -> u64 {
        self.anchor_elapsed_us()
            .saturating_sub(self.start_offset_us.load(Ordering::Acquire))
    }

    fn reset(&self) {
        self.start_offset_us
            .store(self.anchor_elapsed_us(), Ordering::Release);
    }
}

/// Hand-driven clock for deterministic tests
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_us: Arc<AtomicU64>,
    resets: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, us: u64) {
        self.now_us.store(us, Ordering::SeqCst);
    }

    pub fn advance(&self, us: u64) {
        self.now_us.fetch_add(us, Ordering::SeqCst);
    }

    /// Number of times `reset` was called
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }
}

impl ClockSource for ManualClock {
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.now_us.store(0, Ordering::SeqCst);
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_clock_monotonic() {
        let clock = SessionClock::new();
        let t1 = clock.now_us();
        thread::sleep(Duration::from_millis(10));
        let t2 = clock.now_us();
        assert!(t2 > t1, "clock must move forward");
        assert!(t2 >= 10_000);
    }

    #[test]
    fn test_reset_moves_time_zero() {
        let clock = SessionClock::new();
        thread::sleep(Duration::from_millis(20));
        assert!(clock.now_us() >= 20_000);

        clock.reset();
        assert!(clock.now_us() < 20_000);
        assert!(clock.start_instant() > clock.anchor);
    }

    #[test]
    fn test_shared_clock_agrees() {
        let clock = SessionClock::new();
        let other = clock.clone();
        thread::sleep(Duration::from_millis(5));
        other.reset();

        let a = clock.now_us();
        let b = other.now_us();
        assert!(a.abs_diff(b) < 1_000, "clones share the start instant");
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new();
        clock.set(1_000);
        clock.advance(500);
        assert_eq!(clock.now_us(), 1_500);

        clock.reset();
        assert_eq!(clock.now_us(), 0);
        assert_eq!(clock.resets(), 1);
    }
}
