//! Re-timing retained units onto a zero-based axis
//!
//! Raw timestamps are offsets from the session start instant. Once only the
//! last window is retained, the oldest surviving unit is not at zero, so
//! every emitted timestamp is shifted by `base = latest - window` (clamped
//! to zero). Units older than `base` are not emitted.

use serde::{Deserialize, Serialize};

/// The retained window of one flush
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampWindow {
    /// Raw timestamp mapped to zero
    pub base_us: u64,
    /// Raw timestamp of the most recent unit
    pub latest_us: u64,
    pub window_us: u64,
}

impl TimestampWindow {
    pub fn new(latest_us: u64, window_us: u64) -> Self {
        Self {
            base_us: latest_us.saturating_sub(window_us),
            latest_us,
            window_us,
        }
    }

    pub fn from_secs(latest_us: u64, window_secs: u32) -> Self {
        Self::new(latest_us, window_secs as u64 * 1_000_000)
    }

    /// Outgoing timestamp for `raw_us`, or `None` if it falls before the window
    #[inline]
    pub fn normalize(&self, raw_us: u64) -> Option<u64> {
        raw_us.checked_sub(self.base_us)
    }

    pub fn contains(&self, raw_us: u64) -> bool {
        raw_us >= self.base_us
    }
}

/// Normalize an ordered run of raw timestamps against its own last entry
pub fn normalize_timestamps(raw_us: &[u64], window_us: u64) -> Vec<u64> {
    let Some(&latest) = raw_us.last() else {
        return Vec::new();
    };
    let window = TimestampWindow::new(latest, window_us);
    raw_us.iter().filter_map(|&t| window.normalize(t)).collect()
}
