//! People counting from detection timestamps
//!
//! Detections whose timestamps are within `window_ms` of the previous one are
//! considered part of the same capture frame. When a gap larger than the window
//! is seen, the frame closes and its tally becomes the reported count.
//!
//! The reported value lags one frame: it is always the size of the last
//! *closed* frame, so the first detection of a run reports 0. The detection
//! that crosses a boundary starts the new frame at 0 and is not itself counted.
//!
//! Only the listener's serialized message path calls [`FrameCounter::count`],
//! so the atomics only need to be individually consistent.

use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};

/// Default same-frame window in milliseconds
pub const DEFAULT_SAME_FRAME_WINDOW_MS: i64 = 3;

/// Marker for "no timestamp seen yet"
const UNSET: i64 = i64::MIN;

/// Stateful frame tally
#[derive(Debug)]
pub struct FrameCounter {
    window_ms: i64,
    previous_timestamp: AtomicI64,
    current_frame_tally: AtomicI32,
    last_committed_count: AtomicI32,
}

impl FrameCounter {
    /// Create a counter with the default 3 ms window
    pub fn new() -> Self {
        Self::with_window(DEFAULT_SAME_FRAME_WINDOW_MS)
    }

    /// Create a counter with a custom same-frame window
    pub fn with_window(window_ms: i64) -> Self {
        Self {
            window_ms,
            previous_timestamp: AtomicI64::new(UNSET),
            current_frame_tally: AtomicI32::new(0),
            last_committed_count: AtomicI32::new(0),
        }
    }

    /// Same-frame window in milliseconds
    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// Feed one detection timestamp and return the last closed frame's count
    pub fn count(&self, timestamp_ms: i64) -> i32 {
        let previous = self.previous_timestamp.load(Ordering::Acquire);

        // Out-of-order timestamps give a negative diff and stay in the open frame.
        let same_frame =
            previous == UNSET || timestamp_ms.saturating_sub(previous) <= self.window_ms;

        if same_frame {
            self.current_frame_tally.fetch_add(1, Ordering::AcqRel);
        } else {
            let closed = self.current_frame_tally.swap(0, Ordering::AcqRel);
            self.last_committed_count.store(closed, Ordering::Release);

            tracing::trace!(
                timestamp = timestamp_ms,
                gap_ms = timestamp_ms.saturating_sub(previous),
                people = closed,
                "Frame closed"
            );
        }

        self.previous_timestamp.store(timestamp_ms, Ordering::Release);
        self.last_committed_count.load(Ordering::Acquire)
    }

    /// Size of the most recently closed frame
    pub fn last_count(&self) -> i32 {
        self.last_committed_count.load(Ordering::Acquire)
    }

    /// Forget all history, as if no timestamp had been seen
    pub fn reset(&self) {
        self.previous_timestamp.store(UNSET, Ordering::Release);
        self.current_frame_tally.store(0, Ordering::Release);
        self.last_committed_count.store(0, Ordering::Release);
    }
}

impl Default for FrameCounter {
    fn default() -> Self {
        Self::new()
    }
}
