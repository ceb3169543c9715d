//! Sliding window of recently delivered frame indices

use ntff_core::FrameId;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Default number of indices kept in the window
pub const DEFAULT_WINDOW: usize = 10;

/// Classification of a pushed frame index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    /// First delivery of this index
    Fresh,
    /// Index already delivered, or older than the window
    Duplicate,
    /// Index skips ahead of the newest delivered frame
    Gap { missing: FrameId },
}

/// Detects duplicate and missing frames in a decoder's output.
///
/// Indices are kept sorted. A single missing frame is tolerated while the
/// window has room, since decoders commonly emit one frame late; when the
/// window overflows, or a larger gap shows up, the window collapses to its
/// trailing contiguous run and the holes are counted as lost.
#[derive(Debug, Clone)]
pub struct FrameTracker {
    window: VecDeque<FrameId>,
    capacity: usize,
    duplicates: u64,
    missing: u64,
}

impl FrameTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity + 1),
            capacity: capacity.max(1),
            duplicates: 0,
            missing: 0,
        }
    }

    /// Records a delivered frame index
    pub fn push(&mut self, index: FrameId) -> FrameEvent {
        let stale = self.window.front().is_some_and(|front| index < *front);
        if stale || self.window.binary_search(&index).is_ok() {
            self.duplicates += 1;
            debug!(index, "duplicate frame");
            return FrameEvent::Duplicate;
        }

        let last = self.window.back().copied();
        let position = self.window.partition_point(|frame| *frame < index);
        self.window.insert(position, index);

        let event = match last {
            Some(last) if index > last + 1 => {
                let missing = index - last - 1;
                if missing > 1 {
                    warn!(index, missing, "frames missing from decoder output");
                    self.coalesce();
                }
                FrameEvent::Gap { missing }
            }
            _ => FrameEvent::Fresh,
        };

        if self.window.len() > self.capacity {
            self.coalesce();
            while self.window.len() > self.capacity {
                self.window.pop_front();
            }
        }
        event
    }

    /// Keeps only the trailing contiguous run, counting the holes dropped
    fn coalesce(&mut self) {
        let Some(run_start) = (1..self.window.len())
            .rev()
            .find(|i| self.window[*i] != self.window[i - 1] + 1)
        else {
            return;
        };
        let holes: FrameId = (1..=run_start)
            .map(|i| self.window[i] - self.window[i - 1] - 1)
            .sum();
        self.missing += holes as u64;
        self.window.drain(..run_start);
    }

    /// Newest delivered index
    pub fn last(&self) -> Option<FrameId> {
        self.window.back().copied()
    }

    /// Index following the newest delivered one
    pub fn handled(&self) -> Option<FrameId> {
        self.last().map(|last| last + 1)
    }

    /// True once `target` or a later index has been delivered
    pub fn reached(&self, target: FrameId) -> bool {
        self.last().is_some_and(|last| last >= target)
    }

    pub fn window(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.window.iter().copied()
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Frames confirmed lost
    pub fn missing(&self) -> u64 {
        self.missing
    }

    /// Clears the window; counters are kept
    pub fn reset(&mut self) {
        self.window.clear();
    }
}

impl Default for FrameTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
