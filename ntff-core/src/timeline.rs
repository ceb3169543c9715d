//! Play timeline: the kept intervals and the playback cursor

use crate::feature::FeatureList;
use crate::interval::{FrameId, Interval};
use crate::interval_set::IntervalSet;
use crate::selection::CombineMode;
use tracing::debug;

/// Materialized set of kept intervals plus the current-interval cursor
#[derive(Debug, Clone, Default)]
pub struct PlayTimeline {
    intervals: IntervalSet,
    cursor: Option<FrameId>,
    whole_duration: FrameId,
    placements: Vec<Interval>,
}

impl PlayTimeline {
    /// Creates an empty timeline over `[0, whole_duration)`.
    ///
    /// `placements` are the frames each source file provides. Kept
    /// intervals are clipped to them and never cross from one file to the
    /// next; an empty list serves the whole axis.
    pub fn new(whole_duration: FrameId, placements: Vec<Interval>) -> Self {
        Self {
            intervals: IntervalSet::new(),
            cursor: None,
            whole_duration,
            placements,
        }
    }

    /// Builds the kept intervals for the current feature selection
    pub fn build(features: &FeatureList, whole_duration: FrameId) -> IntervalSet {
        let domain = Interval::new(0, whole_duration);
        match features.mode() {
            CombineMode::MarkedOnly => {
                let mut keep = IntervalSet::new();
                for feature in features.iter().filter(|feature| feature.active()) {
                    for interval in feature.selected_intervals() {
                        keep.insert(*interval);
                    }
                    if feature.affects_unmarked() && !feature.inverted() {
                        for gap in &feature.unmarked(domain) {
                            keep.insert(*gap);
                        }
                    }
                }
                keep.remove(Interval::new(FrameId::MIN, domain.start));
                keep.remove(Interval::new(domain.end, FrameId::MAX));
                keep
            }
            CombineMode::Complement => {
                let mut skip = IntervalSet::new();
                for feature in features.iter() {
                    for interval in feature.intervals() {
                        if !feature.active() || !feature.is_active(interval) {
                            skip.insert(*interval);
                        }
                    }
                    if feature.active() && feature.affects_unmarked() && feature.inverted() {
                        for gap in &feature.unmarked(domain) {
                            skip.insert(*gap);
                        }
                    }
                }
                skip.complement(domain)
            }
        }
    }

    /// Recomputes the kept intervals and rewinds the cursor to the first one.
    ///
    /// Returns the kept length in frames.
    pub fn rebuild(&mut self, features: &FeatureList) -> FrameId {
        self.intervals = self.clip_to_sources(Self::build(features, self.whole_duration));
        self.rewind();

        let length = self.length();
        debug!(
            intervals = self.intervals.len(),
            length,
            mode = ?features.mode(),
            "play timeline rebuilt"
        );
        length
    }

    /// Kept length a feature selection would produce, without applying it
    pub fn preview_length(&self, features: &FeatureList) -> FrameId {
        self.clip_to_sources(Self::build(features, self.whole_duration))
            .total_length()
    }

    /// Drops frames no source provides and splits at every placement edge
    fn clip_to_sources(&self, mut intervals: IntervalSet) -> IntervalSet {
        if self.placements.is_empty() {
            return intervals;
        }
        let mut covered = IntervalSet::new();
        for placement in &self.placements {
            covered.insert(*placement);
        }
        let domain = Interval::new(0, self.whole_duration);
        for gap in &covered.complement(domain) {
            intervals.remove(*gap);
        }
        for placement in &self.placements {
            intervals.split_at(placement.start);
            intervals.split_at(placement.end);
        }
        intervals
    }

    pub fn intervals(&self) -> &IntervalSet {
        &self.intervals
    }

    pub fn whole_duration(&self) -> FrameId {
        self.whole_duration
    }

    /// Total number of kept frames
    pub fn length(&self) -> FrameId {
        self.intervals.total_length()
    }

    /// Current kept interval, `None` once playback is finished
    pub fn current(&self) -> Option<Interval> {
        self.cursor
            .and_then(|start| self.intervals.get(start))
            .copied()
    }

    pub fn is_finished(&self) -> bool {
        self.current().is_none()
    }

    /// Moves the cursor to the first kept interval
    pub fn rewind(&mut self) -> Option<Interval> {
        self.cursor = self.intervals.first().map(|interval| interval.start);
        self.current()
    }

    /// Moves the cursor to the next kept interval
    pub fn advance(&mut self) -> Option<Interval> {
        self.cursor = self
            .cursor
            .and_then(|start| self.intervals.next_after(start))
            .map(|interval| interval.start);
        self.current()
    }

    /// Kept interval that will follow the current one
    pub fn peek_next(&self) -> Option<Interval> {
        self.cursor
            .and_then(|start| self.intervals.next_after(start))
            .copied()
    }

    /// Places the cursor on the interval holding `frame`, or the next kept one.
    ///
    /// Returns the interval and the global frame playback resumes from.
    pub fn reposition(&mut self, frame: FrameId) -> Option<(Interval, FrameId)> {
        let found = self.intervals.first_at_or_after(frame).copied();
        self.cursor = found.map(|interval| interval.start);
        found.map(|interval| (interval, frame.max(interval.start)))
    }

    /// Resolves a normalized position (0.0-1.0 of the kept length).
    ///
    /// Walks the kept intervals accumulating lengths until the target frame
    /// falls inside one; returns it with the frame offset into it.
    pub fn locate(&self, position: f64) -> Option<(Interval, FrameId)> {
        let length = self.length();
        if length == 0 || !position.is_finite() {
            return None;
        }
        let target = (position.clamp(0.0, 1.0) * length as f64).round() as FrameId;
        let mut walked = 0;
        for interval in &self.intervals {
            if target < walked + interval.length() {
                return Some((*interval, target - walked));
            }
            walked += interval.length();
        }
        None
    }

    /// Moves the cursor to a normalized position.
    ///
    /// Returns the interval and the global frame to resume from; a position
    /// at or past the end finishes the timeline.
    pub fn seek(&mut self, position: f64) -> Option<(Interval, FrameId)> {
        let located = self.locate(position);
        self.cursor = located.map(|(interval, _)| interval.start);
        located.map(|(interval, offset)| (interval, interval.start + offset))
    }

    /// Number of kept frames before the global `frame`
    pub fn virtual_frame(&self, frame: FrameId) -> FrameId {
        match self.intervals.find_containing(frame) {
            Some(interval) => self.intervals.length_before(interval.start) + frame - interval.start,
            None => self
                .intervals
                .iter()
                .take_while(|interval| interval.end <= frame)
                .map(Interval::length)
                .sum(),
        }
    }
}
