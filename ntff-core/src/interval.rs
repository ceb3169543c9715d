//! Interval data structures for the global frame axis

/// Frame index on the project's global frame axis
pub type FrameId = i64;

/// Half-open `[start, end)` range of frames, tagged with an annotation intensity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Interval {
    /// First frame covered by the interval
    pub start: FrameId,
    /// First frame past the interval
    pub end: FrameId,
    /// Annotation intensity (0 when not annotated)
    #[cfg_attr(feature = "serde", serde(default))]
    pub intensity: i8,
}

impl Interval {
    /// Creates a new interval with zero intensity
    pub fn new(start: FrameId, end: FrameId) -> Self {
        Self {
            start,
            end,
            intensity: 0,
        }
    }

    /// Creates a new interval carrying an intensity
    pub fn with_intensity(start: FrameId, end: FrameId, intensity: i8) -> Self {
        Self {
            start,
            end,
            intensity,
        }
    }

    /// Returns the number of frames covered
    pub fn length(&self) -> FrameId {
        self.end - self.start
    }

    /// True when the interval covers no frame
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Checks whether `frame` lies inside the interval
    pub fn contains(&self, frame: FrameId) -> bool {
        frame >= self.start && frame < self.end
    }

    /// True when the two ranges share at least one frame
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns the overlapping part of two intervals, if any
    pub fn intersection(&self, other: &Interval) -> Option<Interval> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(Interval {
            start,
            end,
            intensity: self.intensity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_open_bounds() {
        let interval = Interval::new(10, 20);
        assert_eq!(interval.length(), 10);
        assert!(interval.contains(10));
        assert!(interval.contains(19));
        assert!(!interval.contains(20));
        assert!(!interval.contains(9));
    }

    #[test]
    fn test_touching_intervals_do_not_overlap() {
        let a = Interval::new(10, 20);
        let b = Interval::new(20, 30);
        assert!(!a.overlaps(&b));
        assert_eq!(a.intersection(&b), None);
        assert_eq!(
            a.intersection(&Interval::new(15, 40)),
            Some(Interval::new(15, 20))
        );
    }
}
