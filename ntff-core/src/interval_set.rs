//! Ordered, non-overlapping interval map with union and subtraction

use crate::interval::{FrameId, Interval};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

/// Sorted map of mutually non-overlapping intervals keyed by their start frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSet {
    entries: BTreeMap<FrameId, Interval>,
}

impl IntervalSet {
    /// Creates an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set covering exactly `interval`
    pub fn covering(interval: Interval) -> Self {
        let mut set = Self::new();
        set.insert(interval);
        set
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the set covers nothing
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in start order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Interval> + '_ {
        self.entries.values()
    }

    /// Returns the entry keyed by `start`
    pub fn get(&self, start: FrameId) -> Option<&Interval> {
        self.entries.get(&start)
    }

    /// First entry of the set
    pub fn first(&self) -> Option<&Interval> {
        self.entries.values().next()
    }

    /// Sum of all entry lengths
    pub fn total_length(&self) -> FrameId {
        self.entries.values().map(Interval::length).sum()
    }

    /// Adds `interval` to the covered frames (set union).
    ///
    /// Entries that overlap or touch the new range are absorbed into a single
    /// entry keyed by the widened start. The merged intensity is the maximum
    /// of all contributors.
    pub fn insert(&mut self, interval: Interval) {
        if interval.is_empty() {
            return;
        }

        let mut merged = interval;
        let prev = self
            .entries
            .range(..=interval.start)
            .next_back()
            .map(|(_, entry)| *entry);
        if let Some(prev) = prev {
            if prev.end >= interval.start {
                merged.start = prev.start;
            }
        }

        let absorbed: Vec<FrameId> = self
            .entries
            .range(merged.start..=interval.end)
            .map(|(start, _)| *start)
            .collect();
        for start in absorbed {
            if let Some(entry) = self.entries.remove(&start) {
                merged.end = merged.end.max(entry.end);
                merged.intensity = merged.intensity.max(entry.intensity);
            }
        }

        self.entries.insert(merged.start, merged);
    }

    /// Removes `interval` from the covered frames (set subtraction).
    ///
    /// An entry strictly containing the removed range is split in two and the
    /// operation stops there; otherwise the entry holding `interval.start` is
    /// truncated, entries inside the range are erased, and an entry straddling
    /// `interval.end` keeps only its tail.
    pub fn remove(&mut self, interval: Interval) {
        if interval.is_empty() || self.entries.is_empty() {
            return;
        }

        let head = self
            .entries
            .range(..=interval.start)
            .next_back()
            .map(|(_, entry)| *entry);
        if let Some(head) = head {
            if head.end > interval.start {
                self.entries.remove(&head.start);
                let left = Interval {
                    end: interval.start,
                    ..head
                };
                if !left.is_empty() {
                    self.entries.insert(left.start, left);
                }
                if head.end > interval.end {
                    let right = Interval {
                        start: interval.end,
                        ..head
                    };
                    self.entries.insert(right.start, right);
                    return;
                }
            }
        }

        let affected: Vec<Interval> = self
            .entries
            .range(interval.start..interval.end)
            .map(|(_, entry)| *entry)
            .collect();
        for entry in affected {
            self.entries.remove(&entry.start);
            if entry.end > interval.end {
                let tail = Interval {
                    start: interval.end,
                    ..entry
                };
                self.entries.insert(tail.start, tail);
            }
        }
    }

    /// Returns the frames of `whole` that this set does not cover
    pub fn complement(&self, whole: Interval) -> IntervalSet {
        let mut gaps = IntervalSet::new();
        let mut cursor = whole.start;
        for entry in self.entries.values() {
            if entry.end <= whole.start {
                continue;
            }
            if entry.start >= whole.end {
                break;
            }
            if entry.start > cursor {
                gaps.entries
                    .insert(cursor, Interval::new(cursor, entry.start));
            }
            cursor = cursor.max(entry.end);
        }
        if cursor < whole.end {
            gaps.entries.insert(cursor, Interval::new(cursor, whole.end));
        }
        gaps
    }

    /// Splits the entry strictly containing `frame` into two touching entries.
    ///
    /// The halves stay separate until a later `insert` touches them.
    pub fn split_at(&mut self, frame: FrameId) {
        let Some(entry) = self.find_containing(frame).copied() else {
            return;
        };
        if entry.start == frame {
            return;
        }
        self.entries.insert(
            entry.start,
            Interval {
                end: frame,
                ..entry
            },
        );
        self.entries.insert(
            frame,
            Interval {
                start: frame,
                ..entry
            },
        );
    }

    /// Returns the entry covering `frame`
    pub fn find_containing(&self, frame: FrameId) -> Option<&Interval> {
        self.entries
            .range(..=frame)
            .next_back()
            .map(|(_, entry)| entry)
            .filter(|entry| entry.contains(frame))
    }

    /// Returns the entry covering `frame`, or the first one starting after it
    pub fn first_at_or_after(&self, frame: FrameId) -> Option<&Interval> {
        self.find_containing(frame).or_else(|| {
            self.entries
                .range((Excluded(frame), Unbounded))
                .next()
                .map(|(_, entry)| entry)
        })
    }

    /// Returns the entry following the one keyed by `start`
    pub fn next_after(&self, start: FrameId) -> Option<&Interval> {
        self.entries
            .range((Excluded(start), Unbounded))
            .next()
            .map(|(_, entry)| entry)
    }

    /// Number of covered frames strictly before the entry keyed by `start`
    pub fn length_before(&self, start: FrameId) -> FrameId {
        self.entries
            .range(..start)
            .map(|(_, entry)| entry.length())
            .sum()
    }

    /// Checks that keys match starts and entries are sorted, non-empty and disjoint
    pub fn is_normalized(&self) -> bool {
        let mut prev_end: Option<FrameId> = None;
        for (start, entry) in &self.entries {
            if *start != entry.start || entry.is_empty() {
                return false;
            }
            if prev_end.is_some_and(|end| end > entry.start) {
                return false;
            }
            prev_end = Some(entry.end);
        }
        true
    }
}

impl FromIterator<Interval> for IntervalSet {
    fn from_iter<T: IntoIterator<Item = Interval>>(iter: T) -> Self {
        let mut set = IntervalSet::new();
        for interval in iter {
            set.insert(interval);
        }
        set
    }
}

impl<'a> IntoIterator for &'a IntervalSet {
    type Item = &'a Interval;
    type IntoIter = btree_map::Values<'a, FrameId, Interval>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(set: &IntervalSet) -> Vec<(FrameId, FrameId)> {
        set.iter().map(|i| (i.start, i.end)).collect()
    }

    #[test]
    fn test_merge_overlapping() {
        let mut set = IntervalSet::new();
        set.insert(Interval::new(10, 20));
        set.insert(Interval::new(15, 25));
        assert_eq!(ranges(&set), vec![(10, 25)]);
    }

    #[test]
    fn test_merge_touching() {
        let mut set = IntervalSet::covering(Interval::new(10, 20));
        set.insert(Interval::new(20, 30));
        assert_eq!(ranges(&set), vec![(10, 30)]);

        let mut set = IntervalSet::covering(Interval::new(20, 30));
        set.insert(Interval::new(10, 20));
        assert_eq!(ranges(&set), vec![(10, 30)]);
    }

    #[test]
    fn test_insert_spanning_several_entries() {
        let mut set: IntervalSet = [(0, 5), (10, 15), (20, 25), (40, 50)]
            .into_iter()
            .map(|(a, b)| Interval::new(a, b))
            .collect();
        set.insert(Interval::new(3, 22));
        assert_eq!(ranges(&set), vec![(0, 25), (40, 50)]);
    }

    #[test]
    fn test_insert_inside_existing_entry() {
        let mut set = IntervalSet::covering(Interval::new(0, 100));
        set.insert(Interval::new(10, 20));
        assert_eq!(ranges(&set), vec![(0, 100)]);
    }

    #[test]
    fn test_merged_intensity_is_maximum() {
        let mut set = IntervalSet::new();
        set.insert(Interval::with_intensity(0, 10, 2));
        set.insert(Interval::with_intensity(5, 15, 7));
        set.insert(Interval::with_intensity(12, 20, 3));
        assert_eq!(set.first().map(|i| i.intensity), Some(7));
    }

    #[test]
    fn test_split_on_removal() {
        let mut set = IntervalSet::covering(Interval::new(10, 30));
        set.remove(Interval::new(15, 20));
        assert_eq!(ranges(&set), vec![(10, 15), (20, 30)]);
    }

    #[test]
    fn test_remove_across_entries() {
        let mut set: IntervalSet = [(0, 10), (20, 30), (40, 50)]
            .into_iter()
            .map(|(a, b)| Interval::new(a, b))
            .collect();
        set.remove(Interval::new(5, 45));
        assert_eq!(ranges(&set), vec![(0, 5), (45, 50)]);
    }

    #[test]
    fn test_remove_exact_entry_and_gap() {
        let mut set: IntervalSet = [(0, 10), (20, 30)]
            .into_iter()
            .map(|(a, b)| Interval::new(a, b))
            .collect();
        set.remove(Interval::new(0, 10));
        assert_eq!(ranges(&set), vec![(20, 30)]);
        set.remove(Interval::new(12, 18));
        assert_eq!(ranges(&set), vec![(20, 30)]);
        set.remove(Interval::new(15, 20));
        assert_eq!(ranges(&set), vec![(20, 30)]);
    }

    #[test]
    fn test_empty_inputs_are_noops() {
        let mut set = IntervalSet::new();
        set.remove(Interval::new(0, 10));
        assert!(set.is_empty());
        set.insert(Interval::new(5, 5));
        assert!(set.is_empty());

        let mut set = IntervalSet::covering(Interval::new(0, 10));
        set.remove(Interval::new(4, 4));
        assert_eq!(ranges(&set), vec![(0, 10)]);
    }

    #[test]
    fn test_complement_within_whole() {
        let set: IntervalSet = [(10, 20), (30, 40)]
            .into_iter()
            .map(|(a, b)| Interval::new(a, b))
            .collect();
        let gaps = set.complement(Interval::new(0, 50));
        assert_eq!(ranges(&gaps), vec![(0, 10), (20, 30), (40, 50)]);

        let gaps = set.complement(Interval::new(15, 35));
        assert_eq!(ranges(&gaps), vec![(20, 30)]);

        let gaps = IntervalSet::new().complement(Interval::new(0, 8));
        assert_eq!(ranges(&gaps), vec![(0, 8)]);
    }

    #[test]
    fn test_split_at_keeps_coverage() {
        let mut set = IntervalSet::covering(Interval::new(0, 100));
        set.split_at(40);
        set.split_at(0);
        set.split_at(150);
        assert_eq!(ranges(&set), vec![(0, 40), (40, 100)]);
        assert!(set.is_normalized());
        assert_eq!(set.total_length(), 100);
    }

    #[test]
    fn test_lookup_helpers() {
        let set: IntervalSet = [(0, 100), (150, 200)]
            .into_iter()
            .map(|(a, b)| Interval::new(a, b))
            .collect();
        assert_eq!(set.find_containing(99).map(|i| i.start), Some(0));
        assert_eq!(set.find_containing(120), None);
        assert_eq!(set.first_at_or_after(120).map(|i| i.start), Some(150));
        assert_eq!(set.first_at_or_after(200), None);
        assert_eq!(set.next_after(0).map(|i| i.start), Some(150));
        assert_eq!(set.length_before(150), 100);
    }
}
