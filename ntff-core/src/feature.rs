//! Annotation features and the feature list

use crate::interval::Interval;
use crate::interval_set::IntervalSet;
use crate::selection::{CombineMode, EditAction, SelectionRequest};
use crate::{Error, Result};
use std::collections::BTreeSet;

/// A named annotation track contributing intervals with an intensity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    name: String,
    description: String,
    rec_min: i8,
    rec_max: i8,
    intervals: Vec<Interval>,
    active: bool,
    selected_min: i8,
    selected_max: i8,
    inverted: bool,
    affect_unmarked: bool,
}

impl Feature {
    /// Creates an active feature whose selection starts at the recommended band
    pub fn new(name: &str, description: &str, rec_min: i8, rec_max: i8) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            rec_min,
            rec_max,
            intervals: Vec::new(),
            active: true,
            selected_min: rec_min,
            selected_max: rec_max,
            inverted: false,
            affect_unmarked: false,
        }
    }

    pub fn append_interval(&mut self, interval: Interval) {
        self.intervals.push(interval);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Recommended intensity band from the annotation
    pub fn recommended(&self) -> (i8, i8) {
        (self.rec_min, self.rec_max)
    }

    /// Distinct intensities present in the annotation, ascending
    pub fn intensities(&self) -> Vec<i8> {
        self.intervals
            .iter()
            .map(|interval| interval.intensity)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn active(&self) -> bool {
        self.active
    }

    /// Currently selected inclusive intensity band
    pub fn selection(&self) -> (i8, i8) {
        (self.selected_min, self.selected_max)
    }

    pub fn inverted(&self) -> bool {
        self.inverted
    }

    pub fn affects_unmarked(&self) -> bool {
        self.affect_unmarked
    }

    /// True when this feature selects `interval`.
    ///
    /// The interval's intensity must fall in the selected band; an inverted
    /// feature selects the intensities outside it instead.
    pub fn is_active(&self, interval: &Interval) -> bool {
        let in_band =
            interval.intensity >= self.selected_min && interval.intensity <= self.selected_max;
        in_band != self.inverted
    }

    /// Intervals this feature currently selects
    pub fn selected_intervals(&self) -> impl Iterator<Item = &Interval> + '_ {
        self.intervals.iter().filter(|interval| self.is_active(interval))
    }

    /// Regions of `whole` the feature does not annotate at all
    pub fn unmarked(&self, whole: Interval) -> IntervalSet {
        self.intervals
            .iter()
            .copied()
            .collect::<IntervalSet>()
            .complement(whole)
    }

    /// Sets the selected band, returning whether it changed
    pub fn set_selected(&mut self, min: i8, max: i8) -> bool {
        let changed = (self.selected_min, self.selected_max) != (min, max);
        self.selected_min = min;
        self.selected_max = max;
        changed
    }

    /// Enables or disables the feature, returning whether it changed
    pub fn set_active(&mut self, active: bool) -> bool {
        let changed = self.active != active;
        self.active = active;
        changed
    }

    /// Makes the band name the removed intensities, returning whether it changed
    pub fn set_inverted(&mut self, inverted: bool) -> bool {
        let changed = self.inverted != inverted;
        self.inverted = inverted;
        changed
    }

    pub fn set_affect_unmarked(&mut self, affect: bool) -> bool {
        let changed = self.affect_unmarked != affect;
        self.affect_unmarked = affect;
        changed
    }
}

/// Ordered collection of features plus the global combination mode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureList {
    features: Vec<Feature>,
    mode: CombineMode,
}

impl FeatureList {
    pub fn new(mode: CombineMode) -> Self {
        Self {
            features: Vec::new(),
            mode,
        }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> + '_ {
        self.features.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Feature> {
        self.features.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Feature> {
        self.features.get_mut(index)
    }

    /// Finds a feature index by name
    pub fn position(&self, name: &str) -> Result<usize> {
        self.features
            .iter()
            .position(|feature| feature.name() == name)
            .ok_or_else(|| Error::UnknownFeatureName(name.to_string()))
    }

    pub fn mode(&self) -> CombineMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: CombineMode) -> bool {
        let changed = self.mode != mode;
        self.mode = mode;
        changed
    }

    /// Applies a confirmed selection, returning whether anything changed.
    ///
    /// Edits are validated before any feature is touched. Features no edit
    /// names are switched off under `SkipAll` and fully selected under
    /// `KeepAll`, so they neither add nor remove anything.
    pub fn apply(&mut self, request: &SelectionRequest) -> Result<bool> {
        for edit in &request.edits {
            if edit.feature >= self.features.len() {
                return Err(Error::UnknownFeature(edit.feature));
            }
            if edit.min > edit.max {
                return Err(Error::InvalidBand {
                    min: edit.min,
                    max: edit.max,
                });
            }
        }

        let mode = CombineMode::from(request.base);
        let mut changed = self.set_mode(mode);
        let mut touched = vec![false; self.features.len()];

        for edit in &request.edits {
            let feature = &mut self.features[edit.feature];
            changed |= feature.set_active(true);
            changed |= feature.set_selected(edit.min, edit.max);
            changed |= feature.set_inverted(edit.action == EditAction::Remove);
            changed |= feature.set_affect_unmarked(edit.affect_unmarked);
            touched[edit.feature] = true;
        }

        for (feature, touched) in self.features.iter_mut().zip(touched) {
            if touched {
                continue;
            }
            match mode {
                CombineMode::MarkedOnly => changed |= feature.set_active(false),
                CombineMode::Complement => {
                    changed |= feature.set_active(true);
                    changed |= feature.set_selected(i8::MIN, i8::MAX);
                    changed |= feature.set_inverted(false);
                    changed |= feature.set_affect_unmarked(false);
                }
            }
        }

        Ok(changed)
    }
}

impl FromIterator<Feature> for FeatureList {
    fn from_iter<T: IntoIterator<Item = Feature>>(iter: T) -> Self {
        Self {
            features: iter.into_iter().collect(),
            mode: CombineMode::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::{BaseMode, FeatureEdit};

    fn violence() -> Feature {
        let mut feature = Feature::new("violence", "Fights and blood", 2, 5);
        feature.append_interval(Interval::with_intensity(0, 10, 1));
        feature.append_interval(Interval::with_intensity(20, 30, 4));
        feature.append_interval(Interval::with_intensity(40, 50, 4));
        feature
    }

    #[test]
    fn test_selection_band() {
        let mut feature = violence();
        assert_eq!(feature.intensities(), vec![1, 4]);
        assert_eq!(feature.selected_intervals().count(), 2);

        assert!(feature.set_selected(0, 1));
        assert!(!feature.set_selected(0, 1));
        let selected: Vec<_> = feature.selected_intervals().map(|i| i.start).collect();
        assert_eq!(selected, vec![0]);

        assert!(feature.set_inverted(true));
        let selected: Vec<_> = feature.selected_intervals().map(|i| i.start).collect();
        assert_eq!(selected, vec![20, 40]);
    }

    #[test]
    fn test_unmarked_regions() {
        let feature = violence();
        let gaps: Vec<_> = feature
            .unmarked(Interval::new(0, 60))
            .iter()
            .map(|i| (i.start, i.end))
            .collect();
        assert_eq!(gaps, vec![(10, 20), (30, 40), (50, 60)]);
    }

    #[test]
    fn test_apply_request() {
        let mut list: FeatureList = [violence(), Feature::new("nudity", "", 0, 3)]
            .into_iter()
            .collect();
        let request = SelectionRequest::new(BaseMode::SkipAll)
            .with_edit(FeatureEdit::new(0, EditAction::Remove, 3, 5));

        assert!(list.apply(&request).unwrap());
        assert_eq!(list.mode(), CombineMode::MarkedOnly);
        let violence = list.get(0).unwrap();
        assert!(violence.active() && violence.inverted());
        assert_eq!(violence.selection(), (3, 5));
        assert!(!list.get(1).unwrap().active());

        assert!(!list.apply(&request).unwrap());
    }

    #[test]
    fn test_apply_rejects_bad_edits() {
        let mut list: FeatureList = [violence()].into_iter().collect();
        let before = list.clone();

        let request = SelectionRequest::new(BaseMode::KeepAll)
            .with_edit(FeatureEdit::new(0, EditAction::Add, 0, 9))
            .with_edit(FeatureEdit::new(3, EditAction::Add, 0, 1));
        assert!(matches!(list.apply(&request), Err(Error::UnknownFeature(3))));

        let request = SelectionRequest::new(BaseMode::KeepAll)
            .with_edit(FeatureEdit::new(0, EditAction::Add, 5, 1));
        assert!(matches!(list.apply(&request), Err(Error::InvalidBand { .. })));
        assert_eq!(list, before);
    }
}
