//! Selection requests exchanged with the settings panel

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// How features combine into the kept timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CombineMode {
    /// Keep only intervals selected by an active feature
    MarkedOnly,
    /// Keep everything except marked intervals that are not selected
    #[default]
    Complement,
}

/// Starting point the settings panel applies its edits to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseMode {
    /// Everything plays unless an edit removes it
    KeepAll,
    /// Nothing plays unless an edit adds it
    SkipAll,
}

impl From<BaseMode> for CombineMode {
    fn from(base: BaseMode) -> Self {
        match base {
            BaseMode::KeepAll => CombineMode::Complement,
            BaseMode::SkipAll => CombineMode::MarkedOnly,
        }
    }
}

/// What an edit does with the intervals inside its band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditAction {
    Add,
    Remove,
}

/// Threshold comparison offered by the settings panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Less,
    Greater,
    LessEq,
    GreaterEq,
}

impl Comparison {
    /// Converts `<op> value` into an inclusive intensity band
    pub fn band(self, value: i8) -> Result<(i8, i8)> {
        let band = match self {
            Comparison::Less => (i8::MIN, value.checked_sub(1).ok_or(Error::EmptyBand)?),
            Comparison::Greater => (value.checked_add(1).ok_or(Error::EmptyBand)?, i8::MAX),
            Comparison::LessEq => (i8::MIN, value),
            Comparison::GreaterEq => (value, i8::MAX),
        };
        Ok(band)
    }
}

impl FromStr for Comparison {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "<" => Ok(Comparison::Less),
            ">" => Ok(Comparison::Greater),
            "<=" | "≤" => Ok(Comparison::LessEq),
            ">=" | "≥" => Ok(Comparison::GreaterEq),
            other => Err(Error::InvalidComparison(other.to_string())),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Comparison::Less => "<",
            Comparison::Greater => ">",
            Comparison::LessEq => "<=",
            Comparison::GreaterEq => ">=",
        };
        f.write_str(op)
    }
}

/// One feature rule confirmed in the settings panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureEdit {
    /// Index of the feature in the feature list
    pub feature: usize,
    pub action: EditAction,
    /// Lowest intensity the rule applies to
    pub min: i8,
    /// Highest intensity the rule applies to
    pub max: i8,
    /// Whether regions the feature does not annotate follow the rule too
    pub affect_unmarked: bool,
}

impl FeatureEdit {
    /// Creates an edit covering an explicit intensity band
    pub fn new(feature: usize, action: EditAction, min: i8, max: i8) -> Self {
        Self {
            feature,
            action,
            min,
            max,
            affect_unmarked: false,
        }
    }

    /// Creates an edit from a threshold comparison such as `>= 3`
    pub fn compare(
        feature: usize,
        action: EditAction,
        comparison: Comparison,
        value: i8,
    ) -> Result<Self> {
        let (min, max) = comparison.band(value)?;
        Ok(Self::new(feature, action, min, max))
    }

    /// Marks the edit as also applying to unannotated regions
    pub fn affecting_unmarked(mut self, affect: bool) -> Self {
        self.affect_unmarked = affect;
        self
    }
}

/// Full result of a confirmed settings dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRequest {
    pub base: BaseMode,
    pub edits: Vec<FeatureEdit>,
}

impl SelectionRequest {
    /// Creates a request with no feature rules
    pub fn new(base: BaseMode) -> Self {
        Self {
            base,
            edits: Vec::new(),
        }
    }

    /// Appends a feature rule
    pub fn with_edit(mut self, edit: FeatureEdit) -> Self {
        self.edits.push(edit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_bands() {
        assert_eq!(Comparison::GreaterEq.band(3).unwrap(), (3, i8::MAX));
        assert_eq!(Comparison::Greater.band(3).unwrap(), (4, i8::MAX));
        assert_eq!(Comparison::Less.band(3).unwrap(), (i8::MIN, 2));
        assert_eq!(Comparison::LessEq.band(3).unwrap(), (i8::MIN, 3));
        assert!(Comparison::Less.band(i8::MIN).is_err());
    }

    #[test]
    fn test_comparison_parse() {
        assert_eq!(">=".parse::<Comparison>().unwrap(), Comparison::GreaterEq);
        assert_eq!("≤".parse::<Comparison>().unwrap(), Comparison::LessEq);
        assert!("=".parse::<Comparison>().is_err());
    }
}
