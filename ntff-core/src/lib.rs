//! NTFF Core Library
//!
//! This library provides the annotation model and the interval algebra that
//! turn a set of annotated features into the timeline of kept frames.

pub mod feature;
pub mod interval;
pub mod interval_set;
pub mod project;
pub mod selection;
pub mod timeline;

pub use feature::{Feature, FeatureList};
pub use interval::{FrameId, Interval};
pub use interval_set::IntervalSet;
pub use project::{FeatureEntry, Project, SourceEntry};
pub use selection::{
    BaseMode, CombineMode, Comparison, EditAction, FeatureEdit, SelectionRequest,
};
pub use timeline::PlayTimeline;

use std::path::PathBuf;

/// Result type for ntff-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ntff-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown feature index: {0}")]
    UnknownFeature(usize),

    #[error("Unknown feature: {0}")]
    UnknownFeatureName(String),

    #[error("Invalid intensity band: {min}..={max}")]
    InvalidBand { min: i8, max: i8 },

    #[error("Intensity comparison selects nothing")]
    EmptyBand,

    #[error("Invalid comparison operator: {0}")]
    InvalidComparison(String),

    #[error("Invalid interval: {start}..{end}")]
    InvalidInterval { start: FrameId, end: FrameId },

    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(f64),

    #[error("Project has no source files")]
    NoSources,

    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),
}
