//! Project manifest: source files and feature annotations on one frame axis

use crate::feature::{Feature, FeatureList};
use crate::interval::{FrameId, Interval};
use crate::selection::CombineMode;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One physical file placed on the global frame axis
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceEntry {
    /// Frames of the global axis this file provides
    pub placement: Interval,
    /// Path of the media file
    pub path: PathBuf,
}

/// Annotation track as delivered by the annotation parser
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureEntry {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
    /// Lowest recommended intensity
    #[cfg_attr(feature = "serde", serde(default))]
    pub rec_min: i8,
    /// Highest recommended intensity
    #[cfg_attr(feature = "serde", serde(default = "default_rec_max"))]
    pub rec_max: i8,
    pub intervals: Vec<Interval>,
}

#[cfg(feature = "serde")]
fn default_rec_max() -> i8 {
    i8::MAX
}

/// Complete project: frame rate, sources and features
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Project {
    /// Frames per second of the global axis
    pub fps: f64,
    /// Length of the global axis in frames (0 = end of the last source)
    #[cfg_attr(feature = "serde", serde(default))]
    pub duration: FrameId,
    /// How features combine before the settings panel is confirmed
    #[cfg_attr(feature = "serde", serde(default))]
    pub mode: CombineMode,
    pub sources: Vec<SourceEntry>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub features: Vec<FeatureEntry>,
}

impl Project {
    /// Creates an empty project
    pub fn new(fps: f64) -> Self {
        Self {
            fps,
            duration: 0,
            mode: CombineMode::default(),
            sources: Vec::new(),
            features: Vec::new(),
        }
    }

    /// Appends a source file placed on `placement`
    pub fn add_source(&mut self, placement: Interval, path: impl Into<PathBuf>) {
        self.sources.push(SourceEntry {
            placement,
            path: path.into(),
        });
    }

    /// Appends an annotation track
    pub fn add_feature(&mut self, feature: FeatureEntry) {
        self.features.push(feature);
    }

    /// Length of the global axis in frames
    pub fn whole_duration(&self) -> FrameId {
        if self.duration > 0 {
            return self.duration;
        }
        self.sources
            .iter()
            .map(|source| source.placement.end)
            .max()
            .unwrap_or(0)
    }

    /// Duration of one frame in microseconds
    pub fn frame_duration_us(&self) -> f64 {
        1_000_000.0 / self.fps
    }

    /// Frames of the global axis each source provides
    pub fn placements(&self) -> Vec<Interval> {
        self.sources.iter().map(|source| source.placement).collect()
    }

    /// Builds the feature list with every feature at its recommended band
    pub fn feature_list(&self) -> FeatureList {
        let mut list = FeatureList::new(self.mode);
        for entry in &self.features {
            let mut feature =
                Feature::new(&entry.name, &entry.description, entry.rec_min, entry.rec_max);
            for interval in &entry.intervals {
                feature.append_interval(*interval);
            }
            list.push(feature);
        }
        list
    }

    /// Checks the frame rate, source placements and feature intervals
    pub fn validate(&self) -> Result<()> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(Error::InvalidFrameRate(self.fps));
        }
        if self.sources.is_empty() {
            return Err(Error::NoSources);
        }

        let mut prev_end = FrameId::MIN;
        for source in &self.sources {
            let placement = source.placement;
            if placement.is_empty() || placement.start < prev_end {
                return Err(Error::InvalidInterval {
                    start: placement.start,
                    end: placement.end,
                });
            }
            prev_end = placement.end;
        }

        for feature in &self.features {
            if let Some(bad) = feature.intervals.iter().find(|i| i.start > i.end) {
                return Err(Error::InvalidInterval {
                    start: bad.start,
                    end: bad.end,
                });
            }
        }
        Ok(())
    }

    /// Resolves relative or moved source paths against `base_dir`.
    ///
    /// Tries the path as given, then relative to `base_dir`, then the bare
    /// file name and finally `<last directory>/<file name>` inside `base_dir`.
    pub fn resolve_sources(&mut self, base_dir: &Path) -> Result<()> {
        for source in &mut self.sources {
            let resolved = candidate_paths(&source.path, base_dir)
                .into_iter()
                .find(|candidate| candidate.is_file())
                .ok_or_else(|| Error::SourceNotFound(source.path.clone()))?;
            debug!(from = %source.path.display(), to = %resolved.display(), "source resolved");
            source.path = resolved;
        }
        Ok(())
    }

    /// Reads a project manifest from JSON
    #[cfg(feature = "serde")]
    pub fn read<R: std::io::Read>(reader: R) -> Result<Self> {
        let project: Project = serde_json::from_reader(reader)?;
        project.validate()?;
        Ok(project)
    }

    /// Writes the project manifest as JSON
    #[cfg(feature = "serde")]
    pub fn write<W: std::io::Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Loads a manifest file and resolves its sources next to it
    #[cfg(feature = "serde")]
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut project = Self::read(std::io::BufReader::new(file))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        project.resolve_sources(base_dir)?;
        Ok(project)
    }
}

fn candidate_paths(path: &Path, base_dir: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![path.to_path_buf()];
    if path.is_relative() {
        candidates.push(base_dir.join(path));
    }
    if let Some(name) = path.file_name() {
        candidates.push(base_dir.join(name));
        let parent = path.parent().and_then(Path::file_name);
        if let Some(dir) = parent {
            candidates.push(base_dir.join(dir).join(name));
        }
    }
    candidates
}
