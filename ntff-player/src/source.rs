//! Source files placed on the global frame axis

use crate::arena::DecoderArena;
use crate::media::{DemuxSession, MediaBackend, Tick};
use crate::{Error, Result};
use ntff_core::{FrameId, Interval, Project};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One physical file with its two sessions
#[derive(Debug)]
pub struct SourceItem<S> {
    placement: Interval,
    path: PathBuf,
    frame_duration: f64,
    sessions: DecoderArena<S>,
}

impl<S: DemuxSession> SourceItem<S> {
    /// Opens the live and shadow sessions of `path`
    pub fn open<B>(backend: &B, placement: Interval, path: &Path, fps: f64) -> Result<Self>
    where
        B: MediaBackend<Session = S>,
    {
        let open = |path: &Path| {
            backend.open(path).map_err(|err| Error::SourceOpen {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })
        };
        let live = open(path)?;
        let shadow = open(path)?;

        let rate = live.frame_rate();
        let rate = if rate.is_finite() && rate > 0.0 {
            rate
        } else {
            warn!(path = %path.display(), "source reports no frame rate, using project rate");
            fps
        };
        info!(
            path = %path.display(),
            start = placement.start,
            end = placement.end,
            fps = rate,
            "source opened"
        );

        Ok(Self {
            placement,
            path: path.to_path_buf(),
            frame_duration: 1_000_000.0 / rate,
            sessions: DecoderArena::new(live, shadow),
        })
    }

    pub fn placement(&self) -> Interval {
        self.placement
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frame duration of the file in microseconds
    pub fn frame_duration(&self) -> f64 {
        self.frame_duration
    }

    /// File-local time of the global `frame`
    pub fn local_time(&self, frame: FrameId) -> Tick {
        ((frame - self.placement.start) as f64 * self.frame_duration).round() as Tick
    }

    pub fn sessions_mut(&mut self) -> &mut DecoderArena<S> {
        &mut self.sessions
    }
}

/// All source files of a project, ordered by placement
#[derive(Debug)]
pub struct SourceRegistry<S> {
    items: Vec<SourceItem<S>>,
}

impl<S: DemuxSession> SourceRegistry<S> {
    /// Opens every source of `project`; any failure aborts the open
    pub fn open<B>(backend: &B, project: &Project) -> Result<Self>
    where
        B: MediaBackend<Session = S>,
    {
        let items = project
            .sources
            .iter()
            .map(|entry| SourceItem::open(backend, entry.placement, &entry.path, project.fps))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { items })
    }

    /// Index of the source whose placement holds `frame`
    pub fn find(&self, frame: FrameId) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.placement.contains(frame))
    }

    pub fn get(&self, index: usize) -> Option<&SourceItem<S>> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut SourceItem<S>> {
        self.items.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceItem<S>> + '_ {
        self.items.iter()
    }
}
