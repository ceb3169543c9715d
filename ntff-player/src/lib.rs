//! NTFF Player Library
//!
//! Plays the kept intervals of an annotated project as one continuous
//! stream. Provides:
//! - Output virtualization: timestamp rewriting, one output stream per kind
//!   and duplicate/gap detection
//! - Background preparation of the next interval on a shadow session
//! - The playback controller and its settings hand-off

pub mod arena;
pub mod controller;
pub mod frame_tracker;
pub mod media;
pub mod prefetch;
pub mod recording;
pub mod selection;
pub mod source;
pub mod stream_registry;
pub mod synthetic;
pub mod virtual_sink;

pub use controller::{Controller, HostQuery, HostReply, PlaybackState, PlaybackStats};
pub use media::{
    Block, BlockFlags, DemuxSession, DemuxStatus, EsFormat, EsId, MediaBackend, SinkControl,
    StreamKind, StreamSink, Tick, TICKS_PER_SECOND,
};
pub use recording::{Recording, RecordingHandle, RecordingSink};
pub use selection::{SelectionHandle, SettingsPanel};
pub use synthetic::{SyntheticBackend, SyntheticMedia};
pub use virtual_sink::{Segment, SinkStats, VirtualSink};

use ntff_core::FrameId;
use std::path::PathBuf;

/// Result type for player operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for player operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core error: {0}")]
    Core(#[from] ntff_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to open source {}: {reason}", path.display())]
    SourceOpen { path: PathBuf, reason: String },

    #[error("Media error: {0}")]
    Media(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("No source covers frame {0}")]
    NoSourceFor(FrameId),

    #[error("Session of source {0} is not available")]
    SessionUnavailable(usize),

    #[error("Prefetch cancelled")]
    PrefetchCancelled,

    #[error("Source ended before the prefetch target")]
    PrefetchEnded,
}

impl Error {
    /// Wraps an error raised by a media backend
    pub fn media(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Media(err.into())
    }
}

/// Player configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerConfig {
    /// Prepare the next interval on the shadow session
    pub prefetch: bool,
    /// Frame indices kept for duplicate and gap detection
    pub duplicate_window: usize,
    /// Halt before the first frame until the settings round resolves
    pub settings_on_open: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            prefetch: true,
            duplicate_window: frame_tracker::DEFAULT_WINDOW,
            settings_on_open: false,
        }
    }
}
