//! NTFF Media Library
//!
//! FFmpeg-backed media sessions for the NTFF player.

pub mod ffmpeg_session;

pub use ffmpeg_session::{FfmpegBackend, FfmpegSession};

/// Result type for ntff-media operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ntff-media operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),

    #[error("No video stream found")]
    NoVideoStream,
}

impl From<Error> for ntff_player::Error {
    fn from(err: Error) -> Self {
        ntff_player::Error::media(err)
    }
}
