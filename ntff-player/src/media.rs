//! Interfaces of the media framework the player drives

use crate::Result;
use std::ops::BitOr;
use std::path::Path;

/// Time in microseconds
pub type Tick = i64;

/// Ticks in one second
pub const TICKS_PER_SECOND: Tick = 1_000_000;

/// Media kind of an elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    Other,
}

/// Elementary stream handle issued by a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EsId(pub u32);

/// Description of an elementary stream declared by a session
#[derive(Debug, Clone, PartialEq)]
pub struct EsFormat {
    pub kind: StreamKind,
    /// Codec name as reported by the demuxer
    pub codec: String,
    pub language: Option<String>,
}

impl EsFormat {
    pub fn new(kind: StreamKind, codec: &str) -> Self {
        Self {
            kind,
            codec: codec.to_string(),
            language: None,
        }
    }
}

/// Per-block flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockFlags(u32);

impl BlockFlags {
    pub const NONE: BlockFlags = BlockFlags(0);
    /// Decode but do not display
    pub const PREROLL: BlockFlags = BlockFlags(1);
    /// Timestamps jump before this block
    pub const DISCONTINUITY: BlockFlags = BlockFlags(1 << 1);
    /// Block starts a decodable picture group
    pub const KEYFRAME: BlockFlags = BlockFlags(1 << 2);

    pub fn contains(self, other: BlockFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: BlockFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: BlockFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for BlockFlags {
    type Output = BlockFlags;

    fn bitor(self, rhs: BlockFlags) -> BlockFlags {
        BlockFlags(self.0 | rhs.0)
    }
}

/// One unit of elementary-stream data
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    pub pts: Option<Tick>,
    pub dts: Option<Tick>,
    pub duration: Tick,
    pub flags: BlockFlags,
    pub payload: Vec<u8>,
}

impl Block {
    /// Timestamp the block is scheduled by: decode time, else presentation time
    pub fn timestamp(&self) -> Option<Tick> {
        self.dts.or(self.pts)
    }

    /// Moves both timestamps by `delta`
    pub fn shift(&mut self, delta: Tick) {
        self.pts = self.pts.map(|pts| pts + delta);
        self.dts = self.dts.map(|dts| dts + delta);
    }
}

/// Control requests a session sends to its sink
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SinkControl {
    /// Sets the program reference clock
    SetPcr(Tick),
    SetGroupPcr { group: i32, pcr: Tick },
    ResetPcr,
    SetNextDisplayTime(Tick),
    SetEsState { id: EsId, enabled: bool },
    /// Framework-specific request passed through untouched
    Custom(u32),
}

impl SinkControl {
    /// True for requests that steer the presentation clock
    pub fn is_clock(&self) -> bool {
        matches!(
            self,
            SinkControl::SetPcr(_)
                | SinkControl::SetGroupPcr { .. }
                | SinkControl::ResetPcr
                | SinkControl::SetNextDisplayTime(_)
        )
    }
}

/// Outcome of one demux step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxStatus {
    Continue,
    Eof,
}

/// Downstream consumer of elementary streams
pub trait StreamSink: Send {
    /// Declares a stream and returns the handle blocks are sent with
    fn add_stream(&mut self, format: &EsFormat) -> Result<EsId>;

    fn send_frame(&mut self, id: EsId, block: Block) -> Result<()>;

    fn remove_stream(&mut self, id: EsId);

    fn control(&mut self, request: SinkControl) -> Result<()>;
}

/// Demux/decode session over one opened source
pub trait DemuxSession: Send {
    /// Frames per second of the main video stream
    fn frame_rate(&self) -> f64;

    /// Source duration
    fn duration(&self) -> Tick;

    /// Source-local time of the next block
    fn time(&self) -> Tick;

    /// Repositions to source-local `time`
    fn seek(&mut self, time: Tick, precise: bool) -> Result<()>;

    /// Reads one step and pushes the resulting blocks into `sink`
    fn demux(&mut self, sink: &mut dyn StreamSink) -> Result<DemuxStatus>;

    /// Streams this session has declared, with the handles it sends them on
    fn streams(&self) -> Vec<(EsId, EsFormat)>;
}

/// Opens sessions over media files
pub trait MediaBackend {
    type Session: DemuxSession + 'static;

    fn open(&self, path: &Path) -> Result<Self::Session>;
}
