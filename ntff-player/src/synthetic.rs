//! In-memory media backend generating numbered frames

use crate::media::{
    Block, BlockFlags, DemuxSession, DemuxStatus, EsFormat, EsId, MediaBackend, SinkControl,
    StreamKind, StreamSink, Tick,
};
use crate::{Error, Result};
use ntff_core::{FrameId, Project};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shape of one generated file
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticMedia {
    pub fps: f64,
    pub frames: FrameId,
    /// Keyframe spacing; seeks land on the keyframe at or before the target
    pub gop: FrameId,
    pub audio: bool,
}

impl SyntheticMedia {
    pub fn new(fps: f64, frames: FrameId) -> Self {
        Self {
            fps,
            frames,
            gop: 1,
            audio: true,
        }
    }

    pub fn with_gop(mut self, gop: FrameId) -> Self {
        self.gop = gop.max(1);
        self
    }

    pub fn without_audio(mut self) -> Self {
        self.audio = false;
        self
    }

    fn frame_duration(&self) -> f64 {
        1_000_000.0 / self.fps
    }
}

/// Counters shared by a backend and its sessions
#[derive(Debug, Default)]
pub struct SyntheticCounters {
    pub opens: AtomicU64,
    pub seeks: AtomicU64,
    pub steps: AtomicU64,
}

/// Backend serving [`SyntheticMedia`] by path
#[derive(Debug, Clone, Default)]
pub struct SyntheticBackend {
    media: HashMap<PathBuf, SyntheticMedia>,
    counters: Arc<SyntheticCounters>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with one file per project source, sized to its placement
    pub fn for_project(project: &Project) -> Self {
        let mut backend = Self::new();
        for source in &project.sources {
            backend.insert(
                &source.path,
                SyntheticMedia::new(project.fps, source.placement.length()),
            );
        }
        backend
    }

    pub fn with_media(mut self, path: impl AsRef<Path>, media: SyntheticMedia) -> Self {
        self.insert(path, media);
        self
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, media: SyntheticMedia) {
        self.media.insert(path.as_ref().to_path_buf(), media);
    }

    pub fn counters(&self) -> Arc<SyntheticCounters> {
        Arc::clone(&self.counters)
    }
}

impl MediaBackend for SyntheticBackend {
    type Session = SyntheticSession;

    fn open(&self, path: &Path) -> Result<SyntheticSession> {
        let media = self
            .media
            .get(path)
            .cloned()
            .ok_or_else(|| Error::media(format!("no media at {}", path.display())))?;
        self.counters.opens.fetch_add(1, Ordering::Relaxed);
        Ok(SyntheticSession {
            media,
            next: 0,
            streams: Vec::new(),
            counters: Arc::clone(&self.counters),
        })
    }
}

/// Session emitting one video block, and optionally one audio block, per step.
///
/// Video payloads carry the file-local frame number as little-endian bytes.
#[derive(Debug)]
pub struct SyntheticSession {
    media: SyntheticMedia,
    next: FrameId,
    streams: Vec<(EsId, EsFormat)>,
    counters: Arc<SyntheticCounters>,
}

impl SyntheticSession {
    fn frame_time(&self, frame: FrameId) -> Tick {
        (frame as f64 * self.media.frame_duration()).round() as Tick
    }

    fn declare(&mut self, sink: &mut dyn StreamSink) -> Result<()> {
        let video = EsFormat::new(StreamKind::Video, "raw");
        self.streams.push((sink.add_stream(&video)?, video));
        if self.media.audio {
            let audio = EsFormat::new(StreamKind::Audio, "pcm_s16le");
            self.streams.push((sink.add_stream(&audio)?, audio));
        }
        Ok(())
    }
}

impl DemuxSession for SyntheticSession {
    fn frame_rate(&self) -> f64 {
        self.media.fps
    }

    fn duration(&self) -> Tick {
        self.frame_time(self.media.frames)
    }

    fn time(&self) -> Tick {
        self.frame_time(self.next)
    }

    fn seek(&mut self, time: Tick, _precise: bool) -> Result<()> {
        let target = (time as f64 / self.media.frame_duration()).round() as FrameId;
        let target = target.clamp(0, self.media.frames);
        self.next = target - target % self.media.gop;
        self.counters.seeks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn demux(&mut self, sink: &mut dyn StreamSink) -> Result<DemuxStatus> {
        if self.streams.is_empty() {
            self.declare(sink)?;
        }
        if self.next >= self.media.frames {
            return Ok(DemuxStatus::Eof);
        }

        let time = self.frame_time(self.next);
        let duration = self.frame_time(self.next + 1) - time;
        let flags = if self.next % self.media.gop == 0 {
            BlockFlags::KEYFRAME
        } else {
            BlockFlags::NONE
        };
        let blocks: Vec<_> = self
            .streams
            .iter()
            .map(|(id, format)| {
                let payload = match format.kind {
                    StreamKind::Video => self.next.to_le_bytes().to_vec(),
                    _ => vec![0; 4],
                };
                let block = Block {
                    pts: Some(time),
                    dts: Some(time),
                    duration,
                    flags,
                    payload,
                };
                (*id, block)
            })
            .collect();
        for (id, block) in blocks {
            sink.send_frame(id, block)?;
        }
        sink.control(SinkControl::SetPcr(time))?;

        self.next += 1;
        self.counters.steps.fetch_add(1, Ordering::Relaxed);
        Ok(DemuxStatus::Continue)
    }

    fn streams(&self) -> Vec<(EsId, EsFormat)> {
        self.streams.clone()
    }
}

/// File-local frame number carried by a synthetic video block
pub fn frame_number(block: &Block) -> Option<FrameId> {
    let bytes: [u8; 8] = block.payload.as_slice().try_into().ok()?;
    Some(FrameId::from_le_bytes(bytes))
}
