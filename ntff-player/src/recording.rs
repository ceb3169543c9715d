//! Output sink that records everything it receives

use crate::media::{Block, BlockFlags, EsFormat, EsId, SinkControl, StreamKind, StreamSink, Tick};
use crate::Result;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Everything delivered to a [`RecordingSink`]
#[derive(Debug, Default)]
pub struct Recording {
    pub streams: Vec<(EsId, EsFormat)>,
    pub removed: Vec<EsId>,
    pub blocks: Vec<(EsId, Block)>,
    /// Clock values received through `SetPcr`
    pub pcr: Vec<Tick>,
    /// Other control requests
    pub controls: Vec<SinkControl>,
}

impl Recording {
    pub fn kind_of(&self, id: EsId) -> Option<StreamKind> {
        self.streams
            .iter()
            .find(|(declared, _)| *declared == id)
            .map(|(_, format)| format.kind)
    }

    /// Blocks delivered on streams of `kind`
    pub fn frames(&self, kind: StreamKind) -> impl Iterator<Item = &Block> + '_ {
        self.blocks
            .iter()
            .filter(move |(id, _)| self.kind_of(*id) == Some(kind))
            .map(|(_, block)| block)
    }

    /// Video frames meant for display, excluding preroll
    pub fn presented(&self) -> impl Iterator<Item = &Block> + '_ {
        self.frames(StreamKind::Video)
            .filter(|block| !block.flags.contains(BlockFlags::PREROLL))
    }

    /// True when presented video decode times strictly increase
    pub fn is_monotonic(&self) -> bool {
        let times: Vec<_> = self.presented().filter_map(|block| block.dts).collect();
        times.windows(2).all(|pair| pair[0] < pair[1])
    }
}

/// Shared view of a recording
#[derive(Debug, Clone, Default)]
pub struct RecordingHandle {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingHandle {
    pub fn lock(&self) -> MutexGuard<'_, Recording> {
        self.inner.lock()
    }
}

/// Stream sink standing in for a real output
#[derive(Debug)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recording>>,
    next_id: u32,
}

impl RecordingSink {
    pub fn new() -> (Self, RecordingHandle) {
        let handle = RecordingHandle::default();
        let sink = Self {
            inner: Arc::clone(&handle.inner),
            next_id: 100,
        };
        (sink, handle)
    }
}

impl StreamSink for RecordingSink {
    fn add_stream(&mut self, format: &EsFormat) -> Result<EsId> {
        let id = EsId(self.next_id);
        self.next_id += 1;
        self.inner.lock().streams.push((id, format.clone()));
        Ok(id)
    }

    fn send_frame(&mut self, id: EsId, block: Block) -> Result<()> {
        self.inner.lock().blocks.push((id, block));
        Ok(())
    }

    fn remove_stream(&mut self, id: EsId) {
        self.inner.lock().removed.push(id);
    }

    fn control(&mut self, request: SinkControl) -> Result<()> {
        let mut recording = self.inner.lock();
        match request {
            SinkControl::SetPcr(pcr) => recording.pcr.push(pcr),
            other => recording.controls.push(other),
        }
        Ok(())
    }
}
