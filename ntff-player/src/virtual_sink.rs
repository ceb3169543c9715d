//! Output virtualization: stitches kept intervals into one continuous stream
//!
//! Sessions push their blocks into a [`VirtualSink`]. A live sink rewrites
//! timestamps onto the virtual timeline, keeps one downstream stream per
//! media kind across every source file and swallows the clock requests of
//! the session. A shadow sink forwards nothing; it holds the blocks of a
//! prefetched interval until the controller swaps the session in.

use crate::frame_tracker::{FrameEvent, FrameTracker};
use crate::media::{Block, BlockFlags, EsFormat, EsId, SinkControl, StreamKind, StreamSink, Tick};
use crate::stream_registry::StreamRegistry;
use crate::Result;
use ntff_core::FrameId;
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Mapping of one kept interval onto the virtual timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Source-local time of the interval's first frame
    pub origin: Tick,
    /// First frame of the interval to present, relative to its start
    pub first_frame: FrameId,
    /// Frames in the interval
    pub frames: FrameId,
    /// Virtual time the first presented frame is shown at
    pub virtual_start: Tick,
    /// Frame duration of the source in microseconds
    pub frame_duration: f64,
}

impl Segment {
    /// Interval-relative index of the frame at source-local `time`
    pub fn frame_index(&self, time: Tick) -> FrameId {
        ((time - self.origin) as f64 / self.frame_duration).round() as FrameId
    }

    /// Offset mapping source-local time onto virtual time
    fn shift(&self) -> Tick {
        let first = self.origin + (self.first_frame as f64 * self.frame_duration).round() as Tick;
        self.virtual_start - first
    }
}

impl Default for Segment {
    fn default() -> Self {
        Self {
            origin: 0,
            first_frame: 0,
            frames: 0,
            virtual_start: 0,
            frame_duration: 40_000.0,
        }
    }
}

/// Delivery counters of a live sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Video frames presented on the virtual timeline
    pub presented: u64,
    /// Video frames before the interval, forwarded for decoder warm-up
    pub preroll: u64,
    /// Video frames past the interval end
    pub trailing: u64,
    /// Non-video blocks outside the interval
    pub dropped: u64,
    /// Clock requests swallowed
    pub clock_suppressed: u64,
}

enum Role {
    Live {
        out: Box<dyn StreamSink>,
        outputs: HashMap<StreamKind, EsId>,
    },
    Shadow {
        held: Vec<(EsId, Block)>,
    },
}

/// Stream sink placed between a session and the real output
pub struct VirtualSink {
    role: Role,
    registry: StreamRegistry,
    declared: Vec<(EsId, EsFormat)>,
    next_id: u32,
    segment: Segment,
    tracker: FrameTracker,
    cur_time: Tick,
    presented_in_segment: u64,
    overrun: bool,
    discontinuity: bool,
    stats: SinkStats,
}

impl VirtualSink {
    /// Creates a sink forwarding to `out`
    pub fn live(out: Box<dyn StreamSink>, window: usize) -> Self {
        Self::with_role(
            Role::Live {
                out,
                outputs: HashMap::new(),
            },
            window,
        )
    }

    /// Creates a sink that holds blocks instead of forwarding them
    pub fn shadow(window: usize) -> Self {
        Self::with_role(Role::Shadow { held: Vec::new() }, window)
    }

    fn with_role(role: Role, window: usize) -> Self {
        Self {
            role,
            registry: StreamRegistry::new(),
            declared: Vec::new(),
            next_id: 0,
            segment: Segment::default(),
            tracker: FrameTracker::new(window),
            cur_time: 0,
            presented_in_segment: 0,
            overrun: false,
            discontinuity: false,
            stats: SinkStats::default(),
        }
    }

    pub fn is_shadow(&self) -> bool {
        matches!(self.role, Role::Shadow { .. })
    }

    /// Binds the streams an already-running session sends on.
    ///
    /// Resets the stream registry; the first stream of each kind becomes
    /// primary and is mapped onto the existing downstream stream.
    pub fn adopt(&mut self, streams: &[(EsId, EsFormat)]) -> Result<()> {
        self.registry.reset();
        self.declared.clear();
        for (id, format) in streams {
            self.declare(*id, format)?;
            self.next_id = self.next_id.max(id.0 + 1);
        }
        Ok(())
    }

    fn declare(&mut self, id: EsId, format: &EsFormat) -> Result<()> {
        self.registry.register(id, format.kind);
        self.declared.push((id, format.clone()));
        if let Role::Live { out, outputs } = &mut self.role {
            if self.registry.is_primary(id) && !outputs.contains_key(&format.kind) {
                let downstream = out.add_stream(format)?;
                debug!(kind = ?format.kind, codec = %format.codec, "output stream created");
                outputs.insert(format.kind, downstream);
            }
        }
        Ok(())
    }

    /// Starts presenting `segment`; the only point the output clock may jump
    pub fn start_segment(&mut self, segment: Segment) {
        if segment.virtual_start != self.cur_time {
            self.discontinuity = true;
        }
        self.segment = segment;
        self.cur_time = segment.virtual_start;
        self.presented_in_segment = 0;
        self.overrun = false;
        self.tracker.reset();
        if let Role::Shadow { held } = &mut self.role {
            held.clear();
        }
        trace!(?segment, "segment started");
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    /// Virtual time of the next presented frame
    pub fn cur_time(&self) -> Tick {
        self.cur_time
    }

    /// Interval-relative index playback has reached
    pub fn handled(&self) -> FrameId {
        self.tracker
            .handled()
            .unwrap_or(self.segment.first_frame)
            .max(self.segment.first_frame)
    }

    /// True once the session delivered material past the interval end
    pub fn overrun(&self) -> bool {
        self.overrun
    }

    /// True once the first frame of the segment has been delivered
    pub fn target_reached(&self) -> bool {
        self.tracker.reached(self.segment.first_frame)
    }

    pub fn tracker(&self) -> &FrameTracker {
        &self.tracker
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    /// Streams declared to this sink
    pub fn declared(&self) -> &[(EsId, EsFormat)] {
        &self.declared
    }

    /// Takes the blocks a shadow sink has held
    pub fn take_held(&mut self) -> Vec<(EsId, Block)> {
        match &mut self.role {
            Role::Shadow { held } => std::mem::take(held),
            Role::Live { .. } => Vec::new(),
        }
    }

    /// Feeds held blocks through this sink as if they were just demuxed
    pub fn replay(&mut self, held: Vec<(EsId, Block)>) -> Result<()> {
        let count = held.len();
        for (id, block) in held {
            self.send_frame(id, block)?;
        }
        trace!(count, "held blocks replayed");
        Ok(())
    }

    /// Removes the downstream streams
    pub fn close(&mut self) {
        if let Role::Live { out, outputs } = &mut self.role {
            for (_, id) in outputs.drain() {
                out.remove_stream(id);
            }
        }
    }

    fn send_video(&mut self, id: EsId, mut block: Block, time: Tick) -> Result<()> {
        let index = self.segment.frame_index(time);
        let outside = index < self.segment.first_frame || index >= self.segment.frames;
        if outside {
            if index >= self.segment.frames {
                self.overrun = true;
                self.stats.trailing += 1;
            } else {
                self.stats.preroll += 1;
            }
            return self.forward_preroll(id, block);
        }

        if self.tracker.push(index) == FrameEvent::Duplicate {
            return self.forward_preroll(id, block);
        }

        let (out, downstream) = match &mut self.role {
            Role::Shadow { held } => {
                held.push((id, block));
                return Ok(());
            }
            Role::Live { out, outputs } => match outputs.get(&StreamKind::Video) {
                Some(downstream) => (out, *downstream),
                None => return Ok(()),
            },
        };

        let dts = self.cur_time;
        let delay = match (block.pts, block.dts) {
            (Some(pts), Some(dts)) => pts - dts,
            _ => 0,
        };
        block.dts = Some(dts);
        block.pts = Some(dts + delay);
        if std::mem::take(&mut self.discontinuity) {
            block.flags.insert(BlockFlags::DISCONTINUITY);
        }
        out.send_frame(downstream, block)?;

        self.presented_in_segment += 1;
        self.stats.presented += 1;
        self.cur_time = self.segment.virtual_start
            + (self.presented_in_segment as f64 * self.segment.frame_duration).round() as Tick;
        out.control(SinkControl::SetPcr(dts))
    }

    fn forward_preroll(&mut self, id: EsId, mut block: Block) -> Result<()> {
        let Role::Live { out, outputs } = &mut self.role else {
            return Ok(());
        };
        let Some(downstream) = outputs.get(&StreamKind::Video).copied() else {
            return Ok(());
        };
        trace!(id = id.0, "preroll frame");
        block.flags.insert(BlockFlags::PREROLL);
        block.pts = Some(self.cur_time);
        block.dts = Some(self.cur_time);
        out.send_frame(downstream, block)
    }

    fn send_other(&mut self, id: EsId, kind: StreamKind, mut block: Block, time: Tick) -> Result<()> {
        let index = self.segment.frame_index(time);
        if index < self.segment.first_frame || index >= self.segment.frames {
            self.stats.dropped += 1;
            return Ok(());
        }
        match &mut self.role {
            Role::Shadow { held } => {
                held.push((id, block));
                Ok(())
            }
            Role::Live { out, outputs } => {
                let Some(downstream) = outputs.get(&kind).copied() else {
                    return Ok(());
                };
                block.shift(self.segment.shift());
                out.send_frame(downstream, block)
            }
        }
    }
}

impl StreamSink for VirtualSink {
    fn add_stream(&mut self, format: &EsFormat) -> Result<EsId> {
        let id = EsId(self.next_id);
        self.next_id += 1;
        self.declare(id, format)?;
        Ok(id)
    }

    fn send_frame(&mut self, id: EsId, block: Block) -> Result<()> {
        let Some(kind) = self.registry.classify(id) else {
            warn!(id = id.0, "block for unknown stream dropped");
            return Ok(());
        };
        if !self.registry.is_primary(id) {
            return Ok(());
        }
        let Some(time) = block.timestamp() else {
            trace!(id = id.0, "block without timestamp dropped");
            return Ok(());
        };
        match kind {
            StreamKind::Video => self.send_video(id, block, time),
            _ => self.send_other(id, kind, block, time),
        }
    }

    fn remove_stream(&mut self, id: EsId) {
        self.registry.unregister(id);
        self.declared.retain(|(declared, _)| *declared != id);
    }

    fn control(&mut self, request: SinkControl) -> Result<()> {
        if request.is_clock() {
            self.stats.clock_suppressed += 1;
            return Ok(());
        }
        let Role::Live { out, outputs } = &mut self.role else {
            return Ok(());
        };
        match request {
            SinkControl::SetEsState { id, enabled } => {
                let Some(kind) = self.registry.classify(id) else {
                    return Ok(());
                };
                match outputs.get(&kind) {
                    Some(downstream) => out.control(SinkControl::SetEsState {
                        id: *downstream,
                        enabled,
                    }),
                    None => Ok(()),
                }
            }
            other => out.control(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingSink;

    fn block(time: Tick) -> Block {
        Block {
            pts: Some(time),
            dts: Some(time),
            duration: 40_000,
            ..Block::default()
        }
    }

    fn segment(first_frame: FrameId, frames: FrameId, virtual_start: Tick) -> Segment {
        Segment {
            origin: 400_000,
            first_frame,
            frames,
            virtual_start,
            frame_duration: 40_000.0,
        }
    }

    #[test]
    fn test_video_rebased_onto_virtual_time() {
        let (out, recording) = RecordingSink::new();
        let mut sink = VirtualSink::live(Box::new(out), 10);
        let id = sink.add_stream(&EsFormat::new(StreamKind::Video, "h264")).unwrap();
        sink.start_segment(segment(0, 3, 1_000_000));

        for time in [360_000, 400_000, 440_000, 480_000, 520_000] {
            sink.send_frame(id, block(time)).unwrap();
        }

        let recording = recording.lock();
        let presented: Vec<_> = recording
            .frames(StreamKind::Video)
            .filter(|block| !block.flags.contains(BlockFlags::PREROLL))
            .map(|block| block.dts)
            .collect();
        assert_eq!(
            presented,
            vec![Some(1_000_000), Some(1_040_000), Some(1_080_000)]
        );
        assert_eq!(sink.cur_time(), 1_120_000);
        assert!(sink.overrun());
        assert_eq!(sink.stats().preroll, 1);
        assert_eq!(sink.stats().trailing, 1);
        assert_eq!(sink.handled(), 3);
        assert_eq!(recording.pcr.last(), Some(&1_080_000));
    }

    #[test]
    fn test_one_output_per_kind() {
        let (out, recording) = RecordingSink::new();
        let mut sink = VirtualSink::live(Box::new(out), 10);
        let first = sink.add_stream(&EsFormat::new(StreamKind::Audio, "aac")).unwrap();
        let second = sink.add_stream(&EsFormat::new(StreamKind::Audio, "ac3")).unwrap();
        sink.start_segment(segment(0, 10, 0));

        sink.send_frame(first, block(400_000)).unwrap();
        sink.send_frame(second, block(400_000)).unwrap();
        sink.adopt(&[(EsId(7), EsFormat::new(StreamKind::Audio, "aac"))])
            .unwrap();
        sink.send_frame(EsId(7), block(440_000)).unwrap();

        let recording = recording.lock();
        assert_eq!(recording.streams.len(), 1);
        let audio: Vec<_> = recording.frames(StreamKind::Audio).map(|b| b.pts).collect();
        assert_eq!(audio, vec![Some(0), Some(40_000)]);
    }

    #[test]
    fn test_clock_requests_suppressed() {
        let (out, recording) = RecordingSink::new();
        let mut sink = VirtualSink::live(Box::new(out), 10);
        let id = sink.add_stream(&EsFormat::new(StreamKind::Video, "h264")).unwrap();
        sink.control(SinkControl::SetPcr(123)).unwrap();
        sink.control(SinkControl::ResetPcr).unwrap();
        sink.control(SinkControl::SetEsState { id, enabled: false })
            .unwrap();

        let recording = recording.lock();
        assert!(recording.pcr.is_empty());
        assert_eq!(recording.controls.len(), 1);
        assert_eq!(sink.stats().clock_suppressed, 2);
    }

    #[test]
    fn test_duplicate_not_presented() {
        let (out, recording) = RecordingSink::new();
        let mut sink = VirtualSink::live(Box::new(out), 10);
        let id = sink.add_stream(&EsFormat::new(StreamKind::Video, "h264")).unwrap();
        sink.start_segment(segment(0, 10, 0));
        for time in [600_000, 640_000, 640_000, 680_000] {
            sink.send_frame(id, block(time)).unwrap();
        }
        assert_eq!(sink.stats().presented, 3);
        assert_eq!(sink.tracker().duplicates(), 1);
        assert_eq!(recording.lock().frames(StreamKind::Video).count(), 4);
    }

    #[test]
    fn test_shadow_holds_from_target() {
        let mut shadow = VirtualSink::shadow(10);
        let id = shadow.add_stream(&EsFormat::new(StreamKind::Video, "h264")).unwrap();
        shadow.start_segment(segment(0, 5, 0));
        shadow.send_frame(id, block(320_000)).unwrap();
        assert!(!shadow.target_reached());
        shadow.send_frame(id, block(400_000)).unwrap();
        assert!(shadow.target_reached());

        let held = shadow.take_held();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].1.dts, Some(400_000));

        let (out, recording) = RecordingSink::new();
        let mut live = VirtualSink::live(Box::new(out), 10);
        live.adopt(shadow.declared()).unwrap();
        live.start_segment(segment(0, 5, 2_000_000));
        live.replay(held).unwrap();
        let recording = recording.lock();
        let block = recording.frames(StreamKind::Video).next().unwrap();
        assert_eq!(block.dts, Some(2_000_000));
        assert!(block.flags.contains(BlockFlags::DISCONTINUITY));
    }
}
