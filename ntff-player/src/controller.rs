//! Playback controller
//!
//! The controller owns every source session and plays the kept intervals
//! in order, one demux step per call. At each interval switch it swaps in
//! a session a prefetch worker has already positioned, or falls back to a
//! seek on the live session when no prepared session is available.

use crate::media::{DemuxSession, DemuxStatus, MediaBackend, StreamSink, Tick};
use crate::prefetch::{PrefetchRequest, PrefetchTask};
use crate::selection::{GateOutcome, SelectionGate, SelectionHandle, SettingsPanel, TimelineState};
use crate::source::SourceRegistry;
use crate::virtual_sink::{Segment, SinkStats, VirtualSink};
use crate::{Error, PlayerConfig, Result};
use ntff_core::{FrameId, Interval, PlayTimeline, Project, SelectionRequest};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Controller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Halted until the settings round resolves
    AwaitingSelection,
    Playing,
    SwitchingInterval,
    Finished,
}

/// Queries the host sends about playback
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostQuery {
    CanSeek,
    CanPause,
    CanControlPace,
    GetTime,
    GetLength,
    /// Time over length, 0.0-1.0
    GetPosition,
    GetFps,
    SetPosition(f64),
    SetTime(Tick),
    /// Framework-specific query
    Custom(u32),
}

/// Answer to a [`HostQuery`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostReply {
    Bool(bool),
    Time(Tick),
    Position(f64),
    Fps(f64),
    Done,
    Unsupported,
}

/// Playback counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub interval_switches: u64,
    /// Switches served by a prefetched session
    pub prefetch_hits: u64,
    pub cold_seeks: u64,
    pub prefetch_failures: u64,
    /// Switches that blocked on a worker still running
    pub prefetch_waits: u64,
    pub sink: SinkStats,
}

/// Plays the kept intervals of a project as one continuous stream
pub struct Controller<B: MediaBackend> {
    config: PlayerConfig,
    fps: f64,
    frame_duration: f64,
    sources: SourceRegistry<B::Session>,
    shared: Arc<Mutex<TimelineState>>,
    gate: Arc<SelectionGate>,
    sink: VirtualSink,
    prefetch: Option<PrefetchTask<B::Session>>,
    panel: Option<Box<dyn SettingsPanel>>,
    state: PlaybackState,
    current: Option<(usize, Interval)>,
    source_ended: bool,
    stats: PlaybackStats,
    closed: bool,
}

impl<B: MediaBackend> Controller<B> {
    /// Opens every source of `project` and positions on the first kept frame.
    ///
    /// Fails when the project is invalid or any source cannot be opened.
    pub fn open(
        backend: &B,
        project: &Project,
        out: Box<dyn StreamSink>,
        config: PlayerConfig,
    ) -> Result<Self> {
        project.validate()?;
        let sources = SourceRegistry::open(backend, project)?;

        let features = project.feature_list();
        let mut timeline = PlayTimeline::new(project.whole_duration(), project.placements());
        let length = timeline.rebuild(&features);
        info!(
            sources = sources.len(),
            features = features.len(),
            length,
            "player opened"
        );

        let gate = Arc::new(SelectionGate::new());
        if config.settings_on_open {
            gate.request();
        }

        let mut controller = Self {
            sink: VirtualSink::live(out, config.duplicate_window),
            config,
            fps: project.fps,
            frame_duration: project.frame_duration_us(),
            sources,
            shared: Arc::new(Mutex::new(TimelineState { features, timeline })),
            gate,
            prefetch: None,
            panel: None,
            state: PlaybackState::Playing,
            current: None,
            source_ended: false,
            stats: PlaybackStats::default(),
            closed: false,
        };

        let first = controller.shared.lock().timeline.current();
        match first {
            Some(interval) => controller.enter_interval(interval, interval.start)?,
            None => controller.finish(),
        }
        Ok(controller)
    }

    /// Handle the settings UI uses to reach this player
    pub fn selection_handle(&self) -> SelectionHandle {
        SelectionHandle::new(Arc::clone(&self.gate), Arc::clone(&self.shared))
    }

    pub fn set_settings_panel(&mut self, panel: Box<dyn SettingsPanel>) {
        self.panel = Some(panel);
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            sink: self.sink.stats(),
            ..self.stats
        }
    }

    /// Kept interval being played
    pub fn current_interval(&self) -> Option<Interval> {
        self.current.map(|(_, interval)| interval)
    }

    /// Global frame playback has reached
    pub fn current_frame(&self) -> FrameId {
        match self.current {
            Some((_, interval)) => interval.start + self.sink.handled(),
            None => self.shared.lock().timeline.whole_duration(),
        }
    }

    /// Performs one demux step.
    ///
    /// Blocks while a settings round is open. Returns `Eof` once every kept
    /// interval has been played.
    pub fn demux(&mut self) -> Result<DemuxStatus> {
        if self.closed {
            return Ok(DemuxStatus::Eof);
        }
        if self.gate.is_pending() {
            self.await_selection()?;
        }

        loop {
            if self.state == PlaybackState::Finished {
                return Ok(DemuxStatus::Eof);
            }
            let Some((source, interval)) = self.current else {
                self.finish();
                continue;
            };
            if self.source_ended
                || self.sink.overrun()
                || self.sink.handled() >= interval.length()
            {
                self.switch_interval()?;
                continue;
            }

            let session = self
                .sources
                .get_mut(source)
                .and_then(|item| item.sessions_mut().live_mut())
                .ok_or(Error::SessionUnavailable(source))?;
            if session.demux(&mut self.sink)? == DemuxStatus::Eof {
                debug!(source, "source ended inside interval");
                self.source_ended = true;
            }
            return Ok(DemuxStatus::Continue);
        }
    }

    fn switch_interval(&mut self) -> Result<()> {
        self.state = PlaybackState::SwitchingInterval;
        let next = self.shared.lock().timeline.advance();
        match next {
            Some(interval) => {
                self.stats.interval_switches += 1;
                self.enter_interval(interval, interval.start)
            }
            None => {
                self.finish();
                Ok(())
            }
        }
    }

    fn finish(&mut self) {
        self.discard_prefetch();
        self.current = None;
        if self.state != PlaybackState::Finished {
            info!(time = self.sink.cur_time(), "playback finished");
        }
        self.state = PlaybackState::Finished;
    }

    /// Starts presenting `interval` from the global `frame`
    fn enter_interval(&mut self, interval: Interval, frame: FrameId) -> Result<()> {
        let source = self
            .sources
            .find(interval.start)
            .ok_or(Error::NoSourceFor(interval.start))?;
        let virtual_frame = self.shared.lock().timeline.virtual_frame(frame);
        let virtual_start = self.frame_time(virtual_frame);

        let item = self
            .sources
            .get(source)
            .ok_or(Error::SessionUnavailable(source))?;
        let segment = Segment {
            origin: item.local_time(interval.start),
            first_frame: frame - interval.start,
            frames: interval.length(),
            virtual_start,
            frame_duration: item.frame_duration(),
        };
        let seek_to = item.local_time(frame);

        let prepared = if segment.first_frame == 0 {
            self.wait_prepared(source, interval)
        } else {
            self.discard_prefetch();
            None
        };
        self.sink.start_segment(segment);
        self.source_ended = false;

        let arena = self
            .sources
            .get_mut(source)
            .ok_or(Error::SessionUnavailable(source))?
            .sessions_mut();
        match prepared {
            Some((session, mut shadow)) => {
                arena.restore_shadow(session);
                arena.swap();
                let live = arena.live().ok_or(Error::SessionUnavailable(source))?;
                self.sink.adopt(&live.streams())?;
                self.sink.replay(shadow.take_held())?;
                self.stats.prefetch_hits += 1;
                debug!(source, start = interval.start, "prepared session swapped in");
            }
            None => {
                let live = arena.live_mut().ok_or(Error::SessionUnavailable(source))?;
                live.seek(seek_to, true)?;
                self.sink.adopt(&live.streams())?;
                self.stats.cold_seeks += 1;
                debug!(source, frame, seek_to, "seeked live session");
            }
        }

        self.current = Some((source, interval));
        self.state = PlaybackState::Playing;
        self.start_prefetch();
        Ok(())
    }

    /// Joins the prefetch worker if it prepared `interval` of `source`
    fn wait_prepared(
        &mut self,
        source: usize,
        interval: Interval,
    ) -> Option<(B::Session, VirtualSink)> {
        let task = self.prefetch.take()?;
        if !task.matches(source, interval) {
            self.reclaim(task);
            return None;
        }
        if !task.is_ready() {
            debug!(source, start = interval.start, "waiting for prefetch worker");
            self.stats.prefetch_waits += 1;
        }
        let outcome = task.join()?;
        match outcome.result {
            Ok(()) => Some((outcome.session, outcome.sink)),
            Err(err) => {
                warn!(source, error = %err, "prefetch failed, seeking instead");
                self.stats.prefetch_failures += 1;
                self.restore_shadow(source, outcome.session);
                None
            }
        }
    }

    /// Starts preparing the interval after the current one
    fn start_prefetch(&mut self) {
        if !self.config.prefetch || self.closed {
            return;
        }
        let (next, virtual_frame) = {
            let shared = self.shared.lock();
            match shared.timeline.peek_next() {
                Some(next) => (next, shared.timeline.virtual_frame(next.start)),
                None => return,
            }
        };
        let Some(source) = self.sources.find(next.start) else {
            return;
        };
        if self
            .prefetch
            .as_ref()
            .is_some_and(|task| task.matches(source, next))
        {
            return;
        }
        self.discard_prefetch();

        let virtual_start = self.frame_time(virtual_frame);
        let window = self.config.duplicate_window;
        let Some(item) = self.sources.get_mut(source) else {
            return;
        };
        let segment = Segment {
            origin: item.local_time(next.start),
            first_frame: 0,
            frames: next.length(),
            virtual_start,
            frame_duration: item.frame_duration(),
        };
        let Some(session) = item.sessions_mut().take_shadow() else {
            debug!(source, "no shadow session to prefetch with");
            return;
        };
        let request = PrefetchRequest {
            source,
            interval: next,
            segment,
            seek_to: segment.origin,
        };
        match PrefetchTask::spawn(request, session, window) {
            Ok(task) => self.prefetch = Some(task),
            Err(err) => warn!(source, error = %err, "prefetch worker not started"),
        }
    }

    fn discard_prefetch(&mut self) {
        if let Some(task) = self.prefetch.take() {
            self.reclaim(task);
        }
    }

    /// Cancels a worker and puts its session back
    fn reclaim(&mut self, task: PrefetchTask<B::Session>) {
        task.cancel();
        let source = task.request().source;
        if let Some(outcome) = task.join() {
            self.restore_shadow(source, outcome.session);
        }
    }

    fn restore_shadow(&mut self, source: usize, session: B::Session) {
        if let Some(item) = self.sources.get_mut(source) {
            item.sessions_mut().restore_shadow(session);
        }
    }

    fn await_selection(&mut self) -> Result<()> {
        let previous = self.state;
        self.state = PlaybackState::AwaitingSelection;
        if let Some(panel) = self.panel.as_mut() {
            // The panel may query the selection handle, which takes the same lock
            let (features, kept_length) = {
                let shared = self.shared.lock();
                (shared.features.clone(), shared.timeline.length())
            };
            panel.show(&features, kept_length);
        }

        let outcome = self.gate.wait();
        if let Some(panel) = self.panel.as_mut() {
            panel.hide();
        }

        match outcome {
            Some(GateOutcome::Confirmed(request)) => self.apply_selection(&request, previous),
            Some(GateOutcome::Closed) => {
                self.finish();
                Ok(())
            }
            Some(GateOutcome::Cancelled) | None => {
                self.state = previous;
                Ok(())
            }
        }
    }

    /// Rebuilds the timeline for `request` and resumes at the saved frame
    fn apply_selection(&mut self, request: &SelectionRequest, previous: PlaybackState) -> Result<()> {
        let resume_frame = (self.sink.stats().presented > 0).then(|| self.current_frame());
        let resume = {
            let mut shared = self.shared.lock();
            let TimelineState { features, timeline } = &mut *shared;
            if let Err(err) = features.apply(request) {
                warn!(error = %err, "selection rejected");
                self.state = previous;
                return Ok(());
            }
            let length = timeline.rebuild(features);
            info!(length, "selection applied");
            match resume_frame {
                Some(frame) => timeline.reposition(frame),
                None => timeline.current().map(|interval| (interval, interval.start)),
            }
        };

        self.discard_prefetch();
        match resume {
            Some((interval, frame)) => self.enter_interval(interval, frame),
            None => {
                self.finish();
                Ok(())
            }
        }
    }

    fn frame_time(&self, frames: FrameId) -> Tick {
        (frames as f64 * self.frame_duration).round() as Tick
    }

    /// Virtual time of the next presented frame
    pub fn time(&self) -> Tick {
        self.sink.cur_time()
    }

    /// Duration of the kept timeline
    pub fn length(&self) -> Tick {
        let frames = self.shared.lock().timeline.length();
        self.frame_time(frames)
    }

    /// Time over length, 0.0-1.0
    pub fn position(&self) -> f64 {
        let length = self.length();
        if length <= 0 {
            return 0.0;
        }
        (self.time() as f64 / length as f64).clamp(0.0, 1.0)
    }

    /// Seeks to a normalized position of the kept timeline
    pub fn set_position(&mut self, position: f64) -> Result<()> {
        let target = self.shared.lock().timeline.seek(position);
        self.discard_prefetch();
        match target {
            Some((interval, frame)) => {
                info!(position, frame, "seek");
                self.enter_interval(interval, frame)
            }
            None => {
                self.finish();
                Ok(())
            }
        }
    }

    /// Seeks to a virtual time
    pub fn set_time(&mut self, time: Tick) -> Result<()> {
        let length = self.length();
        if length <= 0 {
            self.finish();
            return Ok(());
        }
        self.set_position(time as f64 / length as f64)
    }

    /// Answers a host query
    pub fn control(&mut self, query: HostQuery) -> Result<HostReply> {
        let reply = match query {
            HostQuery::CanSeek | HostQuery::CanPause | HostQuery::CanControlPace => {
                HostReply::Bool(true)
            }
            HostQuery::GetTime => HostReply::Time(self.time()),
            HostQuery::GetLength => HostReply::Time(self.length()),
            HostQuery::GetPosition => HostReply::Position(self.position()),
            HostQuery::GetFps => HostReply::Fps(self.fps),
            HostQuery::SetPosition(position) => {
                self.set_position(position)?;
                HostReply::Done
            }
            HostQuery::SetTime(time) => {
                self.set_time(time)?;
                HostReply::Done
            }
            HostQuery::Custom(query) => {
                debug!(query, "unsupported host query");
                HostReply::Unsupported
            }
        };
        Ok(reply)
    }

    /// Stops the prefetch worker and releases the output streams
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.gate.close();
        self.discard_prefetch();
        self.sink.close();
        self.state = PlaybackState::Finished;
        let stats = self.stats();
        info!(
            switches = stats.interval_switches,
            prefetch_hits = stats.prefetch_hits,
            cold_seeks = stats.cold_seeks,
            presented = stats.sink.presented,
            "player closed"
        );
    }
}

impl<B: MediaBackend> Drop for Controller<B> {
    fn drop(&mut self) {
        self.close();
    }
}
