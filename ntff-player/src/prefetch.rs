//! Background preparation of the next kept interval

use crate::media::{DemuxSession, DemuxStatus, Tick};
use crate::virtual_sink::{Segment, VirtualSink};
use crate::{Error, Result};
use ntff_core::Interval;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// What the worker should prepare
#[derive(Debug, Clone, Copy)]
pub struct PrefetchRequest {
    /// Source the interval belongs to
    pub source: usize,
    pub interval: Interval,
    /// Presentation mapping the held blocks will be replayed with
    pub segment: Segment,
    /// Source-local time to seek the shadow session to
    pub seek_to: Tick,
}

/// Session returned by a finished worker, with the blocks it held
pub struct PrefetchOutcome<S> {
    pub session: S,
    pub sink: VirtualSink,
    pub result: Result<()>,
}

/// One-shot worker driving a shadow session to the start of an interval.
///
/// The worker owns the session until it is joined. Cancellation is
/// cooperative and checked between demux steps.
pub struct PrefetchTask<S> {
    request: PrefetchRequest,
    cancel: Arc<AtomicBool>,
    ready: Arc<AtomicBool>,
    handle: Option<JoinHandle<PrefetchOutcome<S>>>,
}

impl<S: DemuxSession + 'static> PrefetchTask<S> {
    /// Starts a worker for `request` on `session`.
    ///
    /// If the thread cannot be spawned the session is dropped with it.
    pub fn spawn(request: PrefetchRequest, session: S, window: usize) -> Result<Self> {
        let cancel = Arc::new(AtomicBool::new(false));
        let ready = Arc::new(AtomicBool::new(false));

        let worker_cancel = Arc::clone(&cancel);
        let worker_ready = Arc::clone(&ready);
        let handle = thread::Builder::new()
            .name(format!("ntff-prefetch-{}", request.source))
            .spawn(move || {
                let mut session = session;
                let mut sink = VirtualSink::shadow(window);
                let result = prepare(&mut session, &mut sink, &request, &worker_cancel);
                worker_ready.store(true, Ordering::Release);
                PrefetchOutcome {
                    session,
                    sink,
                    result,
                }
            })?;

        debug!(
            source = request.source,
            start = request.interval.start,
            end = request.interval.end,
            "prefetch started"
        );
        Ok(Self {
            request,
            cancel,
            ready,
            handle: Some(handle),
        })
    }

    pub fn request(&self) -> &PrefetchRequest {
        &self.request
    }

    /// True when this task prepares `interval` of `source`
    pub fn matches(&self, source: usize, interval: Interval) -> bool {
        self.request.source == source && self.request.interval == interval
    }

    /// True once the worker has finished, successfully or not
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Asks the worker to stop at its next demux step
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Waits for the worker and takes back its session.
    ///
    /// Returns `None` when the worker panicked; its session is lost.
    pub fn join(mut self) -> Option<PrefetchOutcome<S>> {
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(outcome) => Some(outcome),
            Err(_) => {
                warn!(source = self.request.source, "prefetch worker panicked");
                None
            }
        }
    }
}

impl<S> Drop for PrefetchTask<S> {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Seeks the shadow session and demuxes until the interval's first frame is held
fn prepare<S: DemuxSession>(
    session: &mut S,
    sink: &mut VirtualSink,
    request: &PrefetchRequest,
    cancel: &AtomicBool,
) -> Result<()> {
    sink.adopt(&session.streams())?;
    sink.start_segment(request.segment);
    session.seek(request.seek_to, true)?;
    while !sink.target_reached() {
        if cancel.load(Ordering::Acquire) {
            return Err(Error::PrefetchCancelled);
        }
        if session.demux(sink)? == DemuxStatus::Eof {
            return Err(Error::PrefetchEnded);
        }
    }
    Ok(())
}
