//! Hand-off between the settings panel and the playback thread

use ntff_core::{FeatureList, FrameId, PlayTimeline, SelectionRequest};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use tracing::debug;

/// Features and play timeline shared by the playback and UI threads
#[derive(Debug, Clone)]
pub struct TimelineState {
    pub features: FeatureList,
    pub timeline: PlayTimeline,
}

/// How a settings round ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Confirmed(SelectionRequest),
    Cancelled,
    /// The player is shutting down
    Closed,
}

#[derive(Debug, Default)]
enum GateState {
    #[default]
    Idle,
    Requested,
    Resolved(GateOutcome),
    Closed,
}

/// Blocks the playback thread while the user edits the selection
#[derive(Debug, Default)]
pub struct SelectionGate {
    state: Mutex<GateState>,
    resolved: Condvar,
}

impl SelectionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a settings round as open; returns false once closed
    pub fn request(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            GateState::Closed => false,
            _ => {
                *state = GateState::Requested;
                true
            }
        }
    }

    /// True while a round is open or resolved but not yet consumed
    pub fn is_pending(&self) -> bool {
        matches!(
            *self.state.lock(),
            GateState::Requested | GateState::Resolved(_)
        )
    }

    pub fn confirm(&self, request: SelectionRequest) {
        self.resolve(GateOutcome::Confirmed(request));
    }

    pub fn cancel(&self) {
        self.resolve(GateOutcome::Cancelled);
    }

    fn resolve(&self, outcome: GateOutcome) {
        let mut state = self.state.lock();
        if matches!(*state, GateState::Requested) {
            *state = GateState::Resolved(outcome);
            self.resolved.notify_all();
        }
    }

    /// Wakes any waiter and refuses further rounds
    pub fn close(&self) {
        *self.state.lock() = GateState::Closed;
        self.resolved.notify_all();
    }

    /// Waits for the open round to resolve and consumes its outcome.
    ///
    /// Returns `None` when no round is open.
    pub fn wait(&self) -> Option<GateOutcome> {
        let mut state = self.state.lock();
        while matches!(*state, GateState::Requested) {
            self.resolved.wait(&mut state);
        }
        match std::mem::take(&mut *state) {
            GateState::Resolved(outcome) => Some(outcome),
            GateState::Closed => {
                *state = GateState::Closed;
                Some(GateOutcome::Closed)
            }
            GateState::Idle | GateState::Requested => None,
        }
    }
}

/// Cloneable handle the settings UI drives the player through
#[derive(Debug, Clone)]
pub struct SelectionHandle {
    gate: Arc<SelectionGate>,
    shared: Arc<Mutex<TimelineState>>,
}

impl SelectionHandle {
    pub(crate) fn new(gate: Arc<SelectionGate>, shared: Arc<Mutex<TimelineState>>) -> Self {
        Self { gate, shared }
    }

    /// Opens a settings round; playback halts at its next step
    pub fn open_settings(&self) -> bool {
        debug!("settings requested");
        self.gate.request()
    }

    /// Confirms the round with a new selection
    pub fn confirm(&self, request: SelectionRequest) {
        debug!(base = ?request.base, edits = request.edits.len(), "selection confirmed");
        self.gate.confirm(request);
    }

    /// Ends the round keeping the current selection
    pub fn cancel(&self) {
        debug!("selection cancelled");
        self.gate.cancel();
    }

    /// Snapshot of the features as currently applied
    pub fn features(&self) -> FeatureList {
        self.shared.lock().features.clone()
    }

    /// Kept length of the timeline in effect
    pub fn kept_length(&self) -> FrameId {
        self.shared.lock().timeline.length()
    }

    /// Kept length `request` would produce, without applying it
    pub fn preview_length(&self, request: &SelectionRequest) -> ntff_core::Result<FrameId> {
        let state = self.shared.lock();
        let mut features = state.features.clone();
        features.apply(request)?;
        Ok(state.timeline.preview_length(&features))
    }
}

/// Settings panel shown while a round is open
pub trait SettingsPanel: Send {
    fn show(&mut self, features: &FeatureList, kept_length: FrameId);

    fn hide(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntff_core::BaseMode;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_wait_without_round() {
        let gate = SelectionGate::new();
        assert!(!gate.is_pending());
        assert_eq!(gate.wait(), None);
    }

    #[test]
    fn test_confirm_wakes_waiter() {
        let gate = Arc::new(SelectionGate::new());
        assert!(gate.request());
        assert!(gate.is_pending());

        let ui = Arc::clone(&gate);
        let confirmer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            ui.confirm(SelectionRequest::new(BaseMode::SkipAll));
        });
        assert_eq!(
            gate.wait(),
            Some(GateOutcome::Confirmed(SelectionRequest::new(BaseMode::SkipAll)))
        );
        confirmer.join().unwrap();
        assert!(!gate.is_pending());
    }

    #[test]
    fn test_resolution_without_round_is_ignored() {
        let gate = SelectionGate::new();
        gate.cancel();
        assert!(!gate.is_pending());

        gate.request();
        gate.cancel();
        assert_eq!(gate.wait(), Some(GateOutcome::Cancelled));
    }

    #[test]
    fn test_close_releases_waiter() {
        let gate = Arc::new(SelectionGate::new());
        gate.request();
        let closer = Arc::clone(&gate);
        let handle = thread::spawn(move || closer.close());
        assert_eq!(gate.wait(), Some(GateOutcome::Closed));
        handle.join().unwrap();
        assert!(!gate.request());
    }
}
