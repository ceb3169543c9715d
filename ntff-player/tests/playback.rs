use ntff_core::{
    BaseMode, EditAction, FeatureEdit, FeatureEntry, FeatureList, FrameId, Interval, Project,
    SelectionRequest,
};
use ntff_player::synthetic::frame_number;
use ntff_player::{
    BlockFlags, Controller, DemuxStatus, Error, HostQuery, HostReply, PlaybackState, PlayerConfig,
    RecordingHandle, RecordingSink, SelectionHandle, SettingsPanel, StreamKind, SyntheticBackend,
    SyntheticMedia,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const FRAME: i64 = 40_000;

/// Two files on one axis with two skipped scenes:
/// kept [0,40) [60,100) | [100,120) [150,250)
fn project() -> Project {
    let mut project = Project::new(25.0);
    project.add_source(Interval::new(0, 100), "a.mkv");
    project.add_source(Interval::new(100, 250), "b.mkv");
    project.add_feature(FeatureEntry {
        name: "violence".to_string(),
        description: String::new(),
        rec_min: 0,
        rec_max: 3,
        intervals: vec![
            Interval::with_intensity(40, 60, 5),
            Interval::with_intensity(120, 150, 5),
        ],
    });
    project
}

fn backend() -> SyntheticBackend {
    SyntheticBackend::for_project(&project())
}

fn open(
    backend: &SyntheticBackend,
    config: PlayerConfig,
) -> (Controller<SyntheticBackend>, RecordingHandle) {
    let (sink, recording) = RecordingSink::new();
    let controller = Controller::open(backend, &project(), Box::new(sink), config).unwrap();
    (controller, recording)
}

fn play_to_end(controller: &mut Controller<SyntheticBackend>) {
    let mut steps = 0;
    while controller.demux().unwrap() == DemuxStatus::Continue {
        steps += 1;
        assert!(steps < 10_000, "playback did not finish");
    }
}

fn presented_frames(recording: &RecordingHandle) -> Vec<FrameId> {
    recording
        .lock()
        .presented()
        .filter_map(frame_number)
        .collect()
}

fn expected_frames() -> Vec<FrameId> {
    (0..40).chain(60..100).chain(0..20).chain(50..150).collect()
}

#[test]
fn test_plays_kept_intervals_with_prefetch() {
    let backend = backend();
    let (mut controller, recording) = open(&backend, PlayerConfig::default());
    play_to_end(&mut controller);

    assert_eq!(controller.state(), PlaybackState::Finished);
    assert_eq!(presented_frames(&recording), expected_frames());

    let recording = recording.lock();
    let times: Vec<_> = recording.presented().filter_map(|block| block.dts).collect();
    let expected: Vec<_> = (0..200).map(|frame| frame * FRAME).collect();
    assert_eq!(times, expected);
    assert!(recording.is_monotonic());
    assert_eq!(recording.streams.len(), 2);

    let stats = controller.stats();
    assert_eq!(stats.interval_switches, 3);
    assert_eq!(stats.prefetch_hits, 3);
    assert_eq!(stats.cold_seeks, 1);
    assert!(stats.prefetch_waits <= stats.prefetch_hits);
    assert_eq!(stats.sink.presented, 200);
}

#[test]
fn test_cold_seek_matches_prefetch_output() {
    let backend = backend();
    let config = PlayerConfig {
        prefetch: false,
        ..PlayerConfig::default()
    };
    let (mut controller, recording) = open(&backend, config);
    play_to_end(&mut controller);

    assert_eq!(presented_frames(&recording), expected_frames());
    assert!(recording.lock().is_monotonic());
    let stats = controller.stats();
    assert_eq!(stats.prefetch_hits, 0);
    assert_eq!(stats.cold_seeks, 4);
}

#[test]
fn test_audio_follows_virtual_timeline() {
    let backend = backend();
    let (mut controller, recording) = open(&backend, PlayerConfig::default());
    play_to_end(&mut controller);

    let recording = recording.lock();
    let audio: Vec<_> = recording
        .frames(StreamKind::Audio)
        .filter_map(|block| block.pts)
        .collect();
    assert_eq!(audio.len(), 200);
    assert!(audio.windows(2).all(|pair| pair[1] - pair[0] == FRAME));
    assert_eq!(controller.stats().sink.dropped, 0);
}

#[test]
fn test_host_queries_and_seek() {
    let backend = backend();
    let (mut controller, recording) = open(&backend, PlayerConfig::default());

    assert_eq!(
        controller.control(HostQuery::CanSeek).unwrap(),
        HostReply::Bool(true)
    );
    assert_eq!(
        controller.control(HostQuery::GetLength).unwrap(),
        HostReply::Time(200 * FRAME)
    );
    assert_eq!(
        controller.control(HostQuery::GetFps).unwrap(),
        HostReply::Fps(25.0)
    );
    assert_eq!(
        controller.control(HostQuery::Custom(7)).unwrap(),
        HostReply::Unsupported
    );

    controller.control(HostQuery::SetPosition(0.6)).unwrap();
    assert_eq!(controller.current_interval(), Some(Interval::new(150, 250)));
    assert_eq!(controller.current_frame(), 170);
    assert_eq!(
        controller.control(HostQuery::GetTime).unwrap(),
        HostReply::Time(120 * FRAME)
    );
    assert_eq!(
        controller.control(HostQuery::GetPosition).unwrap(),
        HostReply::Position(0.6)
    );

    controller.demux().unwrap();
    let recording = recording.lock();
    let first = recording.presented().next().unwrap();
    assert_eq!(frame_number(first), Some(70));
    assert_eq!(first.dts, Some(120 * FRAME));
}

#[test]
fn test_seek_past_end_finishes() {
    let backend = backend();
    let (mut controller, _recording) = open(&backend, PlayerConfig::default());
    controller.set_position(1.0).unwrap();
    assert_eq!(controller.state(), PlaybackState::Finished);
    assert_eq!(controller.demux().unwrap(), DemuxStatus::Eof);

    controller.set_position(0.0).unwrap();
    assert_eq!(controller.state(), PlaybackState::Playing);
    assert_eq!(controller.current_frame(), 0);
}

#[test]
fn test_seek_lands_before_keyframe() {
    let mut project = Project::new(25.0);
    project.add_source(Interval::new(0, 100), "gop.mkv");
    let backend = SyntheticBackend::new()
        .with_media("gop.mkv", SyntheticMedia::new(25.0, 100).with_gop(8));
    let (sink, recording) = RecordingSink::new();
    let mut controller =
        Controller::open(&backend, &project, Box::new(sink), PlayerConfig::default()).unwrap();

    controller.set_position(0.2).unwrap();
    for _ in 0..5 {
        controller.demux().unwrap();
    }

    let recording = recording.lock();
    let preroll: Vec<_> = recording
        .frames(StreamKind::Video)
        .filter(|block| block.flags.contains(BlockFlags::PREROLL))
        .filter_map(frame_number)
        .collect();
    assert_eq!(preroll, vec![16, 17, 18, 19]);
    let first = recording.presented().next().unwrap();
    assert_eq!(frame_number(first), Some(20));
    assert_eq!(first.dts, Some(20 * FRAME));
    assert_eq!(controller.stats().sink.preroll, 4);
}

#[test]
fn test_short_sources_end_intervals_early() {
    let backend = SyntheticBackend::new()
        .with_media("a.mkv", SyntheticMedia::new(25.0, 80))
        .with_media("b.mkv", SyntheticMedia::new(25.0, 40));
    let (mut controller, recording) = open(&backend, PlayerConfig::default());
    play_to_end(&mut controller);

    let expected: Vec<FrameId> = (0..40).chain(60..80).chain(0..20).collect();
    assert_eq!(presented_frames(&recording), expected);
    assert_eq!(controller.stats().prefetch_failures, 1);
    assert!(recording.lock().is_monotonic());
}

#[test]
fn test_axis_past_last_source_is_not_played() {
    let mut project = project();
    project.duration = 300;
    project.add_feature(FeatureEntry {
        name: "gore".to_string(),
        description: String::new(),
        rec_min: 0,
        rec_max: 3,
        intervals: vec![Interval::with_intensity(240, 260, 5)],
    });
    project.validate().unwrap();

    let backend = SyntheticBackend::for_project(&project);
    let (sink, recording) = RecordingSink::new();
    let mut controller =
        Controller::open(&backend, &project, Box::new(sink), PlayerConfig::default()).unwrap();
    assert_eq!(controller.length(), 190 * FRAME);
    play_to_end(&mut controller);

    let expected: Vec<FrameId> = (0..40).chain(60..100).chain(0..20).chain(50..140).collect();
    assert_eq!(presented_frames(&recording), expected);
    assert_eq!(controller.state(), PlaybackState::Finished);
}

#[test]
fn test_gap_between_sources_is_skipped() {
    let mut project = Project::new(25.0);
    project.add_source(Interval::new(0, 100), "a.mkv");
    project.add_source(Interval::new(120, 250), "b.mkv");
    project.validate().unwrap();

    let backend = SyntheticBackend::for_project(&project);
    let (sink, recording) = RecordingSink::new();
    let mut controller =
        Controller::open(&backend, &project, Box::new(sink), PlayerConfig::default()).unwrap();
    play_to_end(&mut controller);

    let expected: Vec<FrameId> = (0..100).chain(0..130).collect();
    assert_eq!(presented_frames(&recording), expected);
    assert!(recording.lock().is_monotonic());
}

#[test]
fn test_missing_source_fails_open() {
    let backend = SyntheticBackend::new().with_media("a.mkv", SyntheticMedia::new(25.0, 100));
    let (sink, _recording) = RecordingSink::new();
    let result = Controller::open(&backend, &project(), Box::new(sink), PlayerConfig::default());
    assert!(matches!(result, Err(Error::SourceOpen { .. })));
}

#[test]
fn test_close_with_prefetch_in_flight() {
    let backend = backend();
    let (mut controller, recording) = open(&backend, PlayerConfig::default());
    controller.demux().unwrap();
    controller.demux().unwrap();
    drop(controller);

    let recording = recording.lock();
    assert_eq!(recording.removed.len(), 2);
}

#[derive(Clone, Default)]
struct PanelLog(Arc<Mutex<Vec<String>>>);

impl SettingsPanel for PanelLog {
    fn show(&mut self, features: &FeatureList, kept_length: FrameId) {
        self.0
            .lock()
            .push(format!("show {} {}", features.len(), kept_length));
    }

    fn hide(&mut self) {
        self.0.lock().push("hide".to_string());
    }
}

#[test]
fn test_settings_on_open_blocks_until_confirmed() {
    let backend = backend();
    let config = PlayerConfig {
        settings_on_open: true,
        ..PlayerConfig::default()
    };
    let (mut controller, recording) = open(&backend, config);
    let panel = PanelLog::default();
    controller.set_settings_panel(Box::new(panel.clone()));

    let handle = controller.selection_handle();
    let keep_all = SelectionRequest::new(BaseMode::KeepAll);
    assert_eq!(handle.kept_length(), 200);
    assert_eq!(handle.preview_length(&keep_all).unwrap(), 250);

    let ui = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        handle.confirm(keep_all);
    });
    play_to_end(&mut controller);
    ui.join().unwrap();

    let expected: Vec<FrameId> = (0..100).chain(0..150).collect();
    assert_eq!(presented_frames(&recording), expected);
    assert_eq!(
        *panel.0.lock(),
        vec!["show 1 200".to_string(), "hide".to_string()]
    );
}

/// Panel that reads the player state back while it is shown
struct QueryingPanel {
    handle: SelectionHandle,
    seen: Arc<Mutex<Vec<FrameId>>>,
}

impl SettingsPanel for QueryingPanel {
    fn show(&mut self, features: &FeatureList, _kept_length: FrameId) {
        self.seen.lock().push(self.handle.kept_length());
        assert_eq!(self.handle.features(), *features);
    }

    fn hide(&mut self) {}
}

#[test]
fn test_panel_can_query_handle_while_shown() {
    let backend = backend();
    let config = PlayerConfig {
        settings_on_open: true,
        ..PlayerConfig::default()
    };
    let (mut controller, recording) = open(&backend, config);
    let handle = controller.selection_handle();
    let seen = Arc::new(Mutex::new(Vec::new()));
    controller.set_settings_panel(Box::new(QueryingPanel {
        handle: handle.clone(),
        seen: Arc::clone(&seen),
    }));

    let ui = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        handle.cancel();
    });
    play_to_end(&mut controller);
    ui.join().unwrap();

    assert_eq!(*seen.lock(), vec![200]);
    assert_eq!(presented_frames(&recording), expected_frames());
}

#[test]
fn test_selection_resumes_at_saved_frame() {
    let backend = backend();
    let (mut controller, recording) = open(&backend, PlayerConfig::default());
    for _ in 0..10 {
        controller.demux().unwrap();
    }
    assert_eq!(controller.current_frame(), 10);

    // Keep only the violent scenes from here on
    let handle = controller.selection_handle();
    let request = SelectionRequest::new(BaseMode::SkipAll)
        .with_edit(FeatureEdit::new(0, EditAction::Add, 5, 5));
    handle.open_settings();
    handle.confirm(request);
    play_to_end(&mut controller);

    let expected: Vec<FrameId> = (0..10).chain(40..60).chain(20..50).collect();
    assert_eq!(presented_frames(&recording), expected);

    let recording = recording.lock();
    let resumed = recording.presented().nth(10).unwrap();
    assert_eq!(resumed.dts, Some(0));
    assert!(resumed.flags.contains(BlockFlags::DISCONTINUITY));
}

#[test]
fn test_cancelled_round_keeps_selection() {
    let backend = backend();
    let (mut controller, recording) = open(&backend, PlayerConfig::default());
    let handle = controller.selection_handle();
    handle.open_settings();
    handle.cancel();
    play_to_end(&mut controller);
    assert_eq!(presented_frames(&recording), expected_frames());
}
