//! NTFF CLI Tool
//!
//! Command-line interface for inspecting and playing annotated projects.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ntff_core::{
    BaseMode, Comparison, EditAction, FeatureEdit, FeatureList, FrameId, PlayTimeline, Project,
    SelectionRequest,
};
use ntff_media::FfmpegBackend;
use ntff_player::{
    Block, BlockFlags, Controller, DemuxStatus, EsFormat, EsId, MediaBackend, PlayerConfig,
    SinkControl, StreamSink, SyntheticBackend, Tick,
};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ntff")]
#[command(about = "NTFF - play video with annotated scenes skipped")]
#[command(version)]
struct Cli {
    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the kept intervals of a project
    Timeline {
        /// Project manifest (JSON)
        project: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Play a project through FFmpeg and report delivery statistics
    Play {
        /// Project manifest (JSON)
        project: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,

        #[command(flatten)]
        playback: PlaybackArgs,
    },

    /// Play a project over generated media and report delivery statistics
    Simulate {
        /// Project manifest (JSON)
        project: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,

        #[command(flatten)]
        playback: PlaybackArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Base {
    /// Everything plays unless removed
    Keep,
    /// Nothing plays unless added
    Skip,
}

#[derive(clap::Args)]
struct SelectionArgs {
    /// Starting point for the edits
    #[arg(long, value_enum)]
    base: Option<Base>,

    /// Play a feature's band: NAME, NAME:MIN:MAX or NAME:OP:VALUE (OP one of < > <= >=)
    #[arg(long, value_name = "EDIT")]
    add: Vec<String>,

    /// Skip a feature's band, same forms as --add
    #[arg(long, value_name = "EDIT")]
    remove: Vec<String>,

    /// Apply the edits to regions the feature does not annotate as well
    #[arg(long)]
    affect_unmarked: bool,
}

#[derive(clap::Args)]
struct PlaybackArgs {
    /// Seek to every interval instead of preparing it in the background
    #[arg(long)]
    no_prefetch: bool,

    /// Frames kept for duplicate detection
    #[arg(long, default_value = "10")]
    window: usize,

    /// Write the report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .try_init();

    match cli.command {
        Commands::Timeline { project, selection } => show_timeline(&project, &selection)?,

        Commands::Play {
            project,
            selection,
            playback,
        } => {
            let loaded = Project::load(&project).context("Failed to load project")?;
            run_playback(&FfmpegBackend::new(), &loaded, &selection, &playback)?
        }

        Commands::Simulate {
            project,
            selection,
            playback,
        } => {
            let loaded = read_project(&project)?;
            let backend = SyntheticBackend::for_project(&loaded);
            run_playback(&backend, &loaded, &selection, &playback)?
        }
    }

    Ok(())
}

/// Reads a manifest without resolving its source paths
fn read_project(path: &Path) -> Result<Project> {
    let file = File::open(path).context("Failed to open project file")?;
    Project::read(BufReader::new(file)).context("Failed to read project")
}

fn selection_request(
    features: &FeatureList,
    args: &SelectionArgs,
) -> Result<Option<SelectionRequest>> {
    if args.base.is_none() && args.add.is_empty() && args.remove.is_empty() {
        return Ok(None);
    }
    let base = match args.base.unwrap_or(Base::Keep) {
        Base::Keep => BaseMode::KeepAll,
        Base::Skip => BaseMode::SkipAll,
    };

    let mut request = SelectionRequest::new(base);
    let edits = args
        .add
        .iter()
        .map(|edit| (edit, EditAction::Add))
        .chain(args.remove.iter().map(|edit| (edit, EditAction::Remove)));
    for (edit, action) in edits {
        let edit = parse_edit(features, edit, action)?.affecting_unmarked(args.affect_unmarked);
        request = request.with_edit(edit);
    }
    Ok(Some(request))
}

fn parse_edit(features: &FeatureList, text: &str, action: EditAction) -> Result<FeatureEdit> {
    let parts: Vec<&str> = text.split(':').collect();
    let (name, band) = match parts.as_slice() {
        [name] => (*name, None),
        [name, low, high] => (*name, Some((*low, *high))),
        _ => bail!("Invalid edit '{}', expected NAME, NAME:MIN:MAX or NAME:OP:VALUE", text),
    };
    let feature = features.position(name)?;

    let edit = match band {
        None => FeatureEdit::new(feature, action, i8::MIN, i8::MAX),
        Some((op, value)) if op.parse::<Comparison>().is_ok() => {
            let comparison: Comparison = op.parse()?;
            let value: i8 = value.parse().context("Invalid intensity")?;
            FeatureEdit::compare(feature, action, comparison, value)?
        }
        Some((min, max)) => FeatureEdit::new(
            feature,
            action,
            min.parse().context("Invalid minimum intensity")?,
            max.parse().context("Invalid maximum intensity")?,
        ),
    };
    Ok(edit)
}

fn show_timeline(path: &Path, args: &SelectionArgs) -> Result<()> {
    let project = read_project(path)?;
    let mut features = project.feature_list();
    if let Some(request) = selection_request(&features, args)? {
        features
            .apply(&request)
            .context("Failed to apply selection")?;
    }

    let mut timeline = PlayTimeline::new(project.whole_duration(), project.placements());
    let length = timeline.rebuild(&features);

    print_features(&features);

    println!("\n=== Kept intervals ===");
    for interval in timeline.intervals() {
        let source = project
            .sources
            .iter()
            .find(|source| source.placement.contains(interval.start))
            .map(|source| source.path.display().to_string())
            .unwrap_or_default();
        println!(
            "  {:>8} - {:>8}  ({} frames)  {}",
            interval.start,
            interval.end,
            interval.length(),
            source
        );
    }
    println!(
        "\nKept: {} of {} frames ({:.2} of {:.2} seconds)",
        length,
        project.whole_duration(),
        seconds(&project, length),
        seconds(&project, project.whole_duration())
    );
    Ok(())
}

fn print_features(features: &FeatureList) {
    println!("=== Features ({:?}) ===", features.mode());
    for feature in features.iter() {
        let (min, max) = feature.selection();
        let (rec_min, rec_max) = feature.recommended();
        println!(
            "  {}: {} intervals, intensities {:?}, recommended {}..={}, selected {}..={}{}{}",
            feature.name(),
            feature.intervals().len(),
            feature.intensities(),
            rec_min,
            rec_max,
            min,
            max,
            if feature.active() { "" } else { " (inactive)" },
            if feature.inverted() { " (removed)" } else { "" }
        );
    }
}

fn seconds(project: &Project, frames: FrameId) -> f64 {
    frames as f64 / project.fps
}

/// Delivery statistics of one playback run
#[derive(Debug, Serialize)]
struct PlaybackReport {
    kept_frames: FrameId,
    kept_seconds: f64,
    presented_frames: u64,
    preroll_frames: u64,
    trailing_frames: u64,
    dropped_blocks: u64,
    clock_requests_suppressed: u64,
    interval_switches: u64,
    prefetch_hits: u64,
    cold_seeks: u64,
    prefetch_failures: u64,
    prefetch_waits: u64,
    output_streams: usize,
    blocks_delivered: u64,
    last_time: Tick,
    monotonic: bool,
}

fn run_playback<B: MediaBackend>(
    backend: &B,
    project: &Project,
    selection: &SelectionArgs,
    args: &PlaybackArgs,
) -> Result<()> {
    let config = PlayerConfig {
        prefetch: !args.no_prefetch,
        duplicate_window: args.window,
        ..PlayerConfig::default()
    };

    let (sink, counters) = CountingSink::new();
    let mut controller = Controller::open(backend, project, Box::new(sink), config)
        .context("Failed to open player")?;

    let handle = controller.selection_handle();
    if let Some(request) = selection_request(&handle.features(), selection)? {
        let length = handle
            .preview_length(&request)
            .context("Failed to apply selection")?;
        println!("Selection keeps {} frames", length);
        handle.open_settings();
        handle.confirm(request);
    }

    while controller.demux().context("Playback failed")? == DemuxStatus::Continue {}

    let stats = controller.stats();
    let kept_frames = handle.kept_length();
    let report = PlaybackReport {
        kept_frames,
        kept_seconds: seconds(project, kept_frames),
        presented_frames: stats.sink.presented,
        preroll_frames: stats.sink.preroll,
        trailing_frames: stats.sink.trailing,
        dropped_blocks: stats.sink.dropped,
        clock_requests_suppressed: stats.sink.clock_suppressed,
        interval_switches: stats.interval_switches,
        prefetch_hits: stats.prefetch_hits,
        cold_seeks: stats.cold_seeks,
        prefetch_failures: stats.prefetch_failures,
        prefetch_waits: stats.prefetch_waits,
        output_streams: counters.streams.load(Ordering::Relaxed),
        blocks_delivered: counters.blocks.load(Ordering::Relaxed),
        last_time: controller.time(),
        monotonic: !counters.backwards.load(Ordering::Relaxed),
    };
    controller.close();

    match &args.report {
        Some(path) => {
            let file = File::create(path).context("Failed to create report file")?;
            serde_json::to_writer_pretty(BufWriter::new(file), &report)
                .context("Failed to write report")?;
            println!("Report written to {}", path.display());
        }
        None => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &PlaybackReport) {
    println!("\n=== Playback ===");
    println!(
        "Kept: {} frames ({:.2} seconds)",
        report.kept_frames, report.kept_seconds
    );
    println!(
        "Presented: {} frames, preroll {}, trailing {}",
        report.presented_frames, report.preroll_frames, report.trailing_frames
    );
    println!(
        "Intervals: {} switches, {} prefetched ({} waited), {} seeks, {} prefetch failures",
        report.interval_switches,
        report.prefetch_hits,
        report.prefetch_waits,
        report.cold_seeks,
        report.prefetch_failures
    );
    println!(
        "Output: {} streams, {} blocks, last time {} us, monotonic: {}",
        report.output_streams, report.blocks_delivered, report.last_time, report.monotonic
    );
}

/// Counters shared between the output sink and the report
#[derive(Default)]
struct Counters {
    streams: AtomicUsize,
    blocks: AtomicU64,
    backwards: AtomicBool,
    last_video: AtomicU64,
}

/// Output sink that discards blocks and counts them
struct CountingSink {
    counters: Arc<Counters>,
    video: Option<EsId>,
    next_id: u32,
}

impl CountingSink {
    fn new() -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let sink = Self {
            counters: Arc::clone(&counters),
            video: None,
            next_id: 0,
        };
        (sink, counters)
    }
}

impl StreamSink for CountingSink {
    fn add_stream(&mut self, format: &EsFormat) -> ntff_player::Result<EsId> {
        let id = EsId(self.next_id);
        self.next_id += 1;
        if format.kind == ntff_player::StreamKind::Video && self.video.is_none() {
            self.video = Some(id);
        }
        self.counters.streams.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    fn send_frame(&mut self, id: EsId, block: Block) -> ntff_player::Result<()> {
        self.counters.blocks.fetch_add(1, Ordering::Relaxed);
        if self.video != Some(id) || block.flags.contains(BlockFlags::PREROLL) {
            return Ok(());
        }
        if let Some(dts) = block.dts {
            // stored as time + 1 so that zero means no frame yet
            let next = dts.max(0) as u64 + 1;
            let previous = self.counters.last_video.swap(next, Ordering::Relaxed);
            if previous >= next {
                self.counters.backwards.store(true, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    fn remove_stream(&mut self, _id: EsId) {}

    fn control(&mut self, _request: SinkControl) -> ntff_player::Result<()> {
        Ok(())
    }
}
