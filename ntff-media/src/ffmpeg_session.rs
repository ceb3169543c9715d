//! Demux sessions over media files using FFmpeg

use crate::{Error, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg::Rescale;
use ntff_player::{
    Block, BlockFlags, DemuxSession, DemuxStatus, EsFormat, EsId, MediaBackend, StreamKind,
    StreamSink, Tick,
};
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::{debug, trace};

static FFMPEG_INIT: Once = Once::new();

/// Initialize FFmpeg (call once per application)
fn init_ffmpeg() {
    FFMPEG_INIT.call_once(|| {
        ffmpeg::init().expect("Failed to initialize FFmpeg");
    });
}

/// Backend opening files through libavformat
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        init_ffmpeg();
        Self
    }
}

impl MediaBackend for FfmpegBackend {
    type Session = FfmpegSession;

    fn open(&self, path: &Path) -> ntff_player::Result<FfmpegSession> {
        Ok(FfmpegSession::open(path)?)
    }
}

struct Track {
    format: Option<EsFormat>,
    time_base: ffmpeg::Rational,
    id: Option<EsId>,
}

/// One opened file, read packet by packet
pub struct FfmpegSession {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    tracks: Vec<Track>,
    declared: Vec<(EsId, EsFormat)>,
    frame_rate: f64,
    duration: Tick,
    /// Start time of the video stream; file-local time is relative to it
    origin: Tick,
    time: Tick,
}

// SAFETY: the input context is only touched through `&mut self`
unsafe impl Send for FfmpegSession {}

impl FfmpegSession {
    /// Opens a media file
    pub fn open(path: &Path) -> Result<Self> {
        init_ffmpeg();

        let input = ffmpeg::format::input(&path)?;

        let video = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or(Error::NoVideoStream)?;
        let rate = video.avg_frame_rate();
        let frame_rate = if rate.denominator() != 0 {
            f64::from(rate)
        } else {
            0.0
        };
        let origin = if video.start_time() == ffmpeg::ffi::AV_NOPTS_VALUE {
            0
        } else {
            video
                .start_time()
                .rescale(video.time_base(), ffmpeg::rescale::TIME_BASE)
        };

        let tracks = input
            .streams()
            .map(|stream| {
                let parameters = stream.parameters();
                let kind = match parameters.medium() {
                    ffmpeg::media::Type::Video => Some(StreamKind::Video),
                    ffmpeg::media::Type::Audio => Some(StreamKind::Audio),
                    ffmpeg::media::Type::Subtitle => Some(StreamKind::Subtitle),
                    _ => None,
                };
                let format = kind.map(|kind| EsFormat {
                    kind,
                    codec: parameters.id().name().to_string(),
                    language: stream.metadata().get("language").map(str::to_string),
                });
                Track {
                    format,
                    time_base: stream.time_base(),
                    id: None,
                }
            })
            .collect();

        let duration = input.duration().max(0);
        debug!(
            path = %path.display(),
            frame_rate,
            duration,
            streams = input.nb_streams(),
            "media opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            input,
            tracks,
            declared: Vec::new(),
            frame_rate,
            duration,
            origin,
            time: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn declare(&mut self, sink: &mut dyn StreamSink) -> ntff_player::Result<()> {
        for track in &mut self.tracks {
            if let Some(format) = &track.format {
                let id = sink.add_stream(format)?;
                track.id = Some(id);
                self.declared.push((id, format.clone()));
            }
        }
        Ok(())
    }

    fn to_local(&self, ts: Option<i64>, time_base: ffmpeg::Rational) -> Option<Tick> {
        ts.map(|ts| ts.rescale(time_base, ffmpeg::rescale::TIME_BASE) - self.origin)
    }
}

impl DemuxSession for FfmpegSession {
    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn duration(&self) -> Tick {
        self.duration
    }

    fn time(&self) -> Tick {
        self.time
    }

    fn seek(&mut self, time: Tick, precise: bool) -> ntff_player::Result<()> {
        let target = time + self.origin;
        if precise {
            self.input.seek(target, ..target).map_err(Error::from)?;
        } else {
            self.input.seek(target, ..).map_err(Error::from)?;
        }
        self.time = time;
        trace!(path = %self.path.display(), time, "seek");
        Ok(())
    }

    fn demux(&mut self, sink: &mut dyn StreamSink) -> ntff_player::Result<DemuxStatus> {
        if self.declared.is_empty() {
            self.declare(sink)?;
        }

        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => return Ok(DemuxStatus::Eof),
            Err(err) => return Err(Error::from(err).into()),
        }

        let Some(track) = self.tracks.get(packet.stream()) else {
            return Ok(DemuxStatus::Continue);
        };
        let Some(id) = track.id else {
            return Ok(DemuxStatus::Continue);
        };

        let time_base = track.time_base;
        let block = Block {
            pts: self.to_local(packet.pts(), time_base),
            dts: self.to_local(packet.dts(), time_base),
            duration: packet
                .duration()
                .rescale(time_base, ffmpeg::rescale::TIME_BASE),
            flags: if packet.is_key() {
                BlockFlags::KEYFRAME
            } else {
                BlockFlags::NONE
            },
            payload: packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
        };
        if let Some(time) = block.timestamp() {
            self.time = time;
        }
        sink.send_frame(id, block)?;
        Ok(DemuxStatus::Continue)
    }

    fn streams(&self) -> Vec<(EsId, EsFormat)> {
        self.declared.clone()
    }
}
