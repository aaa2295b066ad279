//! Format probing: turn a source locator into a validated [`TrackFormat`].
//!
//! [`MediaProbe`] is the seam to whatever can read container metadata
//! (ffprobe in production, fixtures in tests). [`probe_track_format`] is the
//! pure validation step on top of it.

use std::process::{Command, Stdio};
use std::time::Duration;

use serde::Deserialize;

use montage_common::error::{EngineError, EngineResult};
use montage_project_model::{
    AudioTrack, MediaLocator, MediaTrack, Rect, Size, SourceMedia, TrackFormat, Transform2D,
};

/// Frame rate assumed when a track does not declare one.
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Reads container-level metadata for a source.
pub trait MediaProbe: Send + Sync {
    fn probe(&self, locator: &MediaLocator) -> EngineResult<SourceMedia>;
}

/// A probed source together with its validated video format.
#[derive(Debug, Clone)]
pub struct ProbedSource {
    pub media: SourceMedia,
    pub track: MediaTrack,
    pub format: TrackFormat,
}

/// Validate a video track and compute its presentation format.
///
/// The orientation transform is applied to the natural-size rectangle and
/// the absolute extent of the result becomes `dimensions`. A missing
/// orientation is the identity; a missing frame rate falls back to
/// [`DEFAULT_FRAME_RATE`]. Degenerate geometry is the only failure.
pub fn probe_track_format(locator: &MediaLocator, track: &MediaTrack) -> EngineResult<TrackFormat> {
    let invalid = |size: Size| EngineError::InvalidGeometry {
        locator: locator.to_string(),
        width: size.width,
        height: size.height,
    };

    if !track.natural_size.is_valid() {
        return Err(invalid(track.natural_size));
    }

    let oriented = track
        .orientation_or_identity()
        .apply_to_rect(Rect::from_size(track.natural_size));
    let dimensions = Size::new(oriented.width.abs(), oriented.height.abs());

    let frame_rate = track
        .nominal_frame_rate
        .filter(|fps| fps.is_finite() && *fps > 0.0)
        .unwrap_or(DEFAULT_FRAME_RATE);

    TrackFormat::new(track.codec.clone(), dimensions, frame_rate).ok_or_else(|| invalid(dimensions))
}

/// Probe `locator` and validate its primary video track.
pub fn probe_source(probe: &dyn MediaProbe, locator: &MediaLocator) -> EngineResult<ProbedSource> {
    let media = probe.probe(locator)?;
    let track = media
        .video
        .clone()
        .ok_or_else(|| EngineError::source_unreadable(locator.as_str(), "no video track"))?;
    let format = probe_track_format(locator, &track)?;

    tracing::debug!(
        source = %locator,
        codec = format.codec(),
        width = format.dimensions().width,
        height = format.dimensions().height,
        fps = format.frame_rate(),
        has_audio = media.has_audio(),
        "Probed source"
    );

    Ok(ProbedSource {
        media,
        track,
        format,
    })
}

/// [`MediaProbe`] backed by the `ffprobe` command-line tool.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: String,
}

impl FfprobeProbe {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        tool_responds(&self.binary)
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl MediaProbe for FfprobeProbe {
    fn probe(&self, locator: &MediaLocator) -> EngineResult<SourceMedia> {
        let output = Command::new(&self.binary)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
            ])
            .arg(locator.tool_input())
            .stdin(Stdio::null())
            .output()
            .map_err(|e| EngineError::unsupported(format!("Failed to run {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::source_unreadable(
                locator.as_str(),
                format!("ffprobe exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        parse_ffprobe_json(locator, &output.stdout)
    }
}

/// Whether `binary -version` runs successfully.
pub(crate) fn tool_responds(binary: &str) -> bool {
    Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    duration: Option<String>,
    #[serde(default)]
    tags: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
    #[serde(default)]
    disposition: FfprobeDisposition,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

fn parse_ffprobe_json(locator: &MediaLocator, raw: &[u8]) -> EngineResult<SourceMedia> {
    let parsed: FfprobeOutput = serde_json::from_slice(raw).map_err(|e| {
        EngineError::source_unreadable(locator.as_str(), format!("unparsable ffprobe output: {e}"))
    })?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video") && s.disposition.attached_pic == 0)
        .map(|s| MediaTrack {
            codec: s.codec_name.clone().unwrap_or_else(|| "unknown".to_string()),
            natural_size: Size::new(
                s.width.unwrap_or(0) as f64,
                s.height.unwrap_or(0) as f64,
            ),
            orientation: stream_rotation_cw(s).map(Transform2D::rotation_degrees),
            nominal_frame_rate: s
                .avg_frame_rate
                .as_deref()
                .and_then(parse_frame_rate)
                .or_else(|| s.r_frame_rate.as_deref().and_then(parse_frame_rate)),
        });

    let audio_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));
    let audio = audio_stream.map(|s| AudioTrack {
        codec: s.codec_name.clone().unwrap_or_else(|| "unknown".to_string()),
        sample_rate: s
            .sample_rate
            .as_deref()
            .and_then(|r| r.parse().ok())
            .unwrap_or(0),
        channels: s.channels.unwrap_or(0),
    });

    let video_duration = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .and_then(|s| s.duration.as_deref())
        .and_then(parse_secs);
    let duration = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_secs)
        .or(video_duration);

    Ok(SourceMedia {
        locator: locator.clone(),
        video,
        audio,
        duration,
    })
}

/// Clockwise display rotation in degrees, `None` when the stream is upright.
///
/// Display-matrix side data reports counter-clockwise degrees; the legacy
/// `rotate` tag reports clockwise degrees.
fn stream_rotation_cw(stream: &FfprobeStream) -> Option<f64> {
    let from_side_data = stream
        .side_data_list
        .iter()
        .find_map(|sd| sd.rotation)
        .map(|ccw| -ccw);
    let from_tag = || {
        stream.tags.get("rotate").and_then(|v| match v {
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            serde_json::Value::Number(n) => n.as_f64(),
            _ => None,
        })
    };

    from_side_data
        .or_else(from_tag)
        .map(|deg| deg.rem_euclid(360.0))
        .filter(|deg| *deg != 0.0)
}

fn parse_frame_rate(raw: &str) -> Option<f64> {
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

fn parse_secs(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}
