//! ffmpeg-backed [`RenderBackend`].
//!
//! A composition renders in a single ffmpeg invocation: one trimmed input
//! per segment, a per-segment filter chain that orients, scales, letterboxes
//! and color-adjusts it, and a `concat` filter joining everything in order.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use montage_common::error::{EngineError, EngineResult};
use montage_project_model::Transform2D;

use crate::cancel::CancelFlag;
use crate::composition::{Composition, Segment};
use crate::export::{
    ExportProgress, ExportStage, OutputProfile, ProgressCallback, RenderBackend, RenderRequest,
};
use crate::filter::AdjustmentOp;
use crate::probe::tool_responds;

/// Lines of ffmpeg stderr kept in failure messages.
const STDERR_TAIL_LINES: usize = 20;

/// How often a silent ffmpeg is checked for cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Output time standing still this long is logged.
const STALL_WARNING: Duration = Duration::from_secs(10);

/// Angle tolerance when recognizing quarter turns, in degrees.
const QUARTER_TURN_EPSILON: f64 = 0.01;

/// Renders compositions by shelling out to ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    binary: String,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[derive(Debug, Clone)]
struct RenderPlan {
    args: Vec<String>,
    total_frames: u64,
    expected_duration_secs: f64,
}

impl FfmpegBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn build_plan(&self, request: &RenderRequest<'_>) -> RenderPlan {
        let composition = request.composition;
        let profile = request.profile;
        let duration_secs = composition.duration().as_secs_f64();

        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-y".into(),
            "-progress".into(),
            "pipe:1".into(),
            "-nostats".into(),
        ];

        for segment in composition.segments() {
            args.extend([
                "-noautorotate".into(),
                "-ss".into(),
                format!("{:.6}", segment.source_range.start.as_secs_f64()),
                "-t".into(),
                format!("{:.6}", segment.source_range.duration.as_secs_f64()),
                "-i".into(),
                segment.source.tool_input(),
            ]);
        }

        let with_audio = composition.has_audio();
        args.push("-filter_complex".into());
        args.push(build_filter_graph(composition, profile));
        args.extend(["-map".into(), "[vout]".into()]);
        if with_audio {
            args.extend(["-map".into(), "[aout]".into()]);
        }
        args.extend(codec_args_for_profile(profile, with_audio));
        args.extend([
            "-t".into(),
            format!("{duration_secs:.6}"),
            request.output_path.display().to_string(),
        ]);

        RenderPlan {
            args,
            total_frames: (duration_secs * profile.frame_rate as f64).ceil() as u64,
            expected_duration_secs: duration_secs,
        }
    }

    fn run_ffmpeg(
        &self,
        plan: &RenderPlan,
        output_path: &Path,
        cancel: &CancelFlag,
        progress: Option<&ProgressCallback>,
    ) -> EngineResult<()> {
        tracing::debug!(args = ?plan.args, "Running ffmpeg");
        let mut child = Command::new(&self.binary)
            .args(&plan.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::unsupported(format!("Failed to start {}: {e}", self.binary)))?;
        tracing::info!(pid = child.id(), total_frames = plan.total_frames, "ffmpeg started");

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            abort_child(&mut child, output_path);
            return Err(EngineError::encoder("ffmpeg pipes unavailable"));
        };

        // stderr must be drained or ffmpeg stalls on a full pipe.
        let stderr_task = std::thread::spawn(move || {
            let mut text = String::new();
            if let Err(err) = BufReader::new(stderr).read_to_string(&mut text) {
                text.push_str(&format!("\n<stderr read failed: {err}>"));
            }
            text
        });

        // Progress lines arrive on a channel so cancellation is seen even
        // while ffmpeg prints nothing.
        let (lines_tx, lines) = mpsc::channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let failed = line.is_err();
                if lines_tx.send(line).is_err() || failed {
                    break;
                }
            }
        });

        let mut tracker = ProgressTracker::new(plan.total_frames, plan.expected_duration_secs);
        loop {
            if cancel.is_cancelled() {
                tracing::info!(pid = child.id(), "Cancelling ffmpeg");
                abort_child(&mut child, output_path);
                return Err(EngineError::Cancelled);
            }

            match lines.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(Ok(line)) => {
                    if let (Some(report), Some(cb)) = (tracker.feed(&line), progress) {
                        cb(report);
                    }
                }
                Ok(Err(err)) => {
                    abort_child(&mut child, output_path);
                    return Err(EngineError::encoder(format!("Lost ffmpeg progress stream: {err}")));
                }
                Err(RecvTimeoutError::Timeout) => tracker.warn_if_stalled(),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // stdout closed; ffmpeg may still be flushing the container.
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if cancel.is_cancelled() => {
                    abort_child(&mut child, output_path);
                    return Err(EngineError::Cancelled);
                }
                Ok(None) => std::thread::sleep(CANCEL_POLL_INTERVAL),
                Err(e) => {
                    abort_child(&mut child, output_path);
                    return Err(EngineError::encoder(format!("Failed to wait on ffmpeg: {e}")));
                }
            }
        };
        let stderr_text = stderr_task
            .join()
            .unwrap_or_else(|_| "<stderr reader panicked>".to_string());

        if cancel.is_cancelled() {
            let _ = std::fs::remove_file(output_path);
            return Err(EngineError::Cancelled);
        }
        if !status.success() {
            return Err(EngineError::encoder(format!(
                "ffmpeg exited with {status}: {}",
                stderr_tail(&stderr_text, STDERR_TAIL_LINES)
            )));
        }

        if let Some(cb) = progress {
            cb(ExportProgress::at_stage(ExportStage::Complete, plan.total_frames));
        }
        Ok(())
    }
}

/// Kill and reap `child`, then drop whatever it wrote. Reader threads are
/// left to finish on their own once the pipes close.
fn abort_child(child: &mut Child, output_path: &Path) {
    if let Err(err) = child.kill() {
        tracing::debug!(error = %err, "ffmpeg already exited");
    }
    if let Err(err) = child.wait() {
        tracing::warn!(error = %err, "Failed to reap ffmpeg");
    }
    let _ = std::fs::remove_file(output_path);
}

impl RenderBackend for FfmpegBackend {
    fn render(
        &self,
        request: &RenderRequest<'_>,
        cancel: &CancelFlag,
        progress: Option<&ProgressCallback>,
    ) -> EngineResult<()> {
        let started = std::time::Instant::now();
        let plan = self.build_plan(request);

        if let Some(cb) = progress {
            cb(ExportProgress::at_stage(ExportStage::Preparing, plan.total_frames));
        }

        self.run_ffmpeg(&plan, request.output_path, cancel, progress)?;
        tracing::info!(
            elapsed_secs = started.elapsed().as_secs_f64(),
            output = %request.output_path.display(),
            "ffmpeg render finished"
        );
        Ok(())
    }

    fn is_available(&self) -> bool {
        tool_responds(&self.binary)
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Build the `-filter_complex` graph for a composition.
fn build_filter_graph(composition: &Composition, profile: &OutputProfile) -> String {
    let (frame_w, frame_h) = composition.anchor().even_pixels();
    let with_audio = composition.has_audio();
    let mut chains = Vec::with_capacity(composition.segments().len() * 2 + 1);
    let mut concat_inputs = String::new();

    for (input, segment) in composition.segments().iter().enumerate() {
        chains.push(video_chain(input, segment, frame_w, frame_h, profile));
        concat_inputs.push_str(&format!("[v{input}]"));

        if with_audio {
            chains.push(audio_chain(input, segment, profile));
            concat_inputs.push_str(&format!("[a{input}]"));
        }
    }

    let outputs = if with_audio { "[vout][aout]" } else { "[vout]" };
    chains.push(format!(
        "{concat_inputs}concat=n={n}:v=1:a={a}{outputs}",
        n = composition.segments().len(),
        a = u8::from(with_audio),
    ));

    chains.join(";")
}

fn video_chain(
    input: usize,
    segment: &Segment,
    frame_w: u32,
    frame_h: u32,
    profile: &OutputProfile,
) -> String {
    let (w, h) = segment.transform.render_size.even_pixels();
    let mut filters = orientation_filters(&segment.transform.matrix);
    filters.push(format!(
        "scale={w}:{h}:flags=lanczos",
        w = w.min(frame_w),
        h = h.min(frame_h)
    ));
    filters.push(format!(
        "pad={frame_w}:{frame_h}:(ow-iw)/2:(oh-ih)/2:color=black"
    ));
    filters.push("setsar=1".to_string());
    filters.push(format!("fps={}", profile.frame_rate));
    filters.push(format!("format={}", profile.pixel_format));
    if let Some(adjust) = adjustment_filter(&segment.adjustment.op) {
        filters.push(adjust);
    }

    format!("[{input}:v]{}[v{input}]", filters.join(","))
}

fn audio_chain(input: usize, segment: &Segment, profile: &OutputProfile) -> String {
    let duration = segment.timeline_range.duration.as_secs_f64();
    let layout = if profile.audio_channels == 1 {
        "mono"
    } else {
        "stereo"
    };
    if segment.has_audio {
        format!(
            "[{input}:a]aresample={rate},aformat=sample_fmts=fltp:channel_layouts={layout},apad,atrim=0:{duration:.6}[a{input}]",
            rate = profile.audio_sample_rate,
        )
    } else {
        format!(
            "anullsrc=r={rate}:cl={layout},atrim=0:{duration:.6}[a{input}]",
            rate = profile.audio_sample_rate,
        )
    }
}

/// ffmpeg filters that bring a stored frame upright.
fn orientation_filters(matrix: &Transform2D) -> Vec<String> {
    let mut filters = Vec::new();
    if matrix.determinant() < 0.0 {
        filters.push("hflip".to_string());
    }

    let angle = matrix.rotation_angle_degrees();
    let near = |target: f64| (angle - target).abs() < QUARTER_TURN_EPSILON;
    if near(0.0) || near(360.0) {
        // upright
    } else if near(90.0) {
        filters.push("transpose=clock".to_string());
    } else if near(180.0) {
        filters.push("hflip".to_string());
        filters.push("vflip".to_string());
    } else if near(270.0) {
        filters.push("transpose=cclock".to_string());
    } else {
        let rad = angle.to_radians();
        filters.push(format!(
            "rotate={rad:.6}:ow=rotw({rad:.6}):oh=roth({rad:.6}):c=black"
        ));
    }
    filters
}

fn adjustment_filter(op: &AdjustmentOp) -> Option<String> {
    match *op {
        AdjustmentOp::Identity => None,
        AdjustmentOp::BrightnessOffset(v) => Some(format!("eq=brightness={v:.4}")),
        AdjustmentOp::ContrastGain(v) => Some(format!("eq=contrast={v:.4}")),
        AdjustmentOp::SaturationGain(v) => Some(format!("eq=saturation={v:.4}")),
        AdjustmentOp::VibranceGain(v) => Some(format!("vibrance=intensity={v:.4}")),
        AdjustmentOp::WhiteBalance { kelvin } => {
            Some(format!("colortemperature=temperature={kelvin:.0}"))
        }
    }
}

fn codec_args_for_profile(profile: &OutputProfile, with_audio: bool) -> Vec<String> {
    let mut args = vec![
        "-r".to_string(),
        profile.frame_rate.to_string(),
        "-c:v".to_string(),
        profile.video_codec.to_string(),
        "-preset".to_string(),
        profile.preset.to_string(),
        "-profile:v".to_string(),
        profile.h264_profile.to_string(),
        "-crf".to_string(),
        profile.crf.to_string(),
        "-pix_fmt".to_string(),
        profile.pixel_format.to_string(),
    ];

    if with_audio {
        args.extend([
            "-c:a".to_string(),
            profile.audio_codec.to_string(),
            "-b:a".to_string(),
            format!("{}k", profile.audio_bitrate_kbps),
            "-ar".to_string(),
            profile.audio_sample_rate.to_string(),
            "-ac".to_string(),
            profile.audio_channels.to_string(),
        ]);
    } else {
        args.push("-an".to_string());
    }

    args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    args
}

fn stderr_tail(stderr: &str, lines: usize) -> String {
    let all: Vec<&str> = stderr.trim().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

/// Folds `-progress pipe:1` key/value lines into [`ExportProgress`]
/// reports, one per `progress=` block.
#[derive(Debug)]
struct ProgressTracker {
    total_frames: u64,
    expected_secs: f64,
    started: Instant,
    out_time_secs: f64,
    finished: bool,
    last_advance: Instant,
}

impl ProgressTracker {
    fn new(total_frames: u64, expected_secs: f64) -> Self {
        let now = Instant::now();
        Self {
            total_frames,
            expected_secs,
            started: now,
            out_time_secs: 0.0,
            finished: false,
            last_advance: now,
        }
    }

    fn feed(&mut self, line: &str) -> Option<ExportProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            // out_time_ms is microseconds too.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<f64>() {
                    let secs = us / 1_000_000.0;
                    if secs > self.out_time_secs {
                        self.last_advance = Instant::now();
                    }
                    self.out_time_secs = secs;
                }
                None
            }
            "progress" => {
                self.finished = value == "end";
                Some(self.report(self.started.elapsed().as_secs_f64()))
            }
            _ => None,
        }
    }

    fn report(&self, elapsed_secs: f64) -> ExportProgress {
        let fraction = if self.expected_secs > 0.0 {
            (self.out_time_secs / self.expected_secs).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let eta_secs = if fraction > 0.0 {
            (elapsed_secs / fraction - elapsed_secs).max(0.0)
        } else {
            0.0
        };

        ExportProgress {
            progress: if self.finished { 1.0 } else { fraction },
            frames_rendered: (fraction * self.total_frames as f64).round() as u64,
            total_frames: self.total_frames,
            eta_secs,
            stage: if self.finished {
                ExportStage::Finalizing
            } else {
                ExportStage::Rendering
            },
        }
    }

    fn warn_if_stalled(&mut self) {
        if self.last_advance.elapsed() >= STALL_WARNING {
            tracing::warn!(
                out_time_secs = self.out_time_secs,
                elapsed_secs = self.started.elapsed().as_secs_f64(),
                "ffmpeg output time has not advanced"
            );
            self.last_advance = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::composition::CompositionBuilder;
    use crate::export::OUTPUT_PROFILE;
    use crate::probe::MediaProbe;
    use montage_project_model::{
        AudioTrack, Clip, Filter, MediaLocator, MediaTrack, Size, SourceMedia,
    };

    struct Fixtures(HashMap<String, SourceMedia>);

    impl MediaProbe for Fixtures {
        fn probe(&self, locator: &MediaLocator) -> EngineResult<SourceMedia> {
            self.0
                .get(locator.as_str())
                .cloned()
                .ok_or_else(|| EngineError::source_unreadable(locator.as_str(), "missing"))
        }
    }

    fn source(name: &str, w: f64, h: f64, rotation: Option<f64>, audio: bool) -> (String, SourceMedia) {
        (
            name.to_string(),
            SourceMedia {
                locator: MediaLocator::new(name),
                video: Some(MediaTrack {
                    codec: "h264".to_string(),
                    natural_size: Size::new(w, h),
                    orientation: rotation.map(Transform2D::rotation_degrees),
                    nominal_frame_rate: Some(30.0),
                }),
                audio: audio.then(|| AudioTrack {
                    codec: "aac".to_string(),
                    sample_rate: 44_100,
                    channels: 2,
                }),
                duration: Some(Duration::from_secs(30)),
            },
        )
    }

    fn composition(audio_b: bool) -> Composition {
        let probe = Fixtures(HashMap::from([
            source("/m/a.mp4", 1920.0, 1080.0, None, true),
            source("/m/b.mov", 1080.0, 1920.0, Some(90.0), audio_b),
        ]));
        let clips = [
            Clip::new(MediaLocator::new("/m/a.mp4"), Duration::from_secs(1), Duration::from_secs(2)),
            Clip::new(MediaLocator::new("/m/b.mov"), Duration::ZERO, Duration::from_millis(3500))
                .with_filter(Some(Filter::Saturation(1.25))),
        ];
        CompositionBuilder::new(&probe).build(&clips).unwrap()
    }

    #[test]
    fn test_plan_has_one_trimmed_input_per_segment() {
        let comp = composition(true);
        let out = PathBuf::from("/tmp/out.mp4");
        let plan = FfmpegBackend::default().build_plan(&RenderRequest {
            composition: &comp,
            output_path: &out,
            profile: &OUTPUT_PROFILE,
        });

        assert_eq!(plan.args.iter().filter(|a| *a == "-i").count(), 2);
        assert_eq!(plan.args.iter().filter(|a| *a == "-noautorotate").count(), 2);
        let ss = plan.args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(plan.args[ss + 1], "1.000000");
        assert_eq!(plan.args.last().unwrap(), "/tmp/out.mp4");
        assert!(plan.args.contains(&"libx264".to_string()));
        assert!(plan.args.contains(&"+faststart".to_string()));
        assert_eq!(plan.total_frames, 165);
        assert_eq!(plan.expected_duration_secs, 5.5);
    }

    #[test]
    fn test_filter_graph_orients_scales_and_adjusts() {
        let graph = build_filter_graph(&composition(true), &OUTPUT_PROFILE);
        assert!(graph.starts_with("[0:v]scale=1920:1080:flags=lanczos,pad=1920:1080"));
        assert!(graph.contains("[1:v]transpose=clock,scale=1920:1080"));
        assert!(graph.contains("eq=saturation=1.2500[v1]"));
        assert!(graph.ends_with("[v0][a0][v1][a1]concat=n=2:v=1:a=1[vout][aout]"));
    }

    #[test]
    fn test_missing_audio_is_filled_with_silence() {
        let graph = build_filter_graph(&composition(false), &OUTPUT_PROFILE);
        assert!(graph.contains("[0:a]aresample=48000"));
        assert!(graph.contains("anullsrc=r=48000:cl=stereo,atrim=0:3.500000[a1]"));
    }

    #[test]
    fn test_video_only_composition_has_no_audio_map() {
        let probe = Fixtures(HashMap::from([source("/m/a.mp4", 640.0, 480.0, None, false)]));
        let clips = [Clip::new(
            MediaLocator::new("/m/a.mp4"),
            Duration::ZERO,
            Duration::from_secs(1),
        )];
        let comp = CompositionBuilder::new(&probe).build(&clips).unwrap();
        let out = PathBuf::from("out.mp4");
        let plan = FfmpegBackend::default().build_plan(&RenderRequest {
            composition: &comp,
            output_path: &out,
            profile: &OUTPUT_PROFILE,
        });
        assert!(!plan.args.contains(&"[aout]".to_string()));
        assert!(plan.args.contains(&"-an".to_string()));
        assert!(plan.args.iter().any(|a| a.ends_with("concat=n=1:v=1:a=0[vout]")));
    }

    #[test]
    fn test_orientation_filters_for_quarter_turns() {
        assert!(orientation_filters(&Transform2D::IDENTITY).is_empty());
        assert_eq!(
            orientation_filters(&Transform2D::rotation_degrees(270.0)),
            vec!["transpose=cclock"]
        );
        assert_eq!(
            orientation_filters(&Transform2D::rotation_degrees(180.0)),
            vec!["hflip", "vflip"]
        );
        assert!(orientation_filters(&Transform2D::rotation_degrees(30.0))[0].starts_with("rotate="));
    }

    #[test]
    fn test_tracker_reports_once_per_block() {
        let mut tracker = ProgressTracker::new(300, 10.0);
        assert!(tracker.feed("frame=75").is_none());
        assert!(tracker.feed("out_time_us=2500000").is_none());
        let report = tracker.feed("progress=continue").unwrap();
        assert_eq!(report.progress, 0.25);
        assert_eq!(report.frames_rendered, 75);
        assert_eq!(report.stage, ExportStage::Rendering);

        assert_eq!(tracker.report(1.0).eta_secs, 3.0);

        let report = tracker.feed("progress=end\n").unwrap();
        assert_eq!(report.progress, 1.0);
        assert_eq!(report.stage, ExportStage::Finalizing);
    }

    /// Writes an executable shell script standing in for ffmpeg.
    #[cfg(unix)]
    fn stand_in(name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir().join(format!("montage_ffmpeg_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let script = dir.join("ffmpeg");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    fn render_with(script: &Path, cancel: &CancelFlag) -> (EngineResult<()>, Vec<ExportProgress>, PathBuf) {
        let comp = composition(true);
        let out = script.with_file_name("out.mp4");
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let result = {
            let sink = std::sync::Arc::clone(&seen);
            let cb: &ProgressCallback = &move |p| sink.lock().unwrap().push(p);
            FfmpegBackend::new(script.display().to_string()).render(
                &RenderRequest {
                    composition: &comp,
                    output_path: &out,
                    profile: &OUTPUT_PROFILE,
                },
                cancel,
                Some(cb),
            )
        };
        (result, std::sync::Arc::try_unwrap(seen).unwrap().into_inner().unwrap(), out)
    }

    #[cfg(unix)]
    #[test]
    fn test_silent_ffmpeg_is_cancelled_promptly() {
        let script = stand_in("silent", "exec sleep 5");
        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });

        let started = Instant::now();
        let (result, _, out) = render_with(&script, &cancel);
        canceller.join().unwrap();

        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!out.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_progress_lines_reach_callback() {
        let script = stand_in(
            "progress",
            "echo out_time_us=2750000\necho progress=continue\necho out_time_us=5500000\necho progress=end",
        );
        let (result, seen, _) = render_with(&script, &CancelFlag::new());

        result.unwrap();
        let stages: Vec<ExportStage> = seen.iter().map(|p| p.stage).collect();
        assert_eq!(
            stages,
            vec![
                ExportStage::Preparing,
                ExportStage::Rendering,
                ExportStage::Finalizing,
                ExportStage::Complete
            ]
        );
        assert_eq!(seen[1].progress, 0.5);
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_reports_stderr_tail() {
        let script = stand_in("crash", "echo 'Invalid data found' >&2\nexit 3");
        let (result, _, _) = render_with(&script, &CancelFlag::new());

        match result {
            Err(EngineError::EncoderFailure { reason }) => {
                assert!(reason.contains("Invalid data found"), "{reason}");
            }
            other => panic!("expected encoder failure, got {other:?}"),
        }
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr = "a\nb\nc\nd\n";
        assert_eq!(stderr_tail(stderr, 2), "c\nd");
        assert_eq!(stderr_tail("", 5), "");
    }
}
