use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use montage_common::error::{EngineError, EngineResult, FailureKind};
use montage_project_model::{
    AudioTrack, Clip, EditList, MediaLocator, MediaTrack, Size, SourceMedia, Transform2D,
};
use montage_render_engine::{
    AdjustmentOp, CancelFlag, CompositionBuilder, ExportPipeline, ExportStatus, MediaProbe,
    OutputTarget, PipelineConfig, ProgressCallback, RenderBackend, RenderRequest,
};

#[derive(Default)]
struct StubProbe {
    sources: Mutex<HashMap<String, SourceMedia>>,
}

impl StubProbe {
    fn add(&self, locator: &str, size: Size, rotation: Option<f64>, audio: bool, duration: Duration) {
        self.sources.lock().unwrap().insert(
            locator.to_string(),
            SourceMedia {
                locator: MediaLocator::new(locator),
                video: Some(MediaTrack {
                    codec: "h264".to_string(),
                    natural_size: size,
                    orientation: rotation.map(Transform2D::rotation_degrees),
                    nominal_frame_rate: Some(30.0),
                }),
                audio: audio.then(|| AudioTrack {
                    codec: "aac".to_string(),
                    sample_rate: 48_000,
                    channels: 2,
                }),
                duration: Some(duration),
            },
        );
    }
}

impl MediaProbe for StubProbe {
    fn probe(&self, locator: &MediaLocator) -> EngineResult<SourceMedia> {
        self.sources
            .lock()
            .unwrap()
            .get(locator.as_str())
            .cloned()
            .ok_or_else(|| EngineError::source_unreadable(locator.as_str(), "not found"))
    }
}

/// Writes a placeholder file and registers it with the probe as a video of
/// the composition's duration.
struct FakeBackend {
    probe: Arc<StubProbe>,
    calls: AtomicUsize,
    /// Calls (1-based) that fail with an encoder error.
    failing_calls: Vec<usize>,
    /// Calls (1-based) that write an empty file.
    empty_calls: Vec<usize>,
    /// Calls (1-based) that block until cancelled.
    blocking_calls: Vec<usize>,
}

impl FakeBackend {
    fn new(probe: Arc<StubProbe>) -> Self {
        Self {
            probe,
            calls: AtomicUsize::new(0),
            failing_calls: vec![],
            empty_calls: vec![],
            blocking_calls: vec![],
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RenderBackend for FakeBackend {
    fn render(
        &self,
        request: &RenderRequest<'_>,
        cancel: &CancelFlag,
        _progress: Option<&ProgressCallback>,
    ) -> EngineResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        std::fs::write(request.output_path, b"partial")?;

        if self.blocking_calls.contains(&call) {
            for _ in 0..500 {
                if cancel.is_cancelled() {
                    let _ = std::fs::remove_file(request.output_path);
                    return Err(EngineError::Cancelled);
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        }
        if self.failing_calls.contains(&call) {
            return Err(EngineError::encoder("simulated x264 crash"));
        }
        if self.empty_calls.contains(&call) {
            std::fs::write(request.output_path, b"")?;
            return Ok(());
        }

        std::fs::write(request.output_path, b"rendered")?;
        self.probe.add(
            &request.output_path.display().to_string(),
            request.composition.anchor(),
            None,
            request.composition.has_audio(),
            request.composition.duration(),
        );
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "fake"
    }
}

fn temp_config(name: &str) -> PipelineConfig {
    let root = std::env::temp_dir().join(format!("montage_it_{name}"));
    let _ = std::fs::remove_dir_all(&root);
    PipelineConfig {
        preview_dir: root.join("previews"),
        export_dir: root.join("exports"),
        encoder_retries: 1,
    }
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default()
}

fn fixture_edit_list() -> EditList {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("fixtures")
        .join("edit-lists")
        .join("three-clips.json");
    EditList::load(path).expect("fixture edit list should load")
}

fn fixture_probe() -> Arc<StubProbe> {
    let probe = Arc::new(StubProbe::default());
    let secs = Duration::from_secs;
    probe.add(
        "https://media.example.com/listing/lobby.mp4",
        Size::new(1920.0, 1080.0),
        None,
        true,
        secs(12),
    );
    probe.add(
        "https://media.example.com/listing/stairs-portrait.mov",
        Size::new(1080.0, 1920.0),
        Some(90.0),
        false,
        secs(8),
    );
    probe.add(
        "https://media.example.com/listing/terrace.mp4",
        Size::new(3840.0, 2160.0),
        None,
        true,
        secs(20),
    );
    probe
}

#[test]
fn fixture_composition_sums_durations_and_scopes_filters() {
    let list = fixture_edit_list();
    let probe = fixture_probe();
    let comp = CompositionBuilder::new(probe.as_ref())
        .build(&list.clips)
        .expect("fixture should compose");

    assert_eq!(comp.duration(), Duration::from_millis(6500));
    assert_eq!(comp.duration(), list.total_duration());
    assert_eq!(comp.anchor(), Size::new(1920.0, 1080.0));

    let segments = comp.segments();
    assert_eq!(segments.len(), 3);
    assert!(segments[0].adjustment.op.is_identity());
    assert_eq!(segments[1].adjustment.op, AdjustmentOp::BrightnessOffset(0.15));
    assert_eq!(
        segments[1].adjustment.time_range,
        segments[1].timeline_range
    );
    assert_eq!(segments[1].transform.render_size, Size::new(1920.0, 1080.0));
    assert_eq!(segments[2].transform.scale, 0.5);
    assert_eq!(segments[2].timeline_range.start, Duration::from_millis(5500));
}

#[tokio::test]
async fn export_succeeds_with_composition_duration() {
    let config = temp_config("success");
    let probe = fixture_probe();
    let backend = Arc::new(FakeBackend::new(Arc::clone(&probe)));
    let mut pipeline = ExportPipeline::new(config.clone(), probe.clone(), backend.clone());

    let job = pipeline.start(fixture_edit_list().clips, OutputTarget::Preview);
    let status = job.wait().await;

    let ExportStatus::Succeeded(output) = status else {
        panic!("expected success, got {status:?}");
    };
    assert_eq!(output.duration, Duration::from_millis(6500));
    assert!(output.path.starts_with(&config.preview_dir));
    assert!(output.path.exists());
    assert_eq!(job.seq(), 1);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn unreadable_clips_fail_without_output() {
    let config = temp_config("no_valid_clip");
    let probe = Arc::new(StubProbe::default());
    let backend = Arc::new(FakeBackend::new(Arc::clone(&probe)));
    let mut pipeline = ExportPipeline::new(config.clone(), probe, backend.clone());

    let clips = vec![
        Clip::new(MediaLocator::new("gone-1.mp4"), Duration::ZERO, Duration::from_secs(1)),
        Clip::new(MediaLocator::new("gone-2.mp4"), Duration::ZERO, Duration::from_secs(1)),
    ];
    let status = pipeline.start(clips, OutputTarget::Final).wait().await;

    let ExportStatus::Failed(failure) = status else {
        panic!("expected failure, got {status:?}");
    };
    assert_eq!(failure.kind, FailureKind::NoValidClip);
    assert_eq!(backend.calls(), 0);
    assert!(files_in(&config.export_dir).is_empty());
}

#[tokio::test]
async fn degenerate_clip_fails_job_without_output() {
    let config = temp_config("invalid_geometry");
    let probe = fixture_probe();
    probe.add(
        "https://media.example.com/listing/corrupt.mp4",
        Size::new(0.0, 1080.0),
        None,
        false,
        Duration::from_secs(5),
    );
    let backend = Arc::new(FakeBackend::new(Arc::clone(&probe)));
    let mut pipeline = ExportPipeline::new(config.clone(), probe, backend.clone());

    let mut clips = fixture_edit_list().clips;
    clips.push(Clip::new(
        MediaLocator::new("https://media.example.com/listing/corrupt.mp4"),
        Duration::ZERO,
        Duration::from_secs(1),
    ));
    let status = pipeline.start(clips, OutputTarget::Final).wait().await;

    let ExportStatus::Failed(failure) = status else {
        panic!("expected failure, got {status:?}");
    };
    assert_eq!(failure.kind, FailureKind::InvalidGeometry);
    assert!(failure.message.contains("corrupt.mp4"), "{}", failure.message);
    assert_eq!(backend.calls(), 0);
    assert!(files_in(&config.export_dir).is_empty());
}

#[tokio::test]
async fn empty_clip_list_fails_with_empty_input() {
    let config = temp_config("empty_input");
    let probe = Arc::new(StubProbe::default());
    let backend = Arc::new(FakeBackend::new(Arc::clone(&probe)));
    let mut pipeline = ExportPipeline::new(config, probe, backend);

    let status = pipeline.start(Vec::<Clip>::new(), OutputTarget::Preview).wait().await;
    assert!(matches!(
        status,
        ExportStatus::Failed(ref f) if f.kind == FailureKind::EmptyInput
    ));
}

#[tokio::test]
async fn empty_artifact_is_reported_and_removed() {
    let config = temp_config("empty_output");
    let probe = fixture_probe();
    let mut backend = FakeBackend::new(Arc::clone(&probe));
    backend.empty_calls = vec![1];
    let mut pipeline = ExportPipeline::new(config.clone(), probe, Arc::new(backend));

    let status = pipeline
        .start(fixture_edit_list().clips, OutputTarget::Preview)
        .wait()
        .await;

    assert!(matches!(
        status,
        ExportStatus::Failed(ref f) if f.kind == FailureKind::EmptyOutput
    ));
    assert!(files_in(&config.preview_dir).is_empty());
}

#[tokio::test]
async fn encoder_failure_is_retried_once() {
    let config = temp_config("retry");
    let probe = fixture_probe();
    let mut backend = FakeBackend::new(Arc::clone(&probe));
    backend.failing_calls = vec![1];
    let backend = Arc::new(backend);
    let mut pipeline = ExportPipeline::new(config, probe, backend.clone());

    let status = pipeline
        .start(fixture_edit_list().clips, OutputTarget::Preview)
        .wait()
        .await;

    assert!(matches!(status, ExportStatus::Succeeded(_)), "{status:?}");
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn persistent_encoder_failure_surfaces_after_retries() {
    let config = temp_config("retry_exhausted");
    let probe = fixture_probe();
    let mut backend = FakeBackend::new(Arc::clone(&probe));
    backend.failing_calls = vec![1, 2, 3];
    let backend = Arc::new(backend);
    let mut pipeline = ExportPipeline::new(config.clone(), probe, backend.clone());

    let status = pipeline
        .start(fixture_edit_list().clips, OutputTarget::Preview)
        .wait()
        .await;

    let ExportStatus::Failed(failure) = status else {
        panic!("expected failure, got {status:?}");
    };
    assert_eq!(failure.kind, FailureKind::EncoderFailure);
    assert!(failure.message.contains("simulated x264 crash"));
    assert_eq!(backend.calls(), 2);
    assert!(files_in(&config.preview_dir).is_empty());
}

#[tokio::test]
async fn starting_a_new_job_cancels_the_running_one() {
    let config = temp_config("supersede");
    let probe = fixture_probe();
    let mut backend = FakeBackend::new(Arc::clone(&probe));
    backend.blocking_calls = vec![1];
    let backend = Arc::new(backend);
    let mut pipeline = ExportPipeline::new(config.clone(), probe, backend.clone());

    let first = pipeline.start(fixture_edit_list().clips, OutputTarget::Preview);
    while backend.calls() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(first.status(), ExportStatus::Running);

    let mut clips = fixture_edit_list().clips;
    clips.truncate(1);
    let second = pipeline.start(clips, OutputTarget::Preview);

    assert_eq!(first.wait().await, ExportStatus::Cancelled);
    let ExportStatus::Succeeded(output) = second.wait().await else {
        panic!("second job should succeed");
    };
    assert_eq!(output.duration, Duration::from_secs(2));
    assert!(second.seq() > first.seq());

    // Only the second job's artifact remains.
    assert_eq!(files_in(&config.preview_dir), vec![output.path]);
}

#[tokio::test]
async fn cancel_before_start_never_renders() {
    let config = temp_config("cancel_pending");
    let probe = fixture_probe();
    let backend = Arc::new(FakeBackend::new(Arc::clone(&probe)));
    let mut pipeline = ExportPipeline::new(config, probe, backend.clone());

    let job = pipeline.start(fixture_edit_list().clips, OutputTarget::Preview);
    job.cancel();
    assert_eq!(job.wait().await, ExportStatus::Cancelled);
    pipeline.settle().await;
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn explicit_output_path_is_used() {
    let config = temp_config("explicit_path");
    let probe = fixture_probe();
    let backend = Arc::new(FakeBackend::new(Arc::clone(&probe)));
    let mut pipeline = ExportPipeline::new(config.clone(), probe.clone(), backend);

    let comp = CompositionBuilder::new(probe.as_ref())
        .build(&fixture_edit_list().clips)
        .unwrap();
    let target = config.export_dir.join("nested").join("final.mp4");
    let status = pipeline
        .start(comp, OutputTarget::Path(target.clone()))
        .wait()
        .await;

    let ExportStatus::Succeeded(output) = status else {
        panic!("expected success, got {status:?}");
    };
    assert_eq!(output.path, target);
    assert_eq!(output.locator, MediaLocator::from_path(&target));
}
