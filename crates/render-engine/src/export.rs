//! Export jobs: render a composition to a verified output file.
//!
//! An [`ExportPipeline`] owns at most one live job. Starting a new job
//! cancels the previous one and waits for its worker to wind down before
//! the new worker touches the backend, so jobs never overlap.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use montage_common::config::AppConfig;
use montage_common::error::{EngineError, EngineResult, FailureKind};
use montage_project_model::{Clip, MediaLocator};

use crate::cancel::CancelFlag;
use crate::composition::{Composition, CompositionBuilder};
use crate::probe::MediaProbe;

/// The single output profile every export uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputProfile {
    pub container: &'static str,
    pub video_codec: &'static str,
    pub h264_profile: &'static str,
    pub preset: &'static str,
    pub crf: u8,
    pub pixel_format: &'static str,
    pub frame_rate: u32,
    pub audio_codec: &'static str,
    pub audio_bitrate_kbps: u32,
    pub audio_sample_rate: u32,
    pub audio_channels: u32,
}

/// H.264 high / AAC stereo in MP4.
pub const OUTPUT_PROFILE: OutputProfile = OutputProfile {
    container: "mp4",
    video_codec: "libx264",
    h264_profile: "high",
    preset: "medium",
    crf: 18,
    pixel_format: "yuv420p",
    frame_rate: 30,
    audio_codec: "aac",
    audio_bitrate_kbps: 192,
    audio_sample_rate: 48_000,
    audio_channels: 2,
};

impl OutputProfile {
    /// Duration of one output frame, rounded up to the microsecond.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_micros(1_000_000u64.div_ceil(self.frame_rate as u64))
    }
}

/// Progress callback for export rendering.
pub type ProgressCallback = dyn Fn(ExportProgress) + Send + Sync;

/// Export progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Frames rendered so far.
    pub frames_rendered: u64,

    /// Total frames to render.
    pub total_frames: u64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    /// Current stage.
    pub stage: ExportStage,
}

impl ExportProgress {
    pub fn at_stage(stage: ExportStage, total_frames: u64) -> Self {
        let done = matches!(stage, ExportStage::Complete);
        Self {
            progress: if done { 1.0 } else { 0.0 },
            frames_rendered: if done { total_frames } else { 0 },
            total_frames,
            eta_secs: 0.0,
            stage,
        }
    }
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    Rendering,
    Finalizing,
    Complete,
}

/// What a backend is asked to produce.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub composition: &'a Composition,
    pub output_path: &'a Path,
    pub profile: &'a OutputProfile,
}

/// Trait for render backends.
pub trait RenderBackend: Send + Sync {
    /// Render the request to `request.output_path`.
    ///
    /// Implementations poll `cancel` while working and return
    /// `Err(Cancelled)` after removing any partial output.
    fn render(
        &self,
        request: &RenderRequest<'_>,
        cancel: &CancelFlag,
        progress: Option<&ProgressCallback>,
    ) -> EngineResult<()>;

    /// Check if this backend is available on the system.
    fn is_available(&self) -> bool;

    /// Backend name.
    fn name(&self) -> &str;
}

/// Input of an export job.
#[derive(Debug, Clone)]
pub enum JobSource {
    /// An already built composition.
    Built(Arc<Composition>),
    /// A clip snapshot, built on the job's worker.
    Clips(Arc<[Clip]>),
}

impl From<Composition> for JobSource {
    fn from(composition: Composition) -> Self {
        JobSource::Built(Arc::new(composition))
    }
}

impl From<Vec<Clip>> for JobSource {
    fn from(clips: Vec<Clip>) -> Self {
        JobSource::Clips(clips.into())
    }
}

/// Where a job writes its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// A fresh file in the preview directory.
    Preview,
    /// A fresh file in the export directory.
    Final,
    /// An explicit path, overwritten if present.
    Path(PathBuf),
}

impl OutputTarget {
    fn label(&self) -> &'static str {
        match self {
            OutputTarget::Preview => "preview",
            OutputTarget::Final | OutputTarget::Path(_) => "export",
        }
    }
}

/// A verified export artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutput {
    pub locator: MediaLocator,
    pub path: PathBuf,
    pub duration: Duration,
}

/// Why a job failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&EngineError> for ExportFailure {
    fn from(err: &EngineError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Lifecycle of an export job.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportStatus {
    Pending,
    Running,
    Succeeded(ExportOutput),
    Failed(ExportFailure),
    Cancelled,
}

impl ExportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExportStatus::Succeeded(_) | ExportStatus::Failed(_) | ExportStatus::Cancelled
        )
    }
}

/// Handle to one export run. Clones observe the same job.
#[derive(Debug, Clone)]
pub struct ExportJob {
    seq: u64,
    cancel: CancelFlag,
    status: watch::Receiver<ExportStatus>,
    progress: watch::Receiver<ExportProgress>,
}

impl ExportJob {
    /// Monotonic sequence number within the owning pipeline.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn status(&self) -> ExportStatus {
        self.status.borrow().clone()
    }

    pub fn progress(&self) -> ExportProgress {
        self.progress.borrow().clone()
    }

    /// Request cancellation. The job reaches `Cancelled` once its worker
    /// notices, unless it was already finishing.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for a terminal status.
    pub async fn wait(&self) -> ExportStatus {
        let mut rx = self.status.clone();
        loop {
            {
                let status = rx.borrow_and_update();
                if status.is_terminal() {
                    return status.clone();
                }
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    /// Subscribe to progress updates.
    pub fn progress_updates(&self) -> watch::Receiver<ExportProgress> {
        self.progress.clone()
    }
}

/// Directories and retry policy for a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub preview_dir: PathBuf,
    pub export_dir: PathBuf,
    pub encoder_retries: u32,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            preview_dir: config.output.preview_dir.clone(),
            export_dir: config.output.export_dir.clone(),
            encoder_retries: config.export.encoder_retries,
        }
    }
}

/// Runs export jobs one at a time.
pub struct ExportPipeline {
    config: PipelineConfig,
    probe: Arc<dyn MediaProbe>,
    backend: Arc<dyn RenderBackend>,
    next_seq: u64,
    current: Option<ExportJob>,
    worker: Option<JoinHandle<()>>,
}

impl ExportPipeline {
    pub fn new(
        config: PipelineConfig,
        probe: Arc<dyn MediaProbe>,
        backend: Arc<dyn RenderBackend>,
    ) -> Self {
        Self {
            config,
            probe,
            backend,
            next_seq: 0,
            current: None,
            worker: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Start a job, cancelling whatever job is still live.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self, source: impl Into<JobSource>, target: OutputTarget) -> ExportJob {
        if let Some(job) = &self.current {
            if !job.status().is_terminal() {
                tracing::info!(seq = job.seq(), "Cancelling superseded export");
                job.cancel();
            }
        }
        let previous = self.worker.take();

        self.next_seq += 1;
        let seq = self.next_seq;
        let cancel = CancelFlag::new();
        let (status_tx, status_rx) = watch::channel(ExportStatus::Pending);
        let (progress_tx, progress_rx) =
            watch::channel(ExportProgress::at_stage(ExportStage::Preparing, 0));

        let job = ExportJob {
            seq,
            cancel: cancel.clone(),
            status: status_rx,
            progress: progress_rx,
        };

        let worker = JobWorker {
            seq,
            source: source.into(),
            target,
            config: self.config.clone(),
            probe: Arc::clone(&self.probe),
            backend: Arc::clone(&self.backend),
            cancel,
            status: status_tx,
            progress: Arc::new(progress_tx),
        };

        self.worker = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(err) = previous.await {
                    tracing::warn!(error = %err, "Previous export task ended abnormally");
                }
            }
            worker.run().await;
        }));

        tracing::debug!(seq, "Export job queued");
        self.current = Some(job.clone());
        job
    }

    /// Cancel the live job, if any.
    pub fn cancel(&self) {
        if let Some(job) = &self.current {
            job.cancel();
        }
    }

    /// The most recently started job.
    pub fn current(&self) -> Option<&ExportJob> {
        self.current.as_ref()
    }

    /// Wait until every started worker has exited.
    pub async fn settle(&mut self) {
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                tracing::warn!(error = %err, "Export task ended abnormally");
            }
        }
    }
}

struct JobWorker {
    seq: u64,
    source: JobSource,
    target: OutputTarget,
    config: PipelineConfig,
    probe: Arc<dyn MediaProbe>,
    backend: Arc<dyn RenderBackend>,
    cancel: CancelFlag,
    status: watch::Sender<ExportStatus>,
    progress: Arc<watch::Sender<ExportProgress>>,
}

impl JobWorker {
    async fn run(self) {
        let started = std::time::Instant::now();
        let status = match self.execute().await {
            Ok(output) => {
                tracing::info!(
                    seq = self.seq,
                    output = %output.path.display(),
                    duration_secs = output.duration.as_secs_f64(),
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Export finished"
                );
                ExportStatus::Succeeded(output)
            }
            Err(EngineError::Cancelled) => {
                tracing::info!(seq = self.seq, "Export cancelled");
                ExportStatus::Cancelled
            }
            Err(err) => {
                tracing::warn!(seq = self.seq, error = %err, "Export failed");
                ExportStatus::Failed(ExportFailure::from(&err))
            }
        };
        self.status.send_replace(status);
    }

    async fn execute(&self) -> EngineResult<ExportOutput> {
        self.cancel.check()?;
        self.status.send_replace(ExportStatus::Running);

        let composition = self.composition().await?;
        self.cancel.check()?;

        let output_path = allocate_output(&self.config, &self.target, self.seq)?;
        tracing::info!(
            seq = self.seq,
            backend = self.backend.name(),
            segments = composition.segments().len(),
            output = %output_path.display(),
            "Starting export"
        );

        let mut attempt = 0;
        loop {
            match self.render(&composition, &output_path).await {
                Ok(()) => break,
                Err(err) if err.is_retryable() && attempt < self.config.encoder_retries => {
                    attempt += 1;
                    tracing::warn!(seq = self.seq, attempt, error = %err, "Retrying encoder");
                    remove_partial(&output_path);
                }
                Err(err) => {
                    remove_partial(&output_path);
                    return Err(err);
                }
            }
        }

        if let Err(err) = self.cancel.check() {
            remove_partial(&output_path);
            return Err(err);
        }

        self.progress
            .send_replace(ExportProgress::at_stage(ExportStage::Finalizing, 0));
        match self.verify(&output_path).await {
            Ok(output) => {
                let total = self.progress.borrow().total_frames;
                self.progress
                    .send_replace(ExportProgress::at_stage(ExportStage::Complete, total));
                Ok(output)
            }
            Err(err) => {
                remove_partial(&output_path);
                Err(err)
            }
        }
    }

    async fn composition(&self) -> EngineResult<Arc<Composition>> {
        match &self.source {
            JobSource::Built(composition) => Ok(Arc::clone(composition)),
            JobSource::Clips(clips) => {
                let clips = Arc::clone(clips);
                let probe = Arc::clone(&self.probe);
                let cancel = self.cancel.clone();
                let built = tokio::task::spawn_blocking(move || {
                    CompositionBuilder::new(probe.as_ref()).build_cancellable(&clips, &cancel)
                })
                .await
                .map_err(join_error)??;
                Ok(Arc::new(built))
            }
        }
    }

    async fn render(&self, composition: &Arc<Composition>, output_path: &Path) -> EngineResult<()> {
        let composition = Arc::clone(composition);
        let backend = Arc::clone(&self.backend);
        let cancel = self.cancel.clone();
        let progress = Arc::clone(&self.progress);
        let output_path = output_path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let report = move |p: ExportProgress| {
                progress.send_replace(p);
            };
            let request = RenderRequest {
                composition: composition.as_ref(),
                output_path: output_path.as_path(),
                profile: &OUTPUT_PROFILE,
            };
            backend.render(&request, &cancel, Some(&report as &ProgressCallback))
        })
        .await
        .map_err(join_error)?
    }

    async fn verify(&self, output_path: &Path) -> EngineResult<ExportOutput> {
        let probe = Arc::clone(&self.probe);
        let path = output_path.to_path_buf();
        tokio::task::spawn_blocking(move || verify_output(probe.as_ref(), &path))
            .await
            .map_err(join_error)?
    }
}

/// Check that `path` holds a readable video of non-zero duration.
fn verify_output(probe: &dyn MediaProbe, path: &Path) -> EngineResult<ExportOutput> {
    let empty = || EngineError::EmptyOutput {
        path: path.display().to_string(),
    };

    let len = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    if len == 0 {
        return Err(empty());
    }

    let locator = MediaLocator::from_path(path);
    let media = probe.probe(&locator).map_err(|err| {
        tracing::warn!(path = %path.display(), error = %err, "Output is not readable");
        empty()
    })?;
    if media.video.is_none() {
        return Err(empty());
    }
    let duration = media.duration.filter(|d| !d.is_zero()).ok_or_else(empty)?;

    Ok(ExportOutput {
        locator,
        path: path.to_path_buf(),
        duration,
    })
}

/// Pick a fresh output file for a job and make sure its directory exists.
fn allocate_output(config: &PipelineConfig, target: &OutputTarget, seq: u64) -> EngineResult<PathBuf> {
    let dir = match target {
        OutputTarget::Path(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            return Ok(path.clone());
        }
        OutputTarget::Preview => &config.preview_dir,
        OutputTarget::Final => &config.export_dir,
    };

    std::fs::create_dir_all(dir)?;
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3fZ");
    Ok(dir.join(format!(
        "{}-{seq:04}-{stamp}.{}",
        target.label(),
        OUTPUT_PROFILE.container
    )))
}

fn remove_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial output"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "Failed to remove partial output"),
    }
}

fn join_error(err: tokio::task::JoinError) -> EngineError {
    EngineError::Other(anyhow::anyhow!("export worker panicked: {err}"))
}
