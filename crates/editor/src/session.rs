//! Editing session management.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use montage_common::error::{EngineError, EngineResult};
use montage_project_model::{Clip, Filter, MediaLocator};
use montage_render_engine::{
    probe_source, ExportFailure, ExportJob, ExportOutput, ExportPipeline, ExportStatus,
    MediaProbe, OutputTarget, PipelineConfig, RenderBackend, OUTPUT_PROFILE,
};

/// Capacity of the session event channel.
const EVENT_CAPACITY: usize = 64;

/// State of an editing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No clips.
    Empty,
    /// Clips present, no preview requested yet.
    Editing,
    /// A preview is being rebuilt or is up to date.
    Previewing,
    /// The most recent preview or export failed.
    Error,
    /// The final export is running.
    Exporting,
    /// The final export finished. Terminal.
    Done,
}

/// Notifications published by a session. Every event carries the sequence
/// number of the job it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged { seq: u64, state: SessionState },
    PreviewStarted { seq: u64 },
    PreviewReady { seq: u64, output: ExportOutput },
    PreviewFailed { seq: u64, failure: ExportFailure },
    ExportFinished { seq: u64, output: ExportOutput },
    ExportFailed { seq: u64, failure: ExportFailure },
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub selected: Option<usize>,
    pub clip_count: usize,
    /// Last successful preview; kept while a rebuild is pending or failed.
    pub preview: Option<ExportOutput>,
    /// Whether `preview` reflects the current clip list.
    pub preview_current: bool,
    pub last_error: Option<ExportFailure>,
    /// Sequence number of the job whose results are accepted.
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    Preview,
    Final,
}

/// State shared with job watchers. Sequence checks and event publication
/// happen under the same lock.
#[derive(Debug)]
struct Shared {
    state: SessionState,
    current_seq: u64,
    preview: Option<ExportOutput>,
    preview_current: bool,
    last_error: Option<ExportFailure>,
}

#[derive(Debug, Clone)]
struct SessionClip {
    clip: Clip,
    source_duration: Duration,
}

/// An editing session that owns a clip list and keeps a preview of it.
///
/// Mutations schedule a rebuild on the session's [`ExportPipeline`] and
/// return immediately; results arrive as [`SessionEvent`]s. Mutating
/// methods must be called from within a Tokio runtime.
pub struct EditorSession {
    clips: Vec<SessionClip>,
    selected: Option<usize>,
    probe: Arc<dyn MediaProbe>,
    pipeline: ExportPipeline,
    shared: Arc<Mutex<Shared>>,
    events: broadcast::Sender<SessionEvent>,
    watchers: Vec<JoinHandle<()>>,
}

impl EditorSession {
    /// Create an empty session.
    pub fn new(
        config: PipelineConfig,
        probe: Arc<dyn MediaProbe>,
        backend: Arc<dyn RenderBackend>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            clips: Vec::new(),
            selected: None,
            pipeline: ExportPipeline::new(config, Arc::clone(&probe), backend),
            probe,
            shared: Arc::new(Mutex::new(Shared {
                state: SessionState::Empty,
                current_seq: 0,
                preview: None,
                preview_current: false,
                last_error: None,
            })),
            events,
            watchers: Vec::new(),
        }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        lock(&self.shared).state
    }

    pub fn snapshot(&self) -> SessionStatus {
        let shared = lock(&self.shared);
        SessionStatus {
            state: shared.state,
            selected: self.selected,
            clip_count: self.clips.len(),
            preview: shared.preview.clone(),
            preview_current: shared.preview_current,
            last_error: shared.last_error.clone(),
            seq: shared.current_seq,
        }
    }

    pub fn clip(&self, index: usize) -> Option<&Clip> {
        self.clips.get(index).map(|c| &c.clip)
    }

    pub fn clips(&self) -> Vec<Clip> {
        self.clips.iter().map(|c| c.clip.clone()).collect()
    }

    /// Probed duration of the source behind clip `index`.
    pub fn source_duration(&self, index: usize) -> Option<Duration> {
        self.clips.get(index).map(|c| c.source_duration)
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Probe `locator` and append it as a clip covering the whole source.
    ///
    /// The new clip becomes the selection. An unreadable source leaves the
    /// clip list untouched.
    pub async fn add_clip(&mut self, locator: MediaLocator) -> EngineResult<usize> {
        self.ensure_editable()?;

        let probe = Arc::clone(&self.probe);
        let target = locator.clone();
        let source = tokio::task::spawn_blocking(move || probe_source(probe.as_ref(), &target))
            .await
            .map_err(|e| EngineError::Other(anyhow::anyhow!("probe task failed: {e}")))??;

        let source_duration = source
            .media
            .duration
            .filter(|d| !d.is_zero())
            .ok_or_else(|| EngineError::source_unreadable(locator.as_str(), "unknown duration"))?;

        // The session may have been finalized while probing.
        self.ensure_editable()?;

        self.clips.push(SessionClip {
            clip: Clip::new(locator.clone(), Duration::ZERO, source_duration),
            source_duration,
        });
        let index = self.clips.len() - 1;
        self.selected = Some(index);
        tracing::info!(index, source = %locator, duration_secs = source_duration.as_secs_f64(), "Clip added");

        self.rebuild();
        Ok(index)
    }

    /// Remove clip `index`. Removing the last clip empties the session and
    /// tears down the preview.
    pub fn remove_clip(&mut self, index: usize) -> EngineResult<()> {
        self.ensure_editable()?;
        self.check_index(index)?;

        let removed = self.clips.remove(index);
        tracing::info!(index, source = %removed.clip.source, "Clip removed");

        if self.clips.is_empty() {
            self.selected = None;
            self.clear();
            return Ok(());
        }

        self.selected = match self.selected {
            Some(sel) if sel > index => Some(sel - 1),
            Some(sel) => Some(sel.min(self.clips.len() - 1)),
            None => None,
        };
        self.rebuild();
        Ok(())
    }

    /// Swap clips `from` and `to` and select the moved clip at `to`.
    pub fn move_clip(&mut self, from: usize, to: usize) -> EngineResult<()> {
        self.ensure_editable()?;
        self.check_index(from)?;
        self.check_index(to)?;

        self.selected = Some(to);
        if from == to {
            return Ok(());
        }
        self.clips.swap(from, to);
        tracing::debug!(from, to, "Clips swapped");
        self.rebuild();
        Ok(())
    }

    /// Change the selection. Does not rebuild.
    pub fn select_clip(&mut self, index: usize) -> EngineResult<()> {
        self.check_index(index)?;
        self.selected = Some(index);
        Ok(())
    }

    /// Move the selected clip's start to `secs`, keeping its end fixed.
    ///
    /// The value is clamped into the source and kept at least one output
    /// frame before the clip's end.
    pub fn set_trim_start(&mut self, secs: f64) -> EngineResult<()> {
        self.ensure_editable()?;
        let index = self.selected_index()?;
        let entry = &mut self.clips[index];

        let requested = clamp_secs(secs, entry.source_duration)?;
        let (start, duration) = trim_with_start(&entry.clip, requested, OUTPUT_PROFILE.frame_duration());
        entry.clip.trim_start = start;
        entry.clip.trim_duration = duration;
        tracing::debug!(index, start_secs = start.as_secs_f64(), "Trim start changed");

        self.rebuild();
        Ok(())
    }

    /// Move the selected clip's end to `secs`, keeping its start fixed
    /// where possible.
    pub fn set_trim_end(&mut self, secs: f64) -> EngineResult<()> {
        self.ensure_editable()?;
        let index = self.selected_index()?;
        let entry = &mut self.clips[index];

        let requested = clamp_secs(secs, entry.source_duration)?;
        let (start, duration) = trim_with_end(
            &entry.clip,
            requested,
            entry.source_duration,
            OUTPUT_PROFILE.frame_duration(),
        );
        entry.clip.trim_start = start;
        entry.clip.trim_duration = duration;
        tracing::debug!(index, end_secs = (start + duration).as_secs_f64(), "Trim end changed");

        self.rebuild();
        Ok(())
    }

    /// Replace the selected clip's filter. Parameters are clamped into the
    /// filter's declared range.
    pub fn set_filter(&mut self, filter: Option<Filter>) -> EngineResult<()> {
        self.ensure_editable()?;
        let index = self.selected_index()?;
        let filter = filter.map(|f| f.clamped());
        self.clips[index].clip.filter = filter;
        tracing::debug!(index, ?filter, "Filter changed");

        self.rebuild();
        Ok(())
    }

    /// Rebuild the preview without changing anything.
    pub fn request_preview(&mut self) -> EngineResult<ExportJob> {
        self.ensure_editable()?;
        if self.clips.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        Ok(self.rebuild())
    }

    /// Start the final export. The session accepts no edits until it fails.
    pub fn finalize(&mut self) -> EngineResult<ExportJob> {
        self.ensure_editable()?;
        if self.clips.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        tracing::info!(clips = self.clips.len(), "Finalizing session");
        Ok(self.launch(JobKind::Final))
    }

    /// Wait for every outstanding job and its result handling.
    pub async fn settle(&mut self) {
        self.pipeline.settle().await;
        for watcher in self.watchers.drain(..) {
            if let Err(err) = watcher.await {
                tracing::warn!(error = %err, "Session watcher ended abnormally");
            }
        }
    }

    // Internal helpers

    fn rebuild(&mut self) -> ExportJob {
        self.launch(JobKind::Preview)
    }

    fn launch(&mut self, kind: JobKind) -> ExportJob {
        let target = match kind {
            JobKind::Preview => OutputTarget::Preview,
            JobKind::Final => OutputTarget::Final,
        };
        let job = self.pipeline.start(self.clips(), target);
        let seq = job.seq();

        {
            let mut shared = lock(&self.shared);
            shared.current_seq = seq;
            shared.preview_current = false;
            let state = match kind {
                JobKind::Preview => SessionState::Previewing,
                JobKind::Final => SessionState::Exporting,
            };
            if kind == JobKind::Preview {
                let _ = self.events.send(SessionEvent::PreviewStarted { seq });
            }
            set_state(&mut shared, &self.events, seq, state);
        }

        self.watchers.retain(|w| !w.is_finished());
        self.watchers.push(tokio::spawn(watch_job(
            job.clone(),
            kind,
            Arc::clone(&self.shared),
            self.events.clone(),
        )));
        job
    }

    fn clear(&mut self) {
        self.pipeline.cancel();
        let mut shared = lock(&self.shared);
        shared.current_seq = 0;
        shared.preview_current = false;
        shared.last_error = None;
        if let Some(preview) = shared.preview.take() {
            remove_preview(&preview.path);
        }
        set_state(&mut shared, &self.events, 0, SessionState::Empty);
        tracing::info!("Session emptied");
    }

    fn ensure_editable(&self) -> EngineResult<()> {
        match lock(&self.shared).state {
            SessionState::Exporting => Err(EngineError::session("Final export in progress")),
            SessionState::Done => Err(EngineError::session("Session already finalized")),
            _ => Ok(()),
        }
    }

    fn check_index(&self, index: usize) -> EngineResult<()> {
        if index < self.clips.len() {
            Ok(())
        } else {
            Err(EngineError::session(format!(
                "Clip index {index} out of range ({} clips)",
                self.clips.len()
            )))
        }
    }

    fn selected_index(&self) -> EngineResult<usize> {
        self.selected
            .filter(|i| *i < self.clips.len())
            .ok_or_else(|| EngineError::session("No clip selected"))
    }
}

impl Drop for EditorSession {
    /// Cancels the live job and deletes the session's preview. Watchers still
    /// running see a stale sequence number and discard their results.
    fn drop(&mut self) {
        self.pipeline.cancel();
        let mut shared = lock(&self.shared);
        shared.current_seq = 0;
        shared.preview_current = false;
        if let Some(preview) = shared.preview.take() {
            remove_preview(&preview.path);
        }
        tracing::debug!("Session dropped");
    }
}

/// Apply a finished job's status unless a newer job has superseded it.
async fn watch_job(
    job: ExportJob,
    kind: JobKind,
    shared: Arc<Mutex<Shared>>,
    events: broadcast::Sender<SessionEvent>,
) {
    let status = job.wait().await;
    let seq = job.seq();

    let mut shared = lock(&shared);
    if shared.current_seq != seq {
        tracing::debug!(seq, current = shared.current_seq, "Dropping superseded job result");
        if let ExportStatus::Succeeded(output) = &status {
            if kind == JobKind::Preview {
                remove_preview(&output.path);
            }
        }
        return;
    }

    match (kind, status) {
        (JobKind::Preview, ExportStatus::Succeeded(output)) => {
            if let Some(old) = shared.preview.replace(output.clone()) {
                remove_preview(&old.path);
            }
            shared.preview_current = true;
            shared.last_error = None;
            let _ = events.send(SessionEvent::PreviewReady { seq, output });
            set_state(&mut shared, &events, seq, SessionState::Previewing);
        }
        (JobKind::Preview, ExportStatus::Failed(failure)) => {
            shared.last_error = Some(failure.clone());
            let _ = events.send(SessionEvent::PreviewFailed { seq, failure });
            set_state(&mut shared, &events, seq, SessionState::Error);
        }
        (JobKind::Final, ExportStatus::Succeeded(output)) => {
            shared.last_error = None;
            let _ = events.send(SessionEvent::ExportFinished { seq, output });
            set_state(&mut shared, &events, seq, SessionState::Done);
        }
        (JobKind::Final, ExportStatus::Failed(failure)) => {
            shared.last_error = Some(failure.clone());
            let _ = events.send(SessionEvent::ExportFailed { seq, failure });
            set_state(&mut shared, &events, seq, SessionState::Error);
        }
        (JobKind::Final, ExportStatus::Cancelled) => {
            set_state(&mut shared, &events, seq, SessionState::Editing);
        }
        (_, status) => {
            tracing::debug!(seq, ?status, "Ignoring job status");
        }
    }
}

fn set_state(
    shared: &mut Shared,
    events: &broadcast::Sender<SessionEvent>,
    seq: u64,
    state: SessionState,
) {
    if shared.state != state {
        tracing::debug!(seq, from = ?shared.state, to = ?state, "Session state changed");
        shared.state = state;
        let _ = events.send(SessionEvent::StateChanged { seq, state });
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn remove_preview(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %err, "Failed to remove preview");
        }
    }
}

/// Seconds to a duration within `[0, max]`.
fn clamp_secs(secs: f64, max: Duration) -> EngineResult<Duration> {
    if secs.is_nan() {
        return Err(EngineError::session("Trim position is not a number"));
    }
    Ok(Duration::try_from_secs_f64(secs.max(0.0))
        .unwrap_or(Duration::MAX)
        .min(max))
}

/// New `(start, duration)` for a start move. The end stays put; the start
/// never reaches it.
fn trim_with_start(clip: &Clip, start: Duration, min_duration: Duration) -> (Duration, Duration) {
    let end = clip.trim_end();
    let start = if start + min_duration > end {
        end.saturating_sub(min_duration)
    } else {
        start
    };
    (start, end - start)
}

/// New `(start, duration)` for an end move. The start only moves when the
/// end is pinned against the source end.
fn trim_with_end(
    clip: &Clip,
    end: Duration,
    source_duration: Duration,
    min_duration: Duration,
) -> (Duration, Duration) {
    let mut start = clip.trim_start;
    let mut end = end.max(start + min_duration);
    if end > source_duration {
        end = source_duration;
        start = start.min(source_duration.saturating_sub(min_duration));
    }
    (start, end - start)
}
