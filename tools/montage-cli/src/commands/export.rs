//! Export an edit list to video.

use std::path::PathBuf;
use std::sync::Arc;

use montage_common::config::AppConfig;
use montage_project_model::EditList;
use montage_render_engine::{
    ExportPipeline, ExportStage, ExportStatus, FfmpegBackend, OutputTarget, PipelineConfig,
    RenderBackend, OUTPUT_PROFILE,
};

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    output: Option<PathBuf>,
    preview: bool,
) -> anyhow::Result<()> {
    println!("Exporting edit list at: {}", path.display());

    let list =
        EditList::load(&path).map_err(|e| anyhow::anyhow!("Failed to load edit list: {e}"))?;

    let backend = Arc::new(FfmpegBackend::new(config.tools.ffmpeg.clone()));
    if !backend.is_available() {
        anyhow::bail!("{} not found; run `montage check`", config.tools.ffmpeg);
    }

    let target = match output {
        Some(path) => OutputTarget::Path(path),
        None if preview => OutputTarget::Preview,
        None => OutputTarget::Final,
    };

    println!("  Clips: {}", list.clips.len());
    println!("  Target: {target:?}");
    println!(
        "  Format: {} ({} {}, crf {}, {}fps)",
        OUTPUT_PROFILE.container,
        OUTPUT_PROFILE.video_codec,
        OUTPUT_PROFILE.preset,
        OUTPUT_PROFILE.crf,
        OUTPUT_PROFILE.frame_rate
    );

    let mut pipeline = ExportPipeline::new(
        PipelineConfig::from(config),
        super::probe_for(config),
        backend,
    );
    let job = pipeline.start(list.clips, target);
    tracing::debug!(
        seq = job.seq(),
        backend = pipeline.backend_name(),
        "Export job started"
    );

    let mut updates = job.progress_updates();
    let printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let p = updates.borrow_and_update().clone();
            if p.stage == ExportStage::Rendering {
                print!(
                    "\r  Progress: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
                    p.progress * 100.0,
                    p.frames_rendered,
                    p.total_frames,
                    p.eta_secs,
                );
            }
        }
    });

    let status = tokio::select! {
        status = job.wait() => status,
        _ = tokio::signal::ctrl_c() => {
            println!("\n  Interrupted, cancelling...");
            job.cancel();
            job.wait().await
        }
    };
    printer.abort();

    match status {
        ExportStatus::Succeeded(out) => {
            println!(
                "\nExport complete: {} ({})",
                out.path.display(),
                super::secs(out.duration)
            );
            Ok(())
        }
        ExportStatus::Failed(failure) => {
            anyhow::bail!("export failed ({:?}): {}", failure.kind, failure.message)
        }
        ExportStatus::Cancelled => {
            println!("\nExport cancelled.");
            Ok(())
        }
        other => anyhow::bail!("export ended in unexpected state {other:?}"),
    }
}
