pub mod check;
pub mod export;
pub mod info;
pub mod init;
pub mod plan;
pub mod probe;
pub mod validate;

use std::sync::Arc;
use std::time::Duration;

use montage_common::config::AppConfig;
use montage_project_model::{Clip, Filter};
use montage_render_engine::FfprobeProbe;

/// Media probe configured from the app config.
pub(crate) fn probe_for(config: &AppConfig) -> Arc<FfprobeProbe> {
    Arc::new(FfprobeProbe::new(config.tools.ffprobe.clone()))
}

/// `12.345s`
pub(crate) fn secs(d: Duration) -> String {
    format!("{:.3}s", d.as_secs_f64())
}

pub(crate) fn describe_filter(filter: Option<&Filter>) -> String {
    match filter {
        Some(f) => format!("{} {}", f.name(), f.value()),
        None => "-".to_string(),
    }
}

pub(crate) fn describe_clip(index: usize, clip: &Clip) -> String {
    format!(
        "  [{index}] {}  from {} for {}  filter: {}",
        clip.source,
        secs(clip.trim_start),
        secs(clip.trim_duration),
        describe_filter(clip.filter.as_ref())
    )
}
