//! Create a new edit list.

use std::path::PathBuf;

use montage_common::config::AppConfig;
use montage_project_model::{Clip, EditList, MediaLocator};
use montage_render_engine::MediaProbe;

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    name: String,
    sources: Vec<String>,
) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }

    let mut list = EditList::new(name);
    let probe = super::probe_for(config);

    for source in sources {
        let locator = MediaLocator::new(source);
        let media = tokio::task::spawn_blocking({
            let probe = probe.clone();
            let locator = locator.clone();
            move || probe.probe(&locator)
        })
        .await??;
        let duration = media
            .duration
            .ok_or_else(|| anyhow::anyhow!("{locator}: source has no duration"))?;
        list.clips
            .push(Clip::new(locator, std::time::Duration::ZERO, duration));
    }

    list.save(&path)
        .map_err(|e| anyhow::anyhow!("Failed to write edit list: {e}"))?;

    println!("Created edit list '{}' at {}", list.name, path.display());
    for (i, clip) in list.clips.iter().enumerate() {
        println!("{}", super::describe_clip(i, clip));
    }
    Ok(())
}
