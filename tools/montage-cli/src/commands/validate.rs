//! Validate an edit list.

use std::path::PathBuf;

use montage_common::config::AppConfig;
use montage_project_model::EditList;
use montage_render_engine::CompositionBuilder;

pub async fn run(config: &AppConfig, path: PathBuf, probe: bool) -> anyhow::Result<()> {
    println!("Validating edit list at: {}", path.display());

    let list =
        EditList::load(&path).map_err(|e| anyhow::anyhow!("Failed to load edit list: {e}"))?;

    let mut issues = list.validate();

    if probe && issues.is_empty() {
        let prober = super::probe_for(config);
        let clips = list.clips.clone();
        let built =
            tokio::task::spawn_blocking(move || CompositionBuilder::new(prober.as_ref()).build(&clips))
                .await?;
        if let Err(e) = built {
            issues.push(e.to_string());
        }
    }

    if issues.is_empty() {
        println!("Edit list is valid.");
        return Ok(());
    }

    for issue in &issues {
        println!("  - {issue}");
    }
    println!("\n{} issue(s) found.", issues.len());
    std::process::exit(1);
}
