//! Show edit list contents.

use std::path::PathBuf;

use montage_project_model::EditList;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let list =
        EditList::load(&path).map_err(|e| anyhow::anyhow!("Failed to load edit list: {e}"))?;

    println!("Edit list: {}", list.name);
    println!("  Version: {}", list.version);
    println!("  Created: {}", list.created_at);
    println!();

    println!("Clips ({}):", list.clips.len());
    for (i, clip) in list.clips.iter().enumerate() {
        println!("{}", super::describe_clip(i, clip));
    }
    println!();
    println!("Total duration: {}", super::secs(list.total_duration()));

    Ok(())
}
