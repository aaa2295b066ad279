//! Build the composition for an edit list and print it.

use std::path::PathBuf;

use montage_common::config::AppConfig;
use montage_project_model::EditList;
use montage_render_engine::{AdjustmentOp, CompositionBuilder};

pub async fn run(config: &AppConfig, path: PathBuf) -> anyhow::Result<()> {
    let list =
        EditList::load(&path).map_err(|e| anyhow::anyhow!("Failed to load edit list: {e}"))?;

    let probe = super::probe_for(config);
    let clips = list.clips.clone();
    let composition =
        tokio::task::spawn_blocking(move || CompositionBuilder::new(probe.as_ref()).build(&clips))
            .await??;

    let anchor = composition.anchor();
    println!("Composition: {}", list.name);
    println!("  Frame: {}x{}", anchor.width, anchor.height);
    println!("  Duration: {}", super::secs(composition.duration()));
    println!("  Audio: {}", if composition.has_audio() { "yes" } else { "no" });
    println!();

    for segment in composition.segments() {
        let t = &segment.transform;
        let (ox, oy) = t.letterbox_offset(anchor);
        println!(
            "[{}] {}  {} → {}",
            segment.index,
            segment.source,
            super::secs(segment.timeline_range.start),
            super::secs(segment.timeline_range.end()),
        );
        println!(
            "     source {} +{}  {}x{} @ {:.3}fps",
            super::secs(segment.source_range.start),
            super::secs(segment.source_range.duration),
            segment.format.dimensions().width,
            segment.format.dimensions().height,
            segment.format.frame_rate(),
        );
        println!(
            "     scale {:.4}  render {:.1}x{:.1}  offset ({ox:.1}, {oy:.1})",
            t.scale, t.render_size.width, t.render_size.height
        );
        let m = &t.matrix;
        println!(
            "     matrix [{:.4} {:.4} {:.4} {:.4} {:.2} {:.2}]",
            m.a, m.b, m.c, m.d, m.tx, m.ty
        );
        match segment.adjustment.op {
            AdjustmentOp::Identity => println!("     adjustment: none"),
            op => println!("     adjustment: {op:?}"),
        }
    }

    Ok(())
}
