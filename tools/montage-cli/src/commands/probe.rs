//! Probe a single source.

use montage_common::config::AppConfig;
use montage_project_model::MediaLocator;
use montage_render_engine::{probe_source, MediaProbe};

pub async fn run(config: &AppConfig, source: String, json: bool) -> anyhow::Result<()> {
    let probe = super::probe_for(config);
    let locator = MediaLocator::new(source);

    if json {
        let media = tokio::task::spawn_blocking({
            let probe = probe.clone();
            let locator = locator.clone();
            move || probe.probe(&locator)
        })
        .await??;
        println!("{}", serde_json::to_string_pretty(&media)?);
        return Ok(());
    }

    let probed = tokio::task::spawn_blocking(move || probe_source(probe.as_ref(), &locator)).await??;
    let format = &probed.format;
    let orientation = probed.track.orientation_or_identity();

    println!("Source: {}", probed.media.locator);
    println!("  Codec: {}", format.codec());
    println!(
        "  Natural size: {}x{}",
        probed.track.natural_size.width, probed.track.natural_size.height
    );
    println!(
        "  Orientation: {:.0}°{}",
        orientation.rotation_angle_degrees(),
        if orientation.determinant() < 0.0 {
            " (mirrored)"
        } else {
            ""
        }
    );
    println!(
        "  Display size: {}x{} @ {:.3}fps",
        format.dimensions().width,
        format.dimensions().height,
        format.frame_rate()
    );
    match &probed.media.audio {
        Some(a) => println!("  Audio: {} {}Hz {}ch", a.codec, a.sample_rate, a.channels),
        None => println!("  Audio: none"),
    }
    match probed.media.duration {
        Some(d) => println!("  Duration: {}", super::secs(d)),
        None => println!("  Duration: unknown"),
    }

    Ok(())
}
