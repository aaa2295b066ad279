//! Check external tools and configuration.

use montage_common::config::AppConfig;
use montage_render_engine::{FfmpegBackend, FfprobeProbe, RenderBackend};

pub fn run(config: &AppConfig, write_config: bool) -> anyhow::Result<()> {
    println!("montage System Check");
    println!("{}", "=".repeat(50));

    let ffmpeg = FfmpegBackend::new(config.tools.ffmpeg.clone());
    if ffmpeg.is_available() {
        println!("[OK] ffmpeg: {}", config.tools.ffmpeg);
    } else {
        println!("[WARN] ffmpeg not found: {} (export unavailable)", config.tools.ffmpeg);
    }

    let ffprobe = FfprobeProbe::new(config.tools.ffprobe.clone());
    if ffprobe.is_available() {
        println!("[OK] ffprobe: {}", config.tools.ffprobe);
    } else {
        println!("[WARN] ffprobe not found: {} (sources cannot be probed)", config.tools.ffprobe);
    }

    match config.validate() {
        Ok(()) => println!("[OK] Configuration valid"),
        Err(e) => println!("[WARN] Configuration: {e}"),
    }
    println!("     Previews: {}", config.output.preview_dir.display());
    println!("     Exports:  {}", config.output.export_dir.display());
    println!("     Encoder retries: {}", config.export.encoder_retries);

    if write_config {
        config.save()?;
        println!("[OK] Configuration written");
    }

    println!();
    Ok(())
}
