//! montage CLI: probe sources, inspect edit lists, and export them.
//!
//! Usage:
//!   montage probe <SOURCE>       Show the presentation format of a source
//!   montage init <PATH>          Create an edit list
//!   montage validate <PATH>      Validate an edit list
//!   montage info <PATH>          Show edit list contents
//!   montage plan <PATH>          Build the composition and print it
//!   montage export <PATH>        Render an edit list to video
//!   montage check                Check for ffmpeg and ffprobe

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use montage_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "montage",
    about = "Compose trimmed, filtered clips into a single video",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the presentation format of a source
    Probe {
        /// File path or URL
        source: String,

        /// Print the raw probe result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create an edit list
    Init {
        /// Edit list path
        path: PathBuf,

        /// Edit list name
        #[arg(short, long, default_value = "untitled")]
        name: String,

        /// Sources to append, each trimmed to its full length
        #[arg(short, long = "clip")]
        clips: Vec<String>,
    },

    /// Validate an edit list
    Validate {
        /// Edit list path
        path: PathBuf,

        /// Also probe every source and build the composition
        #[arg(long)]
        probe: bool,
    },

    /// Show edit list contents
    Info {
        /// Edit list path
        path: PathBuf,
    },

    /// Build the composition and print its segments
    Plan {
        /// Edit list path
        path: PathBuf,
    },

    /// Render an edit list to video
    Export {
        /// Edit list path
        path: PathBuf,

        /// Output file path (defaults to a fresh file in the export directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write to the preview directory instead of the export directory
        #[arg(long, conflicts_with = "output")]
        preview: bool,
    },

    /// Check for ffmpeg and ffprobe
    Check {
        /// Write the effective configuration to the config file
        #[arg(long)]
        write_config: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    montage_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Probe { source, json } => commands::probe::run(&config, source, json).await,
        Commands::Init { path, name, clips } => {
            commands::init::run(&config, path, name, clips).await
        }
        Commands::Validate { path, probe } => commands::validate::run(&config, path, probe).await,
        Commands::Info { path } => commands::info::run(path),
        Commands::Plan { path } => commands::plan::run(&config, path).await,
        Commands::Export {
            path,
            output,
            preview,
        } => commands::export::run(&config, path, output, preview).await,
        Commands::Check { write_config } => commands::check::run(&config, write_config),
    }
}
