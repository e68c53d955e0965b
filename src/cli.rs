use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "transcode-queue")]
#[command(author, version, about = "Local media conversion queue")]
pub struct Cli {
    /// Path to settings file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert files with the default profile, optionally watching the hot folder
    Run {
        /// Source files to convert
        inputs: Vec<PathBuf>,

        /// Target container format
        #[arg(short, long)]
        format: Option<String>,

        /// Output directory (defaults to the configured output path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Video bitrate, e.g. 800k or 2M
        #[arg(long)]
        video_bitrate: Option<String>,

        /// Output resolution as WIDTHxHEIGHT
        #[arg(long)]
        resolution: Option<String>,

        /// Output frame rate
        #[arg(long)]
        fps: Option<u32>,

        /// Keep running and convert files dropped into the hot folder
        #[arg(long)]
        watch: bool,

        /// Path to the ffmpeg executable
        #[arg(long)]
        ffmpeg: Option<PathBuf>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Write a settings file with default values
    InitConfig {
        /// Destination (defaults to ./transcode-queue.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display version information
    Version,
}
