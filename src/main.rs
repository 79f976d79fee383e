// SPDX-License-Identifier: GPL-3.0-only

use burst_camera::OutputMode;
use burst_camera::constants;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "burst-camera")]
#[command(about = "Burst capture and multi-frame fusion")]
#[command(version = constants::app_info::version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fuse a burst of raw frames read from a directory
    Fuse {
        /// Directory containing the raw frames (sorted by file name)
        #[arg(short, long)]
        input: PathBuf,

        /// Number of frames in the burst (default: from config)
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Output mode: encoded-only or encoded-plus-raw (default: from config)
        #[arg(short, long)]
        mode: Option<OutputMode>,

        /// Output directory (default: ~/Pictures/burst-camera)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Configuration file (default: ~/.config/burst-camera/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write synthetic raw frames for testing
    Synth {
        /// Directory to write frames into
        #[arg(short, long)]
        output: PathBuf,

        /// Number of frames
        #[arg(short = 'n', long, default_value = "6")]
        count: usize,

        #[arg(long, default_value = "256")]
        width: u32,

        #[arg(long, default_value = "256")]
        height: u32,

        /// Linear grey level (0.0 - 1.0)
        #[arg(short, long, default_value = "0.5")]
        level: f32,

        /// Noise standard deviation per frame
        #[arg(long, default_value = "0.05")]
        noise: f32,

        #[arg(long, default_value = "1")]
        seed: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=burst_camera=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fuse {
            input,
            count,
            mode,
            output,
            config,
        } => cli::fuse(cli::FuseOptions {
            input,
            count,
            mode,
            output,
            config,
        }),
        Commands::Synth {
            output,
            count,
            width,
            height,
            level,
            noise,
            seed,
        } => cli::synth(cli::SynthOptions {
            output,
            count,
            width,
            height,
            level,
            noise,
            seed,
        }),
    }
}
