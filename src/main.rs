// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "scancam")]
#[command(about = "Camera session controller for barcode scanning")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode barcodes from an image file
    Decode {
        /// Image to decode
        image: PathBuf,

        /// Report every symbol instead of the first one
        #[arg(short, long)]
        multiple: bool,
    },

    /// Run a full scanning session against the virtual camera
    Simulate {
        /// Image served as the camera's preview
        #[arg(short, long)]
        image: PathBuf,

        /// View size the preview is laid out in
        #[arg(long, default_value = "1080x1920")]
        view: String,

        /// Display rotation in degrees
        #[arg(long, default_value = "0")]
        display_rotation: u32,

        /// Camera mounting orientation in degrees
        #[arg(long, default_value = "90")]
        orientation: u32,

        /// Settings file (default: built-in settings)
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Take a picture after scanning and write the JPEG
        /// (default: ./photo_TIMESTAMP.jpg)
        #[arg(short, long, num_args = 0..=1)]
        photo: Option<Option<PathBuf>>,

        /// Seconds to wait for a symbol
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },

    /// Print the effective settings as JSON
    Settings {
        /// Settings file (default: ~/.config/scancam/settings.json)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control the log level
    // Examples: RUST_LOG=debug, RUST_LOG=scancam=trace, RUST_LOG=info
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
        Commands::Decode { image, multiple } => cli::decode_image(&image, multiple),
        Commands::Simulate {
            image,
            view,
            display_rotation,
            orientation,
            settings,
            photo,
            timeout,
        } => cli::simulate(cli::SimulateOptions {
            image,
            view,
            display_rotation,
            orientation,
            settings,
            photo,
            timeout,
        }),
        Commands::Settings { path } => cli::print_settings(path),
    }
}
