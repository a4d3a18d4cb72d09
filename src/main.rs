// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use depth_fusion::backends::sensor::DepthResolution;
use depth_fusion::constants::app_info;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "depth-fusion")]
#[command(about = "Live volumetric reconstruction from a depth sensor")]
#[command(version = app_info::version())]
#[command(subcommand_required = false)]
struct Cli {
    /// Config file (default: platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Depth stream resolution (80x60, 320x240 or 640x480)
    #[arg(long, global = true, value_parser = cli::parse_resolution)]
    resolution: Option<DepthResolution>,

    /// Replay a directory of 16-bit PNG depth frames instead of the configured sensor
    #[arg(long, global = true)]
    playback: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Live reconstruction viewer in the terminal (default)
    Live,

    /// Orbit viewer for a saved mesh
    View {
        /// Mesh file (.stl or .obj)
        path: PathBuf,
    },

    /// Print statistics of a saved mesh
    Inspect {
        /// Mesh file (.stl or .obj)
        path: PathBuf,
    },

    /// Render a saved mesh to a PNG image
    Render {
        /// Mesh file (.stl or .obj)
        path: PathBuf,

        /// Output PNG file
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value = "640")]
        width: u32,

        #[arg(long, default_value = "480")]
        height: u32,

        /// Rotation about the vertical axis in degrees
        #[arg(long, default_value = "0")]
        yaw: f32,
    },

    /// Show the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG controls the level, e.g. RUST_LOG=depth_fusion=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let overrides = cli::Overrides {
        config: args.config,
        resolution: args.resolution,
        playback: args.playback,
    };
    let config = cli::load_config(&overrides)?;
    let flip_yz = config.mesh.flip_yz;

    match args.command {
        None | Some(Commands::Live) => depth_fusion::terminal::run(config),
        Some(Commands::View { path }) => depth_fusion::terminal::view_mesh(&path, flip_yz),
        Some(Commands::Inspect { path }) => cli::inspect(&path, flip_yz),
        Some(Commands::Render {
            path,
            output,
            width,
            height,
            yaw,
        }) => cli::render(&path, &output, width, height, yaw, flip_yz),
        Some(Commands::Config { write }) => cli::show_config(&config, write),
    }
}
