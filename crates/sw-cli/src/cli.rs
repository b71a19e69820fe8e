//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Unattended shelf monitor.
///
/// Watches a load cell for removed items and alerts Slack with a short clip
/// from a network camera.
#[derive(Debug, Parser)]
#[command(name = "shelfwatch", version, about, long_about = None)]
pub struct Cli {
    /// Enable debug output.
    #[arg(
        short,
        long,
        global = true,
        visible_alias = "debug",
        visible_short_alias = 'x'
    )]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Arm the scale and monitor until interrupted.
    Run,

    /// Resolve the camera and record one evidence clip.
    Capture,

    /// Print averaged scale readings (calibration aid).
    Weigh {
        /// Number of readings to print.
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
}
