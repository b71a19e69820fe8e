//! Shelfwatch CLI library.
//!
//! Configuration, logging, the monitoring loop and the subcommands behind the
//! `shelfwatch` binary.

mod cli;
pub mod commands;
mod config;
pub mod logging;
pub mod monitor;

pub use cli::{Cli, Commands};
pub use config::{
    ArpConfig, CameraConfig, CaptureConfig, Config, DetectorSettings, LogConfig, ScaleConfig,
    SlackConfig,
};
