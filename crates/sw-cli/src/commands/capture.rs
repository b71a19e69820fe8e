//! `shelfwatch capture`: record one evidence clip, with recovery.

use std::io::Write;

use anyhow::{Context, Result};

use crate::Config;
use crate::monitor::Evidence;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let camera = super::camera(config, None)?;
    let artifact = camera.record().context("failed to capture evidence")?;
    writeln!(
        writer,
        "Recorded {} frames to {}",
        artifact.frame_count,
        artifact.file_path.display()
    )?;
    Ok(())
}
