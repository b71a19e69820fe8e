//! `shelfwatch weigh`: print averaged scale readings.

use std::io::Write;

use anyhow::{Context, Result};
use sw_core::WeightSource;

use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config, count: u32) -> Result<()> {
    let mut scale = super::open_scale(config)?;
    weigh(writer, &mut scale, config.sample_window, count)
}

fn weigh<W: Write, S: WeightSource>(
    writer: &mut W,
    scale: &mut S,
    window: u32,
    count: u32,
) -> Result<()> {
    for _ in 0..count {
        let grams = scale.read(window).context("failed to read scale")?;
        writeln!(writer, "{grams:.2} g")?;
    }
    Ok(())
}
