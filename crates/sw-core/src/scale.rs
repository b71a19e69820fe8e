//! Load-cell access.
//!
//! The detector never talks to hardware directly; it receives samples from a
//! [`WeightSource`]. [`IioScale`] reads an HX711 amplifier through the Linux
//! Industrial I/O subsystem, where the kernel driver exposes the latest raw
//! conversion as a decimal integer in sysfs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::ValidationError;

/// Scale read failures. These skip a tick; they never reset the baseline.
#[derive(Debug, Error)]
pub enum SensorError {
    /// The device file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The device returned something that is not a conversion result.
    #[error("bad reading from {path}: {raw:?}")]
    BadReading { path: PathBuf, raw: String },
    /// A read over zero raw samples was requested.
    #[error("sample window must be at least 1")]
    EmptyWindow,
}

/// A source of damped weight readings.
pub trait WeightSource {
    /// Returns the weight in grams averaged over `window` raw samples.
    fn read(&mut self, window: u32) -> Result<f64, SensorError>;
}

impl<T: WeightSource + ?Sized> WeightSource for Box<T> {
    fn read(&mut self, window: u32) -> Result<f64, SensorError> {
        (**self).read(window)
    }
}

/// An HX711 load cell exposed at `/sys/bus/iio/devices/iio:deviceN/in_voltageM_raw`.
#[derive(Debug, Clone)]
pub struct IioScale {
    raw_path: PathBuf,
    reference_unit: f64,
    offset: f64,
}

impl IioScale {
    /// Creates a scale with zero tare offset.
    ///
    /// `reference_unit` is the number of raw counts per gram.
    pub fn new(raw_path: impl Into<PathBuf>, reference_unit: f64) -> Result<Self, ValidationError> {
        if !reference_unit.is_finite() || reference_unit == 0.0 {
            return Err(ValidationError::ZeroOrNonFinite {
                field: "reference_unit",
                value: reference_unit,
            });
        }
        Ok(Self {
            raw_path: raw_path.into(),
            reference_unit,
            offset: 0.0,
        })
    }

    pub fn raw_path(&self) -> &Path {
        &self.raw_path
    }

    /// Records the current raw average as the zero point. Returns the offset.
    pub fn tare(&mut self, window: u32) -> Result<f64, SensorError> {
        let offset = self.raw_average(window)?;
        tracing::info!(offset, path = %self.raw_path.display(), "scale tared");
        self.offset = offset;
        Ok(offset)
    }

    #[expect(
        clippy::cast_precision_loss,
        reason = "HX711 conversions are 24-bit and fit an f64 exactly"
    )]
    fn read_raw(&self) -> Result<f64, SensorError> {
        let content = fs::read_to_string(&self.raw_path).map_err(|source| SensorError::Io {
            path: self.raw_path.clone(),
            source,
        })?;
        let trimmed = content.trim();
        trimmed
            .parse::<i64>()
            .map_err(|_| SensorError::BadReading {
                path: self.raw_path.clone(),
                raw: trimmed.to_string(),
            })
            .map(|raw| raw as f64)
    }

    /// Mean of `window` raw conversions, discarding the extremes when there
    /// are at least three.
    #[expect(clippy::cast_precision_loss, reason = "window sizes are tiny")]
    fn raw_average(&self, window: u32) -> Result<f64, SensorError> {
        if window == 0 {
            return Err(SensorError::EmptyWindow);
        }
        let mut values = (0..window)
            .map(|_| self.read_raw())
            .collect::<Result<Vec<_>, _>>()?;
        values.sort_by(f64::total_cmp);
        let kept = if values.len() >= 3 {
            &values[1..values.len() - 1]
        } else {
            &values[..]
        };
        Ok(kept.iter().sum::<f64>() / kept.len() as f64)
    }
}

impl WeightSource for IioScale {
    fn read(&mut self, window: u32) -> Result<f64, SensorError> {
        let raw = self.raw_average(window)?;
        Ok((raw - self.offset) / self.reference_unit)
    }
}
