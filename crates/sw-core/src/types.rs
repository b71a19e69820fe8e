//! Core type definitions with validation.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A quantity that must be strictly positive was not.
    #[error("{field} must be a positive finite number, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    /// A quantity that must be non-negative was negative or not finite.
    #[error("{field} must be a non-negative finite number, got {value}")]
    Negative { field: &'static str, value: f64 },

    /// A divisor was zero or not finite.
    #[error("{field} must be a finite non-zero number, got {value}")]
    ZeroOrNonFinite { field: &'static str, value: f64 },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new value after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A connection string for a video source (e.g. an RTSP URL).
    ///
    /// Addresses routinely embed camera credentials, so `Debug` and
    /// [`StreamAddress::redacted`] mask the userinfo part. Use
    /// [`StreamAddress::as_str`] only when handing the address to the decoder.
    StreamAddress, "stream address"
);

define_string_id!(
    /// Where alerts are delivered (a Slack channel ID, for instance).
    Destination, "destination"
);

impl StreamAddress {
    /// Returns the address with any `user:password@` prefix masked.
    pub fn redacted(&self) -> String {
        let Some((scheme, rest)) = self.0.split_once("://") else {
            return self.0.clone();
        };
        let authority_end = rest.find('/').unwrap_or(rest.len());
        let (authority, path) = rest.split_at(authority_end);
        match authority.rsplit_once('@') {
            Some((_, host)) => format!("{scheme}://***@{host}{path}"),
            None => self.0.clone(),
        }
    }
}

impl fmt::Debug for StreamAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StreamAddress").field(&self.redacted()).finish()
    }
}

impl fmt::Display for StreamAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.redacted())
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Destination").field(&self.0).finish()
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single damped reading from the scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightSample {
    /// Weight in grams, after tare and reference-unit scaling.
    pub grams: f64,
    /// When the reading was taken.
    pub timestamp: DateTime<Utc>,
}

impl WeightSample {
    pub const fn new(grams: f64, timestamp: DateTime<Utc>) -> Self {
        Self { grams, timestamp }
    }

    /// A sample stamped with the current time.
    pub fn now(grams: f64) -> Self {
        Self::new(grams, Utc::now())
    }
}

/// Reference masses for one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCalibration")]
pub struct CalibrationProfile {
    unit_weight_grams: f64,
    noise_floor_grams: f64,
}

#[derive(Deserialize)]
struct RawCalibration {
    unit_weight_grams: f64,
    noise_floor_grams: f64,
}

impl TryFrom<RawCalibration> for CalibrationProfile {
    type Error = ValidationError;

    fn try_from(raw: RawCalibration) -> Result<Self, Self::Error> {
        Self::new(raw.unit_weight_grams, raw.noise_floor_grams)
    }
}

impl CalibrationProfile {
    /// Creates a profile, rejecting a non-positive unit weight or a negative
    /// noise floor.
    pub fn new(unit_weight_grams: f64, noise_floor_grams: f64) -> Result<Self, ValidationError> {
        if !unit_weight_grams.is_finite() || unit_weight_grams <= 0.0 {
            return Err(ValidationError::NotPositive {
                field: "unit_weight_grams",
                value: unit_weight_grams,
            });
        }
        if !noise_floor_grams.is_finite() || noise_floor_grams < 0.0 {
            return Err(ValidationError::Negative {
                field: "noise_floor_grams",
                value: noise_floor_grams,
            });
        }
        Ok(Self {
            unit_weight_grams,
            noise_floor_grams,
        })
    }

    /// Mass of one countable item.
    #[must_use]
    pub const fn unit_weight_grams(&self) -> f64 {
        self.unit_weight_grams
    }

    /// Smallest delta treated as signal rather than jitter.
    #[must_use]
    pub const fn noise_floor_grams(&self) -> f64 {
        self.noise_floor_grams
    }
}

/// A detected removal of one or more items.
///
/// Only constructible through [`RemovalEvent::new`], which guarantees
/// `estimated_units_removed > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RemovalEvent {
    estimated_units_removed: f64,
    previous_weight_grams: f64,
    detected_at: DateTime<Utc>,
}

impl RemovalEvent {
    pub fn new(
        estimated_units_removed: f64,
        previous_weight_grams: f64,
        detected_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if !estimated_units_removed.is_finite() || estimated_units_removed <= 0.0 {
            return Err(ValidationError::NotPositive {
                field: "estimated_units_removed",
                value: estimated_units_removed,
            });
        }
        Ok(Self {
            estimated_units_removed,
            previous_weight_grams,
            detected_at,
        })
    }

    /// Units removed, rounded to two decimals.
    #[must_use]
    pub const fn estimated_units_removed(&self) -> f64 {
        self.estimated_units_removed
    }

    /// The baseline weight the removal was measured against.
    #[must_use]
    pub const fn previous_weight_grams(&self) -> f64 {
        self.previous_weight_grams
    }

    #[must_use]
    pub const fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    /// Whole units for human-facing messages. Never reports zero.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "value is positive and far below u32::MAX for any real scale"
    )]
    pub fn whole_units(&self) -> u32 {
        (self.estimated_units_removed.round() as u32).max(1)
    }
}

/// An encoded clip recorded as evidence for an alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceArtifact {
    /// Location of the encoded animation. Overwritten by the next capture.
    pub file_path: PathBuf,
    /// Number of frames in the animation.
    pub frame_count: usize,
}

/// Rounds to two decimal places.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
