//! Core domain logic for shelfwatch.
//!
//! This crate contains the fundamental types and logic for:
//! - Detection: turning noisy weight samples into removal events
//! - Quiet hours: when detections are suppressed
//! - Scale access: the [`WeightSource`] seam and the Linux IIO adapter
//! - Backoff: bounded retry delays shared by the delivery layer

pub mod backoff;
mod detector;
pub mod quiet;
pub mod scale;
mod types;

pub use backoff::{BackoffDelays, BackoffPolicy};
pub use detector::{DetectorConfig, DetectorState, EventDetector};
pub use quiet::{ActiveWindow, QuietHours};
pub use scale::{IioScale, SensorError, WeightSource};
pub use types::{
    CalibrationProfile, Destination, EvidenceArtifact, RemovalEvent, StreamAddress,
    ValidationError, WeightSample,
};
