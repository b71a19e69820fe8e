//! Evidence capture for shelfwatch.
//!
//! - Locating the camera ([`CameraLocator`], static and neighbour-table lookups)
//! - Stream access ([`StreamOpener`]/[`VideoStream`], backed by `ffmpeg`)
//! - Seasonal overlays composited onto frames
//! - [`EvidenceRecorder`]: one capture, plus the one-shot recovery policy

mod error;
pub mod ffmpeg;
pub mod locate;
pub mod overlay;
mod recorder;
pub mod stream;

pub use error::{CameraNotFound, CaptureError, CaptureFailed};
pub use ffmpeg::{FfmpegOpener, FfmpegStream};
pub use locate::{ArpTableLocator, CameraLocator, StaticLocator};
pub use overlay::{Overlay, OverlayFitter, SeasonalOverlay};
pub use recorder::{CaptureSettings, EvidenceRecorder, decimation_stride};
pub use stream::{StreamOpener, VideoStream};
