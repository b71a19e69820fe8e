//! Capture errors.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The camera could not be located.
#[derive(Debug, Error)]
pub enum CameraNotFound {
    /// No neighbour-table entry matched the camera's hardware address.
    #[error("no device with MAC {mac} in {table}")]
    NoMatch { mac: String, table: PathBuf },
    /// The neighbour table could not be read.
    #[error("failed to read {table}: {source}")]
    Table {
        table: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The rendered address was not usable.
    #[error("invalid stream address: {0}")]
    InvalidAddress(#[from] sw_core::ValidationError),
}

/// Failure of a single capture attempt.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Address resolution failed.
    #[error(transparent)]
    CameraNotFound(#[from] CameraNotFound),
    /// The stream could not be opened.
    #[error("failed to open stream {address}: {reason}")]
    Open { address: String, reason: String },
    /// The stream opened but is not delivering.
    #[error("stream {address} is not ready")]
    NotReady { address: String },
    /// The stream closed, ran dry, or produced an unusable frame mid-capture.
    #[error("stream failed after {accepted} accepted frames: {reason}")]
    Broken { accepted: usize, reason: String },
    /// Shutdown was requested while recording.
    #[error("capture cancelled")]
    Cancelled,
    /// The overlay images could not be loaded.
    #[error("failed to load overlay {path}: {source}")]
    Overlay {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    /// Frames could not be encoded.
    #[error("failed to encode evidence: {0}")]
    Encode(#[from] image::ImageError),
    /// The scratch file could not be written.
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CaptureError {
    /// Whether a fresh attempt could plausibly succeed.
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

/// Both the primary attempt and the recovery attempt failed, or the primary
/// attempt failed in a way no recovery can fix.
#[derive(Debug)]
pub struct CaptureFailed {
    /// Error from the first attempt.
    pub first: CaptureError,
    /// Error from the recovery attempt, if one was made.
    pub recovery: Option<CaptureError>,
}

impl CaptureFailed {
    /// The error that ended the capture.
    pub fn last(&self) -> &CaptureError {
        self.recovery.as_ref().unwrap_or(&self.first)
    }
}

impl fmt::Display for CaptureFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.recovery {
            Some(recovery) => write!(
                f,
                "capture failed ({}); recovery failed ({recovery})",
                self.first
            ),
            None => write!(f, "capture failed ({})", self.first),
        }
    }
}

impl std::error::Error for CaptureFailed {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.last())
    }
}
