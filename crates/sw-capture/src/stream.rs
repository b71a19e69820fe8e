//! Video stream seam.
//!
//! A [`VideoStream`] is an open video source. It is owned by exactly one
//! capture call and released when dropped, so every exit path (success, a
//! broken stream, cancellation, a panic) gives the camera back.

use std::io;

use image::RgbImage;
use sw_core::StreamAddress;

use crate::error::CaptureError;

/// An open video source.
pub trait VideoStream {
    /// Whether the source is delivering frames.
    fn is_ready(&mut self) -> bool;

    /// Native frame rate reported by the source. Zero when unknown.
    fn native_fps(&self) -> f64;

    /// Reads the next frame.
    ///
    /// Returns `Ok(None)` once the source is closed or exhausted.
    fn read_frame(&mut self) -> io::Result<Option<RgbImage>>;
}

/// Opens video sources by address.
pub trait StreamOpener {
    type Stream: VideoStream;

    fn open(&self, address: &StreamAddress) -> Result<Self::Stream, CaptureError>;
}
