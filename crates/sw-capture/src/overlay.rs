//! Decorative frame overlays.
//!
//! An overlay is a mask/border pair. The mask is subtracted from each frame
//! (cutting out a shape) and the border is then added on top, both with
//! saturating per-channel arithmetic.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use image::RgbImage;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};

use crate::error::CaptureError;

/// A mask/border image pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    mask: RgbImage,
    border: RgbImage,
}

impl Overlay {
    /// Pairs a mask with a border. The border is resized to the mask if the
    /// two differ.
    pub fn new(mask: RgbImage, border: RgbImage) -> Self {
        let border = if border.dimensions() == mask.dimensions() {
            border
        } else {
            imageops::resize(&border, mask.width(), mask.height(), FilterType::Triangle)
        };
        Self { mask, border }
    }

    /// Loads a pair of images from disk.
    pub fn load(mask: &Path, border: &Path) -> Result<Self, CaptureError> {
        let open = |path: &Path| {
            image::open(path)
                .map(|image| image.to_rgb8())
                .map_err(|source| CaptureError::Overlay {
                    path: path.to_path_buf(),
                    source,
                })
        };
        Ok(Self::new(open(mask)?, open(border)?))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    /// Returns an overlay matching the given frame size, resizing only when
    /// needed.
    pub fn fitted(&self, width: u32, height: u32) -> Cow<'_, Self> {
        if self.dimensions() == (width, height) {
            Cow::Borrowed(self)
        } else {
            Cow::Owned(Self {
                mask: imageops::resize(&self.mask, width, height, FilterType::Triangle),
                border: imageops::resize(&self.border, width, height, FilterType::Triangle),
            })
        }
    }

    /// Applies the overlay in place. The frame must match
    /// [`Overlay::dimensions`]; see [`Overlay::fitted`].
    pub fn apply(&self, frame: &mut RgbImage) {
        debug_assert_eq!(frame.dimensions(), self.dimensions());
        for ((pixel, mask), border) in frame
            .pixels_mut()
            .zip(self.mask.pixels())
            .zip(self.border.pixels())
        {
            for channel in 0..3 {
                pixel[channel] = pixel[channel]
                    .saturating_sub(mask[channel])
                    .saturating_add(border[channel]);
            }
        }
    }
}

/// Applies an overlay to a run of frames, resizing it only when the frame
/// size changes.
#[derive(Debug)]
pub struct OverlayFitter<'a> {
    overlay: &'a Overlay,
    fitted: Option<Cow<'a, Overlay>>,
}

impl<'a> OverlayFitter<'a> {
    pub const fn new(overlay: &'a Overlay) -> Self {
        Self {
            overlay,
            fitted: None,
        }
    }

    pub fn apply(&mut self, frame: &mut RgbImage) {
        let (width, height) = frame.dimensions();
        let overlay = self.overlay;
        let fitted = match self.fitted.take() {
            Some(fitted) if fitted.dimensions() == (width, height) => fitted,
            _ => overlay.fitted(width, height),
        };
        fitted.apply(frame);
        self.fitted = Some(fitted);
    }

    /// The overlay as last fitted, if any frame has been seen.
    pub fn current(&self) -> Option<&Overlay> {
        self.fitted.as_deref()
    }
}

/// An overlay used during one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonalOverlay {
    /// Calendar month, 1 to 12.
    pub month: u32,
    pub mask: PathBuf,
    pub border: PathBuf,
}

impl SeasonalOverlay {
    /// The first overlay configured for `month`, if any.
    pub fn for_month(overlays: &[Self], month: u32) -> Option<&Self> {
        overlays.iter().find(|overlay| overlay.month == month)
    }

    pub fn load(&self) -> Result<Overlay, CaptureError> {
        Overlay::load(&self.mask, &self.border)
    }
}
