//! Captured frames.
//!
//! - `Frame`: one RGB still sampled from the stream, owned by the iteration
//!   that captured it.
//! - `InputSize`: spatial size an inference engine expects.
//!
//! Frames are row-major, 8-bit RGB (height x width x 3). They are never
//! shared across iterations; the renderer works on a copy.

use std::time::{SystemTime, UNIX_EPOCH};

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

pub const RGB_CHANNELS: usize = 3;

/// One RGB frame sampled from a stream.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    /// Wall-clock capture time (used for file naming).
    captured_at: SystemTime,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: SystemTime::now(),
        }
    }

    /// Build a frame from tightly packed RGB24 bytes.
    pub fn from_raw(pixels: Vec<u8>, width: u32, height: u32) -> PipelineResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(RGB_CHANNELS))
            .ok_or_else(|| PipelineError::InvalidFrame("frame dimensions overflow".into()))?;
        if pixels.len() != expected {
            return Err(PipelineError::InvalidFrame(format!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            )));
        }
        let image = RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
            PipelineError::InvalidFrame(format!("cannot wrap {}x{} RGB buffer", width, height))
        })?;
        Ok(Self::new(image))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// True when either spatial dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Raw RGB bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    /// Capture time in whole seconds since the Unix epoch.
    pub fn unix_secs(&self) -> u64 {
        self.captured_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Replace the pixel content, keeping capture metadata.
    pub(crate) fn with_image(&self, image: RgbImage) -> Self {
        Self {
            image,
            captured_at: self.captured_at,
        }
    }
}

/// Spatial input size of a model, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSize {
    pub height: u32,
    pub width: u32,
}

impl InputSize {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0
    }
}

impl std::fmt::Display for InputSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
