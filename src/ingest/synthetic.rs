//! Synthetic frame source (`stub://`).
//!
//! Produces a moving test pattern without touching the network. The URL
//! query may set `width` and `height` (default 640x480). The special host
//! `offline` yields `StreamUnavailable` on every capture, which is how a
//! dead camera looks to the pipeline.

use anyhow::{anyhow, Result};
use url::Url;

use super::{FrameSource, SourceStats};
use crate::error::{PipelineError, PipelineResult};
use crate::frame::{Frame, RGB_CHANNELS};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const OFFLINE_HOST: &str = "offline";

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Fail every capture with `StreamUnavailable`.
    pub offline: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://front_camera".to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            offline: false,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    failures: u64,
    /// Simulated scene state, advanced every 50 frames.
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            failures: 0,
            scene_state: 0,
        }
    }

    /// Build from a `stub://host?width=W&height=H` URL.
    pub fn from_url(url: &Url) -> Result<Self> {
        let mut config = SyntheticConfig {
            url: url.to_string(),
            offline: url.host_str() == Some(OFFLINE_HOST),
            ..SyntheticConfig::default()
        };
        for (key, value) in url.query_pairs() {
            let parsed = || {
                value
                    .parse::<u32>()
                    .map_err(|_| anyhow!("stub {} must be an integer, got '{}'", key, value))
            };
            match key.as_ref() {
                "width" => config.width = parsed()?,
                "height" => config.height = parsed()?,
                _ => {}
            }
        }
        Ok(Self::new(config))
    }

    fn generate_synthetic_pixels(&mut self) -> Vec<u8> {
        let pixel_count = self.config.width as usize * self.config.height as usize * RGB_CHANNELS;

        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn endpoint(&self) -> &str {
        &self.config.url
    }

    fn capture(&mut self) -> PipelineResult<Frame> {
        if self.config.offline {
            self.failures += 1;
            return Err(PipelineError::unavailable(
                &self.config.url,
                "synthetic source is offline",
            ));
        }

        self.frame_count += 1;
        let pixels = self.generate_synthetic_pixels();
        Frame::from_raw(pixels, self.config.width, self.config.height)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            failures: self.failures,
            endpoint: self.config.url.clone(),
        }
    }
}
