//! GStreamer frame source.
//!
//! This module provides `GstreamerSource` for RTSP cameras and any other URI
//! `uridecodebin` can play.
//!
//! Each capture:
//! 1. Builds `uridecodebin ! videoconvert ! appsink` for the URL
//! 2. Sets it to Playing and pulls one RGB sample
//! 3. Tears the pipeline down (state Null) through a drop guard
//!
//! Nothing survives between captures, so a stalled or broken stream cannot
//! leak a playing pipeline into the next iteration.

use std::time::Duration;

use anyhow::{Context, Result};
use gstreamer::prelude::*;

use super::{FrameSource, SourceStats};
use crate::error::{PipelineError, PipelineResult};
use crate::frame::{Frame, RGB_CHANNELS};

/// How long to wait for the first decoded sample.
const SAMPLE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct GstreamerSource {
    url: String,
    frame_count: u64,
    failures: u64,
}

impl GstreamerSource {
    pub fn new(url: &str) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;
        Ok(Self {
            url: url.to_string(),
            frame_count: 0,
            failures: 0,
        })
    }

    fn open(&self) -> PipelineResult<PlayingPipeline> {
        let description = format!(
            "uridecodebin uri={} ! videoconvert ! video/x-raw,format=RGB ! \
             appsink name=appsink sync=false max-buffers=1 drop=true",
            self.url
        );
        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| PipelineError::unavailable(&self.url, e))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| PipelineError::unavailable(&self.url, "pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .ok_or_else(|| PipelineError::unavailable(&self.url, "appsink missing from pipeline"))?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| PipelineError::unavailable(&self.url, "appsink has unexpected type"))?;

        // From here on the guard owns teardown.
        let guard = PlayingPipeline { pipeline, appsink };
        guard
            .pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| PipelineError::unavailable(&self.url, e))?;
        Ok(guard)
    }

    fn grab(&self) -> PipelineResult<Frame> {
        let playing = self.open()?;
        let timeout = gstreamer::ClockTime::from_mseconds(SAMPLE_TIMEOUT.as_millis() as u64);

        match playing.appsink.try_pull_sample(timeout) {
            Some(sample) => sample_to_frame(&sample).map_err(|e| PipelineError::read(&self.url, e)),
            None => Err(match playing.bus_error() {
                // The source element never connected.
                Some(reason) => PipelineError::unavailable(&self.url, reason),
                None => PipelineError::read(&self.url, "stream stalled before first frame"),
            }),
        }
    }
}

impl FrameSource for GstreamerSource {
    fn endpoint(&self) -> &str {
        &self.url
    }

    fn capture(&mut self) -> PipelineResult<Frame> {
        let result = self.grab();
        match &result {
            Ok(_) => self.frame_count += 1,
            Err(_) => self.failures += 1,
        }
        result
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            failures: self.failures,
            endpoint: self.url.clone(),
        }
    }
}

/// A playing pipeline; returned to Null on drop.
struct PlayingPipeline {
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
}

impl PlayingPipeline {
    fn bus_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        while let Some(message) = bus.timed_pop(gstreamer::ClockTime::ZERO) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    return Some(format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    ));
                }
                MessageView::Eos(..) => return Some("gstreamer reached EOS".to_string()),
                _ => {}
            }
        }
        None
    }
}

impl Drop for PlayingPipeline {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!("failed to stop gstreamer pipeline: {}", e);
        }
    }
}

fn sample_to_frame(sample: &gstreamer::Sample) -> Result<Frame> {
    let buffer = sample.buffer().context("sample missing buffer")?;
    let caps = sample.caps().context("sample missing caps")?;
    let info = gstreamer_video::VideoInfo::from_caps(caps).context("parse caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = width as usize * RGB_CHANNELS;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map buffer")?;
    let data = map.as_slice();

    let pixels = if stride == row_bytes {
        data.get(..row_bytes * height as usize)
            .context("buffer is shorter than the frame")?
            .to_vec()
    } else {
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            pixels.extend_from_slice(
                data.get(start..start + row_bytes)
                    .context("buffer row is out of bounds")?,
            );
        }
        pixels
    };

    Ok(Frame::from_raw(pixels, width, height)?)
}
