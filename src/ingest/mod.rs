//! Frame ingestion sources.
//!
//! This module provides the sources a pipeline can capture from:
//! - HTTP(S) MJPEG or still-image endpoints (feature: ingest-http)
//! - RTSP and other GStreamer-decodable URIs (feature: rtsp-gstreamer)
//! - Synthetic `stub://` source (testing)
//!
//! Every source reopens its connection on each `capture` call and releases
//! it before returning, on success and on failure alike. A failed read can
//! never leave a half-open handle behind for the next iteration.
//!
//! Failure kinds:
//! - `StreamUnavailable`: the endpoint could not be opened
//! - `FrameReadError`: the endpoint answered but no frame could be decoded

#[cfg(feature = "ingest-http")]
pub mod http;
#[cfg(feature = "rtsp-gstreamer")]
pub mod rtsp;
pub mod synthetic;

use anyhow::{Context, Result};
use url::Url;

use crate::error::{PipelineError, PipelineResult};
use crate::frame::Frame;

#[cfg(feature = "ingest-http")]
pub use http::HttpSource;
#[cfg(feature = "rtsp-gstreamer")]
pub use rtsp::GstreamerSource;
pub use synthetic::SyntheticSource;

/// A stream that yields frames on demand.
pub trait FrameSource {
    /// Endpoint URL, for logging.
    fn endpoint(&self) -> &str;

    /// Block until one frame is available or the read fails.
    fn capture(&mut self) -> PipelineResult<Frame>;

    /// Capture statistics.
    fn stats(&self) -> SourceStats;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn endpoint(&self) -> &str {
        (**self).endpoint()
    }

    fn capture(&mut self) -> PipelineResult<Frame> {
        (**self).capture()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub failures: u64,
    pub endpoint: String,
}

/// Pick a source for `url` by scheme.
///
/// Only a URL that does not parse is an error. A scheme whose backend is
/// not compiled in, or a source that cannot be set up, yields an
/// `UnavailableSource` that reports `StreamUnavailable` on every capture.
pub fn open_source(url: &str) -> Result<Box<dyn FrameSource>> {
    let parsed = Url::parse(url).with_context(|| format!("parse stream url '{}'", url))?;
    let source: Result<Box<dyn FrameSource>> = match parsed.scheme() {
        "stub" => SyntheticSource::from_url(&parsed).map(|s| Box::new(s) as Box<dyn FrameSource>),
        #[cfg(feature = "ingest-http")]
        "http" | "https" => Ok(Box::new(HttpSource::new(url))),
        #[cfg(not(feature = "ingest-http"))]
        "http" | "https" => Err(anyhow::anyhow!(
            "http streams require the ingest-http feature"
        )),
        #[cfg(feature = "rtsp-gstreamer")]
        _ => GstreamerSource::new(url).map(|s| Box::new(s) as Box<dyn FrameSource>),
        #[cfg(not(feature = "rtsp-gstreamer"))]
        other => Err(anyhow::anyhow!(
            "unsupported stream scheme '{}'; rtsp and other URIs require the rtsp-gstreamer feature",
            other
        )),
    };

    Ok(source.unwrap_or_else(|e| {
        log::warn!("stream {} cannot be captured: {:#}", url, e);
        Box::new(UnavailableSource::new(url, format!("{:#}", e)))
    }))
}

/// A source that could not be set up. Every capture fails.
pub struct UnavailableSource {
    url: String,
    reason: String,
    failures: u64,
}

impl UnavailableSource {
    pub fn new(url: &str, reason: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            reason: reason.into(),
            failures: 0,
        }
    }
}

impl FrameSource for UnavailableSource {
    fn endpoint(&self) -> &str {
        &self.url
    }

    fn capture(&mut self) -> PipelineResult<Frame> {
        self.failures += 1;
        Err(PipelineError::unavailable(&self.url, &self.reason))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: 0,
            failures: self.failures,
            endpoint: self.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_urls_open_synthetic_source() -> Result<()> {
        let mut source = open_source("stub://front_camera?width=32&height=24")?;
        let frame = source.capture()?;
        assert_eq!(frame.width(), 32);
        assert_eq!(frame.height(), 24);
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn invalid_urls_are_rejected() {
        assert!(open_source("not a url").is_err());
    }

    #[test]
    fn bad_stub_parameters_fail_at_capture() -> Result<()> {
        let mut source = open_source("stub://front_camera?width=wide")?;
        for _ in 0..2 {
            let err = source.capture().unwrap_err();
            assert!(matches!(err, PipelineError::StreamUnavailable { .. }));
        }
        let stats = source.stats();
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.frames_captured, 0);
        assert_eq!(stats.endpoint, "stub://front_camera?width=wide");
        Ok(())
    }

    #[cfg(not(feature = "rtsp-gstreamer"))]
    #[test]
    fn rtsp_without_gstreamer_fails_at_capture() -> Result<()> {
        let mut source = open_source("rtsp://camera/stream")?;
        match source.capture() {
            Err(PipelineError::StreamUnavailable { reason, .. }) => {
                assert!(reason.contains("rtsp-gstreamer"));
            }
            other => panic!("expected StreamUnavailable, got {:?}", other.map(|_| ())),
        }
        assert_eq!(source.stats().failures, 1);
        Ok(())
    }

    #[cfg(feature = "ingest-http")]
    #[test]
    fn http_urls_open_http_source() -> Result<()> {
        let source = open_source("http://192.168.1.135:8080/video")?;
        assert_eq!(source.endpoint(), "http://192.168.1.135:8080/video");
        Ok(())
    }
}
