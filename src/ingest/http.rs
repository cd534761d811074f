//! HTTP frame source.
//!
//! This module provides `HttpSource` for IP cameras and phone camera apps
//! that serve MJPEG (`multipart/x-mixed-replace`) or single still images
//! over HTTP.
//!
//! Each capture opens a fresh request, reads exactly one image, and drops
//! the response before returning. MJPEG streams are never left open
//! between captures.

use std::io::Read;
use std::time::Duration;

use super::{FrameSource, SourceStats};
use crate::error::{PipelineError, PipelineResult};
use crate::frame::Frame;

const MAX_IMAGE_BYTES: usize = 16 * 1024 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP MJPEG / still-image frame source.
pub struct HttpSource {
    url: String,
    agent: ureq::Agent,
    frame_count: u64,
    failures: u64,
}

impl HttpSource {
    pub fn new(url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();
        Self {
            url: url.to_string(),
            agent,
            frame_count: 0,
            failures: 0,
        }
    }

    fn grab(&self) -> PipelineResult<Frame> {
        let response = self
            .agent
            .get(&self.url)
            .call()
            .map_err(|e| PipelineError::unavailable(&self.url, e))?;

        let multipart = response
            .content_type()
            .to_ascii_lowercase()
            .contains("multipart");
        let mut reader = response.into_reader();

        let body = if multipart {
            MjpegReader::new(&mut reader).read_next_jpeg()
        } else {
            read_single_image(&mut reader)
        };
        let bytes = body.map_err(|reason| PipelineError::read(&self.url, reason))?;
        // Release the connection before decoding.
        drop(reader);

        decode_image(&bytes).map_err(|reason| PipelineError::read(&self.url, reason))
    }
}

impl FrameSource for HttpSource {
    fn endpoint(&self) -> &str {
        &self.url
    }

    fn capture(&mut self) -> PipelineResult<Frame> {
        match self.grab() {
            Ok(frame) => {
                self.frame_count += 1;
                Ok(frame)
            }
            Err(e) => {
                self.failures += 1;
                Err(e)
            }
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            failures: self.failures,
            endpoint: self.url.clone(),
        }
    }
}

/// Pulls one JPEG image out of a multipart byte stream.
///
/// When the part headers carry `Content-Length`, exactly that many bytes
/// after the SOI marker are taken, which keeps embedded EXIF thumbnails
/// (with their own EOI markers) intact. Otherwise the image ends at the
/// first EOI marker. Marker searches resume where the previous one stopped.
struct MjpegReader<'a, R: Read + ?Sized> {
    reader: &'a mut R,
    buffer: Vec<u8>,
    /// Offset of the next SOI search.
    soi_scan: usize,
    /// SOI offset and declared part length, once found.
    start: Option<(usize, Option<usize>)>,
    /// Offset of the next EOI search.
    eoi_scan: usize,
}

impl<'a, R: Read + ?Sized> MjpegReader<'a, R> {
    fn new(reader: &'a mut R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
            soi_scan: 0,
            start: None,
            eoi_scan: 0,
        }
    }

    fn read_next_jpeg(&mut self) -> Result<Vec<u8>, String> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = self.next_bounds() {
                return Ok(self.buffer[start..end].to_vec());
            }

            let read = self
                .reader
                .read(&mut chunk)
                .map_err(|e| format!("read mjpeg chunk: {}", e))?;
            if read == 0 {
                return Err("mjpeg stream ended before a complete image".to_string());
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_IMAGE_BYTES {
                return Err(format!(
                    "no complete jpeg within {} bytes",
                    MAX_IMAGE_BYTES
                ));
            }
        }
    }

    fn next_bounds(&mut self) -> Option<(usize, usize)> {
        let (start, length) = match self.start {
            Some(found) => found,
            None => {
                let Some(start) = find_marker(&self.buffer, self.soi_scan, SOI) else {
                    self.soi_scan = self.buffer.len().saturating_sub(1);
                    return None;
                };
                let length = part_content_length(&self.buffer[..start]);
                self.start = Some((start, length));
                self.eoi_scan = start + 2;
                (start, length)
            }
        };

        if let Some(length) = length {
            let end = start + length;
            if self.buffer.len() < end {
                return None;
            }
            if self.buffer[..end].ends_with(&EOI) {
                return Some((start, end));
            }
            // Declared length does not line up with the image; fall back to
            // the marker scan.
            log::debug!("mjpeg part length {} does not end at EOI", length);
            self.start = Some((start, None));
        }

        match find_marker(&self.buffer, self.eoi_scan, EOI) {
            Some(eoi) => Some((start, eoi + 2)),
            None => {
                self.eoi_scan = self.buffer.len().saturating_sub(1).max(start + 2);
                None
            }
        }
    }
}

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

fn find_marker(buffer: &[u8], from: usize, marker: [u8; 2]) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(2)
        .position(|w| w == marker)
        .map(|pos| from + pos)
}

/// `Content-Length` of the last part header block in `headers`.
fn part_content_length(headers: &[u8]) -> Option<usize> {
    String::from_utf8_lossy(headers)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .filter(|(key, _)| key.trim().eq_ignore_ascii_case("content-length"))
        .filter_map(|(_, value)| value.trim().parse::<usize>().ok())
        .filter(|&length| length >= 4 && length <= MAX_IMAGE_BYTES)
        .last()
}

fn read_single_image<R: Read>(reader: &mut R) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    reader
        .take(MAX_IMAGE_BYTES as u64)
        .read_to_end(&mut bytes)
        .map_err(|e| format!("read image body: {}", e))?;
    if bytes.is_empty() {
        return Err("empty image body".to_string());
    }
    Ok(bytes)
}

fn decode_image(bytes: &[u8]) -> Result<Frame, String> {
    let image = image::load_from_memory(bytes).map_err(|e| format!("decode image: {}", e))?;
    Ok(Frame::new(image.into_rgb8()))
}
