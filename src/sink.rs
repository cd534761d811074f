//! Frame persistence.
//!
//! Frames are written as PNG files named `frame_<unix-seconds>.png`, using
//! the frame's capture time. The directory is created on first use.
//!
//! Names only have one-second resolution: a second frame captured within
//! the same second overwrites the first. The polling interval is expected
//! to be much longer than a second, so this is accepted rather than worked
//! around.

use std::fs;
use std::path::{Path, PathBuf};

use image::ImageFormat;

use crate::error::{PipelineError, PipelineResult};
use crate::frame::Frame;

/// File name a frame will be saved under.
pub fn frame_file_name(frame: &Frame) -> String {
    format!("frame_{}.png", frame.unix_secs())
}

/// Save `frame` into `dir`, creating `dir` if needed. Returns the written path.
pub fn save(frame: &Frame, dir: &Path) -> PipelineResult<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| PipelineError::write(dir, e))?;

    let path = dir.join(frame_file_name(frame));
    frame
        .image()
        .save_with_format(&path, ImageFormat::Png)
        .map_err(|e| PipelineError::write(&path, e))?;

    log::debug!("saved frame to {}", path.display());
    Ok(path)
}
