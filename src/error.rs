use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while running one pipeline iteration.
///
/// None of these are fatal to the daemon: the loop logs them and moves on
/// to the next iteration.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The stream endpoint could not be opened at all.
    #[error("stream unavailable at {url}: {reason}")]
    StreamUnavailable { url: String, reason: String },

    /// The stream was opened but did not yield a decodable frame.
    #[error("failed to read frame from {url}: {reason}")]
    FrameReadError { url: String, reason: String },

    /// Zero-sized or otherwise unusable frame.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("inference failed in {engine}: {reason}")]
    InferenceFailed { engine: String, reason: String },

    /// Engine output does not match the configured column layout.
    #[error("malformed output tensor {output}: {reason}")]
    MalformedOutput { output: usize, reason: String },

    #[error("failed to write {}: {reason}", path.display())]
    WriteError { path: PathBuf, reason: String },
}

impl PipelineError {
    pub(crate) fn unavailable(url: &str, reason: impl ToString) -> Self {
        Self::StreamUnavailable {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn read(url: &str, reason: impl ToString) -> Self {
        Self::FrameReadError {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::WriteError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for failures of the capture stage.
    pub fn is_capture_failure(&self) -> bool {
        matches!(
            self,
            Self::StreamUnavailable { .. } | Self::FrameReadError { .. }
        )
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
