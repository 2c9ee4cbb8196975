//! Errors raised while running FFmpeg concatenation.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Failure of a concatenation run or of its setup.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg executable not available: {0}")]
    FfmpegNotFound(String),

    #[error("FFmpeg exited unsuccessfully: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Clip does not exist: {0}")]
    FileNotFound(PathBuf),

    #[error("Bad concatenation input: {0}")]
    InvalidInput(String),

    #[error("FFmpeg killed after {0}s without finishing")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Captured diagnostic text, when the process got far enough to produce any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            MediaError::FfmpegFailed { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }
}
