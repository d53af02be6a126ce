//! Error types for the common library.
//!
//! This module provides a unified error hierarchy using `thiserror` so every
//! tool can report failures the same way.
//!
//! # Error Categories
//!
//! - `Error::Decode`: an input was neither a live reference nor decodable media
//! - `Error::Validation`: Input validation failures
//! - `Error::Ffmpeg`: FFmpeg/FFprobe execution errors
//! - `Error::Image`: still-image decode/encode failures
//! - `Error::Download`: yt-dlp failures
//! - `Error::Io`: File system operations
//! - `ConfigError`: Missing or invalid configuration

use thiserror::Error;

/// Unified error type for the common library.
///
/// Every variant maps to a stable [`Error::kind`] string which tools report
/// next to the message, so callers can branch on the failure class.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors (invalid values, missing home directory)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The input could not be opened as media.
    ///
    /// Raised when a string given to a store is not a live reference and
    /// decoding it as a file path fails.
    #[error("Failed to decode '{input}': {message}")]
    Decode {
        /// The reference-or-path string that was resolved
        input: String,
        /// Why decoding failed
        message: String,
    },

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// File system I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// FFmpeg/FFprobe execution errors
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// Still-image processing errors
    #[error("Image error: {0}")]
    Image(String),

    /// Download errors
    #[error("Download error: {0}")]
    Download(String),
}

impl Error {
    /// Create a new decode error.
    ///
    /// # Example
    ///
    /// ```
    /// use video_edit_mcp_common::error::Error;
    ///
    /// let err = Error::decode("/missing/clip.mp4", "No such file or directory");
    /// assert!(err.to_string().contains("/missing/clip.mp4"));
    /// assert_eq!(err.kind(), "DecodeError");
    /// ```
    pub fn decode(input: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Decode {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Create a new validation error.
    ///
    /// # Example
    ///
    /// ```
    /// use video_edit_mcp_common::error::Error;
    ///
    /// let err = Error::validation("start_time must be less than end_time");
    /// assert!(err.to_string().contains("start_time"));
    /// ```
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Create a new FFmpeg error.
    ///
    /// # Example
    ///
    /// ```
    /// use video_edit_mcp_common::error::Error;
    ///
    /// let err = Error::ffmpeg("Invalid input format");
    /// assert!(err.to_string().contains("Invalid input format"));
    /// ```
    pub fn ffmpeg(message: impl Into<String>) -> Self {
        Error::Ffmpeg(message.into())
    }

    /// Create a new image error.
    pub fn image(message: impl Into<String>) -> Self {
        Error::Image(message.into())
    }

    /// Create a new download error.
    pub fn download(message: impl Into<String>) -> Self {
        Error::Download(message.into())
    }

    /// Stable name of the error class, reported as `error_type` by tools.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "ConfigError",
            Error::Decode { .. } => "DecodeError",
            Error::Validation(_) => "ValidationError",
            Error::Io(_) => "IoError",
            Error::Ffmpeg(_) => "FfmpegError",
            Error::Image(_) => "ImageError",
            Error::Download(_) => "DownloadError",
        }
    }

    /// Whether this is a decode failure.
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }
}

/// Configuration errors.
///
/// These errors occur when loading or validating configuration from
/// environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    /// No output directory configured and no home directory to default to
    #[error("Could not determine the home directory; set VIDEO_MCP_OUTPUT_DIR")]
    NoHomeDirectory,
}

impl ConfigError {
    /// Create a new invalid value error.
    pub fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue(name.into(), reason.into())
    }
}

/// Result type alias using the unified Error type.
pub type Result<T> = std::result::Result<T, Error>;
