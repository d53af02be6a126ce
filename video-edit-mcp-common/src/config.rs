//! Configuration module for loading environment variables and settings.

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Environment variable overriding the output directory.
pub const OUTPUT_DIR_ENV: &str = "VIDEO_MCP_OUTPUT_DIR";

/// Environment variable overriding the scratch directory.
pub const SCRATCH_DIR_ENV: &str = "VIDEO_MCP_SCRATCH_DIR";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory that relative output names resolve against.
    pub output_dir: PathBuf,
    /// Directory for intermediate files backing stored handles.
    pub scratch_dir: PathBuf,
    /// `ffmpeg` binary name or path.
    pub ffmpeg_path: String,
    /// `ffprobe` binary name or path.
    pub ffprobe_path: String,
    /// `yt-dlp` binary name or path.
    pub ytdlp_path: String,
}

impl Config {
    /// Load configuration from environment variables and .env file.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` if a directory variable is set but empty,
    /// or `ConfigError::NoHomeDirectory` when no output directory is configured
    /// and the user's home directory cannot be determined.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let output_dir = match std::env::var(OUTPUT_DIR_ENV) {
            Ok(dir) => non_empty_dir(OUTPUT_DIR_ENV, dir)?,
            Err(_) => default_output_dir()?,
        };

        let scratch_dir = match std::env::var(SCRATCH_DIR_ENV) {
            Ok(dir) => non_empty_dir(SCRATCH_DIR_ENV, dir)?,
            Err(_) => std::env::temp_dir().join("video-edit-mcp"),
        };

        let ffmpeg_path = std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string());
        let ffprobe_path = std::env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string());
        let ytdlp_path = std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string());

        Ok(Self {
            output_dir,
            scratch_dir,
            ffmpeg_path,
            ffprobe_path,
            ytdlp_path,
        })
    }

    /// Build a configuration rooted at `root`, using default binary names.
    ///
    /// Outputs land in `root/output` and scratch files in `root/scratch`.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            output_dir: root.join("output"),
            scratch_dir: root.join("scratch"),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
        }
    }

    /// Resolve an output name against the output directory.
    ///
    /// Absolute paths are returned unchanged.
    pub fn output_path(&self, name: &str) -> PathBuf {
        let candidate = Path::new(name);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.output_dir.join(candidate)
        }
    }
}

fn non_empty_dir(var: &str, value: String) -> Result<PathBuf, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid_value(var, "directory cannot be empty"));
    }
    Ok(PathBuf::from(value))
}

/// The user's Downloads directory, falling back to `~/Downloads`.
pub fn user_downloads_dir() -> Result<PathBuf, ConfigError> {
    let dirs = directories::UserDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
    Ok(dirs
        .download_dir()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dirs.home_dir().join("Downloads")))
}

/// `<Downloads>/video_mcp_output`.
fn default_output_dir() -> Result<PathBuf, ConfigError> {
    Ok(user_downloads_dir()?.join("video_mcp_output"))
}
