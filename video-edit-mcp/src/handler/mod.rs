//! Tool handlers for video, audio and image editing.
//!
//! Every handler that takes media resolves it through the registry's stores,
//! and every handler that derives media lets the caller choose between a file
//! in the output directory (`return_path = true`) and a new store reference
//! (`return_path = false`).

pub mod audio;
pub mod download;
pub mod image;
pub mod util;
pub mod video;

use crate::ffmpeg::FfmpegRunner;
use crate::media::{AudioClip, MediaRegistry, ScratchFile, VideoClip};
use crate::store::MediaDecoder;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use video_edit_mcp_common::config::Config;
use video_edit_mcp_common::error::Error;

// =============================================================================
// Constants
// =============================================================================

/// Container used when an output name carries no extension for video.
pub const DEFAULT_VIDEO_EXT: &str = "mp4";

/// Container used when an output name carries no extension for audio.
pub const DEFAULT_AUDIO_EXT: &str = "wav";

/// Scale filter rounding both dimensions down to even, as yuv420p requires.
pub const EVEN_DIMENSIONS: &str = "scale=trunc(iw/2)*2:trunc(ih/2)*2";

// =============================================================================
// Output Types
// =============================================================================

/// How a derived result is handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Produced {
    /// Written to a file under the output directory.
    OutputPath(String),
    /// Stored; the value is the new reference.
    OutputObject(String),
}

impl Produced {
    /// The path or reference, whichever this is.
    pub fn value(&self) -> &str {
        match self {
            Produced::OutputPath(v) | Produced::OutputObject(v) => v,
        }
    }
}

/// Where a tool renders its output before delivery.
#[derive(Debug)]
pub struct OutputTarget {
    path: PathBuf,
    scratch: Option<ScratchFile>,
}

impl OutputTarget {
    /// Path to render to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path as an ffmpeg argument.
    pub fn arg(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Whether the result will be stored rather than returned as a path.
    pub fn is_stored(&self) -> bool {
        self.scratch.is_some()
    }

    /// Container extension of the render path.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(DEFAULT_VIDEO_EXT)
            .to_lowercase()
    }
}

// =============================================================================
// VideoEditHandler
// =============================================================================

/// Media editing handler shared by every tool.
pub struct VideoEditHandler {
    /// Application configuration.
    pub config: Config,
    /// Video and audio handle stores.
    pub registry: Arc<MediaRegistry>,
    ffmpeg: FfmpegRunner,
}

impl VideoEditHandler {
    /// Create a handler with empty stores.
    pub fn new(config: Config) -> Self {
        let ffmpeg = FfmpegRunner::from_config(&config);
        let registry = Arc::new(MediaRegistry::new(ffmpeg.clone()));
        Self {
            config,
            registry,
            ffmpeg,
        }
    }

    /// The ffmpeg runner used by tools.
    pub fn ffmpeg(&self) -> &FfmpegRunner {
        &self.ffmpeg
    }

    /// Release every stored handle.
    #[instrument(level = "info", skip(self))]
    pub async fn shutdown(&self) {
        let (videos, audios) = self.registry.clear_all().await;
        info!(videos, audios, "Released stored media");
    }

    // =========================================================================
    // Output Helpers
    // =========================================================================

    /// Fresh path in the scratch directory with the given extension.
    pub async fn scratch_path(&self, extension: &str) -> Result<PathBuf, Error> {
        tokio::fs::create_dir_all(&self.config.scratch_dir).await?;
        Ok(self
            .config
            .scratch_dir
            .join(format!("{}.{}", Uuid::new_v4(), extension)))
    }

    /// Resolve an output name and create its parent directory.
    pub async fn output_file(&self, name: &str) -> Result<PathBuf, Error> {
        if name.trim().is_empty() {
            return Err(Error::validation("Output name cannot be empty"));
        }
        let path = self.config.output_path(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(path)
    }

    /// Decide where to render a derived result.
    ///
    /// With `return_path` the output lands at `output_name` under the output
    /// directory. Otherwise it lands in a scratch file, whose extension comes
    /// from `output_name` or falls back to `default_ext`.
    pub async fn output_target(
        &self,
        output_name: &str,
        return_path: bool,
        default_ext: &str,
    ) -> Result<OutputTarget, Error> {
        if return_path {
            return Ok(OutputTarget {
                path: self.output_file(output_name).await?,
                scratch: None,
            });
        }

        let path = self.scratch_path(extension_or(output_name, default_ext)).await?;
        Ok(OutputTarget {
            scratch: Some(ScratchFile::new(&path)),
            path,
        })
    }

    /// Hand back a rendered video as a path or a new video reference.
    pub async fn deliver_video(&self, target: OutputTarget) -> Result<Produced, Error> {
        match target.scratch {
            None => Ok(Produced::OutputPath(target.path.display().to_string())),
            Some(scratch) => {
                let clip = self.decode_video(&target.path).await?.with_scratch(scratch);
                Ok(Produced::OutputObject(self.registry.videos.store(clip).await))
            }
        }
    }

    /// Hand back a rendered audio file as a path or a new audio reference.
    pub async fn deliver_audio(&self, target: OutputTarget) -> Result<Produced, Error> {
        match target.scratch {
            None => Ok(Produced::OutputPath(target.path.display().to_string())),
            Some(scratch) => {
                let clip = self.decode_audio(&target.path).await?.with_scratch(scratch);
                Ok(Produced::OutputObject(self.registry.audios.store(clip).await))
            }
        }
    }

    async fn decode_video(&self, path: &Path) -> Result<VideoClip, Error> {
        debug!(path = %path.display(), "Decoding rendered video");
        self.registry
            .videos
            .decoder()
            .decode(&path.to_string_lossy())
            .await
    }

    async fn decode_audio(&self, path: &Path) -> Result<AudioClip, Error> {
        debug!(path = %path.display(), "Decoding rendered audio");
        self.registry
            .audios
            .decoder()
            .decode(&path.to_string_lossy())
            .await
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Extension of `name`, or `default` when it has none.
pub fn extension_or<'a>(name: &'a str, default: &'a str) -> &'a str {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or(default)
}

/// Video encoder for a container, if ffmpeg's default is not good enough.
pub fn video_codec(extension: &str) -> Option<&'static str> {
    match extension {
        "mp4" | "mov" | "m4v" | "mkv" => Some("libx264"),
        "webm" => Some("libvpx-vp9"),
        "avi" => Some("mpeg4"),
        _ => None,
    }
}

/// Audio encoder for a container.
pub fn audio_codec(extension: &str) -> Option<&'static str> {
    match extension {
        "mp4" | "mov" | "m4v" | "mkv" | "m4a" | "aac" => Some("aac"),
        "webm" | "ogg" | "opus" => Some("libopus"),
        "avi" | "mp3" => Some("libmp3lame"),
        "wav" => Some("pcm_s16le"),
        "flac" => Some("flac"),
        _ => None,
    }
}

/// Encoder arguments for writing a video into a container.
pub fn encode_args(extension: &str) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(codec) = video_codec(extension) {
        args.extend(["-c:v".to_string(), codec.to_string()]);
        args.extend(["-pix_fmt".to_string(), "yuv420p".to_string()]);
    }
    if let Some(codec) = audio_codec(extension) {
        args.extend(["-c:a".to_string(), codec.to_string()]);
    }
    args
}

/// Round to two decimals for reporting.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Seconds formatted for ffmpeg time arguments.
pub fn secs(value: f64) -> String {
    format!("{:.3}", value)
}

/// Validate `0 <= start < end <= duration`.
pub fn check_time_range(start: f64, end: f64, duration: f64) -> Result<(), Error> {
    if start < 0.0 || end < 0.0 {
        return Err(Error::validation("Start and end times must be positive"));
    }
    if start >= end {
        return Err(Error::validation("Start time must be less than end time"));
    }
    // Probed durations are rounded; tolerate a millisecond of slack.
    if end > duration + 1e-3 {
        return Err(Error::validation(format!(
            "End time {} exceeds media duration {:.3}",
            end, duration
        )));
    }
    Ok(())
}

/// Run filesystem or pixel work on the blocking pool.
pub async fn blocking<T, F>(task: F) -> Result<T, Error>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| Error::from(std::io::Error::other(format!("blocking task failed: {}", e))))?
}

/// Validate a strictly positive quantity.
pub fn check_positive(name: &str, value: f64) -> Result<(), Error> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::validation(format!("{} must be positive", name)))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(root: &Path) -> VideoEditHandler {
        VideoEditHandler::new(Config::with_root(root))
    }

    #[test]
    fn test_produced_serializes_as_single_key() {
        let path = serde_json::to_value(Produced::OutputPath("/out/a.mp4".into())).unwrap();
        assert_eq!(path, serde_json::json!({"output_path": "/out/a.mp4"}));

        let object = serde_json::to_value(Produced::OutputObject("abc".into())).unwrap();
        assert_eq!(object, serde_json::json!({"output_object": "abc"}));
        assert_eq!(Produced::OutputObject("abc".into()).value(), "abc");
    }

    #[test]
    fn test_extension_or() {
        assert_eq!(extension_or("clip.mov", "mp4"), "mov");
        assert_eq!(extension_or("clip", "mp4"), "mp4");
        assert_eq!(extension_or("dir.v2/clip", "wav"), "wav");
        assert_eq!(extension_or("", "wav"), "wav");
    }

    #[test]
    fn test_check_time_range() {
        assert!(check_time_range(0.0, 2.0, 5.0).is_ok());
        assert!(check_time_range(1.0, 5.0, 5.0).is_ok());
        assert!(check_time_range(-1.0, 2.0, 5.0).is_err());
        assert!(check_time_range(3.0, 3.0, 5.0).is_err());
        assert!(check_time_range(4.0, 2.0, 5.0).is_err());

        let err = check_time_range(0.0, 9.0, 5.0).unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_check_positive() {
        assert!(check_positive("speed", 0.5).is_ok());
        assert!(check_positive("speed", 0.0).is_err());
        assert!(check_positive("speed", -1.0).is_err());
        assert!(check_positive("speed", f64::NAN).is_err());
    }

    #[test]
    fn test_encode_args_follow_container() {
        assert_eq!(
            encode_args("mp4"),
            vec!["-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac"]
        );
        assert_eq!(encode_args("webm")[1], "libvpx-vp9");
        assert_eq!(encode_args("wav"), vec!["-c:a", "pcm_s16le"]);
        assert!(encode_args("gif").is_empty());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.777_777), 1.78);
        assert_eq!(round2(2.0), 2.0);
    }

    #[test]
    fn test_secs_formatting() {
        assert_eq!(secs(1.5), "1.500");
        assert_eq!(secs(0.0), "0.000");
    }

    #[tokio::test]
    async fn test_output_target_with_return_path() {
        let root = tempfile::tempdir().unwrap();
        let handler = handler(root.path());

        let target = handler.output_target("nested/out.mp4", true, "mp4").await.unwrap();
        assert!(!target.is_stored());
        assert_eq!(target.path(), root.path().join("output/nested/out.mp4"));
        assert!(root.path().join("output/nested").is_dir());

        let produced = handler.deliver_video(target).await.unwrap();
        assert!(matches!(produced, Produced::OutputPath(p) if p.ends_with("out.mp4")));
    }

    #[tokio::test]
    async fn test_output_target_for_storage_uses_scratch() {
        let root = tempfile::tempdir().unwrap();
        let handler = handler(root.path());

        let target = handler.output_target("song.mp3", false, "wav").await.unwrap();
        assert!(target.is_stored());
        assert!(target.path().starts_with(root.path().join("scratch")));
        assert_eq!(target.path().extension().unwrap(), "mp3");
        assert_eq!(target.extension(), "mp3");

        let fallback = handler.output_target("", false, "wav").await.unwrap();
        assert_eq!(fallback.path().extension().unwrap(), "wav");
    }

    #[tokio::test]
    async fn test_empty_output_name_rejected_for_files() {
        let root = tempfile::tempdir().unwrap();
        let err = handler(root.path()).output_file("  ").await.unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[tokio::test]
    async fn test_failed_delivery_removes_scratch_and_stores_nothing() {
        let root = tempfile::tempdir().unwrap();
        let handler = handler(root.path());

        let target = handler.output_target("x.mp4", false, "mp4").await.unwrap();
        std::fs::write(target.path(), b"not a video").unwrap();
        let path = target.path().to_path_buf();

        // Garbage (or a missing ffprobe) fails to decode.
        assert!(handler.deliver_video(target).await.is_err());
        assert!(!path.exists());
        assert!(handler.registry.videos.is_empty().await);
    }

    #[tokio::test]
    async fn test_shutdown_clears_registry() {
        let root = tempfile::tempdir().unwrap();
        let handler = handler(root.path());
        handler.shutdown().await;
        assert!(handler.registry.videos.is_empty().await);
        assert!(handler.registry.audios.is_empty().await);
    }
}
