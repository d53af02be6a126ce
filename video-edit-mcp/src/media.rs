//! Decoded media handles and the decoders that produce them.
//!
//! A handle is the probed description of one concrete media file on disk.
//! Handles derived by tools own a [`ScratchFile`]; the file is removed when
//! the last `Arc` holding the handle is dropped.

use crate::ffmpeg::FfmpegRunner;
use crate::store::{HandleStore, MediaDecoder};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use video_edit_mcp_common::error::Error;

// =============================================================================
// Scratch Files
// =============================================================================

/// An intermediate file deleted on drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Take ownership of `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the scratch file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed scratch file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file"),
        }
    }
}

// =============================================================================
// FFprobe Report
// =============================================================================

/// Subset of `ffprobe -show_format -show_streams` JSON output.
///
/// ffprobe reports most numbers as strings, so they are kept as strings here
/// and parsed on access.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeReport {
    #[serde(default)]
    pub format: ProbeFormat,
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
}

/// Container-level probe fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeFormat {
    pub format_name: Option<String>,
    pub duration: Option<String>,
    pub bit_rate: Option<String>,
    pub size: Option<String>,
}

/// Stream-level probe fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeStream {
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub avg_frame_rate: Option<String>,
    pub r_frame_rate: Option<String>,
    pub nb_frames: Option<String>,
    pub pix_fmt: Option<String>,
    pub sample_rate: Option<String>,
    pub channels: Option<u32>,
    pub duration: Option<String>,
    pub bit_rate: Option<String>,
}

impl ProbeReport {
    /// Parse raw ffprobe JSON.
    pub fn from_json(json: serde_json::Value) -> Result<Self, String> {
        serde_json::from_value(json).map_err(|e| format!("unreadable ffprobe output: {}", e))
    }

    fn stream(&self, codec_type: &str) -> Option<&ProbeStream> {
        self.streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some(codec_type))
    }

    /// First video stream, skipping attached cover art (`mjpeg`/`png` with no frame rate).
    pub fn video_stream(&self) -> Option<&ProbeStream> {
        self.streams.iter().find(|s| {
            s.codec_type.as_deref() == Some("video") && s.frame_rate().is_some_and(|r| r > 0.0)
        })
    }

    /// First audio stream.
    pub fn audio_stream(&self) -> Option<&ProbeStream> {
        self.stream("audio")
    }

    /// Container duration, falling back to the longest stream duration.
    pub fn duration(&self) -> Option<f64> {
        parse_number(self.format.duration.as_deref()).or_else(|| {
            self.streams
                .iter()
                .filter_map(|s| parse_number(s.duration.as_deref()))
                .reduce(f64::max)
        })
    }
}

impl ProbeStream {
    /// Frame rate from `avg_frame_rate`, falling back to `r_frame_rate`.
    pub fn frame_rate(&self) -> Option<f64> {
        parse_rational(self.avg_frame_rate.as_deref())
            .or_else(|| parse_rational(self.r_frame_rate.as_deref()))
    }
}

fn parse_number<T: std::str::FromStr>(value: Option<&str>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Parse an ffprobe rational such as `30000/1001`. `0/0` yields `None`.
pub fn parse_rational(value: Option<&str>) -> Option<f64> {
    let value = value?.trim();
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

// =============================================================================
// Handles
// =============================================================================

/// Soundtrack of a video handle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioTrack {
    pub codec: String,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u64>,
}

impl AudioTrack {
    fn from_stream(stream: &ProbeStream) -> Self {
        Self {
            codec: stream.codec_name.clone().unwrap_or_else(|| "unknown".to_string()),
            sample_rate: parse_number(stream.sample_rate.as_deref()),
            channels: stream.channels,
            duration: parse_number(stream.duration.as_deref()),
            bit_rate: parse_number(stream.bit_rate.as_deref()),
        }
    }
}

/// A decoded video.
#[derive(Debug, Serialize)]
pub struct VideoClip {
    pub path: PathBuf,
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pix_fmt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u64>,
    pub audio: Option<AudioTrack>,
    #[serde(skip)]
    scratch: Option<ScratchFile>,
}

impl VideoClip {
    /// Build a video handle from a probe report.
    ///
    /// Fails when the report has no video stream or no usable duration.
    pub fn from_probe(path: impl Into<PathBuf>, report: &ProbeReport) -> Result<Self, String> {
        let stream = report
            .video_stream()
            .ok_or_else(|| "no video stream found".to_string())?;
        let duration = report
            .duration()
            .filter(|d| *d > 0.0)
            .ok_or_else(|| "unknown or zero duration".to_string())?;

        Ok(Self {
            path: path.into(),
            duration,
            width: stream.width.unwrap_or(0),
            height: stream.height.unwrap_or(0),
            fps: stream.frame_rate().unwrap_or(0.0),
            codec: stream.codec_name.clone().unwrap_or_else(|| "unknown".to_string()),
            pix_fmt: stream.pix_fmt.clone(),
            frame_count: parse_number(stream.nb_frames.as_deref()),
            bit_rate: parse_number(stream.bit_rate.as_deref())
                .or_else(|| parse_number(report.format.bit_rate.as_deref())),
            audio: report.audio_stream().map(AudioTrack::from_stream),
            scratch: None,
        })
    }

    /// Attach the scratch file backing this handle.
    pub fn with_scratch(mut self, scratch: ScratchFile) -> Self {
        self.scratch = Some(scratch);
        self
    }

    /// Whether the handle owns its backing file.
    pub fn is_scratch(&self) -> bool {
        self.scratch.is_some()
    }

    /// Whether the video carries a soundtrack.
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Path as an ffmpeg argument.
    pub fn input_arg(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// A decoded audio clip.
#[derive(Debug, Serialize)]
pub struct AudioClip {
    pub path: PathBuf,
    pub duration: f64,
    pub codec: String,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u64>,
    #[serde(skip)]
    scratch: Option<ScratchFile>,
}

impl AudioClip {
    /// Build an audio handle from a probe report.
    ///
    /// Any file with an audio stream qualifies, including videos.
    pub fn from_probe(path: impl Into<PathBuf>, report: &ProbeReport) -> Result<Self, String> {
        let stream = report
            .audio_stream()
            .ok_or_else(|| "no audio stream found".to_string())?;
        let duration = parse_number(stream.duration.as_deref())
            .or_else(|| report.duration())
            .filter(|d: &f64| *d > 0.0)
            .ok_or_else(|| "unknown or zero duration".to_string())?;
        let track = AudioTrack::from_stream(stream);

        Ok(Self {
            path: path.into(),
            duration,
            codec: track.codec,
            sample_rate: track.sample_rate,
            channels: track.channels,
            bit_rate: track
                .bit_rate
                .or_else(|| parse_number(report.format.bit_rate.as_deref())),
            scratch: None,
        })
    }

    /// Attach the scratch file backing this handle.
    pub fn with_scratch(mut self, scratch: ScratchFile) -> Self {
        self.scratch = Some(scratch);
        self
    }

    /// Whether the handle owns its backing file.
    pub fn is_scratch(&self) -> bool {
        self.scratch.is_some()
    }

    /// Path as an ffmpeg argument.
    pub fn input_arg(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

// =============================================================================
// Decoders
// =============================================================================

async fn probe_path(ffmpeg: &FfmpegRunner, path: &str) -> Result<ProbeReport, Error> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| Error::decode(path, e.to_string()))?;
    if !metadata.is_file() {
        return Err(Error::decode(path, "not a regular file"));
    }

    let json = ffmpeg
        .probe(Path::new(path))
        .await
        .map_err(|e| Error::decode(path, e.to_string()))?;
    ProbeReport::from_json(json).map_err(|e| Error::decode(path, e))
}

/// Decodes files into [`VideoClip`]s with ffprobe.
#[derive(Debug, Clone)]
pub struct VideoDecoder {
    ffmpeg: FfmpegRunner,
}

impl VideoDecoder {
    pub fn new(ffmpeg: FfmpegRunner) -> Self {
        Self { ffmpeg }
    }
}

#[async_trait]
impl MediaDecoder for VideoDecoder {
    type Handle = VideoClip;

    async fn decode(&self, path: &str) -> Result<VideoClip, Error> {
        let report = probe_path(&self.ffmpeg, path).await?;
        let clip = VideoClip::from_probe(path, &report).map_err(|e| Error::decode(path, e))?;
        debug!(path, duration = clip.duration, width = clip.width, height = clip.height, "Decoded video");
        Ok(clip)
    }
}

/// Decodes files into [`AudioClip`]s with ffprobe.
#[derive(Debug, Clone)]
pub struct AudioDecoder {
    ffmpeg: FfmpegRunner,
}

impl AudioDecoder {
    pub fn new(ffmpeg: FfmpegRunner) -> Self {
        Self { ffmpeg }
    }
}

#[async_trait]
impl MediaDecoder for AudioDecoder {
    type Handle = AudioClip;

    async fn decode(&self, path: &str) -> Result<AudioClip, Error> {
        let report = probe_path(&self.ffmpeg, path).await?;
        let clip = AudioClip::from_probe(path, &report).map_err(|e| Error::decode(path, e))?;
        debug!(path, duration = clip.duration, "Decoded audio");
        Ok(clip)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Video store type.
pub type VideoStore = HandleStore<VideoDecoder>;

/// Audio store type.
pub type AudioStore = HandleStore<AudioDecoder>;

/// The video and audio stores of one server instance.
pub struct MediaRegistry {
    pub videos: VideoStore,
    pub audios: AudioStore,
}

impl MediaRegistry {
    /// Create empty stores backed by ffprobe.
    pub fn new(ffmpeg: FfmpegRunner) -> Self {
        Self {
            videos: HandleStore::new("video", VideoDecoder::new(ffmpeg.clone())),
            audios: HandleStore::new("audio", AudioDecoder::new(ffmpeg)),
        }
    }

    /// Empty both stores. Returns `(videos, audios)` dropped.
    pub async fn clear_all(&self) -> (usize, usize) {
        let videos = self.videos.clear().await;
        let audios = self.audios.clear().await;
        info!(videos, audios, "Cleared media registry");
        (videos, audios)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn probe_with_audio() -> ProbeReport {
        ProbeReport::from_json(json!({
            "streams": [
                {
                    "index": 0,
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080,
                    "avg_frame_rate": "30000/1001",
                    "r_frame_rate": "30000/1001",
                    "nb_frames": "300",
                    "pix_fmt": "yuv420p",
                    "bit_rate": "4000000"
                },
                {
                    "index": 1,
                    "codec_type": "audio",
                    "codec_name": "aac",
                    "sample_rate": "48000",
                    "channels": 2,
                    "duration": "10.010000",
                    "bit_rate": "128000"
                }
            ],
            "format": {
                "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
                "duration": "10.010000",
                "bit_rate": "4200000",
                "size": "5255250"
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_rational() {
        assert_eq!(parse_rational(Some("25/1")), Some(25.0));
        assert!((parse_rational(Some("30000/1001")).unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rational(Some("24")), Some(24.0));
        assert_eq!(parse_rational(Some("0/0")), None);
        assert_eq!(parse_rational(Some("abc")), None);
        assert_eq!(parse_rational(None), None);
    }

    #[test]
    fn test_video_clip_from_probe() {
        let clip = VideoClip::from_probe("/media/in.mp4", &probe_with_audio()).unwrap();

        assert_eq!(clip.width, 1920);
        assert_eq!(clip.height, 1080);
        assert!((clip.duration - 10.01).abs() < 1e-6);
        assert!((clip.fps - 29.97).abs() < 0.01);
        assert_eq!(clip.codec, "h264");
        assert_eq!(clip.frame_count, Some(300));
        assert_eq!(clip.bit_rate, Some(4_000_000));
        assert!(clip.has_audio());
        assert!(!clip.is_scratch());

        let audio = clip.audio.as_ref().unwrap();
        assert_eq!(audio.codec, "aac");
        assert_eq!(audio.sample_rate, Some(48000));
        assert_eq!(audio.channels, Some(2));
    }

    #[test]
    fn test_video_clip_requires_video_stream() {
        let report = ProbeReport::from_json(json!({
            "streams": [{"codec_type": "audio", "codec_name": "mp3", "sample_rate": "44100"}],
            "format": {"duration": "3.0"}
        }))
        .unwrap();

        let err = VideoClip::from_probe("song.mp3", &report).unwrap_err();
        assert!(err.contains("no video stream"));
    }

    #[test]
    fn test_cover_art_is_not_a_video_stream() {
        let report = ProbeReport::from_json(json!({
            "streams": [
                {"codec_type": "audio", "codec_name": "mp3", "sample_rate": "44100"},
                {"codec_type": "video", "codec_name": "mjpeg", "avg_frame_rate": "0/0", "width": 500, "height": 500}
            ],
            "format": {"duration": "180.0"}
        }))
        .unwrap();

        assert!(report.video_stream().is_none());
        assert!(AudioClip::from_probe("song.mp3", &report).is_ok());
    }

    #[test]
    fn test_audio_clip_from_video_probe() {
        let clip = AudioClip::from_probe("/media/in.mp4", &probe_with_audio()).unwrap();
        assert_eq!(clip.codec, "aac");
        assert_eq!(clip.sample_rate, Some(48000));
        assert_eq!(clip.bit_rate, Some(128_000));
        assert!((clip.duration - 10.01).abs() < 1e-6);
    }

    #[test]
    fn test_audio_clip_requires_audio_stream() {
        let report = ProbeReport::from_json(json!({
            "streams": [{"codec_type": "video", "codec_name": "h264", "avg_frame_rate": "25/1"}],
            "format": {"duration": "2.0"}
        }))
        .unwrap();

        assert!(AudioClip::from_probe("silent.mp4", &report).is_err());
    }

    #[test]
    fn test_zero_duration_rejected() {
        let report = ProbeReport::from_json(json!({
            "streams": [{"codec_type": "video", "codec_name": "png", "avg_frame_rate": "25/1"}],
            "format": {"duration": "0.000000"}
        }))
        .unwrap();

        assert!(VideoClip::from_probe("still.png", &report).is_err());
    }

    #[test]
    fn test_duration_falls_back_to_streams() {
        let report = ProbeReport::from_json(json!({
            "streams": [
                {"codec_type": "video", "avg_frame_rate": "25/1", "duration": "4.0"},
                {"codec_type": "audio", "duration": "4.5"}
            ],
            "format": {}
        }))
        .unwrap();

        assert_eq!(report.duration(), Some(4.5));
    }

    #[test]
    fn test_video_clip_serializes_without_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::new(dir.path().join("x.mp4"));
        let clip = VideoClip::from_probe("/media/in.mp4", &probe_with_audio())
            .unwrap()
            .with_scratch(scratch);

        let value = serde_json::to_value(&clip).unwrap();
        assert_eq!(value["width"], 1920);
        assert_eq!(value["audio"]["codec"], "aac");
        assert!(value.get("scratch").is_none());
        assert!(clip.is_scratch());
    }

    #[test]
    fn test_scratch_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part.mp4");
        std::fs::write(&path, b"data").unwrap();

        let scratch = ScratchFile::new(&path);
        assert_eq!(scratch.path(), path.as_path());
        drop(scratch);

        assert!(!path.exists());
    }

    #[test]
    fn test_scratch_file_missing_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        drop(ScratchFile::new(dir.path().join("never-written.wav")));
    }

    #[test]
    fn test_scratch_lives_as_long_as_shared_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.mp4");
        std::fs::write(&path, b"data").unwrap();

        let clip = std::sync::Arc::new(
            VideoClip::from_probe(&path, &probe_with_audio())
                .unwrap()
                .with_scratch(ScratchFile::new(&path)),
        );
        let other = std::sync::Arc::clone(&clip);

        drop(clip);
        assert!(path.exists());
        drop(other);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_decoders_report_missing_files_as_decode_errors() {
        let runner = FfmpegRunner::new("ffmpeg", "ffprobe");
        let registry = MediaRegistry::new(runner);

        let err = registry.videos.load("/nonexistent/file.mp4").await.unwrap_err();
        assert!(err.is_decode());
        let err = registry.audios.load("/nonexistent/file.wav").await.unwrap_err();
        assert!(err.is_decode());

        assert_eq!(registry.clear_all().await, (0, 0));
    }
}
