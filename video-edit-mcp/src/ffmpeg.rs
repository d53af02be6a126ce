//! FFmpeg/FFprobe subprocess execution.

use image::RgbImage;
use std::io::{Read, Write};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument, warn};
use video_edit_mcp_common::config::Config;
use video_edit_mcp_common::error::Error;

/// Longest stderr tail kept in error messages.
const STDERR_TAIL: usize = 2000;

/// Runs the configured `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    ffmpeg: String,
    ffprobe: String,
}

/// Geometry of a raw rgb24 frame stream piped into ffmpeg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawVideo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frames: u64,
}

impl FfmpegRunner {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.ffmpeg_path.clone(), config.ffprobe_path.clone())
    }

    /// Execute ffprobe and return parsed JSON output.
    #[instrument(level = "debug", skip(self))]
    pub async fn probe(&self, input: &Path) -> Result<serde_json::Value, Error> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v", "error",
                "-print_format", "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(input)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::ffmpeg(format!("failed to start {}: {}", self.ffprobe, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ffmpeg(format!(
                "ffprobe failed for '{}': {}",
                input.display(),
                tail(stderr.trim())
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::ffmpeg(format!("Failed to parse ffprobe output: {}", e)))
    }

    /// Execute ffmpeg with the given arguments, overwriting outputs.
    pub async fn run(&self, args: &[&str]) -> Result<(), Error> {
        debug!(args = ?args, "Running ffmpeg");

        let output = Command::new(&self.ffmpeg)
            .args(["-y", "-hide_banner", "-nostdin"])
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::ffmpeg(format!("failed to start {}: {}", self.ffmpeg, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ffmpeg(format!("ffmpeg failed: {}", tail(stderr.trim()))));
        }

        Ok(())
    }

    /// [`run`](Self::run) for owned argument lists.
    pub async fn run_owned(&self, args: &[String]) -> Result<(), Error> {
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&refs).await
    }

    /// Encode frames produced by `render` into `output`.
    ///
    /// Frames are piped to ffmpeg as raw rgb24. `output_args` go between the
    /// piped input and the output path. This call blocks; run it on a
    /// blocking thread.
    pub fn encode_frames<F>(
        &self,
        raw: RawVideo,
        output_args: &[String],
        output: &Path,
        mut render: F,
    ) -> Result<(), Error>
    where
        F: FnMut(u64) -> Result<RgbImage, Error>,
    {
        let size = format!("{}x{}", raw.width, raw.height);
        let rate = format!("{}", raw.fps);
        debug!(size = %size, fps = raw.fps, frames = raw.frames, "Encoding raw frames");

        let mut child = std::process::Command::new(&self.ffmpeg)
            .args(["-y", "-hide_banner", "-loglevel", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-s", &size, "-r", &rate, "-i", "-"])
            .args(output_args)
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::ffmpeg(format!("failed to start {}: {}", self.ffmpeg, e)))?;

        // Drain stderr concurrently so a chatty ffmpeg cannot stall the pipe.
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf);
                buf
            })
        });

        let write_result = match child.stdin.take() {
            Some(mut stdin) => (0..raw.frames).try_for_each(|index| {
                let frame = render(index)?;
                if frame.dimensions() != (raw.width, raw.height) {
                    return Err(Error::validation(format!(
                        "frame {} is {:?}, expected {}",
                        index,
                        frame.dimensions(),
                        size
                    )));
                }
                stdin.write_all(frame.as_raw()).map_err(Error::from)
            }),
            None => Err(Error::ffmpeg("ffmpeg stdin unavailable")),
        };

        let status = child.wait()?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        let result = if status.success() {
            write_result
        } else {
            Err(Error::ffmpeg(format!("ffmpeg failed: {}", tail(stderr.trim()))))
        };
        if result.is_err() {
            discard_partial(output);
        }
        result
    }
}

/// Remove a truncated output left behind by a failed encode.
fn discard_partial(output: &Path) {
    match std::fs::remove_file(output) {
        Ok(()) => debug!(path = %output.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %output.display(), error = %e, "Failed to remove partial output"),
    }
}

/// Keep the end of long stderr output, where ffmpeg reports the failure.
pub(crate) fn tail(stderr: &str) -> &str {
    if stderr.len() <= STDERR_TAIL {
        return stderr;
    }
    let mut start = stderr.len() - STDERR_TAIL;
    while !stderr.is_char_boundary(start) {
        start += 1;
    }
    &stderr[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_short_output() {
        assert_eq!(tail("Invalid data found"), "Invalid data found");
    }

    #[test]
    fn test_tail_truncates_from_the_front() {
        let long = format!("{}Conversion failed!", "x".repeat(5000));
        let kept = tail(&long);
        assert_eq!(kept.len(), STDERR_TAIL);
        assert!(kept.ends_with("Conversion failed!"));
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        let long = "é".repeat(STDERR_TAIL);
        let kept = tail(&long);
        assert!(kept.len() <= STDERR_TAIL);
        assert!(kept.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_from_config_uses_configured_binaries() {
        let mut config = Config::with_root("/data");
        config.ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg".to_string();
        let runner = FfmpegRunner::from_config(&config);
        assert_eq!(runner.ffmpeg, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(runner.ffprobe, "ffprobe");
    }

    /// ffmpeg stand-in that copies the piped frames to the output path.
    #[cfg(unix)]
    fn copying_ffmpeg(dir: &Path) -> FfmpegRunner {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("ffmpeg");
        std::fs::write(&script, "#!/bin/sh\nfor arg in \"$@\"; do last=\"$arg\"; done\ncat > \"$last\"\n")
            .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        FfmpegRunner::new(script.display().to_string(), "ffprobe")
    }

    #[cfg(unix)]
    #[test]
    fn test_encode_frames_writes_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let runner = copying_ffmpeg(dir.path());
        let output = dir.path().join("out.mp4");
        let raw = RawVideo { width: 2, height: 2, fps: 10.0, frames: 3 };

        runner
            .encode_frames(raw, &[], &output, |_| Ok(RgbImage::new(2, 2)))
            .unwrap();
        assert_eq!(std::fs::metadata(&output).unwrap().len(), 3 * 2 * 2 * 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_render_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let runner = copying_ffmpeg(dir.path());
        let output = dir.path().join("out.mp4");
        let raw = RawVideo { width: 2, height: 2, fps: 10.0, frames: 3 };

        let err = runner
            .encode_frames(raw, &[], &output, |index| {
                if index == 0 {
                    Ok(RgbImage::new(2, 2))
                } else {
                    Ok(RgbImage::new(4, 4))
                }
            })
            .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_missing_binary_is_ffmpeg_error() {
        let runner = FfmpegRunner::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");

        let err = runner.run(&["-version"]).await.unwrap_err();
        assert_eq!(err.kind(), "FfmpegError");
        assert!(err.to_string().contains("/nonexistent/ffmpeg"));

        let err = runner.probe(Path::new("in.mp4")).await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ffprobe"));
    }
}
