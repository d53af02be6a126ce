//! Downloading media with yt-dlp.

use super::{blocking, VideoEditHandler};
use crate::ffmpeg::tail;
use crate::store::MediaDecoder;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use video_edit_mcp_common::config::user_downloads_dir;
use video_edit_mcp_common::error::Error;

/// yt-dlp file name template used when saving into a directory.
pub const DEFAULT_TEMPLATE: &str = "%(title)s [%(id)s].%(ext)s";

/// Default audio format for audio-only downloads.
pub const DEFAULT_AUDIO_FORMAT: &str = "mp3";

/// Default audio quality for audio-only downloads.
pub const DEFAULT_AUDIO_QUALITY: &str = "192";

// =============================================================================
// Types
// =============================================================================

/// Parameters for downloading media from a URL.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct DownloadVideoParams {
    /// URL to download from.
    pub url: String,
    /// Directory, full file path or yt-dlp output template. Defaults to the
    /// user's Downloads directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    /// Download and extract audio only.
    #[serde(default)]
    pub audio_only: bool,
    /// Audio format for audio-only downloads.
    #[serde(default = "default_audio_format")]
    pub audio_format: String,
    /// Audio quality for audio-only downloads (0-10 VBR or a bitrate such as "192").
    #[serde(default = "default_audio_quality")]
    pub audio_quality: String,
    /// true returns the file path; false also loads the file into the video
    /// (or audio) store and returns a reference.
    #[serde(default = "default_true")]
    pub return_path: bool,
}

fn default_audio_format() -> String {
    DEFAULT_AUDIO_FORMAT.to_string()
}

fn default_audio_quality() -> String {
    DEFAULT_AUDIO_QUALITY.to_string()
}

fn default_true() -> bool {
    true
}

/// Parameters for `get_download_paths` (none).
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct DownloadPathsParams {}

/// Result of a download.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub title: String,
    pub id: String,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub filepath: String,
    pub filename: String,
    pub directory: String,
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_object: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Metadata yt-dlp prints after moving the final file into place.
#[derive(Debug, Clone, Deserialize)]
struct YtDlpInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    filepath: Option<String>,
    #[serde(default, rename = "_filename")]
    filename: Option<String>,
}

/// Suggested locations for saving downloads.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadPaths {
    pub current_working_directory: String,
    pub suggested_paths: SuggestedPaths,
    pub usage_examples: UsageExamples,
    pub note: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestedPaths {
    pub user_downloads: Option<String>,
    pub desktop: Option<String>,
    pub documents: Option<String>,
    pub project_root: Option<String>,
    pub current_directory: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageExamples {
    pub save_to_downloads: Option<String>,
    pub save_to_custom_folder: Option<String>,
    pub save_to_desktop: Option<String>,
}

// =============================================================================
// Helpers
// =============================================================================

/// yt-dlp output template for `save_path`.
///
/// Existing directories get [`DEFAULT_TEMPLATE`] inside them, strings with
/// `%(` are templates already, and anything else is a file path whose parent
/// directory is created. Relative paths resolve against the working directory.
pub fn output_template<F>(save_path: Option<&str>, downloads: F) -> Result<String, Error>
where
    F: FnOnce() -> Result<PathBuf, Error>,
{
    let Some(save_path) = save_path.filter(|p| !p.trim().is_empty()) else {
        let downloads = downloads()?;
        std::fs::create_dir_all(&downloads)?;
        return Ok(downloads.join(DEFAULT_TEMPLATE).display().to_string());
    };

    let path = Path::new(save_path);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        warn!(save_path, "Relative save path resolves against the working directory");
        std::env::current_dir()?.join(path)
    };

    if absolute.is_dir() {
        return Ok(absolute.join(DEFAULT_TEMPLATE).display().to_string());
    }
    if !save_path.contains("%(") {
        if let Some(parent) = absolute.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(absolute.display().to_string())
}

/// yt-dlp arguments for a download.
pub fn ytdlp_args(params: &DownloadVideoParams, template: &str) -> Vec<String> {
    let mut args = vec![
        "--no-playlist".to_string(),
        "--no-simulate".to_string(),
        "--no-progress".to_string(),
        "-o".to_string(),
        template.to_string(),
        "--print".to_string(),
        "after_move:%()j".to_string(),
    ];
    if params.audio_only {
        args.extend([
            "-f".to_string(),
            "bestaudio/best".to_string(),
            "-x".to_string(),
            "--audio-format".to_string(),
            params.audio_format.clone(),
            "--audio-quality".to_string(),
            params.audio_quality.clone(),
        ]);
    }
    args.extend(["--".to_string(), params.url.clone()]);
    args
}

/// Last JSON object yt-dlp printed.
fn parse_info(stdout: &str) -> Result<YtDlpInfo, Error> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| line.trim_start().starts_with('{'))
        .ok_or_else(|| Error::download("yt-dlp printed no metadata"))?;
    serde_json::from_str(line)
        .map_err(|e| Error::download(format!("Failed to parse yt-dlp output: {}", e)))
}

/// The working directory when it looks like this project's checkout.
pub fn project_root(cwd: &Path) -> Option<PathBuf> {
    let text = cwd.to_string_lossy();
    (text.contains("video-edit-mcp") || text.contains("video_edit_mcp")).then(|| cwd.to_path_buf())
}

/// Common download locations for this user.
pub fn download_paths(cwd: &Path) -> DownloadPaths {
    let dirs = directories::UserDirs::new();
    let show = |p: PathBuf| p.display().to_string();

    let downloads = user_downloads_dir().ok();
    let desktop = dirs
        .as_ref()
        .map(|d| d.desktop_dir().map(Path::to_path_buf).unwrap_or_else(|| d.home_dir().join("Desktop")));
    let documents = dirs
        .as_ref()
        .map(|d| d.document_dir().map(Path::to_path_buf).unwrap_or_else(|| d.home_dir().join("Documents")));
    let current = show(cwd.to_path_buf());

    DownloadPaths {
        current_working_directory: current.clone(),
        suggested_paths: SuggestedPaths {
            user_downloads: downloads.clone().map(show),
            desktop: desktop.clone().map(show),
            documents: documents.map(show),
            project_root: project_root(cwd).map(show),
            current_directory: current,
        },
        usage_examples: UsageExamples {
            save_to_downloads: downloads.clone().map(show),
            save_to_custom_folder: downloads.map(|d| show(d.join("YouTube_Videos"))),
            save_to_desktop: desktop.map(show),
        },
        note: "Use full absolute paths to avoid saving in unexpected locations".to_string(),
    }
}

// =============================================================================
// Tool Implementations
// =============================================================================

impl VideoEditHandler {
    /// Download a video (or its audio) with yt-dlp.
    #[instrument(level = "info", skip(self))]
    pub async fn download_video(&self, params: DownloadVideoParams) -> Result<DownloadResult, Error> {
        if params.url.trim().is_empty() {
            return Err(Error::validation("URL cannot be empty"));
        }

        let save_path = params.save_path.clone();
        let template = blocking(move || {
            output_template(save_path.as_deref(), || user_downloads_dir().map_err(Error::from))
        })
        .await?;
        let args = ytdlp_args(&params, &template);
        debug!(args = ?args, "Running yt-dlp");

        let output = Command::new(&self.config.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                Error::download(format!("failed to start {}: {}", self.config.ytdlp_path, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::download(format!("yt-dlp failed: {}", tail(stderr.trim()))));
        }

        let info = parse_info(&String::from_utf8_lossy(&output.stdout))?;
        let filepath = info
            .filepath
            .clone()
            .or_else(|| info.filename.clone())
            .ok_or_else(|| Error::download("yt-dlp did not report a file path"))?;
        let path = PathBuf::from(&filepath);
        let file_size = tokio::fs::metadata(&path).await.ok().map(|m| m.len());

        let mut result = DownloadResult {
            title: info.title.unwrap_or_else(|| "Unknown".to_string()),
            id: info.id.unwrap_or_else(|| "Unknown".to_string()),
            duration: info.duration,
            uploader: info.uploader,
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            directory: path
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            filepath: filepath.clone(),
            file_size,
            output_object: None,
            warning: file_size
                .is_none()
                .then(|| "File path expected but not found at exact location".to_string()),
        };

        if !params.return_path {
            let reference = if params.audio_only {
                let clip = self.registry.audios.decoder().decode(&filepath).await?;
                self.registry.audios.store(clip).await
            } else {
                let clip = self.registry.videos.decoder().decode(&filepath).await?;
                self.registry.videos.store(clip).await
            };
            result.output_object = Some(reference);
        }

        info!(title = %result.title, filepath = %result.filepath, "Downloaded media");
        Ok(result)
    }

    /// Suggest download directories.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_download_paths(&self) -> Result<DownloadPaths, Error> {
        let cwd = std::env::current_dir()?;
        Ok(download_paths(&cwd))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn params(audio_only: bool) -> DownloadVideoParams {
        serde_json::from_value(serde_json::json!({
            "url": "https://example.com/watch?v=abc",
            "audio_only": audio_only
        }))
        .unwrap()
    }

    fn unused() -> Result<PathBuf, Error> {
        panic!("downloads directory should not be consulted")
    }

    #[test]
    fn test_params_defaults() {
        let p = params(false);
        assert!(p.save_path.is_none());
        assert_eq!(p.audio_format, "mp3");
        assert_eq!(p.audio_quality, "192");
        assert!(p.return_path);
    }

    #[test]
    fn test_template_for_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let template = output_template(Some(&dir.path().display().to_string()), unused).unwrap();
        assert_eq!(template, dir.path().join(DEFAULT_TEMPLATE).display().to_string());
    }

    #[test]
    fn test_template_for_file_path_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested/clip.mp4");
        let template = output_template(Some(&file.display().to_string()), unused).unwrap();
        assert_eq!(template, file.display().to_string());
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn test_template_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("new/%(id)s.%(ext)s").display().to_string();
        assert_eq!(output_template(Some(&raw), unused).unwrap(), raw);
        assert!(!dir.path().join("new").exists());
    }

    #[test]
    fn test_template_defaults_to_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("Downloads");
        let template = output_template(None, || Ok(downloads.clone())).unwrap();
        assert_eq!(template, downloads.join(DEFAULT_TEMPLATE).display().to_string());
        assert!(downloads.is_dir());
    }

    #[test]
    fn test_ytdlp_args() {
        let video = ytdlp_args(&params(false), "/d/%(id)s.%(ext)s");
        assert!(video.contains(&"after_move:%()j".to_string()));
        assert!(!video.contains(&"-x".to_string()));
        assert_eq!(video.last().unwrap(), "https://example.com/watch?v=abc");
        assert_eq!(video[video.len() - 2], "--");

        let audio = ytdlp_args(&params(true), "/d/t");
        let idx = audio.iter().position(|a| a == "--audio-format").unwrap();
        assert_eq!(audio[idx + 1], "mp3");
        assert!(audio.contains(&"bestaudio/best".to_string()));
    }

    #[test]
    fn test_ytdlp_args_keep_url_out_of_options() {
        let mut p = params(true);
        p.url = "--exec=touch /tmp/x".to_string();

        let args = ytdlp_args(&p, "/d/t");
        let separator = args.iter().position(|a| a == "--").unwrap();
        assert_eq!(separator, args.len() - 2);
        assert_eq!(args[separator + 1], "--exec=touch /tmp/x");
        assert!(!args[..separator].iter().any(|a| a.starts_with("--exec")));
    }

    #[test]
    fn test_parse_info_takes_last_json_line() {
        let stdout = "[info] something\n{\"title\": \"Clip\", \"id\": \"abc\", \"duration\": 12.5, \
                      \"uploader\": \"someone\", \"filepath\": \"/d/Clip [abc].mp4\"}\n";
        let info = parse_info(stdout).unwrap();
        assert_eq!(info.title.as_deref(), Some("Clip"));
        assert_eq!(info.duration, Some(12.5));
        assert_eq!(info.filepath.as_deref(), Some("/d/Clip [abc].mp4"));

        let err = parse_info("no json here").unwrap_err();
        assert_eq!(err.kind(), "DownloadError");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_download_prepares_save_path_before_running_ytdlp() {
        use video_edit_mcp_common::config::Config;

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::with_root(dir.path());
        config.ytdlp_path = "/nonexistent/yt-dlp".to_string();
        let handler = VideoEditHandler::new(config);

        let target = dir.path().join("saved/clip.mp4");
        let mut p = params(false);
        p.save_path = Some(target.display().to_string());

        let err = handler.download_video(p).await.unwrap_err();
        assert_eq!(err.kind(), "DownloadError");
        assert!(err.to_string().contains("/nonexistent/yt-dlp"));
        assert!(dir.path().join("saved").is_dir());
    }

    #[test]
    fn test_project_root_detection() {
        assert!(project_root(Path::new("/home/u/src/video-edit-mcp")).is_some());
        assert!(project_root(Path::new("/home/u/elsewhere")).is_none());
    }

    #[test]
    fn test_download_paths_reports_cwd() {
        let paths = download_paths(Path::new("/work/here"));
        assert_eq!(paths.current_working_directory, "/work/here");
        assert_eq!(paths.suggested_paths.current_directory, "/work/here");
        assert!(paths.suggested_paths.project_root.is_none());
    }

    #[tokio::test]
    async fn test_missing_ytdlp_is_download_error() {
        use video_edit_mcp_common::config::Config;

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::with_root(dir.path());
        config.ytdlp_path = "/nonexistent/yt-dlp".to_string();
        let handler = VideoEditHandler::new(config);

        let mut p = params(false);
        p.save_path = Some(dir.path().display().to_string());
        let err = handler.download_video(p).await.unwrap_err();
        assert_eq!(err.kind(), "DownloadError");
    }
}
