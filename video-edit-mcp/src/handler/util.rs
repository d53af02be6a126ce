//! Store inspection and small filesystem helpers.

use super::VideoEditHandler;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, instrument};
use video_edit_mcp_common::error::Error;

// =============================================================================
// Types
// =============================================================================

/// Which store `check_memory` reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreSelection {
    Video,
    Audio,
    Both,
}

impl StoreSelection {
    /// "video" and "audio" pick one store; anything else means both.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "video" => Self::Video,
            "audio" => Self::Audio,
            _ => Self::Both,
        }
    }
}

/// Parameters for listing stored handles.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct CheckMemoryParams {
    /// "video", "audio" or "both".
    #[serde(default = "default_store_type")]
    pub store_type: String,
}

fn default_store_type() -> String {
    "both".to_string()
}

/// Parameters for dropping stored handles.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ClearMemoryParams {
    /// Drop every stored video.
    pub clear_videos: bool,
    /// Drop every stored audio clip.
    pub clear_audios: bool,
}

/// Parameters naming a directory.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct DirectoryParams {
    /// Directory path.
    pub directory_path: String,
}

/// A stored video as shown by `check_memory`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoSummary {
    pub path: String,
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub has_audio: bool,
}

/// A stored audio clip as shown by `check_memory`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioSummary {
    pub path: String,
    pub duration: f64,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

/// Store contents reported by `check_memory`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_memory: Option<BTreeMap<String, VideoSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_memory: Option<BTreeMap<String, AudioSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_objects: Option<usize>,
}

/// Handles dropped by `clear_memory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub videos_cleared: usize,
    pub audios_cleared: usize,
}

/// Entries found by `list_files`.
#[derive(Debug, Clone, Serialize)]
pub struct FileListing {
    pub files: Vec<String>,
}

/// Directory created by `make_directory`.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedDirectory {
    pub directory_path: String,
}

// =============================================================================
// Tool Implementations
// =============================================================================

impl VideoEditHandler {
    /// Report what the stores hold.
    #[instrument(level = "debug", skip(self))]
    pub async fn check_memory(&self, params: CheckMemoryParams) -> Result<MemoryReport, Error> {
        let selection = StoreSelection::parse(&params.store_type);
        let mut report = MemoryReport::default();

        if selection != StoreSelection::Audio {
            let videos: BTreeMap<_, _> = self
                .registry
                .videos
                .snapshot()
                .await
                .into_iter()
                .map(|(reference, clip)| {
                    let summary = VideoSummary {
                        path: clip.path.display().to_string(),
                        duration: clip.duration,
                        width: clip.width,
                        height: clip.height,
                        fps: clip.fps,
                        has_audio: clip.has_audio(),
                    };
                    (reference, summary)
                })
                .collect();
            report.video_count = Some(videos.len());
            report.video_memory = Some(videos);
        }

        if selection != StoreSelection::Video {
            let audios: BTreeMap<_, _> = self
                .registry
                .audios
                .snapshot()
                .await
                .into_iter()
                .map(|(reference, clip)| {
                    let summary = AudioSummary {
                        path: clip.path.display().to_string(),
                        duration: clip.duration,
                        sample_rate: clip.sample_rate,
                        channels: clip.channels,
                    };
                    (reference, summary)
                })
                .collect();
            report.audio_count = Some(audios.len());
            report.audio_memory = Some(audios);
        }

        if selection == StoreSelection::Both {
            report.total_objects = Some(report.video_count.unwrap_or(0) + report.audio_count.unwrap_or(0));
        }
        Ok(report)
    }

    /// Drop stored handles. Derived files are removed once nothing else holds them.
    #[instrument(level = "info", skip(self))]
    pub async fn clear_memory(&self, params: ClearMemoryParams) -> Result<ClearReport, Error> {
        let videos_cleared = if params.clear_videos {
            self.registry.videos.clear().await
        } else {
            0
        };
        let audios_cleared = if params.clear_audios {
            self.registry.audios.clear().await
        } else {
            0
        };

        info!(videos_cleared, audios_cleared, "Cleared memory");
        Ok(ClearReport {
            videos_cleared,
            audios_cleared,
        })
    }

    /// List the entry names of a directory, sorted.
    #[instrument(level = "debug", skip(self))]
    pub async fn list_files(&self, params: DirectoryParams) -> Result<FileListing, Error> {
        let dir = PathBuf::from(&params.directory_path);
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(Error::validation("Directory does not exist"));
        }

        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
        files.sort();
        Ok(FileListing { files })
    }

    /// Create a directory and any missing parents.
    #[instrument(level = "info", skip(self))]
    pub async fn make_directory(&self, params: DirectoryParams) -> Result<CreatedDirectory, Error> {
        if params.directory_path.trim().is_empty() {
            return Err(Error::validation("Directory path cannot be empty"));
        }
        tokio::fs::create_dir_all(&params.directory_path).await?;
        Ok(CreatedDirectory {
            directory_path: params.directory_path,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
