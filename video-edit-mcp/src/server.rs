//! MCP Server implementation for the video edit server.
//!
//! This module exposes the editing handlers as MCP tools. Every tool answers
//! with a single JSON text content carrying a `success` flag, so chained calls
//! can read references and paths straight out of the previous answer.

use crate::handler::audio::{
    AdjustVolumeParams, AudioInfoParams, ConcatenateAudioParams, ExtractAudioParams, FadeAudioParams,
    LoopAudioParams, MixAudioParams, TrimAudioParams,
};
use crate::handler::download::{DownloadPathsParams, DownloadVideoParams};
use crate::handler::image::{ImageInfoParams, ImageToVideoParams, ImagesToVideoParams, ResizeImageParams};
use crate::handler::util::{CheckMemoryParams, ClearMemoryParams, DirectoryParams};
use crate::handler::video::{
    AddAudioParams, ConvertVideoParams, CropVideoParams, ExtractFramesParams, FadeVideoParams,
    ImageOverlayParams, MergeVideosParams, ResizeVideoParams, RotateVideoParams, SpeedVideoParams,
    SplitVideoParams, TextOverlayParams, TrimVideoParams, VideoEffectParams, VideoInfoParams,
    VideoOverlayParams,
};
use crate::handler::{Produced, VideoEditHandler};
use rmcp::{
    model::{
        CallToolResult, Content, ListResourcesResult, ReadResourceResult, ServerCapabilities, ServerInfo,
    },
    ErrorData as McpError, ServerHandler,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, warn};
use video_edit_mcp_common::config::Config;
use video_edit_mcp_common::error::Error;

/// MCP Server for video, audio and image editing.
#[derive(Clone)]
pub struct VideoEditServer {
    handler: Arc<VideoEditHandler>,
}

impl VideoEditServer {
    /// Create a new server with empty media stores.
    pub fn new(config: Config) -> Self {
        Self {
            handler: Arc::new(VideoEditHandler::new(config)),
        }
    }

    /// The handler backing every tool.
    pub fn handler(&self) -> &VideoEditHandler {
        &self.handler
    }

    /// Release every stored handle. Called once the transport has stopped.
    pub async fn shutdown(&self) {
        self.handler.shutdown().await;
    }

    /// Run one tool by name.
    ///
    /// Tool failures come back as error envelopes; only unknown names and
    /// malformed arguments are MCP errors.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult, McpError> {
        debug!(tool = name, "Calling tool");
        let h = &self.handler;
        match name {
            // Video
            "get_video_info" => {
                let p: VideoInfoParams = parse_params(arguments)?;
                let result = h.get_video_info(p).await.map(|info| json!({ "video_info": info }));
                respond(result, "Video info retrieved successfully", "Error getting video info")
            }
            "trim_video" => {
                let p: TrimVideoParams = parse_params(arguments)?;
                respond(h.trim_video(p).await, "Video trimmed successfully", "Error trimming video")
            }
            "resize_video" => {
                let p: ResizeVideoParams = parse_params(arguments)?;
                respond(h.resize_video(p).await, "Video resized successfully", "Error resizing video")
            }
            "crop_video" => {
                let p: CropVideoParams = parse_params(arguments)?;
                respond(h.crop_video(p).await, "Video cropped successfully", "Error cropping video")
            }
            "rotate_video" => {
                let p: RotateVideoParams = parse_params(arguments)?;
                respond(h.rotate_video(p).await, "Video rotated successfully", "Error rotating video")
            }
            "speed_up_video" => {
                let p: SpeedVideoParams = parse_params(arguments)?;
                respond(
                    h.speed_up_video(p).await,
                    "Video speed changed successfully",
                    "Error changing video speed",
                )
            }
            "add_audio" => {
                let p: AddAudioParams = parse_params(arguments)?;
                respond(h.add_audio(p).await, "Audio added successfully", "Error adding audio to video")
            }
            "fadein_video" => {
                let p: FadeVideoParams = parse_params(arguments)?;
                respond(
                    h.fadein_video(p).await,
                    "Fade in effect added successfully",
                    "Error adding fade in effect",
                )
            }
            "fadeout_video" => {
                let p: FadeVideoParams = parse_params(arguments)?;
                respond(
                    h.fadeout_video(p).await,
                    "Fade out effect added successfully",
                    "Error adding fade out effect",
                )
            }
            "add_text_overlay" => {
                let p: TextOverlayParams = parse_params(arguments)?;
                respond(
                    h.add_text_overlay(p).await,
                    "Text overlay added successfully",
                    "Error adding text overlay",
                )
            }
            "add_image_overlay" => {
                let p: ImageOverlayParams = parse_params(arguments)?;
                respond(
                    h.add_image_overlay(p).await,
                    "Image overlay added successfully",
                    "Error adding image overlay",
                )
            }
            "grayscale_video" => {
                let p: VideoEffectParams = parse_params(arguments)?;
                respond(
                    h.grayscale_video(p).await,
                    "Video converted to grayscale successfully",
                    "Error converting video to grayscale",
                )
            }
            "mirror_video" => {
                let p: VideoEffectParams = parse_params(arguments)?;
                respond(h.mirror_video(p).await, "Video mirrored successfully", "Error mirroring video")
            }
            "extract_frames" => {
                let p: ExtractFramesParams = parse_params(arguments)?;
                let result = h.extract_frames(p).await;
                let message = match &result {
                    Ok(Produced::OutputObject(_)) => "Frames extracted to memory",
                    _ => "Frames extracted successfully",
                };
                respond(result, message, "Error extracting frames from video")
            }
            "split_video_at_times" => {
                let p: SplitVideoParams = parse_params(arguments)?;
                respond(
                    h.split_video_at_times(p).await,
                    "Video split successfully",
                    "Error splitting video at times",
                )
            }
            "convert_video_format" => {
                let p: ConvertVideoParams = parse_params(arguments)?;
                respond(
                    h.convert_video_format(p).await,
                    "Video format converted successfully",
                    "Error converting video format",
                )
            }
            "add_video_overlay" => {
                let p: VideoOverlayParams = parse_params(arguments)?;
                respond(
                    h.add_video_overlay(p).await,
                    "Video overlay added successfully",
                    "Error adding video overlay",
                )
            }
            "merge_videos" => {
                let p: MergeVideosParams = parse_params(arguments)?;
                respond(h.merge_videos(p).await, "Videos merged successfully", "Error merging videos")
            }

            // Audio
            "audio_info" => {
                let p: AudioInfoParams = parse_params(arguments)?;
                let result = h.audio_info(p).await.map(|info| json!({ "audio_info": info }));
                respond(result, "Audio info retrieved successfully", "Error getting audio info")
            }
            "extract_audio" => {
                let p: ExtractAudioParams = parse_params(arguments)?;
                respond(h.extract_audio(p).await, "Audio extracted successfully", "Error extracting audio")
            }
            "trim_audio" => {
                let p: TrimAudioParams = parse_params(arguments)?;
                respond(h.trim_audio(p).await, "Audio trimmed successfully", "Error trimming audio")
            }
            "concatenate_audio" => {
                let p: ConcatenateAudioParams = parse_params(arguments)?;
                respond(
                    h.concatenate_audio(p).await,
                    "Audio concatenated successfully",
                    "Error concatenating audio files",
                )
            }
            "loop_audio" => {
                let p: LoopAudioParams = parse_params(arguments)?;
                respond(h.loop_audio(p).await, "Audio looped successfully", "Error looping audio")
            }
            "adjust_vol" => {
                let p: AdjustVolumeParams = parse_params(arguments)?;
                respond(
                    h.adjust_vol(p).await,
                    "Audio volume adjusted successfully",
                    "Error adjusting audio volume",
                )
            }
            "fadein_audio" => {
                let p: FadeAudioParams = parse_params(arguments)?;
                respond(
                    h.fadein_audio(p).await,
                    "Audio fade in effect added successfully",
                    "Error adding audio fade in effect",
                )
            }
            "fadeout_audio" => {
                let p: FadeAudioParams = parse_params(arguments)?;
                respond(
                    h.fadeout_audio(p).await,
                    "Audio fade out effect added successfully",
                    "Error adding audio fade out effect",
                )
            }
            "mix_audio_tracks" => {
                let p: MixAudioParams = parse_params(arguments)?;
                respond(
                    h.mix_audio_tracks(p).await,
                    "Audio tracks mixed successfully",
                    "Error mixing audio tracks",
                )
            }

            // Image
            "get_image_info" => {
                let p: ImageInfoParams = parse_params(arguments)?;
                let result = h.get_image_info(p).await.map(|info| json!({ "image_info": info }));
                respond(result, "Image info retrieved successfully", "Error getting image info")
            }
            "resize_image" => {
                let p: ResizeImageParams = parse_params(arguments)?;
                respond(h.resize_image(p).await, "Image resized successfully", "Error resizing image")
            }
            "image_to_video" => {
                let p: ImageToVideoParams = parse_params(arguments)?;
                respond(
                    h.image_to_video(p).await,
                    "Image converted to video successfully",
                    "Error converting image to video",
                )
            }
            "images_to_video" => {
                let p: ImagesToVideoParams = parse_params(arguments)?;
                respond(
                    h.images_to_video(p).await,
                    "Video created from images successfully",
                    "Error creating video from images",
                )
            }

            // Download
            "download_video" => {
                let p: DownloadVideoParams = parse_params(arguments)?;
                respond(h.download_video(p).await, "Download completed successfully", "Download failed")
            }
            "get_download_paths" => respond(
                h.get_download_paths().await,
                "Download paths retrieved successfully",
                "Error getting download paths",
            ),

            // Utility
            "check_memory" => {
                let p: CheckMemoryParams = parse_params(arguments)?;
                respond(h.check_memory(p).await, "Memory status retrieved", "Error checking memory")
            }
            "clear_memory" => {
                let p: ClearMemoryParams = parse_params(arguments)?;
                let message = format!(
                    "Memory cleared - Videos: {}, Audios: {}",
                    p.clear_videos, p.clear_audios
                );
                respond(h.clear_memory(p).await, &message, "Error clearing memory")
            }
            "list_files" => {
                let p: DirectoryParams = parse_params(arguments)?;
                respond(h.list_files(p).await, "Files listed successfully", "Error listing files")
            }
            "make_directory" => {
                let p: DirectoryParams = parse_params(arguments)?;
                respond(
                    h.make_directory(p).await,
                    "Directory created successfully",
                    "Error creating directory",
                )
            }

            _ => Err(McpError::invalid_params(format!("Unknown tool: {}", name), None)),
        }
    }
}

impl ServerHandler for VideoEditServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Video, audio and image editing server using FFmpeg. \
                 Tools accept file paths or stored references; pass return_path=false \
                 to keep a result in memory and chain it into the next tool."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _params: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<rmcp::model::ListToolsResult, McpError>> + Send + '_ {
        async move {
            Ok(rmcp::model::ListToolsResult {
                tools: tools(),
                next_cursor: None,
                meta: None,
            })
        }
    }

    fn call_tool(
        &self,
        params: rmcp::model::CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move { self.dispatch(params.name.as_ref(), params.arguments).await }
    }

    fn list_resources(
        &self,
        _params: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        async move {
            Ok(ListResourcesResult {
                resources: vec![],
                next_cursor: None,
                meta: None,
            })
        }
    }

    fn read_resource(
        &self,
        params: rmcp::model::ReadResourceRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        async move {
            Err(McpError::resource_not_found(
                format!("Unknown resource: {}", params.uri),
                None,
            ))
        }
    }
}

// =============================================================================
// Tool Catalogue
// =============================================================================

/// Every tool the server advertises.
pub fn tools() -> Vec<rmcp::model::Tool> {
    vec![
        // Video
        create_tool::<VideoInfoParams>(
            "get_video_info",
            "Get video details: duration, fps, size, frame count, bitrate, codecs, audio track and file size.",
        ),
        create_tool::<TrimVideoParams>(
            "trim_video",
            "Cut the range [start_time, end_time) out of a video.",
        ),
        create_tool::<ResizeVideoParams>(
            "resize_video",
            "Resize a video to exactly [width, height], keeping the aspect ratio with black bars.",
        ),
        create_tool::<CropVideoParams>(
            "crop_video",
            "Crop a video to the rectangle (x1, y1)-(x2, y2).",
        ),
        create_tool::<RotateVideoParams>(
            "rotate_video",
            "Rotate a video counter-clockwise by an angle in degrees.",
        ),
        create_tool::<SpeedVideoParams>(
            "speed_up_video",
            "Change playback speed of a video and its audio.",
        ),
        create_tool::<AddAudioParams>(
            "add_audio",
            "Replace the soundtrack of a video with an audio file or stored audio.",
        ),
        create_tool::<FadeVideoParams>("fadein_video", "Fade a video in from black."),
        create_tool::<FadeVideoParams>("fadeout_video", "Fade a video out to black."),
        create_tool::<TextOverlayParams>(
            "add_text_overlay",
            "Draw text on a video at (x, y) for a duration.",
        ),
        create_tool::<ImageOverlayParams>(
            "add_image_overlay",
            "Place an image on a video at (x, y) for a duration.",
        ),
        create_tool::<VideoEffectParams>("grayscale_video", "Convert a video to grayscale."),
        create_tool::<VideoEffectParams>("mirror_video", "Mirror a video horizontally."),
        create_tool::<ExtractFramesParams>(
            "extract_frames",
            "Extract PNG frames from a time range, or store the resampled range as a video.",
        ),
        create_tool::<SplitVideoParams>(
            "split_video_at_times",
            "Split a video into parts at the given times.",
        ),
        create_tool::<ConvertVideoParams>(
            "convert_video_format",
            "Re-encode a video with a codec, frame rate and bitrate.",
        ),
        create_tool::<VideoOverlayParams>(
            "add_video_overlay",
            "Overlay one video on another at (x, y) with opacity.",
        ),
        create_tool::<MergeVideosParams>(
            "merge_videos",
            "Merge videos with random transitions and optional background music from a folder.",
        ),
        // Audio
        create_tool::<AudioInfoParams>(
            "audio_info",
            "Get audio details: duration, sample rate, channels and codec.",
        ),
        create_tool::<ExtractAudioParams>("extract_audio", "Extract the audio track of a video."),
        create_tool::<TrimAudioParams>("trim_audio", "Cut a time range out of an audio clip."),
        create_tool::<ConcatenateAudioParams>(
            "concatenate_audio",
            "Join two audio clips one after the other.",
        ),
        create_tool::<LoopAudioParams>("loop_audio", "Loop an audio clip to a target duration."),
        create_tool::<AdjustVolumeParams>("adjust_vol", "Scale the volume of an audio clip."),
        create_tool::<FadeAudioParams>("fadein_audio", "Fade an audio clip in from silence."),
        create_tool::<FadeAudioParams>("fadeout_audio", "Fade an audio clip out to silence."),
        create_tool::<MixAudioParams>(
            "mix_audio_tracks",
            "Mix several audio clips together at 44.1 kHz.",
        ),
        // Image
        create_tool::<ImageInfoParams>(
            "get_image_info",
            "Get image details: format, color mode, size, animation, EXIF/ICC and compression.",
        ),
        create_tool::<ResizeImageParams>(
            "resize_image",
            "Resize an image to exactly [width, height] with black bars.",
        ),
        create_tool::<ImageToVideoParams>(
            "image_to_video",
            "Turn a still image into a video with optional zoom, pan, rotation, effect and color adjustment.",
        ),
        create_tool::<ImagesToVideoParams>(
            "images_to_video",
            "Turn the sorted images of a folder into a video, one frame per image.",
        ),
        // Download
        create_tool::<DownloadVideoParams>(
            "download_video",
            "Download a video (or only its audio) from a URL with yt-dlp.",
        ),
        create_tool::<DownloadPathsParams>(
            "get_download_paths",
            "Suggest locations for download_video's save_path.",
        ),
        // Utility
        create_tool::<CheckMemoryParams>(
            "check_memory",
            "List stored video and audio references.",
        ),
        create_tool::<ClearMemoryParams>("clear_memory", "Drop stored videos and/or audio clips."),
        create_tool::<DirectoryParams>("list_files", "List the entries of a directory."),
        create_tool::<DirectoryParams>("make_directory", "Create a directory and its parents."),
    ]
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Create a tool definition from a parameter type.
fn create_tool<T: JsonSchema>(name: &'static str, description: &'static str) -> rmcp::model::Tool {
    use schemars::schema_for;

    let schema = schema_for!(T);
    let schema_value = serde_json::to_value(&schema).unwrap_or_default();

    let input_schema = match schema_value {
        Value::Object(map) => Arc::new(map),
        _ => Arc::new(Map::new()),
    };

    rmcp::model::Tool {
        name: Cow::Borrowed(name),
        description: Some(Cow::Borrowed(description)),
        input_schema,
        annotations: None,
        icons: None,
        meta: None,
        output_schema: None,
        title: None,
    }
}

/// Parse tool parameters from JSON arguments.
///
/// Missing arguments parse as an empty object so tools whose parameters all
/// have defaults can be called bare.
fn parse_params<T: for<'de> Deserialize<'de>>(
    arguments: Option<Map<String, Value>>,
) -> Result<T, McpError> {
    serde_json::from_value(Value::Object(arguments.unwrap_or_default()))
        .map_err(|e| McpError::invalid_params(format!("Invalid parameters: {}", e), None))
}

/// Turn a handler result into a tool answer.
fn respond<T: Serialize>(
    result: Result<T, Error>,
    success: &str,
    failure: &str,
) -> Result<CallToolResult, McpError> {
    match result {
        Ok(value) => {
            let envelope = success_envelope(&value, success).map_err(|e| {
                McpError::internal_error(format!("Failed to serialize result: {}", e), None)
            })?;
            Ok(CallToolResult::success(vec![Content::text(envelope.to_string())]))
        }
        Err(error) => {
            warn!(error = %error, kind = error.kind(), "{}", failure);
            let envelope = failure_envelope(&error, failure);
            Ok(CallToolResult::error(vec![Content::text(envelope.to_string())]))
        }
    }
}

/// `{"success": true, ...fields, "message": ...}`.
fn success_envelope<T: Serialize>(value: &T, message: &str) -> Result<Value, serde_json::Error> {
    let mut map = match serde_json::to_value(value)? {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    };
    map.insert("success".to_string(), Value::Bool(true));
    map.insert("message".to_string(), Value::String(message.to_string()));
    Ok(Value::Object(map))
}

/// `{"success": false, "error": ..., "error_type": ..., "message": ...}`.
fn failure_envelope(error: &Error, message: &str) -> Value {
    json!({
        "success": false,
        "error": error.to_string(),
        "error_type": error.kind(),
        "message": message,
    })
}

// =============================================================================
// Tests
// =============================================================================
