//! Video tools: inspection, single-clip transforms, overlays, splitting and
//! merging.

use super::{
    audio_codec, check_positive, check_time_range, encode_args, round2, secs, OutputTarget,
    Produced, VideoEditHandler, DEFAULT_VIDEO_EXT, EVEN_DIMENSIONS,
};
use crate::media::{ScratchFile, VideoClip};
use rand::seq::SliceRandom;
use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};
use video_edit_mcp_common::error::Error;

// =============================================================================
// Constants
// =============================================================================

/// Default overlap between merged clips, in seconds.
pub const DEFAULT_TRANSITION_DURATION: f64 = 1.0;

/// Fade applied to the end of merge background music, in seconds.
pub const MUSIC_FADE_OUT: f64 = 2.0;

/// Audio files eligible as merge background music.
pub const MUSIC_EXTENSIONS: &[&str] = &["mp3", "wav", "aac", "m4a", "ogg"];

/// xfade transitions a merged clip may enter with: a crossfade or a slide in
/// from the left, right, top or bottom.
pub const TRANSITIONS: &[&str] = &["fade", "slideright", "slideleft", "slidedown", "slideup"];

// =============================================================================
// Output Types
// =============================================================================

/// Description of a video, as reported by `get_video_info`.
#[derive(Debug, Clone, Serialize)]
pub struct VideoInfo {
    pub file_path: String,
    pub filename: String,
    pub duration: f64,
    pub fps: f64,
    pub size: [u32; 2],
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: Option<f64>,
    pub nframes: Option<u64>,
    pub bitrate: Option<u64>,
    pub codec: String,
    pub pix_fmt: Option<String>,
    pub has_audio: bool,
    pub audio_duration: Option<f64>,
    pub audio_fps: Option<u32>,
    pub audio_channels: Option<u32>,
    pub audio_codec: Option<String>,
    pub audio_bitrate: Option<u64>,
    pub file_size_bytes: Option<u64>,
    pub file_size_mb: Option<f64>,
    pub total_frames: Option<u64>,
    pub average_bitrate_kbps: Option<f64>,
    /// Whether the video is a derived clip held in the store.
    pub stored: bool,
}

/// Parts produced by `split_video_at_times`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitParts {
    OutputPaths(Vec<String>),
    OutputObjects(Vec<String>),
}

// =============================================================================
// Parameter Types
// =============================================================================

/// Parameters for describing a video.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct VideoInfoParams {
    /// Video file path or stored video reference.
    pub video_path: String,
}

/// Parameters for cutting a time range out of a video.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct TrimVideoParams {
    /// Video file path or stored video reference.
    pub video_path: String,
    /// Start of the kept range in seconds.
    pub start_time: f64,
    /// End of the kept range in seconds.
    pub end_time: f64,
    /// Output file name, e.g. "trimmed_video.mp4".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result and
    /// returns a reference for further steps.
    pub return_path: bool,
}

/// Parameters for letterboxing a video to an exact size.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ResizeVideoParams {
    /// Video file path or stored video reference.
    pub video_path: String,
    /// Target [width, height] in pixels.
    pub size: [u32; 2],
    /// Output file name, e.g. "resized_video.mp4".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result.
    pub return_path: bool,
}

/// Parameters for cropping a rectangle out of a video.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct CropVideoParams {
    /// Video file path or stored video reference.
    pub video_path: String,
    /// Left edge.
    pub x1: i64,
    /// Top edge.
    pub y1: i64,
    /// Right edge (exclusive).
    pub x2: i64,
    /// Bottom edge (exclusive).
    pub y2: i64,
    /// Output file name, e.g. "cropped_video.mp4".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result.
    pub return_path: bool,
}

/// Parameters for rotating a video.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RotateVideoParams {
    /// Video file path or stored video reference.
    pub video_path: String,
    /// Counter-clockwise rotation in degrees.
    pub angle: f64,
    /// Output file name, e.g. "rotated_video.mp4".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result.
    pub return_path: bool,
}

/// Parameters for changing playback speed.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SpeedVideoParams {
    /// Video file path or stored video reference.
    pub video_path: String,
    /// Speed multiplier, e.g. 2.0 for double speed.
    pub speed: f64,
    /// Output file name, e.g. "speed_up_video.mp4".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result.
    pub return_path: bool,
}

/// Parameters for replacing a video's soundtrack.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct AddAudioParams {
    /// Video file path or stored video reference.
    pub video_path: String,
    /// Audio file path or stored audio reference.
    pub audio_path: String,
    /// Output file name, e.g. "added_audio.mp4".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result.
    pub return_path: bool,
}

/// Parameters for fading a video in or out.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct FadeVideoParams {
    /// Video file path or stored video reference.
    pub video_path: String,
    /// Fade length in seconds.
    pub fade_duration: f64,
    /// Output file name, e.g. "fadein_video.mp4".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result.
    pub return_path: bool,
}

/// Parameters for drawing text over the start of a video.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct TextOverlayParams {
    /// Video file path or stored video reference.
    pub video_path: String,
    /// Text to draw.
    pub text: String,
    /// Left position in pixels.
    pub x: i64,
    /// Top position in pixels.
    pub y: i64,
    /// Font size in pixels.
    pub font_size: u32,
    /// Font color name or hex value, e.g. "white" or "#ff0000".
    pub color: String,
    /// Seconds the text stays visible from the start.
    pub duration: f64,
    /// Optional font file; the system default font is used otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_file: Option<String>,
    /// Output file name, e.g. "text_video.mp4".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result.
    pub return_path: bool,
}

/// Parameters for placing an image over the start of a video.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ImageOverlayParams {
    /// Video file path or stored video reference.
    pub video_path: String,
    /// Image file path.
    pub image_path: String,
    /// Left position in pixels.
    pub x: i64,
    /// Top position in pixels.
    pub y: i64,
    /// Seconds the image stays visible from the start.
    pub duration: f64,
    /// Output file name, e.g. "logo_video.mp4".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result.
    pub return_path: bool,
}

/// Parameters for single-filter effects (grayscale, mirror).
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct VideoEffectParams {
    /// Video file path or stored video reference.
    pub video_path: String,
    /// Output file name, e.g. "grayscale_video.mp4".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result.
    pub return_path: bool,
}

/// Parameters for extracting still frames.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ExtractFramesParams {
    /// Video file path or stored video reference.
    pub video_path: String,
    /// Start of the range in seconds.
    pub start_time: f64,
    /// End of the range in seconds.
    pub end_time: f64,
    /// Frames per second to extract.
    pub fps: f64,
    /// Folder the PNG frames are written into.
    pub output_folder_name: String,
    /// true writes frame_0000.png onwards into the folder; false stores the
    /// resampled range as a video reference.
    pub return_path: bool,
}

/// Parameters for splitting a video into consecutive parts.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SplitVideoParams {
    /// Video file path or stored video reference.
    pub video_path: String,
    /// Strictly increasing cut points in seconds.
    pub split_times: Vec<f64>,
    /// Base name; parts are written as <stem>_part_<n>.<ext> in a folder
    /// named <stem>.
    pub output_name: String,
    /// true writes the parts and returns their paths; false stores them.
    pub return_path: bool,
}

/// Parameters for re-encoding a video.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ConvertVideoParams {
    /// Video file path or stored video reference.
    pub video_path: String,
    /// Output file name; its extension picks the container.
    pub output_name: String,
    /// Video encoder, e.g. "libx264", "libvpx-vp9", "mpeg4".
    pub codec: String,
    /// Output frame rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    /// Video bitrate, e.g. "2M" or "800k".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<String>,
    /// true writes the file and returns its path; false stores the result.
    pub return_path: bool,
}

/// Parameters for overlaying one video on another.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct VideoOverlayParams {
    /// Base video file path or stored video reference.
    pub base_video_path: String,
    /// Overlay video file path or stored video reference.
    pub overlay_video_path: String,
    /// Left position of the overlay in pixels.
    pub x: i64,
    /// Top position of the overlay in pixels.
    pub y: i64,
    /// Overlay opacity between 0 and 1.
    pub opacity: f64,
    /// Seconds of the overlay to show.
    pub duration: f64,
    /// Output file name, e.g. "overlay_video.mp4".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result.
    pub return_path: bool,
}

/// Parameters for merging videos with transitions.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct MergeVideosParams {
    /// Video file paths or stored video references, in playback order.
    pub video_paths: Vec<String>,
    /// Folder to pick random background music from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audios_folder: Option<String>,
    /// Output file name or path, e.g. "merged_video.mp4".
    pub output_path: String,
    /// Overlap between consecutive clips in seconds.
    #[serde(default = "default_transition_duration")]
    pub transition_duration: f64,
    /// true writes the file and returns its path; false stores the result.
    #[serde(default = "default_true")]
    pub return_path: bool,
}

fn default_transition_duration() -> f64 {
    DEFAULT_TRANSITION_DURATION
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Filter Construction
// =============================================================================

/// Largest size with the source's aspect ratio that fits in `target`,
/// rounded down to even dimensions.
pub fn fit_within(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (sw, sh) = (source.0.max(1) as f64, source.1.max(1) as f64);
    let (tw, th) = (target.0 as f64, target.1 as f64);

    let (w, h) = if sw / sh > tw / th {
        (tw, (sh * tw / sw).floor())
    } else {
        ((sw * th / sh).floor(), th)
    };

    let even = |v: f64| ((v as u32) & !1).max(2);
    (even(w), even(h))
}

/// Filter rotating a video counter-clockwise by `angle` degrees, or `None`
/// for a whole number of turns.
pub fn rotation_filter(angle: f64) -> Option<String> {
    let normalized = angle.rem_euclid(360.0);
    let near = |target: f64| (normalized - target).abs() < 1e-9;

    if near(0.0) || near(360.0) {
        None
    } else if near(90.0) {
        Some("transpose=2".to_string())
    } else if near(180.0) {
        Some("hflip,vflip".to_string())
    } else if near(270.0) {
        Some("transpose=1".to_string())
    } else {
        // ffmpeg rotates clockwise for positive angles.
        let radians = format!("{:.6}", -normalized.to_radians());
        Some(format!(
            "rotate={r}:ow=rotw({r}):oh=roth({r}):c=black,{}",
            EVEN_DIMENSIONS,
            r = radians
        ))
    }
}

/// atempo filters reaching `speed`; each stage must lie in `[0.5, 2]`.
pub fn atempo_chain(speed: f64) -> Vec<String> {
    let mut chain = Vec::new();
    let mut remaining = speed;
    while remaining > 2.0 {
        chain.push("atempo=2".to_string());
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        chain.push("atempo=0.5".to_string());
        remaining /= 0.5;
    }
    if (remaining - 1.0).abs() > 1e-9 {
        chain.push(format!("atempo={}", remaining));
    }
    chain
}

/// Escape a value for a filter option inside a filtergraph.
pub fn escape_filter_value(value: &str) -> String {
    let mut option = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            option.push('\\');
        }
        option.push(c);
    }

    let mut graph = String::with_capacity(option.len());
    for c in option.chars() {
        if matches!(c, '\\' | '\'' | ',' | ';' | '[' | ']') {
            graph.push('\\');
        }
        graph.push(c);
    }
    graph
}

/// Segment bounds for splitting a clip of `duration` at `times`.
pub fn split_bounds(times: &[f64], duration: f64) -> Result<Vec<(f64, f64)>, Error> {
    let mut bounds = Vec::with_capacity(times.len() + 1);
    let mut start = 0.0;
    for &time in times {
        if !(time > 0.0 && time < duration) {
            return Err(Error::validation(format!(
                "Split time {} must lie inside (0, {:.3})",
                time, duration
            )));
        }
        if time <= start {
            return Err(Error::validation("Split times must be strictly increasing"));
        }
        bounds.push((start, time));
        start = time;
    }
    bounds.push((start, duration));
    Ok(bounds)
}

/// Where each merged clip after the first starts its transition.
pub fn xfade_offsets(durations: &[f64], transition: f64) -> Vec<f64> {
    let mut elapsed = 0.0;
    durations
        .iter()
        .take(durations.len().saturating_sub(1))
        .enumerate()
        .map(|(index, duration)| {
            elapsed += duration;
            elapsed - (index + 1) as f64 * transition
        })
        .collect()
}

/// Length of a merge of `durations` with overlapping transitions.
pub fn merged_duration(durations: &[f64], transition: f64) -> f64 {
    let overlaps = durations.len().saturating_sub(1) as f64;
    durations.iter().sum::<f64>() - overlaps * transition
}

/// Pick one random transition per clip boundary.
pub fn pick_transitions<R: Rng>(boundaries: usize, rng: &mut R) -> Vec<&'static str> {
    (0..boundaries)
        .map(|_| TRANSITIONS.choose(rng).copied().unwrap_or("fade"))
        .collect()
}

/// Soundtrack source for a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAudio {
    /// Background music at this input index, looped on the input side.
    Music(usize),
    /// Cross-fade the clips' own soundtracks.
    Crossfade,
    Silent,
}

/// Geometry and timing of a merge.
#[derive(Debug, Clone)]
pub struct MergeLayout<'a> {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub durations: &'a [f64],
    pub transition: f64,
    pub transitions: &'a [&'static str],
    pub audio: MergeAudio,
}

/// Filtergraph for a merge, ending in `[vout]` and, unless silent, `[aout]`.
pub fn merge_graph(layout: &MergeLayout<'_>) -> String {
    let n = layout.durations.len();
    let d = secs(layout.transition);
    let total = merged_duration(layout.durations, layout.transition);
    let mut filters = Vec::new();

    for i in 0..n {
        let fade_in = if i == 0 {
            format!(",fade=t=in:st=0:d={}", d)
        } else {
            String::new()
        };
        filters.push(format!(
            "[{i}:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1,\
             fps={fps},settb=AVTB,format=yuv420p{fade_in}[v{i}]",
            i = i,
            w = layout.width,
            h = layout.height,
            fps = layout.fps,
            fade_in = fade_in,
        ));
    }

    let mut last = "v0".to_string();
    for (k, offset) in xfade_offsets(layout.durations, layout.transition)
        .into_iter()
        .enumerate()
    {
        let next = format!("x{}", k + 1);
        let transition = layout.transitions.get(k).copied().unwrap_or("fade");
        filters.push(format!(
            "[{}][v{}]xfade=transition={}:duration={}:offset={}[{}]",
            last,
            k + 1,
            transition,
            d,
            secs(offset),
            next
        ));
        last = next;
    }

    if n > 1 {
        filters.push(format!(
            "[{}]fade=t=out:st={}:d={}[vout]",
            last,
            secs((total - layout.transition).max(0.0)),
            d
        ));
    } else {
        filters.push(format!("[{}]null[vout]", last));
    }

    match layout.audio {
        MergeAudio::Music(index) => filters.push(format!(
            "[{}:a]atrim=0:{},asetpts=PTS-STARTPTS,afade=t=out:st={}:d={}[aout]",
            index,
            secs(total),
            secs((total - MUSIC_FADE_OUT).max(0.0)),
            secs(MUSIC_FADE_OUT)
        )),
        MergeAudio::Crossfade => {
            for i in 0..n {
                filters.push(format!(
                    "[{}:a]aresample=44100,aformat=channel_layouts=stereo[a{}]",
                    i, i
                ));
            }
            let mut last = "a0".to_string();
            for k in 1..n {
                let next = format!("ax{}", k);
                filters.push(format!("[{}][a{}]acrossfade=d={}[{}]", last, k, d, next));
                last = next;
            }
            filters.push(format!("[{}]anull[aout]", last));
        }
        MergeAudio::Silent => {}
    }

    filters.join(";")
}

// =============================================================================
// Tool Implementations
// =============================================================================

impl VideoEditHandler {
    /// Run ffmpeg with `args` plus container encoders into `target`, then
    /// deliver the result.
    async fn render_video(&self, mut args: Vec<String>, target: OutputTarget) -> Result<Produced, Error> {
        args.extend(encode_args(&target.extension()));
        args.push(target.arg());
        self.ffmpeg().run_owned(&args).await?;
        self.deliver_video(target).await
    }

    /// Apply a single `-vf` chain to a clip.
    async fn filter_video(
        &self,
        clip: &VideoClip,
        filter: Option<String>,
        output_name: &str,
        return_path: bool,
    ) -> Result<Produced, Error> {
        let target = self.output_target(output_name, return_path, DEFAULT_VIDEO_EXT).await?;
        let mut args = vec!["-i".to_string(), clip.input_arg()];
        if let Some(filter) = filter {
            args.extend(["-vf".to_string(), filter]);
        }
        self.render_video(args, target).await
    }

    /// Describe a video.
    #[instrument(level = "info", skip(self))]
    pub async fn get_video_info(&self, params: VideoInfoParams) -> Result<VideoInfo, Error> {
        let clip = self.registry.videos.load(&params.video_path).await?;

        let file_size = tokio::fs::metadata(&clip.path).await.ok().map(|m| m.len());
        let estimated_frames = (clip.fps > 0.0).then(|| (clip.fps * clip.duration) as u64);
        let audio = clip.audio.as_ref();

        info!(duration = clip.duration, width = clip.width, height = clip.height, "Got video info");

        Ok(VideoInfo {
            file_path: params.video_path.clone(),
            filename: Path::new(&params.video_path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| params.video_path.clone()),
            duration: clip.duration,
            fps: clip.fps,
            size: [clip.width, clip.height],
            width: clip.width,
            height: clip.height,
            aspect_ratio: (clip.height > 0).then(|| round2(clip.width as f64 / clip.height as f64)),
            nframes: clip.frame_count,
            bitrate: clip.bit_rate,
            codec: clip.codec.clone(),
            pix_fmt: clip.pix_fmt.clone(),
            has_audio: clip.has_audio(),
            audio_duration: audio.map(|a| a.duration.unwrap_or(clip.duration)),
            audio_fps: audio.and_then(|a| a.sample_rate),
            audio_channels: audio.and_then(|a| a.channels),
            audio_codec: audio.map(|a| a.codec.clone()),
            audio_bitrate: audio.and_then(|a| a.bit_rate),
            file_size_bytes: file_size,
            file_size_mb: file_size.map(|b| round2(b as f64 / (1024.0 * 1024.0))),
            total_frames: estimated_frames,
            average_bitrate_kbps: file_size
                .map(|b| round2(b as f64 * 8.0 / (clip.duration * 1000.0))),
            stored: clip.is_scratch(),
        })
    }

    /// Keep `[start_time, end_time)` of a video.
    #[instrument(level = "info", skip(self))]
    pub async fn trim_video(&self, params: TrimVideoParams) -> Result<Produced, Error> {
        let clip = self.registry.videos.load(&params.video_path).await?;
        check_time_range(params.start_time, params.end_time, clip.duration)?;

        let target = self
            .output_target(&params.output_name, params.return_path, DEFAULT_VIDEO_EXT)
            .await?;
        let args = vec![
            "-ss".to_string(),
            secs(params.start_time),
            "-i".to_string(),
            clip.input_arg(),
            "-t".to_string(),
            secs(params.end_time - params.start_time),
        ];
        let produced = self.render_video(args, target).await?;

        info!(output = %produced.value(), "Trimmed video");
        Ok(produced)
    }

    /// Letterbox a video to exactly the requested size.
    #[instrument(level = "info", skip(self))]
    pub async fn resize_video(&self, params: ResizeVideoParams) -> Result<Produced, Error> {
        let [width, height] = params.size;
        if width == 0 || height == 0 {
            return Err(Error::validation(
                "Size must be a tuple of two positive integers (width, height)",
            ));
        }

        let clip = self.registry.videos.load(&params.video_path).await?;
        let (scaled_w, scaled_h) = fit_within((clip.width, clip.height), (width, height));
        let filter = format!(
            "scale={}:{},pad={}:{}:{}:{}:color=black,setsar=1",
            scaled_w,
            scaled_h,
            width,
            height,
            width.saturating_sub(scaled_w) / 2,
            height.saturating_sub(scaled_h) / 2
        );

        let produced = self
            .filter_video(&clip, Some(filter), &params.output_name, params.return_path)
            .await?;
        info!(output = %produced.value(), width, height, "Resized video");
        Ok(produced)
    }

    /// Crop a rectangle out of a video.
    #[instrument(level = "info", skip(self))]
    pub async fn crop_video(&self, params: CropVideoParams) -> Result<Produced, Error> {
        let CropVideoParams { x1, y1, x2, y2, .. } = params;
        if x1 < 0 || y1 < 0 || x2 <= x1 || y2 <= y1 {
            return Err(Error::validation(
                "Invalid crop coordinates. x2 > x1 and y2 > y1, all values must be non-negative",
            ));
        }

        let clip = self.registry.videos.load(&params.video_path).await?;
        if x2 > clip.width as i64 || y2 > clip.height as i64 {
            return Err(Error::validation(format!(
                "Crop rectangle exceeds the {}x{} frame",
                clip.width, clip.height
            )));
        }

        let filter = format!("crop={}:{}:{}:{},{}", x2 - x1, y2 - y1, x1, y1, EVEN_DIMENSIONS);
        let produced = self
            .filter_video(&clip, Some(filter), &params.output_name, params.return_path)
            .await?;
        info!(output = %produced.value(), "Cropped video");
        Ok(produced)
    }

    /// Rotate a video counter-clockwise.
    #[instrument(level = "info", skip(self))]
    pub async fn rotate_video(&self, params: RotateVideoParams) -> Result<Produced, Error> {
        if !params.angle.is_finite() {
            return Err(Error::validation("Angle must be a number"));
        }

        let clip = self.registry.videos.load(&params.video_path).await?;
        let produced = self
            .filter_video(
                &clip,
                rotation_filter(params.angle),
                &params.output_name,
                params.return_path,
            )
            .await?;
        info!(output = %produced.value(), angle = params.angle, "Rotated video");
        Ok(produced)
    }

    /// Change playback speed; audio tempo follows.
    #[instrument(level = "info", skip(self))]
    pub async fn speed_up_video(&self, params: SpeedVideoParams) -> Result<Produced, Error> {
        check_positive("Speed", params.speed)?;

        let clip = self.registry.videos.load(&params.video_path).await?;
        let target = self
            .output_target(&params.output_name, params.return_path, DEFAULT_VIDEO_EXT)
            .await?;

        let mut args = vec![
            "-i".to_string(),
            clip.input_arg(),
            "-filter:v".to_string(),
            format!("setpts=PTS/{}", params.speed),
        ];
        let tempo = atempo_chain(params.speed);
        if !clip.has_audio() {
            args.push("-an".to_string());
        } else if !tempo.is_empty() {
            args.extend(["-filter:a".to_string(), tempo.join(",")]);
        }

        let produced = self.render_video(args, target).await?;
        info!(output = %produced.value(), speed = params.speed, "Changed video speed");
        Ok(produced)
    }

    /// Replace a video's soundtrack with an audio clip.
    #[instrument(level = "info", skip(self))]
    pub async fn add_audio(&self, params: AddAudioParams) -> Result<Produced, Error> {
        let clip = self.registry.videos.load(&params.video_path).await?;
        let audio = self.registry.audios.load(&params.audio_path).await?;

        let target = self
            .output_target(&params.output_name, params.return_path, DEFAULT_VIDEO_EXT)
            .await?;
        let args = vec![
            "-i".to_string(),
            clip.input_arg(),
            "-i".to_string(),
            audio.input_arg(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "1:a:0".to_string(),
            "-t".to_string(),
            secs(clip.duration),
        ];

        let produced = self.render_video(args, target).await?;
        info!(output = %produced.value(), "Added audio to video");
        Ok(produced)
    }

    /// Fade a video in from black.
    #[instrument(level = "info", skip(self))]
    pub async fn fadein_video(&self, params: FadeVideoParams) -> Result<Produced, Error> {
        check_positive("Fade duration", params.fade_duration)?;

        let clip = self.registry.videos.load(&params.video_path).await?;
        let filter = format!("fade=t=in:st=0:d={}", secs(params.fade_duration));
        let produced = self
            .filter_video(&clip, Some(filter), &params.output_name, params.return_path)
            .await?;
        info!(output = %produced.value(), "Added fade in");
        Ok(produced)
    }

    /// Fade a video out to black.
    #[instrument(level = "info", skip(self))]
    pub async fn fadeout_video(&self, params: FadeVideoParams) -> Result<Produced, Error> {
        check_positive("Fade duration", params.fade_duration)?;

        let clip = self.registry.videos.load(&params.video_path).await?;
        let start = (clip.duration - params.fade_duration).max(0.0);
        let filter = format!("fade=t=out:st={}:d={}", secs(start), secs(params.fade_duration));
        let produced = self
            .filter_video(&clip, Some(filter), &params.output_name, params.return_path)
            .await?;
        info!(output = %produced.value(), "Added fade out");
        Ok(produced)
    }

    /// Draw text over the first `duration` seconds.
    #[instrument(level = "info", skip(self))]
    pub async fn add_text_overlay(&self, params: TextOverlayParams) -> Result<Produced, Error> {
        if params.text.trim().is_empty() {
            return Err(Error::validation("Text cannot be empty"));
        }
        if params.font_size == 0 {
            return Err(Error::validation("Font size must be positive"));
        }
        check_positive("Duration", params.duration)?;

        let clip = self.registry.videos.load(&params.video_path).await?;

        // Text goes through a file so quoting and newlines survive the filtergraph.
        let text_path = self.scratch_path("txt").await?;
        let _text_file = ScratchFile::new(&text_path);
        tokio::fs::write(&text_path, params.text.as_bytes()).await?;

        let mut filter = format!(
            "drawtext=textfile={}:expansion=none:x={}:y={}:fontsize={}:fontcolor={}",
            escape_filter_value(&text_path.to_string_lossy()),
            params.x,
            params.y,
            params.font_size,
            escape_filter_value(&params.color)
        );
        if let Some(font) = &params.font_file {
            filter.push_str(&format!(":fontfile={}", escape_filter_value(font)));
        }
        filter.push_str(&format!(":enable='between(t,0,{})'", secs(params.duration)));

        let produced = self
            .filter_video(&clip, Some(filter), &params.output_name, params.return_path)
            .await?;
        info!(output = %produced.value(), "Added text overlay");
        Ok(produced)
    }

    /// Place an image over the first `duration` seconds.
    #[instrument(level = "info", skip(self))]
    pub async fn add_image_overlay(&self, params: ImageOverlayParams) -> Result<Produced, Error> {
        check_positive("Duration", params.duration)?;
        let is_file = tokio::fs::metadata(&params.image_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(Error::decode(&params.image_path, "image file not found"));
        }

        let clip = self.registry.videos.load(&params.video_path).await?;
        let target = self
            .output_target(&params.output_name, params.return_path, DEFAULT_VIDEO_EXT)
            .await?;
        let args = vec![
            "-i".to_string(),
            clip.input_arg(),
            "-i".to_string(),
            params.image_path.clone(),
            "-filter_complex".to_string(),
            format!(
                "[0:v][1:v]overlay=x={}:y={}:enable='between(t,0,{})'[v]",
                params.x,
                params.y,
                secs(params.duration)
            ),
            "-map".to_string(),
            "[v]".to_string(),
            "-map".to_string(),
            "0:a?".to_string(),
        ];

        let produced = self.render_video(args, target).await?;
        info!(output = %produced.value(), "Added image overlay");
        Ok(produced)
    }

    /// Drop a video's color.
    #[instrument(level = "info", skip(self))]
    pub async fn grayscale_video(&self, params: VideoEffectParams) -> Result<Produced, Error> {
        let clip = self.registry.videos.load(&params.video_path).await?;
        self.filter_video(&clip, Some("hue=s=0".to_string()), &params.output_name, params.return_path)
            .await
    }

    /// Flip a video horizontally.
    #[instrument(level = "info", skip(self))]
    pub async fn mirror_video(&self, params: VideoEffectParams) -> Result<Produced, Error> {
        let clip = self.registry.videos.load(&params.video_path).await?;
        self.filter_video(&clip, Some("hflip".to_string()), &params.output_name, params.return_path)
            .await
    }

    /// Extract frames from a time range at a fixed rate.
    ///
    /// With `return_path` the frames are PNGs in the output folder. Otherwise
    /// the resampled range itself is stored as a video.
    #[instrument(level = "info", skip(self))]
    pub async fn extract_frames(&self, params: ExtractFramesParams) -> Result<Produced, Error> {
        check_positive("FPS", params.fps)?;
        let clip = self.registry.videos.load(&params.video_path).await?;
        check_time_range(params.start_time, params.end_time, clip.duration)?;

        let mut args = vec![
            "-ss".to_string(),
            secs(params.start_time),
            "-i".to_string(),
            clip.input_arg(),
            "-t".to_string(),
            secs(params.end_time - params.start_time),
            "-vf".to_string(),
            format!("fps={}", params.fps),
        ];

        if !params.return_path {
            let target = self
                .output_target(&params.output_folder_name, false, DEFAULT_VIDEO_EXT)
                .await?;
            return self.render_video(args, target).await;
        }

        let folder = self.output_file(&params.output_folder_name).await?;
        tokio::fs::create_dir_all(&folder).await?;
        args.extend([
            "-start_number".to_string(),
            "0".to_string(),
            folder.join("frame_%04d.png").to_string_lossy().into_owned(),
        ]);
        self.ffmpeg().run_owned(&args).await?;

        info!(folder = %folder.display(), "Extracted frames");
        Ok(Produced::OutputPath(folder.display().to_string()))
    }

    /// Split a video into consecutive parts at the given times.
    #[instrument(level = "info", skip(self))]
    pub async fn split_video_at_times(&self, params: SplitVideoParams) -> Result<SplitParts, Error> {
        let clip = self.registry.videos.load(&params.video_path).await?;
        let bounds = split_bounds(&params.split_times, clip.duration)?;

        let part_args = |(start, end): (f64, f64)| {
            vec![
                "-ss".to_string(),
                secs(start),
                "-i".to_string(),
                clip.input_arg(),
                "-t".to_string(),
                secs(end - start),
            ]
        };

        if !params.return_path {
            let mut refs = Vec::with_capacity(bounds.len());
            for bound in bounds {
                let target = self
                    .output_target(&params.output_name, false, DEFAULT_VIDEO_EXT)
                    .await?;
                refs.push(self.render_video(part_args(bound), target).await?.value().to_string());
            }
            info!(parts = refs.len(), "Split video into stored parts");
            return Ok(SplitParts::OutputObjects(refs));
        }

        let base = self.output_file(&params.output_name).await?;
        let (folder, stem, ext) = split_layout(&base);
        tokio::fs::create_dir_all(&folder).await?;

        let mut paths = Vec::with_capacity(bounds.len());
        for (index, bound) in bounds.into_iter().enumerate() {
            let part = folder.join(format!("{}_part_{}.{}", stem, index + 1, ext));
            let target = self.output_target(&part.to_string_lossy(), true, DEFAULT_VIDEO_EXT).await?;
            paths.push(self.render_video(part_args(bound), target).await?.value().to_string());
        }

        info!(parts = paths.len(), folder = %folder.display(), "Split video");
        Ok(SplitParts::OutputPaths(paths))
    }

    /// Re-encode a video with an explicit codec, frame rate and bitrate.
    #[instrument(level = "info", skip(self))]
    pub async fn convert_video_format(&self, params: ConvertVideoParams) -> Result<Produced, Error> {
        if params.codec.trim().is_empty() {
            return Err(Error::validation("Codec cannot be empty"));
        }
        if let Some(fps) = params.fps {
            check_positive("FPS", fps)?;
        }

        let clip = self.registry.videos.load(&params.video_path).await?;
        let target = self
            .output_target(&params.output_name, params.return_path, DEFAULT_VIDEO_EXT)
            .await?;

        let mut args = vec![
            "-i".to_string(),
            clip.input_arg(),
            "-c:v".to_string(),
            params.codec.clone(),
        ];
        if let Some(fps) = params.fps {
            args.extend(["-r".to_string(), fps.to_string()]);
        }
        if let Some(bitrate) = &params.bitrate {
            args.extend(["-b:v".to_string(), bitrate.clone()]);
        }
        if let Some(codec) = audio_codec(&target.extension()) {
            args.extend(["-c:a".to_string(), codec.to_string()]);
        }
        args.push(target.arg());

        self.ffmpeg().run_owned(&args).await?;
        let produced = self.deliver_video(target).await?;
        info!(output = %produced.value(), codec = %params.codec, "Converted video");
        Ok(produced)
    }

    /// Overlay one video on another with transparency.
    #[instrument(level = "info", skip(self))]
    pub async fn add_video_overlay(&self, params: VideoOverlayParams) -> Result<Produced, Error> {
        if !(0.0..=1.0).contains(&params.opacity) {
            return Err(Error::validation("Opacity must be between 0 and 1"));
        }
        check_positive("Duration", params.duration)?;

        let base = self.registry.videos.load(&params.base_video_path).await?;
        let overlay = self.registry.videos.load(&params.overlay_video_path).await?;

        let target = self
            .output_target(&params.output_name, params.return_path, DEFAULT_VIDEO_EXT)
            .await?;
        let graph = format!(
            "[1:v]trim=0:{},setpts=PTS-STARTPTS,format=rgba,colorchannelmixer=aa={}[ov];\
             [0:v][ov]overlay={}:{}:eof_action=pass[v]",
            secs(params.duration),
            params.opacity,
            params.x,
            params.y
        );
        let args = vec![
            "-i".to_string(),
            base.input_arg(),
            "-i".to_string(),
            overlay.input_arg(),
            "-filter_complex".to_string(),
            graph,
            "-map".to_string(),
            "[v]".to_string(),
            "-map".to_string(),
            "0:a?".to_string(),
        ];

        let produced = self.render_video(args, target).await?;
        info!(output = %produced.value(), "Added video overlay");
        Ok(produced)
    }

    /// Merge clips with a fade in, random transitions, a fade out and
    /// optional background music.
    #[instrument(level = "info", skip(self))]
    pub async fn merge_videos(&self, params: MergeVideosParams) -> Result<Produced, Error> {
        if params.video_paths.is_empty() {
            return Err(Error::validation("At least one video file is required"));
        }
        check_positive("Transition duration", params.transition_duration)?;

        let mut clips = Vec::with_capacity(params.video_paths.len());
        for path in &params.video_paths {
            clips.push(self.registry.videos.load(path).await?);
        }

        let durations: Vec<f64> = clips.iter().map(|c| c.duration).collect();
        let shortest = durations.iter().copied().fold(f64::INFINITY, f64::min);
        if params.transition_duration > shortest
            || (clips.len() > 1 && params.transition_duration >= shortest)
        {
            return Err(Error::validation(format!(
                "Transition duration {} must be shorter than every clip ({:.3}s)",
                params.transition_duration, shortest
            )));
        }

        let music = match &params.audios_folder {
            Some(folder) => pick_music(Path::new(folder)).await,
            None => None,
        };
        let audio = match &music {
            Some(_) => MergeAudio::Music(clips.len()),
            None if clips.iter().all(|c| c.has_audio()) => MergeAudio::Crossfade,
            None => MergeAudio::Silent,
        };

        let transitions = pick_transitions(clips.len() - 1, &mut rand::thread_rng());
        let layout = MergeLayout {
            width: clips[0].width,
            height: clips[0].height,
            fps: clips[0].fps,
            durations: &durations,
            transition: params.transition_duration,
            transitions: &transitions,
            audio,
        };

        let target = self
            .output_target(&params.output_path, params.return_path, DEFAULT_VIDEO_EXT)
            .await?;

        let mut args = Vec::new();
        for clip in &clips {
            args.extend(["-i".to_string(), clip.input_arg()]);
        }
        if let Some(music) = &music {
            info!(music = %music.display(), "Selected background music");
            args.extend([
                "-stream_loop".to_string(),
                "-1".to_string(),
                "-i".to_string(),
                music.to_string_lossy().into_owned(),
            ]);
        }
        args.extend([
            "-filter_complex".to_string(),
            merge_graph(&layout),
            "-map".to_string(),
            "[vout]".to_string(),
        ]);
        if audio != MergeAudio::Silent {
            args.extend(["-map".to_string(), "[aout]".to_string()]);
        }

        let produced = self.render_video(args, target).await?;
        info!(
            output = %produced.value(),
            clips = clips.len(),
            transitions = ?transitions,
            "Merged videos"
        );
        Ok(produced)
    }
}

/// Folder, stem and extension for the parts of a split written near `base`.
fn split_layout(base: &Path) -> (PathBuf, String, String) {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "split".to_string());
    let ext = base
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_VIDEO_EXT.to_string());
    let folder = base.with_file_name(&stem);
    (folder, stem, ext)
}

/// Random music file from `folder`, or `None` when there is nothing usable.
async fn pick_music(folder: &Path) -> Option<PathBuf> {
    let mut entries = match tokio::fs::read_dir(folder).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(folder = %folder.display(), error = %e, "Cannot read audios folder");
            return None;
        }
    };

    let mut candidates = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_music = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| MUSIC_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false);
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if is_music && is_file {
            candidates.push(path);
        }
    }
    candidates.sort();

    if candidates.is_empty() {
        warn!(folder = %folder.display(), "No audio files found in audios folder");
    }
    candidates.choose(&mut rand::thread_rng()).cloned()
}

// =============================================================================
// Unit Tests
// =============================================================================
