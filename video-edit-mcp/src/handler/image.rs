//! Still-image tools and image-to-video rendering.

use super::video::rotation_filter;
use super::{
    blocking, check_positive, encode_args, round2, Produced, VideoEditHandler, DEFAULT_VIDEO_EXT,
    EVEN_DIMENSIONS,
};
use crate::effects::{ColorAdjust, Effect};
use crate::ffmpeg::RawVideo;
use crate::zoompan::{frame_count, ZoomDirection, ZoomPan};
use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::imageops::{self, FilterType};
use image::{AnimationDecoder, ColorType, ImageDecoder, ImageFormat, ImageReader, Rgb, RgbImage};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use video_edit_mcp_common::error::Error;

// =============================================================================
// Constants
// =============================================================================

/// Default clip length for `image_to_video`, in seconds.
pub const DEFAULT_IMAGE_DURATION: f64 = 5.0;

/// Default frame rate for `image_to_video`.
pub const DEFAULT_IMAGE_FPS: f64 = 24.0;

/// Extensions picked up by `images_to_video`.
pub const SEQUENCE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp", "tif", "tiff"];

// =============================================================================
// Output Types
// =============================================================================

/// Description of an image, as reported by `get_image_info`.
#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    pub file_path: String,
    pub filename: String,
    pub format: Option<String>,
    pub mode: String,
    pub width: u32,
    pub height: u32,
    pub size: [u32; 2],
    pub aspect_ratio: Option<f64>,
    pub is_animated: bool,
    pub n_frames: usize,
    pub has_exif: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exif_size: Option<usize>,
    pub has_icc_profile: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icc_profile_size: Option<usize>,
    pub file_size_bytes: u64,
    pub file_size_kb: f64,
    pub file_size_mb: f64,
    pub compression_ratio: Option<f64>,
    pub estimated_bpp: Option<f64>,
}

// =============================================================================
// Parameter Types
// =============================================================================

/// Parameters for describing an image.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ImageInfoParams {
    /// Image file path.
    pub image_path: String,
}

/// Parameters for letterboxing an image.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ResizeImageParams {
    /// Image file path.
    pub image_path: String,
    /// Target [width, height] in pixels.
    pub size: [u32; 2],
    /// Output file name or path; its extension picks the image format.
    pub output_path: String,
}

/// Parameters for turning a still image into a video.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ImageToVideoParams {
    /// Image file path.
    pub image_path: String,
    /// Output video file name or path, e.g. "slide.mp4".
    pub output_path: String,
    /// Clip length in seconds.
    #[serde(default = "default_image_duration")]
    pub duration: f64,
    /// Frames per second.
    #[serde(default = "default_image_fps")]
    pub fps: f64,
    /// true writes the file and returns its path; false stores the result.
    #[serde(default = "default_true")]
    pub return_path: bool,
    /// One of blackwhite, sepia, blur, edge_detect, invert, sharpen, emboss,
    /// sketch. Unknown names are ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    /// Zoom reached at the end of the clip, e.g. 1.5.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom_factor: Option<f64>,
    /// Where the zoom drifts: center, top, bottom, left or right.
    #[serde(default = "default_zoom_direction")]
    pub zoom_direction: String,
    /// Manual pan start [x, y] in zoomed-image pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pan_start: Option<[f64; 2]>,
    /// Manual pan end [x, y] in zoomed-image pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pan_end: Option<[f64; 2]>,
    /// Counter-clockwise rotation in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_angle: Option<f64>,
    /// Brightness adjustment from -1.0 to 1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f32>,
    /// Contrast factor, 1.0 unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f32>,
    /// Saturation factor, 1.0 unchanged, 0.0 gray.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturation: Option<f32>,
}

/// Parameters for turning a folder of images into a video.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ImagesToVideoParams {
    /// Folder containing the frames; files play in name order.
    pub images_folder_path: String,
    /// Frames per second.
    pub fps: f64,
    /// Output file name, e.g. "slideshow.mp4".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result.
    pub return_path: bool,
}

fn default_image_duration() -> f64 {
    DEFAULT_IMAGE_DURATION
}

fn default_image_fps() -> f64 {
    DEFAULT_IMAGE_FPS
}

fn default_zoom_direction() -> String {
    "center".to_string()
}

fn default_true() -> bool {
    true
}

impl ImageToVideoParams {
    /// Zoom/pan animation requested by these parameters, if any.
    ///
    /// A manual pan needs both endpoints; with only one the zoom direction
    /// applies instead.
    pub fn zoom_pan(&self) -> Option<ZoomPan> {
        if self.zoom_factor.is_none() && self.pan_start.is_none() && self.pan_end.is_none() {
            return None;
        }
        let pan = match (self.pan_start, self.pan_end) {
            (Some([sx, sy]), Some([ex, ey])) => Some(((sx, sy), (ex, ey))),
            _ => None,
        };
        Some(ZoomPan {
            zoom_factor: self.zoom_factor.unwrap_or(1.0),
            direction: ZoomDirection::parse(&self.zoom_direction),
            pan,
            duration: self.duration,
        })
    }

    /// Color adjustments requested by these parameters.
    pub fn color_adjust(&self) -> ColorAdjust {
        ColorAdjust {
            brightness: self.brightness,
            contrast: self.contrast,
            saturation: self.saturation,
        }
    }
}

// =============================================================================
// Image Helpers
// =============================================================================

fn image_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::image(format!("Failed to load image {}: {}", path.display(), e))
}

/// Decode an image file as 8-bit RGB.
pub fn load_rgb(path: &Path) -> Result<RgbImage, Error> {
    let image = ImageReader::open(path)
        .map_err(|e| image_error(path, e))?
        .with_guessed_format()
        .map_err(|e| image_error(path, e))?
        .decode()
        .map_err(|e| image_error(path, e))?;
    Ok(image.to_rgb8())
}

/// Short mode name for a color type ("L", "LA", "RGB", "RGBA").
pub fn color_mode(color: ColorType) -> String {
    match color {
        ColorType::L8 | ColorType::L16 => "L".to_string(),
        ColorType::La8 | ColorType::La16 => "LA".to_string(),
        ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => "RGB".to_string(),
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => "RGBA".to_string(),
        other => format!("{:?}", other),
    }
}

/// Number of frames in an image; 1 unless it is an animated GIF, PNG or WebP.
fn count_frames(path: &Path, format: Option<ImageFormat>) -> Result<usize, Error> {
    let open = || -> Result<BufReader<File>, Error> { Ok(BufReader::new(File::open(path)?)) };

    let frames = match format {
        Some(ImageFormat::Gif) => GifDecoder::new(open()?)
            .map_err(|e| image_error(path, e))?
            .into_frames()
            .count(),
        Some(ImageFormat::Png) => {
            let decoder = PngDecoder::new(open()?).map_err(|e| image_error(path, e))?;
            if decoder.is_apng().map_err(|e| image_error(path, e))? {
                decoder
                    .apng()
                    .map_err(|e| image_error(path, e))?
                    .into_frames()
                    .count()
            } else {
                1
            }
        }
        Some(ImageFormat::WebP) => {
            let decoder = WebPDecoder::new(open()?).map_err(|e| image_error(path, e))?;
            if decoder.has_animation() {
                decoder.into_frames().count()
            } else {
                1
            }
        }
        _ => 1,
    };
    Ok(frames.max(1))
}

/// Inspect an image file without decoding its pixels.
pub fn inspect_image(path: &Path) -> Result<ImageInfo, Error> {
    let file_size = std::fs::metadata(path)
        .map_err(|e| image_error(path, e))?
        .len();

    let reader = ImageReader::open(path)
        .map_err(|e| image_error(path, e))?
        .with_guessed_format()
        .map_err(|e| image_error(path, e))?;
    let format = reader.format();
    let mut decoder = reader.into_decoder().map_err(|e| image_error(path, e))?;

    let (width, height) = decoder.dimensions();
    let color = decoder.color_type();
    let icc = decoder.icc_profile().ok().flatten();
    let exif = decoder.exif_metadata().ok().flatten();
    drop(decoder);

    let n_frames = count_frames(path, format)?;
    let pixels = width as u64 * height as u64;
    let uncompressed = pixels * color.channel_count() as u64;

    Ok(ImageInfo {
        file_path: path.display().to_string(),
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        format: format.map(|f| format!("{:?}", f).to_uppercase()),
        mode: color_mode(color),
        width,
        height,
        size: [width, height],
        aspect_ratio: (height > 0).then(|| round2(width as f64 / height as f64)),
        is_animated: n_frames > 1,
        n_frames,
        has_exif: exif.is_some(),
        exif_size: exif.as_ref().map(Vec::len),
        has_icc_profile: icc.is_some(),
        icc_profile_size: icc.as_ref().map(Vec::len),
        file_size_bytes: file_size,
        file_size_kb: round2(file_size as f64 / 1024.0),
        file_size_mb: round2(file_size as f64 / (1024.0 * 1024.0)),
        compression_ratio: (uncompressed > 0)
            .then(|| (file_size as f64 / uncompressed as f64 * 10_000.0).round() / 10_000.0),
        estimated_bpp: (pixels > 0).then(|| round2(file_size as f64 * 8.0 / pixels as f64)),
    })
}

/// Scale `image` to fit inside `size` and center it on black.
pub fn letterbox(image: &RgbImage, size: (u32, u32)) -> RgbImage {
    let (w, h) = image.dimensions();
    let scale = (size.0 as f64 / w.max(1) as f64).min(size.1 as f64 / h.max(1) as f64);
    let new_w = ((w as f64 * scale) as u32).clamp(1, size.0);
    let new_h = ((h as f64 * scale) as u32).clamp(1, size.1);

    let resized = imageops::resize(image, new_w, new_h, FilterType::Lanczos3);
    let mut canvas = RgbImage::from_pixel(size.0, size.1, Rgb([0, 0, 0]));
    imageops::replace(
        &mut canvas,
        &resized,
        ((size.0 - new_w) / 2) as i64,
        ((size.1 - new_h) / 2) as i64,
    );
    canvas
}

/// Image files of a folder in name order.
pub fn sequence_files(folder: &Path) -> Result<Vec<PathBuf>, Error> {
    if !folder.is_dir() {
        return Err(Error::validation(format!(
            "Images folder does not exist: {}",
            folder.display()
        )));
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| SEQUENCE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(Error::validation(format!(
            "No image files found in {}",
            folder.display()
        )));
    }
    Ok(files)
}

// =============================================================================
// Tool Implementations
// =============================================================================

impl VideoEditHandler {
    /// Describe an image file.
    #[instrument(level = "info", skip(self))]
    pub async fn get_image_info(&self, params: ImageInfoParams) -> Result<ImageInfo, Error> {
        let path = PathBuf::from(&params.image_path);
        let mut info = blocking(move || inspect_image(&path)).await?;
        info.file_path = params.image_path.clone();
        debug!(width = info.width, height = info.height, format = ?info.format, "Got image info");
        Ok(info)
    }

    /// Letterbox an image to exactly the requested size.
    #[instrument(level = "info", skip(self))]
    pub async fn resize_image(&self, params: ResizeImageParams) -> Result<Produced, Error> {
        let [width, height] = params.size;
        if width == 0 || height == 0 {
            return Err(Error::validation(
                "Size must be a tuple of two positive integers (width, height)",
            ));
        }

        let source = PathBuf::from(&params.image_path);
        let output = self.output_file(&params.output_path).await?;
        let destination = output.clone();
        blocking(move || {
            let image = load_rgb(&source)?;
            letterbox(&image, (width, height))
                .save(&destination)
                .map_err(|e| Error::image(format!("Failed to write {}: {}", destination.display(), e)))
        })
        .await?;

        info!(output = %output.display(), width, height, "Resized image");
        Ok(Produced::OutputPath(output.display().to_string()))
    }

    /// Render a still image as a video with optional effects, zoom, pan and
    /// rotation.
    #[instrument(level = "info", skip(self))]
    pub async fn image_to_video(&self, params: ImageToVideoParams) -> Result<Produced, Error> {
        check_positive("Duration", params.duration)?;
        check_positive("FPS", params.fps)?;
        if let Some(angle) = params.rotation_angle {
            if !angle.is_finite() {
                return Err(Error::validation("Rotation angle must be a number"));
            }
        }

        let source = PathBuf::from(&params.image_path);
        let adjust = params.color_adjust();
        let effect = params.effect.as_deref().and_then(Effect::parse);
        let image = blocking(move || {
            let mut image = load_rgb(&source)?;
            if !adjust.is_identity() {
                image = adjust.apply(&image);
            }
            if let Some(effect) = effect {
                image = effect.apply(&image);
            }
            Ok(image)
        })
        .await?;

        let target = self
            .output_target(&params.output_path, params.return_path, DEFAULT_VIDEO_EXT)
            .await?;

        let filter = match params.rotation_angle.and_then(rotation_filter) {
            Some(rotate) => format!("{},{}", rotate, EVEN_DIMENSIONS),
            None => EVEN_DIMENSIONS.to_string(),
        };
        let mut output_args = vec!["-vf".to_string(), filter];
        output_args.extend(encode_args(&target.extension()));

        let raw = RawVideo {
            width: image.width(),
            height: image.height(),
            fps: params.fps,
            frames: frame_count(params.duration, params.fps),
        };
        let zoom_pan = params.zoom_pan();
        let ffmpeg = self.ffmpeg().clone();
        let output = target.path().to_path_buf();

        blocking(move || {
            ffmpeg.encode_frames(raw, &output_args, &output, |index| {
                let t = index as f64 / raw.fps;
                Ok(match &zoom_pan {
                    Some(zoom_pan) => zoom_pan.render(&image, t),
                    None => image.clone(),
                })
            })
        })
        .await?;

        let produced = self.deliver_video(target).await?;
        info!(output = %produced.value(), frames = raw.frames, "Converted image to video");
        Ok(produced)
    }

    /// Play the images of a folder as frames.
    #[instrument(level = "info", skip(self))]
    pub async fn images_to_video(&self, params: ImagesToVideoParams) -> Result<Produced, Error> {
        check_positive("FPS", params.fps)?;

        let folder = PathBuf::from(&params.images_folder_path);
        let files = blocking(move || sequence_files(&folder)).await?;
        let first_path = files[0].clone();
        let first = blocking(move || load_rgb(&first_path)).await?;

        let target = self
            .output_target(&params.output_name, params.return_path, DEFAULT_VIDEO_EXT)
            .await?;
        let mut output_args = vec!["-vf".to_string(), EVEN_DIMENSIONS.to_string()];
        output_args.extend(encode_args(&target.extension()));

        let raw = RawVideo {
            width: first.width(),
            height: first.height(),
            fps: params.fps,
            frames: files.len() as u64,
        };
        let ffmpeg = self.ffmpeg().clone();
        let output = target.path().to_path_buf();
        let count = files.len();

        blocking(move || {
            ffmpeg.encode_frames(raw, &output_args, &output, |index| {
                let path = &files[index as usize];
                let frame = load_rgb(path)?;
                if frame.dimensions() != (raw.width, raw.height) {
                    return Err(Error::validation(format!(
                        "{} is {}x{}, expected {}x{} like the first image",
                        path.display(),
                        frame.width(),
                        frame.height(),
                        raw.width,
                        raw.height
                    )));
                }
                Ok(frame)
            })
        })
        .await?;

        let produced = self.deliver_video(target).await?;
        info!(output = %produced.value(), frames = count, "Created video from images");
        Ok(produced)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
