//! Zoom and pan over a still image.
//!
//! Each output frame is a window the size of the source image, taken from the
//! image scaled by the current zoom. Everything is a closed-form function of
//! the frame time, so frames can be rendered independently.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

/// Which way a zoom drifts when no manual pan is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoomDirection {
    #[default]
    Center,
    Top,
    Bottom,
    Left,
    Right,
}

impl ZoomDirection {
    /// Parse a direction name. Unrecognised names zoom on the center.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "top" => Self::Top,
            "bottom" => Self::Bottom,
            "left" => Self::Left,
            "right" => Self::Right,
            _ => Self::Center,
        }
    }
}

/// Zoom/pan animation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomPan {
    /// Zoom reached at the end of the clip; 1.0 means no zoom.
    pub zoom_factor: f64,
    pub direction: ZoomDirection,
    /// Manual pan from the first point to the second, in scaled-image pixels.
    pub pan: Option<((f64, f64), (f64, f64))>,
    /// Clip duration in seconds.
    pub duration: f64,
}

/// Where the output window sits at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub zoom: f64,
    /// Size of the scaled image.
    pub scaled: (u32, u32),
    /// Window origin within the scaled image. May be negative for manual pans.
    pub origin: (i64, i64),
    /// Whether the window follows a manual pan (no clamping).
    pub manual: bool,
}

impl ZoomPan {
    /// Fraction of the clip elapsed at `t`, clamped to `[0, 1]`.
    pub fn progress(&self, t: f64) -> f64 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        (t / self.duration).clamp(0.0, 1.0)
    }

    /// Compute the window for time `t` over an image of `size`.
    pub fn window_at(&self, t: f64, size: (u32, u32)) -> Window {
        let (w, h) = (size.0 as f64, size.1 as f64);
        let progress = self.progress(t);
        let zoom = 1.0 + (self.zoom_factor - 1.0) * progress;
        let scaled = if zoom == 1.0 {
            size
        } else {
            ((w * zoom) as u32, (h * zoom) as u32)
        };

        if let Some(((sx, sy), (ex, ey))) = self.pan {
            let x = sx + (ex - sx) * progress;
            let y = sy + (ey - sy) * progress;
            return Window {
                zoom,
                scaled,
                origin: (x as i64, y as i64),
                manual: true,
            };
        }

        let effect = (zoom - 1.0) * 0.5;
        let (dx, dy) = match self.direction {
            ZoomDirection::Center => (0.0, 0.0),
            ZoomDirection::Top => (0.0, -h * effect),
            ZoomDirection::Bottom => (0.0, h * effect),
            ZoomDirection::Left => (-w * effect, 0.0),
            ZoomDirection::Right => (w * effect, 0.0),
        };

        let (sw, sh) = (scaled.0 as i64, scaled.1 as i64);
        let (ow, oh) = (size.0 as i64, size.1 as i64);
        let x = ((sw - ow) / 2).max(0) + dx as i64;
        let y = ((sh - oh) / 2).max(0) + dy as i64;

        Window {
            zoom,
            scaled,
            origin: (x.min(sw - ow).max(0), y.min(sh - oh).max(0)),
            manual: false,
        }
    }

    /// Render the frame at time `t`. The result has the source's dimensions.
    pub fn render(&self, source: &RgbImage, t: f64) -> RgbImage {
        let size = source.dimensions();
        let window = self.window_at(t, size);

        let scaled = if window.scaled == size {
            source.clone()
        } else {
            imageops::resize(source, window.scaled.0.max(1), window.scaled.1.max(1), FilterType::Lanczos3)
        };

        let mut frame = RgbImage::from_pixel(size.0, size.1, Rgb([0, 0, 0]));
        if window.manual {
            // Place the scaled image so the window origin lands on (0, 0).
            imageops::replace(&mut frame, &scaled, -window.origin.0, -window.origin.1);
            return frame;
        }

        let (x, y) = (window.origin.0 as u32, window.origin.1 as u32);
        let crop_w = size.0.min(scaled.width().saturating_sub(x));
        let crop_h = size.1.min(scaled.height().saturating_sub(y));
        let cropped = imageops::crop_imm(&scaled, x, y, crop_w, crop_h).to_image();

        // Smaller crops (zoom below 1) sit centered on black.
        let offset_x = ((size.0 - crop_w) / 2) as i64;
        let offset_y = ((size.1 - crop_h) / 2) as i64;
        imageops::replace(&mut frame, &cropped, offset_x, offset_y);
        frame
    }
}

/// Number of frames for a clip, at least one.
pub fn frame_count(duration: f64, fps: f64) -> u64 {
    ((duration * fps).round() as u64).max(1)
}
