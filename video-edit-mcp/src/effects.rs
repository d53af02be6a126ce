//! Color adjustments and stylised effects for still images.

use image::imageops;
use image::{GrayImage, Luma, Rgb, RgbImage};

/// Luma weights used for saturation.
const SATURATION_LUMA: [f32; 3] = [0.2989, 0.5870, 0.1140];

/// Luma weights used for grayscale conversion.
const GRAY_LUMA: [f32; 3] = [0.299, 0.587, 0.114];

/// Gradient magnitude above which a pixel counts as an edge.
const EDGE_THRESHOLD: f32 = 150.0;

/// A named effect applied after color adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    BlackWhite,
    Sepia,
    Blur,
    EdgeDetect,
    Invert,
    Sharpen,
    Emboss,
    Sketch,
}

impl Effect {
    /// Parse an effect name, case-insensitively. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "blackwhite" => Some(Self::BlackWhite),
            "sepia" => Some(Self::Sepia),
            "blur" => Some(Self::Blur),
            "edge_detect" => Some(Self::EdgeDetect),
            "invert" => Some(Self::Invert),
            "sharpen" => Some(Self::Sharpen),
            "emboss" => Some(Self::Emboss),
            "sketch" => Some(Self::Sketch),
            _ => None,
        }
    }

    /// Apply the effect, returning a new image.
    pub fn apply(self, image: &RgbImage) -> RgbImage {
        match self {
            Self::BlackWhite => map_pixels(image, |[r, g, b]| {
                let v = (r + g + b) / 3.0;
                [v, v, v]
            }),
            Self::Sepia => map_pixels(image, |[r, g, b]| {
                [
                    0.393 * r + 0.769 * g + 0.189 * b,
                    0.349 * r + 0.686 * g + 0.168 * b,
                    0.272 * r + 0.534 * g + 0.131 * b,
                ]
            }),
            Self::Blur => imageops::blur(image, 2.0),
            Self::EdgeDetect => edge_detect(image),
            Self::Invert => {
                let mut inverted = image.clone();
                imageops::invert(&mut inverted);
                inverted
            }
            Self::Sharpen => convolve3x3(image, &[-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0]),
            Self::Emboss => {
                let embossed = convolve3x3(image, &[-2.0, -1.0, 0.0, -1.0, 1.0, 1.0, 0.0, 1.0, 2.0]);
                blend_half(&embossed, image)
            }
            Self::Sketch => sketch(image),
        }
    }
}

/// Optional brightness, contrast and saturation adjustments.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ColorAdjust {
    /// -1.0 (black) to 1.0 (double); clamped.
    pub brightness: Option<f32>,
    /// 0.0 (flat) upwards; negatives act as 0.
    pub contrast: Option<f32>,
    /// 0.0 (gray) upwards; negatives act as 0.
    pub saturation: Option<f32>,
}

impl ColorAdjust {
    /// Whether any adjustment is set.
    pub fn is_identity(&self) -> bool {
        self.brightness.is_none() && self.contrast.is_none() && self.saturation.is_none()
    }

    /// Apply brightness, then contrast, then saturation.
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let mut out = image.clone();

        if let Some(brightness) = self.brightness {
            let factor = 1.0 + brightness.clamp(-1.0, 1.0);
            out = map_pixels(&out, |[r, g, b]| [r * factor, g * factor, b * factor]);
        }

        if let Some(contrast) = self.contrast {
            let factor = contrast.max(0.0);
            let mean = channel_means(&out);
            out = map_pixels(&out, |px| {
                [0, 1, 2].map(|c| mean[c] + factor * (px[c] - mean[c]))
            });
        }

        if let Some(saturation) = self.saturation {
            let factor = saturation.max(0.0);
            out = map_pixels(&out, |px| {
                let luma = dot(px, SATURATION_LUMA);
                px.map(|c| luma + factor * (c - luma))
            });
        }

        out
    }
}

fn dot(px: [f32; 3], weights: [f32; 3]) -> f32 {
    px[0] * weights[0] + px[1] * weights[1] + px[2] * weights[2]
}

fn to_u8(value: f32) -> u8 {
    value.clamp(0.0, 255.0) as u8
}

fn map_pixels(image: &RgbImage, f: impl Fn([f32; 3]) -> [f32; 3]) -> RgbImage {
    let mut out = RgbImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(out.pixels_mut()) {
        let px = src.0.map(f32::from);
        *dst = Rgb(f(px).map(to_u8));
    }
    out
}

fn channel_means(image: &RgbImage) -> [f32; 3] {
    let count = (image.width() as f64 * image.height() as f64).max(1.0);
    let mut sums = [0f64; 3];
    for px in image.pixels() {
        for c in 0..3 {
            sums[c] += px.0[c] as f64;
        }
    }
    sums.map(|s| (s / count) as f32)
}

fn grayscale(image: &RgbImage) -> GrayImage {
    let mut gray = GrayImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(gray.pixels_mut()) {
        *dst = Luma([to_u8(dot(src.0.map(f32::from), GRAY_LUMA).round())]);
    }
    gray
}

fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
    let mut out = RgbImage::new(gray.width(), gray.height());
    for (src, dst) in gray.pixels().zip(out.pixels_mut()) {
        let v = src.0[0];
        *dst = Rgb([v, v, v]);
    }
    out
}

/// Correlate with a 3x3 kernel, reflecting at the borders.
fn convolve3x3(image: &RgbImage, kernel: &[f32; 9]) -> RgbImage {
    let (w, h) = image.dimensions();
    let mut out = RgbImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0f32; 3];
            for ky in 0..3 {
                for kx in 0..3 {
                    let sx = reflect(x as i64 + kx as i64 - 1, w);
                    let sy = reflect(y as i64 + ky as i64 - 1, h);
                    let weight = kernel[ky * 3 + kx];
                    let px = image.get_pixel(sx, sy).0;
                    for c in 0..3 {
                        acc[c] += weight * px[c] as f32;
                    }
                }
            }
            out.put_pixel(x, y, Rgb(acc.map(|v| to_u8(v.round()))));
        }
    }
    out
}

/// Border index reflection without repeating the edge pixel.
fn reflect(i: i64, len: u32) -> u32 {
    let len = len as i64;
    if len == 1 {
        return 0;
    }
    let reflected = if i < 0 {
        -i
    } else if i >= len {
        2 * len - i - 2
    } else {
        i
    };
    reflected.clamp(0, len - 1) as u32
}

fn blend_half(a: &RgbImage, b: &RgbImage) -> RgbImage {
    let mut out = RgbImage::new(a.width(), a.height());
    for ((pa, pb), dst) in a.pixels().zip(b.pixels()).zip(out.pixels_mut()) {
        *dst = Rgb([0, 1, 2].map(|c| {
            to_u8((0.5 * pa.0[c] as f32 + 0.5 * pb.0[c] as f32).round())
        }));
    }
    out
}

/// Dark edges on white from a thresholded Sobel gradient.
fn edge_detect(image: &RgbImage) -> RgbImage {
    let gray = grayscale(image);
    let (w, h) = gray.dimensions();
    let at = |x: i64, y: i64| gray.get_pixel(reflect(x, w), reflect(y, h)).0[0] as f32;

    let mut edges = GrayImage::new(w, h);
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let gx = at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1)
                - at(x - 1, y - 1)
                - 2.0 * at(x - 1, y)
                - at(x - 1, y + 1);
            let gy = at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1)
                - at(x - 1, y - 1)
                - 2.0 * at(x, y - 1)
                - at(x + 1, y - 1);
            let edge = (gx * gx + gy * gy).sqrt() > EDGE_THRESHOLD;
            edges.put_pixel(x as u32, y as u32, Luma([if edge { 0 } else { 255 }]));
        }
    }
    gray_to_rgb(&edges)
}

/// Pencil sketch: grayscale color-dodged with its blurred negative.
fn sketch(image: &RgbImage) -> RgbImage {
    let gray = grayscale(image);
    let mut inverted = gray.clone();
    imageops::invert(&mut inverted);
    let blurred = imageops::blur(&inverted, 3.5);

    let mut out = GrayImage::new(gray.width(), gray.height());
    for ((g, b), dst) in gray.pixels().zip(blurred.pixels()).zip(out.pixels_mut()) {
        let denominator = 255.0 - b.0[0] as f32;
        let value = if denominator == 0.0 {
            0.0
        } else {
            (g.0[0] as f32 * 256.0 / denominator).round()
        };
        *dst = Luma([to_u8(value)]);
    }
    gray_to_rgb(&out)
}
