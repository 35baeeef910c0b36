//! Resize and re-encode engine
//!
//! Decoding, geometry and encoding are CPU bound; callers on an async
//! runtime should run [`TransformEngine::apply`] on the blocking pool.

use crate::options::{CropPosition, FitMode, OutputFormat, TransformConfig, TransformOptions};
use crate::{Error, Result};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Vector content is served unchanged
pub const SVG_CONTENT_TYPE: &str = "image/svg+xml";

const FILTER: FilterType = FilterType::Lanczos3;
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Encoded result of a transform
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// Encoded bytes
    pub bytes: Bytes,
    /// MIME type of `bytes`
    pub content_type: String,
    /// Output width; `None` for passed-through vector content
    pub width: Option<u32>,
    /// Output height; `None` for passed-through vector content
    pub height: Option<u32>,
    /// Length of `bytes`
    pub size: u64,
}

/// Applies [`TransformOptions`] to source images
#[derive(Debug, Clone, Default)]
pub struct TransformEngine {
    config: TransformConfig,
}

impl TransformEngine {
    /// Create an engine with the given limits and defaults
    #[must_use]
    pub fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    /// Limits in effect
    #[must_use]
    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Transform `source` according to `options`
    pub fn apply(
        &self,
        source: &[u8],
        content_type: &str,
        options: &TransformOptions,
    ) -> Result<TransformOutput> {
        if is_svg(content_type) {
            debug!(size = source.len(), "Passing SVG through unchanged");
            return Ok(TransformOutput {
                bytes: Bytes::copy_from_slice(source),
                content_type: SVG_CONTENT_TYPE.to_string(),
                width: None,
                height: None,
                size: source.len() as u64,
            });
        }

        let source_format = detect_format(source, content_type)?;
        let image = image::load_from_memory_with_format(source, source_format.image_format())
            .map_err(|e| Error::decode(content_type, e))?;
        let target = options.format.unwrap_or(source_format);
        let (source_width, source_height) = image.dimensions();

        let output = resize(image, options, target.supports_alpha());
        let (width, height) = output.dimensions();
        let quality = options
            .quality
            .unwrap_or(self.config.default_quality)
            .clamp(1, 100);
        let encoded = encode(&output, target, quality)?;

        debug!(
            from = %source_format,
            to = %target,
            source_width,
            source_height,
            width,
            height,
            size = encoded.len(),
            "Transformed image"
        );
        Ok(TransformOutput {
            size: encoded.len() as u64,
            bytes: Bytes::from(encoded),
            content_type: target.content_type().to_string(),
            width: Some(width),
            height: Some(height),
        })
    }
}

fn is_svg(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(SVG_CONTENT_TYPE))
}

/// Sniff the bytes first and fall back to the declared type
fn detect_format(source: &[u8], content_type: &str) -> Result<OutputFormat> {
    image::guess_format(source)
        .ok()
        .and_then(OutputFormat::from_image_format)
        .or_else(|| OutputFormat::from_content_type(content_type))
        .ok_or_else(|| Error::unsupported(content_type))
}

fn resize(image: DynamicImage, options: &TransformOptions, alpha: bool) -> DynamicImage {
    if !options.resizes() {
        return image;
    }
    let (sw, sh) = image.dimensions();
    if sw == 0 || sh == 0 {
        return image;
    }
    let (bw, bh) = target_box(sw, sh, options.width, options.height);
    let position = options.position.unwrap_or_default();

    match options.fit.unwrap_or_default() {
        FitMode::Fill => image.resize_exact(bw, bh, FILTER),
        FitMode::Inside => {
            let (w, h) = scale_within(sw, sh, bw, bh);
            image.resize_exact(w, h, FILTER)
        }
        FitMode::Contain => {
            let (w, h) = scale_within(sw, sh, bw, bh);
            let inner = image.resize_exact(w, h, FILTER).to_rgba8();
            let mut canvas = RgbaImage::from_pixel(bw, bh, if alpha { TRANSPARENT } else { WHITE });
            imageops::overlay(
                &mut canvas,
                &inner,
                i64::from(position.x_offset(bw, w)),
                i64::from(position.y_offset(bh, h)),
            );
            DynamicImage::ImageRgba8(canvas)
        }
        FitMode::Cover => {
            let (w, h) = scale_covering(sw, sh, bw, bh);
            let scaled = image.resize_exact(w, h, FILTER);
            crop(&scaled, position, bw, bh)
        }
        FitMode::Outside => {
            let (w, h) = scale_covering(sw, sh, bw, bh);
            image.resize_exact(w, h, FILTER)
        }
    }
}

fn crop(image: &DynamicImage, position: CropPosition, width: u32, height: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    image.crop_imm(
        position.x_offset(w, width),
        position.y_offset(h, height),
        width.min(w),
        height.min(h),
    )
}

/// The requested box, clamped to the source so nothing is upscaled.
///
/// A single dimension derives the other from the source aspect ratio.
fn target_box(sw: u32, sh: u32, width: Option<u32>, height: Option<u32>) -> (u32, u32) {
    match (width, height) {
        (Some(w), Some(h)) => (w.min(sw), h.min(sh)),
        (Some(w), None) => {
            let w = w.min(sw);
            (w, proportional(sh, w, sw))
        }
        (None, Some(h)) => {
            let h = h.min(sh);
            (proportional(sw, h, sh), h)
        }
        (None, None) => (sw, sh),
    }
}

/// Largest size with the source aspect ratio that fits inside the box
fn scale_within(sw: u32, sh: u32, bw: u32, bh: u32) -> (u32, u32) {
    if u64::from(sw) * u64::from(bh) >= u64::from(sh) * u64::from(bw) {
        (bw, proportional(sh, bw, sw).min(bh))
    } else {
        (proportional(sw, bh, sh).min(bw), bh)
    }
}

/// Smallest size with the source aspect ratio that covers the box
fn scale_covering(sw: u32, sh: u32, bw: u32, bh: u32) -> (u32, u32) {
    if u64::from(sw) * u64::from(bh) >= u64::from(sh) * u64::from(bw) {
        (proportional_ceil(sw, bh, sh).max(bw), bh)
    } else {
        (bw, proportional_ceil(sh, bw, sw).max(bh))
    }
}

/// `value * num / den`, rounded, at least 1
fn proportional(value: u32, num: u32, den: u32) -> u32 {
    let den = u64::from(den.max(1));
    let scaled = (u64::from(value) * u64::from(num) + den / 2) / den;
    u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
}

/// `value * num / den`, rounded up, at least 1
fn proportional_ceil(value: u32, num: u32, den: u32) -> u32 {
    let scaled = (u64::from(value) * u64::from(num)).div_ceil(u64::from(den.max(1)));
    u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
}

fn encode(image: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let written = match format {
        OutputFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality)),
        // These encoders only accept 8-bit RGB(A)
        OutputFormat::Webp | OutputFormat::Gif => DynamicImage::ImageRgba8(image.to_rgba8())
            .write_to(&mut Cursor::new(&mut buf), format.image_format()),
        OutputFormat::Png => image.write_to(&mut Cursor::new(&mut buf), format.image_format()),
    };
    written.map_err(|e| Error::encode(format.as_str(), e))?;
    Ok(buf)
}
