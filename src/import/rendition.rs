//! Resized, size-capped JPEG renditions.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

use super::error::ImportError;
use crate::config::ImportSettings;

/// JPEG quality of the first encoding attempt.
const MAX_QUALITY: u8 = 80;
/// Lowest quality tried; its output is accepted whatever its size.
const MIN_QUALITY: u8 = 10;
const QUALITY_STEP: usize = 10;

/// Aspect ratio of a full-sphere 360° image.
const SPHERE_RATIO: f64 = 2.0;
/// Aspect ratio of an average regular photo.
const REGULAR_RATIO: f64 = 1.4;
/// A sphere covers about 8% of its area in a regular frame.
const SPHERE_SCALE: f64 = 12.5;

/// Pixel dimensions and byte ceiling of one rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenditionTarget {
    pub width: u32,
    pub height: u32,
    pub max_bytes: u64,
}

/// Size multiplier for wide images, where `ratio` is longer over shorter side.
pub fn size_scale(ratio: f64) -> f64 {
    if (ratio - SPHERE_RATIO).abs() < 1e-6 {
        SPHERE_SCALE
    } else if ratio > SPHERE_RATIO {
        ratio / REGULAR_RATIO
    } else {
        1.0
    }
}

fn scaled_dimensions(width: u32, height: u32, scale: f64) -> (u32, u32) {
    let scale = scale.min(1.0);
    (
        ((width as f64 * scale) as u32).max(1),
        ((height as f64 * scale) as u32).max(1),
    )
}

/// Full and thumbnail targets for an upright image of `width` x `height`.
///
/// Images are never upscaled. Panoramas get a proportionally larger full
/// rendition and byte ceiling; thumbnails are sized the same for every
/// shape.
pub fn rendition_targets(
    width: u32,
    height: u32,
    settings: &ImportSettings,
) -> (RenditionTarget, RenditionTarget) {
    let longer = width.max(height).max(1) as f64;
    let shorter = width.min(height).max(1) as f64;
    let scale = size_scale(longer / shorter);

    let (full_width, full_height) =
        scaled_dimensions(width, height, scale * settings.image_width as f64 / longer);
    let (thumb_width, thumb_height) =
        scaled_dimensions(width, height, settings.thumbnail_width as f64 / longer);

    (
        RenditionTarget {
            width: full_width,
            height: full_height,
            max_bytes: (settings.image_max_bytes as f64 * scale) as u64,
        },
        RenditionTarget {
            width: thumb_width,
            height: thumb_height,
            max_bytes: settings.thumbnail_max_bytes,
        },
    )
}

/// Resizes and re-encodes an image to fit a [`RenditionTarget`].
///
/// Runs on a blocking thread.
pub trait Codec: Send + Sync {
    fn encode(&self, image: &DynamicImage, target: &RenditionTarget)
        -> Result<Vec<u8>, ImportError>;
}

/// Lanczos resize followed by JPEG encoding at decreasing quality.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegCodec;

impl Codec for JpegCodec {
    fn encode(
        &self,
        image: &DynamicImage,
        target: &RenditionTarget,
    ) -> Result<Vec<u8>, ImportError> {
        let resized = image
            .resize_exact(target.width, target.height, FilterType::Lanczos3)
            .to_rgb8();

        for quality in (MIN_QUALITY..=MAX_QUALITY).rev().step_by(QUALITY_STEP) {
            let mut bytes = Vec::new();
            let result = JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(&resized);
            match result {
                Ok(()) if (bytes.len() as u64) < target.max_bytes || quality == MIN_QUALITY => {
                    tracing::trace!(
                        quality,
                        bytes = bytes.len(),
                        width = target.width,
                        "Encoded rendition"
                    );
                    return Ok(bytes);
                }
                Ok(()) => {}
                Err(e) if quality == MIN_QUALITY => {
                    return Err(ImportError::RenditionEncodingFailed(e.to_string()));
                }
                Err(e) => tracing::debug!(quality, "JPEG encoding failed: {}", e),
            }
        }
        Err(ImportError::RenditionEncodingFailed(
            "no quality level attempted".to_string(),
        ))
    }
}
