//! Decoding and EXIF extraction for imported files.

use std::io::Cursor;

use chrono::NaiveDateTime;
use exif::{In, Tag, Value};
use image::{DynamicImage, ImageError};

use super::error::ImportError;

/// Layout of EXIF date/time fields.
const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// EXIF orientation, normalized into rotations and flips.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Normal,
    CW90,
    CW180,
    CW270,
    MirroredVertical,
    MirroredHorizontal,
    MirroredHorizontalAnd90CW,
    MirroredHorizontalAnd270CW,
}

impl Orientation {
    /// Rotate and flip `image` so that it displays upright.
    #[must_use]
    pub fn apply(&self, image: DynamicImage) -> DynamicImage {
        match self {
            Self::Normal => image,
            Self::CW90 => image.rotate90(),
            Self::CW180 => image.rotate180(),
            Self::CW270 => image.rotate270(),
            Self::MirroredHorizontal => image.fliph(),
            Self::MirroredVertical => image.flipv(),
            Self::MirroredHorizontalAnd90CW => image.fliph().rotate90(),
            Self::MirroredHorizontalAnd270CW => image.fliph().rotate270(),
        }
    }
}

impl From<u32> for Orientation {
    fn from(value: u32) -> Self {
        match value {
            2 => Self::MirroredHorizontal,
            3 => Self::CW180,
            4 => Self::MirroredVertical,
            5 => Self::MirroredHorizontalAnd270CW,
            6 => Self::CW90,
            7 => Self::MirroredHorizontalAnd90CW,
            8 => Self::CW270,
            _ => Self::Normal,
        }
    }
}

/// A decoded file together with the metadata the pipeline needs.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Pixels as stored in the file, before orientation is applied.
    pub image: DynamicImage,
    pub content_type: String,
    pub created: NaiveDateTime,
    /// `(latitude, longitude)` in signed decimal degrees.
    pub location: Option<(f64, f64)>,
    pub orientation: Orientation,
}

/// Decodes raw file bytes and reads their capture metadata.
///
/// Runs on a blocking thread.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<DecodedImage, ImportError>;
}

/// Extractor backed by the `image` decoders and EXIF blocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifExtractor;

impl MetadataExtractor for ExifExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<DecodedImage, ImportError> {
        let format = image::guess_format(bytes).map_err(|_| ImportError::UnrecognizedFormat)?;
        let image = image::load_from_memory_with_format(bytes, format).map_err(|e| match e {
            ImageError::Unsupported(_) => ImportError::UnrecognizedFormat,
            other => ImportError::CorruptContent(other.to_string()),
        })?;

        let exif = exif::Reader::new()
            .read_from_container(&mut Cursor::new(bytes))
            .map_err(|e| ImportError::MissingRequiredMetadata(format!("no EXIF block ({})", e)))?;

        let created = ascii_field(&exif, Tag::DateTimeOriginal)
            .as_deref()
            .and_then(parse_exif_datetime)
            .ok_or_else(|| {
                ImportError::MissingRequiredMetadata("capture date and time".to_string())
            })?;

        let location = coordinate(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef)
            .zip(coordinate(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef));

        let orientation = exif
            .get_field(Tag::Orientation, In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .map(Orientation::from)
            .unwrap_or_default();

        Ok(DecodedImage {
            image,
            content_type: format.to_mime_type().to_string(),
            created,
            location,
            orientation,
        })
    }
}

fn ascii_field(exif: &exif::Exif, tag: Tag) -> Option<String> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(values) => values
            .first()
            .map(|v| String::from_utf8_lossy(v).into_owned()),
        _ => None,
    }
}

fn coordinate(exif: &exif::Exif, tag: Tag, reference: Tag) -> Option<f64> {
    let parts: Vec<f64> = match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Rational(values) => values.iter().map(|r| r.to_f64()).collect(),
        _ => return None,
    };
    dms_to_degrees(&parts, &ascii_field(exif, reference)?)
}

/// Parse an EXIF `YYYY:MM:DD HH:MM:SS` timestamp.
pub fn parse_exif_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    NaiveDateTime::parse_from_str(text, EXIF_DATETIME_FORMAT).ok()
}

/// Convert degrees/minutes/seconds to signed decimal degrees.
///
/// Southern and western hemisphere references flip the sign.
pub fn dms_to_degrees(parts: &[f64], reference: &str) -> Option<f64> {
    if parts.is_empty() {
        return None;
    }
    let magnitude: f64 = parts
        .iter()
        .zip([1.0, 60.0, 3600.0])
        .map(|(value, divisor)| value / divisor)
        .sum();
    if !magnitude.is_finite() {
        return None;
    }
    let reference = reference.trim_matches(char::from(0)).trim();
    if reference.eq_ignore_ascii_case("S") || reference.eq_ignore_ascii_case("W") {
        Some(-magnitude)
    } else {
        Some(magnitude)
    }
}
