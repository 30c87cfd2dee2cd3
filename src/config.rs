use std::path::PathBuf;

use crate::album::Interval;
use crate::cli::ImportArgs;

pub const DEFAULT_IMAGE_WIDTH: u32 = 1000;
pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 100;
pub const DEFAULT_IMAGE_MAX_BYTES: u64 = 100_000;
pub const DEFAULT_THUMBNAIL_MAX_BYTES: u64 = 10_000;

/// Rendition targets consumed by the import pipeline.
/// Decoupled from CLI parsing so the pipeline can be tested independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSettings {
    /// Target length of the longer side of the full rendition, in pixels.
    pub image_width: u32,
    /// Target length of the longer side of the thumbnail, in pixels.
    pub thumbnail_width: u32,
    /// Byte ceiling of the full rendition for regular-ratio images.
    pub image_max_bytes: u64,
    pub thumbnail_max_bytes: u64,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            image_width: DEFAULT_IMAGE_WIDTH,
            thumbnail_width: DEFAULT_THUMBNAIL_WIDTH,
            image_max_bytes: DEFAULT_IMAGE_MAX_BYTES,
            thumbnail_max_bytes: DEFAULT_THUMBNAIL_MAX_BYTES,
        }
    }
}

impl ImportSettings {
    pub fn from_args(args: &ImportArgs) -> anyhow::Result<Self> {
        let settings = Self {
            image_width: args.image_width,
            thumbnail_width: args.thumbnail_width,
            image_max_bytes: args.image_max_bytes,
            thumbnail_max_bytes: args.thumbnail_max_bytes,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("--image-width", self.image_width as u64),
            ("--thumbnail-width", self.thumbnail_width as u64),
            ("--image-max-bytes", self.image_max_bytes),
            ("--thumbnail-max-bytes", self.thumbnail_max_bytes),
        ] {
            if value == 0 {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }
        Ok(())
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Parse a year filter: a single year (`2019`) or an inclusive range
/// (`2015..2019`).
pub fn parse_year_range(s: &str) -> anyhow::Result<Interval> {
    let parse_year = |part: &str| -> anyhow::Result<i64> {
        part.trim()
            .parse::<i64>()
            .map_err(|_| anyhow::anyhow!("Cannot parse '{}' as a year", part.trim()))
    };

    match s.split_once("..") {
        None => Ok(Interval::single(parse_year(s)?)),
        Some((from, to)) => {
            let (from, to) = (parse_year(from)?, parse_year(to)?);
            Interval::new(from, to).ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid year range '{}': {} is after {}. Expected FROM..TO (2015..2019)",
                    s,
                    from,
                    to
                )
            })
        }
    }
}
