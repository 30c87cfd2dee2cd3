//! Types shared by every album implementation.

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::types::TimeOfDay;

/// One imported photograph.
///
/// Immutable once stored: `id` is the SHA-256 of the original file, so two
/// records with the same `id` describe byte-identical files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Lower-case hex SHA-256 of the original bytes.
    pub id: String,
    pub filename: String,
    pub content_type: String,
    /// Capture time from EXIF `DateTimeOriginal`, camera local time.
    pub created: NaiveDateTime,
    /// Size of the original file in bytes.
    pub size: u64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub width: u32,
    pub height: u32,
    /// CRC-32 of the original bytes, used only for year rollups.
    pub crc: u32,
}

impl ImageRecord {
    pub fn year(&self) -> i32 {
        self.created.year()
    }

    #[cfg(test)]
    pub fn hour(&self) -> u32 {
        use chrono::Timelike;
        self.created.hour()
    }
}

/// Integrity rollup for one capture year.
///
/// `crc` combines the records' CRCs in ascending `id` order; `size` sums
/// their original byte sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearChecksum {
    pub year: i32,
    pub count: u64,
    pub crc: u32,
    pub size: u64,
}

/// Authoritative per-year record count as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearCount {
    pub year: i32,
    pub count: u64,
    pub size: u64,
}

/// Aggregate view of the records matching a [`Filter`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlbumInfo {
    pub image_count: u64,
    /// Number of distinct capture dates.
    pub date_count: u64,
    /// Bytes of stored thumbnail renditions.
    pub thumbnails_size: u64,
    /// Bytes of stored full renditions.
    pub images_size: u64,
    /// Sorted by year.
    pub years: Vec<YearCount>,
}

/// Inclusive range `from..=to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    from: i64,
    to: i64,
}

impl Interval {
    /// Returns `None` when `to < from`.
    pub fn new(from: i64, to: i64) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    pub fn single(value: i64) -> Self {
        Self {
            from: value,
            to: value,
        }
    }

    /// Ordinal page `[offset, offset + len)`; `len` must be non-zero.
    pub fn page(offset: u64, len: u64) -> Self {
        let from = offset as i64;
        Self {
            from,
            to: from + len.max(1) as i64 - 1,
        }
    }

    pub fn from(&self) -> i64 {
        self.from
    }

    pub fn to(&self) -> i64 {
        self.to
    }

    #[cfg(test)]
    pub fn is_single(&self) -> bool {
        self.from == self.to
    }

    pub fn len(&self) -> u64 {
        (self.to - self.from + 1) as u64
    }

    #[cfg(test)]
    pub fn contains(&self, value: i64) -> bool {
        value >= self.from && value <= self.to
    }
}

/// Query restriction passed to [`Album`](super::Album) operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Filter {
    pub year: Option<Interval>,
    pub time_of_day: Option<TimeOfDay>,
}

impl Filter {
    /// All records.
    pub fn all() -> Self {
        Self::default()
    }

    /// All records captured in `year`.
    pub fn year(year: i32) -> Self {
        Self {
            year: Some(Interval::single(year as i64)),
            time_of_day: None,
        }
    }

    #[cfg(test)]
    pub fn matches(&self, image: &ImageRecord) -> bool {
        self.year
            .map_or(true, |years| years.contains(image.year() as i64))
            && self
                .time_of_day
                .map_or(true, |time| time.contains(image.hour()))
    }
}
