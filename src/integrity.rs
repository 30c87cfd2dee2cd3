//! Year integrity index.
//!
//! Each album keeps one [`YearChecksum`] per capture year. An entry is only
//! trusted while its `count` matches the store's authoritative count for that
//! year; anything else is stale and gets rebuilt from the per-record CRCs.

use std::collections::{BTreeMap, BTreeSet};

use tokio_util::sync::CancellationToken;

use crate::album::{Album, AlbumError, Filter, ImageRecord, Interval, YearChecksum, YearCount};
use crate::checksum::Rollup;
use crate::progress::Progress;

/// Records fetched per store round trip during year scans.
pub const PAGE_SIZE: u64 = 1024;

/// Outcome of a full integrity pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IntegrityReport {
    /// Years whose entry was rebuilt or removed, ascending.
    pub recomputed: Vec<i32>,
    /// Set when cancellation stopped the pass before every stale year was
    /// handled.
    pub interrupted: bool,
}

/// Years whose index entry cannot be trusted.
///
/// A year is stale when its entry is missing or its count disagrees with the
/// authoritative count. Entries for years that no longer hold any record are
/// stale too.
pub fn find_stale_years(authoritative: &[YearCount], index: &[YearChecksum]) -> Vec<i32> {
    let stored: BTreeMap<i32, u64> = index.iter().map(|e| (e.year, e.count)).collect();
    let present: BTreeSet<i32> = authoritative.iter().map(|y| y.year).collect();

    let mut stale: BTreeSet<i32> = authoritative
        .iter()
        .filter(|y| stored.get(&y.year) != Some(&y.count))
        .map(|y| y.year)
        .collect();
    stale.extend(stored.keys().filter(|year| !present.contains(year)));

    stale.into_iter().collect()
}

/// Read every record of `year` through paged scans.
pub async fn scan_year(album: &dyn Album, year: i32) -> Result<Vec<ImageRecord>, AlbumError> {
    let filter = Filter::year(year);
    let mut records = Vec::new();
    let mut offset = 0;
    loop {
        let page = album
            .list_images(&filter, Interval::page(offset, PAGE_SIZE))
            .await?;
        let fetched = page.len() as u64;
        records.extend(page);
        if fetched < PAGE_SIZE {
            return Ok(records);
        }
        offset += PAGE_SIZE;
    }
}

/// Maintains the year index of one album.
pub struct IntegrityChecker<'a> {
    album: &'a dyn Album,
}

impl<'a> IntegrityChecker<'a> {
    pub fn new(album: &'a dyn Album) -> Self {
        Self { album }
    }

    pub async fn stale_years(&self) -> Result<Vec<i32>, AlbumError> {
        let info = self.album.info(&Filter::all()).await?;
        let index = self.album.year_index().await?;
        Ok(find_stale_years(&info.years, &index))
    }

    /// Rebuild the entry for `year` from its records.
    ///
    /// Returns the stored entry, or `None` when the year is empty and its
    /// entry was removed.
    pub async fn recompute(&self, year: i32) -> Result<Option<YearChecksum>, AlbumError> {
        let mut records = scan_year(self.album, year).await?;
        records.sort_by(|a, b| a.id.cmp(&b.id));

        let count = records.len() as u64;
        match Rollup::fold(records.iter().map(|r| (r.crc, r.size))) {
            None => {
                self.album.remove_year_index(year).await?;
                tracing::debug!(year, "Removed index entry for empty year");
                Ok(None)
            }
            Some(rollup) => {
                let entry = YearChecksum {
                    year,
                    count,
                    crc: rollup.crc,
                    size: rollup.size,
                };
                self.album.store_year_index(&entry).await?;
                tracing::debug!(
                    year,
                    count,
                    crc = format_args!("{:08x}", entry.crc),
                    "Recomputed year checksum"
                );
                Ok(Some(entry))
            }
        }
    }

    /// Find every stale year and rebuild it.
    ///
    /// Cancellation is checked between years; the entries already rebuilt
    /// stay valid.
    pub async fn check_all(
        &self,
        progress: &Progress<'_>,
        cancel: &CancellationToken,
    ) -> Result<IntegrityReport, AlbumError> {
        let stale = self.stale_years().await?;
        let mut report = IntegrityReport::default();
        if stale.is_empty() {
            progress(1.0);
            return Ok(report);
        }

        tracing::debug!(years = ?stale, "Found stale years");
        for (i, year) in stale.iter().enumerate() {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }
            self.recompute(*year).await?;
            report.recomputed.push(*year);
            progress((i + 1) as f64 / stale.len() as f64);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album::memory::MemoryAlbum;
    use crate::album::AlbumMetadata;
    use crate::progress;
    use chrono::NaiveDate;

    fn record(id: &str, year: i32, crc: u32, size: u64) -> ImageRecord {
        ImageRecord {
            id: id.to_string(),
            filename: format!("{}.jpg", id),
            content_type: "image/jpeg".to_string(),
            created: NaiveDate::from_ymd_opt(year, 3, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            size,
            latitude: None,
            longitude: None,
            width: 10,
            height: 10,
            crc,
        }
    }

    fn year_count(year: i32, count: u64) -> YearCount {
        YearCount {
            year,
            count,
            size: 0,
        }
    }

    fn entry(year: i32, count: u64, crc: u32) -> YearChecksum {
        YearChecksum {
            year,
            count,
            crc,
            size: 0,
        }
    }

    fn album() -> MemoryAlbum {
        MemoryAlbum::new(AlbumMetadata::create("Test"))
    }

    #[test]
    fn test_find_stale_years() {
        let authoritative = [year_count(2000, 2), year_count(2001, 4), year_count(2002, 4)];
        let index = [entry(2000, 2, 0x1234), entry(2001, 3, 0), entry(2003, 1, 0)];
        assert_eq!(
            find_stale_years(&authoritative, &index),
            vec![2001, 2002, 2003]
        );
    }

    #[test]
    fn test_find_stale_years_all_fresh() {
        let authoritative = [year_count(2000, 2)];
        let index = [entry(2000, 2, 7)];
        assert!(find_stale_years(&authoritative, &index).is_empty());
    }

    #[tokio::test]
    async fn test_recompute_two_records() {
        let album = album();
        album
            .insert(&record("b", 2001, 0x83DDB0B5, 10), b"t", b"d")
            .await
            .unwrap();
        album
            .insert(&record("a", 2001, 0xA684C7C6, 10), b"t", b"d")
            .await
            .unwrap();

        let checker = IntegrityChecker::new(&album);
        let entry = checker.recompute(2001).await.unwrap().unwrap();
        assert_eq!(
            entry,
            YearChecksum {
                year: 2001,
                count: 2,
                crc: 0xD9D0CDA6,
                size: 20
            }
        );
        assert_eq!(album.year_index().await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn test_recompute_single_record_is_trivial() {
        let album = album();
        album
            .insert(&record("a", 1999, 0xCAFEBABE, 42), b"t", b"d")
            .await
            .unwrap();
        let entry = IntegrityChecker::new(&album)
            .recompute(1999)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.crc, 0xCAFEBABE);
        assert_eq!(entry.size, 42);
        assert_eq!(entry.count, 1);
    }

    #[tokio::test]
    async fn test_recompute_then_not_stale() {
        let album = album();
        for (i, year) in [2000, 2000, 2001, 2005].iter().enumerate() {
            album
                .insert(&record(&format!("id{}", i), *year, i as u32 * 77, 5), b"t", b"d")
                .await
                .unwrap();
        }
        let checker = IntegrityChecker::new(&album);
        assert_eq!(checker.stale_years().await.unwrap(), vec![2000, 2001, 2005]);

        checker.recompute(2001).await.unwrap();
        assert_eq!(checker.stale_years().await.unwrap(), vec![2000, 2005]);
    }

    #[tokio::test]
    async fn test_orphaned_entry_is_deleted() {
        let album = album();
        album.store_year_index(&entry(1990, 3, 1)).await.unwrap();

        let checker = IntegrityChecker::new(&album);
        assert_eq!(checker.stale_years().await.unwrap(), vec![1990]);
        assert_eq!(checker.recompute(1990).await.unwrap(), None);
        assert!(album.year_index().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_check_all_refreshes_every_year() {
        let album = album();
        album
            .insert(&record("a", 2010, 1, 1), b"t", b"d")
            .await
            .unwrap();
        album
            .insert(&record("b", 2011, 2, 1), b"t", b"d")
            .await
            .unwrap();
        album.store_year_index(&entry(2003, 1, 0)).await.unwrap();

        let checker = IntegrityChecker::new(&album);
        let report = checker
            .check_all(&progress::ignore, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.recomputed, vec![2003, 2010, 2011]);
        assert!(!report.interrupted);
        assert!(checker.stale_years().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_check_all_stops_when_cancelled() {
        let album = album();
        album
            .insert(&record("a", 2010, 1, 1), b"t", b"d")
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = IntegrityChecker::new(&album)
            .check_all(&progress::ignore, &cancel)
            .await
            .unwrap();
        assert!(report.interrupted);
        assert!(report.recomputed.is_empty());
        assert!(album.year_index().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_year_crosses_page_boundary() {
        let album = album();
        for i in 0..(PAGE_SIZE + 3) {
            album
                .insert(&record(&format!("{:05}", i), 2020, i as u32, 1), b"", b"")
                .await
                .unwrap();
        }
        let records = scan_year(&album, 2020).await.unwrap();
        assert_eq!(records.len() as u64, PAGE_SIZE + 3);
    }
}
