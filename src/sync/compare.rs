//! Year-first comparison of two albums sharing a lineage.
//!
//! Whole years are skipped when both year indexes agree; only the remaining
//! candidate years are scanned image by image.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures_util::Stream;
use tokio_util::sync::CancellationToken;

use super::error::SyncError;
use crate::album::{Album, Filter, ImageRecord, Interval, YearChecksum};
use crate::integrity::PAGE_SIZE;
use crate::progress::Progress;

/// One image present on at least one side of a candidate year.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffResult {
    pub year: i32,
    pub left: Option<ImageRecord>,
    pub right: Option<ImageRecord>,
}

impl DiffResult {
    /// True when exactly one side holds the image.
    pub fn is_conflict(&self) -> bool {
        self.left.is_some() != self.right.is_some()
    }

    pub fn record(&self) -> Option<&ImageRecord> {
        self.left.as_ref().or(self.right.as_ref())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompareOptions {
    /// Compare albums even when their identities differ.
    pub ignore_identity_mismatch: bool,
    /// Also yield images present on both sides.
    pub include_matched: bool,
}

/// What [`AlbumComparator::resolve`] did with a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    CopiedToLeft,
    CopiedToRight,
    /// The missing side already had the image, nothing was written.
    AlreadyPresent,
    /// Both sides hold the image.
    NotConflict,
}

/// Years whose rollups differ between the two indexes, ascending.
///
/// Full outer join on year: a year present on one side only is a candidate,
/// as is a year whose count, CRC or size disagree.
pub fn candidate_years(left: &[YearChecksum], right: &[YearChecksum]) -> Vec<i32> {
    let mut joined: BTreeMap<i32, (Option<&YearChecksum>, Option<&YearChecksum>)> =
        BTreeMap::new();
    for entry in left {
        joined.entry(entry.year).or_default().0 = Some(entry);
    }
    for entry in right {
        joined.entry(entry.year).or_default().1 = Some(entry);
    }

    joined
        .into_iter()
        .filter(|(_, (l, r))| match (l, r) {
            (Some(l), Some(r)) => (l.count, l.crc, l.size) != (r.count, r.crc, r.size),
            _ => true,
        })
        .map(|(year, _)| year)
        .collect()
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), SyncError> {
    if cancel.is_cancelled() {
        Err(SyncError::Cancelled)
    } else {
        Ok(())
    }
}

pub struct AlbumComparator {
    left: Arc<dyn Album>,
    right: Arc<dyn Album>,
}

impl AlbumComparator {
    pub fn new(left: Arc<dyn Album>, right: Arc<dyn Album>) -> Self {
        Self { left, right }
    }

    pub fn left(&self) -> &dyn Album {
        self.left.as_ref()
    }

    pub fn right(&self) -> &dyn Album {
        self.right.as_ref()
    }

    /// Fail unless both albums carry the same identity.
    pub async fn verify_identity(&self, ignore_mismatch: bool) -> Result<(), SyncError> {
        if ignore_mismatch {
            return Ok(());
        }
        let left = self.left.metadata().await?;
        let right = self.right.metadata().await?;
        if left.id != right.id {
            return Err(SyncError::AlbumIdentityMismatch {
                left: left.id,
                right: right.id,
            });
        }
        Ok(())
    }

    /// Candidate years from the stored indexes.
    ///
    /// Assumes both indexes were refreshed by an integrity pass.
    pub async fn candidate_years(&self) -> Result<Vec<i32>, SyncError> {
        let left = self.left.year_index().await?;
        let right = self.right.year_index().await?;
        Ok(candidate_years(&left, &right))
    }

    /// Lazily diff every candidate year, ascending.
    ///
    /// Conflicts are always yielded; matched images only with
    /// [`CompareOptions::include_matched`]. Cancellation is checked before
    /// every image and ends the stream with [`SyncError::Cancelled`].
    pub fn compare<'a>(
        &'a self,
        options: CompareOptions,
        progress: &'a Progress<'a>,
        cancel: &'a CancellationToken,
    ) -> impl Stream<Item = Result<DiffResult, SyncError>> + 'a {
        async_stream::try_stream! {
            self.verify_identity(options.ignore_identity_mismatch).await?;

            let years = self.candidate_years().await?;
            tracing::debug!(years = ?years, "Comparing candidate years");
            let year_count = years.len() as f64;

            for (i, year) in years.into_iter().enumerate() {
                let filter = Filter::year(year);
                let left_total = self.left.info(&filter).await?.image_count;
                let right_total = self.right.info(&filter).await?.image_count;
                let total = (left_total + right_total).max(1) as f64;
                let report = |scanned: u64| {
                    progress((i as f64 + (scanned as f64 / total).min(1.0)) / year_count)
                };

                let mut seen: HashSet<String> = HashSet::new();
                let mut scanned = 0u64;

                let mut offset = 0;
                loop {
                    report(scanned);
                    let page = self.left.list_images(&filter, Interval::page(offset, PAGE_SIZE)).await?;
                    let fetched = page.len() as u64;
                    for image in page {
                        check_cancelled(cancel)?;
                        scanned += 1;
                        let other = self.right.get_image(&image.id).await?;
                        seen.insert(image.id.clone());
                        if other.is_some() && !options.include_matched {
                            continue;
                        }
                        yield DiffResult { year, left: Some(image), right: other };
                    }
                    if fetched < PAGE_SIZE {
                        break;
                    }
                    offset += PAGE_SIZE;
                }

                offset = 0;
                loop {
                    report(scanned);
                    let page = self.right.list_images(&filter, Interval::page(offset, PAGE_SIZE)).await?;
                    let fetched = page.len() as u64;
                    for image in page {
                        check_cancelled(cancel)?;
                        scanned += 1;
                        if seen.contains(&image.id) {
                            continue;
                        }
                        let other = self.left.get_image(&image.id).await?;
                        if other.is_some() && !options.include_matched {
                            continue;
                        }
                        yield DiffResult { year, left: other, right: Some(image) };
                    }
                    if fetched < PAGE_SIZE {
                        break;
                    }
                    offset += PAGE_SIZE;
                }
            }
            progress(1.0);
        }
    }

    /// Copy a conflicting image to the side that lacks it.
    ///
    /// The record metadata travels unchanged together with both renditions.
    /// Re-resolving is a no-op.
    pub async fn resolve(&self, diff: &DiffResult) -> Result<Resolution, SyncError> {
        let (record, source, target, copied) = match (&diff.left, &diff.right) {
            (Some(left), None) => (left, &self.left, &self.right, Resolution::CopiedToRight),
            (None, Some(right)) => (right, &self.right, &self.left, Resolution::CopiedToLeft),
            _ => return Ok(Resolution::NotConflict),
        };

        if target.image_exists(&record.id).await? {
            return Ok(Resolution::AlreadyPresent);
        }
        let thumbnail = source.get_thumbnail(&record.id).await?;
        let data = source.get_data(&record.id).await?;
        if target.insert(record, &thumbnail, &data).await? {
            tracing::debug!(id = %record.id, year = diff.year, ?copied, "Copied image");
            Ok(copied)
        } else {
            Ok(Resolution::AlreadyPresent)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album::memory::MemoryAlbum;
    use crate::album::AlbumMetadata;
    use crate::integrity::IntegrityChecker;
    use crate::progress;
    use chrono::NaiveDate;
    use futures_util::TryStreamExt;
    use std::sync::Mutex;

    fn record(id: &str, year: i32, crc: u32) -> ImageRecord {
        ImageRecord {
            id: id.to_string(),
            filename: format!("{}.jpg", id),
            content_type: "image/jpeg".to_string(),
            created: NaiveDate::from_ymd_opt(year, 7, 14)
                .unwrap()
                .and_hms_opt(15, 0, 0)
                .unwrap(),
            size: 100,
            latitude: Some(50.08),
            longitude: Some(14.42),
            width: 10,
            height: 10,
            crc,
        }
    }

    async fn album_with(meta: &AlbumMetadata, records: &[ImageRecord]) -> Arc<MemoryAlbum> {
        let album = Arc::new(MemoryAlbum::sibling(meta));
        for r in records {
            let thumb = format!("thumb-{}", r.id);
            let data = format!("data-{}", r.id);
            album
                .insert(r, thumb.as_bytes(), data.as_bytes())
                .await
                .unwrap();
        }
        IntegrityChecker::new(album.as_ref())
            .check_all(&progress::ignore, &CancellationToken::new())
            .await
            .unwrap();
        album
    }

    async fn refresh(album: &dyn Album) {
        IntegrityChecker::new(album)
            .check_all(&progress::ignore, &CancellationToken::new())
            .await
            .unwrap();
    }

    async fn diff(
        comparator: &AlbumComparator,
        options: CompareOptions,
    ) -> Result<Vec<DiffResult>, SyncError> {
        let cancel = CancellationToken::new();
        comparator
            .compare(options, &progress::ignore, &cancel)
            .try_collect()
            .await
    }

    fn entry(year: i32, count: u64, crc: u32) -> YearChecksum {
        YearChecksum {
            year,
            count,
            crc,
            size: 0,
        }
    }

    #[test]
    fn test_candidate_years_outer_join() {
        let left = [entry(2000, 1, 1), entry(2001, 2, 2), entry(2002, 1, 3)];
        let right = [entry(2001, 2, 2), entry(2002, 1, 4), entry(2004, 1, 5)];
        assert_eq!(candidate_years(&left, &right), vec![2000, 2002, 2004]);
    }

    #[test]
    fn test_candidate_years_count_only_difference() {
        let left = [entry(2000, 1, 9)];
        let right = [entry(2000, 2, 9)];
        assert_eq!(candidate_years(&left, &right), vec![2000]);
    }

    #[tokio::test]
    async fn test_compare_with_itself_has_no_conflicts() {
        let meta = AlbumMetadata::create("Test");
        let album = album_with(&meta, &[record("a", 2000, 1), record("b", 2001, 2)]).await;
        let comparator = AlbumComparator::new(album.clone(), album);
        assert!(diff(&comparator, CompareOptions::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_compare_finds_one_sided_images() {
        let meta = AlbumMetadata::create("Test");
        let left = album_with(&meta, &[record("a", 2000, 1), record("b", 2001, 2)]).await;
        let right = album_with(&meta, &[record("b", 2001, 2), record("c", 2002, 3)]).await;
        let comparator = AlbumComparator::new(left, right);

        let diffs = diff(&comparator, CompareOptions::default()).await.unwrap();
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].year, 2000);
        assert_eq!(diffs[0].left.as_ref().map(|r| r.id.as_str()), Some("a"));
        assert!(diffs[0].right.is_none());
        assert_eq!(diffs[1].year, 2002);
        assert!(diffs[1].left.is_none());
        assert!(diffs.iter().all(DiffResult::is_conflict));
    }

    #[tokio::test]
    async fn test_include_matched_yields_shared_images() {
        let meta = AlbumMetadata::create("Test");
        let left = album_with(&meta, &[record("a", 2000, 1), record("b", 2000, 2)]).await;
        let right = album_with(&meta, &[record("b", 2000, 2)]).await;
        let comparator = AlbumComparator::new(left, right);

        let options = CompareOptions {
            include_matched: true,
            ..CompareOptions::default()
        };
        let diffs = diff(&comparator, options).await.unwrap();
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs.iter().filter(|d| d.is_conflict()).count(), 1);
        let matched = diffs.iter().find(|d| !d.is_conflict()).unwrap();
        assert_eq!(matched.left, matched.right);
    }

    #[tokio::test]
    async fn test_resolve_converges() {
        let meta = AlbumMetadata::create("Test");
        let left = album_with(&meta, &[record("a", 2000, 1), record("b", 2001, 2)]).await;
        let right = album_with(&meta, &[record("b", 2001, 2), record("c", 2002, 3)]).await;
        let comparator = AlbumComparator::new(left.clone(), right.clone());

        let diffs = diff(&comparator, CompareOptions::default()).await.unwrap();
        let mut outcomes = Vec::new();
        for d in &diffs {
            outcomes.push(comparator.resolve(d).await.unwrap());
        }
        assert_eq!(
            outcomes,
            vec![Resolution::CopiedToRight, Resolution::CopiedToLeft]
        );
        assert_eq!(right.get_data("a").await.unwrap(), b"data-a");
        assert_eq!(left.get_thumbnail("c").await.unwrap(), b"thumb-c");
        assert_eq!(left.get_image("c").await.unwrap(), right.get_image("c").await.unwrap());

        refresh(left.as_ref()).await;
        refresh(right.as_ref()).await;
        assert!(diff(&comparator, CompareOptions::default())
            .await
            .unwrap()
            .is_empty());

        // Replaying an old conflict writes nothing.
        assert_eq!(
            comparator.resolve(&diffs[0]).await.unwrap(),
            Resolution::AlreadyPresent
        );
        assert_eq!(left.len(), 3);
        assert_eq!(right.len(), 3);
    }

    #[tokio::test]
    async fn test_resolve_ignores_matched() {
        let meta = AlbumMetadata::create("Test");
        let left = album_with(&meta, &[]).await;
        let comparator = AlbumComparator::new(left.clone(), left);
        let both = DiffResult {
            year: 2000,
            left: Some(record("a", 2000, 1)),
            right: Some(record("a", 2000, 1)),
        };
        assert_eq!(
            comparator.resolve(&both).await.unwrap(),
            Resolution::NotConflict
        );
    }

    #[tokio::test]
    async fn test_identity_mismatch() {
        let left = album_with(&AlbumMetadata::create("A"), &[record("a", 2000, 1)]).await;
        let right = album_with(&AlbumMetadata::create("B"), &[]).await;
        let comparator = AlbumComparator::new(left, right);

        assert!(matches!(
            diff(&comparator, CompareOptions::default()).await,
            Err(SyncError::AlbumIdentityMismatch { .. })
        ));

        let options = CompareOptions {
            ignore_identity_mismatch: true,
            ..CompareOptions::default()
        };
        assert_eq!(diff(&comparator, options).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_compare_stops() {
        let meta = AlbumMetadata::create("Test");
        let left = album_with(&meta, &[record("a", 2000, 1)]).await;
        let right = album_with(&meta, &[]).await;
        let comparator = AlbumComparator::new(left, right);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<Vec<DiffResult>, SyncError> = comparator
            .compare(CompareOptions::default(), &progress::ignore, &cancel)
            .try_collect()
            .await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_completes() {
        let meta = AlbumMetadata::create("Test");
        let left = album_with(
            &meta,
            &[record("a", 2000, 1), record("b", 2001, 2), record("c", 2001, 3)],
        )
        .await;
        let right = album_with(&meta, &[record("d", 2003, 4)]).await;
        let comparator = AlbumComparator::new(left, right);

        let seen = Mutex::new(Vec::new());
        let report = |f: f64| seen.lock().unwrap().push(f);
        let cancel = CancellationToken::new();
        let diffs: Vec<DiffResult> = comparator
            .compare(CompareOptions::default(), &report, &cancel)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(diffs.len(), 4);

        let seen = seen.into_inner().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last().copied(), Some(1.0));
    }
}
