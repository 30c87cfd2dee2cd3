//! Pairwise album synchronization.
//!
//! [`AlbumComparator`] finds the images held by only one of two albums;
//! [`AlbumSynchronizer`] wraps it with integrity passes and resolves every
//! conflict by copying the image to the side that lacks it.

pub mod compare;
pub mod error;

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::{pin_mut, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::album::Album;
use crate::integrity::IntegrityChecker;
use crate::progress::{self, Progress};

pub use compare::{AlbumComparator, CompareOptions, Resolution};
pub use error::SyncError;

/// Outcome of a synchronization run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    /// Years in which at least one image was copied, ascending.
    pub years: Vec<i32>,
    /// Images found on both sides within the compared years.
    pub matched: u64,
    pub copied_to_left: u64,
    pub copied_to_right: u64,
}

impl SyncSummary {
    pub fn copied(&self) -> u64 {
        self.copied_to_left + self.copied_to_right
    }
}

pub struct AlbumSynchronizer {
    comparator: AlbumComparator,
}

impl AlbumSynchronizer {
    pub fn new(left: Arc<dyn Album>, right: Arc<dyn Album>) -> Self {
        Self {
            comparator: AlbumComparator::new(left, right),
        }
    }

    async fn check_integrity(
        album: &dyn Album,
        progress: &Progress<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let report = IntegrityChecker::new(album)
            .check_all(progress, cancel)
            .await?;
        if report.interrupted {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    /// Bring both albums to the union of their images.
    ///
    /// Progress: the integrity passes take the first tenth, comparison and
    /// copying the next eight tenths, and recomputing the touched years on
    /// both sides the last tenth.
    pub async fn run(
        &self,
        ignore_identity_mismatch: bool,
        progress: &Progress<'_>,
        cancel: &CancellationToken,
    ) -> Result<SyncSummary, SyncError> {
        let left = self.comparator.left();
        let right = self.comparator.right();
        self.comparator
            .verify_identity(ignore_identity_mismatch)
            .await?;

        Self::check_integrity(left, &progress::scaled(progress, 0.0, 0.05), cancel).await?;
        Self::check_integrity(right, &progress::scaled(progress, 0.05, 0.05), cancel).await?;

        let mut summary = SyncSummary::default();
        let mut touched = BTreeSet::new();
        {
            let compare_progress = progress::scaled(progress, 0.1, 0.8);
            let options = CompareOptions {
                ignore_identity_mismatch: true,
                include_matched: true,
            };
            let diffs = self.comparator.compare(options, &compare_progress, cancel);
            pin_mut!(diffs);

            while let Some(diff) = diffs.next().await {
                let diff = diff?;
                match self.comparator.resolve(&diff).await? {
                    Resolution::NotConflict | Resolution::AlreadyPresent => summary.matched += 1,
                    Resolution::CopiedToLeft => {
                        summary.copied_to_left += 1;
                        touched.insert(diff.year);
                    }
                    Resolution::CopiedToRight => {
                        summary.copied_to_right += 1;
                        touched.insert(diff.year);
                    }
                }
            }
        }

        let year_count = touched.len().max(1) as f64;
        for (i, year) in touched.iter().enumerate() {
            IntegrityChecker::new(left).recompute(*year).await?;
            IntegrityChecker::new(right).recompute(*year).await?;
            progress(0.9 + 0.1 * (i + 1) as f64 / year_count);
        }
        progress(1.0);

        summary.years = touched.into_iter().collect();
        tracing::info!(
            years = summary.years.len(),
            copied_to_left = summary.copied_to_left,
            copied_to_right = summary.copied_to_right,
            "Synchronization finished"
        );
        Ok(summary)
    }
}
