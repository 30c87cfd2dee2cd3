//! Recursive directory import.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::error::ImportError;
use super::ImageImporter;
use crate::progress::Progress;

/// Lower-case extensions considered for import.
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "jfif", "pjpeg", "pjp", "heif", "heic", "heifs", "heics", "tif", "tiff", "png",
];

/// Counters for one batch run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub folders: u64,
    /// Candidate files found.
    pub total: u64,
    pub imported: u64,
    /// Files whose content the album already held.
    pub existing: u64,
    pub failed: u64,
    /// Imported bytes of original files.
    pub imported_bytes: u64,
    pub interrupted: bool,
}

/// Whether `path` has one of the image extensions, ignoring case.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Human-readable decimal size (`B`, `kB`, `MB`).
pub fn format_size(bytes: u64) -> String {
    if bytes < 1_000 {
        format!("{} B", bytes)
    } else if bytes < 1_000_000 {
        format!("{:.1} kB", bytes as f64 / 1_000.0)
    } else {
        format!("{:.1} MB", bytes as f64 / 1_000_000.0)
    }
}

/// Walk `roots` and return the candidate files in name order together with
/// the number of folders visited.
fn collect_files(roots: &[PathBuf]) -> (Vec<PathBuf>, u64) {
    let mut files = Vec::new();
    let mut folders = 0;
    for root in roots {
        for entry in WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                folders += 1;
            } else if entry.file_type().is_file() && is_image_file(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    (files, folders)
}

/// Imports every image below a set of directories.
///
/// A failing file is logged and counted; it never stops the batch.
pub struct RecursiveImporter {
    importer: ImageImporter,
}

impl RecursiveImporter {
    pub fn new(importer: ImageImporter) -> Self {
        Self { importer }
    }

    pub fn importer(&self) -> &ImageImporter {
        &self.importer
    }

    /// Import every candidate file, reporting the fraction of files handled.
    pub async fn run(
        &mut self,
        roots: &[PathBuf],
        progress: &Progress<'_>,
        cancel: &CancellationToken,
    ) -> Result<ImportSummary, ImportError> {
        let walk_roots = roots.to_vec();
        let (files, folders) =
            tokio::task::spawn_blocking(move || collect_files(&walk_roots)).await?;

        let mut summary = ImportSummary {
            folders,
            total: files.len() as u64,
            ..ImportSummary::default()
        };
        tracing::debug!(folders, files = summary.total, "Collected import candidates");
        progress(0.0);

        for (done, path) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!("Shutdown requested, stopping import");
                summary.interrupted = true;
                break;
            }
            tracing::debug!("Importing {}", path.display());

            match self.importer.import_file(path).await {
                Ok(record) => {
                    summary.imported += 1;
                    summary.imported_bytes += record.size;
                }
                Err(ImportError::DuplicateContent(_)) => {
                    summary.existing += 1;
                    tracing::debug!("Already in album: {}", path.display());
                }
                Err(e) => {
                    summary.failed += 1;
                    if e.is_recoverable() {
                        tracing::warn!("Failed to import {}: {}", path.display(), e);
                    } else {
                        tracing::error!("Failed to import {}: {}", path.display(), e);
                    }
                }
            }
            progress((done + 1) as f64 / files.len() as f64);
        }

        if files.is_empty() {
            progress(1.0);
        }
        Ok(summary)
    }
}
