//! pocketalbum-rs: content-addressed photo albums in a single SQLite file.
//!
//! Images are keyed by the SHA-256 of their bytes and grouped by capture
//! year. Each year keeps a CRC-32 rollup combined from the per-image CRCs,
//! which lets two copies of the same album be compared year by year and
//! synchronized by copying only the images one side is missing.

#![warn(clippy::all)]

mod album;
mod checksum;
mod cli;
mod config;
mod import;
mod integrity;
mod progress;
mod shutdown;
mod sync;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use futures_util::{pin_mut, Stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use album::{Album, AlbumInfo, AlbumMetadata, Filter, ImageRecord, SqliteAlbum, YearChecksum};
use cli::{Cli, Command};
use import::batch::format_size;
use import::{ImageImporter, RecursiveImporter};
use integrity::{IntegrityChecker, IntegrityReport};
use sync::compare::DiffResult;
use sync::{AlbumComparator, AlbumSynchronizer, CompareOptions, SyncError};

async fn open_album(path: &str) -> anyhow::Result<Arc<dyn Album>> {
    let path = config::expand_tilde(path);
    let album = SqliteAlbum::open(&path).await?;
    tracing::debug!(path = %album.path().display(), "Opened album");
    Ok(Arc::new(album))
}

/// Rebuild stale year checksums behind a progress bar.
async fn check_integrity(
    album: &dyn Album,
    label: &str,
    no_progress_bar: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<IntegrityReport> {
    let pb = progress::create_fraction_bar(no_progress_bar);
    pb.set_message(format!("Checking {}", label));
    let report = IntegrityChecker::new(album)
        .check_all(&progress::bar_reporter(&pb), cancel)
        .await?;
    pb.finish_and_clear();
    if report.interrupted {
        anyhow::bail!("Integrity check of {} interrupted", label);
    }
    Ok(report)
}

/// Run the create command.
async fn run_create(album: &str, name: &str, description: Option<String>) -> anyhow::Result<()> {
    let path = config::expand_tilde(album);
    let mut metadata = AlbumMetadata::create(name);
    metadata.description = description;

    SqliteAlbum::create(&path, &metadata).await?;
    println!("Created album \"{}\" at {}", metadata.name, path.display());
    println!("  Id: {}", metadata.id);
    Ok(())
}

/// Run the import command.
async fn run_import(
    album: &str,
    directories: &[String],
    settings: &cli::ImportArgs,
    no_progress_bar: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let settings = config::ImportSettings::from_args(settings)?;
    let roots: Vec<PathBuf> = directories.iter().map(|d| config::expand_tilde(d)).collect();
    for root in &roots {
        if !root.is_dir() {
            anyhow::bail!("{} is not a directory", root.display());
        }
    }

    let album = open_album(album).await?;
    tracing::info!(
        directories = roots.len(),
        image_width = settings.image_width,
        thumbnail_width = settings.thumbnail_width,
        "Starting import"
    );

    let pb = progress::create_fraction_bar(no_progress_bar);
    pb.set_message("Importing");
    let mut batch = RecursiveImporter::new(ImageImporter::new(album.clone(), settings));
    let summary = batch
        .run(&roots, &progress::bar_reporter(&pb), cancel)
        .await;
    pb.finish_and_clear();
    let summary = summary?;
    tracing::debug!(
        years = batch.importer().invalidated_years().len(),
        "Year checksums invalidated by this import"
    );

    println!("Import finished:");
    println!("  Folders:  {}", summary.folders);
    println!("  Found:    {}", summary.total);
    println!(
        "  Imported: {} ({})",
        summary.imported,
        format_size(summary.imported_bytes)
    );
    println!("  Existing: {}", summary.existing);
    println!("  Failed:   {}", summary.failed);

    if summary.interrupted {
        println!("Import interrupted; run the same command again to continue.");
        return Ok(());
    }

    let report = check_integrity(album.as_ref(), "album", no_progress_bar, cancel).await?;
    if !report.recomputed.is_empty() {
        println!("  Updated checksums for {} year(s)", report.recomputed.len());
    }
    Ok(())
}

/// Run the check command.
async fn run_check(
    album: &str,
    no_progress_bar: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let album = open_album(album).await?;
    let report = check_integrity(album.as_ref(), "album", no_progress_bar, cancel).await?;

    if report.recomputed.is_empty() {
        println!("All year checksums are up to date.");
        return Ok(());
    }
    let index = album.year_index().await?;
    println!("Recomputed {} year(s):", report.recomputed.len());
    for year in &report.recomputed {
        match index.iter().find(|entry| entry.year == *year) {
            Some(entry) => println!(
                "  {}: {} images, {}, crc {:08x}",
                year,
                entry.count,
                format_size(entry.size),
                entry.crc
            ),
            None => println!("  {}: removed (no images)", year),
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct InfoReport {
    metadata: AlbumMetadata,
    info: AlbumInfo,
    year_index: Vec<YearChecksum>,
}

/// Run the info command.
async fn run_info(
    album: &str,
    years: Option<&str>,
    time_of_day: Option<types::TimeOfDay>,
    json: bool,
) -> anyhow::Result<()> {
    let filter = Filter {
        year: years.map(config::parse_year_range).transpose()?,
        time_of_day,
    };
    let album = open_album(album).await?;
    let report = InfoReport {
        metadata: album.metadata().await?,
        info: album.info(&filter).await?,
        year_index: album.year_index().await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let InfoReport {
        metadata,
        info,
        year_index,
    } = report;
    println!("Album: {}", metadata.name);
    if let Some(description) = &metadata.description {
        println!("  {}", description);
    }
    println!("  Id:      {}", metadata.id);
    println!("  Version: {}", metadata.version);
    println!("  Created: {}", metadata.created.format("%Y-%m-%d %H:%M:%S"));
    println!("  Updated: {}", metadata.updated.format("%Y-%m-%d %H:%M:%S"));
    println!();
    println!("Images:       {}", info.image_count);
    println!("Dates:        {}", info.date_count);
    println!("Thumbnails:   {}", format_size(info.thumbnails_size));
    println!("Renditions:   {}", format_size(info.images_size));
    println!();
    println!("Years:");
    for year in &info.years {
        let indexed = year_index.iter().find(|entry| entry.year == year.year);
        let status = match indexed {
            Some(entry) if entry.count == year.count => format!("crc {:08x}", entry.crc),
            _ => "stale".to_string(),
        };
        println!(
            "  {}: {:>6} images {:>10}  {}",
            year.year,
            year.count,
            format_size(year.size),
            status
        );
    }
    Ok(())
}

/// Apply `rename` flags to stored metadata. An empty description clears it.
fn apply_rename(
    metadata: &mut AlbumMetadata,
    name: Option<String>,
    description: Option<String>,
) {
    if let Some(name) = name {
        metadata.name = name;
    }
    if let Some(description) = description {
        metadata.description = Some(description).filter(|d| !d.trim().is_empty());
    }
    metadata.updated = Local::now().naive_local();
}

/// Run the rename command.
async fn run_rename(
    album: &str,
    name: Option<String>,
    description: Option<String>,
) -> anyhow::Result<()> {
    let album = open_album(album).await?;
    let mut metadata = album.metadata().await?;
    let previous = metadata.name.clone();
    apply_rename(&mut metadata, name, description);
    album.set_metadata(&metadata).await?;

    if metadata.name != previous {
        println!("Renamed album \"{}\" to \"{}\"", previous, metadata.name);
    }
    match &metadata.description {
        Some(description) => println!("  Description: {}", description),
        None => println!("  No description"),
    }
    Ok(())
}

/// Images held by only one side of a comparison.
#[derive(Debug, Default, PartialEq, Eq)]
struct ConflictCounts {
    only_left: u64,
    only_right: u64,
}

/// Drain a diff stream, passing every conflict to `on_conflict`.
///
/// Returns `None` when the comparison was cancelled before the end.
async fn collect_conflicts<S>(
    diffs: S,
    mut on_conflict: impl FnMut(&DiffResult, &ImageRecord),
) -> Result<Option<ConflictCounts>, SyncError>
where
    S: Stream<Item = Result<DiffResult, SyncError>>,
{
    pin_mut!(diffs);
    let mut counts = ConflictCounts::default();
    while let Some(diff) = diffs.next().await {
        let diff = match diff {
            Ok(diff) => diff,
            Err(SyncError::Cancelled) => return Ok(None),
            Err(e) => return Err(e),
        };
        let Some(record) = diff.record().filter(|_| diff.is_conflict()) else {
            continue;
        };
        if diff.left.is_some() {
            counts.only_left += 1;
        } else {
            counts.only_right += 1;
        }
        on_conflict(&diff, record);
    }
    Ok(Some(counts))
}

/// Run the compare command.
async fn run_compare(
    left: &str,
    right: &str,
    ignore_album_id: bool,
    no_progress_bar: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let (left_album, right_album) = (open_album(left).await?, open_album(right).await?);
    let (left, right) = (display_path(left), display_path(right));
    let (left, right) = (left.as_str(), right.as_str());
    let comparator = AlbumComparator::new(left_album.clone(), right_album.clone());
    comparator.verify_identity(ignore_album_id).await?;

    check_integrity(left_album.as_ref(), left, no_progress_bar, cancel).await?;
    check_integrity(right_album.as_ref(), right, no_progress_bar, cancel).await?;

    let pb = progress::create_fraction_bar(no_progress_bar);
    pb.set_message("Comparing");
    let report = progress::bar_reporter(&pb);
    let options = CompareOptions {
        ignore_identity_mismatch: ignore_album_id,
        include_matched: false,
    };
    let diffs = comparator.compare(options, &report, cancel);
    let counts = collect_conflicts(diffs, |diff, record| {
        let side = if diff.left.is_some() { left } else { right };
        pb.suspend(|| {
            println!(
                "{}  {}  {}  only in {}",
                diff.year,
                record.created.format("%Y-%m-%d %H:%M:%S"),
                record.filename,
                side
            )
        });
    })
    .await;
    pb.finish_and_clear();

    let Some(counts) = counts? else {
        println!("Comparison interrupted; run the same command again to continue.");
        return Ok(());
    };
    println!(
        "{} image(s) only in {}, {} image(s) only in {}",
        counts.only_left, left, counts.only_right, right
    );
    Ok(())
}

/// Run the sync command.
async fn run_sync(
    left: &str,
    right: &str,
    ignore_album_id: bool,
    no_progress_bar: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let synchronizer = AlbumSynchronizer::new(open_album(left).await?, open_album(right).await?);

    let pb = progress::create_fraction_bar(no_progress_bar);
    pb.set_message("Synchronizing");
    let result = synchronizer
        .run(ignore_album_id, &progress::bar_reporter(&pb), cancel)
        .await;
    pb.finish_and_clear();

    let summary = match result {
        Ok(summary) => summary,
        Err(SyncError::Cancelled) => {
            println!("Synchronization interrupted; run the same command again to continue.");
            return Ok(());
        }
        Err(e) => {
            if e.is_resumable() {
                tracing::info!("Images copied so far are kept; run sync again to resume");
            }
            return Err(e.into());
        }
    };

    println!("Synchronization finished, {} image(s) copied:", summary.copied());
    println!("  Copied to {}: {}", left, summary.copied_to_left);
    println!("  Copied to {}: {}", right, summary.copied_to_right);
    println!("  Already on both sides: {}", summary.matched);
    if !summary.years.is_empty() {
        let years: Vec<String> = summary.years.iter().map(|y| y.to_string()).collect();
        println!("  Years updated: {}", years.join(", "));
    }
    Ok(())
}

/// File name of an album path, for compact output.
fn display_path(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let cancel = shutdown::install_signal_handler();
    let no_progress_bar = cli.no_progress_bar;

    match cli.command {
        Command::Create {
            album,
            name,
            description,
        } => run_create(&album, &name, description).await,
        Command::Import {
            album,
            directories,
            settings,
        } => run_import(&album, &directories, &settings, no_progress_bar, &cancel).await,
        Command::Check { album } => run_check(&album, no_progress_bar, &cancel).await,
        Command::Info {
            album,
            years,
            time_of_day,
            json,
        } => run_info(&album, years.as_deref(), time_of_day, json).await,
        Command::Rename {
            album,
            name,
            description,
        } => run_rename(&album, name, description).await,
        Command::Compare {
            left,
            right,
            ignore_album_id,
        } => run_compare(&left, &right, ignore_album_id, no_progress_bar, &cancel).await,
        Command::Sync {
            left,
            right,
            ignore_album_id,
        } => run_sync(&left, &right, ignore_album_id, no_progress_bar, &cancel).await,
    }
}
