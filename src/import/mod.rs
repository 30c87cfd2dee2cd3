//! Content-addressed import pipeline.
//!
//! Every file is identified by the SHA-256 of its bytes, so importing the
//! same file twice is rejected before any decoding happens. Accepted files
//! are decoded, tagged with their EXIF capture time and location, and
//! stored together with a full and a thumbnail rendition in one atomic
//! insert.

pub mod batch;
pub mod error;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod metadata;
pub mod rendition;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::album::{Album, ImageRecord};
use crate::config::ImportSettings;

pub use batch::RecursiveImporter;
pub use error::ImportError;
pub use metadata::{ExifExtractor, MetadataExtractor};
pub use rendition::{Codec, JpegCodec};

/// Lower-case hex SHA-256 of `bytes`; the record id.
pub fn content_id(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A record with its renditions, ready for a single insert.
struct PreparedImage {
    record: ImageRecord,
    thumbnail: Vec<u8>,
    data: Vec<u8>,
}

/// CPU-bound part of an import: decode, checksum, orient, re-encode.
fn prepare(
    id: String,
    filename: String,
    bytes: &[u8],
    extractor: &dyn MetadataExtractor,
    codec: &dyn Codec,
    settings: &ImportSettings,
) -> Result<PreparedImage, ImportError> {
    let decoded = extractor.extract(bytes)?;
    let crc = crc32fast::hash(bytes);

    let image = decoded.orientation.apply(decoded.image);
    let (full, thumb) = rendition::rendition_targets(image.width(), image.height(), settings);
    let data = codec.encode(&image, &full)?;
    let thumbnail = codec.encode(&image, &thumb)?;

    Ok(PreparedImage {
        record: ImageRecord {
            id,
            filename,
            content_type: decoded.content_type,
            created: decoded.created,
            size: bytes.len() as u64,
            latitude: decoded.location.map(|(lat, _)| lat),
            longitude: decoded.location.map(|(_, lon)| lon),
            width: image.width(),
            height: image.height(),
            crc,
        },
        thumbnail,
        data,
    })
}

/// Imports files into one album.
///
/// One importer is one import session: it remembers which capture years it
/// has already invalidated so each year's index entry is dropped only once.
pub struct ImageImporter {
    album: Arc<dyn Album>,
    settings: ImportSettings,
    extractor: Arc<dyn MetadataExtractor>,
    codec: Arc<dyn Codec>,
    invalidated_years: HashSet<i32>,
}

impl ImageImporter {
    pub fn new(album: Arc<dyn Album>, settings: ImportSettings) -> Self {
        Self::with_collaborators(album, settings, Arc::new(ExifExtractor), Arc::new(JpegCodec))
    }

    pub fn with_collaborators(
        album: Arc<dyn Album>,
        settings: ImportSettings,
        extractor: Arc<dyn MetadataExtractor>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            album,
            settings,
            extractor,
            codec,
            invalidated_years: HashSet::new(),
        }
    }

    /// Years whose index entry this session has removed.
    pub fn invalidated_years(&self) -> &HashSet<i32> {
        &self.invalidated_years
    }

    pub async fn import_file(&mut self, path: &Path) -> Result<ImageRecord, ImportError> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.import_bytes(filename, bytes).await
    }

    /// Import one file's bytes.
    ///
    /// Fails with [`ImportError::DuplicateContent`] when the album already
    /// holds the same bytes; the album is left untouched in that case.
    pub async fn import_bytes(
        &mut self,
        filename: String,
        bytes: Vec<u8>,
    ) -> Result<ImageRecord, ImportError> {
        let bytes = Arc::new(bytes);

        let hashed = bytes.clone();
        let id = tokio::task::spawn_blocking(move || content_id(&hashed)).await?;
        if self.album.image_exists(&id).await? {
            return Err(ImportError::DuplicateContent(id));
        }

        let extractor = self.extractor.clone();
        let codec = self.codec.clone();
        let settings = self.settings.clone();
        let prepared = tokio::task::spawn_blocking(move || {
            prepare(
                id,
                filename,
                &bytes,
                extractor.as_ref(),
                codec.as_ref(),
                &settings,
            )
        })
        .await??;

        let year = prepared.record.year();
        if self.invalidated_years.insert(year) {
            self.album.remove_year_index(year).await?;
            tracing::debug!(year, "Invalidated year checksum");
        }

        let PreparedImage {
            record,
            thumbnail,
            data,
        } = prepared;
        if !self.album.insert(&record, &thumbnail, &data).await? {
            return Err(ImportError::DuplicateContent(record.id));
        }
        tracing::debug!(
            id = %record.id,
            filename = %record.filename,
            created = %record.created,
            "Imported image"
        );
        Ok(record)
    }
}
