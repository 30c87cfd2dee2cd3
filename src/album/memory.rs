//! In-memory album used by engine tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use super::db::Album;
use super::error::AlbumError;
use super::metadata::AlbumMetadata;
use super::types::{AlbumInfo, Filter, ImageRecord, Interval, YearChecksum, YearCount};

struct Stored {
    record: ImageRecord,
    thumbnail: Vec<u8>,
    data: Vec<u8>,
}

#[derive(Default)]
struct Inner {
    images: HashMap<String, Stored>,
    index: BTreeMap<i32, YearChecksum>,
    metadata: Option<AlbumMetadata>,
}

pub struct MemoryAlbum {
    inner: Mutex<Inner>,
}

impl MemoryAlbum {
    pub fn new(metadata: AlbumMetadata) -> Self {
        Self {
            inner: Mutex::new(Inner {
                metadata: Some(metadata),
                ..Inner::default()
            }),
        }
    }

    /// An album sharing `other`'s identity, as if copied from it.
    pub fn sibling(other: &AlbumMetadata) -> Self {
        Self::new(other.clone())
    }

    /// Number of stored records, bypassing filters.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().images.len()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> Result<T, AlbumError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| AlbumError::Query(e.to_string()))?;
        Ok(f(&mut inner))
    }
}

#[async_trait]
impl Album for MemoryAlbum {
    async fn info(&self, filter: &Filter) -> Result<AlbumInfo, AlbumError> {
        self.with(|inner| {
            let mut years: BTreeMap<i32, YearCount> = BTreeMap::new();
            let mut dates = std::collections::HashSet::new();
            let mut info = AlbumInfo::default();
            for stored in inner.images.values().filter(|s| filter.matches(&s.record)) {
                let year = years.entry(stored.record.year()).or_insert(YearCount {
                    year: stored.record.year(),
                    count: 0,
                    size: 0,
                });
                year.count += 1;
                year.size += stored.record.size;
                dates.insert(stored.record.created.date());
                info.image_count += 1;
                info.thumbnails_size += stored.thumbnail.len() as u64;
                info.images_size += stored.data.len() as u64;
            }
            info.date_count = dates.len() as u64;
            info.years = years.into_values().collect();
            info
        })
    }

    async fn year_index(&self) -> Result<Vec<YearChecksum>, AlbumError> {
        self.with(|inner| inner.index.values().copied().collect())
    }

    async fn store_year_index(&self, entry: &YearChecksum) -> Result<(), AlbumError> {
        self.with(|inner| {
            inner.index.insert(entry.year, *entry);
        })
    }

    async fn remove_year_index(&self, year: i32) -> Result<(), AlbumError> {
        self.with(|inner| {
            inner.index.remove(&year);
        })
    }

    async fn list_images(
        &self,
        filter: &Filter,
        paging: Interval,
    ) -> Result<Vec<ImageRecord>, AlbumError> {
        self.with(|inner| {
            let mut matching: Vec<&ImageRecord> = inner
                .images
                .values()
                .map(|s| &s.record)
                .filter(|r| filter.matches(r))
                .collect();
            matching.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
            matching
                .into_iter()
                .skip(paging.from() as usize)
                .take(paging.len() as usize)
                .cloned()
                .collect()
        })
    }

    async fn get_image(&self, id: &str) -> Result<Option<ImageRecord>, AlbumError> {
        self.with(|inner| inner.images.get(id).map(|s| s.record.clone()))
    }

    async fn image_exists(&self, id: &str) -> Result<bool, AlbumError> {
        self.with(|inner| inner.images.contains_key(id))
    }

    async fn get_data(&self, id: &str) -> Result<Vec<u8>, AlbumError> {
        self.with(|inner| inner.images.get(id).map(|s| s.data.clone()))?
            .ok_or_else(|| AlbumError::ImageNotFound(id.to_string()))
    }

    async fn get_thumbnail(&self, id: &str) -> Result<Vec<u8>, AlbumError> {
        self.with(|inner| inner.images.get(id).map(|s| s.thumbnail.clone()))?
            .ok_or_else(|| AlbumError::ImageNotFound(id.to_string()))
    }

    async fn insert(
        &self,
        image: &ImageRecord,
        thumbnail: &[u8],
        data: &[u8],
    ) -> Result<bool, AlbumError> {
        self.with(|inner| {
            if inner.images.contains_key(&image.id) {
                return false;
            }
            inner.images.insert(
                image.id.clone(),
                Stored {
                    record: image.clone(),
                    thumbnail: thumbnail.to_vec(),
                    data: data.to_vec(),
                },
            );
            true
        })
    }

    async fn metadata(&self) -> Result<AlbumMetadata, AlbumError> {
        self.with(|inner| inner.metadata.clone())?
            .ok_or_else(|| AlbumError::InvalidMetadata("No album id found".to_string()))
    }

    async fn set_metadata(&self, metadata: &AlbumMetadata) -> Result<(), AlbumError> {
        metadata.validate()?;
        self.with(|inner| inner.metadata = Some(metadata.clone()))
    }
}
