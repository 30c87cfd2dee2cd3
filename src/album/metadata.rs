//! Album identity and descriptive metadata.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::AlbumError;

/// Format version written into new albums.
pub const FORMAT_VERSION: &str = "PocketAlbum 1.0";

/// Only albums with this major format version can be read.
const SUPPORTED_MAJOR: u32 = 1;

/// Timestamp layout used for the `created`/`updated` keys.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Identity and description of an album.
///
/// Two albums with the same `id` share a lineage and may be synchronized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumMetadata {
    pub id: Uuid,
    pub version: String,
    pub name: String,
    pub description: Option<String>,
    pub created: NaiveDateTime,
    pub updated: NaiveDateTime,
}

impl AlbumMetadata {
    /// Metadata for a brand new album with a fresh identity.
    pub fn create(name: &str) -> Self {
        let now = Local::now().naive_local();
        Self {
            id: Uuid::new_v4(),
            version: FORMAT_VERSION.to_string(),
            name: name.to_string(),
            description: None,
            created: now,
            updated: now,
        }
    }

    pub fn validate(&self) -> Result<(), AlbumError> {
        let major = parse_format_version(&self.version).ok_or_else(|| {
            AlbumError::InvalidMetadata(format!("Version {} is not recognized", self.version))
        })?;
        if major != SUPPORTED_MAJOR {
            return Err(AlbumError::InvalidMetadata(format!(
                "Unsupported version {}",
                self.version
            )));
        }
        if self.name.trim().is_empty() {
            return Err(AlbumError::InvalidMetadata("No album name found".to_string()));
        }
        Ok(())
    }

    /// Key/value rows as stored in the `meta` table.
    pub(crate) fn to_rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("id", self.id.to_string()),
            ("version", self.version.clone()),
            ("name", self.name.clone()),
            ("description", self.description.clone().unwrap_or_default()),
            ("created", self.created.format(TIMESTAMP_FORMAT).to_string()),
            ("updated", self.updated.format(TIMESTAMP_FORMAT).to_string()),
        ]
    }

    /// Rebuild metadata from `meta` rows.
    ///
    /// Missing or unparsable `version`/`name` come back empty so that
    /// [`validate`](Self::validate) rejects them. A missing `id` is an error.
    pub(crate) fn from_rows<'a, I>(rows: I) -> Result<Self, AlbumError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut id = None;
        let mut version = String::new();
        let mut name = String::new();
        let mut description = None;
        let mut created = None;
        let mut updated = None;

        for (key, value) in rows {
            match key {
                "id" => id = Uuid::parse_str(value).ok(),
                "version" => version = value.to_string(),
                "name" => name = value.to_string(),
                "description" if !value.is_empty() => description = Some(value.to_string()),
                "created" => created = parse_timestamp(value),
                "updated" => updated = parse_timestamp(value),
                _ => {}
            }
        }

        let id = id.ok_or_else(|| AlbumError::InvalidMetadata("No album id found".to_string()))?;
        let now = Local::now().naive_local();
        let created = created.unwrap_or(now);
        Ok(Self {
            id,
            version,
            name,
            description,
            created,
            updated: updated.unwrap_or(created),
        })
    }
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// Extract the major number from `"PocketAlbum <major>.<minor>"`.
fn parse_format_version(version: &str) -> Option<u32> {
    let number = version.strip_prefix("PocketAlbum ")?;
    let (major, minor) = number.split_once('.')?;
    minor.parse::<u32>().ok()?;
    major.parse().ok()
}
