//! Error types for album storage.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing an album.
#[derive(Error, Debug)]
pub enum AlbumError {
    /// Failed to open or create the album file.
    #[error("Failed to open album at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// Failed to run a schema migration.
    #[error("Album migration failed: {0}")]
    Migration(#[from] rusqlite::Error),

    /// A query failed.
    #[error("Album query failed: {0}")]
    Query(String),

    /// Failed to spawn a blocking task.
    #[error("Failed to spawn blocking task: {0}")]
    Spawn(#[from] tokio::task::JoinError),

    /// The album schema version is newer than supported.
    #[error("Album schema version {found} is newer than supported version {expected}")]
    UnsupportedSchemaVersion { found: i32, expected: i32 },

    /// The file is a SQLite database but not a Pocket Album.
    #[error("{path} is not a Pocket Album file (application id {application_id:#x})")]
    NotAnAlbum { path: PathBuf, application_id: i32 },

    /// Album files must carry the `.sqlite` extension.
    #[error("Album file {0} must have the .sqlite extension")]
    InvalidPath(PathBuf),

    #[error("Album file {0} already exists")]
    AlreadyExists(PathBuf),

    #[error("Album file {0} does not exist")]
    Missing(PathBuf),

    /// Another handle holds the single-writer lock.
    #[error("Album {0} is already open by another process")]
    Locked(PathBuf),

    #[error("Invalid album metadata: {0}")]
    InvalidMetadata(String),

    #[error("Image {0} not found")]
    ImageNotFound(String),

    /// Filesystem error around the album file (lock file, directories).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AlbumError {
    /// Create a Query error from a rusqlite error.
    pub fn query(source: rusqlite::Error) -> Self {
        Self::Query(source.to_string())
    }
}
