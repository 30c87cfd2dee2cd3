//! Album schema definitions and migrations.

use rusqlite::Connection;

use super::error::AlbumError;

/// `PRAGMA application_id` stamped into every album file ("PoAl").
pub const APPLICATION_ID: i32 = 0x6C41_6F50;

/// Current schema version. Increment when making schema changes.
pub const SCHEMA_VERSION: i32 = 1;

/// Schema DDL for version 1.
const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS image (
    id TEXT PRIMARY KEY NOT NULL,
    filename TEXT NOT NULL,
    content_type TEXT NOT NULL,
    created TEXT NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    size INTEGER NOT NULL,
    latitude REAL,
    longitude REAL,
    crc INTEGER NOT NULL,
    thumbnail BLOB NOT NULL,
    data BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_image_created ON image(created);

CREATE TABLE IF NOT EXISTS year_index (
    year INTEGER PRIMARY KEY NOT NULL,
    count INTEGER NOT NULL,
    crc INTEGER NOT NULL,
    size INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
"#;

/// Get the current schema version from the database.
pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32, AlbumError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), AlbumError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

pub(crate) fn get_application_id(conn: &Connection) -> Result<i32, AlbumError> {
    let id: i32 = conn.pragma_query_value(None, "application_id", |row| row.get(0))?;
    Ok(id)
}

pub(crate) fn set_application_id(conn: &Connection) -> Result<(), AlbumError> {
    conn.pragma_update(None, "application_id", APPLICATION_ID)?;
    Ok(())
}

/// Initialize or migrate the album schema.
///
/// Idempotent; safe on both new and existing albums.
pub(crate) fn migrate(conn: &Connection) -> Result<(), AlbumError> {
    let current_version = get_schema_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(AlbumError::UnsupportedSchemaVersion {
            found: current_version,
            expected: SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(SCHEMA_V1)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
        tracing::debug!("Initialized album schema at version {}", SCHEMA_VERSION);
    }

    Ok(())
}
