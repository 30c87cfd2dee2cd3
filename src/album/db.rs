//! Album store trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use fs4::fs_std::FileExt;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};

use super::error::AlbumError;
use super::metadata::AlbumMetadata;
use super::schema;
use super::types::{AlbumInfo, Filter, ImageRecord, Interval, YearChecksum, YearCount};

/// Storage layout of `image.created`; the year and hour filters slice it.
const CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Capture year of an `image` row.
const YEAR_EXPR: &str = "CAST(substr(created, 1, 4) AS INTEGER)";

/// Capture hour of an `image` row.
const HOUR_EXPR: &str = "CAST(substr(created, 12, 2) AS INTEGER)";

const IMAGE_COLUMNS: &str =
    "id, filename, content_type, created, width, height, size, latitude, longitude, crc";

/// Capability interface over one album store.
///
/// Object-safe so engines can hold `Arc<dyn Album>`. Records are immutable
/// once inserted, which makes concurrent reads during a comparison safe.
/// Writers are expected to be serialized by the caller.
#[async_trait]
pub trait Album: Send + Sync {
    /// Authoritative counts for the records matching `filter`.
    async fn info(&self, filter: &Filter) -> Result<AlbumInfo, AlbumError>;

    /// Every stored year rollup, sorted by year.
    async fn year_index(&self) -> Result<Vec<YearChecksum>, AlbumError>;

    /// Store a year rollup, replacing any previous entry for that year.
    async fn store_year_index(&self, entry: &YearChecksum) -> Result<(), AlbumError>;

    /// Drop the rollup for `year`. No-op when none is stored.
    async fn remove_year_index(&self, year: i32) -> Result<(), AlbumError>;

    /// Records matching `filter`, ordered by capture time then id, restricted
    /// to the ordinal range `paging`.
    async fn list_images(
        &self,
        filter: &Filter,
        paging: Interval,
    ) -> Result<Vec<ImageRecord>, AlbumError>;

    async fn get_image(&self, id: &str) -> Result<Option<ImageRecord>, AlbumError>;

    async fn image_exists(&self, id: &str) -> Result<bool, AlbumError>;

    /// Full rendition bytes.
    async fn get_data(&self, id: &str) -> Result<Vec<u8>, AlbumError>;

    /// Thumbnail rendition bytes.
    async fn get_thumbnail(&self, id: &str) -> Result<Vec<u8>, AlbumError>;

    /// Store a record with both renditions, all or nothing.
    ///
    /// Insert-if-absent: returns `false` without touching the album when a
    /// record with the same id already exists.
    async fn insert(
        &self,
        image: &ImageRecord,
        thumbnail: &[u8],
        data: &[u8],
    ) -> Result<bool, AlbumError>;

    async fn metadata(&self) -> Result<AlbumMetadata, AlbumError>;

    async fn set_metadata(&self, metadata: &AlbumMetadata) -> Result<(), AlbumError>;
}

/// SQLite implementation of an album.
pub struct SqliteAlbum {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    /// Path to the album file (for error messages).
    path: PathBuf,
    /// Exclusive advisory lock held for the lifetime of the handle.
    _lock_file: Option<std::fs::File>,
}

impl std::fmt::Debug for SqliteAlbum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAlbum")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Sidecar lock path: `holidays.sqlite` -> `holidays.sqlite.lock`.
fn lock_path(path: &Path) -> PathBuf {
    let mut lock = path.as_os_str().to_owned();
    lock.push(".lock");
    PathBuf::from(lock)
}

fn acquire_lock(path: &Path) -> Result<std::fs::File, AlbumError> {
    let file = std::fs::File::create(lock_path(path))?;
    file.try_lock_exclusive()
        .map_err(|_| AlbumError::Locked(path.to_path_buf()))?;
    Ok(file)
}

fn open_connection(path: &Path) -> Result<Connection, AlbumError> {
    Connection::open(path).map_err(|e| AlbumError::Open {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_metadata(conn: &Connection, metadata: &AlbumMetadata) -> Result<(), AlbumError> {
    let mut stmt = conn
        .prepare_cached("INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)")
        .map_err(AlbumError::query)?;
    for (key, value) in metadata.to_rows() {
        stmt.execute(rusqlite::params![key, value])
            .map_err(AlbumError::query)?;
    }
    Ok(())
}

fn read_metadata(conn: &Connection) -> Result<AlbumMetadata, AlbumError> {
    let mut stmt = conn
        .prepare_cached("SELECT key, value FROM meta")
        .map_err(AlbumError::query)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(AlbumError::query)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(AlbumError::query)?;
    AlbumMetadata::from_rows(rows.iter().map(|(k, v)| (k.as_str(), v.as_str())))
}

fn touch_updated(conn: &Connection) -> Result<(), AlbumError> {
    let now = chrono::Local::now()
        .naive_local()
        .format(super::metadata::TIMESTAMP_FORMAT)
        .to_string();
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES ('updated', ?1)",
        [now],
    )
    .map_err(AlbumError::query)?;
    Ok(())
}

impl SqliteAlbum {
    /// Create a new album file.
    ///
    /// The path must end in `.sqlite` and must not exist yet.
    pub async fn create(path: &Path, metadata: &AlbumMetadata) -> Result<Self, AlbumError> {
        if path.extension().and_then(|e| e.to_str()) != Some("sqlite") {
            return Err(AlbumError::InvalidPath(path.to_path_buf()));
        }
        if tokio::fs::try_exists(path).await? {
            return Err(AlbumError::AlreadyExists(path.to_path_buf()));
        }
        metadata.validate()?;

        let path = path.to_path_buf();
        let path_clone = path.clone();
        let metadata = metadata.clone();

        let (conn, lock_file) = tokio::task::spawn_blocking(move || {
            let lock_file = acquire_lock(&path_clone)?;
            let conn = open_connection(&path_clone)?;
            schema::set_application_id(&conn)?;
            schema::migrate(&conn)?;
            write_metadata(&conn, &metadata)?;
            Ok::<_, AlbumError>((conn, lock_file))
        })
        .await??;

        tracing::info!(path = %path.display(), "Created album");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
            _lock_file: Some(lock_file),
        })
    }

    /// Open an existing album file.
    pub async fn open(path: &Path) -> Result<Self, AlbumError> {
        if !tokio::fs::try_exists(path).await? {
            return Err(AlbumError::Missing(path.to_path_buf()));
        }

        let path = path.to_path_buf();
        let path_clone = path.clone();

        let (conn, lock_file) = tokio::task::spawn_blocking(move || {
            let lock_file = acquire_lock(&path_clone)?;
            let conn = open_connection(&path_clone)?;

            let application_id = schema::get_application_id(&conn)?;
            if application_id != schema::APPLICATION_ID {
                return Err(AlbumError::NotAnAlbum {
                    path: path_clone.clone(),
                    application_id,
                });
            }
            schema::migrate(&conn)?;
            read_metadata(&conn)?.validate()?;

            Ok::<_, AlbumError>((conn, lock_file))
        })
        .await??;

        tracing::debug!(path = %path.display(), "Opened album");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
            _lock_file: Some(lock_file),
        })
    }

    /// Open an in-memory album (for testing).
    #[cfg(test)]
    pub fn open_in_memory(metadata: &AlbumMetadata) -> Result<Self, AlbumError> {
        let conn = Connection::open_in_memory().map_err(|e| AlbumError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::set_application_id(&conn)?;
        schema::migrate(&conn)?;
        write_metadata(&conn, metadata)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
            _lock_file: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AlbumError> {
        self.conn
            .lock()
            .map_err(|e| AlbumError::Query(e.to_string()))
    }

    fn fetch_blob(&self, column: &str, id: &str) -> Result<Vec<u8>, AlbumError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM image WHERE id = ?1", column),
            [id],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()
        .map_err(AlbumError::query)?
        .ok_or_else(|| AlbumError::ImageNotFound(id.to_string()))
    }
}

/// First instant of `year` in the `created` text layout.
fn year_start(year: i64) -> String {
    format!("{:04}-01-01T00:00:00", year)
}

/// SQL condition over `image` rows matching `filter`, plus its positional
/// parameters.
///
/// Year ranges become bounds on the `created` text, which
/// `idx_image_created` can search.
fn filter_clause(filter: &Filter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut params = Vec::new();
    if let Some(years) = filter.year {
        conditions.push("created >= ? AND created < ?".to_string());
        params.push(Value::Text(year_start(years.from())));
        params.push(Value::Text(year_start(years.to() + 1)));
    }
    if let Some(time) = filter.time_of_day {
        let (start, end) = time.hours();
        conditions.push(format!("{0} >= ? AND {0} < ?", HOUR_EXPR));
        params.push(Value::Integer(start as i64));
        params.push(Value::Integer(end as i64));
    }
    if conditions.is_empty() {
        return ("1".to_string(), params);
    }
    (conditions.join(" AND "), params)
}

/// Paged listing over `condition`; the last two parameters are limit and
/// offset.
fn list_images_sql(condition: &str) -> String {
    format!(
        "SELECT {} FROM image WHERE {} ORDER BY created ASC, id ASC LIMIT ? OFFSET ?",
        IMAGE_COLUMNS, condition
    )
}

/// Convert a row selected with [`IMAGE_COLUMNS`] into an ImageRecord.
fn row_to_image(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImageRecord> {
    let created: String = row.get(3)?;
    let created = NaiveDateTime::parse_from_str(&created, CREATED_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ImageRecord {
        id: row.get(0)?,
        filename: row.get(1)?,
        content_type: row.get(2)?,
        created,
        width: row.get::<_, i64>(4)? as u32,
        height: row.get::<_, i64>(5)? as u32,
        size: row.get::<_, i64>(6)? as u64,
        latitude: row.get(7)?,
        longitude: row.get(8)?,
        crc: row.get::<_, i64>(9)? as u32,
    })
}

#[async_trait]
impl Album for SqliteAlbum {
    async fn info(&self, filter: &Filter) -> Result<AlbumInfo, AlbumError> {
        let (condition, params) = filter_clause(filter);
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} AS y, COUNT(*), COALESCE(SUM(size), 0) FROM image WHERE {} \
                 GROUP BY y ORDER BY y",
                YEAR_EXPR, condition
            ))
            .map_err(AlbumError::query)?;
        let years = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                Ok(YearCount {
                    year: row.get::<_, i64>(0)? as i32,
                    count: row.get::<_, i64>(1)? as u64,
                    size: row.get::<_, i64>(2)? as u64,
                })
            })
            .map_err(AlbumError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(AlbumError::query)?;

        let (date_count, thumbnails_size, images_size): (i64, i64, i64) = conn
            .query_row(
                &format!(
                    "SELECT COUNT(DISTINCT substr(created, 1, 10)), \
                     COALESCE(SUM(LENGTH(thumbnail)), 0), COALESCE(SUM(LENGTH(data)), 0) \
                     FROM image WHERE {}",
                    condition
                ),
                rusqlite::params_from_iter(params.iter()),
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(AlbumError::query)?;

        Ok(AlbumInfo {
            image_count: years.iter().map(|y| y.count).sum(),
            date_count: date_count as u64,
            thumbnails_size: thumbnails_size as u64,
            images_size: images_size as u64,
            years,
        })
    }

    async fn year_index(&self) -> Result<Vec<YearChecksum>, AlbumError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached("SELECT year, count, crc, size FROM year_index ORDER BY year")
            .map_err(AlbumError::query)?;
        let index = stmt
            .query_map([], |row| {
                Ok(YearChecksum {
                    year: row.get::<_, i64>(0)? as i32,
                    count: row.get::<_, i64>(1)? as u64,
                    crc: row.get::<_, i64>(2)? as u32,
                    size: row.get::<_, i64>(3)? as u64,
                })
            })
            .map_err(AlbumError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(AlbumError::query)?;
        Ok(index)
    }

    async fn store_year_index(&self, entry: &YearChecksum) -> Result<(), AlbumError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO year_index (year, count, crc, size) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                entry.year,
                entry.count as i64,
                entry.crc as i64,
                entry.size as i64
            ],
        )
        .map_err(AlbumError::query)?;
        Ok(())
    }

    async fn remove_year_index(&self, year: i32) -> Result<(), AlbumError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM year_index WHERE year = ?1", [year])
            .map_err(AlbumError::query)?;
        Ok(())
    }

    async fn list_images(
        &self,
        filter: &Filter,
        paging: Interval,
    ) -> Result<Vec<ImageRecord>, AlbumError> {
        let (condition, mut params) = filter_clause(filter);
        params.push(Value::Integer(paging.len() as i64));
        params.push(Value::Integer(paging.from()));

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&list_images_sql(&condition))
            .map_err(AlbumError::query)?;
        let images = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), row_to_image)
            .map_err(AlbumError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(AlbumError::query)?;
        Ok(images)
    }

    async fn get_image(&self, id: &str) -> Result<Option<ImageRecord>, AlbumError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM image WHERE id = ?1", IMAGE_COLUMNS),
            [id],
            row_to_image,
        )
        .optional()
        .map_err(AlbumError::query)
    }

    async fn image_exists(&self, id: &str) -> Result<bool, AlbumError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM image WHERE id = ?1)",
            [id],
            |row| row.get::<_, bool>(0),
        )
        .map_err(AlbumError::query)
    }

    async fn get_data(&self, id: &str) -> Result<Vec<u8>, AlbumError> {
        self.fetch_blob("data", id)
    }

    async fn get_thumbnail(&self, id: &str) -> Result<Vec<u8>, AlbumError> {
        self.fetch_blob("thumbnail", id)
    }

    async fn insert(
        &self,
        image: &ImageRecord,
        thumbnail: &[u8],
        data: &[u8],
    ) -> Result<bool, AlbumError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(AlbumError::query)?;

        let inserted = tx
            .execute(
                r#"
                INSERT OR IGNORE INTO image (id, filename, content_type, created, width, height, size, latitude, longitude, crc, thumbnail, data)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
                rusqlite::params![
                    &image.id,
                    &image.filename,
                    &image.content_type,
                    image.created.format(CREATED_FORMAT).to_string(),
                    image.width as i64,
                    image.height as i64,
                    image.size as i64,
                    image.latitude,
                    image.longitude,
                    image.crc as i64,
                    thumbnail,
                    data,
                ],
            )
            .map_err(AlbumError::query)?;

        if inserted == 0 {
            // Dropping the transaction rolls it back.
            return Ok(false);
        }
        touch_updated(&tx)?;
        tx.commit().map_err(AlbumError::query)?;
        Ok(true)
    }

    async fn metadata(&self) -> Result<AlbumMetadata, AlbumError> {
        let conn = self.lock()?;
        read_metadata(&conn)
    }

    async fn set_metadata(&self, metadata: &AlbumMetadata) -> Result<(), AlbumError> {
        metadata.validate()?;
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(AlbumError::query)?;
        write_metadata(&tx, metadata)?;
        tx.commit().map_err(AlbumError::query)?;
        Ok(())
    }
}
