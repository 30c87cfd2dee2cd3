//! Album storage module.
//!
//! An album is a single SQLite file holding image records with their
//! thumbnail and full renditions, a per-year integrity index, and the
//! album's identity metadata. Engines talk to it through the [`Album`] trait
//! so that tests can substitute an in-memory store.

pub mod db;
pub mod error;
#[cfg(test)]
pub mod memory;
pub mod metadata;
pub mod schema;
pub mod types;

pub use db::{Album, SqliteAlbum};
pub use error::AlbumError;
pub use metadata::AlbumMetadata;
pub use types::{AlbumInfo, Filter, ImageRecord, Interval, YearChecksum, YearCount};
