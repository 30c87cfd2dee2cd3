use clap::{Args, Parser, Subcommand};

use crate::config::{
    DEFAULT_IMAGE_MAX_BYTES, DEFAULT_IMAGE_WIDTH, DEFAULT_THUMBNAIL_MAX_BYTES,
    DEFAULT_THUMBNAIL_WIDTH,
};
use crate::types::{LogLevel, TimeOfDay};

#[derive(Parser, Debug)]
#[command(
    name = "pocketalbum-rs",
    version,
    about = "Content-addressed photo albums with integrity checks and sync"
)]
pub struct Cli {
    /// Log level (RUST_LOG takes precedence when set)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Disable progress bar
    #[arg(long, global = true)]
    pub no_progress_bar: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new, empty album file
    Create {
        /// Album file to create (must end in .sqlite)
        album: String,

        /// Display name of the album
        #[arg(long)]
        name: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// Import every image found under the given directories
    Import {
        album: String,

        /// Directories to scan recursively
        #[arg(required = true)]
        directories: Vec<String>,

        #[command(flatten)]
        settings: ImportArgs,
    },

    /// Rebuild stale year checksums
    Check { album: String },

    /// Show album metadata, counts and the year index
    Info {
        album: String,

        /// Restrict counts to a year or inclusive range (2019 or 2015..2019)
        #[arg(long)]
        years: Option<String>,

        /// Restrict counts to a time of day
        #[arg(long, value_enum)]
        time_of_day: Option<TimeOfDay>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change the name or description of an album
    Rename {
        album: String,

        /// New display name
        #[arg(long, required_unless_present = "description")]
        name: Option<String>,

        /// New description (an empty value clears it)
        #[arg(long)]
        description: Option<String>,
    },

    /// List images present in only one of two albums
    Compare {
        left: String,
        right: String,

        /// Compare even if the albums have different identities
        #[arg(long)]
        ignore_album_id: bool,
    },

    /// Copy images missing on either side so both albums hold the union
    Sync {
        left: String,
        right: String,

        /// Synchronize even if the albums have different identities
        #[arg(long)]
        ignore_album_id: bool,
    },
}

/// Rendition settings for `import`.
#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Longer side of the full rendition, in pixels
    #[arg(long, env = "POCKETALBUM_IMAGE_WIDTH", default_value_t = DEFAULT_IMAGE_WIDTH)]
    pub image_width: u32,

    /// Longer side of the thumbnail, in pixels
    #[arg(long, env = "POCKETALBUM_THUMBNAIL_WIDTH", default_value_t = DEFAULT_THUMBNAIL_WIDTH)]
    pub thumbnail_width: u32,

    /// Byte ceiling of the full rendition
    #[arg(long, env = "POCKETALBUM_IMAGE_MAX_BYTES", default_value_t = DEFAULT_IMAGE_MAX_BYTES)]
    pub image_max_bytes: u64,

    /// Byte ceiling of the thumbnail
    #[arg(long, env = "POCKETALBUM_THUMBNAIL_MAX_BYTES", default_value_t = DEFAULT_THUMBNAIL_MAX_BYTES)]
    pub thumbnail_max_bytes: u64,
}
