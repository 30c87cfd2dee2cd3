use thiserror::Error;

use crate::album::AlbumError;

/// Typed import errors enabling per-file failure classification.
///
/// `is_recoverable()` separates problems with one input file, after which a
/// batch simply moves on, from store failures that the caller should treat
/// as fatal for the current operation.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The album already holds a byte-identical file.
    #[error("Image {0} already exists in the album")]
    DuplicateContent(String),

    #[error("Unrecognized image format")]
    UnrecognizedFormat,

    #[error("Corrupt image content: {0}")]
    CorruptContent(String),

    #[error("Missing required metadata: {0}")]
    MissingRequiredMetadata(String),

    /// Even the lowest quality setting could not be encoded.
    #[error("Failed to encode rendition: {0}")]
    RenditionEncodingFailed(String),

    #[error(transparent)]
    Album(#[from] AlbumError),

    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ImportError {
    /// Whether the failure is confined to the file being imported.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ImportError::DuplicateContent(_) => true,
            ImportError::UnrecognizedFormat => true,
            ImportError::CorruptContent(_) => true,
            ImportError::MissingRequiredMetadata(_) => true,
            ImportError::RenditionEncodingFailed(_) => true,
            ImportError::Io(_) => true,
            ImportError::Album(_) => false,
            ImportError::Task(_) => false,
        }
    }
}
