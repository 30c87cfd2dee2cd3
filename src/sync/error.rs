use thiserror::Error;
use uuid::Uuid;

use crate::album::AlbumError;

/// Errors raised while comparing or synchronizing two albums.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Albums have different identities ({left} vs {right}); pass --ignore-album-id to compare anyway")]
    AlbumIdentityMismatch { left: Uuid, right: Uuid },

    #[error("Synchronization cancelled")]
    Cancelled,

    #[error(transparent)]
    Album(#[from] AlbumError),
}

impl SyncError {
    /// Whether a later run could pick up where this one stopped.
    ///
    /// Resolution is insert-if-absent, so an interrupted run leaves nothing
    /// half-applied and can simply be repeated.
    pub fn is_resumable(&self) -> bool {
        match self {
            SyncError::AlbumIdentityMismatch { .. } => false,
            SyncError::Cancelled => true,
            SyncError::Album(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_mismatch_not_resumable() {
        let e = SyncError::AlbumIdentityMismatch {
            left: Uuid::new_v4(),
            right: Uuid::new_v4(),
        };
        assert!(!e.is_resumable());
    }

    #[test]
    fn test_cancelled_resumable() {
        assert!(SyncError::Cancelled.is_resumable());
    }

    #[test]
    fn test_album_error_resumable() {
        let e = SyncError::from(AlbumError::Query("disk I/O error".into()));
        assert!(e.is_resumable());
    }
}
