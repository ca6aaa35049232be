//! Failure conditions callers are expected to tell apart. Everything else is
//! reported as a plain `anyhow::Error` with context attached.

use thiserror::Error;

use crate::models::SongId;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Song {0} not found")]
    SongNotFound(SongId),

    #[error("Song has no id; insert it before updating")]
    MissingId,

    #[error("database has a songs table but no schema version")]
    UnversionedSchema,

    #[error("schema version {found} is newer than the supported version {supported}")]
    SchemaTooNew { found: u32, supported: u32 },

    #[error("no migration registered from schema version {0}")]
    MissingMigration(u32),

    #[error("backup entry {index}: {reason}")]
    MalformedBackup { index: usize, reason: String },

    #[error("backup entry {index} uses format version {found}; newest supported is {supported}")]
    UnsupportedBackupFormat {
        index: usize,
        found: u64,
        supported: u64,
    },
}
