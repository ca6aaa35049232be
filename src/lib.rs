//! Core library surface for the lyrics library: a SQLite-backed song store
//! with forward-only schema migrations, live queries, and JSON backup.
//!
//! The binary only glues these pieces to a command line; other front-ends are
//! expected to hold one [`SongLibrary`] and pass clones of it around.
pub mod backup;
pub mod db;
pub mod draft;
pub mod error;
pub mod library;
pub mod models;

/// Backup entry points used by the binary's `export`/`import` commands.
pub use backup::{backup_file_name, export_songs, import_songs, ImportMode, ImportSummary};

pub use db::LibraryConfig;
pub use draft::{suggest_completion, SongDraft};
pub use error::LibraryError;
pub use library::{GroupField, LiveQuery, SongLibrary};

/// The primary domain types that other layers manipulate.
pub use models::{Lyrics, Song, SongId, DEFAULT_LANGUAGE};
