use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories::BaseDirs;
use log::{debug, info};
use rusqlite::Connection;

use super::schema::migrate;

/// Folder name used beneath the user's home directory for application data.
const DATA_DIR_NAME: &str = ".lyrics-library";
/// SQLite file name stored inside the application data directory.
const DB_FILE_NAME: &str = "lyrics_db";

/// Where the song database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryConfig {
    pub db_path: PathBuf,
}

impl LibraryConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// Resolve `~/.lyrics-library/lyrics_db`.
    pub fn default_location() -> Result<Self> {
        let base_dirs =
            BaseDirs::new().ok_or_else(|| anyhow!("could not locate home directory"))?;
        Ok(Self::new(
            base_dirs.home_dir().join(DATA_DIR_NAME).join(DB_FILE_NAME),
        ))
    }
}

/// Open (creating if needed) the database file, apply pragmas and bring the
/// schema up to date. A migration failure aborts the open; the caller never
/// receives a connection to a half-upgraded store.
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("failed to create data directory")?;
        }
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database at {}", path.display()))?;
    let journal_mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .context("failed to enable write-ahead logging")?;
    debug!("journal mode is {journal_mode}");
    prepare(&mut conn)?;

    info!("opened song database at {}", path.display());
    Ok(conn)
}

/// In-memory database with the current schema, used by tests and dry runs.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    prepare(&mut conn)?;
    Ok(conn)
}

fn prepare(conn: &mut Connection) -> Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("failed to enable foreign keys")?;
    migrate(conn).context("failed to migrate song database")?;
    Ok(())
}
