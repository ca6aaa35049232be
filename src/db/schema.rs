//! Versioned layout of the `songs` table and the forward-only chain that
//! upgrades older stores. The version lives in `PRAGMA user_version`.
//!
//! | version | change |
//! |---------|--------|
//! | 1 | `id, title, artist, category, lyrics, youtubeLink` |
//! | 2 | `artist` renamed to `composer`, `deity` added |
//! | 3 | `category` replaced by the JSON `categories` list |
//! | 4 | `isFavorite` added |
//! | 5 | `lyrics` rewritten from plain text to a language-keyed JSON object |
//! | 6 | `ragam` added |

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rusqlite::{params, Connection, Transaction};

use crate::error::LibraryError;
use crate::models::Lyrics;

pub const CURRENT_SCHEMA_VERSION: u32 = 6;

const CREATE_SONGS_SQL: &str = "CREATE TABLE songs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    composer TEXT NOT NULL DEFAULT '',
    deity TEXT,
    ragam TEXT,
    lyrics TEXT NOT NULL DEFAULT '{}',
    categories TEXT NOT NULL DEFAULT '[]',
    youtubeLink TEXT,
    isFavorite INTEGER NOT NULL DEFAULT 0
)";

/// One `from_version -> from_version + 1` step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub from_version: u32,
    pub description: &'static str,
    pub apply: fn(&Transaction<'_>) -> Result<()>,
}

/// Every shipped step, in ascending order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        from_version: 1,
        description: "rename artist to composer and add deity",
        apply: rename_artist_add_deity,
    },
    Migration {
        from_version: 2,
        description: "replace single category with categories list",
        apply: split_categories,
    },
    Migration {
        from_version: 3,
        description: "add favorite flag",
        apply: add_favorite_flag,
    },
    Migration {
        from_version: 4,
        description: "key lyrics by language",
        apply: key_lyrics_by_language,
    },
    Migration {
        from_version: 5,
        description: "add ragam",
        apply: add_ragam,
    },
];

/// Bring the store up to [`CURRENT_SCHEMA_VERSION`] using the shipped chain.
pub fn migrate(conn: &mut Connection) -> Result<u32> {
    run_migrations(conn, MIGRATIONS)
}

/// Bring the store up to [`CURRENT_SCHEMA_VERSION`] using `migrations`.
///
/// Each step commits together with its version bump, so a failing step
/// leaves the store at the version it started from.
pub fn run_migrations(conn: &mut Connection, migrations: &[Migration]) -> Result<u32> {
    let mut version = schema_version(conn)?;

    if version == 0 {
        if table_exists(conn, "songs")? {
            return Err(LibraryError::UnversionedSchema.into());
        }
        let tx = conn
            .transaction()
            .context("failed to start schema creation")?;
        tx.execute(CREATE_SONGS_SQL, [])
            .context("failed to create songs table")?;
        set_schema_version(&tx, CURRENT_SCHEMA_VERSION)?;
        tx.commit().context("failed to commit schema creation")?;
        info!("created song schema at version {CURRENT_SCHEMA_VERSION}");
        return Ok(CURRENT_SCHEMA_VERSION);
    }

    if version > CURRENT_SCHEMA_VERSION {
        return Err(LibraryError::SchemaTooNew {
            found: version,
            supported: CURRENT_SCHEMA_VERSION,
        }
        .into());
    }

    while version < CURRENT_SCHEMA_VERSION {
        let step = migrations
            .iter()
            .find(|migration| migration.from_version == version)
            .ok_or(LibraryError::MissingMigration(version))?;

        info!(
            "migrating song schema {} -> {}: {}",
            version,
            version + 1,
            step.description
        );
        let tx = conn
            .transaction()
            .with_context(|| format!("failed to start migration from version {version}"))?;
        (step.apply)(&tx)
            .with_context(|| format!("migration from version {version} failed"))?;
        set_schema_version(&tx, version + 1)?;
        tx.commit()
            .with_context(|| format!("failed to commit migration from version {version}"))?;
        version += 1;
    }

    Ok(version)
}

pub fn schema_version(conn: &Connection) -> Result<u32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read schema version")
}

fn set_schema_version(conn: &Connection, version: u32) -> Result<()> {
    conn.pragma_update(None, "user_version", version)
        .with_context(|| format!("failed to record schema version {version}"))
}

fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![table_name],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("failed to check if table exists: {table_name}"))?;
    Ok(exists == 1)
}

fn rename_artist_add_deity(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch(
        "ALTER TABLE songs RENAME COLUMN artist TO composer;
         ALTER TABLE songs ADD COLUMN deity TEXT;",
    )
    .context("failed to rename artist column")
}

fn split_categories(tx: &Transaction<'_>) -> Result<()> {
    tx.execute(
        "ALTER TABLE songs ADD COLUMN categories TEXT NOT NULL DEFAULT '[]'",
        [],
    )
    .context("failed to add categories column")?;

    let rows = {
        let mut stmt = tx
            .prepare("SELECT id, category FROM songs")
            .context("failed to prepare category scan")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
            })
            .context("failed to scan categories")?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to collect categories")?;
        rows
    };

    for (id, category) in rows {
        let categories: Vec<String> = category
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .into_iter()
            .collect();
        let encoded =
            serde_json::to_string(&categories).context("failed to encode categories")?;
        tx.execute(
            "UPDATE songs SET categories = ?1 WHERE id = ?2",
            params![encoded, id],
        )
        .with_context(|| format!("failed to rewrite categories of song {id}"))?;
    }

    tx.execute("ALTER TABLE songs DROP COLUMN category", [])
        .context("failed to drop category column")?;
    Ok(())
}

fn add_favorite_flag(tx: &Transaction<'_>) -> Result<()> {
    tx.execute(
        "ALTER TABLE songs ADD COLUMN isFavorite INTEGER NOT NULL DEFAULT 0",
        [],
    )
    .context("failed to add isFavorite column")?;
    Ok(())
}

fn key_lyrics_by_language(tx: &Transaction<'_>) -> Result<()> {
    let rows = {
        let mut stmt = tx
            .prepare("SELECT id, lyrics FROM songs")
            .context("failed to prepare lyrics scan")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
            })
            .context("failed to scan lyrics")?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to collect lyrics")?;
        rows
    };

    debug!("rewriting lyrics of {} songs", rows.len());
    for (id, text) in rows {
        if text.is_none() {
            warn!("song {id} has no lyrics; storing an empty mapping");
        }
        let lyrics = Lyrics::from_plain_text(text.as_deref().unwrap_or_default());
        let encoded = serde_json::to_string(&lyrics).context("failed to encode lyrics")?;
        tx.execute(
            "UPDATE songs SET lyrics = ?1 WHERE id = ?2",
            params![encoded, id],
        )
        .with_context(|| format!("failed to rewrite lyrics of song {id}"))?;
    }
    Ok(())
}

fn add_ragam(tx: &Transaction<'_>) -> Result<()> {
    tx.execute("ALTER TABLE songs ADD COLUMN ragam TEXT", [])
        .context("failed to add ragam column")?;
    Ok(())
}
