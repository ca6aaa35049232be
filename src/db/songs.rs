use anyhow::{Context, Result};
use log::warn;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::LibraryError;
use crate::models::{Lyrics, Song, SongId};

const SONG_COLUMNS: &str =
    "id, title, composer, deity, ragam, lyrics, categories, youtubeLink, isFavorite";

/// Plain-text columns that can be listed or filtered by exact value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextColumn {
    Composer,
    Deity,
    Ragam,
}

impl TextColumn {
    fn name(self) -> &'static str {
        match self {
            TextColumn::Composer => "composer",
            TextColumn::Deity => "deity",
            TextColumn::Ragam => "ragam",
        }
    }
}

/// Unreadable JSON cells are kept readable instead of failing the whole
/// query: lyrics fall back to plain text and categories to an empty list.
fn song_from_row(row: &Row<'_>) -> rusqlite::Result<Song> {
    let id: SongId = row.get("id")?;
    let raw_lyrics: String = row.get("lyrics")?;
    let raw_categories: String = row.get("categories")?;

    let lyrics = serde_json::from_str::<Lyrics>(&raw_lyrics).unwrap_or_else(|err| {
        warn!("song {id} has unreadable lyrics, treating them as plain text: {err}");
        Lyrics::from_plain_text(&raw_lyrics)
    });
    let categories = serde_json::from_str::<Vec<String>>(&raw_categories).unwrap_or_else(|err| {
        warn!("song {id} has unreadable categories {raw_categories:?}: {err}");
        Vec::new()
    });

    Ok(Song {
        id: Some(id),
        title: row.get("title")?,
        composer: row.get::<_, Option<String>>("composer")?.unwrap_or_default(),
        deity: row.get("deity")?,
        ragam: row.get("ragam")?,
        lyrics,
        categories,
        youtube_link: row.get("youtubeLink")?,
        is_favorite: row.get("isFavorite")?,
    })
}

/// Case-insensitive (Unicode) order with the raw text as tie-breaker, then
/// drop exact duplicates.
fn sort_labels(labels: &mut Vec<String>) {
    labels.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));
    labels.dedup();
}

fn encode_columns(song: &Song) -> Result<(String, String)> {
    let lyrics = serde_json::to_string(&song.lyrics).context("failed to encode lyrics")?;
    let categories =
        serde_json::to_string(&song.categories).context("failed to encode categories")?;
    Ok((lyrics, categories))
}

/// Run a `SELECT` over the song columns and hydrate every row.
fn query_songs<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    what: &str,
) -> Result<Vec<Song>> {
    let mut stmt = conn
        .prepare(sql)
        .with_context(|| format!("failed to prepare {what} query"))?;

    let songs = stmt
        .query_map(params, song_from_row)
        .with_context(|| format!("failed to iterate {what}"))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to collect {what}"))?;

    Ok(songs)
}

/// Insert a song and return its id. A song carrying an id that already
/// exists replaces that row wholesale.
pub fn insert_song(conn: &Connection, song: &Song) -> Result<SongId> {
    let (lyrics, categories) = encode_columns(song)?;
    conn.execute(
        "INSERT OR REPLACE INTO songs
             (id, title, composer, deity, ragam, lyrics, categories, youtubeLink, isFavorite)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            song.id,
            song.title,
            song.composer,
            song.deity,
            song.ragam,
            lyrics,
            categories,
            song.youtube_link,
            song.is_favorite,
        ],
    )
    .context("failed to insert song")?;

    Ok(song.id.unwrap_or_else(|| conn.last_insert_rowid()))
}

/// Replace every field of an existing song. Unknown ids are reported as
/// [`LibraryError::SongNotFound`] rather than silently ignored.
pub fn update_song(conn: &Connection, song: &Song) -> Result<()> {
    let id = song.id.ok_or(LibraryError::MissingId)?;
    let (lyrics, categories) = encode_columns(song)?;
    let updated = conn
        .execute(
            "UPDATE songs
             SET title = ?1, composer = ?2, deity = ?3, ragam = ?4, lyrics = ?5,
                 categories = ?6, youtubeLink = ?7, isFavorite = ?8
             WHERE id = ?9",
            params![
                song.title,
                song.composer,
                song.deity,
                song.ragam,
                lyrics,
                categories,
                song.youtube_link,
                song.is_favorite,
                id,
            ],
        )
        .context("failed to update song")?;

    if updated == 0 {
        Err(LibraryError::SongNotFound(id).into())
    } else {
        Ok(())
    }
}

/// Remove a song. Returns whether a row was actually deleted.
pub fn delete_song(conn: &Connection, id: SongId) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM songs WHERE id = ?1", params![id])
        .context("failed to delete song")?;
    Ok(deleted > 0)
}

/// Remove a selection of songs, returning how many existed. Either every
/// selected row goes or none does.
pub fn delete_songs(conn: &Connection, ids: &[SongId]) -> Result<usize> {
    let tx = conn
        .unchecked_transaction()
        .context("failed to start bulk delete")?;
    let mut deleted = 0;
    {
        let mut stmt = tx
            .prepare("DELETE FROM songs WHERE id = ?1")
            .context("failed to prepare bulk delete")?;
        for id in ids {
            deleted += stmt
                .execute(params![id])
                .with_context(|| format!("failed to delete song {id}"))?;
        }
    }
    tx.commit().context("failed to commit bulk delete")?;
    Ok(deleted)
}

/// Remove every song. Irreversible.
pub fn delete_all_songs(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM songs", [])
        .context("failed to delete all songs")
}

/// Every song ordered by title (binary collation), ties broken by id.
pub fn fetch_all_songs(conn: &Connection) -> Result<Vec<Song>> {
    query_songs(
        conn,
        &format!("SELECT {SONG_COLUMNS} FROM songs ORDER BY title, id"),
        [],
        "all songs",
    )
}

/// Every song in insertion order; used for export snapshots.
pub fn fetch_songs_snapshot(conn: &Connection) -> Result<Vec<Song>> {
    query_songs(
        conn,
        &format!("SELECT {SONG_COLUMNS} FROM songs ORDER BY id"),
        [],
        "song snapshot",
    )
}

/// Songs where any searchable field contains `query`, ignoring case. A blank
/// query matches everything.
pub fn search_songs(conn: &Connection, query: &str) -> Result<Vec<Song>> {
    let songs = fetch_all_songs(conn)?;
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Ok(songs);
    }
    Ok(songs
        .into_iter()
        .filter(|song| song.matches_lowercase(&needle))
        .collect())
}

/// Number of stored songs, for the library header.
pub fn count_songs(conn: &Connection) -> Result<usize> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM songs", [], |row| row.get(0))
        .context("failed to count songs")?;
    Ok(usize::try_from(count).unwrap_or_default())
}

/// Exact `(title, composer)` lookup used for import de-duplication.
pub fn find_song_by_title_and_composer(
    conn: &Connection,
    title: &str,
    composer: &str,
) -> Result<Option<Song>> {
    conn.query_row(
        &format!("SELECT {SONG_COLUMNS} FROM songs WHERE title = ?1 AND composer = ?2 LIMIT 1"),
        params![title, composer],
        song_from_row,
    )
    .optional()
    .context("failed to look up song by title and composer")
}

/// A single song, or `None` when the id is unknown or was deleted.
pub fn fetch_song_by_id(conn: &Connection, id: SongId) -> Result<Option<Song>> {
    conn.query_row(
        &format!("SELECT {SONG_COLUMNS} FROM songs WHERE id = ?1"),
        params![id],
        song_from_row,
    )
    .optional()
    .with_context(|| format!("failed to load song {id}"))
}

/// Distinct non-blank values of `column`, used to fill suggestion lists.
/// Values made only of whitespace are skipped; ordering matches
/// [`fetch_categories`].
pub fn fetch_distinct_values(conn: &Connection, column: TextColumn) -> Result<Vec<String>> {
    let column = column.name();
    let mut stmt = conn
        .prepare(&format!(
            "SELECT DISTINCT {column} FROM songs WHERE {column} IS NOT NULL"
        ))
        .with_context(|| format!("failed to prepare {column} query"))?;

    let mut values = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .with_context(|| format!("failed to execute {column} query"))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to read {column} values"))?;

    values.retain(|value| !value.trim().is_empty());
    sort_labels(&mut values);
    Ok(values)
}

/// Songs whose `column` equals `value` exactly, ordered by title.
pub fn fetch_songs_where(conn: &Connection, column: TextColumn, value: &str) -> Result<Vec<Song>> {
    let column_name = column.name();
    query_songs(
        conn,
        &format!("SELECT {SONG_COLUMNS} FROM songs WHERE {column_name} = ?1 ORDER BY title, id"),
        params![value],
        &format!("songs by {column_name}"),
    )
}

/// Songs flagged as favourites, ordered like [`fetch_all_songs`].
pub fn fetch_favorite_songs(conn: &Connection) -> Result<Vec<Song>> {
    query_songs(
        conn,
        &format!("SELECT {SONG_COLUMNS} FROM songs WHERE isFavorite = 1 ORDER BY title, id"),
        [],
        "favorite songs",
    )
}

/// Distinct non-blank category labels across every song, lowercase-sorted.
pub fn fetch_categories(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT categories FROM songs")
        .context("failed to prepare category query")?;
    let encoded = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("failed to iterate categories")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect categories")?;

    let mut categories = Vec::new();
    for raw in encoded {
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(labels) => categories.extend(
                labels
                    .into_iter()
                    .filter(|label| !label.trim().is_empty()),
            ),
            Err(err) => warn!("skipping unreadable categories {raw:?}: {err}"),
        }
    }
    sort_labels(&mut categories);
    Ok(categories)
}

/// Songs tagged with `category` exactly, ordered by title.
pub fn fetch_songs_in_category(conn: &Connection, category: &str) -> Result<Vec<Song>> {
    Ok(fetch_all_songs(conn)?
        .into_iter()
        .filter(|song| song.categories.iter().any(|label| label == category))
        .collect())
}

/// Set the favourite flag of an existing song.
pub fn set_favorite(conn: &Connection, id: SongId, is_favorite: bool) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE songs SET isFavorite = ?1 WHERE id = ?2",
            params![is_favorite, id],
        )
        .context("failed to update favorite flag")?;

    if updated == 0 {
        Err(LibraryError::SongNotFound(id).into())
    } else {
        Ok(())
    }
}

/// Flip the favourite flag and return its new value.
pub fn toggle_favorite(conn: &Connection, id: SongId) -> Result<bool> {
    let current: Option<bool> = conn
        .query_row(
            "SELECT isFavorite FROM songs WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("failed to read favorite flag of song {id}"))?;

    let next = !current.ok_or(LibraryError::SongNotFound(id))?;
    set_favorite(conn, id, next)?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn titles(songs: &[Song]) -> Vec<&str> {
        songs.iter().map(|song| song.title.as_str()).collect()
    }

    #[test]
    fn insert_assigns_ids_and_round_trips_all_fields() -> Result<()> {
        let conn = open_in_memory()?;
        let song = Song::new("Hello")
            .with_composer("Adele")
            .with_deity("None")
            .with_ragam("Mohanam")
            .with_lyrics("English", "Hello from the other side")
            .with_lyrics("French", "Bonjour")
            .with_category("Pop")
            .with_youtube_link("https://youtu.be/YQHsXMglC9A")
            .favorite(true);

        let id = insert_song(&conn, &song)?;
        let stored = fetch_song_by_id(&conn, id)?.expect("inserted song");

        assert_eq!(stored, Song { id: Some(id), ..song });
        Ok(())
    }

    #[test]
    fn insert_with_existing_id_replaces_the_row() -> Result<()> {
        let conn = open_in_memory()?;
        let id = insert_song(&conn, &Song::new("First").with_composer("A"))?;

        let replacement = Song {
            id: Some(id),
            ..Song::new("Second")
        };
        assert_eq!(insert_song(&conn, &replacement)?, id);

        let songs = fetch_all_songs(&conn)?;
        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].title, "Second");
        assert_eq!(songs[0].composer, "");
        Ok(())
    }

    #[test]
    fn ids_are_not_reused_after_delete() -> Result<()> {
        let conn = open_in_memory()?;
        let first = insert_song(&conn, &Song::new("One"))?;
        assert!(delete_song(&conn, first)?);
        let second = insert_song(&conn, &Song::new("Two"))?;
        assert!(second > first);
        Ok(())
    }

    #[test]
    fn update_of_unknown_song_reports_not_found() -> Result<()> {
        let conn = open_in_memory()?;
        let ghost = Song {
            id: Some(42),
            ..Song::new("Ghost")
        };
        let err = update_song(&conn, &ghost).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LibraryError>(),
            Some(LibraryError::SongNotFound(42))
        ));

        let err = update_song(&conn, &Song::new("No id")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LibraryError>(),
            Some(LibraryError::MissingId)
        ));
        Ok(())
    }

    #[test]
    fn delete_of_unknown_song_is_a_no_op() -> Result<()> {
        let conn = open_in_memory()?;
        assert!(!delete_song(&conn, 7)?);
        Ok(())
    }

    #[test]
    fn songs_are_sorted_by_title_bytewise() -> Result<()> {
        let conn = open_in_memory()?;
        for title in ["banana", "Cherry", "apple", "Banana"] {
            insert_song(&conn, &Song::new(title))?;
        }
        assert_eq!(
            titles(&fetch_all_songs(&conn)?),
            ["Banana", "Cherry", "apple", "banana"]
        );
        Ok(())
    }

    #[test]
    fn count_and_bulk_delete() -> Result<()> {
        let conn = open_in_memory()?;
        let ids = ["a", "b", "c", "d"]
            .into_iter()
            .map(|title| insert_song(&conn, &Song::new(title)))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(count_songs(&conn)?, 4);

        assert_eq!(delete_songs(&conn, &[ids[0], ids[2], 999])?, 2);
        assert_eq!(count_songs(&conn)?, 2);

        assert_eq!(delete_all_songs(&conn)?, 2);
        assert_eq!(count_songs(&conn)?, 0);
        Ok(())
    }

    #[test]
    fn search_covers_lyrics_and_categories() -> Result<()> {
        let conn = open_in_memory()?;
        insert_song(
            &conn,
            &Song::new("Endaro Mahanubhavulu")
                .with_composer("Thyagaraja")
                .with_lyrics("Telugu", "andariki vandanamulu")
                .with_category("Pancharatna"),
        )?;
        insert_song(&conn, &Song::new("Hello").with_composer("Adele"))?;

        assert_eq!(titles(&search_songs(&conn, "VANDANAM")?), ["Endaro Mahanubhavulu"]);
        assert_eq!(titles(&search_songs(&conn, "pancha")?), ["Endaro Mahanubhavulu"]);
        assert_eq!(titles(&search_songs(&conn, "adele")?), ["Hello"]);
        assert_eq!(search_songs(&conn, "   ")?.len(), 2);
        assert!(search_songs(&conn, "zzz")?.is_empty());
        Ok(())
    }

    #[test]
    fn distinct_values_skip_blanks_and_sort_case_insensitively() -> Result<()> {
        let conn = open_in_memory()?;
        insert_song(&conn, &Song::new("1").with_composer("thyagaraja"))?;
        insert_song(&conn, &Song::new("2").with_composer("Dikshitar"))?;
        insert_song(&conn, &Song::new("3").with_composer("Dikshitar").with_deity("Rama"))?;
        insert_song(&conn, &Song::new("4").with_composer("  ").with_deity(""))?;

        assert_eq!(
            fetch_distinct_values(&conn, TextColumn::Composer)?,
            ["Dikshitar", "thyagaraja"]
        );
        assert_eq!(fetch_distinct_values(&conn, TextColumn::Deity)?, ["Rama"]);
        assert_eq!(
            titles(&fetch_songs_where(&conn, TextColumn::Composer, "Dikshitar")?),
            ["2", "3"]
        );
        Ok(())
    }

    #[test]
    fn distinct_values_ignore_other_whitespace_and_fold_unicode_case() -> Result<()> {
        let conn = open_in_memory()?;
        insert_song(&conn, &Song::new("1").with_composer("Ärger").with_deity("\t"))?;
        insert_song(&conn, &Song::new("2").with_composer("äb").with_deity("\n "))?;

        assert_eq!(fetch_distinct_values(&conn, TextColumn::Composer)?, ["äb", "Ärger"]);
        assert!(fetch_distinct_values(&conn, TextColumn::Deity)?.is_empty());
        Ok(())
    }

    #[test]
    fn unreadable_json_cells_do_not_hide_the_song() -> Result<()> {
        let conn = open_in_memory()?;
        insert_song(&conn, &Song::new("Good"))?;
        conn.execute(
            "INSERT INTO songs (title, lyrics, categories)
             VALUES ('Legacy', 'plain text not json', 'Kriti')",
            [],
        )?;

        let songs = fetch_all_songs(&conn)?;
        assert_eq!(titles(&songs), ["Good", "Legacy"]);
        let legacy = &songs[1];
        assert_eq!(legacy.lyrics.get(crate::models::DEFAULT_LANGUAGE), Some("plain text not json"));
        assert!(legacy.categories.is_empty());
        assert_eq!(titles(&search_songs(&conn, "not json")?), ["Legacy"]);
        Ok(())
    }

    #[test]
    fn bulk_delete_is_all_or_nothing() -> Result<()> {
        let conn = open_in_memory()?;
        let kept = insert_song(&conn, &Song::new("Deletable"))?;
        let locked = insert_song(&conn, &Song::new("Locked"))?;
        conn.execute_batch(
            "CREATE TRIGGER keep_locked BEFORE DELETE ON songs
             WHEN old.title = 'Locked'
             BEGIN SELECT RAISE(ABORT, 'locked'); END;",
        )?;

        assert!(delete_songs(&conn, &[kept, locked]).is_err());
        assert_eq!(count_songs(&conn)?, 2);
        assert!(fetch_song_by_id(&conn, kept)?.is_some());
        Ok(())
    }

    #[test]
    fn categories_are_listed_and_filtered() -> Result<()> {
        let conn = open_in_memory()?;
        insert_song(&conn, &Song::new("x").with_category("Kriti").with_category("varnam"))?;
        insert_song(&conn, &Song::new("y").with_category("Kriti"))?;
        insert_song(&conn, &Song::new("z"))?;

        assert_eq!(fetch_categories(&conn)?, ["Kriti", "varnam"]);
        assert_eq!(titles(&fetch_songs_in_category(&conn, "Kriti")?), ["x", "y"]);
        assert!(fetch_songs_in_category(&conn, "kriti")?.is_empty());
        Ok(())
    }

    #[test]
    fn favorite_toggle_round_trip() -> Result<()> {
        let conn = open_in_memory()?;
        let id = insert_song(&conn, &Song::new("Fav"))?;

        assert!(toggle_favorite(&conn, id)?);
        assert_eq!(titles(&fetch_favorite_songs(&conn)?), ["Fav"]);
        assert!(!toggle_favorite(&conn, id)?);
        assert!(fetch_favorite_songs(&conn)?.is_empty());

        assert!(toggle_favorite(&conn, id + 1).is_err());
        Ok(())
    }
}
