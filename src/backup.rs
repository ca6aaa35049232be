//! JSON export and import of the whole song table.
//!
//! A backup is a top-level JSON array of song objects. Each exported object
//! carries `formatVersion`; objects without one are read as legacy format 1,
//! which may use `artist` instead of `composer`, a single `category` string,
//! and plain-text `lyrics`.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::Serialize;
use serde_json::{Map, Value};
use time::Date;

use crate::error::LibraryError;
use crate::library::SongLibrary;
use crate::models::{Lyrics, Song};

/// Format version written by [`export_songs`].
pub const BACKUP_FORMAT_VERSION: u64 = 2;
const LEGACY_FORMAT_VERSION: u64 = 1;

/// How an import treats songs that are already in the library.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImportMode {
    /// Add only songs whose `(title, composer)` pair is not stored yet.
    #[default]
    Merge,
    /// Wipe the library, then insert every song from the backup.
    Replace,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub skipped: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BackupEntry<'a> {
    format_version: u64,
    title: &'a str,
    composer: &'a str,
    deity: Option<&'a str>,
    ragam: Option<&'a str>,
    lyrics: &'a Lyrics,
    categories: &'a [String],
    youtube_link: Option<&'a str>,
    is_favorite: bool,
}

impl<'a> From<&'a Song> for BackupEntry<'a> {
    fn from(song: &'a Song) -> Self {
        Self {
            format_version: BACKUP_FORMAT_VERSION,
            title: &song.title,
            composer: &song.composer,
            deity: song.deity.as_deref(),
            ragam: song.ragam.as_deref(),
            lyrics: &song.lyrics,
            categories: &song.categories,
            youtube_link: song.youtube_link.as_deref(),
            is_favorite: song.is_favorite,
        }
    }
}

/// File name offered to the user when exporting on `date`.
pub fn backup_file_name(date: Date) -> String {
    format!(
        "lyrics_backup_{:02}{:02}{:04}.json",
        date.day(),
        u8::from(date.month()),
        date.year()
    )
}

/// Pretty-printed backup of `songs`. Ids are not exported.
pub fn encode_backup(songs: &[Song]) -> Result<String> {
    let entries: Vec<BackupEntry<'_>> = songs.iter().map(BackupEntry::from).collect();
    serde_json::to_string_pretty(&entries).context("failed to encode backup")
}

/// Snapshot the library into a backup document.
pub fn export_songs(library: &SongLibrary) -> Result<String> {
    let songs = library.all_songs_once()?;
    info!("exporting {} songs", songs.len());
    encode_backup(&songs)
}

/// Read a backup document into the library.
///
/// In [`ImportMode::Merge`] entries are decoded and written one at a time,
/// so songs inserted before a malformed entry stay in the library.
/// [`ImportMode::Replace`] decodes the whole document before touching the
/// library.
pub fn import_songs(library: &SongLibrary, json: &str, mode: ImportMode) -> Result<ImportSummary> {
    let entries = parse_entries(json)?;
    let mut summary = ImportSummary::default();

    match mode {
        ImportMode::Merge => {
            for (index, entry) in entries.iter().enumerate() {
                let song = decode_entry(index, entry)?;
                if library
                    .find_song_by_title_and_composer(&song.title, &song.composer)?
                    .is_some()
                {
                    debug!("skipping existing song {}", song.display_title());
                    summary.skipped += 1;
                    continue;
                }
                library.insert(&song)?;
                summary.inserted += 1;
            }
        }
        ImportMode::Replace => {
            let songs = entries
                .iter()
                .enumerate()
                .map(|(index, entry)| decode_entry(index, entry))
                .collect::<Result<Vec<_>>>()?;
            let removed = library.delete_all()?;
            debug!("replace import removed {removed} songs");
            for song in &songs {
                library.insert(song)?;
            }
            summary.inserted = songs.len();
        }
    }

    info!(
        "import finished: {} inserted, {} skipped",
        summary.inserted, summary.skipped
    );
    Ok(summary)
}

fn parse_entries(json: &str) -> Result<Vec<Value>> {
    let document: Value = serde_json::from_str(json).context("backup is not valid JSON")?;
    match document {
        Value::Array(entries) => Ok(entries),
        _ => Err(LibraryError::MalformedBackup {
            index: 0,
            reason: "top level is not an array".to_string(),
        }
        .into()),
    }
}

/// Decode one backup element, applying the legacy fallbacks.
pub fn decode_entry(index: usize, entry: &Value) -> Result<Song> {
    let malformed = |reason: String| LibraryError::MalformedBackup { index, reason };

    let object = entry
        .as_object()
        .ok_or_else(|| malformed("entry is not an object".to_string()))?;

    let version = match object.get("formatVersion") {
        None => LEGACY_FORMAT_VERSION,
        Some(value) => value
            .as_u64()
            .ok_or_else(|| malformed("formatVersion is not a positive integer".to_string()))?,
    };
    if version > BACKUP_FORMAT_VERSION {
        return Err(LibraryError::UnsupportedBackupFormat {
            index,
            found: version,
            supported: BACKUP_FORMAT_VERSION,
        }
        .into());
    }

    let title = required_string(object, "title").map_err(malformed)?;
    let composer = match optional_string(object, "composer").map_err(malformed)? {
        Some(composer) => composer,
        None => optional_string(object, "artist")
            .map_err(malformed)?
            .unwrap_or_default(),
    };

    let lyrics = match object.get("lyrics") {
        None | Some(Value::Null) => Lyrics::new(),
        Some(Value::String(text)) => Lyrics::from_plain_text(text),
        Some(value @ Value::Object(_)) => serde_json::from_value(value.clone())
            .map_err(|err| malformed(format!("lyrics: {err}")))?,
        Some(_) => return Err(malformed("lyrics must be an object or a string".to_string()).into()),
    };

    let categories = match object.get("categories") {
        None | Some(Value::Null) => optional_string(object, "category")
            .map_err(malformed)?
            .map(|category| category.trim().to_string())
            .filter(|category| !category.is_empty())
            .into_iter()
            .collect(),
        Some(value) => serde_json::from_value::<Vec<String>>(value.clone())
            .map_err(|err| malformed(format!("categories: {err}")))?,
    };

    let is_favorite = match object.get("isFavorite") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return Err(malformed("isFavorite must be a boolean".to_string()).into()),
    };

    Ok(Song {
        id: None,
        title,
        composer,
        deity: optional_string(object, "deity").map_err(malformed)?,
        ragam: optional_string(object, "ragam").map_err(malformed)?,
        lyrics,
        categories,
        youtube_link: optional_string(object, "youtubeLink").map_err(malformed)?,
        is_favorite,
    })
}

fn required_string(object: &Map<String, Value>, key: &str) -> Result<String, String> {
    optional_string(object, key)?.ok_or_else(|| format!("missing required `{key}`"))
}

fn optional_string(object: &Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(format!("`{key}` must be a string")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::Month;

    fn library_with(songs: &[Song]) -> Result<SongLibrary> {
        let library = SongLibrary::open_in_memory()?;
        for song in songs {
            library.insert(song)?;
        }
        Ok(library)
    }

    fn malformed_index(err: &anyhow::Error) -> Option<usize> {
        match err.downcast_ref::<LibraryError>() {
            Some(LibraryError::MalformedBackup { index, .. }) => Some(*index),
            _ => None,
        }
    }

    #[test]
    fn backup_file_name_uses_day_month_year() -> Result<()> {
        let date = Date::from_calendar_date(2024, Month::March, 7)?;
        assert_eq!(backup_file_name(date), "lyrics_backup_07032024.json");
        Ok(())
    }

    #[test]
    fn export_writes_every_field_with_format_version() -> Result<()> {
        let library = library_with(&[Song::new("Hello")
            .with_composer("Adele")
            .with_lyrics("English", "Hello from the other side")
            .with_category("Pop")
            .favorite(true)])?;

        let document: Value = serde_json::from_str(&export_songs(&library)?)?;
        assert_eq!(
            document,
            json!([{
                "formatVersion": 2,
                "title": "Hello",
                "composer": "Adele",
                "deity": null,
                "ragam": null,
                "lyrics": { "English": "Hello from the other side" },
                "categories": ["Pop"],
                "youtubeLink": null,
                "isFavorite": true
            }])
        );
        Ok(())
    }

    #[test]
    fn legacy_entry_falls_back_to_artist_category_and_plain_lyrics() -> Result<()> {
        let entry = json!({
            "title": "Old",
            "artist": "Someone",
            "category": "Bhajan",
            "lyrics": "single text"
        });
        let song = decode_entry(0, &entry)?;

        assert_eq!(song.composer, "Someone");
        assert_eq!(song.categories, ["Bhajan"]);
        assert_eq!(song.lyrics, Lyrics::from_plain_text("single text"));
        assert_eq!(song.deity, None);
        assert_eq!(song.youtube_link, None);
        assert!(!song.is_favorite);
        Ok(())
    }

    #[test]
    fn composer_wins_over_artist_and_missing_both_is_empty() -> Result<()> {
        let both = json!({ "title": "T", "composer": "C", "artist": "A" });
        assert_eq!(decode_entry(0, &both)?.composer, "C");

        let neither = json!({ "title": "T" });
        assert_eq!(decode_entry(0, &neither)?.composer, "");
        Ok(())
    }

    #[test]
    fn entry_without_title_is_malformed() {
        let err = decode_entry(3, &json!({ "composer": "C" })).unwrap_err();
        assert_eq!(malformed_index(&err), Some(3));
    }

    #[test]
    fn newer_format_version_is_refused() {
        let err = decode_entry(0, &json!({ "formatVersion": 3, "title": "T" })).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LibraryError>(),
            Some(LibraryError::UnsupportedBackupFormat { found: 3, .. })
        ));
    }

    #[test]
    fn merge_import_skips_existing_title_and_composer() -> Result<()> {
        let library = library_with(&[Song::new("Hello")
            .with_composer("Adele")
            .with_lyrics("English", "kept")])?;
        let backup = json!([
            { "title": "Hello", "composer": "Adele", "lyrics": { "English": "ignored" } },
            { "title": "Hello", "composer": "Lionel Richie" }
        ])
        .to_string();

        let summary = import_songs(&library, &backup, ImportMode::Merge)?;
        assert_eq!(summary, ImportSummary { inserted: 1, skipped: 1 });
        assert_eq!(library.song_count()?, 2);

        let adele = library
            .find_song_by_title_and_composer("Hello", "Adele")?
            .expect("existing song");
        assert_eq!(adele.lyrics.get("English"), Some("kept"));
        Ok(())
    }

    #[test]
    fn merge_import_keeps_rows_before_a_malformed_entry() -> Result<()> {
        let library = SongLibrary::open_in_memory()?;
        let backup = json!([{ "title": "First" }, { "composer": "no title" }, { "title": "Never" }])
            .to_string();

        let err = import_songs(&library, &backup, ImportMode::Merge).unwrap_err();
        assert_eq!(malformed_index(&err), Some(1));
        assert_eq!(library.song_count()?, 1);
        Ok(())
    }

    #[test]
    fn replace_import_wipes_library_first() -> Result<()> {
        let library = library_with(&[Song::new("Gone"), Song::new("Hello").with_composer("Adele")])?;
        let backup = json!([
            { "title": "Hello", "composer": "Adele" },
            { "title": "New" }
        ])
        .to_string();

        let summary = import_songs(&library, &backup, ImportMode::Replace)?;
        assert_eq!(summary.inserted, 2);
        let titles: Vec<_> = library
            .all_songs_once()?
            .into_iter()
            .map(|song| song.title)
            .collect();
        assert_eq!(titles, ["Hello", "New"]);
        Ok(())
    }

    #[test]
    fn replace_import_leaves_library_alone_when_document_is_bad() -> Result<()> {
        let library = library_with(&[Song::new("Safe")])?;
        let backup = json!([{ "title": "Ok" }, { "title": 5 }]).to_string();

        assert!(import_songs(&library, &backup, ImportMode::Replace).is_err());
        assert_eq!(library.song_count()?, 1);
        Ok(())
    }

    #[test]
    fn non_array_document_is_rejected() -> Result<()> {
        let library = SongLibrary::open_in_memory()?;
        assert!(import_songs(&library, "{\"title\": \"x\"}", ImportMode::Merge).is_err());
        assert!(import_songs(&library, "not json", ImportMode::Merge).is_err());
        Ok(())
    }
}
