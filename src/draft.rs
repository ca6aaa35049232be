//! Raw song input as typed by a user, plus the checks that turn it into a
//! [`Song`]. Storage accepts anything; this is the path that keeps titles
//! and lyrics rows meaningful.

use anyhow::{anyhow, Result};

use crate::models::{Lyrics, Song, SongId};

/// Minimum number of typed characters before a completion is offered.
const MIN_COMPLETION_INPUT: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SongDraft {
    pub title: String,
    pub composer: String,
    pub deity: String,
    pub ragam: String,
    /// `(language, text)` rows in display order.
    pub lyrics: Vec<(String, String)>,
    pub categories: Vec<String>,
    pub youtube_link: String,
    pub is_favorite: bool,
}

impl SongDraft {
    /// Populate the draft from an existing song when editing.
    pub fn from_song(song: &Song) -> Self {
        Self {
            title: song.title.clone(),
            composer: song.composer.clone(),
            deity: song.deity.clone().unwrap_or_default(),
            ragam: song.ragam.clone().unwrap_or_default(),
            lyrics: song
                .lyrics
                .iter()
                .map(|(language, text)| (language.to_string(), text.to_string()))
                .collect(),
            categories: song.categories.clone(),
            youtube_link: song.youtube_link.clone().unwrap_or_default(),
            is_favorite: song.is_favorite,
        }
    }

    /// Validate and normalize the draft. `id` is `None` for new songs.
    pub fn into_song(self, id: Option<SongId>) -> Result<Song> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(anyhow!("Song title is required."));
        }

        let mut lyrics = Lyrics::new();
        for (row, (language, text)) in self.lyrics.iter().enumerate() {
            let language = language.trim();
            if language.is_empty() {
                return Err(anyhow!("Lyrics row {} needs a language.", row + 1));
            }
            if text.trim().is_empty() {
                return Err(anyhow!("Lyrics for {language} are empty."));
            }
            if lyrics.get(language).is_some() {
                return Err(anyhow!("Lyrics for {language} were entered twice."));
            }
            lyrics.insert(language, text.as_str());
        }

        let mut categories: Vec<String> = Vec::new();
        for category in &self.categories {
            let category = category.trim();
            if !category.is_empty() && !categories.iter().any(|existing| existing == category) {
                categories.push(category.to_string());
            }
        }

        Ok(Song {
            id,
            title: title.to_string(),
            composer: self.composer.trim().to_string(),
            deity: non_blank(&self.deity),
            ragam: non_blank(&self.ragam),
            lyrics,
            categories,
            youtube_link: non_blank(&self.youtube_link),
            is_favorite: self.is_favorite,
        })
    }
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Complete `input` from `candidates` (e.g. the unique composer list) by
/// case-insensitive prefix. Nothing is offered for very short input or when
/// the input already equals the candidate.
pub fn suggest_completion<'a>(input: &str, candidates: &'a [String]) -> Option<&'a str> {
    if input.chars().count() < MIN_COMPLETION_INPUT {
        return None;
    }

    let current_lower = input.to_lowercase();
    let candidate = candidates
        .iter()
        .find(|candidate| candidate.to_lowercase().starts_with(&current_lower))?;

    if candidate.to_lowercase() == current_lower {
        None
    } else {
        Some(candidate.as_str())
    }
}
