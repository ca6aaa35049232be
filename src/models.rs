//! Domain models that mirror the SQLite schema and get passed between the
//! persistence layer, the backup routine and the binary. The types stay plain
//! data holders; validation lives in `draft` and storage concerns in `db`.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Primary key assigned by SQLite on first insert.
pub type SongId = i64;

/// Language key used when a legacy single-text lyric is lifted into the
/// language-keyed representation.
pub const DEFAULT_LANGUAGE: &str = "Default";

/// Lyrics keyed by language name. Insertion order is preserved because the
/// first language is the one shown by default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lyrics(Vec<(String, String)>);

impl Lyrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a legacy plain-text lyric under [`DEFAULT_LANGUAGE`]. Empty text
    /// yields an empty mapping.
    pub fn from_plain_text(text: &str) -> Self {
        let mut lyrics = Self::new();
        if !text.is_empty() {
            lyrics.insert(DEFAULT_LANGUAGE, text);
        }
        lyrics
    }

    /// Set the text for `language`, replacing an existing entry in place so
    /// the language keeps its position.
    pub fn insert(&mut self, language: impl Into<String>, text: impl Into<String>) {
        let language = language.into();
        let text = text.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == language) {
            Some(entry) => entry.1 = text,
            None => self.0.push((language, text)),
        }
    }

    /// Builder flavour of [`Lyrics::insert`].
    pub fn with(mut self, language: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(language, text);
        self
    }

    pub fn get(&self, language: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == language)
            .map(|(_, text)| text.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(language, text)| (language.as_str(), text.as_str()))
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(language, _)| language.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<L: Into<String>, T: Into<String>> FromIterator<(L, T)> for Lyrics {
    fn from_iter<I: IntoIterator<Item = (L, T)>>(iter: I) -> Self {
        let mut lyrics = Self::new();
        for (language, text) in iter {
            lyrics.insert(language, text);
        }
        lyrics
    }
}

impl Serialize for Lyrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (language, text) in &self.0 {
            map.serialize_entry(language, text)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Lyrics {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LyricsVisitor;

        impl<'de> Visitor<'de> for LyricsVisitor {
            type Value = Lyrics;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping language names to lyrics text")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Lyrics, A::Error> {
                let mut lyrics = Lyrics::new();
                while let Some((language, text)) = access.next_entry::<String, String>()? {
                    lyrics.insert(language, text);
                }
                Ok(lyrics)
            }
        }

        deserializer.deserialize_map(LyricsVisitor)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// In-memory representation of a song row.
pub struct Song {
    /// `None` until the row has been inserted.
    pub id: Option<SongId>,
    pub title: String,
    /// Empty when unknown; duplicate detection pairs it with the title.
    pub composer: String,
    pub deity: Option<String>,
    pub ragam: Option<String>,
    pub lyrics: Lyrics,
    pub categories: Vec<String>,
    pub youtube_link: Option<String>,
    pub is_favorite: bool,
}

impl Song {
    /// Start a not-yet-persisted song with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_composer(mut self, composer: impl Into<String>) -> Self {
        self.composer = composer.into();
        self
    }

    pub fn with_deity(mut self, deity: impl Into<String>) -> Self {
        self.deity = Some(deity.into());
        self
    }

    pub fn with_ragam(mut self, ragam: impl Into<String>) -> Self {
        self.ragam = Some(ragam.into());
        self
    }

    pub fn with_lyrics(mut self, language: impl Into<String>, text: impl Into<String>) -> Self {
        self.lyrics.insert(language, text);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn with_youtube_link(mut self, link: impl Into<String>) -> Self {
        self.youtube_link = Some(link.into());
        self
    }

    pub fn favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }

    /// Compose a `Title - Composer` string that omits the hyphen if the
    /// composer is blank.
    pub fn display_title(&self) -> String {
        if self.composer.trim().is_empty() {
            self.title.clone()
        } else {
            format!("{} - {}", self.title, self.composer)
        }
    }

    /// Case-insensitive substring match over every searchable field.
    /// `needle` must already be lowercased.
    pub(crate) fn matches_lowercase(&self, needle: &str) -> bool {
        let hit = |value: &str| value.to_lowercase().contains(needle);
        hit(self.title.as_str())
            || hit(self.composer.as_str())
            || self.deity.as_deref().is_some_and(hit)
            || self.ragam.as_deref().is_some_and(hit)
            || self
                .lyrics
                .iter()
                .any(|(language, text)| hit(language) || hit(text))
            || self.categories.iter().any(|category| hit(category.as_str()))
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_title())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lyrics_keep_insertion_order_and_replace_in_place() {
        let mut lyrics = Lyrics::new().with("Tamil", "a").with("English", "b");
        lyrics.insert("Tamil", "c");

        let languages: Vec<_> = lyrics.languages().collect();
        assert_eq!(languages, ["Tamil", "English"]);
        assert_eq!(lyrics.get("Tamil"), Some("c"));
    }

    #[test]
    fn lyrics_json_preserves_language_order() -> anyhow::Result<()> {
        let lyrics: Lyrics = serde_json::from_str(r#"{"Telugu":"x","English":"y","Hindi":"z"}"#)?;
        let languages: Vec<_> = lyrics.languages().collect();
        assert_eq!(languages, ["Telugu", "English", "Hindi"]);
        assert_eq!(
            serde_json::to_string(&lyrics)?,
            r#"{"Telugu":"x","English":"y","Hindi":"z"}"#
        );
        Ok(())
    }

    #[test]
    fn plain_text_is_lifted_under_default_language() {
        assert_eq!(
            Lyrics::from_plain_text("sa ri ga").get(DEFAULT_LANGUAGE),
            Some("sa ri ga")
        );
        assert!(Lyrics::from_plain_text("").is_empty());
    }

    #[test]
    fn search_matches_every_field_case_insensitively() {
        let song = Song::new("Vatapi Ganapatim")
            .with_composer("Muthuswami Dikshitar")
            .with_deity("Ganesha")
            .with_ragam("Hamsadhwani")
            .with_lyrics("Sanskrit", "vAtApi gaNapatiM bhajE")
            .with_category("Kriti");

        for needle in ["vatapi", "dikshitar", "ganesha", "hamsa", "bhaje", "sanskrit", "kriti"] {
            assert!(song.matches_lowercase(needle), "{needle} should match");
        }
        assert!(!song.matches_lowercase("thyagaraja"));
    }

    #[test]
    fn display_title_omits_blank_composer() {
        assert_eq!(Song::new("Hello").display_title(), "Hello");
        assert_eq!(
            Song::new("Hello").with_composer("Adele").display_title(),
            "Hello - Adele"
        );
    }
}
