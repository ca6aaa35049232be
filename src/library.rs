//! Shared handle over the song database. Every caller gets a clone of the
//! same [`SongLibrary`]; writes are serialised through one connection and each
//! committed mutation bumps a revision counter that wakes live queries.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use log::debug;
use rusqlite::Connection;
use tokio::sync::watch;

use crate::db::{self, LibraryConfig, TextColumn};
use crate::models::{Song, SongId};

/// Group key used for songs whose grouping field is blank.
pub const UNSPECIFIED_GROUP: &str = "Unspecified";

/// Field used by [`SongLibrary::songs_grouped_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    Deity,
    Composer,
    Category,
}

type Query<T> = Box<dyn Fn(&Connection) -> Result<T> + Send + Sync>;

#[derive(Clone)]
pub struct SongLibrary {
    conn: Arc<Mutex<Connection>>,
    revision: Arc<watch::Sender<u64>>,
}

impl std::fmt::Debug for SongLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SongLibrary")
            .field("revision", &*self.revision.borrow())
            .finish_non_exhaustive()
    }
}

impl SongLibrary {
    /// Wrap an already migrated connection.
    pub fn new(conn: Connection) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            conn: Arc::new(Mutex::new(conn)),
            revision: Arc::new(revision),
        }
    }

    /// Open the store named by `config`, migrating it if needed.
    pub fn open(config: &LibraryConfig) -> Result<Self> {
        Self::open_path(&config.db_path)
    }

    pub fn open_path(path: &Path) -> Result<Self> {
        Ok(Self::new(db::open_database(path)?))
    }

    /// Throwaway library, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(db::open_in_memory()?))
    }

    fn with_conn<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("song library connection lock poisoned"))?;
        f(&conn)
    }

    /// Run a write and wake subscribers. The revision is bumped even when the
    /// write fails; live queries drop snapshots that did not change.
    fn mutate<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let result = self.with_conn(f);
        self.revision.send_modify(|revision| *revision += 1);
        result
    }

    fn live<T>(
        &self,
        query: impl Fn(&Connection) -> Result<T> + Send + Sync + 'static,
    ) -> LiveQuery<T> {
        LiveQuery {
            library: self.clone(),
            changes: self.revision.subscribe(),
            query: Box::new(query),
            last: None,
        }
    }

    /// Store a new song, or replace the row with the same id, and return its id.
    pub fn insert(&self, song: &Song) -> Result<SongId> {
        let id = self.mutate(|conn| db::insert_song(conn, song))?;
        debug!("stored song {id}: {}", song.display_title());
        Ok(id)
    }

    /// Overwrite an existing song. Fails with [`LibraryError::SongNotFound`]
    /// when the id is unknown.
    ///
    /// [`LibraryError::SongNotFound`]: crate::LibraryError::SongNotFound
    pub fn update(&self, song: &Song) -> Result<()> {
        self.mutate(|conn| db::update_song(conn, song))?;
        debug!("updated song {:?}", song.id);
        Ok(())
    }

    /// Returns `false` when the song was already gone.
    pub fn delete(&self, id: SongId) -> Result<bool> {
        let deleted = self.mutate(|conn| db::delete_song(conn, id))?;
        debug!("deleted song {id}: {deleted}");
        Ok(deleted)
    }

    /// Delete a selection atomically and return how many rows existed.
    pub fn delete_many(&self, ids: &[SongId]) -> Result<usize> {
        let deleted = self.mutate(|conn| db::delete_songs(conn, ids))?;
        debug!("deleted {deleted} of {} selected songs", ids.len());
        Ok(deleted)
    }

    /// Wipe the library. Used by the "delete everything" action.
    pub fn delete_all(&self) -> Result<usize> {
        let deleted = self.mutate(db::delete_all_songs)?;
        debug!("deleted all {deleted} songs");
        Ok(deleted)
    }

    pub fn set_favorite(&self, id: SongId, is_favorite: bool) -> Result<()> {
        self.mutate(|conn| db::set_favorite(conn, id, is_favorite))
    }

    /// Flip the favourite flag, returning the new value.
    pub fn toggle_favorite(&self, id: SongId) -> Result<bool> {
        self.mutate(|conn| db::toggle_favorite(conn, id))
    }

    /// Number of stored songs.
    pub fn song_count(&self) -> Result<usize> {
        self.with_conn(db::count_songs)
    }

    /// One-shot snapshot of every song in insertion order.
    pub fn all_songs_once(&self) -> Result<Vec<Song>> {
        self.with_conn(db::fetch_songs_snapshot)
    }

    /// Exact lookup used to skip duplicates on import.
    pub fn find_song_by_title_and_composer(
        &self,
        title: &str,
        composer: &str,
    ) -> Result<Option<Song>> {
        self.with_conn(|conn| db::find_song_by_title_and_composer(conn, title, composer))
    }

    /// One-shot read of a single song, for edit screens.
    pub fn song_once(&self, id: SongId) -> Result<Option<Song>> {
        self.with_conn(|conn| db::fetch_song_by_id(conn, id))
    }

    /// Every song ordered by title.
    pub fn all_songs(&self) -> LiveQuery<Vec<Song>> {
        self.live(db::fetch_all_songs)
    }

    /// Case-insensitive search over titles, people, lyrics and categories.
    pub fn search_songs(&self, query: impl Into<String>) -> LiveQuery<Vec<Song>> {
        let query = query.into();
        self.live(move |conn| db::search_songs(conn, &query))
    }

    /// Suggestion list for the deity field.
    pub fn unique_deities(&self) -> LiveQuery<Vec<String>> {
        self.live(|conn| db::fetch_distinct_values(conn, TextColumn::Deity))
    }

    /// Suggestion list for the composer field.
    pub fn unique_composers(&self) -> LiveQuery<Vec<String>> {
        self.live(|conn| db::fetch_distinct_values(conn, TextColumn::Composer))
    }

    /// Every category label in use.
    pub fn unique_categories(&self) -> LiveQuery<Vec<String>> {
        self.live(db::fetch_categories)
    }

    /// Favourites, ordered by title.
    pub fn favorite_songs(&self) -> LiveQuery<Vec<Song>> {
        self.live(db::fetch_favorite_songs)
    }

    /// Songs whose deity matches exactly.
    pub fn songs_by_deity(&self, deity: impl Into<String>) -> LiveQuery<Vec<Song>> {
        let deity = deity.into();
        self.live(move |conn| db::fetch_songs_where(conn, TextColumn::Deity, &deity))
    }

    /// Songs whose composer matches exactly.
    pub fn songs_by_composer(&self, composer: impl Into<String>) -> LiveQuery<Vec<Song>> {
        let composer = composer.into();
        self.live(move |conn| db::fetch_songs_where(conn, TextColumn::Composer, &composer))
    }

    /// Songs tagged with the given category.
    pub fn songs_by_category(&self, category: impl Into<String>) -> LiveQuery<Vec<Song>> {
        let category = category.into();
        self.live(move |conn| db::fetch_songs_in_category(conn, &category))
    }

    /// `None` once the song is deleted.
    pub fn song_by_id(&self, id: SongId) -> LiveQuery<Option<Song>> {
        self.live(move |conn| db::fetch_song_by_id(conn, id))
    }

    /// Title-sorted songs bucketed by `field`; see [`group_songs`].
    pub fn songs_grouped_by(&self, field: GroupField) -> LiveQuery<BTreeMap<String, Vec<Song>>> {
        self.live(move |conn| Ok(group_songs(db::fetch_all_songs(conn)?, field)))
    }
}

/// Bucket title-sorted songs by `field`. Songs keep their relative order in
/// every bucket; a song with several categories lands in each of them.
pub fn group_songs(songs: Vec<Song>, field: GroupField) -> BTreeMap<String, Vec<Song>> {
    fn key(value: Option<&str>) -> String {
        match value.map(str::trim) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => UNSPECIFIED_GROUP.to_string(),
        }
    }

    let mut groups: BTreeMap<String, Vec<Song>> = BTreeMap::new();
    for song in songs {
        let keys: Vec<String> = match field {
            GroupField::Deity => vec![key(song.deity.as_deref())],
            GroupField::Composer => vec![key(Some(song.composer.as_str()))],
            GroupField::Category => {
                let mut keys: Vec<String> = Vec::new();
                for category in &song.categories {
                    let category = key(Some(category.as_str()));
                    if !keys.contains(&category) {
                        keys.push(category);
                    }
                }
                if keys.is_empty() {
                    keys.push(UNSPECIFIED_GROUP.to_string());
                }
                keys
            }
        };
        for key in keys {
            groups.entry(key).or_default().push(song.clone());
        }
    }
    groups
}

/// Subscription to a query that is re-run whenever the library changes.
/// Dropping it ends the subscription.
pub struct LiveQuery<T> {
    library: SongLibrary,
    changes: watch::Receiver<u64>,
    query: Query<T>,
    last: Option<T>,
}

impl<T> std::fmt::Debug for LiveQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQuery")
            .field("library", &self.library)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + PartialEq> LiveQuery<T> {
    fn run(&self) -> Result<T> {
        self.library.with_conn(|conn| (self.query)(conn))
    }

    /// Snapshot of the current result. Later calls to [`LiveQuery::next`]
    /// only report results that differ from this one.
    pub fn current(&mut self) -> Result<T> {
        self.changes.borrow_and_update();
        let snapshot = self.run()?;
        self.last = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Wait until a mutation changes the result, then return the new result.
    pub async fn next(&mut self) -> Result<T> {
        loop {
            self.changes.changed().await?;
            if let Some(snapshot) = self.fresh()? {
                return Ok(snapshot);
            }
        }
    }

    /// Non-blocking variant of [`LiveQuery::next`]: `None` when nothing
    /// observable changed since the last delivered result.
    pub fn poll(&mut self) -> Result<Option<T>> {
        if !self.changes.has_changed()? {
            return Ok(None);
        }
        self.changes.borrow_and_update();
        self.fresh()
    }

    fn fresh(&mut self) -> Result<Option<T>> {
        let snapshot = self.run()?;
        if self.last.as_ref() == Some(&snapshot) {
            return Ok(None);
        }
        self.last = Some(snapshot.clone());
        Ok(Some(snapshot))
    }
}
