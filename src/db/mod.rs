//! Persistence module split across logical submodules.

mod connection;
pub mod schema;
mod songs;

pub use connection::{open_database, open_in_memory, LibraryConfig};
pub use schema::{migrate, schema_version, Migration, CURRENT_SCHEMA_VERSION, MIGRATIONS};
pub use songs::{
    count_songs, delete_all_songs, delete_song, delete_songs, fetch_all_songs, fetch_categories,
    fetch_distinct_values, fetch_favorite_songs, fetch_song_by_id, fetch_songs_in_category,
    fetch_songs_snapshot, fetch_songs_where, find_song_by_title_and_composer, insert_song,
    search_songs, set_favorite, toggle_favorite, update_song, TextColumn,
};
