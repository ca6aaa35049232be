//! Binary entry point for maintaining the song library from a terminal. It
//! brings up logging, opens (and if needed migrates) the database, and runs a
//! single maintenance command against it.
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use time::OffsetDateTime;

use lyrics_library::{
    backup_file_name, export_songs, import_songs, ImportMode, LibraryConfig, Song, SongDraft,
    SongId, SongLibrary,
};

#[derive(Parser)]
#[command(name = "lyrics-library", about = "Maintain the lyrics song database")]
struct Cli {
    /// Database file to use instead of `~/.lyrics-library/lyrics_db`.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the number of stored songs.
    Count,
    /// List every song in title order.
    List,
    /// List songs matching a case-insensitive query.
    Search { query: String },
    /// List favourite songs.
    Favorites,
    /// Add a song.
    Add {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        composer: String,
        #[arg(long, default_value = "")]
        deity: String,
        #[arg(long, default_value = "")]
        ragam: String,
        /// Language of `--lyrics`.
        #[arg(long, default_value = lyrics_library::DEFAULT_LANGUAGE)]
        language: String,
        #[arg(long)]
        lyrics: Option<String>,
        /// May be repeated.
        #[arg(long = "category")]
        categories: Vec<String>,
        #[arg(long, default_value = "")]
        link: String,
    },
    /// Toggle the favourite flag of a song.
    Favorite { id: SongId },
    /// Write a JSON backup. Defaults to `lyrics_backup_<DDMMYYYY>.json`.
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Read a JSON backup, skipping songs already present.
    Import {
        path: PathBuf,
        /// Delete every song before importing.
        #[arg(long)]
        replace: bool,
    },
    /// Delete every song.
    DeleteAll {
        /// Required; the deletion cannot be undone.
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut clog = colog::default_builder();
    clog.filter(
        None,
        if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        },
    );
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("panic: {panic_info}");
    }));

    let config = match cli.db {
        Some(path) => LibraryConfig::new(path),
        None => LibraryConfig::default_location()?,
    };
    let library = SongLibrary::open(&config)?;

    run(&library, cli.command)
}

fn print_songs(songs: &[Song]) {
    for song in songs {
        let marker = if song.is_favorite { "*" } else { " " };
        println!("{marker} {:>5}  {}", song.id.unwrap_or_default(), song.display_title());
    }
}

fn run(library: &SongLibrary, command: Command) -> Result<()> {
    match command {
        Command::Count => println!("Total songs: {}", library.song_count()?),
        Command::List => print_songs(&library.all_songs().current()?),
        Command::Search { query } => print_songs(&library.search_songs(query).current()?),
        Command::Favorites => print_songs(&library.favorite_songs().current()?),
        Command::Add {
            title,
            composer,
            deity,
            ragam,
            language,
            lyrics,
            categories,
            link,
        } => {
            let draft = SongDraft {
                title,
                composer,
                deity,
                ragam,
                lyrics: lyrics.map(|text| (language, text)).into_iter().collect(),
                categories,
                youtube_link: link,
                is_favorite: false,
            };
            let song = draft.into_song(None)?;
            let id = library.insert(&song)?;
            println!("Added song {id}: {}", song.display_title());
        }
        Command::Favorite { id } => {
            let is_favorite = library.toggle_favorite(id)?;
            println!(
                "Song {id} is {}a favourite",
                if is_favorite { "" } else { "no longer " }
            );
        }
        Command::Export { out } => {
            let path = match out {
                Some(path) => path,
                None => {
                    let today = OffsetDateTime::now_local()
                        .unwrap_or_else(|_| OffsetDateTime::now_utc())
                        .date();
                    PathBuf::from(backup_file_name(today))
                }
            };
            let json = export_songs(library)?;
            fs::write(&path, json)
                .with_context(|| format!("failed to write backup to {}", path.display()))?;
            info!("backup written to {}", path.display());
            println!("Exported to {}", path.display());
        }
        Command::Import { path, replace } => {
            let json = fs::read_to_string(&path)
                .with_context(|| format!("failed to read backup from {}", path.display()))?;
            let mode = if replace {
                ImportMode::Replace
            } else {
                ImportMode::Merge
            };
            let summary = import_songs(library, &json, mode)?;
            println!(
                "Imported {} songs, skipped {} already present",
                summary.inserted, summary.skipped
            );
        }
        Command::DeleteAll { yes } => {
            if !yes {
                bail!("refusing to delete every song without --yes");
            }
            let deleted = library.delete_all()?;
            println!("All songs deleted ({deleted})");
        }
    }
    Ok(())
}
