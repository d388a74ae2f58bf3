//! Song lookup and playback for the command line.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;

use beatit_nfc::library::{InMemoryLibrary, Player, Song, SongLibrary};

/// Where received song ids are looked up.
pub enum Catalog {
    /// Songs listed in a JSON file.
    File(InMemoryLibrary),
    /// No catalog given: every id is available, titled by its id.
    Open,
}

impl Catalog {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Catalog::Open);
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        let songs: Vec<Song> = serde_json::from_str(&text)
            .with_context(|| format!("invalid catalog {}", path.display()))?;
        tracing::info!(path = %path.display(), songs = songs.len(), "catalog loaded");
        Ok(Catalog::File(songs.into_iter().collect()))
    }
}

#[async_trait]
impl SongLibrary for Catalog {
    async fn find_song_by_id(&self, song_id: &str) -> Option<Song> {
        match self {
            Catalog::File(library) => library.find_song_by_id(song_id).await,
            Catalog::Open => Some(Song::new(song_id, song_id)),
        }
    }
}

/// Announces playback on stdout.
pub struct ConsolePlayer;

#[async_trait]
impl Player for ConsolePlayer {
    async fn play(&self, song: &Song) -> Result<(), String> {
        println!("Now playing: {} ({})", song.title, song.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_catalog_only_knows_its_songs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, r#"[{"id":"abc123","title":"Blue Monday"}]"#).unwrap();

        let catalog = Catalog::load(Some(&path)).unwrap();
        assert_eq!(
            catalog.find_song_by_id("abc123").await.unwrap().title,
            "Blue Monday"
        );
        assert!(catalog.find_song_by_id("xyz").await.is_none());
    }

    #[tokio::test]
    async fn open_catalog_knows_everything() {
        let catalog = Catalog::load(None).unwrap();
        assert_eq!(catalog.find_song_by_id("xyz").await.unwrap().id, "xyz");
    }

    #[test]
    fn malformed_catalog_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, "{").unwrap();
        assert!(Catalog::load(Some(&path)).is_err());
    }
}
