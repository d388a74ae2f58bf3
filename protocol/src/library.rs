//! Collaborators the handoff routes received songs into.
//!
//! Finding and playing songs belongs to the app. The coordinator only needs
//! a lookup by id and a way to start playback.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub title: String,
}

impl Song {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Songs available on this device (downloads, current queue).
#[async_trait]
pub trait SongLibrary: Send + Sync {
    async fn find_song_by_id(&self, song_id: &str) -> Option<Song>;
}

/// The playback engine.
#[async_trait]
pub trait Player: Send + Sync {
    async fn play(&self, song: &Song) -> Result<(), String>;
}

/// A [`SongLibrary`] backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryLibrary {
    songs: RwLock<HashMap<String, Song>>,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, song: Song) {
        self.songs.write().insert(song.id.clone(), song);
    }

    pub fn len(&self) -> usize {
        self.songs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<Song> for InMemoryLibrary {
    fn from_iter<I: IntoIterator<Item = Song>>(songs: I) -> Self {
        let library = Self::new();
        for song in songs {
            library.insert(song);
        }
        library
    }
}

#[async_trait]
impl SongLibrary for InMemoryLibrary {
    async fn find_song_by_id(&self, song_id: &str) -> Option<Song> {
        self.songs.read().get(song_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_by_id() {
        let library: InMemoryLibrary = [Song::new("abc123", "Blue Monday")].into_iter().collect();
        assert_eq!(library.len(), 1);
        assert_eq!(
            library.find_song_by_id("abc123").await.map(|s| s.title),
            Some("Blue Monday".to_string())
        );
        assert_eq!(library.find_song_by_id("zzz").await, None);
    }
}
