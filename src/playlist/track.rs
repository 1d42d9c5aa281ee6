//! Tracks and the static playlist

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PlayerError, Result};

/// A single playable track. Immutable once loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: u32,
    pub title: String,
    pub artist: String,
    /// Direct URI of the audio stream
    #[serde(alias = "src")]
    pub audio_source: String,
    #[serde(default, alias = "cover", skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
}

impl Track {
    pub fn new(id: u32, title: &str, artist: &str, audio_source: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            artist: artist.to_string(),
            audio_source: audio_source.to_string(),
            cover_image: None,
        }
    }

    pub fn with_cover(mut self, cover: &str) -> Self {
        self.cover_image = Some(cover.to_string());
        self
    }
}

/// Ordered, non-empty list of tracks fixed at configuration time
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Playlist {
    tracks: Vec<Track>,
}

impl Playlist {
    /// Build a playlist, rejecting an empty track list
    pub fn new(tracks: Vec<Track>) -> Result<Self> {
        if tracks.is_empty() {
            return Err(PlayerError::EmptyPlaylist);
        }
        Ok(Self { tracks })
    }

    /// The label's built-in rotation
    pub fn label_default() -> Self {
        Self {
            tracks: vec![
                Track::new(3, "Split Theory", "Nidra", "/audio/split-theory.mp3")
                    .with_cover("/releases/split.jpg"),
                Track::new(
                    4,
                    "Welcome In Wonderland",
                    "Unlucide",
                    "/audio/welcome-in-wonderland.mp3",
                )
                .with_cover("/covers/welcome-in-wonderland.jpg"),
                Track::new(5, "Funkadelic Gates", "Psy Fact", "/audio/funkadelic-gates.mp3")
                    .with_cover("/covers/funkadelic-gates.jpg"),
            ],
        }
    }

    /// Parse a playlist from a JSON array of tracks
    pub fn from_json(json: &str) -> Result<Self> {
        let tracks: Vec<Track> = serde_json::from_str(json)?;
        Self::new(tracks)
    }

    /// Load a playlist from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| PlayerError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&content)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}
