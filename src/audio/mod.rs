//! # Audio Module
//!
//! Playback collaborator used by the `/play` flow.
//!
//! The session protocol only talks to the two traits defined here:
//!
//! ### [`Player`]
//! - Search on a backend platform
//! - Enqueue, shuffle, play, skip and destroy for one guild
//!
//! ### [`PlayerProvider`]
//! - Resolves the guild player for the acting user
//! - Rejects users that are not in a voice channel
//!
//! The production implementation lives in [`songbird_player`]: a Songbird
//! [`Call`](songbird::Call) with its builtin queue, fed by `yt-dlp` searches
//! from [`ytdlp`].

pub mod songbird_player;
pub mod ytdlp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{fmt, str::FromStr, sync::Arc, time::Duration};
use thiserror::Error;

/// Errores del colaborador de reproducción
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("user is not connected to a voice channel")]
    NoVoiceChannel,
    #[error("search failed: {0}")]
    Search(String),
    #[error("playback command failed: {0}")]
    Command(String),
}

/// Backend platform a search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchSource {
    #[serde(rename = "ytsearch")]
    YouTube,
    #[serde(rename = "scsearch")]
    SoundCloud,
}

impl SearchSource {
    /// yt-dlp search prefix for this platform
    pub fn search_prefix(self) -> &'static str {
        match self {
            SearchSource::YouTube => "ytsearch",
            SearchSource::SoundCloud => "scsearch",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SearchSource::YouTube => "YouTube",
            SearchSource::SoundCloud => "SoundCloud",
        }
    }
}

impl fmt::Display for SearchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.search_prefix())
    }
}

impl FromStr for SearchSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ytsearch" | "youtube" | "yt" => Ok(SearchSource::YouTube),
            "scsearch" | "soundcloud" | "sc" => Ok(SearchSource::SoundCloud),
            other => anyhow::bail!("Fuente de búsqueda desconocida: {}", other),
        }
    }
}

/// A playable track as returned by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Platform identifier, used to exclude the seed track from related results
    pub identifier: String,
    pub title: String,
    pub author: Option<String>,
    pub uri: String,
    pub duration: Option<Duration>,
    pub requested_by: UserId,
}

impl Track {
    pub fn new(identifier: String, title: String, uri: String, requested_by: UserId) -> Self {
        Self {
            identifier,
            title,
            author: None,
            uri,
            duration: None,
            requested_by,
        }
    }

    pub fn with_author(mut self, author: String) -> Self {
        self.author = Some(author);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Per-guild playback handle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Player: Send + Sync {
    async fn search(
        &self,
        query: &str,
        source: SearchSource,
        requester: UserId,
    ) -> Result<Vec<Track>, PlaybackError>;

    async fn enqueue(&self, track: Track) -> Result<(), PlaybackError>;

    /// Shuffles the upcoming tracks and returns how many were shuffled.
    async fn shuffle(&self) -> Result<usize, PlaybackError>;

    async fn play(&self) -> Result<(), PlaybackError>;

    async fn is_playing(&self) -> bool;

    async fn skip(&self) -> Result<(), PlaybackError>;

    /// Stops playback and leaves the voice channel.
    async fn destroy(&self) -> Result<(), PlaybackError>;

    async fn connect(&self) -> Result<(), PlaybackError>;
}

/// Resolves guild players for interactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlayerProvider: Send + Sync {
    /// Returns the guild player, creating it if needed.
    ///
    /// `voice_channel` is the acting user's current channel; `None` yields
    /// [`PlaybackError::NoVoiceChannel`]. With `connect` the player joins voice
    /// before being returned.
    async fn player_for(
        &self,
        guild_id: GuildId,
        voice_channel: Option<ChannelId>,
        connect: bool,
    ) -> Result<Arc<dyn Player>, PlaybackError>;

    /// The guild player if one already exists.
    fn existing(&self, guild_id: GuildId) -> Option<Arc<dyn Player>>;
}
