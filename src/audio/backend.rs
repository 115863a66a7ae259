use async_trait::async_trait;
use serenity::model::id::GuildId;

use crate::{
    audio::track::{Track, TrackId},
    error::MusicResult,
};

/// Where a search should be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchSource {
    /// The query is a URL or backend identifier, resolved as-is
    Direct,
    /// A search provider prefix such as `ytsearch`
    Provider(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlaylist {
    pub name: Option<String>,
    pub tracks: Vec<Track>,
}

/// Audio playback service. Sessions are addressed by guild.
///
/// `play` starts the given track and replaces whatever the session was playing
/// without reporting the replaced track as finished. Lifecycle callbacks for
/// the new track arrive later as [`BackendCallback`]s.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaybackBackend: Send + Sync {
    /// At most `limit` results. Direct lookups return a single track.
    async fn search(&self, query: &str, source: SearchSource, limit: usize) -> MusicResult<Vec<Track>>;
    async fn resolve_playlist(&self, url: &str) -> MusicResult<ResolvedPlaylist>;
    async fn play(&self, session: GuildId, track: &Track) -> MusicResult<()>;
    async fn pause(&self, session: GuildId) -> MusicResult<()>;
    async fn resume(&self, session: GuildId) -> MusicResult<()>;
    async fn stop(&self, session: GuildId) -> MusicResult<()>;
    /// Frees everything the backend holds for the session.
    async fn release(&self, session: GuildId) -> MusicResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    Started,
    Finished,
    Errored,
}

/// Track lifecycle report from the backend, tagged with the track it is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCallback {
    pub session: GuildId,
    pub track_id: TrackId,
    pub kind: CallbackKind,
}
