use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::{
    audio::{
        backend::{PlaybackBackend, SearchSource},
        track::{Track, TrackId},
    },
    error::{MusicError, MusicResult},
};

/// How a user query is going to be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    Search(String),
    Direct(String),
    Playlist(String),
}

impl QueryKind {
    pub fn classify(query: &str) -> Self {
        let query = query.trim();
        let lowered = query.to_lowercase();
        let is_url = lowered.starts_with("http://")
            || lowered.starts_with("https://")
            || lowered.starts_with("www.");

        if !is_url {
            return QueryKind::Search(query.to_string());
        }

        if looks_like_playlist(query) {
            QueryKind::Playlist(query.to_string())
        } else {
            QueryKind::Direct(query.to_string())
        }
    }
}

fn looks_like_playlist(query: &str) -> bool {
    let normalized = if query.to_lowercase().starts_with("www.") {
        format!("https://{}", query)
    } else {
        query.to_string()
    };

    let Ok(url) = Url::parse(&normalized) else {
        return false;
    };

    // Un video con `list=` se trata como playlist, igual que el reproductor web
    url.query_pairs().any(|(key, _)| key == "list")
        || url.path().contains("/playlist")
        || url.path().contains("/sets/")
        || url.path().contains("/album/")
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTracks {
    pub tracks: Vec<Track>,
    pub is_playlist: bool,
    pub playlist_name: Option<String>,
}

/// Candidate tracks for a query still being typed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPreview {
    pub tracks: Vec<Track>,
    /// Name and size of the playlist when the query is a playlist URL
    pub playlist: Option<(String, usize)>,
}

/// Shorter queries are not worth a backend round trip.
const MIN_PREVIEW_QUERY_LEN: usize = 2;

/// Resolves user queries into tracks and caches every track it has seen.
pub struct TrackCatalog {
    backend: Arc<dyn PlaybackBackend>,
    tracks: DashMap<TrackId, Track>,
    default_source: String,
    max_playlist_size: usize,
}

impl TrackCatalog {
    pub fn new(
        backend: Arc<dyn PlaybackBackend>,
        default_source: impl Into<String>,
        max_playlist_size: usize,
    ) -> Self {
        Self {
            backend,
            tracks: DashMap::new(),
            default_source: default_source.into(),
            max_playlist_size,
        }
    }

    pub async fn resolve(&self, query: &str) -> MusicResult<ResolvedTracks> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MusicError::NotFound(String::new()));
        }

        let resolved = match QueryKind::classify(query) {
            QueryKind::Search(term) => {
                info!("🔍 Buscando: {}", term);
                let first = self
                    .backend
                    .search(&term, SearchSource::Provider(self.default_source.clone()), 1)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| MusicError::NotFound(term.clone()))?;
                ResolvedTracks {
                    tracks: vec![first],
                    is_playlist: false,
                    playlist_name: None,
                }
            }
            QueryKind::Direct(url) => {
                debug!("🔗 Resolviendo URL: {}", url);
                let first = self
                    .backend
                    .search(&url, SearchSource::Direct, 1)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| MusicError::NotFound(url.clone()))?;
                ResolvedTracks {
                    tracks: vec![first],
                    is_playlist: false,
                    playlist_name: None,
                }
            }
            QueryKind::Playlist(url) => {
                info!("📋 Cargando playlist: {}", url);
                let playlist = self.backend.resolve_playlist(&url).await?;
                if playlist.tracks.is_empty() {
                    return Err(MusicError::NotFound(url));
                }
                let tracks = playlist
                    .tracks
                    .into_iter()
                    .take(self.max_playlist_size)
                    .map(Track::in_playlist)
                    .collect();
                ResolvedTracks {
                    tracks,
                    is_playlist: true,
                    playlist_name: playlist.name,
                }
            }
        };

        for track in &resolved.tracks {
            self.insert(track.clone());
        }
        Ok(resolved)
    }

    /// Up to `limit` candidates for autocomplete. Search terms return several
    /// results instead of only the first one.
    pub async fn preview(&self, query: &str, limit: usize) -> MusicResult<QueryPreview> {
        let query = query.trim();
        if query.chars().count() < MIN_PREVIEW_QUERY_LEN || limit == 0 {
            return Ok(QueryPreview::default());
        }

        let preview = match QueryKind::classify(query) {
            QueryKind::Search(term) => QueryPreview {
                tracks: self
                    .backend
                    .search(&term, SearchSource::Provider(self.default_source.clone()), limit)
                    .await?,
                playlist: None,
            },
            QueryKind::Direct(url) => QueryPreview {
                tracks: self.backend.search(&url, SearchSource::Direct, 1).await?,
                playlist: None,
            },
            QueryKind::Playlist(url) => {
                let playlist = self.backend.resolve_playlist(&url).await?;
                let total = playlist.tracks.len().min(self.max_playlist_size);
                QueryPreview {
                    tracks: playlist
                        .tracks
                        .into_iter()
                        .take(limit.min(self.max_playlist_size))
                        .map(Track::in_playlist)
                        .collect(),
                    playlist: Some((playlist.name.unwrap_or_else(|| "Playlist".to_string()), total)),
                }
            }
        };

        for track in &preview.tracks {
            self.insert(track.clone());
        }
        Ok(preview)
    }

    /// Cached metadata, fetched from the backend on a miss.
    pub async fn load(&self, track_id: &TrackId) -> MusicResult<Track> {
        if let Some(track) = self.get(track_id) {
            return Ok(track);
        }

        debug!("📊 Track {} no está en caché, consultando backend", track_id);
        let track = self
            .backend
            .search(track_id.as_str(), SearchSource::Direct, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MusicError::NotFound(track_id.to_string()))?;

        // El backend puede devolver otro id canónico; se guarda bajo el pedido
        let track = Track {
            id: track_id.clone(),
            ..track
        };
        self.insert(track.clone());
        Ok(track)
    }

    pub fn get(&self, track_id: &TrackId) -> Option<Track> {
        self.tracks.get(track_id).map(|track| track.clone())
    }

    pub fn insert(&self, track: Track) {
        self.tracks.insert(track.id.clone(), track);
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
