use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::UserId;
use std::{fmt, time::Duration};

/// Opaque backend identifier of a playable track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TrackId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Metadata of a resolved track. Never mutated once cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    /// Vacío cuando la fuente no es enlazable
    pub uri: String,
    pub is_playlist_member: bool,
    pub duration: Option<Duration>,
    pub source_name: String,
    pub is_stream: bool,
}

impl Track {
    pub fn new(id: impl Into<TrackId>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            uri: String::new(),
            is_playlist_member: false,
            duration: None,
            source_name: "unknown".to_string(),
            is_stream: false,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_source(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = source_name.into();
        self
    }

    pub fn as_stream(mut self) -> Self {
        self.is_stream = true;
        self
    }

    pub fn in_playlist(mut self) -> Self {
        self.is_playlist_member = true;
        self
    }

    /// Duración legible: `3m 25s`, o `EN VIVO` para streams.
    pub fn display_duration(&self) -> String {
        if self.is_stream {
            return "EN VIVO".to_string();
        }
        match self.duration {
            Some(duration) => {
                humantime::format_duration(Duration::from_secs(duration.as_secs())).to_string()
            }
            None => "?".to_string(),
        }
    }
}

/// One scheduled track plus who asked for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub track_id: TrackId,
    pub requester_id: UserId,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(track_id: TrackId, requester_id: UserId) -> Self {
        Self {
            track_id,
            requester_id,
            enqueued_at: Utc::now(),
        }
    }
}
