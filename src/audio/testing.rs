//! Shared fixtures for the playback unit tests.

use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;

use crate::{
    audio::{
        backend::{MockPlaybackBackend, PlaybackBackend},
        catalog::TrackCatalog,
        player::PlaybackController,
        queue_engine::QueueEngine,
        state_store::{ConnectionStatus, GuildStateStore},
        track::{QueueEntry, Track, TrackId},
    },
    events::EventBus,
};

pub const GUILD: GuildId = GuildId::new(1);
pub const USER: UserId = UserId::new(10);
pub const VOICE: ChannelId = ChannelId::new(100);
pub const TEXT: ChannelId = ChannelId::new(200);

pub fn track(id: &str) -> Track {
    Track::new(id, format!("Title {id}"), "Artist")
        .with_uri(format!("https://www.youtube.com/watch?v={id}"))
        .with_source("youtube")
}

pub struct Harness {
    pub store: Arc<GuildStateStore>,
    pub bus: Arc<EventBus>,
    pub catalog: Arc<TrackCatalog>,
    pub player: Arc<PlaybackController>,
    pub engine: QueueEngine,
}

impl Harness {
    pub fn new(backend: MockPlaybackBackend) -> Self {
        let backend: Arc<dyn PlaybackBackend> = Arc::new(backend);
        let store = Arc::new(GuildStateStore::new());
        let bus = Arc::new(EventBus::new(64));
        let catalog = Arc::new(TrackCatalog::new(backend.clone(), "ytsearch", 100));
        let player = Arc::new(PlaybackController::new(
            store.clone(),
            bus.clone(),
            catalog.clone(),
            backend,
        ));
        let engine = QueueEngine::new(store.clone(), bus.clone(), player.clone(), 25);

        Self {
            store,
            bus,
            catalog,
            player,
            engine,
        }
    }

    pub fn with_tracks(&self, ids: &[&str]) {
        for id in ids {
            self.catalog.insert(track(id));
        }
    }

    /// Queues `ids` without touching the backend.
    pub fn queued(&self, ids: &[&str]) {
        self.with_tracks(ids);
        self.store.with_state(GUILD, |state| {
            state
                .queue
                .append(ids.iter().map(|id| QueueEntry::new(TrackId::from(*id), USER)));
        });
    }

    pub fn connected_with(&self, ids: &[&str]) {
        self.store.with_state(GUILD, |state| {
            state.connection_status = ConnectionStatus::Connected;
            state.voice_channel_id = Some(VOICE);
            state.notification_channel_id = Some(TEXT);
        });
        self.queued(ids);
    }
}
