//! Per-guild playback state and the store that owns it.
//!
//! Every mutation of a guild's record goes through [`GuildStateStore`]:
//!
//! - [`GuildStateStore::with_state`] runs a synchronous closure on the record
//!   under the guild's state lock. The lock can never be held across an
//!   `.await`.
//! - [`GuildStateStore::lock_guild`] hands out the guild's async operation
//!   guard. Operations that mutate state and then talk to the backend hold it
//!   for the whole sequence so commands for one guild apply in order.
//!
//! Guilds never contend with each other: each one has its own pair of locks,
//! looked up in a sharded [`DashMap`].

use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

use crate::audio::{queue::MusicQueue, track::TrackId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// The "now playing" message posted for a track, removed when it ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlayingMessage {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub track_id: TrackId,
}

#[derive(Debug, Clone, Default)]
pub struct GuildMusicState {
    /// Presente solo mientras hay conexión
    pub voice_channel_id: Option<ChannelId>,
    pub notification_channel_id: Option<ChannelId>,
    pub queue: MusicQueue,
    pub connection_status: ConnectionStatus,
    pub paused: bool,
    pub now_playing: Option<NowPlayingMessage>,
    pub consecutive_failures: usize,
}

impl GuildMusicState {
    pub fn is_connected(&self) -> bool {
        self.connection_status == ConnectionStatus::Connected
    }

    /// Track id of the current entry, if any.
    pub fn current_track(&self) -> Option<TrackId> {
        self.queue.current().map(|entry| entry.track_id.clone())
    }

    pub fn is_current(&self, track_id: &TrackId) -> bool {
        self.queue.current().map(|entry| &entry.track_id) == Some(track_id)
    }
}

#[derive(Default)]
struct GuildSlot {
    state: Mutex<GuildMusicState>,
    operations: Arc<tokio::sync::Mutex<()>>,
}

/// Held while an operation sequences state changes and backend calls.
pub type GuildGuard = OwnedMutexGuard<()>;

#[derive(Default)]
pub struct GuildStateStore {
    guilds: DashMap<GuildId, Arc<GuildSlot>>,
}

impl GuildStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, guild_id: GuildId) -> Arc<GuildSlot> {
        self.guilds.entry(guild_id).or_default().value().clone()
    }

    /// Runs `f` on the guild's record with exclusive access. Missing records
    /// start out as a fresh, disconnected guild.
    pub fn with_state<R>(&self, guild_id: GuildId, f: impl FnOnce(&mut GuildMusicState) -> R) -> R {
        let slot = self.slot(guild_id);
        let mut state = slot.state.lock();
        f(&mut state)
    }

    pub fn snapshot(&self, guild_id: GuildId) -> GuildMusicState {
        self.with_state(guild_id, |state| state.clone())
    }

    pub async fn lock_guild(&self, guild_id: GuildId) -> GuildGuard {
        let operations = self.slot(guild_id).operations.clone();
        operations.lock_owned().await
    }

    pub fn set_notification_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.with_state(guild_id, |state| {
            state.notification_channel_id = Some(channel_id);
        });
    }

    pub fn guild_count(&self) -> usize {
        self.guilds.len()
    }
}
