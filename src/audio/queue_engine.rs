use serenity::model::id::{GuildId, UserId};
use std::sync::Arc;
use tracing::info;

use crate::{
    audio::{
        player::PlaybackController,
        queue::QueuePage,
        state_store::GuildStateStore,
        track::{QueueEntry, TrackId},
    },
    error::{MusicError, MusicResult},
    events::{DomainEvent, EventBus, TrackEndReason},
};

/// User-facing queue operations. Positions are 0-based.
pub struct QueueEngine {
    store: Arc<GuildStateStore>,
    bus: Arc<EventBus>,
    player: Arc<PlaybackController>,
    page_size: usize,
}

impl QueueEngine {
    pub fn new(
        store: Arc<GuildStateStore>,
        bus: Arc<EventBus>,
        player: Arc<PlaybackController>,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            bus,
            player,
            page_size,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Appends tracks and returns how many were added. On an idle guild the
    /// first added track becomes current and is started right away.
    pub async fn add(
        &self,
        guild_id: GuildId,
        track_ids: Vec<TrackId>,
        requester_id: UserId,
    ) -> MusicResult<usize> {
        let count = track_ids.len();
        if count == 0 {
            return Ok(0);
        }

        let _guard = self.store.lock_guild(guild_id).await;
        let (started, channel) = self.store.with_state(guild_id, |state| {
            let entries = track_ids
                .into_iter()
                .map(|track_id| QueueEntry::new(track_id, requester_id));
            let started = state
                .queue
                .append(entries)
                .and_then(|_| state.current_track());
            (started, state.notification_channel_id)
        });

        info!("➕ {} canciones agregadas a la cola en guild {}", count, guild_id);

        if let Some(track_id) = started {
            self.player.start_locked(guild_id, track_id, channel).await;
        }
        Ok(count)
    }

    pub async fn remove(&self, guild_id: GuildId, index: usize) -> MusicResult<QueueEntry> {
        let _guard = self.store.lock_guild(guild_id).await;
        let removed = self
            .store
            .with_state(guild_id, |state| state.queue.remove(index))?;
        info!("❌ {} eliminada de la cola en guild {}", removed.track_id, guild_id);
        Ok(removed)
    }

    /// Returns how many entries were removed.
    pub async fn clear(&self, guild_id: GuildId, keep_current: bool) -> MusicResult<usize> {
        let _guard = self.store.lock_guild(guild_id).await;
        let (cleared, channel) = self.store.with_state(guild_id, |state| {
            state
                .queue
                .clear(keep_current)
                .map(|cleared| (cleared, state.notification_channel_id))
        })?;

        if let Some(stopped) = cleared.stopped {
            self.bus.publish(
                DomainEvent::TrackEnded {
                    guild_id,
                    track_id: stopped.track_id,
                    reason: TrackEndReason::Stopped,
                },
                channel,
            );
            self.player.stop_locked(guild_id).await;
        }
        Ok(cleared.removed)
    }

    /// Stops playback by emptying the queue. Stopping an empty queue is not
    /// an error.
    pub async fn stop(&self, guild_id: GuildId) -> MusicResult<usize> {
        match self.clear(guild_id, false).await {
            Err(MusicError::QueueEmpty) => Ok(0),
            other => other,
        }
    }

    pub async fn seek(&self, guild_id: GuildId, index: usize) -> MusicResult<TrackId> {
        let _guard = self.store.lock_guild(guild_id).await;
        let (track_id, channel) = self.store.with_state(guild_id, |state| {
            let track_id = state.queue.seek(index)?.track_id.clone();
            Ok::<_, MusicError>((track_id, state.notification_channel_id))
        })?;

        info!("⏩ Saltando a la posición {} en guild {}", index, guild_id);
        self.player
            .start_locked(guild_id, track_id.clone(), channel)
            .await;
        Ok(track_id)
    }

    pub async fn restart(&self, guild_id: GuildId) -> MusicResult<TrackId> {
        self.seek(guild_id, 0).await
    }

    /// `page` is 1-based; `0` means the page holding the current entry.
    pub fn list(&self, guild_id: GuildId, page: usize) -> QueuePage {
        self.store
            .with_state(guild_id, |state| state.queue.page(page, self.page_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        backend::MockPlaybackBackend,
        testing::{self, GUILD, USER},
    };
    use crate::events::Topic;
    use pretty_assertions::assert_eq;

    fn ids(ids: &[&str]) -> Vec<TrackId> {
        ids.iter().map(|id| TrackId::from(*id)).collect()
    }

    #[tokio::test]
    async fn first_add_starts_playback() {
        let mut backend = MockPlaybackBackend::new();
        backend
            .expect_play()
            .withf(|guild, track| *guild == GUILD && track.id == TrackId::from("t1"))
            .times(1)
            .returning(|_, _| Ok(()));

        let harness = testing::Harness::new(backend);
        harness.connected_with(&[]);
        harness.with_tracks(&["t1", "t2"]);

        let added = harness.engine.add(GUILD, ids(&["t1", "t2"]), USER).await.unwrap();

        let state = harness.store.snapshot(GUILD);
        assert_eq!(added, 2);
        assert_eq!(state.queue.len(), 2);
        assert_eq!(state.queue.current_index(), Some(0));
    }

    #[tokio::test]
    async fn add_while_playing_only_appends() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        harness.connected_with(&["t1"]);
        harness.with_tracks(&["t2"]);

        harness.engine.add(GUILD, ids(&["t2"]), USER).await.unwrap();
        let state = harness.store.snapshot(GUILD);
        assert_eq!(state.queue.len(), 2);
        assert_eq!(state.queue.current_index(), Some(0));
    }

    #[tokio::test]
    async fn add_while_disconnected_defers_playback() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        harness.with_tracks(&["t1"]);

        harness.engine.add(GUILD, ids(&["t1"]), USER).await.unwrap();
        assert_eq!(harness.store.snapshot(GUILD).queue.current_index(), Some(0));
    }

    #[tokio::test]
    async fn add_nothing_is_noop() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        assert_eq!(harness.engine.add(GUILD, Vec::new(), USER).await, Ok(0));
        assert!(harness.store.snapshot(GUILD).queue.is_empty());
    }

    #[tokio::test]
    async fn remove_current_fails_without_mutation() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        harness.connected_with(&["t1", "t2"]);

        assert_eq!(
            harness.engine.remove(GUILD, 0).await,
            Err(MusicError::IsCurrentTrack)
        );
        assert_eq!(harness.store.snapshot(GUILD).queue.len(), 2);
    }

    #[tokio::test]
    async fn remove_upcoming_entry() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        harness.connected_with(&["t1", "t2", "t3"]);

        let removed = harness.engine.remove(GUILD, 1).await.unwrap();
        assert_eq!(removed.track_id, TrackId::from("t2"));
        assert_eq!(harness.store.snapshot(GUILD).queue.len(), 2);
    }

    #[tokio::test]
    async fn clear_all_stops_and_publishes() {
        let mut backend = MockPlaybackBackend::new();
        backend.expect_stop().times(1).returning(|_| Ok(()));

        let harness = testing::Harness::new(backend);
        harness.connected_with(&["t1", "t2"]);
        let mut ended = harness.bus.subscribe(Topic::TrackEnded);

        assert_eq!(harness.engine.clear(GUILD, false).await, Ok(2));
        assert_eq!(
            ended.try_recv().map(|e| e.event),
            Some(DomainEvent::TrackEnded {
                guild_id: GUILD,
                track_id: TrackId::from("t1"),
                reason: TrackEndReason::Stopped,
            })
        );
        assert_eq!(harness.store.snapshot(GUILD).queue.current_index(), None);
    }

    #[tokio::test]
    async fn stop_empties_queue_and_stops_backend() {
        let mut backend = MockPlaybackBackend::new();
        backend.expect_stop().times(1).returning(|_| Ok(()));

        let harness = testing::Harness::new(backend);
        harness.connected_with(&["t1", "t2"]);
        let mut ended = harness.bus.subscribe(Topic::TrackEnded);

        assert_eq!(harness.engine.stop(GUILD).await, Ok(2));
        assert_eq!(
            ended.try_recv().map(|e| e.event),
            Some(DomainEvent::TrackEnded {
                guild_id: GUILD,
                track_id: TrackId::from("t1"),
                reason: TrackEndReason::Stopped,
            })
        );
        let state = harness.store.snapshot(GUILD);
        assert!(state.queue.is_empty());
        assert!(state.is_connected());
    }

    #[tokio::test]
    async fn stop_on_empty_queue_is_ok() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        harness.connected_with(&[]);
        assert_eq!(harness.engine.stop(GUILD).await, Ok(0));
    }

    #[tokio::test]
    async fn clear_keep_current_leaves_playback_alone() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        harness.connected_with(&["t1", "t2", "t3"]);

        assert_eq!(harness.engine.clear(GUILD, true).await, Ok(2));
        let state = harness.store.snapshot(GUILD);
        assert_eq!(state.queue.len(), 1);
        assert_eq!(state.current_track(), Some(TrackId::from("t1")));
    }

    #[tokio::test]
    async fn clear_empty_queue_fails() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        assert_eq!(
            harness.engine.clear(GUILD, false).await,
            Err(MusicError::QueueEmpty)
        );
    }

    #[tokio::test]
    async fn seek_plays_target() {
        let mut backend = MockPlaybackBackend::new();
        backend
            .expect_play()
            .withf(|_, track| track.id == TrackId::from("t3"))
            .times(1)
            .returning(|_, _| Ok(()));

        let harness = testing::Harness::new(backend);
        harness.connected_with(&["t1", "t2", "t3"]);

        assert_eq!(harness.engine.seek(GUILD, 2).await, Ok(TrackId::from("t3")));
        assert_eq!(harness.store.snapshot(GUILD).queue.current_index(), Some(2));
    }

    #[tokio::test]
    async fn seek_out_of_range() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        harness.connected_with(&["t1"]);
        assert_eq!(
            harness.engine.seek(GUILD, 5).await,
            Err(MusicError::IndexOutOfRange { index: 5, len: 1 })
        );
    }

    #[tokio::test]
    async fn restart_seeks_to_start() {
        let mut backend = MockPlaybackBackend::new();
        backend
            .expect_play()
            .withf(|_, track| track.id == TrackId::from("t1"))
            .times(1)
            .returning(|_, _| Ok(()));

        let harness = testing::Harness::new(backend);
        harness.connected_with(&["t1", "t2"]);
        harness.store.with_state(GUILD, |state| {
            state.queue.seek(1).unwrap();
        });

        assert_eq!(harness.engine.restart(GUILD).await, Ok(TrackId::from("t1")));
    }

    #[test]
    fn list_uses_configured_page_size() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        let many: Vec<String> = (0..30).map(|i| format!("t{i}")).collect();
        let many: Vec<&str> = many.iter().map(String::as_str).collect();
        harness.queued(&many);

        let page = harness.engine.list(GUILD, 2);
        assert_eq!(page.page_size, 25);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.upcoming.len(), 5);
        assert_eq!(page.upcoming[0].position, 25);
    }
}
