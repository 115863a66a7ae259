use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    audio::{
        backend::PlaybackBackend,
        player::PlaybackController,
        state_store::{ConnectionStatus, GuildStateStore},
    },
    error::{MusicError, MusicResult},
    events::{DomainEvent, EventBus},
};

/// Chat gateway voice operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()>;
    async fn leave(&self, guild_id: GuildId) -> MusicResult<()>;
    /// Voice channel the user currently sits in, if any.
    fn user_voice_channel(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId>;
}

/// Owns the `Disconnected → Connecting → Connected` lifecycle of each guild.
pub struct VoiceSessionManager {
    store: Arc<GuildStateStore>,
    bus: Arc<EventBus>,
    gateway: Arc<dyn VoiceGateway>,
    backend: Arc<dyn PlaybackBackend>,
    player: Arc<PlaybackController>,
}

impl VoiceSessionManager {
    pub fn new(
        store: Arc<GuildStateStore>,
        bus: Arc<EventBus>,
        gateway: Arc<dyn VoiceGateway>,
        backend: Arc<dyn PlaybackBackend>,
        player: Arc<PlaybackController>,
    ) -> Self {
        Self {
            store,
            bus,
            gateway,
            backend,
            player,
        }
    }

    /// Connects to `target`, or to the invoking user's channel when `target`
    /// is `None`. The notification channel is always updated. If the queue
    /// still has a current entry from an earlier session, it starts playing.
    pub async fn join(
        &self,
        guild_id: GuildId,
        target: Option<ChannelId>,
        user_id: UserId,
        notification_channel_id: ChannelId,
    ) -> MusicResult<ChannelId> {
        let target = match target {
            Some(channel_id) => channel_id,
            None => self
                .gateway
                .user_voice_channel(guild_id, user_id)
                .ok_or(MusicError::UserNotInVoice)?,
        };

        let _guard = self.store.lock_guild(guild_id).await;

        let previous = self.store.with_state(guild_id, |state| {
            state.notification_channel_id = Some(notification_channel_id);
            if state.is_connected() && state.voice_channel_id == Some(target) {
                return None;
            }
            let previous = (state.connection_status, state.voice_channel_id);
            state.connection_status = ConnectionStatus::Connecting;
            Some(previous)
        });

        let Some((previous_status, previous_channel)) = previous else {
            return Ok(target);
        };

        if let Err(e) = self.gateway.join(guild_id, target).await {
            error!("❌ Error al conectar al canal de voz en guild {}: {}", guild_id, e);
            self.store.with_state(guild_id, |state| {
                state.connection_status = previous_status;
                state.voice_channel_id = previous_channel;
            });
            return Err(match e {
                MusicError::VoiceConnectionFailed(_) => e,
                other => MusicError::VoiceConnectionFailed(other.to_string()),
            });
        }

        let pending = self.store.with_state(guild_id, |state| {
            state.connection_status = ConnectionStatus::Connected;
            state.voice_channel_id = Some(target);
            state.current_track()
        });
        info!("🔊 Conectado al canal {} en guild {}", target, guild_id);

        // Al mover de canal la pista sigue sonando
        if previous_status != ConnectionStatus::Connected {
            if let Some(track_id) = pending {
                info!("▶️ Retomando {} en guild {}", track_id, guild_id);
                self.player
                    .start_locked(guild_id, track_id, Some(notification_channel_id))
                    .await;
            }
        }

        Ok(target)
    }

    /// Disconnects and releases the backend session. The queue is kept.
    pub async fn leave(&self, guild_id: GuildId) -> MusicResult<()> {
        let _guard = self.store.lock_guild(guild_id).await;

        let was_connected = self.store.with_state(guild_id, |state| {
            if !state.is_connected() {
                return false;
            }
            state.connection_status = ConnectionStatus::Disconnected;
            state.voice_channel_id = None;
            state.paused = false;
            true
        });
        if !was_connected {
            return Err(MusicError::NotConnected);
        }

        if let Err(e) = self.backend.release(guild_id).await {
            warn!("⚠️ No se pudo liberar la sesión de audio en guild {}: {}", guild_id, e);
        }
        if let Err(e) = self.gateway.leave(guild_id).await {
            warn!("⚠️ Error al salir del canal de voz en guild {}: {}", guild_id, e);
        }

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }

    /// Reconciles a voice state update for the bot's own user that the bot did
    /// not ask for: a forced disconnect or a move by a moderator.
    pub fn on_external_voice_state_change(&self, guild_id: GuildId, new_channel_id: Option<ChannelId>) {
        let changed = self.store.with_state(guild_id, |state| {
            if !state.is_connected() || state.voice_channel_id == new_channel_id {
                return None;
            }
            match new_channel_id {
                None => {
                    state.connection_status = ConnectionStatus::Disconnected;
                    state.voice_channel_id = None;
                    state.paused = false;
                }
                Some(channel_id) => state.voice_channel_id = Some(channel_id),
            }
            Some(state.notification_channel_id)
        });

        let Some(channel) = changed else {
            return;
        };

        match new_channel_id {
            None => info!("🔌 Bot desconectado externamente en guild {}", guild_id),
            Some(channel_id) => info!("🚚 Bot movido al canal {} en guild {}", channel_id, guild_id),
        }
        self.bus.publish(
            DomainEvent::VoiceStateChanged {
                guild_id,
                new_channel_id,
            },
            channel,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        backend::MockPlaybackBackend,
        testing::{self, GUILD, TEXT, USER, VOICE},
        track::TrackId,
    };
    use crate::events::Topic;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    fn manager(
        harness: &testing::Harness,
        gateway: MockVoiceGateway,
        backend: MockPlaybackBackend,
    ) -> VoiceSessionManager {
        VoiceSessionManager::new(
            harness.store.clone(),
            harness.bus.clone(),
            Arc::new(gateway),
            Arc::new(backend),
            harness.player.clone(),
        )
    }

    #[tokio::test]
    async fn join_uses_user_channel() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        let mut gateway = MockVoiceGateway::new();
        gateway
            .expect_user_voice_channel()
            .with(eq(GUILD), eq(USER))
            .returning(|_, _| Some(VOICE));
        gateway
            .expect_join()
            .with(eq(GUILD), eq(VOICE))
            .times(1)
            .returning(|_, _| Ok(()));
        let voice = manager(&harness, gateway, MockPlaybackBackend::new());

        assert_eq!(voice.join(GUILD, None, USER, TEXT).await, Ok(VOICE));

        let state = harness.store.snapshot(GUILD);
        assert_eq!(state.connection_status, ConnectionStatus::Connected);
        assert_eq!(state.voice_channel_id, Some(VOICE));
        assert_eq!(state.notification_channel_id, Some(TEXT));
    }

    #[tokio::test]
    async fn join_without_user_channel_fails() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        let mut gateway = MockVoiceGateway::new();
        gateway.expect_user_voice_channel().returning(|_, _| None);
        let voice = manager(&harness, gateway, MockPlaybackBackend::new());

        assert_eq!(
            voice.join(GUILD, None, USER, TEXT).await,
            Err(MusicError::UserNotInVoice)
        );
        assert_eq!(
            harness.store.snapshot(GUILD).connection_status,
            ConnectionStatus::Disconnected
        );
    }

    #[tokio::test]
    async fn rejoining_same_channel_only_updates_notifications() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        harness.connected_with(&["t1"]);
        let mut gateway = MockVoiceGateway::new();
        gateway.expect_join().never();
        let voice = manager(&harness, gateway, MockPlaybackBackend::new());

        let other_text = ChannelId::new(201);
        assert_eq!(voice.join(GUILD, Some(VOICE), USER, other_text).await, Ok(VOICE));
        assert_eq!(
            harness.store.snapshot(GUILD).notification_channel_id,
            Some(other_text)
        );
    }

    #[tokio::test]
    async fn failed_join_restores_previous_status() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        let mut gateway = MockVoiceGateway::new();
        gateway
            .expect_join()
            .returning(|_, _| Err(MusicError::VoiceConnectionFailed("timeout".into())));
        let voice = manager(&harness, gateway, MockPlaybackBackend::new());

        assert!(matches!(
            voice.join(GUILD, Some(VOICE), USER, TEXT).await,
            Err(MusicError::VoiceConnectionFailed(_))
        ));
        let state = harness.store.snapshot(GUILD);
        assert_eq!(state.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(state.voice_channel_id, None);
    }

    #[tokio::test]
    async fn join_resumes_pending_entry() {
        let mut backend = MockPlaybackBackend::new();
        backend
            .expect_play()
            .withf(|_, track| track.id == TrackId::from("t1"))
            .times(1)
            .returning(|_, _| Ok(()));
        let harness = testing::Harness::new(backend);
        harness.queued(&["t1", "t2"]);

        let mut gateway = MockVoiceGateway::new();
        gateway.expect_join().returning(|_, _| Ok(()));
        let voice = manager(&harness, gateway, MockPlaybackBackend::new());

        voice.join(GUILD, Some(VOICE), USER, TEXT).await.unwrap();
    }

    #[tokio::test]
    async fn leave_keeps_queue() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        harness.connected_with(&["t1", "t2"]);

        let mut gateway = MockVoiceGateway::new();
        gateway.expect_leave().with(eq(GUILD)).times(1).returning(|_| Ok(()));
        let mut backend = MockPlaybackBackend::new();
        backend.expect_release().times(1).returning(|_| Ok(()));
        let voice = manager(&harness, gateway, backend);

        voice.leave(GUILD).await.unwrap();

        let state = harness.store.snapshot(GUILD);
        assert_eq!(state.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(state.queue.len(), 2);
        assert_eq!(state.queue.current_index(), Some(0));
    }

    #[tokio::test]
    async fn leave_when_disconnected_fails() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        let voice = manager(&harness, MockVoiceGateway::new(), MockPlaybackBackend::new());
        assert_eq!(voice.leave(GUILD).await, Err(MusicError::NotConnected));
    }

    #[test]
    fn external_disconnect_marks_guild_disconnected() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        harness.connected_with(&["t1", "t2"]);
        let mut events = harness.bus.subscribe(Topic::VoiceStateChanged);
        let voice = manager(&harness, MockVoiceGateway::new(), MockPlaybackBackend::new());

        voice.on_external_voice_state_change(GUILD, None);

        let state = harness.store.snapshot(GUILD);
        assert_eq!(state.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(state.voice_channel_id, None);
        assert_eq!(state.queue.len(), 2);
        let envelope = events.try_recv().unwrap();
        assert_eq!(
            envelope.event,
            DomainEvent::VoiceStateChanged {
                guild_id: GUILD,
                new_channel_id: None,
            }
        );
        assert_eq!(envelope.notification_channel_id, Some(TEXT));
    }

    #[test]
    fn external_move_updates_channel() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        harness.connected_with(&["t1"]);
        let mut events = harness.bus.subscribe(Topic::VoiceStateChanged);
        let voice = manager(&harness, MockVoiceGateway::new(), MockPlaybackBackend::new());

        let moved = ChannelId::new(101);
        voice.on_external_voice_state_change(GUILD, Some(moved));

        let state = harness.store.snapshot(GUILD);
        assert_eq!(state.connection_status, ConnectionStatus::Connected);
        assert_eq!(state.voice_channel_id, Some(moved));
        assert!(events.try_recv().is_some());
    }

    #[test]
    fn external_update_while_connecting_is_ignored() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        harness.queued(&["t1"]);
        harness.store.with_state(GUILD, |state| {
            state.connection_status = ConnectionStatus::Connecting;
            state.notification_channel_id = Some(TEXT);
        });
        let mut events = harness.bus.subscribe(Topic::VoiceStateChanged);
        let voice = manager(&harness, MockVoiceGateway::new(), MockPlaybackBackend::new());

        // el join en curso es quien decide el resultado
        voice.on_external_voice_state_change(GUILD, None);
        voice.on_external_voice_state_change(GUILD, Some(ChannelId::new(101)));

        let state = harness.store.snapshot(GUILD);
        assert_eq!(state.connection_status, ConnectionStatus::Connecting);
        assert_eq!(state.voice_channel_id, None);
        assert_eq!(state.queue.len(), 1);
        assert!(events.try_recv().is_none());
    }

    #[test]
    fn updates_while_disconnected_are_ignored() {
        let harness = testing::Harness::new(MockPlaybackBackend::new());
        let mut events = harness.bus.subscribe(Topic::VoiceStateChanged);
        let voice = manager(&harness, MockVoiceGateway::new(), MockPlaybackBackend::new());

        voice.on_external_voice_state_change(GUILD, None);
        voice.on_external_voice_state_change(GUILD, Some(VOICE));
        assert!(events.try_recv().is_none());
    }
}
