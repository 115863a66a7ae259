//! User-facing notifications driven by playback events.
//!
//! The dispatcher only reads guild state, apart from remembering which
//! "now playing" message belongs to which track. Failures to talk to the chat
//! platform are logged and never reach playback.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    audio::{
        catalog::TrackCatalog,
        state_store::{GuildStateStore, NowPlayingMessage},
        track::TrackId,
    },
    events::{DomainEvent, EventEnvelope, EventStream, Topic, TrackEndReason},
};

/// Topics the dispatcher listens to.
pub const NOTIFICATION_TOPICS: &[Topic] = &[
    Topic::TrackStarted,
    Topic::TrackEnded,
    Topic::VoiceStateChanged,
];

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel_id: ChannelId, content: String) -> anyhow::Result<MessageId>;
    async fn delete(&self, channel_id: ChannelId, message_id: MessageId) -> anyhow::Result<()>;
}

pub struct NotificationDispatcher {
    store: Arc<GuildStateStore>,
    catalog: Arc<TrackCatalog>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<GuildStateStore>, catalog: Arc<TrackCatalog>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            catalog,
            notifier,
        }
    }

    pub async fn run(self: Arc<Self>, mut events: EventStream, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                envelope = events.recv() => match envelope {
                    Some(envelope) => self.handle(envelope).await,
                    None => break,
                },
            }
        }
        debug!("🛑 Despachador de notificaciones detenido");
    }

    pub async fn handle(&self, envelope: EventEnvelope) {
        let Some(channel_id) = envelope.notification_channel_id else {
            return;
        };

        match envelope.event {
            DomainEvent::TrackStarted { guild_id, track_id } => {
                self.announce_track(guild_id, channel_id, track_id).await;
            }
            DomainEvent::TrackEnded {
                guild_id,
                track_id,
                reason,
            } => {
                self.retire_now_playing(guild_id, &track_id).await;
                if reason == TrackEndReason::Errored {
                    let title = self
                        .catalog
                        .get(&track_id)
                        .map(|track| track.title)
                        .unwrap_or_else(|| track_id.to_string());
                    self.post(channel_id, format!("❌ No se pudo reproducir **{}**, pasando a la siguiente", title))
                        .await;
                }
            }
            DomainEvent::VoiceStateChanged {
                new_channel_id: None,
                ..
            } => {
                self.post(
                    channel_id,
                    "🔌 Me desconectaron del canal de voz. La cola se conserva, usa /join para continuar".to_string(),
                )
                .await;
            }
            DomainEvent::VoiceStateChanged { .. } | DomainEvent::QueueExhausted { .. } => {}
        }
    }

    async fn announce_track(&self, guild_id: GuildId, channel_id: ChannelId, track_id: TrackId) {
        let requester = self.store.with_state(guild_id, |state| {
            state
                .queue
                .current()
                .filter(|entry| entry.track_id == track_id)
                .map(|entry| entry.requester_id)
        });
        let Some(requester) = requester else {
            debug!("🕰️ {} ya no es la canción actual, sin aviso", track_id);
            return;
        };

        let track = match self.catalog.load(&track_id).await {
            Ok(track) => track,
            Err(e) => {
                warn!("⚠️ Sin metadata para {}: {}", track_id, e);
                return;
            }
        };

        let content = format!(
            "🎵 Reproduciendo: **{}** de {} `[{}]` · pedida por <@{}>",
            track.title,
            track.artist,
            track.display_duration(),
            requester
        );

        let Some(message_id) = self.post(channel_id, content).await else {
            return;
        };

        let previous = self.store.with_state(guild_id, |state| {
            state.now_playing.replace(NowPlayingMessage {
                channel_id,
                message_id,
                track_id,
            })
        });
        if let Some(previous) = previous {
            self.delete(previous).await;
        }
    }

    async fn retire_now_playing(&self, guild_id: GuildId, track_id: &TrackId) {
        let message = self.store.with_state(guild_id, |state| {
            if state.now_playing.as_ref().map(|m| &m.track_id) == Some(track_id) {
                state.now_playing.take()
            } else {
                None
            }
        });
        if let Some(message) = message {
            self.delete(message).await;
        }
    }

    async fn post(&self, channel_id: ChannelId, content: String) -> Option<MessageId> {
        match self.notifier.send(channel_id, content).await {
            Ok(message_id) => Some(message_id),
            Err(e) => {
                warn!("⚠️ No se pudo enviar mensaje al canal {}: {:?}", channel_id, e);
                None
            }
        }
    }

    async fn delete(&self, message: NowPlayingMessage) {
        if let Err(e) = self.notifier.delete(message.channel_id, message.message_id).await {
            debug!("No se pudo borrar el mensaje {}: {:?}", message.message_id, e);
        }
    }
}
