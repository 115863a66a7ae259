use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        backend::{BackendCallback, CallbackKind, PlaybackBackend},
        catalog::TrackCatalog,
        queue::LoopMode,
        state_store::GuildStateStore,
        track::{QueueEntry, Track, TrackId},
    },
    error::{MusicError, MusicResult},
    events::{DomainEvent, EventBus, EventStream, TrackEndReason},
};

/// Result of a skip: what was skipped and what plays now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipOutcome {
    pub skipped: TrackId,
    pub next: Option<TrackId>,
}

#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub position: usize,
    pub entry: QueueEntry,
    pub track: Track,
    pub paused: bool,
    pub loop_mode: LoopMode,
}

/// What the playback handler decided after a track ended.
enum AfterEnd {
    Stale,
    Play(TrackId, Option<ChannelId>),
    Exhausted(Option<ChannelId>),
}

/// Issues backend commands and turns backend callbacks into domain events.
pub struct PlaybackController {
    store: Arc<GuildStateStore>,
    bus: Arc<EventBus>,
    catalog: Arc<TrackCatalog>,
    backend: Arc<dyn PlaybackBackend>,
}

impl PlaybackController {
    pub fn new(
        store: Arc<GuildStateStore>,
        bus: Arc<EventBus>,
        catalog: Arc<TrackCatalog>,
        backend: Arc<dyn PlaybackBackend>,
    ) -> Self {
        Self {
            store,
            bus,
            catalog,
            backend,
        }
    }

    pub async fn pause(&self, guild_id: GuildId) -> MusicResult<()> {
        let _guard = self.store.lock_guild(guild_id).await;
        self.ensure_playing(guild_id)?;

        self.backend.pause(guild_id).await?;
        self.store.with_state(guild_id, |state| state.paused = true);
        info!("⏸️ Reproducción pausada en guild {}", guild_id);
        Ok(())
    }

    pub async fn resume(&self, guild_id: GuildId) -> MusicResult<()> {
        let _guard = self.store.lock_guild(guild_id).await;
        self.ensure_playing(guild_id)?;

        self.backend.resume(guild_id).await?;
        self.store.with_state(guild_id, |state| state.paused = false);
        info!("▶️ Reproducción reanudada en guild {}", guild_id);
        Ok(())
    }

    fn ensure_playing(&self, guild_id: GuildId) -> MusicResult<()> {
        self.store.with_state(guild_id, |state| {
            if !state.is_connected() || state.queue.is_empty() || state.queue.current().is_none() {
                return Err(MusicError::NotPlaying);
            }
            Ok(())
        })
    }

    pub async fn skip(&self, guild_id: GuildId) -> MusicResult<SkipOutcome> {
        let _guard = self.store.lock_guild(guild_id).await;

        let (skipped, next, channel) = self.store.with_state(guild_id, |state| {
            let skipped = state.current_track().ok_or(MusicError::NotPlaying)?;
            let next = state
                .queue
                .advance(TrackEndReason::Skipped)
                .and_then(|_| state.current_track());
            state.paused = false;
            Ok::<_, MusicError>((skipped, next, state.notification_channel_id))
        })?;

        info!("⏭️ Saltando {} en guild {}", skipped, guild_id);
        self.bus.publish(
            DomainEvent::TrackEnded {
                guild_id,
                track_id: skipped.clone(),
                reason: TrackEndReason::Skipped,
            },
            channel,
        );

        match &next {
            Some(track_id) => self.start_locked(guild_id, track_id.clone(), channel).await,
            None => self.exhaust_locked(guild_id, channel).await,
        }

        Ok(SkipOutcome { skipped, next })
    }

    pub fn set_loop_mode(&self, guild_id: GuildId, mode: LoopMode) -> LoopMode {
        self.store
            .with_state(guild_id, |state| state.queue.set_loop_mode(mode));
        mode
    }

    pub fn cycle_loop_mode(&self, guild_id: GuildId) -> LoopMode {
        self.store
            .with_state(guild_id, |state| state.queue.cycle_loop_mode())
    }

    pub async fn now_playing(&self, guild_id: GuildId) -> MusicResult<Option<NowPlaying>> {
        let snapshot = self.store.with_state(guild_id, |state| {
            let position = state.queue.current_index()?;
            let entry = state.queue.current()?.clone();
            Some((position, entry, state.paused, state.queue.loop_mode()))
        });

        let Some((position, entry, paused, loop_mode)) = snapshot else {
            return Ok(None);
        };
        let track = self.catalog.load(&entry.track_id).await?;

        Ok(Some(NowPlaying {
            position,
            entry,
            track,
            paused,
            loop_mode,
        }))
    }

    /// Starts the current entry on the backend. The caller holds the guild
    /// guard and has just made `track_id` current.
    ///
    /// Nothing is sent while the guild is not connected; the entry stays
    /// current and is started on the next join. A failure to start is
    /// published as `TrackEnded { Errored }` so the playback handler moves on.
    pub(crate) async fn start_locked(
        &self,
        guild_id: GuildId,
        track_id: TrackId,
        channel: Option<ChannelId>,
    ) {
        if !self.store.with_state(guild_id, |state| state.is_connected()) {
            debug!("🔇 Guild {} sin conexión de voz, {} queda pendiente", guild_id, track_id);
            return;
        }

        let result = match self.catalog.load(&track_id).await {
            Ok(track) => {
                info!("🎵 Reproduciendo: {} en guild {}", track.title, guild_id);
                self.backend.play(guild_id, &track).await
            }
            Err(e) => Err(e),
        };

        self.store.with_state(guild_id, |state| state.paused = false);

        if let Err(e) = result {
            error!("❌ No se pudo reproducir {} en guild {}: {}", track_id, guild_id, e);
            self.bus.publish(
                DomainEvent::TrackEnded {
                    guild_id,
                    track_id,
                    reason: TrackEndReason::Errored,
                },
                channel,
            );
        }
    }

    pub(crate) async fn stop_locked(&self, guild_id: GuildId) {
        self.store.with_state(guild_id, |state| state.paused = false);
        if let Err(e) = self.backend.stop(guild_id).await {
            error!("❌ Error al detener reproducción en guild {}: {}", guild_id, e);
        }
    }

    async fn exhaust_locked(&self, guild_id: GuildId, channel: Option<ChannelId>) {
        self.stop_locked(guild_id).await;
        self.bus
            .publish(DomainEvent::QueueExhausted { guild_id }, channel);
    }

    /// Translates a backend callback into a domain event. Callbacks about a
    /// track that is no longer current are dropped. Returns whether an event
    /// was published.
    pub fn handle_callback(&self, callback: BackendCallback) -> bool {
        let BackendCallback {
            session: guild_id,
            track_id,
            kind,
        } = callback;

        let channel = self.store.with_state(guild_id, |state| {
            if !state.is_current(&track_id) {
                return None;
            }
            if kind == CallbackKind::Started {
                state.consecutive_failures = 0;
                state.paused = false;
            }
            Some(state.notification_channel_id)
        });

        let Some(channel) = channel else {
            debug!("🕰️ Callback obsoleto {:?} para {} en guild {}", kind, track_id, guild_id);
            return false;
        };

        let event = match kind {
            CallbackKind::Started => DomainEvent::TrackStarted { guild_id, track_id },
            CallbackKind::Finished => DomainEvent::TrackEnded {
                guild_id,
                track_id,
                reason: TrackEndReason::Finished,
            },
            CallbackKind::Errored => DomainEvent::TrackEnded {
                guild_id,
                track_id,
                reason: TrackEndReason::Errored,
            },
        };
        self.bus.publish(event, channel);
        true
    }

    /// Auto-advance after a track finished or failed.
    pub async fn on_track_ended(&self, guild_id: GuildId, track_id: TrackId, reason: TrackEndReason) {
        if !reason.advances_queue() {
            return;
        }

        let _guard = self.store.lock_guild(guild_id).await;

        let decision = self.store.with_state(guild_id, |state| {
            if !state.is_current(&track_id) {
                return AfterEnd::Stale;
            }
            let channel = state.notification_channel_id;

            if reason == TrackEndReason::Errored {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= state.queue.len() {
                    warn!(
                        "⚠️ {} fallos consecutivos en guild {}, deteniendo la cola",
                        state.consecutive_failures, guild_id
                    );
                    state.consecutive_failures = 0;
                    state.queue.halt();
                    return AfterEnd::Exhausted(channel);
                }
            }

            match state.queue.advance(reason).and_then(|_| state.current_track()) {
                Some(next) => AfterEnd::Play(next, channel),
                None => AfterEnd::Exhausted(channel),
            }
        });

        match decision {
            AfterEnd::Stale => {
                debug!("🕰️ Fin obsoleto de {} en guild {}", track_id, guild_id);
            }
            AfterEnd::Play(next, channel) => self.start_locked(guild_id, next, channel).await,
            AfterEnd::Exhausted(channel) => self.exhaust_locked(guild_id, channel).await,
        }
    }

    /// Stops the backend session after the bot was removed from voice.
    pub async fn on_voice_state_changed(&self, guild_id: GuildId, new_channel_id: Option<ChannelId>) {
        if new_channel_id.is_some() {
            return;
        }

        let _guard = self.store.lock_guild(guild_id).await;
        if self.store.with_state(guild_id, |state| state.is_connected()) {
            // se volvió a conectar mientras el evento esperaba
            return;
        }
        info!("🔌 Deteniendo sesión de audio en guild {}", guild_id);
        self.stop_locked(guild_id).await;
    }

    pub async fn run_callback_pump(
        self: Arc<Self>,
        mut callbacks: mpsc::Receiver<BackendCallback>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                callback = callbacks.recv() => match callback {
                    Some(callback) => {
                        self.handle_callback(callback);
                    }
                    None => break,
                },
            }
        }
        debug!("🛑 Receptor de callbacks detenido");
    }

    pub async fn run_playback_handler(self: Arc<Self>, mut events: EventStream, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                envelope = events.recv() => match envelope {
                    Some(envelope) => {
                        if let DomainEvent::TrackEnded { guild_id, track_id, reason } = envelope.event {
                            self.on_track_ended(guild_id, track_id, reason).await;
                        }
                    }
                    None => break,
                },
            }
        }
        debug!("🛑 Manejador de reproducción detenido");
    }

    pub async fn run_voice_handler(self: Arc<Self>, mut events: EventStream, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                envelope = events.recv() => match envelope {
                    Some(envelope) => {
                        if let DomainEvent::VoiceStateChanged { guild_id, new_channel_id } = envelope.event {
                            self.on_voice_state_changed(guild_id, new_channel_id).await;
                        }
                    }
                    None => break,
                },
            }
        }
        debug!("🛑 Manejador de voz detenido");
    }
}
