//! Composition root: builds the playback core once and wires its handlers.

use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    audio::{
        backend::{BackendCallback, PlaybackBackend},
        catalog::TrackCatalog,
        player::PlaybackController,
        queue_engine::QueueEngine,
        state_store::GuildStateStore,
        voice::{VoiceGateway, VoiceSessionManager},
    },
    config::Config,
    events::{EventBus, Topic},
    notifications::{NotificationDispatcher, Notifier, NOTIFICATION_TOPICS},
};

pub struct Jukebox {
    pub store: Arc<GuildStateStore>,
    pub bus: Arc<EventBus>,
    pub catalog: Arc<TrackCatalog>,
    pub queue: Arc<QueueEngine>,
    pub player: Arc<PlaybackController>,
    pub voice: Arc<VoiceSessionManager>,
    token: CancellationToken,
}

impl Jukebox {
    pub fn new(config: &Config, backend: Arc<dyn PlaybackBackend>, gateway: Arc<dyn VoiceGateway>) -> Self {
        let store = Arc::new(GuildStateStore::new());
        let bus = Arc::new(EventBus::new(config.event_inbox_capacity));
        let catalog = Arc::new(TrackCatalog::new(
            backend.clone(),
            config.default_search_source.clone(),
            config.max_playlist_size,
        ));
        let player = Arc::new(PlaybackController::new(
            store.clone(),
            bus.clone(),
            catalog.clone(),
            backend.clone(),
        ));
        let queue = Arc::new(QueueEngine::new(
            store.clone(),
            bus.clone(),
            player.clone(),
            config.queue_page_size,
        ));
        let voice = Arc::new(VoiceSessionManager::new(
            store.clone(),
            bus.clone(),
            gateway,
            backend,
            player.clone(),
        ));

        Self {
            store,
            bus,
            catalog,
            queue,
            player,
            voice,
            token: CancellationToken::new(),
        }
    }

    /// Spawns the long-lived handler tasks. Subscriptions are taken before
    /// this returns, so no event published afterwards is missed.
    ///
    /// The playback and voice handlers drive state transitions and get
    /// lossless inboxes; only the notification dispatcher may lose events.
    pub fn spawn_workers(
        &self,
        callbacks: mpsc::Receiver<BackendCallback>,
        notifier: Arc<dyn Notifier>,
    ) -> Vec<JoinHandle<()>> {
        let playback_events = self.bus.subscribe_lossless(&[Topic::TrackEnded]);
        let voice_events = self.bus.subscribe_lossless(&[Topic::VoiceStateChanged]);
        let notification_events = self.bus.subscribe_all(NOTIFICATION_TOPICS);

        let dispatcher = Arc::new(NotificationDispatcher::new(
            self.store.clone(),
            self.catalog.clone(),
            notifier,
        ));

        let workers = vec![
            tokio::spawn(self.player.clone().run_callback_pump(callbacks, self.token.clone())),
            tokio::spawn(
                self.player
                    .clone()
                    .run_playback_handler(playback_events, self.token.clone()),
            ),
            tokio::spawn(
                self.player
                    .clone()
                    .run_voice_handler(voice_events, self.token.clone()),
            ),
            tokio::spawn(dispatcher.run(notification_events, self.token.clone())),
        ];
        info!("⚙️ {} tareas de reproducción iniciadas", workers.len());
        workers
    }

    pub fn shutdown(&self) {
        info!("🛑 Deteniendo tareas de reproducción");
        self.token.cancel();
        self.bus.close();
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        backend::{CallbackKind, MockPlaybackBackend},
        state_store::ConnectionStatus,
        testing::{track, GUILD, TEXT, USER, VOICE},
        track::TrackId,
        voice::MockVoiceGateway,
    };
    use crate::events::{DomainEvent, TrackEndReason};
    use crate::notifications::MockNotifier;
    use pretty_assertions::assert_eq;
    use serenity::model::id::{GuildId, MessageId};
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };

    fn jukebox(backend: MockPlaybackBackend, gateway: MockVoiceGateway) -> Jukebox {
        Jukebox::new(&Config::default(), Arc::new(backend), Arc::new(gateway))
    }

    fn quiet_notifier() -> MockNotifier {
        let mut notifier = MockNotifier::new();
        notifier.expect_send().returning(|_, _| Ok(MessageId::new(1)));
        notifier.expect_delete().returning(|_, _| Ok(()));
        notifier
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn finished_callback_auto_advances() {
        let mut backend = MockPlaybackBackend::new();
        backend.expect_play().times(2).returning(|_, _| Ok(()));
        let mut gateway = MockVoiceGateway::new();
        gateway.expect_join().returning(|_, _| Ok(()));

        let jukebox = jukebox(backend, gateway);
        let (callbacks, receiver) = mpsc::channel(8);
        let workers = jukebox.spawn_workers(receiver, Arc::new(quiet_notifier()));

        jukebox.catalog.insert(track("t1"));
        jukebox.catalog.insert(track("t2"));
        jukebox.voice.join(GUILD, Some(VOICE), USER, TEXT).await.unwrap();
        jukebox
            .queue
            .add(GUILD, vec![TrackId::from("t1"), TrackId::from("t2")], USER)
            .await
            .unwrap();

        callbacks
            .send(BackendCallback {
                session: GUILD,
                track_id: TrackId::from("t1"),
                kind: CallbackKind::Finished,
            })
            .await
            .unwrap();

        eventually(|| jukebox.store.snapshot(GUILD).queue.current_index() == Some(1)).await;

        jukebox.shutdown();
        for worker in workers {
            worker.await.unwrap();
        }
    }

    #[tokio::test]
    async fn finished_track_advances_despite_busy_bus() {
        let other_guild = GuildId::new(2);
        let mut backend = MockPlaybackBackend::new();
        backend.expect_play().times(2).returning(|_, _| Ok(()));
        let mut gateway = MockVoiceGateway::new();
        gateway.expect_join().returning(|_, _| Ok(()));

        let config = Config {
            event_inbox_capacity: 1,
            ..Config::default()
        };
        let jukebox = Jukebox::new(&config, Arc::new(backend), Arc::new(gateway));
        jukebox.catalog.insert(track("t1"));
        jukebox.catalog.insert(track("t2"));
        jukebox.voice.join(GUILD, Some(VOICE), USER, TEXT).await.unwrap();
        jukebox
            .queue
            .add(GUILD, vec![TrackId::from("t1"), TrackId::from("t2")], USER)
            .await
            .unwrap();

        let (_callbacks, receiver) = mpsc::channel(8);
        let workers = jukebox.spawn_workers(receiver, Arc::new(quiet_notifier()));

        // Sin `.await` de por medio: los workers aún no consumieron nada
        assert!(jukebox.player.handle_callback(BackendCallback {
            session: GUILD,
            track_id: TrackId::from("t1"),
            kind: CallbackKind::Finished,
        }));
        for _ in 0..5 {
            jukebox.bus.publish(
                DomainEvent::TrackEnded {
                    guild_id: other_guild,
                    track_id: TrackId::from("b1"),
                    reason: TrackEndReason::Skipped,
                },
                None,
            );
        }

        eventually(|| jukebox.store.snapshot(GUILD).queue.current_index() == Some(1)).await;

        jukebox.shutdown();
        for worker in workers {
            worker.await.unwrap();
        }
    }

    #[tokio::test]
    async fn external_disconnect_stops_backend_and_keeps_queue() {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();
        let mut backend = MockPlaybackBackend::new();
        backend.expect_play().returning(|_, _| Ok(()));
        backend.expect_stop().times(1).returning(move |_| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        let mut gateway = MockVoiceGateway::new();
        gateway.expect_join().returning(|_, _| Ok(()));

        let jukebox = jukebox(backend, gateway);
        let (_callbacks, receiver) = mpsc::channel(8);
        let mut voice_events = jukebox.bus.subscribe(Topic::VoiceStateChanged);
        let workers = jukebox.spawn_workers(receiver, Arc::new(quiet_notifier()));

        jukebox.catalog.insert(track("t1"));
        jukebox.voice.join(GUILD, Some(VOICE), USER, TEXT).await.unwrap();
        jukebox.queue.add(GUILD, vec![TrackId::from("t1")], USER).await.unwrap();

        jukebox.voice.on_external_voice_state_change(GUILD, None);

        assert_eq!(
            voice_events.recv().await.map(|e| e.event),
            Some(DomainEvent::VoiceStateChanged {
                guild_id: GUILD,
                new_channel_id: None,
            })
        );
        let state = jukebox.store.snapshot(GUILD);
        assert_eq!(state.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(state.queue.len(), 1);

        eventually(|| stopped.load(Ordering::SeqCst)).await;
        jukebox.shutdown();
        for worker in workers {
            worker.await.unwrap();
        }
    }

    #[tokio::test]
    async fn shutdown_stops_all_workers() {
        let jukebox = jukebox(MockPlaybackBackend::new(), MockVoiceGateway::new());
        let (_callbacks, receiver) = mpsc::channel(8);
        let workers = jukebox.spawn_workers(receiver, Arc::new(MockNotifier::new()));

        jukebox.shutdown();
        for worker in workers {
            tokio::time::timeout(Duration::from_secs(1), worker)
                .await
                .expect("worker did not stop")
                .unwrap();
        }
    }
}
