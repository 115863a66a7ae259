use async_process::Command;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serenity::model::id::GuildId;
use songbird::{
    input::{Input, YoutubeDl},
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        backend::{BackendCallback, CallbackKind, PlaybackBackend, ResolvedPlaylist, SearchSource},
        track::{Track, TrackId},
    },
    config::Config,
    error::{MusicError, MusicResult},
};

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    is_live: Option<bool>,
    extractor_key: Option<String>,
    playlist_title: Option<String>,
}

impl YtDlpInfo {
    fn into_track(self) -> Track {
        let uri = self.webpage_url.or(self.url).unwrap_or_default();
        // La URL es el id estable: yt-dlp la resuelve directamente
        let id = if uri.is_empty() { self.id } else { uri.clone() };

        let mut track = Track::new(
            id,
            self.title.unwrap_or_else(|| "Sin título".to_string()),
            self.uploader
                .or(self.channel)
                .unwrap_or_else(|| "Desconocido".to_string()),
        )
        .with_uri(uri)
        .with_source(
            self.extractor_key
                .map(|key| key.to_lowercase())
                .unwrap_or_else(|| "youtube".to_string()),
        );

        if let Some(seconds) = self.duration.filter(|s| *s > 0.0) {
            track = track.with_duration(Duration::from_secs_f64(seconds));
        }
        if self.is_live.unwrap_or(false) {
            track = track.as_stream();
        }
        track
    }
}

/// One JSON object per line, as printed by `--dump-json`.
fn parse_ytdlp_output(stdout: &str) -> Vec<YtDlpInfo> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpInfo>(line) {
            Ok(info) => Some(info),
            Err(e) => {
                debug!("Línea de yt-dlp ignorada: {}", e);
                None
            }
        })
        .collect()
}

fn classify_ytdlp_failure(query: &str, stderr: &str) -> MusicError {
    let lowered = stderr.to_lowercase();
    let missing = ["unsupported url", "video unavailable", "not found", "404", "private video"];
    if missing.iter().any(|needle| lowered.contains(needle)) {
        MusicError::NotFound(query.to_string())
    } else {
        let first_line = stderr.lines().next().unwrap_or("error desconocido");
        MusicError::BackendUnavailable(format!("yt-dlp: {}", first_line))
    }
}

/// Track currently owned by a session.
struct ActiveTrack {
    handle: TrackHandle,
    track_id: TrackId,
    /// Al marcarse, los eventos de fin ya no se reportan
    finished: Arc<AtomicBool>,
}

/// [`PlaybackBackend`] over songbird calls, with metadata from yt-dlp.
pub struct SongbirdBackend {
    songbird: Arc<Songbird>,
    http: reqwest::Client,
    callbacks: mpsc::Sender<BackendCallback>,
    active: DashMap<GuildId, ActiveTrack>,
    ytdlp_path: String,
    timeout: Duration,
    max_playlist_size: usize,
}

impl SongbirdBackend {
    pub fn new(songbird: Arc<Songbird>, callbacks: mpsc::Sender<BackendCallback>, config: &Config) -> Self {
        Self {
            songbird,
            http: reqwest::Client::new(),
            callbacks,
            active: DashMap::new(),
            ytdlp_path: config.ytdlp_path.clone(),
            timeout: config.backend_timeout(),
            max_playlist_size: config.max_playlist_size,
        }
    }

    async fn run_ytdlp(&self, query: &str, args: &[&str]) -> MusicResult<String> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.ytdlp_path)
                .args(args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| MusicError::BackendUnavailable("yt-dlp no respondió a tiempo".to_string()))?
        .map_err(|e| MusicError::BackendUnavailable(format!("Error al ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("⚠️ yt-dlp falló para {}: {}", query, stderr.trim());
            return Err(classify_ytdlp_failure(query, &stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Silences and stops the session's current track.
    fn stop_active(&self, session: GuildId) {
        if let Some((_, active)) = self.active.remove(&session) {
            active.finished.store(true, Ordering::Release);
            if let Err(e) = active.handle.stop() {
                debug!("Track {} ya estaba detenido: {:?}", active.track_id, e);
            }
        }
    }

    fn active_handle(&self, session: GuildId) -> MusicResult<TrackHandle> {
        self.active
            .get(&session)
            .map(|active| active.handle.clone())
            .ok_or(MusicError::NotPlaying)
    }
}

#[async_trait]
impl PlaybackBackend for SongbirdBackend {
    async fn search(&self, query: &str, source: SearchSource, limit: usize) -> MusicResult<Vec<Track>> {
        let stdout = match source {
            SearchSource::Direct => {
                debug!("📊 Obteniendo info de: {}", query);
                self.run_ytdlp(query, &["--no-playlist", "--dump-json", "--no-warnings", query])
                    .await?
            }
            SearchSource::Provider(provider) => {
                info!("🔍 Buscando en {}: {}", provider, query);
                let search_query = format!("{}{}:{}", provider, limit.max(1), query);
                self.run_ytdlp(
                    query,
                    &[
                        "--dump-json",
                        "--flat-playlist",
                        "--skip-download",
                        "--no-warnings",
                        &search_query,
                    ],
                )
                .await?
            }
        };

        Ok(parse_ytdlp_output(&stdout)
            .into_iter()
            .map(YtDlpInfo::into_track)
            .collect())
    }

    async fn resolve_playlist(&self, url: &str) -> MusicResult<ResolvedPlaylist> {
        info!("📋 Obteniendo playlist: {}", url);
        let limit = self.max_playlist_size.to_string();
        let stdout = self
            .run_ytdlp(
                url,
                &[
                    "--flat-playlist",
                    "--dump-json",
                    "--playlist-end",
                    &limit,
                    "--no-warnings",
                    url,
                ],
            )
            .await?;

        let infos = parse_ytdlp_output(&stdout);
        let name = infos.iter().find_map(|info| info.playlist_title.clone());
        Ok(ResolvedPlaylist {
            name,
            tracks: infos.into_iter().map(YtDlpInfo::into_track).collect(),
        })
    }

    async fn play(&self, session: GuildId, track: &Track) -> MusicResult<()> {
        if track.uri.is_empty() {
            return Err(MusicError::NotFound(track.id.to_string()));
        }
        let call = self
            .songbird
            .get(session)
            .ok_or_else(|| MusicError::BackendUnavailable("sin sesión de voz".to_string()))?;

        self.stop_active(session);

        let input: Input = YoutubeDl::new(self.http.clone(), track.uri.clone()).into();
        let handle = {
            let mut call = call.lock().await;
            call.play_only_input(input)
        };

        let finished = Arc::new(AtomicBool::new(false));
        let started = Arc::new(AtomicBool::new(false));
        for (event, kind) in [
            (TrackEvent::Play, CallbackKind::Started),
            (TrackEvent::End, CallbackKind::Finished),
            (TrackEvent::Error, CallbackKind::Errored),
        ] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackNotifier {
                        session,
                        track_id: track.id.clone(),
                        kind,
                        started: started.clone(),
                        finished: finished.clone(),
                        callbacks: self.callbacks.clone(),
                    },
                )
                .map_err(|e| {
                    MusicError::BackendUnavailable(format!("Error al agregar event handler: {}", e))
                })?;
        }

        self.active.insert(
            session,
            ActiveTrack {
                handle,
                track_id: track.id.clone(),
                finished,
            },
        );
        Ok(())
    }

    async fn pause(&self, session: GuildId) -> MusicResult<()> {
        self.active_handle(session)?
            .pause()
            .map_err(|e| MusicError::BackendUnavailable(e.to_string()))
    }

    async fn resume(&self, session: GuildId) -> MusicResult<()> {
        self.active_handle(session)?
            .play()
            .map_err(|e| MusicError::BackendUnavailable(e.to_string()))
    }

    async fn stop(&self, session: GuildId) -> MusicResult<()> {
        self.stop_active(session);
        Ok(())
    }

    async fn release(&self, session: GuildId) -> MusicResult<()> {
        self.stop_active(session);
        if let Some(call) = self.songbird.get(session) {
            call.lock().await.stop();
        }
        Ok(())
    }
}

/// Forwards one songbird track event as a [`BackendCallback`].
struct TrackNotifier {
    session: GuildId,
    track_id: TrackId,
    kind: CallbackKind,
    started: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    callbacks: mpsc::Sender<BackendCallback>,
}

#[async_trait]
impl VoiceEventHandler for TrackNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let report = match self.kind {
            // `Play` también se emite al reanudar
            CallbackKind::Started => {
                !self.finished.load(Ordering::Acquire) && !self.started.swap(true, Ordering::AcqRel)
            }
            CallbackKind::Finished | CallbackKind::Errored => !self.finished.swap(true, Ordering::AcqRel),
        };
        if !report {
            return None;
        }

        if let (CallbackKind::Errored, EventContext::Track(tracks)) = (self.kind, ctx) {
            for (state, _) in tracks.iter() {
                if let PlayMode::Errored(e) = &state.playing {
                    error!("❌ Error de reproducción en {}: {:?}", self.track_id, e);
                }
            }
        }

        let callback = BackendCallback {
            session: self.session,
            track_id: self.track_id.clone(),
            kind: self.kind,
        };
        if self.callbacks.send(callback).await.is_err() {
            warn!("⚠️ Canal de callbacks cerrado, evento {:?} perdido", self.kind);
        }
        None
    }
}
