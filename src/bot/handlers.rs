use anyhow::Result;
use serenity::{
    builder::{
        CreateAutocompleteResponse, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandDataOption, CommandDataOptionValue, CommandInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info};

use crate::{
    audio::{
        catalog::{QueryKind, QueryPreview, TrackCatalog},
        queue::{LoopMode, QueuePage},
        track::TrackId,
    },
    error::{MusicError, MusicResult},
    jukebox::Jukebox,
};

/// Discord caps autocomplete choices at 25, with names and values of at most
/// 100 characters.
const MAX_CHOICES: usize = 25;
const MAX_CHOICE_LEN: usize = 100;
const SEARCH_SUGGESTIONS: usize = 10;
const PLAYLIST_SUGGESTIONS: usize = MAX_CHOICES - 1;

/// Who used a command, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub channel_id: ChannelId,
}

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, jukebox: &Jukebox) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;
    let invocation = Invocation {
        guild_id,
        user_id: command.user.id,
        channel_id: command.channel_id,
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    if command.data.name == "play" {
        return handle_play(ctx, &command, invocation, jukebox).await;
    }

    let reply = dispatch(&command.data.name, &command.data.options, invocation, jukebox).await;

    // Las respuestas de error solo las ve quien usó el comando
    let (content, ephemeral) = match reply {
        Ok(content) => (content, false),
        Err(e) => (format!("❌ {}", e), e.is_user_error()),
    };

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

/// Runs every command except `/play`, which needs a deferred response.
pub async fn dispatch(
    name: &str,
    options: &[CommandDataOption],
    invocation: Invocation,
    jukebox: &Jukebox,
) -> MusicResult<String> {
    let guild_id = invocation.guild_id;
    // Los avisos van al canal del último comando
    jukebox
        .store
        .set_notification_channel(guild_id, invocation.channel_id);

    match name {
        "join" => handle_join(options, invocation, jukebox).await,
        "leave" => jukebox
            .voice
            .leave(guild_id)
            .await
            .map(|_| "👋 Desconectado del canal de voz".to_string()),
        "pause" => jukebox
            .player
            .pause(guild_id)
            .await
            .map(|_| "⏸️ Reproducción pausada".to_string()),
        "resume" => jukebox
            .player
            .resume(guild_id)
            .await
            .map(|_| "▶️ Reproducción reanudada".to_string()),
        "skip" => handle_skip(guild_id, jukebox).await,
        "stop" => jukebox
            .queue
            .stop(guild_id)
            .await
            .map(|_| "⏹️ Reproducción detenida y cola vaciada".to_string()),
        "loop" => Ok(handle_loop(options, guild_id, jukebox)),
        "nowplaying" => handle_nowplaying(guild_id, jukebox).await,
        "queue" => handle_queue(options, guild_id, jukebox).await,
        _ => Ok("❌ Comando no reconocido".to_string()),
    }
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    invocation: Invocation,
    jukebox: &Jukebox,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let content = match play(invocation, jukebox, &query).await {
        Ok(content) => content,
        Err(e) => format!("❌ {}", e),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;

    Ok(())
}

async fn play(invocation: Invocation, jukebox: &Jukebox, query: &str) -> MusicResult<String> {
    let Invocation {
        guild_id,
        user_id,
        channel_id,
    } = invocation;
    jukebox.store.set_notification_channel(guild_id, channel_id);

    let resolved = jukebox.catalog.resolve(query).await?;

    if !jukebox.store.with_state(guild_id, |state| state.is_connected()) {
        jukebox.voice.join(guild_id, None, user_id, channel_id).await?;
    }

    let track_ids = resolved.tracks.iter().map(|track| track.id.clone()).collect();
    let added = jukebox.queue.add(guild_id, track_ids, user_id).await?;

    Ok(match (&resolved.playlist_name, resolved.tracks.first()) {
        (Some(name), _) if resolved.is_playlist => {
            format!("📋 Playlist **{}**: {} canciones agregadas", name, added)
        }
        (None, _) if resolved.is_playlist => format!("📋 {} canciones agregadas", added),
        (_, Some(track)) => format!(
            "➕ Agregada: **{}** de {} `[{}]`",
            track.title,
            track.artist,
            track.display_duration()
        ),
        (_, None) => "➕ Nada que agregar".to_string(),
    })
}

async fn handle_join(options: &[CommandDataOption], invocation: Invocation, jukebox: &Jukebox) -> MusicResult<String> {
    let target = options
        .iter()
        .find(|opt| opt.name == "channel")
        .and_then(|opt| opt.value.as_channel_id());

    let channel_id = jukebox
        .voice
        .join(
            invocation.guild_id,
            target,
            invocation.user_id,
            invocation.channel_id,
        )
        .await?;
    Ok(format!("🔊 Conectado a <#{}>", channel_id))
}

async fn handle_skip(guild_id: GuildId, jukebox: &Jukebox) -> MusicResult<String> {
    let outcome = jukebox.player.skip(guild_id).await?;
    let skipped = title_of(&jukebox.catalog, &outcome.skipped);
    Ok(match outcome.next {
        Some(next) => format!(
            "⏭️ Saltada **{}**, ahora: **{}**",
            skipped,
            title_of(&jukebox.catalog, &next)
        ),
        None => format!("⏭️ Saltada **{}**, no quedan canciones en la cola", skipped),
    })
}

fn handle_loop(options: &[CommandDataOption], guild_id: GuildId, jukebox: &Jukebox) -> String {
    let requested = options
        .iter()
        .find(|opt| opt.name == "mode")
        .and_then(|opt| opt.value.as_str())
        .and_then(LoopMode::parse);

    let mode = match requested {
        Some(mode) => jukebox.player.set_loop_mode(guild_id, mode),
        None => jukebox.player.cycle_loop_mode(guild_id),
    };
    format!("Modo de repetición: {}", mode)
}

async fn handle_nowplaying(guild_id: GuildId, jukebox: &Jukebox) -> MusicResult<String> {
    let Some(now) = jukebox.player.now_playing(guild_id).await? else {
        return Err(MusicError::NotPlaying);
    };

    let state = if now.paused { "⏸️ En pausa" } else { "🎵 Sonando" };
    Ok(format!(
        "{}: **{}** de {} `[{}]`\nPosición {} · pedida por <@{}> · {}",
        state,
        now.track.title,
        now.track.artist,
        now.track.display_duration(),
        now.position,
        now.entry.requester_id,
        now.loop_mode
    ))
}

async fn handle_queue(options: &[CommandDataOption], guild_id: GuildId, jukebox: &Jukebox) -> MusicResult<String> {
    let Some((name, options)) = subcommand(options) else {
        return Ok(render_queue(&jukebox.queue.list(guild_id, 0), &jukebox.catalog));
    };

    let index = integer_option(options, "index");

    match name {
        "list" => {
            let page = integer_option(options, "page").unwrap_or(0);
            Ok(render_queue(&jukebox.queue.list(guild_id, page), &jukebox.catalog))
        }
        "remove" => {
            let index = index.ok_or(MusicError::IndexOutOfRange { index: 0, len: 0 })?;
            let removed = jukebox.queue.remove(guild_id, index).await?;
            Ok(format!(
                "🗑️ Eliminada **{}** de la cola",
                title_of(&jukebox.catalog, &removed.track_id)
            ))
        }
        "clear" => {
            let keep_current = options
                .iter()
                .find(|opt| opt.name == "keep_current")
                .and_then(|opt| opt.value.as_bool())
                .unwrap_or(false);
            let removed = jukebox.queue.clear(guild_id, keep_current).await?;
            Ok(format!("🗑️ {} canciones eliminadas de la cola", removed))
        }
        "seek" => {
            let index = index.ok_or(MusicError::IndexOutOfRange { index: 0, len: 0 })?;
            let track_id = jukebox.queue.seek(guild_id, index).await?;
            Ok(format!("⏩ Saltando a **{}**", title_of(&jukebox.catalog, &track_id)))
        }
        "restart" => {
            let track_id = jukebox.queue.restart(guild_id).await?;
            Ok(format!("⏮️ Volviendo a empezar con **{}**", title_of(&jukebox.catalog, &track_id)))
        }
        _ => Ok("❌ Subcomando no reconocido".to_string()),
    }
}

// Autocompletado

/// Maneja sugerencias de autocompletado
pub async fn handle_autocomplete(ctx: &Context, interaction: CommandInteraction, jukebox: &Jukebox) -> Result<()> {
    let Some(guild_id) = interaction.guild_id else {
        return Ok(());
    };
    let Some(focused) = interaction.data.autocomplete() else {
        return Ok(());
    };

    let mut response = CreateAutocompleteResponse::new();
    match (interaction.data.name.as_str(), focused.name) {
        ("play", "query") => {
            for (name, value) in play_suggestions(jukebox, focused.value).await {
                response = response.add_string_choice(name, value);
            }
        }
        ("queue", "index") => {
            let removing = subcommand(&interaction.data.options).map(|(name, _)| name) == Some("remove");
            let page = jukebox.queue.list(guild_id, 0);
            for (name, position) in position_choices(&page, &jukebox.catalog, removing) {
                response = response.add_int_choice(name, position);
            }
        }
        _ => {}
    }

    interaction
        .create_response(&ctx.http, CreateInteractionResponse::Autocomplete(response))
        .await?;
    Ok(())
}

async fn play_suggestions(jukebox: &Jukebox, query: &str) -> Vec<(String, String)> {
    let limit = match QueryKind::classify(query) {
        QueryKind::Playlist(_) => PLAYLIST_SUGGESTIONS,
        _ => SEARCH_SUGGESTIONS,
    };
    match jukebox.catalog.preview(query, limit).await {
        Ok(preview) => play_choices(&preview, query.trim()),
        Err(e) => {
            debug!("Sin sugerencias para '{}': {}", query, e);
            Vec::new()
        }
    }
}

/// `(name, value)` pairs for `/play`. Values are playable queries.
pub fn play_choices(preview: &QueryPreview, query: &str) -> Vec<(String, String)> {
    let mut choices = Vec::new();

    if let Some((name, total)) = &preview.playlist {
        choices.push((format!("📋 {} ({} canciones)", name, total), query.to_string()));
    }
    for (index, track) in preview.tracks.iter().enumerate() {
        let name = if preview.playlist.is_some() {
            format!("🎵 {}. {} - {}", index + 1, track.title, track.artist)
        } else {
            format!("🎵 {} - {}", track.title, track.artist)
        };
        let value = if track.uri.is_empty() {
            track.id.to_string()
        } else {
            track.uri.clone()
        };
        choices.push((name, value));
    }

    choices
        .into_iter()
        .filter(|(_, value)| !value.is_empty() && value.chars().count() <= MAX_CHOICE_LEN)
        .map(|(name, value)| (truncate(&name, MAX_CHOICE_LEN), value))
        .take(MAX_CHOICES)
        .collect()
}

/// `(name, position)` pairs for `/queue remove` and `/queue seek`, taken from
/// the page holding the current entry. The current entry is left out when it
/// cannot be chosen.
pub fn position_choices(page: &QueuePage, catalog: &TrackCatalog, exclude_current: bool) -> Vec<(String, i64)> {
    let current = page.current.iter().filter(|_| !exclude_current);

    page.played
        .iter()
        .chain(current)
        .chain(page.upcoming.iter())
        .map(|positioned| {
            let marker = if Some(positioned.position) == page.current.as_ref().map(|c| c.position) {
                "▶️ "
            } else {
                ""
            };
            let name = format!(
                "{}{}. {}",
                marker,
                positioned.position,
                title_of(catalog, &positioned.entry.track_id)
            );
            (truncate(&name, MAX_CHOICE_LEN), positioned.position as i64)
        })
        .take(MAX_CHOICES)
        .collect()
}

// Funciones auxiliares

fn subcommand(options: &[CommandDataOption]) -> Option<(&str, &[CommandDataOption])> {
    options.iter().find_map(|opt| match &opt.value {
        CommandDataOptionValue::SubCommand(options) => Some((opt.name.as_str(), options.as_slice())),
        _ => None,
    })
}

fn integer_option(options: &[CommandDataOption], name: &str) -> Option<usize> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
        .and_then(|value| usize::try_from(value).ok())
}

fn title_of(catalog: &TrackCatalog, track_id: &TrackId) -> String {
    catalog
        .get(track_id)
        .map(|track| track.title)
        .unwrap_or_else(|| track_id.to_string())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}

/// Plain-text rendering of one queue page.
pub fn render_queue(page: &QueuePage, catalog: &TrackCatalog) -> String {
    if page.total_entries == 0 {
        return "📭 La cola está vacía".to_string();
    }

    let mut lines = vec![format!(
        "📜 **Cola** · página {}/{} · {} canciones · {}",
        page.page, page.total_pages, page.total_entries, page.loop_mode
    )];

    for played in &page.played {
        lines.push(format!(
            "~~`{}.` {}~~",
            played.position,
            title_of(catalog, &played.entry.track_id)
        ));
    }
    if let Some(current) = &page.current {
        lines.push(format!(
            "▶️ `{}.` **{}** · <@{}>",
            current.position,
            title_of(catalog, &current.entry.track_id),
            current.entry.requester_id
        ));
    }
    for upcoming in &page.upcoming {
        lines.push(format!(
            "`{}.` {} · <@{}>",
            upcoming.position,
            title_of(catalog, &upcoming.entry.track_id),
            upcoming.entry.requester_id
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        backend::MockPlaybackBackend,
        queue::MusicQueue,
        state_store::ConnectionStatus,
        testing::{track, GUILD, TEXT, USER, VOICE},
        track::QueueEntry,
        voice::MockVoiceGateway,
    };
    use crate::config::Config;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const OTHER_TEXT: ChannelId = ChannelId::new(201);

    fn catalog_with(ids: &[&str]) -> TrackCatalog {
        let catalog = TrackCatalog::new(Arc::new(MockPlaybackBackend::new()), "ytsearch", 100);
        for id in ids {
            catalog.insert(track(id));
        }
        catalog
    }

    fn queue_at(ids: &[&str], current: usize) -> MusicQueue {
        let mut queue = MusicQueue::new();
        queue.append(ids.iter().map(|id| QueueEntry::new(TrackId::from(*id), USER)));
        queue.seek(current).unwrap();
        queue
    }

    fn playing_jukebox(backend: MockPlaybackBackend, ids: &[&str]) -> Jukebox {
        let jukebox = Jukebox::new(
            &Config::default(),
            Arc::new(backend),
            Arc::new(MockVoiceGateway::new()),
        );
        for id in ids {
            jukebox.catalog.insert(track(id));
        }
        jukebox.store.with_state(GUILD, |state| {
            state.connection_status = ConnectionStatus::Connected;
            state.voice_channel_id = Some(VOICE);
            state.notification_channel_id = Some(TEXT);
            state
                .queue
                .append(ids.iter().map(|id| QueueEntry::new(TrackId::from(*id), USER)));
        });
        jukebox
    }

    fn invocation(channel_id: ChannelId) -> Invocation {
        Invocation {
            guild_id: GUILD,
            user_id: USER,
            channel_id,
        }
    }

    #[tokio::test]
    async fn every_command_moves_notifications_to_its_channel() {
        let mut backend = MockPlaybackBackend::new();
        backend.expect_pause().times(1).returning(|_| Ok(()));
        let jukebox = playing_jukebox(backend, &["t1"]);

        assert_eq!(
            dispatch("pause", &[], invocation(OTHER_TEXT), &jukebox).await,
            Ok("⏸️ Reproducción pausada".to_string())
        );
        assert_eq!(
            jukebox.store.snapshot(GUILD).notification_channel_id,
            Some(OTHER_TEXT)
        );

        dispatch("loop", &[], invocation(TEXT), &jukebox).await.unwrap();
        assert_eq!(jukebox.store.snapshot(GUILD).notification_channel_id, Some(TEXT));
    }

    #[tokio::test]
    async fn failed_command_still_moves_notifications() {
        let jukebox = playing_jukebox(MockPlaybackBackend::new(), &[]);

        assert_eq!(
            dispatch("skip", &[], invocation(OTHER_TEXT), &jukebox).await,
            Err(MusicError::NotPlaying)
        );
        assert_eq!(
            jukebox.store.snapshot(GUILD).notification_channel_id,
            Some(OTHER_TEXT)
        );
    }

    #[tokio::test]
    async fn stop_command_empties_queue() {
        let mut backend = MockPlaybackBackend::new();
        backend.expect_stop().times(1).returning(|_| Ok(()));
        let jukebox = playing_jukebox(backend, &["t1", "t2"]);

        assert!(dispatch("stop", &[], invocation(TEXT), &jukebox).await.is_ok());
        let state = jukebox.store.snapshot(GUILD);
        assert!(state.queue.is_empty());
        assert_eq!(state.queue.current_index(), None);
    }

    #[test]
    fn renders_played_current_and_upcoming() {
        let catalog = catalog_with(&["t1", "t2", "t3"]);
        let queue = queue_at(&["t1", "t2", "t3"], 1);

        let text = render_queue(&queue.page(0, 25), &catalog);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("página 1/1"));
        assert!(lines[1].starts_with("~~`0.` Title t1"));
        assert!(lines[2].starts_with("▶️ `1.` **Title t2**"));
        assert!(lines[3].starts_with("`2.` Title t3"));
    }

    #[test]
    fn empty_queue_message() {
        let catalog = catalog_with(&[]);
        let text = render_queue(&MusicQueue::new().page(0, 25), &catalog);
        assert_eq!(text, "📭 La cola está vacía");
    }

    #[test]
    fn unknown_tracks_fall_back_to_id() {
        let catalog = catalog_with(&[]);
        assert_eq!(title_of(&catalog, &TrackId::from("raw-id")), "raw-id");
    }

    #[test]
    fn position_choices_list_the_current_page() {
        let catalog = catalog_with(&["t1", "t2", "t3"]);
        let page = queue_at(&["t1", "t2", "t3"], 1).page(0, 25);

        assert_eq!(
            position_choices(&page, &catalog, false),
            vec![
                ("0. Title t1".to_string(), 0),
                ("▶️ 1. Title t2".to_string(), 1),
                ("2. Title t3".to_string(), 2),
            ]
        );
    }

    #[test]
    fn position_choices_for_remove_skip_current() {
        let catalog = catalog_with(&["t1", "t2", "t3"]);
        let page = queue_at(&["t1", "t2", "t3"], 1).page(0, 25);

        let positions: Vec<i64> = position_choices(&page, &catalog, true)
            .into_iter()
            .map(|(_, position)| position)
            .collect();
        assert_eq!(positions, vec![0, 2]);
    }

    #[test]
    fn search_choices_play_by_uri() {
        let preview = QueryPreview {
            tracks: vec![track("a"), track("b")],
            playlist: None,
        };

        let choices = play_choices(&preview, "lofi");
        assert_eq!(
            choices,
            vec![
                (
                    "🎵 Title a - Artist".to_string(),
                    "https://www.youtube.com/watch?v=a".to_string()
                ),
                (
                    "🎵 Title b - Artist".to_string(),
                    "https://www.youtube.com/watch?v=b".to_string()
                ),
            ]
        );
    }

    #[test]
    fn playlist_choices_offer_whole_playlist_first() {
        let url = "https://www.youtube.com/playlist?list=PL1";
        let preview = QueryPreview {
            tracks: vec![track("a")],
            playlist: Some(("Mix".to_string(), 12)),
        };

        let choices = play_choices(&preview, url);
        assert_eq!(choices.len(), 2);
        assert_eq!(choices[0], ("📋 Mix (12 canciones)".to_string(), url.to_string()));
        assert!(choices[1].0.starts_with("🎵 1. Title a"));
    }

    #[test]
    fn long_choice_names_are_truncated() {
        let mut long = track("a");
        long.title = "x".repeat(150);
        let preview = QueryPreview {
            tracks: vec![long],
            playlist: None,
        };

        let choices = play_choices(&preview, "query");
        assert_eq!(choices[0].0.chars().count(), MAX_CHOICE_LEN);
        assert!(choices[0].0.ends_with("..."));
    }
}
