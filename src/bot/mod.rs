//! # Bot Module
//!
//! Discord front end for the playback core.
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`]: it registers the
//! slash commands on `ready`, routes interactions to [`handlers`], and forwards
//! the bot's own voice state changes to the voice session manager. The
//! [`Jukebox`] itself lives in the client's `TypeMap` under [`JukeboxKey`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use guild_jukebox::{bot::JukeboxBot, config::Config};
//!
//! let config = Config::load()?;
//! let client = Client::builder(&config.discord_token, intents)
//!     .event_handler(JukeboxBot::new(config.clone()))
//!     .register_songbird_with(songbird)
//!     .await?;
//! ```

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
    prelude::TypeMapKey,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod gateway;
pub mod handlers;
pub mod notifier;

use crate::{config::Config, jukebox::Jukebox};

/// `TypeMap` slot holding the shared [`Jukebox`].
pub struct JukeboxKey;

impl TypeMapKey for JukeboxKey {
    type Value = Arc<Jukebox>;
}

pub struct JukeboxBot {
    config: Arc<Config>,
}

impl JukeboxBot {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    async fn jukebox(ctx: &Context) -> Option<Arc<Jukebox>> {
        ctx.data.read().await.get::<JukeboxKey>().cloned()
    }

    /// Registers slash commands globally, or for a single guild when
    /// `GUILD_ID` is configured.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Some(jukebox) = Self::jukebox(&ctx).await else {
            error!("❌ Jukebox no inicializado, ignorando interacción");
            return;
        };

        let result = match interaction {
            Interaction::Command(command) => handlers::handle_command(&ctx, command, &jukebox).await,
            Interaction::Autocomplete(command) => handlers::handle_autocomplete(&ctx, command, &jukebox).await,
            _ => Ok(()),
        };

        if let Err(e) = result {
            error!("Error manejando interacción: {:?}", e);
        }
    }

    /// Only the bot's own voice state matters: a kick or a move by a
    /// moderator has to reach the session manager.
    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };

        debug!(
            "🔈 Estado de voz del bot en guild {}: {:?}",
            guild_id, new.channel_id
        );

        if let Some(jukebox) = Self::jukebox(&ctx).await {
            jukebox
                .voice
                .on_external_voice_state_change(guild_id, new.channel_id);
        }
    }
}
