use async_trait::async_trait;
use serenity::{
    cache::Cache,
    model::id::{ChannelId, GuildId, UserId},
};
use songbird::Songbird;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::{
    audio::voice::VoiceGateway,
    error::{MusicError, MusicResult},
};

/// Voice connections through Songbird, user lookups through the Serenity cache.
pub struct SongbirdGateway {
    songbird: Arc<Songbird>,
    cache: Arc<Cache>,
}

impl SongbirdGateway {
    pub fn new(songbird: Arc<Songbird>, cache: Arc<Cache>) -> Self {
        Self { songbird, cache }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()> {
        match self.songbird.join(guild_id, channel_id).await {
            Ok(_call) => {
                info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
                Ok(())
            }
            Err(e) => {
                error!("Error al obtener handler de voz: {:?}", e);
                Err(MusicError::VoiceConnectionFailed(e.to_string()))
            }
        }
    }

    async fn leave(&self, guild_id: GuildId) -> MusicResult<()> {
        self.songbird
            .remove(guild_id)
            .await
            .map_err(|e| MusicError::VoiceConnectionFailed(e.to_string()))?;

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }

    fn user_voice_channel(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        let channel = self
            .cache
            .guild(guild_id)?
            .voice_states
            .get(&user_id)
            .and_then(|state| state.channel_id);

        debug!("🔎 Usuario {} en canal de voz {:?}", user_id, channel);
        channel
    }
}
