use anyhow::{Context, Result};
use std::time::Duration;

/// Fuentes de búsqueda aceptadas por yt-dlp
pub const SEARCH_SOURCES: &[&str] = &["ytsearch", "ytmsearch", "scsearch"];

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Bus de eventos
    pub event_inbox_capacity: usize,
    pub callback_buffer_size: usize,

    // Cola
    pub queue_page_size: usize,
    pub max_playlist_size: usize,

    // Backend
    pub default_search_source: String,
    pub backend_timeout_secs: u64,
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID no definido")?
                .parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Bus de eventos
            event_inbox_capacity: std::env::var("EVENT_INBOX_CAPACITY")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            callback_buffer_size: std::env::var("CALLBACK_BUFFER_SIZE")
                .unwrap_or_else(|_| "256".to_string())
                .parse()?,

            // Cola
            queue_page_size: std::env::var("QUEUE_PAGE_SIZE")
                .unwrap_or_else(|_| "25".to_string())
                .parse()?,
            max_playlist_size: std::env::var("MAX_PLAYLIST_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,

            // Backend
            default_search_source: std::env::var("DEFAULT_SEARCH_SOURCE")
                .unwrap_or_else(|_| "ytsearch".to_string()),
            backend_timeout_secs: std::env::var("BACKEND_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()?,
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Inbox and callback buffers must hold at least one event
    /// - Page size and playlist limit must be greater than 0
    /// - The search source must be one yt-dlp understands
    /// - The backend timeout must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.event_inbox_capacity == 0 {
            anyhow::bail!("Event inbox capacity must be greater than 0");
        }

        if self.callback_buffer_size == 0 {
            anyhow::bail!("Callback buffer size must be greater than 0");
        }

        if self.queue_page_size == 0 {
            anyhow::bail!("Queue page size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if !SEARCH_SOURCES.contains(&self.default_search_source.as_str()) {
            anyhow::bail!(
                "Unknown search source '{}', expected one of {:?}",
                self.default_search_source,
                SEARCH_SOURCES
            );
        }

        if self.backend_timeout_secs == 0 {
            anyhow::bail!("Backend timeout must be greater than 0");
        }

        Ok(())
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Events: inbox {}, callbacks {}\n  \
            Queue: page {}, playlist max {}\n  \
            Backend: {} via {} ({}s timeout)",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.event_inbox_capacity,
            self.callback_buffer_size,
            self.queue_page_size,
            self.max_playlist_size,
            self.default_search_source,
            self.ytdlp_path,
            self.backend_timeout_secs,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin valores por defecto)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            event_inbox_capacity: 100,
            callback_buffer_size: 256,

            queue_page_size: 25,
            max_playlist_size: 100,

            default_search_source: "ytsearch".to_string(),
            backend_timeout_secs: 15,
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}
