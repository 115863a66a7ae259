use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use guild_jukebox::{
    audio::songbird_backend::SongbirdBackend,
    bot::{gateway::SongbirdGateway, notifier::SerenityNotifier, JukeboxBot, JukeboxKey},
    config::Config,
    jukebox::Jukebox,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Config::load()?;
    info!("⚙️ {}", config.summary());

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Construir cliente
    let songbird = Songbird::serenity();
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(JukeboxBot::new(config.clone()))
        .register_songbird_with(songbird.clone())
        .await?;

    // Núcleo de reproducción
    let (callbacks, callback_rx) = mpsc::channel(config.callback_buffer_size);
    let backend = Arc::new(SongbirdBackend::new(songbird.clone(), callbacks, &config));
    let gateway = Arc::new(SongbirdGateway::new(songbird, client.cache.clone()));
    let jukebox = Arc::new(Jukebox::new(&config, backend, gateway));

    let notifier = Arc::new(SerenityNotifier::new(client.http.clone()));
    let workers = jukebox.spawn_workers(callback_rx, notifier);

    {
        let mut data = client.data.write().await;
        data.insert::<JukeboxKey>(jukebox.clone());
    }

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    let shutdown_jukebox = jukebox.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Error al registrar Ctrl+C");
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shutdown_jukebox.shutdown();
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    jukebox.shutdown();
    for worker in workers {
        if let Err(e) = worker.await {
            error!("Tarea de reproducción terminó con error: {:?}", e);
        }
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    // yt-dlp es la única dependencia externa que se invoca directamente
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("yt-dlp no disponible");
    }
}
