use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod library;
mod storage;
mod ui;

use crate::audio::{
    player::{PlaybackManager, PlayerSettings},
    telemetry::{EventBus, EventSubscriber},
    transport::LogAnnouncer,
    voice::SongbirdTransportFactory,
};
use crate::bot::{presence::PresenceUpdater, JukeboxBot};
use crate::config::Config;
use crate::library::CatalogHandle;
use crate::storage::JsonStatsStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Jukebox Bot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Indexar la biblioteca local
    let catalog = Arc::new(CatalogHandle::new(config.songs_dir.clone(), config.library_refresh()));
    match catalog.refresh().await {
        Ok(0) => warn!("⚠️ No hay canciones en {}", config.songs_dir.display()),
        Ok(_) => {}
        Err(e) => warn!("⚠️ No se pudo indexar la biblioteca: {:?}", e),
    }

    // Suscriptores del bus de eventos
    let stats = Arc::new(JsonStatsStore::new(config.data_dir.clone()).await?);
    let presence = Arc::new(PresenceUpdater::default());
    let subscribers: Vec<Arc<dyn EventSubscriber>> = vec![stats, presence.clone()];
    let events = EventBus::start(subscribers);

    // Transporte de voz
    let songbird = Songbird::serenity();
    let transports = Arc::new(SongbirdTransportFactory::new(songbird.clone(), config.default_volume));

    let manager = Arc::new(PlaybackManager::new(
        catalog,
        transports,
        Arc::new(LogAnnouncer),
        events,
        PlayerSettings::from_config(&config),
        config.random_seed,
    ));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = JukeboxBot::new(config.clone(), manager, presence);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
